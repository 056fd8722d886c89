use std::path::{Component, Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuthorityError;
use crate::ids::{GrantId, SessionId};

/// Privileged action classes the kernel arbitrates.
///
/// Every capability starts denied. Nothing proceeds without an explicit,
/// session-bound grant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    UiNavigation,
    TextInput,
    ParameterAdjustment,
    FileRead,
    FileWrite,
    RenderExport,
}

/// Coarse grouping used to route a request to its enforcement gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CapabilityFamily {
    Ui,
    File,
    Export,
}

/// Shape of scope a capability accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeKind {
    Window,
    Parameter,
    File,
    ExportOutput,
}

/// Posture applied when no grant matches. Deny is the only posture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefaultPosture {
    Deny,
}

/// Static definition of a capability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDefinition {
    pub capability: Capability,
    pub default_posture: DefaultPosture,
    /// Consent is required by definition, regardless of how the grant was issued.
    pub requires_consent: bool,
    pub scope_kind: ScopeKind,
    pub family: CapabilityFamily,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::UiNavigation,
        Capability::TextInput,
        Capability::ParameterAdjustment,
        Capability::FileRead,
        Capability::FileWrite,
        Capability::RenderExport,
    ];

    pub fn definition(self) -> CapabilityDefinition {
        let (requires_consent, scope_kind, family) = match self {
            Capability::UiNavigation => (false, ScopeKind::Window, CapabilityFamily::Ui),
            Capability::TextInput => (false, ScopeKind::Window, CapabilityFamily::Ui),
            Capability::ParameterAdjustment => (false, ScopeKind::Parameter, CapabilityFamily::Ui),
            Capability::FileRead => (false, ScopeKind::File, CapabilityFamily::File),
            Capability::FileWrite => (true, ScopeKind::File, CapabilityFamily::File),
            Capability::RenderExport => (true, ScopeKind::ExportOutput, CapabilityFamily::Export),
        };
        CapabilityDefinition {
            capability: self,
            default_posture: DefaultPosture::Deny,
            requires_consent,
            scope_kind,
            family,
        }
    }

    pub fn family(self) -> CapabilityFamily {
        self.definition().family
    }

    /// Capabilities whose effects cannot be undone. These need an execution
    /// ticket from a confirmation machine before the effect is handed out.
    pub fn is_irreversible(self) -> bool {
        matches!(
            self,
            Capability::FileWrite | Capability::RenderExport | Capability::TextInput
        )
    }

    /// Stable wire name, as used in audit payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::UiNavigation => "UI_NAVIGATION",
            Capability::TextInput => "TEXT_INPUT",
            Capability::ParameterAdjustment => "PARAMETER_ADJUSTMENT",
            Capability::FileRead => "FILE_READ",
            Capability::FileWrite => "FILE_WRITE",
            Capability::RenderExport => "RENDER_EXPORT",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a grant applies to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Scope {
    /// A window owned by the given bundle or executable path.
    Window { owner: PathBuf },
    /// A named parameter on the target application.
    Parameter { name: String },
    /// One concrete file.
    File { path: PathBuf },
    /// One concrete export destination.
    ExportOutput { path: PathBuf },
}

impl Scope {
    pub fn kind(&self) -> ScopeKind {
        match self {
            Scope::Window { .. } => ScopeKind::Window,
            Scope::Parameter { .. } => ScopeKind::Parameter,
            Scope::File { .. } => ScopeKind::File,
            Scope::ExportOutput { .. } => ScopeKind::ExportOutput,
        }
    }

    /// Filesystem path for file and export scopes.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Scope::File { path } | Scope::ExportOutput { path } => Some(path),
            _ => None,
        }
    }

    /// Reject scopes of the wrong shape for `capability`, and paths that are
    /// relative, contain `..` or look like patterns.
    pub fn validate_for(&self, capability: Capability) -> Result<(), AuthorityError> {
        let invalid = |reason: &str| AuthorityError::InvalidScope {
            capability,
            reason: reason.to_string(),
        };

        if self.kind() != capability.definition().scope_kind {
            return Err(invalid(&format!(
                "{:?} scope does not fit {}",
                self.kind(),
                capability
            )));
        }

        match self {
            Scope::Window { owner } => {
                if !owner.is_absolute() {
                    return Err(invalid("window owner must be an absolute path"));
                }
            }
            Scope::Parameter { name } => {
                if name.trim().is_empty() {
                    return Err(invalid("parameter name is empty"));
                }
                if has_wildcard(name) {
                    return Err(invalid("parameter name contains a wildcard"));
                }
            }
            Scope::File { path } | Scope::ExportOutput { path } => validate_concrete_path(path)
                .map_err(|reason| invalid(reason))?,
        }
        Ok(())
    }
}

fn has_wildcard(s: &str) -> bool {
    s.contains(['*', '?', '[', ']'])
}

fn validate_concrete_path(path: &Path) -> Result<(), &'static str> {
    if !path.is_absolute() {
        return Err("path must be absolute");
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err("path must not contain '..'");
    }
    if has_wildcard(&path.to_string_lossy()) {
        return Err("path must not contain wildcards");
    }
    if path.file_name().is_none() {
        return Err("path must name a file");
    }
    Ok(())
}

/// A session-bound permission for one capability over one scope.
///
/// Lives in memory only and dies with its session.
#[derive(Clone, Debug)]
pub struct CapabilityGrant {
    pub id: GrantId,
    pub capability: Capability,
    pub scope: Scope,
    pub session: SessionId,
    pub requires_consent: bool,
    pub issued_at: Instant,
    pub expires_at: Instant,
    pub granted_at: DateTime<Utc>,
}

impl CapabilityGrant {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// True if this grant covers `capability` over `scope` exactly.
    pub fn covers(&self, capability: Capability, scope: &Scope) -> bool {
        self.capability == capability && &self.scope == scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_capability_defaults_to_deny() {
        for cap in Capability::ALL {
            assert_eq!(cap.definition().default_posture, DefaultPosture::Deny);
        }
    }

    #[test]
    fn write_and_export_require_consent_by_definition() {
        assert!(Capability::FileWrite.definition().requires_consent);
        assert!(Capability::RenderExport.definition().requires_consent);
        assert!(!Capability::FileRead.definition().requires_consent);
        assert!(!Capability::UiNavigation.definition().requires_consent);
    }

    #[test]
    fn families_route_to_gates() {
        assert_eq!(Capability::TextInput.family(), CapabilityFamily::Ui);
        assert_eq!(Capability::FileWrite.family(), CapabilityFamily::File);
        assert_eq!(Capability::RenderExport.family(), CapabilityFamily::Export);
    }

    #[test]
    fn wrong_scope_shape_rejected() {
        let scope = Scope::Parameter {
            name: "gain".into(),
        };
        let err = scope.validate_for(Capability::FileWrite).unwrap_err();
        assert!(matches!(err, AuthorityError::InvalidScope { .. }));
    }

    #[test]
    fn relative_and_traversal_paths_rejected() {
        for bad in ["out.wav", "/tmp/../etc/passwd", "/tmp/*.wav", "/"] {
            let scope = Scope::File { path: bad.into() };
            assert!(
                scope.validate_for(Capability::FileWrite).is_err(),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn concrete_paths_accepted() {
        let scope = Scope::File {
            path: "/out.wav".into(),
        };
        assert!(scope.validate_for(Capability::FileWrite).is_ok());

        let scope = Scope::ExportOutput {
            path: "/renders/mix.wav".into(),
        };
        assert!(scope.validate_for(Capability::RenderExport).is_ok());
    }

    #[test]
    fn parameter_wildcards_rejected() {
        let scope = Scope::Parameter { name: "eq.*".into() };
        assert!(scope
            .validate_for(Capability::ParameterAdjustment)
            .is_err());
    }

    #[test]
    fn irreversible_set() {
        assert!(Capability::FileWrite.is_irreversible());
        assert!(Capability::RenderExport.is_irreversible());
        assert!(Capability::TextInput.is_irreversible());
        assert!(!Capability::FileRead.is_irreversible());
        assert!(!Capability::UiNavigation.is_irreversible());
    }

    #[test]
    fn serde_wire_names() {
        let json = serde_json::to_string(&Capability::RenderExport).unwrap();
        assert_eq!(json, "\"RENDER_EXPORT\"");

        let scope = Scope::File {
            path: "/out.wav".into(),
        };
        let json = serde_json::to_value(&scope).unwrap();
        assert_eq!(json["kind"], "file");
    }

    #[test]
    fn grant_expiry_is_inclusive() {
        let now = Instant::now();
        let grant = CapabilityGrant {
            id: GrantId::new(),
            capability: Capability::FileRead,
            scope: Scope::File {
                path: "/in.wav".into(),
            },
            session: SessionId::from("s"),
            requires_consent: false,
            issued_at: now,
            expires_at: now,
            granted_at: Utc::now(),
        };
        assert!(grant.is_expired(now));
    }
}

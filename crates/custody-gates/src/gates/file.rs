use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use custody_audit::AuditEventType;
use custody_session::{EndReason, RevocationListener};
use custody_types::{
    AuthorityError, BookmarkId, Capability, CapabilityFamily, DenyReason, FileIdentity,
    HardStopReason, SessionId,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, info};

use crate::base::GateBase;
use crate::request::{GateClearance, GateRequest, RequestTarget};
use crate::traits::EnforcementGate;

/// Which picker produced a selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionOrigin {
    OpenPanel,
    SavePanel,
}

/// A path the user picked in a native file dialog.
///
/// Only the host's picker integration should construct these; the gate never
/// bookmarks a path from any other source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserSelection {
    path: PathBuf,
    origin: SelectionOrigin,
}

impl UserSelection {
    pub fn from_picker(path: impl Into<PathBuf>, origin: SelectionOrigin) -> Self {
        Self {
            path: path.into(),
            origin,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn origin(&self) -> SelectionOrigin {
        self.origin
    }
}

/// What a bookmark pins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookmarkTarget {
    /// The file existed when selected.
    Existing(FileIdentity),
    /// A file to be created: the parent directory is pinned now, the file
    /// itself the first time it is seen.
    NewFile {
        parent: FileIdentity,
        leaf: PathBuf,
        pinned: Option<FileIdentity>,
    },
}

/// A session-scoped, memory-only grant of access to one user-selected path.
#[derive(Clone, Debug)]
pub struct Bookmark {
    pub id: BookmarkId,
    pub session: SessionId,
    pub path: PathBuf,
    pub origin: SelectionOrigin,
    pub target: BookmarkTarget,
    pub created_at: DateTime<Utc>,
}

/// Gate for FILE_READ and FILE_WRITE.
pub struct FileGate {
    base: GateBase,
    bookmarks: Mutex<HashMap<PathBuf, Bookmark>>,
}

fn resolve_or_stop(path: &Path) -> Result<FileIdentity, AuthorityError> {
    FileIdentity::resolve(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => {
            AuthorityError::HardStop(HardStopReason::FileMissing(path.to_path_buf()))
        }
        _ => AuthorityError::from(err),
    })
}

impl FileGate {
    pub fn new(base: GateBase) -> Self {
        Self {
            base,
            bookmarks: Mutex::new(HashMap::new()),
        }
    }

    /// Create a bookmark from a user selection.
    pub fn bookmark(
        &self,
        session: &SessionId,
        selection: UserSelection,
    ) -> Result<BookmarkId, AuthorityError> {
        self.base.session().assert_session(session)?;

        let path = selection.path;
        let target = if path.symlink_metadata().is_ok() {
            BookmarkTarget::Existing(FileIdentity::resolve(&path)?)
        } else {
            let (parent, leaf) = match (path.parent(), path.file_name()) {
                (Some(parent), Some(leaf)) if !parent.as_os_str().is_empty() => (parent, leaf),
                _ => {
                    return Err(AuthorityError::CapabilityDenied(DenyReason::TargetMissing(
                        format!("parent directory of {}", path.display()),
                    )))
                }
            };
            BookmarkTarget::NewFile {
                parent: FileIdentity::resolve(parent)?,
                leaf: PathBuf::from(leaf),
                pinned: None,
            }
        };

        let bookmark = Bookmark {
            id: BookmarkId::new(),
            session: session.clone(),
            path: path.clone(),
            origin: selection.origin,
            target,
            created_at: Utc::now(),
        };
        let id = bookmark.id;

        self.bookmarks.lock().insert(path.clone(), bookmark.clone());
        // Same race as grants: a session end may have swept the map already.
        if let Err(err) = self.base.session().assert_session(session) {
            let mut bookmarks = self.bookmarks.lock();
            if bookmarks.get(&path).map(|b| b.id) == Some(id) {
                bookmarks.remove(&path);
            }
            return Err(err);
        }

        self.base.audit().append(
            AuditEventType::BookmarkCreated,
            json!({
                "bookmark": id.to_string(),
                "session": session.as_str(),
                "path": path,
                "origin": bookmark.origin,
                "new_file": matches!(bookmark.target, BookmarkTarget::NewFile { .. }),
            }),
        );
        info!(session = %session, path = %path.display(), "Bookmark created");
        Ok(id)
    }

    pub fn bookmark_count(&self) -> usize {
        self.bookmarks.lock().len()
    }

    pub fn has_bookmark(&self, path: &Path) -> bool {
        self.bookmarks.lock().contains_key(path)
    }

    /// Re-resolve the bookmarked path and compare against what was pinned.
    fn verify(
        &self,
        bookmark: &mut Bookmark,
        capability: Capability,
    ) -> Result<FileIdentity, AuthorityError> {
        let path = bookmark.path.clone();
        match &mut bookmark.target {
            BookmarkTarget::Existing(pinned) => {
                let live = resolve_or_stop(&path)?;
                if &live != pinned {
                    error!(path = %path.display(), "Bookmarked file identity changed");
                    return Err(AuthorityError::HardStop(HardStopReason::IdentityChanged(path)));
                }
                Ok(live)
            }
            BookmarkTarget::NewFile {
                parent,
                leaf,
                pinned,
            } => {
                let parent_path = path.parent().unwrap_or(Path::new("/"));
                let live_parent = resolve_or_stop(parent_path)?;
                if &live_parent != parent {
                    error!(path = %parent_path.display(), "Bookmarked directory identity changed");
                    return Err(AuthorityError::HardStop(HardStopReason::IdentityChanged(
                        parent_path.to_path_buf(),
                    )));
                }

                if path.symlink_metadata().is_err() {
                    if pinned.is_some() {
                        return Err(AuthorityError::HardStop(HardStopReason::FileMissing(path)));
                    }
                    if capability == Capability::FileRead {
                        return Err(AuthorityError::CapabilityDenied(DenyReason::TargetMissing(
                            path.display().to_string(),
                        )));
                    }
                    return Ok(live_parent);
                }

                let live = resolve_or_stop(&path)?;
                if let Some(existing) = pinned.as_ref() {
                    if &live != existing {
                        error!(path = %path.display(), "Output file identity changed");
                        return Err(AuthorityError::HardStop(HardStopReason::IdentityChanged(path)));
                    }
                    return Ok(live);
                }

                // Appeared as a link to somewhere else.
                if live.canonical_path != live_parent.canonical_path.join(leaf.as_path()) {
                    return Err(AuthorityError::HardStop(HardStopReason::IdentityChanged(path)));
                }
                debug!(path = %path.display(), "Pinning new output file");
                *pinned = Some(live.clone());
                Ok(live)
            }
        }
    }
}

impl EnforcementGate for FileGate {
    fn name(&self) -> &str {
        "file"
    }

    fn handles(&self, capability: Capability) -> bool {
        capability.family() == CapabilityFamily::File
    }

    fn enforce(&self, request: &GateRequest) -> Result<GateClearance, AuthorityError> {
        self.base.guarded(self.name(), request, || {
            let path = match &request.target {
                RequestTarget::File { path } => path,
                _ => {
                    return Err(AuthorityError::CapabilityDenied(
                        DenyReason::TargetMissing("file path".into()),
                    ))
                }
            };
            if request.scope.path() != Some(path.as_path()) {
                return Err(AuthorityError::CapabilityDenied(
                    DenyReason::OutsideBookmark(path.clone()),
                ));
            }

            let mut bookmarks = self.bookmarks.lock();
            let bookmark = bookmarks
                .get_mut(path)
                .filter(|b| b.session == request.session)
                .ok_or_else(|| AuthorityError::CapabilityDenied(DenyReason::NoBookmark(path.clone())))?;

            let identity = self.verify(bookmark, request.capability)?;
            let mut clearance = GateClearance::new(self.name(), request);
            clearance.file = Some(identity);
            Ok(clearance)
        })
    }
}

impl RevocationListener for FileGate {
    fn listener_name(&self) -> &str {
        "file-gate"
    }

    fn on_session_end(&self, session: &SessionId, _reason: &EndReason) {
        let mut bookmarks = self.bookmarks.lock();
        let before = bookmarks.len();
        bookmarks.retain(|_, b| &b.session != session);
        debug!(session = %session, dropped = before - bookmarks.len(), "Bookmarks cleared");
    }
}

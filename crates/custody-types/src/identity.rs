use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Identity of an on-screen window.
///
/// A window number alone can be recycled; equality is over every field.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowIdentity {
    pub pid: u32,
    pub window_number: u64,
    /// Creation time in milliseconds since the epoch, as reported by the window server.
    pub created_at_ms: i64,
    /// Bundle or executable path of the owning process.
    pub owner_path: PathBuf,
}

/// On-disk identity of a file: where it resolves to and what it is.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileIdentity {
    pub canonical_path: PathBuf,
    pub device: u64,
    pub inode: u64,
}

impl FileIdentity {
    /// Resolve symlinks and read device and inode numbers.
    #[cfg(unix)]
    pub fn resolve(path: &Path) -> io::Result<Self> {
        use std::os::unix::fs::MetadataExt;

        let canonical_path = std::fs::canonicalize(path)?;
        let meta = std::fs::metadata(&canonical_path)?;
        Ok(Self {
            canonical_path,
            device: meta.dev(),
            inode: meta.ino(),
        })
    }

    #[cfg(not(unix))]
    pub fn resolve(path: &Path) -> io::Result<Self> {
        let _ = path;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "file identity requires device and inode numbers",
        ))
    }
}

/// Sensitivity of a text field targeted by TEXT_INPUT.
///
/// Ordered from least to most strict so the stricter of two opinions is `max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldClassification {
    Safe,
    Unknown,
    Sensitive,
}

impl FieldClassification {
    pub fn stricter(self, other: Self) -> Self {
        self.max(other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_identity_compares_every_field() {
        let a = WindowIdentity {
            pid: 42,
            window_number: 7,
            created_at_ms: 1_000,
            owner_path: "/Applications/Editor.app".into(),
        };
        let mut b = a.clone();
        assert_eq!(a, b);

        b.created_at_ms += 1;
        assert_ne!(a, b);
    }

    #[test]
    fn stricter_classification_wins() {
        use FieldClassification::*;
        assert_eq!(Safe.stricter(Unknown), Unknown);
        assert_eq!(Sensitive.stricter(Safe), Sensitive);
        assert_eq!(Unknown.stricter(Sensitive), Sensitive);
        assert_eq!(Safe.stricter(Safe), Safe);
    }

    #[cfg(unix)]
    #[test]
    fn file_identity_follows_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real.wav");
        std::fs::write(&target, b"riff").unwrap();
        let link = dir.path().join("link.wav");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let direct = FileIdentity::resolve(&target).unwrap();
        let via_link = FileIdentity::resolve(&link).unwrap();
        assert_eq!(direct, via_link);
    }

    #[cfg(unix)]
    #[test]
    fn replaced_file_gets_new_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        std::fs::write(&path, b"one").unwrap();
        let before = FileIdentity::resolve(&path).unwrap();

        // Keep the old inode alive so the new file cannot reuse it.
        let moved = dir.path().join("a.old");
        std::fs::rename(&path, &moved).unwrap();
        std::fs::write(&path, b"two").unwrap();
        let after = FileIdentity::resolve(&path).unwrap();

        assert_eq!(before.canonical_path, after.canonical_path);
        assert_ne!(before.inode, after.inode);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(FileIdentity::resolve(Path::new("/definitely/not/here.wav")).is_err());
    }
}

//! File identity used to key the loader session

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Name, byte size and modification time of a document file
///
/// Two opens of an unchanged file produce equal identities; touching or
/// rewriting the file produces a new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileIdentity {
    pub name: String,
    pub size: u64,
    pub modified_ms: u64,
}

impl FileIdentity {
    pub fn new(name: impl Into<String>, size: u64, modified_ms: u64) -> Self {
        Self {
            name: name.into(),
            size,
            modified_ms,
        }
    }

    /// Read the identity from file metadata
    pub fn from_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref();
        let metadata = fs::metadata(path)?;
        let modified_ms = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |elapsed| elapsed.as_millis() as u64);
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self::new(name, metadata.len(), modified_ms))
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.name, self.size, self.modified_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_path_reads_name_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.pdf");
        fs::File::create(&path).unwrap().write_all(b"%PDF-1.5 body").unwrap();

        let identity = FileIdentity::from_path(&path).unwrap();
        assert_eq!(identity.name, "scan.pdf");
        assert_eq!(identity.size, 13);
        assert!(identity.modified_ms > 0);
        assert_eq!(identity, FileIdentity::from_path(&path).unwrap());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(FileIdentity::from_path(dir.path().join("missing.pdf")).is_err());
    }

    #[test]
    fn test_any_component_changes_identity() {
        let base = FileIdentity::new("a.pdf", 10, 1000);
        assert_ne!(base, FileIdentity::new("a.pdf", 11, 1000));
        assert_ne!(base, FileIdentity::new("a.pdf", 10, 1001));
        assert_ne!(base, FileIdentity::new("b.pdf", 10, 1000));
        assert_eq!(base.to_string(), "a.pdf:10:1000");
    }
}

use crate::error::StoreError;
use std::fmt;
use std::path::PathBuf;

/// A forward-slash-delimited relative path identifying a symbol file,
/// e.g. `clr.dll/4ba21eeb965000/clr.dll`.
///
/// Keys are compared byte-for-byte. Construction rejects anything that
/// could escape a cache root once the key is used as a relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolKey(String);

impl SymbolKey {
    pub fn new(key: impl Into<String>) -> Result<Self, StoreError> {
        let key = key.into();
        if key.is_empty() {
            return Err(StoreError::InvalidKey("key is empty".to_string()));
        }
        if key.contains('\0') {
            return Err(StoreError::InvalidKey(format!(
                "key {key:?} contains a null byte"
            )));
        }
        if key.contains('\\') {
            return Err(StoreError::InvalidKey(format!(
                "key {key:?} contains a backslash; keys are forward-slash delimited"
            )));
        }
        if key.starts_with('/') {
            return Err(StoreError::InvalidKey(format!("key {key:?} is absolute")));
        }
        if key.as_bytes().get(1) == Some(&b':') {
            return Err(StoreError::InvalidKey(format!(
                "key {key:?} starts with a drive prefix"
            )));
        }
        for segment in key.split('/') {
            if segment.is_empty() {
                return Err(StoreError::InvalidKey(format!(
                    "key {key:?} contains an empty path segment"
                )));
            }
            if segment == ".." {
                return Err(StoreError::InvalidKey(format!(
                    "key {key:?} contains a parent-directory segment"
                )));
            }
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Directory portion of the key; empty when the key has no slash.
    pub fn dir(&self) -> &str {
        self.0.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
    }

    /// Final path segment of the key.
    pub fn file_name(&self) -> &str {
        self.0
            .rsplit_once('/')
            .map(|(_, file)| file)
            .unwrap_or(&self.0)
    }

    /// Relative filesystem path with separators normalized to the platform's.
    pub fn to_rel_path(&self) -> PathBuf {
        self.0.split('/').collect()
    }

    /// The key with its last character replaced by `_`, the compressed-blob
    /// naming convention.
    pub(crate) fn compressed(&self) -> String {
        let mut compressed = self.0.clone();
        compressed.pop();
        compressed.push('_');
        compressed
    }
}

impl fmt::Display for SymbolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn accepts_typical_keys() {
        let key = SymbolKey::new("clr.dll/4ba21eeb965000/clr.dll").unwrap();
        assert_eq!(key.as_str(), "clr.dll/4ba21eeb965000/clr.dll");
        assert_eq!(key.dir(), "clr.dll/4ba21eeb965000");
        assert_eq!(key.file_name(), "clr.dll");
    }

    #[test]
    fn single_segment_key_has_empty_dir() {
        let key = SymbolKey::new("notes.txt").unwrap();
        assert_eq!(key.dir(), "");
        assert_eq!(key.file_name(), "notes.txt");
    }

    #[test]
    fn rejects_traversal_and_absolute_forms() {
        assert!(SymbolKey::new("").is_err());
        assert!(SymbolKey::new("a/../b").is_err());
        assert!(SymbolKey::new("../a/b").is_err());
        assert!(SymbolKey::new("/a/b").is_err());
        assert!(SymbolKey::new("c:/a/b").is_err());
        assert!(SymbolKey::new("a\\b").is_err());
        assert!(SymbolKey::new("a//b").is_err());
        assert!(SymbolKey::new("a/b\0").is_err());
    }

    #[test]
    fn compressed_replaces_last_character() {
        let key = SymbolKey::new("clr.dll/4ba21eeb965000/clr.dll").unwrap();
        assert_eq!(key.compressed(), "clr.dll/4ba21eeb965000/clr.dl_");
    }

    #[test]
    fn rel_path_splits_on_slashes() {
        let key = SymbolKey::new("a/b/c").unwrap();
        let rel_path = key.to_rel_path();
        let path: Vec<_> = rel_path.components().collect();
        assert_eq!(path.len(), 3);
    }
}

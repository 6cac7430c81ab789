//! Data layout and session identity

use std::path::{Path, PathBuf};
use uuid::Uuid;

/// On-disk layout under one data root: `<root>/seeds/` for Seed documents
/// and `<root>/guideline.md` for the active guideline.
#[derive(Debug, Clone)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    /// Default data root, relative to the working directory
    pub const DEFAULT_ROOT: &'static str = "data";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Data root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the Seed documents
    pub fn seeds_dir(&self) -> PathBuf {
        self.root.join("seeds")
    }

    /// Path of the active guideline document
    pub fn guideline_path(&self) -> PathBuf {
        self.root.join("guideline.md")
    }
}

impl Default for DataPaths {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ROOT)
    }
}

/// Fresh session id: a short opaque token, unique enough for one operator's
/// experiment history and prefix-filterable in the seed directory.
pub fn new_session_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_paths_hang_off_root() {
        let paths = DataPaths::new("/tmp/exp");
        assert_eq!(paths.seeds_dir(), PathBuf::from("/tmp/exp/seeds"));
        assert_eq!(paths.guideline_path(), PathBuf::from("/tmp/exp/guideline.md"));
    }

    #[test]
    fn test_session_ids_are_short_and_distinct() {
        let a = new_session_id();
        let b = new_session_id();
        assert_eq!(a.len(), 8);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}

//! Directory layout glue (spec.md §6, §4.11). This module is the only one
//! that knows the shape of `<root>/{logged,unlogged,index,scratch,media}`;
//! everything upstream works in terms of `FileKey`s and scratch-file handles
//! it hands out.

use crate::keys::FileKey;
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

pub struct PathMaster {
    root: PathBuf,
}

impl PathMaster {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        PathMaster { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn logged_dir(&self) -> PathBuf {
        self.root.join("logged")
    }

    pub fn unlogged_dir(&self) -> PathBuf {
        self.root.join("unlogged")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.root.join("index")
    }

    pub fn scratch_dir(&self) -> PathBuf {
        self.root.join("scratch")
    }

    pub fn media_dir(&self) -> PathBuf {
        self.root.join("media")
    }

    /// `<root>/{logged,unlogged}/YYYY/MM/YYYYMMDD.{logged,unlogged}`.
    pub fn log_file_path(&self, key: FileKey) -> PathBuf {
        let (year, month, day, is_logged) = key.expand();
        let (base, ext) = if is_logged { (self.logged_dir(), "logged") } else { (self.unlogged_dir(), "unlogged") };
        base.join(format!("{year:04}"))
            .join(format!("{month:02}"))
            .join(format!("{year:04}{month:02}{day:02}.{ext}"))
    }

    /// Clears and recreates the scratch directory; called once at the start
    /// of every build so a failed build's leftovers don't contaminate the
    /// next one (spec.md §7's "scratch cleared before proceeding").
    pub fn reset_scratch(&self) -> Result<()> {
        let dir = self.scratch_dir();
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;
        Ok(())
    }

    pub fn scratch_file(&self, name: &str) -> PathBuf {
        self.scratch_dir().join(name)
    }

    pub fn ensure_index_dir(&self) -> Result<()> {
        fs::create_dir_all(self.index_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn log_file_path_matches_layout() {
        let pm = PathMaster::new("/corpus");
        let key = FileKey::create(2023, 1, 7, true);
        assert_eq!(pm.log_file_path(key), PathBuf::from("/corpus/logged/2023/01/20230107.logged"));
        let key = FileKey::create(2023, 1, 7, false);
        assert_eq!(pm.log_file_path(key), PathBuf::from("/corpus/unlogged/2023/01/20230107.unlogged"));
    }

    #[test]
    fn reset_scratch_clears_existing_contents() {
        let dir = tempdir().unwrap();
        let pm = PathMaster::new(dir.path());
        pm.reset_scratch().unwrap();
        fs::write(pm.scratch_file("leftover"), b"stale").unwrap();
        pm.reset_scratch().unwrap();
        assert!(!pm.scratch_file("leftover").exists());
    }
}

//! Enumerates the plaintext log tree, validates each filename against the
//! directory structure it lives in, and reduces the result plus a caller's
//! requested key range down to a sorted list of `IntraFileRange`s (spec.md
//! §4.3).

use crate::keys::{FileKey, FilePosition, IntraFileRange, InterFileRange};
use crate::path_master::PathMaster;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;

pub struct LogAnalyzer<'a> {
    path_master: &'a PathMaster,
}

impl<'a> LogAnalyzer<'a> {
    pub fn new(path_master: &'a PathMaster) -> Self {
        LogAnalyzer { path_master }
    }

    /// Enumerates every file under `logged/` and `unlogged/`, clips each to
    /// `range`, and returns the nonempty pieces sorted by `FileKey`.
    pub fn enumerate(&self, range: InterFileRange) -> Result<Vec<IntraFileRange>> {
        let mut out = Vec::new();
        self.collect_partition(&self.path_master.logged_dir(), true, range, &mut out)?;
        self.collect_partition(&self.path_master.unlogged_dir(), false, range, &mut out)?;
        out.sort_by_key(|r| r.file_key);
        Ok(out)
    }

    fn collect_partition(
        &self,
        dir: &Path,
        expect_logged: bool,
        range: InterFileRange,
        out: &mut Vec<IntraFileRange>,
    ) -> Result<()> {
        if !dir.exists() {
            return Ok(());
        }
        for entry in walkdir::WalkDir::new(dir).into_iter() {
            let entry = entry.context("walking log directory")?;
            if !entry.file_type().is_file() {
                continue;
            }
            let (file_key, len) = parse_and_validate(dir, entry.path(), expect_logged)?;
            let full = InterFileRange {
                begin: FilePosition { file_key, position: 0 },
                end: FilePosition { file_key, position: len as u32 },
            };
            let clipped = full.intersect_with(range);
            if !clipped.empty() {
                out.push(IntraFileRange {
                    file_key,
                    begin: clipped.begin.position,
                    end: clipped.end.position,
                });
            }
        }
        Ok(())
    }
}

/// Parses `<dir>/YYYY/MM/YYYYMMDD.{logged|unlogged}`, checking that the
/// filename's own digits agree with the YYYY/MM subdirectories it sits in.
fn parse_and_validate(partition_root: &Path, path: &Path, expect_logged: bool) -> Result<(FileKey, u64)> {
    let expected_ext = if expect_logged { "logged" } else { "unlogged" };
    let bad = || anyhow::anyhow!("BadFilename: {} does not match expected layout", path.display());

    let file_name = path.file_name().and_then(|s| s.to_str()).ok_or_else(bad)?;
    let (stem, ext) = file_name.split_once('.').ok_or_else(bad)?;
    if ext != expected_ext {
        bail!("BadFilename: {} has extension {ext:?}, expected {expected_ext:?}", path.display());
    }
    if stem.len() != 8 || !stem.bytes().all(|b| b.is_ascii_digit()) {
        bail!("BadFilename: {} stem {stem:?} is not YYYYMMDD", path.display());
    }
    let year: u32 = stem[0..4].parse().unwrap();
    let month: u32 = stem[4..6].parse().unwrap();
    let day: u32 = stem[6..8].parse().unwrap();

    let month_dir = path.parent().and_then(|p| p.file_name()).and_then(|s| s.to_str()).ok_or_else(bad)?;
    let year_dir = path
        .parent()
        .and_then(|p| p.parent())
        .and_then(|p| p.file_name())
        .and_then(|s| s.to_str())
        .ok_or_else(bad)?;
    let expected_month = format!("{month:02}");
    let expected_year = format!("{year:04}");
    if month_dir != expected_month || year_dir != expected_year {
        bail!(
            "BadFilename: {} lives under {year_dir}/{month_dir}, but its name says {expected_year}/{expected_month}",
            path.display()
        );
    }
    let _ = partition_root;

    let file_key = FileKey::create(year, month, day, expect_logged);
    let len = fs::metadata(path).with_context(|| format!("stat {}", path.display()))?.len();
    Ok((file_key, len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_log(pm: &PathMaster, year: u32, month: u32, day: u32, is_logged: bool, contents: &[u8]) {
        let path = pm.log_file_path(FileKey::create(year, month, day, is_logged));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn enumerates_all_files_in_range() {
        let dir = tempdir().unwrap();
        let pm = PathMaster::new(dir.path());
        write_log(&pm, 2023, 1, 1, true, b"abcdef");
        write_log(&pm, 2023, 1, 2, false, b"xy");

        let analyzer = LogAnalyzer::new(&pm);
        let mut ranges = analyzer.enumerate(InterFileRange::everything()).unwrap();
        ranges.sort_by_key(|r| r.file_key);
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].end - ranges[0].begin, 6); // 2023-01-01 sorts before 2023-01-02 by date
        assert_eq!(ranges[1].end - ranges[1].begin, 2);
    }

    #[test]
    fn clips_to_requested_range() {
        let dir = tempdir().unwrap();
        let pm = PathMaster::new(dir.path());
        write_log(&pm, 2023, 1, 1, true, b"abcdef");
        write_log(&pm, 2023, 2, 1, true, b"ghijkl");

        let analyzer = LogAnalyzer::new(&pm);
        let range = InterFileRange {
            begin: FilePosition::zero(),
            end: FilePosition { file_key: FileKey::create(2023, 1, 2, false), position: 0 },
        };
        let ranges = analyzer.enumerate(range).unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].file_key, FileKey::create(2023, 1, 1, true));
    }

    #[test]
    fn rejects_filename_directory_mismatch() {
        let dir = tempdir().unwrap();
        let pm = PathMaster::new(dir.path());
        let bad_path = pm.logged_dir().join("2023").join("02").join("20230101.logged");
        fs::create_dir_all(bad_path.parent().unwrap()).unwrap();
        fs::write(&bad_path, b"x").unwrap();

        let analyzer = LogAnalyzer::new(&pm);
        assert!(analyzer.enumerate(InterFileRange::everything()).is_err());
    }
}

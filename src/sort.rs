//! Shells out to the system `sort` to order the schema tuple files, exactly
//! as the source does (spec.md §6's external-sort tool contract). Grounded
//! on `original_source/.../builder/sort_manager.cc` and `common.h`'s
//! separator constants.

use crate::schemas::{SortSpec, FIELD_SEP, RECORD_SEP};
use anyhow::{ensure, Context, Result};
use std::path::Path;
use std::process::Command;

/// Where to find the `sort` binary. Overridable so tests and unusual
/// environments don't depend on `/usr/bin/sort` specifically.
#[derive(Clone)]
pub struct SortTool {
    pub path: String,
}

impl Default for SortTool {
    fn default() -> Self {
        SortTool { path: "/usr/bin/sort".to_string() }
    }
}

/// Extra behaviors layered on top of a schema's key configuration.
#[derive(Clone, Copy, Default)]
pub struct SortOptions {
    pub stable: bool,
    pub unique: bool,
}

impl SortTool {
    /// Sorts `input` by `spec`'s key columns, writing the result to `output`.
    /// Uses `RECORD_SEP`-terminated, `FIELD_SEP`-delimited records and
    /// `LC_ALL=C` so the byte ordering `sort` produces matches the ordering
    /// every downstream tuple-iterator combinator assumes.
    pub fn sort_file(&self, input: &Path, output: &Path, spec: &SortSpec, options: SortOptions) -> Result<()> {
        let child = self.spawn_sort(input, output, spec, options)?;
        join_sort(child, input)
    }

    /// Spawns the sort as a child process without waiting for it to finish,
    /// so several schemas can be sorted concurrently; join with `join_sort`.
    pub fn spawn_sort(
        &self,
        input: &Path,
        output: &Path,
        spec: &SortSpec,
        options: SortOptions,
    ) -> Result<std::process::Child> {
        let mut cmd = Command::new(&self.path);
        cmd.env("LC_ALL", "C");
        cmd.arg("--field-separator").arg(sep_arg(FIELD_SEP));
        cmd.arg("--zero-terminated");
        if options.stable {
            cmd.arg("--stable");
        }
        if options.unique {
            cmd.arg("--unique");
        }
        for key in spec.keys {
            let suffix = if key.numeric { "n" } else { "" };
            cmd.arg(format!("--key={0},{0}{1}", key.column, suffix));
        }
        cmd.arg("--output").arg(output);
        cmd.arg(input);

        cmd.spawn().with_context(|| format!("failed to spawn {} for {}", self.path, input.display()))
    }
}

/// Waits for a child spawned by `spawn_sort` and checks its exit status.
pub fn join_sort(mut child: std::process::Child, input: &Path) -> Result<()> {
    let status = child.wait().with_context(|| format!("waiting on sort of {}", input.display()))?;
    ensure!(status.success(), "sort of {} exited with {status}", input.display());
    ensure!(RECORD_SEP == 0, "sort_file assumes the NUL record separator `sort --zero-terminated` expects");
    Ok(())
}

/// `sort`'s `--field-separator` takes a single character; `FIELD_SEP` (255)
/// isn't representable as a printable argument on every shell, so pass it
/// through as a raw byte via `OsStr`.
fn sep_arg(b: u8) -> std::ffi::OsString {
    use std::os::unix::ffi::OsStringExt;
    std::ffi::OsString::from_vec(vec![b])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::{KeyOptions, ZMOJIS_SORT};
    use std::io::Write;
    use tempfile::tempdir;

    fn write_records(path: &Path, records: &[&str]) {
        let mut f = std::fs::File::create(path).unwrap();
        for r in records {
            f.write_all(r.as_bytes()).unwrap();
            f.write_all(&[RECORD_SEP]).unwrap();
        }
    }

    #[test]
    fn sorts_by_configured_text_key() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        let sep = FIELD_SEP as char;
        write_records(&input, &[&format!("zeta{sep}1"), &format!("alpha{sep}2"), &format!("mid{sep}3")]);

        let tool = SortTool::default();
        tool.sort_file(&input, &output, &ZMOJIS_SORT, SortOptions { stable: true, unique: false })
            .unwrap();

        let contents = std::fs::read(&output).unwrap();
        let text = String::from_utf8(contents).unwrap();
        let records: Vec<&str> = text.split(RECORD_SEP as char).filter(|s| !s.is_empty()).collect();
        assert_eq!(records, vec![format!("alpha{sep}2"), format!("mid{sep}3"), format!("zeta{sep}1")]);
    }

    #[test]
    fn sorts_numerically_when_configured() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        write_records(&input, &["10", "2", "1"]);
        let spec = SortSpec { keys: &[KeyOptions { column: 1, numeric: true }] };

        let tool = SortTool::default();
        tool.sort_file(&input, &output, &spec, SortOptions::default()).unwrap();

        let contents = std::fs::read(&output).unwrap();
        let text = String::from_utf8(contents).unwrap();
        let records: Vec<&str> = text.split(RECORD_SEP as char).filter(|s| !s.is_empty()).collect();
        assert_eq!(records, vec!["1", "2", "10"]);
    }
}

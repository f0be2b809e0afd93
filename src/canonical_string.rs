//! Gathers every string touched by metadata into one sorted, deduplicated
//! pool (spec.md §4.7). Grounded on
//! `original_source/.../builder/canonical_string_processor.cc`; reuses
//! `sort.rs`'s external-sort tool exactly as the five schema files do.

use crate::schemas::{KeyOptions, SortSpec, RECORD_SEP};
use crate::sort::{SortOptions, SortTool};
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

const CANONICAL_STRING_SORT: SortSpec = SortSpec { keys: &[KeyOptions { column: 1, numeric: false }] };

pub struct CanonicalStringProcessor;

impl CanonicalStringProcessor {
    /// Writes every string in `strings` to a scratch file, record-separated,
    /// sorts it with `--unique`, and returns the resulting sorted,
    /// deduplicated list ready for `FrozenStringPool::write_into`.
    pub fn process(
        sort_tool: &SortTool,
        scratch_dir: &Path,
        strings: impl IntoIterator<Item = String>,
    ) -> Result<Vec<String>> {
        let input = scratch_dir.join("canonical_strings.pre");
        let output = scratch_dir.join("canonical_strings.sorted");
        {
            let mut f = fs::File::create(&input).with_context(|| format!("creating {}", input.display()))?;
            for s in strings {
                debug_assert!(!s.as_bytes().contains(&RECORD_SEP), "canonical string contains the record separator");
                f.write_all(s.as_bytes())?;
                f.write_all(&[RECORD_SEP])?;
            }
        }
        sort_tool
            .sort_file(&input, &output, &CANONICAL_STRING_SORT, SortOptions { stable: false, unique: true })
            .context("sorting canonical strings")?;
        let contents = fs::read(&output).with_context(|| format!("reading {}", output.display()))?;
        let text = String::from_utf8(contents).context("canonical string pool is not valid utf-8")?;
        Ok(text.split(RECORD_SEP as char).filter(|s| !s.is_empty()).map(|s| s.to_string()).collect())
    }
}

//! Top-level build orchestration (spec.md §4.10): clear scratch, enumerate
//! and split the logs, digest zgrams per shard, build the canonical string
//! pool, the trie, and the metadata bundle, then write the root
//! `FrozenIndex` and truncate the output file to its real size. Grounded on
//! `original_source/.../builder/index_builder.cc`'s `tryBuild`.

use crate::canonical_string::CanonicalStringProcessor;
use crate::frozen::FrozenStringPool;
use crate::index::stats::BuildStats;
use crate::index::{write_root, FrozenIndex};
use crate::keys::{FileKey, InterFileRange};
use crate::log_analyzer::LogAnalyzer;
use crate::log_splitter::LogSplitter;
use crate::metadata::{MetadataBuilder, MetadataInputs};
use crate::path_master::PathMaster;
use crate::sort::SortTool;
use crate::trie::{build_trie, merge_tokens};
use crate::zgram_digestor::{gather_shards, ZgramDigestor};
use anyhow::{Context, Result};
use clap::Parser;
use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::time::Instant;

/// CLI-facing build configuration (spec.md §4.10, §6).
#[derive(Parser, Debug, Clone)]
pub struct BuildConfig {
    /// Corpus root, holding logged/, unlogged/, index/, scratch/, media/.
    pub root: PathBuf,

    /// Number of parallel shards for the LogSplitter/ZgramDigestor stages.
    #[clap(long, default_value_t = 8)]
    pub shards: usize,

    /// Output path for the frozen index file; defaults to `<root>/index/current.zdex`.
    #[clap(long)]
    pub output: Option<PathBuf>,

    /// Path to the external `sort` binary, overridable for test environments.
    #[clap(long, default_value = "/usr/bin/sort")]
    pub sort_path: String,

    /// Sparse file size to mmap before the real size is known (spec.md §4.1).
    #[clap(long, default_value_t = 100_000_000_000)]
    pub initial_capacity: u64,
}

pub struct Builder {
    config: BuildConfig,
}

impl Builder {
    pub fn new(config: BuildConfig) -> Self {
        Builder { config }
    }

    pub fn build(&self) -> Result<BuildStats> {
        let start = Instant::now();
        let mut stats = BuildStats { shard_count: self.config.shards, ..Default::default() };

        let path_master = PathMaster::new(&self.config.root);
        path_master.reset_scratch().context("clearing scratch directory")?;
        path_master.ensure_index_dir().context("creating index directory")?;

        let analyzer = LogAnalyzer::new(&path_master);
        let ranges = analyzer.enumerate(InterFileRange::everything()).context("enumerating log files")?;
        stats.files_enumerated = ranges.len();
        log::info!("enumerated {} log ranges", ranges.len());

        let sort_tool = SortTool { path: self.config.sort_path.clone() };
        let splitter = LogSplitter::new(&path_master, &sort_tool, self.config.shards);
        let split = splitter.split(&ranges).context("splitting and sorting logs")?;
        log::info!("log splitter produced {} shards", split.shards.len());

        let output_path =
            self.config.output.clone().unwrap_or_else(|| path_master.index_dir().join("current.zdex"));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&output_path)
            .with_context(|| format!("creating output file {}", output_path.display()))?;
        file.set_len(self.config.initial_capacity).context("reserving sparse output file")?;
        let mut mmap = unsafe { MmapMut::map_mut(&file) }.context("mmapping output file")?;
        let mut arena = crate::arena::Arena::new(mmap.as_mut_ptr(), self.config.initial_capacity as usize, 8)?;
        let index_slot = arena.allocate::<FrozenIndex>(1)?;

        let digestor_outputs = std::thread::scope(|scope| {
            let handles: Vec<_> = split
                .shards
                .iter()
                .map(|shard| {
                    scope.spawn(|| ZgramDigestor::digest(&shard.logged, &shard.unlogged, &split.zgram_revisions))
                })
                .collect();
            handles.into_iter().map(|h| h.join().expect("zgram digestor shard worker panicked")).collect::<Result<Vec<_>>>()
        })
        .context("digesting zgram shards")?;
        let gathered = gather_shards(digestor_outputs).context("gathering shard offsets")?;
        stats.zgrams_digested = gathered.zgram_infos.len();
        stats.words_emitted = gathered.word_infos.len();
        log::info!("digested {} zgrams, {} words", stats.zgrams_digested, stats.words_emitted);

        let trie_tokens = merge_tokens(gathered.trie_entries);
        let trie_root = build_trie(&mut arena, &trie_tokens).context("building trie")?;

        let mut canonical_strings = split.metadata_strings();
        canonical_strings.extend(gathered.plus_pluses.iter().map(|(k, _)| k.clone()));
        canonical_strings.extend(gathered.minus_minuses.iter().map(|(k, _)| k.clone()));
        canonical_strings.extend(gathered.plus_plus_keys.iter().map(|(_, k)| k.clone()));
        let sorted_strings =
            CanonicalStringProcessor::process(&sort_tool, &path_master.scratch_dir(), canonical_strings)
                .context("building canonical string pool")?;
        let pool_slot = arena.allocate::<FrozenStringPool>(1)?;
        unsafe { FrozenStringPool::write_into(pool_slot, &mut arena, &sorted_strings) }?;
        let pool = unsafe { &*pool_slot };

        let metadata_inputs = MetadataInputs {
            reactions_by_zgram_id: split.reactions_by_zgram_id,
            reactions_by_reaction: split.reactions_by_reaction,
            zgram_revisions: split.zgram_revisions,
            zgram_refers_tos: split.zgram_refers_tos,
            zmojis: split.zmojis,
            plus_pluses: gathered.plus_pluses,
            minus_minuses: gathered.minus_minuses,
            plus_plus_keys: gathered.plus_plus_keys,
        };
        let metadata_slot =
            MetadataBuilder::build(&mut arena, pool, metadata_inputs).context("building metadata")?;

        let end_key = match ranges.iter().map(|r| r.file_key).max() {
            Some(last) => last.date_and_part_key().try_bump()?.as_either_file_key(true),
            None => FileKey::zero(),
        };

        unsafe {
            write_root(
                index_slot,
                &mut arena,
                end_key,
                &gathered.zgram_infos,
                &gathered.word_infos,
                trie_root,
                pool_slot,
                metadata_slot,
            )
        }
        .context("writing root FrozenIndex")?;

        let final_size = arena.allocated_size() as u64;
        mmap.flush().context("flushing output file")?;
        drop(mmap);
        file.set_len(final_size).context("truncating output file to its real size")?;
        stats.final_size_bytes = final_size;
        stats.elapsed = start.elapsed();
        stats.log_summary();
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use std::io::Write as _;
    use tempfile::tempdir;

    fn write_log(pm: &PathMaster, key: FileKey, lines: &[serde_json::Value]) {
        let path = pm.log_file_path(key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut f = fs::File::create(path).unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
    }

    #[test]
    fn builds_a_tiny_corpus_end_to_end() {
        let dir = tempdir().unwrap();
        let pm = PathMaster::new(dir.path());
        let key = FileKey::create(2023, 1, 1, true);
        write_log(
            &pm,
            key,
            &[
                json!({"kind": "Zephyrgram", "zgramId": 1, "timesecs": 1, "sender": "kosak", "signature": "", "isLogged": true, "instance": "help", "body": "hello world"}),
                json!({"kind": "Reaction", "zgramId": 1, "reaction": "👍", "creator": "alice", "wantAdd": true}),
            ],
        );

        let config = BuildConfig {
            root: dir.path().to_path_buf(),
            shards: 2,
            output: None,
            sort_path: "/usr/bin/sort".to_string(),
            initial_capacity: 16 * 1024 * 1024,
        };
        let stats = Builder::new(config).build().unwrap();
        assert_eq!(stats.zgrams_digested, 1);
        // sender "kosak" + instance "help" + body "hello"/"world" (signature is empty)
        assert_eq!(stats.words_emitted, 4);
        assert!(stats.final_size_bytes > 0);
        assert!(pm.index_dir().join("current.zdex").exists());
    }
}

//! Splits the enumerated log ranges into per-shard zephyrgram streams plus
//! five globally external-sorted metadata schema streams (spec.md §4.4).
//! Zephyrgrams need no external sort: each partition already arrives in
//! strictly increasing ZgramId order, and shards are contiguous,
//! chronologically ordered file-key ranges, so concatenating a shard's
//! files in order already yields a sorted stream. Grounded on
//! `original_source/.../builder/log_splitter.cc`.

use crate::keys::IntraFileRange;
use crate::path_master::PathMaster;
use crate::record::{self, LogRecord};
use crate::schemas::{
    self, ReactionsByReactionTuple, ReactionsByZgramIdTuple, ZephyrgramTuple, ZgramId, ZgramRefersTosTuple,
    ZgramRevisionsTuple, ZmojisRevisionsTuple, RECORD_SEP, REACTIONS_BY_REACTION_SORT, REACTIONS_BY_ZGRAM_ID_SORT,
    ZGRAM_REFERS_TOS_SORT, ZGRAM_REVISIONS_SORT, ZMOJIS_SORT,
};
use crate::sort::{SortOptions, SortTool};
use anyhow::{ensure, Context, Result};
use std::fs;
use std::io::Write;

/// One shard's zephyrgram streams, already in ZgramId order.
pub struct ShardZgrams {
    pub logged: Vec<ZephyrgramTuple>,
    pub unlogged: Vec<ZephyrgramTuple>,
}

pub struct SplitOutput {
    pub shards: Vec<ShardZgrams>,
    pub reactions_by_zgram_id: Vec<ReactionsByZgramIdTuple>,
    pub reactions_by_reaction: Vec<ReactionsByReactionTuple>,
    pub zgram_revisions: Vec<ZgramRevisionsTuple>,
    pub zgram_refers_tos: Vec<ZgramRefersTosTuple>,
    pub zmojis: Vec<ZmojisRevisionsTuple>,
}

impl SplitOutput {
    /// Every distinct string touched by the five metadata schemas, the
    /// input `CanonicalStringProcessor` needs (spec.md §4.7).
    pub fn metadata_strings(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (_, reaction, creator, _) in &self.reactions_by_zgram_id {
            out.push(reaction.clone());
            out.push(creator.clone());
        }
        for (_, instance, body, _) in &self.zgram_revisions {
            out.push(instance.clone());
            out.push(body.clone());
        }
        for (userid, emojis) in &self.zmojis {
            out.push(userid.clone());
            out.push(emojis.clone());
        }
        out
    }
}

struct ShardOutput {
    logged: Vec<ZephyrgramTuple>,
    unlogged: Vec<ZephyrgramTuple>,
    reactions_by_zgram_id: Vec<ReactionsByZgramIdTuple>,
    reactions_by_reaction: Vec<ReactionsByReactionTuple>,
    zgram_revisions: Vec<ZgramRevisionsTuple>,
    zgram_refers_tos: Vec<ZgramRefersTosTuple>,
    zmojis: Vec<ZmojisRevisionsTuple>,
}

pub struct LogSplitter<'a> {
    path_master: &'a PathMaster,
    sort_tool: &'a SortTool,
    shard_count: usize,
}

impl<'a> LogSplitter<'a> {
    pub fn new(path_master: &'a PathMaster, sort_tool: &'a SortTool, shard_count: usize) -> Self {
        LogSplitter { path_master, sort_tool, shard_count: shard_count.max(1) }
    }

    pub fn split(&self, ranges: &[IntraFileRange]) -> Result<SplitOutput> {
        let file_shards: Vec<&[IntraFileRange]> = if ranges.is_empty() {
            Vec::new()
        } else {
            let chunk_size = ranges.len().div_ceil(self.shard_count);
            ranges.chunks(chunk_size.max(1)).collect()
        };

        let mut results: Vec<Result<ShardOutput>> = Vec::with_capacity(file_shards.len());
        std::thread::scope(|scope| {
            let handles: Vec<_> = file_shards.iter().map(|files| scope.spawn(|| self.process_shard(files))).collect();
            results = handles.into_iter().map(|h| h.join().expect("log splitter shard worker panicked")).collect();
        });

        let mut shards = Vec::with_capacity(results.len());
        let mut reactions_by_zgram_id = Vec::new();
        let mut reactions_by_reaction = Vec::new();
        let mut zgram_revisions = Vec::new();
        let mut zgram_refers_tos = Vec::new();
        let mut zmojis = Vec::new();
        for result in results {
            let shard = result?;
            reactions_by_zgram_id.extend(shard.reactions_by_zgram_id);
            reactions_by_reaction.extend(shard.reactions_by_reaction);
            zgram_revisions.extend(shard.zgram_revisions);
            zgram_refers_tos.extend(shard.zgram_refers_tos);
            zmojis.extend(shard.zmojis);
            shards.push(ShardZgrams { logged: shard.logged, unlogged: shard.unlogged });
        }

        // The five schemas sort independently of one another, so their
        // external `sort` subprocesses are spawned together and joined
        // afterward instead of running one at a time.
        let rbz_job = self.spawn_sort(
            &reactions_by_zgram_id,
            schemas::write_reactions_by_zgram_id,
            &REACTIONS_BY_ZGRAM_ID_SORT,
            "reactions_by_zgram_id",
        )?;
        let rbr_job = self.spawn_sort(
            &reactions_by_reaction,
            schemas::write_reactions_by_reaction,
            &REACTIONS_BY_REACTION_SORT,
            "reactions_by_reaction",
        )?;
        let zr_job =
            self.spawn_sort(&zgram_revisions, schemas::write_zgram_revision, &ZGRAM_REVISIONS_SORT, "zgram_revisions")?;
        let zrt_job = self.spawn_sort(
            &zgram_refers_tos,
            schemas::write_zgram_refers_to,
            &ZGRAM_REFERS_TOS_SORT,
            "zgram_refers_tos",
        )?;
        let zm_job = self.spawn_sort(&zmojis, schemas::write_zmojis_revision, &ZMOJIS_SORT, "zmojis")?;

        let reactions_by_zgram_id = rbz_job.join(schemas::parse_reactions_by_zgram_id)?;
        let reactions_by_reaction = rbr_job.join(schemas::parse_reactions_by_reaction)?;
        let zgram_revisions = zr_job.join(schemas::parse_zgram_revision)?;
        let zgram_refers_tos = zrt_job.join(schemas::parse_zgram_refers_to)?;
        let zmojis = zm_job.join(schemas::parse_zmojis_revision)?;

        Ok(SplitOutput { shards, reactions_by_zgram_id, reactions_by_reaction, zgram_revisions, zgram_refers_tos, zmojis })
    }

    fn process_shard(&self, files: &[IntraFileRange]) -> Result<ShardOutput> {
        let mut logged = Vec::new();
        let mut unlogged = Vec::new();
        let mut reactions_by_zgram_id = Vec::new();
        let mut reactions_by_reaction = Vec::new();
        let mut zgram_revisions = Vec::new();
        let mut zgram_refers_tos = Vec::new();
        let mut zmojis = Vec::new();
        let mut last_logged_id: Option<ZgramId> = None;
        let mut last_unlogged_id: Option<ZgramId> = None;

        for range in files {
            let path = self.path_master.log_file_path(range.file_key);
            let bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            let slice = &bytes[range.begin as usize..range.end as usize];

            let mut pos: u32 = 0;
            while pos < slice.len() as u32 {
                let rest = &slice[pos as usize..];
                let newline_idx = rest.iter().position(|&b| b == b'\n');
                let (line_bytes, consumed) = match newline_idx {
                    Some(idx) => (&rest[..idx], idx + 1),
                    None => (rest, rest.len()),
                };
                let line_start = range.begin + pos;
                pos += consumed as u32;
                if line_bytes.iter().all(|b| b.is_ascii_whitespace()) {
                    continue;
                }
                let line = std::str::from_utf8(line_bytes)
                    .with_context(|| format!("{} offset {}: not valid utf-8", path.display(), line_start))?;
                let record = record::parse_line(line)
                    .with_context(|| format!("{} offset {}", path.display(), line_start))?;

                match record {
                    LogRecord::Zephyrgram(z) => {
                        ensure!(
                            z.is_logged == range.file_key.is_logged(),
                            "zgram {} isLogged={} disagrees with file {}",
                            z.zgram_id,
                            z.is_logged,
                            path.display()
                        );
                        let tuple: ZephyrgramTuple = (
                            z.zgram_id,
                            z.timesecs,
                            z.sender,
                            z.signature,
                            z.is_logged,
                            z.instance,
                            z.body,
                            range.file_key,
                            line_start,
                            line_bytes.len() as u32,
                        );
                        if z.is_logged {
                            if let Some(last) = last_logged_id {
                                ensure!(last < z.zgram_id, "logged zgrams out of order at {}", path.display());
                            }
                            last_logged_id = Some(z.zgram_id);
                            logged.push(tuple);
                        } else {
                            if let Some(last) = last_unlogged_id {
                                ensure!(last < z.zgram_id, "unlogged zgrams out of order at {}", path.display());
                            }
                            last_unlogged_id = Some(z.zgram_id);
                            unlogged.push(tuple);
                        }
                    }
                    LogRecord::Reaction(r) => {
                        reactions_by_zgram_id.push((r.zgram_id, r.reaction.clone(), r.creator.clone(), r.want_add));
                        reactions_by_reaction.push((r.reaction, r.zgram_id, r.creator, r.want_add));
                    }
                    LogRecord::ZgramRevision(rv) => {
                        zgram_revisions.push((rv.zgram_id, rv.instance, rv.body, rv.render_style));
                    }
                    LogRecord::ZgramRefersTo(rt) => {
                        zgram_refers_tos.push((rt.zgram_id, rt.refers_to, rt.valid));
                    }
                    LogRecord::Zmojis(zm) => zmojis.push((zm.userid, zm.emojis)),
                }
            }
        }

        Ok(ShardOutput {
            logged,
            unlogged,
            reactions_by_zgram_id,
            reactions_by_reaction,
            zgram_revisions,
            zgram_refers_tos,
            zmojis,
        })
    }

    /// Writes `rows` to a scratch file and spawns the external sort on it
    /// without waiting, so the caller can spawn several of these before
    /// joining any of them.
    fn spawn_sort<T>(
        &self,
        rows: &[T],
        write: fn(&mut Vec<u8>, &T),
        spec: &'static schemas::SortSpec,
        name: &'static str,
    ) -> Result<SortJob<T>> {
        let input = self.path_master.scratch_file(&format!("{name}.pre"));
        let output = self.path_master.scratch_file(&format!("{name}.sorted"));
        {
            let mut f = fs::File::create(&input).with_context(|| format!("creating {}", input.display()))?;
            let mut buf = Vec::new();
            for row in rows {
                buf.clear();
                write(&mut buf, row);
                f.write_all(&buf)?;
                f.write_all(&[RECORD_SEP])?;
            }
        }
        let child = self
            .sort_tool
            .spawn_sort(&input, &output, spec, SortOptions { stable: true, unique: false })
            .with_context(|| format!("spawning sort of {name}"))?;
        Ok(SortJob { child, input, output, name, _marker: std::marker::PhantomData })
    }
}

/// A schema's external sort, already running, waiting to be joined.
struct SortJob<T> {
    child: std::process::Child,
    input: std::path::PathBuf,
    output: std::path::PathBuf,
    name: &'static str,
    _marker: std::marker::PhantomData<T>,
}

impl<T> SortJob<T> {
    fn join(self, parse: fn(&[u8]) -> Result<T>) -> Result<Vec<T>> {
        crate::sort::join_sort(self.child, &self.input).with_context(|| format!("sorting {}", self.name))?;
        let contents = fs::read(&self.output).with_context(|| format!("reading {}", self.output.display()))?;
        contents.split(|&b| b == RECORD_SEP).filter(|s| !s.is_empty()).map(parse).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::FileKey;
    use serde_json::json;
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
    fn splits_zgrams_and_sorts_metadata() {
        let dir = tempdir().unwrap();
        let pm = PathMaster::new(dir.path());
        pm.reset_scratch().unwrap();
        let key = FileKey::create(2023, 1, 1, true);
        write_log(
            &pm,
            key,
            &[
                json!({"kind": "Zephyrgram", "zgramId": 1, "timesecs": 1, "sender": "kosak", "signature": "", "isLogged": true, "instance": "help", "body": "hi"}),
                json!({"kind": "Reaction", "zgramId": 1, "reaction": "👍", "creator": "alice", "wantAdd": true}),
                json!({"kind": "Zephyrgram", "zgramId": 2, "timesecs": 2, "sender": "kosak", "signature": "", "isLogged": true, "instance": "help", "body": "yo"}),
            ],
        );

        let sort_tool = SortTool::default();
        let splitter = LogSplitter::new(&pm, &sort_tool, 2);
        let ranges = vec![IntraFileRange { file_key: key, begin: 0, end: fs::metadata(pm.log_file_path(key)).unwrap().len() as u32 }];
        let out = splitter.split(&ranges).unwrap();

        let logged: Vec<_> = out.shards.iter().flat_map(|s| s.logged.iter()).collect();
        assert_eq!(logged.len(), 2);
        assert_eq!(out.reactions_by_zgram_id.len(), 1);
        assert_eq!(out.reactions_by_zgram_id[0].0, ZgramId(1));
    }

    #[test]
    fn rejects_logged_flag_mismatch() {
        let dir = tempdir().unwrap();
        let pm = PathMaster::new(dir.path());
        pm.reset_scratch().unwrap();
        let key = FileKey::create(2023, 1, 1, true);
        write_log(
            &pm,
            key,
            &[json!({"kind": "Zephyrgram", "zgramId": 1, "timesecs": 1, "sender": "k", "signature": "", "isLogged": false, "instance": "h", "body": "x"})],
        );
        let sort_tool = SortTool::default();
        let splitter = LogSplitter::new(&pm, &sort_tool, 1);
        let ranges = vec![IntraFileRange { file_key: key, begin: 0, end: fs::metadata(pm.log_file_path(key)).unwrap().len() as u32 }];
        assert!(splitter.split(&ranges).is_err());
    }
}

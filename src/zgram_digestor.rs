//! Per-shard zgram digestion (spec.md §4.5): merges a shard's logged and
//! unlogged zephyrgram streams by ZgramId, applies the latest matching
//! revision, tokenizes every field, and emits local-offset ZgramInfo/
//! WordInfo/trie-entry/voting streams. `gather_shards` then prefix-sums
//! each shard's local offsets into the global numbering the frozen index
//! actually stores. Grounded on `original_source/.../builder/zgram_digestor.cc`.

use crate::index::{FieldTag, WordInfo, ZgramInfo};
use crate::keys::LogLocation;
use crate::plusplus;
use crate::schemas::{ZephyrgramTuple, ZgramId, ZgramRevisionsTuple};
use crate::wordsplit::split_words;
use anyhow::{ensure, Result};

/// One shard's digestion output, in shard-local zgramOff/wordOff numbering.
pub struct DigestorOutput {
    pub zgram_infos: Vec<ZgramInfo>,
    pub word_infos: Vec<WordInfo>,
    /// `(token, local wordOff)`, one row per token occurrence.
    pub trie_entries: Vec<(String, u32)>,
    pub plus_pluses: Vec<(String, ZgramId)>,
    pub minus_minuses: Vec<(String, ZgramId)>,
    pub plus_plus_keys: Vec<(ZgramId, String)>,
}

pub struct ZgramDigestor;

impl ZgramDigestor {
    /// `revisions` is the full corpus's ZgramRevisions stream, sorted
    /// (stably) by zgramId; every shard walks it from the start, since the
    /// cursor only ever advances and shards overlap no zgramId with each
    /// other.
    pub fn digest(
        logged: &[ZephyrgramTuple],
        unlogged: &[ZephyrgramTuple],
        revisions: &[ZgramRevisionsTuple],
    ) -> Result<DigestorOutput> {
        let mut out = DigestorOutput {
            zgram_infos: Vec::new(),
            word_infos: Vec::new(),
            trie_entries: Vec::new(),
            plus_pluses: Vec::new(),
            minus_minuses: Vec::new(),
            plus_plus_keys: Vec::new(),
        };

        let mut rev_cursor = 0usize;
        let mut word_off = 0u32;
        let mut li = 0usize;
        let mut ui = 0usize;
        while li < logged.len() || ui < unlogged.len() {
            let take_logged = match (logged.get(li), unlogged.get(ui)) {
                (Some(l), Some(u)) => l.0 <= u.0,
                (Some(_), None) => true,
                _ => false,
            };
            let tuple = if take_logged {
                let t = logged[li].clone();
                li += 1;
                t
            } else {
                let t = unlogged[ui].clone();
                ui += 1;
                t
            };
            let (zgram_id, timesecs, sender, signature, _is_logged, mut instance, mut body, file_key, offset, size) =
                tuple;

            while rev_cursor < revisions.len() && revisions[rev_cursor].0 < zgram_id {
                rev_cursor += 1;
            }
            while rev_cursor < revisions.len() && revisions[rev_cursor].0 == zgram_id {
                instance = revisions[rev_cursor].1.clone();
                body = revisions[rev_cursor].2.clone();
                rev_cursor += 1;
            }

            let first_word_off = word_off;
            let fields = [
                (FieldTag::Sender, sender.as_str()),
                (FieldTag::Signature, signature.as_str()),
                (FieldTag::Instance, instance.as_str()),
                (FieldTag::Body, body.as_str()),
            ];
            let mut lens = [0u32; 4];
            let zgram_off = out.zgram_infos.len() as u32;
            for (i, (tag, text)) in fields.iter().enumerate() {
                let tokens = split_words(text);
                lens[i] = tokens.len() as u32;
                for token in tokens {
                    out.trie_entries.push((token, word_off));
                    out.word_infos.push(WordInfo { zgram_off, field_tag: *tag });
                    word_off += 1;
                }
            }

            out.zgram_infos.push(ZgramInfo {
                timesecs,
                location: LogLocation::new(file_key, offset, size),
                first_word_off,
                zgram_id,
                sender_len: lens[0],
                signature_len: lens[1],
                instance_len: lens[2],
                body_len: lens[3],
            });

            for (key, delta) in plusplus::scan(&body) {
                if delta > 0 {
                    for _ in 0..delta {
                        out.plus_pluses.push((key.clone(), zgram_id));
                    }
                } else if delta < 0 {
                    for _ in 0..(-delta) {
                        out.minus_minuses.push((key.clone(), zgram_id));
                    }
                } else {
                    out.plus_pluses.push((key.clone(), zgram_id));
                    out.minus_minuses.push((key.clone(), zgram_id));
                }
                out.plus_plus_keys.push((zgram_id, key));
            }
        }

        ensure!(
            out.zgram_infos.windows(2).all(|w| w[0].zgram_id < w[1].zgram_id),
            "zgrams out of order within a shard"
        );
        Ok(out)
    }
}

/// The concatenation of every shard's digest, in final global numbering.
pub struct GatheredDigest {
    pub zgram_infos: Vec<ZgramInfo>,
    pub word_infos: Vec<WordInfo>,
    pub trie_entries: Vec<(String, u32)>,
    pub plus_pluses: Vec<(String, ZgramId)>,
    pub minus_minuses: Vec<(String, ZgramId)>,
    pub plus_plus_keys: Vec<(ZgramId, String)>,
}

/// Prefix-sums each shard's local zgramOff/wordOff counters into global
/// offsets and concatenates every stream in shard order (spec.md §4.5's
/// offset-assignment and post-gather checks).
pub fn gather_shards(shards: Vec<DigestorOutput>) -> Result<GatheredDigest> {
    let mut zgram_infos = Vec::new();
    let mut word_infos = Vec::new();
    let mut trie_entries = Vec::new();
    let mut plus_pluses = Vec::new();
    let mut minus_minuses = Vec::new();
    let mut plus_plus_keys = Vec::new();

    let mut zgram_base = 0u32;
    let mut word_base = 0u32;
    for shard in shards {
        let zgram_count = shard.zgram_infos.len() as u32;
        let word_count = shard.word_infos.len() as u32;

        for mut zi in shard.zgram_infos {
            zi.first_word_off += word_base;
            zgram_infos.push(zi);
        }
        for mut wi in shard.word_infos {
            wi.zgram_off += zgram_base;
            word_infos.push(wi);
        }
        for (token, local_off) in shard.trie_entries {
            trie_entries.push((token, local_off + word_base));
        }
        plus_pluses.extend(shard.plus_pluses);
        minus_minuses.extend(shard.minus_minuses);
        plus_plus_keys.extend(shard.plus_plus_keys);

        zgram_base += zgram_count;
        word_base += word_count;
    }

    ensure!(
        zgram_infos.windows(2).all(|w| w[0].zgram_id < w[1].zgram_id),
        "duplicate or out-of-order ZgramId across shards"
    );

    Ok(GatheredDigest { zgram_infos, word_infos, trie_entries, plus_pluses, minus_minuses, plus_plus_keys })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::FileKey;

    fn zg(id: u64, logged: bool, body: &str) -> ZephyrgramTuple {
        (ZgramId(id), 1_700_000_000, "kosak".to_string(), "sig".to_string(), logged, "help".to_string(), body.to_string(), FileKey::create(2023, 1, 1, logged), 0, body.len() as u32)
    }

    #[test]
    fn merges_logged_and_unlogged_by_zgram_id() {
        let logged = vec![zg(1, true, "hello"), zg(3, true, "world")];
        let unlogged = vec![zg(2, false, "between")];
        let out = ZgramDigestor::digest(&logged, &unlogged, &[]).unwrap();
        let ids: Vec<u64> = out.zgram_infos.iter().map(|z| z.zgram_id.raw()).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn latest_revision_overrides_body_and_tokens() {
        let logged = vec![zg(1, true, "original body")];
        let revisions: Vec<ZgramRevisionsTuple> =
            vec![(ZgramId(1), "help".to_string(), "first edit".to_string(), 0), (ZgramId(1), "help".to_string(), "second edit".to_string(), 0)];
        let out = ZgramDigestor::digest(&logged, &[], &revisions).unwrap();
        assert_eq!(out.zgram_infos[0].body_len, 2);
        let tokens: Vec<&str> = out.trie_entries.iter().map(|(t, _)| t.as_str()).collect();
        assert!(tokens.contains(&"second"));
        assert!(!tokens.contains(&"first"));
        assert!(!tokens.contains(&"original"));
    }

    #[test]
    fn plus_plus_nets_expand_to_one_row_per_vote() {
        let logged = vec![zg(9, true, "coffee++ tea++ coffee++")];
        let out = ZgramDigestor::digest(&logged, &[], &[]).unwrap();
        let coffee_votes = out.plus_pluses.iter().filter(|(k, _)| k == "coffee").count();
        assert_eq!(coffee_votes, 2);
        let tea_votes = out.plus_pluses.iter().filter(|(k, _)| k == "tea").count();
        assert_eq!(tea_votes, 1);
        assert_eq!(out.plus_plus_keys.len(), 2);
    }

    #[test]
    fn balanced_vote_writes_both_streams() {
        let logged = vec![zg(9, true, "widget++ widget--")];
        let out = ZgramDigestor::digest(&logged, &[], &[]).unwrap();
        assert_eq!(out.plus_pluses.len(), 1);
        assert_eq!(out.minus_minuses.len(), 1);
    }

    #[test]
    fn rejects_out_of_order_ids_within_shard() {
        let logged = vec![zg(3, true, "a"), zg(1, true, "b")];
        assert!(ZgramDigestor::digest(&logged, &[], &[]).is_err());
    }

    #[test]
    fn gather_shards_prefix_sums_offsets() {
        let shard_a = ZgramDigestor::digest(&[zg(1, true, "one two")], &[], &[]).unwrap();
        let shard_b = ZgramDigestor::digest(&[zg(2, true, "three")], &[], &[]).unwrap();
        let gathered = gather_shards(vec![shard_a, shard_b]).unwrap();
        assert_eq!(gathered.zgram_infos.len(), 2);
        // Each zgram tokenizes sender+signature+instance+body ("kosak","sig","help", ...),
        // so shard_a's one zgram ("one two" body) emits 5 words before shard_b's starts.
        assert_eq!(gathered.zgram_infos[1].first_word_off, 5);
        assert_eq!(gathered.word_infos[2].zgram_off, 0);
        assert_eq!(gathered.trie_entries.iter().find(|(t, _)| t == "three").unwrap().1, 8);
    }

    #[test]
    fn gather_shards_rejects_duplicate_ids_across_shards() {
        let shard_a = ZgramDigestor::digest(&[zg(1, true, "a")], &[], &[]).unwrap();
        let shard_b = ZgramDigestor::digest(&[zg(1, true, "b")], &[], &[]).unwrap();
        assert!(gather_shards(vec![shard_a, shard_b]).is_err());
    }
}

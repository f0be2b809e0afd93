//! Tuple schemas for the pre-sort / sorted intermediate files, and the
//! external-sort key configuration for each one. Grounded on
//! `original_source/.../builder/schemas.h`.

use crate::keys::FileKey;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Record separator used in the internal pre-sort file format (spec.md §6).
pub const RECORD_SEP: u8 = 0;
/// Field separator used in the internal pre-sort file format (spec.md §6).
pub const FIELD_SEP: u8 = 255;
/// Separator between repeated wordOffs within one trie-entry record.
pub const WORD_OFF_SEP: u8 = b';';

/// Monotonically increasing 64-bit opaque zgram identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct ZgramId(pub u64);

impl ZgramId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ZgramId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ZgramId {
    type Err = std::num::ParseIntError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ZgramId(s.parse()?))
    }
}

// --- field codecs -----------------------------------------------------

pub(crate) fn write_bool(out: &mut Vec<u8>, v: bool) {
    out.push(if v { b'T' } else { b'F' });
}

pub(crate) fn parse_bool(s: &str) -> Result<bool> {
    match s {
        "T" => Ok(true),
        "F" => Ok(false),
        other => bail!("expected T/F, got {other:?}"),
    }
}

pub(crate) fn write_str(out: &mut Vec<u8>, v: &str) {
    debug_assert!(!v.bytes().any(|b| b == RECORD_SEP || b == FIELD_SEP));
    out.extend_from_slice(v.as_bytes());
}

/// `FIELD_SEP`/`RECORD_SEP` are raw bytes chosen because they never occur in
/// valid UTF-8 text, so a record can't be decoded as one `&str` -- each field
/// has to be sliced out and decoded on its own.
fn split_fields(record: &[u8]) -> Result<Vec<&str>> {
    record.split(|&b| b == FIELD_SEP).map(|f| std::str::from_utf8(f).context("field is not valid utf-8")).collect()
}

// --- Zephyrgram ---------------------------------------------------------

pub type ZephyrgramTuple =
    (ZgramId, u64, String, String, bool, String, String, FileKey, u32, u32);

pub fn write_zephyrgram(out: &mut Vec<u8>, t: &ZephyrgramTuple) {
    let (id, timesecs, sender, signature, is_logged, instance, body, file_key, offset, size) = t;
    write_str(out, &id.raw().to_string());
    out.push(FIELD_SEP);
    write_str(out, &timesecs.to_string());
    out.push(FIELD_SEP);
    write_str(out, sender);
    out.push(FIELD_SEP);
    write_str(out, signature);
    out.push(FIELD_SEP);
    write_bool(out, *is_logged);
    out.push(FIELD_SEP);
    write_str(out, instance);
    out.push(FIELD_SEP);
    write_str(out, body);
    out.push(FIELD_SEP);
    write_str(out, &file_key.raw().to_string());
    out.push(FIELD_SEP);
    write_str(out, &offset.to_string());
    out.push(FIELD_SEP);
    write_str(out, &size.to_string());
}

pub fn parse_zephyrgram(record: &[u8]) -> Result<ZephyrgramTuple> {
    let f = split_fields(record)?;
    if f.len() != 10 {
        bail!("Zephyrgram tuple expected 10 fields, got {}", f.len());
    }
    Ok((
        ZgramId(f[0].parse().context("zgramId")?),
        f[1].parse().context("timesecs")?,
        f[2].to_string(),
        f[3].to_string(),
        parse_bool(f[4])?,
        f[5].to_string(),
        f[6].to_string(),
        FileKey::from_raw(f[7].parse().context("fileKey")?),
        f[8].parse().context("offset")?,
        f[9].parse().context("size")?,
    ))
}

// --- ReactionsByZgramId --------------------------------------------------

/// (zgramId, reaction, creator, wantAdd)
pub type ReactionsByZgramIdTuple = (ZgramId, String, String, bool);
pub const REACTIONS_BY_ZGRAM_ID_KEY_SIZE: usize = 3;

pub fn write_reactions_by_zgram_id(out: &mut Vec<u8>, t: &ReactionsByZgramIdTuple) {
    let (id, reaction, creator, want_add) = t;
    write_str(out, &id.raw().to_string());
    out.push(FIELD_SEP);
    write_str(out, reaction);
    out.push(FIELD_SEP);
    write_str(out, creator);
    out.push(FIELD_SEP);
    write_bool(out, *want_add);
}

pub fn parse_reactions_by_zgram_id(record: &[u8]) -> Result<ReactionsByZgramIdTuple> {
    let f = split_fields(record)?;
    if f.len() != 4 {
        bail!("ReactionsByZgramId tuple expected 4 fields, got {}", f.len());
    }
    Ok((ZgramId(f[0].parse()?), f[1].to_string(), f[2].to_string(), parse_bool(f[3])?))
}

// --- ReactionsByReaction --------------------------------------------------

/// (reaction, zgramId, creator, wantAdd)
pub type ReactionsByReactionTuple = (String, ZgramId, String, bool);
pub const REACTIONS_BY_REACTION_KEY_SIZE: usize = 3;

pub fn write_reactions_by_reaction(out: &mut Vec<u8>, t: &ReactionsByReactionTuple) {
    let (reaction, id, creator, want_add) = t;
    write_str(out, reaction);
    out.push(FIELD_SEP);
    write_str(out, &id.raw().to_string());
    out.push(FIELD_SEP);
    write_str(out, creator);
    out.push(FIELD_SEP);
    write_bool(out, *want_add);
}

pub fn parse_reactions_by_reaction(record: &[u8]) -> Result<ReactionsByReactionTuple> {
    let f = split_fields(record)?;
    if f.len() != 4 {
        bail!("ReactionsByReaction tuple expected 4 fields, got {}", f.len());
    }
    Ok((f[0].to_string(), ZgramId(f[1].parse()?), f[2].to_string(), parse_bool(f[3])?))
}

// --- ZgramRevisions --------------------------------------------------

/// (zgramId, instance, body, renderStyle)
pub type ZgramRevisionsTuple = (ZgramId, String, String, u32);
pub const ZGRAM_REVISIONS_KEY_SIZE: usize = 1;

pub fn write_zgram_revision(out: &mut Vec<u8>, t: &ZgramRevisionsTuple) {
    let (id, instance, body, render_style) = t;
    write_str(out, &id.raw().to_string());
    out.push(FIELD_SEP);
    write_str(out, instance);
    out.push(FIELD_SEP);
    write_str(out, body);
    out.push(FIELD_SEP);
    write_str(out, &render_style.to_string());
}

pub fn parse_zgram_revision(record: &[u8]) -> Result<ZgramRevisionsTuple> {
    let f = split_fields(record)?;
    if f.len() != 4 {
        bail!("ZgramRevisions tuple expected 4 fields, got {}", f.len());
    }
    Ok((ZgramId(f[0].parse()?), f[1].to_string(), f[2].to_string(), f[3].parse()?))
}

// --- ZgramRefersTos --------------------------------------------------

/// (zgramId, refersTo, valid)
pub type ZgramRefersTosTuple = (ZgramId, ZgramId, bool);
pub const ZGRAM_REFERS_TOS_KEY_SIZE: usize = 2;

pub fn write_zgram_refers_to(out: &mut Vec<u8>, t: &ZgramRefersTosTuple) {
    let (id, refers_to, valid) = t;
    write_str(out, &id.raw().to_string());
    out.push(FIELD_SEP);
    write_str(out, &refers_to.raw().to_string());
    out.push(FIELD_SEP);
    write_bool(out, *valid);
}

pub fn parse_zgram_refers_to(record: &[u8]) -> Result<ZgramRefersTosTuple> {
    let f = split_fields(record)?;
    if f.len() != 3 {
        bail!("ZgramRefersTos tuple expected 3 fields, got {}", f.len());
    }
    Ok((ZgramId(f[0].parse()?), ZgramId(f[1].parse()?), parse_bool(f[2])?))
}

// --- ZmojisRevisions --------------------------------------------------

/// (userid, emojis)
pub type ZmojisRevisionsTuple = (String, String);
pub const ZMOJIS_REVISIONS_KEY_SIZE: usize = 1;

pub fn write_zmojis_revision(out: &mut Vec<u8>, t: &ZmojisRevisionsTuple) {
    let (userid, emojis) = t;
    write_str(out, userid);
    out.push(FIELD_SEP);
    write_str(out, emojis);
}

pub fn parse_zmojis_revision(record: &[u8]) -> Result<ZmojisRevisionsTuple> {
    let f = split_fields(record)?;
    if f.len() != 2 {
        bail!("ZmojisRevisions tuple expected 2 fields, got {}", f.len());
    }
    Ok((f[0].to_string(), f[1].to_string()))
}

// --- external sort key configuration -----------------------------------

/// One `--key=n[n]` column for the external `sort` invocation.
#[derive(Clone, Copy)]
pub struct KeyOptions {
    /// 1-based column index (matches `sort`'s `--field-separator` columns).
    pub column: usize,
    pub numeric: bool,
}

/// Per-schema sort configuration, matching spec.md §4.4's table.
pub struct SortSpec {
    pub keys: &'static [KeyOptions],
}

pub const REACTIONS_BY_ZGRAM_ID_SORT: SortSpec = SortSpec {
    keys: &[
        KeyOptions { column: 1, numeric: true },
        KeyOptions { column: 2, numeric: false },
        KeyOptions { column: 3, numeric: false },
    ],
};

pub const REACTIONS_BY_REACTION_SORT: SortSpec = SortSpec {
    keys: &[
        KeyOptions { column: 1, numeric: false },
        KeyOptions { column: 2, numeric: true },
        KeyOptions { column: 3, numeric: false },
    ],
};

pub const ZGRAM_REVISIONS_SORT: SortSpec = SortSpec { keys: &[KeyOptions { column: 1, numeric: true }] };

pub const ZGRAM_REFERS_TOS_SORT: SortSpec = SortSpec {
    keys: &[KeyOptions { column: 1, numeric: true }, KeyOptions { column: 2, numeric: true }],
};

pub const ZMOJIS_SORT: SortSpec = SortSpec { keys: &[KeyOptions { column: 1, numeric: false }] };

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zephyrgram_roundtrips() {
        let t: ZephyrgramTuple = (
            ZgramId(30),
            1_700_000_000,
            "sender".into(),
            "sig".into(),
            true,
            "instance".into(),
            "hello world".into(),
            FileKey::create(2023, 1, 1, true),
            10,
            42,
        );
        let mut buf = Vec::new();
        write_zephyrgram(&mut buf, &t);
        let parsed = parse_zephyrgram(&buf).unwrap();
        assert_eq!(parsed, t);
    }

    #[test]
    fn reactions_by_zgram_id_roundtrips() {
        let t: ReactionsByZgramIdTuple = (ZgramId(30), "👍".into(), "kosak".into(), true);
        let mut buf = Vec::new();
        write_reactions_by_zgram_id(&mut buf, &t);
        assert_eq!(parse_reactions_by_zgram_id(&buf).unwrap(), t);
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert!(parse_zmojis_revision(b"only_one_field").is_err());
    }

    #[test]
    fn zephyrgram_byte_layout_is_stable() {
        let t: ZephyrgramTuple = (
            ZgramId(30),
            1_700_000_000,
            "sender".into(),
            "sig".into(),
            true,
            "instance".into(),
            "hello world".into(),
            FileKey::create(2023, 1, 1, true),
            10,
            42,
        );
        let mut buf = Vec::new();
        write_zephyrgram(&mut buf, &t);
        let readable: Vec<String> = buf.split(|&b| b == FIELD_SEP).map(|f| String::from_utf8_lossy(f).into_owned()).collect();
        insta::assert_debug_snapshot!(readable);
    }
}

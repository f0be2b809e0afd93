//! JSON wire records read from the plaintext partitioned log files (spec.md
//! §6's input file format). One JSON object per line: a tagged union of
//! `Zephyrgram` and the four `MetadataRecord` variants. Grounded on the
//! source's `reverse_index/builder/schemas.h` field layout; the JSON
//! encoding itself is this crate's own choice (`serde`+`serde_json`, used
//! the way four of the five sibling crates in this pack use it).

use crate::schemas::ZgramId;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum LogRecord {
    Zephyrgram(Zephyrgram),
    Reaction(Reaction),
    ZgramRevision(ZgramRevision),
    ZgramRefersTo(ZgramRefersTo),
    Zmojis(Zmojis),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zephyrgram {
    #[serde(rename = "zgramId")]
    pub zgram_id: ZgramId,
    pub timesecs: u64,
    pub sender: String,
    pub signature: String,
    #[serde(rename = "isLogged")]
    pub is_logged: bool,
    pub instance: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reaction {
    #[serde(rename = "zgramId")]
    pub zgram_id: ZgramId,
    pub reaction: String,
    pub creator: String,
    #[serde(rename = "wantAdd")]
    pub want_add: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZgramRevision {
    #[serde(rename = "zgramId")]
    pub zgram_id: ZgramId,
    pub instance: String,
    pub body: String,
    #[serde(rename = "renderStyle")]
    pub render_style: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZgramRefersTo {
    #[serde(rename = "zgramId")]
    pub zgram_id: ZgramId,
    #[serde(rename = "refersTo")]
    pub refers_to: ZgramId,
    pub valid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zmojis {
    pub userid: String,
    pub emojis: String,
}

/// Parses one non-blank line of a partitioned log file. The caller is
/// responsible for skipping blank lines and attributing the byte offset of
/// a parse failure to its line (spec.md §6).
pub fn parse_line(line: &str) -> Result<LogRecord> {
    serde_json::from_str(line).with_context(|| format!("malformed log record: {line:?}"))
}

//! FileKey and the byte-range types built on top of it.
//!
//! A FileKey identifies one plaintext log file by (year, month, day, logged?),
//! packed into a single u32 so that integer ordering equals chronological
//! ordering with logged > unlogged as a same-day tiebreak. The three phantom
//! variants (Logged, Unlogged, Either) are newtypes rather than a generic
//! parameter, since Rust has no non-type template parameter to mirror the
//! source's `FileKey<Kind>`.

use anyhow::{bail, Result};
use std::cmp::Ordering;
use std::fmt;

fn raw_of(year: u32, month: u32, day: u32, is_logged: bool) -> u32 {
    let mut raw = year;
    raw = raw * 100 + month;
    raw = raw * 100 + day;
    raw = raw * 10 + if is_logged { 1 } else { 0 };
    raw
}

fn expand(raw: u32) -> (u32, u32, u32, bool) {
    let is_logged = raw % 10 == 1;
    let raw = raw / 10;
    let day = raw % 100;
    let raw = raw / 100;
    let month = raw % 100;
    let year = raw / 100;
    (year, month, day, is_logged)
}

/// A FileKey known to be logged (raw is odd).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoggedKey(u32);

/// A FileKey known to be unlogged (raw is even).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnloggedKey(u32);

/// A FileKey whose logged/unlogged status isn't known at the type level.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileKey(u32);

impl LoggedKey {
    pub fn create(year: u32, month: u32, day: u32) -> Result<Self> {
        let raw = raw_of(year, month, day, true);
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: u32) -> Result<Self> {
        if raw.is_multiple_of(2) {
            bail!("LoggedKey raw value {raw} must be odd");
        }
        Ok(Self(raw))
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn expand(self) -> (u32, u32, u32) {
        let (y, m, d, _) = expand(self.0);
        (y, m, d)
    }

    pub fn as_either(self) -> FileKey {
        FileKey(self.0)
    }
}

impl UnloggedKey {
    pub fn create(year: u32, month: u32, day: u32) -> Result<Self> {
        let raw = raw_of(year, month, day, false);
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: u32) -> Result<Self> {
        if !raw.is_multiple_of(2) {
            bail!("UnloggedKey raw value {raw} must be even");
        }
        Ok(Self(raw))
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn expand(self) -> (u32, u32, u32) {
        let (y, m, d, _) = expand(self.0);
        (y, m, d)
    }

    pub fn as_either(self) -> FileKey {
        FileKey(self.0)
    }
}

impl FileKey {
    pub fn create(year: u32, month: u32, day: u32, is_logged: bool) -> Self {
        FileKey(raw_of(year, month, day, is_logged))
    }

    pub fn from_raw(raw: u32) -> Self {
        FileKey(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_logged(self) -> bool {
        self.0 % 2 == 1
    }

    pub fn expand(self) -> (u32, u32, u32, bool) {
        expand(self.0)
    }

    /// Largest representable key: 9999-12-31, logged.
    pub fn infinity() -> Self {
        FileKey::create(9999, 12, 31, true)
    }

    /// Smallest representable key: 0000-00-00, unlogged.
    pub fn zero() -> Self {
        FileKey::create(0, 0, 0, false)
    }

    /// Splits an Either key into the Logged/Unlogged variant it actually is.
    pub fn visit(self) -> Result<LoggedOrUnlogged> {
        if self.is_logged() {
            Ok(LoggedOrUnlogged::Logged(LoggedKey::from_raw(self.0)?))
        } else {
            Ok(LoggedOrUnlogged::Unlogged(UnloggedKey::from_raw(self.0)?))
        }
    }

    /// The day-part (ignoring logged/unlogged) that this key belongs to.
    pub fn date_and_part_key(self) -> DateAndPartKey {
        let (y, m, d, _) = expand(self.0);
        DateAndPartKey { year: y, month: m, day: d }
    }
}

pub enum LoggedOrUnlogged {
    Logged(LoggedKey),
    Unlogged(UnloggedKey),
}

/// A (year, month, day) with no logged/unlogged component, used to compute
/// the watermark key one day past the last included file.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct DateAndPartKey {
    pub year: u32,
    pub month: u32,
    pub day: u32,
}

const DAYS_IN_MONTH: [u32; 12] = [31, 29, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

impl DateAndPartKey {
    /// Advances to the first day of the following day, wrapping month/year as needed.
    /// Uses a fixed Feb=29 table (no leap-year precision needed: this only
    /// produces a watermark used as an exclusive upper bound).
    pub fn try_bump(self) -> Result<DateAndPartKey> {
        if self.month == 0 || self.day == 0 {
            // Degenerate zero key; bump to day 1.
            return Ok(DateAndPartKey { year: self.year, month: 1, day: 1 });
        }
        if self.month > 12 || self.month == 0 {
            bail!("Invalid month {} in DateAndPartKey", self.month);
        }
        let max_day = DAYS_IN_MONTH[(self.month - 1) as usize];
        let mut day = self.day + 1;
        let mut month = self.month;
        let mut year = self.year;
        if day > max_day {
            day = 1;
            month += 1;
            if month > 12 {
                month = 1;
                year += 1;
            }
        }
        Ok(DateAndPartKey { year, month, day })
    }

    pub fn as_either_file_key(self, is_logged: bool) -> FileKey {
        FileKey::create(self.year, self.month, self.day, is_logged)
    }
}

impl fmt::Debug for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (y, m, d, logged) = self.expand();
        write!(f, "FileKey({y:04}-{m:02}-{d:02}, logged={logged})")
    }
}

/// (FileKey, byte-offset, byte-size): identifies a substring of a plaintext
/// file from which a record was parsed. Trivially copyable, used inside the
/// frozen index, so it must have a fixed, `repr(C)` layout.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(C)]
pub struct LogLocation {
    pub file_key: FileKey,
    pub offset: u32,
    pub size: u32,
}

impl LogLocation {
    pub fn new(file_key: FileKey, offset: u32, size: u32) -> Self {
        LogLocation { file_key, offset, size }
    }
}

/// A position within the (conceptually infinite) sequence of plaintext files:
/// (FileKey, byte-offset-within-that-file).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct FilePosition {
    pub file_key: FileKey,
    pub position: u32,
}

impl FilePosition {
    pub fn zero() -> Self {
        FilePosition { file_key: FileKey::zero(), position: 0 }
    }

    pub fn infinity() -> Self {
        FilePosition { file_key: FileKey::infinity(), position: u32::MAX }
    }
}

/// [begin, end) range of FilePositions, possibly spanning several files.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct InterFileRange {
    pub begin: FilePosition,
    pub end: FilePosition,
}

impl InterFileRange {
    pub fn everything() -> Self {
        InterFileRange { begin: FilePosition::zero(), end: FilePosition::infinity() }
    }

    pub fn empty(self) -> bool {
        self.begin == self.end
    }

    pub fn intersect_with(self, other: InterFileRange) -> InterFileRange {
        let new_begin = self.begin.max(other.begin);
        let new_end = self.end.min(other.end);
        if new_end < new_begin {
            InterFileRange { begin: new_begin, end: new_begin }
        } else {
            InterFileRange { begin: new_begin, end: new_end }
        }
    }
}

/// [begin, end) byte range within a single file.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct IntraFileRange {
    pub file_key: FileKey,
    pub begin: u32,
    pub end: u32,
}

impl Ord for LogLocation {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.file_key, self.offset, self.size).cmp(&(other.file_key, other.offset, other.size))
    }
}
impl PartialOrd for LogLocation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_encoding_matches_ordering() {
        let a = FileKey::create(2023, 1, 1, false);
        let b = FileKey::create(2023, 1, 1, true);
        let c = FileKey::create(2023, 1, 2, false);
        assert!(a.raw() < b.raw());
        assert!(b.raw() < c.raw());
        assert!(a < b && b < c);
    }

    #[test]
    fn logged_key_rejects_even_raw() {
        assert!(LoggedKey::from_raw(4).is_err());
        assert!(LoggedKey::from_raw(5).is_ok());
    }

    #[test]
    fn unlogged_key_rejects_odd_raw() {
        assert!(UnloggedKey::from_raw(5).is_err());
        assert!(UnloggedKey::from_raw(4).is_ok());
    }

    #[test]
    fn expand_roundtrips() {
        let k = FileKey::create(2024, 3, 17, true);
        assert_eq!(k.expand(), (2024, 3, 17, true));
    }

    #[test]
    fn bump_rolls_over_month_and_year() {
        let k = DateAndPartKey { year: 2023, month: 12, day: 31 };
        assert_eq!(k.try_bump().unwrap(), DateAndPartKey { year: 2024, month: 1, day: 1 });
    }

    #[test]
    fn intersect_with_computes_max_begin_min_end() {
        let a = InterFileRange {
            begin: FilePosition { file_key: FileKey::create(2023, 1, 1, false), position: 10 },
            end: FilePosition { file_key: FileKey::create(2023, 6, 1, false), position: 0 },
        };
        let b = InterFileRange {
            begin: FilePosition::zero(),
            end: FilePosition { file_key: FileKey::create(2023, 3, 1, false), position: 0 },
        };
        let isect = a.intersect_with(b);
        assert_eq!(isect.begin, a.begin);
        assert_eq!(isect.end, b.end);
        assert!(!isect.empty());
    }

    #[test]
    fn intersect_with_empty_when_disjoint() {
        let a = InterFileRange {
            begin: FilePosition { file_key: FileKey::create(2023, 6, 1, false), position: 0 },
            end: FilePosition::infinity(),
        };
        let b = InterFileRange {
            begin: FilePosition::zero(),
            end: FilePosition { file_key: FileKey::create(2023, 1, 1, false), position: 0 },
        };
        assert!(a.intersect_with(b).empty());
    }
}

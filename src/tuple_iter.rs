//! The tuple-stream combinator algebra (spec.md §4.6), grounded on
//! `original_source/.../builder/tuple_iterators/*.h`. Each combinator is a
//! finite, restartable, single-consumer, pull-based iterator over sorted
//! tuple streams. Rather than the source's template-metaprogrammed
//! column-index dispatch, each combinator that needs to inspect or project
//! part of a tuple takes a plain closure -- the idiomatic Rust way to get
//! the same reusability without a column-indexed template language.

use crate::frozen::FrozenStringPool;
use anyhow::Result;
use std::rc::Rc;

pub trait TupleIterator {
    type Item;
    fn try_get_next(&mut self) -> Result<Option<Self::Item>>;
    fn reset(&mut self) -> Result<()>;
}

/// Parses one record at a time out of an in-memory (mmap'd, in production)
/// byte buffer, using `RECORD_SEP` (spec.md §6) as the delimiter.
pub struct RowIterator<T> {
    data: Rc<str>,
    pos: usize,
    parse: fn(&str) -> Result<T>,
}

impl<T> RowIterator<T> {
    pub fn new(data: Rc<str>, parse: fn(&str) -> Result<T>) -> Self {
        RowIterator { data, pos: 0, parse }
    }
}

impl<T> TupleIterator for RowIterator<T> {
    type Item = T;

    fn try_get_next(&mut self) -> Result<Option<T>> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }
        let rest = &self.data[self.pos..];
        let (record, next_pos) = match rest.find('\0') {
            Some(idx) => (&rest[..idx], self.pos + idx + 1),
            None => (rest, self.data.len()),
        };
        self.pos = next_pos;
        Ok(Some((self.parse)(record)?))
    }

    fn reset(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }
}

/// Emits the last row of each equivalence class under a caller-supplied key.
pub struct LastKeeper<I: TupleIterator> {
    source: I,
    key_eq: fn(&I::Item, &I::Item) -> bool,
    pending: Option<I::Item>,
}

impl<I: TupleIterator> LastKeeper<I>
where
    I::Item: Clone,
{
    pub fn new(mut source: I, key_eq: fn(&I::Item, &I::Item) -> bool) -> Result<Self> {
        let pending = source.try_get_next()?;
        Ok(LastKeeper { source, key_eq, pending })
    }
}

impl<I: TupleIterator> TupleIterator for LastKeeper<I>
where
    I::Item: Clone,
{
    type Item = I::Item;

    fn try_get_next(&mut self) -> Result<Option<I::Item>> {
        let mut current = match self.pending.take() {
            None => return Ok(None),
            Some(v) => v,
        };
        loop {
            match self.source.try_get_next()? {
                None => {
                    self.pending = None;
                    return Ok(Some(current));
                }
                Some(next) => {
                    if (self.key_eq)(&current, &next) {
                        current = next;
                    } else {
                        self.pending = Some(next);
                        return Ok(Some(current));
                    }
                }
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.source.reset()?;
        self.pending = self.source.try_get_next()?;
        Ok(())
    }
}

/// Emits only rows whose caller-supplied flag predicate is true.
pub struct TrueKeeper<I: TupleIterator> {
    source: I,
    flag: fn(&I::Item) -> bool,
}

impl<I: TupleIterator> TrueKeeper<I> {
    pub fn new(source: I, flag: fn(&I::Item) -> bool) -> Self {
        TrueKeeper { source, flag }
    }
}

impl<I: TupleIterator> TupleIterator for TrueKeeper<I> {
    type Item = I::Item;

    fn try_get_next(&mut self) -> Result<Option<I::Item>> {
        loop {
            match self.source.try_get_next()? {
                None => return Ok(None),
                Some(v) => {
                    if (self.flag)(&v) {
                        return Ok(Some(v));
                    }
                }
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.source.reset()
    }
}

/// Collapses a run of equal-key tuples into one, summing a numeric column.
pub struct Accumulator<I: TupleIterator> {
    source: I,
    key_eq: fn(&I::Item, &I::Item) -> bool,
    get_value: fn(&I::Item) -> i64,
    set_value: fn(&mut I::Item, i64),
    pending: Option<I::Item>,
}

impl<I: TupleIterator> Accumulator<I>
where
    I::Item: Clone,
{
    pub fn new(
        mut source: I,
        key_eq: fn(&I::Item, &I::Item) -> bool,
        get_value: fn(&I::Item) -> i64,
        set_value: fn(&mut I::Item, i64),
    ) -> Result<Self> {
        let pending = source.try_get_next()?;
        Ok(Accumulator { source, key_eq, get_value, set_value, pending })
    }
}

impl<I: TupleIterator> TupleIterator for Accumulator<I>
where
    I::Item: Clone,
{
    type Item = I::Item;

    fn try_get_next(&mut self) -> Result<Option<I::Item>> {
        let mut current = match self.pending.take() {
            None => return Ok(None),
            Some(v) => v,
        };
        let mut sum = (self.get_value)(&current);
        loop {
            match self.source.try_get_next()? {
                None => {
                    self.pending = None;
                    (self.set_value)(&mut current, sum);
                    return Ok(Some(current));
                }
                Some(next) => {
                    if (self.key_eq)(&current, &next) {
                        sum += (self.get_value)(&next);
                    } else {
                        (self.set_value)(&mut current, sum);
                        self.pending = Some(next);
                        return Ok(Some(current));
                    }
                }
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.source.reset()?;
        self.pending = self.source.try_get_next()?;
        Ok(())
    }
}

/// Run-length encodes a stream by a caller-supplied key prefix, emitting
/// `(prefix, count)`.
pub struct TupleCounter<I: TupleIterator, P> {
    source: I,
    prefix_of: fn(&I::Item) -> P,
    pending: Option<I::Item>,
}

impl<I: TupleIterator, P: PartialEq> TupleCounter<I, P> {
    pub fn new(mut source: I, prefix_of: fn(&I::Item) -> P) -> Result<Self> {
        let pending = source.try_get_next()?;
        Ok(TupleCounter { source, prefix_of, pending })
    }
}

impl<I: TupleIterator, P: PartialEq> TupleIterator for TupleCounter<I, P> {
    type Item = (P, usize);

    fn try_get_next(&mut self) -> Result<Option<(P, usize)>> {
        let first = match self.pending.take() {
            None => return Ok(None),
            Some(v) => v,
        };
        let key = (self.prefix_of)(&first);
        let mut count = 1usize;
        loop {
            match self.source.try_get_next()? {
                None => {
                    self.pending = None;
                    return Ok(Some((key, count)));
                }
                Some(next) => {
                    if (self.prefix_of)(&next) == key {
                        count += 1;
                    } else {
                        self.pending = Some(next);
                        return Ok(Some((key, count)));
                    }
                }
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.source.reset()?;
        self.pending = self.source.try_get_next()?;
        Ok(())
    }
}

/// Replaces a numeric column with the running sum of that column within the
/// current key-prefix equivalence class; one row out per row in.
pub struct RunningSum<I: TupleIterator> {
    source: I,
    key_eq: fn(&I::Item, &I::Item) -> bool,
    get_value: fn(&I::Item) -> i64,
    set_value: fn(&mut I::Item, i64),
    prev: Option<I::Item>,
    running: i64,
}

impl<I: TupleIterator> RunningSum<I>
where
    I::Item: Clone,
{
    pub fn new(
        source: I,
        key_eq: fn(&I::Item, &I::Item) -> bool,
        get_value: fn(&I::Item) -> i64,
        set_value: fn(&mut I::Item, i64),
    ) -> Self {
        RunningSum { source, key_eq, get_value, set_value, prev: None, running: 0 }
    }
}

impl<I: TupleIterator> TupleIterator for RunningSum<I>
where
    I::Item: Clone,
{
    type Item = I::Item;

    fn try_get_next(&mut self) -> Result<Option<I::Item>> {
        match self.source.try_get_next()? {
            None => Ok(None),
            Some(mut item) => {
                let same_key = self.prev.as_ref().is_some_and(|p| (self.key_eq)(p, &item));
                self.running =
                    if same_key { self.running + (self.get_value)(&item) } else { (self.get_value)(&item) };
                (self.set_value)(&mut item, self.running);
                self.prev = Some(item.clone());
                Ok(Some(item))
            }
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.source.reset()?;
        self.prev = None;
        self.running = 0;
        Ok(())
    }
}

/// Projects each tuple to a caller-supplied prefix.
pub struct PrefixGrabber<I: TupleIterator, P> {
    source: I,
    prefix_of: fn(&I::Item) -> P,
}

impl<I: TupleIterator, P> PrefixGrabber<I, P> {
    pub fn new(source: I, prefix_of: fn(&I::Item) -> P) -> Self {
        PrefixGrabber { source, prefix_of }
    }
}

impl<I: TupleIterator, P> TupleIterator for PrefixGrabber<I, P> {
    type Item = P;

    fn try_get_next(&mut self) -> Result<Option<P>> {
        Ok(self.source.try_get_next()?.map(|t| (self.prefix_of)(&t)))
    }

    fn reset(&mut self) -> Result<()> {
        self.source.reset()
    }
}

/// Looks up each string field in the pool, failing if any lookup misses.
pub struct StringFreezer<'a, I: TupleIterator, O> {
    source: I,
    pool: &'a FrozenStringPool,
    freeze: fn(&I::Item, &FrozenStringPool) -> Result<O>,
}

impl<'a, I: TupleIterator, O> StringFreezer<'a, I, O> {
    pub fn new(source: I, pool: &'a FrozenStringPool, freeze: fn(&I::Item, &FrozenStringPool) -> Result<O>) -> Self {
        StringFreezer { source, pool, freeze }
    }
}

impl<'a, I: TupleIterator, O> TupleIterator for StringFreezer<'a, I, O> {
    type Item = O;

    fn try_get_next(&mut self) -> Result<Option<O>> {
        match self.source.try_get_next()? {
            None => Ok(None),
            Some(t) => Ok(Some((self.freeze)(&t, self.pool)?)),
        }
    }

    fn reset(&mut self) -> Result<()> {
        self.source.reset()
    }
}

/// An in-memory vector wrapped as a `TupleIterator`, used by tests and by
/// any stage that already has its tuples materialized.
pub struct VecIterator<T: Clone> {
    data: Vec<T>,
    pos: usize,
}

impl<T: Clone> VecIterator<T> {
    pub fn new(data: Vec<T>) -> Self {
        VecIterator { data, pos: 0 }
    }
}

impl<T: Clone> TupleIterator for VecIterator<T> {
    type Item = T;

    fn try_get_next(&mut self) -> Result<Option<T>> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }
        let v = self.data[self.pos].clone();
        self.pos += 1;
        Ok(Some(v))
    }

    fn reset(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }
}

/// Drains a `TupleIterator` to completion, collecting every item.
pub fn collect_all<I: TupleIterator>(iter: &mut I) -> Result<Vec<I::Item>> {
    let mut out = Vec::new();
    while let Some(item) = iter.try_get_next()? {
        out.push(item);
    }
    Ok(out)
}

//! Read-only, arena-allocated containers addressed by relative pointers.
//! These are the only containers that may appear inside the frozen output
//! file; they are produced once, by the Inflator, and never mutated again.

use crate::arena::{alloc_slice, Arena, RelativePtr};
use anyhow::Result;
use std::cmp::Ordering;
use std::ptr::addr_of_mut;

/// Contiguous array + length, backed by arena storage.
#[repr(C)]
pub struct FrozenVector<T> {
    ptr: RelativePtr<T>,
    len: u32,
}

impl<T> FrozenVector<T> {
    pub fn as_slice(&self) -> &[T] {
        if self.len == 0 {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(self.ptr.get(), self.len as usize) }
        }
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Writes a FrozenVector at `dest` (which must already be its final
    /// arena address), backed by a freshly arena-allocated copy of `data`.
    ///
    /// # Safety
    /// `dest` must be valid for writes of a `Self`.
    pub unsafe fn write_into(dest: *mut Self, arena: &mut Arena, data: &[T]) -> Result<()>
    where
        T: Clone,
    {
        let backing = alloc_slice(arena, data)?;
        unsafe {
            addr_of_mut!((*dest).ptr).write(RelativePtr::null());
            (*addr_of_mut!((*dest).ptr)).set(backing as *const T);
            addr_of_mut!((*dest).len).write(data.len() as u32);
        }
        Ok(())
    }

    /// Writes a FrozenVector of `len` elements at `dest`, initializing each
    /// backing slot through `write_elem(slot, arena, index)` rather than
    /// cloning pre-built values in. Required whenever `T` itself contains a
    /// `RelativePtr`: such a value can only be constructed directly at its
    /// final arena address, since a later `memcpy` would leave its deltas
    /// pointing at the wrong place.
    ///
    /// # Safety
    /// `dest` must be valid for writes of a `Self`.
    pub unsafe fn write_with<F>(dest: *mut Self, arena: &mut Arena, len: usize, mut write_elem: F) -> Result<()>
    where
        F: FnMut(*mut T, &mut Arena, usize) -> Result<()>,
    {
        let backing = arena.allocate::<T>(len)?;
        for i in 0..len {
            unsafe {
                write_elem(backing.add(i), arena, i)?;
            }
        }
        unsafe {
            addr_of_mut!((*dest).ptr).write(RelativePtr::null());
            (*addr_of_mut!((*dest).ptr)).set(backing as *const T);
            addr_of_mut!((*dest).len).write(len as u32);
        }
        Ok(())
    }

    pub fn new_in_arena(arena: &mut Arena, data: &[T]) -> Result<*mut Self>
    where
        T: Clone,
    {
        let slot = arena.allocate::<Self>(1)?;
        unsafe { Self::write_into(slot, arena, data)? };
        Ok(slot)
    }

    /// Allocates `len` uninitialized backing slots and points `dest` at them,
    /// returning the backing pointer for the caller to fill in directly.
    ///
    /// Needed whenever an element holds a `RelativePtr` to something that
    /// hasn't been allocated yet (e.g. a trie node's children, which must be
    /// frozen after the transitions array reserves its slot so the resulting
    /// pointers stay forward-only). `write_with` can't be used there since it
    /// allocates its backing only once every element is already writable.
    ///
    /// # Safety
    /// `dest` must be valid for writes of a `Self`.
    pub unsafe fn reserve(dest: *mut Self, arena: &mut Arena, len: usize) -> Result<*mut T> {
        let backing = arena.allocate::<T>(len)?;
        unsafe {
            addr_of_mut!((*dest).ptr).write(RelativePtr::null());
            (*addr_of_mut!((*dest).ptr)).set(backing as *const T);
            addr_of_mut!((*dest).len).write(len as u32);
        }
        Ok(backing)
    }
}

impl<T> std::ops::Index<usize> for FrozenVector<T> {
    type Output = T;
    fn index(&self, i: usize) -> &T {
        &self.as_slice()[i]
    }
}

/// Sorted, deduplicated FrozenVector; `contains` is a binary search.
#[repr(transparent)]
pub struct FrozenSet<T>(FrozenVector<T>);

impl<T: Ord> FrozenSet<T> {
    pub fn as_slice(&self) -> &[T] {
        self.0.as_slice()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, value: &T) -> bool {
        self.as_slice().binary_search(value).is_ok()
    }

    /// # Safety
    /// `dest` must be valid for writes of a `Self`.
    pub unsafe fn write_into(dest: *mut Self, arena: &mut Arena, data: &[T]) -> Result<()>
    where
        T: Clone,
    {
        debug_assert!(data.windows(2).all(|w| w[0] < w[1]), "FrozenSet input must be sorted+unique");
        unsafe { FrozenVector::write_into(addr_of_mut!((*dest).0), arena, data) }
    }

    /// # Safety
    /// `dest` must be valid for writes of a `Self`.
    pub unsafe fn write_with<F>(dest: *mut Self, arena: &mut Arena, len: usize, write_elem: F) -> Result<()>
    where
        F: FnMut(*mut T, &mut Arena, usize) -> Result<()>,
    {
        unsafe { FrozenVector::write_with(addr_of_mut!((*dest).0), arena, len, write_elem) }
    }
}

/// Sorted-by-key, unique-by-key FrozenVector<(K,V)>; `try_find` is a binary search.
#[repr(transparent)]
pub struct FrozenMap<K, V>(FrozenVector<(K, V)>);

impl<K: Ord, V> FrozenMap<K, V> {
    pub fn as_slice(&self) -> &[(K, V)] {
        self.0.as_slice()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn try_find(&self, key: &K) -> Option<&V> {
        self.as_slice()
            .binary_search_by(|(k, _)| k.cmp(key))
            .ok()
            .map(|i| &self.as_slice()[i].1)
    }

    /// # Safety
    /// `dest` must be valid for writes of a `Self`.
    pub unsafe fn write_into(dest: *mut Self, arena: &mut Arena, data: &[(K, V)]) -> Result<()>
    where
        K: Clone,
        V: Clone,
    {
        debug_assert!(data.windows(2).all(|w| w[0].0 < w[1].0), "FrozenMap input must be sorted+unique by key");
        unsafe { FrozenVector::write_into(addr_of_mut!((*dest).0), arena, data) }
    }

    /// Like `write_into`, but for maps whose values contain a `RelativePtr`
    /// (nested frozen containers): each `(key, value)` pair is initialized
    /// in place via `write_elem`, never cloned.
    ///
    /// # Safety
    /// `dest` must be valid for writes of a `Self`.
    pub unsafe fn write_with<F>(dest: *mut Self, arena: &mut Arena, len: usize, write_elem: F) -> Result<()>
    where
        F: FnMut(*mut (K, V), &mut Arena, usize) -> Result<()>,
    {
        unsafe { FrozenVector::write_with(addr_of_mut!((*dest).0), arena, len, write_elem) }
    }
}

/// 32-bit index into a FrozenStringPool's deduplicated, sorted string table.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Hash)]
#[repr(transparent)]
pub struct FrozenStringRef(pub u32);

/// `(text blob, end-offsets)`: a sorted, deduplicated pool of strings, one
/// text blob shared by all of them, addressed by a binary-searchable index.
#[repr(C)]
pub struct FrozenStringPool {
    text: RelativePtr<u8>,
    end_offsets: FrozenVector<u32>,
}

impl FrozenStringPool {
    pub fn to_str(&self, r: FrozenStringRef) -> &str {
        let raw = r.0 as usize;
        let offsets = self.end_offsets.as_slice();
        let begin = if raw == 0 { 0 } else { offsets[raw - 1] as usize };
        let end = offsets[raw] as usize;
        let base = self.text.get();
        let bytes = unsafe { std::slice::from_raw_parts(base.add(begin), end - begin) };
        std::str::from_utf8(bytes).expect("frozen string pool contains only utf-8 text")
    }

    pub fn len(&self) -> usize {
        self.end_offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.end_offsets.is_empty()
    }

    /// Binary search for `s`. Mirrors the source's `tryFindHelper`: each
    /// probe recomputes its substring's `[begin, end)` from the parallel
    /// end-offsets array rather than storing begin offsets too.
    pub fn try_find(&self, s: &str) -> Option<FrozenStringRef> {
        let offsets = self.end_offsets.as_slice();
        let mut begin = 0usize;
        let mut end = offsets.len();
        let base = self.text.get();
        while begin != end {
            let mid = (begin + end) / 2;
            let begin_off = if mid == 0 { 0 } else { offsets[mid - 1] as usize };
            let end_off = offsets[mid] as usize;
            let candidate = unsafe {
                std::str::from_utf8_unchecked(std::slice::from_raw_parts(
                    base.add(begin_off),
                    end_off - begin_off,
                ))
            };
            match s.cmp(candidate) {
                Ordering::Equal => return Some(FrozenStringRef(mid as u32)),
                Ordering::Less => end = mid,
                Ordering::Greater => begin = mid + 1,
            }
        }
        None
    }

    /// `strings` must already be sorted and deduplicated.
    ///
    /// # Safety
    /// `dest` must be valid for writes of a `Self`.
    pub unsafe fn write_into(dest: *mut Self, arena: &mut Arena, strings: &[String]) -> Result<()> {
        debug_assert!(strings.windows(2).all(|w| w[0] < w[1]), "string pool input must be sorted+unique");
        let mut text = Vec::new();
        let mut end_offsets = Vec::with_capacity(strings.len());
        for s in strings {
            text.extend_from_slice(s.as_bytes());
            end_offsets.push(text.len() as u32);
        }
        let text_ptr = arena.allocate_bytes(text.len(), 1)?;
        unsafe {
            std::ptr::copy_nonoverlapping(text.as_ptr(), text_ptr, text.len());
            addr_of_mut!((*dest).text).write(RelativePtr::null());
            (*addr_of_mut!((*dest).text)).set(text_ptr as *const u8);
            FrozenVector::write_into(addr_of_mut!((*dest).end_offsets), arena, &end_offsets)
        }
    }
}

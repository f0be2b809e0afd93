//! The frozen index root (spec.md §3): a fixed-size header followed by the
//! zgram table, the word table, the token trie, the canonical string pool,
//! and the metadata bundle. Everything downstream is addressed through
//! `RelativePtr`s so the whole arena can be mmapped at any base address.
//! Grounded on `original_source/.../builder/frozen_index.h`'s header layout.

pub mod stats;

use crate::arena::{Arena, RelativePtr};
use crate::frozen::{FrozenStringPool, FrozenVector};
use crate::keys::{FileKey, LogLocation};
use crate::metadata::FrozenMetadata;
use crate::schemas::ZgramId;
use crate::trie::FrozenTrieNode;
use anyhow::{ensure, Result};
use std::ptr::addr_of_mut;

pub const MAGIC: [u8; 4] = *b"ZDEX";
pub const FORMAT_VERSION: u32 = 1;

/// Which field of a zgram a `WordInfo` token occurrence came from.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum FieldTag {
    Sender = 0,
    Signature = 1,
    Instance = 2,
    Body = 3,
}

/// One zgram's metadata row: its source location, its timestamp, and the
/// span of `WordInfo`s (starting at `first_word_off`) its four fields
/// tokenized into, broken down per field by length.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct ZgramInfo {
    pub timesecs: u64,
    pub location: LogLocation,
    pub first_word_off: u32,
    pub zgram_id: ZgramId,
    pub sender_len: u32,
    pub signature_len: u32,
    pub instance_len: u32,
    pub body_len: u32,
}

/// One token occurrence: which zgram it came from and which field.
#[derive(Clone, Copy, Debug)]
#[repr(C)]
pub struct WordInfo {
    pub zgram_off: u32,
    pub field_tag: FieldTag,
}

/// Root of the frozen, single-file, arena-allocated index. Begins with a
/// fixed header (magic/version/endianness/pointer-width) so a reader can
/// reject an incompatible file before touching any `RelativePtr`.
#[repr(C)]
pub struct FrozenIndex {
    magic: [u8; 4],
    format_version: u32,
    endianness_tag: u8,
    pointer_width_tag: u8,
    _reserved: [u8; 2],
    end_key_after_last_included_file: FileKey,
    zgram_infos: FrozenVector<ZgramInfo>,
    word_infos: FrozenVector<WordInfo>,
    trie: RelativePtr<FrozenTrieNode>,
    string_pool: RelativePtr<FrozenStringPool>,
    metadata: RelativePtr<FrozenMetadata>,
}

impl FrozenIndex {
    pub fn validate_header(&self) -> Result<()> {
        ensure!(self.magic == MAGIC, "not a zdex file: bad magic {:?}", self.magic);
        ensure!(self.format_version == FORMAT_VERSION, "unsupported zdex format version {}", self.format_version);
        ensure!(
            self.pointer_width_tag as usize == std::mem::size_of::<usize>(),
            "zdex file built for a different pointer width"
        );
        Ok(())
    }

    pub fn end_key_after_last_included_file(&self) -> FileKey {
        self.end_key_after_last_included_file
    }

    pub fn zgram_infos(&self) -> &[ZgramInfo] {
        self.zgram_infos.as_slice()
    }

    pub fn word_infos(&self) -> &[WordInfo] {
        self.word_infos.as_slice()
    }

    pub fn trie(&self) -> &FrozenTrieNode {
        self.trie.resolve()
    }

    pub fn string_pool(&self) -> &FrozenStringPool {
        self.string_pool.resolve()
    }

    pub fn metadata(&self) -> &FrozenMetadata {
        self.metadata.resolve()
    }
}

/// Initializes the reserved `FrozenIndex` slot once every sub-structure it
/// references has already been built elsewhere in the arena (spec.md
/// §4.10's final Top-Level Builder step).
///
/// # Safety
/// `dest` must be valid for writes of a `FrozenIndex`.
#[allow(clippy::too_many_arguments)]
pub unsafe fn write_root(
    dest: *mut FrozenIndex,
    arena: &mut Arena,
    end_key: FileKey,
    zgram_infos: &[ZgramInfo],
    word_infos: &[WordInfo],
    trie_root: *mut FrozenTrieNode,
    string_pool: *mut FrozenStringPool,
    metadata: *mut FrozenMetadata,
) -> Result<()> {
    unsafe {
        addr_of_mut!((*dest).magic).write(MAGIC);
        addr_of_mut!((*dest).format_version).write(FORMAT_VERSION);
        addr_of_mut!((*dest).endianness_tag).write(0);
        addr_of_mut!((*dest).pointer_width_tag).write(std::mem::size_of::<usize>() as u8);
        addr_of_mut!((*dest)._reserved).write([0, 0]);
        addr_of_mut!((*dest).end_key_after_last_included_file).write(end_key);
        FrozenVector::write_into(addr_of_mut!((*dest).zgram_infos), arena, zgram_infos)?;
        FrozenVector::write_into(addr_of_mut!((*dest).word_infos), arena, word_infos)?;

        addr_of_mut!((*dest).trie).write(RelativePtr::null());
        (*addr_of_mut!((*dest).trie)).set(trie_root);
        addr_of_mut!((*dest).string_pool).write(RelativePtr::null());
        (*addr_of_mut!((*dest).string_pool)).set(string_pool);
        addr_of_mut!((*dest).metadata).write(RelativePtr::null());
        (*addr_of_mut!((*dest).metadata)).set(metadata);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frozen::FrozenStringPool;
    use crate::metadata::{MetadataBuilder, MetadataInputs};
    use crate::trie::build_trie;

    fn make_arena(capacity: usize) -> (Vec<u8>, Arena) {
        let mut buf = vec![0u8; capacity];
        let ptr = buf.as_mut_ptr();
        (buf, Arena::new(ptr, capacity, 8).unwrap())
    }

    #[test]
    fn writes_and_validates_root_header() {
        let (_buf, mut arena) = make_arena(1 << 16);
        let index_slot = arena.allocate::<FrozenIndex>(1).unwrap();

        let trie_root = build_trie(&mut arena, &[]).unwrap();
        let pool_slot = arena.allocate::<FrozenStringPool>(1).unwrap();
        unsafe { FrozenStringPool::write_into(pool_slot, &mut arena, &[]) }.unwrap();
        let pool = unsafe { &*pool_slot };
        let metadata_slot = MetadataBuilder::build(&mut arena, pool, MetadataInputs::default()).unwrap();

        unsafe { write_root(index_slot, &mut arena, FileKey::zero(), &[], &[], trie_root, pool_slot, metadata_slot) }
            .unwrap();

        let index = unsafe { &*index_slot };
        index.validate_header().unwrap();
        assert!(index.zgram_infos().is_empty());
        assert!(index.word_infos().is_empty());
    }

    #[test]
    fn rejects_wrong_magic() {
        let (_buf, mut arena) = make_arena(4096);
        let slot = arena.allocate::<FrozenIndex>(1).unwrap();
        unsafe {
            addr_of_mut!((*slot).magic).write(*b"NOPE");
            addr_of_mut!((*slot).format_version).write(FORMAT_VERSION);
        }
        let index = unsafe { &*slot };
        assert!(index.validate_header().is_err());
    }
}

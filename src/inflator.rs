//! Materializes nested frozen containers from flat, sorted tuple streams
//! (spec.md §4.6's Inflator). The source precomputes per-level group sizes
//! into a separate `TupleCounts` file so the single-pass C++ stream never
//! needs to buffer tuples; since this builder already holds the sorted rows
//! in memory by the time inflation runs, group sizes are computed directly
//! by scanning for key-prefix boundaries (`itertools::group_by` gives the
//! same grouping the TupleCounts tree would have encoded) and the separate
//! counts file is dropped as an implementation detail that doesn't change
//! the frozen containers produced.

use crate::arena::Arena;
use crate::frozen::{FrozenMap, FrozenSet, FrozenVector};
use anyhow::Result;
use itertools::Itertools;
use std::ptr::addr_of_mut;

/// Groups `rows` (already sorted by `K`) into runs of equal key, writing a
/// `FrozenMap<K, FrozenVector<V>>` at `dest`.
///
/// # Safety
/// `dest` must be valid for writes of a `FrozenMap<K, FrozenVector<V>>`.
pub unsafe fn inflate_map_of_vec<K, V>(dest: *mut FrozenMap<K, FrozenVector<V>>, arena: &mut Arena, rows: &[(K, V)]) -> Result<()>
where
    K: Ord + Copy,
    V: Clone,
{
    let groups: Vec<(K, Vec<V>)> =
        rows.iter().group_by(|(k, _)| *k).into_iter().map(|(k, g)| (k, g.map(|(_, v)| v.clone()).collect())).collect();
    unsafe {
        FrozenMap::write_with(dest, arena, groups.len(), |pair_dest, arena, i| {
            let (k, vs) = &groups[i];
            addr_of_mut!((*pair_dest).0).write(*k);
            FrozenVector::write_into(addr_of_mut!((*pair_dest).1), arena, vs)
        })
    }
}

/// Groups `rows` (sorted by `K`) into runs of equal key, deduplicating the
/// values within each run, writing a `FrozenMap<K, FrozenSet<V>>` at `dest`.
///
/// # Safety
/// `dest` must be valid for writes of a `FrozenMap<K, FrozenSet<V>>`.
pub unsafe fn inflate_map_of_set<K, V>(dest: *mut FrozenMap<K, FrozenSet<V>>, arena: &mut Arena, rows: &[(K, V)]) -> Result<()>
where
    K: Ord + Clone,
    V: Ord + Clone,
{
    let groups: Vec<(K, Vec<V>)> = rows
        .iter()
        .group_by(|(k, _)| k.clone())
        .into_iter()
        .map(|(k, g)| {
            let mut vs: Vec<V> = g.map(|(_, v)| v.clone()).collect();
            vs.sort();
            vs.dedup();
            (k, vs)
        })
        .collect();
    unsafe {
        FrozenMap::write_with(dest, arena, groups.len(), |pair_dest, arena, i| {
            let (k, vs) = &groups[i];
            addr_of_mut!((*pair_dest).0).write(k.clone());
            FrozenSet::write_into(addr_of_mut!((*pair_dest).1), arena, vs)
        })
    }
}

/// Two-level nested grouping for `reactions`: `(zgramId, reaction, creator)`
/// rows, already sorted, become `FrozenMap<ZgramId, FrozenMap<R, FrozenSet<C>>>`.
///
/// # Safety
/// `dest` must be valid for writes of a `FrozenMap<K1, FrozenMap<K2, FrozenSet<V>>>`.
pub unsafe fn inflate_map_of_map_of_set<K1, K2, V>(
    dest: *mut FrozenMap<K1, FrozenMap<K2, FrozenSet<V>>>,
    arena: &mut Arena,
    rows: &[(K1, K2, V)],
) -> Result<()>
where
    K1: Ord + Copy,
    K2: Ord + Clone,
    V: Ord + Clone,
{
    let outer_groups: Vec<(K1, Vec<(K2, V)>)> = rows
        .iter()
        .group_by(|(k1, _, _)| *k1)
        .into_iter()
        .map(|(k1, g)| (k1, g.map(|(_, k2, v)| (k2.clone(), v.clone())).collect()))
        .collect();
    unsafe {
        FrozenMap::write_with(dest, arena, outer_groups.len(), |outer_dest, arena, i| {
            let (k1, inner_rows) = &outer_groups[i];
            addr_of_mut!((*outer_dest).0).write(*k1);
            inflate_map_of_set(addr_of_mut!((*outer_dest).1), arena, inner_rows)
        })
    }
}

/// Two-level nesting where the inner map's values are plain (no
/// `RelativePtr`), as with `reactionCounts: map<reaction, map<ZgramId, count>>`.
///
/// # Safety
/// `dest` must be valid for writes of a `FrozenMap<K1, FrozenMap<K2, V>>`.
pub unsafe fn inflate_map_of_map_plain<K1, K2, V>(
    dest: *mut FrozenMap<K1, FrozenMap<K2, V>>,
    arena: &mut Arena,
    rows: &[(K1, K2, V)],
) -> Result<()>
where
    K1: Ord + Copy,
    K2: Ord + Copy,
    V: Clone,
{
    let groups: Vec<(K1, Vec<(K2, V)>)> = rows
        .iter()
        .group_by(|(k1, _, _)| *k1)
        .into_iter()
        .map(|(k1, g)| (k1, g.map(|(_, k2, v)| (*k2, v.clone())).collect()))
        .collect();
    unsafe {
        FrozenMap::write_with(dest, arena, groups.len(), |outer_dest, arena, i| {
            let (k1, inner) = &groups[i];
            addr_of_mut!((*outer_dest).0).write(*k1);
            FrozenMap::write_into(addr_of_mut!((*outer_dest).1), arena, inner)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;

    fn make_arena(capacity: usize) -> (Vec<u8>, Arena) {
        let mut buf = vec![0u8; capacity];
        let ptr = buf.as_mut_ptr();
        (buf, Arena::new(ptr, capacity, 8).unwrap())
    }

    #[test]
    fn inflate_map_of_vec_groups_by_key() {
        let (_buf, mut arena) = make_arena(4096);
        let rows = vec![(1u32, 10u32), (1, 20), (2, 30)];
        let slot = arena.allocate::<FrozenMap<u32, FrozenVector<u32>>>(1).unwrap();
        unsafe { inflate_map_of_vec(slot, &mut arena, &rows) }.unwrap();
        let fm = unsafe { &*slot };
        assert_eq!(fm.try_find(&1).unwrap().as_slice(), &[10, 20]);
        assert_eq!(fm.try_find(&2).unwrap().as_slice(), &[30]);
    }

    #[test]
    fn inflate_map_of_set_dedups_within_group() {
        let (_buf, mut arena) = make_arena(4096);
        let rows = vec![(1u32, 5u32), (1, 5), (1, 7), (2, 9)];
        let slot = arena.allocate::<FrozenMap<u32, FrozenSet<u32>>>(1).unwrap();
        unsafe { inflate_map_of_set(slot, &mut arena, &rows) }.unwrap();
        let fm = unsafe { &*slot };
        let s1 = fm.try_find(&1).unwrap();
        assert_eq!(s1.len(), 2);
        assert!(s1.contains(&5) && s1.contains(&7));
    }

    #[test]
    fn inflate_three_level_nesting() {
        let (_buf, mut arena) = make_arena(8192);
        // Already sorted by (k1, k2, v), matching the external-sort contract
        // these inflators assume their callers uphold.
        let rows = vec![
            (30u64, "boo".to_string(), "wilhelm".to_string()),
            (30, "yay".to_string(), "kosak".to_string()),
            (30, "yay".to_string(), "simon".to_string()),
            (42, "yay".to_string(), "alice".to_string()),
        ];
        let slot = arena.allocate::<FrozenMap<u64, FrozenMap<String, FrozenSet<String>>>>(1).unwrap();
        unsafe { inflate_map_of_map_of_set(slot, &mut arena, &rows) }.unwrap();
        let fm = unsafe { &*slot };
        let by30 = fm.try_find(&30).unwrap();
        assert!(by30.try_find(&"yay".to_string()).unwrap().contains(&"kosak".to_string()));
        assert!(by30.try_find(&"boo".to_string()).unwrap().contains(&"wilhelm".to_string()));
        assert!(fm.try_find(&42).unwrap().try_find(&"yay".to_string()).unwrap().contains(&"alice".to_string()));
    }
}

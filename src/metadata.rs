//! Per-family inflate pipelines and the `FrozenMetadata` bundle (spec.md
//! §3, §4.9). Grounded on `original_source/.../builder/metadata_builder.cc`'s
//! eight `tryMake*` helpers; each pipeline below mirrors one of them.

use crate::arena::Arena;
use crate::frozen::{FrozenMap, FrozenSet, FrozenStringPool, FrozenStringRef, FrozenVector};
use crate::inflator::{inflate_map_of_map_of_set, inflate_map_of_map_plain, inflate_map_of_set, inflate_map_of_vec};
use crate::schemas::{
    ReactionsByReactionTuple, ReactionsByZgramIdTuple, ZgramId, ZgramRefersTosTuple, ZgramRevisionsTuple,
    ZmojisRevisionsTuple,
};
use crate::tuple_iter::{collect_all, LastKeeper, PrefixGrabber, TrueKeeper, TupleCounter, VecIterator};
use anyhow::{Context, Result};
use std::ptr::addr_of_mut;

#[repr(C)]
pub struct FrozenMetadata {
    reactions: FrozenMap<ZgramId, FrozenMap<FrozenStringRef, FrozenSet<FrozenStringRef>>>,
    reaction_counts: FrozenMap<FrozenStringRef, FrozenMap<ZgramId, u32>>,
    zgram_revisions: FrozenMap<ZgramId, FrozenVector<(FrozenStringRef, FrozenStringRef, u32)>>,
    zgram_refers_to: FrozenMap<ZgramId, FrozenSet<ZgramId>>,
    zmojis: FrozenMap<FrozenStringRef, FrozenStringRef>,
    plus_pluses: FrozenMap<FrozenStringRef, FrozenVector<ZgramId>>,
    minus_minuses: FrozenMap<FrozenStringRef, FrozenVector<ZgramId>>,
    plus_plus_keys: FrozenMap<ZgramId, FrozenVector<FrozenStringRef>>,
}

impl FrozenMetadata {
    pub fn reactions(&self) -> &FrozenMap<ZgramId, FrozenMap<FrozenStringRef, FrozenSet<FrozenStringRef>>> {
        &self.reactions
    }
    pub fn reaction_counts(&self) -> &FrozenMap<FrozenStringRef, FrozenMap<ZgramId, u32>> {
        &self.reaction_counts
    }
    pub fn zgram_revisions(&self) -> &FrozenMap<ZgramId, FrozenVector<(FrozenStringRef, FrozenStringRef, u32)>> {
        &self.zgram_revisions
    }
    pub fn zgram_refers_to(&self) -> &FrozenMap<ZgramId, FrozenSet<ZgramId>> {
        &self.zgram_refers_to
    }
    pub fn zmojis(&self) -> &FrozenMap<FrozenStringRef, FrozenStringRef> {
        &self.zmojis
    }
    pub fn plus_pluses(&self) -> &FrozenMap<FrozenStringRef, FrozenVector<ZgramId>> {
        &self.plus_pluses
    }
    pub fn minus_minuses(&self) -> &FrozenMap<FrozenStringRef, FrozenVector<ZgramId>> {
        &self.minus_minuses
    }
    pub fn plus_plus_keys(&self) -> &FrozenMap<ZgramId, FrozenVector<FrozenStringRef>> {
        &self.plus_plus_keys
    }
}

/// Everything the MetadataBuilder needs, already read from the sorted
/// schema files (§4.4/§4.5 upstream of this stage) in file order.
#[derive(Default)]
pub struct MetadataInputs {
    pub reactions_by_zgram_id: Vec<ReactionsByZgramIdTuple>,
    pub reactions_by_reaction: Vec<ReactionsByReactionTuple>,
    pub zgram_revisions: Vec<ZgramRevisionsTuple>,
    pub zgram_refers_tos: Vec<ZgramRefersTosTuple>,
    pub zmojis: Vec<ZmojisRevisionsTuple>,
    /// `(key, zgramId)`, one row per net plus-plus vote (already expanded
    /// by delta count, including the zero-delta balanced dummy row).
    pub plus_pluses: Vec<(String, ZgramId)>,
    pub minus_minuses: Vec<(String, ZgramId)>,
    /// One row per distinct `(zgramId, key)` touched by a plus-plus scan.
    pub plus_plus_keys: Vec<(ZgramId, String)>,
}

type ZgramRevisionRow = (ZgramId, (FrozenStringRef, FrozenStringRef, u32));

fn freeze(pool: &FrozenStringPool, s: &str) -> Result<FrozenStringRef> {
    pool.try_find(s).with_context(|| format!("string {s:?} missing from frozen pool"))
}

pub struct MetadataBuilder;

impl MetadataBuilder {
    pub fn build(arena: &mut Arena, pool: &FrozenStringPool, inputs: MetadataInputs) -> Result<*mut FrozenMetadata> {
        let dest = arena.allocate::<FrozenMetadata>(1)?;

        let reactions = Self::make_reactions(pool, &inputs.reactions_by_zgram_id)?;
        let reaction_counts = Self::make_reaction_counts(pool, &inputs.reactions_by_reaction)?;
        let zgram_revisions = Self::make_zgram_revisions(pool, &inputs.zgram_revisions)?;
        let zgram_refers_to = Self::make_zgram_refers_to(&inputs.zgram_refers_tos);
        let zmojis = Self::make_zmojis(pool, &inputs.zmojis)?;
        let plus_pluses = Self::make_vote_map(pool, &inputs.plus_pluses)?;
        let minus_minuses = Self::make_vote_map(pool, &inputs.minus_minuses)?;
        let plus_plus_keys = Self::make_plus_plus_keys(pool, &inputs.plus_plus_keys)?;

        unsafe {
            inflate_map_of_map_of_set(addr_of_mut!((*dest).reactions), arena, &reactions)?;
            inflate_map_of_map_plain(addr_of_mut!((*dest).reaction_counts), arena, &reaction_counts)?;
            inflate_map_of_vec(addr_of_mut!((*dest).zgram_revisions), arena, &zgram_revisions)?;
            inflate_map_of_set(addr_of_mut!((*dest).zgram_refers_to), arena, &zgram_refers_to)?;
            FrozenMap::write_into(addr_of_mut!((*dest).zmojis), arena, &zmojis)?;
            inflate_map_of_vec(addr_of_mut!((*dest).plus_pluses), arena, &plus_pluses)?;
            inflate_map_of_vec(addr_of_mut!((*dest).minus_minuses), arena, &minus_minuses)?;
            inflate_map_of_vec(addr_of_mut!((*dest).plus_plus_keys), arena, &plus_plus_keys)?;
        }
        Ok(dest)
    }

    /// `LastKeeper<3> -> TrueKeeper<3> -> PrefixGrabber<3> -> StringFreezer`.
    fn make_reactions(
        pool: &FrozenStringPool,
        rows: &[ReactionsByZgramIdTuple],
    ) -> Result<Vec<(ZgramId, FrozenStringRef, FrozenStringRef)>> {
        let key_eq = |a: &ReactionsByZgramIdTuple, b: &ReactionsByZgramIdTuple| (&a.0, &a.1, &a.2) == (&b.0, &b.1, &b.2);
        let src = VecIterator::new(rows.to_vec());
        let lk = LastKeeper::new(src, key_eq)?;
        let mut tk = TrueKeeper::new(lk, |t: &ReactionsByZgramIdTuple| t.3);
        let kept = collect_all(&mut tk)?;
        kept.into_iter()
            .map(|(id, reaction, creator, _)| Ok((id, freeze(pool, &reaction)?, freeze(pool, &creator)?)))
            .collect()
    }

    /// `LastKeeper<3> -> TrueKeeper<3> -> PrefixGrabber<2> -> TupleCounter<2> -> StringFreezer`.
    fn make_reaction_counts(
        pool: &FrozenStringPool,
        rows: &[ReactionsByReactionTuple],
    ) -> Result<Vec<(FrozenStringRef, ZgramId, u32)>> {
        let key_eq = |a: &ReactionsByReactionTuple, b: &ReactionsByReactionTuple| {
            (&a.0, &a.1, &a.2) == (&b.0, &b.1, &b.2)
        };
        let src = VecIterator::new(rows.to_vec());
        let lk = LastKeeper::new(src, key_eq)?;
        let tk = TrueKeeper::new(lk, |t: &ReactionsByReactionTuple| t.3);
        let mut pg = PrefixGrabber::new(tk, |t: &ReactionsByReactionTuple| (t.0.clone(), t.1));
        let projected = collect_all(&mut pg)?;
        let mut counter = TupleCounter::new(VecIterator::new(projected), |p: &(String, ZgramId)| p.clone())?;
        let counted = collect_all(&mut counter)?;
        counted
            .into_iter()
            .map(|((reaction, id), count)| Ok((freeze(pool, &reaction)?, id, count as u32)))
            .collect()
    }

    /// Plain `RowIterator -> StringFreezer`: every historical revision is kept.
    fn make_zgram_revisions(
        pool: &FrozenStringPool,
        rows: &[ZgramRevisionsTuple],
    ) -> Result<Vec<ZgramRevisionRow>> {
        rows.iter()
            .map(|(id, instance, body, render_style)| {
                Ok((*id, (freeze(pool, instance)?, freeze(pool, body)?, *render_style)))
            })
            .collect()
    }

    /// `LastKeeper<2> -> TrueKeeper<2> -> PrefixGrabber<2>`, no strings.
    fn make_zgram_refers_to(rows: &[ZgramRefersTosTuple]) -> Vec<(ZgramId, ZgramId)> {
        let key_eq = |a: &ZgramRefersTosTuple, b: &ZgramRefersTosTuple| (a.0, a.1) == (b.0, b.1);
        let src = VecIterator::new(rows.to_vec());
        let mut lk = LastKeeper::new(src, key_eq).expect("vec source never fails");
        let kept = collect_all(&mut lk).expect("vec source never fails");
        kept.into_iter().filter(|(_, _, valid)| *valid).map(|(id, refers_to, _)| (id, refers_to)).collect()
    }

    /// `LastKeeper<1> -> StringFreezer`.
    fn make_zmojis(pool: &FrozenStringPool, rows: &[ZmojisRevisionsTuple]) -> Result<Vec<(FrozenStringRef, FrozenStringRef)>> {
        let key_eq = |a: &ZmojisRevisionsTuple, b: &ZmojisRevisionsTuple| a.0 == b.0;
        let src = VecIterator::new(rows.to_vec());
        let mut lk = LastKeeper::new(src, key_eq)?;
        let kept = collect_all(&mut lk)?;
        let mut out: Vec<(FrozenStringRef, FrozenStringRef)> =
            kept.into_iter().map(|(user, emojis)| Ok((freeze(pool, &user)?, freeze(pool, &emojis)?))).collect::<Result<_>>()?;
        out.sort();
        Ok(out)
    }

    /// Plain `StringFreezer`: the digestor already expanded each net delta
    /// into one row per vote, so grouping by key directly yields the count.
    fn make_vote_map(pool: &FrozenStringPool, rows: &[(String, ZgramId)]) -> Result<Vec<(FrozenStringRef, ZgramId)>> {
        let mut out: Vec<(FrozenStringRef, ZgramId)> =
            rows.iter().map(|(key, id)| Ok((freeze(pool, key)?, *id))).collect::<Result<_>>()?;
        out.sort();
        Ok(out)
    }

    fn make_plus_plus_keys(pool: &FrozenStringPool, rows: &[(ZgramId, String)]) -> Result<Vec<(ZgramId, FrozenStringRef)>> {
        let mut out: Vec<(ZgramId, FrozenStringRef)> =
            rows.iter().map(|(id, key)| Ok((*id, freeze(pool, key)?))).collect::<Result<_>>()?;
        out.sort();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_arena(capacity: usize) -> (Vec<u8>, Arena) {
        let mut buf = vec![0u8; capacity];
        let ptr = buf.as_mut_ptr();
        (buf, Arena::new(ptr, capacity, 8).unwrap())
    }

    fn build_pool(arena: &mut Arena, strings: &[&str]) -> *mut FrozenStringPool {
        let mut sorted: Vec<String> = strings.iter().map(|s| s.to_string()).collect();
        sorted.sort();
        sorted.dedup();
        let slot = arena.allocate::<FrozenStringPool>(1).unwrap();
        unsafe { FrozenStringPool::write_into(slot, arena, &sorted) }.unwrap();
        slot
    }

    #[test]
    fn reactions_aggregation_scenario() {
        let (_buf, mut arena) = make_arena(1 << 16);
        let pool_ptr = build_pool(&mut arena, &["☢", "👍", "simon", "kosak", "wilhelm"]);
        let pool = unsafe { &*pool_ptr };

        let rows = vec![
            (ZgramId(30), "☢".to_string(), "simon".to_string(), true),
            (ZgramId(30), "👍".to_string(), "kosak".to_string(), true),
            (ZgramId(30), "👍".to_string(), "wilhelm".to_string(), true),
        ];
        let inputs = MetadataInputs { reactions_by_zgram_id: rows, ..Default::default() };
        let meta_ptr = MetadataBuilder::build(&mut arena, pool, inputs).unwrap();
        let meta = unsafe { &*meta_ptr };

        let by_zgram = meta.reactions().try_find(&ZgramId(30)).unwrap();
        let thumbs = pool.try_find("👍").unwrap();
        let creators = by_zgram.try_find(&thumbs).unwrap();
        assert_eq!(creators.len(), 2);
        assert!(creators.contains(&pool.try_find("kosak").unwrap()));
        assert!(creators.contains(&pool.try_find("wilhelm").unwrap()));
    }

    #[test]
    fn plus_pluses_scenario() {
        let (_buf, mut arena) = make_arena(1 << 16);
        let pool_ptr = build_pool(&mut arena, &["coffee", "tea"]);
        let pool = unsafe { &*pool_ptr };

        let inputs = MetadataInputs {
            plus_pluses: vec![
                ("coffee".to_string(), ZgramId(9)),
                ("coffee".to_string(), ZgramId(9)),
                ("tea".to_string(), ZgramId(9)),
            ],
            plus_plus_keys: vec![(ZgramId(9), "coffee".to_string()), (ZgramId(9), "tea".to_string())],
            ..Default::default()
        };
        let meta_ptr = MetadataBuilder::build(&mut arena, pool, inputs).unwrap();
        let meta = unsafe { &*meta_ptr };

        let coffee_ref = pool.try_find("coffee").unwrap();
        assert_eq!(meta.plus_pluses().try_find(&coffee_ref).unwrap().len(), 2);
        let keys_for_9 = meta.plus_plus_keys().try_find(&ZgramId(9)).unwrap();
        assert_eq!(keys_for_9.len(), 2);
    }
}

//! Patricia-style trie over corpus tokens, keyed by Unicode scalar values
//! (spec.md §4.8). Builder input already sits fully in memory by this
//! stage, so rather than the source's streaming single-active-child
//! algorithm, the trie is built by a direct recursive split over the
//! sorted token list -- same compressed-prefix structure, simpler
//! construction. Freezing then walks that in-memory tree post-order so
//! every child lands at a higher arena address than its parent, which is
//! what lets the parent's `RelativePtr`s point at them.

use crate::arena::{Arena, RelativePtr};
use crate::frozen::{FrozenSet, FrozenVector};
use anyhow::Result;
use std::ptr::addr_of_mut;

#[repr(C)]
pub struct FrozenTrieNode {
    prefix: FrozenVector<u32>,
    words_here: FrozenSet<u32>,
    transitions: FrozenVector<(u32, RelativePtr<FrozenTrieNode>)>,
}

impl FrozenTrieNode {
    pub fn prefix(&self) -> String {
        self.prefix.as_slice().iter().filter_map(|&c| char::from_u32(c)).collect()
    }

    pub fn words_here(&self) -> &[u32] {
        self.words_here.as_slice()
    }

    pub fn find_child(&self, c: char) -> Option<&FrozenTrieNode> {
        let key = c as u32;
        self.transitions
            .as_slice()
            .binary_search_by_key(&key, |(k, _)| *k)
            .ok()
            .map(|i| self.transitions.as_slice()[i].1.resolve())
    }

    /// Walks the trie for `token`, returning the node whose accumulated
    /// prefix exactly equals it, if any.
    pub fn find(&self, token: &str) -> Option<&FrozenTrieNode> {
        let mut node = self;
        let mut remaining: Vec<char> = token.chars().collect();
        loop {
            let prefix: Vec<char> = node.prefix.as_slice().iter().filter_map(|&c| char::from_u32(c)).collect();
            if remaining.len() < prefix.len() || remaining[..prefix.len()] != prefix[..] {
                return None;
            }
            remaining = remaining[prefix.len()..].to_vec();
            if remaining.is_empty() {
                return Some(node);
            }
            node = node.find_child(remaining[0])?;
            remaining = remaining[1..].to_vec();
        }
    }
}

/// Groups globalized `(token, wordOff)` pairs into one sorted, deduplicated
/// `wordOff` list per distinct token, sorted lexicographically by token.
pub fn merge_tokens(mut entries: Vec<(String, u32)>) -> Vec<(String, Vec<u32>)> {
    entries.sort();
    let mut out: Vec<(String, Vec<u32>)> = Vec::new();
    for (token, word_off) in entries {
        match out.last_mut() {
            Some((last_token, word_offs)) if *last_token == token => word_offs.push(word_off),
            _ => out.push((token, vec![word_off])),
        }
    }
    for (_, word_offs) in &mut out {
        word_offs.sort();
        word_offs.dedup();
    }
    out
}

struct BuilderNode {
    prefix: Vec<char>,
    words_here: Vec<u32>,
    children: Vec<(char, BuilderNode)>,
}

fn common_prefix(entries: &[(Vec<char>, Vec<u32>)]) -> Vec<char> {
    if entries.is_empty() {
        return Vec::new();
    }
    let first = &entries[0].0;
    let last = &entries[entries.len() - 1].0;
    let mut n = 0;
    while n < first.len() && n < last.len() && first[n] == last[n] {
        n += 1;
    }
    first[..n].to_vec()
}

fn build_node(entries: Vec<(Vec<char>, Vec<u32>)>) -> BuilderNode {
    let mut words_here: Vec<u32> = entries.iter().filter(|(s, _)| s.is_empty()).flat_map(|(_, w)| w.clone()).collect();
    words_here.sort();
    words_here.dedup();

    let rest: Vec<(Vec<char>, Vec<u32>)> = entries.into_iter().filter(|(s, _)| !s.is_empty()).collect();
    let prefix = common_prefix(&rest);
    let stripped: Vec<(Vec<char>, Vec<u32>)> =
        rest.into_iter().map(|(s, w)| (s[prefix.len()..].to_vec(), w)).collect();

    // Stripping the shared prefix can leave an entry with nothing left (its
    // token equaled the prefix exactly); that entry terminates at this node.
    let mut here_extra: Vec<u32> =
        stripped.iter().filter(|(s, _)| s.is_empty()).flat_map(|(_, w)| w.clone()).collect();
    words_here.append(&mut here_extra);
    words_here.sort();
    words_here.dedup();
    let stripped: Vec<(Vec<char>, Vec<u32>)> = stripped.into_iter().filter(|(s, _)| !s.is_empty()).collect();

    let mut children: Vec<(char, BuilderNode)> = Vec::new();
    let mut i = 0;
    while i < stripped.len() {
        let first_char = stripped[i].0[0];
        let mut j = i;
        while j < stripped.len() && stripped[j].0[0] == first_char {
            j += 1;
        }
        let group: Vec<(Vec<char>, Vec<u32>)> =
            stripped[i..j].iter().map(|(s, w)| (s[1..].to_vec(), w.clone())).collect();
        children.push((first_char, build_node(group)));
        i = j;
    }

    BuilderNode { prefix, words_here, children }
}

fn freeze_node(arena: &mut Arena, node: &BuilderNode) -> Result<*mut FrozenTrieNode> {
    let dest = arena.allocate::<FrozenTrieNode>(1)?;

    let prefix_codes: Vec<u32> = node.prefix.iter().map(|&c| c as u32).collect();
    unsafe {
        FrozenVector::write_into(addr_of_mut!((*dest).prefix), arena, &prefix_codes)?;
        FrozenSet::write_into(addr_of_mut!((*dest).words_here), arena, &node.words_here)?;
    }

    // The transitions backing must reserve its slot before any child is
    // frozen, so each slot's RelativePtr lands at a lower arena address than
    // the child node it ends up pointing to (RelativePtr is forward-only).
    let transitions_backing =
        unsafe { FrozenVector::reserve(addr_of_mut!((*dest).transitions), arena, node.children.len())? };
    for (i, (c, child)) in node.children.iter().enumerate() {
        let ptr = freeze_node(arena, child)?;
        unsafe {
            let slot = transitions_backing.add(i);
            addr_of_mut!((*slot).0).write(*c as u32);
            addr_of_mut!((*slot).1).write(RelativePtr::null());
            (*addr_of_mut!((*slot).1)).set(ptr as *const FrozenTrieNode);
        }
    }
    Ok(dest)
}

/// Builds a frozen trie from every distinct token and its merged, global
/// `wordOff`s, sorted lexicographically.
pub fn build_trie(arena: &mut Arena, tokens: &[(String, Vec<u32>)]) -> Result<*mut FrozenTrieNode> {
    let entries: Vec<(Vec<char>, Vec<u32>)> =
        tokens.iter().map(|(s, ws)| (s.chars().collect(), ws.clone())).collect();
    freeze_node(arena, &build_node(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_arena(capacity: usize) -> (Vec<u8>, Arena) {
        let mut buf = vec![0u8; capacity];
        let ptr = buf.as_mut_ptr();
        (buf, Arena::new(ptr, capacity, 8).unwrap())
    }

    #[test]
    fn merge_tokens_groups_and_dedups() {
        let merged = merge_tokens(vec![
            ("kosak".into(), 3),
            ("kos".into(), 1),
            ("kosak".into(), 2),
            ("kosak".into(), 2),
        ]);
        assert_eq!(merged, vec![("kos".to_string(), vec![1]), ("kosak".to_string(), vec![2, 3])]);
    }

    #[test]
    fn trie_finds_exact_tokens_with_shared_prefix() {
        let (_buf, mut arena) = make_arena(16384);
        let tokens = vec![
            ("kos".to_string(), vec![1]),
            ("kosak".to_string(), vec![2]),
            ("kosh".to_string(), vec![3]),
        ];
        let root = build_trie(&mut arena, &tokens).unwrap();
        let root = unsafe { &*root };
        assert_eq!(root.find("kos").unwrap().words_here(), &[1]);
        assert_eq!(root.find("kosak").unwrap().words_here(), &[2]);
        assert_eq!(root.find("kosh").unwrap().words_here(), &[3]);
        assert!(root.find("k").is_none());
        assert!(root.find("kosmic").is_none());
    }

    #[test]
    fn empty_corpus_yields_a_rootless_leaf() {
        let (_buf, mut arena) = make_arena(256);
        let root = build_trie(&mut arena, &[]).unwrap();
        let root = unsafe { &*root };
        assert!(root.words_here().is_empty());
        assert!(root.find("anything").is_none());
    }

    #[test]
    fn single_token_compresses_into_one_node() {
        let (_buf, mut arena) = make_arena(4096);
        let root = build_trie(&mut arena, &[("hello".to_string(), vec![7])]).unwrap();
        let root = unsafe { &*root };
        assert_eq!(root.prefix(), "hello");
        assert_eq!(root.words_here(), &[7]);
    }
}

/* This file is part of obf.
 *
 * obf is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as
 * published by the Free Software Foundation, either version 3 of the
 * License, or (at your option) any later version.
 *
 * obf is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with obf.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Sparse binary Merkle tree keyed by generalized index.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::{
    error::{Error, Result},
    hasher::{depth_of, hash_pair, zero_hash, Node},
};

/// A sparse Merkle tree over generalized indices.
///
/// In its ordinary form (`restrict: None`) this is the prover's full view of
/// the world state: any gindex may be read or written. When constructed with
/// [`BinaryMerkleTree::from_witness`] it instead only answers `get`/`set` for
/// gindices present in the supplied witness, rejecting everything else with
/// [`Error::InsufficientWitness`] — this is what the step verifier uses to
/// guarantee it never touches un-witnessed state.
#[derive(Debug, Default, Clone)]
pub struct BinaryMerkleTree {
    nodes: HashMap<u64, Node>,
    restrict: Option<HashSet<u64>>,
}

impl BinaryMerkleTree {
    pub fn new() -> Self {
        Self { nodes: HashMap::new(), restrict: None }
    }

    /// Build a tree whose storage is exactly `node_by_gindex`, rejecting any
    /// access outside it.
    pub fn from_witness(node_by_gindex: HashMap<u64, Node>) -> Self {
        let restrict = node_by_gindex.keys().copied().collect();
        Self { nodes: node_by_gindex, restrict: Some(restrict) }
    }

    fn raw(&self, gindex: u64) -> Node {
        *self.nodes.get(&gindex).unwrap_or(&zero_hash(depth_of(gindex)))
    }

    fn check(&self, gindex: u64) -> Result<()> {
        if let Some(allowed) = &self.restrict {
            if !allowed.contains(&gindex) {
                return Err(Error::InsufficientWitness(gindex));
            }
        }
        Ok(())
    }

    pub fn get(&self, gindex: u64) -> Result<Node> {
        self.check(gindex)?;
        Ok(self.raw(gindex))
    }

    /// Write `value` at `gindex` and recompute every ancestor hash up to the
    /// root. The ancestor recomputation itself only reads sibling nodes
    /// (never the ancestor's own prior value, which it is about to replace),
    /// so only sibling gindices need to be present in a restricted tree.
    pub fn set(&mut self, gindex: u64, value: Node) -> Result<()> {
        self.check(gindex)?;
        self.nodes.insert(gindex, value);

        let mut cur = gindex;
        while cur > 1 {
            let sibling = cur ^ 1;
            let sibling_val = self.get(sibling)?;
            let cur_val = self.raw(cur);
            let (left, right) = if cur & 1 == 0 { (cur_val, sibling_val) } else { (sibling_val, cur_val) };
            cur >>= 1;
            self.nodes.insert(cur, hash_pair(&left, &right));
        }
        Ok(())
    }

    pub fn root(&self) -> Result<Node> {
        self.get(1)
    }

    /// The minimal set of nodes sufficient to recompute the root and answer
    /// `get` for every gindex in `gs`: each gindex itself, plus its sibling
    /// and every ancestor (including the root) along the path up. Ancestors
    /// are included, not just siblings, so a tree rebuilt from this map can
    /// answer `root()` without replaying any writes first.
    pub fn multiproof(&self, gs: &BTreeSet<u64>) -> HashMap<u64, Node> {
        let mut out = HashMap::new();
        for &g in gs {
            let mut cur = g;
            out.entry(cur).or_insert_with(|| self.raw(cur));
            while cur > 1 {
                let sibling = cur ^ 1;
                out.entry(sibling).or_insert_with(|| self.raw(sibling));
                cur >>= 1;
                out.entry(cur).or_insert_with(|| self.raw(cur));
            }
        }
        out
    }

    /// Verify that `proof` suffices to recompute `root` and to answer
    /// `get(g)` for every `g` in `gs` with the value recorded in `proof`.
    pub fn verify_multiproof(proof: &HashMap<u64, Node>, gs: &BTreeSet<u64>, root: Node) -> bool {
        let tree = BinaryMerkleTree::from_witness(proof.clone());
        if tree.root() != Ok(root) {
            return false;
        }
        gs.iter().all(|g| tree.get(*g).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let mut bmt = BinaryMerkleTree::new();
        let gindex = crate::layout::scalar_leaf(0, crate::layout::field::PTR);
        let mut leaf = [0u8; 32];
        leaf[0] = 42;
        bmt.set(gindex, leaf).unwrap();
        assert_eq!(bmt.get(gindex).unwrap(), leaf);
    }

    #[test]
    fn multiproof_round_trips_through_verify() {
        let mut bmt = BinaryMerkleTree::new();
        let g1 = crate::layout::scalar_leaf(1, crate::layout::field::PTR);
        let g2 = crate::layout::scalar_leaf(7, crate::layout::field::GAS);
        bmt.set(g1, [9u8; 32]).unwrap();
        bmt.set(g2, [7u8; 32]).unwrap();

        let gs: BTreeSet<u64> = [g1, g2].into_iter().collect();
        let proof = bmt.multiproof(&gs);
        assert!(BinaryMerkleTree::verify_multiproof(&proof, &gs, bmt.root().unwrap()));
    }

    #[test]
    fn restricted_tree_rejects_unwitnessed_access() {
        let mut bmt = BinaryMerkleTree::new();
        let g1 = crate::layout::scalar_leaf(2, crate::layout::field::STATUS);
        let g2 = crate::layout::scalar_leaf(2, crate::layout::field::GAS);
        bmt.set(g1, [1u8; 32]).unwrap();

        let gs: BTreeSet<u64> = [g1].into_iter().collect();
        let proof = bmt.multiproof(&gs);
        let restricted = BinaryMerkleTree::from_witness(proof);
        assert!(restricted.get(g1).is_ok());
        assert!(matches!(restricted.get(g2), Err(Error::InsufficientWitness(_))));
    }

    #[test]
    fn restricted_tree_replays_a_write_and_matches_full_tree_root() {
        let mut full = BinaryMerkleTree::new();
        let g1 = crate::layout::scalar_leaf(4, crate::layout::field::PC);
        let g2 = crate::layout::scalar_leaf(4, crate::layout::field::IN_PTR);
        full.set(g1, [1u8; 32]).unwrap();
        full.set(g2, [2u8; 32]).unwrap();

        let gs: BTreeSet<u64> = [g1].into_iter().collect();
        let proof = full.multiproof(&gs);
        let mut restricted = BinaryMerkleTree::from_witness(proof);
        assert_eq!(restricted.root().unwrap(), full.root().unwrap());

        restricted.set(g1, [99u8; 32]).unwrap();
        full.set(g1, [99u8; 32]).unwrap();
        assert_eq!(restricted.root().unwrap(), full.root().unwrap());
    }
}

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

use sha2::{Digest, Sha256};

pub type Node = [u8; 32];

/// Depth beyond which the layout never addresses a node. Generous headroom
/// over the deepest field (currently 19 levels, see `layout::MAX_DEPTH`).
pub const MAX_ZERO_DEPTH: usize = 32;

/// `h(a, b) = SHA256(a || b)`.
pub fn hash_pair(left: &Node, right: &Node) -> Node {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Depth of a generalized index: root (`1`) is depth 0, its children depth 1.
pub fn depth_of(gindex: u64) -> usize {
    debug_assert!(gindex > 0, "gindex 0 is not a valid tree position");
    (63 - gindex.leading_zeros()) as usize
}

lazy_static::lazy_static! {
    /// `Z[0] = 0x00...00`, `Z[d] = h(Z[d-1], Z[d-1])`.
    static ref ZERO_HASHES: Vec<Node> = {
        let mut z = Vec::with_capacity(MAX_ZERO_DEPTH + 1);
        z.push([0u8; 32]);
        for d in 1..=MAX_ZERO_DEPTH {
            let prev = z[d - 1];
            z.push(hash_pair(&prev, &prev));
        }
        z
    };
}

/// Zero-subtree hash at the given depth, where depth 0 is a bare leaf.
pub fn zero_hash(depth: usize) -> Node {
    ZERO_HASHES[depth]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_matches_bit_length() {
        assert_eq!(depth_of(1), 0);
        assert_eq!(depth_of(2), 1);
        assert_eq!(depth_of(3), 1);
        assert_eq!(depth_of(4), 2);
        assert_eq!(depth_of(1 << 20), 20);
    }

    #[test]
    fn zero_hashes_are_recursive() {
        let z0 = zero_hash(0);
        assert_eq!(z0, [0u8; 32]);
        let z1 = zero_hash(1);
        assert_eq!(z1, hash_pair(&z0, &z0));
        let z5 = zero_hash(5);
        assert_eq!(z5, hash_pair(&zero_hash(4), &zero_hash(4)));
    }

    #[test]
    fn hash_pair_is_order_sensitive() {
        let a = [1u8; 32];
        let b = [2u8; 32];
        assert_ne!(hash_pair(&a, &b), hash_pair(&b, &a));
    }
}

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

//! Replays a single step against nothing but its witness. This is the
//! on-chain side of the dispute: it never sees the rest of the world state,
//! and [`crate::bmt::BinaryMerkleTree::from_witness`] enforces that by
//! rejecting any access outside `witness.node_by_gindex`.

use std::collections::BTreeSet;

use crate::{
    bmt::BinaryMerkleTree,
    driver, error,
    error::{Error, Result},
    trace::StepKind,
    vm,
    witness::Witness,
};

/// Re-execute `witness`'s single step and return the recomputed post-root.
/// The caller compares this against a sequencer's claimed root to detect
/// fraud; this function itself does not judge fraud, only recomputes.
pub fn verify_step(witness: &Witness) -> Result<[u8; 32]> {
    let mut tree = BinaryMerkleTree::from_witness(witness.node_by_gindex.clone());
    if tree.root()? != witness.pre_root {
        return Err(Error::BadPreRoot);
    }

    match witness.kind {
        StepKind::Opcode => {
            let mut access = BTreeSet::new();
            vm::execute(&mut tree, witness.contract_id, &mut access)?;
        }
        StepKind::Rollback => {
            driver::rollback_step(&mut tree, witness.contract_id)?;
        }
        StepKind::Base => {
            return Err(error::Error::Cli(
                "the base step writes the transaction input, which is not witness-replayable \
                 without the sender and payload out of band"
                    .to_string(),
            ));
        }
    }

    tree.root()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{driver as drv, trace::run_transition};

    #[test]
    fn honest_step_verifies_to_the_prover_post_root() {
        let mut tree = BinaryMerkleTree::new();
        drv::load_contract(&mut tree, 0, b"+.", &[]).unwrap();
        let trace = run_transition(&mut tree, 0, &[0u8; drv::SENDER_LEN], &[]).unwrap();

        let w = crate::witness::extract(&trace, 1).unwrap();
        let recomputed = verify_step(&w).unwrap();
        assert_eq!(recomputed, w.post_root);
    }

    #[test]
    fn tampered_claimed_root_is_detectable_by_the_caller() {
        let mut tree = BinaryMerkleTree::new();
        drv::load_contract(&mut tree, 0, b"+.", &[]).unwrap();
        let trace = run_transition(&mut tree, 0, &[0u8; drv::SENDER_LEN], &[]).unwrap();

        let w = crate::witness::extract(&trace, 1).unwrap();
        let recomputed = verify_step(&w).unwrap();
        let mut tampered = w.post_root;
        tampered[31] ^= 0x01;
        assert_ne!(recomputed, tampered);
    }

    #[test]
    fn tampered_pre_root_is_rejected() {
        let mut tree = BinaryMerkleTree::new();
        drv::load_contract(&mut tree, 0, b"+.", &[]).unwrap();
        let trace = run_transition(&mut tree, 0, &[0u8; drv::SENDER_LEN], &[]).unwrap();

        let mut w = crate::witness::extract(&trace, 1).unwrap();
        w.pre_root[0] ^= 0x01;
        assert!(matches!(verify_step(&w), Err(Error::BadPreRoot)));
    }

    #[test]
    fn rollback_step_replays_from_its_own_witness() {
        let mut tree = BinaryMerkleTree::new();
        drv::load_contract(&mut tree, 0, b"+[+]", &[5]).unwrap();
        let trace = run_transition(&mut tree, 0, &[1u8; drv::SENDER_LEN], &[]).unwrap();

        let last = trace.num_steps() - 1;
        let w = crate::witness::extract(&trace, last).unwrap();
        assert!(matches!(w.kind, StepKind::Rollback));
        let recomputed = verify_step(&w).unwrap();
        assert_eq!(recomputed, w.post_root);
    }
}

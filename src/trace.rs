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

//! The trace generator: runs a whole transition, recording per-step roots,
//! access sets and the node data needed to rebuild any single step's
//! witness later. See [`crate::witness`] for why `nodes` is step-scoped
//! rather than one flat `gindex -> node` map.

use std::collections::{BTreeSet, HashMap};

use crate::{
    bmt::BinaryMerkleTree,
    driver,
    error::Result,
    hasher::Node,
    state::STATUS_RUNNING,
    vm,
};

/// Which driver function produced a given [`StepRecord`]. The witness needs
/// this to know which function to replay: the base step and the rollback
/// step are driver bookkeeping, not opcode dispatch, so they are not
/// interchangeable with [`crate::vm::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Base,
    Opcode,
    Rollback,
}

/// One executed step: the gindices it touched, plus the multiproof of those
/// gindices against `pre_root` (this step's entry in `step_roots`).
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub kind: StepKind,
    pub access: BTreeSet<u64>,
    pub nodes: HashMap<u64, Node>,
}

#[derive(Debug, Clone)]
pub struct Trace {
    pub contract_id: u8,
    /// `step_roots[0]` is the pre-transition root, `step_roots[n]` the post.
    pub step_roots: Vec<Node>,
    pub steps: Vec<StepRecord>,
}

impl Trace {
    pub fn pre_root(&self) -> Node {
        self.step_roots[0]
    }

    pub fn post_root(&self) -> Node {
        *self.step_roots.last().unwrap()
    }

    pub fn num_steps(&self) -> usize {
        self.steps.len()
    }
}

/// A safety cap on how many opcode steps a single transition may take before
/// gas forces a halt on its own; gas already bounds this (at most
/// `BASE_GAS + GAS_PER_PAYLOAD_BYTE * payload.len()` steps), this just
/// guards against a logic bug turning into an unbounded loop while tracing.
const MAX_STEPS: usize = 10_000_000;

/// Run a full transition against `tree`, starting from the contract's
/// current persisted state, and return the complete trace. `tree` ends up
/// holding the post-transition state.
pub fn run_transition(
    tree: &mut BinaryMerkleTree,
    contract_id: u8,
    sender: &[u8; driver::SENDER_LEN],
    payload: &[u8],
) -> Result<Trace> {
    let mut step_roots = vec![tree.root()?];
    let mut steps = Vec::new();

    record_step(tree, &mut step_roots, &mut steps, StepKind::Base, |tree| {
        driver::base_step(tree, contract_id, sender, payload)
    })?;

    loop {
        if steps.len() >= MAX_STEPS {
            break;
        }
        if driver::read_status(tree, contract_id)? != STATUS_RUNNING {
            break;
        }
        record_step(tree, &mut step_roots, &mut steps, StepKind::Opcode, |tree| {
            let mut access = BTreeSet::new();
            vm::execute(tree, contract_id, &mut access)?;
            Ok(access)
        })?;
    }

    if driver::read_status(tree, contract_id)? != crate::state::STATUS_SUCCESS {
        record_step(tree, &mut step_roots, &mut steps, StepKind::Rollback, |tree| {
            driver::rollback_step(tree, contract_id)
        })?;
    }

    Ok(Trace { contract_id, step_roots, steps })
}

/// Execute one step via `run`, then record its pre-root multiproof (over the
/// gindices `run` reports having touched) and push the resulting root.
fn record_step(
    tree: &mut BinaryMerkleTree,
    step_roots: &mut Vec<Node>,
    steps: &mut Vec<StepRecord>,
    kind: StepKind,
    run: impl FnOnce(&mut BinaryMerkleTree) -> Result<BTreeSet<u64>>,
) -> Result<()> {
    let pre = pre_multiproof_tree(tree);
    let access = run(tree)?;
    let nodes = pre.multiproof(&access);
    steps.push(StepRecord { kind, access, nodes });
    step_roots.push(tree.root()?);
    Ok(())
}

/// A cheap clone of the current tree used solely to take a pre-step
/// multiproof snapshot before the step's own writes land.
fn pre_multiproof_tree(tree: &BinaryMerkleTree) -> BinaryMerkleTree {
    tree.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender(byte: u8) -> [u8; driver::SENDER_LEN] {
        [byte; driver::SENDER_LEN]
    }

    #[test]
    fn multiply_by_seven_matches_scenario() {
        let mut tree = BinaryMerkleTree::new();
        // Reads (and discards) the 20-byte sender prefix, keeping only the
        // last byte read into cell 0 — the payload byte — then repeatedly
        // decrements it while incrementing cell 1 by 7 each time, leaving
        // cell 1 holding the sevenfold product and cell 0 zeroed. Outputting
        // the now-zeroed cell 0 is what makes the step succeed.
        let code = b",,,,,,,,,,,,,,,,,,,,,[>+++++++<-].";
        driver::load_contract(&mut tree, 0, code, &[]).unwrap();
        let trace = run_transition(&mut tree, 0, &sender(0xaa), &[0x03]).unwrap();
        assert_eq!(trace.post_root(), tree.root().unwrap());

        let mut access = BTreeSet::new();
        let mut acc = crate::state::Accessor { tree: &mut tree, contract_id: 0, access: &mut access };
        assert_eq!(acc.read_status().unwrap(), crate::state::STATUS_SUCCESS);
        assert_eq!(acc.read_ptr().unwrap(), 0);
        let len = acc.cells_len().unwrap();
        let cells = acc.read_cells(len).unwrap();
        assert_eq!(cells[0], 0);
        assert_eq!(cells[1], 21);
    }

    #[test]
    fn out_of_gas_rolls_back_cells_and_ptr() {
        let mut tree = BinaryMerkleTree::new();
        // `+` only wraps cell 0 back to zero after ~255 increments, and every
        // loop iteration of `[...]` pushes a fresh stack entry without ever
        // popping until the loop exits (§4.4: `]` pops only when the cell is
        // zero) — so a loop whose body is a single `+` exits by itself, via
        // the byte wrapping to zero, in ~765 steps, long before 1000 gas runs
        // out. Padding the loop body with no-op filler bytes (each still
        // costs one step/one gas per §4.4) multiplies the per-iteration cost
        // without touching the cell, so gas is exhausted well inside the
        // ~250 iterations available before the wraparound exit would fire.
        driver::load_contract(&mut tree, 0, b"+[+xxxxxxxxxx]", &[5]).unwrap();
        let trace = run_transition(&mut tree, 0, &sender(1), &[]).unwrap();

        let mut access = BTreeSet::new();
        let mut acc = crate::state::Accessor { tree: &mut tree, contract_id: 0, access: &mut access };
        assert_eq!(acc.read_status().unwrap(), vm::ERR_OUT_OF_GAS);
        assert_eq!(acc.read_cell(0).unwrap(), 5);
        assert_eq!(acc.read_ptr().unwrap(), 0);
        assert!(trace.num_steps() > 0);
    }

    #[test]
    fn input_exhausted_reports_correct_status() {
        let mut tree = BinaryMerkleTree::new();
        // `,,,` only ever reads 3 of the 21 (20 sender + 1 payload) input
        // bytes, so `in_ptr` never reaches `in_len`; loop on `,` instead so
        // the read actually runs past the end of `input`.
        driver::load_contract(&mut tree, 0, b",[,]", &[]).unwrap();
        run_transition(&mut tree, 0, &sender(2), &[0x01]).unwrap();

        let status = driver::read_status(&mut tree, 0).unwrap();
        assert_eq!(status, vm::ERR_INPUT_EXHAUSTED);
    }

    #[test]
    fn unmatched_bracket_reports_correct_status() {
        let mut tree = BinaryMerkleTree::new();
        driver::load_contract(&mut tree, 0, b"[+", &[]).unwrap();
        run_transition(&mut tree, 0, &sender(3), &[]).unwrap();

        let status = driver::read_status(&mut tree, 0).unwrap();
        assert_eq!(status, vm::ERR_UNMATCHED_BRACKET);
    }

    #[test]
    fn halting_a_second_time_is_idempotent() {
        let mut tree = BinaryMerkleTree::new();
        driver::load_contract(&mut tree, 0, b".", &[0]).unwrap();
        run_transition(&mut tree, 0, &sender(4), &[]).unwrap();
        let root_after = tree.root().unwrap();

        let mut access = BTreeSet::new();
        vm::execute(&mut tree, 0, &mut access).unwrap();
        assert_eq!(tree.root().unwrap(), root_after);
        assert!(access.len() <= 1);
    }
}

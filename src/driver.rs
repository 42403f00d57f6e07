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

//! The transition driver: loads a contract, runs the base step that wires up
//! a transaction's input into the ephemeral sub-tree, and defines the
//! rollback bookkeeping step used on execution error. The actual
//! step-by-step loop and per-step recording live in [`crate::trace`], since
//! that is the only caller that needs the intermediate roots.

use std::collections::BTreeSet;

use crate::{
    bmt::BinaryMerkleTree,
    error::{Error, Result},
    layout,
    state::{Accessor, STATUS_RUNNING},
};

/// Base gas plus a per-payload-byte allowance. Gas accounting counts only
/// the user-supplied payload, not the 20 sender bytes the driver prepends.
pub const BASE_GAS: u64 = 1000;
pub const GAS_PER_PAYLOAD_BYTE: u64 = 128;

pub const SENDER_LEN: usize = 20;

/// Write a contract's persisted fields (`code`, `cells`, `ptr`) at creation
/// time. Not part of the stepwise surface: called once, outside any trace.
pub fn load_contract(tree: &mut BinaryMerkleTree, contract_id: u8, code: &[u8], cells: &[u8]) -> Result<()> {
    if code.len() > layout::CODE.capacity {
        return Err(Error::ListCapacityExceeded { list: "code", value: code.len(), capacity: layout::CODE.capacity });
    }
    if cells.len() > layout::CELLS.capacity {
        return Err(Error::ListCapacityExceeded {
            list: "cells",
            value: cells.len(),
            capacity: layout::CELLS.capacity,
        });
    }
    // `ptr` always starts at 0 and the tape is always addressable there (see
    // the data model's `ptr < capacity(cells)` invariant), so the tape can
    // never start genuinely empty: an empty `cells` is normalized to a
    // single zero byte, or `>`'s boundary-crossing growth in `vm::do_ptr_inc`
    // (which only appends when `new_ptr == len`) would never trigger and the
    // length leaf would desync from the cells actually written.
    let cells: &[u8] = if cells.is_empty() { &[0] } else { cells };

    let mut access = BTreeSet::new();
    let mut acc = Accessor { tree, contract_id, access: &mut access };
    acc.write_code(code)?;
    acc.write_cells(cells)?;
    acc.write_ptr(0)
}

/// The base step: `r_0 -> r_1`. Writes the transaction input, resets the
/// ephemeral sub-tree, and snapshots the pre-transition `cells`/`ptr` for a
/// possible rollback. Returns the set of gindices this step touched, so
/// [`crate::trace`] can record it like any other step.
pub fn base_step(
    tree: &mut BinaryMerkleTree,
    contract_id: u8,
    sender: &[u8; SENDER_LEN],
    payload: &[u8],
) -> Result<BTreeSet<u64>> {
    let mut input = Vec::with_capacity(SENDER_LEN + payload.len());
    input.extend_from_slice(sender);
    input.extend_from_slice(payload);
    if input.len() > layout::INPUT.capacity {
        return Err(Error::ListCapacityExceeded {
            list: "input",
            value: input.len(),
            capacity: layout::INPUT.capacity,
        });
    }

    let mut access = BTreeSet::new();
    let mut acc = Accessor { tree, contract_id, access: &mut access };

    let ptr = acc.read_ptr()?;
    let cells_len = acc.cells_len()?;
    let cells = acc.read_cells(cells_len)?;
    acc.write_snapshot_cells(&cells)?;
    acc.write_snapshot_ptr(ptr)?;

    acc.write_input(&input)?;
    acc.write_pc(0)?;
    acc.write_in_ptr(0)?;
    acc.clear_stack()?;
    acc.clear_output()?;
    acc.write_status(STATUS_RUNNING)?;
    acc.write_gas(BASE_GAS + GAS_PER_PAYLOAD_BYTE * payload.len() as u64)?;

    Ok(access)
}

/// The rollback bookkeeping step run after a terminal execution error:
/// restores `cells`/`ptr` from the snapshot sub-tree populated in
/// [`base_step`]. A no-op (but still recorded) on successful termination,
/// where the driver simply never calls it.
pub fn rollback_step(tree: &mut BinaryMerkleTree, contract_id: u8) -> Result<BTreeSet<u64>> {
    let mut access = BTreeSet::new();
    let mut acc = Accessor { tree, contract_id, access: &mut access };

    let snap_len = acc.snapshot_cells_len()?;
    let mut cells = Vec::with_capacity(snap_len as usize);
    for i in 0..snap_len as usize {
        cells.push(acc.read_snapshot_cell(i)?);
    }
    let snap_ptr = acc.read_snapshot_ptr()?;

    // If execution grew the tape past its pre-transition length (`>` past
    // `snap_len`), those element leaves are still resident above `snap_len`
    // after `write_cells` below restores only `0..snap_len` and the length
    // leaf. Zero them explicitly so the restored element subtree hashes the
    // same as it would have if this transition had never touched them,
    // rather than leaving live leftover bytes under a now-shorter length.
    let live_len = acc.cells_len()?;
    for i in snap_len as usize..live_len as usize {
        acc.write_cell(i, 0)?;
    }

    acc.write_cells(&cells)?;
    acc.write_ptr(snap_ptr)?;
    Ok(access)
}

pub fn read_status(tree: &mut BinaryMerkleTree, contract_id: u8) -> Result<u8> {
    let mut access = BTreeSet::new();
    let mut acc = Accessor { tree, contract_id, access: &mut access };
    acc.read_status()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::run_transition;

    #[test]
    fn rollback_zeroes_tape_growth_so_the_cells_subtree_root_is_exact() {
        let mut tree = BinaryMerkleTree::new();
        // Five `>` past the single persisted cell grow the tape to length 6
        // before the unmatched `[` halts the transition.
        load_contract(&mut tree, 0, b">>>>>[+", &[7]).unwrap();
        let cells_field = layout::field_root(0, layout::field::CELLS);
        let pre_cells_root = tree.get(cells_field).unwrap();

        run_transition(&mut tree, 0, &[9u8; SENDER_LEN], &[]).unwrap();

        let mut access = BTreeSet::new();
        let mut acc = Accessor { tree: &mut tree, contract_id: 0, access: &mut access };
        assert_eq!(acc.read_status().unwrap(), crate::vm::ERR_UNMATCHED_BRACKET);

        let post_cells_root = tree.get(cells_field).unwrap();
        assert_eq!(
            post_cells_root, pre_cells_root,
            "tape growth during a rolled-back transition must not be left resident"
        );
    }
}

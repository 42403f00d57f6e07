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

//! The Step VM: one Brainfuck opcode per step, mediated entirely through
//! [`crate::state::Accessor`] so every read and write is Merkleized and
//! recorded. `execute` never returns `Err` for an in-band execution failure
//! (tape overflow, unmatched bracket, ...) — those are written into the
//! contract's `status` field. `Err` is reserved for host-layer failures,
//! chiefly [`crate::error::Error::InsufficientWitness`] when replaying
//! against a restricted witness tree.

use std::collections::BTreeSet;

use crate::{
    bmt::BinaryMerkleTree,
    error::Result,
    layout,
    state::{Accessor, STATUS_RUNNING, STATUS_SUCCESS},
};

pub const ERR_TAPE_OVERFLOW: u8 = 0x02;
pub const ERR_TAPE_UNDERFLOW: u8 = 0x03;
pub const ERR_INPUT_EXHAUSTED: u8 = 0x04;
pub const ERR_UNMATCHED_BRACKET: u8 = 0x05;
pub const ERR_STACK_OVERFLOW: u8 = 0x06;
pub const ERR_STACK_UNDERFLOW: u8 = 0x07;
pub const ERR_OUT_OF_GAS: u8 = 0x08;
/// Not enumerated in the distilled error table but required by the
/// `pc <= len(code)` invariant: `pc == len(code)` at dispatch time is an
/// execution error, not UB, so it needs a status byte of its own.
pub const ERR_OUT_OF_CODE: u8 = 0x09;
/// Likewise not enumerated in the distilled error table: `output` is
/// bounded like every other list in the layout, and a program that loops
/// on the `0xff` no-halt sentinel needs a defined terminal status once it
/// runs the list out of capacity, rather than writing past its subtree.
pub const ERR_OUTPUT_OVERFLOW: u8 = 0x0a;

enum Outcome {
    /// The step ran normally; write this value as the new `pc`.
    Continue(u64),
    /// The step wrote a terminal status; `pc` is left untouched.
    Halted,
}

/// Execute exactly one opcode for `contract_id` against `tree`, recording
/// every gindex touched into `access`.
pub fn execute(tree: &mut BinaryMerkleTree, contract_id: u8, access: &mut BTreeSet<u64>) -> Result<()> {
    let mut acc = Accessor { tree, contract_id, access };

    if acc.read_status()? != STATUS_RUNNING {
        return Ok(());
    }

    let gas = acc.read_gas()?;
    if gas == 0 {
        acc.write_status(ERR_OUT_OF_GAS)?;
        return Ok(());
    }
    acc.write_gas(gas - 1)?;

    let pc = acc.read_pc()?;
    let code_len = acc.code_len()?;
    if pc >= code_len {
        acc.write_status(ERR_OUT_OF_CODE)?;
        return Ok(());
    }

    let opcode = acc.read_code_byte(pc as usize)?;
    let ptr = acc.read_ptr()?;

    let outcome = match opcode {
        b'>' => do_ptr_inc(&mut acc, pc, ptr)?,
        b'<' => do_ptr_dec(&mut acc, pc, ptr)?,
        b'+' => {
            let cell = acc.read_cell(ptr as usize)?;
            acc.write_cell(ptr as usize, cell.wrapping_add(1))?;
            Outcome::Continue(pc + 1)
        }
        b'-' => {
            let cell = acc.read_cell(ptr as usize)?;
            acc.write_cell(ptr as usize, cell.wrapping_sub(1))?;
            Outcome::Continue(pc + 1)
        }
        b'.' => do_output(&mut acc, pc, ptr)?,
        b',' => do_input(&mut acc, pc, ptr)?,
        b'[' => do_bracket_fwd(&mut acc, pc, ptr, code_len)?,
        b']' => do_bracket_back(&mut acc, pc, ptr)?,
        _ => Outcome::Continue(pc + 1),
    };

    match outcome {
        Outcome::Continue(new_pc) => acc.write_pc(new_pc),
        Outcome::Halted => Ok(()),
    }
}

fn do_ptr_inc(acc: &mut Accessor, pc: u64, ptr: u64) -> Result<Outcome> {
    let len = acc.cells_len()?;
    let new_ptr = ptr + 1;
    if new_ptr == len {
        if len as usize >= layout::CELLS.capacity {
            acc.write_status(ERR_TAPE_OVERFLOW)?;
            return Ok(Outcome::Halted);
        }
        acc.append_cell(0)?;
    }
    acc.write_ptr(new_ptr)?;
    Ok(Outcome::Continue(pc + 1))
}

fn do_ptr_dec(acc: &mut Accessor, pc: u64, ptr: u64) -> Result<Outcome> {
    if ptr == 0 {
        acc.write_status(ERR_TAPE_UNDERFLOW)?;
        return Ok(Outcome::Halted);
    }
    acc.write_ptr(ptr - 1)?;
    Ok(Outcome::Continue(pc + 1))
}

fn do_output(acc: &mut Accessor, pc: u64, ptr: u64) -> Result<Outcome> {
    let cell = acc.read_cell(ptr as usize)?;
    // Unlike cells/stack, output only ever grows one no-halt (0xff) write at
    // a time, so a program that loops on 0xff can otherwise run the list
    // past its capacity; check before appending rather than after.
    if acc.output_len()? as usize >= layout::OUTPUT.capacity {
        acc.write_status(ERR_OUTPUT_OVERFLOW)?;
        return Ok(Outcome::Halted);
    }
    acc.append_output(cell)?;
    match cell {
        0x00 => acc.write_status(STATUS_SUCCESS)?,
        0xff => {} // reserved running-sentinel: a plain no-op append
        code => acc.write_status(code)?,
    }
    Ok(Outcome::Continue(pc + 1))
}

fn do_input(acc: &mut Accessor, pc: u64, ptr: u64) -> Result<Outcome> {
    let in_ptr = acc.read_in_ptr()?;
    let in_len = acc.input_len()?;
    if in_ptr == in_len {
        acc.write_status(ERR_INPUT_EXHAUSTED)?;
        return Ok(Outcome::Halted);
    }
    let byte = acc.read_input_byte(in_ptr as usize)?;
    acc.write_cell(ptr as usize, byte)?;
    acc.write_in_ptr(in_ptr + 1)?;
    Ok(Outcome::Continue(pc + 1))
}

fn do_bracket_fwd(acc: &mut Accessor, pc: u64, ptr: u64, code_len: u64) -> Result<Outcome> {
    let cell = acc.read_cell(ptr as usize)?;
    if cell != 0 {
        if acc.stack_len()? as usize >= layout::STACK.capacity {
            acc.write_status(ERR_STACK_OVERFLOW)?;
            return Ok(Outcome::Halted);
        }
        acc.push_stack(pc)?;
        return Ok(Outcome::Continue(pc + 1));
    }

    // Scan strictly left-to-right from just past the '[', tracking nesting
    // depth, until the matching ']' is found. Every byte read is mediated
    // through `acc`, so the whole scan shows up in this step's access set.
    let mut depth: u32 = 1;
    let mut i = pc + 1;
    loop {
        if i >= code_len {
            acc.write_status(ERR_UNMATCHED_BRACKET)?;
            return Ok(Outcome::Halted);
        }
        match acc.read_code_byte(i as usize)? {
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(Outcome::Continue(i + 1));
                }
            }
            _ => {}
        }
        i += 1;
    }
}

fn do_bracket_back(acc: &mut Accessor, pc: u64, ptr: u64) -> Result<Outcome> {
    if acc.stack_len()? == 0 {
        acc.write_status(ERR_STACK_UNDERFLOW)?;
        return Ok(Outcome::Halted);
    }
    let cell = acc.read_cell(ptr as usize)?;
    if cell != 0 {
        let top = acc.peek_stack()?;
        Ok(Outcome::Continue(top))
    } else {
        acc.pop_stack()?;
        Ok(Outcome::Continue(pc + 1))
    }
}

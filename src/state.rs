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

//! Typed accessors mediating every state read/write the Step VM performs.
//! Every function here touches the BMT only through `get`/`set`, and records
//! every gindex it touches into `access` — this is the single choke point
//! the trace generator and the step verifier both rely on.

use std::collections::BTreeSet;

use crate::{
    bmt::BinaryMerkleTree,
    error::Result,
    hasher::Node,
    layout::{self, field, ListSchema},
};

pub const STATUS_RUNNING: u8 = 0xff;
pub const STATUS_SUCCESS: u8 = 0x00;

fn u64_leaf(v: u64) -> Node {
    let mut out = [0u8; 32];
    out[..8].copy_from_slice(&v.to_le_bytes());
    out
}

fn leaf_u64(node: &Node) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&node[..8]);
    u64::from_le_bytes(bytes)
}

fn byte_leaf(v: u8) -> Node {
    let mut out = [0u8; 32];
    out[0] = v;
    out
}

/// A handle bundling the BMT, the addressed contract and the access sink for
/// one step's worth of typed reads and writes.
pub struct Accessor<'a> {
    pub tree: &'a mut BinaryMerkleTree,
    pub contract_id: u8,
    pub access: &'a mut BTreeSet<u64>,
}

impl<'a> Accessor<'a> {
    fn get_scalar(&mut self, gindex: u64) -> Result<Node> {
        self.access.insert(gindex);
        self.tree.get(gindex)
    }

    fn set_scalar(&mut self, gindex: u64, value: Node) -> Result<()> {
        self.access.insert(gindex);
        self.tree.set(gindex, value)
    }

    fn read_u64(&mut self, field: u64) -> Result<u64> {
        let g = layout::scalar_leaf(self.contract_id, field);
        Ok(leaf_u64(&self.get_scalar(g)?))
    }

    fn write_u64(&mut self, field: u64, value: u64) -> Result<()> {
        let g = layout::scalar_leaf(self.contract_id, field);
        self.set_scalar(g, u64_leaf(value))
    }

    fn read_u8(&mut self, field: u64) -> Result<u8> {
        let g = layout::scalar_leaf(self.contract_id, field);
        Ok(self.get_scalar(g)?[0])
    }

    fn write_u8(&mut self, field: u64, value: u8) -> Result<()> {
        let g = layout::scalar_leaf(self.contract_id, field);
        self.set_scalar(g, byte_leaf(value))
    }

    pub fn read_ptr(&mut self) -> Result<u64> {
        self.read_u64(field::PTR)
    }
    pub fn write_ptr(&mut self, v: u64) -> Result<()> {
        self.write_u64(field::PTR, v)
    }
    pub fn read_pc(&mut self) -> Result<u64> {
        self.read_u64(field::PC)
    }
    pub fn write_pc(&mut self, v: u64) -> Result<()> {
        self.write_u64(field::PC, v)
    }
    pub fn read_in_ptr(&mut self) -> Result<u64> {
        self.read_u64(field::IN_PTR)
    }
    pub fn write_in_ptr(&mut self, v: u64) -> Result<()> {
        self.write_u64(field::IN_PTR, v)
    }
    pub fn read_gas(&mut self) -> Result<u64> {
        self.read_u64(field::GAS)
    }
    pub fn write_gas(&mut self, v: u64) -> Result<()> {
        self.write_u64(field::GAS, v)
    }
    pub fn read_snapshot_ptr(&mut self) -> Result<u64> {
        self.read_u64(field::SNAPSHOT_PTR)
    }
    pub fn write_snapshot_ptr(&mut self, v: u64) -> Result<()> {
        self.write_u64(field::SNAPSHOT_PTR, v)
    }
    pub fn read_status(&mut self) -> Result<u8> {
        self.read_u8(field::STATUS)
    }
    pub fn write_status(&mut self, v: u8) -> Result<()> {
        self.write_u8(field::STATUS, v)
    }

    fn list_schema(field: u64) -> &'static ListSchema {
        match field {
            f if f == field::CODE => &layout::CODE,
            f if f == field::CELLS => &layout::CELLS,
            f if f == field::INPUT => &layout::INPUT,
            f if f == field::STACK => &layout::STACK,
            f if f == field::OUTPUT => &layout::OUTPUT,
            f if f == field::SNAPSHOT_CELLS => &layout::SNAPSHOT_CELLS,
            _ => unreachable!("field {field} is not a bounded list"),
        }
    }

    fn read_len(&mut self, field: u64) -> Result<u64> {
        let g = layout::list_length_leaf(self.contract_id, field);
        self.access.insert(g);
        Ok(leaf_u64(&self.tree.get(g)?))
    }

    fn write_len(&mut self, field: u64, len: u64) -> Result<()> {
        let g = layout::list_length_leaf(self.contract_id, field);
        self.access.insert(g);
        self.tree.set(g, u64_leaf(len))
    }

    fn read_byte_element(&mut self, field: u64, index: usize) -> Result<u8> {
        let schema = Self::list_schema(field);
        let (g, offset) = layout::list_element_leaf(self.contract_id, field, schema, index);
        self.access.insert(g);
        Ok(self.tree.get(g)?[offset])
    }

    fn write_byte_element(&mut self, field: u64, index: usize, value: u8) -> Result<()> {
        let schema = Self::list_schema(field);
        let (g, offset) = layout::list_element_leaf(self.contract_id, field, schema, index);
        self.access.insert(g);
        let mut leaf = self.tree.get(g)?;
        leaf[offset] = value;
        self.tree.set(g, leaf)
    }

    fn read_u64_element(&mut self, field: u64, index: usize) -> Result<u64> {
        let schema = Self::list_schema(field);
        let (g, offset) = layout::list_element_leaf(self.contract_id, field, schema, index);
        self.access.insert(g);
        let leaf = self.tree.get(g)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&leaf[offset..offset + 8]);
        Ok(u64::from_le_bytes(bytes))
    }

    fn write_u64_element(&mut self, field: u64, index: usize, value: u64) -> Result<()> {
        let schema = Self::list_schema(field);
        let (g, offset) = layout::list_element_leaf(self.contract_id, field, schema, index);
        self.access.insert(g);
        let mut leaf = self.tree.get(g)?;
        leaf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
        self.tree.set(g, leaf)
    }

    // -- code --------------------------------------------------------------

    pub fn code_len(&mut self) -> Result<u64> {
        self.read_len(field::CODE)
    }

    pub fn read_code_byte(&mut self, index: usize) -> Result<u8> {
        self.read_byte_element(field::CODE, index)
    }

    /// Only ever called once, when a contract is first created; not part of
    /// the stepwise VM surface, so it writes every element directly rather
    /// than going through per-byte accessors.
    pub fn write_code(&mut self, code: &[u8]) -> Result<()> {
        for (i, &b) in code.iter().enumerate() {
            self.write_byte_element(field::CODE, i, b)?;
        }
        self.write_len(field::CODE, code.len() as u64)
    }

    // -- cells ---------------------------------------------------------------

    pub fn cells_len(&mut self) -> Result<u64> {
        self.read_len(field::CELLS)
    }

    pub fn read_cell(&mut self, index: usize) -> Result<u8> {
        self.read_byte_element(field::CELLS, index)
    }

    pub fn write_cell(&mut self, index: usize, value: u8) -> Result<()> {
        self.write_byte_element(field::CELLS, index, value)
    }

    pub fn append_cell(&mut self, value: u8) -> Result<()> {
        let len = self.cells_len()?;
        self.write_byte_element(field::CELLS, len as usize, value)?;
        self.write_len(field::CELLS, len + 1)
    }

    pub fn write_cells(&mut self, cells: &[u8]) -> Result<()> {
        for (i, &b) in cells.iter().enumerate() {
            self.write_byte_element(field::CELLS, i, b)?;
        }
        self.write_len(field::CELLS, cells.len() as u64)
    }

    pub fn read_cells(&mut self, len: u64) -> Result<Vec<u8>> {
        (0..len as usize).map(|i| self.read_cell(i)).collect()
    }

    // -- snapshot_cells / snapshot_ptr --------------------------------------

    pub fn snapshot_cells_len(&mut self) -> Result<u64> {
        self.read_len(field::SNAPSHOT_CELLS)
    }

    pub fn write_snapshot_cells(&mut self, cells: &[u8]) -> Result<()> {
        for (i, &b) in cells.iter().enumerate() {
            self.write_byte_element(field::SNAPSHOT_CELLS, i, b)?;
        }
        self.write_len(field::SNAPSHOT_CELLS, cells.len() as u64)
    }

    pub fn read_snapshot_cell(&mut self, index: usize) -> Result<u8> {
        self.read_byte_element(field::SNAPSHOT_CELLS, index)
    }

    // -- input -----------------------------------------------------------

    pub fn input_len(&mut self) -> Result<u64> {
        self.read_len(field::INPUT)
    }

    pub fn read_input_byte(&mut self, index: usize) -> Result<u8> {
        self.read_byte_element(field::INPUT, index)
    }

    pub fn write_input(&mut self, input: &[u8]) -> Result<()> {
        for (i, &b) in input.iter().enumerate() {
            self.write_byte_element(field::INPUT, i, b)?;
        }
        self.write_len(field::INPUT, input.len() as u64)
    }

    // -- stack ---------------------------------------------------------------

    pub fn stack_len(&mut self) -> Result<u64> {
        self.read_len(field::STACK)
    }

    pub fn push_stack(&mut self, value: u64) -> Result<()> {
        let len = self.stack_len()?;
        self.write_u64_element(field::STACK, len as usize, value)?;
        self.write_len(field::STACK, len + 1)
    }

    pub fn pop_stack(&mut self) -> Result<u64> {
        let len = self.stack_len()?;
        let top = self.read_u64_element(field::STACK, (len - 1) as usize)?;
        self.write_len(field::STACK, len - 1)?;
        Ok(top)
    }

    pub fn peek_stack(&mut self) -> Result<u64> {
        let len = self.stack_len()?;
        self.read_u64_element(field::STACK, (len - 1) as usize)
    }

    pub fn clear_stack(&mut self) -> Result<()> {
        self.write_len(field::STACK, 0)
    }

    // -- output ------------------------------------------------------------

    pub fn output_len(&mut self) -> Result<u64> {
        self.read_len(field::OUTPUT)
    }

    pub fn append_output(&mut self, value: u8) -> Result<()> {
        let len = self.output_len()?;
        self.write_byte_element(field::OUTPUT, len as usize, value)?;
        self.write_len(field::OUTPUT, len + 1)
    }

    pub fn clear_output(&mut self) -> Result<()> {
        self.write_len(field::OUTPUT, 0)
    }

    pub fn read_output(&mut self, len: u64) -> Result<Vec<u8>> {
        (0..len as usize).map(|i| self.read_byte_element(field::OUTPUT, i)).collect()
    }
}

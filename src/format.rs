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

//! JSON (de)serialization for the three external file formats: state files,
//! proof files and witness files. Every 32-byte value (a node, or a gindex
//! encoded the same way) is a `0x`-prefixed hex string; malformed input is a
//! host-layer [`Error`], never a panic.
//!
//! A proof file's `nodes` map has no room for which driver function produced
//! a step (base / opcode / rollback) without inventing a field the external
//! schema doesn't have. Instead [`classify_step`] recovers it structurally:
//! step 0 is always the base step, and the rollback step is the only one
//! that ever touches `snapshot_cells`/`snapshot_ptr` (see
//! [`crate::layout::field_of`]) — every other step is a plain opcode step.
//! The same trick recovers `contract_id` from the gindices themselves via
//! [`crate::layout::contract_id_of`], so neither file format needs to carry
//! it out of band either.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::{
    bmt::BinaryMerkleTree,
    driver,
    error::{Error, Result},
    hasher::{self, Node},
    layout::{self, field},
    state::Accessor,
    trace::{StepKind, Trace},
    witness::Witness,
};

fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}

pub fn encode_node(node: &Node) -> String {
    format!("0x{}", hex::encode(node))
}

pub fn decode_node(s: &str) -> Result<Node> {
    let bytes = hex::decode(strip_0x(s))?;
    if bytes.len() != 32 {
        return Err(Error::BadLength { expected: 32, got: bytes.len() });
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// A gindex is encoded like any other node: a big-endian integer
/// right-padded into 32 bytes.
pub fn encode_gindex(g: u64) -> String {
    let mut buf = [0u8; 32];
    buf[24..].copy_from_slice(&g.to_be_bytes());
    encode_node(&buf)
}

pub fn decode_gindex(s: &str) -> Result<u64> {
    let bytes = decode_node(s)?;
    let mut be = [0u8; 8];
    be.copy_from_slice(&bytes[24..]);
    Ok(u64::from_be_bytes(be))
}

/// Parse a `0x`-prefixed (or bare) hex byte string of any length, as used
/// for CLI sender/payload arguments.
pub fn decode_hex_bytes(s: &str) -> Result<Vec<u8>> {
    Ok(hex::decode(strip_0x(s))?)
}

pub fn encode_hex_bytes(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn parse_contract_id(s: &str) -> Result<u8> {
    let v: u64 = s.parse().map_err(|_| Error::Cli(format!("invalid contract id '{s}'")))?;
    u8::try_from(v).map_err(|_| Error::BadContractId(v))
}

// -- state file ----------------------------------------------------------

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StateFile {
    pub contracts: BTreeMap<String, ContractState>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ContractState {
    pub code: String,
    pub ptr: u64,
    pub cells: Vec<u8>,
}

/// Write every contract in `state` into `tree`'s persisted fields.
pub fn load_state(tree: &mut BinaryMerkleTree, state: &StateFile) -> Result<()> {
    for (id_str, c) in &state.contracts {
        let id = parse_contract_id(id_str)?;
        driver::load_contract(tree, id, c.code.as_bytes(), &c.cells)?;
        if c.ptr != 0 {
            let mut access = BTreeSet::new();
            let mut acc = Accessor { tree, contract_id: id, access: &mut access };
            acc.write_ptr(c.ptr)?;
        }
    }
    Ok(())
}

/// Read the persisted `code`/`cells`/`ptr` of each listed contract back out
/// of `tree` into a [`StateFile`].
pub fn dump_state(tree: &mut BinaryMerkleTree, contract_ids: &[u8]) -> Result<StateFile> {
    let mut contracts = BTreeMap::new();
    for &id in contract_ids {
        let mut access = BTreeSet::new();
        let mut acc = Accessor { tree, contract_id: id, access: &mut access };

        let code_len = acc.code_len()?;
        let mut code = Vec::with_capacity(code_len as usize);
        for i in 0..code_len as usize {
            code.push(acc.read_code_byte(i)?);
        }
        let code = String::from_utf8(code)
            .map_err(|e| Error::Cli(format!("contract {id} code is not valid UTF-8: {e}")))?;

        let cells_len = acc.cells_len()?;
        let cells = acc.read_cells(cells_len)?;
        let ptr = acc.read_ptr()?;

        contracts.insert(id.to_string(), ContractState { code, ptr, cells });
    }
    Ok(StateFile { contracts })
}

// -- proof file ------------------------------------------------------------

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProofFile {
    /// Keyed `"<step>:<gindex>"` rather than bare gindex, since the same
    /// gindex legitimately holds different pre-step values at different
    /// steps (e.g. `pc`, `gas`) and a single flat map could not hold both.
    pub nodes: BTreeMap<String, String>,
    pub step_roots: Vec<String>,
    pub access: Vec<Vec<String>>,
}

pub fn trace_to_proof_file(trace: &Trace) -> ProofFile {
    let mut nodes = BTreeMap::new();
    for (step_idx, record) in trace.steps.iter().enumerate() {
        for (&g, node) in &record.nodes {
            nodes.insert(format!("{step_idx}:{}", encode_gindex(g)), encode_node(node));
        }
    }
    let step_roots = trace.step_roots.iter().map(encode_node).collect();
    let access = trace
        .steps
        .iter()
        .map(|r| r.access.iter().map(|&g| encode_gindex(g)).collect())
        .collect();
    ProofFile { nodes, step_roots, access }
}

/// The rollback step is the only one that ever touches `snapshot_cells` /
/// `snapshot_ptr`; step 0 is always the base step; anything else is a plain
/// opcode step.
pub fn classify_step(step: usize, gindices: impl IntoIterator<Item = u64>) -> StepKind {
    if step == 0 {
        return StepKind::Base;
    }
    let touches_snapshot = gindices
        .into_iter()
        .any(|g| matches!(layout::field_of(g), Some(f) if f == field::SNAPSHOT_CELLS || f == field::SNAPSHOT_PTR));
    if touches_snapshot {
        StepKind::Rollback
    } else {
        StepKind::Opcode
    }
}

// -- witness file ------------------------------------------------------------

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct WitnessFile {
    pub node_by_gindex: BTreeMap<String, String>,
    pub pre_root: String,
    pub post_root: String,
    pub step: usize,
}

pub fn witness_to_file(w: &Witness) -> WitnessFile {
    let node_by_gindex =
        w.node_by_gindex.iter().map(|(&g, n)| (encode_gindex(g), encode_node(n))).collect();
    WitnessFile {
        node_by_gindex,
        pre_root: encode_node(&w.pre_root),
        post_root: encode_node(&w.post_root),
        step: w.step,
    }
}

/// Project the witness for `step` out of a full proof file.
pub fn witness_from_proof(proof: &ProofFile, step: usize) -> Result<Witness> {
    if step + 1 >= proof.step_roots.len() {
        return Err(Error::BadStepIndex(step));
    }
    let prefix = format!("{step}:");
    let mut node_by_gindex = HashMap::new();
    for (k, v) in &proof.nodes {
        if let Some(rest) = k.strip_prefix(&prefix) {
            node_by_gindex.insert(decode_gindex(rest)?, decode_node(v)?);
        }
    }

    let access_strs = proof.access.get(step).ok_or(Error::BadStepIndex(step))?;
    let access: Vec<u64> = access_strs.iter().map(|s| decode_gindex(s)).collect::<Result<_>>()?;
    let kind = classify_step(step, access.iter().copied());
    let contract_id = node_by_gindex
        .keys()
        .copied()
        .max_by_key(|&g| hasher::depth_of(g))
        .map(layout::contract_id_of)
        .ok_or(Error::BadStepIndex(step))?;

    Ok(Witness {
        contract_id,
        step,
        kind,
        pre_root: decode_node(&proof.step_roots[step])?,
        post_root: decode_node(&proof.step_roots[step + 1])?,
        node_by_gindex,
    })
}

/// Parse a standalone witness file, recovering `contract_id` and `kind`
/// from the gindices it carries exactly as [`witness_from_proof`] does.
pub fn witness_from_file(file: &WitnessFile) -> Result<Witness> {
    let mut node_by_gindex = HashMap::new();
    for (k, v) in &file.node_by_gindex {
        node_by_gindex.insert(decode_gindex(k)?, decode_node(v)?);
    }
    let kind = classify_step(file.step, node_by_gindex.keys().copied());
    let contract_id = node_by_gindex
        .keys()
        .copied()
        .max_by_key(|&g| hasher::depth_of(g))
        .map(layout::contract_id_of)
        .ok_or_else(|| Error::Cli("witness file carries no nodes".to_string()))?;

    Ok(Witness {
        contract_id,
        step: file.step,
        kind,
        pre_root: decode_node(&file.pre_root)?,
        post_root: decode_node(&file.post_root)?,
        node_by_gindex,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{driver as drv, trace::run_transition};

    #[test]
    fn node_and_gindex_round_trip() {
        let node = [7u8; 32];
        assert_eq!(decode_node(&encode_node(&node)).unwrap(), node);
        for g in [1u64, 2, 3, 1 << 20, u64::MAX >> 1] {
            assert_eq!(decode_gindex(&encode_gindex(g)).unwrap(), g);
        }
    }

    #[test]
    fn state_file_round_trips_through_the_tree() {
        let mut tree = BinaryMerkleTree::new();
        let mut contracts = BTreeMap::new();
        contracts.insert(
            "0".to_string(),
            ContractState { code: "+.".to_string(), ptr: 0, cells: vec![1, 2, 3] },
        );
        let state = StateFile { contracts };

        load_state(&mut tree, &state).unwrap();
        let dumped = dump_state(&mut tree, &[0]).unwrap();

        let c = &dumped.contracts["0"];
        assert_eq!(c.code, "+.");
        assert_eq!(c.ptr, 0);
        assert_eq!(&c.cells, &[1, 2, 3]);
    }

    #[test]
    fn serde_round_trips_a_state_file() {
        let mut contracts = BTreeMap::new();
        contracts.insert(
            "0".to_string(),
            ContractState { code: ",,,,,,,,,,,,,,,,,,,,,[>+++++++<-].".to_string(), ptr: 0, cells: vec![] },
        );
        let state = StateFile { contracts };
        let json = serde_json::to_string(&state).unwrap();
        let back: StateFile = serde_json::from_str(&json).unwrap();
        assert_eq!(back.contracts["0"].code, state.contracts["0"].code);
    }

    #[test]
    fn proof_and_witness_round_trip_through_json_and_verify() {
        let mut tree = BinaryMerkleTree::new();
        drv::load_contract(&mut tree, 0, b"+.", &[]).unwrap();
        let trace = run_transition(&mut tree, 0, &[0u8; drv::SENDER_LEN], &[]).unwrap();

        let proof = trace_to_proof_file(&trace);
        let json = serde_json::to_string(&proof).unwrap();
        let proof_back: ProofFile = serde_json::from_str(&json).unwrap();

        let w = witness_from_proof(&proof_back, 1).unwrap();
        assert_eq!(w.kind, StepKind::Opcode);
        assert_eq!(w.contract_id, 0);

        let wfile = witness_to_file(&w);
        let wjson = serde_json::to_string(&wfile).unwrap();
        let wfile_back: WitnessFile = serde_json::from_str(&wjson).unwrap();
        let w_back = witness_from_file(&wfile_back).unwrap();

        let recomputed = crate::verify::verify_step(&w_back).unwrap();
        assert_eq!(recomputed, w.post_root);
    }

    #[test]
    fn rollback_step_classifies_correctly_from_a_proof_file() {
        let mut tree = BinaryMerkleTree::new();
        drv::load_contract(&mut tree, 0, b"+[+]", &[5]).unwrap();
        let trace = run_transition(&mut tree, 0, &[1u8; drv::SENDER_LEN], &[]).unwrap();
        let proof = trace_to_proof_file(&trace);

        let last = trace.num_steps() - 1;
        let w = witness_from_proof(&proof, last).unwrap();
        assert_eq!(w.kind, StepKind::Rollback);
    }
}

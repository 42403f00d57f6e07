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

//! Projects a single step's multiproof out of a [`crate::trace::Trace`].

use std::collections::HashMap;

use crate::{
    error::{Error, Result},
    hasher::Node,
    trace::{StepKind, Trace},
};

/// Everything the step verifier needs to replay step `step` on its own,
/// with no access to the rest of the world state.
#[derive(Debug, Clone)]
pub struct Witness {
    pub contract_id: u8,
    pub step: usize,
    pub kind: StepKind,
    pub pre_root: Node,
    pub post_root: Node,
    pub node_by_gindex: HashMap<u64, Node>,
}

/// Extract the witness for `trace.steps[step]`. The trace already recorded
/// this step's multiproof against its own pre-root, so this is a projection,
/// not a recomputation.
pub fn extract(trace: &Trace, step: usize) -> Result<Witness> {
    let record = trace.steps.get(step).ok_or(Error::BadStepIndex(step))?;
    Ok(Witness {
        contract_id: trace.contract_id,
        step,
        kind: record.kind,
        pre_root: trace.step_roots[step],
        post_root: trace.step_roots[step + 1],
        node_by_gindex: record.nodes.clone(),
    })
}

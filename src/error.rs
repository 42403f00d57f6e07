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

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Host-layer errors. These are distinct from the one-byte execution-status
/// codes written into a contract's `status` field (see [`crate::vm`]):
/// a contract erroring out is expected and handled by the driver, while
/// these variants mean the host itself could not carry out the request.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("expected {expected} bytes, got {got}")]
    BadLength { expected: usize, got: usize },

    #[error("gindex {0:#x} was not present in the supplied witness")]
    InsufficientWitness(u64),

    #[error("witness pre-root does not match the tree built from its nodes")]
    BadPreRoot,

    #[error("contract id {0} is out of range (0..=255)")]
    BadContractId(u64),

    #[error("step index {0} is out of range for this trace")]
    BadStepIndex(usize),

    #[error("value {value} exceeds the capacity of list '{list}' ({capacity})")]
    ListCapacityExceeded { list: &'static str, value: usize, capacity: usize },

    #[error("{0}")]
    Cli(String),
}

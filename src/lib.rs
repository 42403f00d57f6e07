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

//! A Merkleized stepwise interpreter for a Brainfuck-execution rollup, and
//! the witness/verifier protocol that lets a single disputed step be
//! replayed from a sparse Merkle multiproof instead of full state.
//!
//! Module layout, leaves first: [`hasher`] and [`layout`] are pure
//! constants; [`bmt`] is the sparse tree they address; [`state`] mediates
//! every typed read/write the VM performs against it; [`vm`] and [`driver`]
//! run a transition; [`trace`] records one for later bisection; [`witness`]
//! projects a single step out of a trace; [`verify`] replays that step
//! against nothing but the witness. [`format`] and [`error`] are the
//! serialization and error boundary shared by all of the above and by the
//! `obf-cli` binary.

pub mod bmt;
pub mod driver;
pub mod error;
pub mod format;
pub mod hasher;
pub mod layout;
pub mod state;
pub mod trace;
pub mod verify;
pub mod vm;
pub mod witness;

pub use error::{Error, Result};

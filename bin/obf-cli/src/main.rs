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

//! CLI wrapper around the `obf` library: loads/writes the three JSON file
//! formats, drives a transition or a trace, and replays a single step from
//! a witness. All engine logic lives in `obf`; this binary is wiring only.

use std::{fs, path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use obf::{
    bmt::BinaryMerkleTree,
    driver, format,
    trace::run_transition,
    verify::verify_step,
    Error, Result,
};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

#[derive(Parser)]
#[clap(name = "obf", version, arg_required_else_help(true))]
struct Args {
    /// Increase log verbosity (-v, -vv)
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a canonical example state with contract 0 populated.
    InitState { out: PathBuf },
    /// Apply one transaction and write the resulting post-state.
    Transition {
        pre: PathBuf,
        post: PathBuf,
        sender: String,
        contract_id: String,
        payload: String,
    },
    /// Apply one transaction and emit its full Merkleized proof, without
    /// writing a post-state.
    Gen {
        pre: PathBuf,
        proof: PathBuf,
        sender: String,
        contract_id: String,
        payload: String,
    },
    /// Project a single step's witness out of a proof file.
    StepWitness { proof: PathBuf, witness: PathBuf, step: usize },
    /// Replay a single step from its witness and report the recomputed root.
    Verify { witness: PathBuf, claimed_post_root: String },
}

/// The canonical "multiply the payload byte by 7" demo program: discard the
/// 20-byte sender prefix, keep the payload byte, write its sevenfold product
/// into cell 1 and zero cell 0. Used by `init-state` and matching the worked
/// example in the schema this CLI implements.
const DEMO_CODE: &[u8] = b",,,,,,,,,,,,,,,,,,,,,[>+++++++<-].";

fn log_level(verbosity: u8) -> log::LevelFilter {
    match verbosity {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

fn parse_sender(s: &str) -> Result<[u8; driver::SENDER_LEN]> {
    let bytes = format::decode_hex_bytes(s)?;
    if bytes.len() != driver::SENDER_LEN {
        return Err(Error::BadLength { expected: driver::SENDER_LEN, got: bytes.len() });
    }
    let mut out = [0u8; driver::SENDER_LEN];
    out.copy_from_slice(&bytes);
    Ok(out)
}

fn parse_contract_id(s: &str) -> Result<u8> {
    let v: u64 = s.parse().map_err(|_| Error::Cli(format!("invalid contract id '{s}'")))?;
    u8::try_from(v).map_err(|_| Error::BadContractId(v))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn write_json<T: serde::Serialize>(path: &PathBuf, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    fs::write(path, bytes)?;
    Ok(())
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::InitState { out } => {
            let mut tree = BinaryMerkleTree::new();
            driver::load_contract(&mut tree, 0, DEMO_CODE, &[])?;
            let state = format::dump_state(&mut tree, &[0])?;
            write_json(&out, &state)?;
            log::info!("wrote canonical state to {}", out.display());
        }

        Command::Transition { pre, post, sender, contract_id, payload } => {
            let state: format::StateFile = read_json(&pre)?;
            let mut tree = BinaryMerkleTree::new();
            format::load_state(&mut tree, &state)?;

            let sender = parse_sender(&sender)?;
            let contract_id = parse_contract_id(&contract_id)?;
            let payload = format::decode_hex_bytes(&payload)?;

            run_transition(&mut tree, contract_id, &sender, &payload)?;

            let post_state = format::dump_state(&mut tree, &[contract_id])?;
            write_json(&post, &post_state)?;
            log::info!("wrote post-state to {}", post.display());
        }

        Command::Gen { pre, proof, sender, contract_id, payload } => {
            let state: format::StateFile = read_json(&pre)?;
            let mut tree = BinaryMerkleTree::new();
            format::load_state(&mut tree, &state)?;

            let sender = parse_sender(&sender)?;
            let contract_id = parse_contract_id(&contract_id)?;
            let payload = format::decode_hex_bytes(&payload)?;

            let trace = run_transition(&mut tree, contract_id, &sender, &payload)?;
            let proof_file = format::trace_to_proof_file(&trace);
            write_json(&proof, &proof_file)?;
            log::info!("wrote proof with {} steps to {}", trace.num_steps(), proof.display());
        }

        Command::StepWitness { proof, witness, step } => {
            let proof_file: format::ProofFile = read_json(&proof)?;
            let w = format::witness_from_proof(&proof_file, step)?;
            let witness_file = format::witness_to_file(&w);
            write_json(&witness, &witness_file)?;
            log::info!("wrote witness for step {step} to {}", witness.display());
        }

        Command::Verify { witness, claimed_post_root } => {
            let witness_file: format::WitnessFile = read_json(&witness)?;
            let w = format::witness_from_file(&witness_file)?;
            let recomputed = verify_step(&w)?;
            let claimed = format::decode_node(&claimed_post_root)?;

            println!("post contract root: {}", format::encode_node(&recomputed));
            if recomputed == claimed {
                println!("root matches, no fraud");
            } else {
                println!("root did not match, fraud detected!");
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let _ =
        TermLogger::init(log_level(args.verbose), Config::default(), TerminalMode::Mixed, ColorChoice::Auto);

    match run(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

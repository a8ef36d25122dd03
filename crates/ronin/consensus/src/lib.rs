//! Consortium Proof-of-Authority Consensus
//!
//! This crate implements the v1 consensus engine of the Ronin chain: a
//! permissioned proof-of-authority scheme where an authorized signer set
//! seals blocks in turns, re-anchored at fixed epoch checkpoints.
//!
//! # Architecture
//!
//! ```text
//! import pipeline                       mining pipeline
//!   headers ──► verifier ──┐              preparer ──► sealer
//!                          │                  │           │
//!                          ▼                  ▼           ▼
//!                  snapshot cache ◄── signer oracle    delayed
//!                  (memory + disk)                     publish
//! ```
//!
//! Verification reads signer-set snapshots folded over the header chain;
//! authoring fills headers, waits out the turn delay and signs with the
//! injected credentials. On the last v1 block, finalization hands off to
//! the successor engine through the epoch wrap-up applicator.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod api;
pub mod chain;
pub mod engine;
pub mod finalize;
pub mod oracle;
pub mod seal;
pub mod snapshot;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ConsortiumApi, RpcApi};
pub use chain::{
    Block, ChainHeaderReader, MemoryDb, OpEvent, Receipt, SignTxFn, SignerFn, SnapshotDb, State,
    Transaction, ValidatorsFn,
};
pub use engine::Consortium;
pub use finalize::{ApplyTransactOpts, EpochWrapper, EvmBlockContext};
pub use seal::{consortium_rlp, ecrecover, seal_hash, SigCache};
pub use snapshot::Snapshot;
pub use verify::VerifyAbort;

use alloy_primitives::U256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Number of recent snapshots to keep in memory
pub(crate) const INMEMORY_SNAPSHOTS: usize = 128;
/// Number of recent block signatures to keep in memory
pub(crate) const INMEMORY_SIGNATURES: usize = 4096;

/// Default number of blocks after which to checkpoint the signer list
pub const EPOCH_LENGTH: u64 = 30_000;

/// Fixed number of extra-data prefix bytes reserved for signer vanity
pub const EXTRA_VANITY: usize = 32;
/// Fixed number of extra-data suffix bytes reserved for the signer seal
pub const EXTRA_SEAL: usize = 65;

/// Block difficulty for in-turn signatures
pub const DIFF_IN_TURN: U256 = U256::from_limbs([7, 0, 0, 0]);
/// Block difficulty for out-of-turn signatures
pub const DIFF_NO_TURN: U256 = U256::from_limbs([3, 0, 0, 0]);

/// Random delay (per signer) to allow concurrent out-of-turn signers
pub const WIGGLE_TIME: Duration = Duration::from_millis(1000);

/// Number of recent headers past which a checkpoint is beyond any
/// plausible reorg and may be trusted without walking further back
pub(crate) const FULL_IMMUTABILITY_THRESHOLD: usize = 90_000;

/// Errors marking blocks invalid or the engine misconfigured.
///
/// Verification errors surface to the caller unchanged; cache misses are
/// never errors and the signature cache is purely advisory.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConsortiumError {
    #[error("unknown block")]
    UnknownBlock,

    #[error("unknown ancestor")]
    UnknownAncestor,

    #[error("block in the future")]
    FutureBlock,

    /// A nonce value is not 0x00..0
    #[error("nonce not 0x00..0")]
    InvalidNonce,

    #[error("extra-data 32 byte vanity prefix missing")]
    MissingVanity,

    #[error("extra-data 65 byte signature suffix missing")]
    MissingSignature,

    /// A non-checkpoint block carries signer data in its extra-data
    #[error("non-checkpoint block contains extra signer list")]
    ExtraSigners,

    #[error("invalid signer list on checkpoint block")]
    InvalidCheckpointSigners,

    #[error("non-zero mix digest")]
    InvalidMixDigest,

    #[error("non empty uncle hash")]
    InvalidUncleHash,

    /// The difficulty encodes neither an in-turn nor an out-of-turn seal
    #[error("invalid difficulty")]
    InvalidDifficulty,

    /// The difficulty does not match the turn-ness of the signer
    #[error("wrong difficulty")]
    WrongDifficulty,

    /// The timestamp is lower than the parent's plus the minimum period
    #[error("invalid timestamp")]
    InvalidTimestamp,

    /// A header is signed by a non-authorized entity
    #[error("unauthorized signer")]
    UnauthorizedSigner,

    /// The coinbase field does not match the signer of the block
    #[error("wrong coinbase address")]
    WrongCoinbase,

    #[error("signed recently, must wait for others")]
    RecentlySigned,

    /// The extra-data is too short to carry a seal at all
    #[error("extra-data too short to carry a seal")]
    ExtraTooShort,

    #[error("the length of system transactions does not match")]
    SystemTxMismatch,

    #[error("gas consumption of system transactions exceeds the gas limit")]
    GasOverflow,

    #[error("uncles not allowed")]
    UnclesNotAllowed,

    #[error("sealing paused while waiting for transactions")]
    WaitingForTransactions,

    /// The chain config selects a different consensus engine
    #[error("chain config does not select the consortium engine")]
    EngineNotSelected,

    /// No validator list is hardcoded for this chain
    #[error("no genesis validator set for chain {0}, only mainnet and testnet are supported")]
    NoGenesisValidators(u64),

    /// A required injected provider was never supplied
    #[error("no {0} supplied")]
    MissingOracle(&'static str),

    #[error("signature recovery failed: {0}")]
    Signature(#[from] secp256k1::Error),

    /// Snapshot persistence failed
    #[error("snapshot store: {0}")]
    Store(String),

    #[error(transparent)]
    ChainConfig(#[from] ronin_chainspec::ChainConfigError),
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

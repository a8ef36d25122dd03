//! Interfaces the engine consumes from the host node.
//!
//! The EVM, transaction pool and networking stack stay outside the
//! engine; everything it needs from them comes through the traits and
//! injected closures defined here.

use crate::ConsortiumError;
use alloy_consensus::Header;
use alloy_primitives::{Address, Bytes, B256};
use parking_lot::Mutex;
use ronin_chainspec::ChainConfig;
use std::collections::HashMap;
use std::sync::Arc;

/// Block-context hook applied by the EVM while executing system calls.
pub type OpEvent = Arc<dyn Fn(&mut dyn State, &Header) -> Result<(), ConsortiumError> + Send + Sync>;

/// Signer function injected by the key manager to authorize seal hashes.
///
/// Receives the signing address and the raw preimage, returns the 65-byte
/// `r || s || v` signature.
pub type SignerFn =
    Arc<dyn Fn(Address, &[u8]) -> Result<[u8; 65], ConsortiumError> + Send + Sync>;

/// Transaction signer injected alongside [`SignerFn`]; the chain ID
/// selects the replay-protection domain.
pub type SignTxFn =
    Arc<dyn Fn(Address, Transaction, Option<u64>) -> Result<Transaction, ConsortiumError> + Send + Sync>;

/// Provider of the current validator list, read from a contract.
pub type ValidatorsFn = Arc<dyn Fn() -> Result<Vec<Address>, ConsortiumError> + Send + Sync>;

/// Read access to the canonical header chain.
pub trait ChainHeaderReader: Send + Sync {
    /// The chain configuration the chain was initialised with.
    fn config(&self) -> Arc<ChainConfig>;

    /// Retrieves a header from the database by hash and number.
    fn get_header(&self, hash: B256, number: u64) -> Option<Header>;

    /// Retrieves a canonical header from the database by number.
    fn get_header_by_number(&self, number: u64) -> Option<Header>;

    /// Block-context hooks forwarded into the EVM for system calls.
    fn op_events(&self) -> Vec<OpEvent> {
        Vec::new()
    }
}

/// Mutable world state handed to the finalizer.
pub trait State: Send {
    /// Computes the current root hash of the state trie. `delete_empty_objects`
    /// toggles EIP-158 empty-account clearing.
    fn intermediate_root(&mut self, delete_empty_objects: bool) -> B256;
}

/// Byte-oriented store for snapshot checkpoints.
pub trait SnapshotDb: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ConsortiumError>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), ConsortiumError>;
}

/// In-memory [`SnapshotDb`], used in tests and for ephemeral nodes.
#[derive(Debug, Default)]
pub struct MemoryDb(Mutex<HashMap<Vec<u8>, Vec<u8>>>);

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SnapshotDb for MemoryDb {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, ConsortiumError> {
        Ok(self.0.lock().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), ConsortiumError> {
        self.0.lock().insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}

/// A transaction as seen by the engine.
///
/// The engine never executes transactions; it only counts, forwards and
/// reorders them, so this carries just enough for the injected applicator
/// to do its work.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    pub hash: B256,
    pub nonce: u64,
    pub to: Option<Address>,
    pub input: Bytes,
    pub gas: u64,
}

/// Execution receipt paired with a [`Transaction`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: B256,
    pub success: bool,
    pub gas_used: u64,
    pub cumulative_gas_used: u64,
}

/// A block as assembled and sealed by the engine.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
    pub ommers: Vec<Header>,
}

impl Block {
    pub fn new(header: Header, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            transactions,
            ommers: Vec::new(),
        }
    }

    /// Hash of the block header.
    pub fn hash(&self) -> B256 {
        self.header.hash_slow()
    }

    /// The same block with its header swapped for the sealed one.
    pub fn with_seal(&self, header: Header) -> Block {
        Block {
            header,
            transactions: self.transactions.clone(),
            ommers: self.ommers.clone(),
        }
    }
}

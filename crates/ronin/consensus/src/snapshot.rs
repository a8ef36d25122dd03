//! Signer-set snapshots.
//!
//! A snapshot is the authorization state at a single block: which
//! addresses may seal, in which turn order, and who sealed recently. It
//! is a pure function of the header chain since the previous checkpoint,
//! so snapshots can be cached aggressively and rebuilt from headers at
//! any time.

use crate::chain::SnapshotDb;
use crate::seal::{checkpoint_signers, ecrecover, SigCache};
use crate::ConsortiumError;
use alloy_consensus::Header;
use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Database key prefix for persisted snapshots.
const STORE_PREFIX: &[u8] = b"consortium-";

/// The authorization state of the signer set at a given block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Block number where the snapshot was created
    pub number: u64,
    /// Block hash where the snapshot was created
    pub hash: B256,
    /// Set of authorized signers at this moment
    pub signer_set: HashSet<Address>,
    /// Ordered list of signers; the index position defines sealing turns
    pub signer_list: Vec<Address>,
    /// Signers of recent blocks, by sealed block number
    pub recents: BTreeMap<u64, Address>,
}

impl Snapshot {
    /// Creates a new snapshot with the specified startup set of signers.
    /// Used at genesis and at trusted checkpoints.
    pub fn new(number: u64, hash: B256, signers: Vec<Address>) -> Self {
        Self {
            number,
            hash,
            signer_set: signers.iter().copied().collect(),
            signer_list: signers,
            recents: BTreeMap::new(),
        }
    }

    fn store_key(hash: &B256) -> Vec<u8> {
        [STORE_PREFIX, hash.as_slice()].concat()
    }

    /// Loads an existing snapshot from the database.
    pub fn load(db: &dyn SnapshotDb, hash: B256) -> Result<Snapshot, ConsortiumError> {
        let raw = db
            .get(&Self::store_key(&hash))?
            .ok_or(ConsortiumError::UnknownBlock)?;
        serde_json::from_slice(&raw).map_err(|err| ConsortiumError::Store(err.to_string()))
    }

    /// Inserts the snapshot into the database, keyed by its anchor hash.
    pub fn store(&self, db: &dyn SnapshotDb) -> Result<(), ConsortiumError> {
        let raw = serde_json::to_vec(self).map_err(|err| ConsortiumError::Store(err.to_string()))?;
        db.put(&Self::store_key(&self.hash), &raw)
    }

    /// Creates a new snapshot by applying the given headers on top.
    ///
    /// `headers` must form a contiguous ascending run attached to this
    /// snapshot's anchor. The fold is deterministic and associative:
    /// applying a run in one go equals applying any split of it in order.
    pub fn apply(
        &self,
        headers: &[Header],
        epoch: u64,
        sigcache: &SigCache,
    ) -> Result<Snapshot, ConsortiumError> {
        if headers.is_empty() {
            return Ok(self.clone());
        }
        for window in headers.windows(2) {
            if window[1].number != window[0].number + 1 {
                return Err(ConsortiumError::UnknownAncestor);
            }
        }
        if headers[0].number != self.number + 1 {
            return Err(ConsortiumError::UnknownAncestor);
        }

        let mut snap = self.clone();
        for header in headers {
            let number = header.number;
            let signer = ecrecover(header, sigcache)?;
            if !snap.signer_set.contains(&signer) {
                return Err(ConsortiumError::UnauthorizedSigner);
            }
            let limit = snap.signer_list.len() as u64 / 2;
            for (&seen, &recent) in &snap.recents {
                if recent == signer && number - seen <= limit {
                    return Err(ConsortiumError::RecentlySigned);
                }
            }
            // Entries past the window stop constraining anyone.
            snap.recents.retain(|&seen, _| seen + limit >= number);
            snap.recents.insert(number, signer);

            // Checkpoint headers re-anchor the signer list from the list
            // embedded in their extra-data and reset the window.
            if number % epoch == 0 {
                let signers = checkpoint_signers(&header.extra_data)?;
                snap.signer_set = signers.iter().copied().collect();
                snap.signer_list = signers;
                snap.recents.clear();
            }

            snap.number = number;
            snap.hash = header.hash_slow();
        }
        Ok(snap)
    }
}

//! Header verification.
//!
//! Standalone checks validate a header in isolation; cascading checks
//! pull in the parent and the authorization snapshot. The batch verifier
//! runs asynchronously and reports results in input order, letting each
//! header lean on the already-verified prefix as its parent set.

use crate::chain::{Block, ChainHeaderReader};
use crate::engine::Consortium;
use crate::seal::{checkpoint_signers, ecrecover};
use crate::{unix_now, ConsortiumError, DIFF_IN_TURN, DIFF_NO_TURN, EXTRA_SEAL, EXTRA_VANITY};
use alloy_consensus::constants::EMPTY_OMMER_ROOT_HASH;
use alloy_consensus::Header;
use alloy_primitives::{Address, B256, B64};
use ronin_chainspec::verify_fork_hashes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::error;

/// Handle aborting an in-flight batch verification.
#[derive(Clone, Debug, Default)]
pub struct VerifyAbort(Arc<AtomicBool>);

impl VerifyAbort {
    /// Stops the batch after the item currently being verified; results
    /// already emitted stay valid.
    pub fn abort(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    fn is_aborted(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

impl Consortium {
    /// Checks whether a header conforms to the consensus rules.
    pub fn verify_header(
        &self,
        chain: &dyn ChainHeaderReader,
        header: &Header,
        _seal: bool,
    ) -> Result<(), ConsortiumError> {
        self.verify_header_and_parents(chain, header, &[])
    }

    /// Verifies a batch of headers concurrently with the caller.
    ///
    /// Results arrive on the returned channel in input order; each
    /// header is verified against the prefix preceding it in `headers`,
    /// so batches spanning unimported chain segments verify cleanly.
    pub fn verify_headers(
        self: Arc<Self>,
        chain: Arc<dyn ChainHeaderReader>,
        headers: Vec<Header>,
        _seals: Vec<bool>,
    ) -> (VerifyAbort, mpsc::Receiver<Result<(), ConsortiumError>>) {
        let (results_tx, results_rx) = mpsc::channel(headers.len().max(1));
        let abort = VerifyAbort::default();

        let engine = self;
        let handle = abort.clone();
        tokio::spawn(async move {
            for index in 0..headers.len() {
                if handle.is_aborted() {
                    return;
                }
                let result =
                    engine.verify_header_and_parents(chain.as_ref(), &headers[index], &headers[..index]);
                if results_tx.send(result).await.is_err() {
                    return;
                }
            }
        });
        (abort, results_rx)
    }

    /// Checks whether a header conforms to the consensus rules, given an
    /// optional batch of ascending parents not yet in the database.
    pub(crate) fn verify_header_and_parents(
        &self,
        chain: &dyn ChainHeaderReader,
        header: &Header,
        parents: &[Header],
    ) -> Result<(), ConsortiumError> {
        let number = header.number;

        // Don't waste time checking blocks from the future
        if header.timestamp > unix_now() {
            return Err(ConsortiumError::FutureBlock);
        }
        // Nonces must be 0x00..0
        if header.nonce != B64::ZERO {
            return Err(ConsortiumError::InvalidNonce);
        }
        // The extra-data has to contain both the vanity and the signature
        if header.extra_data.len() < EXTRA_VANITY {
            return Err(ConsortiumError::MissingVanity);
        }
        if header.extra_data.len() < EXTRA_VANITY + EXTRA_SEAL {
            return Err(ConsortiumError::MissingSignature);
        }
        // Checkpoint blocks embed a signer list, no other block may
        let checkpoint = number % self.config.epoch == 0;
        let signers_bytes = header.extra_data.len() - EXTRA_VANITY - EXTRA_SEAL;
        if !checkpoint && signers_bytes != 0 {
            return Err(ConsortiumError::ExtraSigners);
        }
        if checkpoint && signers_bytes % Address::len_bytes() != 0 {
            return Err(ConsortiumError::InvalidCheckpointSigners);
        }
        // The mix digest is zero as there is no fork protection
        if header.mix_hash != B256::ZERO {
            return Err(ConsortiumError::InvalidMixDigest);
        }
        // Uncles are meaningless in proof-of-authority
        if header.ommers_hash != EMPTY_OMMER_ROOT_HASH {
            return Err(ConsortiumError::InvalidUncleHash);
        }
        // The difficulty has to encode a turn (it may still be the wrong
        // turn at this point)
        if number > 0 && header.difficulty != DIFF_IN_TURN && header.difficulty != DIFF_NO_TURN {
            return Err(ConsortiumError::InvalidDifficulty);
        }
        // Hard-fork specific fields
        verify_fork_hashes(&chain.config(), header)?;

        self.verify_cascading_fields(chain, header, parents)
    }

    /// Verifies the header fields that depend on previous headers.
    fn verify_cascading_fields(
        &self,
        chain: &dyn ChainHeaderReader,
        header: &Header,
        parents: &[Header],
    ) -> Result<(), ConsortiumError> {
        // The genesis block is the always valid dead-end
        let number = header.number;
        if number == 0 {
            return Ok(());
        }
        let parent = match parents.last() {
            Some(parent) => parent.clone(),
            None => chain
                .get_header(header.parent_hash, number - 1)
                .ok_or(ConsortiumError::UnknownAncestor)?,
        };
        if parent.number != number - 1 || parent.hash_slow() != header.parent_hash {
            return Err(ConsortiumError::UnknownAncestor);
        }
        if parent.timestamp + self.config.period > header.timestamp {
            return Err(ConsortiumError::InvalidTimestamp);
        }

        if number % self.config.epoch != 0 {
            return self.verify_seal_with_parents(chain, header, parents);
        }

        // Checkpoint headers must embed exactly the signer list the
        // contract reports for the previous block.
        if !self.skip_checkpoint_header_check {
            let signers = self.validators_from_contract(chain, number - 1)?;
            let embedded = checkpoint_signers(&header.extra_data)?;
            if !same_signers(&embedded, &signers) {
                error!(
                    target: "ronin::consensus",
                    number,
                    signers_header = ?embedded,
                    ?signers,
                    "Signer lists differ between checkpoint header and contract"
                );
                return Err(ConsortiumError::InvalidCheckpointSigners);
            }
        }

        self.verify_seal_with_parents(chain, header, parents)
    }

    /// Checks whether the signature contained in the header satisfies
    /// the consensus protocol requirements.
    pub fn verify_seal(
        &self,
        chain: &dyn ChainHeaderReader,
        header: &Header,
    ) -> Result<(), ConsortiumError> {
        self.verify_seal_with_parents(chain, header, &[])
    }

    pub(crate) fn verify_seal_with_parents(
        &self,
        chain: &dyn ChainHeaderReader,
        header: &Header,
        parents: &[Header],
    ) -> Result<(), ConsortiumError> {
        // Verifying the genesis block is not supported
        let number = header.number;
        if number == 0 {
            return Err(ConsortiumError::UnknownBlock);
        }
        // Retrieve the snapshot needed to verify this header and cache it
        let snap = self.snapshot(chain, number - 1, header.parent_hash, parents)?;

        let signer = ecrecover(header, &self.signatures)?;
        if signer != header.beneficiary {
            return Err(ConsortiumError::WrongCoinbase);
        }
        if !snap.signer_set.contains(&signer) {
            return Err(ConsortiumError::UnauthorizedSigner);
        }
        // The recent-signer window is enforced when sealing and when
        // folding snapshots, not here.
        let inturn = self.signer_in_turn(signer, number, &snap.signer_list);
        if inturn && header.difficulty != DIFF_IN_TURN {
            return Err(ConsortiumError::WrongDifficulty);
        }
        if !inturn && header.difficulty != DIFF_NO_TURN {
            return Err(ConsortiumError::WrongDifficulty);
        }
        Ok(())
    }

    /// Uncles are not permitted under proof-of-authority.
    pub fn verify_uncles(
        &self,
        _chain: &dyn ChainHeaderReader,
        block: &Block,
    ) -> Result<(), ConsortiumError> {
        if !block.ommers.is_empty() {
            return Err(ConsortiumError::UnclesNotAllowed);
        }
        Ok(())
    }
}

/// Set equality of two signer lists, any order.
fn same_signers(a: &[Address], b: &[Address]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut left = a.to_vec();
    let mut right = b.to_vec();
    left.sort_unstable();
    right.sort_unstable();
    left == right
}

//! The Consortium proof-of-authority engine.
//!
//! One engine instance serves both the import pipeline (header
//! verification) and the mining pipeline (prepare, seal, finalize)
//! concurrently. Signer credentials are injected at runtime through
//! [`Consortium::authorize`]; validator-list providers through
//! [`Consortium::set_sc_validators_fn`] and
//! [`Consortium::set_fenix_validators_fn`].

use crate::chain::{
    Block, ChainHeaderReader, SignTxFn, SignerFn, SnapshotDb, ValidatorsFn,
};
use crate::finalize::{ContractIntegrator, EpochWrapper};
use crate::oracle::SignerOracle;
use crate::seal::{checkpoint_signers, consortium_rlp, ecrecover, seal_hash, SigCache};
use crate::snapshot::Snapshot;
use crate::{
    unix_now, ConsortiumError, DIFF_IN_TURN, DIFF_NO_TURN, EPOCH_LENGTH, EXTRA_SEAL, EXTRA_VANITY,
    FULL_IMMUTABILITY_THRESHOLD, INMEMORY_SIGNATURES, INMEMORY_SNAPSHOTS, WIGGLE_TIME,
};
use alloy_consensus::Header;
use alloy_primitives::{Address, B256, B64, U256};
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use ronin_chainspec::{ChainConfig, ConsortiumConfig};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, trace, warn};

/// Signing credentials injected via [`Consortium::authorize`].
#[derive(Clone, Default)]
pub(crate) struct Credentials {
    pub val: Address,
    pub sign_fn: Option<SignerFn>,
    pub sign_tx_fn: Option<SignTxFn>,
}

/// Consortium is the proof-of-authority consensus engine governing the
/// chain until the v2 engine takes over.
pub struct Consortium {
    pub(crate) chain_config: Arc<ChainConfig>,
    /// Engine parameters, with the epoch defaulted when unset
    pub(crate) config: ConsortiumConfig,
    /// Database to store and retrieve snapshot checkpoints
    pub(crate) db: Arc<dyn SnapshotDb>,

    /// Snapshots for recent blocks to speed up reorgs
    pub(crate) recents: Mutex<LruCache<B256, Arc<Snapshot>>>,
    /// Signatures of recent blocks to speed up mining
    pub(crate) signatures: Arc<SigCache>,

    /// Current list of proposals we are pushing
    proposals: Mutex<HashMap<Address, bool>>,

    pub(crate) credentials: RwLock<Credentials>,
    pub(crate) contract: RwLock<Option<ContractIntegrator>>,
    applicator: Option<Arc<dyn EpochWrapper>>,

    sc_validators_fn: RwLock<Option<ValidatorsFn>>,
    fenix_validators_fn: RwLock<Option<ValidatorsFn>>,

    pub(crate) skip_checkpoint_header_check: bool,
}

impl Consortium {
    /// Creates a Consortium engine from the chain configuration.
    ///
    /// `applicator` performs the epoch wrap-up system calls at the v2
    /// handoff; it may be omitted on chains that never schedule v2.
    pub fn new(
        chain_config: Arc<ChainConfig>,
        db: Arc<dyn SnapshotDb>,
        applicator: Option<Arc<dyn EpochWrapper>>,
        skip_checkpoint_header_check: bool,
    ) -> Result<Self, ConsortiumError> {
        let mut config = *chain_config
            .engine
            .consortium()
            .ok_or(ConsortiumError::EngineNotSelected)?;
        if config.epoch == 0 {
            config.epoch = EPOCH_LENGTH;
        }

        let engine = Self {
            chain_config,
            config,
            db,
            recents: Mutex::new(LruCache::new(cache_capacity(INMEMORY_SNAPSHOTS))),
            signatures: Arc::new(SigCache::new(INMEMORY_SIGNATURES)),
            proposals: Mutex::new(HashMap::new()),
            credentials: RwLock::new(Credentials::default()),
            contract: RwLock::new(None),
            applicator,
            sc_validators_fn: RwLock::new(None),
            fenix_validators_fn: RwLock::new(None),
            skip_checkpoint_header_check,
        };
        if let Err(err) = engine.init_contract(Address::ZERO, None) {
            error!(target: "ronin::consensus", %err, "Failed to init system contract caller");
        }
        Ok(engine)
    }

    /// Sets the provider reading the validator list from the pre-Fenix
    /// contract.
    pub fn set_sc_validators_fn(&self, provider: ValidatorsFn) {
        *self.sc_validators_fn.write() = Some(provider);
    }

    /// Sets the provider reading the validator list from the Ronin
    /// validator-set contract of the Fenix hardfork.
    pub fn set_fenix_validators_fn(&self, provider: ValidatorsFn) {
        *self.fenix_validators_fn.write() = Some(provider);
    }

    /// Returns the Ethereum address recovered from the signature in the
    /// header's extra-data section.
    pub fn author(&self, header: &Header) -> Result<Address, ConsortiumError> {
        ecrecover(header, &self.signatures)
    }

    /// Returns the hash of a block prior to it being sealed.
    pub fn seal_hash(&self, header: &Header) -> Result<B256, ConsortiumError> {
        seal_hash(header)
    }

    /// Injects a private key into the consensus engine to mint new
    /// blocks with, and re-initializes the system-contract integrator
    /// under the new credentials.
    pub fn authorize(&self, signer: Address, sign_fn: SignerFn, sign_tx_fn: SignTxFn) {
        {
            let mut credentials = self.credentials.write();
            credentials.val = signer;
            credentials.sign_fn = Some(sign_fn);
            credentials.sign_tx_fn = Some(sign_tx_fn.clone());
        }
        if let Err(err) = self.init_contract(signer, Some(sign_tx_fn)) {
            error!(target: "ronin::consensus", %err, "Failed to init system contract caller");
        }
    }

    /// There are no background threads to tear down.
    pub fn close(&self) -> Result<(), ConsortiumError> {
        Ok(())
    }

    fn init_contract(
        &self,
        coinbase: Address,
        sign_tx_fn: Option<SignTxFn>,
    ) -> Result<(), ConsortiumError> {
        if self.chain_config.consortium_v2_block.is_some()
            && self.chain_config.consortium_v2_contracts.is_some()
        {
            let applicator = self
                .applicator
                .clone()
                .ok_or(ConsortiumError::MissingOracle("epoch wrap-up applicator"))?;
            *self.contract.write() = Some(ContractIntegrator::new(
                applicator,
                coinbase,
                sign_tx_fn,
                self.chain_config.chain_id,
            ));
        }
        Ok(())
    }

    /// Retrieves the authorization snapshot at a given point in time.
    ///
    /// Walks backwards from `(number, hash)` collecting headers until a
    /// cached, persisted or trusted snapshot anchors the fold, then
    /// applies the collected run forward. `parents` supplies in-memory
    /// headers that are not in the database yet; they are consumed from
    /// the tail.
    pub(crate) fn snapshot(
        &self,
        chain: &dyn ChainHeaderReader,
        mut number: u64,
        mut hash: B256,
        mut parents: &[Header],
    ) -> Result<Arc<Snapshot>, ConsortiumError> {
        let mut headers: Vec<Header> = Vec::new();
        let snap = loop {
            // In-memory snapshot found, use that
            if let Some(cached) = self.recents.lock().get(&hash) {
                break cached.clone();
            }
            // On-disk checkpoint snapshot, use that
            if number % self.config.epoch == 0 {
                if let Ok(stored) = Snapshot::load(self.db.as_ref(), hash) {
                    trace!(target: "ronin::snapshot", number, %hash, "Loaded snapshot from disk");
                    break Arc::new(stored);
                }
            }
            // At genesis, or at a checkpoint without an available parent
            // (light sync), or past the reorg-immunity depth (chain
            // re-init from a freezer): trust the checkpoint and snapshot
            // the hardcoded validator list.
            if number == 0
                || (number % self.config.epoch == 0
                    && (headers.len() > FULL_IMMUTABILITY_THRESHOLD
                        || chain.get_header_by_number(number - 1).is_none()))
            {
                if let Some(checkpoint) = chain.get_header_by_number(number) {
                    let checkpoint_hash = checkpoint.hash_slow();
                    let validators = self.validators_from_genesis()?;
                    let trusted = Snapshot::new(number, checkpoint_hash, validators);
                    trusted.store(self.db.as_ref())?;
                    tracing::info!(
                        target: "ronin::snapshot",
                        number,
                        hash = %checkpoint_hash,
                        "Stored checkpoint snapshot to disk"
                    );
                    break Arc::new(trusted);
                }
            }
            if number == 0 {
                return Err(ConsortiumError::UnknownAncestor);
            }
            // No snapshot for this header, gather it and move backward
            let header = if let Some((last, rest)) = parents.split_last() {
                // Explicit parents are enforced to match the walk
                if last.hash_slow() != hash || last.number != number {
                    return Err(ConsortiumError::UnknownAncestor);
                }
                parents = rest;
                last.clone()
            } else {
                chain
                    .get_header(hash, number)
                    .ok_or(ConsortiumError::UnknownAncestor)?
            };
            hash = header.parent_hash;
            number -= 1;
            headers.push(header);
        };

        let applied = !headers.is_empty();
        let snap = if applied {
            // The walk collected newest-first; apply wants ascending order.
            headers.reverse();
            Arc::new(snap.apply(&headers, self.config.epoch, &self.signatures)?)
        } else {
            snap
        };
        self.recents.lock().put(snap.hash, snap.clone());

        // A freshly generated checkpoint snapshot goes to disk.
        if applied && snap.number % self.config.epoch == 0 {
            snap.store(self.db.as_ref())?;
            tracing::info!(
                target: "ronin::snapshot",
                number = snap.number,
                hash = %snap.hash,
                "Stored checkpoint snapshot to disk"
            );
        }
        Ok(snap)
    }

    /// Raw snapshot view for host integration and the RPC surface.
    pub fn get_snapshot(
        &self,
        chain: &dyn ChainHeaderReader,
        number: u64,
        hash: B256,
        parents: &[Header],
    ) -> Option<Arc<Snapshot>> {
        self.snapshot(chain, number, hash, parents).ok()
    }

    /// Prepares the consensus fields of a header for running the
    /// transactions on top.
    pub fn prepare(
        &self,
        chain: &dyn ChainHeaderReader,
        header: &mut Header,
    ) -> Result<(), ConsortiumError> {
        let number = header.number;
        if number == 0 {
            return Err(ConsortiumError::UnknownBlock);
        }
        let val = self.credentials.read().val;
        header.beneficiary = val;
        header.nonce = B64::ZERO;

        let validators = self.validators_at_last_checkpoint(chain, number - 1, &[])?;
        header.difficulty = self.do_calc_difficulty(val, number, &validators);

        // Vanity prefix, checkpoint signer list, zeroed seal placeholder.
        let mut extra = header.extra_data.to_vec();
        extra.resize(EXTRA_VANITY, 0);
        if number % self.config.epoch == 0 {
            for signer in self.validators_from_contract(chain, number)? {
                extra.extend_from_slice(signer.as_slice());
            }
        }
        extra.extend_from_slice(&[0u8; EXTRA_SEAL]);
        header.extra_data = extra.into();

        // Mix digest is reserved for now, set to empty
        header.mix_hash = B256::ZERO;

        let parent = chain
            .get_header(header.parent_hash, number - 1)
            .ok_or(ConsortiumError::UnknownAncestor)?;
        header.timestamp = (parent.timestamp + self.config.period).max(unix_now());
        Ok(())
    }

    /// Attempts to create a sealed block using the local signing
    /// credentials.
    ///
    /// The signed block is published on `results` after the turn delay
    /// elapses, unless `stop` fires (or is dropped) first. Publishing is
    /// non-blocking: a slow consumer loses the block with a warning.
    pub fn seal(
        &self,
        chain: &dyn ChainHeaderReader,
        block: &Block,
        results: mpsc::Sender<Block>,
        stop: oneshot::Receiver<()>,
    ) -> Result<(), ConsortiumError> {
        let mut header = block.header.clone();
        let number = header.number;
        // Sealing the genesis block is not supported
        if number == 0 {
            return Err(ConsortiumError::UnknownBlock);
        }
        // For 0-period chains, refuse to seal empty blocks (no reward
        // but would spin sealing)
        if self.config.period == 0 && block.transactions.is_empty() {
            return Err(ConsortiumError::WaitingForTransactions);
        }
        // Don't hold the credential lock for the entire sealing procedure
        let (signer, sign_fn) = {
            let credentials = self.credentials.read();
            (credentials.val, credentials.sign_fn.clone())
        };
        let sign_fn = sign_fn.ok_or(ConsortiumError::MissingOracle("signer function"))?;

        let validators = self.validators_at_last_checkpoint(chain, number - 1, &[])?;
        if !validators.contains(&signer) {
            return Err(ConsortiumError::UnauthorizedSigner);
        }
        let snap = self.snapshot(chain, number - 1, header.parent_hash, &[])?;
        // If we're amongst the recent signers, wait for the next block
        for (&seen, &recent) in &snap.recents {
            if recent == signer {
                let limit = validators.len() as u64 / 2 + 1;
                if seen > number.saturating_sub(limit) {
                    return Err(ConsortiumError::RecentlySigned);
                }
            }
        }

        // The protocol permits us to sign the block, wait for our slot
        let mut delay = Duration::from_secs(header.timestamp.saturating_sub(unix_now()));
        if !self.signer_in_turn(signer, number, &validators) {
            let wiggle = WIGGLE_TIME * (validators.len() as u32 / 2 + 1);
            let jitter = rand::rng().random_range(0..wiggle.as_millis() as u64);
            delay += Duration::from_millis(jitter) + WIGGLE_TIME;
            trace!(target: "ronin::consensus", ?wiggle, "Out-of-turn signing requested");
        }

        let signature = sign_fn(signer, &consortium_rlp(&header)?)?;
        let mut extra = header.extra_data.to_vec();
        let seal_start = extra.len() - EXTRA_SEAL;
        extra[seal_start..].copy_from_slice(&signature);
        header.extra_data = extra.into();

        trace!(target: "ronin::consensus", ?delay, "Waiting for slot to sign and propagate");
        let sealhash = seal_hash(&header)?;
        let sealed = block.with_seal(header);
        tokio::spawn(async move {
            tokio::select! {
                _ = stop => return,
                _ = tokio::time::sleep(delay) => {}
            }
            if results.try_send(sealed).is_err() {
                warn!(target: "ronin::consensus", %sealhash, "Sealing result is not read by miner");
            }
        });
        Ok(())
    }

    /// The difficulty a new block on top of `parent` should carry: 7 if
    /// the local signer is in turn, 3 otherwise.
    pub fn calc_difficulty(
        &self,
        chain: &dyn ChainHeaderReader,
        _time: u64,
        parent: &Header,
    ) -> Result<U256, ConsortiumError> {
        let number = parent.number + 1;
        let validators =
            self.validators_at_last_checkpoint(chain, number - 1, std::slice::from_ref(parent))?;
        Ok(self.do_calc_difficulty(self.credentials.read().val, number, &validators))
    }

    pub(crate) fn do_calc_difficulty(
        &self,
        signer: Address,
        number: u64,
        validators: &[Address],
    ) -> U256 {
        if self.signer_in_turn(signer, number, validators) {
            DIFF_IN_TURN
        } else {
            DIFF_NO_TURN
        }
    }

    /// Whether `signer` is in turn at `number`, counting turns from the
    /// last checkpoint.
    pub(crate) fn signer_in_turn(&self, signer: Address, number: u64, validators: &[Address]) -> bool {
        if validators.is_empty() {
            return false;
        }
        let last_checkpoint = number / self.config.epoch * self.config.epoch;
        let index = ((number - last_checkpoint) % validators.len() as u64) as usize;
        validators[index] == signer
    }

    /// The validator list hardcoded at genesis; only the production
    /// networks carry one.
    pub(crate) fn validators_from_genesis(&self) -> Result<Vec<Address>, ConsortiumError> {
        SignerOracle::GenesisHardcoded {
            chain_id: self.chain_config.chain_id,
        }
        .current_signers()
    }

    /// Reads the validator list from the contract provider active at
    /// `number`.
    pub(crate) fn validators_from_contract(
        &self,
        chain: &dyn ChainHeaderReader,
        number: u64,
    ) -> Result<Vec<Address>, ConsortiumError> {
        if chain.config().is_fenix(number) {
            let provider = self.fenix_validators_fn.read();
            match provider.as_ref() {
                Some(provider) => SignerOracle::FenixContract(provider).current_signers(),
                None => Err(ConsortiumError::MissingOracle("get_fenix_validators")),
            }
        } else {
            let provider = self.sc_validators_fn.read();
            match provider.as_ref() {
                Some(provider) => SignerOracle::PreFenixContract(provider).current_signers(),
                None => Err(ConsortiumError::MissingOracle("get_sc_validators")),
            }
        }
    }

    /// The validator list embedded in the extra-data of the last
    /// checkpoint at or below `number`.
    ///
    /// While syncing, the database may not have stored the most recent
    /// headers yet, so callers can pass them in through `recents`.
    pub(crate) fn validators_at_last_checkpoint(
        &self,
        chain: &dyn ChainHeaderReader,
        number: u64,
        recents: &[Header],
    ) -> Result<Vec<Address>, ConsortiumError> {
        let last_checkpoint = number / self.config.epoch * self.config.epoch;
        if last_checkpoint == 0 {
            return self.validators_from_genesis();
        }
        let header = recents
            .iter()
            .find(|parent| parent.number == last_checkpoint)
            .cloned()
            .or_else(|| chain.get_header_by_number(last_checkpoint))
            .ok_or(ConsortiumError::UnknownAncestor)?;
        checkpoint_signers(&header.extra_data)
    }

    pub(crate) fn propose(&self, address: Address, auth: bool) {
        self.proposals.lock().insert(address, auth);
    }

    pub(crate) fn discard(&self, address: Address) {
        self.proposals.lock().remove(&address);
    }

    pub(crate) fn current_proposals(&self) -> HashMap<Address, bool> {
        self.proposals.lock().clone()
    }
}

fn cache_capacity(capacity: usize) -> NonZeroUsize {
    NonZeroUsize::new(capacity).expect("cache capacity must be non-zero")
}

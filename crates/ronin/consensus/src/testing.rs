//! Shared fixtures for the engine tests: deterministic signers, a
//! header-chain mock, a canonical test chain builder and a trivial
//! state.

use crate::chain::{Block, ChainHeaderReader, MemoryDb, SignTxFn, SignerFn, State, ValidatorsFn};
use crate::engine::Consortium;
use crate::seal::{public_key_to_address, seal_hash};
use crate::snapshot::Snapshot;
use crate::{unix_now, DIFF_IN_TURN, DIFF_NO_TURN, EXTRA_SEAL, EXTRA_VANITY};
use alloy_consensus::Header;
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use parking_lot::Mutex;
use ronin_chainspec::{ChainConfig, ConsortiumConfig, Engine};
use std::collections::HashMap;
use std::sync::Arc;

/// A secp256k1 keypair derived from a fixed seed byte.
pub(crate) struct TestSigner {
    pub secret: secp256k1::SecretKey,
    pub address: Address,
}

impl TestSigner {
    pub fn new(seed: u8) -> Self {
        assert_ne!(seed, 0, "the zero key is not a valid secp256k1 secret");
        let secret = secp256k1::SecretKey::from_slice(&[seed; 32]).unwrap();
        let secp = secp256k1::Secp256k1::new();
        let address = public_key_to_address(&secret.public_key(&secp));
        Self { secret, address }
    }

    /// Signs a 32-byte digest, returning `r || s || v`.
    pub fn sign(&self, digest: B256) -> [u8; 65] {
        sign_digest(&self.secret, digest)
    }

    /// A [`SignerFn`] signing the keccak256 of the handed preimage.
    pub fn signer_fn(&self) -> SignerFn {
        let secret = self.secret;
        Arc::new(move |_, message| Ok(sign_digest(&secret, keccak256(message))))
    }
}

fn sign_digest(secret: &secp256k1::SecretKey, digest: B256) -> [u8; 65] {
    let secp = secp256k1::Secp256k1::new();
    let message = secp256k1::Message::from_digest_slice(digest.as_slice()).unwrap();
    let signature = secp.sign_ecdsa_recoverable(&message, secret);
    let (recovery_id, bytes) = signature.serialize_compact();

    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&bytes);
    out[64] = recovery_id as u8;
    out
}

/// Returns `header` with its trailing extra-data seal filled in by `signer`.
pub(crate) fn sealed_header(header: &Header, signer: &TestSigner) -> Header {
    let signature = signer.sign(seal_hash(header).unwrap());
    let mut extra = header.extra_data.to_vec();
    let seal_start = extra.len() - EXTRA_SEAL;
    extra[seal_start..].copy_from_slice(&signature);
    Header {
        extra_data: extra.into(),
        ..header.clone()
    }
}

/// Builds checkpoint extra-data: vanity, embedded signer list, zero seal.
pub(crate) fn checkpoint_extra(signers: &[Address]) -> Bytes {
    let mut extra = vec![0u8; EXTRA_VANITY];
    for signer in signers {
        extra.extend_from_slice(signer.as_slice());
    }
    extra.extend_from_slice(&[0u8; EXTRA_SEAL]);
    extra.into()
}

/// [`ChainHeaderReader`] over an in-memory header map.
pub(crate) struct MockChain {
    config: Arc<ChainConfig>,
    by_hash: Mutex<HashMap<B256, Header>>,
    by_number: Mutex<HashMap<u64, B256>>,
}

impl MockChain {
    pub fn new(config: ChainConfig) -> Self {
        Self {
            config: Arc::new(config),
            by_hash: Mutex::new(HashMap::new()),
            by_number: Mutex::new(HashMap::new()),
        }
    }

    /// Inserts a header as the canonical block at its height.
    pub fn insert(&self, header: Header) {
        let hash = header.hash_slow();
        self.by_number.lock().insert(header.number, hash);
        self.by_hash.lock().insert(hash, header);
    }
}

impl ChainHeaderReader for MockChain {
    fn config(&self) -> Arc<ChainConfig> {
        self.config.clone()
    }

    fn get_header(&self, hash: B256, number: u64) -> Option<Header> {
        self.by_hash
            .lock()
            .get(&hash)
            .filter(|header| header.number == number)
            .cloned()
    }

    fn get_header_by_number(&self, number: u64) -> Option<Header> {
        let hash = *self.by_number.lock().get(&number)?;
        self.by_hash.lock().get(&hash).cloned()
    }
}

/// [`State`] stub returning a pre-programmed root.
pub(crate) struct TestState {
    pub root: B256,
}

impl State for TestState {
    fn intermediate_root(&mut self, _delete_empty_objects: bool) -> B256 {
        self.root
    }
}

/// A canonical chain of in-turn sealed headers over three test signers,
/// with the genesis snapshot seeded into the snapshot database.
///
/// The epoch should be a multiple of three so the in-turn rotation never
/// collides with the recent-signer window.
pub(crate) struct TestChain {
    pub chain: Arc<MockChain>,
    pub db: Arc<MemoryDb>,
    pub config: Arc<ChainConfig>,
    /// Sorted by address; index matches `validators`
    pub signers: Vec<TestSigner>,
    pub validators: Vec<Address>,
    pub genesis: Header,
    /// Blocks 1..=count in order
    pub headers: Vec<Header>,
    pub epoch: u64,
    pub period: u64,
    base_time: u64,
}

impl TestChain {
    pub fn new(epoch: u64, period: u64, count: u64) -> Self {
        let mut signers: Vec<_> = [1u8, 2, 3].into_iter().map(TestSigner::new).collect();
        signers.sort_by_key(|signer| signer.address);
        let validators: Vec<_> = signers.iter().map(|signer| signer.address).collect();

        let config = Arc::new(ChainConfig {
            chain_id: Some(1337),
            homestead_block: Some(0),
            eip150_block: Some(0),
            eip155_block: Some(0),
            eip158_block: Some(0),
            byzantium_block: Some(0),
            constantinople_block: Some(0),
            petersburg_block: Some(0),
            istanbul_block: Some(0),
            engine: Engine::Consortium(ConsortiumConfig {
                period,
                epoch,
                epoch_v2: 200,
            }),
            ..Default::default()
        });

        let base_time = unix_now().saturating_sub((count + 2) * period.max(1) + 10);
        let genesis = Header {
            number: 0,
            timestamp: base_time,
            difficulty: U256::from(1u64),
            extra_data: checkpoint_extra(&validators),
            ..Default::default()
        };

        let chain = Arc::new(MockChain::new((*config).clone()));
        chain.insert(genesis.clone());

        let db = Arc::new(MemoryDb::new());
        Snapshot::new(0, genesis.hash_slow(), validators.clone())
            .store(db.as_ref())
            .unwrap();

        let mut this = Self {
            chain,
            db,
            config,
            signers,
            validators,
            genesis: genesis.clone(),
            headers: Vec::new(),
            epoch,
            period,
            base_time,
        };

        let mut parent = genesis;
        for number in 1..=count {
            let signer = &this.signers[this.in_turn_index(number)];
            let header = Header {
                parent_hash: parent.hash_slow(),
                beneficiary: signer.address,
                number,
                difficulty: DIFF_IN_TURN,
                timestamp: base_time + number * period,
                extra_data: this.extra_for(number),
                ..Default::default()
            };
            let sealed = sealed_header(&header, signer);
            this.chain.insert(sealed.clone());
            this.headers.push(sealed.clone());
            parent = sealed;
        }
        this
    }

    /// The engine over this chain, with contract providers answering the
    /// fixed validator list.
    pub fn engine(&self) -> Arc<Consortium> {
        let engine = Consortium::new(self.config.clone(), self.db.clone(), None, false).unwrap();
        let validators = self.validators.clone();
        let provider: ValidatorsFn = Arc::new(move || Ok(validators.clone()));
        engine.set_sc_validators_fn(provider.clone());
        engine.set_fenix_validators_fn(provider);
        Arc::new(engine)
    }

    /// A chain holding only the genesis, sharing this chain's config.
    pub fn chain_with_only_genesis(template: &TestChain) -> MockChain {
        let chain = MockChain::new((*template.config).clone());
        chain.insert(template.genesis.clone());
        chain
    }

    /// Index of the in-turn signer at `number`.
    pub fn in_turn_index(&self, number: u64) -> usize {
        let last_checkpoint = number / self.epoch * self.epoch;
        ((number - last_checkpoint) % self.validators.len() as u64) as usize
    }

    /// The difficulty `signer` would seal `number` with.
    pub fn difficulty_for(&self, signer: Address, number: u64) -> U256 {
        if self.validators[self.in_turn_index(number)] == signer {
            DIFF_IN_TURN
        } else {
            DIFF_NO_TURN
        }
    }

    /// Extra-data for a block at `number`: checkpoint layout on epoch
    /// boundaries, bare vanity plus seal otherwise.
    pub fn extra_for(&self, number: u64) -> Bytes {
        if number % self.epoch == 0 {
            checkpoint_extra(&self.validators)
        } else {
            Bytes::from(vec![0u8; EXTRA_VANITY + EXTRA_SEAL])
        }
    }

    /// An unsealed block ready to hand to the sealer.
    pub fn unsealed_block(&self, number: u64, difficulty: U256, coinbase: Address) -> Block {
        let parent = self
            .headers
            .last()
            .unwrap_or(&self.genesis);
        Block::new(
            Header {
                parent_hash: parent.hash_slow(),
                beneficiary: coinbase,
                number,
                difficulty,
                timestamp: self.base_time + number * self.period,
                extra_data: self.extra_for(number),
                ..Default::default()
            },
            Vec::new(),
        )
    }

    /// A no-op transaction signer.
    pub fn sign_tx_fn() -> SignTxFn {
        Arc::new(|_, tx, _| Ok(tx))
    }
}

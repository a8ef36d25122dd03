//! Canonical header serialization, seal hashing and signer recovery.
//!
//! The seal is the trailing 65-byte secp256k1 signature inside the
//! header's extra-data, taken over the keccak256 of the header RLP with
//! that signature stripped.

use crate::{ConsortiumError, EXTRA_SEAL, EXTRA_VANITY};
use alloy_consensus::Header;
use alloy_primitives::{keccak256, Address, B256};
use alloy_rlp::Encodable;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Bounded memoization of recovered signers, keyed by header hash.
///
/// Purely a performance accelerator; recovery falls back to the full
/// secp256k1 path on a miss.
#[derive(Debug)]
pub struct SigCache(Mutex<LruCache<B256, Address>>);

impl SigCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).expect("signature cache capacity must be non-zero");
        Self(Mutex::new(LruCache::new(capacity)))
    }

    fn get(&self, hash: &B256) -> Option<Address> {
        self.0.lock().get(hash).copied()
    }

    fn insert(&self, hash: B256, signer: Address) {
        self.0.lock().put(hash, signer);
    }
}

/// Returns the hash of a header prior to it being sealed.
pub fn seal_hash(header: &Header) -> Result<B256, ConsortiumError> {
    Ok(keccak256(consortium_rlp(header)?))
}

/// RLP bytes which need to be signed for proof-of-authority sealing.
///
/// The encoding covers the entire header apart from the 65-byte seal at
/// the end of the extra-data. Headers too short to carry a seal are
/// rejected rather than encoded ambiguously, so a header can never
/// produce the same preimage with and without its signature attached.
pub fn consortium_rlp(header: &Header) -> Result<Vec<u8>, ConsortiumError> {
    let unsealed_len = header
        .extra_data
        .len()
        .checked_sub(EXTRA_SEAL)
        .ok_or(ConsortiumError::ExtraTooShort)?;
    let extra_data = header.extra_data.slice(..unsealed_len);

    let payload_length = header.parent_hash.length()
        + header.ommers_hash.length()
        + header.beneficiary.length()
        + header.state_root.length()
        + header.transactions_root.length()
        + header.receipts_root.length()
        + header.logs_bloom.length()
        + header.difficulty.length()
        + header.number.length()
        + header.gas_limit.length()
        + header.gas_used.length()
        + header.timestamp.length()
        + extra_data.length()
        + header.mix_hash.length()
        + header.nonce.length();

    let mut out = Vec::with_capacity(payload_length + 4);
    alloy_rlp::Header {
        list: true,
        payload_length,
    }
    .encode(&mut out);
    header.parent_hash.encode(&mut out);
    header.ommers_hash.encode(&mut out);
    header.beneficiary.encode(&mut out);
    header.state_root.encode(&mut out);
    header.transactions_root.encode(&mut out);
    header.receipts_root.encode(&mut out);
    header.logs_bloom.encode(&mut out);
    header.difficulty.encode(&mut out);
    header.number.encode(&mut out);
    header.gas_limit.encode(&mut out);
    header.gas_used.encode(&mut out);
    header.timestamp.encode(&mut out);
    extra_data.encode(&mut out);
    header.mix_hash.encode(&mut out);
    header.nonce.encode(&mut out);
    Ok(out)
}

/// Extracts the Ethereum account address that sealed a header.
pub fn ecrecover(header: &Header, sigcache: &SigCache) -> Result<Address, ConsortiumError> {
    let hash = header.hash_slow();
    if let Some(signer) = sigcache.get(&hash) {
        return Ok(signer);
    }
    if header.extra_data.len() < EXTRA_SEAL {
        return Err(ConsortiumError::MissingSignature);
    }
    let signature = &header.extra_data[header.extra_data.len() - EXTRA_SEAL..];

    let signer = recover_signer(signature, seal_hash(header)?)?;
    sigcache.insert(hash, signer);
    Ok(signer)
}

/// Recovers the signing address from a 65-byte `r || s || v` signature
/// over `digest`.
pub fn recover_signer(signature: &[u8], digest: B256) -> Result<Address, ConsortiumError> {
    if signature.len() != EXTRA_SEAL {
        return Err(ConsortiumError::MissingSignature);
    }
    let recovery_id = secp256k1::ecdsa::RecoveryId::try_from((signature[64] & 0x03) as i32)?;
    let recoverable =
        secp256k1::ecdsa::RecoverableSignature::from_compact(&signature[..64], recovery_id)?;
    let message = secp256k1::Message::from_digest_slice(digest.as_slice())?;

    let secp = secp256k1::Secp256k1::new();
    let public_key = secp.recover_ecdsa(&message, &recoverable)?;
    Ok(public_key_to_address(&public_key))
}

/// Derives the Ethereum address of a public key: the low 20 bytes of the
/// keccak256 of the uncompressed encoding, prefix byte dropped.
pub fn public_key_to_address(public_key: &secp256k1::PublicKey) -> Address {
    let uncompressed = public_key.serialize_uncompressed();
    Address::from_slice(&keccak256(&uncompressed[1..])[12..])
}

/// Parses the signer list embedded in a checkpoint header's extra-data.
pub fn checkpoint_signers(extra_data: &[u8]) -> Result<Vec<Address>, ConsortiumError> {
    let signers_bytes = extra_data
        .len()
        .checked_sub(EXTRA_VANITY + EXTRA_SEAL)
        .ok_or(ConsortiumError::InvalidCheckpointSigners)?;
    if signers_bytes % Address::len_bytes() != 0 {
        return Err(ConsortiumError::InvalidCheckpointSigners);
    }
    Ok(extra_data[EXTRA_VANITY..EXTRA_VANITY + signers_bytes]
        .chunks_exact(Address::len_bytes())
        .map(Address::from_slice)
        .collect())
}

//! Pluggable providers of the authorized validator list.
//!
//! Three sources exist over the chain's history: a list hardcoded for the
//! production networks (used to bootstrap trusted snapshots, e.g. during
//! snap sync), the pre-Fenix validator contract, and the Ronin
//! validator-set contract once Fenix is active.

use crate::chain::ValidatorsFn;
use crate::ConsortiumError;
use alloy_primitives::{address, Address};
use ronin_chainspec::{RONIN_MAINNET_CHAIN_ID, RONIN_TESTNET_CHAIN_ID};

const RONIN_MAINNET_GENESIS_VALIDATORS: [Address; 3] = [
    address!("f224beff587362a88d859e899d0d80c080e1e812"),
    address!("11360eacdedd59bc433afad4fc8f0417d1fbebab"),
    address!("70bb1fb41c8c42f6ddd53a708e2b82209495e455"),
];

const RONIN_TESTNET_GENESIS_VALIDATORS: [Address; 2] = [
    address!("4a4bc674a97737376cfe990ae2fe0d2b6e738393"),
    address!("b6bc5bc0410773a3f86b1537ce7495c52e38f88b"),
];

/// Where the signer list at a given block height comes from.
pub(crate) enum SignerOracle<'a> {
    /// Validator list baked in at genesis; chain IDs 2020 and 2021 only.
    GenesisHardcoded { chain_id: Option<u64> },
    /// `get_sc_validators` on the pre-Fenix validator contract.
    PreFenixContract(&'a ValidatorsFn),
    /// `get_fenix_validators` on the Ronin validator-set contract.
    FenixContract(&'a ValidatorsFn),
}

impl SignerOracle<'_> {
    /// The authorized signer list as reported by this provider.
    pub fn current_signers(&self) -> Result<Vec<Address>, ConsortiumError> {
        match self {
            Self::GenesisHardcoded { chain_id } => match chain_id {
                Some(RONIN_MAINNET_CHAIN_ID) => Ok(RONIN_MAINNET_GENESIS_VALIDATORS.to_vec()),
                Some(RONIN_TESTNET_CHAIN_ID) => Ok(RONIN_TESTNET_GENESIS_VALIDATORS.to_vec()),
                other => Err(ConsortiumError::NoGenesisValidators(
                    other.unwrap_or_default(),
                )),
            },
            Self::PreFenixContract(provider) | Self::FenixContract(provider) => provider(),
        }
    }
}

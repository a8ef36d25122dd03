//! Ronin Chain Specifications
//!
//! Defines the chain parameters for Ronin networks:
//! - Mainnet (chain ID: 2020)
//! - Testnet (chain ID: 2021)
//!
//! A [`ChainConfig`] is stored in the database per chain, keyed by the
//! genesis block, and determines which protocol rules are active at a
//! given block height. It also selects the consensus engine and carries
//! the system-contract addresses used across the Consortium hardforks.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod forks;
pub mod ronin;

pub use forks::{verify_fork_hashes, ChainConfigError, CompatError};
pub use ronin::{ronin_chain_config, RONIN_MAINNET, RONIN_TESTNET};

use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};

/// Ronin mainnet chain ID
pub const RONIN_MAINNET_CHAIN_ID: u64 = 2020;

/// Ronin testnet chain ID
pub const RONIN_TESTNET_CHAIN_ID: u64 = 2021;

/// Core config which determines the blockchain settings.
///
/// Fork fields are activation block heights; `None` means the fork never
/// activates, `Some(0)` means it is active from genesis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChainConfig {
    /// Chain identifier, used for replay protection
    pub chain_id: Option<u64>,

    pub homestead_block: Option<u64>,
    pub dao_fork_block: Option<u64>,
    /// Whether the node supports or opposes the DAO hard-fork
    pub dao_fork_support: bool,
    pub eip150_block: Option<u64>,
    /// EIP-150 canonical block hash (header-only clients cannot see the
    /// gas-price change, so they pin the fork by hash)
    pub eip150_hash: B256,
    pub eip155_block: Option<u64>,
    pub eip158_block: Option<u64>,
    pub byzantium_block: Option<u64>,
    pub constantinople_block: Option<u64>,
    /// Petersburg activation; `None` follows Constantinople
    pub petersburg_block: Option<u64>,
    pub istanbul_block: Option<u64>,
    pub muir_glacier_block: Option<u64>,
    pub berlin_block: Option<u64>,
    pub london_block: Option<u64>,
    pub arrow_glacier_block: Option<u64>,
    pub odysseus_block: Option<u64>,
    /// Fenix switches validator reads to the Fenix validator contract
    pub fenix_block: Option<u64>,
    /// First block governed by the Consortium v2 engine
    pub consortium_v2_block: Option<u64>,
    /// Puffy fixes the ordering of system transactions inside a block
    pub puffy_block: Option<u64>,
    pub buba_block: Option<u64>,
    /// Olek reduces the block-time delay of out-of-turn miners
    pub olek_block: Option<u64>,
    /// Shillin introduces fast finality
    pub shillin_block: Option<u64>,
    pub antenna_block: Option<u64>,
    /// Miko introduces sponsored transactions
    pub miko_block: Option<u64>,
    pub tripp_block: Option<u64>,
    /// The period number at the Tripp fork block
    pub tripp_period: Option<u64>,
    pub aaron_block: Option<u64>,
    pub shanghai_block: Option<u64>,
    pub cancun_block: Option<u64>,
    pub venoki_block: Option<u64>,
    pub prague_block: Option<u64>,

    pub blacklist_contract_address: Option<Address>,
    /// Ronin validator contract of the Fenix hardfork
    pub fenix_validator_contract_address: Option<Address>,
    pub white_list_deployer_contract_v2_address: Option<Address>,
    pub ronin_treasury_address: Option<Address>,

    /// Consensus engine selector
    pub engine: Engine,
    /// System contracts governing the chain from Consortium v2 onwards
    pub consortium_v2_contracts: Option<ConsortiumV2Contracts>,
    /// One-shot trusted-organization contract upgrade at the v2 handoff
    pub ronin_trusted_org_upgrade: Option<ContractUpgrade>,
    /// Optional proxy-code upgrade applied alongside the handoff
    pub transparent_proxy_code_upgrade: Option<ContractCodeUpgrade>,
}

/// The consensus engine a chain runs. Exactly one is selected per chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Proof-of-work
    #[default]
    Ethash,
    /// Clique proof-of-authority
    Clique(CliqueConfig),
    /// Consortium proof-of-authority
    Consortium(ConsortiumConfig),
}

impl Engine {
    /// Returns the Consortium engine parameters, if selected.
    pub fn consortium(&self) -> Option<&ConsortiumConfig> {
        match self {
            Self::Consortium(config) => Some(config),
            _ => None,
        }
    }

    /// Engine name as reported in logs and RPC.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ethash => "ethash",
            Self::Clique(_) => "clique",
            Self::Consortium(_) => "consortium",
        }
    }
}

/// Clique proof-of-authority engine parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliqueConfig {
    /// Number of seconds between blocks to enforce
    pub period: u64,
    /// Epoch length to reset votes and checkpoint
    pub epoch: u64,
}

/// Consortium proof-of-authority engine parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsortiumConfig {
    /// Number of seconds between blocks to enforce
    pub period: u64,
    /// Epoch length to re-anchor the signer list and checkpoint snapshots
    pub epoch: u64,
    /// Epoch length once the v2 engine takes over
    pub epoch_v2: u64,
}

/// System contracts active from the Consortium v2 handoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsortiumV2Contracts {
    pub staking_contract: Address,
    pub ronin_validator_set: Address,
    pub slash_indicator: Address,
    pub profile_contract: Address,
    pub finality_tracking: Address,
}

impl ConsortiumV2Contracts {
    /// Whether `address` is one of the governed system contracts.
    pub fn is_system_contract(&self, address: Address) -> bool {
        [
            self.staking_contract,
            self.ronin_validator_set,
            self.slash_indicator,
            self.profile_contract,
            self.finality_tracking,
        ]
        .contains(&address)
    }
}

/// Proxy upgrade executed exactly once at its scheduled block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractUpgrade {
    pub proxy_address: Address,
    pub implementation_address: Address,
}

/// Raw-code upgrade of the transparent proxies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractCodeUpgrade {
    pub axie_address: Address,
    pub land_address: Address,
    pub code: Bytes,
}

fn is_forked(fork: Option<u64>, num: u64) -> bool {
    fork.is_some_and(|block| block <= num)
}

impl ChainConfig {
    /// Returns whether `num` is either equal to the Homestead block or greater.
    pub fn is_homestead(&self, num: u64) -> bool {
        is_forked(self.homestead_block, num)
    }

    /// Returns whether `num` is either equal to the DAO fork block or greater.
    pub fn is_dao_fork(&self, num: u64) -> bool {
        is_forked(self.dao_fork_block, num)
    }

    pub fn is_eip150(&self, num: u64) -> bool {
        is_forked(self.eip150_block, num)
    }

    pub fn is_eip155(&self, num: u64) -> bool {
        is_forked(self.eip155_block, num)
    }

    pub fn is_eip158(&self, num: u64) -> bool {
        is_forked(self.eip158_block, num)
    }

    pub fn is_byzantium(&self, num: u64) -> bool {
        is_forked(self.byzantium_block, num)
    }

    pub fn is_constantinople(&self, num: u64) -> bool {
        is_forked(self.constantinople_block, num)
    }

    pub fn is_muir_glacier(&self, num: u64) -> bool {
        is_forked(self.muir_glacier_block, num)
    }

    /// Petersburg is active at its own block, or - when unscheduled -
    /// wherever Constantinople is active.
    pub fn is_petersburg(&self, num: u64) -> bool {
        is_forked(self.petersburg_block, num)
            || (self.petersburg_block.is_none() && is_forked(self.constantinople_block, num))
    }

    pub fn is_istanbul(&self, num: u64) -> bool {
        is_forked(self.istanbul_block, num)
    }

    pub fn is_berlin(&self, num: u64) -> bool {
        is_forked(self.berlin_block, num)
    }

    pub fn is_london(&self, num: u64) -> bool {
        is_forked(self.london_block, num)
    }

    pub fn is_arrow_glacier(&self, num: u64) -> bool {
        is_forked(self.arrow_glacier_block, num)
    }

    pub fn is_odysseus(&self, num: u64) -> bool {
        is_forked(self.odysseus_block, num)
    }

    pub fn is_fenix(&self, num: u64) -> bool {
        is_forked(self.fenix_block, num)
    }

    /// Returns whether `num` is the last block governed by Consortium v1.
    pub fn is_last_consortium_v1_block(&self, num: u64) -> bool {
        // The v2 activation block is always >= 1 so the subtraction is safe.
        self.consortium_v2_block
            .is_some_and(|block| block - 1 == num)
    }

    pub fn is_consortium_v2(&self, num: u64) -> bool {
        is_forked(self.consortium_v2_block, num)
    }

    /// Returns whether `num` is exactly the Consortium v2 activation block.
    pub fn is_on_consortium_v2(&self, num: u64) -> bool {
        self.consortium_v2_block == Some(num)
    }

    pub fn is_puffy(&self, num: u64) -> bool {
        is_forked(self.puffy_block, num)
    }

    pub fn is_buba(&self, num: u64) -> bool {
        is_forked(self.buba_block, num)
    }

    pub fn is_olek(&self, num: u64) -> bool {
        is_forked(self.olek_block, num)
    }

    pub fn is_shillin(&self, num: u64) -> bool {
        is_forked(self.shillin_block, num)
    }

    pub fn is_antenna(&self, num: u64) -> bool {
        is_forked(self.antenna_block, num)
    }

    pub fn is_miko(&self, num: u64) -> bool {
        is_forked(self.miko_block, num)
    }

    pub fn is_tripp(&self, num: u64) -> bool {
        is_forked(self.tripp_block, num)
    }

    pub fn is_aaron(&self, num: u64) -> bool {
        is_forked(self.aaron_block, num)
    }

    pub fn is_shanghai(&self, num: u64) -> bool {
        is_forked(self.shanghai_block, num)
    }

    pub fn is_cancun(&self, num: u64) -> bool {
        is_forked(self.cancun_block, num)
    }

    pub fn is_venoki(&self, num: u64) -> bool {
        is_forked(self.venoki_block, num)
    }

    pub fn is_prague(&self, num: u64) -> bool {
        is_forked(self.prague_block, num)
    }

    /// Flattens the fork switches at `num` into a [`Rules`] record.
    pub fn rules(&self, num: u64) -> Rules {
        Rules {
            chain_id: self.chain_id.unwrap_or_default(),
            is_homestead: self.is_homestead(num),
            is_eip150: self.is_eip150(num),
            is_eip155: self.is_eip155(num),
            is_eip158: self.is_eip158(num),
            is_byzantium: self.is_byzantium(num),
            is_constantinople: self.is_constantinople(num),
            is_petersburg: self.is_petersburg(num),
            is_istanbul: self.is_istanbul(num),
            is_berlin: self.is_berlin(num),
            is_london: self.is_london(num),
            is_odysseus: self.is_odysseus(num),
            is_fenix: self.is_fenix(num),
            is_shillin: self.is_shillin(num),
            is_last_consortium_v1_block: self.is_last_consortium_v1_block(num),
            is_consortium_v2: self.is_consortium_v2(num),
            is_antenna: self.is_antenna(num),
            is_miko: self.is_miko(num),
            is_tripp: self.is_tripp(num),
            is_aaron: self.is_aaron(num),
            is_shanghai: self.is_shanghai(num),
            is_cancun: self.is_cancun(num),
            is_venoki: self.is_venoki(num),
            is_prague: self.is_prague(num),
        }
    }
}

/// One-shot view of every fork switch at a fixed block height.
///
/// Useful for functions that do not carry block-height information of
/// their own; do not hold a `Rules` across a fork transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rules {
    /// Never absent; defaults to zero when the config has no chain ID.
    pub chain_id: u64,
    pub is_homestead: bool,
    pub is_eip150: bool,
    pub is_eip155: bool,
    pub is_eip158: bool,
    pub is_byzantium: bool,
    pub is_constantinople: bool,
    pub is_petersburg: bool,
    pub is_istanbul: bool,
    pub is_berlin: bool,
    pub is_london: bool,
    pub is_odysseus: bool,
    pub is_fenix: bool,
    pub is_shillin: bool,
    pub is_last_consortium_v1_block: bool,
    pub is_consortium_v2: bool,
    pub is_antenna: bool,
    pub is_miko: bool,
    pub is_tripp: bool,
    pub is_aaron: bool,
    pub is_shanghai: bool,
    pub is_cancun: bool,
    pub is_venoki: bool,
    pub is_prague: bool,
}

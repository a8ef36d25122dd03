//! Fork scheduling audit and rescheduling compatibility checks.

use crate::ChainConfig;
use alloy_consensus::Header;
use alloy_primitives::B256;
use thiserror::Error;

/// Configuration errors raised while validating a fork schedule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainConfigError {
    /// A later fork is scheduled while an earlier mandatory one is not.
    #[error("unsupported fork ordering: {prior} not enabled, but {fork} enabled at {block}")]
    ForkNotEnabled {
        prior: &'static str,
        fork: &'static str,
        block: u64,
    },

    /// Two mandatory forks are scheduled out of order.
    #[error("unsupported fork ordering: {prior} enabled at {prior_block}, but {fork} enabled at {block}")]
    ForkOutOfOrder {
        prior: &'static str,
        prior_block: u64,
        fork: &'static str,
        block: u64,
    },

    /// The stored chain was imported past a fork that the new config moves.
    #[error(transparent)]
    Compat(#[from] CompatError),

    /// A header at a pinned fork height does not match the canonical hash.
    #[error("fork hash mismatch at block {number}: have {have}, want {want}")]
    ForkHashMismatch { number: u64, have: B256, want: B256 },
}

/// Raised if the locally-stored blockchain is initialised with a
/// [`ChainConfig`] that would alter the past.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("mismatching {what} in database (have {stored:?}, want {new:?}, rewindto {rewind_to})")]
pub struct CompatError {
    /// Which fork (or flag) conflicts
    pub what: &'static str,
    /// Activation height in the stored configuration
    pub stored: Option<u64>,
    /// Activation height in the new configuration
    pub new: Option<u64>,
    /// Block number the local chain must be rewound to
    pub rewind_to: u64,
}

fn new_compat_error(what: &'static str, stored: Option<u64>, new: Option<u64>) -> CompatError {
    let rewind_block = match (stored, new) {
        (None, new) => new,
        (stored, None) => stored,
        (Some(s), Some(n)) => Some(s.min(n)),
    };
    CompatError {
        what,
        stored,
        new,
        rewind_to: rewind_block.map_or(0, |block| block.saturating_sub(1)),
    }
}

fn is_forked(fork: Option<u64>, head: u64) -> bool {
    fork.is_some_and(|block| block <= head)
}

/// Returns true if a fork scheduled at `stored` cannot be rescheduled to
/// `new` because `head` is already past the fork.
fn is_fork_incompatible(stored: Option<u64>, new: Option<u64>, head: u64) -> bool {
    (is_forked(stored, head) || is_forked(new, head)) && stored != new
}

impl ChainConfig {
    /// Checks that forks are scheduled in their canonical order.
    ///
    /// The protocol implementation is not pluggable enough to activate
    /// forks in a different order than the official networks did, so a
    /// mandatory fork must never be scheduled below its predecessor and
    /// must be scheduled at all once a later one is. Optional forks (DAO,
    /// Muir Glacier, Arrow Glacier) may be omitted without poisoning the
    /// sequence.
    pub fn check_config_fork_order(&self) -> Result<(), ChainConfigError> {
        struct Fork {
            name: &'static str,
            block: Option<u64>,
            optional: bool,
        }
        let forks = [
            Fork { name: "homesteadBlock", block: self.homestead_block, optional: false },
            Fork { name: "daoForkBlock", block: self.dao_fork_block, optional: true },
            Fork { name: "eip150Block", block: self.eip150_block, optional: false },
            Fork { name: "eip155Block", block: self.eip155_block, optional: false },
            Fork { name: "eip158Block", block: self.eip158_block, optional: false },
            Fork { name: "byzantiumBlock", block: self.byzantium_block, optional: false },
            Fork { name: "constantinopleBlock", block: self.constantinople_block, optional: false },
            Fork { name: "petersburgBlock", block: self.petersburg_block, optional: false },
            Fork { name: "istanbulBlock", block: self.istanbul_block, optional: false },
            Fork { name: "muirGlacierBlock", block: self.muir_glacier_block, optional: true },
            Fork { name: "berlinBlock", block: self.berlin_block, optional: false },
            Fork { name: "londonBlock", block: self.london_block, optional: false },
            Fork { name: "arrowGlacierBlock", block: self.arrow_glacier_block, optional: true },
        ];

        let mut last: Option<&Fork> = None;
        for cur in &forks {
            if let Some(prior) = last {
                match (prior.block, cur.block) {
                    (None, Some(block)) => {
                        return Err(ChainConfigError::ForkNotEnabled {
                            prior: prior.name,
                            fork: cur.name,
                            block,
                        });
                    }
                    (Some(prior_block), Some(block)) if prior_block > block => {
                        return Err(ChainConfigError::ForkOutOfOrder {
                            prior: prior.name,
                            prior_block,
                            fork: cur.name,
                            block,
                        });
                    }
                    _ => {}
                }
            }
            // An optional unscheduled fork does not become the predecessor.
            if !cur.optional || cur.block.is_some() {
                last = Some(cur);
            }
        }
        Ok(())
    }

    /// Checks whether scheduled fork transitions have been imported with a
    /// mismatching chain configuration.
    ///
    /// Iterates [`ChainConfig::check_compatible_at`] fixpoint-style so the
    /// caller is handed the lowest rewind point.
    pub fn check_compatible(&self, newcfg: &ChainConfig, height: u64) -> Option<CompatError> {
        let mut head = height;
        let mut last_err: Option<CompatError> = None;
        loop {
            let err = self.check_compatible_at(newcfg, head);
            match err {
                None => break,
                Some(err) if last_err.is_some_and(|last| last.rewind_to == err.rewind_to) => break,
                Some(err) => {
                    head = err.rewind_to;
                    last_err = Some(err);
                }
            }
        }
        last_err
    }

    fn check_compatible_at(&self, newcfg: &ChainConfig, head: u64) -> Option<CompatError> {
        if is_fork_incompatible(self.homestead_block, newcfg.homestead_block, head) {
            return Some(new_compat_error("Homestead fork block", self.homestead_block, newcfg.homestead_block));
        }
        if is_fork_incompatible(self.dao_fork_block, newcfg.dao_fork_block, head) {
            return Some(new_compat_error("DAO fork block", self.dao_fork_block, newcfg.dao_fork_block));
        }
        if self.is_dao_fork(head) && self.dao_fork_support != newcfg.dao_fork_support {
            return Some(new_compat_error("DAO fork support flag", self.dao_fork_block, newcfg.dao_fork_block));
        }
        if is_fork_incompatible(self.eip150_block, newcfg.eip150_block, head) {
            return Some(new_compat_error("EIP150 fork block", self.eip150_block, newcfg.eip150_block));
        }
        if is_fork_incompatible(self.eip155_block, newcfg.eip155_block, head) {
            return Some(new_compat_error("EIP155 fork block", self.eip155_block, newcfg.eip155_block));
        }
        if is_fork_incompatible(self.eip158_block, newcfg.eip158_block, head) {
            return Some(new_compat_error("EIP158 fork block", self.eip158_block, newcfg.eip158_block));
        }
        if self.is_eip158(head) && self.chain_id != newcfg.chain_id {
            return Some(new_compat_error("EIP158 chain ID", self.eip158_block, newcfg.eip158_block));
        }
        if is_fork_incompatible(self.byzantium_block, newcfg.byzantium_block, head) {
            return Some(new_compat_error("Byzantium fork block", self.byzantium_block, newcfg.byzantium_block));
        }
        if is_fork_incompatible(self.constantinople_block, newcfg.constantinople_block, head) {
            return Some(new_compat_error("Constantinople fork block", self.constantinople_block, newcfg.constantinople_block));
        }
        if is_fork_incompatible(self.petersburg_block, newcfg.petersburg_block, head) {
            // Petersburg may be retrofitted into the past if it lands on
            // Constantinople, which the ordering rules require anyway.
            if is_fork_incompatible(self.constantinople_block, newcfg.petersburg_block, head) {
                return Some(new_compat_error("Petersburg fork block", self.petersburg_block, newcfg.petersburg_block));
            }
        }
        if is_fork_incompatible(self.istanbul_block, newcfg.istanbul_block, head) {
            return Some(new_compat_error("Istanbul fork block", self.istanbul_block, newcfg.istanbul_block));
        }
        if is_fork_incompatible(self.muir_glacier_block, newcfg.muir_glacier_block, head) {
            return Some(new_compat_error("Muir Glacier fork block", self.muir_glacier_block, newcfg.muir_glacier_block));
        }
        if is_fork_incompatible(self.berlin_block, newcfg.berlin_block, head) {
            return Some(new_compat_error("Berlin fork block", self.berlin_block, newcfg.berlin_block));
        }
        if is_fork_incompatible(self.london_block, newcfg.london_block, head) {
            return Some(new_compat_error("London fork block", self.london_block, newcfg.london_block));
        }
        if is_fork_incompatible(self.arrow_glacier_block, newcfg.arrow_glacier_block, head) {
            return Some(new_compat_error("Arrow Glacier fork block", self.arrow_glacier_block, newcfg.arrow_glacier_block));
        }
        if is_fork_incompatible(self.odysseus_block, newcfg.odysseus_block, head) {
            return Some(new_compat_error("Odysseus fork block", self.odysseus_block, newcfg.odysseus_block));
        }
        if is_fork_incompatible(self.fenix_block, newcfg.fenix_block, head) {
            return Some(new_compat_error("Fenix fork block", self.fenix_block, newcfg.fenix_block));
        }
        if is_fork_incompatible(self.consortium_v2_block, newcfg.consortium_v2_block, head) {
            return Some(new_compat_error("Consortium v2 fork block", self.consortium_v2_block, newcfg.consortium_v2_block));
        }
        if is_fork_incompatible(self.puffy_block, newcfg.puffy_block, head) {
            return Some(new_compat_error("Puffy fork block", self.puffy_block, newcfg.puffy_block));
        }
        if is_fork_incompatible(self.buba_block, newcfg.buba_block, head) {
            return Some(new_compat_error("Buba fork block", self.buba_block, newcfg.buba_block));
        }
        if is_fork_incompatible(self.olek_block, newcfg.olek_block, head) {
            return Some(new_compat_error("Olek fork block", self.olek_block, newcfg.olek_block));
        }
        if is_fork_incompatible(self.shillin_block, newcfg.shillin_block, head) {
            return Some(new_compat_error("Shillin fork block", self.shillin_block, newcfg.shillin_block));
        }
        if is_fork_incompatible(self.antenna_block, newcfg.antenna_block, head) {
            return Some(new_compat_error("Antenna fork block", self.antenna_block, newcfg.antenna_block));
        }
        if is_fork_incompatible(self.miko_block, newcfg.miko_block, head) {
            return Some(new_compat_error("Miko fork block", self.miko_block, newcfg.miko_block));
        }
        if is_fork_incompatible(self.tripp_block, newcfg.tripp_block, head) {
            return Some(new_compat_error("Tripp fork block", self.tripp_block, newcfg.tripp_block));
        }
        if is_fork_incompatible(self.aaron_block, newcfg.aaron_block, head) {
            return Some(new_compat_error("Aaron fork block", self.aaron_block, newcfg.aaron_block));
        }
        if is_fork_incompatible(self.shanghai_block, newcfg.shanghai_block, head) {
            return Some(new_compat_error("Shanghai fork block", self.shanghai_block, newcfg.shanghai_block));
        }
        if is_fork_incompatible(self.cancun_block, newcfg.cancun_block, head) {
            return Some(new_compat_error("Cancun fork block", self.cancun_block, newcfg.cancun_block));
        }
        if is_fork_incompatible(self.venoki_block, newcfg.venoki_block, head) {
            return Some(new_compat_error("Venoki fork block", self.venoki_block, newcfg.venoki_block));
        }
        if is_fork_incompatible(self.prague_block, newcfg.prague_block, head) {
            return Some(new_compat_error("Prague fork block", self.prague_block, newcfg.prague_block));
        }
        None
    }
}

/// Verifies that a header pinned by the fork schedule carries the
/// canonical hash.
///
/// Only EIP-150 pins a hash: header-only clients cannot observe the gas
/// repricing, so the transition block is identified by hash instead.
pub fn verify_fork_hashes(config: &ChainConfig, header: &Header) -> Result<(), ChainConfigError> {
    if config.eip150_block == Some(header.number) && config.eip150_hash != B256::ZERO {
        let have = header.hash_slow();
        if have != config.eip150_hash {
            return Err(ChainConfigError::ForkHashMismatch {
                number: header.number,
                have,
                want: config.eip150_hash,
            });
        }
    }
    Ok(())
}

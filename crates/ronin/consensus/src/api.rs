//! User-facing RPC surface of the consortium engine.

use crate::chain::ChainHeaderReader;
use crate::engine::Consortium;
use crate::snapshot::Snapshot;
use crate::ConsortiumError;
use alloy_primitives::Address;
use std::collections::HashMap;
use std::sync::Arc;

/// Descriptor of one RPC namespace exposed by the engine.
pub struct RpcApi {
    pub namespace: &'static str,
    pub version: &'static str,
    pub service: Arc<ConsortiumApi>,
    pub public: bool,
}

/// The `consortium` namespace service.
pub struct ConsortiumApi {
    chain: Arc<dyn ChainHeaderReader>,
    consortium: Arc<Consortium>,
}

impl Consortium {
    /// The RPC APIs this engine provides.
    pub fn apis(self: Arc<Self>, chain: Arc<dyn ChainHeaderReader>) -> Vec<RpcApi> {
        vec![RpcApi {
            namespace: "consortium",
            version: "1.0",
            service: Arc::new(ConsortiumApi {
                chain,
                consortium: self,
            }),
            public: false,
        }]
    }
}

impl ConsortiumApi {
    /// The authorization snapshot at the given canonical block.
    pub fn get_snapshot(&self, number: u64) -> Result<Arc<Snapshot>, ConsortiumError> {
        let header = self
            .chain
            .get_header_by_number(number)
            .ok_or(ConsortiumError::UnknownBlock)?;
        self.consortium
            .snapshot(self.chain.as_ref(), number, header.hash_slow(), &[])
    }

    /// The authorized signers at the given canonical block.
    pub fn get_signers(&self, number: u64) -> Result<Vec<Address>, ConsortiumError> {
        Ok(self.get_snapshot(number)?.signer_list.clone())
    }

    /// Injects a new authorization proposal the local signer will push.
    pub fn propose(&self, address: Address, auth: bool) {
        self.consortium.propose(address, auth);
    }

    /// Drops a currently running proposal.
    pub fn discard(&self, address: Address) {
        self.consortium.discard(address);
    }

    /// The proposals the local signer is currently pushing.
    pub fn proposals(&self) -> HashMap<Address, bool> {
        self.consortium.current_proposals()
    }
}

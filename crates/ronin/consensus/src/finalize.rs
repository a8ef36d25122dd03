//! Block finalization.
//!
//! Proof-of-authority pays no block rewards and drops uncles, so
//! finalization normally just settles the state root. The exception is
//! the last v1 block: immediately before the v2 engine takes over, the
//! epoch wrap-up system transactions run through the injected
//! applicator to initialize the v2 validator contracts.

use crate::chain::{Block, ChainHeaderReader, OpEvent, Receipt, SignTxFn, State, Transaction};
use crate::engine::Consortium;
use crate::ConsortiumError;
use alloy_consensus::constants::EMPTY_OMMER_ROOT_HASH;
use alloy_consensus::Header;
use alloy_primitives::Address;
use ronin_chainspec::ChainConfig;
use std::sync::Arc;
use tracing::{error, info};

/// Block-level execution context handed to the applicator.
pub struct EvmBlockContext {
    pub coinbase: Address,
    pub number: u64,
    pub timestamp: u64,
    pub gas_limit: u64,
    /// Hooks forwarded from the host chain
    pub op_events: Vec<OpEvent>,
}

fn evm_block_context(header: &Header, coinbase: Address, op_events: Vec<OpEvent>) -> EvmBlockContext {
    EvmBlockContext {
        coinbase,
        number: header.number,
        timestamp: header.timestamp,
        gas_limit: header.gas_limit,
        op_events,
    }
}

/// Everything the applicator needs to run system transactions against
/// the current block.
pub struct ApplyTransactOpts<'a> {
    pub state: &'a mut dyn State,
    pub header: &'a Header,
    pub chain_config: &'a ChainConfig,
    pub evm_context: EvmBlockContext,
    /// Transactions included in the block so far; the applicator appends
    /// the system transactions it executes
    pub txs: &'a mut Vec<Transaction>,
    pub receipts: &'a mut Vec<Receipt>,
    /// Pre-supplied system transactions to consume on the import path;
    /// `None` while mining, where the applicator creates its own
    pub received_txs: Option<&'a mut Vec<Transaction>>,
    pub used_gas: &'a mut u64,
    pub mining: bool,
    /// Account the integrator signs system transactions with
    pub signer: Address,
    pub chain_id: Option<u64>,
    pub sign_tx_fn: Option<SignTxFn>,
}

/// Applies the end-of-epoch system transactions against the validator
/// contracts. Injected by the host; the engine only schedules the call.
pub trait EpochWrapper: Send + Sync {
    fn wrap_up_epoch(&self, opts: &mut ApplyTransactOpts<'_>) -> Result<(), ConsortiumError>;
}

/// Binds the injected applicator to the engine's current credentials.
/// Rebuilt whenever [`Consortium::authorize`] runs.
#[derive(Clone)]
pub(crate) struct ContractIntegrator {
    applicator: Arc<dyn EpochWrapper>,
    coinbase: Address,
    sign_tx_fn: Option<SignTxFn>,
    chain_id: Option<u64>,
}

impl ContractIntegrator {
    pub fn new(
        applicator: Arc<dyn EpochWrapper>,
        coinbase: Address,
        sign_tx_fn: Option<SignTxFn>,
        chain_id: Option<u64>,
    ) -> Self {
        Self {
            applicator,
            coinbase,
            sign_tx_fn,
            chain_id,
        }
    }

    fn wrap_up_epoch(&self, opts: &mut ApplyTransactOpts<'_>) -> Result<(), ConsortiumError> {
        self.applicator.wrap_up_epoch(opts)
    }
}

impl Consortium {
    /// Settles the state root for an imported block; on the last v1
    /// block, dispatches the supplied system transactions through the
    /// epoch wrap-up applicator first.
    ///
    /// `system_txs` must be non-empty exactly on the last v1 block, and
    /// the applicator must consume all of them.
    #[allow(clippy::too_many_arguments)]
    pub fn finalize(
        &self,
        chain: &dyn ChainHeaderReader,
        header: &mut Header,
        state: &mut dyn State,
        txs: &mut Vec<Transaction>,
        _ommers: &[Header],
        receipts: &mut Vec<Receipt>,
        system_txs: &mut Vec<Transaction>,
        used_gas: &mut u64,
    ) -> Result<(), ConsortiumError> {
        let last_block_in_v1 = self.chain_config.is_on_consortium_v2(header.number + 1);
        if (!system_txs.is_empty() && !last_block_in_v1)
            || (system_txs.is_empty() && last_block_in_v1)
        {
            return Err(ConsortiumError::SystemTxMismatch);
        }

        if !system_txs.is_empty() {
            info!(
                target: "ronin::consensus",
                system_txs = system_txs.len(),
                coinbase = %header.beneficiary,
                "Processing system transactions at the v1 epoch boundary"
            );
            let contract = self
                .contract
                .read()
                .clone()
                .ok_or(ConsortiumError::MissingOracle("epoch wrap-up applicator"))?;
            let mut opts = ApplyTransactOpts {
                evm_context: evm_block_context(header, header.beneficiary, chain.op_events()),
                state: &mut *state,
                header,
                chain_config: &self.chain_config,
                txs,
                receipts,
                received_txs: Some(&mut *system_txs),
                used_gas,
                mining: false,
                signer: contract.coinbase,
                chain_id: contract.chain_id,
                sign_tx_fn: contract.sign_tx_fn.clone(),
            };
            contract.wrap_up_epoch(&mut opts)?;
            if !system_txs.is_empty() {
                return Err(ConsortiumError::SystemTxMismatch);
            }
        }

        // No block rewards, so the state stays as is; uncles are dropped
        header.state_root = state.intermediate_root(self.chain_config.is_eip158(header.number));
        header.ommers_hash = EMPTY_OMMER_ROOT_HASH;
        Ok(())
    }

    /// Finalizes an authored block and assembles it for sealing.
    ///
    /// On the last v1 block the applicator runs in mining mode and may
    /// append system transactions and receipts; state-root computation
    /// and block assembly then proceed on two cooperating threads, and
    /// the final root is stamped on the assembled block.
    pub fn finalize_and_assemble(
        &self,
        chain: &dyn ChainHeaderReader,
        header: &mut Header,
        state: &mut dyn State,
        mut txs: Vec<Transaction>,
        mut receipts: Vec<Receipt>,
    ) -> Result<(Block, Vec<Receipt>), ConsortiumError> {
        // No block rewards, so the state stays as is; uncles are dropped
        header.state_root = state.intermediate_root(self.chain_config.is_eip158(header.number));
        header.ommers_hash = EMPTY_OMMER_ROOT_HASH;

        if self.chain_config.is_on_consortium_v2(header.number + 1) {
            {
                let contract = self
                    .contract
                    .read()
                    .clone()
                    .ok_or(ConsortiumError::MissingOracle("epoch wrap-up applicator"))?;
                let mut used_gas = header.gas_used;
                let mut opts = ApplyTransactOpts {
                    evm_context: evm_block_context(header, header.beneficiary, chain.op_events()),
                    state: &mut *state,
                    header,
                    chain_config: &self.chain_config,
                    txs: &mut txs,
                    receipts: &mut receipts,
                    received_txs: None,
                    used_gas: &mut used_gas,
                    mining: true,
                    signer: contract.coinbase,
                    chain_id: contract.chain_id,
                    sign_tx_fn: contract.sign_tx_fn.clone(),
                };
                if let Err(err) = contract.wrap_up_epoch(&mut opts) {
                    error!(target: "ronin::consensus", %err, "Failed to update validators");
                }
                header.gas_used = used_gas;
            }
            // Should not happen; better to stop here than broadcast the
            // block.
            if header.gas_limit < header.gas_used {
                return Err(ConsortiumError::GasOverflow);
            }
            header.ommers_hash = EMPTY_OMMER_ROOT_HASH;

            let eip158 = self.chain_config.is_eip158(header.number);
            let assembled_header = header.clone();
            let (root_result, mut block) = std::thread::scope(|scope| {
                let root_task = scope.spawn(|| state.intermediate_root(eip158));
                let block = Block::new(assembled_header, txs);
                (root_task.join(), block)
            });
            let root = match root_result {
                Ok(root) => root,
                Err(panic) => std::panic::resume_unwind(panic),
            };
            block.header.state_root = root;
            return Ok((block, receipts));
        }

        let block = Block::new(header.clone(), txs);
        Ok((block, receipts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::MemoryDb;
    use crate::testing::{MockChain, TestChain, TestState};
    use alloy_primitives::B256;
    use ronin_chainspec::{ConsortiumConfig, ConsortiumV2Contracts, Engine};

    const V2_BLOCK: u64 = 9;

    fn v2_config() -> ChainConfig {
        ChainConfig {
            chain_id: Some(1337),
            homestead_block: Some(0),
            eip150_block: Some(0),
            eip155_block: Some(0),
            eip158_block: Some(0),
            byzantium_block: Some(0),
            constantinople_block: Some(0),
            petersburg_block: Some(0),
            istanbul_block: Some(0),
            consortium_v2_block: Some(V2_BLOCK),
            consortium_v2_contracts: Some(ConsortiumV2Contracts {
                staking_contract: Address::repeat_byte(1),
                ronin_validator_set: Address::repeat_byte(2),
                slash_indicator: Address::repeat_byte(3),
                profile_contract: Address::repeat_byte(4),
                finality_tracking: Address::repeat_byte(5),
            }),
            engine: Engine::Consortium(ConsortiumConfig {
                period: 3,
                epoch: 6,
                epoch_v2: 200,
            }),
            ..Default::default()
        }
    }

    /// Consumes every received system transaction, or appends one fresh
    /// transaction while mining.
    struct TestApplicator {
        gas_per_tx: u64,
    }

    impl EpochWrapper for TestApplicator {
        fn wrap_up_epoch(&self, opts: &mut ApplyTransactOpts<'_>) -> Result<(), ConsortiumError> {
            match opts.received_txs.as_deref_mut() {
                Some(received) => {
                    for tx in received.drain(..) {
                        *opts.used_gas += self.gas_per_tx;
                        opts.receipts.push(Receipt {
                            tx_hash: tx.hash,
                            success: true,
                            gas_used: self.gas_per_tx,
                            cumulative_gas_used: *opts.used_gas,
                        });
                        opts.txs.push(tx);
                    }
                }
                None => {
                    debug_assert!(opts.mining);
                    let tx = Transaction {
                        hash: B256::repeat_byte(0x5a),
                        gas: self.gas_per_tx,
                        ..Default::default()
                    };
                    *opts.used_gas += self.gas_per_tx;
                    opts.receipts.push(Receipt {
                        tx_hash: tx.hash,
                        success: true,
                        gas_used: self.gas_per_tx,
                        cumulative_gas_used: *opts.used_gas,
                    });
                    opts.txs.push(tx);
                }
            }
            Ok(())
        }
    }

    /// Leaves the last received transaction unconsumed.
    struct StallingApplicator;

    impl EpochWrapper for StallingApplicator {
        fn wrap_up_epoch(&self, opts: &mut ApplyTransactOpts<'_>) -> Result<(), ConsortiumError> {
            if let Some(received) = opts.received_txs.as_deref_mut() {
                while received.len() > 1 {
                    opts.txs.push(received.remove(0));
                }
            }
            Ok(())
        }
    }

    fn engine_with(applicator: Arc<dyn EpochWrapper>) -> (Consortium, MockChain) {
        let config = Arc::new(v2_config());
        let engine = Consortium::new(
            config.clone(),
            Arc::new(MemoryDb::new()),
            Some(applicator),
            false,
        )
        .unwrap();
        (engine, MockChain::new((*config).clone()))
    }

    fn system_tx(byte: u8) -> Transaction {
        Transaction {
            hash: B256::repeat_byte(byte),
            gas: 21_000,
            ..Default::default()
        }
    }

    #[test]
    fn test_finalize_plain_block_sets_root_and_ommers() {
        let (engine, chain) = engine_with(Arc::new(TestApplicator { gas_per_tx: 1000 }));
        let mut header = Header {
            number: 5,
            ..Default::default()
        };
        let mut state = TestState {
            root: B256::repeat_byte(0x11),
        };
        let (mut txs, mut receipts, mut system_txs, mut used_gas) =
            (Vec::new(), Vec::new(), Vec::new(), 0u64);

        engine
            .finalize(
                &chain, &mut header, &mut state, &mut txs, &[], &mut receipts, &mut system_txs,
                &mut used_gas,
            )
            .unwrap();
        assert_eq!(header.state_root, B256::repeat_byte(0x11));
        assert_eq!(header.ommers_hash, EMPTY_OMMER_ROOT_HASH);
        assert!(txs.is_empty());
    }

    #[test]
    fn test_finalize_rejects_mismatched_system_txs() {
        let (engine, chain) = engine_with(Arc::new(TestApplicator { gas_per_tx: 1000 }));
        let mut state = TestState { root: B256::ZERO };

        // System transactions outside the handoff block.
        let mut header = Header {
            number: 5,
            ..Default::default()
        };
        let (mut txs, mut receipts, mut used_gas) = (Vec::new(), Vec::new(), 0u64);
        let mut system_txs = vec![system_tx(1)];
        assert_eq!(
            engine.finalize(
                &chain, &mut header, &mut state, &mut txs, &[], &mut receipts, &mut system_txs,
                &mut used_gas,
            ),
            Err(ConsortiumError::SystemTxMismatch)
        );

        // No system transactions on the handoff block.
        let mut header = Header {
            number: V2_BLOCK - 1,
            ..Default::default()
        };
        let mut system_txs = Vec::new();
        assert_eq!(
            engine.finalize(
                &chain, &mut header, &mut state, &mut txs, &[], &mut receipts, &mut system_txs,
                &mut used_gas,
            ),
            Err(ConsortiumError::SystemTxMismatch)
        );
    }

    #[test]
    fn test_finalize_consumes_system_txs_on_last_v1_block() {
        let (engine, chain) = engine_with(Arc::new(TestApplicator { gas_per_tx: 1000 }));
        let mut header = Header {
            number: V2_BLOCK - 1,
            ..Default::default()
        };
        let mut state = TestState {
            root: B256::repeat_byte(0x22),
        };
        let (mut txs, mut receipts, mut used_gas) = (Vec::new(), Vec::new(), 0u64);
        let mut system_txs = vec![system_tx(1), system_tx(2)];

        engine
            .finalize(
                &chain, &mut header, &mut state, &mut txs, &[], &mut receipts, &mut system_txs,
                &mut used_gas,
            )
            .unwrap();
        assert!(system_txs.is_empty());
        assert_eq!(txs.len(), 2);
        assert_eq!(receipts.len(), 2);
        assert_eq!(used_gas, 2000);
        assert_eq!(header.state_root, B256::repeat_byte(0x22));
    }

    #[test]
    fn test_finalize_rejects_leftover_system_txs() {
        let (engine, chain) = engine_with(Arc::new(StallingApplicator));
        let mut header = Header {
            number: V2_BLOCK - 1,
            ..Default::default()
        };
        let mut state = TestState { root: B256::ZERO };
        let (mut txs, mut receipts, mut used_gas) = (Vec::new(), Vec::new(), 0u64);
        let mut system_txs = vec![system_tx(1), system_tx(2)];

        assert_eq!(
            engine.finalize(
                &chain, &mut header, &mut state, &mut txs, &[], &mut receipts, &mut system_txs,
                &mut used_gas,
            ),
            Err(ConsortiumError::SystemTxMismatch)
        );
    }

    #[test]
    fn test_assemble_plain_block() {
        let (engine, chain) = engine_with(Arc::new(TestApplicator { gas_per_tx: 1000 }));
        let mut header = Header {
            number: 5,
            gas_limit: 30_000_000,
            ..Default::default()
        };
        let mut state = TestState {
            root: B256::repeat_byte(0x33),
        };
        let txs = vec![system_tx(9)];

        let (block, receipts) = engine
            .finalize_and_assemble(&chain, &mut header, &mut state, txs.clone(), Vec::new())
            .unwrap();
        assert!(receipts.is_empty());
        assert_eq!(block.transactions, txs);
        assert_eq!(block.header.state_root, B256::repeat_byte(0x33));
    }

    #[test]
    fn test_assemble_handoff_appends_system_txs_and_stamps_root() {
        let (engine, chain) = engine_with(Arc::new(TestApplicator { gas_per_tx: 5000 }));
        let mut header = Header {
            number: V2_BLOCK - 1,
            gas_limit: 30_000_000,
            ..Default::default()
        };
        let mut state = TestState {
            root: B256::repeat_byte(0x44),
        };

        let (block, receipts) = engine
            .finalize_and_assemble(&chain, &mut header, &mut state, Vec::new(), Vec::new())
            .unwrap();
        // The applicator appended its own system transaction.
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(receipts.len(), 1);
        assert_eq!(header.gas_used, 5000);
        assert_eq!(block.header.state_root, B256::repeat_byte(0x44));
    }

    #[test]
    fn test_assemble_handoff_rejects_gas_overflow() {
        let (engine, chain) = engine_with(Arc::new(TestApplicator { gas_per_tx: 100 }));
        let mut header = Header {
            number: V2_BLOCK - 1,
            gas_limit: 50,
            ..Default::default()
        };
        let mut state = TestState { root: B256::ZERO };
        assert_eq!(
            engine
                .finalize_and_assemble(&chain, &mut header, &mut state, Vec::new(), Vec::new())
                .unwrap_err(),
            ConsortiumError::GasOverflow
        );
    }

    #[test]
    fn test_finalize_without_applicator_fails_on_handoff() {
        // v2 scheduled but no applicator injected: the engine comes up,
        // the handoff block cannot finalize.
        let config = Arc::new(v2_config());
        let engine =
            Consortium::new(config.clone(), Arc::new(MemoryDb::new()), None, false).unwrap();
        let chain = MockChain::new((*config).clone());

        let mut header = Header {
            number: V2_BLOCK - 1,
            ..Default::default()
        };
        let mut state = TestState { root: B256::ZERO };
        let (mut txs, mut receipts, mut used_gas) = (Vec::new(), Vec::new(), 0u64);
        let mut system_txs = vec![system_tx(1)];
        assert!(matches!(
            engine.finalize(
                &chain, &mut header, &mut state, &mut txs, &[], &mut receipts, &mut system_txs,
                &mut used_gas,
            ),
            Err(ConsortiumError::MissingOracle(_))
        ));
    }

    #[test]
    fn test_finalize_on_chain_without_v2_never_mismatches_empty() {
        let t = TestChain::new(6, 3, 2);
        let engine = t.engine();
        let mut header = Header {
            number: 3,
            ..Default::default()
        };
        let mut state = TestState { root: B256::ZERO };
        let (mut txs, mut receipts, mut system_txs, mut used_gas) =
            (Vec::new(), Vec::new(), Vec::new(), 0u64);
        engine
            .finalize(
                t.chain.as_ref(), &mut header, &mut state, &mut txs, &[], &mut receipts, &mut system_txs,
                &mut used_gas,
            )
            .unwrap();
    }
}

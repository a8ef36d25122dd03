//! Ronin network chain configurations.

use crate::{
    ChainConfig, ConsortiumConfig, ConsortiumV2Contracts, ContractUpgrade, Engine,
    RONIN_MAINNET_CHAIN_ID, RONIN_TESTNET_CHAIN_ID,
};
use alloy_primitives::{address, Address};
use once_cell::sync::Lazy;

/// Ronin mainnet blacklist contract
pub const RONIN_MAINNET_BLACKLIST_CONTRACT: Address =
    address!("313b24994c93FA0471CB4D7aB796b07467041806");
/// Ronin mainnet validator contract of the Fenix hardfork
pub const RONIN_MAINNET_FENIX_VALIDATOR_CONTRACT: Address =
    address!("7f13232Bdc3a010c3f749a1c25bF99f1C053CE70");
const RONIN_MAINNET_RONIN_VALIDATOR_SET: Address =
    address!("617c5d73662282EA7FfD231E020eCa6D2B0D552f");
const RONIN_MAINNET_SLASH_INDICATOR: Address =
    address!("EBFFF2b32fA0dF9C5C8C5d5AAa7e8b51d5207bA3");
const RONIN_MAINNET_STAKING_CONTRACT: Address =
    address!("545edb750eB8769C868429BE9586F5857A768758");
const RONIN_MAINNET_PROFILE_CONTRACT: Address =
    address!("840EBf1CA767CB690029E91856A357a43B85d035");
const RONIN_MAINNET_FINALITY_TRACKING: Address =
    address!("A30B2932CD8b8A89E34551Cdfa13810af38dA576");
const RONIN_MAINNET_WHITELIST_DEPLOYER_V2: Address =
    address!("c1876d5C4BFAF0eE325E4226B2bdf216D9896AE1");
const RONIN_MAINNET_TREASURY: Address = address!("b903E3936d3ca90b69b29F1df2810083a2DC0d71");

/// Chain parameters to run a node on the Ronin main network.
pub static RONIN_MAINNET: Lazy<ChainConfig> = Lazy::new(|| ChainConfig {
    chain_id: Some(RONIN_MAINNET_CHAIN_ID),
    homestead_block: Some(0),
    eip150_block: Some(0),
    eip155_block: Some(0),
    eip158_block: Some(0),
    byzantium_block: Some(0),
    constantinople_block: Some(0),
    petersburg_block: Some(0),
    istanbul_block: Some(4_977_778),
    odysseus_block: Some(10_301_597),
    fenix_block: Some(14_938_103),
    blacklist_contract_address: Some(RONIN_MAINNET_BLACKLIST_CONTRACT),
    fenix_validator_contract_address: Some(RONIN_MAINNET_FENIX_VALIDATOR_CONTRACT),
    white_list_deployer_contract_v2_address: Some(RONIN_MAINNET_WHITELIST_DEPLOYER_V2),
    engine: Engine::Consortium(ConsortiumConfig {
        period: 3,
        epoch: 600,
        epoch_v2: 200,
    }),
    consortium_v2_contracts: Some(ConsortiumV2Contracts {
        ronin_validator_set: RONIN_MAINNET_RONIN_VALIDATOR_SET,
        slash_indicator: RONIN_MAINNET_SLASH_INDICATOR,
        staking_contract: RONIN_MAINNET_STAKING_CONTRACT,
        profile_contract: RONIN_MAINNET_PROFILE_CONTRACT,
        finality_tracking: RONIN_MAINNET_FINALITY_TRACKING,
    }),
    consortium_v2_block: Some(23_155_200),
    puffy_block: Some(0),
    buba_block: Some(0),
    olek_block: Some(24_935_500),
    shillin_block: Some(28_825_400),
    antenna_block: Some(28_825_400),
    miko_block: Some(32_367_400),
    ronin_trusted_org_upgrade: Some(ContractUpgrade {
        proxy_address: address!("98D0230884448B3E2f09a177433D60fb1E19C090"),
        implementation_address: address!("59646258Ec25CC329f5ce93223e0A50ccfA3e885"),
    }),
    london_block: Some(36_052_600),
    berlin_block: Some(36_052_600),
    tripp_block: Some(36_052_600),
    tripp_period: Some(19_907),
    aaron_block: Some(36_052_600),
    shanghai_block: Some(43_447_600),
    cancun_block: Some(43_447_600),
    venoki_block: Some(43_447_600),
    ronin_treasury_address: Some(RONIN_MAINNET_TREASURY),
    ..Default::default()
});

/// Ronin testnet blacklist contract
pub const RONIN_TESTNET_BLACKLIST_CONTRACT: Address =
    address!("F53EED5210c9cF308abFe66bA7CF14884c95A8aC");
/// Ronin testnet validator contract of the Fenix hardfork
pub const RONIN_TESTNET_FENIX_VALIDATOR_CONTRACT: Address =
    address!("1454cAAd1637b662432Bb795cD5773d21281eDAb");
const RONIN_TESTNET_RONIN_VALIDATOR_SET: Address =
    address!("54B3AC74a90E64E8dDE60671b6fE8F8DDf18eC9d");
const RONIN_TESTNET_SLASH_INDICATOR: Address =
    address!("F7837778b6E180Df6696C8Fa986d62f8b6186752");
const RONIN_TESTNET_STAKING_CONTRACT: Address =
    address!("9C245671791834daf3885533D24dce516B763B28");
const RONIN_TESTNET_PROFILE_CONTRACT: Address =
    address!("3b67c8D22a91572a6AB18acC9F70787Af04A4043");
const RONIN_TESTNET_FINALITY_TRACKING: Address =
    address!("41aCDFe786171824a037f2Cd6224c5916A58969a");
const RONIN_TESTNET_WHITELIST_DEPLOYER_V2: Address =
    address!("50a7e07Aa75eB9C04281713224f50403cA79851F");
const RONIN_TESTNET_TREASURY: Address = address!("5cfca565c09cc32bb7ba7222a648f1b014d6c30b");

/// Chain parameters to run a node on the Ronin test network.
pub static RONIN_TESTNET: Lazy<ChainConfig> = Lazy::new(|| ChainConfig {
    chain_id: Some(RONIN_TESTNET_CHAIN_ID),
    homestead_block: Some(0),
    eip150_block: Some(0),
    eip155_block: Some(0),
    eip158_block: Some(0),
    byzantium_block: Some(0),
    constantinople_block: Some(0),
    petersburg_block: Some(0),
    istanbul_block: Some(0),
    odysseus_block: Some(3_315_095),
    fenix_block: Some(6_770_400),
    blacklist_contract_address: Some(RONIN_TESTNET_BLACKLIST_CONTRACT),
    fenix_validator_contract_address: Some(RONIN_TESTNET_FENIX_VALIDATOR_CONTRACT),
    white_list_deployer_contract_v2_address: Some(RONIN_TESTNET_WHITELIST_DEPLOYER_V2),
    engine: Engine::Consortium(ConsortiumConfig {
        period: 3,
        epoch: 30,
        epoch_v2: 200,
    }),
    consortium_v2_contracts: Some(ConsortiumV2Contracts {
        ronin_validator_set: RONIN_TESTNET_RONIN_VALIDATOR_SET,
        slash_indicator: RONIN_TESTNET_SLASH_INDICATOR,
        staking_contract: RONIN_TESTNET_STAKING_CONTRACT,
        profile_contract: RONIN_TESTNET_PROFILE_CONTRACT,
        finality_tracking: RONIN_TESTNET_FINALITY_TRACKING,
    }),
    consortium_v2_block: Some(11_706_000),
    puffy_block: Some(12_254_000),
    buba_block: Some(14_260_600),
    olek_block: Some(16_849_000),
    shillin_block: Some(20_268_000),
    antenna_block: Some(20_737_258),
    miko_block: Some(23_694_400),
    ronin_trusted_org_upgrade: Some(ContractUpgrade {
        proxy_address: address!("7507dc433a98E1fE105d69f19f3B40E4315A4F32"),
        implementation_address: address!("6A51C2B073a6daDBeCAC1A420AFcA7788C81612f"),
    }),
    london_block: Some(27_580_600),
    berlin_block: Some(27_580_600),
    tripp_block: Some(27_580_600),
    tripp_period: Some(19_866),
    aaron_block: Some(28_231_200),
    shanghai_block: Some(35_554_400),
    cancun_block: Some(35_554_400),
    venoki_block: Some(35_554_400),
    ronin_treasury_address: Some(RONIN_TESTNET_TREASURY),
    ..Default::default()
});

/// Get the Ronin chain configuration by chain ID.
pub fn ronin_chain_config(chain_id: u64) -> Option<&'static ChainConfig> {
    match chain_id {
        RONIN_MAINNET_CHAIN_ID => Some(&RONIN_MAINNET),
        RONIN_TESTNET_CHAIN_ID => Some(&RONIN_TESTNET),
        _ => None,
    }
}

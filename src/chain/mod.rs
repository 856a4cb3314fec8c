//! Chain access.
//!
//! Defines the `ChainClient` and `SwapVenue` traits the engine talks to,
//! plus the alloy-backed implementation for EVM JSON-RPC endpoints:
//! - `abi` — contract bindings (ERC-20, dice game, swap)
//! - `events` — typed decoder for the game's `Played` outcome event
//! - `seed` — client-seed sources
//! - `evm` — `EvmClient`, the live implementation

pub mod abi;
pub mod events;
pub mod evm;
pub mod seed;

use alloy::primitives::{Address, Log, B256, U256};
use anyhow::Result;
use async_trait::async_trait;

use crate::types::{ContractLimits, Side};

// ---------------------------------------------------------------------------
// Call and receipt types
// ---------------------------------------------------------------------------

/// Arguments of one `play(amount, choice, clientSeed)` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayCall {
    pub amount: U256,
    pub side: Side,
    pub client_seed: U256,
}

/// Result of simulating a call with `eth_call`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Revert(String),
}

/// Result of `eth_estimateGas`. A node that refuses to estimate is
/// predicting a revert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GasEstimate {
    Units(u64),
    Revert(String),
}

/// The parts of a mined receipt the agent consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub success: bool,
    pub gas_used: u64,
    pub logs: Vec<Log>,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Reads and writes against the token and game contracts.
///
/// All writes go through a single signer; implementations must not be shared
/// with another submitter using the same key.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Address of the signing wallet.
    fn wallet(&self) -> Address;

    /// Address of the game contract (spender and event emitter).
    fn game_address(&self) -> Address;

    async fn token_decimals(&self) -> Result<u8>;

    async fn token_balance(&self, owner: Address) -> Result<U256>;

    /// Native gas-coin balance.
    async fn native_balance(&self, owner: Address) -> Result<U256>;

    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256>;

    async fn min_bet(&self) -> Result<U256>;

    async fn max_bet(&self) -> Result<U256>;

    async fn bankroll(&self) -> Result<U256>;

    /// Submit `approve(spender, amount)` and return the transaction hash.
    async fn send_approval(&self, spender: Address, amount: U256) -> Result<B256>;

    async fn simulate_play(&self, call: PlayCall) -> Result<CallOutcome>;

    async fn estimate_play_gas(&self, call: PlayCall) -> Result<GasEstimate>;

    async fn submit_play(&self, call: PlayCall, gas_limit: u64) -> Result<B256>;

    /// Single receipt lookup; `None` while the transaction is pending.
    async fn receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>>;

    /// All three contract limits in one go.
    async fn contract_limits(&self) -> Result<ContractLimits> {
        let (min_bet, max_bet, bankroll) =
            tokio::try_join!(self.min_bet(), self.max_bet(), self.bankroll())?;
        Ok(ContractLimits { min_bet, max_bet, bankroll })
    }
}

/// Swap direction on the fixed-rate swap contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapDirection {
    /// Token in, native coin out (`swapVinForMon`).
    ToNative,
    /// Native coin in, token out (`swapMonForVin`, payable).
    ToToken,
}

/// Reserves held by the swap contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapReserves {
    pub native: U256,
    pub token: U256,
}

/// The swap contract. Token balances, approvals and receipts go through
/// `ChainClient`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SwapVenue: Send + Sync {
    fn swap_address(&self) -> Address;

    async fn reserves(&self) -> Result<SwapReserves>;

    async fn estimate_swap(&self, direction: SwapDirection, amount: U256) -> Result<GasEstimate>;

    async fn submit_swap(&self, direction: SwapDirection, amount: U256, gas_limit: u64) -> Result<B256>;
}

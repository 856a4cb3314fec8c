//! EVM JSON-RPC client.
//!
//! Implements `ChainClient` and `SwapVenue` on an alloy HTTP provider with a
//! local signing wallet. The wallet filler owns nonce assignment, so every
//! transaction from this process is serialised through one key.

use alloy::contract::Error as ContractError;
use alloy::network::EthereumWallet;
use alloy::primitives::{Address, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use alloy::transports::http::reqwest::Url;
use alloy::transports::RpcError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use super::abi::{IDiceGame, IERC20, ISwap};
use super::{CallOutcome, ChainClient, GasEstimate, PlayCall, SwapDirection, SwapReserves, SwapVenue, TxReceipt};
use crate::config::ChainConfig;

pub struct EvmClient {
    provider: DynProvider,
    wallet: Address,
    token: Address,
    game: Address,
    swap: Address,
}

impl EvmClient {
    /// Build a signing provider for the configured endpoint.
    pub fn connect(cfg: &ChainConfig, private_key: &SecretString) -> Result<Self> {
        let signer: PrivateKeySigner = private_key
            .expose_secret()
            .trim()
            .parse()
            .context("Failed to parse private key")?;
        let signer = signer.with_chain_id(Some(cfg.chain_id));
        let wallet = signer.address();

        let url: Url = cfg
            .rpc_url
            .parse()
            .with_context(|| format!("Invalid RPC URL: {}", cfg.rpc_url))?;

        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();

        info!(
            wallet = %wallet,
            rpc = %cfg.rpc_url,
            chain_id = cfg.chain_id,
            "Chain client ready"
        );

        Ok(Self {
            provider,
            wallet,
            token: cfg.token_address,
            game: cfg.game_address,
            swap: cfg.swap_address,
        })
    }

    fn token(&self) -> IERC20::IERC20Instance<DynProvider> {
        IERC20::new(self.token, self.provider.clone())
    }

    fn game(&self) -> IDiceGame::IDiceGameInstance<DynProvider> {
        IDiceGame::new(self.game, self.provider.clone())
    }

    fn swap(&self) -> ISwap::ISwapInstance<DynProvider> {
        ISwap::new(self.swap, self.provider.clone())
    }
}

/// A JSON-RPC error response to `eth_call`/`eth_estimateGas` is the node
/// reporting a revert. Anything else is a transport failure.
fn revert_reason(err: ContractError) -> Result<String> {
    match err {
        ContractError::TransportError(RpcError::ErrorResp(payload)) => Ok(payload.message.to_string()),
        other => Err(anyhow::Error::new(other)),
    }
}

#[async_trait]
impl ChainClient for EvmClient {
    fn wallet(&self) -> Address {
        self.wallet
    }

    fn game_address(&self) -> Address {
        self.game
    }

    async fn token_decimals(&self) -> Result<u8> {
        self.token().decimals().call().await.context("Failed to read token decimals")
    }

    async fn token_balance(&self, owner: Address) -> Result<U256> {
        self.token().balanceOf(owner).call().await.context("Failed to read token balance")
    }

    async fn native_balance(&self, owner: Address) -> Result<U256> {
        self.provider.get_balance(owner).await.context("Failed to read native balance")
    }

    async fn allowance(&self, owner: Address, spender: Address) -> Result<U256> {
        self.token()
            .allowance(owner, spender)
            .call()
            .await
            .context("Failed to read allowance")
    }

    async fn min_bet(&self) -> Result<U256> {
        self.game().MIN_BET().call().await.context("Failed to read MIN_BET")
    }

    async fn max_bet(&self) -> Result<U256> {
        self.game().getMaxBet().call().await.context("Failed to read getMaxBet")
    }

    async fn bankroll(&self) -> Result<U256> {
        self.game().getBankBalance().call().await.context("Failed to read getBankBalance")
    }

    async fn send_approval(&self, spender: Address, amount: U256) -> Result<B256> {
        let pending = self
            .token()
            .approve(spender, amount)
            .send()
            .await
            .context("Failed to send approval transaction")?;
        Ok(*pending.tx_hash())
    }

    async fn simulate_play(&self, call: PlayCall) -> Result<CallOutcome> {
        let result = self
            .game()
            .play(call.amount, call.side.as_u8(), call.client_seed)
            .from(self.wallet)
            .call()
            .await;

        match result {
            Ok(_) => Ok(CallOutcome::Success),
            Err(e) => revert_reason(e)
                .map(CallOutcome::Revert)
                .context("play simulation failed"),
        }
    }

    async fn estimate_play_gas(&self, call: PlayCall) -> Result<GasEstimate> {
        let result = self
            .game()
            .play(call.amount, call.side.as_u8(), call.client_seed)
            .from(self.wallet)
            .estimate_gas()
            .await;

        match result {
            Ok(units) => Ok(GasEstimate::Units(units)),
            Err(e) => revert_reason(e)
                .map(GasEstimate::Revert)
                .context("play gas estimation failed"),
        }
    }

    async fn submit_play(&self, call: PlayCall, gas_limit: u64) -> Result<B256> {
        let pending = self
            .game()
            .play(call.amount, call.side.as_u8(), call.client_seed)
            .gas(gas_limit)
            .send()
            .await
            .context("Failed to send play transaction")?;
        Ok(*pending.tx_hash())
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .with_context(|| format!("Failed to fetch receipt for {tx_hash}"))?;

        let Some(r) = receipt else {
            debug!(tx = %tx_hash, "Receipt not yet available");
            return Ok(None);
        };

        Ok(Some(TxReceipt {
            tx_hash: r.transaction_hash,
            success: r.status(),
            gas_used: r.gas_used,
            logs: r.inner.logs().iter().map(|l| l.inner.clone()).collect(),
        }))
    }
}

#[async_trait]
impl SwapVenue for EvmClient {
    fn swap_address(&self) -> Address {
        self.swap
    }

    async fn reserves(&self) -> Result<SwapReserves> {
        let swap = self.swap();
        let native = swap.getMonReserve().call().await.context("Failed to read native reserve")?;
        let token = swap.getVinReserve().call().await.context("Failed to read token reserve")?;
        Ok(SwapReserves { native, token })
    }

    async fn estimate_swap(&self, direction: SwapDirection, amount: U256) -> Result<GasEstimate> {
        let swap = self.swap();
        let result = match direction {
            SwapDirection::ToNative => swap.swapVinForMon(amount).from(self.wallet).estimate_gas().await,
            SwapDirection::ToToken => {
                swap.swapMonForVin().from(self.wallet).value(amount).estimate_gas().await
            }
        };

        match result {
            Ok(units) => Ok(GasEstimate::Units(units)),
            Err(e) => revert_reason(e)
                .map(GasEstimate::Revert)
                .context("swap gas estimation failed"),
        }
    }

    async fn submit_swap(&self, direction: SwapDirection, amount: U256, gas_limit: u64) -> Result<B256> {
        let swap = self.swap();
        let pending = match direction {
            SwapDirection::ToNative => swap.swapVinForMon(amount).gas(gas_limit).send().await,
            SwapDirection::ToToken => swap.swapMonForVin().value(amount).gas(gas_limit).send().await,
        }
        .context("Failed to send swap transaction")?;
        Ok(*pending.tx_hash())
    }
}

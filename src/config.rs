//! Configuration loading from TOML with environment variable overrides.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! The signing key is referenced by env-var name in the config and
//! resolved at runtime, never stored in the file.

use alloy::primitives::{address, Address};
use anyhow::{Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::types::AgentError;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub chain: ChainConfig,
}

/// What to do when the mandated stake exceeds the contract's max bet.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CeilingPolicy {
    /// Stop the engine (autonomous default).
    #[default]
    Halt,
    /// Submit anyway; the preflight simulation still guards against reverts.
    Override,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AgentConfig {
    pub name: String,
    /// Stop-loss floor in whole tokens.
    pub global_floor: Decimal,
    pub round_interval_ms: u64,
    /// Standing approval granted to the game contract, in whole tokens.
    pub approval_amount: Decimal,
    pub confirmation_timeout_secs: u64,
    pub receipt_poll_ms: u64,
    /// Headroom added on top of the gas estimate, in percent.
    pub gas_buffer_pct: u64,
    pub ceiling_policy: CeilingPolicy,
    pub state_file: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "DICEBOT-001".to_string(),
            global_floor: dec!(40),
            round_interval_ms: 30_000,
            approval_amount: dec!(100000000),
            confirmation_timeout_secs: 180,
            receipt_poll_ms: 1_500,
            gas_buffer_pct: 20,
            ceiling_policy: CeilingPolicy::Halt,
            state_file: "dicebot_state.json".to_string(),
        }
    }
}

impl AgentConfig {
    pub fn round_interval(&self) -> Duration {
        Duration::from_millis(self.round_interval_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    pub fn receipt_poll(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    /// Name of the environment variable holding the signing key.
    pub private_key_env: String,
    pub token_address: Address,
    pub game_address: Address,
    pub swap_address: Address,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://rpc.monad.xyz".to_string(),
            chain_id: 143,
            private_key_env: "PRIVATE_KEY".to_string(),
            token_address: address!("fB71cbd8CB6f0fb72a9568f11e7E4454309A9cA1"),
            game_address: address!("245Fb6ECC6B2beCaf45AC15E4fAc8C78826f0F67"),
            swap_address: address!("11395DB7E0AcB7c56fE79FBAFFD48B5BeC896098"),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Load the file if it exists (defaults otherwise), apply environment
    /// overrides, and validate.
    pub fn load_with_env(path: &str) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::load(path)?
        } else {
            info!(path, "No config file found, using defaults");
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (the process environment in
    /// production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("RPC_URL") {
            self.chain.rpc_url = v;
        }
        if let Some(v) = lookup("TOKEN_ADDRESS") {
            self.chain.token_address = parse_override("TOKEN_ADDRESS", &v)?;
        }
        if let Some(v) = lookup("GAME_ADDRESS") {
            self.chain.game_address = parse_override("GAME_ADDRESS", &v)?;
        }
        if let Some(v) = lookup("SWAP_ADDRESS") {
            self.chain.swap_address = parse_override("SWAP_ADDRESS", &v)?;
        }
        if let Some(v) = lookup("GLOBAL_FLOOR") {
            self.agent.global_floor = parse_override("GLOBAL_FLOOR", &v)?;
        }
        if let Some(v) = lookup("ROUND_INTERVAL_MS") {
            self.agent.round_interval_ms = parse_override("ROUND_INTERVAL_MS", &v)?;
        }
        if let Some(v) = lookup("APPROVAL_AMOUNT") {
            self.agent.approval_amount = parse_override("APPROVAL_AMOUNT", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), AgentError> {
        if self.agent.global_floor.is_sign_negative() {
            return Err(AgentError::Config("global_floor must not be negative".into()));
        }
        if self.agent.approval_amount <= Decimal::ZERO {
            return Err(AgentError::Config("approval_amount must be positive".into()));
        }
        if self.agent.gas_buffer_pct > 100 {
            return Err(AgentError::Config("gas_buffer_pct must be at most 100".into()));
        }
        if self.agent.confirmation_timeout_secs == 0 {
            return Err(AgentError::Config("confirmation_timeout_secs must be positive".into()));
        }
        if self.chain.rpc_url.is_empty() {
            return Err(AgentError::Config("rpc_url is empty".into()));
        }
        Ok(())
    }

    /// Resolve the signing key from the environment variable named in the config.
    pub fn signing_key(&self) -> Result<SecretString> {
        let name = &self.chain.private_key_env;
        let key = std::env::var(name)
            .with_context(|| format!("Environment variable not set: {name}"))?;
        Ok(SecretString::new(key))
    }
}

fn parse_override<T: FromStr>(key: &str, value: &str) -> Result<T, AgentError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| AgentError::Config(format!("{key}={value}: {e}")))
}

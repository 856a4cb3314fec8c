//! DICEBOT — Autonomous even/odd wagering agent
//!
//! Entry point. Loads configuration, initialises structured logging,
//! connects the signing chain client, and dispatches to the engine loop,
//! a one-shot status report, or the swap desk.

use alloy::primitives::U256;
use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use dicebot::chain::evm::EvmClient;
use dicebot::chain::seed::OsSeedSource;
use dicebot::chain::{ChainClient, SwapDirection, SwapVenue};
use dicebot::config::AppConfig;
use dicebot::engine::accountant::log_session_summary;
use dicebot::engine::executor::{ExecutorConfig, TransactionExecutor};
use dicebot::engine::{Engine, EngineSettings, HaltReason};
use dicebot::storage;
use dicebot::strategy::{RiskConfig, RiskGate, StakeSizer};
use dicebot::swap::{SwapDesk, NATIVE_DECIMALS};
use dicebot::types::TokenUnits;

const BANNER: &str = r#"
 ____ ___ ____ _____ ____   ___ _____
|  _ \_ _/ ___| ____| __ ) / _ \_   _|
| | | | | |   |  _| |  _ \| | | || |
| |_| | | |___| |___| |_) | |_| || |
|____/___\____|_____|____/ \___/ |_|

  Even/odd dice agent
  v0.1.0 — Autonomous Agent
"#;

#[derive(Parser)]
#[command(name = "dicebot", version, about = "Autonomous even/odd dice wagering agent")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the wagering engine until it halts or Ctrl+C.
    Run,
    /// Print balances, allowance, contract limits and swap reserves.
    Status,
    /// Swap between the wager token and the native coin at the fixed rate.
    Swap {
        #[arg(long, value_enum)]
        direction: Direction,
        /// Amount of the input asset, in whole units.
        #[arg(long)]
        amount: Decimal,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Direction {
    ToNative,
    ToToken,
}

impl From<Direction> for SwapDirection {
    fn from(d: Direction) -> Self {
        match d {
            Direction::ToNative => SwapDirection::ToNative,
            Direction::ToToken => SwapDirection::ToToken,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    init_logging();

    let cfg = AppConfig::load_with_env(&cli.config)?;

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        rpc = %cfg.chain.rpc_url,
        game = %cfg.chain.game_address,
        token = %cfg.chain.token_address,
        "DICEBOT starting up"
    );

    let key = cfg.signing_key()?;
    let client = Arc::new(EvmClient::connect(&cfg.chain, &key)?);
    let units = TokenUnits::new(client.token_decimals().await?);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_engine(&cfg, client, units).await,
        Command::Status => print_status(client, units).await,
        Command::Swap { direction, amount } => run_swap(&cfg, client, units, direction.into(), amount).await,
    }
}

async fn run_engine(cfg: &AppConfig, client: Arc<EvmClient>, units: TokenUnits) -> Result<()> {
    let state_file = cfg.agent.state_file.clone();
    match storage::load_state(Some(&state_file)) {
        Ok(Some(previous)) => log_session_summary(&previous),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Ignoring unreadable previous session"),
    }

    let gate = RiskGate::new(RiskConfig {
        global_floor: units.to_raw(cfg.agent.global_floor)?,
        approval_amount: units.to_raw(cfg.agent.approval_amount)?,
        ceiling_policy: cfg.agent.ceiling_policy,
    });
    let executor = TransactionExecutor::new(client.clone(), OsSeedSource, executor_config(cfg));

    let mut engine = Engine::new(
        client,
        executor,
        StakeSizer::new(units.one()),
        gate,
        EngineSettings {
            round_interval: cfg.agent.round_interval(),
            state_file: Some(state_file),
        },
    )
    .await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received, stopping before the next round");
            let _ = shutdown_tx.send(true);
        }
    });

    info!("Entering main loop. Press Ctrl+C to stop.");
    match engine.run(shutdown_rx).await {
        HaltReason::Cancelled => {
            info!("DICEBOT shut down cleanly.");
            Ok(())
        }
        reason => bail!("engine halted: {reason}"),
    }
}

async fn print_status(client: Arc<EvmClient>, units: TokenUnits) -> Result<()> {
    let wallet = client.wallet();
    let game = client.game_address();
    let (balance, native, allowance, limits, reserves) = tokio::try_join!(
        client.token_balance(wallet),
        client.native_balance(wallet),
        client.allowance(wallet, game),
        client.contract_limits(),
        client.reserves(),
    )?;
    let native_units = TokenUnits::new(NATIVE_DECIMALS);

    println!("Wallet        {wallet}");
    println!("Token         {}", units.format(balance));
    println!("Native        {}", native_units.format(native));
    println!("Allowance     {}", units.format(allowance));
    println!("Min bet       {}", units.format(limits.min_bet));
    println!("Max bet       {}", units.format(limits.max_bet));
    println!("Bankroll      {}", units.format(limits.bankroll));
    println!(
        "Swap reserves {} token / {} native",
        units.format(reserves.token),
        native_units.format(reserves.native)
    );
    Ok(())
}

async fn run_swap(
    cfg: &AppConfig,
    client: Arc<EvmClient>,
    units: TokenUnits,
    direction: SwapDirection,
    amount: Decimal,
) -> Result<()> {
    let input_units = match direction {
        SwapDirection::ToNative => units,
        SwapDirection::ToToken => TokenUnits::new(NATIVE_DECIMALS),
    };
    let amount_in: U256 = input_units.to_raw(amount)?;

    let desk = SwapDesk::new(client.clone(), client, units, executor_config(cfg));
    let quote = desk.quote(direction, amount_in).await?;
    info!(
        direction = ?direction,
        amount_in = %quote.amount_in,
        amount_out = %quote.amount_out,
        covered = quote.covered(),
        "Swap quote"
    );

    let outcome = desk.execute(direction, amount_in).await?;
    println!("Swap confirmed: {} (gas {})", outcome.tx_hash, outcome.gas_used);
    Ok(())
}

fn executor_config(cfg: &AppConfig) -> ExecutorConfig {
    ExecutorConfig {
        gas_buffer_pct: cfg.agent.gas_buffer_pct,
        confirmation_timeout: cfg.agent.confirmation_timeout(),
        receipt_poll: cfg.agent.receipt_poll(),
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dicebot=info"));

    let json_logging = std::env::var("DICEBOT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}

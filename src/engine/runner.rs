//! The wagering loop.
//!
//! Strictly sequential: sample balance, check the floor, size the stake,
//! clear it through the risk gate, play, learn the result, update the
//! cycle. Any rejection or round error halts the engine for good.

use alloy::primitives::U256;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::chain::seed::SeedSource;
use crate::chain::ChainClient;
use crate::engine::accountant::SessionLedger;
use crate::engine::cycle::{CycleController, CycleState, Peak, Transition};
use crate::engine::executor::{RoundError, RoundResult, Severity, TransactionExecutor};
use crate::storage;
use crate::strategy::{OutcomeTracker, RiskGate, RiskRejection, StakeSizer};

// ---------------------------------------------------------------------------
// Halt reasons
// ---------------------------------------------------------------------------

/// Why the engine stopped. Every variant is terminal.
#[derive(Debug, thiserror::Error)]
pub enum HaltReason {
    #[error("risk gate: {0}")]
    Risk(#[from] RiskRejection),

    #[error("round failed: {0}")]
    Round(#[from] RoundError),

    #[error("RPC failure: {0}")]
    Rpc(String),

    #[error("shutdown requested")]
    Cancelled,
}

impl HaltReason {
    fn rpc(err: anyhow::Error) -> Self {
        HaltReason::Rpc(format!("{err:#}"))
    }

    /// Abort-class halts came from a round that produced no outcome; the
    /// rest mean the agent could not operate safely.
    pub fn severity(&self) -> Option<Severity> {
        match self {
            HaltReason::Round(err) => Some(err.severity()),
            HaltReason::Cancelled => None,
            _ => Some(Severity::Fatal),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub round_interval: Duration,
    /// Where the session snapshot is written. `None` disables persistence.
    pub state_file: Option<String>,
}

/// Outcome of one successful loop iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Same cycle continues after the delay.
    Continue { after: Duration },
    /// The round set a new peak; the next step opens a new cycle.
    CycleComplete { new_peak: U256 },
}

pub struct Engine<C, S> {
    chain: Arc<C>,
    executor: TransactionExecutor<C, S>,
    sizer: StakeSizer,
    gate: RiskGate,
    tracker: OutcomeTracker,
    peak: Peak,
    cycle: Option<CycleController>,
    cycles_started: u64,
    ledger: SessionLedger,
    settings: EngineSettings,
}

impl<C: ChainClient, S: SeedSource> Engine<C, S> {
    /// Build an engine anchored at the wallet's live balance. The peak starts
    /// there and the first round plays Even.
    pub async fn new(
        chain: Arc<C>,
        executor: TransactionExecutor<C, S>,
        sizer: StakeSizer,
        gate: RiskGate,
        settings: EngineSettings,
    ) -> anyhow::Result<Self> {
        let balance = chain.token_balance(chain.wallet()).await?;
        info!(wallet = %chain.wallet(), balance = %balance, "Engine initialised");

        Ok(Self {
            chain,
            executor,
            sizer,
            gate,
            tracker: OutcomeTracker::new(),
            peak: Peak::new(balance),
            cycle: None,
            cycles_started: 0,
            ledger: SessionLedger::new(balance),
            settings,
        })
    }

    pub fn peak(&self) -> U256 {
        self.peak.value()
    }

    pub fn tracker(&self) -> &OutcomeTracker {
        &self.tracker
    }

    pub fn cycle(&self) -> Option<&CycleController> {
        self.cycle.as_ref()
    }

    pub fn ledger(&self) -> &SessionLedger {
        &self.ledger
    }

    /// Run one iteration of the loop.
    pub async fn step(&mut self) -> Result<Step, HaltReason> {
        let wallet = self.chain.wallet();
        let (balance, native) = tokio::try_join!(
            self.chain.token_balance(wallet),
            self.chain.native_balance(wallet),
        )
        .map_err(HaltReason::rpc)?;
        debug!(balance = %balance, peak = %self.peak.value(), "Balance sampled");
        self.ledger.observe_balance(balance);

        self.gate.check_floor(balance)?;

        let ctl = match &mut self.cycle {
            Some(ctl) if ctl.state() == CycleState::Active => ctl,
            slot => {
                self.cycles_started += 1;
                slot.insert(CycleController::start(
                    self.cycles_started,
                    balance,
                    self.settings.round_interval,
                ))
            }
        };

        let round = ctl.next_round_index();
        let stake = self.sizer.next_stake(round, ctl.cycle().cumulative_loss);

        let (limits, allowance) = tokio::try_join!(
            self.chain.contract_limits(),
            self.chain.allowance(wallet, self.chain.game_address()),
        )
        .map_err(HaltReason::rpc)?;
        debug!(
            min_bet = %limits.min_bet,
            max_bet = %limits.max_bet,
            bankroll = %limits.bankroll,
            allowance = %allowance,
            "Contract limits refreshed"
        );

        let clearance = self.gate.check(stake, balance, &limits, allowance)?;
        let side = self.tracker.side_for_next_round();

        info!(
            cycle = ctl.cycle().index,
            round,
            stake = %clearance.stake,
            requested = %clearance.requested,
            clamped = clearance.clamped,
            side = %side,
            cumulative_loss = %ctl.cycle().cumulative_loss,
            balance = %balance,
            native = %native,
            "Playing round"
        );

        let result: RoundResult = self.executor.play_round(&clearance, side).await?;
        self.tracker.record(result.result_side);
        let cycle_index = ctl.cycle().index;

        // The round is settled on-chain from here; it must reach the ledger
        // even if the balance read fails.
        let balance_after = match self.chain.token_balance(wallet).await {
            Ok(balance_after) => balance_after,
            Err(e) => {
                self.ledger
                    .record_round(cycle_index, round, &result, None, self.peak.value());
                self.persist();
                return Err(HaltReason::Rpc(format!(
                    "balance read failed after confirmed round {}: {e:#}",
                    result.tx_hash
                )));
            }
        };

        let transition = ctl.complete_round(result.stake, result.won, balance_after, &mut self.peak);
        let record = self.ledger.record_round(
            cycle_index,
            round,
            &result,
            Some(balance_after),
            self.peak.value(),
        );

        info!(
            cycle = record.cycle_index,
            round = record.round_in_cycle,
            global = record.global_index,
            stake = %record.stake,
            side = %record.chosen_side,
            tx = %record.tx_hash,
            result = %record.result_side,
            won = record.won,
            balance = %balance_after,
            peak = %self.peak.value(),
            "Round complete"
        );

        let step = match transition {
            Transition::Continue { after } => Step::Continue { after },
            Transition::Peaked { new_peak } => {
                self.ledger.close_cycle(ctl.cycle(), new_peak);
                Step::CycleComplete { new_peak }
            }
        };

        self.persist();
        Ok(step)
    }

    /// Loop until halted. Cancellation is honoured before a round starts
    /// and during the inter-round delay, never while a transaction is in
    /// flight.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> HaltReason {
        info!(
            interval_ms = self.settings.round_interval.as_millis() as u64,
            floor = %self.gate.config().global_floor,
            "Engine running"
        );

        let reason = loop {
            if *shutdown.borrow() {
                break HaltReason::Cancelled;
            }

            match self.step().await {
                Ok(Step::Continue { after }) => {
                    if sleep_or_cancel(after, &mut shutdown).await {
                        break HaltReason::Cancelled;
                    }
                }
                Ok(Step::CycleComplete { .. }) => {}
                Err(reason) => break reason,
            }
        };

        self.halt(&reason);
        reason
    }

    fn halt(&mut self, reason: &HaltReason) {
        match reason {
            HaltReason::Cancelled => info!("Engine stopped on request"),
            HaltReason::Round(err) => error!(
                severity = ?err.severity(),
                last_tx = ?self.ledger.last_tx(),
                reason = %reason,
                "Engine halted"
            ),
            _ => error!(last_tx = ?self.ledger.last_tx(), reason = %reason, "Engine halted"),
        }
        self.ledger.mark_halted(reason.to_string());
        self.persist();
        self.ledger.log_summary();
    }

    fn persist(&self) {
        let Some(path) = self.settings.state_file.as_deref() else {
            return;
        };
        if let Err(e) = storage::save_state(self.ledger.snapshot(), Some(path)) {
            warn!(error = %e, path, "Failed to persist session state");
        }
    }
}

/// Sleep for `after`, returning early with `true` if shutdown is requested.
async fn sleep_or_cancel(after: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(after);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return *shutdown.borrow(),
            changed = shutdown.changed() => match changed {
                Ok(()) if *shutdown.borrow() => return true,
                Ok(()) => continue,
                // Sender gone; nobody can cancel any more.
                Err(_) => {
                    (&mut sleep).await;
                    return false;
                }
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

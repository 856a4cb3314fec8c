//! End-to-end engine scenarios against the in-memory chain.
//!
//! Token decimals are zero here so one raw unit is one whole token and the
//! stake table reads directly as raw amounts.

use alloy::primitives::U256;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use dicebot::chain::seed::FixedSeeds;
use dicebot::config::CeilingPolicy;
use dicebot::engine::executor::{ExecutorConfig, RoundError, TransactionExecutor};
use dicebot::engine::{Engine, EngineSettings, HaltReason, Step};
use dicebot::storage;
use dicebot::strategy::{RiskConfig, RiskGate, RiskRejection, StakeSizer};
use dicebot::types::{ContractLimits, Side};

use crate::mock_chain::{MockChain, Scripted, GAME};

fn u(n: u64) -> U256 {
    U256::from(n)
}

fn limits(min_bet: u64, max_bet: u64) -> ContractLimits {
    ContractLimits {
        min_bet: u(min_bet),
        max_bet: u(max_bet),
        bankroll: u(max_bet * 2),
    }
}

fn temp_state() -> String {
    let mut p = std::env::temp_dir();
    p.push(format!("dicebot_it_state_{}.json", uuid::Uuid::new_v4()));
    p.to_string_lossy().to_string()
}

async fn engine_with(
    chain: &MockChain,
    floor: u64,
    policy: CeilingPolicy,
    state_file: Option<String>,
) -> Engine<MockChain, FixedSeeds> {
    let chain = Arc::new(chain.clone());
    let executor = TransactionExecutor::new(
        chain.clone(),
        FixedSeeds::counting(10_000),
        ExecutorConfig {
            gas_buffer_pct: 20,
            confirmation_timeout: Duration::from_secs(2),
            receipt_poll: Duration::from_millis(5),
        },
    );
    let gate = RiskGate::new(RiskConfig {
        global_floor: u(floor),
        approval_amount: u(100_000_000),
        ceiling_policy: policy,
    });
    Engine::new(
        chain,
        executor,
        StakeSizer::new(u(1)),
        gate,
        EngineSettings {
            round_interval: Duration::from_millis(1),
            state_file,
        },
    )
    .await
    .unwrap()
}

async fn engine(chain: &MockChain, floor: u64) -> Engine<MockChain, FixedSeeds> {
    engine_with(chain, floor, CeilingPolicy::Halt, None).await
}

async fn run_to_halt(engine: &mut Engine<MockChain, FixedSeeds>) -> HaltReason {
    let (_tx, rx) = watch::channel(false);
    tokio::time::timeout(Duration::from_secs(10), engine.run(rx))
        .await
        .expect("engine did not halt")
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_loss_then_win_sets_new_peak() {
    let chain = MockChain::new(1000, limits(1, 500));
    chain.script([Scripted::loss(Side::Odd), Scripted::win(Side::Even)]);
    let mut engine = engine(&chain, 40).await;
    assert_eq!(engine.peak(), u(1000));

    let step = engine.step().await.unwrap();
    assert!(matches!(step, Step::Continue { .. }));
    let cycle = engine.cycle().unwrap().cycle().clone();
    assert_eq!(cycle.cumulative_loss, u(1));
    assert_eq!(chain.balance(), u(999));
    assert_eq!(engine.peak(), u(1000));

    let step = engine.step().await.unwrap();
    assert_eq!(step, Step::CycleComplete { new_peak: u(1001) });
    assert_eq!(chain.balance(), u(1001));
    assert_eq!(engine.peak(), u(1001));

    let plays = chain.plays();
    assert_eq!(plays.len(), 2);
    assert_eq!((plays[0].0.amount, plays[0].0.side), (u(1), Side::Even));
    assert_eq!((plays[1].0.amount, plays[1].0.side), (u(2), Side::Odd));
    assert_eq!(plays[0].1, 60_000);

    let ledger = engine.ledger();
    assert_eq!(ledger.stats().cycles_completed, 1);
    assert_eq!(ledger.history()[1].payout, u(4));
    assert_eq!(ledger.history()[1].balance_after, Some(u(1001)));
}

#[tokio::test]
async fn test_round_kept_when_post_round_balance_read_fails() {
    let chain = MockChain::new(1000, limits(1, 500));
    chain.script([Scripted::loss(Side::Odd)]);
    let state_file = temp_state();
    let mut engine = engine_with(&chain, 40, CeilingPolicy::Halt, Some(state_file.clone())).await;
    // The pre-round sample succeeds; the read after confirmation does not.
    chain.fail_balance_reads_after(1);

    let reason = engine.step().await.unwrap_err();
    let play_tx = {
        let history = engine.ledger().history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].balance_after, None);
        assert_eq!(history[0].result_side, Side::Odd);
        assert!(!history[0].won);
        history[0].tx_hash
    };
    match &reason {
        HaltReason::Rpc(msg) => {
            assert!(msg.contains(&play_tx.to_string()), "{msg}");
            assert!(msg.contains("timed out"), "{msg}");
        }
        other => panic!("unexpected halt: {other}"),
    }
    assert_eq!(engine.ledger().last_tx(), Some(play_tx));
    assert_eq!(engine.tracker().last_result(), Some(Side::Odd));
    assert_eq!(chain.balance(), u(999));

    let saved = storage::load_state(Some(&state_file)).unwrap().unwrap();
    assert_eq!(saved.history.len(), 1);
    assert_eq!(saved.history[0].tx_hash, play_tx);
    storage::delete_state(Some(&state_file)).unwrap();
}

#[tokio::test]
async fn test_stake_above_max_bet_halts_without_sending() {
    let chain = MockChain::new(1000, limits(1, 20));
    // 1 + 2 + 4 + 8 + 8 + 8 + 8 = 39 lost, so round 8 mandates 40.
    chain.script(std::iter::repeat(Scripted::loss(Side::Odd)).take(7));
    let mut engine = engine(&chain, 40).await;

    let reason = run_to_halt(&mut engine).await;
    match reason {
        HaltReason::Risk(RiskRejection::StakeAboveMax { stake, max_bet }) => {
            assert_eq!(stake, u(40));
            assert_eq!(max_bet, u(20));
        }
        other => panic!("unexpected halt: {other}"),
    }
    assert!(reason.to_string().contains("stake exceeds max bet"));
    assert_eq!(chain.plays().len(), 7);
    assert_eq!(chain.balance(), u(961));
}

#[tokio::test]
async fn test_override_policy_submits_above_max_bet() {
    let chain = MockChain::new(1000, limits(1, 20));
    chain.script(std::iter::repeat(Scripted::loss(Side::Odd)).take(8));
    let mut engine = engine_with(&chain, 40, CeilingPolicy::Override, None).await;

    for _ in 0..8 {
        engine.step().await.unwrap();
    }
    assert_eq!(chain.plays()[7].0.amount, u(40));
}

#[tokio::test]
async fn test_short_allowance_approves_once() {
    let chain = MockChain::new(1000, limits(1, 500));
    chain.set_allowance(0);
    chain.script([Scripted::loss(Side::Odd), Scripted::loss(Side::Odd)]);
    let mut engine = engine(&chain, 40).await;

    engine.step().await.unwrap();
    assert_eq!(chain.approvals(), vec![(GAME, u(100_000_000))]);
    assert_eq!(chain.allowance_now(), u(100_000_000 - 1));

    engine.step().await.unwrap();
    assert_eq!(chain.approvals().len(), 1);
    assert_eq!(engine.ledger().stats().approvals, 1);
}

#[tokio::test]
async fn test_simulated_revert_records_nothing() {
    let chain = MockChain::new(1000, limits(1, 500));
    chain.set_simulate_revert("bank balance too low");
    chain.script([Scripted::win(Side::Even)]);
    let mut engine = engine(&chain, 40).await;

    let err = engine.step().await.unwrap_err();
    assert_eq!(err.to_string(), "round failed: would revert: bank balance too low");
    assert!(matches!(err, HaltReason::Round(RoundError::WouldRevert(_))));
    assert!(chain.plays().is_empty());
    assert!(engine.ledger().history().is_empty());
    assert_eq!(engine.tracker().last_result(), None);
    assert_eq!(chain.balance(), u(1000));
}

// ---------------------------------------------------------------------------
// Halts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_floor_halts_and_persists_reason() {
    let path = temp_state();
    let chain = MockChain::new(45, limits(1, 500));
    chain.script(std::iter::repeat(Scripted::loss(Side::Even)).take(5));
    let mut engine = engine_with(&chain, 40, CeilingPolicy::Halt, Some(path.clone())).await;

    let reason = run_to_halt(&mut engine).await;
    assert!(matches!(
        reason,
        HaltReason::Risk(RiskRejection::BelowFloor { balance, .. }) if balance == u(38)
    ));
    // 45 - 1 - 2 - 4 = 38, under the floor before a fourth round.
    assert_eq!(chain.plays().len(), 3);

    let saved = storage::load_state(Some(&path)).unwrap().unwrap();
    assert_eq!(saved.stats.rounds, 3);
    assert!(saved.halt_reason.unwrap().contains("global floor"));
    storage::delete_state(Some(&path)).unwrap();
}

#[tokio::test]
async fn test_unaffordable_stake_halts() {
    let chain = MockChain::new(3, limits(1, 500));
    chain.script(std::iter::repeat(Scripted::loss(Side::Even)).take(3));
    let mut engine = engine(&chain, 0).await;

    let reason = run_to_halt(&mut engine).await;
    assert!(matches!(
        reason,
        HaltReason::Risk(RiskRejection::InsufficientBalance { needed, available })
            if needed == u(4) && available == u(0)
    ));
}

#[tokio::test]
async fn test_reverted_approval_is_fatal() {
    let chain = MockChain::new(1000, limits(1, 500));
    chain.set_allowance(0);
    chain.set_approval_reverts();
    let mut engine = engine(&chain, 40).await;

    let reason = run_to_halt(&mut engine).await;
    assert!(matches!(reason, HaltReason::Round(RoundError::ApprovalReverted(_))));
    assert!(chain.plays().is_empty());
}

#[tokio::test]
async fn test_missing_event_does_not_teach_tracker() {
    let chain = MockChain::new(1000, limits(1, 500));
    chain.script([Scripted::NoEvent]);
    let mut engine = engine(&chain, 40).await;

    let err = engine.step().await.unwrap_err();
    assert!(matches!(err, HaltReason::Round(RoundError::OutcomeMissing(_))));
    assert_eq!(engine.tracker().last_result(), None);
    assert!(engine.ledger().history().is_empty());
}

#[tokio::test]
async fn test_on_chain_revert_is_inconclusive() {
    let chain = MockChain::new(1000, limits(1, 500));
    chain.script([Scripted::RevertOnChain]);
    let mut engine = engine(&chain, 40).await;

    let err = engine.step().await.unwrap_err();
    assert!(matches!(err, HaltReason::Round(RoundError::Reverted(_))));
    assert_eq!(chain.balance(), u(1000));
}

#[tokio::test]
async fn test_rpc_failure_halts() {
    let chain = MockChain::new(1000, limits(1, 500));
    let mut engine = engine(&chain, 40).await;
    chain.set_error("connection refused");

    let reason = run_to_halt(&mut engine).await;
    assert!(matches!(reason, HaltReason::Rpc(ref msg) if msg.contains("connection refused")));
}

#[tokio::test]
async fn test_cancel_before_first_round() {
    let chain = MockChain::new(1000, limits(1, 500));
    chain.script([Scripted::win(Side::Even)]);
    let mut engine = engine(&chain, 40).await;

    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();
    let reason = engine.run(rx).await;
    assert!(matches!(reason, HaltReason::Cancelled));
    assert!(chain.plays().is_empty());
}

// ---------------------------------------------------------------------------
// Cycle boundaries
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_side_carries_across_cycles_and_loss_resets() {
    let chain = MockChain::new(100, limits(1, 500));
    chain.script([
        Scripted::loss(Side::Even),
        Scripted::win(Side::Odd),
        Scripted::loss(Side::Even),
    ]);
    let mut engine = engine(&chain, 40).await;

    engine.step().await.unwrap();
    let step = engine.step().await.unwrap();
    assert_eq!(step, Step::CycleComplete { new_peak: u(101) });

    engine.step().await.unwrap();
    let cycle = engine.cycle().unwrap().cycle().clone();
    assert_eq!(cycle.index, 2);
    assert_eq!(cycle.start_balance, u(101));
    assert_eq!(cycle.rounds_played, 1);
    assert_eq!(cycle.cumulative_loss, u(1));

    let plays = chain.plays();
    // New cycle restarts the stake table but plays the last result.
    assert_eq!((plays[2].0.amount, plays[2].0.side), (u(1), Side::Odd));
    assert_eq!(engine.ledger().history()[2].global_index, 3);
    assert_eq!(engine.ledger().history()[2].round_in_cycle, 1);
}

#[tokio::test]
async fn test_min_bet_clamp_counts_clamped_stake_as_loss() {
    let chain = MockChain::new(1000, limits(5, 500));
    chain.script([Scripted::loss(Side::Odd)]);
    let mut engine = engine(&chain, 40).await;

    engine.step().await.unwrap();
    assert_eq!(chain.plays()[0].0.amount, u(5));
    assert_eq!(engine.cycle().unwrap().cycle().cumulative_loss, u(5));
    assert_eq!(chain.balance(), u(995));
}

#[tokio::test]
async fn test_slow_receipts_are_polled() {
    let chain = MockChain::new(1000, limits(1, 500));
    chain.set_pending_polls(3);
    chain.script([Scripted::win(Side::Odd)]);
    let mut engine = engine(&chain, 40).await;

    let step = engine.step().await.unwrap();
    assert_eq!(step, Step::CycleComplete { new_peak: u(1001) });
    assert_eq!(engine.tracker().side_for_next_round(), Side::Odd);
}

#[tokio::test]
async fn test_fresh_seed_every_round() {
    let chain = MockChain::new(1000, limits(1, 500));
    chain.script(std::iter::repeat(Scripted::loss(Side::Odd)).take(4));
    let mut engine = engine(&chain, 40).await;

    for _ in 0..4 {
        engine.step().await.unwrap();
    }
    let seeds: Vec<_> = chain.plays().iter().map(|(c, _)| c.client_seed).collect();
    assert_eq!(seeds, vec![u(1), u(2), u(3), u(4)]);
}

//! Mock chain for integration testing.
//!
//! Provides a deterministic `ChainClient` that settles plays from a script
//! of outcomes, moves the token balance and allowance the way the real
//! contracts would, and emits `Played` logs into receipts. All state is
//! in-memory and controllable from test code.

use alloy::primitives::{address, Address, Bytes, Log, LogData, B256, U256};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use dicebot::chain::events::{encode_played, PlayedOutcome};
use dicebot::chain::{CallOutcome, ChainClient, GasEstimate, PlayCall, TxReceipt};
use dicebot::types::{ContractLimits, Side};

pub const WALLET: Address = address!("1111111111111111111111111111111111111111");
pub const GAME: Address = address!("245Fb6ECC6B2beCaf45AC15E4fAc8C78826f0F67");
pub const TOKEN: Address = address!("fB71cbd8CB6f0fb72a9568f11e7E4454309A9cA1");

/// How the next submitted play resolves.
#[derive(Debug, Clone, Copy)]
pub enum Scripted {
    Settle { result: Side, won: bool },
    /// Mined with a failed status.
    RevertOnChain,
    /// Mined successfully but without a `Played` event.
    NoEvent,
}

impl Scripted {
    pub fn win(result: Side) -> Self {
        Scripted::Settle { result, won: true }
    }

    pub fn loss(result: Side) -> Self {
        Scripted::Settle { result, won: false }
    }
}

struct ChainState {
    balance: U256,
    native: U256,
    allowance: U256,
    limits: ContractLimits,
    script: VecDeque<Scripted>,
    receipts: HashMap<B256, TxReceipt>,
    /// Polls that return `None` before a receipt becomes visible.
    pending_polls: u32,
    polls: HashMap<B256, u32>,
    next_tx: u64,
    simulate_revert: Option<String>,
    approval_reverts: bool,
    plays: Vec<(PlayCall, u64)>,
    approvals: Vec<(Address, U256)>,
    /// Token balance reads that succeed before the node starts timing out.
    balance_reads_left: Option<u32>,
}

/// A mock chain for deterministic engine testing.
#[derive(Clone)]
pub struct MockChain {
    state: Arc<Mutex<ChainState>>,
    /// If set, all RPC calls will return this error.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockChain {
    /// Wallet with `balance` tokens (raw units) and an unlimited allowance.
    pub fn new(balance: u64, limits: ContractLimits) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChainState {
                balance: U256::from(balance),
                native: U256::from(10u64).pow(U256::from(18)),
                allowance: U256::MAX,
                limits,
                script: VecDeque::new(),
                receipts: HashMap::new(),
                pending_polls: 0,
                polls: HashMap::new(),
                next_tx: 0,
                simulate_revert: None,
                approval_reverts: false,
                plays: Vec::new(),
                approvals: Vec::new(),
                balance_reads_left: None,
            })),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn script(&self, outcomes: impl IntoIterator<Item = Scripted>) {
        self.state.lock().unwrap().script.extend(outcomes);
    }

    pub fn set_allowance(&self, allowance: u64) {
        self.state.lock().unwrap().allowance = U256::from(allowance);
    }

    pub fn set_simulate_revert(&self, reason: &str) {
        self.state.lock().unwrap().simulate_revert = Some(reason.to_string());
    }

    pub fn set_approval_reverts(&self) {
        self.state.lock().unwrap().approval_reverts = true;
    }

    pub fn set_pending_polls(&self, polls: u32) {
        self.state.lock().unwrap().pending_polls = polls;
    }

    pub fn set_max_bet(&self, max_bet: u64) {
        self.state.lock().unwrap().limits.max_bet = U256::from(max_bet);
    }

    /// Let `reads` more token balance reads succeed, then fail the rest.
    pub fn fail_balance_reads_after(&self, reads: u32) {
        self.state.lock().unwrap().balance_reads_left = Some(reads);
    }

    /// Force all subsequent RPC calls to return an error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn balance(&self) -> U256 {
        self.state.lock().unwrap().balance
    }

    pub fn allowance_now(&self) -> U256 {
        self.state.lock().unwrap().allowance
    }

    /// Every submitted play with its gas limit.
    pub fn plays(&self) -> Vec<(PlayCall, u64)> {
        self.state.lock().unwrap().plays.clone()
    }

    pub fn approvals(&self) -> Vec<(Address, U256)> {
        self.state.lock().unwrap().approvals.clone()
    }

    fn check_error(&self) -> Result<()> {
        match self.force_error.lock().unwrap().as_ref() {
            Some(msg) => Err(anyhow!("{msg}")),
            None => Ok(()),
        }
    }
}

impl ChainState {
    fn next_hash(&mut self) -> B256 {
        self.next_tx += 1;
        B256::from(U256::from(self.next_tx))
    }

    fn settle(&mut self, call: PlayCall, tx_hash: B256) -> TxReceipt {
        let receipt = |success: bool, logs: Vec<Log>| TxReceipt {
            tx_hash,
            success,
            gas_used: 61_000,
            logs,
        };

        if self.balance < call.amount || self.allowance < call.amount {
            return receipt(false, Vec::new());
        }

        match self.script.pop_front() {
            None | Some(Scripted::RevertOnChain) => receipt(false, Vec::new()),
            Some(Scripted::NoEvent) => {
                self.debit(call.amount);
                receipt(true, vec![transfer_log()])
            }
            Some(Scripted::Settle { result, won }) => {
                self.debit(call.amount);
                if won {
                    self.balance += call.amount * U256::from(2);
                }
                let played = encode_played(
                    GAME,
                    &PlayedOutcome {
                        player: WALLET,
                        stake: call.amount,
                        chosen_side: call.side,
                        result_side: result,
                        won,
                    },
                );
                receipt(true, vec![transfer_log(), played])
            }
        }
    }

    fn debit(&mut self, amount: U256) {
        self.balance -= amount;
        if self.allowance != U256::MAX {
            self.allowance -= amount;
        }
    }
}

/// Token-contract log that shares the receipt with the outcome event.
fn transfer_log() -> Log {
    Log {
        address: TOKEN,
        data: LogData::new_unchecked(vec![B256::repeat_byte(0xdd)], Bytes::from(vec![0u8; 32])),
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn wallet(&self) -> Address {
        WALLET
    }

    fn game_address(&self) -> Address {
        GAME
    }

    async fn token_decimals(&self) -> Result<u8> {
        self.check_error()?;
        Ok(0)
    }

    async fn token_balance(&self, _owner: Address) -> Result<U256> {
        self.check_error()?;
        let mut state = self.state.lock().unwrap();
        match &mut state.balance_reads_left {
            Some(0) => return Err(anyhow!("balanceOf: request timed out")),
            Some(left) => *left -= 1,
            None => {}
        }
        Ok(state.balance)
    }

    async fn native_balance(&self, _owner: Address) -> Result<U256> {
        self.check_error()?;
        Ok(self.state.lock().unwrap().native)
    }

    async fn allowance(&self, _owner: Address, _spender: Address) -> Result<U256> {
        self.check_error()?;
        Ok(self.allowance_now())
    }

    async fn min_bet(&self) -> Result<U256> {
        self.check_error()?;
        Ok(self.state.lock().unwrap().limits.min_bet)
    }

    async fn max_bet(&self) -> Result<U256> {
        self.check_error()?;
        Ok(self.state.lock().unwrap().limits.max_bet)
    }

    async fn bankroll(&self) -> Result<U256> {
        self.check_error()?;
        Ok(self.state.lock().unwrap().limits.bankroll)
    }

    async fn send_approval(&self, spender: Address, amount: U256) -> Result<B256> {
        self.check_error()?;
        let mut state = self.state.lock().unwrap();
        let tx_hash = state.next_hash();
        state.approvals.push((spender, amount));
        let success = !state.approval_reverts;
        if success {
            state.allowance = amount;
        }
        state.receipts.insert(
            tx_hash,
            TxReceipt { tx_hash, success, gas_used: 46_000, logs: Vec::new() },
        );
        Ok(tx_hash)
    }

    async fn simulate_play(&self, call: PlayCall) -> Result<CallOutcome> {
        self.check_error()?;
        let state = self.state.lock().unwrap();
        if let Some(reason) = &state.simulate_revert {
            return Ok(CallOutcome::Revert(reason.clone()));
        }
        if call.amount > state.balance {
            return Ok(CallOutcome::Revert("ERC20: transfer amount exceeds balance".into()));
        }
        Ok(CallOutcome::Success)
    }

    async fn estimate_play_gas(&self, _call: PlayCall) -> Result<GasEstimate> {
        self.check_error()?;
        Ok(GasEstimate::Units(50_000))
    }

    async fn submit_play(&self, call: PlayCall, gas_limit: u64) -> Result<B256> {
        self.check_error()?;
        let mut state = self.state.lock().unwrap();
        let tx_hash = state.next_hash();
        state.plays.push((call, gas_limit));
        let receipt = state.settle(call, tx_hash);
        state.receipts.insert(tx_hash, receipt);
        Ok(tx_hash)
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>> {
        self.check_error()?;
        let mut state = self.state.lock().unwrap();
        let pending_polls = state.pending_polls;
        let seen = state.polls.entry(tx_hash).or_insert(0);
        if *seen < pending_polls {
            *seen += 1;
            return Ok(None);
        }
        Ok(state.receipts.get(&tx_hash).cloned())
    }
}

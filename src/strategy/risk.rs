//! Pre-submission risk gate.
//!
//! Validates a proposed stake against the wallet and the live contract
//! limits. Checks run in a fixed order and the first failure wins:
//!
//! 1. balance below the global floor (stop-loss)
//! 2. balance below the stake
//! 3. stake below the contract minimum (clamped up, not rejected)
//! 4. stake above the contract maximum
//! 5. allowance below the stake (remediated by a standing approval)

use alloy::primitives::U256;
use tracing::{debug, warn};

use crate::config::CeilingPolicy;
use crate::types::ContractLimits;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Raw balance under which the engine refuses to play.
    pub global_floor: U256,
    /// Raw standing approval requested when the allowance runs short.
    pub approval_amount: U256,
    pub ceiling_policy: CeilingPolicy,
}

// ---------------------------------------------------------------------------
// Verdicts
// ---------------------------------------------------------------------------

/// Why a stake was refused. Every rejection halts the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RiskRejection {
    #[error("balance {balance} is below the global floor {floor}")]
    BelowFloor { balance: U256, floor: U256 },

    #[error("insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: U256, available: U256 },

    #[error("stake exceeds max bet: stake {stake}, max bet {max_bet}")]
    StakeAboveMax { stake: U256, max_bet: U256 },
}

/// A stake that passed the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clearance {
    /// Stake to submit (after any clamp to the contract minimum).
    pub stake: U256,
    /// Stake the sizer asked for.
    pub requested: U256,
    pub clamped: bool,
    /// Set when the stake is above the contract maximum and the ceiling
    /// policy allowed it through.
    pub over_ceiling: bool,
    /// Standing approval to grant before playing, if the allowance is short.
    pub approval: Option<U256>,
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RiskGate {
    config: RiskConfig,
}

impl RiskGate {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// The stop-loss check on its own, run at the top of every loop.
    pub fn check_floor(&self, balance: U256) -> Result<(), RiskRejection> {
        if balance < self.config.global_floor {
            return Err(RiskRejection::BelowFloor {
                balance,
                floor: self.config.global_floor,
            });
        }
        Ok(())
    }

    /// Run all checks for a proposed stake.
    pub fn check(
        &self,
        stake: U256,
        wallet_balance: U256,
        limits: &ContractLimits,
        allowance: U256,
    ) -> Result<Clearance, RiskRejection> {
        self.check_floor(wallet_balance)?;

        if wallet_balance < stake {
            return Err(RiskRejection::InsufficientBalance {
                needed: stake,
                available: wallet_balance,
            });
        }

        let mut clearance = Clearance {
            stake,
            requested: stake,
            clamped: false,
            over_ceiling: false,
            approval: None,
        };

        if stake < limits.min_bet {
            warn!(
                requested = %stake,
                min_bet = %limits.min_bet,
                "Stake below contract minimum, clamping up"
            );
            clearance.stake = limits.min_bet;
            clearance.clamped = true;

            if wallet_balance < clearance.stake {
                return Err(RiskRejection::InsufficientBalance {
                    needed: clearance.stake,
                    available: wallet_balance,
                });
            }
        }

        if clearance.stake > limits.max_bet {
            match self.config.ceiling_policy {
                CeilingPolicy::Halt => {
                    return Err(RiskRejection::StakeAboveMax {
                        stake: clearance.stake,
                        max_bet: limits.max_bet,
                    });
                }
                CeilingPolicy::Override => {
                    warn!(
                        stake = %clearance.stake,
                        max_bet = %limits.max_bet,
                        bankroll = %limits.bankroll,
                        "Stake above max bet, submitting under override policy"
                    );
                    clearance.over_ceiling = true;
                }
            }
        }

        if allowance < clearance.stake {
            debug!(
                allowance = %allowance,
                stake = %clearance.stake,
                approval = %self.config.approval_amount,
                "Allowance short, standing approval required"
            );
            // Never approve less than the stake itself.
            clearance.approval = Some(self.config.approval_amount.max(clearance.stake));
        }

        Ok(clearance)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Outcome-event decoding.
//!
//! A play receipt can carry logs from the token contract (the stake
//! transfer) as well as the game's `Played` event. Only logs emitted by the
//! game contract are considered, and only those that decode as `Played` for
//! our own wallet.

use alloy::primitives::{Address, Log, U256};
use alloy::sol_types::SolEvent;
use tracing::debug;

use super::abi::IDiceGame::Played;
use crate::types::Side;

/// A decoded `Played` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayedOutcome {
    pub player: Address,
    pub stake: U256,
    pub chosen_side: Side,
    pub result_side: Side,
    pub won: bool,
}

/// What a scan of a receipt's logs found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeScan {
    Found(PlayedOutcome),
    /// No matching event. `game_logs` counts logs from the game contract
    /// that failed to decode or belonged to another player.
    Missing { game_logs: usize },
}

/// Scan receipt logs for the `Played` event emitted by `game` for `player`.
pub fn scan_outcome(logs: &[Log], game: Address, player: Address) -> OutcomeScan {
    let mut game_logs = 0;

    for log in logs.iter().filter(|l| l.address == game) {
        game_logs += 1;

        let event = match Played::decode_log_data(&log.data) {
            Ok(ev) => ev,
            Err(e) => {
                debug!(error = %e, "Skipping undecodable game log");
                continue;
            }
        };

        if event.player != player {
            debug!(player = %event.player, "Skipping Played event for another player");
            continue;
        }

        let (chosen_side, result_side) =
            match (Side::try_from(event.choice), Side::try_from(event.result)) {
                (Ok(c), Ok(r)) => (c, r),
                _ => {
                    debug!(choice = event.choice, result = event.result, "Played event side out of range");
                    continue;
                }
            };

        return OutcomeScan::Found(PlayedOutcome {
            player: event.player,
            stake: event.amount,
            chosen_side,
            result_side,
            won: event.won,
        });
    }

    OutcomeScan::Missing { game_logs }
}

/// Encode a `Played` log; used to build receipts in tests and mocks.
pub fn encode_played(game: Address, outcome: &PlayedOutcome) -> Log {
    let event = Played {
        player: outcome.player,
        amount: outcome.stake,
        choice: outcome.chosen_side.as_u8(),
        result: outcome.result_side.as_u8(),
        won: outcome.won,
    };
    Log { address: game, data: event.encode_log_data() }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Integration tests for the DICEBOT engine.

mod mock_chain;
mod scenarios;

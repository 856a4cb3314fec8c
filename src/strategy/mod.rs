//! Strategy — stake sizing, side selection, and the pre-submission risk gate.

pub mod outcome;
pub mod risk;
pub mod stake;

pub use outcome::OutcomeTracker;
pub use risk::{Clearance, RiskConfig, RiskGate, RiskRejection};
pub use stake::StakeSizer;

//! Simulator screenshot automation: JSONC plans run step by step against a
//! [`SimulatorDriver`], plus the review/approval workflow over the captures.

mod jsonc;
mod plan;
mod review;
mod run;

pub use plan::*;
pub use review::*;
pub use run::*;

pub mod algorithm;
pub mod config;
pub mod display;
pub mod scoring;
pub mod store;

pub use algorithm::{compute_consensus_for_lot, revise_consensus_for_lot};
pub use config::ConsensusConfig;
pub use display::LotView;
pub use store::{ConsensusStore, StatusTransition};

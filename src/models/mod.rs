pub mod consensus;
pub mod lot;
pub mod signal;
pub mod status;

pub use consensus::{LotConsensus, PendingTransition};
pub use lot::Lot;
pub use signal::{Signal, SignalSource};
pub use status::{LotStatus, STATUS_COUNT, UNKNOWN_STATUS_COLOR};

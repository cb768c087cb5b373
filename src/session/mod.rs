pub mod config;
pub mod controller;

pub use config::SessionConfig;
pub use controller::{PaceSighting, ParkingSession, SessionEvent, SubmissionReceipt};

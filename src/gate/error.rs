use chrono::Duration;
use thiserror::Error;

/// Why a report did not end up in the signal window.
///
/// Everything here is recoverable; callers show [`ReportError::user_message`]
/// as a transient notice.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location fix unavailable: {0}")]
    LocationUnavailable(String),

    #[error("device is {distance_m:.0} m from the lot, limit is {max_m:.0} m")]
    OutOfRange { distance_m: f64, max_m: f64 },

    #[error("on cooldown for another {}", format_remaining(.remaining))]
    OnCooldown { remaining: Duration },

    #[error("a report for lot {0} is already in flight")]
    AlreadySubmitting(String),

    #[error("unknown lot {0}")]
    UnknownLot(String),

    /// Raised after the optimistic signal has been rolled back.
    #[error("remote insert failed: {0}")]
    PersistenceFailure(String),

    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

impl ReportError {
    pub fn user_message(&self) -> String {
        match self {
            ReportError::PermissionDenied => {
                "Location permission is required to submit a report.".to_string()
            }
            ReportError::LocationUnavailable(_) => {
                "Could not determine your location. Please try again.".to_string()
            }
            ReportError::OutOfRange { max_m, .. } => {
                format!("You must be within {max_m:.0} meters of this lot to report its status.")
            }
            ReportError::OnCooldown { remaining } => {
                format!(
                    "Please wait {} before reporting again.",
                    format_remaining(remaining)
                )
            }
            ReportError::AlreadySubmitting(_) => {
                "Your previous report for this lot is still being sent.".to_string()
            }
            ReportError::UnknownLot(_) => "That lot is no longer available.".to_string(),
            ReportError::PersistenceFailure(_) => {
                "Unable to submit report right now. Please try again.".to_string()
            }
            ReportError::Unknown(_) => {
                "Something went wrong while submitting your report.".to_string()
            }
        }
    }

    /// True for the checks that short-circuit before anything is mutated.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ReportError::PermissionDenied
                | ReportError::LocationUnavailable(_)
                | ReportError::OutOfRange { .. }
                | ReportError::OnCooldown { .. }
                | ReportError::AlreadySubmitting(_)
                | ReportError::UnknownLot(_)
        )
    }
}

/// `MM:SS`, seconds rounded up so a wait never shows as `00:00`.
pub fn format_remaining(remaining: &Duration) -> String {
    let millis = remaining.num_milliseconds().max(0);
    let total_seconds = (millis + 999) / 1000;
    format!("{:02}:{:02}", total_seconds / 60, total_seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_rounds_seconds_up() {
        assert_eq!(format_remaining(&Duration::minutes(10)), "10:00");
        assert_eq!(format_remaining(&Duration::milliseconds(61_001)), "01:02");
        assert_eq!(format_remaining(&Duration::milliseconds(1)), "00:01");
        assert_eq!(format_remaining(&Duration::zero()), "00:00");
        assert_eq!(format_remaining(&Duration::seconds(-5)), "00:00");
    }

    #[test]
    fn cooldown_message_carries_countdown() {
        let err = ReportError::OnCooldown {
            remaining: Duration::seconds(9 * 60 + 30),
        };
        assert_eq!(err.user_message(), "Please wait 09:30 before reporting again.");
        assert_eq!(err.to_string(), "on cooldown for another 09:30");
        assert!(err.is_validation());
    }

    #[test]
    fn persistence_failure_is_not_a_validation_error() {
        let err = ReportError::PersistenceFailure("timeout".into());
        assert!(!err.is_validation());
        assert!(err.user_message().contains("try again"));
    }
}

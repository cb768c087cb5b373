use serde::{Deserialize, Serialize};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// Tunables for the consensus engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConsensusConfig {
    /// Decay time constant: a signal this many minutes old counts 1/e.
    pub decay_minutes: f64,

    /// Hard cutoff; older signals carry no weight at all.
    pub max_signal_age_minutes: f64,

    /// Slope applied to the margin before the sigmoid.
    pub confidence_gain: f64,

    /// Confidence reported for a lot with no fresh signals.
    pub no_signal_confidence: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            decay_minutes: 15.0,
            max_signal_age_minutes: 180.0,
            confidence_gain: 6.0,
            no_signal_confidence: 0.25,
        }
    }
}

impl ConsensusConfig {
    /// Replace values the decay math cannot use. Time constants must be
    /// positive and finite, the gain finite, and the floor a probability.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        let positive = |name: &str, value: f64, fallback: f64| {
            if value.is_finite() && value > 0.0 {
                value
            } else {
                log_warn!("consensus {name} {value} is not a positive number, using {fallback}");
                fallback
            }
        };

        let confidence_gain = if self.confidence_gain.is_finite() {
            self.confidence_gain
        } else {
            log_warn!(
                "consensus confidenceGain {} is not finite, using {}",
                self.confidence_gain,
                defaults.confidence_gain
            );
            defaults.confidence_gain
        };

        let no_signal_confidence = if self.no_signal_confidence.is_nan() {
            defaults.no_signal_confidence
        } else {
            self.no_signal_confidence.clamp(0.0, 1.0)
        };

        Self {
            decay_minutes: positive("decayMinutes", self.decay_minutes, defaults.decay_minutes),
            max_signal_age_minutes: positive(
                "maxSignalAgeMinutes",
                self.max_signal_age_minutes,
                defaults.max_signal_age_minutes,
            ),
            confidence_gain,
            no_signal_confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_values_pass_through() {
        let config = ConsensusConfig {
            decay_minutes: 10.0,
            max_signal_age_minutes: 60.0,
            confidence_gain: 4.0,
            no_signal_confidence: 0.1,
        };
        assert_eq!(config.clone().sanitized(), config);
    }

    #[test]
    fn unusable_time_constants_fall_back() {
        let config = ConsensusConfig {
            decay_minutes: 0.0,
            max_signal_age_minutes: -30.0,
            confidence_gain: f64::INFINITY,
            no_signal_confidence: 1.5,
        }
        .sanitized();

        assert_eq!(config.decay_minutes, 15.0);
        assert_eq!(config.max_signal_age_minutes, 180.0);
        assert_eq!(config.confidence_gain, 6.0);
        assert_eq!(config.no_signal_confidence, 1.0);

        let nan = ConsensusConfig {
            decay_minutes: f64::NAN,
            no_signal_confidence: f64::NAN,
            ..ConsensusConfig::default()
        }
        .sanitized();
        assert_eq!(nan, ConsensusConfig::default());
    }
}

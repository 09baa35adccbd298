use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The probability assigned to a voxel the first time it is observed.
pub const PRIOR_PROBABILITY: f32 = 0.5;

/// Accumulated log-odds are clamped to `[-MAX_LOG_ODDS, MAX_LOG_ODDS]`, which keeps the probability strictly inside `(0, 1)`
/// so a saturated voxel can still be cleared.
pub const MAX_LOG_ODDS: f32 = 15.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid map configuration: {0}")]
    Invalid(String),
}

/// Immutable parameters of a [`VoxelMap`](crate::VoxelMap) and its sensor model.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct MapConfig {
    /// Edge length of a voxel in meters.
    pub resolution: f32,
    /// Rays are truncated at this distance from the sensor, in meters.
    pub max_range: f32,
    /// Probability that a voxel containing a ray endpoint is occupied.
    pub prob_hit: f32,
    /// Probability that a voxel traversed by a ray is occupied.
    pub prob_miss: f32,
    /// Voxels at or below this probability are free.
    pub prob_thres_min: f32,
    /// Voxels at or above this probability are occupied.
    pub prob_thres_max: f32,
    /// Where [`VoxelMapStore::save`](crate::VoxelMapStore::save) writes the map.
    pub map_directory_path: String,
    pub model: ProbabilityModel,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            resolution: 0.1,
            max_range: 15.0,
            prob_hit: 0.7,
            prob_miss: 0.4,
            prob_thres_min: 0.12,
            prob_thres_max: 0.97,
            map_directory_path: String::new(),
            model: ProbabilityModel::default(),
        }
    }
}

impl MapConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "resolution must be positive, got {}",
                self.resolution
            )));
        }
        if !(self.max_range.is_finite() && self.max_range > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "max_range must be positive, got {}",
                self.max_range
            )));
        }
        if !(0.0 < self.prob_miss && self.prob_miss < self.prob_hit && self.prob_hit < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "expected 0 < prob_miss < prob_hit < 1, got prob_miss = {} and prob_hit = {}",
                self.prob_miss, self.prob_hit
            )));
        }
        if !(0.0 <= self.prob_thres_min
            && self.prob_thres_min < self.prob_thres_max
            && self.prob_thres_max <= 1.0)
        {
            return Err(ConfigError::Invalid(format!(
                "expected 0 <= prob_thres_min < prob_thres_max <= 1, \
                 got prob_thres_min = {} and prob_thres_max = {}",
                self.prob_thres_min, self.prob_thres_max
            )));
        }
        Ok(())
    }

    /// The delta contributed by a ray ending in a voxel.
    pub fn hit_delta(&self) -> f32 {
        self.model.observation_delta(self.prob_hit)
    }

    /// The delta contributed by a ray passing through a voxel.
    pub fn miss_delta(&self) -> f32 {
        self.model.observation_delta(self.prob_miss)
    }

    #[inline]
    pub fn accumulate(&self, probability: f32, delta: f32) -> f32 {
        self.model.accumulate(probability, delta)
    }

    #[inline]
    pub fn classify(&self, probability: f32) -> Occupancy {
        if probability >= self.prob_thres_max {
            Occupancy::Occupied
        } else if probability <= self.prob_thres_min {
            Occupancy::Free
        } else {
            Occupancy::Uncertain
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Occupancy {
    Free,
    Uncertain,
    Occupied,
}

/// How per-ray observations are combined with a voxel's probability.
///
/// Either way, deltas are plain `f32`s that sum across rays, so an [`UpdateGrid`](crate::UpdateGrid) can be accumulated before
/// it is applied.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub enum ProbabilityModel {
    /// Deltas are offsets from the prior (`p - 0.5`) and are added to the probability, which is clamped to `[0, 1]`.
    Linear,
    /// Deltas are log-odds (`ln(p / (1 - p))`) and are added in log-odds space, clamped to [`MAX_LOG_ODDS`]. Until that
    /// bound is reached, summing deltas first gives the same result as applying them one at a time.
    #[default]
    LogOdds,
}

impl ProbabilityModel {
    pub fn observation_delta(self, probability: f32) -> f32 {
        match self {
            Self::Linear => probability - PRIOR_PROBABILITY,
            Self::LogOdds => log_odds(probability),
        }
    }

    pub fn accumulate(self, probability: f32, delta: f32) -> f32 {
        match self {
            Self::Linear => (probability + delta).clamp(0.0, 1.0),
            Self::LogOdds => {
                let current = log_odds(probability).clamp(-MAX_LOG_ODDS, MAX_LOG_ODDS);
                probability_from_log_odds((current + delta).clamp(-MAX_LOG_ODDS, MAX_LOG_ODDS))
            }
        }
    }
}

#[inline]
pub fn log_odds(probability: f32) -> f32 {
    (probability / (1.0 - probability)).ln()
}

#[inline]
pub fn probability_from_log_odds(log_odds: f32) -> f32 {
    1.0 / (1.0 + (-log_odds).exp())
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::*;

    use crate::core::approx::assert_relative_eq;

    #[test]
    fn default_config_is_valid() {
        MapConfig::default().validate().unwrap();
    }

    #[test]
    fn reject_inverted_sensor_model() {
        let config = MapConfig {
            prob_hit: 0.4,
            prob_miss: 0.7,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn reject_inverted_thresholds() {
        let config = MapConfig {
            prob_thres_min: 0.9,
            prob_thres_max: 0.2,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = MapConfig {
            resolution: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn log_odds_deltas_have_expected_sign() {
        let config = MapConfig::default();
        assert_relative_eq!(config.miss_delta(), -0.405_465, epsilon = 1e-5);
        assert_relative_eq!(config.hit_delta(), 0.847_298, epsilon = 1e-5);
    }

    #[test]
    fn log_odds_accumulation_is_additive() {
        let model = ProbabilityModel::LogOdds;
        let (a, b) = (0.847, -0.405);
        let one_by_one = model.accumulate(model.accumulate(PRIOR_PROBABILITY, a), b);
        let summed = model.accumulate(PRIOR_PROBABILITY, a + b);
        assert_relative_eq!(one_by_one, summed, epsilon = 1e-6);
    }

    #[test]
    fn linear_accumulation_clamps() {
        let model = ProbabilityModel::Linear;
        assert_eq!(model.accumulate(0.9, 0.2), 1.0);
        assert_eq!(model.accumulate(0.1, -0.2), 0.0);
        assert_relative_eq!(model.accumulate(0.5, 0.2), 0.7);
    }

    #[test]
    fn saturated_probabilities_can_recover() {
        let model = ProbabilityModel::LogOdds;
        let lowered = model.accumulate(1.0, -0.4);
        assert!(lowered < 1.0 && lowered > 0.99, "{}", lowered);
        let raised = model.accumulate(0.0, 0.8);
        assert!(raised > 0.0 && raised < 0.01, "{}", raised);
    }

    #[test]
    fn log_odds_never_reach_certainty() {
        let model = ProbabilityModel::LogOdds;
        let mut p = PRIOR_PROBABILITY;
        for _ in 0..100 {
            p = model.accumulate(p, 0.847);
        }
        assert!(p < 1.0);
        assert_relative_eq!(log_odds(p), MAX_LOG_ODDS, epsilon = 0.1);

        for _ in 0..100 {
            p = model.accumulate(p, -0.847);
        }
        assert!(p > 0.0);
        assert_relative_eq!(log_odds(p), -MAX_LOG_ODDS, epsilon = 0.1);
    }

    #[test]
    fn classify_with_thresholds() {
        let config = MapConfig::default();
        assert_eq!(config.classify(0.97), Occupancy::Occupied);
        assert_eq!(config.classify(0.5), Occupancy::Uncertain);
        assert_eq!(config.classify(0.12), Occupancy::Free);
    }
}

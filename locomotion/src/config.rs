//! Per-character tunables.
//!
//! Everything here used to be a fixed constant or a global; it is now passed
//! in when the character is built and can be loaded from a RON file.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LocomotionConfig {
    // --- World ---
    /// Depth of the downward altitude trace while flying.
    pub troposphere_height: f32,

    // --- Landing ---
    pub breakfall_on_land: bool,
    pub breakfall_on_land_velocity: f32,
    pub ragdoll_on_land: bool,
    pub ragdoll_on_land_velocity: f32,
    /// Rolling off a ledge sends the character into ragdoll.
    pub ragdoll_on_rollfall: bool,
    /// How long braking friction stays raised after landing.
    pub landed_friction_reset_secs: f32,

    // --- Ragdoll ---
    /// Skeleton has the pelvis bone facing the other way.
    pub reversed_pelvis: bool,

    // --- Flight ---
    pub always_check_flight_conditions: bool,
    pub use_flight_interrupt: bool,
    pub flight_interrupt_threshold: f32,
    pub max_flight_lean: Vec3,

    // --- Input ---
    pub look_up_down_rate: f32,
    pub look_left_right_rate: f32,
    pub roll_double_tap_timeout: f32,

    // --- Camera ---
    pub third_person_fov: f32,
    pub first_person_fov: f32,
}

impl Default for LocomotionConfig {
    fn default() -> Self {
        Self {
            troposphere_height: 10_000.0,
            breakfall_on_land: true,
            breakfall_on_land_velocity: 700.0,
            ragdoll_on_land: false,
            ragdoll_on_land_velocity: 1000.0,
            ragdoll_on_rollfall: false,
            landed_friction_reset_secs: 0.5,
            reversed_pelvis: false,
            always_check_flight_conditions: false,
            use_flight_interrupt: true,
            flight_interrupt_threshold: 600.0,
            max_flight_lean: Vec3::new(40.0, 40.0, 0.0),
            look_up_down_rate: 1.25,
            look_left_right_rate: 1.25,
            roll_double_tap_timeout: 0.3,
            third_person_fov: 90.0,
            first_person_fov: 90.0,
        }
    }
}

impl LocomotionConfig {
    pub fn from_ron_str(text: &str) -> Result<Self, String> {
        ron::from_str(text).map_err(|e| format!("locomotion config parse failed: {e}"))
    }

    pub fn load(path: &std::path::Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        Self::from_ron_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_ron_keeps_defaults() {
        let config = LocomotionConfig::from_ron_str("(ragdoll_on_land: true, troposphere_height: 5000.0)").unwrap();
        assert!(config.ragdoll_on_land);
        assert_eq!(config.troposphere_height, 5000.0);
        assert_eq!(config.breakfall_on_land_velocity, 700.0);
        assert_eq!(config.roll_double_tap_timeout, 0.3);
    }

    #[test]
    fn test_bad_ron_reports_error() {
        let err = LocomotionConfig::from_ron_str("(ragdoll_on_land: maybe)").unwrap_err();
        assert!(err.contains("locomotion config parse failed"));
    }
}

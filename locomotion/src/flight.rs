//! Flight: gating, altitude tracking and hit interruption.

use bevy::prelude::*;

use crate::character::LocomotionCharacter;
use crate::states::{FlightState, NetRole, PhysicsMode};

/// Altitude at or below which any hit ends flight.
pub const LANDING_ALTITUDE: f32 = 5.0;

#[derive(Clone, Debug, PartialEq)]
pub struct FlightValues {
    /// Distance to the ground straight down, capped at the troposphere height.
    pub relative_altitude: f32,
    /// Scale on upward movement input while flying.
    pub atmosphere_at_altitude: f32,
    /// Downward wing force the flight model computes. Not applied yet.
    pub auto_hover: f32,
}

impl Default for FlightValues {
    fn default() -> Self {
        Self {
            relative_altitude: 0.0,
            atmosphere_at_altitude: 1.0,
            auto_hover: 0.0,
        }
    }
}

impl LocomotionCharacter {
    pub fn can_fly(&self) -> bool {
        self.driver.can_ever_fly() && self.hooks.flight_check()
    }

    /// Trace from the capsule bottom along `direction`. Returns the hit
    /// distance, or `distance` when nothing is in the way.
    pub fn flight_distance_check(&self, distance: f32, direction: Vec3) -> f32 {
        let start = self.driver.location() - Vec3::Y * self.driver.capsule_half_height();
        let end = start + direction * distance;
        match self.world.line_trace(start, end) {
            Some(hit) => hit.distance,
            None => distance,
        }
    }

    pub(crate) fn update_relative_altitude(&mut self) {
        self.flight.relative_altitude = self.flight_distance_check(self.config.troposphere_height, Vec3::NEG_Y);
    }

    pub(crate) fn update_flight_movement(&mut self) {
        if self.config.always_check_flight_conditions && !self.can_fly() {
            self.set_flight_state(FlightState::None, false);
            return;
        }

        // no ground-effect falloff yet, so pressure is flat
        let ground_pressure = 1.0;

        self.flight.auto_hover = match self.flight_state {
            FlightState::None => return,
            FlightState::Hovering => (ground_pressure + 0.5) / 1.5 * 0.5,
            FlightState::Aerial => (ground_pressure + 0.5) / 1.5,
        };
    }

    /// Blocking hit reported by the driver.
    pub fn notify_hit(&mut self, velocity: Vec3) {
        if self.flight_state == FlightState::None {
            return;
        }
        let interrupted = self.config.use_flight_interrupt
            && self
                .hooks
                .flight_interrupt_check(velocity, self.config.flight_interrupt_threshold);
        if interrupted || self.flight.relative_altitude <= LANDING_ALTITUDE {
            info!("Flight interrupted by hit at {:?}", velocity);
            self.set_flight_state(FlightState::None, false);
        }
    }

    /// Movement input entry point. Climbing while flying is scaled by the
    /// atmosphere factor.
    pub fn add_movement_input(&mut self, mut direction: Vec3, scale: f32) {
        if self.driver.physics_mode() == PhysicsMode::Flying && direction.y > 0.0 {
            direction.y *= self.flight.atmosphere_at_altitude;
        }
        self.driver.add_movement_input(direction, scale);
    }

    pub fn set_atmosphere_at_altitude(&mut self, value: f32) {
        self.flight.atmosphere_at_altitude = value;
    }

    /// Flight tick runs on the authority and the owning proxy only.
    pub fn runs_flight_movement(&self) -> bool {
        self.role.is_authority() || self.role == NetRole::AutonomousProxy
    }
}

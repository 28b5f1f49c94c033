//! Movement settings tables, curves and modifiers.
//!
//! A `MovementSettingsPreset` is the externally supplied lookup table. The
//! character resolves one `MovementSettings` out of it whenever rotation mode,
//! stance, movement state or the modifier list changes.

use serde::{Deserialize, Serialize};

use crate::states::{Gait, MovementState, RotationMode, Stance};

// =============================================================================
// CURVES
// =============================================================================

/// Piecewise-linear curve. Keys are kept sorted by `time`; sampling outside
/// the key range holds the first/last value.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct FloatCurve {
    pub keys: Vec<(f32, f32)>,
}

impl FloatCurve {
    pub fn new(mut keys: Vec<(f32, f32)>) -> Self {
        keys.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self { keys }
    }

    pub fn constant(value: f32) -> Self {
        Self { keys: vec![(0.0, value)] }
    }

    pub fn sample(&self, time: f32) -> f32 {
        let Some(&(first_t, first_v)) = self.keys.first() else {
            return 0.0;
        };
        if time <= first_t {
            return first_v;
        }
        for pair in self.keys.windows(2) {
            let (t0, v0) = pair[0];
            let (t1, v1) = pair[1];
            if time <= t1 {
                let span = t1 - t0;
                if span <= f32::EPSILON {
                    return v1;
                }
                return v0 + (v1 - v0) * ((time - t0) / span);
            }
        }
        self.keys.last().map(|k| k.1).unwrap_or(first_v)
    }
}

/// Acceleration / braking deceleration / ground friction sampled at a mapped
/// speed (0 = stopped, 1 = walk, 2 = run, 3 = sprint).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct MovementCurve {
    pub acceleration: FloatCurve,
    pub deceleration: FloatCurve,
    pub ground_friction: FloatCurve,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MovementCurveSample {
    pub acceleration: f32,
    pub deceleration: f32,
    pub ground_friction: f32,
}

impl MovementCurve {
    pub fn sample(&self, mapped_speed: f32) -> MovementCurveSample {
        MovementCurveSample {
            acceleration: self.acceleration.sample(mapped_speed),
            deceleration: self.deceleration.sample(mapped_speed),
            ground_friction: self.ground_friction.sample(mapped_speed),
        }
    }

    pub fn scaled_acceleration(&self, scale: f32) -> MovementCurve {
        let mut out = self.clone();
        for key in &mut out.acceleration.keys {
            key.1 *= scale;
        }
        for key in &mut out.deceleration.keys {
            key.1 *= scale;
        }
        out
    }
}

// =============================================================================
// SETTINGS
// =============================================================================

/// Resolved speed caps and curves for the current state.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MovementSettings {
    pub walk_speed: f32,
    pub run_speed: f32,
    pub sprint_speed: f32,
    /// `None` means the driver keeps its own acceleration values.
    pub movement_curve: Option<MovementCurve>,
    pub rotation_rate_curve: FloatCurve,
}

impl Default for MovementSettings {
    fn default() -> Self {
        Self {
            walk_speed: 165.0,
            run_speed: 350.0,
            sprint_speed: 600.0,
            movement_curve: Some(default_movement_curve()),
            rotation_rate_curve: FloatCurve::new(vec![(0.0, 5.0), (1.0, 10.0), (2.0, 12.0), (3.0, 15.0)]),
        }
    }
}

impl MovementSettings {
    pub fn speed_for_gait(&self, gait: Gait) -> f32 {
        match gait {
            Gait::Walking => self.walk_speed,
            Gait::Running => self.run_speed,
            Gait::Sprinting => self.sprint_speed,
        }
    }

    fn with_speeds(walk: f32, run: f32, sprint: f32) -> Self {
        Self {
            walk_speed: walk,
            run_speed: run,
            sprint_speed: sprint,
            ..MovementSettings::default()
        }
    }
}

fn default_movement_curve() -> MovementCurve {
    MovementCurve {
        acceleration: FloatCurve::new(vec![(0.0, 800.0), (1.0, 800.0), (2.0, 1000.0), (3.0, 1200.0)]),
        deceleration: FloatCurve::new(vec![(0.0, 800.0), (1.0, 800.0), (2.0, 1000.0), (3.0, 1200.0)]),
        ground_friction: FloatCurve::new(vec![(0.0, 8.0), (3.0, 8.0)]),
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MovementStanceSettings {
    pub standing: MovementSettings,
    pub crouching: MovementSettings,
    pub flying: MovementSettings,
    pub swimming: MovementSettings,
}

impl MovementStanceSettings {
    fn new(standing: MovementSettings) -> Self {
        Self {
            crouching: MovementSettings::with_speeds(150.0, 200.0, 300.0),
            flying: MovementSettings::with_speeds(400.0, 800.0, 1200.0),
            swimming: MovementSettings::with_speeds(150.0, 300.0, 450.0),
            standing,
        }
    }
}

/// The full movement table, one stance set per rotation mode.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MovementSettingsPreset {
    pub velocity_direction: MovementStanceSettings,
    pub looking_direction: MovementStanceSettings,
    pub aiming: MovementStanceSettings,
}

impl Default for MovementSettingsPreset {
    fn default() -> Self {
        Self {
            velocity_direction: MovementStanceSettings::new(MovementSettings::default()),
            looking_direction: MovementStanceSettings::new(MovementSettings::with_speeds(165.0, 375.0, 650.0)),
            aiming: MovementStanceSettings::new(MovementSettings::with_speeds(165.0, 350.0, 350.0)),
        }
    }
}

impl MovementSettingsPreset {
    pub fn from_ron_str(text: &str) -> Result<Self, String> {
        ron::from_str(text).map_err(|e| format!("movement preset parse failed: {e}"))
    }

    /// Pick the base settings for a state combination (before modifiers).
    /// Riding and non-grounded states without a dedicated entry use standing.
    pub fn resolve(&self, rotation_mode: RotationMode, stance: Stance, state: MovementState) -> &MovementSettings {
        let table = match rotation_mode {
            RotationMode::VelocityDirection => &self.velocity_direction,
            RotationMode::LookingDirection => &self.looking_direction,
            RotationMode::Aiming => &self.aiming,
        };
        match state {
            MovementState::Grounded => match stance {
                Stance::Crouching => &table.crouching,
                Stance::Standing | Stance::Riding => &table.standing,
            },
            MovementState::Flight => &table.flying,
            MovementState::Swimming => &table.swimming,
            _ => &table.standing,
        }
    }
}

// =============================================================================
// MODIFIERS
// =============================================================================

/// Named multiplicative adjustment on top of the resolved settings.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MovementModifier {
    pub id: String,
    /// Remaining lifetime in seconds; `None` lasts until removed.
    pub time: Option<f32>,
    pub speed_scale: f32,
    pub acceleration_scale: f32,
    pub rotation_rate_scale: f32,
    /// Movement states this applies in. Empty means every state.
    pub states: Vec<MovementState>,
}

impl MovementModifier {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            time: None,
            speed_scale: 1.0,
            acceleration_scale: 1.0,
            rotation_rate_scale: 1.0,
            states: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        let scale_ok = |s: f32| s.is_finite() && s >= 0.0;
        !self.id.is_empty()
            && scale_ok(self.speed_scale)
            && scale_ok(self.acceleration_scale)
            && scale_ok(self.rotation_rate_scale)
            && self.time.map_or(true, |t| t > 0.0)
    }

    pub fn applies_to(&self, state: MovementState) -> bool {
        self.states.is_empty() || self.states.contains(&state)
    }

    pub fn set_time(&mut self, time: f32) {
        self.time = Some(time);
    }

    pub fn apply(&self, settings: &mut MovementSettings, state: MovementState) {
        if !self.applies_to(state) {
            return;
        }
        settings.walk_speed *= self.speed_scale;
        settings.run_speed *= self.speed_scale;
        settings.sprint_speed *= self.speed_scale;
        if let Some(curve) = settings.movement_curve.as_mut() {
            *curve = curve.scaled_acceleration(self.acceleration_scale);
        }
        for key in &mut settings.rotation_rate_curve.keys {
            key.1 *= self.rotation_rate_scale;
        }
    }
}

/// Ordered, id-unique list of modifiers.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModifierList {
    entries: Vec<MovementModifier>,
}

impl ModifierList {
    /// Returns false when the modifier is invalid or the id is already present.
    pub fn add(&mut self, modifier: MovementModifier) -> bool {
        if !modifier.is_valid() || self.contains(&modifier.id) {
            return false;
        }
        self.entries.push(modifier);
        true
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|m| m.id != id);
        self.entries.len() != before
    }

    pub fn set_time(&mut self, id: &str, time: f32) -> bool {
        match self.entries.iter_mut().find(|m| m.id == id) {
            Some(modifier) => {
                modifier.set_time(time);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|m| m.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MovementModifier> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Count timed modifiers down; returns true if any expired.
    pub fn tick(&mut self, dt: f32) -> bool {
        let mut expired = false;
        self.entries.retain_mut(|m| match m.time.as_mut() {
            Some(t) => {
                *t -= dt;
                if *t <= 0.0 {
                    expired = true;
                    false
                } else {
                    true
                }
            }
            None => true,
        });
        expired
    }

    pub fn apply_all(&self, settings: &mut MovementSettings, state: MovementState) {
        for modifier in &self.entries {
            modifier.apply(settings, state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curve_sampling_holds_ends() {
        let curve = FloatCurve::new(vec![(1.0, 10.0), (0.0, 0.0)]);
        assert_eq!(curve.sample(-1.0), 0.0);
        assert_eq!(curve.sample(0.5), 5.0);
        assert_eq!(curve.sample(4.0), 10.0);
        assert_eq!(FloatCurve::default().sample(1.0), 0.0);
    }

    #[test]
    fn test_resolve_picks_stance_and_state() {
        let preset = MovementSettingsPreset::default();
        let crouch = preset.resolve(RotationMode::LookingDirection, Stance::Crouching, MovementState::Grounded);
        assert_eq!(crouch.walk_speed, 150.0);
        let riding = preset.resolve(RotationMode::LookingDirection, Stance::Riding, MovementState::Grounded);
        assert_eq!(riding.run_speed, 375.0);
        let falling = preset.resolve(RotationMode::Aiming, Stance::Crouching, MovementState::Freefall);
        assert_eq!(falling.sprint_speed, 350.0);
        let flying = preset.resolve(RotationMode::VelocityDirection, Stance::Standing, MovementState::Flight);
        assert_eq!(flying.run_speed, 800.0);
    }

    #[test]
    fn test_modifier_list_unique_by_id() {
        let mut list = ModifierList::default();
        let mut slow = MovementModifier::new("mud");
        slow.speed_scale = 0.5;
        assert!(list.add(slow.clone()));
        assert!(!list.add(slow));
        assert!(!list.add(MovementModifier::new("")));
        assert_eq!(list.len(), 1);
        assert!(list.remove("mud"));
        assert!(list.is_empty());
    }

    #[test]
    fn test_modifier_filters_by_state() {
        let mut modifier = MovementModifier::new("swim_boost");
        modifier.speed_scale = 2.0;
        modifier.states = vec![MovementState::Swimming];

        let mut settings = MovementSettings::default();
        modifier.apply(&mut settings, MovementState::Grounded);
        assert_eq!(settings.run_speed, 350.0);
        modifier.apply(&mut settings, MovementState::Swimming);
        assert_eq!(settings.run_speed, 700.0);
    }

    #[test]
    fn test_timed_modifier_expires() {
        let mut list = ModifierList::default();
        let mut timed = MovementModifier::new("stun");
        timed.time = Some(0.1);
        list.add(timed);
        list.add(MovementModifier::new("forever"));
        assert!(!list.tick(0.05));
        assert!(list.tick(0.06));
        assert!(!list.contains("stun"));
        assert!(list.contains("forever"));
    }

    #[test]
    fn test_preset_from_ron() {
        let text = ron::to_string(&MovementSettingsPreset::default()).unwrap();
        let parsed = MovementSettingsPreset::from_ron_str(&text).unwrap();
        assert_eq!(parsed, MovementSettingsPreset::default());
        assert!(MovementSettingsPreset::from_ron_str("(nope)").is_err());
    }
}

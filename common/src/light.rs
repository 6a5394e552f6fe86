use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub const RGB_MIN: i64 = 0;
pub const RGB_MAX: i64 = 255;
pub const INTENSITY_MIN: i64 = 0;
pub const INTENSITY_MAX: i64 = 100;

/// The light tuple shared by the physical UI, the LED actuator and the API.
/// All four fields always come from the same mutation; torn reads are
/// prevented by the store that owns this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceLightState {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(rename = "intensity")]
    pub intensity_pct: u8,
}

impl Default for DeviceLightState {
    fn default() -> Self {
        Self {
            r: 255,
            g: 255,
            b: 255,
            intensity_pct: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightChannel {
    R,
    G,
    B,
    Intensity,
}

/// A requested mutation: absolute write (API) or per-channel step (UI
/// encoder rotation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightChange {
    Set { r: i64, g: i64, b: i64, intensity: i64 },
    Adjust { channel: LightChannel, delta: i64 },
}

/// How out-of-range results are treated. UI increments clamp; API writes
/// are rejected wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyPolicy {
    Clamp,
    Reject,
}

impl DeviceLightState {
    pub fn apply(
        &self,
        change: LightChange,
        policy: ApplyPolicy,
    ) -> Result<DeviceLightState, ValidationError> {
        let (r, g, b, intensity) = match change {
            LightChange::Set { r, g, b, intensity } => (r, g, b, intensity),
            LightChange::Adjust { channel, delta } => {
                let mut fields = (
                    i64::from(self.r),
                    i64::from(self.g),
                    i64::from(self.b),
                    i64::from(self.intensity_pct),
                );
                match channel {
                    LightChannel::R => fields.0 += delta,
                    LightChannel::G => fields.1 += delta,
                    LightChannel::B => fields.2 += delta,
                    LightChannel::Intensity => fields.3 += delta,
                }
                fields
            }
        };

        match policy {
            ApplyPolicy::Clamp => Ok(Self {
                r: r.clamp(RGB_MIN, RGB_MAX) as u8,
                g: g.clamp(RGB_MIN, RGB_MAX) as u8,
                b: b.clamp(RGB_MIN, RGB_MAX) as u8,
                intensity_pct: intensity.clamp(INTENSITY_MIN, INTENSITY_MAX) as u8,
            }),
            ApplyPolicy::Reject => {
                let rgb_ok = [r, g, b].iter().all(|v| (RGB_MIN..=RGB_MAX).contains(v));
                if !rgb_ok || !(INTENSITY_MIN..=INTENSITY_MAX).contains(&intensity) {
                    return Err(ValidationError::OutOfRange);
                }
                Ok(Self {
                    r: r as u8,
                    g: g as u8,
                    b: b as u8,
                    intensity_pct: intensity as u8,
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Preset {
    pub name: &'static str,
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

pub const PRESETS: [Preset; 3] = [
    Preset { name: "warm", r: 255, g: 180, b: 120 },
    Preset { name: "cool", r: 150, g: 200, b: 255 },
    Preset { name: "sunset", r: 255, g: 100, b: 40 },
];

/// Presets always apply at full intensity. Lookup is case-insensitive.
pub fn preset_state(name: &str) -> Option<DeviceLightState> {
    PRESETS
        .iter()
        .find(|preset| preset.name.eq_ignore_ascii_case(name))
        .map(|preset| DeviceLightState {
            r: preset.r,
            g: preset.g,
            b: preset.b,
            intensity_pct: 100,
        })
}

pub fn preset_names() -> Vec<&'static str> {
    PRESETS.iter().map(|preset| preset.name).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_within_bounds_round_trips() {
        let state = DeviceLightState::default();
        let next = state
            .apply(
                LightChange::Set { r: 10, g: 20, b: 30, intensity: 40 },
                ApplyPolicy::Reject,
            )
            .unwrap();

        assert_eq!(
            next,
            DeviceLightState { r: 10, g: 20, b: 30, intensity_pct: 40 }
        );
    }

    #[test]
    fn reject_policy_fails_out_of_range_without_change() {
        let state = DeviceLightState { r: 1, g: 2, b: 3, intensity_pct: 4 };

        let result = state.apply(
            LightChange::Set { r: 999, g: 0, b: 0, intensity: 50 },
            ApplyPolicy::Reject,
        );
        assert_eq!(result, Err(ValidationError::OutOfRange));

        let result = state.apply(
            LightChange::Set { r: 0, g: 0, b: 0, intensity: 101 },
            ApplyPolicy::Reject,
        );
        assert_eq!(result, Err(ValidationError::OutOfRange));

        let result = state.apply(
            LightChange::Set { r: -1, g: 0, b: 0, intensity: 0 },
            ApplyPolicy::Reject,
        );
        assert_eq!(result, Err(ValidationError::OutOfRange));
    }

    #[test]
    fn clamp_policy_never_exceeds_bounds() {
        let state = DeviceLightState { r: 250, g: 5, b: 0, intensity_pct: 98 };

        let next = state
            .apply(
                LightChange::Adjust { channel: LightChannel::R, delta: 20 },
                ApplyPolicy::Clamp,
            )
            .unwrap();
        assert_eq!(next.r, 255);

        let next = state
            .apply(
                LightChange::Adjust { channel: LightChannel::G, delta: -20 },
                ApplyPolicy::Clamp,
            )
            .unwrap();
        assert_eq!(next.g, 0);

        let next = state
            .apply(
                LightChange::Adjust { channel: LightChannel::Intensity, delta: 50 },
                ApplyPolicy::Clamp,
            )
            .unwrap();
        assert_eq!(next.intensity_pct, 100);
    }

    #[test]
    fn adjust_only_touches_requested_channel() {
        let state = DeviceLightState { r: 100, g: 100, b: 100, intensity_pct: 50 };
        let next = state
            .apply(
                LightChange::Adjust { channel: LightChannel::B, delta: 7 },
                ApplyPolicy::Clamp,
            )
            .unwrap();

        assert_eq!(
            next,
            DeviceLightState { r: 100, g: 100, b: 107, intensity_pct: 50 }
        );
    }

    #[test]
    fn preset_lookup_is_case_insensitive() {
        let state = preset_state("WARM").unwrap();
        assert_eq!(
            state,
            DeviceLightState { r: 255, g: 180, b: 120, intensity_pct: 100 }
        );
        assert!(preset_state("moonlight").is_none());
    }

    #[test]
    fn preset_names_match_table_order() {
        assert_eq!(preset_names(), vec!["warm", "cool", "sunset"]);
    }
}

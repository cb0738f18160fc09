use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Listener state for positional one-shots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listener {
    pub position: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
}

impl Default for Listener {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            forward: -Vec3::Z,
            up: Vec3::Y,
        }
    }
}

/// Parameters computed for a sound emitter relative to the listener.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialParams {
    /// Distance from listener to emitter.
    pub distance: f32,
    /// Volume attenuation factor (0.0–1.0).
    pub volume: f32,
    /// Stereo panning (-1.0 = full left, 0.0 = center, 1.0 = full right).
    pub panning: f32,
}

/// Maximum distance at which a sound is audible.
const MAX_DISTANCE: f32 = 100.0;

/// Minimum distance before attenuation begins.
const MIN_DISTANCE: f32 = 1.0;

/// Inverse-distance attenuation clamped between `MIN_DISTANCE` and
/// `MAX_DISTANCE`.
pub fn attenuation(distance: f32) -> f32 {
    if distance.is_nan() {
        return 1.0;
    }
    let clamped = distance.clamp(MIN_DISTANCE, MAX_DISTANCE);
    (MIN_DISTANCE / clamped).clamp(0.0, 1.0)
}

/// Compute pan and attenuation for an emitter position relative to a
/// listener. Panning is the projection of the emitter direction onto the
/// listener's right vector.
pub fn compute_spatial(listener: &Listener, emitter_pos: Vec3) -> SpatialParams {
    let to_emitter = emitter_pos - listener.position;
    let distance = to_emitter.length();

    if distance < f32::EPSILON {
        return SpatialParams {
            distance: 0.0,
            volume: 1.0,
            panning: 0.0,
        };
    }

    let right = listener.forward.cross(listener.up).normalize_or_zero();
    let panning = to_emitter.normalize().dot(right);

    SpatialParams {
        distance,
        volume: attenuation(distance),
        panning: panning.clamp(-1.0, 1.0),
    }
}

//! Fixed-precision vector encodings used on the wire.
//!
//! Positions travel as millimetre integers ([`QuantVec3`]); unit directions
//! travel as a two-component octahedral encoding ([`PackedDir`]).

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Quantization steps per metre (millimetre precision).
pub const POSITION_SCALE: f32 = 1000.0;

/// Largest magnitude an octahedral component is scaled to.
const OCT_SCALE: f32 = i16::MAX as f32;

// ---------------------------------------------------------------------------
// QuantVec3
// ---------------------------------------------------------------------------

/// A position quantized to millimetres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuantVec3 {
    /// X in millimetres.
    pub x: i32,
    /// Y in millimetres.
    pub y: i32,
    /// Z in millimetres.
    pub z: i32,
}

impl QuantVec3 {
    /// Quantize a position in metres. Out-of-range and NaN components clamp
    /// (NaN maps to zero).
    pub fn from_vec3(v: Vec3) -> Self {
        Self {
            x: quantize_axis(v.x),
            y: quantize_axis(v.y),
            z: quantize_axis(v.z),
        }
    }

    /// Reconstruct the position in metres.
    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(
            self.x as f32 / POSITION_SCALE,
            self.y as f32 / POSITION_SCALE,
            self.z as f32 / POSITION_SCALE,
        )
    }
}

impl From<Vec3> for QuantVec3 {
    fn from(v: Vec3) -> Self {
        Self::from_vec3(v)
    }
}

impl From<QuantVec3> for Vec3 {
    fn from(q: QuantVec3) -> Self {
        q.to_vec3()
    }
}

fn quantize_axis(v: f32) -> i32 {
    // `as` saturates and maps NaN to 0.
    (v * POSITION_SCALE).round() as i32
}

// ---------------------------------------------------------------------------
// PackedDir
// ---------------------------------------------------------------------------

/// A unit direction packed with octahedral mapping into two `i16`s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackedDir {
    /// First octahedral coordinate.
    pub u: i16,
    /// Second octahedral coordinate.
    pub v: i16,
}

impl PackedDir {
    /// Pack a direction. Zero-length input packs as +Z.
    pub fn from_dir(dir: Vec3) -> Self {
        let l1 = dir.x.abs() + dir.y.abs() + dir.z.abs();
        if l1 <= f32::EPSILON || !l1.is_finite() {
            return Self::default();
        }
        let mut x = dir.x / l1;
        let mut y = dir.y / l1;
        if dir.z < 0.0 {
            let (ox, oy) = (x, y);
            x = (1.0 - oy.abs()) * sign_not_zero(ox);
            y = (1.0 - ox.abs()) * sign_not_zero(oy);
        }
        Self {
            u: (x * OCT_SCALE).round() as i16,
            v: (y * OCT_SCALE).round() as i16,
        }
    }

    /// Unpack to a normalized direction.
    pub fn to_dir(self) -> Vec3 {
        let mut x = self.u as f32 / OCT_SCALE;
        let mut y = self.v as f32 / OCT_SCALE;
        let z = 1.0 - x.abs() - y.abs();
        if z < 0.0 {
            let (ox, oy) = (x, y);
            x = (1.0 - oy.abs()) * sign_not_zero(ox);
            y = (1.0 - ox.abs()) * sign_not_zero(oy);
        }
        Vec3::new(x, y, z).normalize_or(Vec3::Z)
    }
}

impl From<Vec3> for PackedDir {
    fn from(dir: Vec3) -> Self {
        Self::from_dir(dir)
    }
}

fn sign_not_zero(v: f32) -> f32 {
    if v >= 0.0 { 1.0 } else { -1.0 }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

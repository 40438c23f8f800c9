//! Fixed-point math utilities for deterministic simulation.
//!
//! All simulation state (positions, speeds, timers) uses fixed-point
//! arithmetic so two runs with the same seed and inputs produce
//! bit-identical results on every platform.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
/// Range: approximately -2,147,483,648 to 2,147,483,647
/// Precision: approximately 0.00000000023
pub type Fixed = I32F32;

/// Fixed-point 2D vector on the ground plane.
///
/// The simulation ignores height entirely; bearings and distances are
/// horizontal only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Serde support for fixed-point numbers written as decimals.
///
/// Authored data files (RON encounters) use this so designers can write
/// `range: 10.0` instead of raw bit patterns. Values pass through `f64`
/// once at load time; the simulation itself never touches floats.
pub mod decimal_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as a decimal.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_num::<f64>().serialize(serializer)
    }

    /// Deserialize a fixed-point number from a decimal.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Fixed::checked_from_num(value)
            .ok_or_else(|| serde::de::Error::custom(format!("value {value} out of fixed range")))
    }
}

/// Decimal serde for optional fixed-point numbers.
pub mod option_decimal_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize an optional fixed-point number as a decimal.
    pub fn serialize<S>(value: &Option<Fixed>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.map(|v| v.to_num::<f64>()).serialize(serializer)
    }

    /// Deserialize an optional fixed-point number from a decimal.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Fixed>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt = Option::<f64>::deserialize(deserializer)?;
        opt.map(|value| {
            Fixed::checked_from_num(value).ok_or_else(|| {
                serde::de::Error::custom(format!("value {value} out of fixed range"))
            })
        })
        .transpose()
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Create a vector from integer coordinates.
    #[must_use]
    pub fn from_ints(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Unit vector along +Y, the default "home" facing.
    pub const FORWARD: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ONE,
    };

    /// Calculate squared distance (avoids sqrt for comparisons).
    ///
    /// Saturates at [`Fixed::MAX`] once the gap exceeds about 46,000 units,
    /// which still compares correctly against any in-range radius.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        (self - other).length_squared()
    }

    /// Euclidean distance.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        (self - other).length()
    }

    /// Squared length, saturating.
    #[must_use]
    pub fn length_squared(self) -> Fixed {
        self.dot(self)
    }

    /// Vector length.
    ///
    /// Exact for long vectors too: when the squared length would not fit,
    /// the components are scaled down by the larger one first.
    #[must_use]
    pub fn length(self) -> Fixed {
        let squared = self
            .x
            .checked_mul(self.x)
            .zip(self.y.checked_mul(self.y))
            .and_then(|(xx, yy)| xx.checked_add(yy));
        if let Some(squared) = squared {
            return fixed_sqrt(squared);
        }
        let largest = self.x.saturating_abs().max(self.y.saturating_abs());
        let ratio = Self::new(self.x / largest, self.y / largest);
        largest.saturating_mul(fixed_sqrt(ratio.dot(ratio)))
    }

    /// Dot product of two vectors, saturating.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x
            .saturating_mul(other.x)
            .saturating_add(self.y.saturating_mul(other.y))
    }

    /// Scale by a scalar.
    #[must_use]
    pub fn scale(self, s: Fixed) -> Self {
        Self::new(self.x * s, self.y * s)
    }

    /// Linearly interpolate between two vectors.
    #[must_use]
    pub fn lerp(self, other: Self, t: Fixed) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Normalize vector using fixed-point math.
    #[must_use]
    pub fn normalize(self) -> Self {
        if self == Self::ZERO {
            return Self::ZERO;
        }

        let len = self.length();
        if len == Fixed::ZERO {
            return Self::ZERO;
        }

        Self::new(self.x / len, self.y / len)
    }

    /// Perpendicular vector (rotated 90° counter-clockwise).
    #[must_use]
    pub fn perp(self) -> Self {
        Self::new(-self.y, self.x)
    }

    /// Step from `self` toward `target` by at most `max_delta`.
    ///
    /// Never overshoots: if the target is closer than `max_delta` the
    /// result is exactly `target`.
    #[must_use]
    pub fn move_towards(self, target: Self, max_delta: Fixed) -> Self {
        let diff = target - self;
        let dist = diff.length();
        if dist <= max_delta || dist == Fixed::ZERO {
            return target;
        }
        let direction = Self::new(diff.x / dist, diff.y / dist);
        self + direction.scale(max_delta)
    }

    /// Rotate a unit facing vector toward `desired` by at most
    /// `max_angle` radians.
    ///
    /// Snaps to `desired` once it is within reach. When the two are
    /// exactly opposed the turn goes counter-clockwise.
    #[must_use]
    pub fn rotate_towards(self, desired: Self, max_angle: Fixed) -> Self {
        if desired == Self::ZERO || max_angle <= Fixed::ZERO {
            return self;
        }
        let (sin, cos) = sin_cos(max_angle.min(Fixed::PI));
        if self.dot(desired) >= cos {
            return desired;
        }
        let cross = self.x * desired.y - self.y * desired.x;
        let sin = if cross < Fixed::ZERO { -sin } else { sin };
        Self::new(
            self.x * cos - self.y * sin,
            self.x * sin + self.y * cos,
        )
        .normalize()
    }
}

/// Sine and cosine of an angle in `[0, PI]` by Taylor series.
#[must_use]
pub fn sin_cos(angle: Fixed) -> (Fixed, Fixed) {
    let angle = angle.clamp(Fixed::ZERO, Fixed::PI);
    let squared = angle * angle;
    let (mut sin, mut cos) = (angle, Fixed::ONE);
    let (mut sin_term, mut cos_term) = (angle, Fixed::ONE);
    for n in 1..=9 {
        let k = Fixed::from_num(2 * n);
        cos_term = -cos_term * squared / (k * (k - Fixed::ONE));
        sin_term = -sin_term * squared / (k * (k + Fixed::ONE));
        sin += sin_term;
        cos += cos_term;
    }
    (sin, cos)
}

/// Computes the square root of a fixed-point number using binary search.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let mut low = Fixed::ZERO;
    let mut high = if value > Fixed::ONE { value } else { Fixed::ONE };

    for _ in 0..48 {
        let mid = (low + high) / Fixed::from_num(2);
        let mid_sq = mid.saturating_mul(mid);

        if mid_sq <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

use std::fmt;
use std::sync::Arc;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Default stock bar length, in the same unit as input lengths.
pub const DEFAULT_BAR_LENGTH: Len = Len::from_hundredths(21_000);

/// A length in hundredths of a unit.
///
/// Input lengths arrive as decimal reals; scaling to an integer makes
/// equality, hashing, and ordering exact, so units can be matched and
/// merged by length without float comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Len(u32);

impl Len {
    pub const ZERO: Len = Len(0);

    pub const fn from_hundredths(v: u32) -> Self {
        Self(v)
    }

    /// Converts a real-valued length. Returns `None` for non-finite,
    /// negative, or absurdly large values.
    pub fn from_units(v: f64) -> Option<Self> {
        if !v.is_finite() || v < 0.0 {
            return None;
        }
        let scaled = (v * 100.0).round();
        if scaled > u32::MAX as f64 {
            return None;
        }
        Some(Self(scaled as u32))
    }

    pub fn hundredths(self) -> u32 {
        self.0
    }

    pub fn units(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Total length of `count` pieces of this length, widened so large
    /// multiplicities cannot overflow.
    pub fn total(self, count: u32) -> u64 {
        self.0 as u64 * count as u64
    }
}

impl fmt::Display for Len {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / 100;
        let frac = self.0 % 100;
        if frac == 0 {
            write!(f, "{whole}")
        } else if frac % 10 == 0 {
            write!(f, "{whole}.{}", frac / 10)
        } else {
            write!(f, "{whole}.{frac:02}")
        }
    }
}

impl Serialize for Len {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.units())
    }
}

impl<'de> Deserialize<'de> for Len {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = f64::deserialize(deserializer)?;
        Len::from_units(v).ok_or_else(|| de::Error::custom(format!("invalid length {v}")))
    }
}

/// Every descriptive field of a demand line except the quantity.
///
/// Two lines with equal attributes are interchangeable for packing and
/// their quantities are additive, so this doubles as the grouping key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineAttrs {
    pub order_no: String,
    pub kind: String,
    pub material_code: String,
    pub material_position: String,
    pub color: String,
    pub width_height: String,
    pub length: Len,
    pub angles: String,
    pub window_number: String,
    pub grid: String,
    pub lock: String,
    pub nailing_fin: String,
}

/// Grouped demand: identical attributes with quantities summed.
#[derive(Debug, Clone)]
pub struct DemandGroup {
    pub attrs: Arc<LineAttrs>,
    pub qty: u32,
}

/// One packable unit: `multiplicity` physical pieces of the same length
/// that travel together through the optimizer.
#[derive(Debug, Clone)]
pub struct PackUnit {
    pub attrs: Arc<LineAttrs>,
    pub multiplicity: u32,
}

impl PackUnit {
    pub fn length(&self) -> Len {
        self.attrs.length
    }

    /// Combined length of all pieces this unit represents.
    pub fn total_length(&self) -> u64 {
        self.attrs.length.total(self.multiplicity)
    }
}

/// A row placed into a bar. `cutting_id` counts the physical pieces the
/// row represents; `qty` keeps the original pair/single marker for the
/// output table.
#[derive(Debug, Clone)]
pub struct BarPiece {
    pub attrs: Arc<LineAttrs>,
    pub cutting_id: u32,
    pub qty: u32,
}

impl BarPiece {
    pub fn length(&self) -> Len {
        self.attrs.length
    }

    pub fn total_length(&self) -> u64 {
        self.attrs.length.total(self.cutting_id)
    }
}

/// One stock bar with its placed pieces, in placement order.
#[derive(Debug, Clone)]
pub struct Bar {
    pub capacity: Len,
    pub pieces: Vec<BarPiece>,
}

impl Bar {
    pub fn new(capacity: Len) -> Self {
        Self {
            capacity,
            pieces: Vec::new(),
        }
    }

    pub fn used(&self) -> u64 {
        self.pieces.iter().map(|p| p.total_length()).sum()
    }

    pub fn remaining(&self) -> u64 {
        (self.capacity.hundredths() as u64).saturating_sub(self.used())
    }

    pub fn waste(&self) -> Len {
        Len::from_hundredths(self.remaining() as u32)
    }
}

//! Readiness masks exchanged with the protocol engine.
//!
//! The bit values match the engine's `readable` / `writable` flags so a mask
//! can be passed through unchanged.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

// ============================================================================
// Events
// ============================================================================

/// Set of readiness conditions on a descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Events(u32);

impl Events {
    /// No interest.
    pub const NONE: Self = Self(0);

    /// Descriptor is (or should be watched for being) readable.
    pub const READABLE: Self = Self(0x1);

    /// Descriptor is (or should be watched for being) writable.
    pub const WRITABLE: Self = Self(0x2);

    /// Builds a mask from raw engine flags. Unknown bits are kept but ignored.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw flags.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Returns `true` if no bit is set.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if every bit of `other` is set in `self`.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if the readable bit is set.
    #[inline]
    #[must_use]
    pub const fn is_readable(self) -> bool {
        self.contains(Self::READABLE)
    }

    /// Returns `true` if the writable bit is set.
    #[inline]
    #[must_use]
    pub const fn is_writable(self) -> bool {
        self.contains(Self::WRITABLE)
    }
}

impl BitOr for Events {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Events {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl From<Direction> for Events {
    #[inline]
    fn from(direction: Direction) -> Self {
        direction.events()
    }
}

impl fmt::Display for Events {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.is_readable(), self.is_writable()) {
            (true, true) => f.write_str("readable|writable"),
            (true, false) => f.write_str("readable"),
            (false, true) => f.write_str("writable"),
            (false, false) => f.write_str("none"),
        }
    }
}

// ============================================================================
// Direction
// ============================================================================

/// One of the two independently watched readiness directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Readability.
    Read,
    /// Writability.
    Write,
}

impl Direction {
    /// Both directions, read first.
    pub const ALL: [Self; 2] = [Self::Read, Self::Write];

    /// Returns the single-bit mask for this direction.
    #[inline]
    #[must_use]
    pub const fn events(self) -> Events {
        match self {
            Self::Read => Events::READABLE,
            Self::Write => Events::WRITABLE,
        }
    }

    /// Returns a lowercase label for logs.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================

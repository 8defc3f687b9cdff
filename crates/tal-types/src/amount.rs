use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Minor units per major unit (cents per dollar).
const MINOR_PER_MAJOR: u64 = 100;

/// Non-negative monetary value in fixed-point minor units.
///
/// Amounts never pass through floating point. The canonical text form is
/// `<major>.<two-digit minor>` (`"250.00"`), and that exact string is what
/// enters the entry hash, so re-serializing an amount can never drift.
/// Serde uses the canonical string in both directions.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(u64);

impl Amount {
    /// The zero amount.
    pub const ZERO: Self = Self(0);

    /// Create from minor units (cents).
    pub const fn from_minor(minor: u64) -> Self {
        Self(minor)
    }

    /// Create from whole major units. Returns `None` on overflow.
    pub fn from_major(major: u64) -> Option<Self> {
        major.checked_mul(MINOR_PER_MAJOR).map(Self)
    }

    /// Value in minor units.
    pub const fn minor_units(&self) -> u64 {
        self.0
    }

    /// Canonical fixed-precision form used in the hash input.
    pub fn canonical(&self) -> String {
        format!("{}.{:02}", self.0 / MINOR_PER_MAJOR, self.0 % MINOR_PER_MAJOR)
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// A percentage of this amount given in basis points (500 = 5%),
    /// rounded half-up to the nearest minor unit.
    pub fn percent_bps(&self, bps: u32) -> Self {
        let scaled = u128::from(self.0) * u128::from(bps);
        let rounded = (scaled + 5_000) / 10_000;
        Self(u64::try_from(rounded).unwrap_or(u64::MAX))
    }
}

impl FromStr for Amount {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| TypeError::InvalidAmount {
            input: s.to_string(),
            reason,
        };

        let (major, minor) = match s.split_once('.') {
            Some((major, minor)) => (major, Some(minor)),
            None => (s, None),
        };

        if major.is_empty() {
            return Err(invalid("missing whole part"));
        }
        if !major.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("whole part must be plain decimal digits"));
        }
        let major: u64 = major.parse().map_err(|_| invalid("whole part overflows"))?;

        let minor = match minor {
            None => 0,
            Some(m) if m.is_empty() || m.len() > 2 => {
                return Err(invalid("expected one or two fraction digits"));
            }
            Some(m) if !m.bytes().all(|b| b.is_ascii_digit()) => {
                return Err(invalid("fraction must be plain decimal digits"));
            }
            Some(m) => {
                let digits: u64 = m.parse().map_err(|_| invalid("fraction is not a number"))?;
                if m.len() == 1 {
                    digits * 10
                } else {
                    digits
                }
            }
        };

        major
            .checked_mul(MINOR_PER_MAJOR)
            .and_then(|v| v.checked_add(minor))
            .map(Self)
            .ok_or_else(|| invalid("amount overflows"))
    }
}

impl TryFrom<String> for Amount {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        amount.canonical()
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Amount({})", self.canonical())
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

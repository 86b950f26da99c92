use serde::{Deserialize, Serialize};
use std::fmt;

pub const TOKEN_DECIMALS: u32 = 9;
pub const TOKEN_BASE_UNIT: u64 = 1_000_000_000; // 10^9

/// Non-negative token quantity held in integer base units. Stake and reward
/// balances can therefore never underflow into negative territory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Self = Self(0);

    pub fn from_tokens(tokens: f64) -> Self {
        Self((tokens * TOKEN_BASE_UNIT as f64).round() as u64)
    }

    pub fn from_base_units(units: u64) -> Self {
        Self(units)
    }

    pub fn to_tokens(&self) -> f64 {
        self.0 as f64 / TOKEN_BASE_UNIT as f64
    }

    pub fn to_base_units(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Scales the amount by a non-negative factor, rounding to the nearest
    /// base unit. Used for fractional slashes.
    pub fn scaled(&self, factor: f64) -> Self {
        Self((self.0 as f64 * factor.max(0.0)).round() as u64)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.9}", self.to_tokens())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_conversion() {
        let amount = Amount::from_tokens(100.0);
        assert_eq!(amount.to_base_units(), 100 * TOKEN_BASE_UNIT);
        assert_eq!(amount.to_tokens(), 100.0);
    }

    #[test]
    fn test_checked_sub_underflow() {
        let a = Amount::from_tokens(1.0);
        let b = Amount::from_tokens(2.0);
        assert!(a.checked_sub(b).is_none());
        assert_eq!(a.saturating_sub(b), Amount::ZERO);
    }

    #[test]
    fn test_scaled_fraction() {
        let stake = Amount::from_tokens(70.0);
        assert_eq!(stake.scaled(0.1), Amount::from_tokens(7.0));
        assert_eq!(stake.scaled(0.0), Amount::ZERO);
    }
}

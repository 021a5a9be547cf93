use alloy::primitives::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DappError, Result};

/// Token amount in the token's smallest unit.
///
/// Amounts entered by the user are decimal strings ("1.5") that get scaled by the token's
/// decimals using integer arithmetic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenAmount(U256);

/// Most decimals any ERC-20 we talk to uses; 10^77 is the largest power of ten in a U256.
pub const MAX_DECIMALS: u8 = 77;

impl TokenAmount {
    pub const ZERO: TokenAmount = TokenAmount(U256::ZERO);

    pub fn from_base_units(value: U256) -> Self {
        Self(value)
    }

    pub fn base_units(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Parse a user-entered decimal string into base units.
    ///
    /// An empty (or all-whitespace) input counts as zero.
    pub fn parse_units(input: &str, decimals: u8) -> Result<Self> {
        if decimals > MAX_DECIMALS {
            return Err(DappError::InvalidAmount(format!(
                "token decimals {} exceed {}",
                decimals, MAX_DECIMALS
            )));
        }

        let raw = input.trim();
        if raw.is_empty() {
            return Ok(Self::ZERO);
        }
        if raw.starts_with('-') {
            return Err(DappError::InvalidAmount(format!(
                "amount must not be negative: {}",
                raw
            )));
        }
        let raw = raw.strip_prefix('+').unwrap_or(raw);

        let (whole, frac) = match raw.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (raw, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(DappError::InvalidAmount(format!("not a number: {}", input)));
        }
        if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
            return Err(DappError::InvalidAmount(format!("not a number: {}", input)));
        }

        // Trailing zeros past the token's precision carry no value.
        let frac = frac.trim_end_matches('0');
        if frac.len() > decimals as usize {
            return Err(DappError::InvalidAmount(format!(
                "{} has more than {} decimal places",
                raw, decimals
            )));
        }

        let padded = format!("{}{:0<width$}", whole, frac, width = decimals as usize);
        let digits = padded.trim_start_matches('0');
        if digits.is_empty() {
            return Ok(Self::ZERO);
        }

        U256::from_str_radix(digits, 10)
            .map(Self)
            .map_err(|_| DappError::InvalidAmount(format!("{} is too large", raw)))
    }

    /// Render base units as a decimal string with `decimals` places, trailing zeros trimmed.
    pub fn format_units(&self, decimals: u8) -> String {
        let digits = self.0.to_string();
        let decimals = decimals as usize;
        if decimals == 0 {
            return digits;
        }

        let padded = format!("{:0>width$}", digits, width = decimals + 1);
        let (whole, frac) = padded.split_at(padded.len() - decimals);
        let frac = frac.trim_end_matches('0');
        if frac.is_empty() {
            whole.to_string()
        } else {
            format!("{}.{}", whole, frac)
        }
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

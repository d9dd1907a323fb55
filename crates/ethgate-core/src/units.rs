//! Wei denomination conversions.
//!
//! Unit names follow the web3 table and are matched case-insensitively:
//!
//! | exponent | names                                   |
//! |----------|-----------------------------------------|
//! | 0        | `wei`                                   |
//! | 3        | `kwei`, `babbage`, `femtoether`         |
//! | 6        | `mwei`, `lovelace`, `picoether`         |
//! | 9        | `gwei`, `shannon`, `nanoether`, `nano`  |
//! | 12       | `szabo`, `microether`, `micro`          |
//! | 15       | `finney`, `milliether`, `milli`         |
//! | 18       | `ether`                                 |
//! | 21       | `kether`, `grand`                       |
//! | 24       | `mether`                                |
//! | 27       | `gether`                                |
//! | 30       | `tether`                                |

use alloy_primitives::U256;
use std::str::FromStr;
use thiserror::Error;

/// Fractional digits kept by [`from_wei`].
pub const MAX_FRACTION_DIGITS: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitError {
    #[error("failed to find unit")]
    UnknownUnit(String),

    #[error("invalid number: {0}")]
    InvalidNumber(String),
}

/// Power of ten a unit scales wei by.
#[must_use]
pub fn unit_exponent(unit: &str) -> Option<usize> {
    let exponent = match unit.to_ascii_lowercase().as_str() {
        "wei" => 0,
        "kwei" | "babbage" | "femtoether" => 3,
        "mwei" | "lovelace" | "picoether" => 6,
        "gwei" | "shannon" | "nanoether" | "nano" => 9,
        "szabo" | "microether" | "micro" => 12,
        "finney" | "milliether" | "milli" => 15,
        "ether" => 18,
        "kether" | "grand" => 21,
        "mether" => 24,
        "gether" => 27,
        "tether" => 30,
        _ => return None,
    };
    Some(exponent)
}

fn exponent_of(unit: &str) -> Result<usize, UnitError> {
    unit_exponent(unit).ok_or_else(|| UnitError::UnknownUnit(unit.to_string()))
}

fn ten_pow(exponent: usize) -> U256 {
    U256::from(10u64).pow(U256::from(exponent))
}

/// Parses a wei amount given as decimal or `0x` hex.
///
/// # Errors
///
/// Returns [`UnitError::InvalidNumber`] for anything else.
pub fn parse_wei(value: &str) -> Result<U256, UnitError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(UnitError::InvalidNumber(value.to_string()));
    }
    U256::from_str(trimmed).map_err(|_| UnitError::InvalidNumber(value.to_string()))
}

/// Converts a wei amount into `unit`, e.g. `"1000000000000000000"` ether is `"1"`.
///
/// The fraction is truncated to [`MAX_FRACTION_DIGITS`] digits and trailing zeros are dropped.
///
/// # Errors
///
/// [`UnitError::UnknownUnit`] or [`UnitError::InvalidNumber`].
pub fn from_wei(value: &str, unit: &str) -> Result<String, UnitError> {
    let exponent = exponent_of(unit)?;
    let wei = parse_wei(value)?;
    if exponent == 0 {
        return Ok(wei.to_string());
    }

    let divisor = ten_pow(exponent);
    let whole = wei / divisor;
    let remainder = wei % divisor;

    let mut fraction = format!("{:0>width$}", remainder.to_string(), width = exponent);
    fraction.truncate(MAX_FRACTION_DIGITS);
    let fraction = fraction.trim_end_matches('0');

    if fraction.is_empty() {
        Ok(whole.to_string())
    } else {
        Ok(format!("{whole}.{fraction}"))
    }
}

/// Converts an amount in `unit` into wei; digits below one wei are dropped.
///
/// # Errors
///
/// [`UnitError::UnknownUnit`] or [`UnitError::InvalidNumber`].
pub fn to_wei(value: &str, unit: &str) -> Result<U256, UnitError> {
    let exponent = exponent_of(unit)?;
    let invalid = || UnitError::InvalidNumber(value.to_string());

    let trimmed = value.trim();
    let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let whole =
        if whole.is_empty() { U256::ZERO } else { U256::from_str(whole).map_err(|_| invalid())? };
    let kept: String = fraction.chars().take(exponent).collect();
    let fraction = if kept.is_empty() {
        U256::ZERO
    } else {
        let padded = format!("{kept:0<exponent$}");
        U256::from_str(&padded).map_err(|_| invalid())?
    };

    whole
        .checked_mul(ten_pow(exponent))
        .and_then(|scaled| scaled.checked_add(fraction))
        .ok_or_else(invalid)
}

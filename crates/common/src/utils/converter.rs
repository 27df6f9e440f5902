use crate::error::{CommonError, Result};
use crate::types::Amount;

/// Decimals used by TCO2 and most ERC-20 tokens.
pub const DEFAULT_DECIMALS: u32 = 18;

fn unit(decimals: u32) -> Result<Amount> {
    10u128.checked_pow(decimals).ok_or(CommonError::Overflow)
}

/// Parses a decimal string such as `"1.5"` into base units.
pub fn parse_units(value: &str, decimals: u32) -> Result<Amount> {
    let value = value.trim();
    let (whole, fraction) = match value.split_once('.') {
        Some((w, f)) => (w, f),
        None => (value, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(CommonError::InvalidAmount(value.to_string()));
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return Err(CommonError::InvalidAmount(value.to_string()));
    }
    if fraction.len() > decimals as usize {
        return Err(CommonError::InvalidAmount(format!(
            "{} has more than {} decimals",
            value, decimals
        )));
    }

    let scale = unit(decimals)?;
    let whole_units: Amount = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<Amount>()
            .map_err(|_| CommonError::Overflow)?
    };

    let fraction_units: Amount = if fraction.is_empty() {
        0
    } else {
        let padding = unit(decimals - fraction.len() as u32)?;
        fraction
            .parse::<Amount>()
            .map_err(|_| CommonError::Overflow)?
            .checked_mul(padding)
            .ok_or(CommonError::Overflow)?
    };

    whole_units
        .checked_mul(scale)
        .and_then(|w| w.checked_add(fraction_units))
        .ok_or(CommonError::Overflow)
}

/// Formats base units as a decimal string, always keeping one fractional digit (`"1.0"`).
pub fn format_units(amount: Amount, decimals: u32) -> String {
    let scale = match unit(decimals) {
        Ok(scale) => scale,
        Err(_) => return amount.to_string(),
    };
    if decimals == 0 {
        return format!("{}.0", amount);
    }

    let whole = amount / scale;
    let fraction = amount % scale;
    let mut digits = format!("{:0width$}", fraction, width = decimals as usize);
    while digits.len() > 1 && digits.ends_with('0') {
        digits.pop();
    }
    format!("{}.{}", whole, digits)
}

pub fn parse_ether(value: &str) -> Result<Amount> {
    parse_units(value, DEFAULT_DECIMALS)
}

pub fn format_ether(amount: Amount) -> String {
    format_units(amount, DEFAULT_DECIMALS)
}

//! Balance formatting for display.
//!
//! Balances arrive as decimal strings of minor units and can exceed what an
//! `f64` (or even a `u128`) represents exactly, so the division by
//! `10^decimals` is done on the digit string: the integer part is everything
//! left of the split point and the remainder is the fraction.

use crate::types::{Balance, ChainProperties};

/// Split a minor-unit digit string into integer and fractional digits.
///
/// Returns `None` for empty or non-numeric input. The fraction is
/// zero-padded on the left to exactly `decimals` digits.
fn split_minor_units(raw: &str, decimals: u8) -> Option<(String, String)> {
    let raw = raw.trim();
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let digits = raw.trim_start_matches('0');
    let decimals = decimals as usize;

    if digits.len() > decimals {
        let (int_part, frac_part) = digits.split_at(digits.len() - decimals);
        Some((int_part.to_string(), frac_part.to_string()))
    } else {
        let mut frac = "0".repeat(decimals - digits.len());
        frac.push_str(digits);
        Some(("0".to_string(), frac))
    }
}

fn canonical_zero(max_fraction_digits: usize) -> String {
    if max_fraction_digits == 0 {
        "0".to_string()
    } else {
        format!("0.{}", "0".repeat(max_fraction_digits))
    }
}

/// Format a minor-unit balance keeping exactly `max_fraction_digits` digits.
///
/// Extra fraction digits are truncated, missing ones are padded with zeros.
/// Malformed input formats as zero.
///
/// ```
/// use xorion_core::format_balance;
/// assert_eq!(format_balance("1000000000000000000", 18, 4), "1.0000");
/// assert_eq!(format_balance("", 18, 4), "0.0000");
/// ```
pub fn format_balance(raw: &str, decimals: u8, max_fraction_digits: usize) -> String {
    let Some((int_part, mut frac)) = split_minor_units(raw, decimals) else {
        return canonical_zero(max_fraction_digits);
    };

    if max_fraction_digits == 0 {
        return int_part;
    }

    frac.truncate(max_fraction_digits);
    while frac.len() < max_fraction_digits {
        frac.push('0');
    }

    format!("{}.{}", int_part, frac)
}

/// Format a minor-unit balance with trailing zero fraction digits removed.
///
/// ```
/// use xorion_core::format_balance_compact;
/// assert_eq!(format_balance_compact("1500000000000000000", 18, 4), "1.5");
/// assert_eq!(format_balance_compact("1000000000000000000", 18, 4), "1");
/// ```
pub fn format_balance_compact(raw: &str, decimals: u8, max_fraction_digits: usize) -> String {
    let padded = format_balance(raw, decimals, max_fraction_digits);
    match padded.split_once('.') {
        Some((int_part, frac)) => {
            let frac = frac.trim_end_matches('0');
            if frac.is_empty() {
                int_part.to_string()
            } else {
                format!("{}.{}", int_part, frac)
            }
        }
        None => padded,
    }
}

/// Format a `u128` balance.
pub fn format_balance_u128(balance: Balance, decimals: u8, max_fraction_digits: usize) -> String {
    format_balance(&balance.to_string(), decimals, max_fraction_digits)
}

/// Format an amount with the chain's token symbol, e.g. `"12.5 XOR"`.
pub fn format_token_amount(balance: Balance, properties: &ChainProperties) -> String {
    format!(
        "{} {}",
        format_balance_compact(&balance.to_string(), properties.token_decimals, 4),
        properties.token_symbol
    )
}

/// Insert thousands separators into the integer part of a formatted number.
pub fn group_thousands(formatted: &str) -> String {
    let (int_part, rest) = match formatted.split_once('.') {
        Some((int_part, frac)) => (int_part, Some(frac)),
        None => (formatted, None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match rest {
        Some(frac) => format!("{}.{}", grouped, frac),
        None => grouped,
    }
}

/// Shorten a long address or hash for table display.
pub fn shorten(value: &str, keep: usize) -> String {
    if value.len() <= keep * 2 + 3 || !value.is_ascii() {
        return value.to_string();
    }
    format!("{}...{}", &value[..keep], &value[value.len() - keep..])
}

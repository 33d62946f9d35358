//! Fixed-point conversions between display units and ledger minor units.
//!
//! The ledger stores every amount as an integer count of minor units
//! (10^-8 of the display unit). [`parse_display_amount`] is the only way user
//! input becomes a minor-unit amount, and [`format_minor_units`] the only way
//! a minor-unit amount becomes display text. Display text never flows back
//! into a transition request.

use crate::errors::InputError;

/// Implied decimal places of a minor-unit amount.
pub const DECIMALS: u32 = 8;

/// Upper bound for any ratio parameter.
pub const MAX_BPS: u64 = 10_000;

/// Decimal places shown for platform aggregates.
pub const AGGREGATE_PLACES: u32 = 4;

/// Decimal places shown for invoice amounts.
pub const INVOICE_PLACES: u32 = 2;

/// Parse a display-unit amount (e.g. `"85"`, `"0.5"`) into minor units.
///
/// Exact: no floating point is involved, and more than eight fractional
/// digits is an error rather than a silent truncation.
pub fn parse_display_amount(text: &str) -> Result<u64, InputError> {
    let minor = parse_fixed(text, DECIMALS).ok_or_else(|| InputError::Amount(text.to_string()))?;
    if minor == 0 {
        return Err(InputError::ZeroAmount);
    }
    Ok(minor)
}

/// Render a minor-unit amount in display units, rounded half-up to `places`.
pub fn format_minor_units(minor: u64, places: u32) -> String {
    let places = places.min(DECIMALS);
    let scale = 10u128.pow(DECIMALS - places);
    let rounded = (minor as u128 + scale / 2) / scale;
    if places == 0 {
        return rounded.to_string();
    }
    let unit = 10u128.pow(places);
    format!(
        "{}.{:0width$}",
        rounded / unit,
        rounded % unit,
        width = places as usize
    )
}

/// Convert a percentage (e.g. `"40"`, `"4.5"`) into basis points.
pub fn percent_to_bps(text: &str) -> Result<u64, InputError> {
    parse_fixed(text, 2)
        .filter(|bps| *bps <= MAX_BPS)
        .ok_or_else(|| InputError::Percent(text.to_string()))
}

/// Render basis points as a percentage, e.g. `4000` → `"40.00%"`.
pub fn format_bps(bps: u64) -> String {
    format!("{}.{:02}%", bps / 100, bps % 100)
}

/// Parse unsigned decimal text into an integer scaled by `10^decimals`.
fn parse_fixed(text: &str, decimals: u32) -> Option<u64> {
    let text = text.trim();
    let (whole, frac) = match text.split_once('.') {
        Some((whole, frac)) => (whole, frac),
        None => (text, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if frac.len() > decimals as usize {
        return None;
    }
    let all_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || !all_digits(frac) {
        return None;
    }

    let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let frac_scaled: u64 = if frac.is_empty() {
        0
    } else {
        let padding = decimals - frac.len() as u32;
        frac.parse::<u64>().ok()?.checked_mul(10u64.pow(padding))?
    };

    whole
        .checked_mul(10u64.pow(decimals))?
        .checked_add(frac_scaled)
}

//! Display-ready records derived from raw ticks.
//!
//! A `DisplayRecord` is what a channel view renders for one instrument. Every field
//! is a pure function of the latest `RawTick` and the instrument's display name, so
//! two records can be compared field-by-field to decide whether a re-render is due.
//!
//! Formatting policy:
//! - values are formatted like JavaScript's `Number.prototype.toFixed(2)` applied to
//!   the IEEE-754 double nearest the value: the exact binary value decides the
//!   rounding, exact ties round up in magnitude, and a negative value that rounds to
//!   zero keeps its sign (`"-0.00"`);
//! - a missing value formats as `"0.00"`;
//! - net change drops its sign, the direction is carried by `is_positive`;
//! - `is_positive` is `change >= 0`, so an unchanged instrument counts as positive.

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::tick::RawTick;

/// Formatted, render-ready representation of one instrument in one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayRecord {
    /// Human-readable instrument name from the channel's interest set.
    #[serde(default)]
    pub symbol_name: String,
    /// Last traded price, two decimals.
    pub last_price: String,
    /// Absolute net change, two decimals, never signed.
    pub net_change: String,
    /// Percent change, two decimals, sign preserved.
    pub change_percentage: String,
    /// Direction flag derived from the percent change.
    pub is_positive: bool,
}

impl DisplayRecord {
    /// Derive the record for `tick` displayed under `symbol_name`.
    pub fn from_tick(symbol_name: &str, tick: &RawTick) -> Self {
        let change = tick.change.unwrap_or_default();
        Self {
            symbol_name: symbol_name.to_string(),
            last_price: format_fixed2(tick.last_price.unwrap_or_default()),
            net_change: format_fixed2(tick.net_change.unwrap_or_default().abs()),
            change_percentage: format_fixed2(change),
            is_positive: change >= Decimal::ZERO,
        }
    }
}

/// Render `value` with exactly two fractional digits, as `toFixed(2)` would.
pub fn format_fixed2(value: Decimal) -> String {
    let x = value
        .to_string()
        .parse::<f64>()
        .unwrap_or_else(|_| value.to_f64().unwrap_or_default());
    let sign = if x < 0.0 { "-" } else { "" };
    let cents = round_cents(x.abs());
    format!("{}{}.{:02}", sign, cents / 100, cents % 100)
}

/// `round(x * 100)` computed on the exact binary value of `x`, ties rounding up.
fn round_cents(x: f64) -> u128 {
    let bits = x.to_bits();
    let biased = ((bits >> 52) & 0x7ff) as i32;
    let fraction = u128::from(bits & ((1u64 << 52) - 1));
    let (mantissa, exponent) = if biased == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1u128 << 52), biased - 1075)
    };

    let scaled = mantissa * 100;
    if exponent >= 0 {
        // Integers this large only occur far outside any price range.
        return scaled.checked_shl(exponent as u32).unwrap_or(u128::MAX);
    }
    let shift = exponent.unsigned_abs();
    if shift >= 62 {
        // mantissa * 100 < 2^60, so the scaled value is below one quarter.
        return 0;
    }
    (scaled + (1u128 << (shift - 1))) >> shift
}

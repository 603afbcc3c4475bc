//! Precision-safe token amount conversion
//!
//! Token amounts arrive as base-unit integers that routinely exceed 2^53
//! (18-decimal tokens), so the decimal point is placed by string
//! manipulation and only the final decimal string is parsed.

use tracing::debug;

/// Convert a raw base-unit amount into whole tokens.
///
/// `""` and `"0"` yield `0.0`. Input with any non-digit character also
/// yields `0.0`.
pub fn convert_token_value(raw: &str, decimals: u32) -> f64 {
    let raw = raw.trim();
    if raw.is_empty() {
        return 0.0;
    }
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        debug!(target: "CONVERT", "Ignoring non-numeric token amount: {}", raw);
        return 0.0;
    }

    let digits = raw.trim_start_matches('0');
    if digits.is_empty() {
        return 0.0;
    }

    if decimals == 0 {
        return digits.parse().unwrap_or(0.0);
    }

    let decimals = decimals as usize;
    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals - digits.len() + 1), digits)
    } else {
        digits.to_string()
    };

    let split = padded.len() - decimals;
    let decimal = format!("{}.{}", &padded[..split], &padded[split..]);
    decimal.parse().unwrap_or(0.0)
}

/// Parse a decimals field ("18", "6") as reported by Blockscout
pub fn parse_decimals(decimals: &str) -> Option<u32> {
    decimals.trim().parse().ok()
}

/// USD value of a raw amount, `None` when decimals or rate are unknown
pub fn usd_value(raw: &str, decimals: Option<&str>, exchange_rate: Option<&str>) -> Option<f64> {
    let decimals = parse_decimals(decimals?)?;
    let rate: f64 = exchange_rate?.trim().parse().ok()?;
    if !rate.is_finite() {
        return None;
    }
    Some(convert_token_value(raw, decimals) * rate)
}

/// Compact USD formatting for log lines
pub fn format_usd(value: f64) -> String {
    let abs = value.abs();
    if abs >= 1_000_000_000.0 {
        format!("${:.2}B", value / 1_000_000_000.0)
    } else if abs >= 1_000_000.0 {
        format!("${:.2}M", value / 1_000_000.0)
    } else if abs >= 1_000.0 {
        format!("${:.2}K", value / 1_000.0)
    } else {
        format!("${:.2}", value)
    }
}

/// Shorten an address for display
pub fn shorten_address(address: &str, chars: usize) -> String {
    if address.len() <= chars * 2 + 2 || !address.is_ascii() {
        return address.to_string();
    }
    format!("{}...{}", &address[..chars + 2], &address[address.len() - chars..])
}

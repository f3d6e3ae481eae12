//! Elapsed-time parsing and formatting.
//!
//! Tools print elapsed times as `4.201s`, `350ms`, `1m2.5s`, or a bare
//! number of seconds. Everything is normalised to seconds.

use std::time::Duration;

/// Parse an elapsed-time string into a [`Duration`].
///
/// Accepts a bare number (seconds) or one or more `<number><unit>` pairs
/// with units `h`, `m`, `s`, `ms`, `us`, `µs`, `ns`. Surrounding
/// whitespace is ignored. Returns `None` for anything else.
pub fn parse_elapsed(text: &str) -> Option<Duration> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(secs) = text.parse::<f64>() {
        return from_secs(secs);
    }

    let mut total = 0.0_f64;
    let mut rest = text;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return None;
        }
        let value: f64 = rest[..num_len].parse().ok()?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let scale = unit_scale(&rest[..unit_len])?;
        rest = &rest[unit_len..];

        total += value * scale;
    }

    from_secs(total)
}

/// Round to whole nanoseconds so `4.201` stays `4.201` instead of
/// truncating to `4.200999999`.
fn from_secs(secs: f64) -> Option<Duration> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some(Duration::from_nanos((secs * 1e9).round() as u64))
}

fn unit_scale(unit: &str) -> Option<f64> {
    let scale = match unit {
        "h" => 3600.0,
        "m" => 60.0,
        "s" => 1.0,
        "ms" => 1e-3,
        "us" | "µs" | "μs" => 1e-6,
        "ns" => 1e-9,
        _ => return None,
    };
    Some(scale)
}

/// Step-level format: seconds with exactly three decimals, e.g. `4.201s`.
pub fn format_fixed(duration: Duration) -> String {
    format!("{:.3}s", duration.as_secs_f64())
}

/// Sub-step format: seconds rounded to milliseconds in shortest form, e.g.
/// `12.4s` or `0.35s`.
pub fn format_short(duration: Duration) -> String {
    let secs = (duration.as_secs_f64() * 1000.0).round() / 1000.0;
    format!("{secs}s")
}

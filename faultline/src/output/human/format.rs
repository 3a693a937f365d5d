use std::time::{Duration, SystemTime};

pub(crate) fn format_percent(v: f64) -> String {
    if v.is_finite() {
        format!("{v:.2}%")
    } else {
        "0.00%".to_string()
    }
}

/// Milliseconds rendered in a single unit: `850us`, `12.4ms`, `3.20s`.
pub(crate) fn format_ms(ms: f64) -> String {
    if !ms.is_finite() || ms < 0.0 {
        return "-".to_string();
    }
    if ms >= 1000.0 {
        return format!("{:.2}s", ms / 1000.0);
    }
    if ms >= 1.0 {
        return format!("{ms:.1}ms");
    }
    format!("{:.0}us", ms * 1000.0)
}

pub(crate) fn format_duration(d: Duration) -> String {
    // Always a single rounded component in one of: us, ms, s.
    let total_ns = d.as_nanos();

    const NS_PER_US: u128 = 1_000;
    const NS_PER_MS: u128 = 1_000_000;
    const NS_PER_S: u128 = 1_000_000_000;

    fn round_div(value: u128, unit: u128) -> u128 {
        (value + (unit / 2)) / unit
    }

    if total_ns >= NS_PER_S {
        return format!("{}s", round_div(total_ns, NS_PER_S));
    }
    if total_ns >= NS_PER_MS {
        return format!("{}ms", round_div(total_ns, NS_PER_MS));
    }
    format!("{}us", round_div(total_ns, NS_PER_US))
}

pub(crate) fn format_timestamp(t: SystemTime) -> String {
    humantime::format_rfc3339_seconds(t).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn durations_use_one_unit() {
        assert_eq!(format_duration(Duration::from_micros(250)), "250us");
        assert_eq!(format_duration(Duration::from_millis(1499)), "1s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "2s");
        assert_eq!(format_duration(Duration::from_millis(42)), "42ms");
    }

    #[test]
    fn milliseconds_pick_a_readable_unit() {
        assert_eq!(format_ms(0.25), "250us");
        assert_eq!(format_ms(12.44), "12.4ms");
        assert_eq!(format_ms(3200.0), "3.20s");
        assert_eq!(format_ms(f64::NAN), "-");
    }

    #[test]
    fn percent_is_two_decimals() {
        assert_eq!(format_percent(96.0), "96.00%");
        assert_eq!(format_percent(f64::NAN), "0.00%");
    }
}

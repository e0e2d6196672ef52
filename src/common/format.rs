//! Small text formatting helpers shared by the source modules.

/// Format an integer with thousands separators, e.g. `151798` -> `"151,798"`.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    let offset = digits.len() % 3;
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (i + 3 - offset) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Format a byte count in human-readable form.
pub fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    const GB: u64 = 1024 * 1024 * 1024;
    if size < KB {
        format!("{} B", size)
    } else if size < MB {
        format!("{:.1} KB", size as f64 / KB as f64)
    } else if size < GB {
        format!("{:.1} MB", size as f64 / MB as f64)
    } else {
        format!("{:.1} GB", size as f64 / GB as f64)
    }
}

/// Truncate to at most `max` characters, appending `...` when shortened.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Sort key for a version string: the leading digits of the first three
/// dot-separated components. `"1.2.3-rc1"` -> `(1, 2, 3)`, junk -> zeros.
pub fn version_key(version: &str) -> (u64, u64, u64) {
    let mut parts = version.split('.').take(3).map(|part| {
        let digits: String = part.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse::<u64>().unwrap_or(0)
    });
    (
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
        parts.next().unwrap_or(0),
    )
}

/// Render a `last_updated`-style value as `YYYY-MM-DD`. Accepts either an
/// epoch timestamp or an ISO-8601 string; malformed values yield `None`
/// rather than failing the whole response.
pub fn format_date(value: &serde_json::Value) -> Option<String> {
    if let Some(epoch) = value.as_i64() {
        let dt = chrono::DateTime::from_timestamp(epoch, 0)?;
        return Some(dt.format("%Y-%m-%d").to_string());
    }
    let text = value.as_str()?;
    let dt = chrono::DateTime::parse_from_rfc3339(text).ok()?;
    Some(dt.format("%Y-%m-%d").to_string())
}

/// Like [`format_date`] but with the time kept, for FlakeHub publish dates.
pub fn format_datetime_utc(text: &str) -> Option<String> {
    let dt = chrono::DateTime::parse_from_rfc3339(text).ok()?;
    Some(dt.with_timezone(&chrono::Utc).format("%Y-%m-%d %H:%M UTC").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1000), "1,000");
        assert_eq!(group_thousands(151798), "151,798");
        assert_eq!(group_thousands(1234567890), "1,234,567,890");
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 10), "abcdefghij");
        assert_eq!(truncate("abcdefghijk", 10), "abcdefghij...");
    }

    #[test]
    fn test_version_key() {
        assert_eq!(version_key("1.2.3"), (1, 2, 3));
        assert_eq!(version_key("10.0"), (10, 0, 0));
        assert_eq!(version_key("2.4rc1.7"), (2, 4, 7));
        assert_eq!(version_key("garbage"), (0, 0, 0));
    }

    #[test]
    fn test_format_date() {
        assert_eq!(
            format_date(&json!(1700000000)).as_deref(),
            Some("2023-11-14")
        );
        assert_eq!(
            format_date(&json!("2024-03-01T12:30:00Z")).as_deref(),
            Some("2024-03-01")
        );
        assert_eq!(format_date(&json!("not a date")), None);
    }
}

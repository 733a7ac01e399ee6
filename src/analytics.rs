use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Utc};

/// Coarse user-agent classification for traffic breakdowns.
/// Returns (device, browser, os).
pub fn parse_user_agent(ua: &str) -> (&'static str, &'static str, &'static str) {
    if ua.trim().is_empty() {
        return ("unknown", "unknown", "unknown");
    }

    let device = if ua.contains("iPad") || ua.contains("Tablet") {
        "tablet"
    } else if ua.contains("Mobile") || ua.contains("Android") {
        "mobile"
    } else {
        "desktop"
    };

    let browser = if ua.contains("Firefox") {
        "Firefox"
    } else if ua.contains("Edg/") {
        "Edge"
    } else if ua.contains("OPR") || ua.contains("Opera") {
        "Opera"
    } else if ua.contains("Chrome") {
        "Chrome"
    } else if ua.contains("Safari") {
        "Safari"
    } else {
        "Other"
    };

    // Android UAs also contain "Linux", iPhone UAs also contain "Mac OS";
    // order matters.
    let os = if ua.contains("Windows") {
        "Windows"
    } else if ua.contains("Android") {
        "Android"
    } else if ua.contains("iPhone") || ua.contains("iPad") {
        "iOS"
    } else if ua.contains("Mac OS") {
        "macOS"
    } else if ua.contains("Linux") {
        "Linux"
    } else {
        "Other"
    };

    (device, browser, os)
}

/// Referrer URLs are reduced to their host for grouping.
pub fn extract_domain(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
        .unwrap_or_else(|| url.to_string())
}

/// Resolve a named time filter into a half-open [from, to) window.
///
/// `week` and `month` are calendar windows (weeks start on Monday);
/// `last30days`/`last90days` are rolling. An unrecognised filter falls
/// back to the rolling last 7 days. `custom` needs both bounds and
/// returns None when they are missing or unparseable.
pub fn resolve_range(
    filter: &str,
    from: Option<&str>,
    to: Option<&str>,
) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let now = Utc::now().naive_utc();
    let today = now.date();

    match filter {
        "today" => {
            let start = today.and_hms_opt(0, 0, 0)?;
            Some((start, start + Duration::days(1)))
        }
        "yesterday" => {
            let start = (today - Duration::days(1)).and_hms_opt(0, 0, 0)?;
            Some((start, start + Duration::days(1)))
        }
        "week" => {
            let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
            let start = monday.and_hms_opt(0, 0, 0)?;
            Some((start, start + Duration::days(7)))
        }
        "month" => {
            let first = today.with_day(1)?;
            let next = if first.month() == 12 {
                NaiveDate::from_ymd_opt(first.year() + 1, 1, 1)?
            } else {
                NaiveDate::from_ymd_opt(first.year(), first.month() + 1, 1)?
            };
            Some((first.and_hms_opt(0, 0, 0)?, next.and_hms_opt(0, 0, 0)?))
        }
        "last30days" => Some((now - Duration::days(30), now)),
        "last90days" => Some((now - Duration::days(90), now)),
        "custom" => {
            let start = parse_stamp(from?, false)?;
            let end = parse_stamp(to?, true)?;
            if end <= start {
                return None;
            }
            Some((start, end))
        }
        _ => Some((now - Duration::days(7), now)),
    }
}

/// Accepts a full timestamp or a bare date. A bare date used as the end
/// of a range covers the whole day.
fn parse_stamp(raw: &str, end: bool) -> Option<NaiveDateTime> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt);
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let start = date.and_hms_opt(0, 0, 0)?;
    Some(if end { start + Duration::days(1) } else { start })
}

//! Timestamp layouts for the date filter.
//!
//! A layout is one of:
//! - a named layout: `ISO8601`, `UNIX` (seconds), `UNIX_MS` (milliseconds);
//! - a strftime format, recognized by containing `%`;
//! - a reference-time layout such as `02-Jan-2006 15:04:05.999999999`,
//!   translated to strftime once at construction.

use crate::error::ConfigError;
use chrono::format::{self, Item, ParseErrorKind, Parsed, StrftimeItems};
use chrono::{DateTime, Datelike, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Reference-time tokens, longest first where prefixes overlap.
const REFERENCE_TOKENS: &[(&str, &str)] = &[
    ("January", "%B"),
    ("Jan", "%b"),
    ("Monday", "%A"),
    ("Mon", "%a"),
    ("MST", "%Z"),
    ("2006", "%Y"),
    ("-07:00", "%#z"),
    ("-0700", "%#z"),
    ("-07", "%#z"),
    ("Z07:00", "%#z"),
    ("Z0700", "%#z"),
    ("Z07", "%#z"),
    ("002", "%j"),
    ("01", "%m"),
    ("02", "%d"),
    ("03", "%I"),
    ("04", "%M"),
    ("05", "%S"),
    ("06", "%y"),
    ("_2", "%e"),
    ("15", "%H"),
    ("PM", "%p"),
    ("pm", "%p"),
    ("1", "%m"),
    ("2", "%d"),
    ("3", "%I"),
    ("4", "%M"),
    ("5", "%S"),
];

#[derive(Debug, Clone, PartialEq)]
pub enum Layout {
    Iso8601,
    Unix,
    UnixMs,
    Format { layout: String, strftime: String },
}

impl Layout {
    pub fn parse(layout: &str) -> Result<Self, ConfigError> {
        match layout {
            "ISO8601" => return Ok(Layout::Iso8601),
            "UNIX" => return Ok(Layout::Unix),
            "UNIX_MS" => return Ok(Layout::UnixMs),
            "" => {
                return Err(ConfigError::InvalidLayout {
                    layout: String::new(),
                    message: "empty layout".to_string(),
                })
            }
            _ => {}
        }

        let strftime = if layout.contains('%') {
            layout.to_string()
        } else {
            translate_reference_layout(layout)
        };

        if StrftimeItems::new(&strftime).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::InvalidLayout {
                layout: layout.to_string(),
                message: format!("'{}' is not a valid format", strftime),
            });
        }

        Ok(Layout::Format {
            layout: layout.to_string(),
            strftime,
        })
    }

    /// Parse `value`, interpreting it in `timezone` when it carries no offset.
    pub fn parse_value(&self, value: &str, timezone: &Tz) -> Option<DateTime<Utc>> {
        let value = value.trim();
        match self {
            Layout::Iso8601 => parse_iso8601(value, timezone),
            Layout::Unix => {
                let seconds: f64 = value.parse().ok()?;
                if !seconds.is_finite() {
                    return None;
                }
                let whole = seconds.floor();
                let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
                Utc.timestamp_opt(whole as i64, nanos).single()
            }
            Layout::UnixMs => {
                let millis: f64 = value.parse().ok()?;
                if !millis.is_finite() {
                    return None;
                }
                Utc.timestamp_millis_opt(millis.round() as i64).single()
            }
            Layout::Format { strftime, .. } => parse_with_format(value, strftime, timezone),
        }
    }
}

fn translate_reference_layout(layout: &str) -> String {
    let mut out = String::with_capacity(layout.len() * 2);
    let mut rest = layout;

    'outer: while !rest.is_empty() {
        // Fractional seconds: '.' followed by a run of 0s or 9s
        if let Some(after_dot) = rest.strip_prefix('.') {
            let digit = after_dot.chars().next();
            if matches!(digit, Some('0') | Some('9')) {
                let digit = digit.unwrap_or('0');
                let run = after_dot.chars().take_while(|c| *c == digit).count();
                let tail = &after_dot[run..];
                if !tail.starts_with(|c: char| c.is_ascii_digit()) {
                    out.push_str("%.f");
                    rest = tail;
                    continue;
                }
            }
        }

        for (token, spec) in REFERENCE_TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(spec);
                rest = tail;
                continue 'outer;
            }
        }

        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            if c == '%' {
                out.push_str("%%");
            } else {
                out.push(c);
            }
        }
        rest = chars.as_str();
    }

    out
}

fn parse_with_format(value: &str, strftime: &str, timezone: &Tz) -> Option<DateTime<Utc>> {
    let mut parsed = Parsed::new();
    format::parse(&mut parsed, value, StrftimeItems::new(strftime)).ok()?;

    let date = match parsed.to_naive_date() {
        Ok(date) => date,
        // Layouts without a year (syslog style) mean the current year
        Err(e) if e.kind() == ParseErrorKind::NotEnough => {
            parsed.set_year(Utc::now().year() as i64).ok()?;
            parsed.to_naive_date().ok()?
        }
        Err(_) => return None,
    };
    let time = match parsed.to_naive_time() {
        Ok(time) => time,
        Err(e) if e.kind() == ParseErrorKind::NotEnough => NaiveTime::MIN,
        Err(_) => return None,
    };

    localize(date.and_time(time), &parsed, timezone)
}

fn localize(naive: NaiveDateTime, parsed: &Parsed, timezone: &Tz) -> Option<DateTime<Utc>> {
    match parsed.to_fixed_offset() {
        Ok(offset) => offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc)),
        Err(_) => timezone
            .from_local_datetime(&naive)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

fn parse_iso8601(value: &str, timezone: &Tz) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%#z", "%Y-%m-%d %H:%M:%S%.f%#z"] {
        if let Ok(dt) = DateTime::parse_from_str(value, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return timezone
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc));
        }
    }
    None
}

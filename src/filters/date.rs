// src/filters/date.rs
use crate::error::{ConfigError, ProcessingError};
use crate::event::{Event, Value};
use crate::filters::layout::Layout;
use crate::filters::FailurePolicy;
use crate::pipeline::stage::{Flow, Stage};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Deserialize;

pub const DEFAULT_TARGET: &str = "@timestamp";
pub const DEFAULT_FAILURE_TAG: &str = "_dateparsefailure";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DateConfig {
    /// Field holding the timestamp text
    pub field: String,
    /// Candidate layouts, tried in order
    pub patterns: Vec<String>,
    /// IANA zone for values without an explicit offset
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Where the normalized timestamp goes; may equal `field`
    #[serde(default)]
    pub target: Option<String>,
    pub on_failure: FailurePolicy,
    #[serde(default)]
    pub tag: Option<String>,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

/// Parses a timestamp field with the first matching layout and stores it as
/// a UTC [`Value::Timestamp`].
pub struct DateStage {
    name: String,
    field: String,
    target: String,
    layouts: Vec<Layout>,
    timezone: Tz,
    on_failure: FailurePolicy,
    tag: String,
}

impl DateStage {
    pub fn new(config: &DateConfig) -> Result<Self, ConfigError> {
        if config.field.is_empty() {
            return Err(ConfigError::MissingOption {
                stage: "date",
                option: "field",
            });
        }
        if config.patterns.is_empty() {
            return Err(ConfigError::MissingOption {
                stage: "date",
                option: "patterns",
            });
        }

        let layouts = config
            .patterns
            .iter()
            .map(|p| Layout::parse(p))
            .collect::<Result<Vec<_>, _>>()?;
        let timezone: Tz = config
            .timezone
            .parse()
            .map_err(|_| ConfigError::UnknownTimezone(config.timezone.clone()))?;

        Ok(DateStage {
            name: format!("date:{}", config.field),
            field: config.field.clone(),
            target: config
                .target
                .clone()
                .unwrap_or_else(|| DEFAULT_TARGET.to_string()),
            layouts,
            timezone,
            on_failure: config.on_failure,
            tag: config
                .tag
                .clone()
                .unwrap_or_else(|| DEFAULT_FAILURE_TAG.to_string()),
        })
    }

    /// Try each layout in order; returns the index of the first that parses
    /// together with the instant it produced.
    pub fn parse(&self, text: &str) -> Option<(usize, DateTime<Utc>)> {
        self.layouts
            .iter()
            .enumerate()
            .find_map(|(index, layout)| {
                layout
                    .parse_value(text, &self.timezone)
                    .map(|ts| (index, ts))
            })
    }

    /// Normalize the configured field in place.
    pub fn normalize(&self, event: &mut Event) -> Result<(), ProcessingError> {
        let text = match event.get(&self.field) {
            None => return Err(ProcessingError::FieldMissing(self.field.clone())),
            Some(Value::Timestamp(ts)) => {
                let ts = *ts;
                event.insert(self.target.clone(), ts);
                return Ok(());
            }
            Some(Value::Text(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        match self.parse(&text) {
            Some((_, ts)) => {
                event.insert(self.target.clone(), ts);
                Ok(())
            }
            None => Err(ProcessingError::NoMatchingLayout {
                field: self.field.clone(),
                value: text,
            }),
        }
    }
}

impl Stage for DateStage {
    fn process(&self, mut event: Event) -> Flow {
        match self.normalize(&mut event) {
            Ok(()) => Flow::Continue(event),
            Err(e) => {
                tracing::debug!(stage = %self.name, error = %e, policy = ?self.on_failure, "date normalization failed");
                self.on_failure.apply(event, &self.tag)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(patterns: &[&str], on_failure: FailurePolicy) -> DateConfig {
        DateConfig {
            field: "logdate".to_string(),
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            timezone: "America/Chicago".to_string(),
            target: None,
            on_failure,
            tag: None,
        }
    }

    fn event_with_date(value: &str) -> Event {
        let mut event = Event::new();
        event.insert("logdate", value);
        event
    }

    #[test]
    fn test_normalizes_into_target() {
        let stage = DateStage::new(&config(
            &["02-Jan-2006 15:04:05.999999999"],
            FailurePolicy::Tag,
        ))
        .unwrap();
        let event = match stage.process(event_with_date("20-Jan-2017 10:15:00.000000000")) {
            Flow::Continue(event) => event,
            Flow::Drop => panic!("event was dropped"),
        };
        let ts = event.get("@timestamp").and_then(Value::as_timestamp).unwrap();
        assert_eq!(ts.to_rfc3339(), "2017-01-20T16:15:00+00:00");
        // Source field is left alone when target differs
        assert!(event.contains("logdate"));
        assert!(event.tags.is_empty());
    }

    #[test]
    fn test_first_matching_layout_wins() {
        // Both layouts parse the value; they disagree on day/month order
        let stage = DateStage::new(&config(
            &["%d/%m/%Y %H:%M:%S", "%m/%d/%Y %H:%M:%S"],
            FailurePolicy::Tag,
        ))
        .unwrap();
        let (index, ts) = stage.parse("03/04/2020 00:00:00").unwrap();
        assert_eq!(index, 0);
        assert_eq!(ts.to_rfc3339(), "2020-04-03T05:00:00+00:00");

        // Only the second layout can parse a month of 13
        let (index, _) = stage.parse("04/13/2020 00:00:00").unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn test_overwrite_source_field() {
        let mut cfg = config(&["ISO8601"], FailurePolicy::Tag);
        cfg.target = Some("logdate".to_string());
        let stage = DateStage::new(&cfg).unwrap();
        let mut event = event_with_date("2017-01-20T10:15:00Z");
        stage.normalize(&mut event).unwrap();
        assert!(matches!(event.get("logdate"), Some(Value::Timestamp(_))));
        assert!(!event.contains("@timestamp"));
    }

    #[test]
    fn test_missing_field_error_and_policies() {
        let stage = DateStage::new(&config(&["ISO8601"], FailurePolicy::Tag)).unwrap();
        let mut event = Event::new();
        assert!(matches!(
            stage.normalize(&mut event),
            Err(ProcessingError::FieldMissing(_))
        ));
        match stage.process(Event::new()) {
            Flow::Continue(event) => assert!(event.has_tag("_dateparsefailure")),
            Flow::Drop => panic!("tag policy must not drop"),
        }

        let stage = DateStage::new(&config(&["ISO8601"], FailurePolicy::Drop)).unwrap();
        assert!(matches!(
            stage.process(event_with_date("yesterday")),
            Flow::Drop
        ));

        let stage = DateStage::new(&config(&["ISO8601"], FailurePolicy::Pass)).unwrap();
        match stage.process(event_with_date("yesterday")) {
            Flow::Continue(event) => {
                assert!(event.tags.is_empty());
                assert_eq!(event.get_str("logdate"), Some("yesterday"));
                assert!(!event.contains("@timestamp"));
            }
            Flow::Drop => panic!("pass policy must not drop"),
        }
    }

    #[test]
    fn test_no_matching_layout_error() {
        let stage = DateStage::new(&config(&["UNIX"], FailurePolicy::Tag)).unwrap();
        let mut event = event_with_date("not a time");
        match stage.normalize(&mut event) {
            Err(ProcessingError::NoMatchingLayout { field, value }) => {
                assert_eq!(field, "logdate");
                assert_eq!(value, "not a time");
            }
            other => panic!("expected NoMatchingLayout, got {:?}", other),
        }
    }

    #[test]
    fn test_numeric_field_with_unix_layout() {
        let stage = DateStage::new(&config(&["UNIX"], FailurePolicy::Tag)).unwrap();
        let mut event = Event::new();
        event.insert("logdate", 1484928900i64);
        stage.normalize(&mut event).unwrap();
        let ts = event.get("@timestamp").and_then(Value::as_timestamp).unwrap();
        assert_eq!(ts.to_rfc3339(), "2017-01-20T16:15:00+00:00");
    }

    #[test]
    fn test_configuration_errors() {
        let mut cfg = config(&["ISO8601"], FailurePolicy::Tag);
        cfg.timezone = "Mars/Olympus_Mons".to_string();
        assert!(matches!(
            DateStage::new(&cfg),
            Err(ConfigError::UnknownTimezone(_))
        ));

        let cfg = config(&[], FailurePolicy::Tag);
        assert!(matches!(
            DateStage::new(&cfg),
            Err(ConfigError::MissingOption {
                option: "patterns",
                ..
            })
        ));
    }
}

//! File source configuration: naming conventions and their validity periods

use crate::core::template::{MatchKind, Template, TimeMatch};
use crate::core::temporal::{is_multiple_of, CanonicalTimeValue};
use crate::error::{Error, Result};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Regex applied to a file name before template parsing; its capture
/// groups are concatenated and parsed against the selector template.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Preselector(Regex);

impl Preselector {
    /// Compile a preselector
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self(Regex::new(pattern)?))
    }

    /// Concatenation of all capture groups, or `None` if the regex misses
    pub fn select(&self, file_name: &str) -> Option<String> {
        let captures = self.0.captures(file_name)?;
        Some(
            captures
                .iter()
                .skip(1)
                .flatten()
                .map(|m| m.as_str())
                .collect(),
        )
    }
}

impl fmt::Debug for Preselector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Preselector").field(&self.0.as_str()).finish()
    }
}

impl TryFrom<String> for Preselector {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Preselector::new(&value)
    }
}

impl From<Preselector> for String {
    fn from(p: Preselector) -> Self {
        p.0.as_str().to_string()
    }
}

/// One naming/layout convention, valid from `begin` onwards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSourceConfig {
    /// UTC instant from which this convention applies
    pub begin: DateTime<Utc>,
    /// One template per folder level, root to leaf
    #[serde(default)]
    pub path_segment_templates: Vec<Template>,
    /// Template for the file name itself
    pub file_name_template: Template,
    /// Optional regex for file names with opaque tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preselector_regex: Option<Preselector>,
    /// Template the preselected capture groups are parsed with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector_template: Option<Template>,
    /// Nominal duration covered by one file
    #[serde(with = "serde_duration")]
    pub file_period: Duration,
    /// Shift for files named after the end of their period
    #[serde(default = "Duration::zero", with = "serde_duration")]
    pub file_name_time_offset: Duration,
    /// Offset assumed when a name carries none
    #[serde(default = "Duration::zero", with = "serde_duration")]
    pub utc_offset: Duration,
    /// File boundaries are not guaranteed to align with the period
    #[serde(default)]
    pub irregular: bool,
    /// Opaque, format specific settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_settings: Option<serde_json::Value>,
}

impl FileSourceConfig {
    /// Create a config with the required fields; the rest default
    pub fn new(
        begin: DateTime<Utc>,
        path_segment_templates: Vec<Template>,
        file_name_template: Template,
        file_period: Duration,
    ) -> Self {
        Self {
            begin,
            path_segment_templates,
            file_name_template,
            preselector_regex: None,
            selector_template: None,
            file_period,
            file_name_time_offset: Duration::zero(),
            utc_offset: Duration::zero(),
            irregular: false,
            additional_settings: None,
        }
    }

    /// Check the invariants that do not depend on sibling configs
    pub fn validate(&self) -> Result<()> {
        if self.file_period <= Duration::zero() {
            return Err(Error::Configuration(format!(
                "file period must be positive, got {}",
                self.file_period
            )));
        }
        if self.utc_offset.num_days() != 0 {
            return Err(Error::Configuration(format!(
                "utc offset must be within 24 hours, got {}",
                self.utc_offset
            )));
        }
        if self.preselector_regex.is_some() && self.selector_template.is_none() {
            return Err(Error::Configuration(
                "a preselector regex requires a selector template".to_string(),
            ));
        }
        if let Some(segment) = self
            .path_segment_templates
            .iter()
            .find(|t| t.has_wildcards())
        {
            return Err(Error::Configuration(format!(
                "wildcards are only supported in file name templates, found '{segment}'"
            )));
        }
        Ok(())
    }

    /// Match a bare file name, honouring the preselector.
    ///
    /// `base` supplies date components the template does not carry.
    pub fn match_file_name(
        &self,
        file_name: &str,
        base: Option<NaiveDateTime>,
    ) -> Option<TimeMatch> {
        match (&self.preselector_regex, &self.selector_template) {
            (Some(preselector), Some(selector)) => {
                let selected = preselector.select(file_name)?;
                selector.parse(&selected, self.utc_offset, base)
            }
            _ => self.file_name_template.parse(file_name, self.utc_offset, base),
        }
    }

    /// Kind of information a file name carries under this config
    pub fn file_name_kind(&self) -> MatchKind {
        match (&self.preselector_regex, &self.selector_template) {
            (Some(_), Some(selector)) => selector.kind(),
            _ => self.file_name_template.kind(),
        }
    }

    /// Begin of the content of a file whose name resolved to `named`
    pub fn content_begin(&self, named: &CanonicalTimeValue) -> DateTime<Utc> {
        named.to_utc() - self.file_name_time_offset
    }

    /// Express a UTC instant in this config's local time
    pub fn to_local(&self, utc: DateTime<Utc>) -> NaiveDateTime {
        CanonicalTimeValue::from_utc(utc, self.utc_offset).local()
    }

    /// UTC instant of a local value in this config's offset
    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        CanonicalTimeValue::new(local, self.utc_offset).to_utc()
    }
}

/// Time ordered configs sharing one identifier
#[derive(Debug, Clone, Serialize)]
pub struct FileSourceGroup {
    id: String,
    configs: Vec<FileSourceConfig>,
}

impl FileSourceGroup {
    /// Create a group, validating every config and the ordering of `begin`
    pub fn new(id: impl Into<String>, configs: Vec<FileSourceConfig>) -> Result<Self> {
        let id = id.into();
        if configs.is_empty() {
            return Err(Error::Configuration(format!(
                "file source group '{id}' is empty"
            )));
        }
        for config in &configs {
            config.validate().map_err(|e| {
                Error::Configuration(format!("file source group '{id}': {e}"))
            })?;
        }
        for pair in configs.windows(2) {
            if pair[1].begin <= pair[0].begin {
                return Err(Error::Configuration(format!(
                    "file source group '{id}': begin values must be strictly increasing ({} then {})",
                    pair[0].begin, pair[1].begin
                )));
            }
        }
        Ok(Self { id, configs })
    }

    /// Group identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// All configs, ordered by `begin`
    pub fn configs(&self) -> &[FileSourceConfig] {
        &self.configs
    }

    /// Every `begin` must be a multiple of the sample period
    pub fn validate_sample_period(&self, sample_period: Duration) -> Result<()> {
        if sample_period <= Duration::zero() {
            return Err(Error::InvalidInput(format!(
                "sample period must be positive, got {sample_period}"
            )));
        }
        for config in &self.configs {
            if config.begin != DateTime::<Utc>::MIN_UTC && !is_multiple_of(config.begin, sample_period) {
                return Err(Error::Configuration(format!(
                    "file source group '{}': begin {} is not a multiple of the sample period {}",
                    self.id, config.begin, sample_period
                )));
            }
        }
        Ok(())
    }

    /// Index of the config in effect at `t`: the last one with `begin <= t`
    pub fn active_at(&self, t: DateTime<Utc>) -> Option<usize> {
        self.configs.iter().rposition(|c| c.begin <= t)
    }

    /// End of validity of config `index`: the next config's begin
    pub fn valid_until(&self, index: usize) -> Option<DateTime<Utc>> {
        self.configs.get(index + 1).map(|c| c.begin)
    }

    /// Begin of the first config starting after `t`
    pub fn next_begin_after(&self, t: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.configs.iter().map(|c| c.begin).find(|b| *b > t)
    }
}

/// Serde support for durations written as `[-][d.]hh:mm:ss[.fffffff]`
pub mod serde_duration {
    use crate::core::temporal::{from_nanos, nanos};
    use chrono::Duration;
    use serde::{de, Deserialize, Deserializer, Serializer};

    /// Format a duration
    pub fn format(d: Duration) -> String {
        let total = nanos(d);
        let sign = if total < 0 { "-" } else { "" };
        let total = total.abs();
        let secs = total / 1_000_000_000;
        let frac = total % 1_000_000_000;
        let (days, hours, minutes, seconds) =
            (secs / 86_400, secs % 86_400 / 3_600, secs % 3_600 / 60, secs % 60);

        let mut out = String::from(sign);
        if days > 0 {
            out.push_str(&format!("{days}."));
        }
        out.push_str(&format!("{hours:02}:{minutes:02}:{seconds:02}"));
        if frac > 0 {
            let digits = format!("{frac:09}");
            out.push('.');
            out.push_str(digits.trim_end_matches('0'));
        }
        out
    }

    /// Parse a duration
    pub fn parse(text: &str) -> Option<Duration> {
        let (negative, body) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let (days, clock) = match body.split_once('.') {
            Some((d, rest)) if !d.contains(':') => (d.parse::<i128>().ok()?, rest),
            _ => (0, body),
        };
        let (clock, frac) = match clock.split_once('.') {
            Some((c, f)) => (c, Some(f)),
            None => (clock, None),
        };

        let parts: Vec<&str> = clock.split(':').collect();
        if parts.len() != 3 {
            return None;
        }
        let hours: i128 = parts[0].parse().ok()?;
        let minutes: i128 = parts[1].parse().ok()?;
        let seconds: i128 = parts[2].parse().ok()?;
        if minutes >= 60 || seconds >= 60 {
            return None;
        }

        let mut total = ((days * 24 + hours) * 60 + minutes) * 60 + seconds;
        total *= 1_000_000_000;
        if let Some(frac) = frac {
            if frac.is_empty() || frac.len() > 9 || !frac.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            let scaled: i128 = format!("{frac:0<9}").parse().ok()?;
            total += scaled;
        }
        Some(from_nanos(if negative { -total } else { total }))
    }

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse(&text).ok_or_else(|| de::Error::custom(format!("invalid duration '{text}'")))
    }
}

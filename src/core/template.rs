//! Name templates: parse folder and file names into time values
//!
//! A template is a custom date/time pattern for a single path segment:
//!
//! | Token | Meaning |
//! |---|---|
//! | `yyyy`, `yy` | 4 or 2 digit year (`yy`: 00-49 → 20xx, 50-99 → 19xx) |
//! | `MM`, `dd` | month, day |
//! | `HH`, `mm`, `ss` | hour (24h), minute, second |
//! | `ff` … `fffffff` | second fraction with 2-7 digits |
//! | `zzz` | offset `±hh:mm` |
//! | `K` | offset `Z` or `±hh:mm` |
//! | `'text'`, `\c` | literal text |
//! | `?`, `*` | wildcards (one character, any run) |
//!
//! Any other character is literal, and so is a lone directive letter such as
//! the `d` in `HHmmss.dat`. Other run lengths (`yyy`, `MMM`, ...) are
//! rejected when the template is compiled.

use crate::core::temporal::{format_offset, parse_offset, reference_epoch, CanonicalTimeValue};
use crate::error::{Error, Result};
use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    AnyChar,
    AnyRun,
    Year4,
    Year2,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Fraction(u32),
    Offset,
    OffsetOrZ,
}

impl Token {
    fn pattern(&self) -> String {
        match self {
            Token::Literal(text) => regex::escape(text),
            Token::AnyChar => ".".to_string(),
            Token::AnyRun => ".*".to_string(),
            Token::Year4 => "([0-9]{4})".to_string(),
            Token::Year2 | Token::Month | Token::Day | Token::Hour | Token::Minute | Token::Second => {
                "([0-9]{2})".to_string()
            }
            Token::Fraction(n) => format!("([0-9]{{{n}}})"),
            Token::Offset => "([+-][0-9]{2}:[0-9]{2})".to_string(),
            Token::OffsetOrZ => "(Z|[+-][0-9]{2}:[0-9]{2})".to_string(),
        }
    }

    fn is_field(&self) -> bool {
        !matches!(self, Token::Literal(_) | Token::AnyChar | Token::AnyRun)
    }

    fn precision(&self) -> Option<Precision> {
        match self {
            Token::Year4 | Token::Year2 => Some(Precision::Year),
            Token::Month => Some(Precision::Month),
            Token::Day => Some(Precision::Day),
            Token::Hour => Some(Precision::Hour),
            Token::Minute => Some(Precision::Minute),
            Token::Second | Token::Fraction(_) => Some(Precision::Second),
            _ => None,
        }
    }
}

/// Finest calendar unit a template encodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precision {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl Precision {
    /// `t` advanced by one unit of this precision
    pub fn advance(self, t: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            Precision::Year => t.checked_add_months(Months::new(12)),
            Precision::Month => t.checked_add_months(Months::new(1)),
            Precision::Day => t.checked_add_signed(Duration::days(1)),
            Precision::Hour => t.checked_add_signed(Duration::hours(1)),
            Precision::Minute => t.checked_add_signed(Duration::minutes(1)),
            Precision::Second => t.checked_add_signed(Duration::seconds(1)),
        }
    }
}

/// What kind of information a successful match carried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// The template has date directives (time directives optional)
    DateTime,
    /// Only time-of-day directives; the date comes from elsewhere
    TimeOnly,
    /// No directives at all; the name matched literally
    Empty,
}

impl MatchKind {
    /// True for `DateTime` and `TimeOnly`
    pub fn carries_time(self) -> bool {
        !matches!(self, MatchKind::Empty)
    }
}

/// Result of matching a name against a template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeMatch {
    pub value: CanonicalTimeValue,
    pub kind: MatchKind,
}

/// Compiled name template
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Template {
    source: String,
    tokens: Vec<Token>,
    fields: Vec<Token>,
    regex: Regex,
}

impl Template {
    /// Compile a template
    pub fn new(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        let mut pattern = String::from("^");
        for token in &tokens {
            pattern.push_str(&token.pattern());
        }
        pattern.push('$');

        let fields = tokens.iter().filter(|t| t.is_field()).cloned().collect();
        Ok(Self {
            source: source.to_string(),
            tokens,
            fields,
            regex: Regex::new(&pattern)?,
        })
    }

    /// The template text as written
    pub fn source(&self) -> &str {
        &self.source
    }

    /// True if the template contains `?` or `*`
    pub fn has_wildcards(&self) -> bool {
        self.tokens
            .iter()
            .any(|t| matches!(t, Token::AnyChar | Token::AnyRun))
    }

    /// True if the template encodes any date or time component
    pub fn has_directives(&self) -> bool {
        self.fields.iter().any(|t| t.precision().is_some())
    }

    fn has_date(&self) -> bool {
        self.fields
            .iter()
            .any(|t| matches!(t, Token::Year4 | Token::Year2 | Token::Month | Token::Day))
    }

    fn has_offset(&self) -> bool {
        self.fields
            .iter()
            .any(|t| matches!(t, Token::Offset | Token::OffsetOrZ))
    }

    /// Kind of match this template produces
    pub fn kind(&self) -> MatchKind {
        if self.has_date() {
            MatchKind::DateTime
        } else if self.has_directives() {
            MatchKind::TimeOnly
        } else {
            MatchKind::Empty
        }
    }

    /// Finest unit encoded, if any
    pub fn precision(&self) -> Option<Precision> {
        self.fields.iter().filter_map(Token::precision).max()
    }

    /// Parse `text` against the template.
    ///
    /// Components the template does not carry are taken from `base`
    /// (defaults to 0001-01-01T00:00:00). Without an offset directive in the
    /// template, `fallback_offset` is used. Returns `None` when the text
    /// does not match or forms an invalid date.
    pub fn parse(
        &self,
        text: &str,
        fallback_offset: Duration,
        base: Option<NaiveDateTime>,
    ) -> Option<TimeMatch> {
        let captures = self.regex.captures(text)?;
        let base = base.unwrap_or_else(reference_epoch);

        let mut year = base.year();
        let mut month = base.month();
        let mut day = base.day();
        let mut hour = base.hour();
        let mut minute = base.minute();
        let mut second = base.second();
        let mut nanosecond = base.nanosecond();
        let mut offset = None;

        for (index, field) in self.fields.iter().enumerate() {
            let raw = captures.get(index + 1)?.as_str();
            match field {
                Token::Year4 => year = raw.parse().ok()?,
                Token::Year2 => {
                    let short: i32 = raw.parse().ok()?;
                    year = if short < 50 { 2000 + short } else { 1900 + short };
                }
                Token::Month => month = raw.parse().ok()?,
                Token::Day => day = raw.parse().ok()?,
                Token::Hour => hour = raw.parse().ok()?,
                Token::Minute => minute = raw.parse().ok()?,
                Token::Second => second = raw.parse().ok()?,
                Token::Fraction(digits) => {
                    let value: u32 = raw.parse().ok()?;
                    nanosecond = value * 10u32.pow(9 - digits);
                }
                Token::Offset | Token::OffsetOrZ => offset = Some(parse_offset(raw)?),
                _ => {}
            }
        }

        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        let time = NaiveTime::from_hms_nano_opt(hour, minute, second, nanosecond)?;
        let offset = if self.has_offset() {
            offset?
        } else {
            fallback_offset
        };

        Some(TimeMatch {
            value: CanonicalTimeValue::new(date.and_time(time), offset),
            kind: self.kind(),
        })
    }

    /// Format a local value through the template. Wildcards are emitted as-is.
    pub fn render(&self, local: NaiveDateTime, offset: Duration) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::AnyChar => out.push('?'),
                Token::AnyRun => out.push('*'),
                Token::Year4 => out.push_str(&format!("{:04}", local.year())),
                Token::Year2 => out.push_str(&format!("{:02}", local.year().rem_euclid(100))),
                Token::Month => out.push_str(&format!("{:02}", local.month())),
                Token::Day => out.push_str(&format!("{:02}", local.day())),
                Token::Hour => out.push_str(&format!("{:02}", local.hour())),
                Token::Minute => out.push_str(&format!("{:02}", local.minute())),
                Token::Second => out.push_str(&format!("{:02}", local.second())),
                Token::Fraction(digits) => {
                    let scaled = local.nanosecond() / 10u32.pow(9 - digits);
                    out.push_str(&format!("{:0width$}", scaled, width = *digits as usize));
                }
                Token::Offset => out.push_str(&format_offset(offset)),
                Token::OffsetOrZ => {
                    if offset.is_zero() {
                        out.push('Z');
                    } else {
                        out.push_str(&format_offset(offset));
                    }
                }
            }
        }
        out
    }

    /// Format a canonical value through the template
    pub fn render_value(&self, value: &CanonicalTimeValue) -> String {
        self.render(value.local(), value.utc_offset())
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    fn flush(literal: &mut String, tokens: &mut Vec<Token>) {
        if !literal.is_empty() {
            tokens.push(Token::Literal(std::mem::take(literal)));
        }
    }

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\'' | '"' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|x| *x == c)
                    .ok_or_else(|| {
                        Error::Configuration(format!("unterminated quote in template '{source}'"))
                    })?;
                literal.extend(&chars[i + 1..i + 1 + close]);
                i += close + 2;
            }
            '\\' => {
                let escaped = chars.get(i + 1).ok_or_else(|| {
                    Error::Configuration(format!("dangling escape in template '{source}'"))
                })?;
                literal.push(*escaped);
                i += 2;
            }
            '?' | '*' => {
                flush(&mut literal, &mut tokens);
                tokens.push(if c == '?' { Token::AnyChar } else { Token::AnyRun });
                i += 1;
            }
            'y' | 'M' | 'd' | 'H' | 'm' | 's' | 'f' | 'z' | 'K' => {
                let run = chars[i..].iter().take_while(|x| **x == c).count();
                let token = match (c, run) {
                    ('K', 1) => Some(Token::OffsetOrZ),
                    (_, 1) => None,
                    ('y', 4) => Some(Token::Year4),
                    ('y', 2) => Some(Token::Year2),
                    ('M', 2) => Some(Token::Month),
                    ('d', 2) => Some(Token::Day),
                    ('H', 2) => Some(Token::Hour),
                    ('m', 2) => Some(Token::Minute),
                    ('s', 2) => Some(Token::Second),
                    ('f', 2..=7) => Some(Token::Fraction(run as u32)),
                    ('z', 3) => Some(Token::Offset),
                    _ => {
                        return Err(Error::Configuration(format!(
                            "unsupported directive '{}' in template '{source}'",
                            c.to_string().repeat(run)
                        )))
                    }
                };
                match token {
                    Some(token) => {
                        flush(&mut literal, &mut tokens);
                        tokens.push(token);
                    }
                    None => literal.push(c),
                }
                i += run;
            }
            _ => {
                literal.push(c);
                i += 1;
            }
        }
    }
    flush(&mut literal, &mut tokens);
    Ok(tokens)
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Template").field(&self.source).finish()
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PartialEq for Template {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Template {}

impl FromStr for Template {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Template::new(s)
    }
}

impl TryFrom<String> for Template {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Template::new(&value)
    }
}

impl From<Template> for String {
    fn from(template: Template) -> Self {
        template.source
    }
}

//! Field annotation parsing
//!
//! An annotation is a comma separated list: an optional key name followed by
//! options. Options are either flags (`required`, `inline`) or `key:value`
//! pairs. Values may be wrapped in single or double quotes so they can
//! contain commas and colons:
//!
//! ```text
//! PORT,default:8080
//! ,required
//! ,split:';',default:'a;b'
//! ,format:"%Y-%m-%d %H:%M"
//! -
//! ```

use crate::error::TagError;

/// Default slice delimiter
pub const DEFAULT_SPLIT: &str = ",";

/// Parsed form of a field annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTag {
    /// Explicit key name; empty means derive it from the field name
    pub name: String,
    /// Prefix used for a nested aggregate instead of `NAME_`
    pub prefix: Option<String>,
    /// Literal used when the key is absent or blank
    pub default: Option<String>,
    /// Fail when the key is absent and no default exists
    pub required: bool,
    /// Flatten a nested aggregate into the current prefix
    pub inline: bool,
    /// Slice delimiter
    pub split: String,
    /// Unit for integer encoded times and durations
    pub unit: Option<String>,
    /// Time layout or byte encoding
    pub format: Option<String>,
    /// Field is suppressed (`-`)
    pub skip: bool,
}

impl Default for FieldTag {
    fn default() -> Self {
        Self {
            name: String::new(),
            prefix: None,
            default: None,
            required: false,
            inline: false,
            split: DEFAULT_SPLIT.to_string(),
            unit: None,
            format: None,
            skip: false,
        }
    }
}

impl FieldTag {
    /// Parse an annotation string
    pub fn parse(tag: &str) -> Result<Self, TagError> {
        let mut parsed = FieldTag::default();
        let mut scanner = Scanner::new(tag);

        let name = scanner.read_until(&[',']).trim().to_string();
        if name == "-" {
            parsed.skip = true;
            return Ok(parsed);
        }
        parsed.name = name;

        let mut seen: Vec<String> = Vec::new();
        while scanner.eat(',') {
            let key = scanner.read_until(&[',', ':']).trim().to_string();
            let value = if scanner.eat(':') {
                Some(scanner.read_value(tag)?)
            } else {
                None
            };

            if key.is_empty() && value.is_none() {
                continue;
            }
            if seen.iter().any(|k| *k == key) {
                return Err(TagError::DuplicateOption(key));
            }
            seen.push(key.clone());

            match (key.as_str(), value) {
                ("required", None) => parsed.required = true,
                ("inline", None) => parsed.inline = true,
                ("default", Some(v)) => parsed.default = Some(v),
                ("prefix", Some(v)) => parsed.prefix = Some(v),
                ("split", Some(v)) => parsed.split = v,
                ("unit", Some(v)) => parsed.unit = Some(v),
                ("format", Some(v)) => parsed.format = Some(v),
                (k @ ("default" | "prefix" | "split" | "unit" | "format"), None) => {
                    return Err(TagError::MissingValue(k.to_string()));
                }
                (k, Some(v)) => return Err(TagError::UnknownOption(format!("{}:{}", k, v))),
                (k, None) => return Err(TagError::UnknownOption(k.to_string())),
            }
        }

        Ok(parsed)
    }

    /// Default value, ignoring an explicitly empty one
    pub fn default_value(&self) -> Option<&str> {
        self.default.as_deref().filter(|d| !d.is_empty())
    }
}

struct Scanner<'a> {
    rest: &'a str,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self { rest: input }
    }

    fn eat(&mut self, c: char) -> bool {
        match self.rest.strip_prefix(c) {
            Some(rest) => {
                self.rest = rest;
                true
            }
            None => false,
        }
    }

    fn read_until(&mut self, stops: &[char]) -> &'a str {
        let end = self.rest.find(|c| stops.contains(&c)).unwrap_or(self.rest.len());
        let (head, tail) = self.rest.split_at(end);
        self.rest = tail;
        head
    }

    /// Read an option value: either quoted, or up to the next comma
    fn read_value(&mut self, whole: &str) -> Result<String, TagError> {
        let trimmed = self.rest.trim_start();
        let quote = trimmed.chars().next().filter(|c| *c == '\'' || *c == '"');

        let Some(q) = quote else {
            return Ok(self.read_until(&[',']).trim().to_string());
        };

        let body = &trimmed[1..];
        let Some(close) = body.find(q) else {
            return Err(TagError::UnterminatedQuote(whole.to_string()));
        };
        let value = body[..close].to_string();
        self.rest = &body[close + 1..];
        // anything between the closing quote and the next comma is dropped
        self.read_until(&[',']);
        Ok(value)
    }
}

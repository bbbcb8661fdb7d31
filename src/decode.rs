//! Typed decoding of raw string values
//!
//! [`Decode`] is the decoder capability: every field type the binder can
//! populate implements it. Implementing it for your own type makes the binder
//! hand the raw value to your code instead of a built-in parser.

use crate::duration::{parse_duration, scale_integer};
use crate::error::DecodeError;
use crate::tag::FieldTag;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use num_complex::Complex;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Layout used by `format:date`
pub const DATE_LAYOUT: &str = "%Y-%m-%d";
/// Layout used by `format:time`
pub const TIME_LAYOUT: &str = "%H:%M:%S";
/// Layout used by `format:dateTime`
pub const DATE_TIME_LAYOUT: &str = "%Y-%m-%d %H:%M:%S";

/// A type that can be built from a raw string value.
///
/// The field's parsed annotation is passed along so decoders can honour
/// `unit`, `format` and `split`.
pub trait Decode: Sized {
    fn decode(raw: &str, tag: &FieldTag) -> Result<Self, DecodeError>;

    /// Decode a delimited list of values.
    ///
    /// The default splits on the `split` option and decodes each part with
    /// the same annotation. `u8` overrides it to read byte encodings.
    fn decode_list(raw: &str, tag: &FieldTag) -> Result<Vec<Self>, DecodeError> {
        split_list(raw, tag)
    }
}

fn split_list<T: Decode>(raw: &str, tag: &FieldTag) -> Result<Vec<T>, DecodeError> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }

    let parts: Vec<&str> = if tag.split.is_empty() {
        vec![raw]
    } else {
        raw.split(tag.split.as_str()).collect()
    };

    parts.into_iter().map(|part| T::decode(part, tag)).collect()
}

/// Implement [`Decode`] for types that already implement [`FromStr`](std::str::FromStr).
///
/// ```
/// #[derive(Debug, PartialEq)]
/// struct Level(u8);
///
/// impl std::str::FromStr for Level {
///     type Err = std::num::ParseIntError;
///     fn from_str(s: &str) -> Result<Self, Self::Err> {
///         s.parse().map(Level)
///     }
/// }
///
/// svckit::impl_decode_from_str!(Level);
/// ```
#[macro_export]
macro_rules! impl_decode_from_str {
    ($($ty:ty),+ $(,)?) => {$(
        impl $crate::decode::Decode for $ty {
            fn decode(
                raw: &str,
                _tag: &$crate::tag::FieldTag,
            ) -> ::std::result::Result<Self, $crate::error::DecodeError> {
                raw.parse::<$ty>().map_err($crate::error::DecodeError::custom)
            }
        }
    )+};
}

macro_rules! decode_parsed {
    ($($ty:ty => $expected:literal),+ $(,)?) => {$(
        impl Decode for $ty {
            fn decode(raw: &str, _tag: &FieldTag) -> Result<Self, DecodeError> {
                raw.parse::<$ty>()
                    .map_err(|e| DecodeError::invalid(raw, $expected, e))
            }
        }
    )+};
}

decode_parsed! {
    i8 => "i8",
    i16 => "i16",
    i32 => "i32",
    i64 => "i64",
    i128 => "i128",
    isize => "isize",
    u16 => "u16",
    u32 => "u32",
    u64 => "u64",
    u128 => "u128",
    usize => "usize",
    f32 => "f32",
    f64 => "f64",
    Complex<f32> => "complex64 (a+bi)",
    Complex<f64> => "complex128 (a+bi)",
    char => "char",
    IpAddr => "IP address",
    Ipv4Addr => "IPv4 address",
    Ipv6Addr => "IPv6 address",
    SocketAddr => "socket address",
}

impl Decode for u8 {
    fn decode(raw: &str, _tag: &FieldTag) -> Result<Self, DecodeError> {
        raw.parse::<u8>()
            .map_err(|e| DecodeError::invalid(raw, "u8", e))
    }

    fn decode_list(raw: &str, tag: &FieldTag) -> Result<Vec<u8>, DecodeError> {
        match tag.format.as_deref().unwrap_or("") {
            "" => Ok(raw.as_bytes().to_vec()),
            "hex" => hex::decode(raw).map_err(|e| DecodeError::invalid(raw, "hex bytes", e)),
            "base32" => decode_base32(raw).map_err(|e| DecodeError::invalid(raw, "base32 bytes", e)),
            "base64" => base64::Engine::decode(&base64::engine::general_purpose::STANDARD, raw)
                .map_err(|e| DecodeError::invalid(raw, "base64 bytes", e)),
            other => Err(DecodeError::UnknownFormat(other.to_string())),
        }
    }
}

impl Decode for bool {
    fn decode(raw: &str, _tag: &FieldTag) -> Result<Self, DecodeError> {
        match raw {
            "1" | "t" | "T" | "true" | "True" | "TRUE" => Ok(true),
            "0" | "f" | "F" | "false" | "False" | "FALSE" => Ok(false),
            _ => Err(DecodeError::invalid(raw, "bool", "expected true/false/1/0/t/f")),
        }
    }
}

impl Decode for String {
    fn decode(raw: &str, _tag: &FieldTag) -> Result<Self, DecodeError> {
        Ok(raw.to_string())
    }
}

impl Decode for PathBuf {
    fn decode(raw: &str, _tag: &FieldTag) -> Result<Self, DecodeError> {
        Ok(PathBuf::from(raw))
    }
}

impl Decode for Duration {
    fn decode(raw: &str, tag: &FieldTag) -> Result<Self, DecodeError> {
        match tag.unit.as_deref() {
            Some(unit) => scale_integer(raw, unit),
            None => parse_duration(raw),
        }
    }
}

impl Decode for url::Url {
    fn decode(raw: &str, _tag: &FieldTag) -> Result<Self, DecodeError> {
        url::Url::parse(raw).map_err(|e| DecodeError::invalid(raw, "URL", e))
    }
}

impl<T: Decode> Decode for Vec<T> {
    fn decode(raw: &str, tag: &FieldTag) -> Result<Self, DecodeError> {
        T::decode_list(raw, tag)
    }
}

/// Pointer-like level: present once a value has been decoded into it
impl<T: Decode> Decode for Option<T> {
    fn decode(raw: &str, tag: &FieldTag) -> Result<Self, DecodeError> {
        T::decode(raw, tag).map(Some)
    }
}

impl<T: Decode> Decode for Box<T> {
    fn decode(raw: &str, tag: &FieldTag) -> Result<Self, DecodeError> {
        T::decode(raw, tag).map(Box::new)
    }
}

impl Decode for DateTime<FixedOffset> {
    fn decode(raw: &str, tag: &FieldTag) -> Result<Self, DecodeError> {
        parse_instant(raw, tag)
    }
}

impl Decode for DateTime<Utc> {
    fn decode(raw: &str, tag: &FieldTag) -> Result<Self, DecodeError> {
        parse_instant(raw, tag).map(|dt| dt.with_timezone(&Utc))
    }
}

impl Decode for NaiveDate {
    fn decode(raw: &str, tag: &FieldTag) -> Result<Self, DecodeError> {
        let layout = named_layout(tag.format.as_deref().unwrap_or("date"));
        NaiveDate::parse_from_str(raw, layout).map_err(|e| DecodeError::invalid(raw, "date", e))
    }
}

impl Decode for NaiveTime {
    fn decode(raw: &str, tag: &FieldTag) -> Result<Self, DecodeError> {
        let layout = named_layout(tag.format.as_deref().unwrap_or("time"));
        NaiveTime::parse_from_str(raw, layout).map_err(|e| DecodeError::invalid(raw, "time of day", e))
    }
}

impl Decode for NaiveDateTime {
    fn decode(raw: &str, tag: &FieldTag) -> Result<Self, DecodeError> {
        let layout = named_layout(tag.format.as_deref().unwrap_or("dateTime"));
        NaiveDateTime::parse_from_str(raw, layout).map_err(|e| DecodeError::invalid(raw, "date and time", e))
    }
}

fn named_layout(format: &str) -> &str {
    match format {
        "date" => DATE_LAYOUT,
        "time" => TIME_LAYOUT,
        "dateTime" => DATE_TIME_LAYOUT,
        other => other,
    }
}

/// Parse a time instant according to the field's `format` and `unit`.
///
/// - no format: RFC 3339 (`2024-05-01T10:00:00+02:00`)
/// - `unix`: integer seconds, or `ms`/`us` with the `unit` option
/// - `date`, `time`, `dateTime`: calendar date, wall time, both (UTC);
///   a bare wall time lands on 1970-01-01
/// - anything else: a `strftime` layout; layouts without an offset are read as UTC
pub fn parse_instant(raw: &str, tag: &FieldTag) -> Result<DateTime<FixedOffset>, DecodeError> {
    const EXPECTED: &str = "time instant";

    match tag.format.as_deref() {
        None | Some("") => {
            DateTime::parse_from_rfc3339(raw).map_err(|e| DecodeError::invalid(raw, EXPECTED, e))
        }
        Some("unix") => parse_unix(raw, tag.unit.as_deref()),
        Some("date") => NaiveDate::parse_from_str(raw, DATE_LAYOUT)
            .map(|d| d.and_time(NaiveTime::MIN).and_utc().fixed_offset())
            .map_err(|e| DecodeError::invalid(raw, EXPECTED, e)),
        Some("time") => NaiveTime::parse_from_str(raw, TIME_LAYOUT)
            .map(|t| NaiveDate::default().and_time(t).and_utc().fixed_offset())
            .map_err(|e| DecodeError::invalid(raw, EXPECTED, e)),
        Some("dateTime") => NaiveDateTime::parse_from_str(raw, DATE_TIME_LAYOUT)
            .map(|dt| dt.and_utc().fixed_offset())
            .map_err(|e| DecodeError::invalid(raw, EXPECTED, e)),
        Some(layout) => DateTime::parse_from_str(raw, layout)
            .or_else(|first| {
                NaiveDateTime::parse_from_str(raw, layout)
                    .map(|dt| dt.and_utc().fixed_offset())
                    .or_else(|_| {
                        NaiveDate::parse_from_str(raw, layout)
                            .map(|d| d.and_time(NaiveTime::MIN).and_utc().fixed_offset())
                    })
                    .map_err(|_| first)
            })
            .map_err(|e| DecodeError::invalid(raw, EXPECTED, e)),
    }
}

fn parse_unix(raw: &str, unit: Option<&str>) -> Result<DateTime<FixedOffset>, DecodeError> {
    const EXPECTED: &str = "unix timestamp";

    let value: i64 = raw
        .parse()
        .map_err(|e| DecodeError::invalid(raw, EXPECTED, e))?;

    let (secs, nanos) = match unit.unwrap_or("s") {
        "s" => (value, 0),
        "ms" => (value.div_euclid(1_000), value.rem_euclid(1_000) * 1_000_000),
        "us" | "μs" | "µs" => (value.div_euclid(1_000_000), value.rem_euclid(1_000_000) * 1_000),
        other => return Err(DecodeError::UnknownUnit(other.to_string())),
    };

    Utc.timestamp_opt(secs, nanos as u32)
        .single()
        .map(|dt| dt.fixed_offset())
        .ok_or_else(|| DecodeError::invalid(raw, EXPECTED, "out of range"))
}

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// RFC 4648 base32 (standard alphabet); trailing `=` padding is optional
fn decode_base32(raw: &str) -> Result<Vec<u8>, String> {
    let input = raw.trim_end_matches('=');
    if matches!(input.len() % 8, 1 | 3 | 6) {
        return Err(format!("invalid length {}", raw.len()));
    }

    let mut out = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;

    for (i, byte) in input.bytes().enumerate() {
        let value = BASE32_ALPHABET
            .iter()
            .position(|&c| c == byte)
            .ok_or_else(|| format!("illegal character {:?} at offset {}", byte as char, i))?;

        buffer = (buffer << 5) | value as u32;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }

    Ok(out)
}

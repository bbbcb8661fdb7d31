//! Binding of key/value lookups onto typed configuration records
//!
//! A record describes its fields by implementing [`Bind`], usually through the
//! [`bindable!`](crate::bindable) macro. [`bind`] then walks those fields in
//! declared order, builds a key for each one and decodes the looked-up value:
//!
//! ```
//! use std::time::Duration;
//! use svckit::binder::{bind_with, Options};
//! use svckit::lookup::MapLookup;
//!
//! #[derive(Debug, Default)]
//! struct ServerConfig {
//!     host: String,
//!     port: u16,
//!     timeout: Duration,
//! }
//!
//! svckit::bindable!(ServerConfig {
//!     host: ",required",
//!     port: ",default:8080",
//!     timeout: ",unit:s",
//! });
//!
//! let lookup = MapLookup::new().with("APP_HOST", "localhost").with("APP_TIMEOUT", "30");
//! let options = Options::default().with_prefix("APP_").with_lookup(lookup);
//!
//! let mut config = ServerConfig::default();
//! bind_with(&mut config, &options).unwrap();
//! assert_eq!(config.port, 8080);
//! assert_eq!(config.timeout, Duration::from_secs(30));
//! ```
//!
//! Keys are built by plain concatenation: global prefix, then the prefixes of
//! enclosing nested records, then the field's key name (the annotation name,
//! or the field name in `UPPER_SNAKE_CASE`).

use crate::decode::Decode;
use crate::error::BindError;
use crate::lookup::{EnvLookup, Lookup};
use crate::naming::to_upper_snake;
use crate::tag::FieldTag;
use std::sync::Arc;
use tracing::{debug, trace};

/// Settings shared by [`bind_with`] and [`expand`](crate::expand::expand)
#[derive(Clone)]
pub struct Options {
    prefix: String,
    lookup: Arc<dyn Lookup>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            lookup: Arc::new(EnvLookup),
        }
    }
}

impl Options {
    /// Prefix prepended to every looked-up key (builder pattern)
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Replace the default environment lookup (builder pattern)
    pub fn with_lookup<L: Lookup + 'static>(mut self, lookup: L) -> Self {
        self.lookup = Arc::new(lookup);
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Look up `key` exactly as given (no prefix applied)
    pub fn lookup(&self, key: &str) -> Option<String> {
        self.lookup.lookup(key)
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

/// A record whose fields can be populated by a [`Binder`].
///
/// Implementations call [`Binder::field`] for leaf values and
/// [`Binder::nested`] for nested records, in declaration order.
pub trait Bind {
    fn bind_fields(&mut self, binder: &mut Binder<'_>) -> Result<(), BindError>;
}

/// Walks a record, tracking the current key prefix and field path
pub struct Binder<'a> {
    lookup: &'a dyn Lookup,
    prefix: String,
    path: Vec<String>,
}

impl<'a> Binder<'a> {
    pub fn new(options: &'a Options) -> Self {
        Self {
            lookup: options.lookup.as_ref(),
            prefix: options.prefix.clone(),
            path: Vec::new(),
        }
    }

    /// Prefix applied to keys at the current nesting level
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Bind a leaf value.
    ///
    /// Absent keys fall back to `default`, fail when `required`, and otherwise
    /// leave `target` untouched. A present but empty value is replaced by a
    /// non-empty `default`.
    pub fn field<T: Decode>(&mut self, field: &str, tag: &str, target: &mut T) -> Result<(), BindError> {
        let tag = self.parse_tag(field, tag)?;
        if tag.skip {
            return Ok(());
        }

        let key = format!("{}{}", self.prefix, key_name(field, &tag));
        let raw = match (self.lookup.lookup(&key), tag.default_value()) {
            (None, Some(default)) => {
                debug!(key = %key, field = %self.qualified(field), source = "default", "Bound configuration key");
                default.to_string()
            }
            (None, None) if tag.required => {
                return Err(BindError::MissingKey {
                    field: self.qualified(field),
                    key,
                });
            }
            (None, None) => {
                trace!(key = %key, field = %self.qualified(field), "Configuration key not set, keeping current value");
                return Ok(());
            }
            (Some(value), Some(default)) if value.is_empty() => {
                debug!(key = %key, field = %self.qualified(field), source = "default", "Bound configuration key");
                default.to_string()
            }
            (Some(value), _) => {
                debug!(key = %key, field = %self.qualified(field), source = "lookup", "Bound configuration key");
                value
            }
        };

        *target = T::decode(&raw, &tag).map_err(|source| BindError::Decode {
            field: self.qualified(field),
            key,
            source,
        })?;
        Ok(())
    }

    /// Bind a nested record.
    ///
    /// Keys below it are prefixed with the `prefix` option, or with the
    /// field's key name and `_`. With `inline` the current prefix is reused.
    pub fn nested<T: Bind>(&mut self, field: &str, tag: &str, target: &mut T) -> Result<(), BindError> {
        let tag = self.parse_tag(field, tag)?;
        if tag.skip {
            return Ok(());
        }

        let nested_prefix = if tag.inline {
            self.prefix.clone()
        } else {
            match &tag.prefix {
                Some(prefix) => format!("{}{}", self.prefix, prefix),
                None => format!("{}{}_", self.prefix, key_name(field, &tag)),
            }
        };

        let saved = std::mem::replace(&mut self.prefix, nested_prefix);
        self.path.push(field.to_string());
        let result = target.bind_fields(self);
        self.path.pop();
        self.prefix = saved;
        result
    }

    /// Bind an optional nested record, allocating it first when absent
    pub fn nested_opt<T: Bind + Default>(
        &mut self,
        field: &str,
        tag: &str,
        target: &mut Option<T>,
    ) -> Result<(), BindError> {
        let record = target.get_or_insert_with(T::default);
        self.nested(field, tag, record)
    }

    fn parse_tag(&self, field: &str, tag: &str) -> Result<FieldTag, BindError> {
        FieldTag::parse(tag).map_err(|source| BindError::Tag {
            field: self.qualified(field),
            source,
        })
    }

    fn qualified(&self, field: &str) -> String {
        if self.path.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", self.path.join("."), field)
        }
    }
}

fn key_name(field: &str, tag: &FieldTag) -> String {
    if tag.name.is_empty() {
        to_upper_snake(field)
    } else {
        tag.name.clone()
    }
}

/// Populate `target` from the process environment
pub fn bind<T: Bind>(target: &mut T) -> Result<(), BindError> {
    bind_with(target, &Options::default())
}

/// Populate `target` using the given prefix and lookup
pub fn bind_with<T: Bind>(target: &mut T, options: &Options) -> Result<(), BindError> {
    let mut binder = Binder::new(options);
    target.bind_fields(&mut binder)
}

/// Implement [`Bind`] for a struct by listing its fields with their annotations.
///
/// Each entry is `field: "annotation"`; prefix it with `nested` for a field
/// that is itself a bindable record, or `optional` for an `Option` of one.
/// Fields not listed are never touched.
///
/// ```
/// #[derive(Default)]
/// struct Proxy { host: String }
/// svckit::bindable!(Proxy { host: "" });
///
/// #[derive(Default)]
/// struct Config { name: String, proxy: Proxy, fallback: Option<Proxy> }
/// svckit::bindable!(Config {
///     name: "SERVICE_NAME,default:api",
///     nested proxy: ",prefix:HTTP_PROXY_",
///     optional fallback: "",
/// });
/// ```
#[macro_export]
macro_rules! bindable {
    (@fields $this:ident $binder:ident) => {};
    (@fields $this:ident $binder:ident nested $field:ident : $tag:literal $(, $($rest:tt)*)?) => {
        $binder.nested(stringify!($field), $tag, &mut $this.$field)?;
        $crate::bindable!(@fields $this $binder $($($rest)*)?);
    };
    (@fields $this:ident $binder:ident optional $field:ident : $tag:literal $(, $($rest:tt)*)?) => {
        $binder.nested_opt(stringify!($field), $tag, &mut $this.$field)?;
        $crate::bindable!(@fields $this $binder $($($rest)*)?);
    };
    (@fields $this:ident $binder:ident $field:ident : $tag:literal $(, $($rest:tt)*)?) => {
        $binder.field(stringify!($field), $tag, &mut $this.$field)?;
        $crate::bindable!(@fields $this $binder $($($rest)*)?);
    };
    ($ty:ty { $($body:tt)* }) => {
        impl $crate::binder::Bind for $ty {
            fn bind_fields(
                &mut self,
                binder: &mut $crate::binder::Binder<'_>,
            ) -> ::std::result::Result<(), $crate::error::BindError> {
                $crate::bindable!(@fields self binder $($body)*);
                Ok(())
            }
        }
    };
}

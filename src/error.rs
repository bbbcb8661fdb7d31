//! Error types for the binder, the expander and the container

use std::error::Error as StdError;
use std::sync::Arc;
use thiserror::Error;

/// Shared, cloneable error produced by a provider.
pub type ProviderFailure = Arc<dyn StdError + Send + Sync + 'static>;

/// Errors raised while parsing a field annotation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    /// Option key is not one of the recognized options
    #[error("unknown option {0:?}")]
    UnknownOption(String),
    /// Same option appears twice in one annotation
    #[error("duplicate option {0:?}")]
    DuplicateOption(String),
    /// Quoted value never closed
    #[error("unterminated quote in {0:?}")]
    UnterminatedQuote(String),
    /// Option that needs a value was given as a bare flag
    #[error("option {0:?} requires a value")]
    MissingValue(String),
}

/// Errors raised while turning a raw string into a typed value
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Value does not have the expected shape
    #[error("cannot parse {value:?} as {expected}: {reason}")]
    Invalid {
        value: String,
        expected: &'static str,
        reason: String,
    },
    /// `unit` option not recognized for this field type
    #[error("unknown unit {0:?}")]
    UnknownUnit(String),
    /// `format` option not recognized for this field type
    #[error("unknown format {0:?}")]
    UnknownFormat(String),
    /// Error reported by a user-supplied decoder
    #[error(transparent)]
    Custom(Box<dyn StdError + Send + Sync + 'static>),
}

impl DecodeError {
    pub fn invalid(value: &str, expected: &'static str, reason: impl ToString) -> Self {
        DecodeError::Invalid {
            value: value.to_string(),
            expected,
            reason: reason.to_string(),
        }
    }

    /// Wrap an arbitrary error from a custom decoder
    pub fn custom<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        DecodeError::Custom(err.into())
    }
}

/// Errors returned by [`bind`](crate::binder::bind)
#[derive(Debug, Error)]
pub enum BindError {
    /// Annotation on a field could not be parsed
    #[error("invalid annotation on field {field}: {source}")]
    Tag {
        field: String,
        #[source]
        source: TagError,
    },
    /// Required key absent and no default configured
    #[error("required key {key} is not set (field {field})")]
    MissingKey { field: String, key: String },
    /// Value for a key was rejected by the field's decoder
    #[error("failed to decode field {field} from key {key}: {source}")]
    Decode {
        field: String,
        key: String,
        #[source]
        source: DecodeError,
    },
}

impl BindError {
    /// Name of the field the error is about
    pub fn field(&self) -> &str {
        match self {
            BindError::Tag { field, .. }
            | BindError::MissingKey { field, .. }
            | BindError::Decode { field, .. } => field,
        }
    }

    /// Lookup key involved, if the error got as far as building one
    pub fn key(&self) -> Option<&str> {
        match self {
            BindError::Tag { .. } => None,
            BindError::MissingKey { key, .. } | BindError::Decode { key, .. } => Some(key),
        }
    }
}

/// Errors returned by [`expand`](crate::expand::expand)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpandError {
    /// `${` without a closing `}`
    #[error("syntax error at offset {position}: unterminated \"${{\"")]
    Syntax { position: usize },
    /// Referenced key is not present in the lookup
    #[error("undefined variable {key:?}")]
    UndefinedVariable { key: String },
}

/// Returned by [`Container::try_bind`](crate::container::Container::try_bind)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("slot {slot} is already bound")]
pub struct AlreadyBound {
    pub slot: String,
}

/// Errors returned when resolving a slot from a [`Container`](crate::container::Container)
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// No provider registered for the slot
    #[error("no provider bound for slot {slot}")]
    Unbound { slot: String },
    /// Slot is already being resolved further up the current path
    #[error("circular dependency detected while resolving slot {slot} (path: {path})")]
    Cycle { slot: String, path: String },
    /// Provider panicked
    #[error("panic during provider call for slot {slot}: {detail}")]
    ProviderPanic { slot: String, detail: String },
    /// Provider returned an error
    #[error("provider for slot {slot} failed: {source}")]
    Provider {
        slot: String,
        #[source]
        source: ProviderFailure,
    },
    /// Scoped slot resolved from a carrier that has no scope attached
    #[error("no scope available for slot {slot}")]
    ScopeMissing { slot: String },
    /// Carrier was cancelled before the provider could finish
    #[error("resolution of slot {slot} cancelled")]
    Cancelled { slot: String },
}

impl ResolveError {
    /// Tag of the slot this error is reported against
    pub fn slot(&self) -> &str {
        match self {
            ResolveError::Unbound { slot }
            | ResolveError::Cycle { slot, .. }
            | ResolveError::ProviderPanic { slot, .. }
            | ResolveError::Provider { slot, .. }
            | ResolveError::ScopeMissing { slot }
            | ResolveError::Cancelled { slot } => slot,
        }
    }

    /// True when this error, or any provider failure it wraps, is a cycle
    pub fn is_cycle(&self) -> bool {
        match self {
            ResolveError::Cycle { .. } => true,
            ResolveError::Provider { source, .. } => source
                .downcast_ref::<ResolveError>()
                .map(ResolveError::is_cycle)
                .unwrap_or_else(|| source.to_string().contains("circular dependency")),
            _ => false,
        }
    }
}

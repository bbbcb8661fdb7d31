//! svckit - building blocks for configuring and wiring services
//!
//! This library provides:
//! - A configuration binder that fills typed records from environment
//!   variables (or any other key/value lookup) driven by per-field annotations
//! - A `$VAR` / `${VAR}` template expander over the same lookups
//! - A slot-based dependency container with singleton, transient and scoped
//!   lifetimes, cycle detection and provider panic isolation
//! - Small runtime helpers: logger setup, round-robin selection, jittered
//!   delays, port probing and a graceful-shutdown task runner

pub mod binder;
pub mod container;
pub mod decode;
pub mod duration;
pub mod error;
pub mod expand;
pub mod jitter;
pub mod lifecycle;
pub mod logging;
pub mod lookup;
pub mod naming;
pub mod ports;
pub mod rotor;
pub mod scope;
pub mod slot;
pub mod tag;

pub use binder::{bind, bind_with, Bind, Binder, Options};
pub use container::{Container, Nullable, Strategy};
pub use decode::Decode;
pub use error::{AlreadyBound, BindError, DecodeError, ExpandError, ResolveError, TagError};
pub use expand::expand;
pub use lookup::{Chain, EnvLookup, Lookup, MapLookup, TomlLookup};
pub use scope::{new_scope, Carrier};
pub use slot::{new_slot, Slot};

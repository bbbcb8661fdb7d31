//! Key/value sources consulted by the binder and the expander
//!
//! A [`Lookup`] answers "what is the value of `KEY`?" with `Some(value)` when
//! the key is present (possibly empty) and `None` when it is absent.

use crate::naming::to_upper_snake;
use anyhow::Context;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// A pure, thread-safe key lookup
pub trait Lookup: Send + Sync {
    fn lookup(&self, key: &str) -> Option<String>;
}

impl<F> Lookup for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn lookup(&self, key: &str) -> Option<String> {
        self(key)
    }
}

/// Reads the process environment.
///
/// A variable that is set but not valid UTF-8 is still present; invalid
/// sequences are replaced with `U+FFFD`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvLookup;

impl Lookup for EnvLookup {
    fn lookup(&self, key: &str) -> Option<String> {
        let raw = std::env::var_os(key)?;
        match raw.into_string() {
            Ok(value) => Some(value),
            Err(raw) => {
                warn!(key = %key, "Environment variable is not valid UTF-8, decoding lossily");
                Some(raw.to_string_lossy().into_owned())
            }
        }
    }
}

/// Fixed set of key/value pairs
#[derive(Debug, Clone, Default)]
pub struct MapLookup {
    values: HashMap<String, String>,
}

impl MapLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a key (builder pattern)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for MapLookup
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl From<HashMap<String, String>> for MapLookup {
    fn from(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

impl Lookup for MapLookup {
    fn lookup(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// TOML document flattened into `UPPER_SNAKE` keys.
///
/// Tables contribute a `NAME_` prefix to the keys below them, arrays of
/// scalars are joined with `,`:
///
/// ```toml
/// roles = ["admin", "ops"]     # ROLES=admin,ops
///
/// [http_proxy]
/// host = "p.example"           # HTTP_PROXY_HOST=p.example
/// ```
#[derive(Debug, Clone, Default)]
pub struct TomlLookup {
    values: HashMap<String, String>,
}

impl TomlLookup {
    /// Parse TOML source text
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        let table: toml::Table = toml::from_str(content)?;
        let mut values = HashMap::new();
        flatten_table("", &table, &mut values);
        Ok(Self { values })
    }

    /// Read and parse a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Flattened keys, in no particular order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl Lookup for TomlLookup {
    fn lookup(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

fn flatten_table(prefix: &str, table: &toml::Table, out: &mut HashMap<String, String>) {
    for (name, value) in table {
        let key = format!("{}{}", prefix, to_upper_snake(&name.replace('-', "_")));
        match value {
            toml::Value::Table(nested) => flatten_table(&format!("{}_", key), nested, out),
            toml::Value::Array(items) => {
                let parts: Vec<String> = items.iter().filter_map(render_scalar).collect();
                out.insert(key, parts.join(","));
            }
            scalar => {
                if let Some(rendered) = render_scalar(scalar) {
                    out.insert(key, rendered);
                }
            }
        }
    }
}

fn render_scalar(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        toml::Value::Datetime(dt) => Some(dt.to_string()),
        toml::Value::Array(_) | toml::Value::Table(_) => None,
    }
}

/// Consults several lookups in order; the first one holding the key wins
#[derive(Clone, Default)]
pub struct Chain {
    sources: Vec<Arc<dyn Lookup>>,
}

impl Chain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a lower-priority source (builder pattern)
    pub fn with<L: Lookup + 'static>(mut self, source: L) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl Lookup for Chain {
    fn lookup(&self, key: &str) -> Option<String> {
        self.sources.iter().find_map(|source| source.lookup(key))
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("sources", &self.sources.len())
            .finish()
    }
}

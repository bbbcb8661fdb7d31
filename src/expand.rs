//! `$`-substitution against the same lookup the binder uses
//!
//! - `${KEY}` is replaced by the value of `KEY`
//! - `$KEY` (letters, digits and `_`, not starting with a digit) likewise
//! - `$$` yields a single `$`
//! - any other `$` is copied through unchanged

use crate::binder::Options;
use crate::error::ExpandError;
use tracing::trace;

/// Expand `template` using the lookup and prefix from `options`.
///
/// ```
/// use svckit::binder::Options;
/// use svckit::expand::expand;
/// use svckit::lookup::MapLookup;
///
/// let options = Options::default().with_lookup(MapLookup::new().with("HOST", "db"));
/// assert_eq!(expand("pg://${HOST}:$$5432", &options).unwrap(), "pg://db:$5432");
/// ```
pub fn expand(template: &str, options: &Options) -> Result<String, ExpandError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(dollar) = rest.find('$') {
        out.push_str(&rest[..dollar]);
        let after = &rest[dollar + 1..];

        if let Some(tail) = after.strip_prefix('$') {
            out.push('$');
            rest = tail;
        } else if let Some(body) = after.strip_prefix('{') {
            let Some(close) = body.find('}') else {
                return Err(ExpandError::Syntax {
                    position: template.len() - rest.len() + dollar,
                });
            };
            out.push_str(&substitute(&body[..close], options)?);
            rest = &body[close + 1..];
        } else {
            let len = identifier_len(after);
            if len == 0 {
                out.push('$');
            } else {
                out.push_str(&substitute(&after[..len], options)?);
            }
            rest = &after[len..];
        }
    }

    out.push_str(rest);
    Ok(out)
}

fn substitute(name: &str, options: &Options) -> Result<String, ExpandError> {
    let key = format!("{}{}", options.prefix(), name);
    match options.lookup(&key) {
        Some(value) => {
            trace!(key = %key, "Expanded variable");
            Ok(value)
        }
        None => Err(ExpandError::UndefinedVariable { key }),
    }
}

fn identifier_len(s: &str) -> usize {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return 0,
    }
    chars
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

//! Key derivation from field names

/// Convert an identifier to `UPPER_SNAKE_CASE`.
///
/// A separator is inserted at lower→upper and lower→digit boundaries, and
/// before the last capital of an acronym that is followed by a lowercase
/// letter (`APIService` → `API_SERVICE`). Existing underscores are kept, so
/// snake-case field names simply upper-case.
pub fn to_upper_snake(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if i > 0 && !out.ends_with('_') && c != '_' {
            let prev = chars[i - 1];
            let next = chars.get(i + 1).copied();

            let lower_to_upper = prev.is_lowercase() && c.is_uppercase();
            let lower_to_digit = prev.is_lowercase() && c.is_ascii_digit();
            let acronym_end = prev.is_uppercase()
                && c.is_uppercase()
                && next.is_some_and(|n| n.is_lowercase());

            if lower_to_upper || lower_to_digit || acronym_end {
                out.push('_');
            }
        }
        out.extend(c.to_uppercase());
    }

    out
}

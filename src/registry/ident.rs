//! Variable-name validation.
//!
//! Variable names must be identifier-shaped so they survive template
//! substitution and condition parsing: ASCII letter or underscore first,
//! ASCII alphanumerics or underscores after.

/// Whether `name` is a usable variable identifier.
pub fn is_valid_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Coerce `name` into a valid identifier, or fall back.
///
/// Invalid characters are replaced with underscores; a leading digit gets
/// an underscore prefix. A name with nothing salvageable yields `fallback`.
pub fn sanitize_variable_name(name: &str, fallback: &str) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return fallback.to_string();
    }

    let mut out = String::with_capacity(trimmed.len());
    for c in trimmed.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else {
            out.push('_');
        }
    }

    if out.chars().all(|c| c == '_') {
        return fallback.to_string();
    }
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        // A purely numeric name carries no identifier content to keep.
        if out.chars().all(|c| c.is_ascii_digit()) {
            return fallback.to_string();
        }
        out.insert(0, '_');
    }
    out
}

//! Canonical column names for headers with no configured mapping

use super::error::MappingError;

/// Sanitize a header into a warehouse-compatible name.
///
/// Lowercases, replaces anything outside `[a-z0-9_]` with `_`, collapses
/// runs of `_`, strips leading and trailing `_`, and prefixes `_` when the
/// result starts with a digit. The function is idempotent.
pub fn sanitize(header: &str) -> String {
    let mut out = String::with_capacity(header.len());
    for c in header.to_lowercase().chars() {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    let trimmed = out.trim_matches('_');
    if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{}", trimmed)
    } else {
        trimmed.to_string()
    }
}

/// Sanitize, rejecting headers that leave nothing behind
pub fn sanitize_header(header: &str) -> Result<String, MappingError> {
    let name = sanitize(header);
    if name.is_empty() {
        return Err(MappingError {
            header: header.to_string(),
        });
    }
    Ok(name)
}

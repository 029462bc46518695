//! Tenant identifier normalization and storage locator derivation.

use std::sync::LazyLock;

use regex::Regex;

static NON_ALPHANUMERIC_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("static pattern compiles"));

/// Normalizes free text (typically a display name) into a tenant identifier.
///
/// Lowercases the input, collapses every run of non-alphanumeric characters
/// into a single `-`, and trims `-` from both ends. Returns `None` when no
/// ASCII alphanumeric character survives.
///
/// ```
/// use coursegate_core::slug::normalize_identifier;
///
/// assert_eq!(normalize_identifier("Hope For All  NGO!").as_deref(), Some("hope-for-all-ngo"));
/// assert_eq!(normalize_identifier("  ---  "), None);
/// ```
#[must_use]
pub fn normalize_identifier(input: &str) -> Option<String> {
    let lowered = input.to_lowercase();
    let collapsed = NON_ALPHANUMERIC_RUN.replace_all(&lowered, "-");
    let trimmed = collapsed.trim_matches('-');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Derives the physical store name for a tenant: `prefix` + identifier with
/// `-` replaced by `_`, which is safe as a database or file name.
#[must_use]
pub fn derive_storage_locator(prefix: &str, tenant_id: &str) -> String {
    format!("{prefix}{}", tenant_id.replace('-', "_"))
}

//! Item directory names.

use std::collections::HashSet;

use chrono::NaiveDate;

use crate::identity::{sanitize_handle, IdentityError};

/// Characters of the item name kept in `{name}`.
const NAME_LEN: usize = 30;

/// Characters of the item id used as collision suffix.
const SUFFIX_LEN: usize = 4;

fn safe_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .take(NAME_LEN)
        .collect()
}

/// Render the naming pattern for one item into a directory name.
///
/// Falls back to the item id when nothing usable is left.
pub fn render_location(pattern: &str, category: &str, name: &str, id: &str, date: NaiveDate) -> String {
    let rendered = pattern
        .replace("{category}", category)
        .replace("{name}", &safe_name(name))
        .replace("{id}", id)
        .replace("{date}", &date.format("%Y%m%d").to_string());

    let handle = sanitize_handle(&rendered);
    if handle.is_empty() {
        sanitize_handle(id)
    } else {
        handle
    }
}

/// Pick `candidate` or, if it is taken, one suffixed fallback.
///
/// The chosen name is added to `taken`.
pub fn assign_location(
    taken: &mut HashSet<String>,
    candidate: String,
    id: &str,
) -> Result<String, IdentityError> {
    if taken.insert(candidate.clone()) {
        return Ok(candidate);
    }

    let suffix: String = sanitize_handle(id).chars().take(SUFFIX_LEN).collect();
    let fallback = format!("{}_{}", candidate, suffix);
    if taken.insert(fallback.clone()) {
        return Ok(fallback);
    }

    Err(IdentityError::Collision {
        desired: candidate,
        fallback,
    })
}

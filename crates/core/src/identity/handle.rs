use uuid::Uuid;

/// Longest handle produced by [`sanitize_handle`].
pub const MAX_HANDLE_LEN: usize = 64;

/// Turns free text into a single safe path component.
///
/// Keeps ASCII alphanumerics, `_` and `-`; everything else becomes `_`.
/// Runs of `_` collapse and leading/trailing `_` are trimmed. Returns an
/// empty string when nothing usable remains.
pub fn sanitize_handle(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.trim().chars() {
        let c = if c.is_ascii_alphanumeric() || c == '-' {
            c.to_ascii_lowercase()
        } else {
            '_'
        };
        if c == '_' && (out.is_empty() || out.ends_with('_')) {
            continue;
        }
        out.push(c);
    }

    let mut handle: String = out.chars().take(MAX_HANDLE_LEN).collect();
    while handle.ends_with('_') {
        handle.pop();
    }
    handle
}

/// Fresh 8 character identifier for temporary job handles, items and batches.
pub fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

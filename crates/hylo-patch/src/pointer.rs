//! RFC 6901 JSON Pointer handling

use crate::error::{PatchError, Result};

/// Split a pointer into unescaped reference tokens
///
/// The empty pointer refers to the whole document and yields no tokens.
pub(crate) fn split(pointer: &str) -> Result<Vec<String>> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    if !pointer.starts_with('/') {
        return Err(PatchError::InvalidPointer(pointer.to_string()));
    }
    Ok(pointer[1..].split('/').map(unescape).collect())
}

/// Escape a token for embedding in a pointer
pub(crate) fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn unescape(token: &str) -> String {
    // Order matters: `~1` first, so `~01` decodes to `~1` and not `/`
    token.replace("~1", "/").replace("~0", "~")
}

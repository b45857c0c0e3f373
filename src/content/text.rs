use super::{read_prefix, truncate_text, Adapted, CONTENT_CHAR_LIMIT};
use crate::error::ExtractError;
use std::path::Path;

/// UTF-8 needs at most four bytes per char
const PREFIX_BYTES: u64 = 4 * CONTENT_CHAR_LIMIT as u64;

/// Plain text read directly; invalid UTF-8 is replaced, not rejected
pub(super) fn adapt(path: &Path) -> Result<Adapted, ExtractError> {
    let bytes = read_prefix(path, PREFIX_BYTES)?;
    let text = String::from_utf8_lossy(&bytes);
    let text = truncate_text(&text);

    tracing::debug!(
        "[Content] Direct read: {} chars from {}",
        text.chars().count(),
        path.display()
    );

    Ok(Adapted {
        text: Some(text),
        working_copy: None,
    })
}

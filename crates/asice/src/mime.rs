//! Entry MIME type detection from file names.

use crate::error::AsicError;

/// MIME type for `name`, judged by its extension.
pub fn detect(name: &str) -> Result<String, AsicError> {
    mime_guess::from_path(name)
        .first()
        .map(|mime| mime.essence_str().to_string())
        .ok_or_else(|| AsicError::UnknownMimeType(name.to_string()))
}

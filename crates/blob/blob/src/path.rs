use crate::error::BlobError;

fn check_segments(path: &str) -> Result<(), BlobError> {
    for segment in path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\0') {
            return Err(BlobError::InvalidPath(path.to_owned()));
        }
    }
    Ok(())
}

/// Validate a blob path: `/`-separated, non-empty segments, no `.` or `..`.
///
/// # Errors
///
/// Returns [`BlobError::InvalidPath`] if the path is malformed.
pub fn validate_path(path: &str) -> Result<(), BlobError> {
    if path.is_empty() {
        return Err(BlobError::InvalidPath(path.to_owned()));
    }
    check_segments(path)
}

/// Validate a listing prefix. The empty prefix denotes the root.
///
/// # Errors
///
/// Returns [`BlobError::InvalidPath`] if the prefix is malformed.
pub fn validate_prefix(prefix: &str) -> Result<(), BlobError> {
    if prefix.is_empty() {
        return Ok(());
    }
    check_segments(prefix)
}

/// The last segment of a path.
#[must_use]
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

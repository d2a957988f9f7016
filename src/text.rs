//! text
//!
//! Byte decoding policy shared by every parser in the crate.
//!
//! Git output has no single declared encoding: field lines are ASCII, but
//! commit messages and archived file content carry whatever bytes the
//! author wrote. Decoding tries strict UTF-8 first and falls back to
//! Latin-1, which maps every byte to a scalar and therefore cannot fail.
//!
//! Walks over commit metadata always use the lenient policy so one odd
//! message cannot kill a long extraction; explicit file-text access lets
//! the caller pick [`TextMode::Strict`] when mis-decoded content would be
//! worse than an error.

use crate::error::{Error, Result};

/// How to treat bytes that are not valid UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextMode {
    /// Invalid UTF-8 is an [`Error::Encoding`].
    Strict,
    /// Invalid UTF-8 falls back to Latin-1.
    #[default]
    Lenient,
}

/// Decode bytes, falling back to Latin-1 when they are not valid UTF-8.
///
/// Total: every byte sequence decodes to something.
pub fn decode_lossy(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => latin1(bytes),
    }
}

/// Decode bytes as UTF-8, failing on invalid sequences.
pub fn decode_strict(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| Error::Encoding(format!("invalid utf-8 at byte {}", e.valid_up_to())))
}

/// Decode bytes under the given mode.
pub fn decode(bytes: &[u8], mode: TextMode) -> Result<String> {
    match mode {
        TextMode::Strict => decode_strict(bytes),
        TextMode::Lenient => Ok(decode_lossy(bytes)),
    }
}

/// Latin-1: each byte is the Unicode scalar with the same value.
fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

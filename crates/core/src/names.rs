//! Filename handling for uploads and lookups.
//!
//! Uploaded names are reduced to their final path component before they touch
//! the upload directory, so a client can never choose where bytes land. Names
//! arriving in request paths are query-unescaped before catalog lookup.

use crate::constants::{STAGING_PREFIX, STAGING_SUFFIX};
use crate::{FileShareError, FileShareResult};

/// Reduce a client-supplied filename to a safe base name.
///
/// Both `/` and `\` are treated as separators and trailing separators are
/// ignored, so `"dir/report.pdf"`, `"C:\\tmp\\report.pdf"` and
/// `"report.pdf/"` all become `"report.pdf"`.
///
/// # Errors
///
/// Returns [`FileShareError::InvalidName`] if nothing usable remains (empty,
/// `.`, `..`, only separators), the name contains a NUL byte, or it looks like
/// an in-progress upload.
pub fn sanitize_filename(raw: &str) -> FileShareResult<String> {
    let trimmed = raw.trim_end_matches(['/', '\\']);
    let base = trimmed.rsplit(['/', '\\']).next().unwrap_or("");

    if base.is_empty()
        || base == "."
        || base == ".."
        || base.contains('\0')
        || is_staging_name(base)
    {
        return Err(FileShareError::InvalidName(raw.to_string()));
    }

    Ok(base.to_string())
}

/// Insert `stamp` between a filename's stem and extension.
///
/// `report.pdf` becomes `report_<stamp>.pdf`; names without an extension (or
/// dotfiles like `.env`) get the stamp appended.
pub fn disambiguate(filename: &str, stamp: i64) -> String {
    match filename.rfind('.') {
        Some(dot) if dot > 0 => {
            let (stem, ext) = filename.split_at(dot);
            format!("{stem}_{stamp}{ext}")
        }
        _ => format!("{filename}_{stamp}"),
    }
}

/// Nanosecond timestamp used for disambiguation.
pub fn disambiguation_stamp() -> i64 {
    let now = chrono::Utc::now();
    now.timestamp_nanos_opt()
        .unwrap_or_else(|| now.timestamp_micros().saturating_mul(1_000))
}

/// Name of the file an upload is staged in before it is given its final name.
pub fn staging_name(stamp: i64, seq: u64) -> String {
    format!("{STAGING_PREFIX}{stamp}-{seq}{STAGING_SUFFIX}")
}

pub fn is_staging_name(name: &str) -> bool {
    name.starts_with(STAGING_PREFIX) && name.ends_with(STAGING_SUFFIX)
}

/// Decode a filename taken from a request path.
///
/// Follows query-unescape rules: `+` is a space and `%XX` is a byte.
///
/// # Errors
///
/// Returns [`FileShareError::InvalidName`] if a `%` is not followed by two hex
/// digits or the decoded bytes are not UTF-8.
pub fn decode_requested_name(raw: &str) -> FileShareResult<String> {
    if !has_valid_escapes(raw) {
        return Err(FileShareError::InvalidName(raw.to_string()));
    }

    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| FileShareError::InvalidName(raw.to_string()))
}

fn has_valid_escapes(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            i += 1;
            continue;
        }
        let hex_pair = bytes.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
            && bytes.get(i + 2).is_some_and(u8::is_ascii_hexdigit);
        if !hex_pair {
            return false;
        }
        i += 3;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_keeps_plain_name() {
        assert_eq!(sanitize_filename("a.txt").unwrap(), "a.txt");
        assert_eq!(sanitize_filename("my report v2.pdf").unwrap(), "my report v2.pdf");
    }

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_filename("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_filename("/abs/path/x.bin").unwrap(), "x.bin");
        assert_eq!(sanitize_filename("C:\\Users\\me\\x.bin").unwrap(), "x.bin");
        assert_eq!(sanitize_filename("dir/name/").unwrap(), "name");
    }

    #[test]
    fn test_sanitize_rejects_traversal_and_empty() {
        for raw in ["", ".", "..", "/", "//", "\\", "a/..", "../", "x/./", "nul\0.txt"] {
            assert!(
                matches!(sanitize_filename(raw), Err(FileShareError::InvalidName(_))),
                "expected {raw:?} to be rejected"
            );
        }
    }

    #[test]
    fn test_sanitized_names_never_contain_separators() {
        let inputs = [
            "a/b/c.txt",
            "a\\b\\c.txt",
            "..\\..\\win.ini",
            "./hidden/.env",
            "weird/\\mix/\\name",
        ];
        for raw in inputs {
            let name = sanitize_filename(raw).unwrap();
            assert!(!name.is_empty());
            assert_ne!(name, ".");
            assert!(!name.contains('/') && !name.contains('\\'), "{name}");
        }
    }

    #[test]
    fn test_disambiguate_inserts_before_extension() {
        assert_eq!(disambiguate("report.pdf", 42), "report_42.pdf");
        assert_eq!(disambiguate("archive.tar.gz", 7), "archive.tar_7.gz");
    }

    #[test]
    fn test_disambiguate_without_extension() {
        assert_eq!(disambiguate("README", 42), "README_42");
        assert_eq!(disambiguate(".env", 42), ".env_42");
    }

    #[test]
    fn test_disambiguation_stamp_increases() {
        let first = disambiguation_stamp();
        let second = disambiguation_stamp();
        assert!(first > 0);
        assert!(second >= first);
    }

    #[test]
    fn test_decode_requested_name() {
        assert_eq!(decode_requested_name("a.txt").unwrap(), "a.txt");
        assert_eq!(decode_requested_name("my%20file.txt").unwrap(), "my file.txt");
        assert_eq!(decode_requested_name("my+file.txt").unwrap(), "my file.txt");
        assert_eq!(decode_requested_name("c%2B%2B.txt").unwrap(), "c++.txt");
        assert_eq!(decode_requested_name("caf%C3%A9.txt").unwrap(), "café.txt");
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        assert!(matches!(
            decode_requested_name("bad%FF.txt"),
            Err(FileShareError::InvalidName(_))
        ));
    }

    #[test]
    fn test_decode_rejects_malformed_escapes() {
        for raw in ["bad%zz.txt", "trailing%", "short%4", "%G1.txt", "mixed%20%2"] {
            assert!(
                matches!(decode_requested_name(raw), Err(FileShareError::InvalidName(_))),
                "expected {raw:?} to be rejected"
            );
        }
        assert_eq!(decode_requested_name("100%25.txt").unwrap(), "100%.txt");
    }

    #[test]
    fn test_staging_names_are_recognised_and_refused() {
        let staged = staging_name(42, 7);
        assert!(is_staging_name(&staged));
        assert!(!is_staging_name("report.part"));
        assert!(matches!(
            sanitize_filename(&format!("dir/{staged}")),
            Err(FileShareError::InvalidName(_))
        ));
    }
}

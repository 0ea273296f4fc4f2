//! Encoding label resolution and decoding.

use std::borrow::Cow;
use std::path::Path;

use encoding_rs::{EUC_KR, Encoding};

use crate::error::{IngestError, Result};

/// Resolves an encoding label such as `utf-8`, `cp949` or `euc-kr`.
///
/// Labels follow the WHATWG registry, plus the Windows code page names for
/// Korean that hospital systems commonly report.
pub fn resolve_encoding(label: &str) -> Result<&'static Encoding> {
    let normalized = label.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "cp949" | "ms949" | "uhc" => return Ok(EUC_KR),
        _ => {}
    }
    Encoding::for_label(normalized.as_bytes()).ok_or_else(|| IngestError::UnknownEncoding {
        label: label.to_string(),
    })
}

/// Decodes file bytes, stripping a BOM when present.
///
/// Malformed sequences are replaced rather than rejected; a warning names
/// the file so the operator can fix the configured encoding.
pub fn decode_bytes<'a>(bytes: &'a [u8], encoding: &'static Encoding, path: &Path) -> Cow<'a, str> {
    let (text, used, had_errors) = encoding.decode(bytes);
    if had_errors {
        tracing::warn!(
            path = %path.display(),
            encoding = used.name(),
            "replaced malformed byte sequences while decoding"
        );
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn korean_code_page_aliases() {
        assert_eq!(resolve_encoding("CP949").unwrap(), EUC_KR);
        assert_eq!(resolve_encoding("euc-kr").unwrap(), EUC_KR);
        assert_eq!(resolve_encoding("utf-8").unwrap(), encoding_rs::UTF_8);
    }

    #[test]
    fn unknown_label() {
        let err = resolve_encoding("klingon").unwrap_err();
        assert_eq!(err.to_string(), "unknown encoding 'klingon'");
    }

    #[test]
    fn decode_strips_bom() {
        let text = decode_bytes(b"\xEF\xBB\xBFa,b", encoding_rs::UTF_8, Path::new("x.csv"));
        assert_eq!(text, "a,b");
    }
}

//! Response text normalization.
//!
//! WHOIS servers answer in whatever encoding the registry happens to use.
//! A byte order mark decides when present. Otherwise strict UTF-8 is tried,
//! then GB18030 (a superset of GBK, common for Chinese registries), and
//! finally Windows-1252, which accepts any byte sequence.

use encoding_rs::{Encoding, GB18030, UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};

/// Which candidate produced the decoded text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf16Le,
    Utf16Be,
    Gb18030,
    Latin1,
}

impl TextEncoding {
    pub fn is_unicode(self) -> bool {
        matches!(self, Self::Utf8 | Self::Utf16Le | Self::Utf16Be)
    }

    fn from_bom(encoding: &'static Encoding) -> Self {
        if encoding == UTF_16LE {
            Self::Utf16Le
        } else if encoding == UTF_16BE {
            Self::Utf16Be
        } else {
            Self::Utf8
        }
    }
}

/// Decodes a raw response into UTF-8 text.
pub fn decode_response(bytes: &[u8]) -> (String, TextEncoding) {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        if let Some(text) =
            encoding.decode_without_bom_handling_and_without_replacement(&bytes[bom_len..])
        {
            return (text.into_owned(), TextEncoding::from_bom(encoding));
        }
    }

    let candidates = [(UTF_8, TextEncoding::Utf8), (GB18030, TextEncoding::Gb18030)];
    for (encoding, tag) in candidates {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(bytes) {
            return (text.into_owned(), tag);
        }
    }

    let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
    (text.into_owned(), TextEncoding::Latin1)
}

//! Classify a font buffer by its first four bytes, falling back to a full
//! structural parse when the signature is ambiguous.

use crate::tables::{Flavor, SFNT_VERSION_CFF};
use crate::{sfnt, woff1, woff2};

/// The on-disk format of a font file, as reported by [`detect_format`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FontFormat {
    Ttf,
    Otf,
    Woff,
    Woff2,
}

impl FontFormat {
    pub fn extension(self) -> &'static str {
        match self {
            FontFormat::Ttf => "ttf",
            FontFormat::Otf => "otf",
            FontFormat::Woff => "woff",
            FontFormat::Woff2 => "woff2",
        }
    }
}

/// Classify `data`, returning `None` for unrecognizable input.
///
/// Matches on the signature alone where possible; an unknown signature
/// triggers a parse attempt with each container codec in turn, classifying by
/// the parsed container's flavor.
pub fn detect_format(data: &[u8]) -> Option<FontFormat> {
    match data.get(..4)? {
        [0x00, 0x01, 0x00, 0x00] | b"true" | b"typ1" => Some(FontFormat::Ttf),
        b"OTTO" => Some(FontFormat::Otf),
        b"wOFF" => Some(FontFormat::Woff),
        b"wOF2" => Some(FontFormat::Woff2),
        _ => detect_by_parsing(data),
    }
}

fn detect_by_parsing(data: &[u8]) -> Option<FontFormat> {
    type Decoder = fn(&[u8]) -> Result<crate::FontContainer, crate::ConvertError>;
    let decoders: [Decoder; 3] = [sfnt::decode, woff1::decode, woff2::decode];
    for decode in decoders {
        if let Ok(font) = decode(data) {
            return Some(match font.flavor {
                Flavor::Woff1 => FontFormat::Woff,
                Flavor::Woff2 => FontFormat::Woff2,
                Flavor::Sfnt if font.sfnt_version() == SFNT_VERSION_CFF => FontFormat::Otf,
                Flavor::Sfnt => FontFormat::Ttf,
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_by_signature() {
        assert_eq!(detect_format(b"\x00\x01\x00\x00rest"), Some(FontFormat::Ttf));
        assert_eq!(detect_format(b"trueXXXX"), Some(FontFormat::Ttf));
        assert_eq!(detect_format(b"typ1XXXX"), Some(FontFormat::Ttf));
        assert_eq!(detect_format(b"OTTOXXXX"), Some(FontFormat::Otf));
        assert_eq!(detect_format(b"wOFFXXXX"), Some(FontFormat::Woff));
        assert_eq!(detect_format(b"wOF2XXXX"), Some(FontFormat::Woff2));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(detect_format(b""), None);
        assert_eq!(detect_format(b"ab"), None);
        assert_eq!(detect_format(b"this is not a font at all"), None);
    }
}

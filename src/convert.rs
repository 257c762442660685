//! The conversion pipeline: sniff, decode, optional outline conversion,
//! re-encode in the target container.

use crate::error::ConvertError;
use crate::outline;
use crate::sniff::{FontFormat, detect_format};
use crate::tables::{Flavor, OutlineKind};
use crate::{sfnt, woff1, woff2};

/// Container format a conversion can produce.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TargetFormat {
    Ttf,
    Woff,
    Woff2,
}

impl TargetFormat {
    pub fn extension(self) -> &'static str {
        match self {
            TargetFormat::Ttf => "ttf",
            TargetFormat::Woff => "woff",
            TargetFormat::Woff2 => "woff2",
        }
    }
}

/// A successful conversion, distinguishing how much work was done.
#[derive(Debug)]
pub enum Conversion {
    /// Full conversion to the target format.
    Converted(Vec<u8>),
    /// Same-format request; the bytes are the input, untouched.
    Unchanged(Vec<u8>),
    /// Repackaged into the target container, but the outlines are still CFF
    /// because outline conversion was disabled or failed.
    OutlinesRetained(Vec<u8>),
}

impl Conversion {
    pub fn bytes(&self) -> &[u8] {
        match self {
            Conversion::Converted(b) | Conversion::Unchanged(b) | Conversion::OutlinesRetained(b) => {
                b
            }
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Conversion::Converted(b) | Conversion::Unchanged(b) | Conversion::OutlinesRetained(b) => {
                b
            }
        }
    }
}

/// Conversion pipeline configuration.
#[derive(Debug, Clone)]
pub struct Converter {
    outline_conversion: bool,
}

impl Default for Converter {
    fn default() -> Self {
        Converter::new()
    }
}

impl Converter {
    pub fn new() -> Self {
        Converter {
            outline_conversion: true,
        }
    }

    /// Repackage containers only: a TTF-flavored target keeps CFF outlines
    /// and reports [`Conversion::OutlinesRetained`].
    pub fn without_outline_conversion() -> Self {
        Converter {
            outline_conversion: false,
        }
    }

    pub fn convert(&self, data: &[u8], target: TargetFormat) -> Result<Conversion, ConvertError> {
        let source = detect_format(data).ok_or(ConvertError::UnrecognizedFormat)?;

        // Same container, no outline work pending. An OTF with a TTF target
        // shares the sfnt container but still needs the outline step.
        let no_op = matches!(
            (source, target),
            (FontFormat::Ttf, TargetFormat::Ttf)
                | (FontFormat::Woff, TargetFormat::Woff)
                | (FontFormat::Woff2, TargetFormat::Woff2)
        );
        if no_op {
            log::debug!("input already {}, passing through", target.extension());
            return Ok(Conversion::Unchanged(data.to_vec()));
        }

        let mut font = match source {
            FontFormat::Ttf | FontFormat::Otf => sfnt::decode(data)?,
            FontFormat::Woff => woff1::decode(data)?,
            FontFormat::Woff2 => woff2::decode(data)?,
        };
        font.validate()?;

        let mut outlines_retained = false;
        let needs_outline_work = target == TargetFormat::Ttf
            && matches!(
                font.outline_kind(),
                Some(OutlineKind::Cff | OutlineKind::Cff2)
            );
        if needs_outline_work {
            if !self.outline_conversion {
                log::warn!("outline conversion disabled, keeping CFF outlines");
                outlines_retained = true;
            } else {
                match outline::cff_to_glyf(&mut font) {
                    Ok(()) => {
                        font.validate()?;
                    }
                    Err(ConvertError::OutlineConversionFailed) => {
                        log::warn!("could not convert CFF outlines, keeping them as-is");
                        outlines_retained = true;
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        font.flavor = match target {
            TargetFormat::Ttf => Flavor::Sfnt,
            TargetFormat::Woff => Flavor::Woff1,
            TargetFormat::Woff2 => Flavor::Woff2,
        };
        let bytes = match target {
            TargetFormat::Ttf => sfnt::encode(&font)?,
            TargetFormat::Woff => woff1::encode(&font)?,
            TargetFormat::Woff2 => woff2::encode(&font)?,
        };
        Ok(if outlines_retained {
            Conversion::OutlinesRetained(bytes)
        } else {
            Conversion::Converted(bytes)
        })
    }
}

/// Convert `data` to `target` with the default pipeline (outline conversion
/// enabled).
pub fn convert(data: &[u8], target: TargetFormat) -> Result<Conversion, ConvertError> {
    Converter::new().convert(data, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{CFF, GLYF, LOCA, SFNT_VERSION_CFF};
    use crate::test_fonts;

    #[test]
    fn same_format_request_is_a_byte_identical_no_op() {
        let ttf = sfnt::encode(&test_fonts::truetype_container()).unwrap();
        match convert(&ttf, TargetFormat::Ttf).unwrap() {
            Conversion::Unchanged(bytes) => assert_eq!(bytes, ttf),
            other => panic!("expected Unchanged, got {other:?}"),
        }
    }

    #[test]
    fn ttf_to_woff_and_back() {
        let ttf = sfnt::encode(&test_fonts::truetype_container()).unwrap();
        let woff = match convert(&ttf, TargetFormat::Woff).unwrap() {
            Conversion::Converted(bytes) => bytes,
            other => panic!("expected Converted, got {other:?}"),
        };
        assert_eq!(detect_format(&woff), Some(FontFormat::Woff));
        let back = convert(&woff, TargetFormat::Ttf).unwrap().into_bytes();
        assert_eq!(detect_format(&back), Some(FontFormat::Ttf));

        let original = test_fonts::truetype_container();
        let roundtripped = sfnt::decode(&back).unwrap();
        for table in original.tables() {
            if table.tag == crate::tables::HEAD {
                continue; // checkSumAdjustment is recomputed
            }
            assert_eq!(roundtripped.table(table.tag), Some(table.data.as_slice()));
        }
    }

    #[test]
    fn ttf_to_woff2_roundtrip_preserves_format() {
        let ttf = sfnt::encode(&test_fonts::truetype_container()).unwrap();
        let woff2 = convert(&ttf, TargetFormat::Woff2).unwrap().into_bytes();
        assert_eq!(detect_format(&woff2), Some(FontFormat::Woff2));
        let back = convert(&woff2, TargetFormat::Ttf).unwrap().into_bytes();
        assert_eq!(detect_format(&back), Some(FontFormat::Ttf));
    }

    #[test]
    fn otf_to_ttf_converts_outlines() {
        let otf = sfnt::encode(&test_fonts::cff_container()).unwrap();
        assert_eq!(detect_format(&otf), Some(FontFormat::Otf));
        let ttf = match convert(&otf, TargetFormat::Ttf).unwrap() {
            Conversion::Converted(bytes) => bytes,
            other => panic!("expected Converted, got {other:?}"),
        };
        let font = sfnt::decode(&ttf).unwrap();
        assert!(font.has_table(GLYF));
        assert!(font.has_table(LOCA));
        assert!(!font.has_table(CFF));
    }

    #[test]
    fn disabled_outline_conversion_retains_cff() {
        let otf = sfnt::encode(&test_fonts::cff_container()).unwrap();
        let converter = Converter::without_outline_conversion();
        let result = converter.convert(&otf, TargetFormat::Ttf).unwrap();
        let bytes = match result {
            Conversion::OutlinesRetained(bytes) => bytes,
            other => panic!("expected OutlinesRetained, got {other:?}"),
        };
        let font = sfnt::decode(&bytes).unwrap();
        assert!(font.has_table(CFF));
        assert!(!font.has_table(GLYF));
        assert_eq!(font.sfnt_version(), SFNT_VERSION_CFF);
    }

    #[test]
    fn otf_to_woff_keeps_cff_without_fallback_variant() {
        // non-TTF targets never touch outlines
        let otf = sfnt::encode(&test_fonts::cff_container()).unwrap();
        let woff = match convert(&otf, TargetFormat::Woff).unwrap() {
            Conversion::Converted(bytes) => bytes,
            other => panic!("expected Converted, got {other:?}"),
        };
        let font = woff1::decode(&woff).unwrap();
        assert!(font.has_table(CFF));
    }

    #[test]
    fn unrecognized_input_is_rejected() {
        assert!(matches!(
            convert(b"not a font at all", TargetFormat::Ttf),
            Err(ConvertError::UnrecognizedFormat)
        ));
    }

    #[test]
    fn truncated_woff2_is_an_error_not_a_panic() {
        let ttf = sfnt::encode(&test_fonts::truetype_container()).unwrap();
        let mut woff2 = convert(&ttf, TargetFormat::Woff2).unwrap().into_bytes();
        woff2.truncate(woff2.len() - 8);
        assert!(convert(&woff2, TargetFormat::Ttf).is_err());
    }
}

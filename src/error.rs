use font_types::Tag;
use thiserror::Error;

/// Errors produced by the conversion pipeline.
///
/// Every variant is fatal for the file being converted except
/// [`ConvertError::OutlineConversionFailed`], which the orchestrator downgrades
/// to a warning by keeping the original CFF outlines and repackaging the
/// container only.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Neither the magic-number sniff nor a structural parse recognized the input.
    #[error("unrecognized font format")]
    UnrecognizedFormat,
    /// The container layout is structurally invalid (truncated input, bad magic,
    /// directory entries pointing outside the buffer, ...).
    #[error("corrupt font container: {0}")]
    CorruptContainer(&'static str),
    /// An individual table failed to decode or decompress.
    #[error("corrupt '{0}' table")]
    CorruptTable(Tag),
    /// CFF charstring interpretation or re-encoding failed for a glyph.
    #[error("could not convert CFF outlines to TrueType outlines")]
    OutlineConversionFailed,
    /// The requested target format is outside {ttf, woff, woff2}.
    #[error("unsupported target format")]
    UnsupportedTargetFormat,
}

impl From<bytes::TryGetError> for ConvertError {
    fn from(_value: bytes::TryGetError) -> Self {
        Self::CorruptContainer("unexpected end of data")
    }
}

pub(crate) fn usize_will_overflow(a: usize, b: usize) -> bool {
    a.checked_add(b).is_none()
}

macro_rules! bail_container_if {
    ($cond: expr, $msg: literal) => {
        if $cond {
            return Err(crate::error::ConvertError::CorruptContainer($msg));
        }
    };
}
pub(crate) use bail_container_if;

macro_rules! bail_table_if {
    ($cond: expr, $tag: expr) => {
        if $cond {
            return Err(crate::error::ConvertError::CorruptTable($tag));
        }
    };
}
pub(crate) use bail_table_if;

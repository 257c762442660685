//! Font container conversion between TTF/OTF, WOFF and WOFF2.
//!
//! A font is decoded into a [`FontContainer`], an ordered set of raw sfnt
//! tables, and re-encoded in the requested container format. Converting an
//! OTF to TTF additionally rewrites the CFF outlines as quadratic `glyf`
//! records.
//!
//! The whole pipeline is exposed as [`convert`]; the per-format codecs live
//! in [`sfnt`], [`woff1`] and [`woff2`] for callers that want only one step.

mod cff;
pub mod convert;
pub mod error;
mod glyf;
mod outline;
pub mod sfnt;
pub mod sniff;
pub mod tables;
pub mod woff1;
pub mod woff2;

#[cfg(test)]
pub(crate) mod test_fonts;

pub use convert::{Conversion, Converter, TargetFormat, convert};
pub use error::ConvertError;
pub use sniff::{FontFormat, detect_format};
pub use tables::{Flavor, FontContainer, OutlineKind, TableRecord};

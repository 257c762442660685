//! The in-memory table directory model shared by all container codecs.

use font_types::Tag;

use crate::error::ConvertError;

pub const HEAD: Tag = Tag::new(b"head");
pub const HHEA: Tag = Tag::new(b"hhea");
pub const HMTX: Tag = Tag::new(b"hmtx");
pub const MAXP: Tag = Tag::new(b"maxp");
pub const CMAP: Tag = Tag::new(b"cmap");
pub const NAME: Tag = Tag::new(b"name");
pub const POST: Tag = Tag::new(b"post");
pub const GLYF: Tag = Tag::new(b"glyf");
pub const LOCA: Tag = Tag::new(b"loca");
pub const CFF: Tag = Tag::new(b"CFF ");
pub const CFF2: Tag = Tag::new(b"CFF2");

/// sfnt version of a TrueType-flavored font.
pub const SFNT_VERSION_TRUETYPE: Tag = Tag::from_u32(0x00010000);
/// sfnt version of a CFF-flavored (OpenType) font.
pub const SFNT_VERSION_CFF: Tag = Tag::new(b"OTTO");
/// TrueType collection flavor. Collections are rejected by every codec.
pub const TTC_FLAVOR: Tag = Tag::new(b"ttcf");

const REQUIRED_TABLES: [Tag; 7] = [HEAD, HHEA, HMTX, MAXP, CMAP, NAME, POST];

/// On-disk container kind of a [`FontContainer`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Flavor {
    /// Plain sfnt (TTF or OTF).
    Sfnt,
    Woff1,
    Woff2,
}

/// Which outline source a font carries.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OutlineKind {
    Glyf,
    Cff,
    Cff2,
}

/// One named table: its 4-byte tag plus the fully decompressed,
/// untransformed content.
///
/// Checksums are never stored: they are recomputed on encode and never
/// trusted on decode.
#[derive(Clone)]
pub struct TableRecord {
    pub tag: Tag,
    pub data: Vec<u8>,
}

impl TableRecord {
    pub fn checksum(&self) -> u32 {
        checksum(&self.data)
    }
}

/// The root in-memory object for one font: an ordered set of tagged tables.
///
/// Insertion order is directory order; tags are unique. A container lives for
/// exactly one conversion call: decoded from bytes, optionally rewritten by
/// the outline converter, encoded back to bytes.
pub struct FontContainer {
    pub flavor: Flavor,
    sfnt_version: Tag,
    tables: Vec<TableRecord>,
}

impl FontContainer {
    pub fn new(flavor: Flavor, sfnt_version: Tag) -> Self {
        FontContainer {
            flavor,
            sfnt_version,
            tables: Vec::new(),
        }
    }

    pub fn sfnt_version(&self) -> Tag {
        self.sfnt_version
    }

    pub fn set_sfnt_version(&mut self, version: Tag) {
        self.sfnt_version = version;
    }

    pub fn tables(&self) -> &[TableRecord] {
        &self.tables
    }

    pub fn num_tables(&self) -> u16 {
        self.tables.len() as u16
    }

    pub fn table(&self, tag: Tag) -> Option<&[u8]> {
        self.tables
            .iter()
            .find(|t| t.tag == tag)
            .map(|t| t.data.as_slice())
    }

    pub fn has_table(&self, tag: Tag) -> bool {
        self.tables.iter().any(|t| t.tag == tag)
    }

    /// Insert a table, replacing any existing table with the same tag in place.
    pub fn insert(&mut self, tag: Tag, data: Vec<u8>) {
        match self.tables.iter_mut().find(|t| t.tag == tag) {
            Some(existing) => existing.data = data,
            None => self.tables.push(TableRecord { tag, data }),
        }
    }

    pub fn remove(&mut self, tag: Tag) -> Option<Vec<u8>> {
        let idx = self.tables.iter().position(|t| t.tag == tag)?;
        Some(self.tables.remove(idx).data)
    }

    pub fn outline_kind(&self) -> Option<OutlineKind> {
        if self.has_table(GLYF) && self.has_table(LOCA) {
            Some(OutlineKind::Glyf)
        } else if self.has_table(CFF) {
            Some(OutlineKind::Cff)
        } else if self.has_table(CFF2) {
            Some(OutlineKind::Cff2)
        } else {
            None
        }
    }

    /// Check the table-set invariant: all required tables present and exactly
    /// one outline source among {glyf+loca, CFF, CFF2}.
    pub fn validate(&self) -> Result<(), ConvertError> {
        for tag in REQUIRED_TABLES {
            if !self.has_table(tag) {
                return Err(ConvertError::CorruptContainer("missing required table"));
            }
        }
        let has_glyf = self.has_table(GLYF);
        let has_loca = self.has_table(LOCA);
        if has_glyf != has_loca {
            return Err(ConvertError::CorruptContainer(
                "glyf and loca must be present together",
            ));
        }
        let sources =
            [has_glyf, self.has_table(CFF), self.has_table(CFF2)].iter().filter(|&&s| s).count();
        if sources != 1 {
            return Err(ConvertError::CorruptContainer(
                "font must have exactly one outline source",
            ));
        }
        Ok(())
    }
}

/// Standard OpenType table checksum: the big-endian u32 sum over the data,
/// with a trailing partial word treated as zero-padded.
pub fn checksum(buf: &[u8]) -> u32 {
    let mut checksum: u32 = 0;
    let mut iter = buf.chunks_exact(4);
    for chunk in &mut iter {
        checksum = checksum.wrapping_add(u32::from_be_bytes(chunk.try_into().unwrap()));
    }
    let mut tail = [0u8; 4];
    let remainder = iter.remainder();
    tail[..remainder.len()].copy_from_slice(remainder);
    checksum.wrapping_add(u32::from_be_bytes(tail))
}

//! The WOFF (version 1) container codec: an sfnt wrapper with per-table
//! zlib compression.

use std::io::Write;

use bytes::{Buf, BufMut};
use flate2::{Compression, Decompress, FlushDecompress, write::ZlibEncoder};
use font_types::Tag;

use crate::error::{ConvertError, bail_container_if};
use crate::sfnt;
use crate::tables::{Flavor, FontContainer, TTC_FLAVOR};

pub(crate) const WOFF1_SIG: Tag = Tag::new(b"wOFF");

const WOFF1_HEADER_SIZE: usize = 44;
const WOFF1_ENTRY_SIZE: usize = 20;

/// <https://www.w3.org/TR/WOFF/#WOFFHeader>
struct Woff1Header {
    flavor: Tag,
    num_tables: u16,
    meta_offset: u32,
    meta_length: u32,
    priv_offset: u32,
    priv_length: u32,
}

impl Woff1Header {
    fn parse(input: &mut impl Buf) -> Result<Self, ConvertError> {
        let input_len = input.remaining() as u32;

        let signature = Tag::from_u32(input.try_get_u32()?);
        bail_container_if!(signature != WOFF1_SIG, "bad WOFF signature");

        let flavor = Tag::from_u32(input.try_get_u32()?);
        bail_container_if!(
            flavor == TTC_FLAVOR,
            "TrueType collections are not supported"
        );
        let length = input.try_get_u32()?;
        let num_tables = input.try_get_u16()?;
        let reserved = input.try_get_u16()?;
        let _total_sfnt_size = input.try_get_u32()?;
        let _major_version = input.try_get_u16()?;
        let _minor_version = input.try_get_u16()?;
        let meta_offset = input.try_get_u32()?;
        let meta_length = input.try_get_u32()?;
        let _meta_orig_length = input.try_get_u32()?;
        let priv_offset = input.try_get_u32()?;
        let priv_length = input.try_get_u32()?;

        bail_container_if!(length != input_len, "declared length mismatch");
        bail_container_if!(num_tables == 0, "WOFF with no tables");
        bail_container_if!(reserved != 0, "reserved field must be zero");

        let header = Woff1Header {
            flavor,
            num_tables,
            meta_offset,
            meta_length,
            priv_offset,
            priv_length,
        };
        header.check_block(header.meta_offset, header.meta_length, input_len)?;
        header.check_block(header.priv_offset, header.priv_length, input_len)?;
        Ok(header)
    }

    fn check_block(&self, offset: u32, length: u32, input_len: u32) -> Result<(), ConvertError> {
        if offset != 0 {
            bail_container_if!(
                offset >= input_len || input_len - offset < length,
                "metadata block outside buffer"
            );
        }
        Ok(())
    }
}

/// <https://www.w3.org/TR/WOFF/#TableDirectory>
struct Woff1TableEntry {
    tag: Tag,
    offset: u32,
    comp_length: u32,
    orig_length: u32,
}

impl Woff1TableEntry {
    fn parse(input: &mut impl Buf) -> Result<Self, ConvertError> {
        Ok(Woff1TableEntry {
            tag: Tag::from_u32(input.try_get_u32()?),
            offset: input.try_get_u32()?,
            comp_length: input.try_get_u32()?,
            orig_length: input.try_get_u32()?,
        })
        // origChecksum is read by the caller; it is never trusted.
    }

    fn compressed_slice<'a>(&self, data: &'a [u8]) -> Result<&'a [u8], ConvertError> {
        let start = self.offset as usize;
        let end = start
            .checked_add(self.comp_length as usize)
            .ok_or(ConvertError::CorruptContainer("table length overflow"))?;
        data.get(start..end)
            .ok_or(ConvertError::CorruptContainer("table outside buffer"))
    }
}

/// Unwrap a WOFF1 file, inflating each compressed table independently.
pub fn decode(data: &[u8]) -> Result<FontContainer, ConvertError> {
    let mut input = data;
    let header = Woff1Header::parse(&mut input)?;

    let mut font = FontContainer::new(Flavor::Woff1, header.flavor);
    for _ in 0..header.num_tables {
        let entry = Woff1TableEntry::parse(&mut input)?;
        let _orig_checksum = input.try_get_u32()?;
        bail_container_if!(
            entry.comp_length > entry.orig_length,
            "compressed table larger than original"
        );
        bail_container_if!(font.has_table(entry.tag), "duplicate table tag");

        let raw = entry.compressed_slice(data)?;
        let table_data = if entry.comp_length < entry.orig_length {
            let inflated = inflate(raw, entry.orig_length as usize)
                .map_err(|_| ConvertError::CorruptTable(entry.tag))?;
            if inflated.len() != entry.orig_length as usize {
                return Err(ConvertError::CorruptTable(entry.tag));
            }
            inflated
        } else {
            raw.to_vec()
        };
        font.insert(entry.tag, table_data);
    }

    Ok(font)
}

/// Wrap the table set in a WOFF1 container, compressing each table
/// independently and keeping the smaller of {raw, deflated} per table.
pub fn encode(font: &FontContainer) -> Result<Vec<u8>, ConvertError> {
    let tables = sfnt::normalized_tables(font)?;
    let total_sfnt_size = sfnt::encoded_size(&tables) as u32;

    struct Encoded {
        comp: Option<Vec<u8>>,
    }
    let encoded: Vec<Encoded> = tables
        .iter()
        .map(|table| {
            let comp = deflate(&table.data)
                .ok()
                .filter(|comp| comp.len() < table.data.len());
            Encoded { comp }
        })
        .collect();

    let directory_end = WOFF1_HEADER_SIZE + WOFF1_ENTRY_SIZE * tables.len();
    let mut out: Vec<u8> = Vec::with_capacity(total_sfnt_size as usize);

    // Header; the total length is patched in once known.
    out.put_slice(&WOFF1_SIG.to_be_bytes());
    out.put_slice(&font.sfnt_version().to_be_bytes());
    out.put_u32(0); // length, patched below
    out.put_u16(tables.len() as u16);
    out.put_u16(0); // reserved
    out.put_u32(total_sfnt_size);
    out.put_u16(1); // majorVersion
    out.put_u16(0); // minorVersion
    out.put_u32(0); // metaOffset
    out.put_u32(0); // metaLength
    out.put_u32(0); // metaOrigLength
    out.put_u32(0); // privOffset
    out.put_u32(0); // privLength

    let mut offset = directory_end;
    for (table, enc) in tables.iter().zip(&encoded) {
        let stored_len = enc.comp.as_deref().unwrap_or(&table.data).len();
        out.put_slice(&table.tag.to_be_bytes());
        out.put_u32(offset as u32);
        out.put_u32(stored_len as u32);
        out.put_u32(table.data.len() as u32);
        out.put_u32(sfnt::directory_checksum(table));
        offset += sfnt::round4(stored_len);
    }

    for (table, enc) in tables.iter().zip(&encoded) {
        out.put_slice(enc.comp.as_deref().unwrap_or(&table.data));
        let padded = sfnt::round4(out.len());
        out.resize(padded, 0);
    }

    let length = out.len() as u32;
    out[8..12].copy_from_slice(&length.to_be_bytes());
    Ok(out)
}

fn inflate(compressed: &[u8], size_hint: usize) -> Result<Vec<u8>, ()> {
    let mut output: Vec<u8> = Vec::with_capacity(size_hint);
    let mut decompressor = Decompress::new(true);
    let status = decompressor
        .decompress_vec(compressed, &mut output, FlushDecompress::Finish)
        .map_err(|_| ())?;
    // Anything other than a clean end of stream means the declared original
    // length was wrong or the stream is damaged.
    if status != flate2::Status::StreamEnd {
        return Err(());
    }
    Ok(output)
}

fn deflate(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    encoder.finish()
}

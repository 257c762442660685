//! The plain sfnt (TTF/OTF) container codec.

use bytes::{Buf, BufMut};
use font_types::Tag;

use crate::error::{ConvertError, bail_container_if, bail_table_if};
use crate::tables::{
    self, Flavor, FontContainer, HEAD, SFNT_VERSION_CFF, SFNT_VERSION_TRUETYPE, TTC_FLAVOR,
    TableRecord, checksum,
};

pub(crate) const SFNT_HEADER_SIZE: usize = 12;
pub(crate) const SFNT_ENTRY_SIZE: usize = 16;

/// Offset of checkSumAdjustment within the 'head' table.
const CHECKSUM_ADJUSTMENT_OFFSET: usize = 8;
/// The whole-font checksum every sfnt is adjusted to.
const CHECKSUM_MAGIC: u32 = 0xB1B0_AFBA;

fn is_known_sfnt_version(version: Tag) -> bool {
    version == SFNT_VERSION_TRUETYPE
        || version == SFNT_VERSION_CFF
        || version.as_ref() == b"true"
        || version.as_ref() == b"typ1"
}

/// Parse an sfnt table directory and slice out each table's raw bytes.
pub fn decode(data: &[u8]) -> Result<FontContainer, ConvertError> {
    let mut input = data;
    let sfnt_version = Tag::from_u32(input.try_get_u32()?);
    bail_container_if!(
        sfnt_version == TTC_FLAVOR,
        "TrueType collections are not supported"
    );
    bail_container_if!(!is_known_sfnt_version(sfnt_version), "bad sfnt version");

    let num_tables = input.try_get_u16()?;
    bail_container_if!(num_tables == 0, "sfnt with no tables");
    let _search_range = input.try_get_u16()?;
    let _entry_selector = input.try_get_u16()?;
    let _range_shift = input.try_get_u16()?;

    let mut font = FontContainer::new(Flavor::Sfnt, sfnt_version);
    for _ in 0..num_tables {
        let tag = Tag::from_u32(input.try_get_u32()?);
        let _checksum = input.try_get_u32()?;
        let offset = input.try_get_u32()? as usize;
        let length = input.try_get_u32()? as usize;

        let end = offset
            .checked_add(length)
            .ok_or(ConvertError::CorruptContainer("table length overflow"))?;
        let table_data = data
            .get(offset..end)
            .ok_or(ConvertError::CorruptContainer("table outside buffer"))?;

        bail_container_if!(font.has_table(tag), "duplicate table tag");
        font.insert(tag, table_data.to_vec());
    }

    Ok(font)
}

/// Serialize the table set as an sfnt: directory sorted by tag, tables padded
/// to 4-byte alignment, per-table checksums and the head checkSumAdjustment
/// recomputed.
pub fn encode(font: &FontContainer) -> Result<Vec<u8>, ConvertError> {
    let sfnt_version = font.sfnt_version();
    let tables = normalized_tables(font)?;

    let mut out: Vec<u8> = Vec::with_capacity(encoded_size(&tables));
    put_offset_table(&mut out, sfnt_version, tables.len() as u16);

    let mut offset = SFNT_HEADER_SIZE + SFNT_ENTRY_SIZE * tables.len();
    for table in &tables {
        out.put_slice(&table.tag.to_be_bytes());
        out.put_u32(directory_checksum(table));
        out.put_u32(offset as u32);
        out.put_u32(table.data.len() as u32);
        offset += round4(table.data.len());
    }

    for table in &tables {
        out.put_slice(&table.data);
        let padded = round4(out.len());
        out.resize(padded, 0);
    }

    Ok(out)
}

/// The table set ordered by tag, with head.checkSumAdjustment rewritten to
/// the value the assembled sfnt will carry.
///
/// WOFF1 and WOFF2 embed the same adjusted head so that decompressing them
/// reproduces a checksum-valid sfnt, so all three encoders start here.
pub(crate) fn normalized_tables(font: &FontContainer) -> Result<Vec<TableRecord>, ConvertError> {
    let mut tables: Vec<TableRecord> = font.tables().to_vec();
    tables.sort_by_key(|t| t.tag);

    let head = tables
        .iter_mut()
        .find(|t| t.tag == HEAD)
        .ok_or(ConvertError::CorruptContainer("missing required table"))?;
    bail_table_if!(head.data.len() < CHECKSUM_ADJUSTMENT_OFFSET + 4, HEAD);
    head.data[CHECKSUM_ADJUSTMENT_OFFSET..CHECKSUM_ADJUSTMENT_OFFSET + 4]
        .copy_from_slice(&[0; 4]);

    // Whole-font checksum of the sfnt laid out by `encode`. Table data padding
    // is invisible to `checksum` (trailing bytes are zero either way), so the
    // unpadded table content sums are enough.
    let mut header: Vec<u8> = Vec::with_capacity(SFNT_HEADER_SIZE);
    put_offset_table(&mut header, font.sfnt_version(), tables.len() as u16);
    let mut font_checksum = checksum(&header);

    let mut offset = SFNT_HEADER_SIZE + SFNT_ENTRY_SIZE * tables.len();
    for table in &tables {
        let table_checksum = table.checksum();
        let mut entry: Vec<u8> = Vec::with_capacity(SFNT_ENTRY_SIZE);
        entry.put_slice(&table.tag.to_be_bytes());
        entry.put_u32(table_checksum);
        entry.put_u32(offset as u32);
        entry.put_u32(table.data.len() as u32);
        font_checksum = font_checksum.wrapping_add(checksum(&entry));
        font_checksum = font_checksum.wrapping_add(table_checksum);
        offset += round4(table.data.len());
    }

    let adjustment = CHECKSUM_MAGIC.wrapping_sub(font_checksum);
    let head = tables.iter_mut().find(|t| t.tag == HEAD).unwrap();
    head.data[CHECKSUM_ADJUSTMENT_OFFSET..CHECKSUM_ADJUSTMENT_OFFSET + 4]
        .copy_from_slice(&adjustment.to_be_bytes());

    Ok(tables)
}

/// The checksum recorded in a table directory entry.
///
/// For 'head' the checkSumAdjustment field is treated as zero, per the
/// OpenType spec; for every other table it is the plain content checksum.
pub(crate) fn directory_checksum(table: &TableRecord) -> u32 {
    let sum = table.checksum();
    if table.tag == HEAD && table.data.len() >= CHECKSUM_ADJUSTMENT_OFFSET + 4 {
        let adjustment = u32::from_be_bytes(
            table.data[CHECKSUM_ADJUSTMENT_OFFSET..CHECKSUM_ADJUSTMENT_OFFSET + 4]
                .try_into()
                .unwrap(),
        );
        sum.wrapping_sub(adjustment)
    } else {
        sum
    }
}

/// Total encoded size of an sfnt holding `tables`.
pub(crate) fn encoded_size(tables: &[TableRecord]) -> usize {
    SFNT_HEADER_SIZE
        + SFNT_ENTRY_SIZE * tables.len()
        + tables.iter().map(|t| round4(t.data.len())).sum::<usize>()
}

fn put_offset_table(out: &mut Vec<u8>, sfnt_version: Tag, num_tables: u16) {
    // Computed in u32: the shift must not overflow for table counts past
    // 2^15, even though the fields themselves truncate to u16.
    let mut entry_selector: u32 = 0;
    while 1u32 << (entry_selector + 1) <= num_tables as u32 {
        entry_selector += 1;
    }
    let search_range = (1u32 << entry_selector) << 4;

    out.put_slice(&sfnt_version.to_be_bytes());
    out.put_u16(num_tables);
    out.put_u16(search_range as u16);
    out.put_u16(entry_selector as u16);
    out.put_u16(((num_tables as u32) << 4).wrapping_sub(search_range) as u16);
}

pub(crate) fn round4(value: usize) -> usize {
    match value.checked_add(3) {
        Some(padded) => padded & !3,
        None => value,
    }
}

//! The WOFF2 container codec: a single Brotli stream over the concatenated
//! tables, with optional preprocessing transforms for `glyf`, `loca` and
//! `hmtx`.
//!
//! <https://www.w3.org/TR/WOFF2/>

mod glyf_decode;
mod glyf_encode;
mod hmtx;
mod varint;

use bytes::{Buf, BufMut};
use font_types::Tag;

use crate::error::{ConvertError, bail_container_if};
use crate::sfnt;
use crate::tables::{Flavor, FontContainer, GLYF, HEAD, HHEA, HMTX, LOCA, MAXP, TTC_FLAVOR};
use varint::{BufVariableExt as _, put_variable_128_u32};

pub(crate) const WOFF2_SIG: Tag = Tag::new(b"wOF2");

const WOFF2_HEADER_SIZE: usize = 48;
/// Transform version of an untransformed `glyf` or `loca` table. For every
/// other table the null transform is version 0.
const NULL_TRANSFORM_GLYF_LOCA: u8 = 3;
const HMTX_TRANSFORM: u8 = 1;

/// Tags likely to appear in fonts, indexed by the 6-bit field of a directory
/// entry's flags byte. Index 63 means an explicit tag follows.
static KNOWN_TABLE_TAGS: [Tag; 63] = [
    Tag::new(b"cmap"), // 0
    Tag::new(b"head"), // 1
    Tag::new(b"hhea"), // 2
    Tag::new(b"hmtx"), // 3
    Tag::new(b"maxp"), // 4
    Tag::new(b"name"), // 5
    Tag::new(b"OS/2"), // 6
    Tag::new(b"post"), // 7
    Tag::new(b"cvt "), // 8
    Tag::new(b"fpgm"), // 9
    Tag::new(b"glyf"), // 10
    Tag::new(b"loca"), // 11
    Tag::new(b"prep"), // 12
    Tag::new(b"CFF "), // 13
    Tag::new(b"VORG"), // 14
    Tag::new(b"EBDT"), // 15
    Tag::new(b"EBLC"), // 16
    Tag::new(b"gasp"), // 17
    Tag::new(b"hdmx"), // 18
    Tag::new(b"kern"), // 19
    Tag::new(b"LTSH"), // 20
    Tag::new(b"PCLT"), // 21
    Tag::new(b"VDMX"), // 22
    Tag::new(b"vhea"), // 23
    Tag::new(b"vmtx"), // 24
    Tag::new(b"BASE"), // 25
    Tag::new(b"GDEF"), // 26
    Tag::new(b"GPOS"), // 27
    Tag::new(b"GSUB"), // 28
    Tag::new(b"EBSC"), // 29
    Tag::new(b"JSTF"), // 30
    Tag::new(b"MATH"), // 31
    Tag::new(b"CBDT"), // 32
    Tag::new(b"CBLC"), // 33
    Tag::new(b"COLR"), // 34
    Tag::new(b"CPAL"), // 35
    Tag::new(b"SVG "), // 36
    Tag::new(b"sbix"), // 37
    Tag::new(b"acnt"), // 38
    Tag::new(b"avar"), // 39
    Tag::new(b"bdat"), // 40
    Tag::new(b"bloc"), // 41
    Tag::new(b"bsln"), // 42
    Tag::new(b"cvar"), // 43
    Tag::new(b"fdsc"), // 44
    Tag::new(b"feat"), // 45
    Tag::new(b"fmtx"), // 46
    Tag::new(b"fvar"), // 47
    Tag::new(b"gvar"), // 48
    Tag::new(b"hsty"), // 49
    Tag::new(b"just"), // 50
    Tag::new(b"lcar"), // 51
    Tag::new(b"mort"), // 52
    Tag::new(b"morx"), // 53
    Tag::new(b"opbd"), // 54
    Tag::new(b"prop"), // 55
    Tag::new(b"trak"), // 56
    Tag::new(b"Zapf"), // 57
    Tag::new(b"Silf"), // 58
    Tag::new(b"Glat"), // 59
    Tag::new(b"Gloc"), // 60
    Tag::new(b"Feat"), // 61
    Tag::new(b"Sill"), // 62
];

fn known_tag_index(tag: Tag) -> Option<u8> {
    KNOWN_TABLE_TAGS
        .iter()
        .position(|&known| known == tag)
        .map(|i| i as u8)
}

/// <https://www.w3.org/TR/WOFF2/#woff20Header>
struct Woff2Header {
    flavor: Tag,
    num_tables: u16,
    total_compressed_size: u32,
    meta_offset: u32,
    meta_length: u32,
    priv_offset: u32,
    priv_length: u32,
}

impl Woff2Header {
    fn parse(input: &mut impl Buf) -> Result<Self, ConvertError> {
        let input_len = input.remaining() as u32;

        let signature = Tag::from_u32(input.try_get_u32()?);
        bail_container_if!(signature != WOFF2_SIG, "bad WOFF2 signature");

        let flavor = Tag::from_u32(input.try_get_u32()?);
        bail_container_if!(
            flavor == TTC_FLAVOR,
            "TrueType collections are not supported"
        );
        let length = input.try_get_u32()?;
        let num_tables = input.try_get_u16()?;
        let reserved = input.try_get_u16()?;
        let _total_sfnt_size = input.try_get_u32()?;
        let total_compressed_size = input.try_get_u32()?;
        let _major_version = input.try_get_u16()?;
        let _minor_version = input.try_get_u16()?;
        let meta_offset = input.try_get_u32()?;
        let meta_length = input.try_get_u32()?;
        let _meta_orig_length = input.try_get_u32()?;
        let priv_offset = input.try_get_u32()?;
        let priv_length = input.try_get_u32()?;

        bail_container_if!(length != input_len, "declared length mismatch");
        bail_container_if!(num_tables == 0, "WOFF2 with no tables");
        bail_container_if!(reserved != 0, "reserved field must be zero");

        let header = Woff2Header {
            flavor,
            num_tables,
            total_compressed_size,
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

/// <https://www.w3.org/TR/WOFF2/#table_dir_format>
struct Woff2TableEntry {
    tag: Tag,
    orig_length: u32,
    /// Length of the table's data in the decompressed stream when a
    /// preprocessing transform was applied.
    transform_length: Option<u32>,
}

impl Woff2TableEntry {
    fn parse(input: &mut impl Buf) -> Result<Self, ConvertError> {
        const TAG_MASK: u8 = 0b0011_1111;

        let flags = input.try_get_u8()?;
        let tag = match flags & TAG_MASK {
            0b0011_1111 => Tag::from_u32(input.try_get_u32()?),
            index => KNOWN_TABLE_TAGS[index as usize],
        };
        let transform_version = (flags & 0b1100_0000) >> 6;
        let orig_length = input.try_get_variable_128_u32()?;

        let transformed = if tag == GLYF || tag == LOCA {
            bail_container_if!(
                transform_version != 0 && transform_version != NULL_TRANSFORM_GLYF_LOCA,
                "unknown glyf/loca transform"
            );
            transform_version == 0
        } else if tag == HMTX {
            bail_container_if!(
                transform_version != 0 && transform_version != HMTX_TRANSFORM,
                "unknown hmtx transform"
            );
            transform_version == HMTX_TRANSFORM
        } else {
            bail_container_if!(transform_version != 0, "unknown table transform");
            false
        };

        let transform_length = if transformed {
            let transform_length = input.try_get_variable_128_u32()?;
            bail_container_if!(
                tag == LOCA && transform_length != 0,
                "transformed loca must be empty"
            );
            Some(transform_length)
        } else {
            None
        };

        Ok(Woff2TableEntry {
            tag,
            orig_length,
            transform_length,
        })
    }

    /// Bytes this table occupies in the decompressed stream.
    fn stream_length(&self) -> u32 {
        self.transform_length.unwrap_or(self.orig_length)
    }
}

/// Unwrap a WOFF2 file: one Brotli stream, then per-table untransforms.
pub fn decode(data: &[u8]) -> Result<FontContainer, ConvertError> {
    let mut input = data;
    let header = Woff2Header::parse(&mut input)?;

    let mut entries = Vec::with_capacity(header.num_tables as usize);
    for _ in 0..header.num_tables {
        let entry = Woff2TableEntry::parse(&mut input)?;
        bail_container_if!(
            entries.iter().any(|e: &Woff2TableEntry| e.tag == entry.tag),
            "duplicate table tag"
        );
        entries.push(entry);
    }

    let stream_total: usize = entries.iter().map(|e| e.stream_length() as usize).sum();
    let compressed_start = data.len() - input.remaining();
    bail_container_if!(
        header.total_compressed_size as usize > input.remaining(),
        "compressed stream exceeds file"
    );
    let compressed =
        &data[compressed_start..compressed_start + header.total_compressed_size as usize];

    let mut stream: Vec<u8> = Vec::with_capacity(stream_total);
    brotli::BrotliDecompress(&mut std::io::Cursor::new(compressed), &mut stream)
        .map_err(|_| ConvertError::CorruptContainer("brotli stream is damaged"))?;
    bail_container_if!(
        stream.len() != stream_total,
        "decompressed size does not match directory"
    );

    // First pass: slice each table's span of the decompressed stream.
    let mut spans: Vec<&[u8]> = Vec::with_capacity(entries.len());
    let mut offset = 0usize;
    for entry in &entries {
        let len = entry.stream_length() as usize;
        spans.push(&stream[offset..offset + len]);
        offset += len;
    }

    // Untransform glyf first; hmtx reconstruction needs its per-glyph x_mins.
    let glyf_data = entries
        .iter()
        .zip(&spans)
        .find(|(e, _)| e.tag == GLYF && e.transform_length.is_some())
        .map(|(_, span)| glyf_decode::reconstruct_glyf(span))
        .transpose()?;

    if let Some(glyf) = &glyf_data {
        let loca_entry = entries
            .iter()
            .find(|e| e.tag == LOCA)
            .ok_or(ConvertError::CorruptContainer("transformed glyf without loca"))?;
        bail_container_if!(
            loca_entry.transform_length.is_none(),
            "transformed glyf but untransformed loca"
        );
        bail_container_if!(
            loca_entry.orig_length as usize != glyf.loca.len(),
            "loca length does not match glyph count"
        );
    }

    let mut font = FontContainer::new(Flavor::Woff2, header.flavor);
    for (entry, span) in entries.iter().zip(&spans) {
        let table_data = match entry.tag {
            GLYF if entry.transform_length.is_some() => {
                glyf_data.as_ref().map(|g| g.glyf.clone()).unwrap()
            }
            LOCA if entry.transform_length.is_some() => {
                // presence of glyf_data checked above
                glyf_data.as_ref().map(|g| g.loca.clone()).unwrap()
            }
            HMTX if entry.transform_length.is_some() => {
                let glyf = glyf_data.as_ref().ok_or(ConvertError::CorruptContainer(
                    "transformed hmtx requires transformed glyf",
                ))?;
                let num_hmetrics = read_num_hmetrics(&font)?;
                let hmtx =
                    hmtx::reconstruct_hmtx(span, glyf.num_glyphs, num_hmetrics, &glyf.x_mins)?;
                bail_container_if!(
                    hmtx.len() != entry.orig_length as usize,
                    "hmtx length does not match directory"
                );
                hmtx
            }
            _ => {
                bail_container_if!(
                    span.len() != entry.orig_length as usize,
                    "table length does not match directory"
                );
                span.to_vec()
            }
        };
        font.insert(entry.tag, table_data);
    }

    if let Some(glyf) = &glyf_data {
        check_glyf_consistency(&mut font, glyf)?;
    }

    Ok(font)
}

/// numberOfHMetrics from `hhea`, which by directory order precedes `hmtx` in
/// the stream and has already been inserted.
fn read_num_hmetrics(font: &FontContainer) -> Result<u16, ConvertError> {
    let hhea = font
        .table(HHEA)
        .ok_or(ConvertError::CorruptContainer("transformed hmtx without hhea"))?;
    let mut field = hhea
        .get(34..36)
        .ok_or(ConvertError::CorruptTable(HHEA))?;
    Ok(field.try_get_u16()?)
}

/// Cross-check the reconstructed glyph count against `maxp` and make `head`
/// agree with the loca format actually produced.
fn check_glyf_consistency(
    font: &mut FontContainer,
    glyf: &glyf_decode::GlyfAndLoca,
) -> Result<(), ConvertError> {
    let maxp = font
        .table(MAXP)
        .ok_or(ConvertError::CorruptContainer("font without maxp"))?;
    let mut field = maxp.get(4..6).ok_or(ConvertError::CorruptTable(MAXP))?;
    let num_glyphs = field.try_get_u16()?;
    bail_container_if!(
        num_glyphs != glyf.num_glyphs,
        "glyph count disagrees with maxp"
    );

    let head = font
        .table(HEAD)
        .ok_or(ConvertError::CorruptContainer("font without head"))?;
    bail_container_if!(head.len() < 54, "head table too short");
    let mut head = head.to_vec();
    head[50..52].copy_from_slice(&glyf.index_format.to_be_bytes());
    font.insert(HEAD, head);
    Ok(())
}

/// Wrap the table set in a WOFF2 container. `glyf` and `loca` are always
/// stored transformed; every other table gets the null transform.
pub fn encode(font: &FontContainer) -> Result<Vec<u8>, ConvertError> {
    let mut tables = sfnt::normalized_tables(font)?;
    let total_sfnt_size = sfnt::encoded_size(&tables) as u32;

    // The loca entry must directly follow glyf in the WOFF2 directory; only
    // the reconstructed sfnt directory is tag-sorted.
    if let (Some(glyf_pos), Some(loca_pos)) = (
        tables.iter().position(|t| t.tag == GLYF),
        tables.iter().position(|t| t.tag == LOCA),
    ) && loca_pos != glyf_pos + 1
    {
        let loca = tables.remove(loca_pos);
        let glyf_pos = if loca_pos < glyf_pos {
            glyf_pos - 1
        } else {
            glyf_pos
        };
        tables.insert(glyf_pos + 1, loca);
    }

    let transformed_glyf = match (font.table(GLYF), font.table(LOCA)) {
        (Some(glyf), Some(loca)) => {
            let (num_glyphs, index_format) = glyf_metrics(font)?;
            Some(glyf_encode::transform_glyf(
                glyf,
                loca,
                num_glyphs,
                index_format,
            )?)
        }
        _ => None,
    };

    // Table data as it enters the compression stream, in directory order.
    let mut stream: Vec<u8> = Vec::new();
    let mut directory: Vec<u8> = Vec::new();
    for table in &tables {
        let (flags_version, stored): (u8, &[u8]) = match table.tag {
            GLYF if transformed_glyf.is_some() => (0, transformed_glyf.as_deref().unwrap()),
            LOCA if transformed_glyf.is_some() => (0, &[]),
            GLYF | LOCA => (NULL_TRANSFORM_GLYF_LOCA, &table.data),
            _ => (0, &table.data),
        };
        let transformed = table.tag == GLYF && transformed_glyf.is_some()
            || table.tag == LOCA && transformed_glyf.is_some();

        let tag_bits = known_tag_index(table.tag).unwrap_or(0x3f);
        directory.put_u8(tag_bits | (flags_version << 6));
        if tag_bits == 0x3f {
            directory.put_slice(&table.tag.to_be_bytes());
        }
        put_variable_128_u32(&mut directory, table.data.len() as u32);
        if transformed {
            put_variable_128_u32(&mut directory, stored.len() as u32);
        }
        stream.extend_from_slice(stored);
    }

    let mut compressed: Vec<u8> = Vec::with_capacity(stream.len() / 2 + 64);
    let params = brotli::enc::BrotliEncoderParams {
        quality: 11,
        ..Default::default()
    };
    brotli::BrotliCompress(
        &mut std::io::Cursor::new(&stream),
        &mut compressed,
        &params,
    )
    .map_err(|_| ConvertError::CorruptContainer("brotli compression failed"))?;

    let mut out: Vec<u8> =
        Vec::with_capacity(WOFF2_HEADER_SIZE + directory.len() + compressed.len());
    out.put_slice(&WOFF2_SIG.to_be_bytes());
    out.put_slice(&font.sfnt_version().to_be_bytes());
    out.put_u32(0); // length, patched below
    out.put_u16(tables.len() as u16);
    out.put_u16(0); // reserved
    out.put_u32(total_sfnt_size);
    out.put_u32(compressed.len() as u32);
    out.put_u16(1); // majorVersion
    out.put_u16(0); // minorVersion
    out.put_u32(0); // metaOffset
    out.put_u32(0); // metaLength
    out.put_u32(0); // metaOrigLength
    out.put_u32(0); // privOffset
    out.put_u32(0); // privLength
    out.put_slice(&directory);
    out.put_slice(&compressed);

    let length = out.len() as u32;
    out[8..12].copy_from_slice(&length.to_be_bytes());
    Ok(out)
}

/// numGlyphs from `maxp` and indexToLocFormat from `head`, both needed to
/// drive the glyf transform.
fn glyf_metrics(font: &FontContainer) -> Result<(u16, u16), ConvertError> {
    let maxp = font
        .table(MAXP)
        .ok_or(ConvertError::CorruptContainer("font without maxp"))?;
    let mut field = maxp.get(4..6).ok_or(ConvertError::CorruptTable(MAXP))?;
    let num_glyphs = field.try_get_u16()?;

    let head = font
        .table(HEAD)
        .ok_or(ConvertError::CorruptContainer("font without head"))?;
    let mut field = head.get(50..52).ok_or(ConvertError::CorruptTable(HEAD))?;
    let index_format = field.try_get_u16()?;
    bail_container_if!(index_format > 1, "invalid indexToLocFormat");

    Ok((num_glyphs, index_format))
}

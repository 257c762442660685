//! Minimal CFF table reader: just enough structure to locate and interpret
//! the Type 2 charstrings of every glyph.
//!
//! Adobe Technical Notes #5176 (CFF) and #5177 (Type 2 charstrings).

pub(crate) mod charstring;

use bytes::Buf;

use crate::error::{ConvertError, bail_table_if, usize_will_overflow};
use crate::tables::CFF;

/// One CFF INDEX: offsets into a shared data block.
pub(crate) struct Index<'a> {
    data: &'a [u8],
    /// 1-based offsets as stored, converted to 0-based; `offsets.len()` is
    /// `count + 1`.
    offsets: Vec<u32>,
}

impl<'a> Index<'a> {
    fn parse(input: &mut &'a [u8]) -> Result<Index<'a>, ConvertError> {
        let count = input.try_get_u16()? as usize;
        if count == 0 {
            return Ok(Index::empty());
        }
        let off_size = input.try_get_u8()?;
        bail_table_if!(!(1..=4).contains(&off_size), CFF);

        let mut offsets = Vec::with_capacity(count + 1);
        for _ in 0..=count {
            let offset = match off_size {
                1 => input.try_get_u8()? as u32,
                2 => input.try_get_u16()? as u32,
                3 => {
                    let high = input.try_get_u8()? as u32;
                    let low = input.try_get_u16()? as u32;
                    (high << 16) | low
                }
                _ => input.try_get_u32()?,
            };
            bail_table_if!(offset == 0, CFF);
            if let Some(&prev) = offsets.last() {
                bail_table_if!(offset < prev, CFF);
            }
            offsets.push(offset - 1);
        }

        let data_len = *offsets.last().unwrap() as usize;
        bail_table_if!(input.len() < data_len, CFF);
        let (data, rest) = input.split_at(data_len);
        *input = rest;
        Ok(Index { data, offsets })
    }

    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&'a [u8]> {
        let start = *self.offsets.get(index)? as usize;
        let end = *self.offsets.get(index + 1)? as usize;
        self.data.get(start..end)
    }

    fn empty() -> Index<'a> {
        Index {
            data: &[],
            offsets: vec![0],
        }
    }
}

// Top DICT operators (two-byte operators are 1200 + second byte).
const OP_CHARSET: u16 = 15;
const OP_CHAR_STRINGS: u16 = 17;
const OP_PRIVATE: u16 = 18;
const OP_SUBRS: u16 = 19;
const OP_CHARSTRING_TYPE: u16 = 1206;
const OP_ROS: u16 = 1230;
const OP_FD_ARRAY: u16 = 1236;
const OP_FD_SELECT: u16 = 1237;

/// A parsed DICT: operator keys with their operand lists, in order.
struct Dict {
    entries: Vec<(u16, Vec<f64>)>,
}

impl Dict {
    fn parse(mut input: &[u8]) -> Result<Dict, ConvertError> {
        let mut entries = Vec::new();
        let mut operands: Vec<f64> = Vec::new();
        while !input.is_empty() {
            let b0 = input.try_get_u8()?;
            match b0 {
                0..=21 => {
                    let op: u16 = if b0 == 12 {
                        1200 + input.try_get_u8()? as u16
                    } else {
                        b0 as u16
                    };
                    entries.push((op, std::mem::take(&mut operands)));
                }
                28 => operands.push(input.try_get_i16()? as f64),
                29 => operands.push(input.try_get_i32()? as f64),
                30 => operands.push(parse_real(&mut input)?),
                32..=246 => operands.push(b0 as f64 - 139.0),
                247..=250 => {
                    let b1 = input.try_get_u8()? as f64;
                    operands.push((b0 as f64 - 247.0) * 256.0 + b1 + 108.0);
                }
                251..=254 => {
                    let b1 = input.try_get_u8()? as f64;
                    operands.push(-(b0 as f64 - 251.0) * 256.0 - b1 - 108.0);
                }
                _ => return Err(ConvertError::CorruptTable(CFF)),
            }
            bail_table_if!(operands.len() > 48, CFF);
        }
        Ok(Dict { entries })
    }

    fn get(&self, op: u16) -> Option<&[f64]> {
        self.entries
            .iter()
            .find(|(key, _)| *key == op)
            .map(|(_, operands)| operands.as_slice())
    }

    fn get_offset(&self, op: u16) -> Option<usize> {
        match self.get(op) {
            Some(&[value]) if value >= 0.0 => Some(value as usize),
            _ => None,
        }
    }
}

/// Nibble-encoded real number. The exact value is irrelevant for outline
/// work, but the operand count must stay correct.
fn parse_real(input: &mut &[u8]) -> Result<f64, ConvertError> {
    let mut text = String::new();
    loop {
        let byte = input.try_get_u8()?;
        for nibble in [byte >> 4, byte & 0x0f] {
            match nibble {
                0..=9 => text.push((b'0' + nibble) as char),
                0x0a => text.push('.'),
                0x0b => text.push('E'),
                0x0c => text.push_str("E-"),
                0x0e => text.push('-'),
                0x0f => return Ok(text.parse().unwrap_or(0.0)),
                _ => return Err(ConvertError::CorruptTable(CFF)),
            }
        }
    }
}

/// Glyph to SID mapping, needed to resolve seac accent codes.
enum Charset {
    /// The ISOAdobe/Expert predefined charsets where SID == glyph id for the
    /// fonts we care about.
    Identity,
    Sids(Vec<u16>),
}

impl Charset {
    fn parse(data: &[u8], offset: usize, num_glyphs: u16) -> Result<Charset, ConvertError> {
        if offset <= 2 {
            return Ok(Charset::Identity);
        }
        let mut input = data.get(offset..).ok_or(ConvertError::CorruptTable(CFF))?;
        let format = input.try_get_u8()?;
        let mut sids: Vec<u16> = Vec::with_capacity(num_glyphs as usize);
        sids.push(0); // .notdef
        match format {
            0 => {
                while sids.len() < num_glyphs as usize {
                    sids.push(input.try_get_u16()?);
                }
            }
            1 | 2 => {
                while sids.len() < num_glyphs as usize {
                    let first = input.try_get_u16()?;
                    let n_left = if format == 1 {
                        input.try_get_u8()? as u32
                    } else {
                        input.try_get_u16()? as u32
                    };
                    for i in 0..=n_left {
                        if sids.len() == num_glyphs as usize {
                            break;
                        }
                        sids.push(first.wrapping_add(i as u16));
                    }
                }
            }
            _ => return Err(ConvertError::CorruptTable(CFF)),
        }
        Ok(Charset::Sids(sids))
    }

    fn sid_to_gid(&self, sid: u16) -> Option<u16> {
        match self {
            Charset::Identity => Some(sid),
            Charset::Sids(sids) => sids.iter().position(|&s| s == sid).map(|gid| gid as u16),
        }
    }
}

/// Per-glyph font dict selection for CID-keyed fonts.
enum FdSelect {
    /// Format 0: one byte per glyph.
    ByGlyph(Vec<u8>),
    /// Format 3: ranges of (first glyph, fd index).
    Ranges { ranges: Vec<(u16, u8)>, sentinel: u16 },
}

impl FdSelect {
    fn parse(data: &[u8], offset: usize, num_glyphs: u16) -> Result<FdSelect, ConvertError> {
        let mut input = data.get(offset..).ok_or(ConvertError::CorruptTable(CFF))?;
        let format = input.try_get_u8()?;
        match format {
            0 => {
                let mut fds = Vec::with_capacity(num_glyphs as usize);
                for _ in 0..num_glyphs {
                    fds.push(input.try_get_u8()?);
                }
                Ok(FdSelect::ByGlyph(fds))
            }
            3 => {
                let n_ranges = input.try_get_u16()?;
                bail_table_if!(n_ranges == 0, CFF);
                let mut ranges = Vec::with_capacity(n_ranges as usize);
                for _ in 0..n_ranges {
                    let first = input.try_get_u16()?;
                    let fd = input.try_get_u8()?;
                    ranges.push((first, fd));
                }
                let sentinel = input.try_get_u16()?;
                Ok(FdSelect::Ranges { ranges, sentinel })
            }
            _ => Err(ConvertError::CorruptTable(CFF)),
        }
    }

    fn font_dict_index(&self, glyph_id: u16) -> Option<u8> {
        match self {
            FdSelect::ByGlyph(fds) => fds.get(glyph_id as usize).copied(),
            FdSelect::Ranges { ranges, sentinel } => {
                if glyph_id >= *sentinel {
                    return None;
                }
                match ranges.binary_search_by_key(&glyph_id, |&(first, _)| first) {
                    Ok(i) => Some(ranges[i].1),
                    Err(0) => None,
                    Err(i) => Some(ranges[i - 1].1),
                }
            }
        }
    }
}

enum FontKind<'a> {
    Type1 {
        local_subrs: Index<'a>,
    },
    Cid {
        local_subrs: Vec<Index<'a>>,
        fd_select: FdSelect,
    },
}

/// A parsed `CFF ` table, reduced to what outline extraction needs.
pub(crate) struct CffFont<'a> {
    char_strings: Index<'a>,
    global_subrs: Index<'a>,
    kind: FontKind<'a>,
    charset: Charset,
}

impl<'a> CffFont<'a> {
    pub fn parse(data: &'a [u8]) -> Result<CffFont<'a>, ConvertError> {
        let mut input = data;
        let major = input.try_get_u8()?;
        let _minor = input.try_get_u8()?;
        bail_table_if!(major != 1, CFF);
        let hdr_size = input.try_get_u8()? as usize;
        let _off_size = input.try_get_u8()?;
        bail_table_if!(hdr_size < 4 || hdr_size > data.len(), CFF);

        let mut rest = &data[hdr_size..];
        let _names = Index::parse(&mut rest)?;
        let top_dicts = Index::parse(&mut rest)?;
        let _strings = Index::parse(&mut rest)?;
        let global_subrs = Index::parse(&mut rest)?;

        let top_dict_data = top_dicts.get(0).ok_or(ConvertError::CorruptTable(CFF))?;
        let top_dict = Dict::parse(top_dict_data)?;

        if let Some(&[charstring_type]) = top_dict.get(OP_CHARSTRING_TYPE) {
            bail_table_if!(charstring_type != 2.0, CFF);
        }

        let char_strings_offset = top_dict
            .get_offset(OP_CHAR_STRINGS)
            .ok_or(ConvertError::CorruptTable(CFF))?;
        let mut at_charstrings = data
            .get(char_strings_offset..)
            .ok_or(ConvertError::CorruptTable(CFF))?;
        let char_strings = Index::parse(&mut at_charstrings)?;
        let num_glyphs = char_strings.len() as u16;
        bail_table_if!(num_glyphs == 0, CFF);

        let kind = if top_dict.get(OP_ROS).is_some() {
            let fd_array_offset = top_dict
                .get_offset(OP_FD_ARRAY)
                .ok_or(ConvertError::CorruptTable(CFF))?;
            let fd_select_offset = top_dict
                .get_offset(OP_FD_SELECT)
                .ok_or(ConvertError::CorruptTable(CFF))?;

            let mut at_fd_array = data
                .get(fd_array_offset..)
                .ok_or(ConvertError::CorruptTable(CFF))?;
            let fd_array = Index::parse(&mut at_fd_array)?;
            let mut local_subrs = Vec::with_capacity(fd_array.len());
            for i in 0..fd_array.len() {
                let font_dict =
                    Dict::parse(fd_array.get(i).ok_or(ConvertError::CorruptTable(CFF))?)?;
                local_subrs.push(parse_private_subrs(data, &font_dict)?);
            }
            let fd_select = FdSelect::parse(data, fd_select_offset, num_glyphs)?;
            FontKind::Cid {
                local_subrs,
                fd_select,
            }
        } else {
            FontKind::Type1 {
                local_subrs: parse_private_subrs(data, &top_dict)?,
            }
        };

        let charset = match top_dict.get_offset(OP_CHARSET) {
            Some(offset) => Charset::parse(data, offset, num_glyphs)?,
            None => Charset::Identity,
        };

        Ok(CffFont {
            char_strings,
            global_subrs,
            kind,
            charset,
        })
    }

    pub fn num_glyphs(&self) -> u16 {
        self.char_strings.len() as u16
    }

    pub fn char_string(&self, glyph_id: u16) -> Option<&'a [u8]> {
        self.char_strings.get(glyph_id as usize)
    }

    pub fn global_subrs(&self) -> &Index<'a> {
        &self.global_subrs
    }

    pub fn local_subrs(&self, glyph_id: u16) -> Option<&Index<'a>> {
        match &self.kind {
            FontKind::Type1 { local_subrs } => Some(local_subrs),
            FontKind::Cid {
                local_subrs,
                fd_select,
            } => {
                let fd = fd_select.font_dict_index(glyph_id)?;
                local_subrs.get(fd as usize)
            }
        }
    }

    /// Resolve a seac char code through the standard encoding and the
    /// font's charset.
    pub fn seac_code_to_glyph_id(&self, code: u8) -> Option<u16> {
        let sid = STANDARD_ENCODING[code as usize] as u16;
        if sid == 0 {
            return None;
        }
        self.charset.sid_to_gid(sid)
    }
}

/// Local subrs live in the Private DICT, at an offset relative to the
/// Private DICT itself.
fn parse_private_subrs<'a>(
    data: &'a [u8],
    dict: &Dict,
) -> Result<Index<'a>, ConvertError> {
    let Some(&[size, offset]) = dict.get(OP_PRIVATE) else {
        return Ok(Index::empty());
    };
    bail_table_if!(size < 0.0 || offset < 0.0, CFF);
    let (size, offset) = (size as usize, offset as usize);
    bail_table_if!(usize_will_overflow(offset, size), CFF);
    let private_data = data
        .get(offset..offset + size)
        .ok_or(ConvertError::CorruptTable(CFF))?;
    let private_dict = Dict::parse(private_data)?;

    match private_dict.get_offset(OP_SUBRS) {
        Some(subrs_offset) => {
            bail_table_if!(usize_will_overflow(offset, subrs_offset), CFF);
            let mut at_subrs = data
                .get(offset + subrs_offset..)
                .ok_or(ConvertError::CorruptTable(CFF))?;
            Index::parse(&mut at_subrs)
        }
        None => Ok(Index::empty()),
    }
}

/// SID for each code in the Adobe standard encoding (CFF spec Appendix B).
/// Zero entries have no glyph assigned.
static STANDARD_ENCODING: [u8; 256] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
    1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, //
    17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32, //
    33, 34, 35, 36, 37, 38, 39, 40, 41, 42, 43, 44, 45, 46, 47, 48, //
    49, 50, 51, 52, 53, 54, 55, 56, 57, 58, 59, 60, 61, 62, 63, 64, //
    65, 66, 67, 68, 69, 70, 71, 72, 73, 74, 75, 76, 77, 78, 79, 80, //
    81, 82, 83, 84, 85, 86, 87, 88, 89, 90, 91, 92, 93, 94, 95, 0, //
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
    0, 96, 97, 98, 99, 100, 101, 102, 103, 104, 105, 106, 107, 108, 109, 110, //
    0, 111, 112, 113, 114, 0, 115, 116, 117, 118, 119, 120, 121, 122, 0, 123, //
    0, 124, 125, 126, 127, 128, 129, 130, 131, 0, 132, 133, 0, 134, 135, 136, //
    137, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, //
    0, 138, 0, 139, 0, 0, 0, 0, 140, 141, 142, 143, 0, 0, 0, 0, //
    0, 144, 0, 0, 0, 145, 0, 0, 146, 147, 148, 149, 0, 0, 0, 0, //
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_index_off_size_one() {
        // count=2, offSize=1, offsets [1, 3, 6], data "ab" "cde"
        let raw: &[u8] = &[0, 2, 1, 1, 3, 6, b'a', b'b', b'c', b'd', b'e'];
        let mut input = raw;
        let index = Index::parse(&mut input).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(0), Some(&b"ab"[..]));
        assert_eq!(index.get(1), Some(&b"cde"[..]));
        assert!(input.is_empty());
    }

    #[test]
    fn empty_index_is_two_bytes() {
        let raw: &[u8] = &[0, 0, 9, 9];
        let mut input = raw;
        let index = Index::parse(&mut input).unwrap();
        assert_eq!(index.len(), 0);
        assert!(index.get(0).is_none());
        assert_eq!(input, &[9, 9]);
    }

    #[test]
    fn rejects_decreasing_index_offsets() {
        let raw: &[u8] = &[0, 2, 1, 1, 5, 3, 0, 0, 0, 0];
        let mut input = raw;
        assert!(Index::parse(&mut input).is_err());
    }

    #[test]
    fn dict_round_trips_operand_encodings() {
        // 28 (i16 300), 29 (i32 70000), int1 (-20), op 17;
        // 247-form (108), op 12 06 (CharstringType)
        let raw: &[u8] = &[
            28, 0x01, 0x2C, 29, 0x00, 0x01, 0x11, 0x70, 119, 17, 247, 0, 12, 6,
        ];
        let dict = Dict::parse(raw).unwrap();
        assert_eq!(dict.get(OP_CHAR_STRINGS), Some(&[300.0, 70000.0, -20.0][..]));
        assert_eq!(dict.get(OP_CHARSTRING_TYPE), Some(&[108.0][..]));
    }

    #[test]
    fn real_numbers_keep_operand_alignment() {
        // -2.25 as nibbles: e 2 a 2 5 f, then op 15 (charset)
        let raw: &[u8] = &[30, 0xe2, 0xa2, 0x5f, 15];
        let dict = Dict::parse(raw).unwrap();
        assert_eq!(dict.get(OP_CHARSET), Some(&[-2.25][..]));
    }

    #[test]
    fn oversized_private_dict_range_is_an_error() {
        // Private size 9e99 (nibbles 9 E 9 9) saturates to usize::MAX when
        // cast; offset 1 then overflows the range end
        let raw: &[u8] = &[30, 0x9b, 0x99, 0xff, 140, 18];
        let dict = Dict::parse(raw).unwrap();
        assert!(parse_private_subrs(&[0u8; 8], &dict).is_err());
    }

    #[test]
    fn oversized_subrs_offset_is_an_error() {
        // Private DICT at offset 1 whose Subrs offset is 9e99
        let data: &[u8] = &[0, 30, 0x9b, 0x99, 0xff, 19];
        let top: &[u8] = &[144, 140, 18]; // Private size 5, offset 1
        let dict = Dict::parse(top).unwrap();
        assert!(parse_private_subrs(data, &dict).is_err());
    }

    #[test]
    fn fd_select_format_3_lookup() {
        let select = FdSelect::Ranges {
            ranges: vec![(0, 0), (10, 1), (20, 2)],
            sentinel: 30,
        };
        assert_eq!(select.font_dict_index(0), Some(0));
        assert_eq!(select.font_dict_index(9), Some(0));
        assert_eq!(select.font_dict_index(10), Some(1));
        assert_eq!(select.font_dict_index(25), Some(2));
        assert_eq!(select.font_dict_index(30), None);
    }

    #[test]
    fn standard_encoding_space_is_sid_one() {
        assert_eq!(STANDARD_ENCODING[b' ' as usize], 1);
        assert_eq!(STANDARD_ENCODING[b'A' as usize], 34);
        assert_eq!(STANDARD_ENCODING[0], 0);
    }
}

//! Reconstruction of `glyf` and `loca` from the WOFF2 transformed glyf table.
//!
//! <https://www.w3.org/TR/WOFF2/#glyf_table_format>

use arrayvec::ArrayVec;
use bytes::Buf;

use crate::error::{ConvertError, bail_container_if};
use crate::glyf::{
    CompositeGlyph, Glyph, Point, SimpleGlyph, build_glyf, build_loca, compute_bbox,
};
use crate::woff2::varint::BufVariableExt as _;

pub(crate) const NUM_SUB_STREAMS: usize = 7;
pub(crate) const FLAG_OVERLAP_SIMPLE_BITMAP: u16 = 1 << 0;

pub(crate) struct GlyfAndLoca {
    pub num_glyphs: u16,
    /// loca index format, also needed to patch `head`
    pub index_format: u16,
    /// x_min of every glyph (0 for empty glyphs), for `hmtx` reconstruction
    pub x_mins: Vec<i16>,
    pub glyf: Vec<u8>,
    pub loca: Vec<u8>,
}

pub(crate) fn reconstruct_glyf(data: &[u8]) -> Result<GlyfAndLoca, ConvertError> {
    GlyfReader::new(data)?.reconstruct()
}

struct GlyfReader<'a> {
    n_contour_stream: &'a [u8],
    n_points_stream: &'a [u8],
    flag_stream: &'a [u8],
    glyph_stream: &'a [u8],
    composite_stream: &'a [u8],
    bbox_bitmap: &'a [u8],
    bbox_stream: &'a [u8],
    instruction_stream: &'a [u8],
    overlap_bitmap: Option<&'a [u8]>,

    num_glyphs: u16,
    index_format: u16,
}

fn take<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], ConvertError> {
    bail_container_if!(input.len() < n, "unexpected end of data");
    let (taken, rest) = input.split_at(n);
    *input = rest;
    Ok(taken)
}

impl<'a> GlyfReader<'a> {
    fn new(data: &'a [u8]) -> Result<GlyfReader<'a>, ConvertError> {
        let mut input = data;
        let _reserved: u16 = input.try_get_u16()?;
        let flags: u16 = input.try_get_u16()?;
        let has_overlap_bitmap = flags & FLAG_OVERLAP_SIMPLE_BITMAP != 0;
        let num_glyphs = input.try_get_u16()?;
        let index_format = input.try_get_u16()?;
        bail_container_if!(index_format > 1, "invalid loca index format");

        let mut offset: usize = (2 + NUM_SUB_STREAMS) * 4;
        bail_container_if!(offset > data.len(), "transformed glyf header truncated");

        let mut substreams: ArrayVec<&[u8], NUM_SUB_STREAMS> = ArrayVec::new();
        for _ in 0..NUM_SUB_STREAMS {
            let substream_size = input.try_get_u32()? as usize;
            bail_container_if!(
                substream_size > data.len() - offset,
                "glyf substream exceeds table"
            );
            substreams.push(&data[offset..offset + substream_size]);
            offset += substream_size;
        }

        let bitmap_length = ((num_glyphs as usize + 31) >> 5) << 2;
        bail_container_if!(
            bitmap_length > substreams[5].len(),
            "bbox bitmap exceeds substream"
        );
        let (bbox_bitmap, bbox_stream) = substreams[5].split_at(bitmap_length);

        let overlap_bitmap = if has_overlap_bitmap {
            let overlap_bitmap_length = (num_glyphs as usize + 7) >> 3;
            bail_container_if!(
                overlap_bitmap_length > data.len() - offset,
                "overlap bitmap exceeds table"
            );
            Some(&data[offset..offset + overlap_bitmap_length])
        } else {
            None
        };

        Ok(GlyfReader {
            n_contour_stream: substreams[0],
            n_points_stream: substreams[1],
            flag_stream: substreams[2],
            glyph_stream: substreams[3],
            composite_stream: substreams[4],
            bbox_bitmap,
            bbox_stream,
            instruction_stream: substreams[6],
            overlap_bitmap,
            num_glyphs,
            index_format,
        })
    }

    fn reconstruct(mut self) -> Result<GlyfAndLoca, ConvertError> {
        let mut glyphs: Vec<Glyph> = Vec::with_capacity(self.num_glyphs as usize);
        let mut x_mins: Vec<i16> = Vec::with_capacity(self.num_glyphs as usize);

        for i in 0..self.num_glyphs as usize {
            let n_contours = self.n_contour_stream.try_get_i16()?;
            let has_bbox = self.bbox_bitmap[i >> 3] & (0x80 >> (i & 7)) != 0;

            let glyph = if n_contours == -1 {
                // composite glyphs must carry an explicit bbox
                bail_container_if!(!has_bbox, "composite glyph without bbox");
                self.read_composite_glyph()?
            } else if n_contours > 0 {
                let has_overlap_bit = self
                    .overlap_bitmap
                    .is_some_and(|bitmap| bitmap[i >> 3] & (0x80 >> (i & 7)) != 0);
                self.read_simple_glyph(n_contours as usize, has_bbox, has_overlap_bit)?
            } else {
                bail_container_if!(n_contours < -1, "invalid contour count");
                bail_container_if!(has_bbox, "empty glyph with bbox");
                Glyph::Empty
            };

            x_mins.push(match &glyph {
                Glyph::Empty => 0,
                Glyph::Simple(simple) => simple.bbox[0],
                Glyph::Composite(composite) => composite.bbox[0],
            });
            glyphs.push(glyph);
        }

        let (glyf, offsets) = build_glyf(&glyphs);
        let loca = build_loca(&offsets, self.index_format);
        if self.index_format == 0 {
            bail_container_if!(
                *offsets.last().unwrap_or(&0) > 0x1FFFE,
                "glyf too large for short loca"
            );
        }

        Ok(GlyfAndLoca {
            num_glyphs: self.num_glyphs,
            index_format: self.index_format,
            x_mins,
            glyf,
            loca,
        })
    }

    fn read_simple_glyph(
        &mut self,
        n_contours: usize,
        has_bbox: bool,
        has_overlap_bit: bool,
    ) -> Result<Glyph, ConvertError> {
        let mut end_pts: Vec<u16> = Vec::with_capacity(n_contours);
        let mut end_point: i64 = -1;
        for _ in 0..n_contours {
            let n_points_contour = self.n_points_stream.try_get_variable_255_u16()?;
            bail_container_if!(n_points_contour == 0, "empty contour");
            end_point += n_points_contour as i64;
            bail_container_if!(end_point >= 65536, "too many points in glyph");
            end_pts.push(end_point as u16);
        }
        let total_n_points = (end_point + 1) as usize;

        bail_container_if!(
            total_n_points > self.flag_stream.len(),
            "flag stream exhausted"
        );
        let (flags, flag_rest) = self.flag_stream.split_at(total_n_points);
        let mut points = Vec::with_capacity(total_n_points);
        let triplet_bytes = decode_triplet(flags, self.glyph_stream, &mut points)?;
        self.flag_stream = flag_rest;
        self.glyph_stream.advance(triplet_bytes);

        let instruction_size = self.glyph_stream.try_get_variable_255_u16()? as usize;
        let instructions = take(&mut self.instruction_stream, instruction_size)?.to_vec();

        let bbox = if has_bbox {
            let mut raw = take(&mut self.bbox_stream, 8)?;
            [
                raw.try_get_i16()?,
                raw.try_get_i16()?,
                raw.try_get_i16()?,
                raw.try_get_i16()?,
            ]
        } else {
            compute_bbox(&points)
        };

        Ok(Glyph::Simple(SimpleGlyph {
            end_pts,
            points,
            instructions,
            bbox,
            overlap_simple: has_overlap_bit,
        }))
    }

    fn read_composite_glyph(&mut self) -> Result<Glyph, ConvertError> {
        let mut probe = self.composite_stream;
        let (composite_size, have_instructions) = size_of_composite(&mut probe)?;
        let components = take(&mut self.composite_stream, composite_size)?.to_vec();

        let instructions = if have_instructions {
            let instruction_size = self.glyph_stream.try_get_variable_255_u16()? as usize;
            Some(take(&mut self.instruction_stream, instruction_size)?.to_vec())
        } else {
            None
        };

        let mut raw = take(&mut self.bbox_stream, 8)?;
        let bbox = [
            raw.try_get_i16()?,
            raw.try_get_i16()?,
            raw.try_get_i16()?,
            raw.try_get_i16()?,
        ];

        Ok(Glyph::Composite(CompositeGlyph {
            components,
            instructions,
            bbox,
        }))
    }
}

/// Walk the component records of one composite glyph, returning their total
/// size in bytes and whether any component carries instructions.
fn size_of_composite(composite_stream: &mut impl Buf) -> Result<(usize, bool), ConvertError> {
    use crate::glyf::{
        ARG_1_AND_2_ARE_WORDS, MORE_COMPONENTS, WE_HAVE_A_SCALE, WE_HAVE_AN_X_AND_Y_SCALE,
        WE_HAVE_A_TWO_BY_TWO, WE_HAVE_INSTRUCTIONS,
    };

    let mut bytes_read: usize = 0;
    let mut have_instructions = false;
    let mut flags = MORE_COMPONENTS;
    while flags & MORE_COMPONENTS != 0 {
        flags = composite_stream.try_get_u16()?;
        have_instructions |= flags & WE_HAVE_INSTRUCTIONS != 0;
        let mut arg_size: usize = 2; // glyph index
        arg_size += if flags & ARG_1_AND_2_ARE_WORDS != 0 { 4 } else { 2 };
        if flags & WE_HAVE_A_SCALE != 0 {
            arg_size += 2;
        } else if flags & WE_HAVE_AN_X_AND_Y_SCALE != 0 {
            arg_size += 4;
        } else if flags & WE_HAVE_A_TWO_BY_TWO != 0 {
            arg_size += 8;
        }
        bail_container_if!(
            composite_stream.remaining() < arg_size,
            "composite stream exhausted"
        );
        composite_stream.advance(arg_size);
        bytes_read += 2 + arg_size;
    }
    Ok((bytes_read, have_instructions))
}

/// Decode one triplet-encoded point per flag byte, pushing absolute
/// coordinates. Returns the number of data bytes consumed.
pub(crate) fn decode_triplet(
    flags_in: &[u8],
    data: &[u8],
    result: &mut Vec<Point>,
) -> Result<usize, ConvertError> {
    #[inline(always)]
    fn with_sign(flag: i32, baseval: i32) -> i32 {
        if flag & 1 != 0 { baseval } else { -baseval }
    }

    let mut x: i32 = 0;
    let mut y: i32 = 0;
    let mut triplet_index: usize = 0;

    for &flag in flags_in {
        let on_curve = flag >> 7 == 0;
        let flag = (flag & 0x7f) as i32;

        let n_data_bytes: usize = if flag < 84 {
            1
        } else if flag < 120 {
            2
        } else if flag < 124 {
            3
        } else {
            4
        };
        bail_container_if!(
            triplet_index + n_data_bytes > data.len(),
            "glyph stream exhausted"
        );

        let dx: i32;
        let dy: i32;
        if flag < 10 {
            dx = 0;
            dy = with_sign(flag, ((flag & 14) << 7) + data[triplet_index] as i32);
        } else if flag < 20 {
            dx = with_sign(flag, (((flag - 10) & 14) << 7) + data[triplet_index] as i32);
            dy = 0;
        } else if flag < 84 {
            let b0 = flag - 20;
            let b1 = data[triplet_index] as i32;
            dx = with_sign(flag, 1 + (b0 & 0x30) + (b1 >> 4));
            dy = with_sign(flag >> 1, 1 + ((b0 & 0x0c) << 2) + (b1 & 0x0f));
        } else if flag < 120 {
            let b0 = flag - 84;
            dx = with_sign(flag, 1 + ((b0 / 12) << 8) + data[triplet_index] as i32);
            dy = with_sign(
                flag >> 1,
                1 + (((b0 % 12) >> 2) << 8) + data[triplet_index + 1] as i32,
            );
        } else if flag < 124 {
            let b2 = data[triplet_index + 1] as i32;
            dx = with_sign(flag, ((data[triplet_index] as i32) << 4) + (b2 >> 4));
            dy = with_sign(flag >> 1, ((b2 & 0x0f) << 8) + data[triplet_index + 2] as i32);
        } else {
            dx = with_sign(
                flag,
                ((data[triplet_index] as i32) << 8) + data[triplet_index + 1] as i32,
            );
            dy = with_sign(
                flag >> 1,
                ((data[triplet_index + 2] as i32) << 8) + data[triplet_index + 3] as i32,
            );
        }
        triplet_index += n_data_bytes;
        x = x
            .checked_add(dx)
            .ok_or(ConvertError::CorruptContainer("coordinate overflow"))?;
        y = y
            .checked_add(dy)
            .ok_or(ConvertError::CorruptContainer("coordinate overflow"))?;
        result.push(Point { x, y, on_curve });
    }

    Ok(triplet_index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_triplet_zero_dx() {
        // flag 5: dx = 0, dy = +((5 & 14) << 7) + data = 512 + 33
        let mut points = Vec::new();
        let consumed = decode_triplet(&[5], &[33], &mut points).unwrap();
        assert_eq!(consumed, 1);
        assert_eq!(points, vec![Point { x: 0, y: 545, on_curve: true }]);
    }

    #[test]
    fn decode_triplet_off_curve_bit() {
        let mut points = Vec::new();
        decode_triplet(&[0x80 | 5], &[33], &mut points).unwrap();
        assert!(!points[0].on_curve);
    }

    #[test]
    fn decode_triplet_exhausted_stream() {
        let mut points = Vec::new();
        assert!(decode_triplet(&[124], &[0, 0], &mut points).is_err());
    }
}

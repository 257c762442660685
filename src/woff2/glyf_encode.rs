//! The WOFF2 glyf transform in the compression direction: splitting `glyf`
//! records into the seven substreams and triplet-encoding point deltas.

use bytes::BufMut;

use crate::error::ConvertError;
use crate::glyf::{Glyph, Point, compute_bbox, parse_glyf, parse_loca};
use crate::woff2::glyf_decode::FLAG_OVERLAP_SIMPLE_BITMAP;
use crate::woff2::varint::put_variable_255_u16;

/// Produce the transformed glyf table (transform version 0). The transformed
/// loca table is always empty.
pub(crate) fn transform_glyf(
    glyf: &[u8],
    loca: &[u8],
    num_glyphs: u16,
    index_format: u16,
) -> Result<Vec<u8>, ConvertError> {
    let offsets = parse_loca(loca, num_glyphs, index_format)?;
    let glyphs = parse_glyf(glyf, &offsets)?;

    let mut streams = SubStreams::new(num_glyphs);
    for glyph in &glyphs {
        streams.push_glyph(glyph);
    }
    Ok(streams.serialize(num_glyphs, index_format))
}

struct SubStreams {
    n_contour: Vec<u8>,
    n_points: Vec<u8>,
    flag: Vec<u8>,
    glyph: Vec<u8>,
    composite: Vec<u8>,
    bbox_bitmap: Vec<u8>,
    bbox: Vec<u8>,
    instruction: Vec<u8>,
    overlap_bitmap: Vec<u8>,
    any_overlap: bool,
    glyph_index: usize,
}

impl SubStreams {
    fn new(num_glyphs: u16) -> Self {
        let bitmap_len = ((num_glyphs as usize + 31) >> 5) << 2;
        let overlap_len = (num_glyphs as usize + 7) >> 3;
        SubStreams {
            n_contour: Vec::with_capacity(num_glyphs as usize * 2),
            n_points: Vec::new(),
            flag: Vec::new(),
            glyph: Vec::new(),
            composite: Vec::new(),
            bbox_bitmap: vec![0; bitmap_len],
            bbox: Vec::new(),
            instruction: Vec::new(),
            overlap_bitmap: vec![0; overlap_len],
            any_overlap: false,
            glyph_index: 0,
        }
    }

    fn set_bbox_bit(&mut self) {
        self.bbox_bitmap[self.glyph_index >> 3] |= 0x80 >> (self.glyph_index & 7);
    }

    fn push_glyph(&mut self, glyph: &Glyph) {
        match glyph {
            Glyph::Empty => {
                self.n_contour.put_i16(0);
            }
            Glyph::Simple(simple) => {
                self.n_contour.put_i16(simple.num_contours() as i16);

                let mut prev: i64 = -1;
                for &end in &simple.end_pts {
                    put_variable_255_u16(&mut self.n_points, (end as i64 - prev) as u16);
                    prev = end as i64;
                }

                let mut last = Point { x: 0, y: 0, on_curve: true };
                for point in &simple.points {
                    encode_triplet(
                        point.x - last.x,
                        point.y - last.y,
                        point.on_curve,
                        &mut self.flag,
                        &mut self.glyph,
                    );
                    last = *point;
                }

                put_variable_255_u16(&mut self.glyph, simple.instructions.len() as u16);
                self.instruction.extend_from_slice(&simple.instructions);

                // The decoder recomputes the bbox from the points, so it only
                // needs storing when the recorded one differs.
                if simple.bbox != compute_bbox(&simple.points) {
                    self.set_bbox_bit();
                    for v in simple.bbox {
                        self.bbox.put_i16(v);
                    }
                }
                if simple.overlap_simple {
                    self.any_overlap = true;
                    self.overlap_bitmap[self.glyph_index >> 3] |= 0x80 >> (self.glyph_index & 7);
                }
            }
            Glyph::Composite(composite) => {
                self.n_contour.put_i16(-1);
                self.composite.extend_from_slice(&composite.components);
                // WE_HAVE_INSTRUCTIONS in the component flags tells the
                // decoder whether to read an instruction length.
                if let Some(instructions) = &composite.instructions {
                    put_variable_255_u16(&mut self.glyph, instructions.len() as u16);
                    self.instruction.extend_from_slice(instructions);
                }
                self.set_bbox_bit();
                for v in composite.bbox {
                    self.bbox.put_i16(v);
                }
            }
        }
        self.glyph_index += 1;
    }

    fn serialize(self, num_glyphs: u16, index_format: u16) -> Vec<u8> {
        let bbox_len = self.bbox_bitmap.len() + self.bbox.len();
        let mut out = Vec::with_capacity(
            36 + self.n_contour.len()
                + self.n_points.len()
                + self.flag.len()
                + self.glyph.len()
                + self.composite.len()
                + bbox_len
                + self.instruction.len()
                + self.overlap_bitmap.len(),
        );
        out.put_u16(0); // reserved
        out.put_u16(if self.any_overlap {
            FLAG_OVERLAP_SIMPLE_BITMAP
        } else {
            0
        });
        out.put_u16(num_glyphs);
        out.put_u16(index_format);
        out.put_u32(self.n_contour.len() as u32);
        out.put_u32(self.n_points.len() as u32);
        out.put_u32(self.flag.len() as u32);
        out.put_u32(self.glyph.len() as u32);
        out.put_u32(self.composite.len() as u32);
        out.put_u32(bbox_len as u32);
        out.put_u32(self.instruction.len() as u32);
        out.extend_from_slice(&self.n_contour);
        out.extend_from_slice(&self.n_points);
        out.extend_from_slice(&self.flag);
        out.extend_from_slice(&self.glyph);
        out.extend_from_slice(&self.composite);
        out.extend_from_slice(&self.bbox_bitmap);
        out.extend_from_slice(&self.bbox);
        out.extend_from_slice(&self.instruction);
        if self.any_overlap {
            out.extend_from_slice(&self.overlap_bitmap);
        }
        out
    }
}

/// Triplet-encode one point delta: a flag byte plus 1 to 4 data bytes.
/// Inverse of the decoder's flag ranges.
fn encode_triplet(dx: i32, dy: i32, on_curve: bool, flags: &mut Vec<u8>, data: &mut Vec<u8>) {
    let on_curve_bit: i32 = if on_curve { 0 } else { 128 };
    let abs_x = dx.unsigned_abs() as i32;
    let abs_y = dy.unsigned_abs() as i32;
    let x_sign: i32 = if dx >= 0 { 1 } else { 0 };
    let y_sign: i32 = if dy >= 0 { 1 } else { 0 };

    if dx == 0 && abs_y < 1280 {
        flags.push((on_curve_bit + ((abs_y & 0xf00) >> 7) + y_sign) as u8);
        data.push((abs_y & 0xff) as u8);
    } else if dy == 0 && abs_x < 1280 {
        flags.push((on_curve_bit + 10 + ((abs_x & 0xf00) >> 7) + x_sign) as u8);
        data.push((abs_x & 0xff) as u8);
    } else if abs_x <= 64 && abs_y <= 64 {
        // both known nonzero here
        flags.push(
            (on_curve_bit
                + 20
                + ((abs_x - 1) & 0x30)
                + (((abs_y - 1) & 0x30) >> 2)
                + x_sign
                + 2 * y_sign) as u8,
        );
        data.push(((((abs_x - 1) & 0x0f) << 4) | ((abs_y - 1) & 0x0f)) as u8);
    } else if abs_x <= 768 && abs_y <= 768 {
        flags.push(
            (on_curve_bit
                + 84
                + 12 * ((abs_x - 1) >> 8)
                + 4 * ((abs_y - 1) >> 8)
                + x_sign
                + 2 * y_sign) as u8,
        );
        data.push(((abs_x - 1) & 0xff) as u8);
        data.push(((abs_y - 1) & 0xff) as u8);
    } else if abs_x < 4096 && abs_y < 4096 {
        flags.push((on_curve_bit + 120 + x_sign + 2 * y_sign) as u8);
        data.push((abs_x >> 4) as u8);
        data.push((((abs_x & 0x0f) << 4) | (abs_y >> 8)) as u8);
        data.push((abs_y & 0xff) as u8);
    } else {
        flags.push((on_curve_bit + 124 + x_sign + 2 * y_sign) as u8);
        data.push((abs_x >> 8) as u8);
        data.push((abs_x & 0xff) as u8);
        data.push((abs_y >> 8) as u8);
        data.push((abs_y & 0xff) as u8);
    }
}

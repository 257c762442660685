//! Standard `glyf`/`loca` records: parsing glyph records into point lists and
//! building records back from them.
//!
//! Used from two places: the WOFF2 glyf transform (both directions) and the
//! CFF outline converter's re-encoding step.

use bytes::{Buf, BufMut};

use crate::error::{ConvertError, bail_table_if};
use crate::tables::{GLYF, LOCA};

// simple glyph flags
pub(crate) const ON_CURVE: u8 = 1 << 0;
pub(crate) const X_SHORT: u8 = 1 << 1;
pub(crate) const Y_SHORT: u8 = 1 << 2;
pub(crate) const REPEAT: u8 = 1 << 3;
pub(crate) const THIS_X_IS_SAME: u8 = 1 << 4;
pub(crate) const THIS_Y_IS_SAME: u8 = 1 << 5;
pub(crate) const OVERLAP_SIMPLE: u8 = 1 << 6;

// composite glyph flags
pub(crate) const ARG_1_AND_2_ARE_WORDS: u16 = 1 << 0;
pub(crate) const WE_HAVE_A_SCALE: u16 = 1 << 3;
pub(crate) const MORE_COMPONENTS: u16 = 1 << 5;
pub(crate) const WE_HAVE_AN_X_AND_Y_SCALE: u16 = 1 << 6;
pub(crate) const WE_HAVE_A_TWO_BY_TWO: u16 = 1 << 7;
pub(crate) const WE_HAVE_INSTRUCTIONS: u16 = 1 << 8;

/// One outline point in font design units.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct Point {
    pub x: i32,
    pub y: i32,
    pub on_curve: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Glyph {
    Empty,
    Simple(SimpleGlyph),
    Composite(CompositeGlyph),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SimpleGlyph {
    /// Index of the last point of each contour.
    pub end_pts: Vec<u16>,
    /// Absolute coordinates, all contours concatenated.
    pub points: Vec<Point>,
    pub instructions: Vec<u8>,
    /// [x_min, y_min, x_max, y_max] as stored in the record.
    pub bbox: [i16; 4],
    /// OVERLAP_SIMPLE bit of the first point's flags.
    pub overlap_simple: bool,
}

impl SimpleGlyph {
    pub fn num_contours(&self) -> usize {
        self.end_pts.len()
    }

    /// Number of points per contour, derived from `end_pts`.
    pub fn contour_lengths(&self) -> Result<Vec<u16>, ConvertError> {
        let mut lengths = Vec::with_capacity(self.end_pts.len());
        let mut prev: i32 = -1;
        for &end in &self.end_pts {
            let end = end as i32;
            bail_table_if!(end <= prev, GLYF);
            lengths.push((end - prev) as u16);
            prev = end;
        }
        Ok(lengths)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CompositeGlyph {
    /// Raw component records (flags, glyph index, args, transform), with the
    /// original flag bits preserved.
    pub components: Vec<u8>,
    pub instructions: Option<Vec<u8>>,
    pub bbox: [i16; 4],
}

/// [x_min, y_min, x_max, y_max] over `points`; all zeros for no points.
pub(crate) fn compute_bbox(points: &[Point]) -> [i16; 4] {
    let Some(first) = points.first() else {
        return [0; 4];
    };
    let (mut x_min, mut y_min, mut x_max, mut y_max) = (first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        x_min = x_min.min(p.x);
        y_min = y_min.min(p.y);
        x_max = x_max.max(p.x);
        y_max = y_max.max(p.y);
    }
    [x_min as i16, y_min as i16, x_max as i16, y_max as i16]
}

/// Parse a `loca` table into glyph offsets.
pub(crate) fn parse_loca(
    loca: &[u8],
    num_glyphs: u16,
    index_format: u16,
) -> Result<Vec<u32>, ConvertError> {
    let count = num_glyphs as usize + 1;
    let expected_len = count * if index_format == 0 { 2 } else { 4 };
    bail_table_if!(loca.len() < expected_len, LOCA);

    let mut input = loca;
    let mut offsets = Vec::with_capacity(count);
    for _ in 0..count {
        let offset = if index_format == 0 {
            (input.try_get_u16()? as u32) * 2
        } else {
            input.try_get_u32()?
        };
        if let Some(&prev) = offsets.last() {
            bail_table_if!(offset < prev, LOCA);
        }
        offsets.push(offset);
    }
    Ok(offsets)
}

/// Build a `loca` table from glyph offsets.
pub(crate) fn build_loca(offsets: &[u32], index_format: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(offsets.len() * if index_format == 0 { 2 } else { 4 });
    for &offset in offsets {
        if index_format == 0 {
            out.put_u16((offset >> 1) as u16);
        } else {
            out.put_u32(offset);
        }
    }
    out
}

/// The short loca format stores offset/2 in a u16, so it only reaches
/// offsets up to 0x1FFFE.
pub(crate) fn choose_index_format(glyf_len: usize) -> u16 {
    if glyf_len <= 0x1FFFE { 0 } else { 1 }
}

/// Parse every glyph record referenced by `offsets`.
pub(crate) fn parse_glyf(glyf: &[u8], offsets: &[u32]) -> Result<Vec<Glyph>, ConvertError> {
    let mut glyphs = Vec::with_capacity(offsets.len().saturating_sub(1));
    for window in offsets.windows(2) {
        let (start, end) = (window[0] as usize, window[1] as usize);
        bail_table_if!(end > glyf.len(), GLYF);
        glyphs.push(parse_glyph(&glyf[start..end])?);
    }
    Ok(glyphs)
}

fn parse_glyph(record: &[u8]) -> Result<Glyph, ConvertError> {
    if record.is_empty() {
        return Ok(Glyph::Empty);
    }
    let mut input = record;
    let n_contours = input.try_get_i16()?;
    let bbox = [
        input.try_get_i16()?,
        input.try_get_i16()?,
        input.try_get_i16()?,
        input.try_get_i16()?,
    ];
    if n_contours >= 0 {
        parse_simple_glyph(&mut input, n_contours as usize, bbox).map(Glyph::Simple)
    } else {
        parse_composite_glyph(&mut input, bbox).map(Glyph::Composite)
    }
}

fn parse_simple_glyph(
    input: &mut &[u8],
    n_contours: usize,
    bbox: [i16; 4],
) -> Result<SimpleGlyph, ConvertError> {
    let mut end_pts = Vec::with_capacity(n_contours);
    for _ in 0..n_contours {
        let end = input.try_get_u16()?;
        if let Some(&prev) = end_pts.last() {
            bail_table_if!(end <= prev, GLYF);
        }
        end_pts.push(end);
    }
    let n_points = end_pts.last().map(|&e| e as usize + 1).unwrap_or(0);

    let instruction_len = input.try_get_u16()? as usize;
    bail_table_if!(input.remaining() < instruction_len, GLYF);
    let instructions = input[..instruction_len].to_vec();
    input.advance(instruction_len);

    // Flags, expanding repeats
    let mut flags: Vec<u8> = Vec::with_capacity(n_points);
    while flags.len() < n_points {
        let flag = input.try_get_u8()?;
        flags.push(flag);
        if flag & REPEAT != 0 {
            let count = input.try_get_u8()? as usize;
            bail_table_if!(flags.len() + count > n_points, GLYF);
            for _ in 0..count {
                flags.push(flag);
            }
        }
    }
    let overlap_simple = flags.first().is_some_and(|&f| f & OVERLAP_SIMPLE != 0);

    let mut points: Vec<Point> = Vec::with_capacity(n_points);
    let mut x: i32 = 0;
    for &flag in &flags {
        let dx: i32 = if flag & X_SHORT != 0 {
            let mag = input.try_get_u8()? as i32;
            if flag & THIS_X_IS_SAME != 0 { mag } else { -mag }
        } else if flag & THIS_X_IS_SAME != 0 {
            0
        } else {
            input.try_get_i16()? as i32
        };
        x += dx;
        points.push(Point {
            x,
            y: 0,
            on_curve: flag & ON_CURVE != 0,
        });
    }
    let mut y: i32 = 0;
    for (point, &flag) in points.iter_mut().zip(&flags) {
        let dy: i32 = if flag & Y_SHORT != 0 {
            let mag = input.try_get_u8()? as i32;
            if flag & THIS_Y_IS_SAME != 0 { mag } else { -mag }
        } else if flag & THIS_Y_IS_SAME != 0 {
            0
        } else {
            input.try_get_i16()? as i32
        };
        y += dy;
        point.y = y;
    }

    Ok(SimpleGlyph {
        end_pts,
        points,
        instructions,
        bbox,
        overlap_simple,
    })
}

fn parse_composite_glyph(
    input: &mut &[u8],
    bbox: [i16; 4],
) -> Result<CompositeGlyph, ConvertError> {
    let mut components: Vec<u8> = Vec::new();
    let mut have_instructions = false;
    let mut flags = MORE_COMPONENTS;
    while flags & MORE_COMPONENTS != 0 {
        flags = input.try_get_u16()?;
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
        bail_table_if!(input.remaining() < arg_size, GLYF);
        components.put_u16(flags);
        components.put_slice(&input[..arg_size]);
        input.advance(arg_size);
    }

    let instructions = if have_instructions {
        let len = input.try_get_u16()? as usize;
        bail_table_if!(input.remaining() < len, GLYF);
        let instructions = input[..len].to_vec();
        input.advance(len);
        Some(instructions)
    } else {
        None
    };

    Ok(CompositeGlyph {
        components,
        instructions,
        bbox,
    })
}

/// Serialize glyphs back into a `glyf` table plus loca offsets
/// (`offsets.len() == glyphs.len() + 1`). Each record is padded to 4 bytes.
pub(crate) fn build_glyf(glyphs: &[Glyph]) -> (Vec<u8>, Vec<u32>) {
    let mut glyf: Vec<u8> = Vec::new();
    let mut offsets: Vec<u32> = Vec::with_capacity(glyphs.len() + 1);
    for glyph in glyphs {
        offsets.push(glyf.len() as u32);
        match glyph {
            Glyph::Empty => {}
            Glyph::Simple(simple) => build_simple_glyph(simple, &mut glyf),
            Glyph::Composite(composite) => build_composite_glyph(composite, &mut glyf),
        }
        let padded = crate::sfnt::round4(glyf.len());
        glyf.resize(padded, 0);
    }
    offsets.push(glyf.len() as u32);
    (glyf, offsets)
}

fn build_simple_glyph(glyph: &SimpleGlyph, out: &mut Vec<u8>) {
    out.put_i16(glyph.end_pts.len() as i16);
    for v in glyph.bbox {
        out.put_i16(v);
    }
    for &end in &glyph.end_pts {
        out.put_u16(end);
    }
    out.put_u16(glyph.instructions.len() as u16);
    out.put_slice(&glyph.instructions);
    put_points(&glyph.points, glyph.overlap_simple, out);
}

fn build_composite_glyph(glyph: &CompositeGlyph, out: &mut Vec<u8>) {
    out.put_i16(-1);
    for v in glyph.bbox {
        out.put_i16(v);
    }
    out.put_slice(&glyph.components);
    if let Some(instructions) = &glyph.instructions {
        out.put_u16(instructions.len() as u16);
        out.put_slice(instructions);
    }
}

/// Write the flag/x/y streams for a simple glyph, compressing runs of equal
/// flags with the REPEAT bit.
fn put_points(points: &[Point], overlap_simple: bool, out: &mut Vec<u8>) {
    // not a valid flag value, so the first comparison never matches
    let mut last_flag: u8 = u8::MAX;
    let mut repeat_count: u8 = 0;
    let mut last_x: i32 = 0;
    let mut last_y: i32 = 0;

    let flush = |out: &mut Vec<u8>, flag: u8, repeats: u8| {
        if repeats > 0 {
            out.put_u8(flag | REPEAT);
            out.put_u8(repeats);
        } else {
            out.put_u8(flag);
        }
    };

    for (i, point) in points.iter().enumerate() {
        let mut flag: u8 = 0;
        if point.on_curve {
            flag |= ON_CURVE;
        }
        if overlap_simple && i == 0 {
            flag |= OVERLAP_SIMPLE;
        }

        let dx = point.x - last_x;
        if dx == 0 {
            flag |= THIS_X_IS_SAME;
        } else if dx > -256 && dx < 256 {
            flag |= X_SHORT | (if dx > 0 { THIS_X_IS_SAME } else { 0 });
        }
        let dy = point.y - last_y;
        if dy == 0 {
            flag |= THIS_Y_IS_SAME;
        } else if dy > -256 && dy < 256 {
            flag |= Y_SHORT | (if dy > 0 { THIS_Y_IS_SAME } else { 0 });
        }

        // Flags are buffered one step so that a run can be turned into a
        // REPEAT pair once its length is known.
        if flag == last_flag && repeat_count < 255 {
            repeat_count += 1;
        } else {
            if i > 0 {
                flush(out, last_flag, repeat_count);
            }
            repeat_count = 0;
        }
        last_flag = flag;
        last_x = point.x;
        last_y = point.y;
    }
    if !points.is_empty() {
        flush(out, last_flag, repeat_count);
    }

    let mut last_x: i32 = 0;
    for point in points {
        let dx = point.x - last_x;
        if dx == 0 {
            // nothing stored
        } else if dx > -256 && dx < 256 {
            out.put_u8(dx.unsigned_abs() as u8);
        } else {
            out.put_i16(dx as i16);
        }
        last_x = point.x;
    }
    let mut last_y: i32 = 0;
    for point in points {
        let dy = point.y - last_y;
        if dy == 0 {
            // nothing stored
        } else if dy > -256 && dy < 256 {
            out.put_u8(dy.unsigned_abs() as u8);
        } else {
            out.put_i16(dy as i16);
        }
        last_y = point.y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> SimpleGlyph {
        let points = vec![
            Point { x: 50, y: 0, on_curve: true },
            Point { x: 400, y: 0, on_curve: true },
            Point { x: 225, y: 700, on_curve: true },
        ];
        SimpleGlyph {
            end_pts: vec![2],
            bbox: compute_bbox(&points),
            points,
            instructions: Vec::new(),
            overlap_simple: false,
        }
    }

    #[test]
    fn simple_glyph_round_trip() {
        let glyphs = vec![Glyph::Empty, Glyph::Simple(triangle())];
        let (glyf, offsets) = build_glyf(&glyphs);
        assert_eq!(offsets.len(), 3);
        assert_eq!(offsets[0], 0);
        assert_eq!(offsets[1], 0); // empty glyph occupies no bytes

        let reparsed = parse_glyf(&glyf, &offsets).unwrap();
        assert_eq!(reparsed, glyphs);
    }

    #[test]
    fn flag_repeat_round_trip() {
        // A long run of identical deltas exercises the REPEAT encoding.
        let points: Vec<Point> = (0..40)
            .map(|i| Point { x: i * 10, y: i * 10, on_curve: true })
            .collect();
        let glyph = SimpleGlyph {
            end_pts: vec![39],
            bbox: compute_bbox(&points),
            points,
            instructions: vec![0xB0, 0x00], // PUSHB[0] 0
            overlap_simple: true,
        };
        let glyphs = vec![Glyph::Simple(glyph)];
        let (glyf, offsets) = build_glyf(&glyphs);
        let reparsed = parse_glyf(&glyf, &offsets).unwrap();
        assert_eq!(reparsed, glyphs);
    }

    #[test]
    fn composite_glyph_round_trip() {
        let mut components = Vec::new();
        // One component: words args, no scale, offset (10, -20), glyph 1
        components.put_u16(ARG_1_AND_2_ARE_WORDS);
        components.put_u16(1);
        components.put_i16(10);
        components.put_i16(-20);
        let glyphs = vec![Glyph::Composite(CompositeGlyph {
            components,
            instructions: None,
            bbox: [0, 0, 100, 100],
        })];
        let (glyf, offsets) = build_glyf(&glyphs);
        let reparsed = parse_glyf(&glyf, &offsets).unwrap();
        assert_eq!(reparsed, glyphs);
    }

    #[test]
    fn loca_round_trip_both_formats() {
        let offsets = vec![0u32, 12, 12, 64, 100];
        for format in [0u16, 1] {
            let loca = build_loca(&offsets, format);
            let reparsed = parse_loca(&loca, 4, format).unwrap();
            assert_eq!(reparsed, offsets);
        }
    }

    #[test]
    fn loca_rejects_decreasing_offsets() {
        let loca = build_loca(&[0u32, 40, 20], 1);
        assert!(parse_loca(&loca, 2, 1).is_err());
    }

    #[test]
    fn large_coordinate_deltas() {
        let points = vec![
            Point { x: -2000, y: 3000, on_curve: true },
            Point { x: 2000, y: -3000, on_curve: false },
            Point { x: 2001, y: -3000, on_curve: true },
        ];
        let glyph = SimpleGlyph {
            end_pts: vec![2],
            bbox: compute_bbox(&points),
            points,
            instructions: Vec::new(),
            overlap_simple: false,
        };
        let glyphs = vec![Glyph::Simple(glyph)];
        let (glyf, offsets) = build_glyf(&glyphs);
        assert_eq!(parse_glyf(&glyf, &offsets).unwrap(), glyphs);
    }
}

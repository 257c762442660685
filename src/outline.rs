//! CFF to TrueType outline conversion.
//!
//! Charstrings are interpreted into cubic contours, approximated by quadratic
//! splines within a unitsPerEm-scaled tolerance, and re-encoded as simple
//! `glyf` records. The table set is rewritten to match: `maxp` upgraded to
//! version 1.0, `head` gets a recomputed bounding box and loca format, the
//! sfnt version flips to 0x00010000 and `CFF ` is dropped.

use bytes::BufMut;
use kurbo::{CubicBez, Point as CurvePoint};

use crate::cff::charstring::{self, OutlineSink};
use crate::cff::CffFont;
use crate::error::{ConvertError, bail_table_if};
use crate::glyf::{self, Glyph, Point, SimpleGlyph};
use crate::tables::{CFF, FontContainer, GLYF, HEAD, LOCA, MAXP, SFNT_VERSION_TRUETYPE};

/// Approximation tolerance in design units for a 1000-unit em.
const TOLERANCE_PER_MILLE: f64 = 1.0;

const SPLIT_LIMIT: u8 = 8;

/// Replace the container's `CFF ` outlines with equivalent `glyf`/`loca`
/// tables. The container must carry CFF outlines and parseable `head` and
/// `maxp` tables.
pub(crate) fn cff_to_glyf(font: &mut FontContainer) -> Result<(), ConvertError> {
    let cff_data = font
        .table(CFF)
        .ok_or(ConvertError::OutlineConversionFailed)?
        .to_vec();
    let cff = CffFont::parse(&cff_data)?;

    let head = font.table(HEAD).ok_or(ConvertError::CorruptTable(HEAD))?;
    bail_table_if!(head.len() < 54, HEAD);
    let units_per_em = u16::from_be_bytes([head[18], head[19]]);
    bail_table_if!(units_per_em == 0, HEAD);
    let tolerance = TOLERANCE_PER_MILLE * units_per_em as f64 / 1000.0;

    let maxp = font.table(MAXP).ok_or(ConvertError::CorruptTable(MAXP))?;
    bail_table_if!(maxp.len() < 6, MAXP);
    let maxp_glyphs = u16::from_be_bytes([maxp[4], maxp[5]]);
    bail_table_if!(maxp_glyphs != cff.num_glyphs(), MAXP);

    let mut glyphs = Vec::with_capacity(cff.num_glyphs() as usize);
    for glyph_id in 0..cff.num_glyphs() {
        let mut pen = GlyphPen::default();
        charstring::interpret(&cff, glyph_id, &mut pen)?;
        glyphs.push(pen.into_glyph(tolerance)?);
    }

    let (glyf, offsets) = glyf::build_glyf(&glyphs);
    let index_format = glyf::choose_index_format(glyf.len());
    let loca = glyf::build_loca(&offsets, index_format);
    let maxp = build_maxp(&glyphs);
    let head = patch_head(font.table(HEAD).unwrap_or(&[]), &glyphs, index_format);

    font.insert(GLYF, glyf);
    font.insert(LOCA, loca);
    font.insert(MAXP, maxp);
    font.insert(HEAD, head);
    font.remove(CFF);
    font.set_sfnt_version(SFNT_VERSION_TRUETYPE);
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Segment {
    Line(CurvePoint),
    Cubic(CurvePoint, CurvePoint, CurvePoint),
}

struct Contour {
    start: CurvePoint,
    segments: Vec<Segment>,
}

/// Sink that collects interpreted charstring contours as cubic paths.
#[derive(Default)]
struct GlyphPen {
    contours: Vec<Contour>,
    current: Option<Contour>,
}

impl OutlineSink for GlyphPen {
    fn move_to(&mut self, x: f32, y: f32) {
        self.current = Some(Contour {
            start: CurvePoint::new(x as f64, y as f64),
            segments: Vec::new(),
        });
    }

    fn line_to(&mut self, x: f32, y: f32) {
        if let Some(contour) = &mut self.current {
            contour
                .segments
                .push(Segment::Line(CurvePoint::new(x as f64, y as f64)));
        }
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        if let Some(contour) = &mut self.current {
            contour.segments.push(Segment::Cubic(
                CurvePoint::new(x1 as f64, y1 as f64),
                CurvePoint::new(x2 as f64, y2 as f64),
                CurvePoint::new(x as f64, y as f64),
            ));
        }
    }

    fn close(&mut self) {
        if let Some(contour) = self.current.take() {
            // a bare moveto draws nothing
            if !contour.segments.is_empty() {
                self.contours.push(contour);
            }
        }
    }
}

impl GlyphPen {
    fn into_glyph(self, tolerance: f64) -> Result<Glyph, ConvertError> {
        if self.contours.is_empty() {
            return Ok(Glyph::Empty);
        }
        let mut end_pts = Vec::with_capacity(self.contours.len());
        let mut points = Vec::new();
        for contour in &self.contours {
            let contour_points = contour_to_points(contour, tolerance)?;
            if contour_points.len() < 2 {
                continue;
            }
            points.extend_from_slice(&contour_points);
            if points.len() > u16::MAX as usize {
                return Err(ConvertError::OutlineConversionFailed);
            }
            end_pts.push((points.len() - 1) as u16);
        }
        if end_pts.is_empty() {
            return Ok(Glyph::Empty);
        }
        let bbox = glyf::compute_bbox(&points);
        Ok(Glyph::Simple(SimpleGlyph {
            end_pts,
            points,
            instructions: Vec::new(),
            bbox,
            overlap_simple: false,
        }))
    }
}

/// Flatten one cubic contour into quadratic glyf points, dropping the
/// closing point and any on-curve point that sits exactly midway between its
/// off-curve neighbours.
fn contour_to_points(contour: &Contour, tolerance: f64) -> Result<Vec<Point>, ConvertError> {
    let mut points = vec![round_point(contour.start)?];
    let mut position = contour.start;
    let mut quads = Vec::new();
    for segment in &contour.segments {
        match *segment {
            Segment::Line(to) => {
                points.push(round_point(to)?);
                position = to;
            }
            Segment::Cubic(c1, c2, to) => {
                quads.clear();
                cubic_to_quads(CubicBez::new(position, c1, c2, to), tolerance, &mut quads);
                for &(ctrl, end) in &quads {
                    let mut ctrl = round_point(ctrl)?;
                    ctrl.on_curve = false;
                    points.push(ctrl);
                    points.push(round_point(end)?);
                }
                position = to;
            }
        }
    }
    // glyf contours close implicitly
    if points.len() > 1 && points.last() == points.first() {
        points.pop();
    }
    Ok(drop_implied_on_curve(points))
}

fn round_point(p: CurvePoint) -> Result<Point, ConvertError> {
    let x = p.x.round();
    let y = p.y.round();
    if x < i16::MIN as f64 || x > i16::MAX as f64 || y < i16::MIN as f64 || y > i16::MAX as f64 {
        return Err(ConvertError::OutlineConversionFailed);
    }
    Ok(Point {
        x: x as i32,
        y: y as i32,
        on_curve: true,
    })
}

/// Remove on-curve points that the rasterizer would re-derive as the exact
/// midpoint of their two off-curve neighbours.
fn drop_implied_on_curve(points: Vec<Point>) -> Vec<Point> {
    let n = points.len();
    if n < 3 {
        return points;
    }
    let mut kept = Vec::with_capacity(n);
    for i in 0..n {
        let p = points[i];
        let prev = points[(i + n - 1) % n];
        let next = points[(i + 1) % n];
        let implied = p.on_curve
            && !prev.on_curve
            && !next.on_curve
            && 2 * p.x == prev.x + next.x
            && 2 * p.y == prev.y + next.y;
        if !implied {
            kept.push(p);
        }
    }
    kept
}

/// Approximate a cubic with one quadratic per recursion leaf, splitting at
/// the midpoint until the error bound `sqrt(3)/36 * |p3 - 3p2 + 3p1 - p0|`
/// drops under the tolerance.
fn cubic_to_quads(cubic: CubicBez, tolerance: f64, out: &mut Vec<(CurvePoint, CurvePoint)>) {
    cubic_to_quads_inner(cubic, tolerance, 0, out);
}

fn cubic_to_quads_inner(
    cubic: CubicBez,
    tolerance: f64,
    depth: u8,
    out: &mut Vec<(CurvePoint, CurvePoint)>,
) {
    let deviation = cubic.p3.to_vec2() - cubic.p2.to_vec2() * 3.0 + cubic.p1.to_vec2() * 3.0
        - cubic.p0.to_vec2();
    let error = deviation.hypot() * 3f64.sqrt() / 36.0;
    if error <= tolerance || depth == SPLIT_LIMIT {
        // both cubic control points project onto the same quadratic control
        // point when the cubic is degree-reducible; averaging the two
        // projections minimises the error otherwise
        let from_start = cubic.p1.to_vec2() * 1.5 - cubic.p0.to_vec2() * 0.5;
        let from_end = cubic.p2.to_vec2() * 1.5 - cubic.p3.to_vec2() * 0.5;
        let ctrl = ((from_start + from_end) * 0.5).to_point();
        out.push((ctrl, cubic.p3));
    } else {
        let (left, right) = split_cubic(cubic);
        cubic_to_quads_inner(left, tolerance, depth + 1, out);
        cubic_to_quads_inner(right, tolerance, depth + 1, out);
    }
}

fn split_cubic(c: CubicBez) -> (CubicBez, CubicBez) {
    let p01 = c.p0.midpoint(c.p1);
    let p12 = c.p1.midpoint(c.p2);
    let p23 = c.p2.midpoint(c.p3);
    let p012 = p01.midpoint(p12);
    let p123 = p12.midpoint(p23);
    let mid = p012.midpoint(p123);
    (
        CubicBez::new(c.p0, p01, p012, mid),
        CubicBez::new(mid, p123, p23, c.p3),
    )
}

/// maxp version 1.0 with the point and contour limits taken from the new
/// glyph records; zone count 1, everything instruction-related zero.
fn build_maxp(glyphs: &[Glyph]) -> Vec<u8> {
    let mut max_points = 0u16;
    let mut max_contours = 0u16;
    for glyph in glyphs {
        if let Glyph::Simple(simple) = glyph {
            max_points = max_points.max(simple.points.len() as u16);
            max_contours = max_contours.max(simple.num_contours() as u16);
        }
    }
    let mut maxp = Vec::with_capacity(32);
    maxp.put_u32(0x00010000);
    maxp.put_u16(glyphs.len() as u16);
    maxp.put_u16(max_points);
    maxp.put_u16(max_contours);
    maxp.put_u16(0); // maxCompositePoints
    maxp.put_u16(0); // maxCompositeContours
    maxp.put_u16(1); // maxZones
    maxp.put_u16(0); // maxTwilightPoints
    maxp.put_u16(0); // maxStorage
    maxp.put_u16(0); // maxFunctionDefs
    maxp.put_u16(0); // maxInstructionDefs
    maxp.put_u16(0); // maxStackElements
    maxp.put_u16(0); // maxSizeOfInstructions
    maxp.put_u16(0); // maxComponentElements
    maxp.put_u16(0); // maxComponentDepth
    maxp
}

/// Rewrite the global bounding box (offset 36) and indexToLocFormat
/// (offset 50) in a copy of `head`.
fn patch_head(head: &[u8], glyphs: &[Glyph], index_format: u16) -> Vec<u8> {
    let mut head = head.to_vec();
    let mut bbox: Option<[i16; 4]> = None;
    for glyph in glyphs {
        if let Glyph::Simple(simple) = glyph {
            let b = simple.bbox;
            bbox = Some(match bbox {
                None => b,
                Some(acc) => [
                    acc[0].min(b[0]),
                    acc[1].min(b[1]),
                    acc[2].max(b[2]),
                    acc[3].max(b[3]),
                ],
            });
        }
    }
    let bbox = bbox.unwrap_or([0; 4]);
    for (i, value) in bbox.iter().enumerate() {
        head[36 + 2 * i..38 + 2 * i].copy_from_slice(&value.to_be_bytes());
    }
    head[50..52].copy_from_slice(&index_format.to_be_bytes());
    head
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degree_reducible_cubic_becomes_one_quad() {
        // elevation of the quadratic (0,0) (30,60) (60,0)
        let cubic = CubicBez::new(
            CurvePoint::new(0.0, 0.0),
            CurvePoint::new(20.0, 40.0),
            CurvePoint::new(40.0, 40.0),
            CurvePoint::new(60.0, 0.0),
        );
        let mut quads = Vec::new();
        cubic_to_quads(cubic, 1.0, &mut quads);
        assert_eq!(quads.len(), 1);
        let (ctrl, end) = quads[0];
        assert!((ctrl.x - 30.0).abs() < 1e-9 && (ctrl.y - 60.0).abs() < 1e-9);
        assert_eq!(end, CurvePoint::new(60.0, 0.0));
    }

    #[test]
    fn tight_tolerance_forces_subdivision() {
        let cubic = CubicBez::new(
            CurvePoint::new(0.0, 0.0),
            CurvePoint::new(0.0, 100.0),
            CurvePoint::new(100.0, 100.0),
            CurvePoint::new(100.0, 0.0),
        );
        let mut coarse = Vec::new();
        cubic_to_quads(cubic, 10.0, &mut coarse);
        let mut fine = Vec::new();
        cubic_to_quads(cubic, 0.01, &mut fine);
        assert!(fine.len() > coarse.len());
        // endpoints survive subdivision
        assert_eq!(fine.last().unwrap().1, CurvePoint::new(100.0, 0.0));
    }

    #[test]
    fn quads_stay_within_tolerance_of_the_cubic() {
        use kurbo::{ParamCurve, QuadBez};

        // not degree reducible; symmetric, so subdivision splits evenly and
        // quad k spans cubic parameters [k/n, (k+1)/n]
        let cubic = CubicBez::new(
            CurvePoint::new(0.0, 0.0),
            CurvePoint::new(0.0, 100.0),
            CurvePoint::new(100.0, 100.0),
            CurvePoint::new(100.0, 0.0),
        );
        let tolerance = 0.5;
        let mut quads = Vec::new();
        cubic_to_quads(cubic, tolerance, &mut quads);
        assert!(quads.len() > 1);
        assert_eq!(quads.last().unwrap().1, cubic.p3);

        let n = quads.len() as f64;
        let mut start = cubic.p0;
        for (k, &(ctrl, end)) in quads.iter().enumerate() {
            let quad = QuadBez::new(start, ctrl, end);
            for step in 0..=16 {
                let s = step as f64 / 16.0;
                let deviation = quad.eval(s) - cubic.eval((k as f64 + s) / n);
                assert!(
                    deviation.hypot() <= tolerance,
                    "quad {k} deviates by {} at s={s}",
                    deviation.hypot()
                );
            }
            start = end;
        }
    }

    #[test]
    fn subdivision_depth_is_bounded() {
        let cubic = CubicBez::new(
            CurvePoint::new(0.0, 0.0),
            CurvePoint::new(-1000.0, 4000.0),
            CurvePoint::new(1000.0, -4000.0),
            CurvePoint::new(10.0, 0.0),
        );
        let mut quads = Vec::new();
        cubic_to_quads(cubic, 1e-12, &mut quads);
        assert!(quads.len() <= 1 << SPLIT_LIMIT);
    }

    #[test]
    fn exact_midpoints_are_dropped() {
        let on = |x, y| Point { x, y, on_curve: true };
        let off = |x, y| Point { x, y, on_curve: false };
        let points = vec![on(0, 0), off(10, 0), on(10, 10), off(10, 20), on(0, 20)];
        let reduced = drop_implied_on_curve(points);
        assert_eq!(reduced, vec![on(0, 0), off(10, 0), off(10, 20), on(0, 20)]);
    }

    #[test]
    fn off_midpoints_are_kept() {
        let on = |x, y| Point { x, y, on_curve: true };
        let off = |x, y| Point { x, y, on_curve: false };
        let points = vec![on(0, 0), off(10, 0), on(11, 10), off(10, 20), on(0, 20)];
        assert_eq!(drop_implied_on_curve(points.clone()).len(), points.len());
    }

    #[test]
    fn cff_container_converts_to_truetype() {
        let mut font = crate::test_fonts::cff_container();
        cff_to_glyf(&mut font).unwrap();
        assert_eq!(font.sfnt_version(), SFNT_VERSION_TRUETYPE);
        assert!(!font.has_table(CFF));
        let maxp = font.table(MAXP).unwrap();
        assert_eq!(&maxp[0..4], &[0, 1, 0, 0]);
        let glyf = font.table(GLYF).unwrap().to_vec();
        let loca = font.table(LOCA).unwrap();
        let head = font.table(HEAD).unwrap();
        let index_format = u16::from_be_bytes([head[50], head[51]]);
        let num_glyphs = u16::from_be_bytes([maxp[4], maxp[5]]);
        let offsets = glyf::parse_loca(loca, num_glyphs, index_format).unwrap();
        let glyphs = glyf::parse_glyf(&glyf, &offsets).unwrap();
        // .notdef is empty, the test glyph has one closed contour
        assert_eq!(glyphs[0], Glyph::Empty);
        match &glyphs[1] {
            Glyph::Simple(simple) => assert_eq!(simple.num_contours(), 1),
            other => panic!("expected a simple glyph, got {other:?}"),
        }
        font.validate().unwrap();
    }
}

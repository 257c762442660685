//! Hand-assembled minimal fonts for tests: one TrueType-flavored container
//! and one CFF-flavored container, both passing [`FontContainer::validate`].

use bytes::BufMut;

use crate::glyf::{self, CompositeGlyph, Glyph, Point, SimpleGlyph};
use crate::tables::{
    CFF, CMAP, FontContainer, Flavor, GLYF, HEAD, HHEA, HMTX, LOCA, MAXP, NAME, POST,
    SFNT_VERSION_CFF, SFNT_VERSION_TRUETYPE,
};

fn on(x: i32, y: i32) -> Point {
    Point {
        x,
        y,
        on_curve: true,
    }
}

fn off(x: i32, y: i32) -> Point {
    Point {
        x,
        y,
        on_curve: false,
    }
}

fn simple(end_pts: Vec<u16>, points: Vec<Point>) -> Glyph {
    let bbox = glyf::compute_bbox(&points);
    Glyph::Simple(SimpleGlyph {
        end_pts,
        points,
        instructions: Vec::new(),
        bbox,
        overlap_simple: false,
    })
}

fn head(units_per_em: u16, bbox: [i16; 4], index_to_loc_format: i16) -> Vec<u8> {
    let mut head = Vec::with_capacity(54);
    head.put_u32(0x00010000); // version
    head.put_u32(0x00010000); // fontRevision
    head.put_u32(0); // checkSumAdjustment, patched on encode
    head.put_u32(0x5F0F3CF5); // magicNumber
    head.put_u16(0); // flags
    head.put_u16(units_per_em);
    head.put_i64(0); // created
    head.put_i64(0); // modified
    for v in bbox {
        head.put_i16(v);
    }
    head.put_u16(0); // macStyle
    head.put_u16(8); // lowestRecPPEM
    head.put_i16(2); // fontDirectionHint
    head.put_i16(index_to_loc_format);
    head.put_i16(0); // glyphDataFormat
    head
}

fn hhea(num_h_metrics: u16) -> Vec<u8> {
    let mut hhea = Vec::with_capacity(36);
    hhea.put_u32(0x00010000);
    hhea.put_i16(800); // ascender
    hhea.put_i16(-200); // descender
    hhea.put_i16(0); // lineGap
    hhea.put_u16(600); // advanceWidthMax
    hhea.put_i16(0); // minLeftSideBearing
    hhea.put_i16(0); // minRightSideBearing
    hhea.put_i16(600); // xMaxExtent
    hhea.put_i16(1); // caretSlopeRise
    hhea.put_i16(0); // caretSlopeRun
    hhea.put_i16(0); // caretOffset
    for _ in 0..4 {
        hhea.put_i16(0); // reserved
    }
    hhea.put_i16(0); // metricDataFormat
    hhea.put_u16(num_h_metrics);
    hhea
}

fn hmtx(metrics: &[(u16, i16)]) -> Vec<u8> {
    let mut hmtx = Vec::with_capacity(metrics.len() * 4);
    for &(advance, lsb) in metrics {
        hmtx.put_u16(advance);
        hmtx.put_i16(lsb);
    }
    hmtx
}

/// cmap with a single format 6 subtable mapping 'A' to glyph 1.
fn cmap() -> Vec<u8> {
    let mut cmap = Vec::new();
    cmap.put_u16(0); // version
    cmap.put_u16(1); // numTables
    cmap.put_u16(0); // platform: Unicode
    cmap.put_u16(3); // encoding: BMP
    cmap.put_u32(12); // subtable offset
    cmap.put_u16(6); // format
    cmap.put_u16(14); // length
    cmap.put_u16(0); // language
    cmap.put_u16(b'A' as u16); // firstCode
    cmap.put_u16(1); // entryCount
    cmap.put_u16(1); // glyph id
    cmap
}

fn name() -> Vec<u8> {
    let mut name = Vec::new();
    name.put_u16(0); // version
    name.put_u16(0); // count
    name.put_u16(6); // stringOffset
    name
}

fn post() -> Vec<u8> {
    let mut post = Vec::with_capacity(32);
    post.put_u32(0x00030000); // version: no glyph names
    post.put_u32(0); // italicAngle
    post.put_i16(-100); // underlinePosition
    post.put_i16(50); // underlineThickness
    post.put_u32(0); // isFixedPitch
    for _ in 0..4 {
        post.put_u32(0); // memory usage hints
    }
    post
}

/// A four-glyph TrueType font: empty .notdef, a triangle, a quadratic
/// contour, and a composite reusing the triangle.
pub(crate) fn truetype_container() -> FontContainer {
    let triangle = simple(vec![2], vec![on(100, 0), on(500, 0), on(300, 600)]);
    let curved = simple(
        vec![3],
        vec![on(0, 0), off(0, 300), on(300, 300), on(300, 0)],
    );
    let mut components = Vec::new();
    components.put_u16(glyf::ARG_1_AND_2_ARE_WORDS); // final component
    components.put_u16(1); // triangle glyph
    components.put_i16(50); // x offset
    components.put_i16(0); // y offset
    let composite = Glyph::Composite(CompositeGlyph {
        components,
        instructions: None,
        bbox: [150, 0, 550, 600],
    });
    let glyphs = [Glyph::Empty, triangle, curved, composite];

    let (glyf_data, offsets) = glyf::build_glyf(&glyphs);
    let index_format = glyf::choose_index_format(glyf_data.len());
    let loca = glyf::build_loca(&offsets, index_format);

    let mut maxp = Vec::with_capacity(32);
    maxp.put_u32(0x00010000);
    maxp.put_u16(glyphs.len() as u16);
    maxp.put_u16(4); // maxPoints
    maxp.put_u16(1); // maxContours
    maxp.put_u16(3); // maxCompositePoints
    maxp.put_u16(1); // maxCompositeContours
    maxp.put_u16(1); // maxZones
    for _ in 0..8 {
        maxp.put_u16(0);
    }

    let mut font = FontContainer::new(Flavor::Sfnt, SFNT_VERSION_TRUETYPE);
    font.insert(HEAD, head(1000, [0, 0, 550, 600], index_format as i16));
    font.insert(HHEA, hhea(4));
    font.insert(MAXP, maxp);
    font.insert(HMTX, hmtx(&[(500, 100), (600, 100), (400, 0), (600, 150)]));
    font.insert(CMAP, cmap());
    font.insert(NAME, name());
    font.insert(POST, post());
    font.insert(GLYF, glyf_data);
    font.insert(LOCA, loca);
    font
}

fn cs_num(out: &mut Vec<u8>, value: i16) {
    out.push(28);
    out.extend_from_slice(&value.to_be_bytes());
}

fn cs_op(out: &mut Vec<u8>, args: &[i16], op: u8) {
    for &arg in args {
        cs_num(out, arg);
    }
    out.push(op);
}

/// A Type 1 (non-CID) CFF table with the given charstrings, one name, no
/// subroutines, no Private DICT.
fn build_cff(charstrings: &[&[u8]]) -> Vec<u8> {
    let mut cff = vec![1, 0, 4, 2]; // header
    cff.extend_from_slice(&[0, 1, 1, 1, 2, b'f']); // Name INDEX

    // header + name + Top DICT INDEX (5 + 6) + String INDEX + Global Subrs
    let charstrings_offset: u32 = 4 + 6 + 11 + 2 + 2;
    let mut top_dict = Vec::new();
    top_dict.push(29);
    top_dict.extend_from_slice(&charstrings_offset.to_be_bytes());
    top_dict.push(17); // CharStrings
    assert_eq!(top_dict.len(), 6);

    cff.extend_from_slice(&[0, 1, 1, 1, 1 + top_dict.len() as u8]);
    cff.extend_from_slice(&top_dict);
    cff.extend_from_slice(&[0, 0]); // String INDEX
    cff.extend_from_slice(&[0, 0]); // Global Subr INDEX

    // CharStrings INDEX, offSize 1
    let total: usize = charstrings.iter().map(|cs| cs.len()).sum();
    assert!(total < 254, "fixture charstrings must stay small");
    cff.put_u16(charstrings.len() as u16);
    cff.push(1);
    let mut offset = 1u8;
    cff.push(offset);
    for cs in charstrings {
        offset += cs.len() as u8;
        cff.push(offset);
    }
    for cs in charstrings {
        cff.extend_from_slice(cs);
    }
    cff
}

/// A two-glyph CFF font: empty .notdef and one closed contour mixing lines
/// and a cubic curve.
pub(crate) fn cff_container() -> FontContainer {
    let notdef = vec![14u8]; // bare endchar

    let mut glyph = Vec::new();
    cs_op(&mut glyph, &[500, 100, 0], 21); // width 500, rmoveto 100 0
    cs_op(&mut glyph, &[300, 0], 5); // rlineto
    cs_op(&mut glyph, &[0, 100, -100, 200, -200, 200], 8); // rrcurveto
    cs_op(&mut glyph, &[-100, -200], 5); // rlineto back toward the start
    glyph.push(14); // endchar

    let cff = build_cff(&[&notdef, &glyph]);

    let mut maxp = Vec::with_capacity(6);
    maxp.put_u32(0x00005000); // version 0.5
    maxp.put_u16(2);

    let mut font = FontContainer::new(Flavor::Sfnt, SFNT_VERSION_CFF);
    font.insert(HEAD, head(1000, [0, 0, 400, 500], 0));
    font.insert(HHEA, hhea(2));
    font.insert(MAXP, maxp);
    font.insert(HMTX, hmtx(&[(500, 0), (500, 100)]));
    font.insert(CMAP, cmap());
    font.insert(NAME, name());
    font.insert(POST, post());
    font.insert(CFF, cff);
    font
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cff::CffFont;

    #[test]
    fn fixtures_validate() {
        truetype_container().validate().unwrap();
        cff_container().validate().unwrap();
    }

    #[test]
    fn cff_fixture_parses() {
        let font = cff_container();
        let cff = CffFont::parse(font.table(CFF).unwrap()).unwrap();
        assert_eq!(cff.num_glyphs(), 2);
        assert_eq!(cff.char_string(0), Some(&[14u8][..]));
    }
}

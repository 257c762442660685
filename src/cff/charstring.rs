//! Type 2 charstring interpreter, reduced to path construction: hints are
//! counted and skipped, widths are parsed and discarded.
//!
//! Adobe Technical Note #5177.

use arrayvec::ArrayVec;

use crate::cff::{CffFont, Index};
use crate::error::ConvertError;

// Limits from Adobe Technical Note #5177 Appendix B.
const NESTING_LIMIT: u8 = 10;
const MAX_ARGUMENTS: usize = 48;

/// Operators defined in Adobe Technical Note #5177.
mod operator {
    pub const HORIZONTAL_STEM: u8 = 1;
    pub const VERTICAL_STEM: u8 = 3;
    pub const VERTICAL_MOVE_TO: u8 = 4;
    pub const LINE_TO: u8 = 5;
    pub const HORIZONTAL_LINE_TO: u8 = 6;
    pub const VERTICAL_LINE_TO: u8 = 7;
    pub const CURVE_TO: u8 = 8;
    pub const CALL_LOCAL_SUBROUTINE: u8 = 10;
    pub const RETURN: u8 = 11;
    pub const TWO_BYTE_OPERATOR_MARK: u8 = 12;
    pub const ENDCHAR: u8 = 14;
    pub const HORIZONTAL_STEM_HINT_MASK: u8 = 18;
    pub const HINT_MASK: u8 = 19;
    pub const COUNTER_MASK: u8 = 20;
    pub const MOVE_TO: u8 = 21;
    pub const HORIZONTAL_MOVE_TO: u8 = 22;
    pub const VERTICAL_STEM_HINT_MASK: u8 = 23;
    pub const CURVE_LINE: u8 = 24;
    pub const LINE_CURVE: u8 = 25;
    pub const VV_CURVE_TO: u8 = 26;
    pub const HH_CURVE_TO: u8 = 27;
    pub const SHORT_INT: u8 = 28;
    pub const CALL_GLOBAL_SUBROUTINE: u8 = 29;
    pub const VH_CURVE_TO: u8 = 30;
    pub const HV_CURVE_TO: u8 = 31;
    pub const HFLEX: u8 = 34;
    pub const FLEX: u8 = 35;
    pub const HFLEX1: u8 = 36;
    pub const FLEX1: u8 = 37;
    pub const FIXED_16_16: u8 = 255;
}

/// Receiver for the interpreted path, in font design units.
pub(crate) trait OutlineSink {
    fn move_to(&mut self, x: f32, y: f32);
    fn line_to(&mut self, x: f32, y: f32);
    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32);
    fn close(&mut self);
}

/// Interpret one glyph's charstring, resolving subroutine calls and seac
/// composition through `font`.
pub(crate) fn interpret<S: OutlineSink>(
    font: &CffFont<'_>,
    glyph_id: u16,
    sink: &mut S,
) -> Result<(), ConvertError> {
    let char_string = font
        .char_string(glyph_id)
        .ok_or(ConvertError::OutlineConversionFailed)?;
    let mut interp = Interpreter {
        font,
        glyph_id,
        stack: ArrayVec::new(),
        x: 0.0,
        y: 0.0,
        width_parsed: false,
        stems_len: 0,
        has_endchar: false,
        open: false,
    };
    interp.run(char_string, 0, sink)?;
    if !interp.has_endchar {
        return Err(ConvertError::OutlineConversionFailed);
    }
    if interp.open {
        sink.close();
    }
    Ok(())
}

struct Interpreter<'a, 'data> {
    font: &'a CffFont<'data>,
    glyph_id: u16,
    stack: ArrayVec<f32, MAX_ARGUMENTS>,
    x: f32,
    y: f32,
    width_parsed: bool,
    stems_len: u32,
    has_endchar: bool,
    open: bool,
}

const ERR: ConvertError = ConvertError::OutlineConversionFailed;

impl Interpreter<'_, '_> {
    fn push(&mut self, value: f32) -> Result<(), ConvertError> {
        self.stack.try_push(value).map_err(|_| ERR)
    }

    fn move_to<S: OutlineSink>(&mut self, dx: f32, dy: f32, sink: &mut S) {
        if self.open {
            sink.close();
        }
        self.x += dx;
        self.y += dy;
        sink.move_to(self.x, self.y);
        self.open = true;
    }

    fn line_to<S: OutlineSink>(&mut self, dx: f32, dy: f32, sink: &mut S) {
        self.x += dx;
        self.y += dy;
        sink.line_to(self.x, self.y);
    }

    fn curve_to<S: OutlineSink>(
        &mut self,
        dx1: f32,
        dy1: f32,
        dx2: f32,
        dy2: f32,
        dx3: f32,
        dy3: f32,
        sink: &mut S,
    ) {
        let x1 = self.x + dx1;
        let y1 = self.y + dy1;
        let x2 = x1 + dx2;
        let y2 = y1 + dy2;
        self.x = x2 + dx3;
        self.y = y2 + dy3;
        sink.curve_to(x1, y1, x2, y2, self.x, self.y);
    }

    /// Consume a leading width operand when the argument count reveals one.
    fn parse_width(&mut self, even_args: usize) -> usize {
        if !self.width_parsed && self.stack.len() == even_args + 1 {
            self.width_parsed = true;
            1
        } else {
            0
        }
    }

    fn count_stems(&mut self) {
        let mut len = self.stack.len();
        if len % 2 == 1 && !self.width_parsed {
            len -= 1;
            self.width_parsed = true;
        }
        self.stems_len += len as u32 >> 1;
    }

    fn run<S: OutlineSink>(
        &mut self,
        char_string: &[u8],
        depth: u8,
        sink: &mut S,
    ) -> Result<(), ConvertError> {
        use operator::*;

        let mut input = char_string;
        while !input.is_empty() {
            let op = read_u8(&mut input)?;
            match op {
                0 | 2 | 9 | 13 | 17 => return Err(ERR), // reserved
                HORIZONTAL_STEM | VERTICAL_STEM | HORIZONTAL_STEM_HINT_MASK
                | VERTICAL_STEM_HINT_MASK => {
                    self.count_stems();
                    self.stack.clear();
                }
                HINT_MASK | COUNTER_MASK => {
                    self.count_stems();
                    self.stack.clear();
                    let mask_len = ((self.stems_len + 7) >> 3) as usize;
                    if input.len() < mask_len {
                        return Err(ERR);
                    }
                    input = &input[mask_len..];
                }
                MOVE_TO => {
                    let skip = self.parse_width(2);
                    if self.stack.len() != skip + 2 {
                        return Err(ERR);
                    }
                    self.move_to(self.stack[skip], self.stack[skip + 1], sink);
                    self.stack.clear();
                }
                HORIZONTAL_MOVE_TO => {
                    let skip = self.parse_width(1);
                    if self.stack.len() != skip + 1 {
                        return Err(ERR);
                    }
                    self.move_to(self.stack[skip], 0.0, sink);
                    self.stack.clear();
                }
                VERTICAL_MOVE_TO => {
                    let skip = self.parse_width(1);
                    if self.stack.len() != skip + 1 {
                        return Err(ERR);
                    }
                    self.move_to(0.0, self.stack[skip], sink);
                    self.stack.clear();
                }
                LINE_TO => {
                    if self.stack.is_empty() || self.stack.len() % 2 != 0 || !self.open {
                        return Err(ERR);
                    }
                    for i in (0..self.stack.len()).step_by(2) {
                        self.line_to(self.stack[i], self.stack[i + 1], sink);
                    }
                    self.stack.clear();
                }
                HORIZONTAL_LINE_TO | VERTICAL_LINE_TO => {
                    if self.stack.is_empty() || !self.open {
                        return Err(ERR);
                    }
                    let mut horizontal = op == HORIZONTAL_LINE_TO;
                    for i in 0..self.stack.len() {
                        if horizontal {
                            self.line_to(self.stack[i], 0.0, sink);
                        } else {
                            self.line_to(0.0, self.stack[i], sink);
                        }
                        horizontal = !horizontal;
                    }
                    self.stack.clear();
                }
                CURVE_TO => {
                    if self.stack.is_empty() || self.stack.len() % 6 != 0 || !self.open {
                        return Err(ERR);
                    }
                    for i in (0..self.stack.len()).step_by(6) {
                        let s = &self.stack;
                        let args = [s[i], s[i + 1], s[i + 2], s[i + 3], s[i + 4], s[i + 5]];
                        self.curve_to(args[0], args[1], args[2], args[3], args[4], args[5], sink);
                    }
                    self.stack.clear();
                }
                CURVE_LINE => {
                    // n*6 curve args followed by one line pair
                    if self.stack.len() < 8 || (self.stack.len() - 2) % 6 != 0 || !self.open {
                        return Err(ERR);
                    }
                    let mut i = 0;
                    while i + 6 <= self.stack.len() - 2 {
                        let s = &self.stack;
                        let args = [s[i], s[i + 1], s[i + 2], s[i + 3], s[i + 4], s[i + 5]];
                        self.curve_to(args[0], args[1], args[2], args[3], args[4], args[5], sink);
                        i += 6;
                    }
                    self.line_to(self.stack[i], self.stack[i + 1], sink);
                    self.stack.clear();
                }
                LINE_CURVE => {
                    // n line pairs followed by one 6-arg curve
                    if self.stack.len() < 8 || (self.stack.len() - 6) % 2 != 0 || !self.open {
                        return Err(ERR);
                    }
                    let mut i = 0;
                    while i < self.stack.len() - 6 {
                        self.line_to(self.stack[i], self.stack[i + 1], sink);
                        i += 2;
                    }
                    let s = &self.stack;
                    let args = [s[i], s[i + 1], s[i + 2], s[i + 3], s[i + 4], s[i + 5]];
                    self.curve_to(args[0], args[1], args[2], args[3], args[4], args[5], sink);
                    self.stack.clear();
                }
                HH_CURVE_TO => {
                    if self.stack.is_empty() || !self.open {
                        return Err(ERR);
                    }
                    let mut i = 0;
                    // odd count means a leading dy1
                    let mut dy1 = 0.0;
                    if self.stack.len() % 4 == 1 {
                        dy1 = self.stack[0];
                        i = 1;
                    }
                    if (self.stack.len() - i) % 4 != 0 {
                        return Err(ERR);
                    }
                    while i < self.stack.len() {
                        let s = &self.stack;
                        let args = [s[i], s[i + 1], s[i + 2], s[i + 3]];
                        self.curve_to(args[0], dy1, args[1], args[2], args[3], 0.0, sink);
                        dy1 = 0.0;
                        i += 4;
                    }
                    self.stack.clear();
                }
                VV_CURVE_TO => {
                    if self.stack.is_empty() || !self.open {
                        return Err(ERR);
                    }
                    let mut i = 0;
                    let mut dx1 = 0.0;
                    if self.stack.len() % 4 == 1 {
                        dx1 = self.stack[0];
                        i = 1;
                    }
                    if (self.stack.len() - i) % 4 != 0 {
                        return Err(ERR);
                    }
                    while i < self.stack.len() {
                        let s = &self.stack;
                        let args = [s[i], s[i + 1], s[i + 2], s[i + 3]];
                        self.curve_to(dx1, args[0], args[1], args[2], 0.0, args[3], sink);
                        dx1 = 0.0;
                        i += 4;
                    }
                    self.stack.clear();
                }
                HV_CURVE_TO | VH_CURVE_TO => {
                    let len = self.stack.len();
                    if len < 4 || !(len % 8 == 0 || len % 8 == 1 || len % 8 == 4 || len % 8 == 5)
                        || !self.open
                    {
                        return Err(ERR);
                    }
                    let mut horizontal = op == HV_CURVE_TO;
                    let mut i = 0;
                    while i + 4 <= len {
                        let s = &self.stack;
                        let last = len - i == 5;
                        let extra = if last { s[i + 4] } else { 0.0 };
                        if horizontal {
                            // dxa dxb dyb dyc (dxf)
                            let (dxa, dxb, dyb, dyc) = (s[i], s[i + 1], s[i + 2], s[i + 3]);
                            self.curve_to(dxa, 0.0, dxb, dyb, extra, dyc, sink);
                        } else {
                            // dya dxb dyb dxc (dyf)
                            let (dya, dxb, dyb, dxc) = (s[i], s[i + 1], s[i + 2], s[i + 3]);
                            self.curve_to(0.0, dya, dxb, dyb, dxc, extra, sink);
                        }
                        horizontal = !horizontal;
                        i += 4;
                    }
                    self.stack.clear();
                }
                CALL_LOCAL_SUBROUTINE => {
                    if depth == NESTING_LIMIT {
                        return Err(ERR);
                    }
                    let subrs = self.font.local_subrs(self.glyph_id).ok_or(ERR)?;
                    let subr = resolve_subr(subrs, self.stack.pop().ok_or(ERR)?)?;
                    self.run(subr, depth + 1, sink)?;
                    if self.has_endchar {
                        break;
                    }
                }
                CALL_GLOBAL_SUBROUTINE => {
                    if depth == NESTING_LIMIT {
                        return Err(ERR);
                    }
                    let subrs = self.font.global_subrs();
                    let subr = resolve_subr(subrs, self.stack.pop().ok_or(ERR)?)?;
                    self.run(subr, depth + 1, sink)?;
                    if self.has_endchar {
                        break;
                    }
                }
                RETURN => break,
                ENDCHAR => {
                    if self.stack.len() == 4 || (!self.width_parsed && self.stack.len() == 5) {
                        self.run_seac(depth, sink)?;
                    } else if self.stack.len() == 1 && !self.width_parsed {
                        self.stack.pop();
                        self.width_parsed = true;
                    } else if !self.stack.is_empty() {
                        return Err(ERR);
                    }
                    if !input.is_empty() {
                        return Err(ERR);
                    }
                    self.has_endchar = true;
                    break;
                }
                TWO_BYTE_OPERATOR_MARK => {
                    let op2 = read_u8(&mut input)?;
                    match op2 {
                        HFLEX => self.op_hflex(sink)?,
                        FLEX => self.op_flex(sink)?,
                        HFLEX1 => self.op_hflex1(sink)?,
                        FLEX1 => self.op_flex1(sink)?,
                        _ => return Err(ERR),
                    }
                    self.stack.clear();
                }
                SHORT_INT => {
                    let high = read_u8(&mut input)? as i16;
                    let low = read_u8(&mut input)? as i16;
                    self.push(((high << 8) | low) as f32)?;
                }
                32..=246 => self.push(op as f32 - 139.0)?,
                247..=250 => {
                    let b1 = read_u8(&mut input)? as f32;
                    self.push((op as f32 - 247.0) * 256.0 + b1 + 108.0)?;
                }
                251..=254 => {
                    let b1 = read_u8(&mut input)? as f32;
                    self.push(-(op as f32 - 251.0) * 256.0 - b1 - 108.0)?;
                }
                FIXED_16_16 => {
                    let mut raw = [0u8; 4];
                    for byte in &mut raw {
                        *byte = read_u8(&mut input)?;
                    }
                    self.push(i32::from_be_bytes(raw) as f32 / 65536.0)?;
                }
                _ => return Err(ERR),
            }
        }
        Ok(())
    }

    /// endchar with accent composition: render the base glyph, then the
    /// accent glyph displaced by (adx, ady).
    fn run_seac<S: OutlineSink>(&mut self, depth: u8, sink: &mut S) -> Result<(), ConvertError> {
        if depth >= NESTING_LIMIT {
            return Err(ERR);
        }
        let achar = self.stack.pop().ok_or(ERR)?;
        let bchar = self.stack.pop().ok_or(ERR)?;
        let ady = self.stack.pop().ok_or(ERR)?;
        let adx = self.stack.pop().ok_or(ERR)?;
        if !self.width_parsed {
            self.stack.pop();
            self.width_parsed = true;
        }

        let to_code = |v: f32| -> Result<u8, ConvertError> {
            if (0.0..=255.0).contains(&v) && v.fract() == 0.0 {
                Ok(v as u8)
            } else {
                Err(ERR)
            }
        };
        let base_gid = self
            .font
            .seac_code_to_glyph_id(to_code(bchar)?)
            .ok_or(ERR)?;
        let accent_gid = self
            .font
            .seac_code_to_glyph_id(to_code(achar)?)
            .ok_or(ERR)?;

        // Each component is a complete charstring with its own width and
        // hints; the accent is drawn displaced by (adx, ady).
        let base = self.font.char_string(base_gid).ok_or(ERR)?;
        self.x = 0.0;
        self.y = 0.0;
        self.width_parsed = false;
        self.stems_len = 0;
        self.has_endchar = false;
        self.run(base, depth + 1, sink)?;

        let accent = self.font.char_string(accent_gid).ok_or(ERR)?;
        self.x = adx;
        self.y = ady;
        self.width_parsed = false;
        self.stems_len = 0;
        self.has_endchar = false;
        self.run(accent, depth + 1, sink)?;
        Ok(())
    }

    // Flex operators trace two curves each; the flex depth operand is
    // rendering advice and gets dropped.

    fn op_flex<S: OutlineSink>(&mut self, sink: &mut S) -> Result<(), ConvertError> {
        if self.stack.len() != 13 || !self.open {
            return Err(ERR);
        }
        let s: Vec<f32> = self.stack.to_vec();
        self.curve_to(s[0], s[1], s[2], s[3], s[4], s[5], sink);
        self.curve_to(s[6], s[7], s[8], s[9], s[10], s[11], sink);
        Ok(())
    }

    fn op_hflex<S: OutlineSink>(&mut self, sink: &mut S) -> Result<(), ConvertError> {
        if self.stack.len() != 7 || !self.open {
            return Err(ERR);
        }
        let s: Vec<f32> = self.stack.to_vec();
        let start_y = self.y;
        self.curve_to(s[0], 0.0, s[1], s[2], s[3], 0.0, sink);
        // second curve stays on the intermediate y and lands back on the
        // starting y
        let x1 = self.x + s[4];
        let y1 = self.y;
        let x2 = x1 + s[5];
        let y2 = start_y;
        self.x = x2 + s[6];
        self.y = start_y;
        sink.curve_to(x1, y1, x2, y2, self.x, self.y);
        Ok(())
    }

    fn op_hflex1<S: OutlineSink>(&mut self, sink: &mut S) -> Result<(), ConvertError> {
        if self.stack.len() != 9 || !self.open {
            return Err(ERR);
        }
        let s: Vec<f32> = self.stack.to_vec();
        let start_y = self.y;
        self.curve_to(s[0], s[1], s[2], s[3], s[4], 0.0, sink);
        let x1 = self.x + s[5];
        let y1 = self.y;
        let x2 = x1 + s[6];
        let y2 = y1 + s[7];
        self.x = x2 + s[8];
        self.y = start_y;
        sink.curve_to(x1, y1, x2, y2, self.x, self.y);
        Ok(())
    }

    fn op_flex1<S: OutlineSink>(&mut self, sink: &mut S) -> Result<(), ConvertError> {
        if self.stack.len() != 11 || !self.open {
            return Err(ERR);
        }
        let s: Vec<f32> = self.stack.to_vec();
        let start_x = self.x;
        let start_y = self.y;
        let dx = s[0] + s[2] + s[4] + s[6] + s[8];
        let dy = s[1] + s[3] + s[5] + s[7] + s[9];

        self.curve_to(s[0], s[1], s[2], s[3], s[4], s[5], sink);
        let x1 = self.x + s[6];
        let y1 = self.y + s[7];
        let x2 = x1 + s[8];
        let y2 = y1 + s[9];
        if dx.abs() > dy.abs() {
            self.x = x2 + s[10];
            self.y = start_y;
        } else {
            self.x = start_x;
            self.y = y2 + s[10];
        }
        sink.curve_to(x1, y1, x2, y2, self.x, self.y);
        Ok(())
    }
}

fn read_u8(input: &mut &[u8]) -> Result<u8, ConvertError> {
    let (&first, rest) = input.split_first().ok_or(ERR)?;
    *input = rest;
    Ok(first)
}

/// Un-bias a subroutine index operand and fetch the subroutine.
fn resolve_subr<'a>(subrs: &Index<'a>, operand: f32) -> Result<&'a [u8], ConvertError> {
    let bias = calc_subroutine_bias(subrs.len());
    let index = operand as i32 + bias;
    usize::try_from(index)
        .ok()
        .and_then(|i| subrs.get(i))
        .ok_or(ERR)
}

// Adobe Technical Note #5176, Chapter 16 "Local / Global Subrs INDEXes"
fn calc_subroutine_bias(len: usize) -> i32 {
    if len < 1240 {
        107
    } else if len < 33900 {
        1131
    } else {
        32768
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum PathOp {
        Move(f32, f32),
        Line(f32, f32),
        Curve(f32, f32, f32, f32, f32, f32),
        Close,
    }

    #[derive(Default)]
    struct Recorder {
        ops: Vec<PathOp>,
    }

    impl OutlineSink for Recorder {
        fn move_to(&mut self, x: f32, y: f32) {
            self.ops.push(PathOp::Move(x, y));
        }
        fn line_to(&mut self, x: f32, y: f32) {
            self.ops.push(PathOp::Line(x, y));
        }
        fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
            self.ops.push(PathOp::Curve(x1, y1, x2, y2, x, y));
        }
        fn close(&mut self) {
            self.ops.push(PathOp::Close);
        }
    }

    /// A one-glyph Type 1 CFF wrapping `char_string` for glyph 1, with
    /// `.notdef` as glyph 0.
    fn single_glyph_font(char_string: &[u8]) -> Vec<u8> {
        let mut cff = vec![1, 0, 4, 2]; // header
        // Name INDEX: "t"
        cff.extend_from_slice(&[0, 1, 1, 1, 2, b't']);

        // CharStrings INDEX built first to know its size
        let notdef = [14u8]; // bare endchar
        let mut charstrings = Vec::new();
        charstrings.extend_from_slice(&[0, 2, 1]); // count 2, offSize 1
        charstrings.push(1);
        charstrings.push(1 + notdef.len() as u8);
        charstrings.push(1 + notdef.len() as u8 + char_string.len() as u8);
        charstrings.extend_from_slice(&notdef);
        charstrings.extend_from_slice(char_string);

        // Top DICT with a 5-byte CharStrings offset operand for a fixed size
        let mut top_dict = Vec::new();
        let dict_contents_size = 6; // 29 + 4 offset bytes + op 17
        let top_dict_index_overhead = 5; // count, offSize, two offsets
        let charstrings_offset = cff.len()
            + top_dict_index_overhead
            + dict_contents_size
            + 2 // empty String INDEX
            + 2; // empty Global Subr INDEX
        top_dict.push(29);
        top_dict.extend_from_slice(&(charstrings_offset as i32).to_be_bytes());
        top_dict.push(17);

        cff.extend_from_slice(&[0, 1, 1, 1, 1 + top_dict.len() as u8]);
        cff.extend_from_slice(&top_dict);
        cff.extend_from_slice(&[0, 0]); // String INDEX
        cff.extend_from_slice(&[0, 0]); // Global Subr INDEX
        cff.extend_from_slice(&charstrings);
        cff
    }

    fn interpret_single(char_string: &[u8]) -> Result<Vec<PathOp>, ConvertError> {
        let data = single_glyph_font(char_string);
        let font = CffFont::parse(&data).unwrap();
        let mut recorder = Recorder::default();
        interpret(&font, 1, &mut recorder)?;
        Ok(recorder.ops)
    }

    #[test]
    fn triangle_with_width() {
        // width 600, rmoveto(50, 0), rlineto(350 0, -175 700), endchar;
        // the implicit closepath finishes the contour
        let cs = make(&[600.0, 50.0, 0.0], operator::MOVE_TO)
            .chain(&[350.0, 0.0, -175.0, 700.0], operator::LINE_TO)
            .op(operator::ENDCHAR)
            .build();
        let ops = interpret_single(&cs).unwrap();
        assert_eq!(
            ops,
            vec![
                PathOp::Move(50.0, 0.0),
                PathOp::Line(400.0, 0.0),
                PathOp::Line(225.0, 700.0),
                PathOp::Close,
            ]
        );
    }

    #[test]
    fn alternating_line_ops() {
        let cs = make(&[0.0, 0.0], operator::MOVE_TO)
            .chain(&[100.0, 50.0, -20.0], operator::HORIZONTAL_LINE_TO)
            .op(operator::ENDCHAR)
            .build();
        let ops = interpret_single(&cs).unwrap();
        assert_eq!(
            ops,
            vec![
                PathOp::Move(0.0, 0.0),
                PathOp::Line(100.0, 0.0),
                PathOp::Line(100.0, 50.0),
                PathOp::Line(80.0, 50.0),
                PathOp::Close,
            ]
        );
    }

    #[test]
    fn curves_accumulate_relative_coordinates() {
        let cs = make(&[0.0, 0.0], operator::MOVE_TO)
            .chain(&[10.0, 20.0, 30.0, 40.0, 50.0, 60.0], operator::CURVE_TO)
            .op(operator::ENDCHAR)
            .build();
        let ops = interpret_single(&cs).unwrap();
        assert_eq!(
            ops,
            vec![
                PathOp::Move(0.0, 0.0),
                PathOp::Curve(10.0, 20.0, 40.0, 60.0, 90.0, 120.0),
                PathOp::Close,
            ]
        );
    }

    #[test]
    fn hintmask_skips_mask_bytes() {
        // hstem(0 20), hintmask 0x80, then a contour
        let mut cs = make(&[0.0, 20.0], operator::HORIZONTAL_STEM).build();
        cs.push(operator::HINT_MASK);
        cs.push(0x80);
        let rest = make(&[10.0, 10.0], operator::MOVE_TO)
            .op(operator::ENDCHAR)
            .build();
        cs.extend_from_slice(&rest);
        let ops = interpret_single(&cs).unwrap();
        assert_eq!(ops[0], PathOp::Move(10.0, 10.0));
    }

    #[test]
    fn missing_endchar_is_an_error() {
        let cs = make(&[0.0, 0.0], operator::MOVE_TO).build();
        assert!(matches!(
            interpret_single(&cs),
            Err(ConvertError::OutlineConversionFailed)
        ));
    }

    #[test]
    fn data_after_endchar_is_an_error() {
        let mut cs = make(&[0.0, 0.0], operator::MOVE_TO)
            .op(operator::ENDCHAR)
            .build();
        cs.push(operator::ENDCHAR);
        assert!(interpret_single(&cs).is_err());
    }

    // Small charstring assembler for tests: encodes numbers as shortint.
    struct Builder {
        bytes: Vec<u8>,
    }

    fn make(args: &[f32], op: u8) -> Builder {
        Builder { bytes: Vec::new() }.chain(args, op)
    }

    impl Builder {
        fn chain(mut self, args: &[f32], op: u8) -> Builder {
            for &arg in args {
                self.bytes.push(operator::SHORT_INT);
                self.bytes.extend_from_slice(&(arg as i16).to_be_bytes());
            }
            self.bytes.push(op);
            self
        }

        fn op(mut self, op: u8) -> Builder {
            self.bytes.push(op);
            self
        }

        fn build(self) -> Vec<u8> {
            self.bytes
        }
    }
}

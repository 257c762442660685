//! Reconstruction of `hmtx` from the WOFF2 transformed form, which omits
//! left side bearings that match the glyph bounding boxes.
//!
//! <https://www.w3.org/TR/WOFF2/#hmtx_table_format>

use bytes::{Buf, BufMut};

use crate::error::{ConvertError, bail_container_if};

const OMITS_PROPORTIONAL_LSBS: u8 = 1 << 0;
const OMITS_MONOSPACE_LSBS: u8 = 1 << 1;

pub(crate) fn reconstruct_hmtx(
    data: &[u8],
    num_glyphs: u16,
    num_hmetrics: u16,
    x_mins: &[i16],
) -> Result<Vec<u8>, ConvertError> {
    let mut input = data;
    let flags = input.try_get_u8()?;
    let omits_proportional_lsbs = flags & OMITS_PROPORTIONAL_LSBS != 0;
    let omits_monospace_lsbs = flags & OMITS_MONOSPACE_LSBS != 0;
    bail_container_if!(flags & 0xFC != 0, "reserved hmtx flag bits set");
    // A transformed hmtx with nothing omitted carries no benefit and is
    // required to be rejected.
    bail_container_if!(
        !omits_proportional_lsbs && !omits_monospace_lsbs,
        "hmtx transform omits nothing"
    );

    bail_container_if!(x_mins.len() != num_glyphs as usize, "x_min count mismatch");
    bail_container_if!(num_hmetrics > num_glyphs, "more hmetrics than glyphs");
    bail_container_if!(num_hmetrics < 1, "hhea requires at least one hmetric");

    let mut advance_widths: Vec<u16> = Vec::with_capacity(num_hmetrics as usize);
    for _ in 0..num_hmetrics {
        advance_widths.push(input.try_get_u16()?);
    }

    let mut lsbs: Vec<i16> = Vec::with_capacity(num_glyphs as usize);
    for i in 0..num_hmetrics as usize {
        lsbs.push(if omits_proportional_lsbs {
            x_mins[i]
        } else {
            input.try_get_i16()?
        });
    }
    for i in num_hmetrics as usize..num_glyphs as usize {
        lsbs.push(if omits_monospace_lsbs {
            x_mins[i]
        } else {
            input.try_get_i16()?
        });
    }

    let mut hmtx: Vec<u8> = Vec::with_capacity(2 * num_glyphs as usize + 2 * num_hmetrics as usize);
    for (i, &lsb) in lsbs.iter().enumerate() {
        if i < num_hmetrics as usize {
            hmtx.put_u16(advance_widths[i]);
        }
        hmtx.put_i16(lsb);
    }
    Ok(hmtx)
}

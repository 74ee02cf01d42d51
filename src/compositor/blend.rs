//! Composite operations on premultiplied RGBA8 buffers
//!
//! Every destination buffer is `width * height * 4` bytes; mask buffers carry
//! one byte per pixel.

use crate::error::{EffectError, EffectResult};

pub type PremulRgba8 = [u8; 4];

/// Empty the surface to transparent black
pub fn clear(dst: &mut [u8]) {
    dst.fill(0);
}

/// Replace composite of a confidence mask: alpha takes the mask, color is black
pub fn draw_mask(dst: &mut [u8], mask: &[u8]) -> EffectResult<()> {
    if dst.len() != mask.len() * 4 {
        return Err(EffectError::frame_render(
            "draw_mask expects one mask byte per rgba8 pixel",
        ));
    }
    for (d, &m) in dst.chunks_exact_mut(4).zip(mask) {
        d.copy_from_slice(&[0, 0, 0, m]);
    }
    Ok(())
}

/// `source-in`: keep `src` only where the destination is opaque
pub fn source_in(dst: PremulRgba8, src: PremulRgba8) -> PremulRgba8 {
    let da = u16::from(dst[3]);
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = mul_div255(u16::from(src[i]), da);
    }
    out
}

/// `destination-over`: paint `src` behind what is already there
pub fn destination_over(dst: PremulRgba8, src: PremulRgba8) -> PremulRgba8 {
    let inv = 255u16 - u16::from(dst[3]);
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = dst[i].saturating_add(mul_div255(u16::from(src[i]), inv));
    }
    out
}

pub fn source_in_place(dst: &mut [u8], src: &[u8]) -> EffectResult<()> {
    check_pair(dst, src, "source_in_place")?;
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let out = source_in([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]]);
        d.copy_from_slice(&out);
    }
    Ok(())
}

pub fn destination_over_in_place(dst: &mut [u8], src: &[u8]) -> EffectResult<()> {
    check_pair(dst, src, "destination_over_in_place")?;
    for (d, s) in dst.chunks_exact_mut(4).zip(src.chunks_exact(4)) {
        let out = destination_over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]]);
        d.copy_from_slice(&out);
    }
    Ok(())
}

/// Flip every row horizontally
pub fn mirror_in_place(buf: &mut [u8], width: u32) {
    let row_len = width as usize * 4;
    if row_len == 0 {
        return;
    }
    for row in buf.chunks_exact_mut(row_len) {
        let pixels = width as usize;
        for x in 0..pixels / 2 {
            let (left, right) = (x * 4, (pixels - 1 - x) * 4);
            for c in 0..4 {
                row.swap(left + c, right + c);
            }
        }
    }
}

pub fn premultiply_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a == 0 {
            px[0] = 0;
            px[1] = 0;
            px[2] = 0;
            continue;
        }
        px[0] = mul_div255(u16::from(px[0]), a);
        px[1] = mul_div255(u16::from(px[1]), a);
        px[2] = mul_div255(u16::from(px[2]), a);
    }
}

pub fn unpremultiply_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = u32::from(px[3]);
        if a == 0 || a == 255 {
            continue;
        }
        for c in 0..3 {
            px[c] = ((u32::from(px[c]) * 255 + a / 2) / a).min(255) as u8;
        }
    }
}

fn check_pair(dst: &[u8], src: &[u8], op: &str) -> EffectResult<()> {
    if dst.len() != src.len() || !dst.len().is_multiple_of(4) {
        return Err(EffectError::frame_render(format!(
            "{op} expects equal-length rgba8 buffers"
        )));
    }
    Ok(())
}

pub(crate) fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

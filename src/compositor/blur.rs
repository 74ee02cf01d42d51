//! Gaussian blur approximation for premultiplied RGBA8
//!
//! Three successive box blurs whose widths are chosen so their combined
//! variance matches the requested standard deviation. Each pass is a running
//! sum, so the cost does not grow with the radius.

use crate::error::{EffectError, EffectResult};
use crate::pipeline::rgba_len;

const PASSES: usize = 3;

pub fn blur_rgba8_premul(src: &[u8], width: u32, height: u32, sigma: f32) -> EffectResult<Vec<u8>> {
    let expected_len = rgba_len(width, height)
        .ok_or_else(|| EffectError::frame_render("blur buffer size overflow"))?;
    if src.len() != expected_len {
        return Err(EffectError::frame_render(
            "blur_rgba8_premul expects src matching width*height*4",
        ));
    }
    if !sigma.is_finite() || sigma < 0.0 {
        return Err(EffectError::frame_render("blur sigma must be >= 0"));
    }
    if sigma < 0.5 || expected_len == 0 {
        return Ok(src.to_vec());
    }

    let mut out = src.to_vec();
    let mut tmp = vec![0u8; expected_len];
    for size in box_sizes(sigma) {
        let radius = (size - 1) / 2;
        horizontal_box(&out, &mut tmp, width, height, radius);
        vertical_box(&tmp, &mut out, width, height, radius);
    }
    Ok(out)
}

/// Odd box widths for a three-pass approximation of `sigma`
pub fn box_sizes(sigma: f32) -> [usize; PASSES] {
    let n = PASSES as f32;
    let ideal = ((12.0 * sigma * sigma / n) + 1.0).sqrt();
    let mut lower = ideal.floor() as i64;
    if lower % 2 == 0 {
        lower -= 1;
    }
    let lower = lower.max(1);
    let upper = lower + 2;

    let l = lower as f32;
    let m = ((12.0 * sigma * sigma - n * l * l - 4.0 * n * l - 3.0 * n) / (-4.0 * l - 4.0))
        .round()
        .clamp(0.0, n) as usize;

    let mut sizes = [upper as usize; PASSES];
    for size in sizes.iter_mut().take(m) {
        *size = lower as usize;
    }
    sizes
}

fn horizontal_box(src: &[u8], dst: &mut [u8], width: u32, height: u32, radius: usize) {
    let w = width as usize;
    let row_len = w * 4;
    for y in 0..height as usize {
        let row = &src[y * row_len..(y + 1) * row_len];
        let out = &mut dst[y * row_len..(y + 1) * row_len];
        box_line(w, radius, |i| pixel(row, i), |i, px| {
            out[i * 4..i * 4 + 4].copy_from_slice(&px)
        });
    }
}

fn vertical_box(src: &[u8], dst: &mut [u8], width: u32, height: u32, radius: usize) {
    let (w, h) = (width as usize, height as usize);
    for x in 0..w {
        box_line(h, radius, |i| pixel(src, i * w + x), |i, px| {
            dst[(i * w + x) * 4..(i * w + x) * 4 + 4].copy_from_slice(&px)
        });
    }
}

fn pixel(buf: &[u8], index: usize) -> [u8; 4] {
    let i = index * 4;
    [buf[i], buf[i + 1], buf[i + 2], buf[i + 3]]
}

/// Running-sum box filter over one line of `len` pixels, edges clamped
fn box_line(
    len: usize,
    radius: usize,
    read: impl Fn(usize) -> [u8; 4],
    mut write: impl FnMut(usize, [u8; 4]),
) {
    if len == 0 {
        return;
    }
    let last = len - 1;
    let r = radius as i64;
    let window = (2 * radius + 1) as u32;
    let at = |i: i64| read(i.clamp(0, last as i64) as usize);

    let mut acc = [0u32; 4];
    for i in -r..=r {
        let px = at(i);
        for c in 0..4 {
            acc[c] += u32::from(px[c]);
        }
    }

    for i in 0..len as i64 {
        let mut px = [0u8; 4];
        for c in 0..4 {
            px[c] = ((acc[c] + window / 2) / window) as u8;
        }
        write(i as usize, px);

        let incoming = at(i + r + 1);
        let outgoing = at(i - r);
        for c in 0..4 {
            acc[c] = acc[c] + u32::from(incoming[c]) - u32::from(outgoing[c]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blur_sigma_0_is_identity() {
        let src = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
        let out = blur_rgba8_premul(&src, 1, 2, 0.0).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn blur_constant_image_is_identity() {
        let (w, h) = (6u32, 4u32);
        let px = [10u8, 20u8, 30u8, 40u8];
        let src = px.repeat((w * h) as usize);
        let out = blur_rgba8_premul(&src, w, h, 20.0).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn blur_spreads_energy_from_single_pixel() {
        let (w, h) = (9u32, 9u32);
        let mut src = vec![0u8; (w * h * 4) as usize];
        let center = ((4 * w + 4) * 4) as usize;
        src[center..center + 4].copy_from_slice(&[255, 255, 255, 255]);

        let out = blur_rgba8_premul(&src, w, h, 1.5).unwrap();
        assert!(out[center + 3] < 255);
        let neighbor = ((4 * w + 5) * 4) as usize;
        assert!(out[neighbor + 3] > 0);
    }

    #[test]
    fn larger_sigma_spreads_further() {
        let (w, h) = (64u32, 1u32);
        let mut src = vec![0u8; (w * h * 4) as usize];
        for px in src.chunks_exact_mut(4).take(32) {
            px.copy_from_slice(&[255, 255, 255, 255]);
        }
        let soft = blur_rgba8_premul(&src, w, h, 2.0).unwrap();
        let softer = blur_rgba8_premul(&src, w, h, 6.0).unwrap();
        let edge = 38 * 4 + 3;
        assert!(softer[edge] > soft[edge]);
    }

    #[test]
    fn box_sizes_are_odd_and_grow() {
        for sigma in [1.0f32, 10.0, 20.0, 30.0] {
            let sizes = box_sizes(sigma);
            assert!(sizes.iter().all(|s| s % 2 == 1));
        }
        assert!(box_sizes(30.0)[0] > box_sizes(10.0)[0]);
    }

    #[test]
    fn rejects_mismatched_buffer() {
        assert!(blur_rgba8_premul(&[0u8; 7], 1, 2, 1.0).is_err());
    }
}

//! Packed segment layouts → RGBA8.
//!
//! Rows in the shared segment are tightly packed (`width * bytes_per_pixel`).
//! The destination is always `width * height * 4` bytes.

use crate::renderer::types::PixelFormat;

/// Convert one full frame. `src` and `dst` must hold at least one frame each.
pub fn to_rgba(format: PixelFormat, src: &[u8], dst: &mut [u8]) {
    match format {
        PixelFormat::Bgra32 => bgra_to_rgba(src, dst),
        PixelFormat::Rgb24 => rgb_to_rgba(src, dst),
        PixelFormat::Yuy2 => yuy2_to_rgba(src, dst),
    }
}

fn bgra_to_rgba(src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        d[0] = s[2];
        d[1] = s[1];
        d[2] = s[0];
        d[3] = 255;
    }
}

fn rgb_to_rgba(src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.chunks_exact(3).zip(dst.chunks_exact_mut(4)) {
        d[..3].copy_from_slice(s);
        d[3] = 255;
    }
}

/// BT.601 limited range, two pixels per 4-byte macropixel.
fn yuy2_to_rgba(src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(8)) {
        let (y0, u, y1, v) = (s[0], s[1], s[2], s[3]);
        write_yuv(y0, u, v, &mut d[..4]);
        write_yuv(y1, u, v, &mut d[4..]);
    }
}

fn write_yuv(y: u8, u: u8, v: u8, out: &mut [u8]) {
    let c = (i32::from(y) - 16).max(0) * 298;
    let d = i32::from(u) - 128;
    let e = i32::from(v) - 128;
    let clamp = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    out[0] = clamp(c + 409 * e);
    out[1] = clamp(c - 100 * d - 208 * e);
    out[2] = clamp(c + 516 * d);
    out[3] = 255;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgra_swaps_red_and_blue() {
        let src = [10, 20, 30, 0, 1, 2, 3, 99];
        let mut dst = [0u8; 8];
        to_rgba(PixelFormat::Bgra32, &src, &mut dst);
        assert_eq!(dst, [30, 20, 10, 255, 3, 2, 1, 255]);
    }

    #[test]
    fn rgb24_expands_with_opaque_alpha() {
        let src = [1, 2, 3, 4, 5, 6];
        let mut dst = [0u8; 8];
        to_rgba(PixelFormat::Rgb24, &src, &mut dst);
        assert_eq!(dst, [1, 2, 3, 255, 4, 5, 6, 255]);
    }

    #[test]
    fn yuy2_black_and_white() {
        // black pixel then white pixel, neutral chroma
        let src = [16, 128, 235, 128];
        let mut dst = [0u8; 8];
        to_rgba(PixelFormat::Yuy2, &src, &mut dst);
        assert_eq!(&dst[..4], &[0, 0, 0, 255]);
        assert_eq!(&dst[4..], &[255, 255, 255, 255]);
    }

    #[test]
    fn yuy2_red_is_mostly_red() {
        // BT.601 red: Y=81 U=90 V=240
        let src = [81, 90, 81, 240];
        let mut dst = [0u8; 8];
        to_rgba(PixelFormat::Yuy2, &src, &mut dst);
        assert!(dst[0] > 240, "r={}", dst[0]);
        assert!(dst[1] < 10, "g={}", dst[1]);
        assert!(dst[2] < 10, "b={}", dst[2]);
    }
}

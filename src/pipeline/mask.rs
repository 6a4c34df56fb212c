// FOVEA Mask Compositor
// Copyright (c) 2026 The FOVEA Project
//
// Geometry that keeps the region of interest aligned across layers of
// different pixel dimensions, the circular mask itself, and the
// resolution-priority compositing used on the consumer side.
//
// Alpha blending the discs would avoid hard edges but its cost grows with
// the number of composited layers, so compositing stays a per-pixel
// priority select: high if present, else med, else low.

use anyhow::{bail, Result};

use super::Frame;

/// Map a point from one layer's coordinate space to another's by the
/// per-axis resolution ratio. The result is clamped into the target frame.
pub fn scale_center(center: (u32, u32), from: (u32, u32), to: (u32, u32)) -> (u32, u32) {
    let x = (center.0 as f64 * to.0 as f64 / from.0 as f64).round() as i64;
    let y = (center.1 as f64 * to.1 as f64 / from.1 as f64).round() as i64;
    (
        x.clamp(0, to.0 as i64 - 1) as u32,
        y.clamp(0, to.1 as i64 - 1) as u32,
    )
}

/// Scale a radius between layers by the mean of the per-axis ratios, so the
/// disc covers the same visual extent despite differing pixel dimensions.
pub fn scale_radius(radius: u32, from: (u32, u32), to: (u32, u32)) -> u32 {
    let ratio =
        (to.0 as f64 / from.0 as f64 + to.1 as f64 / from.1 as f64) / 2.0;
    (radius as f64 * ratio).round() as u32
}

/// Produce a copy of `frame` where every pixel at distance >= `radius` from
/// `center` is zeroed. The source frame is never mutated; a disc partially
/// off-frame is simply truncated at the frame edge.
pub fn apply_circular_mask(frame: &Frame, center: (u32, u32), radius: u32) -> Result<Frame> {
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        bail!("cannot mask a zero-area frame ({}x{})", width, height);
    }

    let mut masked = Frame::new(width, height);
    if radius == 0 {
        return Ok(masked);
    }

    let r2 = radius as i64 * radius as i64;
    let (cx, cy) = (center.0 as i64, center.1 as i64);

    // Only the disc's bounding box needs visiting; the rest stays zero.
    let x0 = (cx - radius as i64).max(0) as u32;
    let x1 = ((cx + radius as i64).min(width as i64 - 1)) as u32;
    let y0 = (cy - radius as i64).max(0) as u32;
    let y1 = ((cy + radius as i64).min(height as i64 - 1)) as u32;

    for y in y0..=y1 {
        for x in x0..=x1 {
            let dx = x as i64 - cx;
            let dy = y as i64 - cy;
            if dx * dx + dy * dy < r2 {
                masked.put_pixel(x, y, *frame.get_pixel(x, y));
            }
        }
    }
    Ok(masked)
}

/// Consumer-side compositing. All three frames must share dimensions (the
/// caller aligns them to the low layer first). A pixel is taken from the
/// highest-priority layer whose first channel is non-zero, the zeroed mask
/// exterior acting as a transparency proxy.
pub fn composite_priority(low: &Frame, med: &Frame, high: &Frame) -> Result<Frame> {
    let dims = low.dimensions();
    if med.dimensions() != dims || high.dimensions() != dims {
        bail!(
            "composite dimension mismatch: low {:?}, med {:?}, high {:?}",
            dims,
            med.dimensions(),
            high.dimensions()
        );
    }

    let mut out = Frame::new(dims.0, dims.1);
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        let h = high.get_pixel(x, y);
        let m = med.get_pixel(x, y);
        *pixel = if h[0] != 0 {
            *h
        } else if m[0] != 0 {
            *m
        } else {
            *low.get_pixel(x, y)
        };
    }
    Ok(out)
}

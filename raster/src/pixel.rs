//! Stateless packed-pixel codecs.
//!
//! Each [`SurfaceFormat`] is a pure pair of functions between a packed pixel value and canonical
//! 32-bit ARGB. Integer formats are bit rearrangement; the narrow 16-bit formats replicate their
//! high bits downward on expansion (`(v << 3) | (v >> 2)` for five bits) instead of zero-filling,
//! which keeps reduce-then-expand round trips visually smooth. The forward conversion is the
//! authoritative one: a reduce/expand round trip is only exact at full-precision band widths.

/// A canonical packed surface layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SurfaceFormat {
    /// `0x__RRGGBB`, opaque; the padding byte is ignored on input and zero on output.
    Rgb,
    /// `0x__BBGGRR`, opaque.
    Bgr,
    /// `0xAARRGGBB`.
    Argb,
    /// `0xAARRGGBB` with color channels pre-scaled by alpha.
    ArgbPre,
    /// 16-bit `rrrrrggggggbbbbb`.
    Rgb565,
    /// 15-bit `0rrrrrgggggbbbbb`.
    Rgb555,
    /// 16-bit `aaaarrrrggggbbbb`.
    Argb4444,
    /// 8-bit luminance.
    Gray8,
    /// 16-bit luminance.
    Gray16,
}

#[inline]
fn expand5(v: u32) -> u32 {
    (v << 3) | (v >> 2)
}

#[inline]
fn expand6(v: u32) -> u32 {
    (v << 2) | (v >> 4)
}

#[inline]
fn expand4(v: u32) -> u32 {
    (v << 4) | v
}

/// Luminance of an ARGB value with the fixed 0.299/0.587/0.114 weights, rounded.
#[inline]
pub fn luminance(argb: u32) -> u32 {
    let r = (argb >> 16) & 0xff;
    let g = (argb >> 8) & 0xff;
    let b = argb & 0xff;
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32 + 0.5) as u32
}

/// Scale the color channels of an ARGB value by its alpha.
///
/// `alpha + (alpha >> 7)` is the well-known fast-premultiply idiom approximating the
/// `alpha / 255` scale in fixed point; it is kept verbatim because its exact rounding is part of
/// the format's observable behavior.
#[inline]
pub fn premultiply(argb: u32) -> u32 {
    let alpha = argb >> 24;
    if alpha == 0xff {
        return argb;
    }
    if alpha == 0 {
        return 0;
    }
    let scale = alpha + (alpha >> 7);
    let r = (((argb >> 16) & 0xff) * scale) >> 8;
    let g = (((argb >> 8) & 0xff) * scale) >> 8;
    let b = ((argb & 0xff) * scale) >> 8;
    (alpha << 24) | (r << 16) | (g << 8) | b
}

/// Undo [`premultiply`].
///
/// Alpha 0 and 255 pass through unchanged: the 255 case is an identity to avoid rounding drift
/// and the 0 case avoids the division outright.
#[inline]
pub fn unpremultiply(argb_pre: u32) -> u32 {
    let alpha = argb_pre >> 24;
    if alpha == 0 || alpha == 0xff {
        return argb_pre;
    }
    let unscale = |c: u32| (((c << 8) - c) / alpha).min(0xff);
    let r = unscale((argb_pre >> 16) & 0xff);
    let g = unscale((argb_pre >> 8) & 0xff);
    let b = unscale(argb_pre & 0xff);
    (alpha << 24) | (r << 16) | (g << 8) | b
}

impl SurfaceFormat {
    /// Significant bits of a packed pixel in this format.
    pub fn bits_per_pixel(self) -> u32 {
        match self {
            SurfaceFormat::Rgb | SurfaceFormat::Bgr => 24,
            SurfaceFormat::Argb | SurfaceFormat::ArgbPre => 32,
            SurfaceFormat::Rgb565 | SurfaceFormat::Argb4444 | SurfaceFormat::Gray16 => 16,
            SurfaceFormat::Rgb555 => 15,
            SurfaceFormat::Gray8 => 8,
        }
    }

    /// Whether [`Self::to_argb`] of [`Self::from_argb`] loses channel precision.
    pub fn is_lossy(self) -> bool {
        matches!(
            self,
            SurfaceFormat::Rgb565
                | SurfaceFormat::Rgb555
                | SurfaceFormat::Argb4444
                | SurfaceFormat::Gray8
                | SurfaceFormat::Gray16
        )
    }

    /// Expand a packed pixel to canonical ARGB.
    pub fn to_argb(self, packed: u32) -> u32 {
        match self {
            SurfaceFormat::Rgb => 0xff00_0000 | (packed & 0x00ff_ffff),
            SurfaceFormat::Bgr => {
                let b = (packed >> 16) & 0xff;
                let g = (packed >> 8) & 0xff;
                let r = packed & 0xff;
                0xff00_0000 | (r << 16) | (g << 8) | b
            }
            SurfaceFormat::Argb => packed,
            SurfaceFormat::ArgbPre => unpremultiply(packed),
            SurfaceFormat::Rgb565 => {
                let r = expand5((packed >> 11) & 0x1f);
                let g = expand6((packed >> 5) & 0x3f);
                let b = expand5(packed & 0x1f);
                0xff00_0000 | (r << 16) | (g << 8) | b
            }
            SurfaceFormat::Rgb555 => {
                let r = expand5((packed >> 10) & 0x1f);
                let g = expand5((packed >> 5) & 0x1f);
                let b = expand5(packed & 0x1f);
                0xff00_0000 | (r << 16) | (g << 8) | b
            }
            SurfaceFormat::Argb4444 => {
                let a = expand4((packed >> 12) & 0xf);
                let r = expand4((packed >> 8) & 0xf);
                let g = expand4((packed >> 4) & 0xf);
                let b = expand4(packed & 0xf);
                (a << 24) | (r << 16) | (g << 8) | b
            }
            SurfaceFormat::Gray8 => {
                let v = packed & 0xff;
                0xff00_0000 | (v << 16) | (v << 8) | v
            }
            SurfaceFormat::Gray16 => {
                let v = (packed >> 8) & 0xff;
                0xff00_0000 | (v << 16) | (v << 8) | v
            }
        }
    }

    /// Reduce a canonical ARGB value to a packed pixel.
    pub fn from_argb(self, argb: u32) -> u32 {
        match self {
            SurfaceFormat::Rgb => argb & 0x00ff_ffff,
            SurfaceFormat::Bgr => {
                let r = (argb >> 16) & 0xff;
                let g = (argb >> 8) & 0xff;
                let b = argb & 0xff;
                (b << 16) | (g << 8) | r
            }
            SurfaceFormat::Argb => argb,
            SurfaceFormat::ArgbPre => premultiply(argb),
            SurfaceFormat::Rgb565 => {
                let r = (argb >> 19) & 0x1f;
                let g = (argb >> 10) & 0x3f;
                let b = (argb >> 3) & 0x1f;
                (r << 11) | (g << 5) | b
            }
            SurfaceFormat::Rgb555 => {
                let r = (argb >> 19) & 0x1f;
                let g = (argb >> 11) & 0x1f;
                let b = (argb >> 3) & 0x1f;
                (r << 10) | (g << 5) | b
            }
            SurfaceFormat::Argb4444 => {
                let a = (argb >> 28) & 0xf;
                let r = (argb >> 20) & 0xf;
                let g = (argb >> 12) & 0xf;
                let b = (argb >> 4) & 0xf;
                (a << 12) | (r << 8) | (g << 4) | b
            }
            SurfaceFormat::Gray8 => luminance(argb),
            // Scale the 8-bit result by 257 so 0..255 maps evenly onto 0..65535, rather than
            // re-deriving the weights at 16-bit precision.
            SurfaceFormat::Gray16 => luminance(argb) * 257,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argb_is_identity() {
        for argb in [0u32, 0x8040_2010, 0xffff_ffff, 0x0123_4567] {
            assert_eq!(SurfaceFormat::Argb.to_argb(SurfaceFormat::Argb.from_argb(argb)), argb);
        }
    }

    #[test]
    fn premultiply_boundary_alphas_are_lossless() {
        for rgb in [0x0000_0000u32, 0x00ab_cdef, 0x00ff_ffff] {
            let opaque = 0xff00_0000 | rgb;
            assert_eq!(unpremultiply(premultiply(opaque)), opaque);
            assert_eq!(premultiply(rgb), 0, "alpha zero collapses to zero");
        }
    }

    #[test]
    fn premultiply_round_trip_within_one_unit() {
        for alpha in 1..255u32 {
            let argb = (alpha << 24) | 0x00c8_6414;
            let round = unpremultiply(premultiply(argb));
            for shift in [16, 8, 0] {
                let a = (argb >> shift) & 0xff;
                let b = (round >> shift) & 0xff;
                // Premultiplication quantizes to alpha steps; the round trip may land one
                // representable value away from the input after rescaling.
                let err = a.abs_diff(b);
                let step = 255 / alpha + 2;
                assert!(err <= step, "alpha {alpha}: {a:#x} vs {b:#x}");
            }
        }
    }

    #[test]
    fn narrow_expansion_replicates_bits() {
        // Full white survives the 565 round trip exactly because replication refills the low
        // bits.
        assert_eq!(SurfaceFormat::Rgb565.to_argb(0xffff), 0xffff_ffff);
        assert_eq!(SurfaceFormat::Rgb555.to_argb(0x7fff), 0xffff_ffff);
        assert_eq!(SurfaceFormat::Argb4444.to_argb(0xffff), 0xffff_ffff);
        // And full black maps to opaque black for the opaque formats.
        assert_eq!(SurfaceFormat::Rgb565.to_argb(0), 0xff00_0000);
    }

    #[test]
    fn gray_weights() {
        let argb = 0xff00_0000 | (0x40 << 16) | (0x80 << 8) | 0xc0;
        let gray = SurfaceFormat::Gray8.from_argb(argb);
        assert_eq!(gray, (0.299 * 64.0 + 0.587 * 128.0 + 0.114 * 192.0 + 0.5) as u32);
        assert_eq!(SurfaceFormat::Gray16.from_argb(argb), gray * 257);
        assert_eq!(SurfaceFormat::Gray16.to_argb(0xffff), 0xffff_ffff);
    }

    #[test]
    fn gray_round_trip_when_channels_match() {
        for v in [0u32, 0x55, 0xaa, 0xff] {
            let argb = 0xff00_0000 | (v << 16) | (v << 8) | v;
            assert_eq!(SurfaceFormat::Gray8.to_argb(SurfaceFormat::Gray8.from_argb(argb)), argb);
        }
    }
}

//! Raster geometry and its verification.
//!
//! A [`RasterSpec`] is a plain description of how pixel samples map onto a flat buffer: origin
//! translation, strides, per-band offsets and, for the sub-byte packed variant, a bit depth. A
//! [`RasterLayout`] is the validated form. Validation happens once, at construction, and proves
//! that every index a raster can compute stays inside a 32-bit signed budget and inside the
//! backing buffer. The access methods then only check coordinates, not arithmetic.
use alloc::boxed::Box;
use core::fmt;

/// Maximum index budget shared by all layouts.
///
/// Strides and dimensions are multiplied in 64-bit and compared against this; anything larger is
/// rejected rather than left to wrap.
const INDEX_BUDGET: i64 = i32::MAX as i64;

/// A plain description of a raster's geometry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RasterSpec {
    /// The number of pixels along a row.
    pub width: u32,
    /// The number of rows.
    pub height: u32,
    /// External x coordinate of the left-most column.
    pub min_x: i32,
    /// External y coordinate of the top-most row.
    pub min_y: i32,
    /// Element count advancing one column. Zero for the sub-byte packed variant.
    pub pixel_stride: usize,
    /// Element count advancing one row.
    pub scanline_stride: usize,
    /// Per-band starting offset within a pixel group. For banded layouts these are plane
    /// offsets; for interleaved layouts, offsets within one pixel.
    pub band_offsets: Box<[usize]>,
    /// Element offset of the first pixel group in the backing buffer.
    pub base_offset: usize,
    /// Bits per pixel for the sub-byte packed variant; `None` otherwise.
    pub packed_bits: Option<u8>,
    /// Bit offset of the first pixel within the base byte. Packed variant only.
    pub data_bit_offset: usize,
}

impl RasterSpec {
    /// A contiguous, band-interleaved spec with origin zero.
    pub fn interleaved(width: u32, height: u32, bands: usize) -> Self {
        let band_offsets = (0..bands).collect();
        RasterSpec {
            width,
            height,
            min_x: 0,
            min_y: 0,
            pixel_stride: bands,
            scanline_stride: width as usize * bands,
            band_offsets,
            base_offset: 0,
            packed_bits: None,
            data_bit_offset: 0,
        }
    }

    /// A contiguous banded spec: one plane per band, planes back-to-back.
    pub fn banded(width: u32, height: u32, bands: usize) -> Self {
        let plane = width as usize * height as usize;
        let band_offsets = (0..bands).map(|b| b * plane).collect();
        RasterSpec {
            width,
            height,
            min_x: 0,
            min_y: 0,
            pixel_stride: 1,
            scanline_stride: width as usize,
            band_offsets,
            base_offset: 0,
            packed_bits: None,
            data_bit_offset: 0,
        }
    }

    /// A single-band sub-byte packed spec with rows padded to whole bytes.
    pub fn bit_packed(width: u32, height: u32, bits: u8) -> Self {
        let scanline_stride = ((width as usize) * (bits as usize)).div_ceil(8);
        RasterSpec {
            width,
            height,
            min_x: 0,
            min_y: 0,
            pixel_stride: 0,
            scanline_stride,
            band_offsets: Box::new([0]),
            base_offset: 0,
            packed_bits: Some(bits),
            data_bit_offset: 0,
        }
    }

    pub fn bands(&self) -> usize {
        self.band_offsets.len()
    }
}

/// A validated raster geometry.
///
/// Invariant: for every coordinate in `[min_x, max_x) × [min_y, max_y)` and every band, the
/// computed element index lies in `[0, past_end)`, and `past_end` fits the 32-bit signed budget.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RasterLayout {
    spec: RasterSpec,
    /// One past the largest addressable element, as proof of the calculation.
    past_end: usize,
}

/// Error that occurs when a [`RasterSpec`] is invalid.
#[derive(Debug, PartialEq, Eq)]
pub struct LayoutError {
    kind: LayoutErrorKind,
}

#[derive(Debug, PartialEq, Eq)]
enum LayoutErrorKind {
    EmptyDimensions,
    NoBands,
    IndexOverflow,
    BadPackDepth,
    BadBitOffset,
    BadBandMasks,
    StrideTooSmall,
}

impl LayoutError {
    /// A packed-int mask set was empty or had non-contiguous bits.
    pub(crate) fn bad_band_masks() -> Self {
        LayoutErrorKind::BadBandMasks.into()
    }
}

impl RasterLayout {
    /// Validate a specification.
    ///
    /// Rejects (never clamps) empty dimensions, a pack depth other than 1, 2 or 4, and any
    /// stride/offset combination whose largest reachable index overflows the 32-bit budget.
    pub fn with_spec(spec: RasterSpec) -> Result<Self, LayoutError> {
        if spec.width == 0 || spec.height == 0 {
            return Err(LayoutErrorKind::EmptyDimensions.into());
        }

        if spec.band_offsets.is_empty() {
            return Err(LayoutErrorKind::NoBands.into());
        }

        let width = spec.width as i64;
        let height = spec.height as i64;

        if width * height > INDEX_BUDGET {
            return Err(LayoutErrorKind::IndexOverflow.into());
        }

        // The external coordinate range must stay representable as well.
        if (spec.min_x as i64) + width > INDEX_BUDGET || (spec.min_y as i64) + height > INDEX_BUDGET
        {
            return Err(LayoutErrorKind::IndexOverflow.into());
        }

        let past_end = match spec.packed_bits {
            Some(bits) => {
                if !matches!(bits, 1 | 2 | 4) {
                    return Err(LayoutErrorKind::BadPackDepth.into());
                }
                if spec.pixel_stride != 0 || spec.bands() != 1 {
                    return Err(LayoutErrorKind::BadPackDepth.into());
                }
                // Keep pixels from straddling byte boundaries: the first pixel must start on a
                // multiple of the depth within its byte.
                if spec.data_bit_offset >= 8 || spec.data_bit_offset % bits as usize != 0 {
                    return Err(LayoutErrorKind::BadBitOffset.into());
                }
                if (spec.scanline_stride as i64) * 8
                    < spec.data_bit_offset as i64 + width * bits as i64
                {
                    return Err(LayoutErrorKind::StrideTooSmall.into());
                }

                let last_bit = (spec.base_offset as i64)
                    .checked_mul(8)
                    .and_then(|base| {
                        let row = (height - 1).checked_mul(spec.scanline_stride as i64)?;
                        base.checked_add(row * 8)
                    })
                    .and_then(|bit| {
                        bit.checked_add(spec.data_bit_offset as i64 + width * bits as i64)
                    })
                    .ok_or(LayoutErrorKind::IndexOverflow)?;
                let past_end = (last_bit + 7) / 8;
                if past_end > INDEX_BUDGET {
                    return Err(LayoutErrorKind::IndexOverflow.into());
                }
                past_end as usize
            }
            None => {
                if spec.pixel_stride == 0 {
                    return Err(LayoutErrorKind::StrideTooSmall.into());
                }
                if (spec.scanline_stride as i64) < width * spec.pixel_stride as i64 {
                    return Err(LayoutErrorKind::StrideTooSmall.into());
                }

                let max_band = *spec.band_offsets.iter().max().unwrap() as i64;
                let last = (spec.base_offset as i64)
                    .checked_add((height - 1) * spec.scanline_stride as i64)
                    .and_then(|v| v.checked_add((width - 1) * spec.pixel_stride as i64))
                    .and_then(|v| v.checked_add(max_band))
                    .ok_or(LayoutErrorKind::IndexOverflow)?;
                if last + 1 > INDEX_BUDGET {
                    return Err(LayoutErrorKind::IndexOverflow.into());
                }
                (last + 1) as usize
            }
        };

        Ok(RasterLayout { spec, past_end })
    }

    /// Verify that a backing buffer of `len` elements covers every addressable index.
    pub fn verify_buffer(&self, len: usize) -> Result<(), LayoutError> {
        if len < self.past_end {
            return Err(LayoutErrorKind::IndexOverflow.into());
        }
        Ok(())
    }

    pub fn spec(&self) -> &RasterSpec {
        &self.spec
    }

    /// One past the largest addressable element index.
    pub fn past_end(&self) -> usize {
        self.past_end
    }

    pub fn width(&self) -> u32 {
        self.spec.width
    }

    pub fn height(&self) -> u32 {
        self.spec.height
    }

    pub fn bands(&self) -> usize {
        self.spec.bands()
    }

    pub fn min_x(&self) -> i32 {
        self.spec.min_x
    }

    pub fn min_y(&self) -> i32 {
        self.spec.min_y
    }

    /// Past-the-end external x coordinate.
    pub fn max_x(&self) -> i32 {
        (self.spec.min_x as i64 + self.spec.width as i64) as i32
    }

    /// Past-the-end external y coordinate.
    pub fn max_y(&self) -> i32 {
        (self.spec.min_y as i64 + self.spec.height as i64) as i32
    }

    #[inline]
    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= self.min_x() && x < self.max_x() && y >= self.min_y() && y < self.max_y()
    }

    /// Whether the whole `w × h` rectangle anchored at `(x, y)` is addressable.
    pub fn contains_rect(&self, x: i32, y: i32, w: u32, h: u32) -> bool {
        if w == 0 || h == 0 {
            // An empty rectangle is fine anywhere on the addressable region, edges included.
            return x >= self.min_x()
                && x <= self.max_x()
                && y >= self.min_y()
                && y <= self.max_y();
        }
        let x2 = x as i64 + w as i64;
        let y2 = y as i64 + h as i64;
        self.in_bounds(x, y) && x2 <= self.max_x() as i64 && y2 <= self.max_y() as i64
    }

    /// Element index of the pixel group at external `(x, y)`, without any band offset.
    ///
    /// Only meaningful for element-strided layouts and only for in-bounds coordinates.
    #[inline]
    pub fn element_index(&self, x: i32, y: i32) -> usize {
        debug_assert!(self.in_bounds(x, y));
        let dx = (x - self.spec.min_x) as usize;
        let dy = (y - self.spec.min_y) as usize;
        self.spec.base_offset + dy * self.spec.scanline_stride + dx * self.spec.pixel_stride
    }

    /// Absolute bit position of the pixel at external `(x, y)`. Packed variant only.
    #[inline]
    pub fn bit_index(&self, x: i32, y: i32) -> usize {
        debug_assert!(self.in_bounds(x, y));
        let bits = self.spec.packed_bits.unwrap_or(0) as usize;
        let dx = (x - self.spec.min_x) as usize;
        let dy = (y - self.spec.min_y) as usize;
        (self.spec.base_offset + dy * self.spec.scanline_stride) * 8
            + self.spec.data_bit_offset
            + dx * bits
    }
}

impl From<LayoutErrorKind> for LayoutError {
    fn from(kind: LayoutErrorKind) -> Self {
        LayoutError { kind }
    }
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            LayoutErrorKind::EmptyDimensions => "width and height must be positive",
            LayoutErrorKind::NoBands => "a raster needs at least one band",
            LayoutErrorKind::IndexOverflow => "layout exceeds the 32-bit index budget or buffer",
            LayoutErrorKind::BadPackDepth => "packed bit depth must be 1, 2 or 4 on one band",
            LayoutErrorKind::BadBitOffset => "data bit offset must stay within the first byte",
            LayoutErrorKind::BadBandMasks => "band masks must be non-empty with contiguous bits",
            LayoutErrorKind::StrideTooSmall => "stride does not cover one row of pixels",
        };
        f.write_str(what)
    }
}

impl core::error::Error for LayoutError {}

#[cfg(test)]
mod tests {
    use super::{RasterLayout, RasterSpec};

    #[test]
    fn interleaved_verification() {
        let layout = RasterLayout::with_spec(RasterSpec::interleaved(4, 3, 3)).unwrap();
        assert_eq!(layout.past_end(), 36);
        assert!(layout.verify_buffer(36).is_ok());
        assert!(layout.verify_buffer(35).is_err());
    }

    #[test]
    fn rejects_empty_and_overflow() {
        assert!(RasterLayout::with_spec(RasterSpec::interleaved(0, 3, 1)).is_err());
        assert!(RasterLayout::with_spec(RasterSpec::interleaved(1, 0, 1)).is_err());

        let mut spec = RasterSpec::interleaved(1 << 16, 1 << 16, 4);
        spec.scanline_stride = (1usize << 16) * 4;
        assert!(RasterLayout::with_spec(spec).is_err());
    }

    #[test]
    fn packed_bit_budget() {
        let layout = RasterLayout::with_spec(RasterSpec::bit_packed(9, 2, 1)).unwrap();
        // Two rows of two bytes each.
        assert_eq!(layout.past_end(), 4);

        let mut bad = RasterSpec::bit_packed(9, 2, 1);
        bad.scanline_stride = 1;
        assert!(RasterLayout::with_spec(bad).is_err());

        let mut bad = RasterSpec::bit_packed(4, 1, 1);
        bad.packed_bits = Some(3);
        assert!(RasterLayout::with_spec(bad).is_err());
    }

    #[test]
    fn origin_translation() {
        let mut spec = RasterSpec::interleaved(4, 4, 1);
        spec.min_x = -2;
        spec.min_y = -2;
        let layout = RasterLayout::with_spec(spec).unwrap();
        assert!(layout.in_bounds(-2, -2));
        assert!(layout.in_bounds(1, 1));
        assert!(!layout.in_bounds(2, 0));
        assert_eq!(layout.element_index(-2, -2), 0);
        assert_eq!(layout.element_index(-1, -2), 1);
        assert_eq!(layout.element_index(-2, -1), 4);
    }
}

//! Sub-byte packed storage.
//!
//! Pixels of 1, 2 or 4 bits are packed big-endian within bytes, the left-most pixel in the
//! highest bits. Because the layout guarantees the row start bit is a multiple of the depth, a
//! pixel never straddles a byte; single accesses mask and shift within one byte without touching
//! the neighbors. Block operations split each row into a leading unaligned run, a byte-aligned
//! middle processed 8/4/2 pixels per byte with unrolled shifts, and a trailing run. Per-pixel
//! copying at these depths is too slow for the legacy indexed/monochrome formats that use them.
use crate::buf::SampleCells;
use crate::layout::{LayoutError, RasterLayout, RasterSpec};
use crate::store::{check_band, check_len, check_point, check_rect, AccessError};
use alloc::boxed::Box;

/// A single-band raster at 1, 2 or 4 bits per pixel.
#[derive(Clone)]
pub struct BitPackedRaster {
    layout: RasterLayout,
    data: SampleCells<u8>,
}

/// Bits `[off, off + n)` of a byte, as a mask. Requires `off + n <= 8`.
#[inline]
fn span_mask(off: usize, n: usize) -> u8 {
    debug_assert!(off + n <= 8);
    ((0xffu16 >> off) as u8) & ((0xffu16 << (8 - off - n)) as u8)
}

/// Read up to 8 bits starting at `bit`, left-aligned in the result.
///
/// Touches the following byte only when the span actually extends into it, so a span ending at
/// the buffer's last byte stays in bounds.
#[inline]
fn read_span(src: &SampleCells<u8>, bit: usize, n: usize) -> u8 {
    debug_assert!(n <= 8);
    let l = bit % 8;
    let i = bit / 8;
    let mut v = src.get(i) << l;
    if l != 0 && l + n > 8 {
        v |= src.get(i + 1) >> (8 - l);
    }
    v
}

/// Merge `n` bits from `src_bit` into the destination byte holding `dst_bit`.
///
/// `byte = (byte & !mask) | (newbits & mask)`; the untouched neighbors keep their value.
#[inline]
fn merge_span(
    dst: &SampleCells<u8>,
    dst_bit: usize,
    src: &SampleCells<u8>,
    src_bit: usize,
    n: usize,
) {
    let off = dst_bit % 8;
    let i = dst_bit / 8;
    let mask = span_mask(off, n);
    let v = read_span(src, src_bit, n) >> off;
    dst.set(i, (dst.get(i) & !mask) | (v & mask));
}

/// Copy `len` bits between two buffers.
///
/// Three sub-cases: same sub-byte alignment degrades to a byte-range copy once the partial
/// boundary bytes are merged in; differing alignment assembles every output byte from two
/// adjacent input bytes (funnel shift); runs shorter than a byte are pure boundary merges.
/// Overlapping ranges within one shared buffer are not supported.
fn copy_bit_run(
    dst: &SampleCells<u8>,
    mut dst_bit: usize,
    src: &SampleCells<u8>,
    mut src_bit: usize,
    mut len: usize,
) {
    if len == 0 {
        return;
    }

    // Leading partial byte of the destination.
    let off = dst_bit % 8;
    if off != 0 {
        let take = (8 - off).min(len);
        merge_span(dst, dst_bit, src, src_bit, take);
        dst_bit += take;
        src_bit += take;
        len -= take;
    }

    if src_bit % 8 == 0 {
        let bytes = len / 8;
        if bytes > 0 {
            dst.copy_from(dst_bit / 8, src, src_bit / 8, bytes);
            dst_bit += bytes * 8;
            src_bit += bytes * 8;
            len -= bytes * 8;
        }
    } else {
        while len >= 8 {
            dst.set(dst_bit / 8, read_span(src, src_bit, 8));
            dst_bit += 8;
            src_bit += 8;
            len -= 8;
        }
    }

    if len > 0 {
        merge_span(dst, dst_bit, src, src_bit, len);
    }
}

impl BitPackedRaster {
    /// A zeroed raster, rows padded to whole bytes.
    pub fn with_size(width: u32, height: u32, bits: u8) -> Result<Self, LayoutError> {
        let layout = RasterLayout::with_spec(RasterSpec::bit_packed(width, height, bits))?;
        let data = SampleCells::zeroed(layout.past_end());
        Ok(BitPackedRaster { layout, data })
    }

    /// Adopt an existing buffer under a validated packed layout.
    pub(crate) fn with_parts(
        layout: RasterLayout,
        data: SampleCells<u8>,
    ) -> Result<Self, LayoutError> {
        layout.verify_buffer(data.len())?;
        Ok(BitPackedRaster { layout, data })
    }

    pub fn layout(&self) -> &RasterLayout {
        &self.layout
    }

    /// The shared backing buffer. Cloning the handle aliases this raster's storage.
    pub fn cells(&self) -> &SampleCells<u8> {
        &self.data
    }

    pub fn bits(&self) -> u8 {
        self.layout.spec().packed_bits.unwrap_or(0)
    }

    #[inline]
    fn read_bits(&self, bit: usize) -> i32 {
        let bits = self.bits() as usize;
        let shift = 8 - bit % 8 - bits;
        ((self.data.get(bit / 8) >> shift) & span_mask(8 - bits, bits)) as i32
    }

    #[inline]
    fn write_bits(&self, bit: usize, value: i32) {
        let bits = self.bits() as usize;
        let off = bit % 8;
        let idx = bit / 8;
        let shift = 8 - off - bits;
        let mask = span_mask(off, bits);
        let old = self.data.get(idx);
        self.data.set(idx, (old & !mask) | (((value as u8) << shift) & mask));
    }

    pub fn get_pixel(&self, x: i32, y: i32, out: &mut [i32]) -> Result<(), AccessError> {
        check_point(&self.layout, x, y)?;
        check_len(1, out.len())?;
        out[0] = self.read_bits(self.layout.bit_index(x, y));
        Ok(())
    }

    pub fn set_pixel(&self, x: i32, y: i32, samples: &[i32]) -> Result<(), AccessError> {
        check_point(&self.layout, x, y)?;
        check_len(1, samples.len())?;
        self.write_bits(self.layout.bit_index(x, y), samples[0]);
        self.data.mark_mutated();
        Ok(())
    }

    pub fn get_samples(
        &self,
        x: i32,
        y: i32,
        w: u32,
        h: u32,
        out: &mut [i32],
    ) -> Result<(), AccessError> {
        check_rect(&self.layout, x, y, w, h)?;
        check_len(w as usize * h as usize, out.len())?;

        let bits = self.bits() as usize;
        let mut o = 0;
        for dy in 0..h as i32 {
            let mut bit = self.layout.bit_index(x, y + dy);
            let end = bit + w as usize * bits;

            // Unaligned pixels up to the first byte boundary.
            while bit % 8 != 0 && bit < end {
                out[o] = self.read_bits(bit);
                o += 1;
                bit += bits;
            }

            // Whole input bytes, unrolled per depth.
            while end - bit >= 8 {
                let b = self.data.get(bit / 8);
                match bits {
                    1 => {
                        out[o] = (b >> 7) as i32;
                        out[o + 1] = ((b >> 6) & 1) as i32;
                        out[o + 2] = ((b >> 5) & 1) as i32;
                        out[o + 3] = ((b >> 4) & 1) as i32;
                        out[o + 4] = ((b >> 3) & 1) as i32;
                        out[o + 5] = ((b >> 2) & 1) as i32;
                        out[o + 6] = ((b >> 1) & 1) as i32;
                        out[o + 7] = (b & 1) as i32;
                        o += 8;
                    }
                    2 => {
                        out[o] = (b >> 6) as i32;
                        out[o + 1] = ((b >> 4) & 3) as i32;
                        out[o + 2] = ((b >> 2) & 3) as i32;
                        out[o + 3] = (b & 3) as i32;
                        o += 4;
                    }
                    _ => {
                        out[o] = (b >> 4) as i32;
                        out[o + 1] = (b & 0xf) as i32;
                        o += 2;
                    }
                }
                bit += 8;
            }

            // Trailing pixels.
            while bit < end {
                out[o] = self.read_bits(bit);
                o += 1;
                bit += bits;
            }
        }
        Ok(())
    }

    pub fn set_samples(
        &self,
        x: i32,
        y: i32,
        w: u32,
        h: u32,
        samples: &[i32],
    ) -> Result<(), AccessError> {
        check_rect(&self.layout, x, y, w, h)?;
        check_len(w as usize * h as usize, samples.len())?;

        let bits = self.bits() as usize;
        let mut s = 0;
        for dy in 0..h as i32 {
            let mut bit = self.layout.bit_index(x, y + dy);
            let end = bit + w as usize * bits;

            while bit % 8 != 0 && bit < end {
                self.write_bits(bit, samples[s]);
                s += 1;
                bit += bits;
            }

            while end - bit >= 8 {
                let b = match bits {
                    1 => {
                        ((samples[s] as u8 & 1) << 7)
                            | ((samples[s + 1] as u8 & 1) << 6)
                            | ((samples[s + 2] as u8 & 1) << 5)
                            | ((samples[s + 3] as u8 & 1) << 4)
                            | ((samples[s + 4] as u8 & 1) << 3)
                            | ((samples[s + 5] as u8 & 1) << 2)
                            | ((samples[s + 6] as u8 & 1) << 1)
                            | (samples[s + 7] as u8 & 1)
                    }
                    2 => {
                        ((samples[s] as u8 & 3) << 6)
                            | ((samples[s + 1] as u8 & 3) << 4)
                            | ((samples[s + 2] as u8 & 3) << 2)
                            | (samples[s + 3] as u8 & 3)
                    }
                    _ => ((samples[s] as u8 & 0xf) << 4) | (samples[s + 1] as u8 & 0xf),
                };
                s += 8 / bits;
                self.data.set(bit / 8, b);
                bit += 8;
            }

            while bit < end {
                self.write_bits(bit, samples[s]);
                s += 1;
                bit += bits;
            }
        }
        self.data.mark_mutated();
        Ok(())
    }

    pub fn get_band(
        &self,
        x: i32,
        y: i32,
        w: u32,
        h: u32,
        band: usize,
        out: &mut [i32],
    ) -> Result<(), AccessError> {
        check_band(&self.layout, band)?;
        self.get_samples(x, y, w, h, out)
    }

    pub fn set_band(
        &self,
        x: i32,
        y: i32,
        w: u32,
        h: u32,
        band: usize,
        samples: &[i32],
    ) -> Result<(), AccessError> {
        check_band(&self.layout, band)?;
        self.set_samples(x, y, w, h, samples)
    }

    /// Copy a rectangle from another packed raster of the same depth.
    pub fn copy_rect_from(
        &self,
        src: &BitPackedRaster,
        src_x: i32,
        src_y: i32,
        w: u32,
        h: u32,
        dst_x: i32,
        dst_y: i32,
    ) -> Result<(), AccessError> {
        if self.bits() != src.bits() {
            return Err(AccessError::unsupported_layout());
        }
        check_rect(&src.layout, src_x, src_y, w, h)?;
        check_rect(&self.layout, dst_x, dst_y, w, h)?;

        let run = w as usize * self.bits() as usize;
        for dy in 0..h as i32 {
            let dst_bit = self.layout.bit_index(dst_x, dst_y + dy);
            let src_bit = src.layout.bit_index(src_x, src_y + dy);
            copy_bit_run(&self.data, dst_bit, &src.data, src_bit, run);
        }
        self.data.mark_mutated();
        Ok(())
    }

    /// Derive an aliasing child raster over the `w × h` rectangle at `(x, y)`.
    pub fn child_view(
        &self,
        x: i32,
        y: i32,
        w: u32,
        h: u32,
        bands: Option<&[usize]>,
        origin: (i32, i32),
    ) -> Result<Self, AccessError> {
        check_rect(&self.layout, x, y, w, h)?;
        if let Some(subset) = bands {
            if subset != [0] {
                return Err(AccessError::band_out_of_range());
            }
        }

        let parent = self.layout.spec();
        let bit = self.layout.bit_index(x, y);
        let spec = RasterSpec {
            width: w,
            height: h,
            min_x: origin.0,
            min_y: origin.1,
            pixel_stride: 0,
            scanline_stride: parent.scanline_stride,
            band_offsets: Box::new([0]),
            base_offset: bit / 8,
            packed_bits: parent.packed_bits,
            data_bit_offset: bit % 8,
        };

        let layout = RasterLayout::with_spec(spec).map_err(|_| AccessError::out_of_bounds())?;
        BitPackedRaster::with_parts(layout, self.data.clone())
            .map_err(|_| AccessError::out_of_bounds())
    }

    /// A fresh zeroed raster at the same depth.
    pub fn with_zeroed(&self, width: u32, height: u32) -> Result<Self, LayoutError> {
        Self::with_size(width, height, self.bits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_masks() {
        assert_eq!(span_mask(0, 8), 0xff);
        assert_eq!(span_mask(0, 3), 0b1110_0000);
        assert_eq!(span_mask(3, 5), 0b0001_1111);
        assert_eq!(span_mask(2, 4), 0b0011_1100);
    }

    #[test]
    fn funnel_copy_cross_alignment() {
        // Source bits start at offset 4, destination at offset 0.
        let src = SampleCells::from_vec(alloc::vec![0b0000_1011, 0b0110_0000]);
        let dst = SampleCells::zeroed(1);
        copy_bit_run(&dst, 0, &src, 4, 8);
        assert_eq!(dst.get(0), 0b1011_0110);
    }

    #[test]
    fn boundary_merge_preserves_neighbors() {
        let src = SampleCells::from_vec(alloc::vec![0xff]);
        let dst = SampleCells::from_vec(alloc::vec![0b1000_0001]);
        // Copy 4 bits into the middle of the destination byte.
        copy_bit_run(&dst, 2, &src, 2, 4);
        assert_eq!(dst.get(0), 0b1011_1101);
    }
}

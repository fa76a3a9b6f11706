//! Packed-`u32` storage.
//!
//! One `u32` element holds a whole pixel; bands are carved out by per-band masks with contiguous
//! bits (the single-pixel-packed model). The default ARGB ordering uses masks
//! `0x00ff0000 / 0x0000ff00 / 0x000000ff / 0xff000000`. Whole packed rows can be read and
//! written directly, which is the compositor's direct-int fast path.
use crate::buf::SampleCells;
use crate::layout::{LayoutError, RasterLayout, RasterSpec};
use crate::store::{check_band, check_len, check_point, check_rect, AccessError};
use alloc::boxed::Box;
use alloc::vec::Vec;

/// A raster of packed `u32` pixels with mask-extracted bands.
#[derive(Clone)]
pub struct IntPackedRaster {
    layout: RasterLayout,
    data: SampleCells<u32>,
    masks: Box<[u32]>,
    shifts: Box<[u32]>,
}

fn derive_shifts(masks: &[u32]) -> Result<Box<[u32]>, LayoutError> {
    if masks.is_empty() {
        return Err(LayoutError::bad_band_masks());
    }
    let mut shifts = Vec::with_capacity(masks.len());
    for &mask in masks {
        let shift = mask.trailing_zeros() % 32;
        // Mask bits must be contiguous, otherwise extraction is ambiguous.
        let span = mask >> shift;
        if mask != 0 && !(span.wrapping_add(1)).is_power_of_two() {
            return Err(LayoutError::bad_band_masks());
        }
        shifts.push(shift);
    }
    Ok(shifts.into())
}

impl IntPackedRaster {
    /// A zeroed raster with the given per-band masks.
    pub fn with_size(width: u32, height: u32, masks: &[u32]) -> Result<Self, LayoutError> {
        let shifts = derive_shifts(masks)?;
        let mut spec = RasterSpec::interleaved(width, height, masks.len());
        // One element per pixel regardless of band count.
        spec.pixel_stride = 1;
        spec.scanline_stride = width as usize;
        spec.band_offsets = masks.iter().map(|_| 0).collect();
        let layout = RasterLayout::with_spec(spec)?;
        let data = SampleCells::zeroed(layout.past_end());
        Ok(IntPackedRaster {
            layout,
            data,
            masks: masks.into(),
            shifts,
        })
    }

    pub fn layout(&self) -> &RasterLayout {
        &self.layout
    }

    /// The shared backing buffer. Cloning the handle aliases this raster's storage.
    pub fn cells(&self) -> &SampleCells<u32> {
        &self.data
    }

    /// The per-band masks, in band order.
    pub fn band_masks(&self) -> &[u32] {
        &self.masks
    }

    #[inline]
    fn extract(&self, value: u32, band: usize) -> i32 {
        ((value & self.masks[band]) >> self.shifts[band]) as i32
    }

    #[inline]
    fn insert(&self, value: u32, band: usize, sample: i32) -> u32 {
        let mask = self.masks[band];
        (value & !mask) | (((sample as u32) << self.shifts[band]) & mask)
    }

    pub fn get_pixel(&self, x: i32, y: i32, out: &mut [i32]) -> Result<(), AccessError> {
        check_point(&self.layout, x, y)?;
        check_len(self.masks.len(), out.len())?;
        let value = self.data.get(self.layout.element_index(x, y));
        for (band, out) in out.iter_mut().enumerate() {
            *out = self.extract(value, band);
        }
        Ok(())
    }

    pub fn set_pixel(&self, x: i32, y: i32, samples: &[i32]) -> Result<(), AccessError> {
        check_point(&self.layout, x, y)?;
        check_len(self.masks.len(), samples.len())?;
        let idx = self.layout.element_index(x, y);
        let mut value = self.data.get(idx);
        for (band, sample) in samples.iter().enumerate() {
            value = self.insert(value, band, *sample);
        }
        self.data.set(idx, value);
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
        let bands = self.masks.len();
        check_len(w as usize * h as usize * bands, out.len())?;

        let mut o = 0;
        for dy in 0..h as i32 {
            let mut idx = self.layout.element_index(x, y + dy);
            if bands == 4 {
                for _ in 0..w {
                    let value = self.data.get(idx);
                    out[o] = self.extract(value, 0);
                    out[o + 1] = self.extract(value, 1);
                    out[o + 2] = self.extract(value, 2);
                    out[o + 3] = self.extract(value, 3);
                    o += 4;
                    idx += 1;
                }
            } else {
                for _ in 0..w {
                    let value = self.data.get(idx);
                    for band in 0..bands {
                        out[o] = self.extract(value, band);
                        o += 1;
                    }
                    idx += 1;
                }
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
        let bands = self.masks.len();
        check_len(w as usize * h as usize * bands, samples.len())?;

        let mut s = 0;
        for dy in 0..h as i32 {
            let mut idx = self.layout.element_index(x, y + dy);
            for _ in 0..w {
                let mut value = self.data.get(idx);
                for band in 0..bands {
                    value = self.insert(value, band, samples[s]);
                    s += 1;
                }
                self.data.set(idx, value);
                idx += 1;
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
        check_rect(&self.layout, x, y, w, h)?;
        check_band(&self.layout, band)?;
        check_len(w as usize * h as usize, out.len())?;

        let mut o = 0;
        for dy in 0..h as i32 {
            let mut idx = self.layout.element_index(x, y + dy);
            for _ in 0..w {
                out[o] = self.extract(self.data.get(idx), band);
                o += 1;
                idx += 1;
            }
        }
        Ok(())
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
        check_rect(&self.layout, x, y, w, h)?;
        check_band(&self.layout, band)?;
        check_len(w as usize * h as usize, samples.len())?;

        let mut s = 0;
        for dy in 0..h as i32 {
            let mut idx = self.layout.element_index(x, y + dy);
            for _ in 0..w {
                let value = self.data.get(idx);
                self.data.set(idx, self.insert(value, band, samples[s]));
                s += 1;
                idx += 1;
            }
        }
        self.data.mark_mutated();
        Ok(())
    }

    /// Read `w` packed elements of one row.
    pub fn get_row(&self, x: i32, y: i32, w: u32, out: &mut [u32]) -> Result<(), AccessError> {
        check_rect(&self.layout, x, y, w, 1)?;
        check_len(w as usize, out.len())?;
        self.data
            .load(self.layout.element_index(x, y), &mut out[..w as usize]);
        Ok(())
    }

    /// Write `w` packed elements of one row.
    pub fn set_row(&self, x: i32, y: i32, row: &[u32]) -> Result<(), AccessError> {
        check_rect(&self.layout, x, y, row.len() as u32, 1)?;
        self.data.store(self.layout.element_index(x, y), row);
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

        let (masks, shifts): (Box<[u32]>, Box<[u32]>) = match bands {
            None => (self.masks.clone(), self.shifts.clone()),
            Some(subset) => {
                for &band in subset {
                    check_band(&self.layout, band)?;
                }
                (
                    subset.iter().map(|&b| self.masks[b]).collect(),
                    subset.iter().map(|&b| self.shifts[b]).collect(),
                )
            }
        };

        let parent = self.layout.spec();
        let spec = RasterSpec {
            width: w,
            height: h,
            min_x: origin.0,
            min_y: origin.1,
            pixel_stride: 1,
            scanline_stride: parent.scanline_stride,
            band_offsets: masks.iter().map(|_| 0).collect(),
            base_offset: self.layout.element_index(x, y),
            packed_bits: None,
            data_bit_offset: 0,
        };

        let layout = RasterLayout::with_spec(spec).map_err(|_| AccessError::out_of_bounds())?;
        layout
            .verify_buffer(self.data.len())
            .map_err(|_| AccessError::out_of_bounds())?;
        Ok(IntPackedRaster {
            layout,
            data: self.data.clone(),
            masks,
            shifts,
        })
    }

    /// A fresh zeroed raster with the same masks.
    pub fn with_zeroed(&self, width: u32, height: u32) -> Result<Self, LayoutError> {
        Self::with_size(width, height, &self.masks)
    }
}

#[cfg(test)]
mod tests {
    use super::IntPackedRaster;

    const ARGB: [u32; 4] = [0x00ff_0000, 0x0000_ff00, 0x0000_00ff, 0xff00_0000];

    #[test]
    fn mask_extraction() {
        let raster = IntPackedRaster::with_size(2, 1, &ARGB).unwrap();
        raster.set_pixel(0, 0, &[0x12, 0x34, 0x56, 0xff]).unwrap();
        let mut px = [0i32; 4];
        raster.get_pixel(0, 0, &mut px).unwrap();
        assert_eq!(px, [0x12, 0x34, 0x56, 0xff]);

        let mut row = [0u32; 2];
        raster.get_row(0, 0, 2, &mut row).unwrap();
        assert_eq!(row[0], 0xff12_3456);
        assert_eq!(row[1], 0);
    }

    #[test]
    fn rejects_split_masks() {
        assert!(IntPackedRaster::with_size(1, 1, &[0b1010]).is_err());
        assert!(IntPackedRaster::with_size(1, 1, &[]).is_err());
    }
}

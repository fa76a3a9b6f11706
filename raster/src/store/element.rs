//! Element-strided storage, generic over the sample element.
//!
//! Covers the byte-interleaved, byte-banded and short-interleaved variants; the four layouts
//! differ only in their stride/offset spec, not in their access arithmetic. Band loops are
//! unrolled for one to four bands — band count is fixed at image-type detection time and almost
//! always small — with a plain loop covering anything larger.
use crate::buf::SampleCells;
use crate::layout::{LayoutError, RasterLayout, RasterSpec};
use crate::store::{check_band, check_len, check_point, check_rect, AccessError, StoreElem};
use alloc::boxed::Box;

/// An element-strided raster over samples of type `T`.
#[derive(Clone)]
pub struct PixelRaster<T> {
    layout: RasterLayout,
    data: SampleCells<T>,
}

impl<T: StoreElem> PixelRaster<T> {
    /// A zeroed raster with bands interleaved within each pixel.
    pub fn interleaved(width: u32, height: u32, bands: usize) -> Result<Self, LayoutError> {
        let layout = RasterLayout::with_spec(RasterSpec::interleaved(width, height, bands))?;
        let data = SampleCells::zeroed(layout.past_end());
        Ok(PixelRaster { layout, data })
    }

    /// A zeroed raster with one plane per band.
    pub fn banded(width: u32, height: u32, bands: usize) -> Result<Self, LayoutError> {
        let layout = RasterLayout::with_spec(RasterSpec::banded(width, height, bands))?;
        let data = SampleCells::zeroed(layout.past_end());
        Ok(PixelRaster { layout, data })
    }

    /// Adopt an existing buffer under a validated layout.
    pub(crate) fn with_parts(
        layout: RasterLayout,
        data: SampleCells<T>,
    ) -> Result<Self, LayoutError> {
        layout.verify_buffer(data.len())?;
        Ok(PixelRaster { layout, data })
    }

    pub fn layout(&self) -> &RasterLayout {
        &self.layout
    }

    /// The shared backing buffer. Cloning the handle aliases this raster's storage.
    pub fn cells(&self) -> &SampleCells<T> {
        &self.data
    }

    pub fn get_pixel(&self, x: i32, y: i32, out: &mut [i32]) -> Result<(), AccessError> {
        check_point(&self.layout, x, y)?;
        let offsets: &[usize] = &self.layout.spec().band_offsets;
        check_len(offsets.len(), out.len())?;
        let base = self.layout.element_index(x, y);
        for (out, off) in out.iter_mut().zip(offsets.iter()) {
            *out = self.data.get(base + off).to_sample();
        }
        Ok(())
    }

    pub fn set_pixel(&self, x: i32, y: i32, samples: &[i32]) -> Result<(), AccessError> {
        check_point(&self.layout, x, y)?;
        let offsets: &[usize] = &self.layout.spec().band_offsets;
        check_len(offsets.len(), samples.len())?;
        let base = self.layout.element_index(x, y);
        for (sample, off) in samples.iter().zip(offsets.iter()) {
            self.data.set(base + off, T::from_sample(*sample));
        }
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
        let bands = self.layout.bands();
        check_len(w as usize * h as usize * bands, out.len())?;

        let ps = self.layout.spec().pixel_stride;
        let offsets: &[usize] = &self.layout.spec().band_offsets;
        let mut o = 0;

        for dy in 0..h as i32 {
            let mut idx = self.layout.element_index(x, y + dy);
            match offsets {
                &[b0] => {
                    for _ in 0..w {
                        out[o] = self.data.get(idx + b0).to_sample();
                        o += 1;
                        idx += ps;
                    }
                }
                &[b0, b1] => {
                    for _ in 0..w {
                        out[o] = self.data.get(idx + b0).to_sample();
                        out[o + 1] = self.data.get(idx + b1).to_sample();
                        o += 2;
                        idx += ps;
                    }
                }
                &[b0, b1, b2] => {
                    for _ in 0..w {
                        out[o] = self.data.get(idx + b0).to_sample();
                        out[o + 1] = self.data.get(idx + b1).to_sample();
                        out[o + 2] = self.data.get(idx + b2).to_sample();
                        o += 3;
                        idx += ps;
                    }
                }
                &[b0, b1, b2, b3] => {
                    for _ in 0..w {
                        out[o] = self.data.get(idx + b0).to_sample();
                        out[o + 1] = self.data.get(idx + b1).to_sample();
                        out[o + 2] = self.data.get(idx + b2).to_sample();
                        out[o + 3] = self.data.get(idx + b3).to_sample();
                        o += 4;
                        idx += ps;
                    }
                }
                offsets => {
                    for _ in 0..w {
                        for off in offsets.iter() {
                            out[o] = self.data.get(idx + off).to_sample();
                            o += 1;
                        }
                        idx += ps;
                    }
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
        let bands = self.layout.bands();
        check_len(w as usize * h as usize * bands, samples.len())?;

        let ps = self.layout.spec().pixel_stride;
        let offsets: &[usize] = &self.layout.spec().band_offsets;
        let mut s = 0;

        for dy in 0..h as i32 {
            let mut idx = self.layout.element_index(x, y + dy);
            match offsets {
                &[b0] => {
                    for _ in 0..w {
                        self.data.set(idx + b0, T::from_sample(samples[s]));
                        s += 1;
                        idx += ps;
                    }
                }
                &[b0, b1] => {
                    for _ in 0..w {
                        self.data.set(idx + b0, T::from_sample(samples[s]));
                        self.data.set(idx + b1, T::from_sample(samples[s + 1]));
                        s += 2;
                        idx += ps;
                    }
                }
                &[b0, b1, b2] => {
                    for _ in 0..w {
                        self.data.set(idx + b0, T::from_sample(samples[s]));
                        self.data.set(idx + b1, T::from_sample(samples[s + 1]));
                        self.data.set(idx + b2, T::from_sample(samples[s + 2]));
                        s += 3;
                        idx += ps;
                    }
                }
                &[b0, b1, b2, b3] => {
                    for _ in 0..w {
                        self.data.set(idx + b0, T::from_sample(samples[s]));
                        self.data.set(idx + b1, T::from_sample(samples[s + 1]));
                        self.data.set(idx + b2, T::from_sample(samples[s + 2]));
                        self.data.set(idx + b3, T::from_sample(samples[s + 3]));
                        s += 4;
                        idx += ps;
                    }
                }
                offsets => {
                    for _ in 0..w {
                        for off in offsets.iter() {
                            self.data.set(idx + off, T::from_sample(samples[s]));
                            s += 1;
                        }
                        idx += ps;
                    }
                }
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

        let ps = self.layout.spec().pixel_stride;
        let off = self.layout.spec().band_offsets[band];
        let mut o = 0;
        for dy in 0..h as i32 {
            let mut idx = self.layout.element_index(x, y + dy) + off;
            for _ in 0..w {
                out[o] = self.data.get(idx).to_sample();
                o += 1;
                idx += ps;
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

        let ps = self.layout.spec().pixel_stride;
        let off = self.layout.spec().band_offsets[band];
        let mut s = 0;
        for dy in 0..h as i32 {
            let mut idx = self.layout.element_index(x, y + dy) + off;
            for _ in 0..w {
                self.data.set(idx, T::from_sample(samples[s]));
                s += 1;
                idx += ps;
            }
        }
        self.data.mark_mutated();
        Ok(())
    }

    /// Read `w` raw elements of band `band` from one row, without sample conversion.
    pub fn get_row(
        &self,
        x: i32,
        y: i32,
        w: u32,
        band: usize,
        out: &mut [T],
    ) -> Result<(), AccessError> {
        check_rect(&self.layout, x, y, w, 1)?;
        check_band(&self.layout, band)?;
        check_len(w as usize, out.len())?;
        let ps = self.layout.spec().pixel_stride;
        let mut idx = self.layout.element_index(x, y) + self.layout.spec().band_offsets[band];
        for out in out[..w as usize].iter_mut() {
            *out = self.data.get(idx);
            idx += ps;
        }
        Ok(())
    }

    /// Write `w` raw elements of band `band` into one row, without sample conversion.
    pub fn set_row(&self, x: i32, y: i32, band: usize, row: &[T]) -> Result<(), AccessError> {
        check_rect(&self.layout, x, y, row.len() as u32, 1)?;
        check_band(&self.layout, band)?;
        let ps = self.layout.spec().pixel_stride;
        let mut idx = self.layout.element_index(x, y) + self.layout.spec().band_offsets[band];
        for value in row {
            self.data.set(idx, *value);
            idx += ps;
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

        let parent = self.layout.spec();
        let band_offsets: Box<[usize]> = match bands {
            None => parent.band_offsets.clone(),
            Some(subset) => {
                for &band in subset {
                    check_band(&self.layout, band)?;
                }
                subset.iter().map(|&b| parent.band_offsets[b]).collect()
            }
        };

        let spec = RasterSpec {
            width: w,
            height: h,
            min_x: origin.0,
            min_y: origin.1,
            pixel_stride: parent.pixel_stride,
            scanline_stride: parent.scanline_stride,
            band_offsets,
            base_offset: self.layout.element_index(x, y),
            packed_bits: None,
            data_bit_offset: 0,
        };

        let layout = RasterLayout::with_spec(spec).map_err(|_| AccessError::out_of_bounds())?;
        PixelRaster::with_parts(layout, self.data.clone())
            .map_err(|_| AccessError::out_of_bounds())
    }

    /// A fresh zeroed raster with the same band count, interleaved.
    pub fn with_zeroed_interleaved(&self, width: u32, height: u32) -> Result<Self, LayoutError> {
        Self::interleaved(width, height, self.layout.bands())
    }

    /// A fresh zeroed raster with the same band count, banded.
    pub fn with_zeroed_banded(&self, width: u32, height: u32) -> Result<Self, LayoutError> {
        Self::banded(width, height, self.layout.bands())
    }
}

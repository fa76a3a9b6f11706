//! Concrete pixel storage.
//!
//! The storage variants form a closed set behind one capability surface: single pixels,
//! rectangular sample blocks, per-band scanlines, aliasing child views and independent copies.
//! Dispatch is a plain `match` over [`RasterStore`]; the operations are uniform and finite, so a
//! sum type fits better than an open class hierarchy.
//!
//! All mutation goes through shared [`SampleCells`](crate::buf::SampleCells) buffers, so a parent
//! raster and its child views observe each other's writes. Writes therefore take `&self`; the
//! buffers are unsynchronized and `!Sync`, serialization across threads is the caller's job.
use crate::buf::SampleCells;
use crate::layout::{LayoutError, RasterLayout};
use alloc::vec;
use core::fmt;

mod bitpacked;
mod element;
mod intpacked;

pub use bitpacked::BitPackedRaster;
pub use element::PixelRaster;
pub use intpacked::IntPackedRaster;

/// Identifies the storage variant of a raster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// 1, 2 or 4 bits per pixel, one band, packed big-endian within bytes.
    BitPacked,
    /// One byte per sample, bands interleaved within a pixel.
    ByteInterleaved,
    /// One byte per sample, one plane per band.
    ByteBanded,
    /// One `u16` per sample, bands interleaved within a pixel.
    ShortInterleaved,
    /// One `u32` per pixel, bands extracted through masks.
    IntPacked,
}

/// Error raised by a single raster access.
///
/// Out-of-bounds coordinates fail loud and never clamp; clamping would silently corrupt the
/// neighboring pixels. The failed call leaves the raster unchanged, the caller may retry with
/// corrected bounds.
#[derive(Debug, PartialEq, Eq)]
pub struct AccessError {
    kind: AccessErrorKind,
}

#[derive(Debug, PartialEq, Eq)]
enum AccessErrorKind {
    OutOfBounds,
    BandOutOfRange,
    ShortBuffer,
    UnsupportedLayout,
}

impl AccessError {
    pub(crate) fn out_of_bounds() -> Self {
        AccessErrorKind::OutOfBounds.into()
    }

    pub(crate) fn band_out_of_range() -> Self {
        AccessErrorKind::BandOutOfRange.into()
    }

    pub(crate) fn short_buffer() -> Self {
        AccessErrorKind::ShortBuffer.into()
    }

    pub(crate) fn unsupported_layout() -> Self {
        AccessErrorKind::UnsupportedLayout.into()
    }

    /// Whether the access failed because a coordinate was outside the raster.
    pub fn is_out_of_bounds(&self) -> bool {
        matches!(
            self.kind,
            AccessErrorKind::OutOfBounds | AccessErrorKind::BandOutOfRange
        )
    }

    /// Whether the raster was asked for a layout interpretation it does not implement.
    pub fn is_unsupported_layout(&self) -> bool {
        matches!(self.kind, AccessErrorKind::UnsupportedLayout)
    }
}

impl From<AccessErrorKind> for AccessError {
    fn from(kind: AccessErrorKind) -> Self {
        AccessError { kind }
    }
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            AccessErrorKind::OutOfBounds => "coordinate outside the raster's addressable region",
            AccessErrorKind::BandOutOfRange => "band index outside the raster's band count",
            AccessErrorKind::ShortBuffer => "sample buffer shorter than the requested block",
            AccessErrorKind::UnsupportedLayout => {
                "raster does not implement the requested layout interpretation"
            }
        };
        f.write_str(what)
    }
}

impl core::error::Error for AccessError {}

/// Storage element of a raster variant.
pub(crate) trait StoreElem: Copy + bytemuck::Pod + 'static {
    fn to_sample(self) -> i32;
    fn from_sample(sample: i32) -> Self;
}

impl StoreElem for u8 {
    #[inline]
    fn to_sample(self) -> i32 {
        self as i32
    }

    #[inline]
    fn from_sample(sample: i32) -> Self {
        sample as u8
    }
}

impl StoreElem for u16 {
    #[inline]
    fn to_sample(self) -> i32 {
        self as i32
    }

    #[inline]
    fn from_sample(sample: i32) -> Self {
        sample as u16
    }
}

impl StoreElem for u32 {
    #[inline]
    fn to_sample(self) -> i32 {
        self as i32
    }

    #[inline]
    fn from_sample(sample: i32) -> Self {
        sample as u32
    }
}

pub(crate) fn check_point(layout: &RasterLayout, x: i32, y: i32) -> Result<(), AccessError> {
    if layout.in_bounds(x, y) {
        Ok(())
    } else {
        Err(AccessError::out_of_bounds())
    }
}

pub(crate) fn check_rect(
    layout: &RasterLayout,
    x: i32,
    y: i32,
    w: u32,
    h: u32,
) -> Result<(), AccessError> {
    if layout.contains_rect(x, y, w, h) {
        Ok(())
    } else {
        Err(AccessError::out_of_bounds())
    }
}

pub(crate) fn check_band(layout: &RasterLayout, band: usize) -> Result<(), AccessError> {
    if band < layout.bands() {
        Ok(())
    } else {
        Err(AccessError::band_out_of_range())
    }
}

pub(crate) fn check_len(needed: usize, got: usize) -> Result<(), AccessError> {
    if got < needed {
        Err(AccessError::short_buffer())
    } else {
        Ok(())
    }
}

/// Borrowed handle to a raster's backing buffer, typed by storage element.
///
/// This is the zero-copy seam to layers that scan the raw samples directly (blits, caching
/// surfaces). Cloning the inner [`SampleCells`] aliases the raster's storage, so writes through
/// the handle are visible to the raster and all of its views. Such writers bump the epoch through
/// [`SampleCells::mark_mutated`] themselves.
pub enum BackingCells<'a> {
    Bytes(&'a SampleCells<u8>),
    Shorts(&'a SampleCells<u16>),
    Ints(&'a SampleCells<u32>),
}

/// A concrete pixel store: a validated layout plus a shared backing buffer.
#[derive(Clone)]
pub enum RasterStore {
    BitPacked(BitPackedRaster),
    ByteInterleaved(PixelRaster<u8>),
    ByteBanded(PixelRaster<u8>),
    ShortInterleaved(PixelRaster<u16>),
    IntPacked(IntPackedRaster),
}

macro_rules! each_store {
    ($self:expr, $inner:ident => $body:expr) => {
        match $self {
            RasterStore::BitPacked($inner) => $body,
            RasterStore::ByteInterleaved($inner) => $body,
            RasterStore::ByteBanded($inner) => $body,
            RasterStore::ShortInterleaved($inner) => $body,
            RasterStore::IntPacked($inner) => $body,
        }
    };
}

impl RasterStore {
    /// A zeroed sub-byte packed store, rows padded to whole bytes.
    pub fn bit_packed(width: u32, height: u32, bits: u8) -> Result<Self, LayoutError> {
        BitPackedRaster::with_size(width, height, bits).map(RasterStore::BitPacked)
    }

    /// A zeroed byte store with bands interleaved within each pixel.
    pub fn byte_interleaved(width: u32, height: u32, bands: usize) -> Result<Self, LayoutError> {
        PixelRaster::interleaved(width, height, bands).map(RasterStore::ByteInterleaved)
    }

    /// A zeroed byte store with one plane per band.
    pub fn byte_banded(width: u32, height: u32, bands: usize) -> Result<Self, LayoutError> {
        PixelRaster::banded(width, height, bands).map(RasterStore::ByteBanded)
    }

    /// A zeroed `u16` store with bands interleaved within each pixel.
    pub fn short_interleaved(width: u32, height: u32, bands: usize) -> Result<Self, LayoutError> {
        PixelRaster::interleaved(width, height, bands).map(RasterStore::ShortInterleaved)
    }

    /// A zeroed packed-`u32` store with the given per-band masks.
    pub fn int_packed(width: u32, height: u32, masks: &[u32]) -> Result<Self, LayoutError> {
        IntPackedRaster::with_size(width, height, masks).map(RasterStore::IntPacked)
    }

    /// A zeroed packed-`u32` store in the default ARGB ordering.
    pub fn int_packed_argb(width: u32, height: u32) -> Result<Self, LayoutError> {
        Self::int_packed(
            width,
            height,
            &[0x00ff_0000, 0x0000_ff00, 0x0000_00ff, 0xff00_0000],
        )
    }

    pub fn kind(&self) -> StoreKind {
        match self {
            RasterStore::BitPacked(_) => StoreKind::BitPacked,
            RasterStore::ByteInterleaved(_) => StoreKind::ByteInterleaved,
            RasterStore::ByteBanded(_) => StoreKind::ByteBanded,
            RasterStore::ShortInterleaved(_) => StoreKind::ShortInterleaved,
            RasterStore::IntPacked(_) => StoreKind::IntPacked,
        }
    }

    pub fn layout(&self) -> &RasterLayout {
        each_store!(self, inner => inner.layout())
    }

    pub fn width(&self) -> u32 {
        self.layout().width()
    }

    pub fn height(&self) -> u32 {
        self.layout().height()
    }

    pub fn bands(&self) -> usize {
        self.layout().bands()
    }

    /// Read the samples of the pixel at `(x, y)` into `out[..bands]`.
    pub fn get_pixel(&self, x: i32, y: i32, out: &mut [i32]) -> Result<(), AccessError> {
        each_store!(self, inner => inner.get_pixel(x, y, out))
    }

    /// Write the pixel at `(x, y)` from `samples[..bands]`.
    pub fn set_pixel(&self, x: i32, y: i32, samples: &[i32]) -> Result<(), AccessError> {
        each_store!(self, inner => inner.set_pixel(x, y, samples))
    }

    /// Read a `w × h` block, row-major and band-interleaved, into `out`.
    pub fn get_samples(
        &self,
        x: i32,
        y: i32,
        w: u32,
        h: u32,
        out: &mut [i32],
    ) -> Result<(), AccessError> {
        each_store!(self, inner => inner.get_samples(x, y, w, h, out))
    }

    /// Write a `w × h` block, row-major and band-interleaved, from `samples`.
    pub fn set_samples(
        &self,
        x: i32,
        y: i32,
        w: u32,
        h: u32,
        samples: &[i32],
    ) -> Result<(), AccessError> {
        each_store!(self, inner => inner.set_samples(x, y, w, h, samples))
    }

    /// Read one band of a `w × h` block into `out`.
    pub fn get_band(
        &self,
        x: i32,
        y: i32,
        w: u32,
        h: u32,
        band: usize,
        out: &mut [i32],
    ) -> Result<(), AccessError> {
        each_store!(self, inner => inner.get_band(x, y, w, h, band, out))
    }

    /// Write one band of a `w × h` block from `samples`.
    pub fn set_band(
        &self,
        x: i32,
        y: i32,
        w: u32,
        h: u32,
        band: usize,
        samples: &[i32],
    ) -> Result<(), AccessError> {
        each_store!(self, inner => inner.set_band(x, y, w, h, band, samples))
    }

    /// Derive a child raster aliasing this raster's buffer.
    ///
    /// `(x, y, w, h)` select the covered rectangle in this raster's coordinates, `bands` an
    /// optional subset of bands, `origin` the external coordinate the child maps onto the
    /// rectangle's top-left corner. Fails with an out-of-bounds error if the rectangle is not
    /// contained in this raster.
    pub fn child_view(
        &self,
        x: i32,
        y: i32,
        w: u32,
        h: u32,
        bands: Option<&[usize]>,
        origin: (i32, i32),
    ) -> Result<Self, AccessError> {
        Ok(match self {
            RasterStore::BitPacked(inner) => {
                RasterStore::BitPacked(inner.child_view(x, y, w, h, bands, origin)?)
            }
            RasterStore::ByteInterleaved(inner) => {
                RasterStore::ByteInterleaved(inner.child_view(x, y, w, h, bands, origin)?)
            }
            RasterStore::ByteBanded(inner) => {
                RasterStore::ByteBanded(inner.child_view(x, y, w, h, bands, origin)?)
            }
            RasterStore::ShortInterleaved(inner) => {
                RasterStore::ShortInterleaved(inner.child_view(x, y, w, h, bands, origin)?)
            }
            RasterStore::IntPacked(inner) => {
                RasterStore::IntPacked(inner.child_view(x, y, w, h, bands, origin)?)
            }
        })
    }

    /// A freshly allocated, zeroed raster of the same storage kind and band structure.
    pub fn with_zeroed_like(&self, width: u32, height: u32) -> Result<Self, LayoutError> {
        Ok(match self {
            RasterStore::BitPacked(inner) => RasterStore::BitPacked(inner.with_zeroed(width, height)?),
            RasterStore::ByteInterleaved(inner) => {
                RasterStore::ByteInterleaved(inner.with_zeroed_interleaved(width, height)?)
            }
            RasterStore::ByteBanded(inner) => {
                RasterStore::ByteBanded(inner.with_zeroed_banded(width, height)?)
            }
            RasterStore::ShortInterleaved(inner) => {
                RasterStore::ShortInterleaved(inner.with_zeroed_interleaved(width, height)?)
            }
            RasterStore::IntPacked(inner) => {
                RasterStore::IntPacked(inner.with_zeroed(width, height)?)
            }
        })
    }

    /// Copy a rectangle from another raster.
    ///
    /// Uses the specialized byte-range copy when both rasters are sub-byte packed at the same
    /// depth; any other pairing with a matching band count goes through the generic
    /// scanline-at-a-time sample path. Mismatched band counts are an unsupported layout.
    pub fn copy_rect_from(
        &self,
        src: &RasterStore,
        src_x: i32,
        src_y: i32,
        w: u32,
        h: u32,
        dst_x: i32,
        dst_y: i32,
    ) -> Result<(), AccessError> {
        if let (RasterStore::BitPacked(dst), RasterStore::BitPacked(from)) = (self, src) {
            if dst.bits() == from.bits() {
                return dst.copy_rect_from(from, src_x, src_y, w, h, dst_x, dst_y);
            }
        }

        if self.bands() != src.bands() {
            return Err(AccessError::unsupported_layout());
        }

        check_rect(src.layout(), src_x, src_y, w, h)?;
        check_rect(self.layout(), dst_x, dst_y, w, h)?;

        let mut row = vec![0i32; w as usize * self.bands()];
        for dy in 0..h as i32 {
            src.get_samples(src_x, src_y + dy, w, 1, &mut row)?;
            self.set_samples(dst_x, dst_y + dy, w, 1, &row)?;
        }
        Ok(())
    }

    /// The packed-int variant, if this is one.
    pub fn as_int_packed(&self) -> Option<&IntPackedRaster> {
        match self {
            RasterStore::IntPacked(inner) => Some(inner),
            _ => None,
        }
    }

    /// The byte-element variant, if this is one.
    pub fn as_byte_raster(&self) -> Option<&PixelRaster<u8>> {
        match self {
            RasterStore::ByteInterleaved(inner) | RasterStore::ByteBanded(inner) => Some(inner),
            _ => None,
        }
    }

    /// The sub-byte packed variant, if this is one.
    pub fn as_bit_packed(&self) -> Option<&BitPackedRaster> {
        match self {
            RasterStore::BitPacked(inner) => Some(inner),
            _ => None,
        }
    }

    /// The shared backing buffer, without copying.
    ///
    /// The returned handle's element type matches the storage variant; sub-byte packed and both
    /// byte stores hand out bytes. Index arithmetic against the buffer follows
    /// [`layout`](Self::layout).
    pub fn backing(&self) -> BackingCells<'_> {
        match self {
            RasterStore::BitPacked(inner) => BackingCells::Bytes(inner.cells()),
            RasterStore::ByteInterleaved(inner) | RasterStore::ByteBanded(inner) => {
                BackingCells::Bytes(inner.cells())
            }
            RasterStore::ShortInterleaved(inner) => BackingCells::Shorts(inner.cells()),
            RasterStore::IntPacked(inner) => BackingCells::Ints(inner.cells()),
        }
    }

    /// Bump the shared mutation epoch without writing. The caller's memory-visibility mechanism
    /// decides when readers observe the data; this only provides the counter.
    pub fn mark_mutated(&self) {
        match self {
            RasterStore::BitPacked(inner) => inner.cells().mark_mutated(),
            RasterStore::ByteInterleaved(inner) | RasterStore::ByteBanded(inner) => {
                inner.cells().mark_mutated()
            }
            RasterStore::ShortInterleaved(inner) => inner.cells().mark_mutated(),
            RasterStore::IntPacked(inner) => inner.cells().mark_mutated(),
        }
    }

    /// The current mutation epoch, shared with every aliasing view.
    pub fn mutation_epoch(&self) -> u64 {
        match self {
            RasterStore::BitPacked(inner) => inner.cells().epoch(),
            RasterStore::ByteInterleaved(inner) | RasterStore::ByteBanded(inner) => {
                inner.cells().epoch()
            }
            RasterStore::ShortInterleaved(inner) => inner.cells().epoch(),
            RasterStore::IntPacked(inner) => inner.cells().epoch(),
        }
    }
}

//! Pushing external scanlines into a backing store.
//!
//! Full per-pixel model conversion is an order of magnitude slower than a block copy, and most
//! real images qualify for one of the fast paths, so the compositor classifies every transfer
//! before running it: raw byte copy, direct packed-int copy, native-speed palette LUT, and only
//! then the generic per-pixel fallback. The classification result is remembered in an explicit
//! bounded cache keyed by the (model, destination) pairing, owned by the compositor rather than
//! hidden in a process-wide static.
use crate::pixel::{luminance, SurfaceFormat};
use crate::store::{AccessError, RasterStore, StoreKind};
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

/// How the source scanlines encode pixels.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceModel {
    /// Packed values in the given surface format, one per pixel.
    Direct(SurfaceFormat),
    /// Byte indices into an ARGB palette.
    Indexed { palette: Box<[u32]> },
}

/// The raw scanline data handed to the compositor, row-major, no row padding.
#[derive(Clone, Copy)]
pub enum SourceSamples<'a> {
    Bytes(&'a [u8]),
    Ints(&'a [u32]),
}

/// The transfer tier the compositor selected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Destination is a single-band byte store and the bytes need no reinterpretation.
    RawBytes,
    /// Destination matches the default ARGB packing; rows copy as packed ints.
    DirectInt,
    /// Palette lookup per pixel into a packed-int destination.
    IndexedLut,
    /// Generic model conversion per pixel.
    PerPixel,
}

/// A bounded strategy cache with least-recently-inserted eviction.
///
/// Capacity is caller-supplied; the cache never grows past it. Entries are keyed by a
/// fingerprint of the source model and destination layout.
pub struct StrategyCache {
    entries: Vec<(u64, Strategy)>,
    capacity: usize,
}

impl StrategyCache {
    pub fn with_capacity(capacity: usize) -> Self {
        StrategyCache {
            entries: Vec::new(),
            capacity,
        }
    }

    pub fn get(&self, key: u64) -> Option<Strategy> {
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, s)| *s)
    }

    pub fn insert(&mut self, key: u64, strategy: Strategy) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.iter().any(|(k, _)| *k == key) {
            return;
        }
        if self.entries.len() == self.capacity {
            // Least recently inserted goes first.
            self.entries.remove(0);
        }
        self.entries.push((key, strategy));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv(mut hash: u64, bytes: &[u8]) -> u64 {
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn model_fingerprint(model: &SourceModel, dst: &RasterStore) -> u64 {
    let mut hash = FNV_OFFSET;
    hash = fnv(hash, &[dst.kind() as u8, dst.bands() as u8]);
    if let Some(packed) = dst.as_int_packed() {
        for &mask in packed.band_masks() {
            hash = fnv(hash, &mask.to_le_bytes());
        }
    }
    match model {
        SourceModel::Direct(format) => {
            hash = fnv(hash, &[0u8, *format as u8]);
        }
        SourceModel::Indexed { palette } => {
            hash = fnv(hash, &[1u8]);
            hash = fnv(hash, &(palette.len() as u32).to_le_bytes());
            for &entry in palette.iter() {
                hash = fnv(hash, &entry.to_le_bytes());
            }
        }
    }
    hash
}

const ARGB_MASKS: [u32; 4] = [0x00ff_0000, 0x0000_ff00, 0x0000_00ff, 0xff00_0000];

/// Orchestrates scanline delivery into rasters.
pub struct Compositor {
    cache: StrategyCache,
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new()
    }
}

impl Compositor {
    pub fn new() -> Self {
        Self::with_cache_capacity(8)
    }

    pub fn with_cache_capacity(capacity: usize) -> Self {
        Compositor {
            cache: StrategyCache::with_capacity(capacity),
        }
    }

    pub fn cache(&self) -> &StrategyCache {
        &self.cache
    }

    /// Classify a transfer without running it.
    pub fn classify(&mut self, dst: &RasterStore, model: &SourceModel) -> Strategy {
        let key = model_fingerprint(model, dst);
        if let Some(strategy) = self.cache.get(key) {
            return strategy;
        }
        let strategy = Self::select(dst, model);
        self.cache.insert(key, strategy);
        strategy
    }

    fn select(dst: &RasterStore, model: &SourceModel) -> Strategy {
        match model {
            SourceModel::Indexed { .. } => {
                if matches!(
                    dst.kind(),
                    StoreKind::ByteInterleaved | StoreKind::ByteBanded
                ) && dst.bands() == 1
                {
                    // Indices land in the store verbatim; the palette is interpretation for
                    // later readers, not for the copy.
                    Strategy::RawBytes
                } else if Self::is_argb_packed(dst) {
                    Strategy::IndexedLut
                } else {
                    Strategy::PerPixel
                }
            }
            SourceModel::Direct(SurfaceFormat::Argb) if Self::is_argb_packed(dst) => {
                Strategy::DirectInt
            }
            SourceModel::Direct(SurfaceFormat::Gray8)
                if matches!(
                    dst.kind(),
                    StoreKind::ByteInterleaved | StoreKind::ByteBanded
                ) && dst.bands() == 1 =>
            {
                Strategy::RawBytes
            }
            SourceModel::Direct(_) => Strategy::PerPixel,
        }
    }

    fn is_argb_packed(dst: &RasterStore) -> bool {
        dst.as_int_packed()
            .map(|inner| inner.band_masks() == ARGB_MASKS)
            .unwrap_or(false)
    }

    /// Deliver a `w × h` block of external scanlines into `dst` at `(x, y)`.
    ///
    /// Returns the strategy that performed the transfer. The LUT tier downgrades to the
    /// per-pixel tier when it finds an index the palette cannot resolve.
    pub fn set_pixels(
        &mut self,
        dst: &RasterStore,
        x: i32,
        y: i32,
        w: u32,
        h: u32,
        model: &SourceModel,
        samples: SourceSamples<'_>,
    ) -> Result<Strategy, AccessError> {
        let count = w as usize * h as usize;
        let mut strategy = self.classify(dst, model);

        // The LUT application can detect an incompatibility it cannot resolve in place; the
        // whole block then goes through the direct conversion path instead.
        if strategy == Strategy::IndexedLut {
            if let (SourceModel::Indexed { palette }, SourceSamples::Bytes(data)) =
                (model, samples)
            {
                check_samples_len(count, data.len())?;
                if data[..count].iter().any(|&i| i as usize >= palette.len()) {
                    strategy = Strategy::PerPixel;
                }
            }
        }

        match strategy {
            Strategy::RawBytes => {
                let data = match samples {
                    SourceSamples::Bytes(data) => data,
                    SourceSamples::Ints(_) => return Err(AccessError::unsupported_layout()),
                };
                check_samples_len(count, data.len())?;
                let raster = dst
                    .as_byte_raster()
                    .ok_or_else(AccessError::unsupported_layout)?;
                for dy in 0..h as i32 {
                    let row = &data[dy as usize * w as usize..][..w as usize];
                    raster.set_row(x, y + dy, 0, row)?;
                }
            }
            Strategy::DirectInt => {
                let data = match samples {
                    SourceSamples::Ints(data) => data,
                    SourceSamples::Bytes(_) => return Err(AccessError::unsupported_layout()),
                };
                check_samples_len(count, data.len())?;
                let raster = dst
                    .as_int_packed()
                    .ok_or_else(AccessError::unsupported_layout)?;
                for dy in 0..h as i32 {
                    let row = &data[dy as usize * w as usize..][..w as usize];
                    raster.set_row(x, y + dy, row)?;
                }
            }
            Strategy::IndexedLut => {
                let (palette, data) = match (model, samples) {
                    (SourceModel::Indexed { palette }, SourceSamples::Bytes(data)) => {
                        (palette, data)
                    }
                    _ => return Err(AccessError::unsupported_layout()),
                };
                check_samples_len(count, data.len())?;
                let raster = dst
                    .as_int_packed()
                    .ok_or_else(AccessError::unsupported_layout)?;
                let mut row = vec![0u32; w as usize];
                for dy in 0..h as i32 {
                    let src = &data[dy as usize * w as usize..][..w as usize];
                    for (out, &index) in row.iter_mut().zip(src) {
                        *out = palette[index as usize];
                    }
                    raster.set_row(x, y + dy, &row)?;
                }
            }
            Strategy::PerPixel => {
                self.set_pixels_generic(dst, x, y, w, h, model, samples)?;
            }
        }
        Ok(strategy)
    }

    /// The tier-4 fallback: expand every sample to ARGB, then narrow to the destination bands.
    fn set_pixels_generic(
        &mut self,
        dst: &RasterStore,
        x: i32,
        y: i32,
        w: u32,
        h: u32,
        model: &SourceModel,
        samples: SourceSamples<'_>,
    ) -> Result<(), AccessError> {
        let count = w as usize * h as usize;
        let bands = dst.bands();
        let mut block = vec![0i32; count * bands];

        for i in 0..count {
            let argb = match (model, samples) {
                (SourceModel::Direct(format), SourceSamples::Ints(data)) => {
                    check_samples_len(count, data.len())?;
                    format.to_argb(data[i])
                }
                (SourceModel::Direct(format), SourceSamples::Bytes(data)) => {
                    check_samples_len(count, data.len())?;
                    format.to_argb(data[i] as u32)
                }
                (SourceModel::Indexed { palette }, SourceSamples::Bytes(data)) => {
                    check_samples_len(count, data.len())?;
                    let index = data[i] as usize;
                    if index < palette.len() {
                        palette[index]
                    } else {
                        0
                    }
                }
                (SourceModel::Indexed { .. }, SourceSamples::Ints(_)) => {
                    return Err(AccessError::unsupported_layout())
                }
            };

            let out = &mut block[i * bands..(i + 1) * bands];
            match bands {
                1 => out[0] = luminance(argb) as i32,
                2 => {
                    out[0] = luminance(argb) as i32;
                    out[1] = (argb >> 24) as i32;
                }
                3 => {
                    out[0] = ((argb >> 16) & 0xff) as i32;
                    out[1] = ((argb >> 8) & 0xff) as i32;
                    out[2] = (argb & 0xff) as i32;
                }
                4 => {
                    out[0] = ((argb >> 16) & 0xff) as i32;
                    out[1] = ((argb >> 8) & 0xff) as i32;
                    out[2] = (argb & 0xff) as i32;
                    out[3] = (argb >> 24) as i32;
                }
                _ => return Err(AccessError::unsupported_layout()),
            }
        }

        dst.set_samples(x, y, w, h, &block)
    }
}

fn check_samples_len(needed: usize, got: usize) -> Result<(), AccessError> {
    if got < needed {
        Err(AccessError::short_buffer())
    } else {
        Ok(())
    }
}

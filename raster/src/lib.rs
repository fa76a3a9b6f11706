// Distributed under The MIT License (MIT)
//
// Copyright (c) 2026 The `image-raster` developers
//! # Raster
//!
//! Packed pixel storage with validated strided layouts.
//!
//! This library is strictly `no_std`. It offers a small closed set of concrete pixel stores —
//! sub-byte packed, byte- and short-strided, and packed-int — behind one uniform access surface,
//! plus the stateless packed-pixel codecs and a scanline compositor that classifies transfers
//! into fast paths before falling back to per-pixel conversion.
//!
//! The load-bearing ideas:
//!
//! - A layout is *verified once*: [`RasterLayout`] proves at construction that every reachable
//!   sample index fits the 32-bit budget, so per-access arithmetic needs no overflow checks.
//! - Storage is shared: child views derived with `child_view` alias their parent's buffer, and
//!   writes through either side are visible to both.
//! - Access is fallible and loud: out-of-range coordinates return an error instead of clamping.
//!
//! ## Usage
//!
//! ```
//! use image_raster::RasterStore;
//!
//! let screen = RasterStore::int_packed_argb(64, 64).unwrap();
//! screen.set_pixel(3, 4, &[0xff, 0x80, 0x00, 0xff]).unwrap();
//!
//! // A child view over the top-left quadrant, sharing the same pixels.
//! let quad = screen.child_view(0, 0, 32, 32, None, (0, 0)).unwrap();
//! let mut px = [0i32; 4];
//! quad.get_pixel(3, 4, &mut px).unwrap();
//! assert_eq!(px, [0xff, 0x80, 0x00, 0xff]);
//! ```
// Be std for doctests, avoids a weird warning about missing allocator.
#![cfg_attr(not(doctest), no_std)]
#![deny(unsafe_code)]
extern crate alloc;

pub mod buf;
pub mod compose;
pub mod layout;
pub mod pixel;
pub mod store;

pub use self::buf::SampleCells;
pub use self::compose::{Compositor, SourceModel, SourceSamples, Strategy};
pub use self::layout::{LayoutError, RasterLayout, RasterSpec};
pub use self::pixel::SurfaceFormat;
pub use self::store::{
    AccessError, BackingCells, BitPackedRaster, IntPackedRaster, PixelRaster, RasterStore,
    StoreKind,
};

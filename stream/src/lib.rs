// Distributed under The MIT License (MIT)
//
// Copyright (c) 2026 The `image-raster` developers
//! # Stream
//!
//! Streaming GIF and PNG decoding into [`image_raster`] stores.
//!
//! Decoders pull bytes from a [`ByteSource`] and push reconstructed pixels into an internally
//! owned ARGB screen raster, reporting progress through a callback:
//!
//! ```
//! use image_stream::{Control, DecodeEvent, GifDecoder, SliceSource};
//! # fn decode(gif_bytes: &[u8]) -> Result<(), image_stream::DecodeError> {
//! let mut decoder = GifDecoder::new(SliceSource::new(gif_bytes))?;
//! decoder.decode(|screen, event| {
//!     if let DecodeEvent::FrameComplete { .. } = event {
//!         let mut px = [0i32; 4];
//!         screen.get_pixel(0, 0, &mut px).unwrap();
//!     }
//!     Control::Continue
//! })?;
//! # Ok(()) }
//! ```
//!
//! Decoding is synchronous and single-threaded; a scanline is committed to the raster only after
//! it is fully reconstructed, so an aborted decode leaves every previously delivered row intact.
#![cfg_attr(not(doctest), no_std)]
#![deny(unsafe_code)]
extern crate alloc;

mod error;
pub mod gif;
pub mod png;
pub mod source;

pub use self::error::DecodeError;
pub use self::gif::GifDecoder;
pub use self::png::PngDecoder;
pub use self::source::{ByteSource, SliceSource, StreamError};

/// Progress report handed to the decode callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeEvent {
    /// Rows `y .. y + height` of the screen raster now hold final pixels.
    RowsAvailable { y: i32, height: u32 },
    /// One interlace pass finished; the whole raster has been refined.
    PassComplete { pass: u8 },
    /// An animation frame finished, including its transparency handling.
    FrameComplete { frame: usize, delay_centis: u16 },
    /// The image decoded to the end.
    ImageComplete,
    /// The stream failed; everything delivered before this event stands.
    ImageError,
}

/// The callback's verdict after each event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    Continue,
    /// Stop decoding now. The decoder returns successfully without reading further.
    Stop,
}

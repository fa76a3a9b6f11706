//! Decode-time errors.
//!
//! A decode error is terminal for the *current image* only: frames and rows already delivered to
//! the raster stand and are never rolled back.
use crate::source::StreamError;
use core::fmt;
use image_raster::{AccessError, LayoutError};

/// Error raised while decoding a GIF or PNG stream.
#[derive(Debug, PartialEq, Eq)]
pub struct DecodeError {
    kind: DecodeErrorKind,
}

#[derive(Debug, PartialEq, Eq)]
enum DecodeErrorKind {
    /// The stream does not start with the format's signature bytes.
    Signature,
    /// A grammar violation past the signature.
    Grammar(&'static str),
    /// A chunk's stored CRC does not match its content.
    Crc,
    /// The stream ended inside a structure that promised more bytes.
    UnexpectedEof,
    /// The source has no bytes yet; the caller may retry with more input.
    NotReady,
    /// A header combination the decoder does not implement.
    UnsupportedHeader(&'static str),
    /// The compressed payload would not inflate.
    Compression,
}

impl DecodeError {
    pub(crate) fn signature() -> Self {
        DecodeErrorKind::Signature.into()
    }

    pub(crate) fn grammar(what: &'static str) -> Self {
        DecodeErrorKind::Grammar(what).into()
    }

    pub(crate) fn crc() -> Self {
        DecodeErrorKind::Crc.into()
    }

    pub(crate) fn unexpected_eof() -> Self {
        DecodeErrorKind::UnexpectedEof.into()
    }

    pub(crate) fn unsupported_header(what: &'static str) -> Self {
        DecodeErrorKind::UnsupportedHeader(what).into()
    }

    pub(crate) fn compression() -> Self {
        DecodeErrorKind::Compression.into()
    }

    /// Whether the caller may retry once more input is available.
    pub fn is_not_ready(&self) -> bool {
        matches!(self.kind, DecodeErrorKind::NotReady)
    }

    /// Whether a CRC check failed.
    pub fn is_crc_mismatch(&self) -> bool {
        matches!(self.kind, DecodeErrorKind::Crc)
    }

    /// Whether the stream ended early.
    pub fn is_unexpected_eof(&self) -> bool {
        matches!(self.kind, DecodeErrorKind::UnexpectedEof)
    }
}

impl From<DecodeErrorKind> for DecodeError {
    fn from(kind: DecodeErrorKind) -> Self {
        DecodeError { kind }
    }
}

impl From<StreamError> for DecodeError {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::NotReady => DecodeErrorKind::NotReady.into(),
            StreamError::Eof => DecodeErrorKind::UnexpectedEof.into(),
        }
    }
}

impl From<LayoutError> for DecodeError {
    fn from(_: LayoutError) -> Self {
        DecodeError::grammar("image geometry exceeds the addressable budget")
    }
}

impl From<AccessError> for DecodeError {
    fn from(_: AccessError) -> Self {
        DecodeError::grammar("decoded region falls outside the screen raster")
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DecodeErrorKind::Signature => f.write_str("stream does not carry the format signature"),
            DecodeErrorKind::Grammar(what) => write!(f, "malformed stream: {what}"),
            DecodeErrorKind::Crc => f.write_str("chunk CRC mismatch"),
            DecodeErrorKind::UnexpectedEof => f.write_str("stream ended inside a structure"),
            DecodeErrorKind::NotReady => f.write_str("input not available yet"),
            DecodeErrorKind::UnsupportedHeader(what) => write!(f, "unsupported header: {what}"),
            DecodeErrorKind::Compression => f.write_str("compressed payload would not inflate"),
        }
    }
}

impl core::error::Error for DecodeError {}

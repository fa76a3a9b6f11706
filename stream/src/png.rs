//! PNG decoding.
//!
//! The stream is the 8-byte signature followed by `{length}{type}{data}{crc32}` chunks,
//! big-endian, ending at IEND. Chunk CRCs are checked against a compile-time table; a mismatch
//! is a hard error because later IDAT chunks depend on earlier palette and transparency chunks
//! being trustworthy.
//!
//! The concatenated IDAT payload inflates to one filter byte plus filtered bytes per scanline.
//! Each scanline unfilters against the already-reconstructed previous row and preceding bytes,
//! converts to ARGB, and lands on the screen raster only when complete. Non-interlaced images
//! report after every row; Adam7 images report after every pass.
use crate::error::DecodeError;
use crate::source::ByteSource;
use crate::{Control, DecodeEvent};
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use image_raster::{Compositor, RasterStore, SourceModel, SourceSamples, SurfaceFormat};
use miniz_oxide::inflate::decompress_to_vec_zlib;

const SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

const fn crc_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut n = 0;
    while n < 256 {
        let mut c = n as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 {
                0xedb8_8320 ^ (c >> 1)
            } else {
                c >> 1
            };
            k += 1;
        }
        table[n] = c;
        n += 1;
    }
    table
}

const CRC_TABLE: [u32; 256] = crc_table();

fn crc32(chunk_type: &[u8; 4], payload: &[u8]) -> u32 {
    let mut crc = 0xffff_ffffu32;
    for &byte in chunk_type.iter().chain(payload) {
        crc = CRC_TABLE[((crc ^ byte as u32) & 0xff) as usize] ^ (crc >> 8);
    }
    !crc
}

const PASS_START_X: [u32; 7] = [0, 4, 0, 2, 0, 1, 0];
const PASS_START_Y: [u32; 7] = [0, 0, 4, 0, 2, 0, 1];
const PASS_STEP_X: [u32; 7] = [8, 8, 4, 4, 2, 2, 1];
const PASS_STEP_Y: [u32; 7] = [8, 8, 8, 4, 4, 2, 2];

fn pass_extent(full: u32, start: u32, step: u32) -> u32 {
    if full > start {
        (full - start + step - 1) / step
    } else {
        0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ColorType {
    Gray,
    Rgb,
    Palette,
    GrayAlpha,
    RgbAlpha,
}

impl ColorType {
    fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(ColorType::Gray),
            2 => Some(ColorType::Rgb),
            3 => Some(ColorType::Palette),
            4 => Some(ColorType::GrayAlpha),
            6 => Some(ColorType::RgbAlpha),
            _ => None,
        }
    }

    fn samples(self) -> usize {
        match self {
            ColorType::Gray | ColorType::Palette => 1,
            ColorType::GrayAlpha => 2,
            ColorType::Rgb => 3,
            ColorType::RgbAlpha => 4,
        }
    }

    fn allows_depth(self, depth: u8) -> bool {
        match self {
            ColorType::Gray => matches!(depth, 1 | 2 | 4 | 8 | 16),
            ColorType::Palette => matches!(depth, 1 | 2 | 4 | 8),
            ColorType::Rgb | ColorType::GrayAlpha | ColorType::RgbAlpha => {
                matches!(depth, 8 | 16)
            }
        }
    }
}

#[derive(Clone, Copy)]
struct Header {
    width: u32,
    height: u32,
    depth: u8,
    color: ColorType,
    interlaced: bool,
}

impl Header {
    fn bits_per_pixel(&self) -> usize {
        self.color.samples() * self.depth as usize
    }

    /// Filter offset in bytes, rounded up, never less than one.
    fn filter_offset(&self) -> usize {
        (self.bits_per_pixel() + 7) / 8
    }

    fn row_bytes(&self, width: u32) -> usize {
        (width as usize * self.bits_per_pixel() + 7) / 8
    }
}

/// Transparency from a tRNS chunk for non-palette images: one exact-match color.
#[derive(Clone, Copy)]
enum ColorKey {
    Gray(u16),
    Rgb([u16; 3]),
}

/// Timestamp from a tIME chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LastModified {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

/// Ancillary metadata passed through without pixel effect.
#[derive(Clone, Debug, Default)]
pub struct PngMetadata {
    /// gAMA value, scaled by 100000.
    pub gamma: Option<u32>,
    /// cHRM white point and primaries, each scaled by 100000.
    pub chromaticities: Option<[u32; 8]>,
    /// tEXt keyword/value pairs, Latin-1 decoded.
    pub texts: Vec<(String, String)>,
    /// tIME last-modification timestamp.
    pub modified: Option<LastModified>,
}

/// A PNG decoder over a byte source.
pub struct PngDecoder<S: ByteSource> {
    source: S,
    verify_crc: bool,
    screen: Option<RasterStore>,
    metadata: PngMetadata,
}

fn read_exact<S: ByteSource>(source: &mut S, buf: &mut [u8]) -> Result<(), DecodeError> {
    match source.read_bytes(buf)? {
        0 => Ok(()),
        _ => Err(DecodeError::unexpected_eof()),
    }
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn be_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

/// Paeth predictor: nearest of left, above and upper-left, ties resolved in that order.
fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i32 + b as i32 - c as i32;
    let pa = (p - a as i32).abs();
    let pb = (p - b as i32).abs();
    let pc = (p - c as i32).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

fn unfilter(
    filter: u8,
    row: &mut [u8],
    prev: &[u8],
    offset: usize,
) -> Result<(), DecodeError> {
    match filter {
        0 => {}
        1 => {
            for i in offset..row.len() {
                row[i] = row[i].wrapping_add(row[i - offset]);
            }
        }
        2 => {
            for i in 0..row.len() {
                row[i] = row[i].wrapping_add(prev[i]);
            }
        }
        3 => {
            for i in 0..row.len() {
                let a = if i >= offset { row[i - offset] } else { 0 };
                let avg = ((a as u16 + prev[i] as u16) / 2) as u8;
                row[i] = row[i].wrapping_add(avg);
            }
        }
        4 => {
            for i in 0..row.len() {
                let a = if i >= offset { row[i - offset] } else { 0 };
                let c = if i >= offset { prev[i - offset] } else { 0 };
                row[i] = row[i].wrapping_add(paeth(a, prev[i], c));
            }
        }
        _ => return Err(DecodeError::grammar("scanline filter type")),
    }
    Ok(())
}

/// A sub-byte or byte sample, by pixel index. Depth 16 reads the raw 16-bit value.
fn sample(row: &[u8], index: usize, depth: u8) -> u32 {
    match depth {
        1 => ((row[index >> 3] >> (7 - (index & 7))) & 0x01) as u32,
        2 => ((row[index >> 2] >> (6 - 2 * (index & 3))) & 0x03) as u32,
        4 => ((row[index >> 1] >> (4 - 4 * (index & 1))) & 0x0f) as u32,
        8 => row[index] as u32,
        _ => be_u16(&row[index * 2..]) as u32,
    }
}

/// Replicate a narrow gray sample's bits downward to 8 bits; depth 16 narrows to the high byte.
fn expand_gray(value: u32, depth: u8) -> u32 {
    match depth {
        1 => value * 0xff,
        2 => value * 0x55,
        4 => value * 0x11,
        8 => value,
        _ => value >> 8,
    }
}

impl<S: ByteSource> PngDecoder<S> {
    pub fn new(source: S) -> Self {
        PngDecoder {
            source,
            verify_crc: true,
            screen: None,
            metadata: PngMetadata::default(),
        }
    }

    /// Toggle CRC verification of every chunk. On by default.
    pub fn verify_crc(mut self, verify: bool) -> Self {
        self.verify_crc = verify;
        self
    }

    /// The screen raster, once IHDR has been read.
    pub fn screen(&self) -> Option<&RasterStore> {
        self.screen.as_ref()
    }

    /// Metadata collected from ancillary chunks so far.
    pub fn metadata(&self) -> &PngMetadata {
        &self.metadata
    }

    /// Run the decode to IEND, a stop verdict from the callback, or an error.
    ///
    /// On error the callback sees a terminal [`DecodeEvent::ImageError`]; rows already
    /// delivered remain on the screen raster.
    pub fn decode(
        &mut self,
        mut on_event: impl FnMut(&RasterStore, DecodeEvent) -> Control,
    ) -> Result<(), DecodeError> {
        match self.run(&mut on_event) {
            Ok(()) => Ok(()),
            Err(err) => {
                if let Some(screen) = &self.screen {
                    on_event(screen, DecodeEvent::ImageError);
                }
                Err(err)
            }
        }
    }

    fn read_chunk(&mut self) -> Result<([u8; 4], Vec<u8>), DecodeError> {
        let mut head = [0u8; 8];
        read_exact(&mut self.source, &mut head)?;
        let len = be_u32(&head[..4]) as usize;
        let chunk_type = [head[4], head[5], head[6], head[7]];

        let mut payload = vec![0u8; len];
        read_exact(&mut self.source, &mut payload)?;

        let mut stored = [0u8; 4];
        read_exact(&mut self.source, &mut stored)?;
        if self.verify_crc && crc32(&chunk_type, &payload) != be_u32(&stored) {
            return Err(DecodeError::crc());
        }
        Ok((chunk_type, payload))
    }

    fn run(
        &mut self,
        on_event: &mut impl FnMut(&RasterStore, DecodeEvent) -> Control,
    ) -> Result<(), DecodeError> {
        let mut signature = [0u8; 8];
        read_exact(&mut self.source, &mut signature)?;
        if signature != SIGNATURE {
            return Err(DecodeError::signature());
        }

        let (first_type, first_payload) = self.read_chunk()?;
        if &first_type != b"IHDR" {
            return Err(DecodeError::grammar("first chunk is not IHDR"));
        }
        let header = parse_ihdr(&first_payload)?;
        self.screen = Some(RasterStore::int_packed_argb(header.width, header.height)?);

        let mut palette: Option<Box<[u32]>> = None;
        let mut color_key: Option<ColorKey> = None;
        let mut idat: Vec<u8> = Vec::new();
        let mut idat_seen = false;

        loop {
            let (chunk_type, payload) = self.read_chunk()?;
            match &chunk_type {
                b"IHDR" => return Err(DecodeError::grammar("duplicate IHDR")),
                b"PLTE" => {
                    if payload.is_empty() || payload.len() % 3 != 0 || payload.len() > 256 * 3 {
                        return Err(DecodeError::grammar("palette length"));
                    }
                    if idat_seen {
                        return Err(DecodeError::grammar("palette after image data"));
                    }
                    palette = Some(
                        payload
                            .chunks_exact(3)
                            .map(|c| {
                                0xff00_0000
                                    | ((c[0] as u32) << 16)
                                    | ((c[1] as u32) << 8)
                                    | c[2] as u32
                            })
                            .collect(),
                    );
                }
                b"tRNS" => match header.color {
                    ColorType::Palette => {
                        let palette = palette
                            .as_mut()
                            .ok_or_else(|| DecodeError::grammar("transparency before palette"))?;
                        if payload.len() > palette.len() {
                            return Err(DecodeError::grammar("transparency length"));
                        }
                        for (entry, &alpha) in palette.iter_mut().zip(&payload) {
                            *entry = (*entry & 0x00ff_ffff) | ((alpha as u32) << 24);
                        }
                    }
                    ColorType::Gray => {
                        if payload.len() != 2 {
                            return Err(DecodeError::grammar("transparency length"));
                        }
                        color_key = Some(ColorKey::Gray(be_u16(&payload)));
                    }
                    ColorType::Rgb => {
                        if payload.len() != 6 {
                            return Err(DecodeError::grammar("transparency length"));
                        }
                        color_key = Some(ColorKey::Rgb([
                            be_u16(&payload[0..]),
                            be_u16(&payload[2..]),
                            be_u16(&payload[4..]),
                        ]));
                    }
                    // Formats with a real alpha channel cannot also carry a color key.
                    _ => return Err(DecodeError::grammar("transparency for alpha format")),
                },
                b"gAMA" => {
                    if payload.len() != 4 {
                        return Err(DecodeError::grammar("gamma length"));
                    }
                    self.metadata.gamma = Some(be_u32(&payload));
                }
                b"cHRM" => {
                    if payload.len() != 32 {
                        return Err(DecodeError::grammar("chromaticity length"));
                    }
                    let mut values = [0u32; 8];
                    for (value, bytes) in values.iter_mut().zip(payload.chunks_exact(4)) {
                        *value = be_u32(bytes);
                    }
                    self.metadata.chromaticities = Some(values);
                }
                b"tEXt" => {
                    let split = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
                    let keyword = payload[..split].iter().map(|&b| b as char).collect();
                    let text = payload[(split + 1).min(payload.len())..]
                        .iter()
                        .map(|&b| b as char)
                        .collect();
                    self.metadata.texts.push((keyword, text));
                }
                b"tIME" => {
                    if payload.len() != 7 {
                        return Err(DecodeError::grammar("timestamp length"));
                    }
                    self.metadata.modified = Some(LastModified {
                        year: be_u16(&payload),
                        month: payload[2],
                        day: payload[3],
                        hour: payload[4],
                        minute: payload[5],
                        second: payload[6],
                    });
                }
                b"IDAT" => {
                    idat_seen = true;
                    idat.extend_from_slice(&payload);
                }
                b"IEND" => break,
                other => {
                    // Bit 5 of the first type byte marks a chunk the decoder may ignore.
                    if other[0] & 0x20 == 0 {
                        return Err(DecodeError::grammar("unknown critical chunk"));
                    }
                }
            }
        }

        if header.color == ColorType::Palette && palette.is_none() {
            return Err(DecodeError::grammar("palette image without PLTE"));
        }

        let data = decompress_to_vec_zlib(&idat).map_err(|_| DecodeError::compression())?;
        self.reconstruct(&header, palette.as_deref(), color_key, &data, on_event)
    }

    fn reconstruct(
        &mut self,
        header: &Header,
        palette: Option<&[u32]>,
        color_key: Option<ColorKey>,
        data: &[u8],
        on_event: &mut impl FnMut(&RasterStore, DecodeEvent) -> Control,
    ) -> Result<(), DecodeError> {
        let screen = self
            .screen
            .as_ref()
            .ok_or_else(|| DecodeError::grammar("missing IHDR"))?;
        let mut compositor = Compositor::new();
        let offset = header.filter_offset();
        let mut cursor = 0usize;

        if !header.interlaced {
            let row_bytes = header.row_bytes(header.width);
            let mut prev = vec![0u8; row_bytes];
            let mut row = vec![0u8; row_bytes];
            let mut argb = vec![0u32; header.width as usize];

            for y in 0..header.height as i32 {
                let filter = take(data, &mut cursor, 1)?[0];
                row.copy_from_slice(take(data, &mut cursor, row_bytes)?);
                unfilter(filter, &mut row, &prev, offset)?;
                row_to_argb(header, palette, color_key, &row, &mut argb)?;
                compositor.set_pixels(
                    screen,
                    0,
                    y,
                    header.width,
                    1,
                    &SourceModel::Direct(SurfaceFormat::Argb),
                    SourceSamples::Ints(&argb),
                )?;
                if on_event(screen, DecodeEvent::RowsAvailable { y, height: 1 }) == Control::Stop {
                    return Ok(());
                }
                core::mem::swap(&mut prev, &mut row);
            }
        } else {
            let raster = screen
                .as_int_packed()
                .ok_or_else(|| DecodeError::grammar("screen raster is not packed"))?;
            let mut stage = vec![0u32; header.width as usize];

            for pass in 0..7 {
                let pass_w = pass_extent(header.width, PASS_START_X[pass], PASS_STEP_X[pass]);
                let pass_h = pass_extent(header.height, PASS_START_Y[pass], PASS_STEP_Y[pass]);
                if pass_w == 0 || pass_h == 0 {
                    continue;
                }

                let row_bytes = header.row_bytes(pass_w);
                let mut prev = vec![0u8; row_bytes];
                let mut row = vec![0u8; row_bytes];
                let mut argb = vec![0u32; pass_w as usize];

                for r in 0..pass_h {
                    let filter = take(data, &mut cursor, 1)?[0];
                    row.copy_from_slice(take(data, &mut cursor, row_bytes)?);
                    unfilter(filter, &mut row, &prev, offset)?;
                    row_to_argb(header, palette, color_key, &row, &mut argb)?;

                    let y = (PASS_START_Y[pass] + r * PASS_STEP_Y[pass]) as i32;
                    raster.get_row(0, y, header.width, &mut stage)?;
                    for (i, &value) in argb.iter().enumerate() {
                        stage[(PASS_START_X[pass] + i as u32 * PASS_STEP_X[pass]) as usize] =
                            value;
                    }
                    raster.set_row(0, y, &stage)?;
                    core::mem::swap(&mut prev, &mut row);
                }

                if on_event(screen, DecodeEvent::PassComplete { pass: pass as u8 })
                    == Control::Stop
                {
                    return Ok(());
                }
            }
        }

        on_event(screen, DecodeEvent::ImageComplete);
        Ok(())
    }
}

fn take<'a>(data: &'a [u8], cursor: &mut usize, n: usize) -> Result<&'a [u8], DecodeError> {
    if data.len() - *cursor < n {
        return Err(DecodeError::unexpected_eof());
    }
    let slice = &data[*cursor..*cursor + n];
    *cursor += n;
    Ok(slice)
}

fn parse_ihdr(payload: &[u8]) -> Result<Header, DecodeError> {
    if payload.len() != 13 {
        return Err(DecodeError::grammar("IHDR length"));
    }
    let width = be_u32(&payload[0..]);
    let height = be_u32(&payload[4..]);
    if width == 0 || height == 0 {
        return Err(DecodeError::grammar("zero image dimension"));
    }
    let depth = payload[8];
    let color = ColorType::from_wire(payload[9])
        .ok_or(DecodeError::unsupported_header("color type"))?;
    if !color.allows_depth(depth) {
        return Err(DecodeError::unsupported_header("bit depth for color type"));
    }
    if payload[10] != 0 {
        return Err(DecodeError::unsupported_header("compression method"));
    }
    if payload[11] != 0 {
        return Err(DecodeError::unsupported_header("filter method"));
    }
    let interlaced = match payload[12] {
        0 => false,
        1 => true,
        _ => return Err(DecodeError::unsupported_header("interlace method")),
    };
    Ok(Header {
        width,
        height,
        depth,
        color,
        interlaced,
    })
}

/// Convert one reconstructed scanline to ARGB values, one per pixel.
fn row_to_argb(
    header: &Header,
    palette: Option<&[u32]>,
    color_key: Option<ColorKey>,
    row: &[u8],
    out: &mut [u32],
) -> Result<(), DecodeError> {
    let depth = header.depth;
    match header.color {
        ColorType::Gray => {
            for (i, out) in out.iter_mut().enumerate() {
                let raw = sample(row, i, depth);
                let v = expand_gray(raw, depth);
                let alpha = match color_key {
                    Some(ColorKey::Gray(key)) if key as u32 == raw => 0,
                    _ => 0xff,
                };
                *out = (alpha << 24) | (v << 16) | (v << 8) | v;
            }
        }
        ColorType::Palette => {
            let palette = palette.ok_or_else(|| DecodeError::grammar("missing palette"))?;
            for (i, out) in out.iter_mut().enumerate() {
                let index = sample(row, i, depth) as usize;
                *out = *palette
                    .get(index)
                    .ok_or_else(|| DecodeError::grammar("palette index out of range"))?;
            }
        }
        ColorType::Rgb => {
            let step = if depth == 16 { 6 } else { 3 };
            for (i, out) in out.iter_mut().enumerate() {
                let at = i * step;
                let (raw, r, g, b) = if depth == 16 {
                    let raw = [
                        be_u16(&row[at..]),
                        be_u16(&row[at + 2..]),
                        be_u16(&row[at + 4..]),
                    ];
                    (raw, raw[0] >> 8, raw[1] >> 8, raw[2] >> 8)
                } else {
                    let raw = [row[at] as u16, row[at + 1] as u16, row[at + 2] as u16];
                    (raw, raw[0], raw[1], raw[2])
                };
                let alpha = match color_key {
                    Some(ColorKey::Rgb(key)) if key == raw => 0u32,
                    _ => 0xff,
                };
                *out = (alpha << 24) | ((r as u32) << 16) | ((g as u32) << 8) | b as u32;
            }
        }
        ColorType::GrayAlpha => {
            let step = if depth == 16 { 4 } else { 2 };
            for (i, out) in out.iter_mut().enumerate() {
                let at = i * step;
                let (v, a) = if depth == 16 {
                    (row[at] as u32, row[at + 2] as u32)
                } else {
                    (row[at] as u32, row[at + 1] as u32)
                };
                *out = (a << 24) | (v << 16) | (v << 8) | v;
            }
        }
        ColorType::RgbAlpha => {
            let step = if depth == 16 { 8 } else { 4 };
            for (i, out) in out.iter_mut().enumerate() {
                let at = i * step;
                let (r, g, b, a) = if depth == 16 {
                    (
                        row[at] as u32,
                        row[at + 2] as u32,
                        row[at + 4] as u32,
                        row[at + 6] as u32,
                    )
                } else {
                    (
                        row[at] as u32,
                        row[at + 1] as u32,
                        row[at + 2] as u32,
                        row[at + 3] as u32,
                    )
                };
                *out = (a << 24) | (r << 16) | (g << 8) | b;
            }
        }
    }
    Ok(())
}

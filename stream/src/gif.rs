//! GIF87a/89a decoding.
//!
//! The stream is a header, a logical screen descriptor with an optional global color table, then
//! a sequence of extensions and image descriptors terminated by `0x3B`. Each image descriptor
//! carries one LZW-compressed frame; frames composite onto a persistent ARGB screen raster under
//! the disposal rules of the preceding frame.
//!
//! Rows are committed to the screen only once fully decompressed, and transparent pixels are
//! never transmitted at all: each row is split into maximal opaque runs so that the content
//! beneath a transparent pixel shows through. A Netscape application extension turns the frame
//! sequence into a loop, implemented by rewinding the byte source to a mark set right after the
//! global color table.
use crate::error::DecodeError;
use crate::source::ByteSource;
use crate::{Control, DecodeEvent};
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use image_raster::{Compositor, RasterStore, SourceModel, SourceSamples};

const BLOCK_EXTENSION: u8 = 0x21;
const BLOCK_IMAGE: u8 = 0x2c;
const BLOCK_TRAILER: u8 = 0x3b;

const EXT_GRAPHIC_CONTROL: u8 = 0xf9;
const EXT_COMMENT: u8 = 0xfe;
const EXT_APPLICATION: u8 = 0xff;

const MAX_CODES: usize = 4096;

/// What to do with a frame's rectangle before the next frame draws.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Disposal {
    /// Leave the frame's damage as-is.
    None,
    /// Keep the frame visible and snapshot its rectangle for a later `Previous`.
    Save,
    /// Fill the rectangle with the background or transparent color.
    Background,
    /// Restore the last `Save` snapshot.
    Previous,
}

impl Disposal {
    fn from_wire(bits: u8) -> Self {
        match bits {
            1 => Disposal::Save,
            2 => Disposal::Background,
            3 => Disposal::Previous,
            _ => Disposal::None,
        }
    }
}

/// Graphic-control state captured for the next image descriptor.
#[derive(Clone, Copy)]
struct GraphicControl {
    disposal: Disposal,
    delay_centis: u16,
    transparent: Option<u8>,
}

impl Default for GraphicControl {
    fn default() -> Self {
        GraphicControl {
            disposal: Disposal::None,
            delay_centis: 0,
            transparent: None,
        }
    }
}

struct Snapshot {
    x: i32,
    y: i32,
    store: RasterStore,
}

struct PendingDisposal {
    x: i32,
    y: i32,
    w: u32,
    h: u32,
    disposal: Disposal,
    had_transparency: bool,
}

/// A GIF decoder over a byte source.
pub struct GifDecoder<S: ByteSource> {
    source: S,
    screen: RasterStore,
    compositor: Compositor,
    global_palette: Box<[u32]>,
    background_index: u8,
    loop_count: Option<u16>,
    loops_left: u16,
    saved: Option<Snapshot>,
    pending: Option<PendingDisposal>,
    frames: usize,
}

impl<S: ByteSource> core::fmt::Debug for GifDecoder<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GifDecoder").finish_non_exhaustive()
    }
}

fn read_exact<S: ByteSource>(source: &mut S, buf: &mut [u8]) -> Result<(), DecodeError> {
    match source.read_bytes(buf)? {
        0 => Ok(()),
        _ => Err(DecodeError::unexpected_eof()),
    }
}

fn read_u8<S: ByteSource>(source: &mut S) -> Result<u8, DecodeError> {
    let mut byte = [0u8];
    read_exact(source, &mut byte)?;
    Ok(byte[0])
}

fn read_u16le<S: ByteSource>(source: &mut S) -> Result<u16, DecodeError> {
    let mut bytes = [0u8; 2];
    read_exact(source, &mut bytes)?;
    Ok(u16::from_le_bytes(bytes))
}

fn read_palette<S: ByteSource>(source: &mut S, entries: usize) -> Result<Box<[u32]>, DecodeError> {
    let mut rgb = vec![0u8; entries * 3];
    read_exact(source, &mut rgb)?;
    Ok(rgb
        .chunks_exact(3)
        .map(|c| 0xff00_0000 | ((c[0] as u32) << 16) | ((c[1] as u32) << 8) | c[2] as u32)
        .collect())
}

fn skip_sub_blocks<S: ByteSource>(source: &mut S) -> Result<(), DecodeError> {
    let mut scratch = [0u8; 255];
    loop {
        let len = read_u8(source)? as usize;
        if len == 0 {
            return Ok(());
        }
        read_exact(source, &mut scratch[..len])?;
    }
}

/// Row order produced by the 4-pass GIF interlace for a frame of the given height.
fn interlace_order(height: u32) -> Vec<u32> {
    let mut order = Vec::with_capacity(height as usize);
    for (start, step) in [(0u32, 8u32), (4, 8), (2, 4), (1, 2)] {
        let mut y = start;
        while y < height {
            order.push(y);
            y += step;
        }
    }
    order
}

impl<S: ByteSource> GifDecoder<S> {
    /// Read the header, logical screen descriptor and global color table, and allocate the
    /// screen raster. The source is left marked at the first frame for animation looping.
    pub fn new(mut source: S) -> Result<Self, DecodeError> {
        let mut header = [0u8; 6];
        read_exact(&mut source, &mut header)?;
        if &header != b"GIF87a" && &header != b"GIF89a" {
            return Err(DecodeError::signature());
        }

        let width = read_u16le(&mut source)? as u32;
        let height = read_u16le(&mut source)? as u32;
        let flags = read_u8(&mut source)?;
        let background_index = read_u8(&mut source)?;
        let _aspect = read_u8(&mut source)?;

        let global_palette = if flags & 0x80 != 0 {
            read_palette(&mut source, 2 << (flags & 0x07))?
        } else {
            Box::from([])
        };

        let screen = RasterStore::int_packed_argb(width, height)?;
        source.mark();

        Ok(GifDecoder {
            source,
            screen,
            compositor: Compositor::new(),
            global_palette,
            background_index,
            loop_count: None,
            loops_left: 0,
            saved: None,
            pending: None,
            frames: 0,
        })
    }

    /// The screen raster frames composite onto. Aliases the raster handed to the callback.
    pub fn screen(&self) -> &RasterStore {
        &self.screen
    }

    /// Frames delivered so far, counting repeats when the animation loops.
    pub fn frames_decoded(&self) -> usize {
        self.frames
    }

    /// The Netscape loop count, once seen. `Some(0)` requests looping forever.
    pub fn loop_count(&self) -> Option<u16> {
        self.loop_count
    }

    /// Run the state machine to the trailer, the end of the loop budget, a stop verdict from
    /// the callback, or an error.
    ///
    /// On error the callback sees a terminal [`DecodeEvent::ImageError`]; frames already
    /// composited remain on the screen raster.
    pub fn decode(
        &mut self,
        mut on_event: impl FnMut(&RasterStore, DecodeEvent) -> Control,
    ) -> Result<(), DecodeError> {
        match self.run(&mut on_event) {
            Ok(()) => Ok(()),
            Err(err) => {
                on_event(&self.screen, DecodeEvent::ImageError);
                Err(err)
            }
        }
    }

    fn run(
        &mut self,
        on_event: &mut impl FnMut(&RasterStore, DecodeEvent) -> Control,
    ) -> Result<(), DecodeError> {
        let mut control = GraphicControl::default();
        loop {
            match read_u8(&mut self.source)? {
                BLOCK_EXTENSION => self.read_extension(&mut control)?,
                BLOCK_IMAGE => {
                    let verdict = self.decode_frame(&control, on_event)?;
                    control = GraphicControl::default();
                    if verdict == Control::Stop {
                        return Ok(());
                    }
                }
                BLOCK_TRAILER => {
                    if self.rewind_for_loop()? {
                        control = GraphicControl::default();
                        continue;
                    }
                    on_event(&self.screen, DecodeEvent::ImageComplete);
                    return Ok(());
                }
                _ => return Err(DecodeError::grammar("unknown top-level block")),
            }
        }
    }

    /// Whether another animation loop should run, rewinding the source if so.
    fn rewind_for_loop(&mut self) -> Result<bool, DecodeError> {
        match self.loop_count {
            None => Ok(false),
            // A count of zero loops until the callback stops the decode.
            Some(0) => {
                self.source.reset_to_mark()?;
                Ok(true)
            }
            Some(_) if self.loops_left > 0 => {
                self.loops_left -= 1;
                self.source.reset_to_mark()?;
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    fn read_extension(&mut self, control: &mut GraphicControl) -> Result<(), DecodeError> {
        match read_u8(&mut self.source)? {
            EXT_GRAPHIC_CONTROL => {
                let len = read_u8(&mut self.source)?;
                if len != 4 {
                    return Err(DecodeError::grammar("graphic control block length"));
                }
                let mut body = [0u8; 4];
                read_exact(&mut self.source, &mut body)?;
                control.disposal = Disposal::from_wire((body[0] >> 2) & 0x07);
                control.delay_centis = u16::from_le_bytes([body[1], body[2]]);
                control.transparent = (body[0] & 0x01 != 0).then_some(body[3]);
                if read_u8(&mut self.source)? != 0 {
                    return Err(DecodeError::grammar("graphic control terminator"));
                }
                Ok(())
            }
            EXT_APPLICATION => {
                let len = read_u8(&mut self.source)? as usize;
                let mut ident = [0u8; 11];
                if len == 11 {
                    read_exact(&mut self.source, &mut ident)?;
                } else {
                    read_exact(&mut self.source, &mut ident[..len.min(11)])?;
                    return skip_sub_blocks(&mut self.source);
                }
                if &ident == b"NETSCAPE2.0" || &ident == b"ANIMEXTS1.0" {
                    self.read_loop_count()
                } else {
                    skip_sub_blocks(&mut self.source)
                }
            }
            EXT_COMMENT => skip_sub_blocks(&mut self.source),
            _ => skip_sub_blocks(&mut self.source),
        }
    }

    fn read_loop_count(&mut self) -> Result<(), DecodeError> {
        loop {
            let len = read_u8(&mut self.source)? as usize;
            if len == 0 {
                return Ok(());
            }
            let mut body = [0u8; 255];
            read_exact(&mut self.source, &mut body[..len])?;
            // Looping re-reads this extension after every rewind; only the first sighting may
            // (re)arm the loop budget.
            if len == 3 && body[0] == 1 && self.loop_count.is_none() {
                let count = u16::from_le_bytes([body[1], body[2]]);
                self.loop_count = Some(count);
                self.loops_left = count;
            }
        }
    }

    /// Apply the previous frame's disposal before the next frame draws over it.
    fn apply_pending_disposal(&mut self) -> Result<(), DecodeError> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        // A frame that was entirely off-screen leaves nothing to dispose.
        if pending.w == 0 || pending.h == 0 {
            return Ok(());
        }
        match pending.disposal {
            Disposal::None => {}
            Disposal::Save => {
                let store = self.screen.with_zeroed_like(pending.w, pending.h)?;
                store.copy_rect_from(&self.screen, pending.x, pending.y, pending.w, pending.h, 0, 0)?;
                self.saved = Some(Snapshot {
                    x: pending.x,
                    y: pending.y,
                    store,
                });
            }
            Disposal::Background => {
                // A frame that carried transparency exposes the content behind it, so its
                // background is transparent black rather than the palette entry.
                let color = if pending.had_transparency {
                    0
                } else {
                    self.global_palette
                        .get(self.background_index as usize)
                        .copied()
                        .unwrap_or(0)
                };
                self.fill_rect(pending.x, pending.y, pending.w, pending.h, color)?;
            }
            Disposal::Previous => {
                if let Some(saved) = &self.saved {
                    self.screen.copy_rect_from(
                        &saved.store,
                        0,
                        0,
                        saved.store.width(),
                        saved.store.height(),
                        saved.x,
                        saved.y,
                    )?;
                }
            }
        }
        Ok(())
    }

    fn fill_rect(&self, x: i32, y: i32, w: u32, h: u32, argb: u32) -> Result<(), DecodeError> {
        let raster = self
            .screen
            .as_int_packed()
            .ok_or_else(|| DecodeError::grammar("screen raster is not packed"))?;
        let row = vec![argb; w as usize];
        for dy in 0..h as i32 {
            raster.set_row(x, y + dy, &row)?;
        }
        Ok(())
    }

    fn decode_frame(
        &mut self,
        control: &GraphicControl,
        on_event: &mut impl FnMut(&RasterStore, DecodeEvent) -> Control,
    ) -> Result<Control, DecodeError> {
        self.apply_pending_disposal()?;

        let left = read_u16le(&mut self.source)? as i32;
        let top = read_u16le(&mut self.source)? as i32;
        let frame_w = read_u16le(&mut self.source)? as u32;
        let frame_h = read_u16le(&mut self.source)? as u32;
        let flags = read_u8(&mut self.source)?;
        if frame_w == 0 || frame_h == 0 {
            return Err(DecodeError::grammar("empty frame rectangle"));
        }

        let local_palette = if flags & 0x80 != 0 {
            Some(read_palette(&mut self.source, 2 << (flags & 0x07))?)
        } else {
            None
        };
        let interlaced = flags & 0x40 != 0;

        let palette = local_palette
            .as_deref()
            .unwrap_or(&self.global_palette);
        if palette.is_empty() {
            return Err(DecodeError::grammar("image without a color table"));
        }
        let model = SourceModel::Indexed {
            palette: palette.into(),
        };

        // Frames may overhang the logical screen; the overhang is decoded and dropped.
        let screen_w = self.screen.width() as i32;
        let screen_h = self.screen.height() as i32;
        let vis_w = (screen_w - left).clamp(0, frame_w as i32) as usize;

        let row_order: Vec<u32> = if interlaced {
            interlace_order(frame_h)
        } else {
            (0..frame_h).collect()
        };

        let mut row_buf = vec![0u8; frame_w as usize];
        let mut col = 0usize;
        let mut rows_done = 0usize;
        let total_rows = frame_h as usize;
        let mut verdict = Control::Continue;

        // Borrowed apart from `self.source`, which the LZW loop reads from.
        let screen = &self.screen;
        let compositor = &mut self.compositor;
        let transparent = control.transparent;

        let mut deliver_row = |row: &[u8], frame_row: u32| -> Result<Control, DecodeError> {
            let y = top + frame_row as i32;
            if y < 0 || y >= screen_h || vis_w == 0 {
                return Ok(Control::Continue);
            }
            let row = &row[..vis_w];
            let mut x0 = 0usize;
            let mut wrote = false;
            while x0 < row.len() {
                if transparent == Some(row[x0]) {
                    x0 += 1;
                    continue;
                }
                let mut x1 = x0 + 1;
                while x1 < row.len() && transparent != Some(row[x1]) {
                    x1 += 1;
                }
                compositor.set_pixels(
                    screen,
                    left + x0 as i32,
                    y,
                    (x1 - x0) as u32,
                    1,
                    &model,
                    SourceSamples::Bytes(&row[x0..x1]),
                )?;
                wrote = true;
                x0 = x1;
            }
            if wrote {
                Ok(on_event(screen, DecodeEvent::RowsAvailable { y, height: 1 }))
            } else {
                Ok(Control::Continue)
            }
        };

        // LZW decompression, LSB-first bit order, 12-bit code space.
        let min_code_size = read_u8(&mut self.source)? as u16;
        if !(2..=8).contains(&min_code_size) {
            return Err(DecodeError::grammar("LZW minimum code size"));
        }
        let clear = 1u16 << min_code_size;
        let eoi = clear + 1;

        let mut prefix = [0u16; MAX_CODES];
        let mut suffix = [0u8; MAX_CODES];
        let mut stack = [0u8; MAX_CODES + 1];
        for i in 0..clear {
            suffix[i as usize] = i as u8;
        }

        let mut available = eoi + 1;
        let mut code_size = min_code_size + 1;
        let mut code_mask = (1u16 << code_size) - 1;
        let mut old_code: Option<u16> = None;
        let mut first = 0u8;

        let mut datum = 0u32;
        let mut bits = 0u32;
        let mut block = [0u8; 255];
        let mut ended = false;

        'blocks: loop {
            let len = read_u8(&mut self.source)? as usize;
            if len == 0 {
                break;
            }
            read_exact(&mut self.source, &mut block[..len])?;
            if ended || rows_done == total_rows {
                continue;
            }

            for &byte in &block[..len] {
                datum |= (byte as u32) << bits;
                bits += 8;

                while bits >= code_size as u32 {
                    let code = (datum & code_mask as u32) as u16;
                    datum >>= code_size;
                    bits -= code_size as u32;

                    if code == clear {
                        available = eoi + 1;
                        code_size = min_code_size + 1;
                        code_mask = (1u16 << code_size) - 1;
                        old_code = None;
                        continue;
                    }
                    if code == eoi {
                        ended = true;
                        continue 'blocks;
                    }

                    let mut top_of_stack = 0usize;
                    let mut cur = code;
                    match old_code {
                        None => {
                            if code >= clear {
                                return Err(DecodeError::grammar("first LZW code not a literal"));
                            }
                            first = code as u8;
                            old_code = Some(code);
                            stack[top_of_stack] = first;
                            top_of_stack += 1;
                        }
                        Some(old) => {
                            if cur > available {
                                return Err(DecodeError::grammar("LZW code out of range"));
                            }
                            if cur == available {
                                // The KwKwK case: the code being defined right now.
                                stack[top_of_stack] = first;
                                top_of_stack += 1;
                                cur = old;
                            }
                            while cur >= clear {
                                stack[top_of_stack] = suffix[cur as usize];
                                top_of_stack += 1;
                                cur = prefix[cur as usize];
                            }
                            first = suffix[cur as usize];
                            stack[top_of_stack] = first;
                            top_of_stack += 1;

                            if (available as usize) < MAX_CODES {
                                prefix[available as usize] = old;
                                suffix[available as usize] = first;
                                available += 1;
                                if available & code_mask == 0 && (available as usize) < MAX_CODES {
                                    code_size += 1;
                                    code_mask += available;
                                }
                            }
                            old_code = Some(code);
                        }
                    }

                    // Stack drains in reverse to restore pixel order.
                    while top_of_stack > 0 {
                        top_of_stack -= 1;
                        if rows_done == total_rows {
                            continue;
                        }
                        row_buf[col] = stack[top_of_stack];
                        col += 1;
                        if col == row_buf.len() {
                            col = 0;
                            let frame_row = row_order[rows_done];
                            rows_done += 1;
                            if deliver_row(&row_buf, frame_row)? == Control::Stop {
                                verdict = Control::Stop;
                            }
                        }
                    }
                    if verdict == Control::Stop {
                        ended = true;
                        continue 'blocks;
                    }
                }
            }
        }

        if rows_done < total_rows && verdict == Control::Continue {
            return Err(DecodeError::grammar("LZW data ended before the frame"));
        }

        let vis_h = (screen_h - top).clamp(0, frame_h as i32) as u32;
        self.pending = Some(PendingDisposal {
            x: left,
            y: top,
            w: vis_w as u32,
            h: vis_h,
            disposal: control.disposal,
            had_transparency: control.transparent.is_some(),
        });
        self.frames += 1;

        if verdict == Control::Continue {
            verdict = on_event(
                &self.screen,
                DecodeEvent::FrameComplete {
                    frame: self.frames - 1,
                    delay_centis: control.delay_centis,
                },
            );
        }
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::interlace_order;

    #[test]
    fn interlace_covers_every_row_once() {
        for height in [1u32, 2, 4, 7, 8, 9, 16] {
            let mut order = interlace_order(height);
            assert_eq!(order.len(), height as usize);
            order.sort_unstable();
            let sorted: alloc::vec::Vec<u32> = (0..height).collect();
            assert_eq!(order, sorted);
        }
    }

    #[test]
    fn interlace_first_pass_is_every_eighth_row() {
        let order = interlace_order(16);
        assert_eq!(&order[..2], &[0, 8]);
        assert_eq!(order[2..4], [4, 12]);
        assert_eq!(order[4..8], [2, 6, 10, 14]);
        assert_eq!(order[8..], [1, 3, 5, 7, 9, 11, 13, 15]);
    }
}

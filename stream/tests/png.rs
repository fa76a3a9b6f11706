use image_stream::{Control, DecodeEvent, PngDecoder, SliceSource};
use miniz_oxide::deflate::compress_to_vec_zlib;

fn crc(chunk_type: &[u8; 4], payload: &[u8]) -> u32 {
    let mut crc = 0xffff_ffffu32;
    for &byte in chunk_type.iter().chain(payload) {
        crc ^= byte as u32;
        for _ in 0..8 {
            crc = if crc & 1 != 0 {
                0xedb8_8320 ^ (crc >> 1)
            } else {
                crc >> 1
            };
        }
    }
    !crc
}

fn chunk(chunk_type: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = (payload.len() as u32).to_be_bytes().to_vec();
    out.extend(chunk_type);
    out.extend(payload);
    out.extend(crc(chunk_type, payload).to_be_bytes());
    out
}

fn ihdr(w: u32, h: u32, depth: u8, color: u8, interlace: u8) -> Vec<u8> {
    let mut payload = w.to_be_bytes().to_vec();
    payload.extend(h.to_be_bytes());
    payload.extend([depth, color, 0, 0, interlace]);
    chunk(b"IHDR", &payload)
}

const SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

fn assemble(chunks: &[Vec<u8>]) -> Vec<u8> {
    let mut out = SIGNATURE.to_vec();
    for c in chunks {
        out.extend(c);
    }
    out.extend(chunk(b"IEND", &[]));
    out
}

fn idat(raw_scanlines: &[u8]) -> Vec<u8> {
    chunk(b"IDAT", &compress_to_vec_zlib(raw_scanlines, 6))
}

fn argb_at(screen: &image_raster::RasterStore, x: i32, y: i32) -> [i32; 4] {
    let mut px = [0i32; 4];
    screen.get_pixel(x, y, &mut px).unwrap();
    px
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i32 + b as i32 - c as i32;
    let (pa, pb, pc) = ((p - a as i32).abs(), (p - b as i32).abs(), (p - c as i32).abs());
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Apply a PNG scanline filter the way an encoder would.
fn filter_row(filter: u8, raw: &[u8], prev: &[u8], bpp: usize) -> Vec<u8> {
    (0..raw.len())
        .map(|i| {
            let a = if i >= bpp { raw[i - bpp] } else { 0 };
            let b = prev[i];
            let c = if i >= bpp { prev[i - bpp] } else { 0 };
            let predicted = match filter {
                0 => 0,
                1 => a,
                2 => b,
                3 => ((a as u16 + b as u16) / 2) as u8,
                _ => paeth(a, b, c),
            };
            raw[i].wrapping_sub(predicted)
        })
        .collect()
}

#[test]
fn decodes_rgb_rows_with_per_row_reports() {
    let rows = [
        [10u8, 20, 30, 40, 50, 60, 70, 80, 90],
        [1, 2, 3, 4, 5, 6, 7, 8, 9],
    ];
    let mut raw = Vec::new();
    for row in &rows {
        raw.push(0);
        raw.extend(row);
    }
    let bytes = assemble(&[ihdr(3, 2, 8, 2, 0), idat(&raw)]);

    let mut decoder = PngDecoder::new(SliceSource::new(&bytes));
    let mut row_events = 0;
    let mut complete = 0;
    decoder
        .decode(|_, event| {
            match event {
                DecodeEvent::RowsAvailable { .. } => row_events += 1,
                DecodeEvent::ImageComplete => complete += 1,
                _ => {}
            }
            Control::Continue
        })
        .unwrap();

    assert_eq!(row_events, 2);
    assert_eq!(complete, 1);
    let screen = decoder.screen().unwrap();
    assert_eq!(argb_at(screen, 0, 0), [10, 20, 30, 255]);
    assert_eq!(argb_at(screen, 2, 0), [70, 80, 90, 255]);
    assert_eq!(argb_at(screen, 1, 1), [4, 5, 6, 255]);
}

#[test]
fn every_filter_type_unfilters_to_the_original() {
    // A synthetic 4x3 RGBA image with varied bytes, filtered per row with one filter type for
    // the whole image, must decode back to the unfiltered pixels.
    let w = 4usize;
    let h = 3usize;
    let bpp = 4usize;
    let pixel = |x: usize, y: usize, c: usize| ((x * 37 + y * 11 + c * 7) % 251) as u8;

    for filter in 0u8..=4 {
        let mut raw = Vec::new();
        let mut prev = vec![0u8; w * bpp];
        for y in 0..h {
            let row: Vec<u8> = (0..w * bpp).map(|i| pixel(i / bpp, y, i % bpp)).collect();
            raw.push(filter);
            raw.extend(filter_row(filter, &row, &prev, bpp));
            prev = row;
        }

        let bytes = assemble(&[ihdr(w as u32, h as u32, 8, 6, 0), idat(&raw)]);
        let mut decoder = PngDecoder::new(SliceSource::new(&bytes));
        decoder.decode(|_, _| Control::Continue).unwrap();

        let screen = decoder.screen().unwrap();
        for y in 0..h {
            for x in 0..w {
                let expected = [
                    pixel(x, y, 0) as i32,
                    pixel(x, y, 1) as i32,
                    pixel(x, y, 2) as i32,
                    pixel(x, y, 3) as i32,
                ];
                assert_eq!(
                    argb_at(screen, x as i32, y as i32),
                    expected,
                    "filter {filter}, pixel ({x}, {y})"
                );
            }
        }
    }
}

const PASS_START_X: [u32; 7] = [0, 4, 0, 2, 0, 1, 0];
const PASS_START_Y: [u32; 7] = [0, 0, 4, 0, 2, 0, 1];
const PASS_STEP_X: [u32; 7] = [8, 8, 4, 4, 2, 2, 1];
const PASS_STEP_Y: [u32; 7] = [8, 8, 8, 4, 4, 2, 2];

#[test]
fn adam7_writes_every_pixel_of_a_16x16_image() {
    let value = |x: u32, y: u32| (y * 16 + x) as u8;

    let mut raw = Vec::new();
    for pass in 0..7 {
        let mut y = PASS_START_Y[pass];
        while y < 16 {
            raw.push(0);
            let mut x = PASS_START_X[pass];
            while x < 16 {
                raw.push(value(x, y));
                x += PASS_STEP_X[pass];
            }
            y += PASS_STEP_Y[pass];
        }
    }

    let bytes = assemble(&[ihdr(16, 16, 8, 0, 1), idat(&raw)]);
    let mut decoder = PngDecoder::new(SliceSource::new(&bytes));
    let mut passes = 0;
    let mut row_events = 0;
    decoder
        .decode(|_, event| {
            match event {
                DecodeEvent::PassComplete { .. } => passes += 1,
                DecodeEvent::RowsAvailable { .. } => row_events += 1,
                _ => {}
            }
            Control::Continue
        })
        .unwrap();

    assert_eq!(passes, 7);
    assert_eq!(row_events, 0, "interlaced images report per pass, not per row");
    let screen = decoder.screen().unwrap();
    for y in 0..16 {
        for x in 0..16 {
            let v = value(x as u32, y as u32) as i32;
            assert_eq!(argb_at(screen, x, y), [v, v, v, 255], "pixel ({x}, {y})");
        }
    }
}

#[test]
fn crc_mismatch_is_a_hard_error_unless_disabled() {
    let mut bytes = assemble(&[ihdr(1, 1, 8, 0, 0), idat(&[0, 42])]);
    // Last byte of the IHDR chunk is its CRC trailer.
    bytes[32] ^= 0xff;

    let err = PngDecoder::new(SliceSource::new(&bytes))
        .decode(|_, _| Control::Continue)
        .unwrap_err();
    assert!(err.is_crc_mismatch());

    let mut decoder = PngDecoder::new(SliceSource::new(&bytes)).verify_crc(false);
    decoder.decode(|_, _| Control::Continue).unwrap();
    assert_eq!(argb_at(decoder.screen().unwrap(), 0, 0), [42, 42, 42, 255]);
}

#[test]
fn rejects_inconsistent_headers() {
    for bad in [
        ihdr(0, 1, 8, 0, 0),
        ihdr(1, 1, 3, 0, 0),
        ihdr(1, 1, 8, 5, 0),
        ihdr(1, 1, 4, 2, 0),
        ihdr(1, 1, 8, 0, 2),
    ] {
        let bytes = assemble(&[bad, idat(&[0, 0])]);
        let err = PngDecoder::new(SliceSource::new(&bytes))
            .decode(|_, _| Control::Continue)
            .unwrap_err();
        assert!(!err.is_crc_mismatch());
    }
}

#[test]
fn palette_transparency_lands_in_the_alpha_channel() {
    let plte = chunk(b"PLTE", &[255, 0, 0, 0, 255, 0]);
    let trns = chunk(b"tRNS", &[0x80]);
    let bytes = assemble(&[ihdr(2, 1, 8, 3, 0), plte, trns, idat(&[0, 0, 1])]);

    let mut decoder = PngDecoder::new(SliceSource::new(&bytes));
    decoder.decode(|_, _| Control::Continue).unwrap();

    let screen = decoder.screen().unwrap();
    assert_eq!(argb_at(screen, 0, 0), [255, 0, 0, 0x80]);
    assert_eq!(argb_at(screen, 1, 0), [0, 255, 0, 255]);
}

#[test]
fn sixteen_bit_gray_color_key_matches_exactly() {
    // 0x1234 is the keyed color; 0x1235 narrows to the same 8-bit gray but must stay opaque.
    let trns = chunk(b"tRNS", &[0x12, 0x34]);
    let bytes = assemble(&[ihdr(2, 1, 16, 0, 0), trns, idat(&[0, 0x12, 0x34, 0x12, 0x35])]);

    let mut decoder = PngDecoder::new(SliceSource::new(&bytes));
    decoder.decode(|_, _| Control::Continue).unwrap();

    let screen = decoder.screen().unwrap();
    assert_eq!(argb_at(screen, 0, 0), [0x12, 0x12, 0x12, 0]);
    assert_eq!(argb_at(screen, 1, 0), [0x12, 0x12, 0x12, 255]);
}

#[test]
fn short_image_data_keeps_the_delivered_rows() {
    // Three rows promised, two rows present.
    let raw = [0u8, 11, 12, 13, 0, 21, 22, 23];
    let bytes = assemble(&[ihdr(3, 3, 8, 0, 0), idat(&raw)]);

    let mut decoder = PngDecoder::new(SliceSource::new(&bytes));
    let mut rows = 0;
    let mut errored = false;
    let err = decoder
        .decode(|_, event| {
            match event {
                DecodeEvent::RowsAvailable { .. } => rows += 1,
                DecodeEvent::ImageError => errored = true,
                _ => {}
            }
            Control::Continue
        })
        .unwrap_err();

    assert!(err.is_unexpected_eof());
    assert!(errored);
    assert_eq!(rows, 2);
    let screen = decoder.screen().unwrap();
    assert_eq!(argb_at(screen, 0, 0), [11, 11, 11, 255]);
    assert_eq!(argb_at(screen, 2, 1), [23, 23, 23, 255]);
    assert_eq!(argb_at(screen, 0, 2), [0, 0, 0, 0]);
}

#[test]
fn ancillary_metadata_is_collected() {
    let gama = chunk(b"gAMA", &45455u32.to_be_bytes());
    let text = chunk(b"tEXt", b"Title\0hello");
    let time = chunk(b"tIME", &[0x07, 0xe2, 8, 25, 12, 30, 59]);
    let bytes = assemble(&[ihdr(1, 1, 8, 0, 0), gama, text, time, idat(&[0, 7])]);

    let mut decoder = PngDecoder::new(SliceSource::new(&bytes));
    decoder.decode(|_, _| Control::Continue).unwrap();

    let metadata = decoder.metadata();
    assert_eq!(metadata.gamma, Some(45455));
    assert_eq!(metadata.texts, [("Title".into(), "hello".into())]);
    let modified = metadata.modified.unwrap();
    assert_eq!(modified.year, 2018);
    assert_eq!(modified.month, 8);
    assert_eq!(modified.second, 59);
}

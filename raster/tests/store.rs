use image_raster::{BackingCells, RasterStore, SourceModel, SourceSamples, Strategy};
use image_raster::{Compositor, SurfaceFormat};

fn all_variants(w: u32, h: u32) -> Vec<RasterStore> {
    vec![
        RasterStore::bit_packed(w, h, 1).unwrap(),
        RasterStore::bit_packed(w, h, 2).unwrap(),
        RasterStore::bit_packed(w, h, 4).unwrap(),
        RasterStore::byte_interleaved(w, h, 3).unwrap(),
        RasterStore::byte_banded(w, h, 3).unwrap(),
        RasterStore::short_interleaved(w, h, 2).unwrap(),
        RasterStore::int_packed_argb(w, h).unwrap(),
    ]
}

#[test]
fn bounds_are_edges_exclusive_above() {
    for store in all_variants(7, 5) {
        let bands = store.bands();
        let mut px = vec![0i32; bands];

        assert!(store.get_pixel(0, 0, &mut px).is_ok());
        assert!(store.get_pixel(6, 4, &mut px).is_ok());

        for (x, y) in [(-1, 0), (0, -1), (7, 0), (0, 5), (7, 5)] {
            let err = store.get_pixel(x, y, &mut px).unwrap_err();
            assert!(err.is_out_of_bounds(), "({x}, {y}) must be rejected");
            let err = store.set_pixel(x, y, &px).unwrap_err();
            assert!(err.is_out_of_bounds());
        }

        // A rectangle sticking one pixel over any edge is rejected whole.
        let mut block = vec![0i32; 2 * 2 * bands];
        assert!(store.get_samples(6, 4, 2, 2, &mut block).is_err());
        assert!(store.get_samples(-1, 0, 2, 2, &mut block).is_err());
        assert!(store.get_samples(5, 3, 2, 2, &mut block).is_ok());
    }
}

#[test]
fn short_sample_buffers_are_rejected() {
    for store in all_variants(4, 4) {
        let bands = store.bands();
        let mut too_small = vec![0i32; 2 * 2 * bands - 1];
        let err = store.get_samples(0, 0, 2, 2, &mut too_small).unwrap_err();
        assert!(!err.is_out_of_bounds());
        assert!(store.set_samples(0, 0, 2, 2, &too_small).is_err());
    }
}

#[test]
fn pixel_and_samples_agree() {
    for store in all_variants(4, 3) {
        let bands = store.bands();
        let max = match store.kind() {
            image_raster::StoreKind::BitPacked => 1,
            _ => 3,
        };

        // Paint a deterministic pattern pixel by pixel.
        for y in 0..3 {
            for x in 0..4 {
                let px: Vec<i32> = (0..bands).map(|b| ((x + y + b as i32) % (max + 1))).collect();
                store.set_pixel(x, y, &px).unwrap();
            }
        }

        // Read it back as one block and re-check each pixel against it.
        let mut block = vec![0i32; 4 * 3 * bands];
        store.get_samples(0, 0, 4, 3, &mut block).unwrap();
        let mut px = vec![0i32; bands];
        for y in 0..3 {
            for x in 0..4 {
                store.get_pixel(x, y, &mut px).unwrap();
                let at = ((y * 4 + x) as usize) * bands;
                assert_eq!(&block[at..at + bands], &px[..], "pixel ({x}, {y})");
            }
        }
    }
}

#[test]
fn band_ops_roundtrip() {
    for store in all_variants(5, 4) {
        let bands = store.bands();
        let flat: Vec<i32> = (0..5 * 4).map(|i| i % 2).collect();
        for band in 0..bands {
            store.set_band(0, 0, 5, 4, band, &flat).unwrap();
        }
        let mut out = vec![0i32; 5 * 4];
        store.get_band(0, 0, 5, 4, bands - 1, &mut out).unwrap();
        assert_eq!(out, flat);

        let mut px = vec![0i32; bands];
        assert!(store.get_band(0, 0, 1, 1, bands, &mut px).is_err());
    }
}

#[test]
fn child_views_alias_both_ways() {
    for store in all_variants(8, 8) {
        let bands = store.bands();
        let child = store.child_view(2, 2, 4, 4, None, (0, 0)).unwrap();

        // Parent write, child read.
        let ones = vec![1i32; bands];
        store.set_pixel(3, 3, &ones).unwrap();
        let mut px = vec![0i32; bands];
        child.get_pixel(1, 1, &mut px).unwrap();
        assert_eq!(px, ones);

        // Child write, parent read.
        let zeros = vec![0i32; bands];
        child.set_pixel(1, 1, &zeros).unwrap();
        store.get_pixel(3, 3, &mut px).unwrap();
        assert_eq!(px, zeros);

        // The child's bounds are its own, not the parent's.
        assert!(child.get_pixel(4, 0, &mut px).is_err());
        assert!(child.get_pixel(-1, 0, &mut px).is_err());
    }
}

#[test]
fn child_view_with_translated_origin() {
    let store = RasterStore::byte_interleaved(8, 8, 1).unwrap();
    let child = store.child_view(2, 2, 4, 4, None, (10, 20)).unwrap();

    child.set_pixel(10, 20, &[7]).unwrap();
    let mut px = [0i32];
    store.get_pixel(2, 2, &mut px).unwrap();
    assert_eq!(px, [7]);

    // The untranslated corner is now out of the child's range.
    assert!(child.get_pixel(0, 0, &mut px).is_err());
    assert!(child.get_pixel(13, 23, &mut px).is_ok());
    assert!(child.get_pixel(14, 20, &mut px).is_err());
}

#[test]
fn child_view_band_subset() {
    let store = RasterStore::byte_interleaved(4, 4, 3).unwrap();
    store.set_pixel(1, 1, &[10, 20, 30]).unwrap();

    let green = store.child_view(0, 0, 4, 4, Some(&[1]), (0, 0)).unwrap();
    assert_eq!(green.bands(), 1);
    let mut px = [0i32];
    green.get_pixel(1, 1, &mut px).unwrap();
    assert_eq!(px, [20]);

    green.set_pixel(1, 1, &[99]).unwrap();
    let mut rgb = [0i32; 3];
    store.get_pixel(1, 1, &mut rgb).unwrap();
    assert_eq!(rgb, [10, 99, 30]);

    assert!(store.child_view(0, 0, 4, 4, Some(&[3]), (0, 0)).is_err());
}

#[test]
fn mutation_epoch_is_shared_with_views() {
    let store = RasterStore::int_packed_argb(4, 4).unwrap();
    let child = store.child_view(0, 0, 2, 2, None, (0, 0)).unwrap();

    let before = store.mutation_epoch();
    child.set_pixel(0, 0, &[1, 2, 3, 4]).unwrap();
    assert!(store.mutation_epoch() > before);
    assert_eq!(store.mutation_epoch(), child.mutation_epoch());
}

#[test]
fn sub_byte_neighbors_survive_single_writes() {
    // Adjacent 2-bit pixels share a byte; writing one must not disturb the other three.
    let store = RasterStore::bit_packed(4, 1, 2).unwrap();
    store.set_samples(0, 0, 4, 1, &[1, 2, 3, 0]).unwrap();
    store.set_pixel(1, 0, &[0]).unwrap();

    let mut out = [0i32; 4];
    store.get_samples(0, 0, 4, 1, &mut out).unwrap();
    assert_eq!(out, [1, 0, 3, 0]);
}

#[test]
fn copy_rect_between_kinds() {
    let src = RasterStore::byte_interleaved(6, 6, 3).unwrap();
    for y in 0..6 {
        for x in 0..6 {
            src.set_pixel(x, y, &[x, y, x + y]).unwrap();
        }
    }

    let dst = RasterStore::short_interleaved(6, 6, 3).unwrap();
    dst.copy_rect_from(&src, 1, 1, 4, 4, 0, 2).unwrap();

    let mut px = [0i32; 3];
    dst.get_pixel(0, 2, &mut px).unwrap();
    assert_eq!(px, [1, 1, 2]);
    dst.get_pixel(3, 5, &mut px).unwrap();
    assert_eq!(px, [4, 4, 8]);

    // Band-count mismatch is refused up front.
    let gray = RasterStore::byte_interleaved(6, 6, 1).unwrap();
    let err = gray.copy_rect_from(&src, 0, 0, 2, 2, 0, 0).unwrap_err();
    assert!(err.is_unsupported_layout());
}

#[test]
fn copy_rect_bit_packed_fast_path_matches_samples() {
    let src = RasterStore::bit_packed(16, 4, 1).unwrap();
    let pattern: Vec<i32> = (0..16 * 4).map(|i| (i / 3) % 2).collect();
    src.set_samples(0, 0, 16, 4, &pattern).unwrap();

    // Destination offset chosen so source and destination bit phases differ.
    let dst = RasterStore::bit_packed(16, 4, 1).unwrap();
    dst.copy_rect_from(&src, 2, 0, 11, 4, 5, 0).unwrap();

    let mut got = vec![0i32; 11 * 4];
    dst.get_samples(5, 0, 11, 4, &mut got).unwrap();
    let mut want = vec![0i32; 11 * 4];
    src.get_samples(2, 0, 11, 4, &mut want).unwrap();
    assert_eq!(got, want);
}

#[test]
fn with_zeroed_like_preserves_structure() {
    for store in all_variants(5, 5) {
        let fresh = store.with_zeroed_like(9, 2).unwrap();
        assert_eq!(fresh.kind(), store.kind());
        assert_eq!(fresh.bands(), store.bands());
        assert_eq!(fresh.width(), 9);
        assert_eq!(fresh.height(), 2);

        let mut px = vec![0i32; store.bands()];
        fresh.get_pixel(8, 1, &mut px).unwrap();
        assert!(px.iter().all(|&s| s == 0));
    }
}

#[test]
fn backing_buffer_writes_reach_the_raster() {
    // A surface layer scanning raw samples holds the buffer handle, not a copy; writes through
    // it must surface through the pixel interface and in every aliasing view.
    let store = RasterStore::byte_interleaved(4, 2, 1).unwrap();
    let child = store.child_view(1, 0, 3, 2, None, (0, 0)).unwrap();

    let cells = match store.backing() {
        BackingCells::Bytes(cells) => cells.clone(),
        _ => panic!("byte store hands out bytes"),
    };
    cells.set(store.layout().element_index(2, 1), 0x5a);
    cells.mark_mutated();

    let mut px = [0i32];
    store.get_pixel(2, 1, &mut px).unwrap();
    assert_eq!(px, [0x5a]);
    child.get_pixel(1, 1, &mut px).unwrap();
    assert_eq!(px, [0x5a]);
    assert_eq!(store.mutation_epoch(), child.mutation_epoch());

    match (store.backing(), child.backing()) {
        (BackingCells::Bytes(parent), BackingCells::Bytes(child)) => {
            assert!(parent.aliases(child));
        }
        _ => panic!("both stores hand out bytes"),
    }
}

#[test]
fn backing_buffer_element_type_follows_the_variant() {
    assert!(matches!(
        RasterStore::bit_packed(4, 4, 2).unwrap().backing(),
        BackingCells::Bytes(_)
    ));
    assert!(matches!(
        RasterStore::short_interleaved(4, 4, 2).unwrap().backing(),
        BackingCells::Shorts(_)
    ));
    assert!(matches!(
        RasterStore::int_packed_argb(4, 4).unwrap().backing(),
        BackingCells::Ints(_)
    ));
}

#[test]
fn compositor_direct_int_rows_land_packed() {
    let screen = RasterStore::int_packed_argb(4, 2).unwrap();
    let mut compositor = Compositor::new();
    let rows: Vec<u32> = (0..8).map(|i| 0xff00_0000 | i).collect();

    let used = compositor
        .set_pixels(
            &screen,
            0,
            0,
            4,
            2,
            &SourceModel::Direct(SurfaceFormat::Argb),
            SourceSamples::Ints(&rows),
        )
        .unwrap();
    assert_eq!(used, Strategy::DirectInt);

    let mut px = [0i32; 4];
    screen.get_pixel(3, 1, &mut px).unwrap();
    assert_eq!(px, [0, 0, 7, 0xff]);
}

#[test]
fn compositor_lut_applies_palette() {
    let screen = RasterStore::int_packed_argb(3, 1).unwrap();
    let mut compositor = Compositor::new();
    let model = SourceModel::Indexed {
        palette: vec![0xff00_0000, 0xffff_ffff, 0xff80_4020].into(),
    };

    let used = compositor
        .set_pixels(&screen, 0, 0, 3, 1, &model, SourceSamples::Bytes(&[2, 0, 1]))
        .unwrap();
    assert_eq!(used, Strategy::IndexedLut);

    let mut px = [0i32; 4];
    screen.get_pixel(0, 0, &mut px).unwrap();
    assert_eq!(px, [0x80, 0x40, 0x20, 0xff]);
}

#[test]
fn compositor_per_pixel_narrows_to_gray() {
    let gray = RasterStore::byte_interleaved(2, 1, 1).unwrap();
    let mut compositor = Compositor::new();

    // An RGB int source into a gray store has no fast path.
    let used = compositor
        .set_pixels(
            &gray,
            0,
            0,
            2,
            1,
            &SourceModel::Direct(SurfaceFormat::Rgb),
            SourceSamples::Ints(&[0x00ff_ffff, 0x0000_0000]),
        )
        .unwrap();
    assert_eq!(used, Strategy::PerPixel);

    let mut px = [0i32];
    gray.get_pixel(0, 0, &mut px).unwrap();
    assert_eq!(px, [0xff]);
    gray.get_pixel(1, 0, &mut px).unwrap();
    assert_eq!(px, [0]);
}

#[test]
fn compositor_per_pixel_fills_gray_alpha() {
    let ga = RasterStore::short_interleaved(2, 1, 2).unwrap();
    let mut compositor = Compositor::new();

    let used = compositor
        .set_pixels(
            &ga,
            0,
            0,
            2,
            1,
            &SourceModel::Direct(SurfaceFormat::Argb),
            SourceSamples::Ints(&[0x80ff_ffff, 0x0000_0000]),
        )
        .unwrap();
    assert_eq!(used, Strategy::PerPixel);

    let mut px = [0i32; 2];
    ga.get_pixel(0, 0, &mut px).unwrap();
    assert_eq!(px, [0xff, 0x80]);
    ga.get_pixel(1, 0, &mut px).unwrap();
    assert_eq!(px, [0, 0]);
}

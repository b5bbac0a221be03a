//! End-to-end decoding of in-memory compressed-image tables.

mod common;

use common::{
    be_f32, be_i16, be_i32, build_table, gzip, rice_compress, samples, shuffle, split_tiles,
    zlib, CompressedHdu, Row, HCOMPRESS_4X4, HCOMPRESS_4X4_PIXELS,
};
use fitsio_tiled::header::card_integer_value;
use fitsio_tiled::lupton::LuptonParameters;
use fitsio_tiled::quantize::random_sequence;
use fitsio_tiled::value::Value;
use fitsio_tiled::{decompress, BitDepth, DecodeOptions, Error, TileDecoder, TilePolicy};

fn rows(payloads: Vec<Vec<u8>>) -> Vec<Row> {
    payloads.into_iter().map(Row::new).collect()
}

fn decode(hdu: &CompressedHdu, rows: &[Row]) -> fitsio_tiled::Result<fitsio_tiled::DecodedImage> {
    let (cards, data) = build_table(hdu, rows);
    decompress(&cards, &data, &DecodeOptions::default())
}

// ===========================================================================
// NOCOMPRESS
// ===========================================================================

#[test]
fn nocompress_is_a_copy_for_every_depth() {
    for bitpix in [8, 16, 32, 64, -32, -64] {
        let bpp = BitDepth::from_bitpix(bitpix).unwrap().bytes();
        let image: Vec<u8> = (0..5 * 3 * bpp).map(|i| (i * 37 % 251) as u8).collect();
        let tiles = split_tiles(&image, bpp, 5, 3, 5, 1);
        let hdu = CompressedHdu::new("NOCOMPRESS", bitpix, &[5, 3], &[]);
        let out = decode(&hdu, &rows(tiles)).unwrap();
        assert_eq!(out.pixels.bytes, image, "BITPIX {bitpix}");
        assert_eq!(out.pixels.axes, vec![5, 3]);
        assert!(out.failures.is_empty());
    }
}

#[test]
fn cube_planes_follow_each_other() {
    let values: Vec<i32> = (0..12).map(|v| v * 1000 - 5000).collect();
    let image = be_i32(&values);
    let plane = 3 * 2 * 4;
    let tiles = vec![image[..plane].to_vec(), image[plane..].to_vec()];
    let hdu = CompressedHdu::new("NOCOMPRESS", 32, &[3, 2, 2], &[3, 2]);
    let out = decode(&hdu, &rows(tiles)).unwrap();
    assert_eq!(out.pixels.planes(), 2);
    assert_eq!(out.pixels.bytes, image);
}

// ===========================================================================
// RICE_1
// ===========================================================================

#[test]
fn rice_tiles_of_ones() {
    let hdu = CompressedHdu::new("RICE_1", 16, &[10, 10], &[4, 4]);
    let mut payloads = Vec::new();
    for ty in [4usize, 4, 2] {
        for tx in [4usize, 4, 2] {
            payloads.push(rice_compress(&vec![1; tx * ty], 32, 2));
        }
    }
    let out = decode(&hdu, &rows(payloads)).unwrap();
    assert_eq!(samples(&out.pixels.bytes, 2), vec![1; 100]);
}

#[test]
fn rice_round_trip_at_each_width() {
    let (width, height) = (12usize, 7usize);
    for (bitpix, bytepix) in [(8i64, 1usize), (16, 2), (32, 4)] {
        let n = (width * height) as i64;
        let values: Vec<i64> = (0..n)
            .map(|i| match bytepix {
                1 => (i * 13) % 256,
                2 => (i * i * 31) % 60_000 - 30_000,
                _ => (i * i * 7919) % 2_000_003 - 1_000_000,
            })
            .collect();
        let image: Vec<u8> = values
            .iter()
            .flat_map(|&v| match bytepix {
                1 => vec![v as u8],
                2 => (v as i16).to_be_bytes().to_vec(),
                _ => (v as i32).to_be_bytes().to_vec(),
            })
            .collect();
        let payloads = split_tiles(&image, bytepix, width, height, 5, 3)
            .iter()
            .map(|tile| rice_compress(&samples(tile, bytepix), 32, bytepix))
            .collect();
        let hdu = CompressedHdu::new("RICE_1", bitpix, &[width, height], &[5, 3]);
        let out = decode(&hdu, &rows(payloads)).unwrap();
        assert_eq!(out.pixels.bytes, image, "BITPIX {bitpix}");
    }
}

#[test]
fn rice_one_alias_and_explicit_block_size() {
    let values: Vec<i64> = (0..40).map(|i| 100 + (i % 5)).collect();
    let hdu = CompressedHdu::new("RICE_ONE", 16, &[40], &[])
        .with("ZNAME1", Value::String("BLOCKSIZE".into()))
        .with("ZVAL1", Value::Integer(16))
        .with("ZNAME2", Value::String("BYTEPIX".into()))
        .with("ZVAL2", Value::Integer(2));
    let out = decode(&hdu, &rows(vec![rice_compress(&values, 16, 2)])).unwrap();
    assert_eq!(samples(&out.pixels.bytes, 2), values);
}

// ===========================================================================
// GZIP_1 / GZIP_2
// ===========================================================================

#[test]
fn gzip_tiles_with_edge_clipping() {
    let values: Vec<i32> = (0..100).map(|v| v * v - 2500).collect();
    let image = be_i32(&values);
    let tiles = split_tiles(&image, 4, 10, 10, 4, 4);

    let gzip1 = CompressedHdu::new("GZIP_1", 32, &[10, 10], &[4, 4]);
    let out = decode(&gzip1, &rows(tiles.iter().map(|t| gzip(t)).collect())).unwrap();
    assert_eq!(out.pixels.bytes, image);

    let gzip2 = CompressedHdu::new("GZIP_2", 32, &[10, 10], &[4, 4]);
    let out = decode(&gzip2, &rows(tiles.iter().map(|t| zlib(&shuffle(t, 4))).collect())).unwrap();
    assert_eq!(out.pixels.bytes, image);
}

#[test]
fn gzip2_float_pixels() {
    let values: Vec<f32> = (0..24).map(|v| v as f32 * 0.25 - 1.5).collect();
    let image = be_f32(&values);
    let tiles = split_tiles(&image, 4, 6, 4, 6, 2);
    let hdu = CompressedHdu::new("GZIP_2", -32, &[6, 4], &[6, 2]);
    let out = decode(&hdu, &rows(tiles.iter().map(|t| zlib(&shuffle(t, 4))).collect())).unwrap();
    assert_eq!(out.pixels.bytes, image);
}

#[test]
fn inflated_length_must_match_the_tile() {
    let hdu = CompressedHdu::new("GZIP_1", 16, &[4], &[]);
    let err = decode(&hdu, &rows(vec![zlib(&[1, 2, 3])])).unwrap_err();
    assert!(matches!(
        err,
        Error::Tile { index: 0, ref source, .. } if matches!(**source, Error::TileGeometry(_))
    ));
}

// ===========================================================================
// HCOMPRESS_1
// ===========================================================================

#[test]
fn hcompress_tile() {
    let hdu = CompressedHdu::new("HCOMPRESS_1", 16, &[4, 4], &[4, 4]);
    let out = decode(&hdu, &rows(vec![HCOMPRESS_4X4.to_vec()])).unwrap();
    assert_eq!(samples(&out.pixels.bytes, 2), HCOMPRESS_4X4_PIXELS.to_vec());
}

#[test]
fn hcompress_smoothing_is_ignored() {
    let hdu = CompressedHdu::new("HCOMPRESS_1", 32, &[4, 4], &[4, 4])
        .with("ZNAME1", Value::String("SCALE".into()))
        .with("ZVAL1", Value::Integer(0))
        .with("ZNAME2", Value::String("SMOOTH".into()))
        .with("ZVAL2", Value::Integer(1));
    let out = decode(&hdu, &rows(vec![HCOMPRESS_4X4.to_vec()])).unwrap();
    assert_eq!(samples(&out.pixels.bytes, 4), HCOMPRESS_4X4_PIXELS.to_vec());
}

#[test]
fn hcompress_size_mismatch_is_reported() {
    let hdu = CompressedHdu::new("HCOMPRESS_1", 16, &[4, 2], &[4, 2]);
    let err = decode(&hdu, &rows(vec![HCOMPRESS_4X4.to_vec()])).unwrap_err();
    assert!(matches!(
        err,
        Error::Tile { ref source, .. } if matches!(**source, Error::TileGeometry(_))
    ));
}

#[test]
fn hcompress_oversized_stream_header_is_a_tile_failure() {
    let hdu = CompressedHdu::new("HCOMPRESS_1", 16, &[4, 8], &[4, 4]);
    let mut corrupt = HCOMPRESS_4X4.to_vec();
    corrupt[2..10].copy_from_slice(&[0x7f, 0xff, 0xff, 0xff, 0x7f, 0xff, 0xff, 0xff]);
    let (cards, data) = build_table(&hdu, &rows(vec![HCOMPRESS_4X4.to_vec(), corrupt]));
    let options = DecodeOptions {
        policy: TilePolicy::ZeroFill,
        ..DecodeOptions::default()
    };
    let out = decompress(&cards, &data, &options).unwrap();
    assert_eq!(out.failures.len(), 1);
    assert_eq!(out.failures[0].index, 1);
    assert!(matches!(out.failures[0].error, Error::TileGeometry(_)));

    let pixels = samples(&out.pixels.bytes, 2);
    assert_eq!(&pixels[..16], &HCOMPRESS_4X4_PIXELS[..]);
    assert!(pixels[16..].iter().all(|&v| v == 0));
}

// ===========================================================================
// Quantized floats
// ===========================================================================

#[test]
fn quantized_floats_without_dither() {
    let ints: Vec<i64> = vec![0, 1, 2, -4, -999, 7];
    let hdu = CompressedHdu::new("RICE_1", -32, &[6, 2], &[])
        .with("ZQUANTIZ", Value::String("NO_DITHER".into()));
    let mut first = Row::new(rice_compress(&ints, 32, 4)).scaled(0.5, 10.0);
    first.blank = Some(-999);
    let second = Row::new(rice_compress(&ints, 32, 4)).scaled(2.0, 0.0);
    let out = decode(&hdu, &[first, second]).unwrap();

    assert_eq!(out.pixels.depth, BitDepth::F32);
    assert_eq!(out.pixels.get(0), Some(10.0));
    assert_eq!(out.pixels.get(3), Some(8.0));
    assert!(out.pixels.get(4).unwrap().is_nan());
    assert_eq!(out.pixels.get(5), Some(13.5));
    assert_eq!(out.pixels.get(8), Some(4.0));
    // The second row has a zero ZBLANK cell, so -999 is an ordinary value.
    assert_eq!(out.pixels.get(10), Some(-1998.0));
}

#[test]
fn subtractive_dither_uses_tile_seed() {
    let ints: Vec<i64> = vec![10, 20, 30, 40];
    let (scale, zero) = (0.25, -3.0);
    let hdu = CompressedHdu::new("RICE_1", -64, &[4, 2], &[])
        .with("ZQUANTIZ", Value::String("SUBTRACTIVE_DITHER_1".into()))
        .with("ZDITHER0", Value::Integer(5));
    let row = Row::new(rice_compress(&ints, 32, 4)).scaled(scale, zero);
    let out = decode(&hdu, &[row.clone(), row]).unwrap();

    let random = random_sequence();
    for tile in 0..2usize {
        let iseed = (tile + 5 - 1) % random.len();
        let start = (random[iseed] * 500.0) as usize;
        for (k, &i) in ints.iter().enumerate() {
            let expected = (i as f64 - random[start + k] as f64 + 0.5) * scale + zero;
            assert_eq!(out.pixels.get(tile * 4 + k), Some(expected));
        }
    }
}

// ===========================================================================
// Fallback payload columns
// ===========================================================================

#[test]
fn fallback_columns_hold_raw_pixels() {
    let first: Vec<i64> = vec![5, 6, 7, 8];
    let second: Vec<i16> = vec![-1, -2, -3, -4];
    let third: Vec<i16> = vec![300, 301, 302, 303];
    let hdu = CompressedHdu::new("RICE_1", 16, &[4, 3], &[]);
    let rows = vec![
        Row::new(rice_compress(&first, 32, 2)),
        Row {
            uncompressed: Some(be_i16(&second)),
            ..Row::default()
        },
        Row {
            gzip: Some(gzip(&be_i16(&third))),
            ..Row::default()
        },
    ];
    let out = decode(&hdu, &rows).unwrap();
    assert_eq!(
        samples(&out.pixels.bytes, 2),
        vec![5, 6, 7, 8, -1, -2, -3, -4, 300, 301, 302, 303]
    );
}

#[test]
fn gzip_fallback_skips_quantization() {
    let ints: Vec<i64> = vec![1, 2, 3];
    let raw = [1.5f32, -2.25, 1e6];
    let hdu = CompressedHdu::new("RICE_1", -32, &[3, 2], &[]);
    let rows = vec![
        Row::new(rice_compress(&ints, 32, 4)).scaled(0.5, 0.0),
        Row {
            gzip: Some(gzip(&be_f32(&raw))),
            scale: Some((0.5, 0.0)),
            ..Row::default()
        },
    ];
    let out = decode(&hdu, &rows).unwrap();
    let values: Vec<f64> = (0..6).map(|i| out.pixels.get(i).unwrap()).collect();
    assert_eq!(values, vec![0.5, 1.0, 1.5, 1.5, -2.25, 1e6]);
}

// ===========================================================================
// Lupton rescaling
// ===========================================================================

#[test]
fn lupton_images_become_float() {
    let hdu = CompressedHdu::new("NOCOMPRESS", 16, &[3], &[])
        .with("BSOFTEN", Value::Float(1.0))
        .with("BOFFSET", Value::Float(0.0))
        .with("BZERO", Value::Float(0.0))
        .with("BSCALE", Value::Float(1.0))
        .with("BLANK", Value::Integer(-32768));
    let (cards, data) = build_table(&hdu, &rows(vec![be_i16(&[0, -32768, 100])]));
    let options = DecodeOptions {
        header: true,
        ..DecodeOptions::default()
    };
    let out = decompress(&cards, &data, &options).unwrap();

    assert_eq!(out.pixels.depth, BitDepth::F32);
    assert_eq!(out.pixels.get(0), Some(0.0));
    assert!(out.pixels.get(1).unwrap().is_nan());
    let lupton = LuptonParameters::from_cards(&cards).unwrap();
    assert_eq!(out.pixels.get(2), Some(lupton.apply(100.0) as f64));

    let header = out.header.unwrap();
    assert_eq!(card_integer_value(&header, "BITPIX"), Some(-32));
    for gone in ["BSOFTEN", "BOFFSET", "BSCALE", "BZERO", "BLANK"] {
        assert!(header.iter().all(|c| c.keyword_str() != gone), "{gone}");
    }
}

// ===========================================================================
// Header synthesis
// ===========================================================================

#[test]
fn plain_image_header() {
    let hdu = CompressedHdu::new("GZIP_1", 16, &[2, 2], &[])
        .with("OBJECT", Value::String("NGC 1300".into()))
        .with("ZEXTEND", Value::Logical(true))
        .with("ZQUANTIZ", Value::String("NO_DITHER".into()));
    let tiles = split_tiles(&be_i16(&[1, 2, 3, 4]), 2, 2, 2, 2, 1);
    let (cards, data) = build_table(&hdu, &rows(tiles.iter().map(|t| gzip(t)).collect()));
    let options = DecodeOptions {
        header: true,
        ..DecodeOptions::default()
    };
    let header = decompress(&cards, &data, &options).unwrap().header.unwrap();
    let keywords: Vec<&str> = header.iter().map(|c| c.keyword_str()).collect();

    assert_eq!(&keywords[..5], &["SIMPLE", "BITPIX", "NAXIS", "NAXIS1", "NAXIS2"]);
    assert_eq!(card_integer_value(&header, "BITPIX"), Some(16));
    assert_eq!(card_integer_value(&header, "NAXIS2"), Some(2));
    assert!(keywords.contains(&"OBJECT"));
    assert!(keywords.contains(&"EXTEND"));
    for gone in ["ZCMPTYPE", "ZIMAGE", "TTYPE1", "TFORM1", "ZTILE1", "XTENSION", "PCOUNT"] {
        assert!(!keywords.contains(&gone), "{gone}");
    }
}

// ===========================================================================
// Failure handling
// ===========================================================================

fn image_with_broken_tile() -> (CompressedHdu, Vec<Row>) {
    let hdu = CompressedHdu::new("RICE_1", 16, &[10, 4], &[]);
    let mut payloads: Vec<Vec<u8>> = (0..4)
        .map(|row| rice_compress(&vec![row + 1; 10], 32, 2))
        .collect();
    payloads[2] = vec![0, 3];
    (hdu, rows(payloads))
}

#[test]
fn abort_reports_the_failing_tile() {
    let (hdu, rows) = image_with_broken_tile();
    let err = decode(&hdu, &rows).unwrap_err();
    match err {
        Error::Tile {
            index,
            row,
            col,
            source,
        } => {
            assert_eq!((index, row, col), (2, 2, 0));
            assert!(matches!(*source, Error::TruncatedStream));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn zero_fill_keeps_going() {
    let (hdu, rows) = image_with_broken_tile();
    let (cards, data) = build_table(&hdu, &rows);
    for parallel in [false, true] {
        let options = DecodeOptions {
            policy: TilePolicy::ZeroFill,
            parallel,
            ..DecodeOptions::default()
        };
        let out = decompress(&cards, &data, &options).unwrap();
        assert_eq!(out.failures.len(), 1);
        assert_eq!(out.failures[0].index, 2);
        assert!(matches!(out.failures[0].error, Error::TruncatedStream));

        let pixels = samples(&out.pixels.bytes, 2);
        assert_eq!(pixels.len(), 40);
        assert!(pixels[..10].iter().all(|&v| v == 1));
        assert!(pixels[10..20].iter().all(|&v| v == 2));
        assert!(pixels[20..30].iter().all(|&v| v == 0));
        assert!(pixels[30..].iter().all(|&v| v == 4));
    }
}

#[test]
fn plio_is_rejected() {
    let hdu = CompressedHdu::new("PLIO_1", 16, &[4], &[]);
    let err = decode(&hdu, &rows(vec![vec![0; 8]])).unwrap_err();
    assert!(matches!(err, Error::UnsupportedAlgorithm(ref name) if name == "PLIO_1"));
}

#[test]
fn short_table_data_is_an_error() {
    let hdu = CompressedHdu::new("NOCOMPRESS", 8, &[4, 2], &[]);
    let (cards, data) = build_table(&hdu, &rows(vec![vec![1; 4], vec![2; 4]]));
    let err = decompress(&cards, &data[..10], &DecodeOptions::default()).unwrap_err();
    assert!(matches!(err, Error::UnexpectedEof));
}

// ===========================================================================
// Single tiles and parallel assembly
// ===========================================================================

#[test]
fn decode_single_tile() {
    let values: Vec<i32> = (0..100).collect();
    let image = be_i32(&values);
    let tiles = split_tiles(&image, 4, 10, 10, 4, 4);
    let hdu = CompressedHdu::new("GZIP_1", 32, &[10, 10], &[4, 4]);
    let (cards, data) = build_table(&hdu, &rows(tiles.iter().map(|t| zlib(t)).collect()));
    let decoder = TileDecoder::new(&cards, &data).unwrap();

    let corner = decoder.decode_tile(8).unwrap();
    assert_eq!(corner.axes, vec![2, 2]);
    assert_eq!(samples(&corner.bytes, 4), vec![88, 89, 98, 99]);

    let rect = decoder.rect(5).unwrap();
    assert_eq!((rect.row, rect.col, rect.x, rect.y), (1, 2, 8, 4));
    assert_eq!((rect.width, rect.height), (2, 4));
    assert!(decoder.rect(9).is_err());
}

#[test]
fn sequential_and_parallel_agree() {
    let values: Vec<i64> = (0..33 * 17).map(|i| (i * 7) % 301 - 150).collect();
    let image: Vec<u8> = values.iter().flat_map(|&v| (v as i16).to_be_bytes()).collect();
    let payloads = split_tiles(&image, 2, 33, 17, 8, 5)
        .iter()
        .map(|t| rice_compress(&samples(t, 2), 32, 2))
        .collect();
    let hdu = CompressedHdu::new("RICE_1", 16, &[33, 17], &[8, 5]);
    let (cards, data) = build_table(&hdu, &rows(payloads));

    let sequential = DecodeOptions {
        parallel: false,
        ..DecodeOptions::default()
    };
    let a = decompress(&cards, &data, &sequential).unwrap();
    let b = decompress(&cards, &data, &DecodeOptions::default()).unwrap();
    assert_eq!(a.pixels, b.pixels);
    assert_eq!(a.pixels.bytes, image);
}

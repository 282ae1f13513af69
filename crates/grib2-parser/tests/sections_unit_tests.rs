//! Unit tests for GRIB2 section parsing functions.
//!
//! These tests work on hand-made byte slices and builder output; no data
//! files are needed.

use grib2_parser::sections::{
    decode_grib2_signed, parse_bitmap, parse_indicator, parse_product_definition, split_sections,
};
use grib2_parser::{Grib2Error, GridTemplate};
use test_utils::grib2::{encode_grib2_signed, encode_grib2_signed16};
use test_utils::Grib2Builder;

// ============================================================================
// decode_grib2_signed tests
// ============================================================================

#[test]
fn test_decode_grib2_signed_positive() {
    assert_eq!(decode_grib2_signed(&[0x00, 0x00, 0x00, 0x01]), 1);
    assert_eq!(decode_grib2_signed(&[0x00, 0x00, 0x03, 0xE8]), 1000);
    assert_eq!(decode_grib2_signed(&90_000_000_u32.to_be_bytes()), 90_000_000);
}

#[test]
fn test_decode_grib2_signed_negative() {
    // Sign-magnitude: MSB=1 means negative
    assert_eq!(decode_grib2_signed(&[0x80, 0x00, 0x00, 0x01]), -1);
    assert_eq!(decode_grib2_signed(&(90_000_000_u32 | 0x8000_0000).to_be_bytes()), -90_000_000);

    // Two's complement -1 is a large negative magnitude here
    assert_eq!(decode_grib2_signed(&[0xFF, 0xFF, 0xFF, 0xFF]), -2147483647);
}

#[test]
fn test_decode_grib2_signed_negative_zero() {
    assert_eq!(decode_grib2_signed(&[0x80, 0x00, 0x00, 0x00]), 0);
}

#[test]
fn test_decode_grib2_signed_short_widths() {
    // Scale factors are one or two octets wide
    assert_eq!(decode_grib2_signed(&[0x81]), -1);
    assert_eq!(decode_grib2_signed(&[0x05]), 5);
    assert_eq!(decode_grib2_signed(&[0x80, 0x0A]), -10);
    assert_eq!(decode_grib2_signed(&[0x00, 0x0A]), 10);
}

#[test]
fn test_decode_grib2_signed_wrong_length() {
    assert_eq!(decode_grib2_signed(&[]), 0);
    assert_eq!(decode_grib2_signed(&[0x00, 0x00, 0x00, 0x00, 0x01]), 0);
}

#[test]
fn test_decode_matches_builder_encoding() {
    for value in [-180_000_000, -45_000_000, -1, 0, 1, 21_138_123, 359_750_000] {
        assert_eq!(decode_grib2_signed(&encode_grib2_signed(value)), value);
    }
    for value in [-12i16, 0, 7] {
        assert_eq!(decode_grib2_signed(&encode_grib2_signed16(value)), value as i32);
    }
}

// ============================================================================
// Section walking
// ============================================================================

#[test]
fn test_parse_indicator_rejects_edition_1() {
    let mut data = Grib2Builder::new_gfs().build();
    data[7] = 1;
    assert!(matches!(parse_indicator(&data), Err(Grib2Error::InvalidFormat(_))));
}

#[test]
fn test_parse_indicator_rejects_bad_magic() {
    let data = [0u8; 16];
    assert!(parse_indicator(&data).is_err());
}

#[test]
fn test_split_sections_numbers() {
    let data = Grib2Builder::new_gfs().build();
    let numbers: Vec<u8> = split_sections(&data).unwrap().iter().map(|(n, _)| *n).collect();
    assert_eq!(numbers, vec![1, 3, 4, 5, 6, 7]);
}

#[test]
fn test_split_sections_truncated() {
    let data = Grib2Builder::new_gfs().build();
    let truncated = &data[..data.len() - 4];
    assert!(matches!(split_sections(truncated), Err(Grib2Error::InvalidFormat(_))));
}

#[test]
fn test_parse_bitmap_indicators() {
    assert!(parse_bitmap(&[0, 0, 0, 6, 6, 255]).unwrap().is_none());
    let bitmap = parse_bitmap(&[0, 0, 0, 7, 6, 0, 0b1010_0000]).unwrap().unwrap();
    assert_eq!(bitmap.data.as_ref(), &[0b1010_0000]);
    assert!(parse_bitmap(&[0, 0, 0, 6, 6, 254]).is_err());
}

#[test]
fn test_parse_product_definition_unsupported_template() {
    let data = Grib2Builder::new_gfs().build();
    let sections = split_sections(&data).unwrap();
    let (_, section4) = sections.iter().find(|(n, _)| *n == 4).unwrap();

    let mut patched = section4.to_vec();
    patched[8] = 15;
    assert!(matches!(
        parse_product_definition(&patched),
        Err(Grib2Error::UnsupportedTemplate { section: 4, template: 15 })
    ));
}

#[test]
fn test_lambert_template_fields() {
    let data = Grib2Builder::new_lambert(4, 3, 3000.0).build();
    let sections = split_sections(&data).unwrap();
    let (_, section3) = sections.iter().find(|(n, _)| *n == 3).unwrap();
    let grid = grib2_parser::sections::parse_grid_definition(section3).unwrap();

    assert_eq!(grid.template_number, 30);
    assert_eq!(grid.earth_shape, 6);
    match grid.template {
        GridTemplate::LambertConformal(lc) => {
            assert_eq!((lc.nx, lc.ny), (4, 3));
            assert!((lc.lov - 262.5).abs() < 1e-6);
            assert!((lc.latin1 - 38.5).abs() < 1e-6);
            assert!((lc.dx - 3000.0).abs() < 1e-9);
            assert!((lc.la1 - 21.138123).abs() < 1e-6);
        }
        other => panic!("expected Lambert grid, got {:?}", other),
    }
}

//! GRIB2 section parsing.
//!
//! A GRIB2 message is an indicator (section 0) followed by length-prefixed
//! sections 1 to 7 and the `7777` end marker. [`split_sections`] walks the
//! section chain once; the `parse_*` functions decode individual sections
//! from the slices it returns.

use bytes::Bytes;
use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::error::Grib2Error;
use crate::grid::ScanMode;

/// Section 0: Indicator Section (16 bytes)
#[derive(Debug, Clone)]
pub struct Indicator {
    pub discipline: u8,
    pub edition: u8,
    pub message_length: u64,
}

/// Section 1: Identification Section
#[derive(Debug, Clone)]
pub struct Identification {
    pub center: u16,
    pub sub_center: u16,
    pub table_version: u8,
    pub local_table_version: u8,
    pub significance_of_reference_time: u8,
    pub reference_time: DateTime<Utc>,
    pub production_status: u8,
    pub data_type: u8,
}

/// Template 3.0: regular latitude/longitude grid, in degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct LatLonGrid {
    pub ni: u32,
    pub nj: u32,
    pub la1: f64,
    pub lo1: f64,
    pub la2: f64,
    pub lo2: f64,
    pub di: f64,
    pub dj: f64,
    pub scanning_mode: u8,
}

/// Template 3.30: Lambert conformal grid.
#[derive(Debug, Clone, PartialEq)]
pub struct LambertGrid {
    pub nx: u32,
    pub ny: u32,
    /// First grid point, degrees
    pub la1: f64,
    pub lo1: f64,
    /// Latitude where dx/dy are specified
    pub lad: f64,
    /// Orientation (central meridian)
    pub lov: f64,
    /// Grid spacing in meters
    pub dx: f64,
    pub dy: f64,
    pub projection_centre: u8,
    pub scanning_mode: u8,
    pub latin1: f64,
    pub latin2: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GridTemplate {
    LatLon(LatLonGrid),
    LambertConformal(LambertGrid),
}

/// Section 3: Grid Definition Section
#[derive(Debug, Clone, PartialEq)]
pub struct GridDefinition {
    pub num_data_points: u32,
    pub template_number: u16,
    /// Shape of the earth (Code Table 3.2)
    pub earth_shape: u8,
    pub template: GridTemplate,
}

impl GridDefinition {
    /// Points along a row and number of rows: `(ni, nj)`.
    pub fn dims(&self) -> (usize, usize) {
        match &self.template {
            GridTemplate::LatLon(g) => (g.ni as usize, g.nj as usize),
            GridTemplate::LambertConformal(g) => (g.nx as usize, g.ny as usize),
        }
    }

    pub fn scan_mode(&self) -> ScanMode {
        let flag = match &self.template {
            GridTemplate::LatLon(g) => g.scanning_mode,
            GridTemplate::LambertConformal(g) => g.scanning_mode,
        };
        ScanMode::from_grib2_flag(flag)
    }
}

/// Section 4: Product Definition Section (templates 4.0 and 4.8)
#[derive(Debug, Clone)]
pub struct ProductDefinition {
    pub template_number: u16,
    pub parameter_category: u8,
    pub parameter_number: u8,
    pub generating_process: u8,
    /// Indicator of unit of time range (Code Table 4.4)
    pub time_unit: u8,
    pub forecast_time: u32,
    pub level_type: u8,
    pub level_scale_factor: i32,
    pub level_scaled_value: i64,
}

impl ProductDefinition {
    /// First fixed surface value with the scale factor applied.
    pub fn level_value(&self) -> f64 {
        if self.level_scale_factor == 0 {
            self.level_scaled_value as f64
        } else {
            self.level_scaled_value as f64 / 10f64.powi(self.level_scale_factor)
        }
    }

    /// Forecast offset from the reference time, if the time unit is known.
    pub fn forecast_offset(&self) -> Option<Duration> {
        let unit_seconds: i64 = match self.time_unit {
            0 => 60,
            1 => 3_600,
            2 => 86_400,
            10 => 3 * 3_600,
            11 => 6 * 3_600,
            12 => 12 * 3_600,
            13 => 1,
            _ => return None,
        };
        Some(Duration::seconds(unit_seconds * self.forecast_time as i64))
    }
}

/// Section 5: Data Representation Section
#[derive(Debug, Clone)]
pub struct DataRepresentation {
    pub num_data_points: u32,
    pub template_number: u16,
    pub reference_value: f32,
    pub binary_scale_factor: i16,
    pub decimal_scale_factor: i16,
    pub bits_per_value: u8,
    pub original_data_type: u8,
}

/// Section 6: Bitmap Section
#[derive(Debug, Clone)]
pub struct Bitmap {
    pub indicator: u8,
    pub data: Bytes,
}

/// Section 7: Data Section
#[derive(Debug, Clone)]
pub struct DataSection {
    pub data: Bytes,
}

// ===== Section walking =====

/// Split a message into `(section number, section bytes)` pairs, excluding
/// section 0 and the end marker.
pub fn split_sections(message: &[u8]) -> Result<Vec<(u8, &[u8])>, Grib2Error> {
    let mut sections = Vec::new();
    let mut offset = 16;

    loop {
        if offset + 4 > message.len() {
            return Err(Grib2Error::InvalidFormat(
                "message ends without the 7777 marker".to_string(),
            ));
        }
        if &message[offset..offset + 4] == b"7777" {
            return Ok(sections);
        }
        if offset + 5 > message.len() {
            return Err(Grib2Error::InvalidFormat("truncated section header".to_string()));
        }

        let length = read_u32(&message[offset..]) as usize;
        let number = message[offset + 4];
        if length < 5 || offset + length > message.len() {
            return Err(Grib2Error::section(
                number,
                format!("invalid section length {}", length),
            ));
        }

        sections.push((number, &message[offset..offset + length]));
        offset += length;
    }
}

// ===== Parsing Functions =====

/// Parse Section 0 (Indicator) from start of message
pub fn parse_indicator(data: &[u8]) -> Result<Indicator, Grib2Error> {
    if data.len() < 16 {
        return Err(Grib2Error::InvalidFormat(
            "Not enough data for indicator section".to_string(),
        ));
    }
    if &data[0..4] != b"GRIB" {
        return Err(Grib2Error::InvalidFormat(
            "Invalid GRIB magic bytes".to_string(),
        ));
    }

    // Octets 5-6 reserved, 7 discipline, 8 edition, 9-16 total length
    let discipline = data[6];
    let edition = data[7];
    if edition != 2 {
        return Err(Grib2Error::InvalidFormat(format!(
            "Expected GRIB edition 2, got {}",
            edition
        )));
    }

    let mut length = [0u8; 8];
    length.copy_from_slice(&data[8..16]);

    Ok(Indicator {
        discipline,
        edition,
        message_length: u64::from_be_bytes(length),
    })
}

/// Parse Section 1 (Identification)
pub fn parse_identification(section: &[u8]) -> Result<Identification, Grib2Error> {
    if section.len() < 21 {
        return Err(Grib2Error::section(1, "Not enough data"));
    }

    let sec_data = &section[5..];
    let center = u16::from_be_bytes([sec_data[0], sec_data[1]]);
    let sub_center = u16::from_be_bytes([sec_data[2], sec_data[3]]);

    let year = u16::from_be_bytes([sec_data[7], sec_data[8]]);
    let (month, day, hour, minute, second) =
        (sec_data[9], sec_data[10], sec_data[11], sec_data[12], sec_data[13]);

    let reference_time = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .and_then(|date| date.and_hms_opt(hour as u32, minute as u32, second as u32))
        .ok_or_else(|| {
            Grib2Error::section(
                1,
                format!(
                    "Invalid date: {}-{:02}-{:02} {:02}:{:02}:{:02}",
                    year, month, day, hour, minute, second
                ),
            )
        })?;

    Ok(Identification {
        center,
        sub_center,
        table_version: sec_data[4],
        local_table_version: sec_data[5],
        significance_of_reference_time: sec_data[6],
        reference_time: DateTime::<Utc>::from_naive_utc_and_offset(reference_time, Utc),
        production_status: sec_data.get(14).copied().unwrap_or(0),
        data_type: sec_data.get(15).copied().unwrap_or(0),
    })
}

/// Parse Section 3 (Grid Definition)
pub fn parse_grid_definition(section: &[u8]) -> Result<GridDefinition, Grib2Error> {
    if section.len() < 15 {
        return Err(Grib2Error::section(3, "Not enough data"));
    }

    // Bytes 6-9: number of data points, 12-13: template number, 14+: template
    let num_data_points = read_u32(&section[6..]);
    let template_number = u16::from_be_bytes([section[12], section[13]]);
    let gd = &section[14..];

    let template = match template_number {
        0 => {
            require_len(gd, 58, template_number)?;
            GridTemplate::LatLon(LatLonGrid {
                ni: read_u32(&gd[16..]),
                nj: read_u32(&gd[20..]),
                la1: micro_degrees(&gd[32..]),
                lo1: micro_degrees(&gd[36..]),
                la2: micro_degrees(&gd[41..]),
                lo2: micro_degrees(&gd[45..]),
                di: read_u32(&gd[49..]) as f64 * 1e-6,
                dj: read_u32(&gd[53..]) as f64 * 1e-6,
                scanning_mode: gd[57],
            })
        }
        30 => {
            require_len(gd, 59, template_number)?;
            GridTemplate::LambertConformal(LambertGrid {
                nx: read_u32(&gd[16..]),
                ny: read_u32(&gd[20..]),
                la1: micro_degrees(&gd[24..]),
                lo1: micro_degrees(&gd[28..]),
                lad: micro_degrees(&gd[33..]),
                lov: micro_degrees(&gd[37..]),
                // Millimetres on the wire
                dx: read_u32(&gd[41..]) as f64 / 1000.0,
                dy: read_u32(&gd[45..]) as f64 / 1000.0,
                projection_centre: gd[49],
                scanning_mode: gd[50],
                latin1: micro_degrees(&gd[51..]),
                latin2: micro_degrees(&gd[55..]),
            })
        }
        other => {
            return Err(Grib2Error::UnsupportedTemplate {
                section: 3,
                template: other,
            })
        }
    };

    let definition = GridDefinition {
        num_data_points,
        template_number,
        earth_shape: gd[0],
        template,
    };

    let (ni, nj) = definition.dims();
    if ni * nj != num_data_points as usize {
        return Err(Grib2Error::section(
            3,
            format!("{} x {} grid declares {} points", ni, nj, num_data_points),
        ));
    }
    Ok(definition)
}

/// Parse Section 4 (Product Definition)
pub fn parse_product_definition(section: &[u8]) -> Result<ProductDefinition, Grib2Error> {
    if section.len() < 34 {
        return Err(Grib2Error::section(4, "Not enough data"));
    }

    let template_number = u16::from_be_bytes([section[7], section[8]]);
    if !matches!(template_number, 0 | 8) {
        return Err(Grib2Error::UnsupportedTemplate {
            section: 4,
            template: template_number,
        });
    }

    Ok(ProductDefinition {
        template_number,
        parameter_category: section[9],
        parameter_number: section[10],
        generating_process: section[11],
        time_unit: section[17],
        forecast_time: read_u32(&section[18..]),
        level_type: section[22],
        level_scale_factor: decode_grib2_signed(&section[23..24]) as i32,
        level_scaled_value: decode_grib2_signed(&section[24..28]) as i64,
    })
}

/// Parse Section 5 (Data Representation)
pub fn parse_data_representation(section: &[u8]) -> Result<DataRepresentation, Grib2Error> {
    if section.len() < 21 {
        return Err(Grib2Error::section(5, "Not enough data"));
    }

    // Template 5.0 layout from byte 11: R (f32), E (i16), D (i16), bits, type
    let template = &section[11..];
    Ok(DataRepresentation {
        num_data_points: read_u32(&section[5..]),
        template_number: u16::from_be_bytes([section[9], section[10]]),
        reference_value: f32::from_be_bytes([template[0], template[1], template[2], template[3]]),
        binary_scale_factor: decode_grib2_signed(&template[4..6]) as i16,
        decimal_scale_factor: decode_grib2_signed(&template[6..8]) as i16,
        bits_per_value: template[8],
        original_data_type: template[9],
    })
}

/// Parse Section 6 (Bitmap). Returns `None` when no bitmap applies.
pub fn parse_bitmap(section: &[u8]) -> Result<Option<Bitmap>, Grib2Error> {
    if section.len() < 6 {
        return Err(Grib2Error::section(6, "Not enough data"));
    }

    match section[5] {
        255 => Ok(None),
        0 => Ok(Some(Bitmap {
            indicator: 0,
            data: Bytes::copy_from_slice(&section[6..]),
        })),
        other => Err(Grib2Error::section(
            6,
            format!("bitmap indicator {} is not supported", other),
        )),
    }
}

/// Parse Section 7 (Data)
pub fn parse_data_section(section: &[u8]) -> Result<DataSection, Grib2Error> {
    if section.len() < 5 {
        return Err(Grib2Error::section(7, "Not enough data"));
    }
    Ok(DataSection {
        data: Bytes::copy_from_slice(&section[5..]),
    })
}

// ===== Helper Functions =====

/// Decode a GRIB2 sign-magnitude integer of 1 to 4 bytes.
///
/// The most significant bit is the sign; the rest is the magnitude.
/// Returns 0 for an empty or oversized slice.
pub fn decode_grib2_signed(bytes: &[u8]) -> i32 {
    if bytes.is_empty() || bytes.len() > 4 {
        return 0;
    }
    let raw = bytes.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32);
    let sign_bit = 1u32 << (bytes.len() * 8 - 1);
    let magnitude = (raw & !sign_bit) as i32;
    if raw & sign_bit != 0 {
        -magnitude
    } else {
        magnitude
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn micro_degrees(bytes: &[u8]) -> f64 {
    decode_grib2_signed(&bytes[..4]) as f64 * 1e-6
}

fn require_len(gd: &[u8], len: usize, template: u16) -> Result<(), Grib2Error> {
    if gd.len() < len {
        return Err(Grib2Error::section(
            3,
            format!("Template {} needs at least {} bytes, got {}", template, len, gd.len()),
        ));
    }
    Ok(())
}

//! Synthetic GRIB2 message builder.
//!
//! Produces structurally valid GRIB2 messages (sections 0-8) with simple
//! 16-bit packing. NaN values are encoded through a bitmap.

use std::path::Path;

/// Grid definition written into section 3.
#[derive(Debug, Clone)]
enum BuilderGrid {
    /// Template 3.0, values in microdegrees
    LatLon {
        ni: u32,
        nj: u32,
        la1: i32,
        lo1: i32,
        di: u32,
        dj: u32,
    },
    /// Template 3.30
    Lambert {
        nx: u32,
        ny: u32,
        la1: i32,
        lo1: i32,
        lov: i32,
        latin1: i32,
        latin2: i32,
        /// Millimetres
        dx: u32,
        dy: u32,
    },
}

impl BuilderGrid {
    fn dims(&self) -> (u32, u32) {
        match self {
            BuilderGrid::LatLon { ni, nj, .. } => (*ni, *nj),
            BuilderGrid::Lambert { nx, ny, .. } => (*nx, *ny),
        }
    }
}

/// Build a GRIB2 message with the specified parameters
#[derive(Debug, Clone)]
pub struct Grib2Builder {
    discipline: u8,
    center: u16,
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    grid: BuilderGrid,
    scanning_mode: u8,
    param_category: u8,
    param_number: u8,
    level_type: u8,
    level_value: u32,
    time_unit: u8,
    forecast_time: u32,
    data_values: Vec<f32>,
}

impl Grib2Builder {
    /// 10 x 10 one-degree lat/lon grid over the western US, 2 m temperature.
    pub fn new_gfs() -> Self {
        Self::new_latlon(10, 10, 45.0, 230.0, 1.0, 1.0)
    }

    /// Regular lat/lon grid whose first point is the north-west corner;
    /// rows run south, points run east.
    pub fn new_latlon(ni: u32, nj: u32, la1: f64, lo1: f64, di: f64, dj: f64) -> Self {
        Self {
            discipline: 0,
            center: 7,
            year: 2024,
            month: 6,
            day: 1,
            hour: 0,
            grid: BuilderGrid::LatLon {
                ni,
                nj,
                la1: to_micro(la1),
                lo1: to_micro(lo1),
                di: to_micro(di) as u32,
                dj: to_micro(dj) as u32,
            },
            scanning_mode: 0b0000_0000,
            param_category: 0,
            param_number: 0,
            level_type: 103,
            level_value: 2,
            time_unit: 1,
            forecast_time: 0,
            data_values: vec![288.15; (ni * nj) as usize],
        }
    }

    /// Lambert conformal grid shaped like a coarse HRRR (tangent at 38.5°N,
    /// LoV 262.5°E), first point at the south-west corner, rows run north.
    pub fn new_lambert(nx: u32, ny: u32, dx_m: f64) -> Self {
        let mut builder = Self::new_gfs();
        builder.grid = BuilderGrid::Lambert {
            nx,
            ny,
            la1: to_micro(21.138123),
            lo1: to_micro(237.280472),
            lov: to_micro(262.5),
            latin1: to_micro(38.5),
            latin2: to_micro(38.5),
            dx: (dx_m * 1000.0).round() as u32,
            dy: (dx_m * 1000.0).round() as u32,
        };
        builder.scanning_mode = 0b0100_0000;
        builder.data_values = vec![288.15; (nx * ny) as usize];
        builder
    }

    pub fn with_reference_time(mut self, year: u16, month: u8, day: u8, hour: u8) -> Self {
        self.year = year;
        self.month = month;
        self.day = day;
        self.hour = hour;
        self
    }

    pub fn with_center(mut self, center: u16) -> Self {
        self.center = center;
        self
    }

    pub fn with_parameter(mut self, discipline: u8, category: u8, number: u8) -> Self {
        self.discipline = discipline;
        self.param_category = category;
        self.param_number = number;
        self
    }

    pub fn with_level(mut self, level_type: u8, level_value: u32) -> Self {
        self.level_type = level_type;
        self.level_value = level_value;
        self
    }

    pub fn with_forecast_hour(mut self, hour: u32) -> Self {
        self.time_unit = 1;
        self.forecast_time = hour;
        self
    }

    /// Forecast time with an explicit Code Table 4.4 unit.
    pub fn with_forecast_time(mut self, unit: u8, value: u32) -> Self {
        self.time_unit = unit;
        self.forecast_time = value;
        self
    }

    pub fn with_scanning_mode(mut self, flag: u8) -> Self {
        self.scanning_mode = flag;
        self
    }

    pub fn with_constant_value(mut self, value: f32) -> Self {
        let (ni, nj) = self.grid.dims();
        self.data_values = vec![value; (ni * nj) as usize];
        self
    }

    pub fn with_gradient(mut self, min_val: f32, max_val: f32) -> Self {
        let (ni, nj) = self.grid.dims();
        let n = (ni * nj) as usize;
        self.data_values = (0..n)
            .map(|i| min_val + (max_val - min_val) * (i as f32 / n as f32))
            .collect();
        self
    }

    /// Values in storage order; NaN marks missing points.
    pub fn with_data(mut self, data: Vec<f32>) -> Self {
        self.data_values = data;
        self
    }

    /// Build the complete GRIB2 message bytes
    pub fn build(&self) -> Vec<u8> {
        let sections = [
            self.build_section1(),
            self.build_section3(),
            self.build_section4(),
            self.build_section5(),
            self.build_section6(),
            self.build_section7(),
        ];
        let message_length = 16 + sections.iter().map(Vec::len).sum::<usize>() + 4;

        let mut message = Vec::with_capacity(message_length);
        message.extend_from_slice(b"GRIB");
        message.extend_from_slice(&[0, 0]);
        message.push(self.discipline);
        message.push(2);
        message.extend_from_slice(&(message_length as u64).to_be_bytes());
        for section in &sections {
            message.extend_from_slice(section);
        }
        message.extend_from_slice(b"7777");
        message
    }

    fn build_section1(&self) -> Vec<u8> {
        let mut section = Vec::with_capacity(21);
        section.extend_from_slice(&21u32.to_be_bytes());
        section.push(1);
        section.extend_from_slice(&self.center.to_be_bytes());
        section.extend_from_slice(&0u16.to_be_bytes()); // Sub-center
        section.push(2); // Master table version
        section.push(1); // Local table version
        section.push(1); // Significance of reference time (start of forecast)
        section.extend_from_slice(&self.year.to_be_bytes());
        section.push(self.month);
        section.push(self.day);
        section.push(self.hour);
        section.push(0); // Minute
        section.push(0); // Second
        section.push(0); // Production status (operational)
        section.push(1); // Type of data (forecast)
        section
    }

    fn build_section3(&self) -> Vec<u8> {
        let (ni, nj) = self.grid.dims();
        let (template, body) = match &self.grid {
            BuilderGrid::LatLon {
                la1, lo1, di, dj, ..
            } => {
                // Last point follows from the scan direction.
                let i_sign = if self.scanning_mode & 0x80 != 0 { -1 } else { 1 };
                let j_sign = if self.scanning_mode & 0x40 != 0 { 1 } else { -1 };
                let la2 = la1 + j_sign * (nj as i32 - 1) * *dj as i32;
                let lo2 = lo1 + i_sign * (ni as i32 - 1) * *di as i32;

                let mut gd = earth_shape();
                gd.extend_from_slice(&ni.to_be_bytes());
                gd.extend_from_slice(&nj.to_be_bytes());
                gd.extend_from_slice(&0u32.to_be_bytes()); // Basic angle
                gd.extend_from_slice(&0xFFFF_FFFFu32.to_be_bytes()); // Subdivisions
                gd.extend_from_slice(&encode_grib2_signed(*la1));
                gd.extend_from_slice(&encode_grib2_signed(*lo1));
                gd.push(48); // Resolution and component flags
                gd.extend_from_slice(&encode_grib2_signed(la2));
                gd.extend_from_slice(&encode_grib2_signed(lo2));
                gd.extend_from_slice(&di.to_be_bytes());
                gd.extend_from_slice(&dj.to_be_bytes());
                gd.push(self.scanning_mode);
                (0u16, gd)
            }
            BuilderGrid::Lambert {
                la1,
                lo1,
                lov,
                latin1,
                latin2,
                dx,
                dy,
                ..
            } => {
                let mut gd = earth_shape();
                gd.extend_from_slice(&ni.to_be_bytes());
                gd.extend_from_slice(&nj.to_be_bytes());
                gd.extend_from_slice(&encode_grib2_signed(*la1));
                gd.extend_from_slice(&encode_grib2_signed(*lo1));
                gd.push(8); // Resolution and component flags
                gd.extend_from_slice(&encode_grib2_signed(*latin1)); // LaD
                gd.extend_from_slice(&encode_grib2_signed(*lov));
                gd.extend_from_slice(&dx.to_be_bytes());
                gd.extend_from_slice(&dy.to_be_bytes());
                gd.push(0); // Projection centre flag
                gd.push(self.scanning_mode);
                gd.extend_from_slice(&encode_grib2_signed(*latin1));
                gd.extend_from_slice(&encode_grib2_signed(*latin2));
                gd.extend_from_slice(&encode_grib2_signed(-90_000_000)); // South pole lat
                gd.extend_from_slice(&0u32.to_be_bytes()); // South pole lon
                (30u16, gd)
            }
        };

        let mut section = Vec::with_capacity(14 + body.len());
        section.extend_from_slice(&((14 + body.len()) as u32).to_be_bytes());
        section.push(3);
        section.push(0); // Source of grid definition
        section.extend_from_slice(&(ni * nj).to_be_bytes());
        section.push(0); // Octets for optional list
        section.push(0); // Interpretation of optional list
        section.extend_from_slice(&template.to_be_bytes());
        section.extend_from_slice(&body);
        section
    }

    fn build_section4(&self) -> Vec<u8> {
        let mut section = Vec::with_capacity(34);
        section.extend_from_slice(&34u32.to_be_bytes());
        section.push(4);
        section.extend_from_slice(&0u16.to_be_bytes()); // Number of coordinate values
        section.extend_from_slice(&0u16.to_be_bytes()); // Template 4.0
        section.push(self.param_category);
        section.push(self.param_number);
        section.push(2); // Type of generating process (forecast)
        section.push(0); // Background generating process
        section.push(0); // Analysis or forecast process
        section.extend_from_slice(&0u16.to_be_bytes()); // Hours of cutoff
        section.push(0); // Minutes of cutoff
        section.push(self.time_unit);
        section.extend_from_slice(&self.forecast_time.to_be_bytes());
        section.push(self.level_type);
        section.push(0); // Scale factor
        section.extend_from_slice(&self.level_value.to_be_bytes());
        section.push(255); // Type of second fixed surface (none)
        section.push(0);
        section.extend_from_slice(&0u32.to_be_bytes());
        section
    }

    fn build_section5(&self) -> Vec<u8> {
        let packing = self.packing();
        let mut section = Vec::with_capacity(21);
        section.extend_from_slice(&21u32.to_be_bytes());
        section.push(5);
        section.extend_from_slice(&(packing.present as u32).to_be_bytes());
        section.extend_from_slice(&0u16.to_be_bytes()); // Template 5.0
        section.extend_from_slice(&packing.reference.to_be_bytes());
        section.extend_from_slice(&encode_grib2_signed16(packing.binary_scale_factor));
        section.extend_from_slice(&encode_grib2_signed16(0)); // Decimal scale factor
        section.push(packing.bits_per_value);
        section.push(0); // Original field type (floating point)
        section
    }

    fn build_section6(&self) -> Vec<u8> {
        let has_missing = self.data_values.iter().any(|v| v.is_nan());
        if !has_missing {
            return vec![0, 0, 0, 6, 6, 255];
        }

        let mut bitmap = vec![0u8; self.data_values.len().div_ceil(8)];
        for (i, value) in self.data_values.iter().enumerate() {
            if !value.is_nan() {
                bitmap[i / 8] |= 1 << (7 - (i % 8));
            }
        }

        let mut section = Vec::with_capacity(6 + bitmap.len());
        section.extend_from_slice(&((6 + bitmap.len()) as u32).to_be_bytes());
        section.push(6);
        section.push(0); // Bitmap follows
        section.extend_from_slice(&bitmap);
        section
    }

    fn build_section7(&self) -> Vec<u8> {
        let packing = self.packing();
        let mut packed = Vec::new();
        if packing.bits_per_value > 0 {
            let scale = 2.0_f64.powi(packing.binary_scale_factor as i32);
            for &value in self.data_values.iter().filter(|v| !v.is_nan()) {
                let p = ((value as f64 - packing.reference as f64) / scale).round();
                packed.extend_from_slice(&(p.clamp(0.0, 65535.0) as u16).to_be_bytes());
            }
        }

        let mut section = Vec::with_capacity(5 + packed.len());
        section.extend_from_slice(&((5 + packed.len()) as u32).to_be_bytes());
        section.push(7);
        section.extend_from_slice(&packed);
        section
    }

    /// Reference value, E and bit width for 16-bit simple packing.
    fn packing(&self) -> Packing {
        let present: Vec<f32> = self.data_values.iter().copied().filter(|v| !v.is_nan()).collect();
        let (min_val, max_val) = present.iter().fold(
            (f32::INFINITY, f32::NEG_INFINITY),
            |(min, max), &v| (min.min(v), max.max(v)),
        );

        if present.is_empty() {
            return Packing {
                reference: 0.0,
                binary_scale_factor: 0,
                bits_per_value: 0,
                present: 0,
            };
        }

        let range = (max_val - min_val) as f64;
        if range == 0.0 {
            return Packing {
                reference: min_val,
                binary_scale_factor: 0,
                bits_per_value: 0,
                present: present.len(),
            };
        }

        // Smallest E with range / 2^E <= 65535
        Packing {
            reference: min_val,
            binary_scale_factor: (range / 65535.0).log2().ceil() as i16,
            bits_per_value: 16,
            present: present.len(),
        }
    }
}

struct Packing {
    reference: f32,
    binary_scale_factor: i16,
    bits_per_value: u8,
    present: usize,
}

/// Shape of the earth block shared by templates 3.0 and 3.30:
/// sphere of radius 6371229 m (code 6), no scaled radii.
fn earth_shape() -> Vec<u8> {
    let mut gd = vec![6, 0];
    gd.extend_from_slice(&0u32.to_be_bytes());
    gd.push(0);
    gd.extend_from_slice(&0u32.to_be_bytes());
    gd.push(0);
    gd.extend_from_slice(&0u32.to_be_bytes());
    gd
}

fn to_micro(degrees: f64) -> i32 {
    (degrees * 1e6).round() as i32
}

/// Encode a GRIB2 sign-magnitude 32-bit integer.
pub fn encode_grib2_signed(value: i32) -> [u8; 4] {
    let magnitude = value.unsigned_abs() & 0x7FFF_FFFF;
    let raw = if value < 0 { magnitude | 0x8000_0000 } else { magnitude };
    raw.to_be_bytes()
}

/// Encode a GRIB2 sign-magnitude 16-bit integer.
pub fn encode_grib2_signed16(value: i16) -> [u8; 2] {
    let magnitude = value.unsigned_abs() & 0x7FFF;
    let raw = if value < 0 { magnitude | 0x8000 } else { magnitude };
    raw.to_be_bytes()
}

/// Concatenate messages into one GRIB2 file body.
pub fn concat_messages<I: IntoIterator<Item = Vec<u8>>>(messages: I) -> Vec<u8> {
    messages.into_iter().flatten().collect()
}

/// Write messages to `path` as a GRIB2 file.
pub fn write_grib2_file<I: IntoIterator<Item = Vec<u8>>>(path: &Path, messages: I) -> std::io::Result<()> {
    std::fs::write(path, concat_messages(messages))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_gfs_message() {
        let data = Grib2Builder::new_gfs().build();
        assert_eq!(&data[0..4], b"GRIB");
        assert_eq!(data[7], 2);
        assert_eq!(data[6], 0);
        assert_eq!(&data[data.len() - 4..], b"7777");

        let declared = u64::from_be_bytes(data[8..16].try_into().unwrap());
        assert_eq!(declared as usize, data.len());
    }

    #[test]
    fn test_sign_magnitude_encoding() {
        assert_eq!(encode_grib2_signed(-1), [0x80, 0, 0, 1]);
        assert_eq!(encode_grib2_signed(1000), [0, 0, 0x03, 0xE8]);
        assert_eq!(encode_grib2_signed16(-9), [0x80, 0x09]);
    }

    #[test]
    fn test_bitmap_written_for_nan() {
        let data = Grib2Builder::new_latlon(3, 1, 0.0, 0.0, 1.0, 1.0)
            .with_data(vec![1.0, f32::NAN, 3.0])
            .build();

        // Walk the section chain to section 6
        let mut offset = 16;
        loop {
            let len = u32::from_be_bytes(data[offset..offset + 4].try_into().unwrap()) as usize;
            if data[offset + 4] == 6 {
                assert_eq!(data[offset + 5], 0);
                assert_eq!(data[offset + 6], 0b1010_0000);
                break;
            }
            offset += len;
        }
    }
}

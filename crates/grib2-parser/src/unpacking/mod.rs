//! GRIB2 data unpacking.
//!
//! Only simple packing (data representation template 5.0) is implemented.

use crate::error::Grib2Error;

/// Upper bound on the up-front allocation for one message's values.
const MAX_PREALLOCATED_POINTS: usize = 1 << 24;

/// Unpack simple packed GRIB2 data into `num_points` grid values.
///
/// Simple packing formula: `value = (R + packed * 2^E) * 10^(-D)`.
/// With a bitmap, packed values exist only for points whose bit is set;
/// the remaining points are returned as `NaN`.
pub fn unpack_simple(
    packed_data: &[u8],
    num_points: usize,
    bits_per_value: u8,
    reference_value: f32,
    binary_scale_factor: i16,
    decimal_scale_factor: i16,
    bitmap: Option<&[u8]>,
) -> Result<Vec<f32>, Grib2Error> {
    let binary_scale = 2.0_f64.powi(binary_scale_factor as i32);
    let decimal_scale = 10.0_f64.powi(-(decimal_scale_factor as i32));
    let reference = reference_value as f64;
    let bits_per_value = bits_per_value as usize;

    // Reject counts the payload cannot back before allocating for them.
    if let Some(bm) = bitmap {
        if bm.len().saturating_mul(8) < num_points {
            return Err(Grib2Error::UnpackingError(format!(
                "bitmap of {} bytes is too short for {} points",
                bm.len(),
                num_points
            )));
        }
    }
    if bits_per_value > 0 && bitmap.is_none() {
        let packed_capacity = packed_data.len().saturating_mul(8) / bits_per_value;
        if packed_capacity < num_points {
            return Err(Grib2Error::UnpackingError(format!(
                "{} bytes of packed data hold at most {} values, header declares {}",
                packed_data.len(),
                packed_capacity,
                num_points
            )));
        }
    }

    // A constant field carries no payload to bound the count against.
    let capacity = num_points.min(MAX_PREALLOCATED_POINTS);
    let mut values = Vec::with_capacity(capacity);
    let mut bit_position = 0;

    for i in 0..num_points {
        let present = match bitmap {
            Some(bm) => {
                let byte = bm.get(i / 8).ok_or_else(|| {
                    Grib2Error::UnpackingError(format!("bitmap too short for {} points", num_points))
                })?;
                (byte >> (7 - (i % 8))) & 1 == 1
            }
            None => true,
        };

        if !present {
            values.push(f32::NAN);
            continue;
        }

        // Zero bits per value: every present point equals the reference value.
        let packed = if bits_per_value == 0 {
            0
        } else {
            let v = extract_bits(packed_data, bit_position, bits_per_value)
                .map_err(|e| Grib2Error::UnpackingError(format!("Failed to extract bits: {}", e)))?;
            bit_position += bits_per_value;
            v
        };

        values.push(((reference + packed as f64 * binary_scale) * decimal_scale) as f32);
    }

    Ok(values)
}

/// Extract up to 32 bits, MSB first, starting at `start_bit`.
pub fn extract_bits(data: &[u8], start_bit: usize, num_bits: usize) -> Result<u32, String> {
    if num_bits > 32 || num_bits == 0 {
        return Err(format!("Invalid number of bits: {}", num_bits));
    }
    if (start_bit + num_bits).div_ceil(8) > data.len() {
        return Err("Not enough data to extract bits".to_string());
    }

    let mut result = 0u32;
    for absolute_bit in start_bit..start_bit + num_bits {
        let bit = (data[absolute_bit / 8] >> (7 - (absolute_bit % 8))) & 1;
        result = (result << 1) | bit as u32;
    }
    Ok(result)
}

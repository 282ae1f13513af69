//! Sequential reader over the messages of a GRIB2 file.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::Grib2Error;
use crate::sections::{
    parse_bitmap, parse_data_representation, parse_data_section, parse_grid_definition,
    parse_identification, parse_indicator, parse_product_definition, split_sections, Bitmap,
    DataRepresentation, DataSection, GridDefinition, Identification, Indicator, ProductDefinition,
};
use crate::tables::Grib2Tables;
use crate::unpacking::unpack_simple;

/// One decoded GRIB2 message (a single field).
#[derive(Debug, Clone)]
pub struct Grib2Message {
    /// Byte offset of the message within the file
    pub offset: usize,
    pub indicator: Indicator,
    pub identification: Identification,
    pub grid_definition: GridDefinition,
    pub product_definition: ProductDefinition,
    pub data_representation: DataRepresentation,
    pub bitmap: Option<Bitmap>,
    pub data_section: DataSection,
    tables: Arc<Grib2Tables>,
}

impl Grib2Message {
    /// Parameter short name from the lookup tables.
    pub fn parameter(&self) -> String {
        let (d, c, n) = self.parameter_codes();
        self.tables.get_parameter_name(d, c, n)
    }

    /// `(discipline, category, number)`
    pub fn parameter_codes(&self) -> (u8, u8, u8) {
        (
            self.indicator.discipline,
            self.product_definition.parameter_category,
            self.product_definition.parameter_number,
        )
    }

    pub fn units(&self) -> Option<&str> {
        let (d, c, n) = self.parameter_codes();
        self.tables.get_units(d, c, n)
    }

    pub fn level_description(&self) -> String {
        self.tables.get_level_description(
            self.product_definition.level_type,
            self.product_definition.level_value(),
        )
    }

    pub fn level_token(&self) -> String {
        Grib2Tables::level_token(
            self.product_definition.level_type,
            self.product_definition.level_value(),
        )
    }

    /// Grid dimensions as `(nj, ni)`: rows, then points per row.
    pub fn grid_dims(&self) -> (usize, usize) {
        let (ni, nj) = self.grid_definition.dims();
        (nj, ni)
    }

    pub fn reference_time(&self) -> DateTime<Utc> {
        self.identification.reference_time
    }

    /// Reference time plus forecast offset.
    pub fn valid_time(&self) -> Result<DateTime<Utc>, Grib2Error> {
        let offset = self.product_definition.forecast_offset().ok_or_else(|| {
            Grib2Error::section(
                4,
                format!(
                    "unsupported time range unit {}",
                    self.product_definition.time_unit
                ),
            )
        })?;
        Ok(self.identification.reference_time + offset)
    }

    /// Unpack the field in storage order, with `NaN` for masked points.
    pub fn unpack_data(&self) -> Result<Vec<f32>, Grib2Error> {
        let rep = &self.data_representation;
        if rep.template_number != 0 {
            return Err(Grib2Error::UnsupportedTemplate {
                section: 5,
                template: rep.template_number,
            });
        }

        unpack_simple(
            &self.data_section.data,
            self.grid_definition.num_data_points as usize,
            rep.bits_per_value,
            rep.reference_value,
            rep.binary_scale_factor,
            rep.decimal_scale_factor,
            self.bitmap.as_ref().map(|b| b.data.as_ref()),
        )
    }

    /// Unpack the field as `nj` rows of `ni` points in scan order.
    pub fn unpack_rows(&self) -> Result<Vec<f32>, Grib2Error> {
        let values = self.unpack_data()?;
        let (ni, nj) = self.grid_definition.dims();
        Ok(self.grid_definition.scan_mode().to_rows(&values, ni, nj))
    }
}

/// Reads GRIB2 messages one after another from an in-memory buffer.
pub struct Grib2Reader {
    data: Bytes,
    offset: usize,
    tables: Arc<Grib2Tables>,
}

impl Grib2Reader {
    pub fn new(data: Bytes, tables: Arc<Grib2Tables>) -> Self {
        Self {
            data,
            offset: 0,
            tables,
        }
    }

    /// Decode the next message, or `None` at end of input.
    ///
    /// Bytes between messages are skipped.
    pub fn next_message(&mut self) -> Result<Option<Grib2Message>, Grib2Error> {
        let Some(start) = find_magic(&self.data, self.offset) else {
            if self.offset < self.data.len() {
                debug!(
                    trailing = self.data.len() - self.offset,
                    "Ignoring trailing bytes after last GRIB2 message"
                );
            }
            self.offset = self.data.len();
            return Ok(None);
        };

        let indicator = parse_indicator(&self.data[start..])?;
        let length = indicator.message_length as usize;
        if length < 20 || start + length > self.data.len() {
            return Err(Grib2Error::InvalidFormat(format!(
                "message at byte {} declares length {} but only {} bytes remain",
                start,
                length,
                self.data.len() - start
            )));
        }

        let message = self.data.slice(start..start + length);
        self.offset = start + length;
        self.decode(start, indicator, &message).map(Some)
    }

    /// Decode every remaining message.
    pub fn read_all(&mut self) -> Result<Vec<Grib2Message>, Grib2Error> {
        let mut messages = Vec::new();
        while let Some(message) = self.next_message()? {
            messages.push(message);
        }
        Ok(messages)
    }

    fn decode(&self, offset: usize, indicator: Indicator, message: &[u8]) -> Result<Grib2Message, Grib2Error> {
        let sections = split_sections(message)?;

        let first = |number: u8| -> Result<&[u8], Grib2Error> {
            sections
                .iter()
                .find(|(n, _)| *n == number)
                .map(|(_, bytes)| *bytes)
                .ok_or_else(|| Grib2Error::section(number, "section missing"))
        };

        let fields = sections.iter().filter(|(n, _)| *n == 7).count();
        if fields > 1 {
            warn!(offset, fields, "Multi-field GRIB2 message, decoding the first field only");
        }

        let bitmap = match sections.iter().find(|(n, _)| *n == 6) {
            Some((_, bytes)) => parse_bitmap(bytes)?,
            None => None,
        };

        Ok(Grib2Message {
            offset,
            identification: parse_identification(first(1)?)?,
            grid_definition: parse_grid_definition(first(3)?)?,
            product_definition: parse_product_definition(first(4)?)?,
            data_representation: parse_data_representation(first(5)?)?,
            bitmap,
            data_section: parse_data_section(first(7)?)?,
            indicator,
            tables: Arc::clone(&self.tables),
        })
    }
}

impl Iterator for Grib2Reader {
    type Item = Result<Grib2Message, Grib2Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_message() {
            Ok(Some(message)) => Some(Ok(message)),
            Ok(None) => None,
            Err(e) => {
                // Stop after the first error instead of rescanning the same bytes.
                self.offset = self.data.len();
                Some(Err(e))
            }
        }
    }
}

fn find_magic(data: &[u8], from: usize) -> Option<usize> {
    data.get(from..)?
        .windows(4)
        .position(|w| w == b"GRIB")
        .map(|pos| from + pos)
}

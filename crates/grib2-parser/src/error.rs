use thiserror::Error;

/// Errors raised while decoding GRIB2 bytes.
#[derive(Debug, Error)]
pub enum Grib2Error {
    #[error("Invalid GRIB2 format: {0}")]
    InvalidFormat(String),

    #[error("Invalid section {section}: {reason}")]
    InvalidSection { section: u8, reason: String },

    #[error("Unsupported template {template} in section {section}")]
    UnsupportedTemplate { section: u8, template: u16 },

    #[error("Unpacking error: {0}")]
    UnpackingError(String),
}

impl Grib2Error {
    pub(crate) fn section(section: u8, reason: impl Into<String>) -> Self {
        Self::InvalidSection {
            section,
            reason: reason.into(),
        }
    }
}

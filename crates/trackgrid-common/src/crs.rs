//! Coordinate Reference System types and parsing.
//!
//! A CRS is an explicit tagged value: either a well-known EPSG code or a
//! record of projection parameters. Equality is structural, so two sources
//! that spell the same CRS differently (`EPSG:4326`, `CRS:84`,
//! `+proj=longlat +datum=WGS84`) compare equal once parsed.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Radius of the sphere used by Web Mercator (meters).
pub const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Mean Earth radius used by GRIB2 shape-of-earth 6 (meters).
pub const GRIB_EARTH_RADIUS: f64 = 6_371_229.0;

/// Well-known CRS codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrsCode {
    /// WGS84 Geographic (lon/lat in degrees)
    Epsg4326,
    /// NAD83 Geographic
    Epsg4269,
    /// Web Mercator (meters)
    Epsg3857,
}

impl CrsCode {
    /// Look up a numeric EPSG code.
    pub fn from_epsg(code: u32) -> Option<Self> {
        match code {
            4326 => Some(CrsCode::Epsg4326),
            4269 => Some(CrsCode::Epsg4269),
            3857 | 900913 | 3785 => Some(CrsCode::Epsg3857),
            _ => None,
        }
    }

    /// Numeric EPSG code.
    pub fn epsg(&self) -> u32 {
        match self {
            CrsCode::Epsg4326 => 4326,
            CrsCode::Epsg4269 => 4269,
            CrsCode::Epsg3857 => 3857,
        }
    }

    /// Check if this is a geographic (lat/lon) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(self, CrsCode::Epsg4326 | CrsCode::Epsg4269)
    }
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// Projection family of a parameterised CRS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectionKind {
    /// Plain longitude/latitude on a sphere other than WGS84.
    LongLat,
    /// Spherical Mercator.
    Mercator,
    /// Lambert Conformal Conic (one or two standard parallels).
    LambertConformal,
}

impl ProjectionKind {
    fn proj_name(&self) -> &'static str {
        match self {
            ProjectionKind::LongLat => "longlat",
            ProjectionKind::Mercator => "merc",
            ProjectionKind::LambertConformal => "lcc",
        }
    }
}

/// Parameters of a spherical projection, in degrees and meters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectionParams {
    pub kind: ProjectionKind,
    /// Latitude of origin
    pub lat_0: f64,
    /// Central meridian
    pub lon_0: f64,
    /// First standard parallel
    pub lat_1: f64,
    /// Second standard parallel
    pub lat_2: f64,
    /// False easting
    pub x_0: f64,
    /// False northing
    pub y_0: f64,
    /// Sphere radius
    pub radius: f64,
}

impl ProjectionParams {
    /// Lambert Conformal Conic on the GRIB2 reference sphere.
    pub fn lambert(lat_0: f64, lon_0: f64, lat_1: f64, lat_2: f64) -> Self {
        Self {
            kind: ProjectionKind::LambertConformal,
            lat_0,
            lon_0,
            lat_1,
            lat_2,
            x_0: 0.0,
            y_0: 0.0,
            radius: GRIB_EARTH_RADIUS,
        }
    }

    /// Render as a PROJ string that [`Crs::parse`] reads back unchanged.
    pub fn to_proj_string(&self) -> String {
        match self.kind {
            ProjectionKind::LongLat => format!("+proj=longlat +R={} +no_defs", self.radius),
            ProjectionKind::Mercator => format!(
                "+proj=merc +lon_0={} +x_0={} +y_0={} +R={} +units=m +no_defs",
                self.lon_0, self.x_0, self.y_0, self.radius
            ),
            ProjectionKind::LambertConformal => format!(
                "+proj=lcc +lat_0={} +lon_0={} +lat_1={} +lat_2={} +x_0={} +y_0={} +R={} +units=m +no_defs",
                self.lat_0, self.lon_0, self.lat_1, self.lat_2, self.x_0, self.y_0, self.radius
            ),
        }
    }
}

/// A coordinate reference system.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Crs {
    /// Well-known EPSG code
    Code(CrsCode),
    /// Generic projection-parameter record
    Params(ProjectionParams),
}

impl Crs {
    /// Geographic WGS84 (EPSG:4326).
    pub const fn wgs84() -> Self {
        Crs::Code(CrsCode::Epsg4326)
    }

    /// Web Mercator (EPSG:3857).
    pub const fn web_mercator() -> Self {
        Crs::Code(CrsCode::Epsg3857)
    }

    /// Check if coordinates in this CRS are longitude/latitude degrees.
    pub fn is_geographic(&self) -> bool {
        match self {
            Crs::Code(code) => code.is_geographic(),
            Crs::Params(p) => p.kind == ProjectionKind::LongLat,
        }
    }

    /// Parse a CRS declaration.
    ///
    /// Accepts formats like:
    /// - "EPSG:4326", "epsg:3857", "CRS:84"
    /// - "urn:ogc:def:crs:EPSG::4326"
    /// - "http://www.opengis.net/def/crs/EPSG/0/3857"
    /// - "+proj=lcc +lat_1=38.5 +lat_2=38.5 +lat_0=38.5 +lon_0=-97.5"
    /// - WKT1 with a top-level `AUTHORITY["EPSG","4326"]`
    pub fn parse(s: &str) -> Result<Self, CrsParseError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(CrsParseError::Empty);
        }

        let upper = trimmed.to_uppercase();

        if matches!(upper.as_str(), "CRS:84" | "OGC:CRS84" | "CRS84")
            || upper.ends_with("/OGC/1.3/CRS84")
        {
            return Ok(Crs::wgs84());
        }

        if let Some(code) = upper.strip_prefix("EPSG:") {
            return parse_epsg_number(code, trimmed);
        }

        if upper.starts_with("URN:OGC:DEF:CRS:EPSG:") {
            let code = upper.rsplit(':').next().unwrap_or_default();
            return parse_epsg_number(code, trimmed);
        }

        if (upper.starts_with("HTTP://") || upper.starts_with("HTTPS://"))
            && upper.contains("/DEF/CRS/EPSG/")
        {
            let code = upper.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
            return parse_epsg_number(code, trimmed);
        }

        if trimmed.starts_with('+') || trimmed.contains("+proj=") {
            return parse_proj_string(trimmed);
        }

        if ["GEOGCS[", "PROJCS[", "GEOGCRS[", "PROJCRS[", "GEODCRS["]
            .iter()
            .any(|prefix| upper.starts_with(prefix))
        {
            return parse_wkt_authority(&upper, trimmed);
        }

        Err(CrsParseError::Unrecognized(trimmed.to_string()))
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Code(code) => write!(f, "{}", code),
            Crs::Params(params) => write!(f, "{}", params.to_proj_string()),
        }
    }
}

impl From<CrsCode> for Crs {
    fn from(code: CrsCode) -> Self {
        Crs::Code(code)
    }
}

impl std::str::FromStr for Crs {
    type Err = CrsParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Crs::parse(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrsParseError {
    #[error("Empty CRS declaration")]
    Empty,

    #[error("Unrecognized CRS: {0}")]
    Unrecognized(String),

    #[error("Unsupported CRS: {0}")]
    Unsupported(String),

    #[error("Corrupt CRS declaration '{input}': {reason}")]
    Corrupt { input: String, reason: String },
}

fn parse_epsg_number(code: &str, original: &str) -> Result<Crs, CrsParseError> {
    let number: u32 = code.trim().parse().map_err(|_| CrsParseError::Corrupt {
        input: original.to_string(),
        reason: format!("'{}' is not an EPSG code", code),
    })?;

    CrsCode::from_epsg(number)
        .map(Crs::Code)
        .ok_or_else(|| CrsParseError::Unsupported(format!("EPSG:{}", number)))
}

/// WKT1 nests AUTHORITY clauses; the last one belongs to the outermost CRS.
fn parse_wkt_authority(upper: &str, original: &str) -> Result<Crs, CrsParseError> {
    if upper.matches('[').count() != upper.matches(']').count() {
        return Err(CrsParseError::Corrupt {
            input: original.to_string(),
            reason: "unbalanced brackets".to_string(),
        });
    }

    let marker = ["AUTHORITY[\"EPSG\",\"", "ID[\"EPSG\","]
        .iter()
        .filter_map(|m| upper.rfind(m).map(|pos| pos + m.len()))
        .max()
        .ok_or_else(|| CrsParseError::Unsupported("WKT without EPSG authority".to_string()))?;

    let code: String = upper[marker..]
        .chars()
        .skip_while(|c| *c == '"')
        .take_while(|c| c.is_ascii_digit())
        .collect();

    parse_epsg_number(&code, original)
}

fn parse_proj_string(s: &str) -> Result<Crs, CrsParseError> {
    let mut params: HashMap<String, Option<String>> = HashMap::new();
    for token in s.split_whitespace() {
        let token = token.strip_prefix('+').ok_or_else(|| CrsParseError::Corrupt {
            input: s.to_string(),
            reason: format!("token '{}' does not start with '+'", token),
        })?;
        match token.split_once('=') {
            Some((key, value)) => params.insert(key.to_lowercase(), Some(value.to_string())),
            None => params.insert(token.to_lowercase(), None),
        };
    }

    let number = |key: &str| -> Result<Option<f64>, CrsParseError> {
        match params.get(key) {
            Some(Some(value)) => value.parse().map(Some).map_err(|_| CrsParseError::Corrupt {
                input: s.to_string(),
                reason: format!("+{}={} is not a number", key, value),
            }),
            Some(None) => Err(CrsParseError::Corrupt {
                input: s.to_string(),
                reason: format!("+{} requires a value", key),
            }),
            None => Ok(None),
        }
    };

    let text = |key: &str| params.get(key).cloned().flatten().map(|v| v.to_uppercase());

    let proj = text("proj").ok_or_else(|| CrsParseError::Corrupt {
        input: s.to_string(),
        reason: "missing +proj".to_string(),
    })?;

    // Spheres only: +R wins, then +a (when +b is absent or equal).
    let radius = match (number("r")?, number("a")?, number("b")?) {
        (Some(r), _, _) => Some(r),
        (None, Some(a), None) => Some(a),
        (None, Some(a), Some(b)) if (a - b).abs() < 1e-6 => Some(a),
        (None, Some(_), Some(_)) => {
            return Err(CrsParseError::Unsupported(format!(
                "ellipsoidal parameters in '{}'",
                s
            )))
        }
        _ => None,
    };
    let x_0 = number("x_0")?.unwrap_or(0.0);
    let y_0 = number("y_0")?.unwrap_or(0.0);
    let lon_0 = number("lon_0")?.unwrap_or(0.0);

    match proj.as_str() {
        "LONGLAT" | "LATLONG" | "LONLAT" | "LATLON" => {
            let datum = text("datum").or_else(|| text("ellps"));
            match (datum.as_deref(), radius) {
                (Some("WGS84"), _) | (None, None) => Ok(Crs::wgs84()),
                (Some("NAD83") | Some("GRS80"), _) => Ok(Crs::Code(CrsCode::Epsg4269)),
                (None, Some(r)) => Ok(Crs::Params(ProjectionParams {
                    kind: ProjectionKind::LongLat,
                    lat_0: 0.0,
                    lon_0: 0.0,
                    lat_1: 0.0,
                    lat_2: 0.0,
                    x_0: 0.0,
                    y_0: 0.0,
                    radius: r,
                })),
                (Some(other), _) => Err(CrsParseError::Unsupported(format!("datum {}", other))),
            }
        }
        "MERC" => {
            if number("lat_ts")?.unwrap_or(0.0) != 0.0 || number("k")?.unwrap_or(1.0) != 1.0 {
                return Err(CrsParseError::Unsupported(format!(
                    "scaled Mercator in '{}'",
                    s
                )));
            }
            let radius = radius.unwrap_or(WEB_MERCATOR_RADIUS);
            if radius == WEB_MERCATOR_RADIUS && lon_0 == 0.0 && x_0 == 0.0 && y_0 == 0.0 {
                return Ok(Crs::web_mercator());
            }
            Ok(Crs::Params(ProjectionParams {
                kind: ProjectionKind::Mercator,
                lat_0: 0.0,
                lon_0,
                lat_1: 0.0,
                lat_2: 0.0,
                x_0,
                y_0,
                radius,
            }))
        }
        "LCC" => {
            let lat_1 = number("lat_1")?.ok_or_else(|| CrsParseError::Corrupt {
                input: s.to_string(),
                reason: "+proj=lcc requires +lat_1".to_string(),
            })?;
            let lat_2 = number("lat_2")?.unwrap_or(lat_1);
            let lat_0 = number("lat_0")?.unwrap_or(lat_1);
            if lat_1.abs() >= 90.0 || lat_2.abs() >= 90.0 || (lat_1 + lat_2).abs() < 1e-10 {
                return Err(CrsParseError::Corrupt {
                    input: s.to_string(),
                    reason: "standard parallels do not define a cone".to_string(),
                });
            }
            Ok(Crs::Params(ProjectionParams {
                kind: ProjectionKind::LambertConformal,
                lat_0,
                lon_0,
                lat_1,
                lat_2,
                x_0,
                y_0,
                radius: radius.unwrap_or(GRIB_EARTH_RADIUS),
            }))
        }
        other => Err(CrsParseError::Unsupported(format!("+proj={}", other.to_lowercase()))),
    }
}

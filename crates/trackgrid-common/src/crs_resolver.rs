//! CRS resolution for vector and gridded inputs.
//!
//! Resolution order:
//! 1. CRS declared by the source itself
//! 2. caller-supplied override
//! 3. WGS84, only when the caller opted in with [`CrsResolver::assume_default`]

use tracing::{debug, warn};

use crate::crs::Crs;
use crate::error::{TrackGridError, TrackGridResult};

/// What a source says about its own CRS.
#[derive(Debug, Clone, PartialEq)]
pub enum DeclaredCrs<'a> {
    /// Raw CRS text from file metadata; parsed by the resolver.
    Text(&'a str),
    /// CRS already attached as a typed tag.
    Tagged(Crs),
    /// The source carries no CRS information.
    Undeclared,
}

/// Anything whose coordinate reference system can be resolved.
pub trait CrsSource {
    /// Human-readable name used in logs and errors (usually a path).
    fn source_name(&self) -> String;

    /// CRS information embedded in the source.
    ///
    /// Sources made of several tagged members return `CrsMismatch` when the
    /// members disagree.
    fn declared_crs(&self) -> TrackGridResult<DeclaredCrs<'_>>;
}

/// Where a resolved CRS came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrsOrigin {
    Declared,
    Override,
    AssumedDefault,
}

/// Resolves the CRS of a [`CrsSource`].
#[derive(Debug, Clone, Default)]
pub struct CrsResolver {
    override_crs: Option<Crs>,
    assume_default: bool,
}

impl CrsResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// CRS to use when the source declares none.
    pub fn with_override(mut self, crs: Crs) -> Self {
        self.override_crs = Some(crs);
        self
    }

    /// Allow falling back to WGS84 when nothing else is known.
    pub fn assume_default(mut self, enabled: bool) -> Self {
        self.assume_default = enabled;
        self
    }

    /// Resolve the CRS of a source.
    pub fn resolve<S: CrsSource + ?Sized>(&self, source: &S) -> TrackGridResult<Crs> {
        self.resolve_with_origin(source).map(|(crs, _)| crs)
    }

    /// Resolve the CRS of a source and report which rule produced it.
    pub fn resolve_with_origin<S: CrsSource + ?Sized>(
        &self,
        source: &S,
    ) -> TrackGridResult<(Crs, CrsOrigin)> {
        let declared = match source.declared_crs()? {
            DeclaredCrs::Tagged(crs) => Some(crs),
            DeclaredCrs::Text(text) => Some(Crs::parse(text).map_err(|e| {
                TrackGridError::unresolvable(source.source_name(), e.to_string())
            })?),
            DeclaredCrs::Undeclared => None,
        };

        if let Some(crs) = declared {
            debug!(source = %source.source_name(), crs = %crs, "Using declared CRS");
            return Ok((crs, CrsOrigin::Declared));
        }

        if let Some(crs) = self.override_crs {
            debug!(source = %source.source_name(), crs = %crs, "Using CRS override");
            return Ok((crs, CrsOrigin::Override));
        }

        if self.assume_default {
            warn!(
                source = %source.source_name(),
                crs = %Crs::wgs84(),
                "No CRS declared, assuming WGS84"
            );
            return Ok((Crs::wgs84(), CrsOrigin::AssumedDefault));
        }

        Err(TrackGridError::unresolvable(
            source.source_name(),
            "no CRS declared, no override given and default assumption disabled",
        ))
    }
}

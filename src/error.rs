//! Error types shared across the crate.
//!
//! Each subsystem owns its own error enum (mirroring how the teacher crate keeps
//! `HeaderError`/`BodyError`/`CollationError` separate rather than one crate-wide
//! error type). This module holds the few types genuinely shared by more than one
//! subsystem: a file/line identity used to annotate parse failures, and the
//! invariant-violation marker for conditions that should never be reachable.
use std::fmt;
use std::path::PathBuf;

/// Identifies where in an input file a problem occurred.
#[derive(Debug, Clone, Default)]
pub struct FileLocation {
    pub path: Option<PathBuf>,
    pub line: Option<usize>,
    pub key: Option<String>,
}

impl FileLocation {
    pub fn new<P: Into<PathBuf>, S: Into<String>>(path: Option<P>, line: Option<usize>, key: Option<S>) -> Self {
        Self { path: path.map(Into::into), line, key: key.map(Into::into) }
    }
}

impl fmt::Display for FileLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        if let Some(p) = &self.path {
            write!(f, "{}", p.display())?;
            wrote = true;
        }
        if let Some(l) = self.line {
            write!(f, "{}line {l}", if wrote { ":" } else { "" })?;
            wrote = true;
        }
        if let Some(k) = &self.key {
            write!(f, "{}source {k}", if wrote { ", " } else { "" })?;
            wrote = true;
        }
        if !wrote {
            write!(f, "<unknown location>")?;
        }
        Ok(())
    }
}

/// Raised when a condition the implementation assumes can never happen is
/// observed anyway. Per the spec's error-handling design, this is never meant
/// to be handled by a caller; in debug builds prefer `panic!`, in release
/// builds propagate this as a fatal error.
#[derive(Debug, thiserror::Error)]
#[error("internal invariant violated: {0}")]
pub struct InvariantViolation(pub String);

impl InvariantViolation {
    pub fn new<S: Into<String>>(msg: S) -> Self {
        Self(msg.into())
    }
}

/// Panics in debug builds; in release builds evaluates to an `Err(InvariantViolation)`
/// that the caller must propagate with `?`. Used at the handful of points the spec
/// explicitly calls out as "the source panics on this" (e.g. an unsupported
/// intersection geometry kind).
/// Errors reading and parsing an inventory file, of any supported format.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("could not open {0}: {1}")]
    CouldNotOpen(FileLocation, String),
    #[error("could not read {0}: {1}")]
    CouldNotRead(FileLocation, String),
    #[error("malformed data at {0}: {1}")]
    Malformed(FileLocation, String),
    #[error("unrecognized inventory format for {0}")]
    UnknownFormat(FileLocation),
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

impl From<crate::utils::HeaderError> for ParseError {
    fn from(e: crate::utils::HeaderError) -> Self {
        match e {
            crate::utils::HeaderError::CouldNotOpen { path, reason } => {
                ParseError::CouldNotOpen(FileLocation::new(Some(path), None, None::<String>), reason)
            }
            crate::utils::HeaderError::CouldNotRead { path, reason } => {
                ParseError::CouldNotRead(FileLocation::new(Some(path), None, None::<String>), reason)
            }
            crate::utils::HeaderError::Malformed { path, cause } => {
                ParseError::Malformed(FileLocation::new(Some(path), None, None::<String>), cause)
            }
        }
    }
}

/// Errors building or looking up a spatial surrogate.
#[derive(Debug, thiserror::Error)]
pub enum SurrogateError {
    #[error("could not read surrogate spec at {0}: {1}")]
    CouldNotRead(FileLocation, String),
    #[error("malformed surrogate spec at {0}: {1}")]
    Malformed(FileLocation, String),
    #[error("no surrogate defined for code {0}")]
    UnknownCode(String),
    #[error("merge/backup recursion exceeded depth {0}")]
    RecursionLimit(usize),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

/// Errors in the surrogate cache's memory or disk tier.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("could not read cache entry at {path}: {reason}")]
    CouldNotRead { path: PathBuf, reason: String },
    #[error("could not write cache entry at {path}: {reason}")]
    CouldNotWrite { path: PathBuf, reason: String },
    #[error("corrupt cache entry at {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Errors loading or applying a chemical speciation profile.
#[derive(Debug, thiserror::Error)]
pub enum SpeciationError {
    #[error("could not read speciation table at {0}: {1}")]
    CouldNotRead(FileLocation, String),
    #[error("malformed speciation table at {0}: {1}")]
    Malformed(FileLocation, String),
    #[error("no profile found for SCC {scc} pollutant {pollutant}")]
    NoProfile { scc: String, pollutant: String },
    #[error("unknown species {0} in mechanism {1}")]
    UnknownSpecies(String, String),
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
}

macro_rules! invariant_violation {
    ($err:ty, $($arg:tt)*) => {{
        let msg = format!($($arg)*);
        if cfg!(debug_assertions) {
            panic!("{msg}");
        }
        #[allow(unreachable_code)]
        {
            return Err(<$err>::from($crate::error::InvariantViolation::new(msg)));
        }
    }};
}
pub(crate) use invariant_violation;

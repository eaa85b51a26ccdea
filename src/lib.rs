//! Common error types and shared plumbing.
pub mod error;
/// Dimensioned scalars and calendar periods.
pub mod units;
/// Source, point-source, economic, and control metadata.
pub mod source;
/// Pollutant identity and the per-period emissions container.
pub mod emissions;
/// The tagged record model and its capability trait.
pub mod record;
/// General file-reading utilities shared by the format readers.
pub mod utils;
/// Multi-format inventory file readers (ORL, IDA, FF10, COARDS NetCDF).
pub mod readers;
/// Parallel inventory file loading, merging, and reporting.
pub mod inventory;
/// Grid definitions and spatial indexing.
pub mod grid;
/// Surrogate specification parsing, building, and caching.
pub mod surrogate;
/// The spatial allocator tying grids, surrogates, and emissions together.
pub mod spatial;
/// SPECIATE-style chemical speciation.
pub mod speciation;
/// Logging configuration.
pub mod logging;

#[cfg(test)]
mod test_utils;

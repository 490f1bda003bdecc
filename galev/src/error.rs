//! Error taxonomy shared by every stage of the engine.

use std::path::PathBuf;
use thiserror::Error;

/// Catch-all error for this crate.
///
/// The variants mirror the abort scopes the driver distinguishes:
/// configuration problems are fatal at startup, missing files and format
/// problems abort the current file, invariant and numeric problems abort the
/// current tree.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid parameter, or an unsupported tree type.
    #[error("configuration error: {0}")]
    Config(String),
    /// A required data file (cooling table, tree file, snapshot list) does
    /// not exist or cannot be opened.
    #[error("missing data file `{path}`: {reason}")]
    MissingDataFile {
        /// Path that failed to open.
        path: PathBuf,
        /// Operating-system level reason.
        reason: String,
    },
    /// Header mismatch, short read, or undecidable endianness.
    #[error("format error in `{path}`: {reason}")]
    Format {
        /// Offending file.
        path: PathBuf,
        /// What did not match.
        reason: String,
    },
    /// A structural invariant of the galaxy population failed.
    #[error(
        "invariant violated (file {filenr}, tree {treenr}, halo {halonr}, galaxy {galnr}): {reason}"
    )]
    Invariant {
        /// Input file number, −1 when not yet known.
        filenr: i32,
        /// Tree index within the file, −1 when not yet known.
        treenr: i32,
        /// Halo index within the tree.
        halonr: i32,
        /// Galaxy index within the working set, −1 when not applicable.
        galnr: i32,
        /// Description of the violated invariant.
        reason: String,
    },
    /// A NaN survived the clamping rules.
    #[error("numeric fault: {0}")]
    Numeric(String),
    /// The working galaxy array hit its hard capacity limit, or an
    /// allocation failed.
    #[error("resource exhaustion: {0}")]
    ResourceExhaustion(String),
    /// Error raised by the operating system during I/O.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Attach file and tree coordinates to an [`Error::Invariant`] raised
    /// below the driver, where those coordinates are unknown.
    #[must_use]
    pub fn locate(self, file: i32, tree: i32) -> Self {
        match self {
            Self::Invariant {
                halonr,
                galnr,
                reason,
                ..
            } => Self::Invariant {
                filenr: file,
                treenr: tree,
                halonr,
                galnr,
                reason,
            },
            other => other,
        }
    }

    /// Shorthand used by the walker and pipeline, which know only the halo
    /// and galaxy coordinates.
    #[must_use]
    pub fn invariant(halonr: i32, galnr: i32, reason: impl Into<String>) -> Self {
        Self::Invariant {
            filenr: -1,
            treenr: -1,
            halonr,
            galnr,
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

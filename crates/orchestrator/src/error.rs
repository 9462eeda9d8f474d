//! Error types for snapshot reading and the collective counting pass.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort the counting pass.
///
/// Every variant is fatal: continuing past any of them would hand the loading
/// phase wrong buffer sizes.
#[derive(Error, Debug)]
pub enum SnapshotError {
    /// Underlying I/O failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File being accessed
        path: PathBuf,
        /// Original error
        #[source]
        source: std::io::Error,
    },

    /// The info file is missing a line or holds an unparsable value.
    #[error("malformed info file at line {line}: {message}")]
    Info {
        /// Zero-based line number
        line: usize,
        /// What went wrong
        message: String,
    },

    /// Leading and trailing record markers disagree.
    #[error("record marker mismatch at byte {offset}: leading {leading}, trailing {trailing}")]
    RecordMarker {
        /// Byte offset of the record start
        offset: u64,
        /// Leading length marker
        leading: i32,
        /// Trailing length marker
        trailing: i32,
    },

    /// A record's payload does not hold a whole number of elements.
    #[error("record of {bytes} bytes at byte {offset} is not a multiple of {elem_size}")]
    RecordLength {
        /// Byte offset of the record start
        offset: u64,
        /// Payload length
        bytes: usize,
        /// Expected element size
        elem_size: usize,
    },

    /// A leading marker claims more bytes than the stream still holds.
    #[error("record at byte {offset} declares {declared} bytes but only {remaining} remain")]
    RecordOverrun {
        /// Byte offset of the record start
        offset: u64,
        /// Payload length from the leading marker
        declared: u64,
        /// Payload bytes actually available
        remaining: u64,
    },

    /// A shard header holds values that make no sense.
    #[error("bad shard header in {path}: {message}")]
    Header {
        /// Shard file
        path: PathBuf,
        /// What went wrong
        message: String,
    },

    /// No shard file exists under either naming convention.
    #[error("missing shard: neither {numbered} nor {single} exists")]
    MissingShard {
        /// Numbered multi-file name
        numbered: PathBuf,
        /// Single-file fallback name
        single: PathBuf,
    },

    /// Processes disagree on the number of rank slots.
    #[error("count table size mismatch: rank {rank} has {got} slots, expected {expected}")]
    TableSizeMismatch {
        /// Offending rank
        rank: usize,
        /// Slots on the offending rank
        got: usize,
        /// Slots on the local rank
        expected: usize,
    },

    /// Invalid run configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Elements matched no domain and the run rejects that.
    #[error("{count} elements fell outside every domain")]
    OutOfBounds {
        /// Global number of unmatched elements
        count: u64,
    },

    /// Another rank failed during pre-flight, so this rank stops too.
    #[error("{failed} rank(s) failed pre-flight validation")]
    PeerFailed {
        /// Number of ranks that failed
        failed: u64,
    },
}

/// Result alias for snapshot operations.
pub type Result<T> = std::result::Result<T, SnapshotError>;

impl SnapshotError {
    /// Wrap an I/O error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SnapshotError::Io {
            path: path.into(),
            source,
        }
    }
}

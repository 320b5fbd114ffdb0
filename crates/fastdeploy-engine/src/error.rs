//! Error types for fastdeploy-engine.
//!
//! The kinds form a closed taxonomy: `Io` and `Corrupt` are recoverable by
//! callers, `VersionMismatch` is caught by the load path itself (cross-
//! version build-info files are discarded, not trusted), and `Invariant`
//! signals a logic defect that must abort the build.

/// Errors produced by build-context operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A filesystem operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A utility operation failed.
    #[error("{0}")]
    Util(#[from] fastdeploy_util::error::UtilError),

    /// A build-info file is present but not valid against the schema.
    #[error("corrupt build-info at {path}: {message}")]
    Corrupt { path: String, message: String },

    /// A build-info file was produced by a different plugin or format
    /// version; its history cannot be trusted.
    #[error("build-info version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },

    /// An internal consistency rule was broken. Never recoverable.
    #[error("build-context invariant violated: {message}")]
    Invariant { message: String },
}

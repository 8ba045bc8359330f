//! Error types for mcfskel.
//!
//! Every fallible operation in the crate returns [`SkeletonError`]. The three
//! contraction-specific kinds behave differently at runtime:
//!
//! - [`SkeletonError::Numerical`] is fatal for the current contraction run,
//!   as is every kind not listed below (see [`SkeletonError::is_fatal`]).
//! - [`SkeletonError::Topology`] is recovered locally by skipping the offending
//!   collapse or split.
//! - [`SkeletonError::Configuration`] is returned by parameter setters and
//!   leaves the previous value in place.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`SkeletonError`].
pub type Result<T> = std::result::Result<T, SkeletonError>;

/// Errors that can occur while building, contracting or saving a mesh.
#[derive(Error, Debug)]
pub enum SkeletonError {
    /// The mesh has no faces.
    #[error("mesh has no faces")]
    EmptyMesh,

    /// A face references an invalid vertex index.
    #[error("face {face} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The face index.
        face: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// A face has duplicate vertex indices.
    #[error("face {face} is degenerate (has duplicate vertices)")]
    DegenerateFace {
        /// The face index.
        face: usize,
    },

    /// A directed edge is used by more than one face, so the edge has more
    /// than two incident faces or inconsistent winding.
    #[error("edge ({v0}, {v1}) is not manifold")]
    NonManifoldEdge {
        /// First vertex of the edge.
        v0: usize,
        /// Second vertex of the edge.
        v1: usize,
    },

    /// The sparse solver could not factor or solve the contraction system.
    #[error("numerical failure during {stage}: {details}")]
    Numerical {
        /// The solver stage that failed.
        stage: &'static str,
        /// Description of the failure.
        details: String,
    },

    /// A topology operation would break the manifold invariant.
    #[error("topology violation: {details}")]
    Topology {
        /// Description of the violation.
        details: String,
    },

    /// A parameter value is outside its valid range.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    Configuration {
        /// Parameter name.
        name: &'static str,
        /// The rejected value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },

    /// Invalid state for the requested operation.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error loading mesh from file.
    #[error("failed to load mesh from {path}: {message}")]
    LoadError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Error saving mesh to file.
    #[error("failed to save mesh to {path}: {message}")]
    SaveError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Unsupported file format.
    #[error("unsupported file format: {extension}")]
    UnsupportedFormat {
        /// The file extension.
        extension: String,
    },
}

impl SkeletonError {
    /// Create a configuration error for a rejected parameter.
    pub fn config<T: std::fmt::Display>(name: &'static str, value: T, reason: &'static str) -> Self {
        SkeletonError::Configuration {
            name,
            value: value.to_string(),
            reason,
        }
    }

    /// Create a numerical error for the given solver stage.
    pub fn numerical(stage: &'static str, details: impl Into<String>) -> Self {
        SkeletonError::Numerical {
            stage,
            details: details.into(),
        }
    }

    /// Create a topology error.
    pub fn topology(details: impl Into<String>) -> Self {
        SkeletonError::Topology {
            details: details.into(),
        }
    }

    /// Returns true if this error ends a contraction run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SkeletonError::Topology { .. } | SkeletonError::Configuration { .. })
    }
}

//! Data model for the fastdeploy build-context tracker: verifier outcomes,
//! the build-mode severity lattice, patching policies, and artifact records.

pub mod artifact;
pub mod status;

pub use artifact::{Artifact, Build, FileType};
pub use status::{BuildMode, PatchingPolicy, VerifierStatus};

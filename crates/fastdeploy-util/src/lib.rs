#![forbid(unsafe_code)]
//! Filesystem and hashing utilities for fastdeploy.

pub mod error;
pub mod fs;
pub mod hash;

//! Core type definitions used across the DriveTree workspace.

pub mod id;

pub use id::*;

//! Safe in-place patcher for custom viewport resolutions: locates hardcoded
//! geometry in the game's engine binaries and UI-layout documents and
//! rewrites it. Per-file backups and digest bookkeeping make every patch
//! reversible and safe to re-apply, and out-of-band changes to the target
//! files are detected before anything is overwritten.

pub mod binary;
pub mod catalog;
pub mod document;
pub mod error;
pub mod geometry;
pub mod orchestrator;
pub mod safety;
pub mod sjson;

pub use error::{PatchError, PatchWarning, Result};

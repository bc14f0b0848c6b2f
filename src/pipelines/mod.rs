//! Render pipelines of the wgpu backend.
//!
//! - `basic` builds the opaque scene pipeline and reports shader problems
//! - `light` owns the packed light uniform and its bind group

pub mod basic;
pub mod light;

#![forbid(unsafe_code)]

//! `studio` is the headless core of a diagram authoring studio: a portable SVG export
//! normalizer, session settings with cross-window events, pane geometry and a template
//! library.
//!
//! # Features
//!
//! - `raster`: PNG/PDF conversion of portable SVG (`studio::raster`) and the export pipeline
//!   with backend fallback (`studio::export`)

pub use studio_core::*;

#[cfg(feature = "raster")]
pub mod export;
#[cfg(feature = "raster")]
pub mod raster;

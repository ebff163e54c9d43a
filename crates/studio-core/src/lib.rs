#![forbid(unsafe_code)]

//! Portable SVG export normalizer and session state for the diagram studio (headless).
//!
//! Design goals:
//! - exported SVG is self-contained: literal presentation attributes only, no CSS cascade,
//!   custom properties or `color-mix()`
//! - normalization never fails; malformed input comes back unchanged
//! - no I/O outside the settings and template-library stores

pub mod color;
pub mod css;
pub mod dom;
pub mod error;
pub mod events;
pub mod fonts;
pub mod layout;
pub mod library;
pub mod normalize;
pub mod settings;
pub mod theme;

pub use css::VariableTable;
pub use dom::{Element, Node, parse_svg};
pub use error::{Error, Result};
pub use events::{AppEvent, EventBus, EventKind, Subscription};
pub use normalize::{NormalizeOptions, SourceShape, normalize_svg, normalize_tree};
pub use settings::{
    Appearance, ExportFormat, FontSettings, Locale, RenderEngine, Settings, SettingsStore,
};
pub use theme::ChartTheme;

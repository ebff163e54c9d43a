//! Application settings.
//!
//! A [`SettingsStore`] is created once per window and passed by reference. Every change goes
//! through [`SettingsStore::update`], which normalizes, persists and broadcasts the changed
//! groups on the shared [`EventBus`]. Other windows fold those broadcasts back in with
//! [`SettingsStore::apply_remote`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::events::{AppEvent, EventBus};
use crate::fonts::{DEFAULT_CHART_FONT, DEFAULT_CODE_FONT, DEFAULT_UI_FONT, normalize_font_value};
use crate::theme::{DEFAULT_DARK_CHART_THEME, DEFAULT_LIGHT_CHART_THEME, normalize_chart_theme_name};

pub const DEFAULT_UI_FONT_SIZE: u8 = 14;
pub const MIN_UI_FONT_SIZE: u8 = 12;
pub const MAX_UI_FONT_SIZE: u8 = 24;
pub const DEFAULT_PNG_QUALITY: u8 = 85;
pub const MIN_PNG_QUALITY: u8 = 10;
pub const MAX_PNG_QUALITY: u8 = 100;

/// Sentinel older builds stored under `diagramFont` when the real value lived elsewhere.
const LEGACY_CUSTOM_FONT_MARKER: &str = "__custom__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RenderEngine {
    #[default]
    Beautiful,
    MermaidJs,
}

impl RenderEngine {
    pub const BEAUTIFUL: &'static str = "beautiful-mermaid";
    /// Misspelled identifier persisted by older builds. Accepted, never written.
    pub const BEAUTIFUL_LEGACY: &'static str = "bautiful-mermaid";
    pub const MERMAID_JS: &'static str = "mermaid-js/mermaid";

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Beautiful => Self::BEAUTIFUL,
            Self::MermaidJs => Self::MERMAID_JS,
        }
    }

    /// Unknown identifiers map to the default engine.
    pub fn parse_lenient(raw: &str) -> Self {
        raw.parse().unwrap_or_default()
    }
}

impl FromStr for RenderEngine {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            Self::MERMAID_JS | "mermaid-js" | "mermaid" => Ok(Self::MermaidJs),
            Self::BEAUTIFUL | Self::BEAUTIFUL_LEGACY | "beautiful" => Ok(Self::Beautiful),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Appearance {
    #[default]
    System,
    Light,
    Dark,
}

impl Appearance {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }
}

impl FromStr for Appearance {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Locale {
    #[default]
    Zh,
    En,
}

impl Locale {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Zh => "zh",
            Self::En => "en",
        }
    }
}

impl FromStr for Locale {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.split(['-', '_']).next() {
            Some("zh") => Ok(Self::Zh),
            Some("en") => Ok(Self::En),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExportFormat {
    #[default]
    Svg,
    Png,
    Pdf,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Png => "png",
            Self::Pdf => "pdf",
        }
    }

    pub fn extension(self) -> &'static str {
        self.as_str()
    }
}

impl FromStr for ExportFormat {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "svg" => Ok(Self::Svg),
            "png" => Ok(Self::Png),
            "pdf" => Ok(Self::Pdf),
            _ => Err(()),
        }
    }
}

macro_rules! lenient_string_enum {
    ($($ty:ty),+ $(,)?) => {$(
        impl From<String> for $ty {
            fn from(value: String) -> Self {
                value.parse().unwrap_or_default()
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> Self {
                value.as_str().to_string()
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    )+};
}

lenient_string_enum!(RenderEngine, Appearance, Locale, ExportFormat);

pub fn clamp_ui_font_size(n: f64) -> u8 {
    if !n.is_finite() {
        return DEFAULT_UI_FONT_SIZE;
    }
    n.round()
        .clamp(f64::from(MIN_UI_FONT_SIZE), f64::from(MAX_UI_FONT_SIZE)) as u8
}

pub fn clamp_png_quality(n: f64) -> u8 {
    if !n.is_finite() {
        return DEFAULT_PNG_QUALITY;
    }
    n.round()
        .clamp(f64::from(MIN_PNG_QUALITY), f64::from(MAX_PNG_QUALITY)) as u8
}

/// Maps PNG quality (10..=100) onto a raster scale (1..=4), rounded to two decimals.
pub fn png_quality_to_scale(quality: u8) -> f64 {
    let q = f64::from(quality.clamp(MIN_PNG_QUALITY, MAX_PNG_QUALITY));
    let scale = 1.0 + (q - 10.0) / 90.0 * 3.0;
    (scale * 100.0).round() / 100.0
}

fn number_of(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn str_of<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

/// Font choices, broadcast together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontSettings {
    pub ui_font: String,
    pub ui_font_size: u8,
    pub code_font: String,
    pub chart_font: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "Value")]
pub struct Settings {
    pub locale: Locale,
    pub appearance: Appearance,
    pub render_engine: RenderEngine,
    pub ui_font: String,
    pub ui_font_size: u8,
    pub code_font: String,
    pub chart_font: String,
    pub default_light_chart_theme: String,
    pub default_dark_chart_theme: String,
    pub png_quality: u8,
    pub export_default_format: ExportFormat,
    /// Editor share of the split pane width, restored on the next launch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor_pane_ratio: Option<f64>,
    /// Unix millis of the last template-library reset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_library_reset_at: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            locale: Locale::default(),
            appearance: Appearance::default(),
            render_engine: RenderEngine::default(),
            ui_font: DEFAULT_UI_FONT.to_string(),
            ui_font_size: DEFAULT_UI_FONT_SIZE,
            code_font: DEFAULT_CODE_FONT.to_string(),
            chart_font: DEFAULT_CHART_FONT.to_string(),
            default_light_chart_theme: DEFAULT_LIGHT_CHART_THEME.to_string(),
            default_dark_chart_theme: DEFAULT_DARK_CHART_THEME.to_string(),
            png_quality: DEFAULT_PNG_QUALITY,
            export_default_format: ExportFormat::default(),
            editor_pane_ratio: None,
            template_library_reset_at: None,
        }
    }
}

/// Reads every key independently; a malformed value only resets that key.
impl From<Value> for Settings {
    fn from(value: Value) -> Self {
        let Value::Object(map) = value else {
            return Settings::default();
        };
        let parse = |key: &str| str_of(&map, key).unwrap_or_default().to_string();

        let chart_font = [
            str_of(&map, "chartFont"),
            str_of(&map, "customDiagramFont"),
            str_of(&map, "diagramFont").filter(|v| v.trim() != LEGACY_CUSTOM_FONT_MARKER),
        ]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|v| !v.is_empty())
        .unwrap_or(DEFAULT_CHART_FONT)
        .to_string();

        let settings = Settings {
            locale: Locale::from(parse("locale")),
            appearance: Appearance::from(parse("appearance")),
            render_engine: RenderEngine::from(parse("renderEngine")),
            ui_font: normalize_font_value(str_of(&map, "uiFont"), DEFAULT_UI_FONT),
            ui_font_size: number_of(map.get("uiFontSize"))
                .map_or(DEFAULT_UI_FONT_SIZE, clamp_ui_font_size),
            code_font: normalize_font_value(str_of(&map, "codeFont"), DEFAULT_CODE_FONT),
            chart_font,
            default_light_chart_theme: parse("defaultLightChartTheme"),
            default_dark_chart_theme: parse("defaultDarkChartTheme"),
            png_quality: number_of(map.get("pngQuality"))
                .map_or(DEFAULT_PNG_QUALITY, clamp_png_quality),
            export_default_format: ExportFormat::from(parse("exportDefaultFormat")),
            editor_pane_ratio: number_of(map.get("editorPaneRatio")),
            template_library_reset_at: map.get("templateLibraryResetAt").and_then(Value::as_u64),
        };
        settings.normalized()
    }
}

impl Settings {
    /// Applies every clamp and fallback; idempotent.
    pub fn normalized(mut self) -> Self {
        self.ui_font = normalize_font_value(Some(&self.ui_font), DEFAULT_UI_FONT);
        self.code_font = normalize_font_value(Some(&self.code_font), DEFAULT_CODE_FONT);
        self.chart_font = normalize_font_value(Some(&self.chart_font), DEFAULT_CHART_FONT);
        self.ui_font_size = self.ui_font_size.clamp(MIN_UI_FONT_SIZE, MAX_UI_FONT_SIZE);
        self.png_quality = self.png_quality.clamp(MIN_PNG_QUALITY, MAX_PNG_QUALITY);
        self.default_light_chart_theme =
            normalize_chart_theme_name(&self.default_light_chart_theme, DEFAULT_LIGHT_CHART_THEME);
        self.default_dark_chart_theme =
            normalize_chart_theme_name(&self.default_dark_chart_theme, DEFAULT_DARK_CHART_THEME);
        self.editor_pane_ratio = self
            .editor_pane_ratio
            .filter(|r| r.is_finite() && *r > 0.0 && *r < 1.0);
        self
    }

    pub fn fonts(&self) -> FontSettings {
        FontSettings {
            ui_font: self.ui_font.clone(),
            ui_font_size: self.ui_font_size,
            code_font: self.code_font.clone(),
            chart_font: self.chart_font.clone(),
        }
    }

    pub fn png_scale(&self) -> f64 {
        png_quality_to_scale(self.png_quality)
    }

    /// Chart theme matching the effective appearance.
    pub fn chart_theme_name(&self, system_is_dark: bool) -> &str {
        let dark = match self.appearance {
            Appearance::System => system_is_dark,
            Appearance::Light => false,
            Appearance::Dark => true,
        };
        if dark {
            &self.default_dark_chart_theme
        } else {
            &self.default_light_chart_theme
        }
    }

    /// One event per settings group that differs between `self` and `next`.
    pub fn changes_to(&self, next: &Settings) -> Vec<AppEvent> {
        let mut events = Vec::new();
        if self.appearance != next.appearance {
            events.push(AppEvent::Appearance(next.appearance));
        }
        if self.fonts() != next.fonts() {
            events.push(AppEvent::Fonts(next.fonts()));
        }
        if self.locale != next.locale {
            events.push(AppEvent::Locale(next.locale));
        }
        if self.render_engine != next.render_engine {
            events.push(AppEvent::RenderEngine(next.render_engine));
        }
        if self.default_light_chart_theme != next.default_light_chart_theme
            || self.default_dark_chart_theme != next.default_dark_chart_theme
        {
            events.push(AppEvent::ChartThemes {
                light: next.default_light_chart_theme.clone(),
                dark: next.default_dark_chart_theme.clone(),
            });
        }
        if self.png_quality != next.png_quality
            || self.export_default_format != next.export_default_format
        {
            events.push(AppEvent::Export {
                png_quality: next.png_quality,
                default_format: next.export_default_format,
            });
        }
        if self.template_library_reset_at != next.template_library_reset_at {
            if let Some(at_ms) = next.template_library_reset_at {
                events.push(AppEvent::TemplateLibraryReset { at_ms });
            }
        }
        events
    }
}

/// Settings of one window: the persisted file, the in-memory copy and the shared bus.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    settings: Settings,
    bus: EventBus,
}

impl SettingsStore {
    /// Loads settings from `path`. A missing or unreadable file yields defaults.
    pub fn load(path: impl Into<PathBuf>, bus: EventBus) -> Self {
        let path = path.into();
        let settings = match read_settings(&path) {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                tracing::debug!("no settings at {}, using defaults", path.display());
                Settings::default()
            }
            Err(err) => {
                tracing::warn!("failed to load settings, using defaults: {err}");
                Settings::default()
            }
        };
        Self {
            path,
            settings,
            bus,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Edits, normalizes, persists, then broadcasts one event per changed group.
    ///
    /// The in-memory copy is updated even when persisting fails.
    pub fn update(&mut self, edit: impl FnOnce(&mut Settings)) -> Result<Vec<AppEvent>> {
        let mut next = self.settings.clone();
        edit(&mut next);
        let next = next.normalized();
        let events = self.settings.changes_to(&next);
        self.settings = next;
        self.persist()?;
        for event in &events {
            self.bus.publish(event.clone());
        }
        Ok(events)
    }

    pub fn reset_template_library(&mut self, now_ms: u64) -> Result<Vec<AppEvent>> {
        self.update(|s| s.template_library_reset_at = Some(now_ms))
    }

    pub fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            }
        }
        let text =
            serde_json::to_string_pretty(&self.settings).map_err(|e| Error::json(&self.path, e))?;
        std::fs::write(&self.path, text).map_err(|e| Error::io(&self.path, e))
    }

    /// Folds an event published by another window into the local copy. Nothing is persisted
    /// or re-published; the originating window already did both.
    pub fn apply_remote(&mut self, event: &AppEvent) {
        let s = &mut self.settings;
        match event {
            AppEvent::Appearance(appearance) => s.appearance = *appearance,
            AppEvent::Fonts(fonts) => {
                s.ui_font = fonts.ui_font.clone();
                s.ui_font_size = fonts.ui_font_size;
                s.code_font = fonts.code_font.clone();
                s.chart_font = fonts.chart_font.clone();
            }
            AppEvent::Locale(locale) => s.locale = *locale,
            AppEvent::RenderEngine(engine) => s.render_engine = *engine,
            AppEvent::ChartThemes { light, dark } => {
                s.default_light_chart_theme = light.clone();
                s.default_dark_chart_theme = dark.clone();
            }
            AppEvent::Export {
                png_quality,
                default_format,
            } => {
                s.png_quality = *png_quality;
                s.export_default_format = *default_format;
            }
            AppEvent::TemplateLibraryReset { at_ms } => s.template_library_reset_at = Some(*at_ms),
        }
        self.settings = std::mem::take(&mut self.settings).normalized();
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self {
            path: PathBuf::from("settings.json"),
            settings: Settings::default(),
            bus: EventBus::default(),
        }
    }
}

fn read_settings(path: &Path) -> Result<Option<Settings>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(path, e)),
    };
    let value: Value = serde_json::from_str(&text).map_err(|e| Error::json(path, e))?;
    Ok(Some(Settings::from(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn render_engine_accepts_legacy_spelling_but_never_writes_it() {
        assert_eq!(
            RenderEngine::parse_lenient("bautiful-mermaid"),
            RenderEngine::Beautiful
        );
        assert_eq!(
            RenderEngine::parse_lenient("mermaid-js/mermaid"),
            RenderEngine::MermaidJs
        );
        assert_eq!(RenderEngine::parse_lenient("???"), RenderEngine::Beautiful);
        let text = serde_json::to_string(&RenderEngine::Beautiful).expect("serialize");
        assert_eq!(text, "\"beautiful-mermaid\"");
    }

    #[test]
    fn quality_maps_to_scale() {
        assert_eq!(png_quality_to_scale(10), 1.0);
        assert_eq!(png_quality_to_scale(100), 4.0);
        assert_eq!(png_quality_to_scale(85), 3.5);
        assert_eq!(png_quality_to_scale(50), 2.33);
    }

    #[test]
    fn values_are_clamped_per_key() {
        let s = Settings::from(json!({
            "uiFontSize": 40,
            "pngQuality": "3",
            "appearance": "DARK",
            "exportDefaultFormat": "tiff",
            "renderEngine": "bautiful-mermaid",
            "defaultDarkChartTheme": "nord",
            "defaultLightChartTheme": "nope",
        }));
        assert_eq!(s.ui_font_size, MAX_UI_FONT_SIZE);
        assert_eq!(s.png_quality, MIN_PNG_QUALITY);
        assert_eq!(s.appearance, Appearance::Dark);
        assert_eq!(s.export_default_format, ExportFormat::Svg);
        assert_eq!(s.render_engine, RenderEngine::Beautiful);
        assert_eq!(s.default_dark_chart_theme, "nord");
        assert_eq!(s.default_light_chart_theme, DEFAULT_LIGHT_CHART_THEME);
        assert_eq!(s.locale, Locale::Zh);
    }

    #[test]
    fn legacy_chart_font_keys() {
        let s = Settings::from(json!({"diagramFont": "__custom__", "customDiagramFont": "Inter"}));
        assert_eq!(s.chart_font, "Inter");
        let s = Settings::from(json!({"diagramFont": "Georgia"}));
        assert_eq!(s.chart_font, "Georgia");
        let s = Settings::from(json!({"diagramFont": "__custom__"}));
        assert_eq!(s.chart_font, DEFAULT_CHART_FONT);
        let s = Settings::from(json!({"chartFont": "A", "customDiagramFont": "B"}));
        assert_eq!(s.chart_font, "A");
    }

    #[test]
    fn changes_are_grouped() {
        let old = Settings::default();
        let mut next = old.clone();
        next.ui_font_size = 16;
        next.png_quality = 50;
        next.editor_pane_ratio = Some(0.4);
        let events = old.changes_to(&next);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], AppEvent::Fonts(ref f) if f.ui_font_size == 16));
        assert!(matches!(
            events[1],
            AppEvent::Export {
                png_quality: 50,
                ..
            }
        ));
    }

    #[test]
    fn chart_theme_follows_appearance() {
        let mut s = Settings::default();
        assert_eq!(s.chart_theme_name(true), DEFAULT_DARK_CHART_THEME);
        s.appearance = Appearance::Light;
        assert_eq!(s.chart_theme_name(true), DEFAULT_LIGHT_CHART_THEME);
    }
}

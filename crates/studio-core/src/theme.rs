//! Chart themes and the Variable Table derived from them.

use serde::{Deserialize, Serialize};

use crate::color::{Rgba, mix_colors};
use crate::css::{VariableTable, parse_style_declarations, resolve_color_value};
use crate::error::{Error, Result};

pub const DEFAULT_LIGHT_CHART_THEME: &str = "github-light";
pub const DEFAULT_DARK_CHART_THEME: &str = "github-dark";

const DEFAULT_BG: &str = "#ffffff";
const DEFAULT_FG: &str = "#27272A";

/// Semantic color roles of a chart theme. Only `bg` and `fg` are required; the rest are
/// derived from them when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartTheme {
    pub bg: String,
    pub fg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub muted: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border: Option<String>,
}

impl Default for ChartTheme {
    fn default() -> Self {
        Self::new(DEFAULT_BG, DEFAULT_FG)
    }
}

struct BuiltinTheme {
    name: &'static str,
    bg: &'static str,
    fg: &'static str,
    line: Option<&'static str>,
    accent: Option<&'static str>,
    muted: Option<&'static str>,
}

const fn full(
    name: &'static str,
    bg: &'static str,
    fg: &'static str,
    line: &'static str,
    accent: &'static str,
    muted: &'static str,
) -> BuiltinTheme {
    BuiltinTheme {
        name,
        bg,
        fg,
        line: Some(line),
        accent: Some(accent),
        muted: Some(muted),
    }
}

const BUILTIN_THEMES: &[BuiltinTheme] = &[
    BuiltinTheme {
        name: "zinc-light",
        bg: "#FFFFFF",
        fg: "#27272A",
        line: None,
        accent: None,
        muted: None,
    },
    BuiltinTheme {
        name: "zinc-dark",
        bg: "#18181B",
        fg: "#FAFAFA",
        line: None,
        accent: None,
        muted: None,
    },
    full("tokyo-night", "#1a1b26", "#a9b1d6", "#3d59a1", "#7aa2f7", "#565f89"),
    full("tokyo-night-storm", "#24283b", "#a9b1d6", "#3d59a1", "#7aa2f7", "#565f89"),
    full("tokyo-night-light", "#d5d6db", "#343b58", "#34548a", "#34548a", "#9699a3"),
    full("catppuccin-mocha", "#1e1e2e", "#cdd6f4", "#585b70", "#cba6f7", "#6c7086"),
    full("catppuccin-latte", "#eff1f5", "#4c4f69", "#9ca0b0", "#8839ef", "#9ca0b0"),
    full("nord", "#2e3440", "#d8dee9", "#4c566a", "#88c0d0", "#616e88"),
    full("nord-light", "#eceff4", "#2e3440", "#aab1c0", "#5e81ac", "#7b88a1"),
    full("dracula", "#282a36", "#f8f8f2", "#6272a4", "#bd93f9", "#6272a4"),
    full("github-light", "#ffffff", "#1f2328", "#d1d9e0", "#0969da", "#59636e"),
    full("github-dark", "#0d1117", "#e6edf3", "#3d444d", "#4493f8", "#9198a1"),
    full("solarized-light", "#fdf6e3", "#657b83", "#93a1a1", "#268bd2", "#93a1a1"),
    full("solarized-dark", "#002b36", "#839496", "#586e75", "#268bd2", "#586e75"),
    full("one-dark", "#282c34", "#abb2bf", "#4b5263", "#c678dd", "#5c6370"),
];

/// Names of the built-in themes, in registry order.
pub fn builtin_theme_names() -> Vec<&'static str> {
    BUILTIN_THEMES.iter().map(|t| t.name).collect()
}

/// Picks `raw` when it names a built-in theme, else `fallback`, else the first built-in.
pub fn normalize_chart_theme_name(raw: &str, fallback: &str) -> String {
    let candidate = raw.trim();
    if ChartTheme::builtin(candidate).is_some() {
        return candidate.to_string();
    }
    if ChartTheme::builtin(fallback).is_some() {
        return fallback.to_string();
    }
    BUILTIN_THEMES
        .first()
        .map(|t| t.name.to_string())
        .unwrap_or_default()
}

impl ChartTheme {
    pub fn new(bg: impl Into<String>, fg: impl Into<String>) -> Self {
        Self {
            bg: bg.into(),
            fg: fg.into(),
            line: None,
            accent: None,
            muted: None,
            surface: None,
            border: None,
        }
    }

    pub fn builtin(name: &str) -> Option<Self> {
        let t = BUILTIN_THEMES.iter().find(|t| t.name == name)?;
        Some(Self {
            bg: t.bg.to_string(),
            fg: t.fg.to_string(),
            line: t.line.map(str::to_string),
            accent: t.accent.map(str::to_string),
            muted: t.muted.map(str::to_string),
            surface: None,
            border: None,
        })
    }

    pub fn lookup(name: &str) -> Result<Self> {
        Self::builtin(name).ok_or_else(|| Error::UnknownTheme {
            name: name.to_string(),
        })
    }

    /// Parses a custom theme object, e.g. `{"bg": "#000", "fg": "#fff", "accent": "#f0f"}`.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::InvalidThemeJson {
            message: e.to_string(),
        })
    }

    fn slots(&self) -> [(&'static str, Option<&str>); 7] {
        [
            ("--bg", Some(self.bg.as_str())),
            ("--fg", Some(self.fg.as_str())),
            ("--line", self.line.as_deref()),
            ("--accent", self.accent.as_deref()),
            ("--muted", self.muted.as_deref()),
            ("--surface", self.surface.as_deref()),
            ("--border", self.border.as_deref()),
        ]
    }

    /// Root `style` text declaring the theme as custom properties, the way a
    /// variable-driven renderer writes it onto its `<svg>` element.
    pub fn to_root_style(&self) -> String {
        self.slots()
            .iter()
            .filter_map(|(name, value)| value.map(|v| format!("{name}:{v}")))
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Page background for PDF output; white when `bg` is not a color.
    pub fn background_rgb(&self) -> [u8; 3] {
        Rgba::parse(&self.bg).map_or([255, 255, 255], |c| c.rgb())
    }
}

impl VariableTable {
    /// Builds the table from a root element's inline style.
    ///
    /// Custom properties declared on the root win; the theme fills the slots the markup leaves
    /// out. Derived slots are then computed by mixing the foreground over the background.
    pub fn from_root_style(root_style: &str, theme: Option<&ChartTheme>) -> Self {
        let mut vars: VariableTable = parse_style_declarations(root_style)
            .into_iter()
            .filter(|(prop, _)| prop.starts_with("--"))
            .collect();

        if let Some(theme) = theme {
            for (name, value) in theme.slots() {
                if let Some(value) = value {
                    if vars.get_non_empty(name).is_none() {
                        vars.insert(name, value);
                    }
                }
            }
        }

        let bg = resolve_slot(&vars, "--bg", DEFAULT_BG);
        let fg = resolve_slot(&vars, "--fg", DEFAULT_FG);
        vars.insert("--bg", bg.clone());
        vars.insert("--fg", fg.clone());

        for (name, weight) in [
            ("--line", 30.0),
            ("--accent", 50.0),
            ("--muted", 40.0),
            ("--surface", 3.0),
            ("--border", 20.0),
        ] {
            let raw = match vars.get_non_empty(name) {
                Some(v) => v.to_string(),
                None => mix_colors(&fg, &bg, weight),
            };
            let resolved = resolve_color_value(&raw, &vars);
            vars.insert(name, resolved);
        }

        let alias =
            |vars: &VariableTable, name: &str| vars.get(name).unwrap_or_default().to_string();
        let muted = alias(&vars, "--muted");
        let line = alias(&vars, "--line");
        let accent = alias(&vars, "--accent");
        let surface = alias(&vars, "--surface");
        let border = alias(&vars, "--border");

        vars.insert("--_text", fg.clone());
        vars.insert("--_text-sec", muted.clone());
        vars.insert("--_text-muted", muted);
        vars.insert("--_text-faint", mix_colors(&fg, &bg, 25.0));
        vars.insert("--_line", line);
        vars.insert("--_arrow", accent);
        vars.insert("--_node-fill", surface);
        vars.insert("--_node-stroke", border);
        vars.insert("--_group-fill", bg.clone());
        vars.insert("--_group-hdr", mix_colors(&fg, &bg, 5.0));
        vars.insert("--_inner-stroke", mix_colors(&fg, &bg, 12.0));
        vars.insert("--_key-badge", mix_colors(&fg, &bg, 10.0));
        vars
    }
}

fn resolve_slot(vars: &VariableTable, name: &str, default: &str) -> String {
    let raw = vars.get_non_empty(name).unwrap_or(default);
    let resolved = resolve_color_value(raw, vars);
    if resolved.is_empty() {
        resolve_color_value(default, vars)
    } else {
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_slots_mix_foreground_over_background() {
        let vars = VariableTable::from_root_style("--bg:#000000;--fg:#ffffff", None);
        assert_eq!(vars.get("--line"), Some("rgb(77, 77, 77)"));
        assert_eq!(vars.get("--accent"), Some("rgb(128, 128, 128)"));
        assert_eq!(vars.get("--surface"), Some("rgb(8, 8, 8)"));
        assert_eq!(vars.get("--_line"), Some("rgb(77, 77, 77)"));
        assert_eq!(vars.get("--_text"), Some("rgb(255, 255, 255)"));
        assert_eq!(vars.get("--_group-fill"), Some("rgb(0, 0, 0)"));
    }

    #[test]
    fn declared_slots_win_over_derivation() {
        let vars = VariableTable::from_root_style(
            "--bg:#ffffff;--fg:#000000;--accent:var(--brand);--brand:#ff0000",
            None,
        );
        assert_eq!(vars.get("--accent"), Some("rgb(255, 0, 0)"));
        assert_eq!(vars.get("--_arrow"), Some("rgb(255, 0, 0)"));
        assert_eq!(vars.get("--brand"), Some("#ff0000"));
    }

    #[test]
    fn defaults_apply_without_markup_or_theme() {
        let vars = VariableTable::from_root_style("", None);
        assert_eq!(vars.get("--bg"), Some("rgb(255, 255, 255)"));
        assert_eq!(vars.get("--fg"), Some("rgb(39, 39, 42)"));
    }

    #[test]
    fn theme_seeds_missing_slots_only() {
        let theme = ChartTheme::builtin("github-dark").expect("builtin");
        let vars = VariableTable::from_root_style("--fg:#ffffff", Some(&theme));
        assert_eq!(vars.get("--bg"), Some("rgb(13, 17, 23)"));
        assert_eq!(vars.get("--fg"), Some("rgb(255, 255, 255)"));
        assert_eq!(vars.get("--accent"), Some("rgb(68, 147, 248)"));
    }

    #[test]
    fn theme_name_normalization() {
        assert_eq!(normalize_chart_theme_name(" nord ", "github-light"), "nord");
        assert_eq!(
            normalize_chart_theme_name("missing", DEFAULT_DARK_CHART_THEME),
            "github-dark"
        );
        assert_eq!(normalize_chart_theme_name("missing", "also-missing"), "zinc-light");
    }

    #[test]
    fn background_rgb_falls_back_to_white() {
        assert_eq!(ChartTheme::new("#0d1117", "#fff").background_rgb(), [13, 17, 23]);
        assert_eq!(ChartTheme::new("var(--x)", "#fff").background_rgb(), [255, 255, 255]);
    }

    #[test]
    fn custom_theme_json() {
        let theme = ChartTheme::from_json_str(r##"{"bg":"#000","fg":"#fff","accent":"#f0f"}"##)
            .expect("theme");
        assert_eq!(theme.accent.as_deref(), Some("#f0f"));
        assert_eq!(theme.to_root_style(), "--bg:#000;--fg:#fff;--accent:#f0f");
        assert!(matches!(
            ChartTheme::from_json_str("{\"bg\":1}"),
            Err(Error::InvalidThemeJson { .. })
        ));
    }
}

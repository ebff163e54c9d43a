//! Portable SVG export normalizer.
//!
//! Rendered diagrams style themselves through CSS classes, custom properties and
//! `color-mix()`; rasterizers such as `resvg` or an `<img>` decode only honor presentation
//! attributes. [`normalize_svg`] rewrites a rendered document into a self-contained one:
//!
//! - [`SourceShape::VariableDriven`] inlines every allow-listed property as a literal
//!   attribute, drops `class`/`style` and `<style>` elements and paints a background rect.
//! - [`SourceShape::RichText`] leaves styling alone and pins font families onto text and
//!   embedded HTML, plus one override `<style>` block.
//!
//! Both shapes are idempotent: normalizing the output again yields the same bytes.

use crate::color::Rgba;
use crate::css::{
    VariableTable, has_var_reference, parse_style_declarations, resolve_color_mix_functions,
    resolve_color_value, resolve_css_variables, serialize_style_declarations,
};
use crate::dom::{Element, Node, parse_svg};
use crate::fonts::{DEFAULT_CHART_FONT, PDF_MONO_FONT_STACK};
use crate::settings::RenderEngine;
use crate::theme::ChartTheme;

/// Presentation properties carried over from inline styles in the variable-driven shape.
pub const SVG_EXPORT_STYLE_PROPS: &[&str] = &[
    "fill",
    "fill-opacity",
    "stroke",
    "stroke-opacity",
    "stroke-width",
    "stroke-linecap",
    "stroke-linejoin",
    "stroke-miterlimit",
    "stroke-dasharray",
    "stroke-dashoffset",
    "opacity",
    "font-family",
    "font-size",
    "font-style",
    "font-weight",
    "letter-spacing",
    "word-spacing",
    "text-anchor",
    "visibility",
];

/// Subset of [`SVG_EXPORT_STYLE_PROPS`] whose values are colors.
pub const SVG_COLOR_PROPS: &[&str] = &["fill", "stroke"];

/// Root attribute marking a document the variable-driven pass has already processed.
pub const PORTABLE_MARKER_ATTR: &str = "data-portable-svg";
/// Attribute identifying the font override block appended by the rich-text pass.
pub const PORTABLE_FONTS_ATTR: &str = "data-portable-fonts";

const FALLBACK_TEXT_FILL: &str = "#111111";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceShape {
    /// Styled through root custom properties, classes and `color-mix()`.
    #[default]
    VariableDriven,
    /// Styled through a stylesheet, with HTML labels inside `foreignObject`.
    RichText,
}

impl SourceShape {
    pub fn for_engine(engine: RenderEngine) -> Self {
        match engine {
            RenderEngine::Beautiful => Self::VariableDriven,
            RenderEngine::MermaidJs => Self::RichText,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub shape: SourceShape,
    pub font_stack: String,
    pub mono_font_stack: String,
    pub theme: Option<ChartTheme>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            shape: SourceShape::default(),
            font_stack: DEFAULT_CHART_FONT.to_string(),
            mono_font_stack: PDF_MONO_FONT_STACK.to_string(),
            theme: None,
        }
    }
}

impl NormalizeOptions {
    pub fn new(shape: SourceShape) -> Self {
        Self {
            shape,
            ..Self::default()
        }
    }

    pub fn for_engine(engine: RenderEngine) -> Self {
        Self::new(SourceShape::for_engine(engine))
    }

    pub fn with_font_stack(mut self, stack: impl Into<String>) -> Self {
        let stack = stack.into();
        if !stack.trim().is_empty() {
            self.font_stack = stack.trim().to_string();
        }
        self
    }

    pub fn with_mono_font_stack(mut self, stack: impl Into<String>) -> Self {
        let stack = stack.into();
        if !stack.trim().is_empty() {
            self.mono_font_stack = stack.trim().to_string();
        }
        self
    }

    pub fn with_theme(mut self, theme: ChartTheme) -> Self {
        self.theme = Some(theme);
        self
    }
}

/// Normalizes SVG markup for export.
///
/// Markup that does not parse, or whose root is not `<svg>`, is returned unchanged.
pub fn normalize_svg(markup: &str, opts: &NormalizeOptions) -> String {
    let mut root = match parse_svg(markup) {
        Ok(root) => root,
        Err(err) => {
            tracing::warn!("portable export skipped, returning markup unchanged: {err}");
            return markup.to_string();
        }
    };
    normalize_tree(&mut root, opts);
    root.to_svg_string()
}

/// Normalizes an already-parsed tree in place. `root` is expected to be the `<svg>` element.
pub fn normalize_tree(root: &mut Element, opts: &NormalizeOptions) {
    match opts.shape {
        SourceShape::VariableDriven => normalize_variable_driven(root, opts),
        SourceShape::RichText => normalize_rich_text(root, opts),
    }
}

fn normalize_variable_driven(root: &mut Element, opts: &NormalizeOptions) {
    let already_portable = root.attr(PORTABLE_MARKER_ATTR).is_some();
    let vars =
        VariableTable::from_root_style(root.attr("style").unwrap_or(""), opts.theme.as_ref());
    tracing::debug!("variable table built with {} entries", vars.len());

    root.walk_mut(&mut |el, _| {
        if !el.is("style") {
            inline_resolved_styles(el, &vars, opts);
        }
    });
    root.remove_descendants("style");
    root.remove_attr("style");

    if !already_portable {
        insert_background(root, vars.get("--bg").unwrap_or_default());
        root.set_attr(PORTABLE_MARKER_ATTR, "true");
    }
}

fn inline_resolved_styles(el: &mut Element, vars: &VariableTable, opts: &NormalizeOptions) {
    let mono = el.has_class_token("mono");
    el.remove_attr("class");
    let inline = el
        .remove_attr("style")
        .map(|s| parse_style_declarations(&s))
        .unwrap_or_default();

    for &prop in SVG_EXPORT_STYLE_PROPS {
        let raw = match inline.get(prop) {
            Some(v) => v.clone(),
            None => match el.attr(prop) {
                Some(v) if !v.trim().is_empty() => v.to_string(),
                _ => continue,
            },
        };
        let resolved = if SVG_COLOR_PROPS.contains(&prop) {
            resolve_color_value(&raw, vars)
        } else {
            resolve_literal(&raw, vars)
        };
        if resolved.is_empty() {
            el.remove_attr(prop);
        } else {
            el.set_attr(prop, resolved);
        }
    }

    // Attributes outside the allow-list (`stop-color`, `color`, ...) may still reference
    // variables; they must not survive as `var()` either.
    let leftovers: Vec<(String, String)> = el
        .attrs()
        .filter(|(_, v)| has_var_reference(v) || v.to_ascii_lowercase().contains("color-mix("))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    for (name, value) in leftovers {
        let resolved = resolve_color_value(&value, vars);
        if resolved.is_empty() {
            el.remove_attr(&name);
        } else {
            el.set_attr(name, resolved);
        }
    }

    if el.is("text") {
        if el.attr("fill").is_none() {
            let fill = vars
                .get_non_empty("--_text")
                .or_else(|| vars.get_non_empty("--fg"))
                .unwrap_or(FALLBACK_TEXT_FILL);
            el.set_attr("fill", fill);
        }
        if el.attr("font-family").is_none() {
            let stack = if mono {
                &opts.mono_font_stack
            } else {
                &opts.font_stack
            };
            el.set_attr("font-family", stack.as_str());
        }
    }
}

fn resolve_literal(raw: &str, vars: &VariableTable) -> String {
    let resolved = resolve_css_variables(raw, vars);
    if resolved.to_ascii_lowercase().contains("color-mix(") {
        resolve_color_mix_functions(&resolved)
    } else {
        resolved
    }
}

fn prefixed(root: &Element, local: &str) -> String {
    match root.name().split_once(':') {
        Some((prefix, _)) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

fn is_background_rect(el: &Element) -> bool {
    el.is("rect")
        && el.attr("x") == Some("0")
        && el.attr("y") == Some("0")
        && el.attr("width") == Some("100%")
        && el.attr("height") == Some("100%")
}

fn insert_background(root: &mut Element, bg: &str) {
    let Some(color) = Rgba::parse(bg) else {
        tracing::warn!("background {bg:?} is not a color, skipping background rect");
        return;
    };
    if color.is_fully_transparent() {
        tracing::debug!("transparent background, no background rect");
        return;
    }
    if root.first_element_child().is_some_and(is_background_rect) {
        return;
    }
    let rect = Element::new(prefixed(root, "rect"))
        .with_attr("x", "0")
        .with_attr("y", "0")
        .with_attr("width", "100%")
        .with_attr("height", "100%")
        .with_attr("fill", color.to_css());
    root.insert_child(0, rect);
}

fn normalize_rich_text(root: &mut Element, opts: &NormalizeOptions) {
    pin_font_families(root, false, false, opts);

    root.retain_children(|node| {
        !matches!(
            node,
            Node::Element(el) if el.is("style") && el.attr(PORTABLE_FONTS_ATTR).is_some()
        )
    });
    let style = Element::new(prefixed(root, "style"))
        .with_attr(PORTABLE_FONTS_ATTR, "true")
        .with_text(font_override_css(opts));
    root.push_child(style);
}

fn pin_font_families(
    el: &mut Element,
    in_foreign_object: bool,
    mono: bool,
    opts: &NormalizeOptions,
) {
    for child in el.children_mut().iter_mut() {
        let Node::Element(child) = child else {
            continue;
        };
        if child.is("style") {
            continue;
        }
        if in_foreign_object {
            let child_mono = mono
                || child.is("code")
                || child.is("pre")
                || child.has_class_token("mono");
            let stack = if child_mono {
                &opts.mono_font_stack
            } else {
                &opts.font_stack
            };
            let mut decls = parse_style_declarations(child.attr("style").unwrap_or(""));
            decls.insert("font-family".to_string(), stack.clone());
            child.set_attr("style", serialize_style_declarations(&decls));
            pin_font_families(child, true, child_mono, opts);
        } else {
            if child.is("text") || child.is("tspan") {
                child.set_attr("font-family", opts.font_stack.as_str());
            }
            let entering = child.is("foreignObject");
            pin_font_families(child, entering, false, opts);
        }
    }
}

fn font_override_css(opts: &NormalizeOptions) -> String {
    format!(
        "\ntext, tspan {{\n  font-family: {font} !important;\n}}\n\
         foreignObject, foreignObject * {{\n  font-family: {font} !important;\n}}\n\
         code, pre, foreignObject .mono {{\n  font-family: {mono} !important;\n}}\n",
        font = opts.font_stack,
        mono = opts.mono_font_stack,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable_opts() -> NormalizeOptions {
        NormalizeOptions::new(SourceShape::VariableDriven).with_font_stack("Inter, sans-serif")
    }

    #[test]
    fn engine_selects_shape() {
        assert_eq!(
            SourceShape::for_engine(RenderEngine::Beautiful),
            SourceShape::VariableDriven
        );
        assert_eq!(
            SourceShape::for_engine(RenderEngine::MermaidJs),
            SourceShape::RichText
        );
    }

    #[test]
    fn inline_style_wins_over_attribute() {
        let mut root = Element::new("svg").with_child(
            Element::new("rect")
                .with_attr("fill", "blue")
                .with_attr("style", "fill: red; stroke-width: 2; cursor: pointer"),
        );
        normalize_tree(&mut root, &variable_opts());
        let rect = root
            .element_children()
            .find(|e| e.is("rect") && e.attr("x").is_none())
            .expect("rect");
        assert_eq!(rect.attr("fill"), Some("rgb(255, 0, 0)"));
        assert_eq!(rect.attr("stroke-width"), Some("2"));
        assert_eq!(rect.attr("style"), None);
        assert_eq!(rect.attr("cursor"), None);
    }

    #[test]
    fn text_defaults_fill_and_font() {
        let mut root = Element::new("svg")
            .with_attr("style", "--bg:#ffffff;--fg:#111827")
            .with_child(Element::new("text").with_text("a"))
            .with_child(Element::new("text").with_attr("class", "label font-mono"));
        normalize_tree(&mut root, &variable_opts());
        let texts: Vec<&Element> = root.element_children().filter(|e| e.is("text")).collect();
        assert_eq!(texts[0].attr("fill"), Some("rgb(17, 24, 39)"));
        assert_eq!(texts[0].attr("font-family"), Some("Inter, sans-serif"));
        assert_eq!(texts[1].attr("font-family"), Some(PDF_MONO_FONT_STACK));
        assert_eq!(texts[1].attr("class"), None);
    }

    #[test]
    fn unresolvable_variable_drops_the_attribute() {
        let mut root = Element::new("svg")
            .with_child(Element::new("path").with_attr("stroke", "var(--nope)"));
        normalize_tree(&mut root, &variable_opts());
        let path = root.element_children().find(|e| e.is("path")).expect("path");
        assert_eq!(path.attr("stroke"), None);
    }

    #[test]
    fn empty_fallbacks_and_uppercase_references_leave_no_var() {
        let markup = r#"<svg xmlns="http://www.w3.org/2000/svg" style="--c:#0000ff"><rect fill="var(--x,)" stroke="var(--y, )"/><rect fill="Var(--c)"/></svg>"#;
        let out = normalize_svg(markup, &variable_opts());
        assert!(!out.to_ascii_lowercase().contains("var("), "{out}");
        assert!(out.contains(r#"fill="rgb(0, 0, 255)""#), "{out}");
    }

    #[test]
    fn variables_outside_the_allow_list_resolve_too() {
        let mut root = Element::new("svg")
            .with_attr("style", "--accent:#00ff00")
            .with_child(Element::new("stop").with_attr("stop-color", "var(--accent)"));
        normalize_tree(&mut root, &variable_opts());
        let stop = root.element_children().find(|e| e.is("stop")).expect("stop");
        assert_eq!(stop.attr("stop-color"), Some("rgb(0, 255, 0)"));
    }

    #[test]
    fn unparseable_background_skips_the_rect() {
        let mut root = Element::new("svg")
            .with_attr("style", "--bg:url(#pattern)")
            .with_child(Element::new("g"));
        normalize_tree(&mut root, &variable_opts());
        assert!(root.first_element_child().is_some_and(|e| e.is("g")));
    }

    #[test]
    fn mono_class_detection_uses_word_boundaries() {
        let mut root = Element::new("svg")
            .with_child(Element::new("text").with_attr("class", "a mono b"))
            .with_child(Element::new("text").with_attr("class", "monospace"));
        normalize_tree(&mut root, &variable_opts());
        let texts: Vec<&Element> = root.element_children().filter(|e| e.is("text")).collect();
        assert_eq!(texts[0].attr("font-family"), Some(PDF_MONO_FONT_STACK));
        assert_eq!(texts[1].attr("font-family"), Some("Inter, sans-serif"));
    }

    #[test]
    fn rich_text_pins_fonts_and_replaces_override_block() {
        let mut root = Element::new("svg")
            .with_child(Element::new("text").with_child(Element::new("tspan")))
            .with_child(
                Element::new("foreignObject").with_child(
                    Element::new("div")
                        .with_attr("style", "color: red")
                        .with_child(Element::new("code").with_child(Element::new("span"))),
                ),
            );
        let opts = NormalizeOptions::new(SourceShape::RichText).with_font_stack("Inter");
        normalize_tree(&mut root, &opts);
        normalize_tree(&mut root, &opts);

        let out = root.to_svg_string();
        assert_eq!(out.matches("data-portable-fonts").count(), 1);
        assert!(out.contains(r#"<text font-family="Inter"><tspan font-family="Inter"/></text>"#));
        assert!(out.contains(r#"<div style="color: red; font-family: Inter;">"#));
        let mono_inline = format!("<span style=\"font-family: {};\"/>", PDF_MONO_FONT_STACK);
        assert!(out.contains(&mono_inline), "{out}");
    }
}

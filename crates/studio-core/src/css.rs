//! Inline style declarations, custom properties and `color-mix()`.

use indexmap::IndexMap;
use regex::{Captures, Regex};
use rustc_hash::FxHashMap;
use std::sync::OnceLock;

use crate::color::{canonicalize_css_color, mix_colors};

/// Upper bound on `var()` substitution passes; cyclic references stop here.
pub const MAX_VARIABLE_PASSES: usize = 8;
/// Upper bound on `color-mix()` evaluation passes (one per nesting level).
pub const MAX_COLOR_MIX_PASSES: usize = 6;

/// Custom property name (`--bg`) to resolved literal value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableTable {
    vars: FxHashMap<String, String>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Like [`VariableTable::get`], but treats empty values as undefined.
    pub fn get_non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.trim().is_empty())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for VariableTable {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut table = Self::default();
        for (k, v) in iter {
            table.insert(k, v);
        }
        table
    }
}

/// Parses an inline `style` attribute into an ordered declaration map.
///
/// Chunks without a `:` or with an empty name/value are skipped; a repeated property keeps
/// the last value.
pub fn parse_style_declarations(style: &str) -> IndexMap<String, String> {
    let mut map = IndexMap::new();
    for chunk in style.split(';') {
        let Some((prop, value)) = chunk.split_once(':') else {
            continue;
        };
        let prop = prop.trim();
        let value = value.trim();
        if prop.is_empty() || value.is_empty() {
            continue;
        }
        map.insert(prop.to_string(), value.to_string());
    }
    map
}

pub fn serialize_style_declarations(decls: &IndexMap<String, String>) -> String {
    let mut out = String::new();
    for (prop, value) in decls {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(prop);
        out.push_str(": ");
        out.push_str(value);
        out.push(';');
    }
    out
}

fn re_var() -> &'static Regex {
    static ONCE: OnceLock<Regex> = OnceLock::new();
    // The fallback may contain one level of parentheses (`rgb(...)`, an inner `var(...)`).
    ONCE.get_or_init(|| {
        Regex::new(r"(?i)var\(\s*(--[\w-]+)\s*(?:,\s*((?:[^()]|\([^()]*\))*))?\)").unwrap()
    })
}

fn re_color_mix() -> &'static Regex {
    static ONCE: OnceLock<Regex> = OnceLock::new();
    ONCE.get_or_init(|| {
        Regex::new(
            r"(?i)color-mix\(\s*in\s+srgb\s*,\s*((?:[^,()]|\([^()]*\))+?)\s+([0-9.]+)%\s*,\s*((?:[^,()]|\([^()]*\))+?)(?:\s+[0-9.]+%)?\s*\)",
        )
        .unwrap()
    })
}

/// Whether `value` holds a `var(` reference, in any ASCII case.
pub fn has_var_reference(value: &str) -> bool {
    value.to_ascii_lowercase().contains("var(")
}

/// Substitutes `var(--name[, fallback])` references.
///
/// Undefined (or empty) variables take the fallback clause, or the empty string without one.
/// Substitution repeats until the value is stable or [`MAX_VARIABLE_PASSES`] is reached; any
/// reference still present after that (a cycle) collapses to its fallback or to nothing.
pub fn resolve_css_variables(value: &str, vars: &VariableTable) -> String {
    let mut result = value.trim().to_string();
    for _ in 0..MAX_VARIABLE_PASSES {
        if !has_var_reference(&result) {
            break;
        }
        let next = re_var()
            .replace_all(&result, |caps: &Captures<'_>| {
                match vars.get_non_empty(&caps[1]) {
                    Some(v) => v.trim().to_string(),
                    None => fallback_clause(caps),
                }
            })
            .into_owned();
        if next == result {
            break;
        }
        result = next;
    }

    if has_var_reference(&result) {
        result = collapse_unresolved_variables(&result);
    }
    result.trim().to_string()
}

fn fallback_clause(caps: &Captures<'_>) -> String {
    caps.get(2)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

fn collapse_unresolved_variables(value: &str) -> String {
    let mut result = value.to_string();
    for _ in 0..MAX_VARIABLE_PASSES {
        let next = re_var()
            .replace_all(&result, |caps: &Captures<'_>| {
                // A fallback that itself references a variable is part of the cycle.
                let fallback = fallback_clause(caps);
                if has_var_reference(&fallback) {
                    String::new()
                } else {
                    fallback
                }
            })
            .into_owned();
        if next == result {
            break;
        }
        result = next;
    }
    result
}

/// Evaluates `color-mix(in srgb, C1 P%, C2)` expressions, innermost first.
///
/// Each pass evaluates the last well-formed `color-mix(` in the value, which cannot contain
/// another one, so nested mixes resolve from the inside out.
pub fn resolve_color_mix_functions(value: &str) -> String {
    let mut result = value.trim().to_string();
    for _ in 0..MAX_COLOR_MIX_PASSES {
        match evaluate_innermost_color_mix(&result) {
            Some(next) if next != result => result = next,
            _ => break,
        }
    }
    result
}

fn evaluate_innermost_color_mix(value: &str) -> Option<String> {
    // ASCII lowercasing keeps byte offsets aligned with `value`.
    let lower = value.to_ascii_lowercase();
    let mut end = lower.len();
    while let Some(start) = lower[..end].rfind("color-mix(") {
        if let Some(caps) = re_color_mix().captures(&value[start..]) {
            let whole = caps.get(0)?;
            if whole.start() == 0 {
                let c1 = caps[1].trim();
                let c2 = caps[3].trim();
                let mixed = match caps[2].parse::<f64>() {
                    Ok(weight) => mix_colors(c1, c2, weight),
                    Err(_) => c1.to_string(),
                };
                return Some(format!(
                    "{}{}{}",
                    &value[..start],
                    mixed,
                    &value[start + whole.end()..]
                ));
            }
        }
        end = start;
    }
    None
}

/// Resolves a color-valued property: variables, then `color-mix()`, then canonical form.
///
/// Values that are not colors after resolution (`url(#grad)`, `currentColor`, garbage) are
/// returned in their resolved-but-uncanonicalized form.
pub fn resolve_color_value(value: &str, vars: &VariableTable) -> String {
    if value.is_empty() || value == "none" {
        return value.to_string();
    }
    let resolved = resolve_css_variables(value, vars);
    let resolved = resolve_color_mix_functions(&resolved);
    canonicalize_css_color(&resolved).unwrap_or(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> VariableTable {
        pairs.iter().copied().collect()
    }

    #[test]
    fn declarations_skip_malformed_chunks() {
        let decls = parse_style_declarations("fill: red; ;stroke:;: blue; font-family: 'A', B ;");
        assert_eq!(decls.len(), 2);
        assert_eq!(decls.get("fill").map(String::as_str), Some("red"));
        assert_eq!(decls.get("font-family").map(String::as_str), Some("'A', B"));
    }

    #[test]
    fn declarations_keep_the_last_duplicate() {
        let decls = parse_style_declarations("fill: red; fill: blue");
        assert_eq!(decls.get("fill").map(String::as_str), Some("blue"));
        assert_eq!(serialize_style_declarations(&decls), "fill: blue;");
    }

    #[test]
    fn declarations_split_on_first_colon_only() {
        let decls = parse_style_declarations("font-family: a:b; fill:red");
        assert_eq!(decls.get("font-family").map(String::as_str), Some("a:b"));
        assert_eq!(decls.get("fill").map(String::as_str), Some("red"));
    }

    #[test]
    fn variables_resolve_recursively() {
        let v = vars(&[("--a", "var(--b)"), ("--b", "#123456")]);
        assert_eq!(resolve_css_variables("var(--a)", &v), "#123456");
    }

    #[test]
    fn undefined_variable_takes_fallback_or_empty() {
        let v = vars(&[]);
        assert_eq!(resolve_css_variables("var(--x, #fff)", &v), "#fff");
        assert_eq!(resolve_css_variables("var(--x)", &v), "");
        assert_eq!(
            resolve_css_variables("var(--x, rgb(1, 2, 3))", &v),
            "rgb(1, 2, 3)"
        );
        assert_eq!(resolve_css_variables("var(--x,)", &v), "");
        assert_eq!(resolve_css_variables("var(--x, )", &v), "");
    }

    #[test]
    fn function_name_is_case_insensitive() {
        let v = vars(&[("--c", "#123456")]);
        assert_eq!(resolve_css_variables("Var(--c)", &v), "#123456");
        assert_eq!(resolve_css_variables("VAR(--missing, red)", &v), "red");
        assert!(has_var_reference("VaR(--c)"));
        assert!(!has_var_reference("#fff"));
    }

    #[test]
    fn empty_variable_counts_as_undefined() {
        let v = vars(&[("--x", "")]);
        assert_eq!(resolve_css_variables("var(--x, blue)", &v), "blue");
    }

    #[test]
    fn nested_fallback_resolves() {
        let v = vars(&[("--b", "green")]);
        assert_eq!(resolve_css_variables("var(--a, var(--b))", &v), "green");
        let v = vars(&[("--a", "red"), ("--b", "green")]);
        assert_eq!(resolve_css_variables("var(--a, var(--b))", &v), "red");
    }

    #[test]
    fn cyclic_variables_terminate_without_leftover_references() {
        let v = vars(&[("--a", "var(--b)"), ("--b", "var(--a)")]);
        let out = resolve_css_variables("var(--a, #abc)", &v);
        assert!(!out.contains("var("), "got {out}");

        let v = vars(&[("--loop", "var(--loop, black)")]);
        let out = resolve_css_variables("var(--loop)", &v);
        assert!(!out.contains("var("), "got {out}");
    }

    #[test]
    fn color_mix_endpoints() {
        assert_eq!(
            resolve_color_mix_functions("color-mix(in srgb, #ff0000 100%, #0000ff)"),
            "rgb(255, 0, 0)"
        );
        assert_eq!(
            resolve_color_mix_functions("color-mix(in srgb, #ff0000 0%, #0000ff)"),
            "rgb(0, 0, 255)"
        );
    }

    #[test]
    fn color_mix_accepts_functional_operands_and_nesting() {
        assert_eq!(
            resolve_color_mix_functions(
                "color-mix(in srgb, rgb(255, 255, 255) 30%, rgb(0, 0, 0))"
            ),
            "rgb(77, 77, 77)"
        );
        assert_eq!(
            resolve_color_mix_functions(
                "color-mix(in srgb, color-mix(in srgb, #fff 100%, #000) 30%, #000)"
            ),
            "rgb(77, 77, 77)"
        );
        assert_eq!(
            resolve_color_mix_functions("COLOR-MIX(in srgb, #fff 30%, #000 70%)"),
            "rgb(77, 77, 77)"
        );
    }

    #[test]
    fn color_mix_with_unparseable_operand_degrades_to_first_operand() {
        assert_eq!(
            resolve_color_mix_functions("color-mix(in srgb, bogus 40%, #000)"),
            "bogus"
        );
    }

    #[test]
    fn color_value_pipeline() {
        let v = vars(&[("--fg", "#ffffff"), ("--bg", "#000000")]);
        assert_eq!(
            resolve_color_value("color-mix(in srgb, var(--fg) 30%, var(--bg))", &v),
            "rgb(77, 77, 77)"
        );
        assert_eq!(resolve_color_value("none", &v), "none");
        assert_eq!(resolve_color_value("url(#grad)", &v), "url(#grad)");
        assert_eq!(resolve_color_value("var(--fg)", &v), "rgb(255, 255, 255)");
    }
}

//! Font-family stacks.

pub const DEFAULT_UI_FONT: &str =
    "-apple-system, BlinkMacSystemFont, 'SF Pro Text', 'Helvetica Neue', sans-serif";
pub const DEFAULT_CODE_FONT: &str = "'SF Mono', 'JetBrains Mono', Menlo, Monaco, monospace";
pub const DEFAULT_CHART_FONT: &str = DEFAULT_UI_FONT;
/// Monospace stack forced onto code-like text in exported documents.
pub const PDF_MONO_FONT_STACK: &str =
    "'JetBrains Mono', 'SF Mono', 'Fira Code', 'Menlo', 'Monaco', monospace";

/// Family used when a stack names no concrete family at all.
pub const LAST_RESORT_FAMILY: &str = "Helvetica";

/// Families offered when the system font list cannot be read.
pub const FALLBACK_SYSTEM_FONTS: &[&str] = &[
    "Arial",
    "Courier New",
    "Georgia",
    "Helvetica Neue",
    "Inter",
    "Menlo",
    "Monaco",
    "SF Pro",
    "Times New Roman",
    "Verdana",
];

const MAX_FONT_SUGGESTIONS: usize = 80;

pub fn normalize_font_value(raw: Option<&str>, fallback: &str) -> String {
    match raw.map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => fallback.to_string(),
    }
}

fn is_generic_family(name: &str) -> bool {
    ["sans-serif", "serif", "monospace", "system-ui"]
        .iter()
        .any(|g| name.eq_ignore_ascii_case(g))
}

/// Concrete family names of a CSS `font-family` stack, unquoted, generics dropped.
pub fn parse_font_family_stack(stack: &str) -> Vec<String> {
    stack
        .split(',')
        .map(|part| {
            let part = part.trim();
            let part = part.strip_prefix(['\'', '"']).unwrap_or(part);
            part.strip_suffix(['\'', '"']).unwrap_or(part)
        })
        .filter(|name| !name.is_empty() && !is_generic_family(name))
        .map(str::to_string)
        .collect()
}

/// First family of `stack` installed on the system (matched case-insensitively, returned with
/// the system's spelling), else the first declared family, else [`LAST_RESORT_FAMILY`].
pub fn resolve_preferred_font_family<S: AsRef<str>>(stack: &str, system_fonts: &[S]) -> String {
    let candidates = parse_font_family_stack(stack);
    let Some(first) = candidates.first() else {
        return LAST_RESORT_FAMILY.to_string();
    };
    for family in &candidates {
        let hit = system_fonts
            .iter()
            .map(AsRef::as_ref)
            .find(|f| f.eq_ignore_ascii_case(family));
        if let Some(hit) = hit {
            return hit.to_string();
        }
    }
    first.clone()
}

/// Autocomplete: prefix matches first, then substring matches, case-insensitive.
pub fn filter_fonts<'a, S: AsRef<str>>(query: &str, fonts: &'a [S]) -> Vec<&'a str> {
    let fonts = fonts.iter().map(AsRef::as_ref);
    if query.trim().is_empty() {
        return fonts.take(MAX_FONT_SUGGESTIONS).collect();
    }
    let lower = query.to_lowercase();
    let mut prefix = Vec::new();
    let mut contains = Vec::new();
    for font in fonts {
        let fl = font.to_lowercase();
        if fl.starts_with(&lower) {
            prefix.push(font);
        } else if fl.contains(&lower) {
            contains.push(font);
        }
    }
    prefix.extend(contains);
    prefix.truncate(MAX_FONT_SUGGESTIONS);
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_parsing_drops_quotes_and_generics() {
        assert_eq!(
            parse_font_family_stack(DEFAULT_CODE_FONT),
            ["SF Mono", "JetBrains Mono", "Menlo", "Monaco"]
        );
        assert_eq!(parse_font_family_stack(" \"Inter\" , system-ui,,Serif"), ["Inter"]);
        assert!(parse_font_family_stack("monospace").is_empty());
    }

    #[test]
    fn preferred_family_uses_system_spelling() {
        let system = ["arial", "Menlo"];
        assert_eq!(
            resolve_preferred_font_family("'Nope', 'MENLO', monospace", &system),
            "Menlo"
        );
        assert_eq!(resolve_preferred_font_family("Nope, Other", &system), "Nope");
        assert_eq!(resolve_preferred_font_family("sans-serif", &system), "Helvetica");
    }

    #[test]
    fn font_value_normalization() {
        assert_eq!(normalize_font_value(Some("  Inter "), "x"), "Inter");
        assert_eq!(normalize_font_value(Some("   "), "x"), "x");
        assert_eq!(normalize_font_value(None, "x"), "x");
    }

    #[test]
    fn filter_ranks_prefix_before_substring() {
        let fonts = ["Fira Code", "Menlo", "Courier New", "Code New Roman"];
        assert_eq!(filter_fonts("co", &fonts), ["Courier New", "Code New Roman", "Fira Code"]);
        assert_eq!(filter_fonts("", &fonts).len(), 4);
    }
}

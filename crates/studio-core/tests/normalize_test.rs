use std::fs;
use std::path::{Path, PathBuf};

use studio_core::fonts::PDF_MONO_FONT_STACK;
use studio_core::normalize::PORTABLE_FONTS_ATTR;
use studio_core::{ChartTheme, NormalizeOptions, RenderEngine, SourceShape, normalize_svg};

fn repo_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("expected crates/<name> layout")
        .to_path_buf()
}

fn fixture(name: &str) -> String {
    let path = repo_root().join("fixtures").join("svg").join(name);
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("fixture {}: {e}", path.display()))
}

fn variable_opts() -> NormalizeOptions {
    NormalizeOptions::for_engine(RenderEngine::Beautiful).with_font_stack("Inter, sans-serif")
}

fn rich_opts() -> NormalizeOptions {
    NormalizeOptions::for_engine(RenderEngine::MermaidJs).with_font_stack("Inter, sans-serif")
}

fn first_element_child<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
) -> Option<roxmltree::Node<'a, 'input>> {
    node.children().find(|n| n.is_element())
}

fn by_id<'a, 'input>(
    doc: &'a roxmltree::Document<'input>,
    id: &str,
) -> roxmltree::Node<'a, 'input> {
    doc.descendants()
        .find(|n| n.attribute("id") == Some(id))
        .unwrap_or_else(|| panic!("no element with id {id}"))
}

fn background_rects(doc: &roxmltree::Document<'_>) -> usize {
    doc.root_element()
        .children()
        .filter(|n| {
            n.has_tag_name("rect")
                && n.attribute("width") == Some("100%")
                && n.attribute("height") == Some("100%")
        })
        .count()
}

#[test]
fn variable_driven_output_is_free_of_css_machinery() {
    let out = normalize_svg(&fixture("variable-driven.svg"), &variable_opts());
    assert!(!out.contains("var("), "{out}");
    assert!(!out.contains("color-mix("), "{out}");
    assert!(!out.contains("class="), "{out}");
    assert!(!out.contains("style="), "{out}");
    assert!(!out.contains("<style"), "{out}");
    roxmltree::Document::parse(&out).expect("well-formed output");
}

#[test]
fn derived_slots_reach_the_elements() {
    let out = normalize_svg(&fixture("variable-driven.svg"), &variable_opts());
    let doc = roxmltree::Document::parse(&out).expect("parse");

    let edge = by_id(&doc, "edge");
    assert_eq!(edge.attribute("stroke"), Some("rgb(77, 77, 77)"));
    assert_eq!(edge.attribute("fill"), Some("none"));
    assert_eq!(edge.attribute("marker-end"), Some("url(#arrow)"));

    let polygon = doc
        .descendants()
        .find(|n| n.has_tag_name("polygon"))
        .expect("polygon");
    assert_eq!(polygon.attribute("fill"), Some("rgb(128, 128, 128)"));

    let node_rect = doc
        .descendants()
        .find(|n| n.has_tag_name("rect") && n.attribute("rx") == Some("4"))
        .expect("node rect");
    assert_eq!(node_rect.attribute("fill"), Some("rgb(8, 8, 8)"));
    assert_eq!(node_rect.attribute("stroke"), Some("rgb(51, 51, 51)"));
    let group = node_rect.parent_element().expect("group");
    assert_eq!(group.attribute("stroke-width"), Some("1"));
}

#[test]
fn text_gets_foreground_fill_and_font_stacks() {
    let out = normalize_svg(&fixture("variable-driven.svg"), &variable_opts());
    let doc = roxmltree::Document::parse(&out).expect("parse");

    let label = doc
        .descendants()
        .find(|n| n.has_tag_name("text") && n.text() == Some("Start"))
        .expect("label");
    assert_eq!(label.attribute("fill"), Some("rgb(255, 255, 255)"));
    assert_eq!(label.attribute("font-family"), Some("Inter, sans-serif"));

    let code = by_id(&doc, "code");
    assert_eq!(code.attribute("font-family"), Some(PDF_MONO_FONT_STACK));
}

#[test]
fn text_fill_follows_foreground() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" style="--bg:#ffffff;--fg:#111827"><text>hi</text></svg>"#;
    let out = normalize_svg(svg, &variable_opts());
    let doc = roxmltree::Document::parse(&out).expect("parse");
    let text = doc
        .descendants()
        .find(|n| n.has_tag_name("text"))
        .expect("text");
    assert_eq!(text.attribute("fill"), Some("rgb(17, 24, 39)"));
}

#[test]
fn opaque_background_becomes_exactly_one_first_rect() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" style="--bg:#ffffff;--fg:#000000"><g/></svg>"#;
    let out = normalize_svg(svg, &variable_opts());
    let doc = roxmltree::Document::parse(&out).expect("parse");
    assert_eq!(background_rects(&doc), 1);
    let first = first_element_child(doc.root_element()).expect("child");
    assert!(first.has_tag_name("rect"));
    assert_eq!(first.attribute("fill"), Some("rgb(255, 255, 255)"));
    assert_eq!(first.attribute("x"), Some("0"));
    assert_eq!(first.attribute("y"), Some("0"));
}

#[test]
fn transparent_background_adds_no_rect() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" style="--bg:rgba(0,0,0,0);--fg:#000000"><g/></svg>"#;
    let out = normalize_svg(svg, &variable_opts());
    let doc = roxmltree::Document::parse(&out).expect("parse");
    assert_eq!(background_rects(&doc), 0);
    assert!(first_element_child(doc.root_element()).is_some_and(|n| n.has_tag_name("g")));
}

#[test]
fn theme_seeds_the_background_when_markup_has_none() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg"><g/></svg>"#;
    let theme = ChartTheme::builtin("github-dark").expect("theme");
    let out = normalize_svg(svg, &variable_opts().with_theme(theme));
    let doc = roxmltree::Document::parse(&out).expect("parse");
    let first = first_element_child(doc.root_element()).expect("child");
    assert_eq!(first.attribute("fill"), Some("rgb(13, 17, 23)"));
}

#[test]
fn color_mix_endpoints_select_one_operand() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" style="--bg:transparent"><rect id="a" fill="color-mix(in srgb, #ff0000 100%, #0000ff)"/><rect id="b" fill="color-mix(in srgb, #ff0000 0%, #0000ff)"/></svg>"#;
    let out = normalize_svg(svg, &variable_opts());
    let doc = roxmltree::Document::parse(&out).expect("parse");
    assert_eq!(by_id(&doc, "a").attribute("fill"), Some("rgb(255, 0, 0)"));
    assert_eq!(by_id(&doc, "b").attribute("fill"), Some("rgb(0, 0, 255)"));
}

#[test]
fn unresolvable_colors_pass_through() {
    let svg = r#"<svg xmlns="http://www.w3.org/2000/svg"><rect id="g" fill="url(#grad)" stroke="currentColor"/></svg>"#;
    let out = normalize_svg(svg, &variable_opts());
    let doc = roxmltree::Document::parse(&out).expect("parse");
    let rect = by_id(&doc, "g");
    assert_eq!(rect.attribute("fill"), Some("url(#grad)"));
    assert_eq!(rect.attribute("stroke"), Some("currentColor"));
}

#[test]
fn variable_driven_normalization_is_idempotent() {
    let opts = variable_opts();
    for source in [
        fixture("variable-driven.svg"),
        r#"<svg xmlns="http://www.w3.org/2000/svg" style="--bg:transparent"><text>t</text></svg>"#
            .to_string(),
    ] {
        let once = normalize_svg(&source, &opts);
        let twice = normalize_svg(&once, &opts);
        assert_eq!(once, twice);
    }
}

#[test]
fn malformed_or_foreign_markup_is_returned_unchanged() {
    let opts = variable_opts();
    for source in ["<svg><g></svg>", "not markup at all", "<html><body/></html>", ""] {
        assert_eq!(normalize_svg(source, &opts), source);
    }
}

#[test]
fn rich_text_pins_fonts_and_keeps_classes() {
    let out = normalize_svg(&fixture("rich-text.svg"), &rich_opts());
    let doc = roxmltree::Document::parse(&out).expect("parse");

    for node in doc
        .descendants()
        .filter(|n| n.has_tag_name("text") || n.has_tag_name("tspan"))
    {
        assert_eq!(node.attribute("font-family"), Some("Inter, sans-serif"));
    }

    let div = doc
        .descendants()
        .find(|n| n.tag_name().name() == "div")
        .expect("div");
    assert_eq!(
        div.attribute("style"),
        Some("display: table-cell; white-space: nowrap; font-family: Inter, sans-serif;")
    );
    let code = doc
        .descendants()
        .find(|n| n.tag_name().name() == "code")
        .expect("code");
    let expected = format!("font-family: {PDF_MONO_FONT_STACK};");
    assert_eq!(code.attribute("style"), Some(expected.as_str()));

    let overrides: Vec<_> = doc
        .root_element()
        .children()
        .filter(|n| n.has_tag_name("style") && n.attribute(PORTABLE_FONTS_ATTR).is_some())
        .collect();
    assert_eq!(overrides.len(), 1);
    let css = overrides[0].text().unwrap_or_default();
    assert!(css.contains("text, tspan {"));
    assert!(css.contains("code, pre"));

    assert!(out.contains(r#"class="node default""#));
    assert!(out.contains("#mermaid-1{font-family"));
}

#[test]
fn rich_text_normalization_is_idempotent() {
    let opts = rich_opts();
    let once = normalize_svg(&fixture("rich-text.svg"), &opts);
    let twice = normalize_svg(&once, &opts);
    assert_eq!(once, twice);
}

#[test]
fn shapes_follow_the_engine() {
    assert_eq!(
        NormalizeOptions::for_engine(RenderEngine::MermaidJs).shape,
        SourceShape::RichText
    );
    assert_eq!(NormalizeOptions::default().shape, SourceShape::VariableDriven);
}

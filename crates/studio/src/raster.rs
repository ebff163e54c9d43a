#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use studio_core::color::Rgba;
use studio_core::dom::{Element, SVG_NS, parse_svg};
use studio_core::fonts::{FALLBACK_SYSTEM_FONTS, LAST_RESORT_FAMILY};

#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    #[error("failed to parse SVG: {0}")]
    SvgParse(String),
    #[error("SVG has invalid dimensions")]
    InvalidDimensions,
    #[error("failed to allocate {width}x{height} pixmap for raster rendering")]
    PixmapAlloc { width: u32, height: u32 },
    #[error("failed to encode PNG")]
    PngEncode,
    #[error("failed to convert SVG to PDF: {0}")]
    PdfConvert(String),
    #[error("SVG contains text but no fonts are available to draw it")]
    NoFonts,
}

pub type Result<T> = std::result::Result<T, RasterError>;

pub const POINTS_PER_INCH: f32 = 72.0;
pub const MIN_RASTER_SCALE: f32 = 1.0;
pub const MAX_RASTER_SCALE: f32 = 8.0;
pub const DEFAULT_PNG_SCALE: f32 = 2.0;
pub const DEFAULT_PDF_RASTER_SCALE: f32 = 4.0;
pub const DEFAULT_PDF_DPI: f32 = 96.0;
pub const MAX_PDF_DPI: f32 = 300.0;
pub const LETTER_WIDTH_PT: f32 = 612.0;
pub const LETTER_HEIGHT_PT: f32 = 792.0;
pub const DEFAULT_PAGE_MARGIN_PT: f32 = 36.0;

#[derive(Debug, Clone, PartialEq)]
pub struct RasterOptions {
    /// Pixels per SVG unit, clamped to `1..=8`.
    pub scale: f32,
    pub preferred_font_family: Option<String>,
    /// CSS color painted under the drawing; `None` keeps the pixmap transparent.
    pub background: Option<String>,
    /// Scan installed fonts before rendering text.
    pub system_fonts: bool,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            scale: DEFAULT_PNG_SCALE,
            preferred_font_family: None,
            background: None,
            system_fonts: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PdfOptions {
    /// Resolution multiplier for content svg2pdf has to rasterize (filters, masks).
    pub raster_scale: f32,
    /// SVG units per inch of the source drawing, clamped to `72..=300`.
    pub dpi: f32,
    pub preferred_font_family: Option<String>,
    pub page_background_rgb: Option<[u8; 3]>,
    pub page_width_pt: f32,
    pub page_height_pt: f32,
    pub page_margin_pt: f32,
    pub system_fonts: bool,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            raster_scale: DEFAULT_PDF_RASTER_SCALE,
            dpi: DEFAULT_PDF_DPI,
            preferred_font_family: None,
            page_background_rgb: None,
            page_width_pt: LETTER_WIDTH_PT,
            page_height_pt: LETTER_HEIGHT_PT,
            page_margin_pt: DEFAULT_PAGE_MARGIN_PT,
            system_fonts: true,
        }
    }
}

fn font_family_or_default(preferred: Option<&str>) -> String {
    preferred
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(LAST_RESORT_FAMILY)
        .to_string()
}

// Points `sans-serif`/`serif` at an installed face when their defaults are not installed.
// `Family` and `Query` resolve at the call site, so each usvg version brings its own.
macro_rules! bind_generic_families {
    ($db:expr) => {{
        let db = $db;
        let installed = db
            .faces()
            .find_map(|face| face.families.first().map(|(name, _)| name.clone()));
        if let Some(name) = installed {
            let has = |family: Family<'_>| {
                db.query(&Query {
                    families: &[family],
                    ..Query::default()
                })
                .is_some()
            };
            let (sans, serif) = (has(Family::SansSerif), has(Family::Serif));
            if !sans {
                tracing::debug!("binding sans-serif to installed family {name:?}");
                db.set_sans_serif_family(name.clone());
            }
            if !serif {
                db.set_serif_family(name);
            }
        }
    }};
}

fn png_usvg_options(preferred: Option<&str>, system_fonts: bool) -> usvg::Options<'static> {
    use usvg::fontdb::{Family, Query};

    let mut opt = usvg::Options::default();
    if system_fonts {
        opt.fontdb_mut().load_system_fonts();
        bind_generic_families!(opt.fontdb_mut());
    }
    opt.font_family = font_family_or_default(preferred);
    opt
}

// svg2pdf re-exports its own usvg version.
fn pdf_usvg_options(
    preferred: Option<&str>,
    system_fonts: bool,
) -> svg2pdf::usvg::Options<'static> {
    use svg2pdf::usvg::fontdb::{Family, Query};

    let mut opt = svg2pdf::usvg::Options::default();
    if system_fonts {
        opt.fontdb_mut().load_system_fonts();
        bind_generic_families!(opt.fontdb_mut());
    }
    opt.font_family = font_family_or_default(preferred);
    opt
}

fn clamp_scale(scale: f32) -> f32 {
    if scale.is_finite() {
        scale.clamp(MIN_RASTER_SCALE, MAX_RASTER_SCALE)
    } else {
        MIN_RASTER_SCALE
    }
}

fn to_tiny_skia_color(css: &str) -> Option<tiny_skia::Color> {
    let c = Rgba::parse(css)?;
    Some(tiny_skia::Color::from_rgba8(c.r, c.g, c.b, c.a))
}

/// True when `svg` has a non-empty `<text>` outside `foreignObject`.
fn has_drawable_text(svg: &str) -> bool {
    let Ok(mut root) = parse_svg(svg) else {
        return false;
    };
    let mut found = false;
    root.walk_mut(&mut |el, in_foreign_object| {
        if !in_foreign_object && el.is("text") && !el.text_content().trim().is_empty() {
            found = true;
        }
    });
    found
}

/// Rejects text-bearing markup when no font faces are loaded.
fn ensure_fonts_for_text(svg: &str, fonts_loaded: bool) -> Result<()> {
    if !fonts_loaded && has_drawable_text(svg) {
        return Err(RasterError::NoFonts);
    }
    Ok(())
}

pub fn svg_to_png(svg: &str, options: &RasterOptions) -> Result<Vec<u8>> {
    let opt = png_usvg_options(options.preferred_font_family.as_deref(), options.system_fonts);
    ensure_fonts_for_text(svg, !opt.fontdb.is_empty())?;
    let tree =
        usvg::Tree::from_str(svg, &opt).map_err(|e| RasterError::SvgParse(e.to_string()))?;

    let scale = clamp_scale(options.scale);
    let width = (tree.size().width() * scale).round().max(1.0) as u32;
    let height = (tree.size().height() * scale).round().max(1.0) as u32;
    tracing::debug!("rasterizing SVG to {width}x{height} PNG at scale {scale}");

    let mut pixmap =
        tiny_skia::Pixmap::new(width, height).ok_or(RasterError::PixmapAlloc { width, height })?;
    if let Some(bg) = options.background.as_deref() {
        match to_tiny_skia_color(bg) {
            Some(color) => pixmap.fill(color),
            None => tracing::warn!("ignoring unparseable PNG background {bg:?}"),
        }
    }

    resvg::render(
        &tree,
        tiny_skia::Transform::from_scale(scale, scale),
        &mut pixmap.as_mut(),
    );
    pixmap.encode_png().map_err(|_| RasterError::PngEncode)
}

pub fn svg_units_to_points(svg_units: f32, dpi: f32) -> f32 {
    let safe_dpi = if dpi.is_finite() {
        dpi.clamp(POINTS_PER_INCH, MAX_PDF_DPI)
    } else {
        DEFAULT_PDF_DPI
    };
    svg_units * POINTS_PER_INCH / safe_dpi
}

/// Largest uniform scale that fits the source inside the page minus margins. The margin is
/// capped below half of either page side.
pub fn fit_scale(
    source_width: f32,
    source_height: f32,
    page_width: f32,
    page_height: f32,
    margin: f32,
) -> f32 {
    let safe_margin = margin
        .min(page_width * 0.49)
        .min(page_height * 0.49)
        .max(0.0);
    let available_width = (page_width - safe_margin * 2.0).max(1.0);
    let available_height = (page_height - safe_margin * 2.0).max(1.0);
    let width_scale = available_width / source_width.max(1e-6);
    let height_scale = available_height / source_height.max(1e-6);
    width_scale.min(height_scale)
}

/// Returns `(page_width, page_height, scale)`, rotating the page to landscape only when that
/// strictly enlarges the drawing.
pub fn select_best_layout(
    source_width: f32,
    source_height: f32,
    base_page_width: f32,
    base_page_height: f32,
    margin: f32,
) -> (f32, f32, f32) {
    let portrait = fit_scale(
        source_width,
        source_height,
        base_page_width,
        base_page_height,
        margin,
    );
    let landscape = fit_scale(
        source_width,
        source_height,
        base_page_height,
        base_page_width,
        margin,
    );
    if landscape > portrait {
        (base_page_height, base_page_width, landscape)
    } else {
        (base_page_width, base_page_height, portrait)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    pub page_width_pt: f32,
    pub page_height_pt: f32,
    pub draw_width_pt: f32,
    pub draw_height_pt: f32,
    pub offset_x_pt: f32,
    pub offset_y_pt: f32,
}

impl PageLayout {
    /// Centers a drawing of `source_width`x`source_height` SVG units on the configured page.
    pub fn compute(source_width: f32, source_height: f32, options: &PdfOptions) -> Result<Self> {
        let source_width_pt = svg_units_to_points(source_width, options.dpi);
        let source_height_pt = svg_units_to_points(source_height, options.dpi);
        if !(source_width_pt > 0.0 && source_height_pt > 0.0) {
            return Err(RasterError::InvalidDimensions);
        }

        let (page_width_pt, page_height_pt, scale) = select_best_layout(
            source_width_pt,
            source_height_pt,
            options.page_width_pt.max(POINTS_PER_INCH),
            options.page_height_pt.max(POINTS_PER_INCH),
            options.page_margin_pt.max(0.0),
        );
        let draw_width_pt = source_width_pt * scale;
        let draw_height_pt = source_height_pt * scale;
        Ok(Self {
            page_width_pt,
            page_height_pt,
            draw_width_pt,
            draw_height_pt,
            offset_x_pt: (page_width_pt - draw_width_pt) * 0.5,
            offset_y_pt: (page_height_pt - draw_height_pt) * 0.5,
        })
    }
}

fn num(v: f32) -> String {
    let rounded = (v * 1000.0).round() / 1000.0;
    format!("{rounded}")
}

/// Wraps the drawing into a page-sized SVG (1 unit = 1pt): optional background rect, then the
/// original root as a nested `<svg>` placed at the layout's offset.
pub fn compose_pdf_page(
    drawing: Element,
    source_width: f32,
    source_height: f32,
    layout: &PageLayout,
    background: Option<[u8; 3]>,
) -> String {
    let mut nested = drawing;
    if nested.attr("viewBox").is_none() {
        nested.set_attr(
            "viewBox",
            format!("0 0 {} {}", num(source_width), num(source_height)),
        );
    }
    nested.set_attr("x", num(layout.offset_x_pt));
    nested.set_attr("y", num(layout.offset_y_pt));
    nested.set_attr("width", num(layout.draw_width_pt));
    nested.set_attr("height", num(layout.draw_height_pt));

    let width = num(layout.page_width_pt);
    let height = num(layout.page_height_pt);
    let mut page = Element::new("svg")
        .with_attr("xmlns", SVG_NS)
        .with_attr("width", width.clone())
        .with_attr("height", height.clone())
        .with_attr("viewBox", format!("0 0 {width} {height}"));
    if let Some([r, g, b]) = background {
        page.push_child(
            Element::new("rect")
                .with_attr("x", "0")
                .with_attr("y", "0")
                .with_attr("width", width)
                .with_attr("height", height)
                .with_attr("fill", Rgba::opaque(r, g, b).to_css()),
        );
    }
    page.push_child(nested);
    page.to_svg_string()
}

pub fn svg_to_pdf(svg: &str, options: &PdfOptions) -> Result<Vec<u8>> {
    let opt = pdf_usvg_options(options.preferred_font_family.as_deref(), options.system_fonts);
    ensure_fonts_for_text(svg, !opt.fontdb.is_empty())?;
    let source = svg2pdf::usvg::Tree::from_str(svg, &opt)
        .map_err(|e| RasterError::SvgParse(e.to_string()))?;
    let (source_width, source_height) = (source.size().width(), source.size().height());
    let layout = PageLayout::compute(source_width, source_height, options)?;
    tracing::debug!(
        "placing {source_width}x{source_height} drawing on a {}x{}pt page",
        layout.page_width_pt,
        layout.page_height_pt
    );

    let drawing = parse_svg(svg).map_err(|e| RasterError::SvgParse(e.to_string()))?;
    let page_svg = compose_pdf_page(
        drawing,
        source_width,
        source_height,
        &layout,
        options.page_background_rgb,
    );
    let page = svg2pdf::usvg::Tree::from_str(&page_svg, &opt)
        .map_err(|e| RasterError::SvgParse(e.to_string()))?;

    let raster_scale = clamp_scale(options.raster_scale);
    svg2pdf::to_pdf(
        &page,
        svg2pdf::ConversionOptions {
            raster_scale,
            ..svg2pdf::ConversionOptions::default()
        },
        svg2pdf::PageOptions {
            dpi: POINTS_PER_INCH,
        },
    )
    .map_err(|e| RasterError::PdfConvert(e.to_string()))
}

/// Sorted, de-duplicated primary family names of the installed fonts. Falls back to a fixed
/// list when the scan finds nothing.
pub fn list_system_fonts() -> Vec<String> {
    let mut db = usvg::fontdb::Database::new();
    db.load_system_fonts();
    let families: BTreeSet<String> = db
        .faces()
        .filter_map(|face| face.families.first().map(|(name, _)| name.clone()))
        .collect();
    if families.is_empty() {
        tracing::warn!("no system fonts found; using the built-in family list");
        return FALLBACK_SYSTEM_FONTS.iter().map(|s| s.to_string()).collect();
    }
    families.into_iter().collect()
}

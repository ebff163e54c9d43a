#![forbid(unsafe_code)]

//! Export pipeline: portable SVG, then PNG or PDF through a primary backend with a single
//! fallback tier.
//!
//! The host application supplies the save dialog ([`DestinationPicker`]) and, for the
//! rich-text engine, a way to re-render without embedded HTML ([`DiagramRenderer`]). All other
//! work is CPU-bound; the only awaits are on those two collaborators.

use std::future::Future;
use std::path::{Path, PathBuf};

use studio_core::fonts::resolve_preferred_font_family;
use studio_core::settings::png_quality_to_scale;
use studio_core::{
    ChartTheme, ExportFormat, NormalizeOptions, RenderEngine, Settings, SourceShape,
    normalize_svg,
};

use crate::raster::{self, PdfOptions, RasterError, RasterOptions};

pub const DEFAULT_FILE_STEM: &str = "mermaid-diagram";
/// Family generic enough to resolve without a system font scan.
pub const BUILTIN_FONT_FAMILY: &str = "sans-serif";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("nothing to export: no diagram has been rendered yet")]
    NothingToExport,

    #[error("rasterization failed ({primary}); fallback also failed ({fallback})")]
    Rasterize {
        primary: RasterError,
        fallback: RasterError,
    },

    #[error("failed to render diagram: {0}")]
    Render(String),

    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ExportError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Written(PathBuf),
    Cancelled,
}

/// Save-location prompt. `None` means the user dismissed it.
pub trait DestinationPicker {
    fn pick(
        &mut self,
        format: ExportFormat,
        suggested_name: &str,
    ) -> impl Future<Output = Option<PathBuf>>;
}

/// A picker that always answers with the same path (or always cancels).
#[derive(Debug, Clone, Default)]
pub struct FixedDestination(pub Option<PathBuf>);

impl DestinationPicker for FixedDestination {
    fn pick(
        &mut self,
        _format: ExportFormat,
        _suggested_name: &str,
    ) -> impl Future<Output = Option<PathBuf>> {
        futures::future::ready(self.0.clone())
    }
}

/// Re-renders the diagram source as plain SVG without HTML labels.
pub trait DiagramRenderer {
    fn render_plain(
        &self,
        source: &str,
        theme: Option<&ChartTheme>,
    ) -> impl Future<Output = Result<String>>;
}

/// Renderer for hosts that cannot re-render; exports fall back to the cached preview.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRenderer;

impl DiagramRenderer for NoRenderer {
    fn render_plain(
        &self,
        _source: &str,
        _theme: Option<&ChartTheme>,
    ) -> impl Future<Output = Result<String>> {
        futures::future::ready(Err(ExportError::Render(
            "no plain renderer configured".to_string(),
        )))
    }
}

pub trait RasterBackend {
    fn name(&self) -> &'static str;
    fn png(&self, svg: &str, options: &RasterOptions) -> raster::Result<Vec<u8>>;
    fn pdf(&self, svg: &str, options: &PdfOptions) -> raster::Result<Vec<u8>>;
}

/// Renders with the installed fonts and the caller's preferred family.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

impl RasterBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn png(&self, svg: &str, options: &RasterOptions) -> raster::Result<Vec<u8>> {
        raster::svg_to_png(svg, options)
    }

    fn pdf(&self, svg: &str, options: &PdfOptions) -> raster::Result<Vec<u8>> {
        raster::svg_to_pdf(svg, options)
    }
}

/// Asks for a generic family instead of the caller's preferred one.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinBackend;

impl RasterBackend for BuiltinBackend {
    fn name(&self) -> &'static str {
        "builtin"
    }

    fn png(&self, svg: &str, options: &RasterOptions) -> raster::Result<Vec<u8>> {
        let options = RasterOptions {
            preferred_font_family: Some(BUILTIN_FONT_FAMILY.to_string()),
            ..options.clone()
        };
        raster::svg_to_png(svg, &options)
    }

    fn pdf(&self, svg: &str, options: &PdfOptions) -> raster::Result<Vec<u8>> {
        let options = PdfOptions {
            preferred_font_family: Some(BUILTIN_FONT_FAMILY.to_string()),
            ..options.clone()
        };
        raster::svg_to_pdf(svg, &options)
    }
}

/// What one export works from: the engine that produced the preview, its theme and fonts,
/// the diagram source and the cached preview markup.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSession {
    pub engine: RenderEngine,
    pub theme: Option<ChartTheme>,
    pub font_stack: String,
    pub source: String,
    pub cached_svg: Option<String>,
    pub png_quality: u8,
}

impl ExportSession {
    pub fn new(engine: RenderEngine, cached_svg: impl Into<String>) -> Self {
        let settings = Settings::default();
        Self {
            engine,
            theme: None,
            font_stack: settings.chart_font,
            source: String::new(),
            cached_svg: Some(cached_svg.into()),
            png_quality: settings.png_quality,
        }
    }

    /// Session for the current settings. Unknown theme names leave the theme unset.
    pub fn from_settings(
        settings: &Settings,
        system_is_dark: bool,
        source: impl Into<String>,
        cached_svg: Option<String>,
    ) -> Self {
        let theme_name = settings.chart_theme_name(system_is_dark);
        let theme = ChartTheme::builtin(theme_name);
        if theme.is_none() {
            tracing::warn!("unknown chart theme {theme_name:?}; exporting without theme seeds");
        }
        Self {
            engine: settings.render_engine,
            theme,
            font_stack: settings.chart_font.clone(),
            source: source.into(),
            cached_svg,
            png_quality: settings.png_quality,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_theme(mut self, theme: ChartTheme) -> Self {
        self.theme = Some(theme);
        self
    }

    pub fn with_font_stack(mut self, stack: impl Into<String>) -> Self {
        self.font_stack = stack.into();
        self
    }

    pub fn with_png_quality(mut self, quality: u8) -> Self {
        self.png_quality = quality;
        self
    }

    pub fn normalize_options(&self) -> NormalizeOptions {
        let opts =
            NormalizeOptions::for_engine(self.engine).with_font_stack(self.font_stack.clone());
        match &self.theme {
            Some(theme) => opts.with_theme(theme.clone()),
            None => opts,
        }
    }
}

pub struct Exporter<P, D = NoRenderer> {
    picker: P,
    renderer: D,
    primary: Box<dyn RasterBackend>,
    fallback: Box<dyn RasterBackend>,
    system_fonts: Vec<String>,
}

impl<P: DestinationPicker> Exporter<P> {
    /// Native backend first, builtin backend as fallback, no re-rendering.
    pub fn new(picker: P) -> Self {
        Self {
            picker,
            renderer: NoRenderer,
            primary: Box::new(NativeBackend),
            fallback: Box::new(BuiltinBackend),
            system_fonts: Vec::new(),
        }
    }
}

impl<P: DestinationPicker, D: DiagramRenderer> Exporter<P, D> {
    pub fn with_renderer<R: DiagramRenderer>(self, renderer: R) -> Exporter<P, R> {
        Exporter {
            picker: self.picker,
            renderer,
            primary: self.primary,
            fallback: self.fallback,
            system_fonts: self.system_fonts,
        }
    }

    pub fn with_backends(
        mut self,
        primary: Box<dyn RasterBackend>,
        fallback: Box<dyn RasterBackend>,
    ) -> Self {
        self.primary = primary;
        self.fallback = fallback;
        self
    }

    /// Installed families used to pick the preferred family out of the session's font stack.
    pub fn with_system_fonts(mut self, fonts: Vec<String>) -> Self {
        self.system_fonts = fonts;
        self
    }

    pub fn picker(&self) -> &P {
        &self.picker
    }

    fn preferred_font_family(&self, session: &ExportSession) -> String {
        resolve_preferred_font_family(&session.font_stack, &self.system_fonts)
    }

    /// Self-contained SVG for the session. Rich-text sessions are re-rendered without HTML
    /// labels first; when that fails the cached preview is normalized instead.
    pub async fn portable_svg(&self, session: &ExportSession) -> Result<String> {
        let cached = session
            .cached_svg
            .as_deref()
            .ok_or(ExportError::NothingToExport)?;
        let opts = session.normalize_options();
        if opts.shape == SourceShape::VariableDriven {
            return Ok(normalize_svg(cached, &opts));
        }

        let plain = match self
            .renderer
            .render_plain(&session.source, session.theme.as_ref())
            .await
        {
            Ok(svg) => svg,
            Err(err) => {
                tracing::warn!("plain re-render failed, exporting the cached preview: {err}");
                cached.to_string()
            }
        };
        Ok(normalize_svg(&plain, &opts))
    }

    fn with_fallback<T>(
        &self,
        kind: &str,
        run: impl Fn(&dyn RasterBackend) -> raster::Result<T>,
    ) -> Result<T> {
        let primary = match run(self.primary.as_ref()) {
            Ok(out) => return Ok(out),
            Err(err) => err,
        };
        tracing::warn!(
            "{} {kind} conversion failed, falling back to {}: {primary}",
            self.primary.name(),
            self.fallback.name()
        );
        run(self.fallback.as_ref())
            .map_err(|fallback| ExportError::Rasterize { primary, fallback })
    }

    pub fn rasterize_png(&self, svg: &str, options: &RasterOptions) -> Result<Vec<u8>> {
        self.with_fallback("PNG", |backend| backend.png(svg, options))
    }

    pub fn rasterize_pdf(&self, svg: &str, options: &PdfOptions) -> Result<Vec<u8>> {
        self.with_fallback("PDF", |backend| backend.pdf(svg, options))
    }

    pub fn png_options(&self, session: &ExportSession) -> RasterOptions {
        RasterOptions {
            scale: png_quality_to_scale(session.png_quality) as f32,
            preferred_font_family: Some(self.preferred_font_family(session)),
            ..RasterOptions::default()
        }
    }

    pub fn pdf_options(&self, session: &ExportSession) -> PdfOptions {
        PdfOptions {
            preferred_font_family: Some(self.preferred_font_family(session)),
            page_background_rgb: session.theme.as_ref().map(ChartTheme::background_rgb),
            ..PdfOptions::default()
        }
    }

    /// Runs one export. SVG and PDF ask for the destination up front; PNG rasterizes first so
    /// a conversion error surfaces before the dialog opens.
    pub async fn export(
        &mut self,
        session: &ExportSession,
        format: ExportFormat,
    ) -> Result<ExportOutcome> {
        if session.cached_svg.is_none() {
            return Err(ExportError::NothingToExport);
        }
        let suggested = format!("{DEFAULT_FILE_STEM}.{}", format.extension());

        match format {
            ExportFormat::Svg => {
                let Some(path) = self.picker.pick(format, &suggested).await else {
                    return Ok(ExportOutcome::Cancelled);
                };
                let svg = self.portable_svg(session).await?;
                write_file(&path, svg.as_bytes())?;
                Ok(ExportOutcome::Written(path))
            }
            ExportFormat::Png => {
                let svg = self.portable_svg(session).await?;
                let bytes = self.rasterize_png(&svg, &self.png_options(session))?;
                let Some(path) = self.picker.pick(format, &suggested).await else {
                    return Ok(ExportOutcome::Cancelled);
                };
                write_file(&path, &bytes)?;
                Ok(ExportOutcome::Written(path))
            }
            ExportFormat::Pdf => {
                let Some(path) = self.picker.pick(format, &suggested).await else {
                    return Ok(ExportOutcome::Cancelled);
                };
                let svg = self.portable_svg(session).await?;
                let bytes = self.rasterize_pdf(&svg, &self.pdf_options(session))?;
                write_file(&path, &bytes)?;
                Ok(ExportOutcome::Written(path))
            }
        }
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    std::fs::write(path, bytes).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!("wrote {} bytes to {}", bytes.len(), path.display());
    Ok(())
}

use futures::executor::block_on;
use serde_json::{Map, Value};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::str::FromStr;
use studio::export::{ExportError, ExportOutcome, ExportSession, Exporter, FixedDestination};
use studio::fonts::filter_fonts;
use studio::raster::list_system_fonts;
use studio::theme::builtin_theme_names;
use studio::{
    Appearance, ChartTheme, EventBus, ExportFormat, RenderEngine, Settings, SettingsStore,
    normalize_svg,
};

#[derive(Debug)]
enum CliError {
    Usage(&'static str),
    Io(std::io::Error),
    Studio(studio::Error),
    Export(ExportError),
    Json(serde_json::Error),
    Cancelled,
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Usage(msg) => write!(f, "{msg}"),
            CliError::Io(err) => write!(f, "I/O error: {err}"),
            CliError::Studio(err) => write!(f, "{err}"),
            CliError::Export(err) => write!(f, "Export failed: {err}"),
            CliError::Json(err) => write!(f, "JSON error: {err}"),
            CliError::Cancelled => write!(f, "Export cancelled"),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<studio::Error> for CliError {
    fn from(value: studio::Error) -> Self {
        Self::Studio(value)
    }
}

impl From<ExportError> for CliError {
    fn from(value: ExportError) -> Self {
        Self::Export(value)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

#[derive(Debug, Clone, Copy, Default)]
enum Command {
    #[default]
    Normalize,
    Export,
    Fonts,
    Themes,
}

#[derive(Debug, Default)]
struct Args {
    command: Command,
    input: Option<String>,
    engine: Option<RenderEngine>,
    theme: Option<String>,
    theme_file: Option<String>,
    font: Option<String>,
    format: Option<ExportFormat>,
    quality: Option<u8>,
    settings: Option<String>,
    dark: bool,
    filter: Option<String>,
    json: bool,
    out: Option<String>,
}

fn usage() -> &'static str {
    "studio-cli\n\
\n\
USAGE:\n\
  studio-cli [normalize] [--engine beautiful|mermaid-js] [--theme <name>|--theme-file <path>] [--font <stack>] [--settings <path>] [--dark] [--out <path>] [<path>|-]\n\
  studio-cli export [--format svg|png|pdf] [--quality <10-100>] [--engine beautiful|mermaid-js] [--theme <name>|--theme-file <path>] [--font <stack>] [--settings <path>] [--dark] [--out <path>] [<path>|-]\n\
  studio-cli fonts [--filter <query>] [--json]\n\
  studio-cli themes [--json]\n\
\n\
NOTES:\n\
  - If <path> is omitted or '-', rendered SVG is read from stdin.\n\
  - normalize prints portable SVG to stdout by default; use --out to write a file.\n\
  - export writes next to the input file (or ./mermaid-diagram.<ext> for stdin).\n\
  - --settings reads engine, chart font, chart themes, PNG quality and default format from a\n\
    settings file; explicit flags win.\n\
"
}

fn next_value<'a>(it: &mut impl Iterator<Item = &'a String>) -> Result<&'a String, CliError> {
    it.next().ok_or(CliError::Usage(usage()))
}

fn parse_args(argv: &[String]) -> Result<Args, CliError> {
    let mut args = Args::default();

    let mut it = argv.iter().skip(1);
    while let Some(a) = it.next() {
        match a.as_str() {
            "--help" | "-h" => return Err(CliError::Usage(usage())),
            "normalize" => args.command = Command::Normalize,
            "export" => args.command = Command::Export,
            "fonts" => args.command = Command::Fonts,
            "themes" => args.command = Command::Themes,
            "--json" => args.json = true,
            "--dark" => args.dark = true,
            "--engine" => {
                let engine = next_value(&mut it)?;
                args.engine = Some(
                    RenderEngine::from_str(engine).map_err(|_| CliError::Usage(usage()))?,
                );
            }
            "--theme" => args.theme = Some(next_value(&mut it)?.clone()),
            "--theme-file" => args.theme_file = Some(next_value(&mut it)?.clone()),
            "--font" => {
                let font = next_value(&mut it)?;
                if !font.trim().is_empty() {
                    args.font = Some(font.trim().to_string());
                }
            }
            "--format" => {
                let fmt = next_value(&mut it)?;
                args.format = Some(
                    fmt.parse::<ExportFormat>()
                        .map_err(|_| CliError::Usage(usage()))?,
                );
            }
            "--quality" => {
                let quality = next_value(&mut it)?;
                let quality = quality
                    .parse::<f64>()
                    .map_err(|_| CliError::Usage(usage()))?;
                if !quality.is_finite() {
                    return Err(CliError::Usage(usage()));
                }
                args.quality = Some(studio::settings::clamp_png_quality(quality));
            }
            "--settings" => args.settings = Some(next_value(&mut it)?.clone()),
            "--filter" => args.filter = Some(next_value(&mut it)?.clone()),
            "--out" => args.out = Some(next_value(&mut it)?.clone()),
            "--" => {
                if let Some(rest) = it.next() {
                    if args.input.is_some() {
                        return Err(CliError::Usage(usage()));
                    }
                    args.input = Some(rest.clone());
                }
                if it.next().is_some() {
                    return Err(CliError::Usage(usage()));
                }
            }
            other if other.starts_with('-') && other != "-" => {
                return Err(CliError::Usage(usage()));
            }
            path => {
                if args.input.is_some() {
                    return Err(CliError::Usage(usage()));
                }
                args.input = Some(path.to_string());
            }
        }
    }

    Ok(args)
}

fn read_input(input: Option<&str>) -> Result<String, CliError> {
    match input {
        None | Some("-") => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            Ok(buf)
        }
        Some(path) => Ok(std::fs::read_to_string(path)?),
    }
}

fn write_json(value: &Value) -> Result<(), CliError> {
    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

fn default_out_path(input: Option<&str>, ext: &str) -> PathBuf {
    match input {
        Some(path) if path != "-" => PathBuf::from(path).with_extension(ext),
        _ => PathBuf::from(format!("{}.{ext}", studio::export::DEFAULT_FILE_STEM)),
    }
}

fn load_settings(args: &Args) -> Settings {
    let mut settings = match args.settings.as_deref() {
        Some(path) => SettingsStore::load(path, EventBus::new()).settings().clone(),
        None => Settings::default(),
    };
    if let Some(engine) = args.engine {
        settings.render_engine = engine;
    }
    if let Some(font) = &args.font {
        settings.chart_font = font.clone();
    }
    if let Some(quality) = args.quality {
        settings.png_quality = quality;
    }
    if args.dark {
        settings.appearance = Appearance::Dark;
    }
    settings
}

fn resolve_theme(args: &Args, settings: &Settings) -> Result<Option<ChartTheme>, CliError> {
    if let Some(path) = args.theme_file.as_deref() {
        let text = std::fs::read_to_string(path)?;
        return Ok(Some(ChartTheme::from_json_str(&text)?));
    }
    if let Some(name) = args.theme.as_deref() {
        return Ok(Some(ChartTheme::lookup(name)?));
    }
    if args.settings.is_some() || args.dark {
        return Ok(ChartTheme::builtin(settings.chart_theme_name(false)));
    }
    Ok(None)
}

fn build_session(
    args: &Args,
    settings: &Settings,
    svg: String,
) -> Result<ExportSession, CliError> {
    let mut session = ExportSession::from_settings(settings, false, "", Some(svg));
    session.theme = resolve_theme(args, settings)?;
    Ok(session)
}

fn run(args: Args) -> Result<(), CliError> {
    match args.command {
        Command::Normalize => {
            let svg = read_input(args.input.as_deref())?;
            let settings = load_settings(&args);
            let session = build_session(&args, &settings, svg.clone())?;
            let out = normalize_svg(&svg, &session.normalize_options());
            match args.out.as_deref() {
                None => print!("{out}"),
                Some(path) => std::fs::write(path, out)?,
            }
            Ok(())
        }
        Command::Export => {
            let svg = read_input(args.input.as_deref())?;
            let settings = load_settings(&args);
            let format = args.format.unwrap_or(settings.export_default_format);
            let session = build_session(&args, &settings, svg)?;
            let out = args
                .out
                .as_deref()
                .map(PathBuf::from)
                .unwrap_or_else(|| default_out_path(args.input.as_deref(), format.extension()));

            let mut exporter = Exporter::new(FixedDestination(Some(out)));
            if format != ExportFormat::Svg {
                exporter = exporter.with_system_fonts(list_system_fonts());
            }
            match block_on(exporter.export(&session, format))? {
                ExportOutcome::Written(path) => {
                    eprintln!("wrote {}", path.display());
                    Ok(())
                }
                ExportOutcome::Cancelled => Err(CliError::Cancelled),
            }
        }
        Command::Fonts => {
            let fonts = list_system_fonts();
            let shown = filter_fonts(args.filter.as_deref().unwrap_or_default(), &fonts);
            if args.json {
                write_json(&Value::from(shown))?;
            } else {
                let mut stdout = std::io::stdout().lock();
                for family in shown {
                    writeln!(stdout, "{family}")?;
                }
            }
            Ok(())
        }
        Command::Themes => {
            let names = builtin_theme_names();
            if args.json {
                let mut map = Map::new();
                for name in names {
                    let theme = ChartTheme::lookup(name)?;
                    map.insert(name.to_string(), serde_json::to_value(theme)?);
                }
                write_json(&Value::Object(map))?;
            } else {
                let mut stdout = std::io::stdout().lock();
                for name in names {
                    writeln!(stdout, "{name}")?;
                }
            }
            Ok(())
        }
    }
}

fn main() {
    let args = match parse_args(&std::env::args().collect::<Vec<_>>()) {
        Ok(v) => v,
        Err(CliError::Usage(msg)) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = run(args) {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("studio-cli")
            .chain(args.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn parses_export_flags() {
        let args = parse_args(&argv(&[
            "export",
            "--format",
            "PDF",
            "--quality",
            "250",
            "--engine",
            "bautiful-mermaid",
            "in.svg",
        ]))
        .unwrap();
        assert!(matches!(args.command, Command::Export));
        assert_eq!(args.format, Some(ExportFormat::Pdf));
        assert_eq!(args.quality, Some(100));
        assert_eq!(args.engine, Some(RenderEngine::Beautiful));
        assert_eq!(args.input.as_deref(), Some("in.svg"));
    }

    #[test]
    fn rejects_unknown_flags_and_second_inputs() {
        assert!(matches!(
            parse_args(&argv(&["--bogus"])),
            Err(CliError::Usage(_))
        ));
        assert!(matches!(
            parse_args(&argv(&["a.svg", "b.svg"])),
            Err(CliError::Usage(_))
        ));
        assert!(matches!(
            parse_args(&argv(&["export", "--format", "gif"])),
            Err(CliError::Usage(_))
        ));
        assert!(parse_args(&argv(&["-"])).is_ok());
    }

    #[test]
    fn default_out_path_follows_input() {
        assert_eq!(
            default_out_path(Some("dir/chart.svg"), "png"),
            PathBuf::from("dir/chart.png")
        );
        assert_eq!(
            default_out_path(None, "pdf"),
            PathBuf::from("mermaid-diagram.pdf")
        );
    }
}

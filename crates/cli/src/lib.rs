mod script;

pub use script::{load_script, replay, Step};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use doc_model::{Color, Preferences};
use futures::executor::block_on;
use pdf_engine::{LopdfRasterizer, OpenSource, Rasterizer};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use storage::{Storage, StorageError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use viewer_core::{Editor, RasterSurface};

const DEFAULT_LOG_FILTER: &str = "markup=info,viewer_core=info";

#[derive(Debug, Parser)]
#[command(name = "markup")]
#[command(about = "Annotate PDF pages from the command line")]
pub struct Cli {
    /// Preferences file to use instead of the stored preferences.
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: String,
    },
    /// Replay an editing script and export the annotated page.
    Annotate {
        #[arg(value_name = "FILE")]
        file: String,
        #[arg(long, value_name = "SCRIPT")]
        script: PathBuf,
        #[arg(long, value_name = "DIR", default_value = ".")]
        output: PathBuf,
        /// Also save the final surface as a PNG.
        #[arg(long, value_name = "PNG")]
        preview: Option<PathBuf>,
    },
    /// Highlight or replace whole-word matches on one page.
    Search {
        #[arg(value_name = "FILE")]
        file: String,
        #[arg(value_name = "QUERY")]
        query: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, value_name = "TEXT")]
        replace: Option<String>,
        #[arg(long, value_name = "PNG")]
        preview: Option<PathBuf>,
    },
    /// Print the effective preferences, saving any overrides first.
    Prefs {
        #[arg(long)]
        scale: Option<f32>,
        #[arg(long, value_name = "HEX")]
        color: Option<String>,
        #[arg(long)]
        dark_theme: Option<bool>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    first_page_size_pt: Option<PageSizeOutput>,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    width: f32,
    height: f32,
}

#[derive(Debug, Serialize)]
struct SearchOutput {
    page: u32,
    matches: usize,
}

#[derive(Debug, Default)]
struct PrefsOverrides {
    scale: Option<f32>,
    color: Option<String>,
    dark_theme: Option<bool>,
}

impl PrefsOverrides {
    fn is_empty(&self) -> bool {
        self.scale.is_none() && self.color.is_none() && self.dark_theme.is_none()
    }
}

/// Logs go to stderr; `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Annotate { file, script, output, preview } => {
            let preferences = load_preferences(cli.config.as_deref())?;
            run_annotate(&file, &script, &output, preview.as_deref(), preferences)
        }
        Commands::Search { file, query, page, replace, preview } => {
            let preferences = load_preferences(cli.config.as_deref())?;
            run_search(&file, &query, page, replace.as_deref(), preview.as_deref(), preferences)
        }
        Commands::Prefs { scale, color, dark_theme } => {
            let preferences = load_preferences(cli.config.as_deref())?;
            let overrides = PrefsOverrides { scale, color, dark_theme };
            run_prefs(cli.config.as_deref(), preferences, overrides)
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn load_preferences(config: Option<&Path>) -> Result<Preferences> {
    if let Some(path) = config {
        return storage::load_from_file(path)
            .with_context(|| format!("failed to load preferences from {}", path.display()));
    }
    match Storage::from_default_project() {
        Ok(store) => store.load_preferences().context("failed to load stored preferences"),
        Err(StorageError::NoDataDirectory) => Ok(Preferences::default()),
        Err(error) => Err(error.into()),
    }
}

fn open_source(location: &str) -> Result<OpenSource> {
    let source = OpenSource::from_location(location);
    if let OpenSource::Path(path) = &source {
        ensure_pdf_exists(path)?;
    }
    Ok(source)
}

fn run_info(file: &str) -> Result<()> {
    let source = open_source(file)?;
    let rasterizer = LopdfRasterizer::open(&source).context("failed to open PDF")?;

    let page_count = rasterizer.page_count();
    let first_page_size_pt = if page_count > 0 {
        let size = rasterizer.page_size(1)?;
        Some(PageSizeOutput { width: size.width_pt, height: size.height_pt })
    } else {
        None
    };

    let payload = InfoOutput { path: source.describe(), page_count, first_page_size_pt };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

fn run_annotate(
    file: &str,
    script: &Path,
    output: &Path,
    preview: Option<&Path>,
    preferences: Preferences,
) -> Result<()> {
    let steps = load_script(script)?;
    let source = open_source(file)?;

    let mut editor = block_on(Editor::open(source, preferences, RasterSurface::new(1, 1)))
        .context("failed to open PDF")?;
    block_on(replay(&mut editor, &steps))?;

    let exported = editor.export()?;
    let path = exported
        .save_to_dir(output)
        .with_context(|| format!("failed to write export to {}", output.display()))?;

    if let Some(preview) = preview {
        save_preview(&editor, preview)?;
    }
    editor.close();

    println!("{}", path.display());
    Ok(())
}

fn run_search(
    file: &str,
    query: &str,
    page: u32,
    replacement: Option<&str>,
    preview: Option<&Path>,
    preferences: Preferences,
) -> Result<()> {
    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }
    let source = open_source(file)?;

    let mut editor = block_on(Editor::open(source, preferences, RasterSurface::new(1, 1)))
        .context("failed to open PDF")?;
    if page != 1 {
        block_on(editor.go_to_page(page))?;
    }

    let matches = match replacement {
        Some(replacement) => block_on(editor.replace(query, replacement))?,
        None => block_on(editor.search(query))?,
    };

    if let Some(preview) = preview {
        save_preview(&editor, preview)?;
    }
    editor.close();

    let json = serde_json::to_string(&SearchOutput { page, matches })?;
    println!("{json}");
    Ok(())
}

fn run_prefs(
    config: Option<&Path>,
    mut preferences: Preferences,
    overrides: PrefsOverrides,
) -> Result<()> {
    if !overrides.is_empty() {
        if let Some(scale) = overrides.scale {
            preferences.scale = scale;
        }
        if let Some(hex) = overrides.color.as_deref() {
            preferences.annotation_color =
                Color::from_hex(hex).with_context(|| format!("invalid --color {hex}"))?;
        }
        if let Some(dark_theme) = overrides.dark_theme {
            preferences.dark_theme = dark_theme;
        }
        preferences = preferences.sanitized();

        match config {
            Some(path) => storage::save_to_file(path, &preferences)
                .with_context(|| format!("failed to save preferences to {}", path.display()))?,
            None => Storage::from_default_project()
                .and_then(|store| store.save_preferences(&preferences))
                .context("failed to save stored preferences")?,
        }
        tracing::info!("preferences saved");
    }

    let json = serde_json::to_string_pretty(&preferences)?;
    println!("{json}");
    Ok(())
}

fn save_preview<R: Rasterizer>(editor: &Editor<R, RasterSurface>, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    editor
        .coordinator()
        .surface()
        .save_png(path)
        .with_context(|| format!("failed to write image to {}", path.display()))
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

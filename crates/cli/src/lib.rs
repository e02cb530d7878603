use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use page_editor_cache::{LoaderSession, PageNumber};
use page_editor_core::{export_to_path, EngineConfig, ExportOptions, ExportStrategy, PageEngine};
use page_editor_render::{open_document, ColorMode, CropArea, DocumentSource, EditHistory, PageSizeCatalog};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Points of slack when matching page sizes against the catalog
const SIZE_TOLERANCE: f64 = 1.0;

#[derive(Debug, Parser)]
#[command(name = "page-editor")]
#[command(about = "Rotate, scale, crop and export PDF pages")]
pub struct Cli {
    /// Engine configuration file (JSON)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable page information.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Render one page with edits applied.
    Preview {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[command(flatten)]
        edit: EditArgs,
        #[arg(long)]
        output: PathBuf,
        /// Write the JPEG thumbnail instead of the full raster
        #[arg(long)]
        thumbnail: bool,
        /// Encode the thumbnail at full resolution
        #[arg(long, requires = "thumbnail")]
        full: bool,
    },
    /// Write an edited copy of the document.
    Export {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[command(flatten)]
        edit: EditArgs,
        /// Pages to edit, e.g. "1,3-5" (default: all)
        #[arg(long)]
        pages: Option<String>,
        #[arg(long)]
        grayscale: bool,
    },
}

#[derive(Debug, Args)]
struct EditArgs {
    /// Clockwise rotation in degrees
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    rotate: i32,
    /// Scale in percent
    #[arg(long, default_value_t = 100.0)]
    scale: f64,
    /// Horizontal offset in points
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    offset_x: f64,
    /// Vertical offset in points, downward
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    offset_y: f64,
    /// Normalized crop "x,y,width,height" in 0..1
    #[arg(long, value_parser = parse_crop)]
    crop: Option<CropArea>,
    /// Scale the crop up to fill the page
    #[arg(long)]
    fit_crop: bool,
}

impl EditArgs {
    fn to_edit_history(&self) -> EditHistory {
        let history = EditHistory::default()
            .with_rotation(self.rotate)
            .with_scale(self.scale)
            .with_offset(self.offset_x, self.offset_y);
        match self.crop {
            Some(crop) => history.with_crop(crop, self.fit_crop),
            None => history,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InfoOutput {
    path: String,
    page_count: u32,
    pages: Vec<PageOutput>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PageOutput {
    page: u32,
    width: f64,
    height: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct ExportOutput {
    output: String,
    pages: Vec<ExportedPage>,
}

#[derive(Debug, Serialize)]
struct ExportedPage {
    page: u32,
    strategy: ExportStrategy,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_tracing(cli.verbose);
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Preview { file, page, edit, output, thumbnail, full } => {
            let target = match (thumbnail, full) {
                (false, _) => PreviewTarget::Raster,
                (true, false) => PreviewTarget::Thumbnail,
                (true, true) => PreviewTarget::FullThumbnail,
            };
            run_preview(&file, page, &edit, &output, target, config)
        }
        Commands::Export { file, output, edit, pages, grayscale } => {
            run_export(&file, &output, &edit, pages.as_deref(), grayscale, &config)
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A subscriber may already be installed when run() is called twice in-process
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?
            .apply_env()?,
        None => EngineConfig::from_env()?,
    };
    Ok(config)
}

fn run_info(file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let source = open_document(file).context("failed to open PDF")?;
    let catalog = PageSizeCatalog::standard();

    let pages = (1..=source.page_count())
        .map(|page| -> Result<PageOutput> {
            let size = source.page_dimensions(page)?;
            Ok(PageOutput {
                page,
                width: size.width,
                height: size.height,
                size_name: catalog.identify(size, SIZE_TOLERANCE).map(str::to_owned),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let payload = InfoOutput {
        path: file.display().to_string(),
        page_count: source.page_count(),
        pages,
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PreviewTarget {
    Raster,
    Thumbnail,
    FullThumbnail,
}

fn run_preview(
    file: &Path,
    page: u32,
    edit: &EditArgs,
    output: &Path,
    target: PreviewTarget,
    config: EngineConfig,
) -> Result<()> {
    ensure_pdf_exists(file)?;
    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }
    let edit = edit.to_edit_history();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start runtime")?;

    runtime.block_on(async {
        let session: Arc<LoaderSession<dyn DocumentSource>> = Arc::new(LoaderSession::new());
        let engine = PageEngine::open_path(session, file, config, page)
            .await
            .context("failed to open PDF")?;
        if !engine.pipeline().source().renders_content() {
            tracing::warn!("pages render as placeholders; build with the `pdfium` feature to render page content");
        }

        if page > engine.page_count() {
            anyhow::bail!("page {page} out of range (document has {} pages)", engine.page_count());
        }
        if !edit.is_identity() {
            engine
                .apply_to_page(page, &edit)
                .with_context(|| format!("failed to apply edits to page {page}"))?;
        }

        if target == PreviewTarget::FullThumbnail && engine.record(PageNumber::Single(page)).is_some() {
            engine.upgrade_thumbnail(page)?;
        }
        let record = engine
            .record(PageNumber::Single(page))
            .with_context(|| format!("page {page} failed to render"))?;

        create_parent(output)?;
        let written = match target {
            PreviewTarget::Raster => record.display.save(output).map_err(std::io::Error::other),
            PreviewTarget::Thumbnail | PreviewTarget::FullThumbnail => fs::write(output, &record.thumbnail.jpeg),
        };
        written.with_context(|| format!("failed to write image to {}", output.display()))?;

        engine.close();
        Ok::<_, anyhow::Error>(())
    })?;

    println!("{}", output.display());
    Ok(())
}

fn run_export(
    file: &Path,
    output: &Path,
    edit: &EditArgs,
    pages: Option<&str>,
    grayscale: bool,
    config: &EngineConfig,
) -> Result<()> {
    ensure_pdf_exists(file)?;

    let source = open_document(file).context("failed to open PDF")?;
    let selected = match pages {
        Some(list) => parse_page_list(list, source.page_count())?,
        None => (1..=source.page_count()).collect(),
    };
    let edit = edit.to_edit_history();
    let edits: BTreeMap<u32, EditHistory> = selected.into_iter().map(|page| (page, edit.clone())).collect();

    let options = ExportOptions {
        color_mode: if grayscale { ColorMode::Grayscale } else { config.color_mode },
        raster_scale: config.export_raster_scale,
    };

    create_parent(output)?;
    let report = export_to_path(file, output, &edits, &options, source.as_ref())
        .with_context(|| format!("failed to export {}", output.display()))?;

    let payload = ExportOutput {
        output: output.display().to_string(),
        pages: report
            .pages
            .iter()
            .map(|(page, strategy)| ExportedPage { page: *page, strategy: *strategy })
            .collect(),
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
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

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn parse_crop(value: &str) -> Result<CropArea, String> {
    let parts = value
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| format!("crop must be four numbers, got {value:?}"))?;
    let &[x, y, width, height] = parts.as_slice() else {
        return Err(format!("crop must be x,y,width,height, got {value:?}"));
    };
    if [x, y, width, height].iter().any(|v| !(0.0..=1.0).contains(v)) {
        return Err("crop values are normalized and must lie in 0..1".to_string());
    }
    if width <= 0.0 || height <= 0.0 {
        return Err("crop width and height must be positive".to_string());
    }
    Ok(CropArea::new(x, y, width, height))
}

/// Parse "1,3-5" into page numbers, checked against `page_count`
fn parse_page_list(list: &str, page_count: u32) -> Result<BTreeSet<u32>> {
    let mut pages = BTreeSet::new();
    for part in list.split(',').map(str::trim).filter(|part| !part.is_empty()) {
        let (first, last) = match part.split_once('-') {
            Some((first, last)) => (first.trim(), last.trim()),
            None => (part, part),
        };
        let first: u32 = first.parse().with_context(|| format!("invalid page {part:?}"))?;
        let last: u32 = last.parse().with_context(|| format!("invalid page {part:?}"))?;
        if first == 0 || last < first || last > page_count {
            anyhow::bail!("page range {part:?} outside 1..={page_count}");
        }
        pages.extend(first..=last);
    }
    if pages.is_empty() {
        anyhow::bail!("no pages selected");
    }
    Ok(pages)
}

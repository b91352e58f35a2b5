use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use easy_watermark::settings::{Placement, ProcessMode, WatermarkKind};
use easy_watermark::{
    collect_images, ProcessResult, RenderSettings, TemplateStore, WatermarkAssets, WatermarkEngine,
};

#[derive(Parser)]
#[command(
    name = "easy-watermark",
    about = "Add text or logo watermarks to images, optionally removing a known overlay first",
    version,
    after_help = "Simple usage: easy-watermark photo.jpg -o out --text \"@me\" --font Font.ttf\n\n\
                  Overlay removal needs bg_48.png and bg_96.png in the assets directory."
)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Input image files or directories
    #[arg(required_unless_present = "list_templates")]
    inputs: Vec<PathBuf>,

    /// Output directory
    #[arg(short, long, required_unless_present = "list_templates")]
    output: Option<PathBuf>,

    /// JSON settings file (missing fields take their defaults)
    #[arg(short, long)]
    settings: Option<PathBuf>,

    /// Apply a template by id on top of the settings
    #[arg(short, long)]
    template: Option<String>,

    /// Template store file
    #[arg(
        long,
        env = "EASY_WATERMARK_TEMPLATES",
        default_value = "easy-watermark-templates.json"
    )]
    templates_file: PathBuf,

    /// List available templates and exit
    #[arg(long)]
    list_templates: bool,

    /// Remove the known overlay instead of adding a watermark
    #[arg(long)]
    remove: bool,

    /// With --remove, add the watermark after removal
    #[arg(long, requires = "remove")]
    then_add: bool,

    /// Watermark text
    #[arg(long, conflicts_with = "logo")]
    text: Option<String>,

    /// Font file for text watermarks
    #[arg(long)]
    font: Option<PathBuf>,

    /// Logo image for logo watermarks
    #[arg(long)]
    logo: Option<PathBuf>,

    /// Tile the watermark over the whole image
    #[arg(long)]
    tile: bool,

    /// Directory holding the overlay reference masks
    #[arg(long, env = "EASY_WATERMARK_ASSETS", default_value = "assets")]
    assets: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn init_logging(cli: &Cli) {
    let filter = if cli.quiet {
        EnvFilter::new("error")
    } else if cli.verbose {
        EnvFilter::new("easy_watermark=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    let mut store = match TemplateStore::open(&cli.templates_file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: Failed to open template store: {e}");
            process::exit(1);
        }
    };

    if cli.list_templates {
        for template in store.templates() {
            let origin = if template.is_builtin() { "built-in" } else { "user" };
            println!("{:<24} {} ({origin})", template.id, template.name);
        }
        return;
    }

    let settings = match build_settings(&cli, &mut store) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let assets = if settings.draws_watermark() {
        match WatermarkAssets::load(&settings.watermark) {
            Ok(a) => a,
            Err(e) => {
                eprintln!("Error: Failed to load watermark assets: {e}");
                process::exit(1);
            }
        }
    } else {
        WatermarkAssets::default()
    };

    let inputs = match expand_inputs(&cli.inputs) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };
    if inputs.is_empty() {
        eprintln!("Error: No supported images found");
        process::exit(1);
    }

    let Some(output_dir) = cli.output.as_deref() else {
        eprintln!("Error: Output directory is required");
        process::exit(1);
    };

    let engine = WatermarkEngine::with_asset_dir(&cli.assets);
    let results = engine.process_batch(&inputs, output_dir, &settings, &assets);

    let mut success_count = 0u32;
    let mut fail_count = 0u32;
    let mut cancelled = false;

    for r in &results {
        print_result(r, &cli);
        if r.success {
            success_count += 1;
        } else if r.cancelled {
            cancelled = true;
        } else {
            fail_count += 1;
        }
    }

    if results.len() > 1 && !cli.quiet {
        eprintln!();
        eprint!("[Summary] Processed: {success_count}");
        if fail_count > 0 {
            eprint!(", Failed: {fail_count}");
        }
        let skipped = inputs.len().saturating_sub(results.len());
        if skipped > 0 {
            eprint!(", Not attempted: {skipped}");
        }
        eprintln!(" (Total: {})", inputs.len());
    }

    if cancelled {
        process::exit(2);
    }
    if fail_count > 0 {
        process::exit(1);
    }
}

fn build_settings(cli: &Cli, store: &mut TemplateStore) -> easy_watermark::Result<RenderSettings> {
    let mut settings = match &cli.settings {
        Some(path) => RenderSettings::from_json_file(path)?,
        None => RenderSettings::default(),
    };

    if let Some(id) = &cli.template {
        let Some(template) = store.find(id).cloned() else {
            return Err(easy_watermark::Error::Settings(format!(
                "unknown template '{id}' (see --list-templates)"
            )));
        };
        template.apply(&mut settings);
        store.touch_recent(id)?;
    }

    let wm = &mut settings.watermark;
    if let Some(text) = &cli.text {
        wm.kind = WatermarkKind::Text;
        wm.text.content.clone_from(text);
    }
    if let Some(font) = &cli.font {
        wm.text.font = Some(font.clone());
    }
    if let Some(logo) = &cli.logo {
        wm.kind = WatermarkKind::Logo;
        wm.logo.path = Some(logo.clone());
    }
    if cli.tile {
        wm.placement = Placement::Tile;
    }
    if cli.remove {
        settings.process_mode = ProcessMode::RemoveOverlay;
        settings.remove_then_add = cli.then_add;
    }

    settings.validate()?;
    Ok(settings)
}

fn expand_inputs(inputs: &[PathBuf]) -> easy_watermark::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_dir() {
            files.extend(collect_images(input)?);
        } else if input.exists() {
            files.push(input.clone());
        } else {
            return Err(easy_watermark::Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("input path does not exist: {}", input.display()),
            )));
        }
    }
    Ok(files)
}

fn print_result(result: &ProcessResult, cli: &Cli) {
    if cli.quiet && result.success {
        return;
    }

    let filename = file_label(&result.path);

    if result.success {
        if cli.verbose {
            let output = result
                .output
                .as_deref()
                .map_or_else(String::new, |o| format!(" -> {}", o.display()));
            eprintln!("[OK] {filename}{output}: {}", result.message);
        } else if !cli.quiet {
            eprintln!("[OK] {filename}");
        }
    } else if result.cancelled {
        eprintln!("[CANCELLED] {filename}: {}", result.message);
    } else {
        eprintln!("[FAIL] {filename}: {}", result.message);
    }
}

fn file_label(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    )
}

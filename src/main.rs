use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use marginalia::dom::Document;
use marginalia::engine::MarginEngine;
use marginalia::fonts::CosmicTextMeasure;
use marginalia::geometry::Viewport;
use marginalia::provider::MeasuredGeometry;
use marginalia::EngineConfig;

/// Margin-annotation layout for rendered documents
#[derive(Parser, Debug)]
#[command(name = "marginalia")]
#[command(about = "Place footnote sidenotes in margin columns next to their citations", long_about = None)]
struct Args {
    /// Input document file (use "-" for stdin)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Output file path for the annotated document
    #[arg(short, long, value_name = "OUTPUT")]
    output: PathBuf,

    /// Path to an engine config file (TOML or YAML)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Viewport width in pixels
    #[arg(short = 'w', long, default_value_t = 1440.0)]
    viewport_width: f32,

    /// Viewport height in pixels
    #[arg(long, default_value_t = 900.0)]
    viewport_height: f32,

    /// Also write a JSON report of columns, cells and placements
    #[arg(long, value_name = "REPORT")]
    report: Option<PathBuf>,
}

fn main() -> Result<(), String> {
    env_logger::init();
    let args = Args::parse();

    // Load config
    let config = if let Some(ref config_path) = args.config {
        if config_path.exists() && config_path.is_file() {
            let content = std::fs::read_to_string(config_path)
                .map_err(|e| format!("Failed to read config file: {}", e))?;

            // Try TOML first, then YAML
            if let Ok(config) = EngineConfig::from_toml(&content) {
                config
            } else if let Ok(config) = EngineConfig::from_yaml(&content) {
                config
            } else {
                return Err("Failed to parse config file as TOML or YAML".to_string());
            }
        } else {
            return Err(format!("Config file not found: {}", config_path.display()));
        }
    } else {
        EngineConfig::default()
    };

    // Read document input
    let markup = if args.input.to_str() == Some("-") {
        let mut buffer = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut buffer)
            .map_err(|e| format!("Failed to read from stdin: {}", e))?;
        buffer
    } else {
        std::fs::read_to_string(&args.input)
            .map_err(|e| format!("Failed to read input file: {}", e))?
    };

    let doc = Document::parse(&markup)?;
    let container_sel = marginalia::dom::SelectorList::parse(&config.container)?;
    let Some(container) = doc.select(doc.root(), &container_sel).into_iter().next() else {
        return Err(format!("container '{}' not found", config.container));
    };

    let measure = CosmicTextMeasure::new()?;
    let mut geometry = MeasuredGeometry::new(measure);
    geometry.layout_document(&doc, container, args.viewport_width, &config);

    let debounce = config.debounce_ms;
    let mut engine = MarginEngine::new(doc, geometry, config)?;

    let t0 = Instant::now();
    let viewport = Viewport::new(args.viewport_width, args.viewport_height);
    engine.handle_viewport_change(viewport, t0);
    // Drain any debounced follow-up work before writing the result.
    engine.run_pending(t0 + Duration::from_millis(debounce + 1));

    std::fs::write(&args.output, engine.document().to_markup())
        .map_err(|e| format!("Failed to write output: {}", e))?;
    eprintln!("Annotated document saved to: {}", args.output.display());

    if let Some(ref report_path) = args.report {
        let report = serde_json::to_string_pretty(&engine.layout_report())
            .map_err(|e| format!("Failed to serialize report: {}", e))?;
        std::fs::write(report_path, report)
            .map_err(|e| format!("Failed to write report: {}", e))?;
        eprintln!("Layout report saved to: {}", report_path.display());
    }

    Ok(())
}

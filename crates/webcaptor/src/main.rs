//! webcaptor - HTTP traffic capture for axum services
//!
//! Runs a small demo service behind the capture layer and writes every
//! request/response pair to the log and, optionally, a JSONL file.

use axum::body::Body;
use axum::extract::Path;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::{Parser, Subcommand};
use futures_util::stream;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;
use webcaptor_capture::DefaultErrorAttributes;
use webcaptor_core::config::{CaptorConfig, ConfigLoader, ExcludedEndpoint};
use webcaptor_core::CapturePipeline;
use webcaptor_export::{JsonlSink, JsonlSinkConfig, TracingSink};
use webcaptor_layer::CaptureLayer;

#[derive(Parser)]
#[command(name = "webcaptor")]
#[command(author = "Oximy")]
#[command(version)]
#[command(about = "HTTP traffic capture for axum services", long_about = None)]
struct Cli {
    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log format (json, text)
    #[arg(short, long, default_value = "text")]
    format: String,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "WEBCAPTOR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the demo application behind the capture layer
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8080")]
        addr: SocketAddr,

        /// Output file for JSONL events
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Exclude a path pattern from capture (repeatable)
        #[arg(short, long)]
        exclude: Vec<String>,

        /// Response body timeout in milliseconds
        #[arg(long)]
        async_timeout_ms: Option<u64>,
    },

    /// Show the effective configuration
    Config {
        /// Write the configuration to this file instead of printing it
        #[arg(short, long)]
        write: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.clone());

    let level = match cli.verbose {
        0 => match config.captor.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "error" => Level::ERROR,
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    init_logging(level, &cli.format)?;

    match cli.command {
        Commands::Serve {
            addr,
            output,
            exclude,
            async_timeout_ms,
        } => {
            let config = merge_serve_config(config, exclude, async_timeout_ms);
            serve_command(config, addr, output).await
        }
        Commands::Config { write } => config_command(&config, write),
    }
}

fn init_logging(level: Level, format: &str) -> anyhow::Result<()> {
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format == "json" {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Load configuration from file or use defaults
fn load_config(cli_path: Option<PathBuf>) -> CaptorConfig {
    let loader = ConfigLoader::new().with_cli_path(cli_path);
    match loader.load() {
        Ok(config) => {
            info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            warn!("Failed to load config, using defaults: {}", e);
            CaptorConfig::default()
        }
    }
}

/// CLI flags extend or override the config file
fn merge_serve_config(
    mut config: CaptorConfig,
    exclude: Vec<String>,
    async_timeout_ms: Option<u64>,
) -> CaptorConfig {
    config
        .excluded_endpoints
        .extend(exclude.into_iter().map(|path| ExcludedEndpoint {
            method: "*".to_string(),
            path,
        }));
    if let Some(ms) = async_timeout_ms.filter(|ms| *ms > 0) {
        config.response.async_timeout_ms = ms;
    }
    config
}

/// Assemble the capture pipeline from the default plugins
fn build_pipeline(config: CaptorConfig, output: Option<PathBuf>) -> anyhow::Result<CapturePipeline> {
    let decoders = Arc::new(webcaptor_decode::default_registry(&config));
    let captors = webcaptor_capture::default_registry(
        &config,
        decoders.clone(),
        Arc::new(DefaultErrorAttributes::new()),
    );
    let enrichers = webcaptor_enrich::default_enrichers(&config);

    let mut pipeline = CapturePipeline::new(config, decoders, captors);
    for enricher in enrichers {
        pipeline.add_enricher(enricher);
    }

    pipeline.add_sink(Arc::new(TracingSink::new()));
    if let Some(path) = output {
        pipeline.add_sink(Arc::new(JsonlSink::new(JsonlSinkConfig {
            path,
            append: true,
            pretty: false,
            flush_each: true,
        })?));
    }

    Ok(pipeline)
}

async fn serve_command(
    config: CaptorConfig,
    addr: SocketAddr,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    info!("Starting webcaptor...");

    if !config.captor.enabled {
        warn!("Capture is disabled; requests will pass through untouched");
    }

    let pipeline = Arc::new(build_pipeline(config, output.clone())?);
    let app = demo_routes().layer(CaptureLayer::new(pipeline.clone()));

    let listener = tokio::net::TcpListener::bind(addr).await?;

    println!();
    println!("  webcaptor v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("  Listening on: http://{}", addr);
    if let Some(path) = &output {
        println!("  Output: {}", path.display());
    }
    println!();
    println!("  Press Ctrl+C to stop");
    println!();

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    pipeline.flush();
    let stats = pipeline.stats();
    info!(
        requests = stats.requests_published(),
        responses = stats.responses_published(),
        omitted = stats.responses_omitted(),
        skipped = stats.requests_skipped(),
        "webcaptor stopped"
    );

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
    }
}

fn config_command(config: &CaptorConfig, write: Option<PathBuf>) -> anyhow::Result<()> {
    match write {
        Some(path) => {
            ConfigLoader::new().save(config, &path)?;
            println!("Configuration written to {}", path.display());
        }
        None => print!("{}", toml::to_string_pretty(config)?),
    }
    Ok(())
}

// -----------------------------------------------------------------------------
// Demo application
// -----------------------------------------------------------------------------

fn demo_routes() -> Router {
    Router::new()
        .route("/hello", get(hello))
        .route("/echo", post(echo))
        .route("/users/{id}", get(user))
        .route("/fail", get(fail))
        .route("/events", get(events))
}

async fn hello() -> &'static str {
    "Hello, world!"
}

async fn echo(Json(body): Json<Value>) -> Json<Value> {
    Json(body)
}

async fn user(Path(id): Path<u32>) -> Json<Value> {
    Json(json!({ "id": id, "name": "Ada Lovelace" }))
}

async fn fail() -> &'static str {
    panic!("simulated handler failure")
}

/// Emits three server-sent events, one every 200ms
async fn events() -> Response {
    let ticks = stream::unfold(0u32, |n| async move {
        if n == 3 {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
        let frame = format!("id: {}\ndata: tick {}\n\n", n, n);
        Some((Ok::<_, std::io::Error>(frame), n + 1))
    });

    (
        [(header::CONTENT_TYPE, "text/event-stream")],
        Body::from_stream(ticks),
    )
        .into_response()
}

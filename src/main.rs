// src/main.rs

use core_view::{
    codec::ImageCodec,
    config::{BackendChoice, CONFIG},
    geometry::Geometry,
    input::KEY_BINDINGS,
    platform,
    session::Session,
    sources::{self, ImageList},
};

use anyhow::Context;
use clap::{ArgAction, CommandFactory, Parser};
use log::{debug, info};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

/// Browse images one at a time.
///
/// Sources are files or http(s) URLs, taken from the arguments, then from
/// the list file, then from piped standard input (one per line).
#[derive(Parser, Debug)]
#[command(
    name = "core-view",
    version,
    after_help = KEY_BINDINGS,
    disable_help_flag = true,
    disable_version_flag = true
)]
struct Cli {
    /// Image files or URLs.
    sources: Vec<String>,

    /// Initial window width.
    #[arg(short, long)]
    width: Option<u32>,

    /// Initial window height.
    #[arg(short = 'h', long)]
    height: Option<u32>,

    /// Read additional sources from FILE, one per line.
    #[arg(short = 'f', long = "file-list", value_name = "FILE")]
    file_list: Option<PathBuf>,

    /// Display backend: auto, x11, drm, framebuffer or native.
    #[arg(long)]
    backend: Option<BackendChoice>,

    /// Print version.
    #[arg(short = 'v', long, action = ArgAction::Version)]
    version: Option<bool>,

    /// Print help.
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

fn main() -> ExitCode {
    // stderr only: stdout carries the emitted sources.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp_micros()
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = CONFIG.clone();
    if let Some(width) = cli.width {
        config.window.width = width;
    }
    if let Some(height) = cli.height {
        config.window.height = height;
    }
    if let Some(backend) = cli.backend {
        config.display.backend = backend;
    }
    debug!("Effective configuration: {:?}", config);

    let stdin = std::io::stdin();
    let mut stdin_lock = stdin.lock();
    let piped: Option<&mut dyn std::io::Read> = if sources::stdin_is_piped() {
        Some(&mut stdin_lock)
    } else {
        None
    };
    let collected = sources::collect_sources(&cli.sources, cli.file_list.as_deref(), piped)?;
    let images = match ImageList::new(collected) {
        Ok(images) => images,
        Err(e) => {
            eprintln!("core-view: {}", e);
            eprintln!("{}\n\n{}", Cli::command().render_usage(), KEY_BINDINGS);
            return Ok(ExitCode::from(1));
        }
    };
    info!("Starting core-view with {} image(s)", images.len());

    let requested = Geometry::new(config.window.width, config.window.height);
    let mut surface = platform::open_surface(&config, requested)?;
    let codec = ImageCodec::new(&config);
    let mut stdout = std::io::stdout().lock();

    Session::new(
        images,
        config.navigation.jump_distance,
        &codec,
        surface.as_mut(),
        &mut stdout,
    )
    .run()
    .context("viewer stopped")?;
    stdout.flush()?;
    Ok(ExitCode::SUCCESS)
}

// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod app;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use prism_core::{init_tracing, load_toml};
use prism_platform::PlatformWindow;
use prism_render_vk::VkDriver;
use std::path::PathBuf;
use tracing::{info, warn};

use app::App;
use config::AppCfg;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file; missing means defaults
    #[arg(long, default_value = "prism.toml")]
    config: PathBuf,
    /// Stop after this many frame cycles
    #[arg(long)]
    frames: Option<u64>,
    /// Override [render] frames_in_flight
    #[arg(long)]
    frames_in_flight: Option<u32>,
    /// tracing filter directive, overrides [log] filter and RUST_LOG
    #[arg(long)]
    log: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let (mut cfg, cfg_err) = match load_toml::<AppCfg>(&args.config) {
        Ok(c) => (c, None),
        Err(e) => (AppCfg::default(), Some(e)),
    };
    init_tracing(args.log.as_deref().or(cfg.log.filter.as_deref()));
    if let Some(e) = cfg_err {
        warn!("{e}; using defaults");
    }
    if let Some(n) = args.frames_in_flight {
        cfg.render.frames_in_flight = n;
    }

    let window = PlatformWindow::new(cfg.window.width, cfg.window.height, &cfg.window.title)
        .context("opening window")?;
    let driver = VkDriver::new();

    let mut app = App::init(driver, window, &cfg.render, args.frames)
        .context("renderer startup")?;
    let result = app.run();
    app.shutdown();

    let stats = result.context("frame loop")?;
    info!(
        "done: {} frames, {} presented, {} skipped, {} present failures",
        stats.frames, stats.presented, stats.skipped, stats.present_failures
    );
    Ok(())
}

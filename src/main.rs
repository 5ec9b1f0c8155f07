// =============================================================================
// TRI-RENDERER - draws one triangle in a window, every frame
// =============================================================================
//
// Exit code 0 on a normal close. Any failure to set up or render is logged
// with a backtrace and aborts the process.

use anyhow::{Context, Result};
use std::fs::File;
use tri_renderer::{engine, Config};

fn main() {
    // Load configuration from config.toml; the outcome is logged below
    let (config, source) = Config::load();

    if let Err(e) = init_logging(&config) {
        eprintln!("Failed to initialize logging: {:#}", e);
    }

    log::info!("Starting tri-renderer");
    source.log();
    log::debug!("Config: {:?}", config);
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!("Present mode: {}", config.graphics.present_mode);
    log::info!(
        "Validation layers: {}",
        if config.validation_enabled() { "on" } else { "off" }
    );

    if let Err(e) = engine::run(config) {
        engine::fatal(&e);
    }
}

/// Initialize logging, optionally into the configured log file
fn init_logging(config: &Config) -> Result<()> {
    use env_logger::{Builder, Env, Target};

    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));

    if config.debug.log_to_file {
        let file = File::create(&config.debug.log_file)
            .with_context(|| format!("Failed to create log file {:?}", config.debug.log_file))?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder.try_init()?;
    Ok(())
}

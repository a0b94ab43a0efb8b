// SPDX-License-Identifier: GPL-3.0-only

//! Command implementations
//!
//! - Running the terminal magnifier
//! - Listing cameras
//! - Taking a single snapshot

use magnifier::backends::camera::LifecycleScope;
use magnifier::constants::timing;
use magnifier::errors::{AppError, AppResult};
use magnifier::terminal::{self, TerminalOptions};
use magnifier::{CameraFrame, CameraSession, Config, platform_for, storage};
use std::path::PathBuf;
use std::time::Instant;
use tokio::runtime::Runtime;
use tracing::info;

fn runtime() -> AppResult<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("magnifier-rt")
        .build()
        .map_err(|e| AppError::Other(format!("cannot start async runtime: {}", e)))
}

/// Run the interactive terminal magnifier
pub fn run_terminal(config: &Config) -> AppResult<()> {
    let runtime = runtime()?;
    let options = TerminalOptions {
        zoom_step: config.zoom_step,
        mirror: config.mirror_preview,
        snapshot_dir: storage::snapshot_directory(config),
    };
    terminal::run(
        &runtime,
        platform_for(config),
        config.session_settings(),
        options,
    )
}

/// Print the cameras the configured platform can bind
pub fn list_cameras(config: &Config) -> AppResult<()> {
    let platform = platform_for(config);
    let provider = platform
        .acquire_provider()
        .map_err(|e| AppError::Other(format!("{} platform: {}", platform.name(), e)))?;
    let cameras = provider.cameras();

    if cameras.is_empty() {
        println!("No cameras found.");
        return Ok(());
    }

    println!("Available cameras ({}):", platform.name());
    println!();
    for (index, camera) in cameras.iter().enumerate() {
        println!("  [{}] {}", index, camera.name);
        println!("      Path:   {}", camera.path);
        println!("      Facing: {}", camera.facing);
        if let Some(driver) = &camera.driver {
            println!("      Driver: {}", driver);
        }
        println!(
            "      Zoom:   {}",
            if camera.supports_zoom {
                "hardware"
            } else {
                "digital"
            }
        );
        println!(
            "      Torch:  {}",
            if camera.supports_torch { "yes" } else { "no" }
        );
        println!();
    }
    Ok(())
}

/// Bind the camera, apply zoom and torch, save one frame and release
pub fn take_snapshot(
    config: &Config,
    zoom: Option<f32>,
    torch: bool,
    output: Option<PathBuf>,
) -> AppResult<()> {
    let runtime = runtime()?;
    let scope = LifecycleScope::active("snapshot");
    let session = CameraSession::with_settings(
        platform_for(config),
        scope.clone(),
        config.session_settings(),
    );

    let result = runtime.block_on(async {
        if !session.initialize().await {
            return Err(bind_error(&session));
        }
        if let Some(level) = zoom {
            session.set_zoom(level).await;
        }
        if torch && !session.toggle_flash().await {
            eprintln!("Warning: torch could not be switched on");
        }
        // Frames captured before the controls took effect do not count
        let since = Instant::now();
        let frame = wait_for_frame(&session, since)
            .await
            .ok_or_else(|| AppError::Other("no frame arrived from the camera".to_string()))?;

        let state = session.state();
        println!(
            "Captured {}x{} at {:.2}x zoom",
            frame.width, frame.height, state.zoom_level
        );
        save(&frame, config, output)
    });

    runtime.block_on(session.release());
    scope.destroy();

    let path = result?;
    println!("Saved: {}", path.display());
    Ok(())
}

fn bind_error(session: &CameraSession) -> AppError {
    AppError::Other(
        session
            .state()
            .error
            .unwrap_or_else(|| "camera could not be started".to_string()),
    )
}

async fn wait_for_frame(session: &CameraSession, since: Instant) -> Option<CameraFrame> {
    let deadline = since + timing::FIRST_FRAME_TIMEOUT;
    loop {
        if let Some(frame) = session.capture_frame()
            && frame.captured_at >= since
        {
            return Some(frame);
        }
        if Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(timing::FIRST_FRAME_POLL).await;
    }
}

fn save(frame: &CameraFrame, config: &Config, output: Option<PathBuf>) -> AppResult<PathBuf> {
    match output {
        Some(path) if path.is_dir() => storage::save_frame(frame, &path),
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            storage::save_frame_to(frame, &path)?;
            Ok(path)
        }
        None => {
            let dir = storage::snapshot_directory(config);
            info!(dir = %dir.display(), "Saving to snapshot directory");
            storage::save_frame(frame, &dir)
        }
    }
}

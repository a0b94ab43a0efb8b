// SPDX-License-Identifier: GPL-3.0-only

//! Magnifier - turn a camera into a live magnifying glass
//!
//! The core of the crate is [`CameraSession`], which owns one camera for
//! one lifecycle scope and publishes a [`SessionState`] stream that any
//! front-end can render.
//!
//! - [`backends`]: camera platforms (V4L2, virtual sources)
//! - [`session`]: lifecycle, zoom, torch, freeze and the state stream
//! - [`config`]: user configuration
//! - [`storage`]: saving frozen frames
//! - [`terminal`]: the interactive terminal front-end
//!
//! ```ignore
//! let session = CameraSession::new(platform_for(&config), LifecycleScope::active("main"));
//! session.initialize().await;
//! session.set_zoom(2.5).await;
//! let frame = session.capture_frame();
//! session.release().await;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod flash;
pub mod session;
pub mod storage;
pub mod terminal;

pub use backends::camera::{CameraFrame, LifecycleScope};
pub use backends::platform_for;
pub use config::{CameraSource, Config};
pub use errors::{AppError, AppResult, CameraError};
pub use session::{CameraSession, SessionSettings, SessionState};

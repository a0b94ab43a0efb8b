// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the magnifier

use crate::backends::camera::BackendError;
use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Application level error, returned by the CLI and configuration code
#[derive(Debug, Clone)]
pub enum AppError {
    /// Camera-related errors
    Camera(CameraError),
    /// Configuration errors
    Config(String),
    /// Storage/filesystem errors
    Storage(String),
    /// Generic error with message
    Other(String),
}

/// Failures of camera session operations
///
/// The session never returns these to its caller; their `Display` text is
/// what ends up in `SessionState::error`.
#[derive(Debug, Clone, PartialEq)]
pub enum CameraError {
    /// The platform could not provide a camera provider
    Acquisition(BackendError),
    /// The hardware rejected the capture pipeline
    Bind(BackendError),
    /// A zoom or torch request failed
    Control(BackendError),
    /// Unbinding or releasing failed after best-effort cleanup
    Teardown(BackendError),
    /// Resume was called before any provider was acquired
    NotAcquired,
    /// The hardware thread is gone or a job on it aborted
    ExecutorUnavailable(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Camera(e) => write!(f, "Camera error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Storage(msg) => write!(f, "Storage error: {}", msg),
            AppError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl fmt::Display for CameraError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraError::Acquisition(e) => write!(f, "Failed to acquire camera: {}", e),
            CameraError::Bind(e) => write!(f, "Failed to start camera: {}", e),
            CameraError::Control(e) => write!(f, "Camera control failed: {}", e),
            CameraError::Teardown(e) => write!(f, "Failed to stop camera: {}", e),
            CameraError::NotAcquired => {
                write!(f, "Camera is not initialized; initialize it before resuming")
            }
            CameraError::ExecutorUnavailable(msg) => {
                write!(f, "Camera hardware thread unavailable: {}", msg)
            }
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for CameraError {}

impl From<CameraError> for AppError {
    fn from(err: CameraError) -> Self {
        AppError::Camera(err)
    }
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        AppError::Other(err.to_string())
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Other(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Other(msg.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

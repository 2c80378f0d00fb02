//! Application state
//!
//! Holds the server configuration and shared components

use std::sync::Arc;

use crate::mjpeg_hub::MjpegHub;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Camera device path
    pub device: String,
    /// Requested capture width (0 = leave to the device)
    pub width: u32,
    /// Requested capture height (0 = leave to the device)
    pub height: u32,
    /// Requested frame rate (0 = leave to the device)
    pub fps: u32,
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            device: std::env::var("CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            width: std::env::var("CAMERA_WIDTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(640),
            height: std::env::var("CAMERA_HEIGHT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(480),
            fps: std::env::var("CAMERA_FPS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5000),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// MJPEG distribution hub (capture worker publishes, viewers subscribe)
    pub hub: Arc<MjpegHub>,
}

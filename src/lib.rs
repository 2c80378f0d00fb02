//! Camserver Library
//!
//! MJPEG streaming server for local V4L2 cameras.
//!
//! ## Architecture
//!
//! 1. capture - device probe, backend fallback chain, frame extraction
//! 2. mjpeg_hub - single-reader capture worker, per-viewer fan-out
//! 3. camera_control - v4l2-ctl side channel for exposure/gain/brightness
//! 4. web_api - HTTP endpoints (stream, health, controls)
//!
//! ## Design Principles
//!
//! - One physical device read per frame, broadcast to every viewer
//! - Backend selection is a pure fold over an ordered constructor list
//! - Acquisition failures degrade to the next backend or a retry; they
//!   never crash the stream

pub mod camera_control;
pub mod capture;
pub mod error;
pub mod mjpeg_hub;
pub mod models;
pub mod state;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;

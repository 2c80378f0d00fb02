//! Shared models and types for the camserver
//!
//! This module contains response shapes shared across handlers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub camera_opened: bool,
}

/// Outcome of one control-utility invocation for one parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResult {
    pub ok: bool,
    pub out: String,
}

/// Controls listing: raw tool output plus a per-control summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlsReport {
    pub raw: String,
    pub summary: BTreeMap<String, String>,
}

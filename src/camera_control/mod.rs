//! Camera control via the V4L2 control utility
//!
//! ## Responsibilities
//!
//! - Run `v4l2-ctl` to list and set capture parameters
//! - Clamp values the driver would reject before formatting them
//!
//! The utility failing or being absent is reported in-band as a per-request
//! `{ok, out}` outcome; frame acquisition never depends on this module.

use std::collections::BTreeMap;

use serde_json::Value;
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::models::{ControlResult, ControlsReport};

/// Parameters accepted from the control endpoint, applied in this order.
pub const CONTROL_KEYS: [&str; 4] = ["exposure_absolute", "exposure_auto", "gain", "brightness"];

/// Run the control utility with the given arguments.
///
/// Success means exit status zero; the tool being missing degrades to a
/// failed outcome with the error text, never a panic or crash.
async fn run_control_tool(args: &[&str]) -> (bool, String) {
    match Command::new("v4l2-ctl").args(args).output().await {
        Ok(out) if out.status.success() => {
            (true, String::from_utf8_lossy(&out.stdout).trim().to_string())
        }
        Ok(out) => {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("v4l2-ctl exited with {}", out.status)
            } else {
                stderr
            };
            (false, message)
        }
        Err(e) => (false, e.to_string()),
    }
}

/// List device controls, with a summary of the exposure/gain lines.
pub async fn list_controls() -> Result<ControlsReport> {
    let (ok, out) = run_control_tool(&["-l"]).await;
    if !ok {
        return Err(Error::ControlTool(out));
    }

    Ok(ControlsReport {
        summary: summarize_controls(&out),
        raw: out,
    })
}

/// Apply every known control present in the request payload.
///
/// Returns whether all applied controls succeeded, plus the per-control
/// outcome map.
pub async fn apply_controls(
    payload: &serde_json::Map<String, Value>,
) -> (bool, BTreeMap<String, ControlResult>) {
    let mut results = BTreeMap::new();

    for key in CONTROL_KEYS {
        let Some(value) = payload.get(key) else {
            continue;
        };

        let formatted = format_control_value(key, value);
        let assignment = format!("{key}={formatted}");
        let (ok, out) = run_control_tool(&["-c", &assignment]).await;

        if !ok {
            tracing::warn!(control = key, output = %out, "Control assignment failed");
        }
        results.insert(key.to_string(), ControlResult { ok, out });
    }

    let all_ok = results.values().all(|r| r.ok);
    (all_ok, results)
}

/// Pick summary lines out of the `-l` listing.
///
/// Lines such as
/// `exposure_absolute (int)    : min=1 max=10000 step=1 default=156 value=156`
/// are keyed by the control name before the parenthesized type.
fn summarize_controls(listing: &str) -> BTreeMap<String, String> {
    let mut summary = BTreeMap::new();
    for line in listing.lines() {
        if line.contains("exposure") || line.contains("gain") {
            let key = line.split('(').next().unwrap_or(line).trim().to_string();
            summary.insert(key, line.to_string());
        }
    }
    summary
}

/// Render one control value for the utility's `key=value` syntax.
///
/// The absolute exposure is integer-valued and must be positive for the
/// driver, so it is parsed (defaulting to 1) and clamped to a minimum of 1.
/// Other controls pass through as given.
pub(crate) fn format_control_value(key: &str, value: &Value) -> String {
    if key == "exposure_absolute" {
        clamp_exposure(value).to_string()
    } else {
        plain_value(value)
    }
}

fn clamp_exposure(value: &Value) -> i64 {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.unwrap_or(1).max(1)
}

fn plain_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

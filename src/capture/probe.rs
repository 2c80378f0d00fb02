//! Device capability probe
//!
//! Asks `v4l2-ctl` which pixel formats the device advertises and reduces the
//! answer to one bit: does the device produce a compressed (MJPEG) stream
//! natively, or only raw video. Probe failure of any kind (tool missing,
//! device absent, non-zero exit) degrades to the raw-format assumption so the
//! backend fallback chain is never blocked by the probe itself.

use std::time::Duration;

use tokio::process::Command;

/// Upper bound on the probe; a wedged utility must not stall selection.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Whether the device advertises a compressed MJPEG format.
pub async fn supports_mjpeg(device: &str) -> bool {
    let listing = Command::new("v4l2-ctl")
        .args(["-d", device, "--list-formats-ext"])
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(PROBE_TIMEOUT, listing).await {
        Ok(output) => output,
        Err(_) => {
            tracing::debug!(device = %device, "Format probe timed out, assuming raw format");
            return false;
        }
    };

    match output {
        Ok(out) if out.status.success() => {
            let text = String::from_utf8_lossy(&out.stdout);
            let verdict = output_indicates_mjpeg(&text);
            tracing::debug!(device = %device, mjpeg = verdict, "Format probe completed");
            verdict
        }
        Ok(out) => {
            tracing::debug!(
                device = %device,
                status = %out.status,
                "Format probe returned non-zero, assuming raw format"
            );
            false
        }
        Err(e) => {
            tracing::debug!(
                device = %device,
                error = %e,
                "Format probe unavailable, assuming raw format"
            );
            false
        }
    }
}

/// Pure scan of the probe output for known compressed-format markers.
pub(crate) fn output_indicates_mjpeg(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("mjpeg") || lower.contains("jpeg")
}

#[cfg(test)]
mod tests {
    use super::*;

    const MJPEG_LISTING: &str = "\
ioctl: VIDIOC_ENUM_FMT
\tType: Video Capture

\t[0]: 'MJPG' (Motion-JPEG, compressed)
\t\tSize: Discrete 640x480
\t[1]: 'YUYV' (YUYV 4:2:2)
\t\tSize: Discrete 640x480
";

    const RAW_ONLY_LISTING: &str = "\
ioctl: VIDIOC_ENUM_FMT
\tType: Video Capture

\t[0]: 'YUYV' (YUYV 4:2:2)
\t\tSize: Discrete 1280x720
";

    #[test]
    fn detects_compressed_format() {
        assert!(output_indicates_mjpeg(MJPEG_LISTING));
    }

    #[test]
    fn raw_only_listing_is_not_compressed() {
        assert!(!output_indicates_mjpeg(RAW_ONLY_LISTING));
    }

    #[test]
    fn marker_match_is_case_insensitive() {
        assert!(output_indicates_mjpeg("Pixel Format: 'JPEG'"));
        assert!(output_indicates_mjpeg("pixelformat mjpeg"));
    }

    #[test]
    fn verdict_is_stable_across_repeated_scans() {
        assert_eq!(
            output_indicates_mjpeg(MJPEG_LISTING),
            output_indicates_mjpeg(MJPEG_LISTING)
        );
        assert_eq!(
            output_indicates_mjpeg(RAW_ONLY_LISTING),
            output_indicates_mjpeg(RAW_ONLY_LISTING)
        );
    }
}

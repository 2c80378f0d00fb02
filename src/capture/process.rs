//! External encoder process backend
//!
//! Last resort in the fallback chain: spawn `ffmpeg` reading the device
//! through its own V4L2 input driver and emitting a raw MJPEG elementary
//! stream on stdout. The child is spawned with `kill_on_drop` so an
//! abandoned capture session cannot leak encoder processes; the session
//! loop additionally signals it on every exit path.

use std::process::Stdio;

use tokio::process::{Child, ChildStdout, Command};

use super::DeviceSpec;

/// A spawned encoder child with its readable output stream.
pub struct ProcessCapture {
    child: Child,
    stdout: ChildStdout,
}

/// Argument vector handed to the encoder.
pub(crate) fn encoder_args(spec: &DeviceSpec) -> Vec<String> {
    let fps = spec.fps_or_default().to_string();
    let size = format!("{}x{}", spec.width_or_default(), spec.height_or_default());
    [
        "-hide_banner",
        "-loglevel",
        "warning",
        "-f",
        "v4l2",
        "-framerate",
        &fps,
        "-video_size",
        &size,
        "-i",
        spec.device(),
        "-vf",
        "format=yuv420p",
        "-f",
        "image2pipe",
        "-vcodec",
        "mjpeg",
        "-",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Spawn the encoder. A spawn failure (binary missing, permission denied)
/// makes this backend unavailable; it is never escalated.
pub fn open(spec: &DeviceSpec) -> Option<ProcessCapture> {
    let args = encoder_args(spec);

    let mut child = match Command::new("ffmpeg")
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            tracing::debug!(error = %e, "Encoder process unavailable");
            return None;
        }
    };

    let stdout = child.stdout.take()?;

    tracing::info!(device = %spec.device(), "Encoder process capture opened");
    Some(ProcessCapture { child, stdout })
}

impl ProcessCapture {
    pub fn stdout_mut(&mut self) -> &mut ChildStdout {
        &mut self.stdout
    }

    /// Whether the child has already exited.
    pub fn is_exited(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(status) => status.is_some(),
            Err(_) => true,
        }
    }

    /// Best-effort termination of the child.
    pub async fn terminate(&mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::debug!(error = %e, "Encoder process already gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_argv_matches_the_contract() {
        let spec = DeviceSpec::new("/dev/video0", 640, 480, 30);
        assert_eq!(
            encoder_args(&spec),
            vec![
                "-hide_banner",
                "-loglevel",
                "warning",
                "-f",
                "v4l2",
                "-framerate",
                "30",
                "-video_size",
                "640x480",
                "-i",
                "/dev/video0",
                "-vf",
                "format=yuv420p",
                "-f",
                "image2pipe",
                "-vcodec",
                "mjpeg",
                "-",
            ]
        );
    }

    #[test]
    fn unset_dimensions_fall_back_to_vga() {
        let spec = DeviceSpec::new("/dev/video1", 0, 0, 0);
        let args = encoder_args(&spec);
        assert!(args.contains(&"640x480".to_string()));
        assert!(args.contains(&"30".to_string()));
    }
}

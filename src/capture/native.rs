//! Native V4L2 capture backend
//!
//! Opens the device directly through the `v4l` crate. A device that exists
//! under several names is tried under each: the literal path first, then the
//! numeric index derived from the path, then indices 0 through 3, then
//! index 0 once more. The first handle that opens and negotiates a usable
//! pixel format wins; every other candidate is released.

use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

use super::DeviceSpec;

const MJPG: &[u8; 4] = b"MJPG";
const YUYV: &[u8; 4] = b"YUYV";

/// Pixel format the device accepted during open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiatedFormat {
    /// Frames arrive already JPEG-compressed.
    Mjpeg,
    /// Frames arrive as packed YUV 4:2:2 at the dimensions the device chose.
    Yuyv { width: u32, height: u32 },
}

/// An opened native capture device.
pub struct NativeCapture {
    device: Device,
    format: NegotiatedFormat,
}

impl NativeCapture {
    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn format(&self) -> NegotiatedFormat {
        self.format
    }
}

/// One way of naming the device to the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OpenTarget {
    Path(String),
    Index(usize),
}

/// Attempt to open the device, trying each naming in order.
pub fn open(spec: &DeviceSpec) -> Option<NativeCapture> {
    for target in open_targets(spec.device()) {
        let opened = match &target {
            OpenTarget::Path(path) => Device::with_path(path),
            OpenTarget::Index(index) => Device::new(*index),
        };

        let device = match opened {
            Ok(device) => device,
            Err(e) => {
                tracing::trace!(target = ?target, error = %e, "Native open attempt failed");
                continue;
            }
        };

        if let Err(e) = device.query_caps() {
            tracing::trace!(target = ?target, error = %e, "Device rejected capability query");
            continue;
        }

        match negotiate_format(&device, spec) {
            Some(format) => {
                apply_frame_rate(&device, spec);
                tracing::info!(
                    target = ?target,
                    format = ?format,
                    "Native capture opened"
                );
                return Some(NativeCapture { device, format });
            }
            None => {
                tracing::debug!(target = ?target, "No usable pixel format, releasing device");
            }
        }
    }

    None
}

/// The fixed sequence of open attempts for a device path.
pub(crate) fn open_targets(device: &str) -> Vec<OpenTarget> {
    let mut targets = vec![
        OpenTarget::Path(device.to_string()),
        OpenTarget::Index(derive_index(device)),
    ];
    targets.extend((0..4).map(OpenTarget::Index));
    targets.push(OpenTarget::Index(0));
    targets
}

/// Numeric index for a device path, by stripping the non-numeric prefix.
///
/// `/dev/video2` maps to 2; anything without a trailing number maps to 0.
pub(crate) fn derive_index(device: &str) -> usize {
    let digits = device
        .trim_end()
        .chars()
        .rev()
        .take_while(char::is_ascii_digit)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect::<String>();
    digits.parse().unwrap_or(0)
}

/// Ask for MJPG at the requested size, falling back to YUYV.
///
/// The device answers with the format it actually configured; a device that
/// silently substitutes another fourcc is treated as not supporting the
/// request. Requested dimensions of zero defer to the device's current
/// format.
fn negotiate_format(device: &Device, spec: &DeviceSpec) -> Option<NegotiatedFormat> {
    let current = Capture::format(device).ok()?;
    let width = if spec.width() > 0 { spec.width() } else { current.width };
    let height = if spec.height() > 0 { spec.height() } else { current.height };

    let mjpg = FourCC::new(MJPG);
    if let Ok(fmt) = Capture::set_format(device, &Format::new(width, height, mjpg)) {
        if fmt.fourcc == mjpg {
            return Some(NegotiatedFormat::Mjpeg);
        }
    }

    let yuyv = FourCC::new(YUYV);
    if let Ok(fmt) = Capture::set_format(device, &Format::new(width, height, yuyv)) {
        if fmt.fourcc == yuyv {
            // Keep the dimensions the device settled on, not the request
            return Some(NegotiatedFormat::Yuyv {
                width: fmt.width,
                height: fmt.height,
            });
        }
    }

    None
}

/// Best-effort frame rate. Devices are free to ignore unsupported rates.
fn apply_frame_rate(device: &Device, spec: &DeviceSpec) {
    if spec.fps() == 0 {
        return;
    }
    let params = Parameters::with_fps(spec.fps());
    if let Err(e) = Capture::set_params(device, &params) {
        tracing::debug!(fps = spec.fps(), error = %e, "Frame rate not applied");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_derived_from_path_suffix() {
        assert_eq!(derive_index("/dev/video2"), 2);
        assert_eq!(derive_index("/dev/video10"), 10);
    }

    #[test]
    fn index_defaults_to_zero_without_digits() {
        assert_eq!(derive_index("/dev/video"), 0);
        assert_eq!(derive_index("camera"), 0);
        assert_eq!(derive_index(""), 0);
    }

    #[test]
    fn open_order_is_path_then_derived_then_scan_then_zero() {
        let targets = open_targets("/dev/video2");
        assert_eq!(
            targets,
            vec![
                OpenTarget::Path("/dev/video2".to_string()),
                OpenTarget::Index(2),
                OpenTarget::Index(0),
                OpenTarget::Index(1),
                OpenTarget::Index(2),
                OpenTarget::Index(3),
                OpenTarget::Index(0),
            ]
        );
    }
}

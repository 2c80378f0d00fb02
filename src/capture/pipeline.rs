//! GStreamer pipeline capture backend
//!
//! Describes the capture chain as a launch string and opens it through
//! `gstreamer::parse::launch`. The probe verdict picks between two shapes:
//! devices with native MJPEG get a compressed capture decoded to raw video,
//! everything else gets raw YUY2 capture with colorspace conversion. One
//! construction attempt per call; a pipeline that will not reach the playing
//! state is torn down and reported as unavailable.

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;

use super::{DeviceSpec, Frame, PixelFormat};

/// An opened pipeline with its application sink.
pub struct PipelineCapture {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
}

/// Launch description for the device, shaped by the probe verdict.
pub(crate) fn pipeline_description(spec: &DeviceSpec, compressed: bool) -> String {
    let device = spec.device();
    let fps = spec.fps_or_default();
    if compressed {
        format!(
            "v4l2src device={device} ! image/jpeg,framerate={fps}/1 \
             ! jpegdec ! videoconvert ! appsink name=sink"
        )
    } else {
        format!(
            "v4l2src device={device} ! video/x-raw,format=YUY2,framerate={fps}/1 \
             ! videoconvert ! appsink name=sink"
        )
    }
}

/// Build and start the pipeline.
pub fn open(spec: &DeviceSpec, compressed: bool) -> Option<PipelineCapture> {
    if let Err(e) = gst::init() {
        tracing::debug!(error = %e, "GStreamer init failed");
        return None;
    }

    let description = pipeline_description(spec, compressed);
    tracing::debug!(pipeline = %description, "Opening capture pipeline");

    let pipeline = match gst::parse::launch(&description) {
        Ok(element) => match element.downcast::<gst::Pipeline>() {
            Ok(pipeline) => pipeline,
            Err(_) => {
                tracing::debug!("Launch description did not produce a pipeline");
                return None;
            }
        },
        Err(e) => {
            tracing::debug!(error = %e, "Pipeline construction failed");
            return None;
        }
    };

    let appsink = pipeline
        .by_name("sink")?
        .downcast::<gst_app::AppSink>()
        .ok()?;

    // the JPEG encode path expects tightly packed RGB from the sink
    appsink.set_caps(Some(
        &gst::Caps::builder("video/x-raw").field("format", "RGB").build(),
    ));
    appsink.set_max_buffers(4);
    appsink.set_drop(true);

    if pipeline.set_state(gst::State::Playing).is_err() {
        let _ = pipeline.set_state(gst::State::Null);
        tracing::debug!(device = %spec.device(), "Pipeline refused to start");
        return None;
    }

    // v4l2src opens the device asynchronously; wait for the state change to
    // settle before calling the pipeline open
    let (result, _, _) = pipeline.state(gst::ClockTime::from_seconds(2));
    if result.is_err() {
        let _ = pipeline.set_state(gst::State::Null);
        tracing::debug!(device = %spec.device(), "Pipeline failed to reach playing state");
        return None;
    }

    tracing::info!(device = %spec.device(), compressed, "Pipeline capture opened");
    Some(PipelineCapture { pipeline, appsink })
}

impl PipelineCapture {
    /// Pull one decoded frame from the sink.
    ///
    /// Returns `None` on end-of-stream or a sink error; callers treat that
    /// as a transient read failure.
    pub fn pull_frame(&self) -> Option<Frame> {
        let sample = self.appsink.pull_sample().ok()?;
        let caps = sample.caps()?;
        let structure = caps.structure(0)?;
        let width = structure.get::<i32>("width").ok()?.max(0) as u32;
        let height = structure.get::<i32>("height").ok()?.max(0) as u32;

        let buffer = sample.buffer()?;
        let map = buffer.map_readable().ok()?;

        Some(Frame::Raw {
            data: map.as_slice().to_vec(),
            width,
            height,
            format: PixelFormat::Rgb,
        })
    }
}

impl Drop for PipelineCapture {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressed_support_selects_the_jpeg_decode_chain() {
        let spec = DeviceSpec::new("/dev/video0", 640, 480, 30);
        let desc = pipeline_description(&spec, true);
        assert_eq!(
            desc,
            "v4l2src device=/dev/video0 ! image/jpeg,framerate=30/1 \
             ! jpegdec ! videoconvert ! appsink name=sink"
        );
    }

    #[test]
    fn raw_only_devices_always_get_the_yuy2_chain() {
        let spec = DeviceSpec::new("/dev/video1", 640, 480, 30);
        let desc = pipeline_description(&spec, false);
        assert_eq!(
            desc,
            "v4l2src device=/dev/video1 ! video/x-raw,format=YUY2,framerate=30/1 \
             ! videoconvert ! appsink name=sink"
        );
        assert!(!desc.contains("image/jpeg"));
    }

    #[test]
    fn frame_rate_flows_into_the_description() {
        let spec = DeviceSpec::new("/dev/video0", 0, 0, 15);
        assert!(pipeline_description(&spec, false).contains("framerate=15/1"));

        // unset rate falls back to 30
        let spec = DeviceSpec::new("/dev/video0", 0, 0, 0);
        assert!(pipeline_description(&spec, true).contains("framerate=30/1"));
    }
}

//! MJPEG multiplexing hub
//!
//! ## Responsibilities
//!
//! - Drive one capture worker per server: the single reader of the
//!   committed capture handle
//! - Encode raw frames to JPEG (quality 80) where the backend yields pixels
//! - Fan every JPEG out to all attached viewers over a broadcast channel
//! - Wrap frames in `multipart/x-mixed-replace` parts for HTTP delivery
//!
//! One physical read feeds every viewer; a viewer that falls behind skips
//! frames rather than stalling the reader. The worker never terminates on
//! read failures (it backs off and retries); only the process backend's
//! child dying ends the capture session.

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::capture::native::{NativeCapture, NegotiatedFormat};
use crate::capture::process::ProcessCapture;
use crate::capture::{convert, CaptureHandle, DeviceSpec, Frame, FrameExtractor, PixelFormat};

/// Boundary string in the multipart response.
const BOUNDARY: &str = "frame";

/// JPEG quality for frames that need encoding.
const JPEG_QUALITY: u8 = 80;

/// Backoff after a failed or empty device read.
const READ_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Backoff when the encoder process produces no bytes.
const STREAM_IDLE_DELAY: Duration = Duration::from_millis(20);

/// Read size for the encoder process stdout.
const STREAM_CHUNK_BYTES: usize = 4096;

/// Frames buffered per viewer before the slowest starts skipping.
const CHANNEL_CAPACITY: usize = 4;

/// Distribution hub between the capture worker and HTTP viewers.
pub struct MjpegHub {
    tx: broadcast::Sender<Bytes>,
    opened: AtomicBool,
}

impl MjpegHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            opened: AtomicBool::new(false),
        }
    }

    /// Publish one JPEG frame to all viewers. Returns the viewer count.
    pub fn publish(&self, jpeg: Bytes) -> usize {
        self.tx.send(jpeg).unwrap_or(0)
    }

    /// Number of currently attached viewers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Whether the active capture handle reports itself open.
    pub fn is_open(&self) -> bool {
        self.opened.load(Ordering::Relaxed)
    }

    pub(crate) fn set_open(&self, open: bool) {
        self.opened.store(open, Ordering::Relaxed);
    }

    /// HTTP response streaming the multipart body to one viewer.
    ///
    /// The body never errors mid-stream: once the multipart content type is
    /// committed, a dead capture session shows up as silence, not as a
    /// structured error.
    pub fn stream_response(&self) -> Response {
        let rx = self.tx.subscribe();
        let stream = BroadcastStream::new(rx).filter_map(|result| match result {
            Ok(jpeg) => Some(Ok::<_, Infallible>(multipart_chunk(&jpeg))),
            // lagged viewer: skip to the newest frame
            Err(_) => None,
        });

        Response::builder()
            .status(StatusCode::OK)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
            )
            .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
            .body(Body::from_stream(stream))
            .expect("Failed to build stream response")
    }
}

impl Default for MjpegHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One multipart body part wrapping a JPEG frame.
pub fn multipart_chunk(jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    );

    let mut part = Vec::with_capacity(header.len() + jpeg.len() + 2);
    part.extend_from_slice(header.as_bytes());
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

/// Select a backend for the device and run the capture session.
///
/// Runs for the server lifetime. If no backend opens, the hub stays silent
/// and unhealthy while viewer connections are held open.
pub async fn run_capture(hub: Arc<MjpegHub>, spec: DeviceSpec) {
    let handle = crate::capture::select_backend(&spec).await;
    hub.set_open(handle.is_open());
    tracing::info!(
        backend = handle.backend_name(),
        open = handle.is_open(),
        "Capture session starting"
    );

    match handle {
        #[cfg(feature = "gstreamer")]
        CaptureHandle::Pipeline(capture) => {
            let hub = Arc::clone(&hub);
            std::thread::spawn(move || {
                pump_blocking(&hub, || capture.pull_frame());
            });
        }
        CaptureHandle::Native(capture) => {
            let hub = Arc::clone(&hub);
            std::thread::spawn(move || native_loop(capture, &hub));
        }
        CaptureHandle::Process(capture) => {
            process_loop(capture, &hub).await;
        }
        CaptureHandle::Unavailable => {
            tracing::warn!(device = %spec.device(), "No capture backend available, stream will stay silent");
        }
    }
}

/// Frame-oriented capture loop shared by the native and pipeline branches.
///
/// Never returns: a read that produces nothing backs off briefly and
/// retries, a frame that fails to encode is dropped.
fn pump_blocking<F>(hub: &MjpegHub, mut read: F)
where
    F: FnMut() -> Option<Frame>,
{
    loop {
        match read() {
            Some(frame) => {
                if let Some(jpeg) = encode_frame(frame) {
                    hub.publish(jpeg);
                }
            }
            None => std::thread::sleep(READ_RETRY_DELAY),
        }
    }
}

/// Capture loop for the native backend.
///
/// The memory-mapped stream borrows the device, so both live on this
/// thread for the remainder of the session.
fn native_loop(capture: NativeCapture, hub: &MjpegHub) {
    use v4l::buffer::Type;
    use v4l::io::mmap::Stream as MmapStream;
    use v4l::io::traits::CaptureStream;

    let format = capture.format();
    let mut stream = match MmapStream::with_buffers(capture.device(), Type::VideoCapture, 4) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(error = %e, "Native capture stream failed to start");
            hub.set_open(false);
            return;
        }
    };

    pump_blocking(hub, move || {
        let (data, _meta) = CaptureStream::next(&mut stream).ok()?;
        let frame = match format {
            NegotiatedFormat::Mjpeg => Frame::Jpeg(data.to_vec()),
            NegotiatedFormat::Yuyv { width, height } => Frame::Raw {
                data: data.to_vec(),
                width,
                height,
                format: PixelFormat::Yuyv,
            },
        };
        Some(frame)
    });
}

/// Capture loop for the process backend.
///
/// Reads the encoder's stdout in small chunks, slices complete JPEG frames
/// out of the accumulated stream, and publishes each one. Ends when the
/// child dies; every exit path signals the child for termination.
async fn process_loop(mut capture: ProcessCapture, hub: &MjpegHub) {
    let mut extractor = FrameExtractor::new();
    let mut chunk = vec![0u8; STREAM_CHUNK_BYTES];

    loop {
        match capture.stdout_mut().read(&mut chunk).await {
            Ok(0) => {
                if capture.is_exited() {
                    tracing::info!("Encoder process ended, closing capture session");
                    break;
                }
                tokio::time::sleep(STREAM_IDLE_DELAY).await;
            }
            Ok(n) => {
                extractor.extend(&chunk[..n]);
                while let Some(frame) = extractor.next_frame() {
                    hub.publish(Bytes::from(frame));
                }
            }
            Err(e) => {
                if capture.is_exited() {
                    tracing::info!(error = %e, "Encoder stream lost, closing capture session");
                    break;
                }
                tokio::time::sleep(STREAM_IDLE_DELAY).await;
            }
        }
    }

    capture.terminate().await;
    hub.set_open(false);
}

/// JPEG-encode a frame where necessary.
///
/// Already-compressed frames pass through untouched. Raw frames are taken
/// to RGB first, then encoded at the fixed quality; any failure drops the
/// frame.
fn encode_frame(frame: Frame) -> Option<Bytes> {
    match frame {
        Frame::Jpeg(data) => Some(Bytes::from(data)),
        Frame::Raw {
            data,
            width,
            height,
            format,
        } => {
            let rgb = match format {
                PixelFormat::Rgb => tighten_rows(data, width, height)?,
                PixelFormat::Yuyv => convert::yuyv_to_rgb(&data, width, height)?,
            };
            encode_rgb_jpeg(&rgb, width, height)
        }
    }
}

/// Strip per-row stride padding from an RGB buffer, if any.
fn tighten_rows(data: Vec<u8>, width: u32, height: u32) -> Option<Vec<u8>> {
    let row = (width as usize) * 3;
    let expected = row * height as usize;
    if data.len() == expected {
        return Some(data);
    }
    if height == 0 || data.len() < expected || data.len() % height as usize != 0 {
        return None;
    }

    let stride = data.len() / height as usize;
    let mut tight = Vec::with_capacity(expected);
    for chunk in data.chunks_exact(stride) {
        tight.extend_from_slice(&chunk[..row]);
    }
    Some(tight)
}

fn encode_rgb_jpeg(rgb: &[u8], width: u32, height: u32) -> Option<Bytes> {
    let img: image::RgbImage = image::ImageBuffer::from_raw(width, height, rgb.to_vec())?;

    let mut jpeg = Vec::new();
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY);
    encoder.encode_image(&img).ok()?;

    Some(Bytes::from(jpeg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multipart_chunk_parses_per_the_framing_grammar() {
        let payload = b"\xFF\xD8fake\xFF\xD9";
        let chunk = multipart_chunk(payload);

        let header_end = chunk
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("blank line present")
            + 4;
        let header = std::str::from_utf8(&chunk[..header_end]).expect("header is text");

        let mut lines = header.split("\r\n");
        assert_eq!(lines.next(), Some("--frame"));
        assert_eq!(lines.next(), Some("Content-Type: image/jpeg"));
        assert_eq!(
            lines.next(),
            Some(format!("Content-Length: {}", payload.len()).as_str())
        );

        let body = &chunk[header_end..];
        assert_eq!(&body[..payload.len()], payload);
        assert_eq!(&body[payload.len()..], b"\r\n");
    }

    #[test]
    fn content_length_matches_the_exact_payload_size() {
        for size in [0usize, 1, 1023] {
            let payload = vec![0xABu8; size];
            let chunk = multipart_chunk(&payload);
            let text = String::from_utf8_lossy(&chunk);
            assert!(text.contains(&format!("Content-Length: {size}\r\n")));
            assert_eq!(
                chunk.len(),
                // header + payload + trailing CRLF
                chunk.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4 + size + 2
            );
        }
    }

    #[test]
    fn jpeg_frames_pass_through_unencoded() {
        let data = vec![0xFF, 0xD8, 0x01, 0xFF, 0xD9];
        let out = encode_frame(Frame::Jpeg(data.clone())).unwrap();
        assert_eq!(&out[..], &data[..]);
    }

    #[test]
    fn raw_rgb_frames_are_encoded_to_jpeg() {
        let frame = Frame::Raw {
            data: vec![128u8; 2 * 2 * 3],
            width: 2,
            height: 2,
            format: PixelFormat::Rgb,
        };
        let jpeg = encode_frame(frame).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn raw_yuyv_frames_are_converted_then_encoded() {
        let frame = Frame::Raw {
            data: vec![128u8; 2 * 2 * 2],
            width: 2,
            height: 2,
            format: PixelFormat::Yuyv,
        };
        let jpeg = encode_frame(frame).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn undersized_raw_buffers_are_dropped_not_panicked() {
        let frame = Frame::Raw {
            data: vec![0u8; 3],
            width: 4,
            height: 4,
            format: PixelFormat::Rgb,
        };
        assert!(encode_frame(frame).is_none());
    }

    #[test]
    fn stride_padded_rows_are_tightened() {
        // 2x2 RGB with 8-byte stride (2 bytes padding per row)
        let mut padded = Vec::new();
        for row in 0..2u8 {
            padded.extend_from_slice(&[row; 6]);
            padded.extend_from_slice(&[0xEE, 0xEE]);
        }
        let tight = tighten_rows(padded, 2, 2).unwrap();
        assert_eq!(tight.len(), 12);
        assert_eq!(&tight[..6], &[0u8; 6]);
        assert_eq!(&tight[6..], &[1u8; 6]);
    }

    #[test]
    fn hub_tracks_open_state_and_subscribers() {
        let hub = MjpegHub::new();
        assert!(!hub.is_open());
        hub.set_open(true);
        assert!(hub.is_open());

        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.publish(Bytes::from_static(b"x")), 0);
    }

    #[tokio::test]
    async fn published_frames_reach_every_subscriber() {
        let hub = MjpegHub::new();
        let mut rx_a = hub.tx.subscribe();
        let mut rx_b = hub.tx.subscribe();

        let frame = Bytes::from_static(b"\xFF\xD8jpeg\xFF\xD9");
        assert_eq!(hub.publish(frame.clone()), 2);

        assert_eq!(rx_a.recv().await.unwrap(), frame);
        assert_eq!(rx_b.recv().await.unwrap(), frame);
    }
}

//! Backend selection
//!
//! The fallback chain is a declarative ordered list of backend constructors;
//! selection folds over the list and commits to the first backend that
//! opens. Exhausting the list is not an error: the caller receives a handle
//! that reports itself not open and failure shows up through health checks
//! and (absent) frames instead.

use super::{native, process, CaptureHandle, DeviceSpec};

#[cfg(feature = "gstreamer")]
use super::{pipeline, probe};

/// One entry in the fallback chain.
type BackendCtor<'a, H> = Box<dyn FnOnce(&DeviceSpec) -> Option<H> + 'a>;

/// Probe the device and commit to the first backend that opens.
///
/// Order: pipeline, native, process. The capability probe runs once, ahead
/// of the pipeline attempt, and its verdict shapes only that backend.
pub async fn select_backend(spec: &DeviceSpec) -> CaptureHandle {
    // the constructor list is not Send; all awaits happen before it exists
    #[cfg(feature = "gstreamer")]
    let compressed = probe::supports_mjpeg(spec.device()).await;

    let mut backends: Vec<(&'static str, BackendCtor<'_, CaptureHandle>)> = Vec::new();

    #[cfg(feature = "gstreamer")]
    backends.push((
        "pipeline",
        Box::new(move |s: &DeviceSpec| {
            pipeline::open(s, compressed).map(CaptureHandle::Pipeline)
        }),
    ));

    backends.push((
        "native",
        Box::new(|s: &DeviceSpec| native::open(s).map(CaptureHandle::Native)),
    ));
    backends.push((
        "process",
        Box::new(|s: &DeviceSpec| process::open(s).map(CaptureHandle::Process)),
    ));

    first_open(spec, backends).unwrap_or(CaptureHandle::Unavailable)
}

/// Fold over the ordered constructor list, stopping at the first success.
fn first_open<H>(
    spec: &DeviceSpec,
    backends: Vec<(&'static str, BackendCtor<'_, H>)>,
) -> Option<H> {
    for (name, open) in backends {
        tracing::debug!(backend = name, device = %spec.device(), "Attempting capture backend");
        match open(spec) {
            Some(handle) => {
                tracing::info!(backend = name, device = %spec.device(), "Capture backend committed");
                return Some(handle);
            }
            None => {
                tracing::warn!(backend = name, device = %spec.device(), "Backend unavailable, falling back");
            }
        }
    }

    tracing::warn!(device = %spec.device(), "All capture backends exhausted");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recording_ctor<'a>(
        log: &Rc<RefCell<Vec<&'static str>>>,
        name: &'static str,
        result: Option<u32>,
    ) -> BackendCtor<'a, u32> {
        let log = Rc::clone(log);
        Box::new(move |_spec: &DeviceSpec| {
            log.borrow_mut().push(name);
            result
        })
    }

    #[test]
    fn process_is_attempted_once_and_last_when_others_fail() {
        let spec = DeviceSpec::default();
        let log = Rc::new(RefCell::new(Vec::new()));

        let backends = vec![
            ("pipeline", recording_ctor(&log, "pipeline", None)),
            ("native", recording_ctor(&log, "native", None)),
            ("process", recording_ctor(&log, "process", Some(7))),
        ];

        assert_eq!(first_open(&spec, backends), Some(7));
        assert_eq!(&*log.borrow(), &["pipeline", "native", "process"]);
    }

    #[test]
    fn first_success_stops_the_fold() {
        let spec = DeviceSpec::default();
        let log = Rc::new(RefCell::new(Vec::new()));

        let backends = vec![
            ("pipeline", recording_ctor(&log, "pipeline", Some(1))),
            ("native", recording_ctor(&log, "native", Some(2))),
            ("process", recording_ctor(&log, "process", Some(3))),
        ];

        assert_eq!(first_open(&spec, backends), Some(1));
        assert_eq!(&*log.borrow(), &["pipeline"]);
    }

    #[test]
    fn exhausted_chain_yields_nothing() {
        let spec = DeviceSpec::default();
        let log = Rc::new(RefCell::new(Vec::new()));

        let backends = vec![
            ("pipeline", recording_ctor(&log, "pipeline", None)),
            ("native", recording_ctor(&log, "native", None)),
            ("process", recording_ctor(&log, "process", None)),
        ];

        assert_eq!(first_open(&spec, backends), None);
        assert_eq!(log.borrow().len(), 3);
    }
}

//! Camera capture thread.
//!
//! The V4L2 stream is drained on its own OS thread at the camera's rate and
//! only the newest frame is kept, so each recognition sees a current image
//! and no blocking dequeue runs on the async runtime.

use crate::live::{FrameSource, LiveError};
use image::GrayImage;
use personar_hw::{CameraError, CameraSession};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{oneshot, watch};

/// Consecutive capture failures after which the stream counts as ended.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 30;

/// A camera streaming on a dedicated thread.
///
/// Reports playing from the first good frame until the device disappears or
/// keeps failing. Dropping the feed stops the thread, which releases the
/// camera.
pub struct CameraFeed {
    device_path: String,
    latest: watch::Receiver<Option<GrayImage>>,
    playing: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl CameraFeed {
    /// Open `device_path` on the capture thread and start streaming.
    pub async fn start(device_path: &str) -> Result<Self, LiveError> {
        let (latest_tx, latest) = watch::channel(None);
        let playing = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));
        let (opened_tx, opened) = oneshot::channel::<Result<(), CameraError>>();

        let path = device_path.to_string();
        let thread_playing = playing.clone();
        let thread_stop = stop.clone();
        let thread = std::thread::Builder::new()
            .name("personar-capture".into())
            .spawn(move || {
                let mut camera = match CameraSession::open(&path) {
                    Ok(camera) => camera,
                    Err(e) => {
                        let _ = opened_tx.send(Err(e));
                        return;
                    }
                };
                let _ = opened_tx.send(Ok(()));
                pump(
                    || Ok(camera.next_frame()?.to_image()?),
                    &latest_tx,
                    &thread_playing,
                    &thread_stop,
                );
                tracing::info!(device = %path, "capture thread exiting");
            })
            .map_err(LiveError::Thread)?;

        opened
            .await
            .map_err(|_| CameraError::CaptureFailed("capture thread exited during open".into()))??;

        Ok(Self {
            device_path: device_path.to_string(),
            latest,
            playing,
            stop,
            thread: Some(thread),
        })
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Stop this feed and wait until its camera is released, then open
    /// `device_path`.
    pub async fn switch(mut self, device_path: &str) -> Result<Self, LiveError> {
        tracing::info!(from = %self.device_path, to = device_path, "switching camera");
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            let joined = tokio::task::spawn_blocking(move || thread.join()).await;
            if !matches!(joined, Ok(Ok(()))) {
                tracing::warn!(device = %self.device_path, "capture thread did not exit cleanly");
            }
        }
        drop(self);
        Self::start(device_path).await
    }
}

impl FrameSource for CameraFeed {
    fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    fn capture(&mut self) -> Result<GrayImage, LiveError> {
        self.latest.borrow_and_update().clone().ok_or(LiveError::NoFrame)
    }
}

impl Drop for CameraFeed {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
    }
}

/// Pull frames until stopped, the feed is dropped, or the stream ends,
/// publishing each one over the previous.
fn pump<F>(
    mut next: F,
    latest: &watch::Sender<Option<GrayImage>>,
    playing: &AtomicBool,
    stop: &AtomicBool,
) where
    F: FnMut() -> Result<GrayImage, CameraError>,
{
    let mut failures = 0u32;
    while !stop.load(Ordering::Acquire) && !latest.is_closed() {
        match next() {
            Ok(image) => {
                failures = 0;
                latest.send_replace(Some(image));
                playing.store(true, Ordering::Release);
            }
            Err(e) if e.is_fatal() => {
                tracing::warn!(error = %e, "camera stream ended");
                break;
            }
            Err(e) => {
                failures += 1;
                tracing::debug!(error = %e, failures, "frame capture failed");
                if failures >= MAX_CONSECUTIVE_FAILURES {
                    tracing::warn!(error = %e, failures, "camera keeps failing, treating stream as ended");
                    break;
                }
            }
        }
    }
    playing.store(false, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use std::collections::VecDeque;

    fn frame(value: u8) -> GrayImage {
        GrayImage::from_pixel(4, 4, Luma([value]))
    }

    /// Plays `script` in order, then reports the device as unplugged.
    fn scripted(
        script: Vec<Result<GrayImage, CameraError>>,
    ) -> (impl FnMut() -> Result<GrayImage, CameraError>, Arc<std::sync::atomic::AtomicUsize>) {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = calls.clone();
        let mut script: VecDeque<_> = script.into();
        let next = move || {
            counter.fetch_add(1, Ordering::Relaxed);
            script
                .pop_front()
                .unwrap_or_else(|| Err(CameraError::Disconnected("/dev/video0".into())))
        };
        (next, calls)
    }

    fn glitch() -> Result<GrayImage, CameraError> {
        Err(CameraError::CaptureFailed("select timeout".into()))
    }

    #[test]
    fn test_keeps_only_newest_frame() {
        let (tx, rx) = watch::channel(None);
        let playing = AtomicBool::new(false);
        let (next, calls) = scripted(vec![Ok(frame(10)), Ok(frame(20)), Ok(frame(30))]);

        pump(next, &tx, &playing, &AtomicBool::new(false));

        assert_eq!(calls.load(Ordering::Relaxed), 4);
        let latest = rx.borrow().clone().unwrap();
        assert_eq!(latest.get_pixel(0, 0)[0], 30);
        assert!(!playing.load(Ordering::Acquire));
    }

    #[test]
    fn test_repeated_failures_end_stream() {
        let (tx, _rx) = watch::channel(None);
        let playing = AtomicBool::new(true);
        let script = (0..100).map(|_| glitch()).collect();
        let (next, calls) = scripted(script);

        pump(next, &tx, &playing, &AtomicBool::new(false));

        assert_eq!(calls.load(Ordering::Relaxed), MAX_CONSECUTIVE_FAILURES as usize);
        assert!(!playing.load(Ordering::Acquire));
    }

    #[test]
    fn test_good_frame_resets_failure_count() {
        let (tx, rx) = watch::channel(None);
        let mut script: Vec<_> = (0..MAX_CONSECUTIVE_FAILURES - 1).map(|_| glitch()).collect();
        script.push(Ok(frame(50)));
        script.extend((0..MAX_CONSECUTIVE_FAILURES - 1).map(|_| glitch()));
        let expected = script.len() + 1;
        let (next, calls) = scripted(script);

        pump(next, &tx, &AtomicBool::new(false), &AtomicBool::new(false));

        // only the trailing disconnect ends it
        assert_eq!(calls.load(Ordering::Relaxed), expected);
        assert_eq!(rx.borrow().as_ref().unwrap().get_pixel(0, 0)[0], 50);
    }

    #[test]
    fn test_stops_when_feed_dropped() {
        let (tx, rx) = watch::channel(None);
        drop(rx);
        let (next, calls) = scripted(vec![Ok(frame(1))]);

        pump(next, &tx, &AtomicBool::new(false), &AtomicBool::new(false));
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_stop_flag() {
        let (tx, _rx) = watch::channel(None);
        let (next, calls) = scripted(vec![Ok(frame(1))]);

        pump(next, &tx, &AtomicBool::new(false), &AtomicBool::new(true));
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    fn idle_feed() -> (CameraFeed, watch::Sender<Option<GrayImage>>) {
        let (tx, latest) = watch::channel(None);
        let feed = CameraFeed {
            device_path: "/dev/video0".into(),
            latest,
            playing: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(AtomicBool::new(false)),
            thread: None,
        };
        (feed, tx)
    }

    #[test]
    fn test_capture_before_first_frame() {
        let (mut feed, _tx) = idle_feed();
        assert!(!feed.is_playing());
        assert!(matches!(feed.capture(), Err(LiveError::NoFrame)));
    }

    #[test]
    fn test_capture_returns_latest() {
        let (mut feed, tx) = idle_feed();
        tx.send_replace(Some(frame(7)));
        tx.send_replace(Some(frame(9)));
        feed.playing.store(true, Ordering::Release);

        assert!(feed.is_playing());
        assert_eq!(feed.capture().unwrap().get_pixel(0, 0)[0], 9);
    }

    #[test]
    fn test_drop_signals_thread() {
        let (feed, _tx) = idle_feed();
        let stop = feed.stop.clone();
        drop(feed);
        assert!(stop.load(Ordering::Acquire));
    }
}

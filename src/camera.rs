// Camera module for webcam capture and stream ownership

use crate::error::{EmotionViewError, Result};
use crate::models::Frame;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
    Resolution,
};
use nokhwa::Camera;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Latest decoded frame of a stream, `None` until playback starts
pub type FrameReceiver = watch::Receiver<Option<Arc<Frame>>>;

/// What a caller asks for when requesting a stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoConstraints {
    pub camera_index: u32,
    /// Minimum capture width hint
    pub min_width: u32,
}

/// A live, exclusively owned video stream
pub trait MediaStream: Send {
    fn frames(&self) -> FrameReceiver;

    /// Stops every track. Calling it twice is harmless.
    fn stop_tracks(&mut self);

    fn live_tracks(&self) -> usize;

    fn label(&self) -> String;
}

/// Source of video streams
pub trait MediaDevices: Send + Sync {
    /// Requests a video-only stream. Blocks until access is granted or refused.
    fn get_user_media(&self, constraints: &VideoConstraints) -> Result<Box<dyn MediaStream>>;
}

/// Lists available camera devices
pub fn list_devices() -> Result<Vec<String>> {
    let devices = nokhwa::query(ApiBackend::Auto)
        .map_err(|e| EmotionViewError::CameraInit(format!("Failed to query cameras: {e}")))?;

    Ok(devices
        .iter()
        .map(|info| format!("{}: {}", info.index(), info.human_name()))
        .collect())
}

/// Webcams reached through nokhwa
#[derive(Debug, Default, Clone, Copy)]
pub struct NokhwaDevices;

impl MediaDevices for NokhwaDevices {
    fn get_user_media(&self, constraints: &VideoConstraints) -> Result<Box<dyn MediaStream>> {
        Ok(Box::new(NokhwaStream::open(*constraints)?))
    }
}

fn requested_format(min_width: u32) -> RequestedFormat<'static> {
    RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
        Resolution::new(min_width, min_width * 3 / 4),
        FrameFormat::YUYV,
        30,
    )))
}

/// Helper to try opening a camera at a specific index
fn try_open_camera(index: u32, requested_format: RequestedFormat) -> Result<Camera> {
    Camera::new(CameraIndex::Index(index), requested_format).map_err(EmotionViewError::from)
}

/// Opens the requested camera, falling back to the next index
fn open_camera(constraints: VideoConstraints) -> Result<Camera> {
    let format = requested_format(constraints.min_width);
    let mut camera = try_open_camera(constraints.camera_index, format)
        .or_else(|_| try_open_camera(constraints.camera_index + 1, format))
        .map_err(|e| {
            error!("Failed to open camera {}: {}", constraints.camera_index, e);
            EmotionViewError::CameraAccess(format!(
                "Could not open camera. Make sure a camera is connected, \
                 no other app is using it and camera permissions are granted. Error: {e}"
            ))
        })?;

    camera.open_stream()?;

    let resolution = camera.resolution();
    if resolution.width() < constraints.min_width {
        warn!(
            "Camera delivers {}x{}, below the requested minimum width {}",
            resolution.width(),
            resolution.height(),
            constraints.min_width
        );
    }
    Ok(camera)
}

/// A nokhwa camera running on its own capture thread
pub struct NokhwaStream {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    frames: FrameReceiver,
    label: String,
}

impl NokhwaStream {
    /// Opens the camera on a capture thread and waits for the grant
    pub fn open(constraints: VideoConstraints) -> Result<Self> {
        let (granted_tx, granted_rx) = mpsc::sync_channel::<Result<String>>(1);
        let (frame_tx, frames) = watch::channel(None);
        let running = Arc::new(AtomicBool::new(true));

        let thread = std::thread::Builder::new().name("camera-capture".to_string()).spawn({
            let running = running.clone();
            move || {
                let mut camera = match open_camera(constraints) {
                    Ok(camera) => camera,
                    Err(e) => {
                        let _ = granted_tx.send(Err(e));
                        return;
                    }
                };
                let _ = granted_tx.send(Ok(camera.info().human_name()));
                capture_frames(&mut camera, &running, &frame_tx);

                // Stop the camera stream
                if let Err(e) = camera.stop_stream() {
                    error!("Error stopping camera stream: {}", e);
                }
                info!("Camera track stopped");
            }
        })?;

        let label = match granted_rx.recv() {
            Ok(granted) => granted?,
            Err(_) => {
                return Err(EmotionViewError::CameraInit(
                    "Capture thread exited before granting access".to_string(),
                ))
            }
        };
        info!("Camera stream opened: {}", label);

        Ok(Self {
            running,
            thread: Some(thread),
            frames,
            label,
        })
    }
}

/// Pumps decoded frames into the watch channel until the track is stopped
fn capture_frames(
    camera: &mut Camera,
    running: &AtomicBool,
    frame_tx: &watch::Sender<Option<Arc<Frame>>>,
) {
    while running.load(Ordering::Acquire) {
        let buffer = match camera.frame() {
            Ok(buffer) => buffer,
            Err(e) => {
                error!("Failed to capture frame: {}", e);
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
        };

        match buffer.decode_image::<RgbFormat>() {
            Ok(image) => {
                frame_tx.send_replace(Some(Arc::new(Frame::from(image))));
            }
            Err(e) => warn!("Failed to decode frame: {}", e),
        }
    }
}

impl MediaStream for NokhwaStream {
    fn frames(&self) -> FrameReceiver {
        self.frames.clone()
    }

    fn stop_tracks(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.running.store(false, Ordering::Release);
        if thread.join().is_err() {
            error!("Camera capture thread panicked");
        }
    }

    fn live_tracks(&self) -> usize {
        usize::from(self.thread.is_some())
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

impl Drop for NokhwaStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

//! Camera capability seam and scoped stream ownership.
//!
//! The workflow never talks to a platform camera API directly. A UI layer implements
//! [`MediaCapability`] for its toolkit; the controller only sees streams, surface
//! dimensions, and raw frames.

use std::{io::Cursor, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    User,
    Environment,
}

/// Preferred stream shape. Devices may grant something else; capture always reads
/// the negotiated surface dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub facing_mode: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            facing_mode: FacingMode::Environment,
            ideal_width: 1280,
            ideal_height: 720,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    pub id: StreamId,
    pub label: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfaceDimensions {
    pub width: u32,
    pub height: u32,
}

impl SurfaceDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Metadata has loaded and a frame can be rasterized.
    pub fn is_usable(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Raw RGBA frame read from the display surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera device found")]
    NotFound,
    #[error("camera device is busy")]
    InUse,
    #[error("display or rasterization surface unavailable")]
    SurfaceUnavailable,
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait MediaCapability: Send + Sync {
    /// The platform exposes a camera API at all.
    fn is_supported(&self) -> bool;
    /// Camera access is only granted in a privileged (secure) context.
    fn is_secure_context(&self) -> bool;
    async fn video_input_count(&self) -> Result<usize, MediaError>;
    async fn request_stream(&self, constraints: &MediaConstraints)
        -> Result<MediaStream, MediaError>;
    /// Attaches the stream to a display surface and starts playback. Resolves with
    /// whatever dimensions the surface reports at that point, possibly zero.
    async fn bind_surface(&self, stream: &MediaStream) -> Result<SurfaceDimensions, MediaError>;
    /// Current surface dimensions; `None` once the surface is gone.
    fn surface_dimensions(&self, stream: &MediaStream) -> Option<SurfaceDimensions>;
    fn read_frame(
        &self,
        stream: &MediaStream,
        dimensions: SurfaceDimensions,
    ) -> Result<Frame, MediaError>;
    /// Stops every track of the stream. Must be idempotent.
    fn stop_stream(&self, stream: &MediaStream);
}

/// Capability for environments without a camera (headless CLI, tests).
pub struct MissingMediaCapability;

#[async_trait]
impl MediaCapability for MissingMediaCapability {
    fn is_supported(&self) -> bool {
        false
    }

    fn is_secure_context(&self) -> bool {
        false
    }

    async fn video_input_count(&self) -> Result<usize, MediaError> {
        Ok(0)
    }

    async fn request_stream(
        &self,
        _constraints: &MediaConstraints,
    ) -> Result<MediaStream, MediaError> {
        Err(MediaError::NotFound)
    }

    async fn bind_surface(&self, _stream: &MediaStream) -> Result<SurfaceDimensions, MediaError> {
        Err(MediaError::SurfaceUnavailable)
    }

    fn surface_dimensions(&self, _stream: &MediaStream) -> Option<SurfaceDimensions> {
        None
    }

    fn read_frame(
        &self,
        _stream: &MediaStream,
        _dimensions: SurfaceDimensions,
    ) -> Result<Frame, MediaError> {
        Err(MediaError::SurfaceUnavailable)
    }

    fn stop_stream(&self, _stream: &MediaStream) {}
}

/// Owns a live stream and stops it exactly once, on [`StreamGuard::release`] or drop.
pub struct StreamGuard {
    media: Arc<dyn MediaCapability>,
    stream: MediaStream,
    released: bool,
}

impl StreamGuard {
    pub fn new(media: Arc<dyn MediaCapability>, stream: MediaStream) -> Self {
        Self {
            media,
            stream,
            released: false,
        }
    }

    pub fn stream(&self) -> &MediaStream {
        &self.stream
    }

    pub fn release(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.media.stop_stream(&self.stream);
        debug!(stream_id = self.stream.id.0, "media: stream tracks stopped");
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Encodes an RGBA frame as JPEG. Alpha is dropped.
pub fn encode_jpeg(frame: &Frame) -> Result<Vec<u8>, MediaError> {
    let rgba = image::RgbaImage::from_raw(frame.width, frame.height, frame.rgba.clone())
        .ok_or_else(|| {
            MediaError::Other(format!(
                "frame buffer of {} bytes does not match {}x{}",
                frame.rgba.len(),
                frame.width,
                frame.height
            ))
        })?;
    let rgb = image::DynamicImage::ImageRgba8(rgba).to_rgb8();
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(rgb)
        .write_to(&mut out, image::ImageFormat::Jpeg)
        .map_err(|err| MediaError::Other(err.to_string()))?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct CountingMedia {
        stopped: Mutex<Vec<StreamId>>,
    }

    #[async_trait]
    impl MediaCapability for CountingMedia {
        fn is_supported(&self) -> bool {
            true
        }

        fn is_secure_context(&self) -> bool {
            true
        }

        async fn video_input_count(&self) -> Result<usize, MediaError> {
            Ok(1)
        }

        async fn request_stream(
            &self,
            _constraints: &MediaConstraints,
        ) -> Result<MediaStream, MediaError> {
            Ok(MediaStream {
                id: StreamId(1),
                label: "rear".into(),
            })
        }

        async fn bind_surface(
            &self,
            _stream: &MediaStream,
        ) -> Result<SurfaceDimensions, MediaError> {
            Ok(SurfaceDimensions::new(4, 4))
        }

        fn surface_dimensions(&self, _stream: &MediaStream) -> Option<SurfaceDimensions> {
            Some(SurfaceDimensions::new(4, 4))
        }

        fn read_frame(
            &self,
            _stream: &MediaStream,
            dimensions: SurfaceDimensions,
        ) -> Result<Frame, MediaError> {
            Ok(Frame {
                width: dimensions.width,
                height: dimensions.height,
                rgba: vec![200; (dimensions.width * dimensions.height * 4) as usize],
            })
        }

        fn stop_stream(&self, stream: &MediaStream) {
            self.stopped.lock().expect("lock").push(stream.id);
        }
    }

    fn stream(id: u64) -> MediaStream {
        MediaStream {
            id: StreamId(id),
            label: format!("camera-{id}"),
        }
    }

    #[test]
    fn guard_stops_stream_once_on_release() {
        let media = Arc::new(CountingMedia::default());
        let guard = StreamGuard::new(media.clone(), stream(7));
        guard.release();
        assert_eq!(*media.stopped.lock().expect("lock"), vec![StreamId(7)]);
    }

    #[test]
    fn guard_stops_stream_when_dropped() {
        let media = Arc::new(CountingMedia::default());
        {
            let _guard = StreamGuard::new(media.clone(), stream(3));
        }
        assert_eq!(*media.stopped.lock().expect("lock"), vec![StreamId(3)]);
    }

    #[test]
    fn default_constraints_prefer_rear_camera_at_720p() {
        let constraints = MediaConstraints::default();
        assert_eq!(constraints.facing_mode, FacingMode::Environment);
        assert_eq!((constraints.ideal_width, constraints.ideal_height), (1280, 720));
    }

    #[test]
    fn zero_sized_surfaces_are_not_usable() {
        assert!(!SurfaceDimensions::default().is_usable());
        assert!(!SurfaceDimensions::new(640, 0).is_usable());
        assert!(SurfaceDimensions::new(640, 480).is_usable());
    }

    #[test]
    fn encodes_frames_as_jpeg() {
        let frame = Frame {
            width: 8,
            height: 6,
            rgba: vec![128; 8 * 6 * 4],
        };
        let bytes = encode_jpeg(&frame).expect("jpeg");
        assert_eq!(&bytes[..3], &[0xff, 0xd8, 0xff]);

        let decoded = image::load_from_memory(&bytes).expect("decode");
        assert_eq!(decoded.to_rgb8().dimensions(), (8, 6));
    }

    #[test]
    fn rejects_frames_with_mismatched_buffers() {
        let frame = Frame {
            width: 8,
            height: 6,
            rgba: vec![0; 10],
        };
        assert!(matches!(encode_jpeg(&frame), Err(MediaError::Other(_))));
    }
}

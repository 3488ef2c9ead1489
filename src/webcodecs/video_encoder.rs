//! VideoEncoder - WebCodecs API implementation
//!
//! Provides video encoding functionality using FFmpeg.
//! See: https://developer.mozilla.org/en-US/docs/Web/API/VideoEncoder

use crate::codec::{CodecContext, EncoderConfig, Frame, Packet, Scaler};
use crate::core::{CodecBackend, ControlMessageQueue, DequeueCoalescer, Reclaimable, ResourceManager};
use crate::ffi::AVPixelFormat;
use crate::webcodecs::codec_string::{is_valid_codec_shape, parse_codec_string};
use crate::webcodecs::error::{encoding_error, not_supported_error, quota_exceeded_error};
use crate::webcodecs::{EncodedVideoChunk, VideoEncoderConfig, VideoFrame};
use napi::bindgen_prelude::*;
use napi::threadsafe_function::{ThreadsafeFunction, ThreadsafeFunctionCallMode};
use napi_derive::napi;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::oneshot;

/// Encoder/decoder state (shared shape across all four engines).
#[napi(string_enum)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CodecState {
    #[default]
    Unconfigured,
    Configured,
    Closed,
}

/// Output callback metadata
#[napi(object)]
pub struct EncodedVideoChunkMetadata {
    /// Decoder configuration for this chunk (present on the first output after
    /// configure, and on any output carrying new parameter sets)
    pub decoder_config: Option<VideoDecoderConfigOutput>,
    /// Temporal layer id, present only when the scalability mode has >1 temporal layer
    pub svc_temporal_layer_id: Option<u32>,
    /// Present when alpha encoding is enabled
    pub alpha_side_data: Option<Buffer>,
}

/// Decoder configuration output (for passing to decoder)
#[napi(object)]
pub struct VideoDecoderConfigOutput {
    pub codec: String,
    pub coded_width: Option<u32>,
    pub coded_height: Option<u32>,
    pub description: Option<Buffer>,
}

/// Encode options
#[napi(object)]
#[derive(Debug, Clone, Default)]
pub struct VideoEncoderEncodeOptions {
    pub key_frame: Option<bool>,
}

/// Result of isConfigSupported
#[napi(object)]
#[derive(Debug, Clone)]
pub struct VideoEncoderSupport {
    pub supported: bool,
    pub config: VideoEncoderConfig,
}

type OutputCallback = ThreadsafeFunction<(EncodedVideoChunk, EncodedVideoChunkMetadata)>;
type ErrorCallback = ThreadsafeFunction<String>;

/// Orientation latched from the first frame encoded after each configure/reset
/// (§4.7). Subsequent frames with a different orientation are an EncodingError.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Orientation {
    rotation: f64,
    flip: bool,
}

struct VideoEncoderInner {
    state: CodecState,
    config: Option<VideoEncoderConfig>,
    width: u32,
    height: u32,
    codec_string: String,
    svc_temporal_layers: Option<u32>,
    alpha_enabled: bool,
    extradata_sent: bool,
    active_orientation: Option<Orientation>,
    queue_size: u32,
    pending_flushes: Vec<Arc<Mutex<Option<oneshot::Sender<Result<()>>>>>>,
}

impl VideoEncoderInner {
    fn fresh() -> Self {
        Self {
            state: CodecState::Unconfigured,
            config: None,
            width: 0,
            height: 0,
            codec_string: String::new(),
            svc_temporal_layers: None,
            alpha_enabled: false,
            extradata_sent: false,
            active_orientation: None,
            queue_size: 0,
            pending_flushes: Vec::new(),
        }
    }

    /// Reset algorithm steps shared by `reset()` and `close()`.
    fn reset_state(&mut self) {
        self.state = CodecState::Unconfigured;
        self.queue_size = 0;
        self.active_orientation = None;
        for slot in self.pending_flushes.drain(..) {
            if let Some(tx) = slot.lock().unwrap().take() {
                let _ = tx.send(Err(crate::webcodecs::error::abort_error("reset() called")));
            }
        }
    }
}

/// Runs exclusively on the dedicated backend thread; owns the FFmpeg context.
struct EncoderWorker {
    context: CodecContext,
    scaler: Option<Scaler>,
    width: u32,
    height: u32,
}

impl EncoderWorker {
    fn encode(&mut self, mut frame: Frame, pts: i64) -> std::result::Result<Vec<Packet>, String> {
        let needs_conversion =
            frame.format() != AVPixelFormat::Yuv420p || frame.width() != self.width || frame.height() != self.height;

        let mut frame_to_encode = if needs_conversion {
            if self.scaler.is_none() {
                let scaler = Scaler::new(
                    frame.width(),
                    frame.height(),
                    frame.format(),
                    self.width,
                    self.height,
                    AVPixelFormat::Yuv420p,
                    crate::codec::scaler::ScaleAlgorithm::Bilinear,
                )
                .map_err(|e| format!("failed to create scaler: {e}"))?;
                self.scaler = Some(scaler);
            }
            self
                .scaler
                .as_ref()
                .unwrap()
                .scale_alloc(&frame)
                .map_err(|e| format!("failed to scale frame: {e}"))?
        } else {
            frame.set_pts(pts);
            frame
        };
        if needs_conversion {
            frame_to_encode.set_pts(pts);
        }

        self.context
            .encode(Some(&frame_to_encode))
            .map_err(|e| format!("encode failed: {e}"))
    }

    fn flush(&mut self) -> std::result::Result<Vec<Packet>, String> {
        self.context.flush_encoder().map_err(|e| format!("flush failed: {e}"))
    }

    fn extradata(&self) -> Option<Vec<u8>> {
        self.context.extradata().map(|d| d.to_vec())
    }
}

/// Holds everything the process-wide [`ResourceManager`] needs to reclaim this
/// engine: its shared mutable state plus the error callback it must invoke first.
struct EncoderHandle {
    inner: Mutex<VideoEncoderInner>,
    error_callback: ErrorCallback,
    last_activity: Mutex<Instant>,
    background: AtomicBool,
}

impl Reclaimable for EncoderHandle {
    fn last_activity_instant(&self) -> Instant {
        *self.last_activity.lock().unwrap()
    }

    fn is_foreground(&self) -> bool {
        !self.background.load(Ordering::SeqCst)
    }

    fn reclaim(&self) {
        self.error_callback.call(
            Ok(quota_exceeded_error("encoder reclaimed after inactivity").reason),
            ThreadsafeFunctionCallMode::NonBlocking,
        );
        let mut inner = self.inner.lock().unwrap();
        inner.reset_state();
        inner.state = CodecState::Closed;
    }
}

/// VideoEncoder - WebCodecs-compliant video encoder.
///
/// Every call that touches codec state is serialized through a per-instance
/// [`ControlMessageQueue`]; the actual FFmpeg work runs on a dedicated
/// [`CodecBackend`] thread so `encode()`/`flush()` never block the caller.
#[napi]
pub struct VideoEncoder {
    handle: Arc<EncoderHandle>,
    control_queue: ControlMessageQueue,
    backend: Mutex<Option<Arc<CodecBackend<EncoderWorker>>>>,
    dequeue: Arc<DequeueCoalescer>,
    output_callback: OutputCallback,
    resource_manager_id: Mutex<Option<u64>>,
}

#[napi]
impl VideoEncoder {
    #[napi(constructor)]
    pub fn new(output: OutputCallback, error: ErrorCallback) -> Result<Self> {
        let handle = Arc::new(EncoderHandle {
            inner: Mutex::new(VideoEncoderInner::fresh()),
            error_callback: error,
            last_activity: Mutex::new(Instant::now()),
            background: AtomicBool::new(false),
        });
        let weak: std::sync::Weak<dyn Reclaimable> = Arc::downgrade(&(handle.clone() as Arc<dyn Reclaimable>));
        let resource_manager_id = ResourceManager::global().register(weak);

        Ok(Self {
            handle,
            control_queue: ControlMessageQueue::new(),
            backend: Mutex::new(None),
            dequeue: Arc::new(DequeueCoalescer::new()),
            output_callback: output,
            resource_manager_id: Mutex::new(Some(resource_manager_id)),
        })
    }

    #[napi(getter)]
    pub fn state(&self) -> CodecState {
        self.handle.inner.lock().unwrap().state
    }

    #[napi(getter)]
    pub fn encode_queue_size(&self) -> u32 {
        self.handle.inner.lock().unwrap().queue_size
    }

    #[napi(setter, js_name = "ondequeue")]
    pub fn set_ondequeue(&self, listener: Option<ThreadsafeFunction<()>>) {
        self.dequeue.set_listener(listener);
    }

    /// Tell the resource reclaimer whether the owning host is backgrounded
    /// (§4.9). An active-but-backgrounded encoder becomes reclaimable even
    /// before its inactivity timeout elapses.
    #[napi]
    pub fn set_background(&self, background: bool) {
        self.handle.background.store(background, Ordering::SeqCst);
    }

    /// Configure the encoder. Synchronous validation per §4.8; the backend
    /// (re)open happens asynchronously on the control queue.
    #[napi]
    pub fn configure(&self, config: VideoEncoderConfig) -> Result<()> {
        {
            let inner = self.handle.inner.lock().unwrap();
            if inner.state == CodecState::Closed {
                return Err(crate::webcodecs::error::invalid_state_error("encoder is closed"));
            }
        }

        let codec = config
            .codec
            .clone()
            .filter(|c| is_valid_codec_shape(c))
            .ok_or_else(|| crate::webcodecs::error::js_type_error("codec is required"))?;
        let width = config
            .width
            .ok_or_else(|| crate::webcodecs::error::js_type_error("width is required"))?;
        let height = config
            .height
            .ok_or_else(|| crate::webcodecs::error::js_type_error("height is required"))?;
        if (config.display_width.is_some()) != (config.display_height.is_some()) {
            return Err(crate::webcodecs::error::js_type_error(
                "displayWidth and displayHeight must both be present or both absent",
            ));
        }

        let parsed = parse_codec_string(&codec)
            .ok_or_else(|| crate::webcodecs::error::js_type_error(&format!("unsupported codec: {codec}")))?;
        let codec_id = parsed.codec_id;

        let svc_temporal_layers = config
            .scalability_mode
            .as_ref()
            .and_then(|mode| parse_scalability_mode(mode))
            .map(|(_spatial, temporal)| temporal)
            .filter(|&t| t > 1);
        let alpha_enabled = matches!(
            config.alpha,
            Some(crate::webcodecs::AlphaOption::Keep)
        );

        let (gop_size, max_b_frames) = match config.latency_mode {
            Some(crate::webcodecs::LatencyMode::Realtime) => (10, 0),
            _ => (60, 2),
        };
        let bitrate = config.bitrate.unwrap_or(5_000_000.0) as u64;
        let framerate = config.framerate.unwrap_or(30.0) as u32;

        let worker_result = (|| -> std::result::Result<EncoderWorker, String> {
            let mut context =
                CodecContext::new_encoder(codec_id).map_err(|e| format!("failed to create encoder: {e}"))?;
            let encoder_config = EncoderConfig {
                width,
                height,
                pixel_format: AVPixelFormat::Yuv420p,
                bitrate,
                framerate_num: framerate,
                framerate_den: 1,
                gop_size,
                max_b_frames,
                thread_count: 0,
                profile: None,
                level: None,
            };
            context
                .configure_encoder(&encoder_config)
                .map_err(|e| format!("failed to configure encoder: {e}"))?;
            context.open().map_err(|e| format!("failed to open encoder: {e}"))?;
            Ok(EncoderWorker {
                context,
                scaler: None,
                width,
                height,
            })
        })();

        match worker_result {
            Ok(worker) => {
                *self.backend.lock().unwrap() = Some(Arc::new(CodecBackend::spawn(worker)));
                let mut inner = self.handle.inner.lock().unwrap();
                inner.config = Some(config);
                inner.width = width;
                inner.height = height;
                inner.codec_string = codec;
                inner.svc_temporal_layers = svc_temporal_layers;
                inner.alpha_enabled = alpha_enabled;
                inner.extradata_sent = false;
                inner.active_orientation = None;
                inner.state = CodecState::Configured;
                Ok(())
            }
            Err(msg) => {
                let mut inner = self.handle.inner.lock().unwrap();
                inner.state = CodecState::Closed;
                drop(inner);
                self.handle.error_callback.call(
                    Ok(not_supported_error(&msg).reason),
                    ThreadsafeFunctionCallMode::NonBlocking,
                );
                Err(crate::webcodecs::error::not_supported_error(&msg))
            }
        }
    }

    /// Encode a frame. Enqueued onto the control queue; the actual FFmpeg call
    /// runs on the backend thread.
    #[napi]
    pub fn encode(&self, frame: &VideoFrame, options: Option<VideoEncoderEncodeOptions>) -> Result<()> {
        {
            let inner = self.handle.inner.lock().unwrap();
            if inner.state != CodecState::Configured {
                return Err(crate::webcodecs::error::invalid_state_error("encoder not configured"));
            }
        }
        if frame.closed()? {
            return Err(crate::webcodecs::error::js_type_error("frame is closed"));
        }

        let orientation = Orientation {
            rotation: frame.rotation().unwrap_or(0.0),
            flip: frame.flip().unwrap_or(false),
        };
        let timestamp = frame.timestamp()?;
        let internal_frame = frame
            .with_frame(|f| f.try_clone())
            .map_err(|e| crate::webcodecs::error::js_type_error(&format!("failed to access frame: {e}")))?
            .map_err(|e| crate::webcodecs::error::js_type_error(&format!("failed to clone frame: {e}")))?;
        let force_key = options.and_then(|o| o.key_frame).unwrap_or(false);
        let _ = force_key; // surfaced to the backend via AVFrame pict_type in a future codec revision

        {
            let mut inner = self.handle.inner.lock().unwrap();
            match inner.active_orientation {
                None => inner.active_orientation = Some(orientation),
                Some(active) if active != orientation => {
                    drop(inner);
                    self.handle.error_callback.call(
                        Ok(encoding_error("frame orientation changed mid-stream").reason),
                        ThreadsafeFunctionCallMode::NonBlocking,
                    );
                    return Ok(());
                }
                _ => {}
            }
            inner.queue_size += 1;
        }

        let backend = self
            .backend
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| crate::webcodecs::error::invalid_state_error("encoder not configured"))?;
        let handle = Arc::clone(&self.handle);
        let output_callback = self.output_callback.clone();
        let dequeue = Arc::clone(&self.dequeue);

        self.control_queue.enqueue(async move {
            *handle.last_activity.lock().unwrap() = Instant::now();
            let (tx, rx) = oneshot::channel();
            backend.submit(Box::new(move |w: &mut EncoderWorker| {
                let result = w.encode(internal_frame, timestamp);
                let extradata = w.extradata();
                let _ = tx.send((result, extradata));
            }));
            let (result, extradata) = rx.await.unwrap_or((Ok(Vec::new()), None));

            match result {
                Ok(packets) => {
                    let mut inner = handle.inner.lock().unwrap();
                    let codec_string = inner.codec_string.clone();
                    let width = inner.width;
                    let height = inner.height;
                    for packet in packets {
                        let chunk = EncodedVideoChunk::from_packet_with_format(packet, None, false);
                        let decoder_config = if !inner.extradata_sent && chunk.is_key() {
                            inner.extradata_sent = true;
                            Some(VideoDecoderConfigOutput {
                                codec: codec_string.clone(),
                                coded_width: Some(width),
                                coded_height: Some(height),
                                description: extradata.clone().map(Buffer::from),
                            })
                        } else {
                            None
                        };
                        let metadata = EncodedVideoChunkMetadata {
                            decoder_config,
                            svc_temporal_layer_id: inner.svc_temporal_layers.map(|_| 0),
                            alpha_side_data: None,
                        };
                        output_callback.call(Ok((chunk, metadata)), ThreadsafeFunctionCallMode::NonBlocking);
                        inner.queue_size = inner.queue_size.saturating_sub(1);
                    }
                    let is_closed = inner.state == CodecState::Closed;
                    drop(inner);
                    dequeue.schedule(move || is_closed);
                }
                Err(msg) => {
                    handle.error_callback.call(
                        Ok(encoding_error(&msg).reason),
                        ThreadsafeFunctionCallMode::NonBlocking,
                    );
                    let mut inner = handle.inner.lock().unwrap();
                    inner.state = CodecState::Closed;
                }
            }
        });

        Ok(())
    }

    /// Flush pending output. The returned future resolves once everything
    /// enqueued so far has drained, or rejects with AbortError if reset/close
    /// races it.
    #[napi]
    pub async fn flush(&self) -> Result<()> {
        {
            let inner = self.handle.inner.lock().unwrap();
            if inner.state != CodecState::Configured {
                return Err(crate::webcodecs::error::invalid_state_error("encoder not configured"));
            }
        }

        let (tx, rx) = oneshot::channel();
        let slot = Arc::new(Mutex::new(Some(tx)));
        {
            let mut inner = self.handle.inner.lock().unwrap();
            inner.pending_flushes.push(Arc::clone(&slot));
        }

        let backend = self
            .backend
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| crate::webcodecs::error::invalid_state_error("encoder not configured"))?;
        let handle = Arc::clone(&self.handle);
        let output_callback = self.output_callback.clone();
        let dequeue = Arc::clone(&self.dequeue);
        let flush_slot = Arc::clone(&slot);

        self.control_queue.enqueue(async move {
            let (btx, brx) = oneshot::channel();
            backend.submit(Box::new(move |w: &mut EncoderWorker| {
                let _ = btx.send(w.flush());
            }));
            if let Ok(Ok(packets)) = brx.await {
                let mut inner = handle.inner.lock().unwrap();
                for packet in packets {
                    let chunk = EncodedVideoChunk::from_packet_with_format(packet, None, false);
                    let metadata = EncodedVideoChunkMetadata {
                        decoder_config: None,
                        svc_temporal_layer_id: None,
                        alpha_side_data: None,
                    };
                    output_callback.call(Ok((chunk, metadata)), ThreadsafeFunctionCallMode::NonBlocking);
                    inner.queue_size = inner.queue_size.saturating_sub(1);
                }
                let is_closed = inner.state == CodecState::Closed;
                drop(inner);
                dequeue.schedule(move || is_closed);
            }

            if let Some(tx) = flush_slot.lock().unwrap().take() {
                let _ = tx.send(Ok(()));
            }
            let mut inner = handle.inner.lock().unwrap();
            inner.pending_flushes.retain(|s| !Arc::ptr_eq(s, &flush_slot));
        });

        rx.await
            .unwrap_or_else(|_| Err(crate::webcodecs::error::abort_error("encoder closed during flush")))
    }

    /// Reset the encoder. Throws InvalidStateError if already closed (video
    /// encoders do not treat this as a no-op, unlike the audio engines).
    #[napi]
    pub fn reset(&self) -> Result<()> {
        let mut inner = self.handle.inner.lock().unwrap();
        if inner.state == CodecState::Closed {
            return Err(crate::webcodecs::error::invalid_state_error("encoder is closed"));
        }
        inner.reset_state();
        drop(inner);
        self.control_queue.clear();
        Ok(())
    }

    #[napi]
    pub fn close(&self) -> Result<()> {
        let mut inner = self.handle.inner.lock().unwrap();
        if inner.state == CodecState::Closed {
            return Ok(());
        }
        inner.reset_state();
        inner.state = CodecState::Closed;
        drop(inner);
        self.control_queue.clear();
        *self.backend.lock().unwrap() = None;
        if let Some(id) = self.resource_manager_id.lock().unwrap().take() {
            ResourceManager::global().unregister(id);
        }
        Ok(())
    }

    /// Check if a configuration is supported. Performs the shape check from
    /// §4.8 synchronously, then probes the backend by attempting to open it.
    #[napi]
    pub async fn is_config_supported(config: VideoEncoderConfig) -> Result<VideoEncoderSupport> {
        let shape_ok = config
            .codec
            .as_deref()
            .is_some_and(is_valid_codec_shape)
            && config.width.is_some()
            && config.height.is_some()
            && (config.display_width.is_some() == config.display_height.is_some());

        if !shape_ok {
            return Ok(VideoEncoderSupport { supported: false, config });
        }

        let codec_id = match config.codec.as_deref().and_then(parse_codec_string) {
            Some(parsed) => parsed.codec_id,
            None => return Ok(VideoEncoderSupport { supported: false, config }),
        };

        let supported = CodecContext::new_encoder(codec_id).is_ok();
        Ok(VideoEncoderSupport { supported, config })
    }
}

/// Parse scalability mode string (e.g., "L1T1", "L1T2", "L1T3").
/// Returns (spatial_layers, temporal_layers).
fn parse_scalability_mode(mode: &str) -> Option<(u32, u32)> {
    let mode_upper = mode.to_uppercase();
    if mode_upper.starts_with('L') && mode_upper.contains('T') {
        let parts: Vec<&str> = mode_upper.split('T').collect();
        if parts.len() == 2 {
            let spatial = parts[0].trim_start_matches('L').parse::<u32>().ok()?;
            let temporal = parts[1].chars().next()?.to_digit(10)?;
            return Some((spatial, temporal));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalability_mode_parses_spatial_and_temporal_layers() {
        assert_eq!(parse_scalability_mode("L1T3"), Some((1, 3)));
        assert_eq!(parse_scalability_mode("L3T1"), Some((3, 1)));
        assert_eq!(parse_scalability_mode("garbage"), None);
    }
}

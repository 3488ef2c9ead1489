//! VideoDecoder - WebCodecs API implementation
//!
//! Provides video decoding functionality using FFmpeg.
//! See: https://developer.mozilla.org/en-US/docs/Web/API/VideoDecoder

use crate::codec::{CodecContext, DecoderConfig, Frame, Packet};
use crate::core::{CodecBackend, ControlMessageQueue, DequeueCoalescer, Reclaimable, ResourceManager};
use crate::ffi::AVHWDeviceType;
use crate::webcodecs::codec_string::{is_valid_codec_shape, parse_codec_string};
use crate::webcodecs::error::{abort_error, data_error, invalid_state_error, js_type_error, not_supported_error, quota_exceeded_error};
use crate::webcodecs::{CodecState, EncodedVideoChunk, HardwareAcceleration, VideoDecoderConfig, VideoFrame};
use napi::bindgen_prelude::*;
use napi::threadsafe_function::{ThreadsafeFunction, ThreadsafeFunctionCallMode};
use napi_derive::napi;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::oneshot;

/// Result of isConfigSupported
#[napi(object)]
#[derive(Debug, Clone)]
pub struct VideoDecoderSupport {
    pub supported: bool,
    pub config: VideoDecoderConfig,
}

type OutputCallback = ThreadsafeFunction<VideoFrame>;
type ErrorCallback = ThreadsafeFunction<String>;

struct VideoDecoderInner {
    state: CodecState,
    codec_string: String,
    queue_size: u32,
    /// Accepted chunks whose corresponding frame has not yet been delivered
    /// (§4.6), distinct from `queue_size` (which tracks decode *messages*
    /// still in flight, decremented once per message regardless of how many
    /// frames it eventually produces).
    pending_frames: u32,
    /// The first chunk decoded after configure/flush must be a key chunk (§4.6).
    key_chunk_required: bool,
    pending_flushes: Vec<Arc<Mutex<Option<oneshot::Sender<Result<()>>>>>>,
}

impl VideoDecoderInner {
    fn fresh() -> Self {
        Self {
            state: CodecState::Unconfigured,
            codec_string: String::new(),
            queue_size: 0,
            pending_frames: 0,
            key_chunk_required: true,
            pending_flushes: Vec::new(),
        }
    }

    fn reset_state(&mut self) {
        self.state = CodecState::Unconfigured;
        self.queue_size = 0;
        self.pending_frames = 0;
        self.key_chunk_required = true;
        for slot in self.pending_flushes.drain(..) {
            if let Some(tx) = slot.lock().unwrap().take() {
                let _ = tx.send(Err(abort_error("reset() called")));
            }
        }
    }
}

/// Runs exclusively on the dedicated backend thread; owns the FFmpeg context.
struct DecoderWorker {
    context: CodecContext,
}

impl DecoderWorker {
    fn decode(&mut self, packet: Packet) -> std::result::Result<Vec<Frame>, String> {
        self.context.decode(Some(&packet)).map_err(|e| format!("decode failed: {e}"))
    }

    fn flush(&mut self) -> std::result::Result<Vec<Frame>, String> {
        self.context.flush_decoder().map_err(|e| format!("flush failed: {e}"))
    }
}

/// Holds everything the process-wide [`ResourceManager`] needs to reclaim this
/// engine: its shared mutable state plus the error callback it must invoke first.
struct DecoderHandle {
    inner: Mutex<VideoDecoderInner>,
    error_callback: ErrorCallback,
    last_activity: Mutex<Instant>,
    background: AtomicBool,
}

impl Reclaimable for DecoderHandle {
    fn last_activity_instant(&self) -> Instant {
        *self.last_activity.lock().unwrap()
    }

    fn is_foreground(&self) -> bool {
        !self.background.load(Ordering::SeqCst)
    }

    fn reclaim(&self) {
        self.error_callback.call(
            Ok(quota_exceeded_error("decoder reclaimed after inactivity").reason),
            ThreadsafeFunctionCallMode::NonBlocking,
        );
        let mut inner = self.inner.lock().unwrap();
        inner.reset_state();
        inner.state = CodecState::Closed;
    }
}

/// VideoDecoder - WebCodecs-compliant video decoder.
///
/// Every call that touches codec state is serialized through a per-instance
/// [`ControlMessageQueue`]; the actual FFmpeg work runs on a dedicated
/// [`CodecBackend`] thread so `decode()`/`flush()` never block the caller.
#[napi]
pub struct VideoDecoder {
    handle: Arc<DecoderHandle>,
    control_queue: ControlMessageQueue,
    backend: Mutex<Option<Arc<CodecBackend<DecoderWorker>>>>,
    dequeue: Arc<DequeueCoalescer>,
    output_callback: OutputCallback,
    resource_manager_id: Mutex<Option<u64>>,
}

#[napi]
impl VideoDecoder {
    #[napi(constructor)]
    pub fn new(output: OutputCallback, error: ErrorCallback) -> Result<Self> {
        let handle = Arc::new(DecoderHandle {
            inner: Mutex::new(VideoDecoderInner::fresh()),
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
    pub fn decode_queue_size(&self) -> u32 {
        self.handle.inner.lock().unwrap().queue_size
    }

    /// Accepted chunks whose corresponding frame has not yet been delivered (§4.6).
    #[napi(getter)]
    pub fn pending_frames(&self) -> u32 {
        self.handle.inner.lock().unwrap().pending_frames
    }

    #[napi(setter, js_name = "ondequeue")]
    pub fn set_ondequeue(&self, listener: Option<ThreadsafeFunction<()>>) {
        self.dequeue.set_listener(listener);
    }

    /// Tell the resource reclaimer whether the owning host is backgrounded
    /// (§4.9). An active-but-backgrounded decoder becomes reclaimable even
    /// before its inactivity timeout elapses.
    #[napi]
    pub fn set_background(&self, background: bool) {
        self.handle.background.store(background, Ordering::SeqCst);
    }

    /// Configure the decoder. Synchronous validation per §4.8; the backend
    /// (re)open happens inline since opening is cheap relative to decode work.
    #[napi]
    pub fn configure(&self, config: VideoDecoderConfig) -> Result<()> {
        {
            let inner = self.handle.inner.lock().unwrap();
            if inner.state == CodecState::Closed {
                return Err(invalid_state_error("decoder is closed"));
            }
        }

        let codec = config
            .codec
            .clone()
            .filter(|c| is_valid_codec_shape(c))
            .ok_or_else(|| js_type_error("codec is required"))?;
        let parsed =
            parse_codec_string(&codec).ok_or_else(|| js_type_error(&format!("unsupported codec: {codec}")))?;
        let codec_id = parsed.codec_id;
        let hw_type = config.hardware_acceleration.as_ref().and_then(parse_hw_acceleration);
        let extradata = config.description.as_ref().map(|d| d.to_vec());

        let worker_result = (|| -> std::result::Result<DecoderWorker, String> {
            let mut context = CodecContext::new_decoder_with_hw(codec_id, hw_type)
                .map_err(|e| format!("failed to create decoder: {e}"))?;
            let decoder_config = DecoderConfig {
                codec_id,
                thread_count: 0,
                extradata,
            };
            context
                .configure_decoder(&decoder_config)
                .map_err(|e| format!("failed to configure decoder: {e}"))?;
            context.open().map_err(|e| format!("failed to open decoder: {e}"))?;
            Ok(DecoderWorker { context })
        })();

        match worker_result {
            Ok(worker) => {
                *self.backend.lock().unwrap() = Some(Arc::new(CodecBackend::spawn(worker)));
                let mut inner = self.handle.inner.lock().unwrap();
                inner.codec_string = codec;
                inner.state = CodecState::Configured;
                inner.queue_size = 0;
                inner.key_chunk_required = true;
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
                Err(not_supported_error(&msg))
            }
        }
    }

    /// Decode an encoded video chunk. Enqueued onto the control queue; the
    /// actual FFmpeg call runs on the backend thread.
    #[napi]
    pub fn decode(&self, chunk: &EncodedVideoChunk) -> Result<()> {
        {
            let inner = self.handle.inner.lock().unwrap();
            if inner.state != CodecState::Configured {
                return Err(invalid_state_error("decoder not configured"));
            }
        }

        let is_key = chunk.is_key();
        {
            let mut inner = self.handle.inner.lock().unwrap();
            if inner.key_chunk_required {
                if !is_key {
                    drop(inner);
                    self.handle.error_callback.call(
                        Ok(data_error("first chunk after configure/flush must be a key chunk").reason),
                        ThreadsafeFunctionCallMode::NonBlocking,
                    );
                    return Ok(());
                }
                inner.key_chunk_required = false;
            }
            inner.queue_size += 1;
            inner.pending_frames += 1;
        }

        let packet = chunk.get_packet_for_muxing()?;
        let timestamp = chunk.timestamp()?;
        let duration = chunk.duration()?;

        let backend = self
            .backend
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| invalid_state_error("decoder not configured"))?;
        let handle = Arc::clone(&self.handle);
        let output_callback = self.output_callback.clone();
        let dequeue = Arc::clone(&self.dequeue);

        self.control_queue.enqueue(async move {
            *handle.last_activity.lock().unwrap() = Instant::now();
            let (tx, rx) = oneshot::channel();
            backend.submit(Box::new(move |w: &mut DecoderWorker| {
                let result = w.decode(packet);
                let _ = tx.send(result);
            }));
            let result = rx.await.unwrap_or(Ok(Vec::new()));

            match result {
                Ok(frames) => {
                    let mut queue_size_decremented = false;
                    for frame in frames {
                        let pts = frame.pts();
                        let frame_duration = if frame.duration() > 0 { Some(frame.duration()) } else { duration };
                        let frame_timestamp = if pts != 0 { pts } else { timestamp };
                        let video_frame = VideoFrame::from_internal(frame, frame_timestamp, frame_duration);
                        output_callback.call(Ok(video_frame), ThreadsafeFunctionCallMode::NonBlocking);
                        let mut inner = handle.inner.lock().unwrap();
                        inner.pending_frames = inner.pending_frames.saturating_sub(1);
                        if !queue_size_decremented {
                            inner.queue_size = inner.queue_size.saturating_sub(1);
                            queue_size_decremented = true;
                        }
                    }
                    let inner = handle.inner.lock().unwrap();
                    let is_closed = inner.state == CodecState::Closed;
                    drop(inner);
                    dequeue.schedule(move || is_closed);
                }
                Err(msg) => {
                    handle.error_callback.call(
                        Ok(data_error(&msg).reason),
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
    /// races it. Re-arms the key-chunk-required invariant on completion.
    #[napi]
    pub async fn flush(&self) -> Result<()> {
        {
            let inner = self.handle.inner.lock().unwrap();
            if inner.state != CodecState::Configured {
                return Err(invalid_state_error("decoder not configured"));
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
            .ok_or_else(|| invalid_state_error("decoder not configured"))?;
        let handle = Arc::clone(&self.handle);
        let output_callback = self.output_callback.clone();
        let dequeue = Arc::clone(&self.dequeue);
        let flush_slot = Arc::clone(&slot);

        self.control_queue.enqueue(async move {
            let (btx, brx) = oneshot::channel();
            backend.submit(Box::new(move |w: &mut DecoderWorker| {
                let _ = btx.send(w.flush());
            }));
            if let Ok(Ok(frames)) = brx.await {
                for frame in frames {
                    let pts = frame.pts();
                    let frame_duration = if frame.duration() > 0 { Some(frame.duration()) } else { None };
                    let video_frame = VideoFrame::from_internal(frame, pts, frame_duration);
                    output_callback.call(Ok(video_frame), ThreadsafeFunctionCallMode::NonBlocking);
                    let mut inner = handle.inner.lock().unwrap();
                    inner.pending_frames = inner.pending_frames.saturating_sub(1);
                }
            }

            let mut inner = handle.inner.lock().unwrap();
            inner.queue_size = 0;
            inner.pending_frames = 0;
            inner.key_chunk_required = true;
            let is_closed = inner.state == CodecState::Closed;
            drop(inner);
            dequeue.schedule(move || is_closed);

            if let Some(tx) = flush_slot.lock().unwrap().take() {
                let _ = tx.send(Ok(()));
            }
            let mut inner = handle.inner.lock().unwrap();
            inner.pending_flushes.retain(|s| !Arc::ptr_eq(s, &flush_slot));
        });

        rx.await
            .unwrap_or_else(|_| Err(abort_error("decoder closed during flush")))
    }

    /// Reset the decoder. Throws InvalidStateError if already closed.
    #[napi]
    pub fn reset(&self) -> Result<()> {
        let mut inner = self.handle.inner.lock().unwrap();
        if inner.state == CodecState::Closed {
            return Err(invalid_state_error("decoder is closed"));
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
    pub async fn is_config_supported(config: VideoDecoderConfig) -> Result<VideoDecoderSupport> {
        let shape_ok = config.codec.as_deref().is_some_and(is_valid_codec_shape);
        if !shape_ok {
            return Ok(VideoDecoderSupport { supported: false, config });
        }

        let codec_id = match config.codec.as_deref().and_then(parse_codec_string) {
            Some(parsed) => parsed.codec_id,
            None => return Ok(VideoDecoderSupport { supported: false, config }),
        };

        let supported = CodecContext::new_decoder(codec_id).is_ok();
        Ok(VideoDecoderSupport { supported, config })
    }
}

/// Map the WebCodecs hardware acceleration preference to a platform device type.
fn parse_hw_acceleration(ha: &HardwareAcceleration) -> Option<AVHWDeviceType> {
    match ha {
        HardwareAcceleration::PreferHardware => {
            #[cfg(target_os = "macos")]
            {
                Some(AVHWDeviceType::Videotoolbox)
            }
            #[cfg(target_os = "linux")]
            {
                Some(AVHWDeviceType::Vaapi)
            }
            #[cfg(target_os = "windows")]
            {
                Some(AVHWDeviceType::D3d11va)
            }
            #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
            {
                None
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hw_acceleration_only_requests_a_device_type_when_hardware_is_preferred() {
        assert!(parse_hw_acceleration(&HardwareAcceleration::NoPreference).is_none());
        assert!(parse_hw_acceleration(&HardwareAcceleration::PreferSoftware).is_none());
    }
}

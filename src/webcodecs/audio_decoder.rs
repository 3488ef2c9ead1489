//! AudioDecoder - WebCodecs API implementation
//!
//! Provides audio decoding functionality using FFmpeg.
//! See: https://developer.mozilla.org/en-US/docs/Web/API/AudioDecoder

use crate::codec::{AudioDecoderConfig as InternalAudioDecoderConfig, CodecContext, Frame, Packet};
use crate::core::{CodecBackend, ControlMessageQueue, DequeueCoalescer, Reclaimable, ResourceManager};
use crate::webcodecs::codec_string::{is_valid_codec_shape, parse_codec_string};
use crate::webcodecs::error::{abort_error, data_error, invalid_state_error, js_type_error, not_supported_error, quota_exceeded_error};
use crate::webcodecs::{AudioData, AudioDecoderConfig, AudioDecoderSupport, EncodedAudioChunk};
use napi::bindgen_prelude::*;
use napi::threadsafe_function::{ThreadsafeFunction, ThreadsafeFunctionCallMode};
use napi_derive::napi;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::oneshot;

use super::video_encoder::CodecState;

type OutputCallback = ThreadsafeFunction<AudioData>;
type ErrorCallback = ThreadsafeFunction<String>;

struct AudioDecoderInner {
    state: CodecState,
    codec_string: String,
    queue_size: u32,
    key_chunk_required: bool,
    pending_flushes: Vec<Arc<Mutex<Option<oneshot::Sender<Result<()>>>>>>,
}

impl AudioDecoderInner {
    fn fresh() -> Self {
        Self {
            state: CodecState::Unconfigured,
            codec_string: String::new(),
            queue_size: 0,
            key_chunk_required: true,
            pending_flushes: Vec::new(),
        }
    }

    fn reset_state(&mut self) {
        self.state = CodecState::Unconfigured;
        self.queue_size = 0;
        self.key_chunk_required = true;
        for slot in self.pending_flushes.drain(..) {
            if let Some(tx) = slot.lock().unwrap().take() {
                let _ = tx.send(Err(abort_error("reset() called")));
            }
        }
    }
}

struct AudioDecoderWorker {
    context: CodecContext,
}

impl AudioDecoderWorker {
    fn decode(&mut self, packet: Packet) -> std::result::Result<Vec<Frame>, String> {
        self.context.decode(Some(&packet)).map_err(|e| format!("decode failed: {e}"))
    }

    fn flush(&mut self) -> std::result::Result<Vec<Frame>, String> {
        self.context.flush_decoder().map_err(|e| format!("flush failed: {e}"))
    }
}

struct DecoderHandle {
    inner: Mutex<AudioDecoderInner>,
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

/// AudioDecoder - WebCodecs-compliant audio decoder.
#[napi]
pub struct AudioDecoder {
    handle: Arc<DecoderHandle>,
    control_queue: ControlMessageQueue,
    backend: Mutex<Option<Arc<CodecBackend<AudioDecoderWorker>>>>,
    dequeue: Arc<DequeueCoalescer>,
    output_callback: OutputCallback,
    resource_manager_id: Mutex<Option<u64>>,
}

#[napi]
impl AudioDecoder {
    #[napi(constructor)]
    pub fn new(output: OutputCallback, error: ErrorCallback) -> Result<Self> {
        let handle = Arc::new(DecoderHandle {
            inner: Mutex::new(AudioDecoderInner::fresh()),
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

    #[napi]
    pub fn configure(&self, config: AudioDecoderConfig) -> Result<()> {
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
        let parsed = parse_codec_string(&codec).ok_or_else(|| js_type_error(&format!("unsupported codec: {codec}")))?;
        let codec_id = parsed.codec_id;

        let sample_rate = config.sample_rate.unwrap_or(0.0) as u32;
        let channels = config.number_of_channels.unwrap_or(0);
        let extradata = config.description.as_ref().map(|d| d.to_vec());

        let worker_result = (|| -> std::result::Result<AudioDecoderWorker, String> {
            let mut context = CodecContext::new_decoder(codec_id).map_err(|e| format!("failed to create decoder: {e}"))?;
            let decoder_config = InternalAudioDecoderConfig {
                codec_id,
                sample_rate,
                channels,
                thread_count: 0,
                extradata,
            };
            context
                .configure_audio_decoder(&decoder_config)
                .map_err(|e| format!("failed to configure decoder: {e}"))?;
            context.open().map_err(|e| format!("failed to open decoder: {e}"))?;
            Ok(AudioDecoderWorker { context })
        })();

        match worker_result {
            Ok(worker) => {
                *self.backend.lock().unwrap() = Some(Arc::new(CodecBackend::spawn(worker)));
                let mut inner = self.handle.inner.lock().unwrap();
                inner.codec_string = codec;
                inner.key_chunk_required = true;
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
                Err(not_supported_error(&msg))
            }
        }
    }

    #[napi]
    pub fn decode(&self, chunk: &EncodedAudioChunk) -> Result<()> {
        {
            let inner = self.handle.inner.lock().unwrap();
            if inner.state != CodecState::Configured {
                return Err(invalid_state_error("decoder not configured"));
            }
        }

        let key_chunk_required = { self.handle.inner.lock().unwrap().key_chunk_required };
        if key_chunk_required && !chunk.is_key() {
            self.handle.error_callback.call(
                Ok(data_error("key frame required after configure() or flush()").reason),
                ThreadsafeFunctionCallMode::NonBlocking,
            );
            return Ok(());
        }

        let data = chunk.get_data_vec()?;
        let timestamp = chunk.get_timestamp()?;
        let mut packet = Packet::new().map_err(|e| js_type_error(&format!("failed to allocate packet: {e}")))?;
        packet.set_pts(timestamp);
        packet.set_dts(timestamp);
        packet
            .copy_data_from(&data)
            .map_err(|e| js_type_error(&format!("failed to copy chunk data: {e}")))?;
        if chunk.is_key() {
            packet.set_flags(crate::ffi::pkt_flag::KEY);
        }

        {
            let mut inner = self.handle.inner.lock().unwrap();
            inner.queue_size += 1;
            inner.key_chunk_required = false;
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

        self.control_queue.enqueue(async move {
            *handle.last_activity.lock().unwrap() = Instant::now();
            let (tx, rx) = oneshot::channel();
            backend.submit(Box::new(move |w: &mut AudioDecoderWorker| {
                let _ = tx.send(w.decode(packet));
            }));

            match rx.await {
                Ok(Ok(frames)) => {
                    let mut inner = handle.inner.lock().unwrap();
                    for frame in frames {
                        let pts = frame.pts();
                        let audio_data = AudioData::from_internal(frame, pts);
                        output_callback.call(Ok(audio_data), ThreadsafeFunctionCallMode::NonBlocking);
                        inner.queue_size = inner.queue_size.saturating_sub(1);
                    }
                    let is_closed = inner.state == CodecState::Closed;
                    drop(inner);
                    dequeue.schedule(move || is_closed);
                }
                Ok(Err(msg)) => {
                    handle.error_callback.call(
                        Ok(crate::webcodecs::error::encoding_error(&msg).reason),
                        ThreadsafeFunctionCallMode::NonBlocking,
                    );
                    let mut inner = handle.inner.lock().unwrap();
                    inner.state = CodecState::Closed;
                }
                Err(_) => {}
            }
        });

        Ok(())
    }

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
            backend.submit(Box::new(move |w: &mut AudioDecoderWorker| {
                let _ = btx.send(w.flush());
            }));
            if let Ok(Ok(frames)) = brx.await {
                let mut inner = handle.inner.lock().unwrap();
                for frame in frames {
                    let pts = frame.pts();
                    let audio_data = AudioData::from_internal(frame, pts);
                    output_callback.call(Ok(audio_data), ThreadsafeFunctionCallMode::NonBlocking);
                    inner.queue_size = inner.queue_size.saturating_sub(1);
                }
                inner.key_chunk_required = true;
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

        rx.await.unwrap_or_else(|_| Err(abort_error("decoder closed during flush")))
    }

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

    #[napi]
    pub async fn is_config_supported(config: AudioDecoderConfig) -> Result<AudioDecoderSupport> {
        let shape_ok = config.codec.as_deref().is_some_and(is_valid_codec_shape);
        if !shape_ok {
            return Ok(AudioDecoderSupport { supported: false, config });
        }

        let codec_id = match config.codec.as_deref().and_then(parse_codec_string) {
            Some(parsed) => parsed.codec_id,
            None => return Ok(AudioDecoderSupport { supported: false, config }),
        };

        let result = CodecContext::new_decoder(codec_id);
        Ok(AudioDecoderSupport { supported: result.is_ok(), config })
    }
}

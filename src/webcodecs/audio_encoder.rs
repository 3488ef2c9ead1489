//! AudioEncoder - WebCodecs API implementation
//!
//! Provides audio encoding functionality using FFmpeg.
//! See: https://developer.mozilla.org/en-US/docs/Web/API/AudioEncoder

use crate::codec::{
    AudioEncoderConfig as InternalAudioEncoderConfig, AudioSampleBuffer, CodecContext, Frame,
    Packet, Resampler,
};
use crate::core::{CodecBackend, ControlMessageQueue, DequeueCoalescer, Reclaimable, ResourceManager};
use crate::ffi::{AVCodecID, AVSampleFormat};
use crate::webcodecs::codec_string::{is_valid_codec_shape, parse_codec_string};
use crate::webcodecs::error::{abort_error, invalid_state_error, js_type_error, not_supported_error, quota_exceeded_error};
use crate::webcodecs::{AudioData, AudioEncoderConfig, AudioEncoderSupport, EncodedAudioChunk};
use napi::bindgen_prelude::*;
use napi::threadsafe_function::{ThreadsafeFunction, ThreadsafeFunctionCallMode};
use napi_derive::napi;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::oneshot;

use super::video_encoder::CodecState;

type OutputCallback = ThreadsafeFunction<(EncodedAudioChunk, EncodedAudioChunkMetadata)>;
type ErrorCallback = ThreadsafeFunction<String>;

/// Output callback metadata for audio
#[napi(object)]
pub struct EncodedAudioChunkMetadata {
    pub decoder_config: Option<AudioDecoderConfigOutput>,
}

/// Decoder configuration output (for passing to decoder)
#[napi(object)]
pub struct AudioDecoderConfigOutput {
    pub codec: String,
    pub sample_rate: Option<u32>,
    pub number_of_channels: Option<u32>,
    pub description: Option<Buffer>,
}

/// Encode options for audio (W3C spec currently defines none)
#[napi(object)]
#[derive(Debug, Clone, Default)]
pub struct AudioEncoderEncodeOptions {}

struct AudioEncoderInner {
    state: CodecState,
    config: Option<AudioEncoderConfig>,
    codec_string: String,
    target_sample_rate: u32,
    target_channels: u32,
    extradata_sent: bool,
    queue_size: u32,
    pending_flushes: Vec<Arc<Mutex<Option<oneshot::Sender<Result<()>>>>>>,
}

impl AudioEncoderInner {
    fn fresh() -> Self {
        Self {
            state: CodecState::Unconfigured,
            config: None,
            codec_string: String::new(),
            target_sample_rate: 0,
            target_channels: 0,
            extradata_sent: false,
            queue_size: 0,
            pending_flushes: Vec::new(),
        }
    }

    fn reset_state(&mut self) {
        self.state = CodecState::Unconfigured;
        self.queue_size = 0;
        for slot in self.pending_flushes.drain(..) {
            if let Some(tx) = slot.lock().unwrap().take() {
                let _ = tx.send(Err(abort_error("reset() called")));
            }
        }
    }
}

/// Runs exclusively on the dedicated backend thread; owns the FFmpeg context,
/// the resampler (created lazily once the first AudioData's format is known),
/// and the frame-size accumulation buffer.
struct AudioEncoderWorker {
    context: CodecContext,
    resampler: Option<Resampler>,
    sample_buffer: AudioSampleBuffer,
    target_format: AVSampleFormat,
    target_sample_rate: u32,
    target_channels: u32,
    frame_count: u64,
}

impl AudioEncoderWorker {
    fn encode(
        &mut self,
        frame: Frame,
        src_format: AVSampleFormat,
        src_sample_rate: u32,
        src_channels: u32,
        timestamp: i64,
    ) -> std::result::Result<Vec<Packet>, String> {
        let needs_resampling = src_sample_rate != self.target_sample_rate
            || src_channels != self.target_channels
            || src_format != self.target_format;

        if needs_resampling && self.resampler.is_none() {
            let resampler = Resampler::new(
                src_channels,
                src_sample_rate,
                src_format,
                self.target_channels,
                self.target_sample_rate,
                self.target_format,
            )
            .map_err(|e| format!("failed to create resampler: {e}"))?;
            self.resampler = Some(resampler);
        }

        let frame_to_add = if let Some(resampler) = self.resampler.as_mut() {
            resampler
                .convert_alloc(&frame)
                .map_err(|e| format!("resampling failed: {e}"))?
        } else {
            frame
        };

        self.sample_buffer
            .add_frame(&frame_to_add)
            .map_err(|e| format!("failed to buffer samples: {e}"))?;

        let mut packets = Vec::new();
        let frame_size = self.sample_buffer.frame_size() as i64;
        let sample_rate = self.sample_buffer.sample_rate() as i64;

        while self.sample_buffer.has_full_frame() {
            let mut frame_to_encode = self
                .sample_buffer
                .take_frame()
                .map_err(|e| format!("failed to take buffered frame: {e}"))?
                .ok_or_else(|| "sample buffer reported a full frame but had none".to_string())?;

            let frame_timestamp = if self.frame_count == 0 {
                timestamp
            } else {
                timestamp + (self.frame_count as i64 * frame_size * 1_000_000) / sample_rate
            };
            frame_to_encode.set_pts(frame_timestamp);

            let encoded = self
                .context
                .encode(Some(&frame_to_encode))
                .map_err(|e| format!("encode failed: {e}"))?;
            self.frame_count += 1;
            packets.extend(encoded);
        }

        Ok(packets)
    }

    fn flush(&mut self) -> std::result::Result<Vec<Packet>, String> {
        let frame_size = self.sample_buffer.frame_size() as i64;
        let sample_rate = self.sample_buffer.sample_rate() as i64;
        let mut packets = Vec::new();

        if let Ok(Some(mut frame)) = self.sample_buffer.flush() {
            let frame_timestamp = (self.frame_count as i64 * frame_size * 1_000_000) / sample_rate;
            frame.set_pts(frame_timestamp);
            if let Ok(encoded) = self.context.encode(Some(&frame)) {
                self.frame_count += 1;
                packets.extend(encoded);
            }
        }

        let trailing = self.context.flush_encoder().map_err(|e| format!("flush failed: {e}"))?;
        packets.extend(trailing);
        Ok(packets)
    }

    fn extradata(&self) -> Option<Vec<u8>> {
        self.context.extradata().map(|d| d.to_vec())
    }
}

/// Holds everything the process-wide [`ResourceManager`] needs to reclaim this
/// engine: its shared mutable state plus the error callback it must invoke first.
struct EncoderHandle {
    inner: Mutex<AudioEncoderInner>,
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

/// AudioEncoder - WebCodecs-compliant audio encoder.
///
/// Every call that touches codec state is serialized through a per-instance
/// [`ControlMessageQueue`]; the actual FFmpeg work runs on a dedicated
/// [`CodecBackend`] thread so `encode()`/`flush()` never block the caller.
#[napi]
pub struct AudioEncoder {
    handle: Arc<EncoderHandle>,
    control_queue: ControlMessageQueue,
    backend: Mutex<Option<Arc<CodecBackend<AudioEncoderWorker>>>>,
    dequeue: Arc<DequeueCoalescer>,
    output_callback: OutputCallback,
    resource_manager_id: Mutex<Option<u64>>,
}

#[napi]
impl AudioEncoder {
    #[napi(constructor)]
    pub fn new(output: OutputCallback, error: ErrorCallback) -> Result<Self> {
        let handle = Arc::new(EncoderHandle {
            inner: Mutex::new(AudioEncoderInner::fresh()),
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

    /// Configure the encoder. Synchronous validation per §4.8; codec-specific
    /// target sample format is chosen the way the original encoder did.
    #[napi]
    pub fn configure(&self, config: AudioEncoderConfig) -> Result<()> {
        {
            let inner = self.handle.inner.lock().unwrap();
            if inner.state == CodecState::Closed {
                return Err(invalid_state_error("encoder is closed"));
            }
        }

        let codec = config
            .codec
            .clone()
            .filter(|c| is_valid_codec_shape(c))
            .ok_or_else(|| js_type_error("codec is required"))?;
        let parsed = parse_codec_string(&codec).ok_or_else(|| js_type_error(&format!("unsupported codec: {codec}")))?;
        let codec_id = parsed.codec_id;

        let sample_rate = config.sample_rate.unwrap_or(48000.0) as u32;
        let channels = config.number_of_channels.unwrap_or(2);
        let bitrate = config.bitrate.unwrap_or(128_000.0) as u64;
        let target_format = get_encoder_sample_format(codec_id);

        let worker_result = (|| -> std::result::Result<AudioEncoderWorker, String> {
            let mut context =
                CodecContext::new_encoder(codec_id).map_err(|e| format!("failed to create encoder: {e}"))?;

            let encoder_config = InternalAudioEncoderConfig {
                sample_rate,
                channels,
                sample_format: target_format,
                bitrate,
                thread_count: 0,
            };
            context
                .configure_audio_encoder(&encoder_config)
                .map_err(|e| format!("failed to configure encoder: {e}"))?;
            context.open().map_err(|e| format!("failed to open encoder: {e}"))?;

            let frame_size = AudioSampleBuffer::frame_size_for_codec(&codec);
            let sample_buffer = AudioSampleBuffer::new(frame_size, channels, sample_rate, target_format);

            Ok(AudioEncoderWorker {
                context,
                resampler: None,
                sample_buffer,
                target_format,
                target_sample_rate: sample_rate,
                target_channels: channels,
                frame_count: 0,
            })
        })();

        match worker_result {
            Ok(worker) => {
                *self.backend.lock().unwrap() = Some(Arc::new(CodecBackend::spawn(worker)));
                let mut inner = self.handle.inner.lock().unwrap();
                inner.config = Some(config);
                inner.codec_string = codec;
                inner.target_sample_rate = sample_rate;
                inner.target_channels = channels;
                inner.extradata_sent = false;
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

    /// Encode audio data. Enqueued onto the control queue; the actual FFmpeg
    /// call (including any resampling and frame batching) runs on the backend
    /// thread.
    #[napi]
    pub fn encode(&self, data: &AudioData) -> Result<()> {
        {
            let inner = self.handle.inner.lock().unwrap();
            if inner.state != CodecState::Configured {
                return Err(invalid_state_error("encoder not configured"));
            }
        }
        if data.closed()? {
            return Err(js_type_error("audio data is closed"));
        }

        let src_format = data
            .format()?
            .ok_or_else(|| js_type_error("audio data has no format"))?
            .to_av_format();
        let src_sample_rate = data.sample_rate()? as u32;
        let src_channels = data.number_of_channels()?;
        let timestamp = data.timestamp()?;
        let internal_frame = data
            .with_frame(|f| f.try_clone())
            .map_err(|e| js_type_error(&format!("failed to access audio data: {e}")))?
            .map_err(|e| js_type_error(&format!("failed to clone frame: {e}")))?;

        {
            let mut inner = self.handle.inner.lock().unwrap();
            inner.queue_size += 1;
        }

        let backend = self
            .backend
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| invalid_state_error("encoder not configured"))?;
        let handle = Arc::clone(&self.handle);
        let output_callback = self.output_callback.clone();
        let dequeue = Arc::clone(&self.dequeue);

        self.control_queue.enqueue(async move {
            *handle.last_activity.lock().unwrap() = Instant::now();
            let (tx, rx) = oneshot::channel();
            backend.submit(Box::new(move |w: &mut AudioEncoderWorker| {
                let result = w.encode(internal_frame, src_format, src_sample_rate, src_channels, timestamp);
                let extradata = w.extradata();
                let _ = tx.send((result, extradata));
            }));
            let (result, extradata) = rx.await.unwrap_or((Ok(Vec::new()), None));

            match result {
                Ok(packets) => {
                    let mut inner = handle.inner.lock().unwrap();
                    let codec_string = inner.codec_string.clone();
                    let sample_rate = inner.target_sample_rate;
                    let channels = inner.target_channels;
                    for packet in packets {
                        let chunk = EncodedAudioChunk::from_packet(&packet, None, None);
                        let metadata = if !inner.extradata_sent {
                            inner.extradata_sent = true;
                            EncodedAudioChunkMetadata {
                                decoder_config: Some(AudioDecoderConfigOutput {
                                    codec: codec_string.clone(),
                                    sample_rate: Some(sample_rate),
                                    number_of_channels: Some(channels),
                                    description: extradata.clone().map(Buffer::from),
                                }),
                            }
                        } else {
                            EncodedAudioChunkMetadata { decoder_config: None }
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
                        Ok(crate::webcodecs::error::encoding_error(&msg).reason),
                        ThreadsafeFunctionCallMode::NonBlocking,
                    );
                    let mut inner = handle.inner.lock().unwrap();
                    inner.state = CodecState::Closed;
                }
            }
        });

        Ok(())
    }

    /// Flush pending output, including any partially-filled sample buffer.
    #[napi]
    pub async fn flush(&self) -> Result<()> {
        {
            let inner = self.handle.inner.lock().unwrap();
            if inner.state != CodecState::Configured {
                return Err(invalid_state_error("encoder not configured"));
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
            .ok_or_else(|| invalid_state_error("encoder not configured"))?;
        let handle = Arc::clone(&self.handle);
        let output_callback = self.output_callback.clone();
        let dequeue = Arc::clone(&self.dequeue);
        let flush_slot = Arc::clone(&slot);

        self.control_queue.enqueue(async move {
            let (btx, brx) = oneshot::channel();
            backend.submit(Box::new(move |w: &mut AudioEncoderWorker| {
                let _ = btx.send(w.flush());
            }));
            if let Ok(Ok(packets)) = brx.await {
                let mut inner = handle.inner.lock().unwrap();
                for packet in packets {
                    let chunk = EncodedAudioChunk::from_packet(&packet, None, None);
                    let metadata = EncodedAudioChunkMetadata { decoder_config: None };
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

        rx.await.unwrap_or_else(|_| Err(abort_error("encoder closed during flush")))
    }

    /// Reset the encoder. Throws InvalidStateError if already closed.
    #[napi]
    pub fn reset(&self) -> Result<()> {
        let mut inner = self.handle.inner.lock().unwrap();
        if inner.state == CodecState::Closed {
            return Err(invalid_state_error("encoder is closed"));
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

    /// Check if a configuration is supported.
    #[napi]
    pub async fn is_config_supported(config: AudioEncoderConfig) -> Result<AudioEncoderSupport> {
        let shape_ok = config.codec.as_deref().is_some_and(is_valid_codec_shape);
        if !shape_ok {
            return Ok(AudioEncoderSupport { supported: false, config });
        }

        let codec_id = match config.codec.as_deref().and_then(parse_codec_string) {
            Some(parsed) => parsed.codec_id,
            None => return Ok(AudioEncoderSupport { supported: false, config }),
        };

        let result = CodecContext::new_encoder(codec_id);

        Ok(AudioEncoderSupport { supported: result.is_ok(), config })
    }
}

/// Get the preferred sample format for an encoder.
fn get_encoder_sample_format(codec_id: AVCodecID) -> AVSampleFormat {
    match codec_id {
        AVCodecID::Aac => AVSampleFormat::Fltp,
        AVCodecID::Opus => AVSampleFormat::Flt,
        AVCodecID::Mp3 => AVSampleFormat::S16p,
        AVCodecID::Flac => AVSampleFormat::S16,
        AVCodecID::Vorbis => AVSampleFormat::Fltp,
        _ => AVSampleFormat::Fltp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoder_sample_format_matches_codec_preference() {
        assert_eq!(get_encoder_sample_format(AVCodecID::Opus), AVSampleFormat::Flt);
        assert_eq!(get_encoder_sample_format(AVCodecID::Flac), AVSampleFormat::S16);
    }
}

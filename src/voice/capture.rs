//! Audio capture from microphone

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};
use tokio::sync::OwnedMutexGuard;

use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Most audio kept while nobody is reading (30 seconds)
const MAX_BUFFERED_SAMPLES: usize = SAMPLE_RATE as usize * 30;

/// Shared handle to captured microphone audio
///
/// Every reader must [`acquire`](Self::acquire) the microphone first, so two
/// captures can never consume the same stream at once.
#[derive(Clone)]
pub struct Microphone {
    buffer: Arc<Mutex<Vec<f32>>>,
    owner: Arc<tokio::sync::Mutex<()>>,
}

impl Default for Microphone {
    fn default() -> Self {
        Self::new()
    }
}

impl Microphone {
    /// Create a microphone with an empty buffer
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Vec::new())),
            owner: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Wait for exclusive use of the microphone
    pub async fn acquire(&self) -> MicrophoneLease {
        let lease = Arc::clone(&self.owner).lock_owned().await;
        MicrophoneLease {
            buffer: Arc::clone(&self.buffer),
            _lease: lease,
        }
    }

    /// Take the microphone only if nobody else holds it
    #[must_use]
    pub fn try_acquire(&self) -> Option<MicrophoneLease> {
        let lease = Arc::clone(&self.owner).try_lock_owned().ok()?;
        Some(MicrophoneLease {
            buffer: Arc::clone(&self.buffer),
            _lease: lease,
        })
    }

    /// Append samples as delivered by the capture stream
    pub fn push(&self, samples: &[f32]) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.extend_from_slice(samples);
            if buf.len() > MAX_BUFFERED_SAMPLES {
                let excess = buf.len() - MAX_BUFFERED_SAMPLES;
                buf.drain(..excess);
            }
        }
    }

    /// Check if another task currently owns the microphone
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.owner.try_lock().is_err()
    }
}

/// Exclusive access to the microphone buffer, released on drop
pub struct MicrophoneLease {
    buffer: Arc<Mutex<Vec<f32>>>,
    _lease: OwnedMutexGuard<()>,
}

impl MicrophoneLease {
    /// Get captured audio and clear the buffer
    #[must_use]
    pub fn take(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    /// Remove exactly `len` samples from the front, if that many are buffered
    #[must_use]
    pub fn take_exact(&self, len: usize) -> Option<Vec<f32>> {
        let mut buf = self.buffer.lock().ok()?;
        if buf.len() < len {
            return None;
        }
        Some(buf.drain(..len).collect())
    }

    /// Number of samples waiting
    #[must_use]
    pub fn available(&self) -> usize {
        self.buffer.lock().map(|buf| buf.len()).unwrap_or_default()
    }

    /// Drop everything captured so far
    pub fn clear(&self) {
        if let Ok(mut buf) = self.buffer.lock() {
            buf.clear();
        }
    }
}

/// Captures audio from the default input device into a [`Microphone`]
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    microphone: Microphone,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the default input device
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if no device supports 16kHz mono capture
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::DeviceUnavailable("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| {
                Error::DeviceUnavailable("no 16kHz mono input config found".to_string())
            })?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            channels = config.channels,
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            microphone: Microphone::new(),
            stream: None,
        })
    }

    /// Start capturing audio
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be built or started
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let microphone = self.microphone.clone();

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    microphone.push(data);
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::DeviceUnavailable(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Stop capturing audio
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    /// Handle for reading captured audio
    #[must_use]
    pub fn microphone(&self) -> Microphone {
        self.microphone.clone()
    }
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            writer
                .write_sample(to_pcm16(sample))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

/// Convert an f32 sample in [-1.0, 1.0] to 16-bit PCM
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn to_pcm16(sample: f32) -> i16 {
    (sample * 32767.0).clamp(-32768.0, 32767.0) as i16
}

//! Wake word detection
//!
//! The engine pulls fixed-size PCM frames from a [`FrameSource`] and hands
//! each one to a [`WakeWordDetector`]. A detector reports the index of the
//! keyword it matched, if any.

use std::time::Duration;

use async_trait::async_trait;

use super::capture::{Microphone, to_pcm16};
use crate::{Error, Result};

/// Longest wait for a full frame before the read is reported as failed
const FRAME_TIMEOUT: Duration = Duration::from_secs(2);

/// How often to check the microphone for a complete frame
const FRAME_POLL: Duration = Duration::from_millis(10);

/// Classifies audio frames
pub trait WakeWordDetector {
    /// Number of 16-bit samples the detector expects per frame
    fn frame_length(&self) -> usize;

    /// Classify one frame, returning the index of the detected keyword
    ///
    /// # Errors
    ///
    /// Returns `WakeWord` if the frame cannot be processed
    fn process(&mut self, frame: &[i16]) -> Result<Option<usize>>;
}

impl<T: WakeWordDetector + ?Sized> WakeWordDetector for Box<T> {
    fn frame_length(&self) -> usize {
        (**self).frame_length()
    }

    fn process(&mut self, frame: &[i16]) -> Result<Option<usize>> {
        (**self).process(frame)
    }
}

/// Delivers audio frames to the engine
#[async_trait]
pub trait FrameSource: Send {
    /// Read the next frame of exactly `len` samples
    ///
    /// # Errors
    ///
    /// Returns an error if no full frame arrives in time
    async fn next_frame(&mut self, len: usize) -> Result<Vec<i16>>;

    /// Drop audio that built up while the engine was busy
    fn discard(&mut self) {}
}

/// Frames read from the shared microphone buffer
pub struct MicrophoneFrames {
    microphone: Microphone,
}

impl MicrophoneFrames {
    /// Read frames from `microphone`
    #[must_use]
    pub const fn new(microphone: Microphone) -> Self {
        Self { microphone }
    }
}

#[async_trait]
impl FrameSource for MicrophoneFrames {
    async fn next_frame(&mut self, len: usize) -> Result<Vec<i16>> {
        let lease = self.microphone.acquire().await;

        let read = async {
            loop {
                if let Some(samples) = lease.take_exact(len) {
                    return samples;
                }
                tokio::time::sleep(FRAME_POLL).await;
            }
        };

        let samples = tokio::time::timeout(FRAME_TIMEOUT, read)
            .await
            .map_err(|_| Error::Audio("timed out waiting for audio frame".to_string()))?;

        Ok(samples.into_iter().map(to_pcm16).collect())
    }

    fn discard(&mut self) {
        // Skipped when a capture is in progress; that capture clears the buffer itself
        if let Some(lease) = self.microphone.try_acquire() {
            lease.clear();
        }
    }
}

#[cfg(feature = "porcupine")]
pub use self::porcupine_detector::PorcupineDetector;

#[cfg(feature = "porcupine")]
mod porcupine_detector {
    use std::path::Path;

    use porcupine::{Porcupine, PorcupineBuilder};

    use super::WakeWordDetector;
    use crate::{Error, Result};

    /// Picovoice Porcupine keyword spotter
    pub struct PorcupineDetector {
        inner: Porcupine,
    }

    impl PorcupineDetector {
        /// Load a keyword model
        ///
        /// # Errors
        ///
        /// Returns `WakeWord` if the access key is rejected or the model cannot be loaded
        pub fn new(access_key: &str, keyword_path: &Path, sensitivity: f32) -> Result<Self> {
            let inner = PorcupineBuilder::new_with_keyword_paths(access_key, &[keyword_path])
                .sensitivities(&[sensitivity])
                .init()
                .map_err(|e| Error::WakeWord(e.to_string()))?;

            tracing::debug!(
                keyword = %keyword_path.display(),
                sensitivity,
                frame_length = inner.frame_length(),
                "porcupine initialized"
            );

            Ok(Self { inner })
        }
    }

    impl WakeWordDetector for PorcupineDetector {
        fn frame_length(&self) -> usize {
            self.inner.frame_length() as usize
        }

        fn process(&mut self, frame: &[i16]) -> Result<Option<usize>> {
            let index = self
                .inner
                .process(frame)
                .map_err(|e| Error::WakeWord(e.to_string()))?;

            Ok(usize::try_from(index).ok())
        }
    }
}

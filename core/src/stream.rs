use crate::decoder::{DecodedMessage, Decoder};
use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Capture side of the audio I/O boundary (48 kHz mono i16)
pub trait AudioSource {
    /// Next window of captured samples, or None once the source is exhausted
    fn capture_window(&mut self) -> Option<Vec<i16>>;
}

/// Playback side of the audio I/O boundary
pub trait AudioSink {
    fn playback(&mut self, pcm: &[i16]) -> Result<()>;
}

impl AudioSink for Vec<i16> {
    fn playback(&mut self, pcm: &[i16]) -> Result<()> {
        self.extend_from_slice(pcm);
        Ok(())
    }
}

/// Serves an in-memory capture as fixed-size windows
pub struct PcmChunks {
    samples: Vec<i16>,
    window: usize,
    pos: usize,
}

impl PcmChunks {
    pub fn new(samples: Vec<i16>, window: usize) -> Self {
        Self {
            samples,
            window: window.max(1),
            pos: 0,
        }
    }
}

impl AudioSource for PcmChunks {
    fn capture_window(&mut self) -> Option<Vec<i16>> {
        if self.pos >= self.samples.len() {
            return None;
        }
        let end = (self.pos + self.window).min(self.samples.len());
        let chunk = self.samples[self.pos..end].to_vec();
        self.pos = end;
        Some(chunk)
    }
}

/// Cloneable stop flag shared between a listener and whoever may cancel it
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Pull-based listening session
///
/// Each `next_message` call pulls windows from the source into the decoder
/// until a glyph is recovered, the token is cancelled, or the source runs
/// dry. Rejected frames are logged and skipped.
pub struct Listener<S: AudioSource> {
    decoder: Decoder,
    source: S,
    cancel: CancellationToken,
    /// Messages resolved by the last window but not yet handed out
    ready: std::collections::VecDeque<DecodedMessage>,
    exhausted: bool,
}

impl<S: AudioSource> Listener<S> {
    pub fn new(decoder: Decoder, source: S, cancel: CancellationToken) -> Self {
        Self {
            decoder,
            source,
            cancel,
            ready: std::collections::VecDeque::new(),
            exhausted: false,
        }
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    /// Stop listening and hand the decoder back for a fresh session
    pub fn into_decoder(mut self) -> Decoder {
        self.decoder.reset();
        self.decoder
    }

    /// Next decoded glyph, or None when cancelled or out of audio
    pub fn next_message(&mut self) -> Option<DecodedMessage> {
        loop {
            if self.cancel.is_cancelled() {
                if self.decoder.is_synced() || self.decoder.buffered_samples() > 0 {
                    log::debug!("listener cancelled, discarding decoder state");
                }
                self.decoder.reset();
                self.ready.clear();
                return None;
            }

            if let Some(message) = self.ready.pop_front() {
                return Some(message);
            }

            if self.exhausted {
                return None;
            }

            match self.source.capture_window() {
                Some(window) => {
                    let attempts = self.decoder.feed(&window);
                    self.collect(attempts);
                }
                None => {
                    self.exhausted = true;
                    if let Some(tail) = self.decoder.finish() {
                        self.collect(vec![tail]);
                    }
                }
            }
        }
    }

    fn collect(&mut self, attempts: Vec<crate::decoder::FrameAttempt>) {
        for attempt in attempts {
            match attempt {
                Ok(message) => self.ready.push_back(message),
                Err(e) => log::debug!("no message: {}", e),
            }
        }
    }
}

impl<S: AudioSource> Iterator for Listener<S> {
    type Item = DecodedMessage;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_message()
    }
}

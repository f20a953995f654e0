use crate::encoder::i16_to_f32;
use crate::error::{AudioLinkError, Result};
use crate::framing::{bits_to_bytes, encoded_len, parse_frame, FrameDecoder};
use crate::protocol::ProtocolVariant;
use crate::resonance::{payload_slots, resonance};
use crate::tone::{slot_to_bits, taper_length, SlotEnergies, ToneAnalyzer, ToneModulator};
use crate::{
    FRAME_HEADER_SIZE, PREAMBLE_SCORE_THRESHOLD, PREAMBLE_SLOTS, PREAMBLE_SLOT_MIN_SCORE,
    SAMPLE_RATE, SCAN_STEPS_PER_SLOT,
};

/// Windows quieter than this cannot hold a preamble and are skipped cheaply.
const SILENCE_RMS: f32 = 1e-4;

/// A glyph recovered from a frame whose checksum passed
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    pub text: String,
    /// Confidence in [0, 1]; ~1.0 for a clean capture
    pub resonance: f32,
    pub protocol: ProtocolVariant,
    /// Absolute sample index (since the last reset) where the preamble starts
    pub start_sample: u64,
}

/// Result of one resolved frame attempt. Every error is recoverable.
pub type FrameAttempt = std::result::Result<DecodedMessage, AudioLinkError>;

/// Running counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderStats {
    pub frames_decoded: u64,
    pub sync_rejections: u64,
    pub header_failures: u64,
    pub checksum_failures: u64,
    pub invalid_text: u64,
    pub truncated: u64,
}

impl DecoderStats {
    fn record(&mut self, attempt: &FrameAttempt) {
        match attempt {
            Ok(_) => self.frames_decoded += 1,
            Err(AudioLinkError::PreambleNotFound) => self.sync_rejections += 1,
            Err(AudioLinkError::HeaderCrcMismatch) | Err(AudioLinkError::InvalidFrameSize) => {
                self.header_failures += 1
            }
            Err(AudioLinkError::ChecksumMismatch) => self.checksum_failures += 1,
            Err(AudioLinkError::InvalidText) => self.invalid_text += 1,
            Err(AudioLinkError::Truncated) => self.truncated += 1,
            Err(_) => {}
        }
    }
}

/// Frame being reassembled after a preamble was accepted
struct FrameProgress {
    /// Buffer index of the first marker slot
    sync_at: usize,
    slots: Vec<SlotEnergies>,
    bits: Vec<bool>,
    /// Total data slots once the header has been read
    frame_slots: Option<usize>,
}

enum SyncState {
    Scanning,
    Synced(FrameProgress),
}

enum Progress {
    NeedMore,
    Resolved(FrameAttempt),
}

/// Streaming decoder for one listening session
///
/// Audio is pushed with `feed` in windows of any size. The decoder scans for
/// the marker preamble, commits to the earliest verified sync, demaps slots
/// as they arrive and resolves each frame attempt to a message or a
/// recoverable error. Sync state lives in the instance, so independent
/// sessions never interfere.
pub struct Decoder {
    variant: ProtocolVariant,
    analyzer: ToneAnalyzer,
    /// Clean preamble used to pin the sync point to a single sample
    reference: Vec<f32>,
    buffer: Vec<f32>,
    /// Absolute sample index of `buffer[0]`
    origin: u64,
    /// Next candidate preamble offset in `buffer`
    scan_pos: usize,
    state: SyncState,
    stats: DecoderStats,
}

impl Decoder {
    pub fn new(variant: ProtocolVariant) -> Self {
        let modulator = ToneModulator::new(variant.spec());
        let reference = (0..PREAMBLE_SLOTS)
            .flat_map(|index| modulator.modulate_marker(index))
            .collect();

        Self {
            variant,
            analyzer: ToneAnalyzer::new(variant.spec()),
            reference,
            buffer: Vec::new(),
            origin: 0,
            scan_pos: 0,
            state: SyncState::Scanning,
            stats: DecoderStats::default(),
        }
    }

    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    /// True while a frame attempt is in progress
    pub fn is_synced(&self) -> bool {
        matches!(self.state, SyncState::Synced(_))
    }

    /// Samples currently buffered
    pub fn buffered_samples(&self) -> usize {
        self.buffer.len()
    }

    /// Discard buffered audio and sync state; counters are kept
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.origin = 0;
        self.scan_pos = 0;
        self.state = SyncState::Scanning;
    }

    /// Push the next window of captured audio and return every frame attempt
    /// it resolved, in arrival order
    pub fn feed(&mut self, window: &[i16]) -> Vec<FrameAttempt> {
        self.buffer.extend(window.iter().map(|&s| i16_to_f32(s)));

        let mut attempts = Vec::new();
        loop {
            match std::mem::replace(&mut self.state, SyncState::Scanning) {
                SyncState::Scanning => match self.scan() {
                    Some(sync_at) => {
                        self.state = SyncState::Synced(FrameProgress {
                            sync_at,
                            slots: Vec::new(),
                            bits: Vec::new(),
                            frame_slots: None,
                        });
                    }
                    None => break,
                },
                SyncState::Synced(mut progress) => match self.advance_frame(&mut progress) {
                    Progress::NeedMore => {
                        self.state = SyncState::Synced(progress);
                        break;
                    }
                    Progress::Resolved(attempt) => {
                        self.resolve(&progress, &attempt);
                        attempts.push(attempt);
                    }
                },
            }
        }

        self.compact();
        attempts
    }

    /// End of stream. A frame still in progress is reported as `Truncated`;
    /// all buffered state is discarded either way.
    ///
    /// The final slot may be short by less than its edge taper; it is
    /// zero-padded and demapped.
    pub fn finish(&mut self) -> Option<FrameAttempt> {
        let attempt = match std::mem::replace(&mut self.state, SyncState::Scanning) {
            SyncState::Scanning => None,
            SyncState::Synced(mut progress) => {
                let pad = taper_length(self.analyzer.spec().slot_samples);
                self.buffer.extend(std::iter::repeat(0.0).take(pad));
                match self.advance_frame(&mut progress) {
                    Progress::Resolved(attempt) => {
                        self.resolve(&progress, &attempt);
                        Some(attempt)
                    }
                    Progress::NeedMore => {
                        log::debug!("stream ended mid-frame, discarding sync state");
                        let attempt = Err(AudioLinkError::Truncated);
                        self.stats.record(&attempt);
                        Some(attempt)
                    }
                }
            }
        };
        self.reset();
        attempt
    }

    /// Decode a complete capture in one call
    ///
    /// Returns the first message found, otherwise the last rejection (or
    /// `PreambleNotFound` when no preamble was seen at all). The decoder is
    /// left reset.
    pub fn decode(&mut self, pcm: &[i16]) -> Result<DecodedMessage> {
        self.reset();
        let mut attempts = self.feed(pcm);
        if let Some(tail) = self.finish() {
            attempts.push(tail);
        }
        self.reset();

        let mut last_error = None;
        for attempt in attempts {
            match attempt {
                Ok(message) => return Ok(message),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or(AudioLinkError::PreambleNotFound))
    }

    /// Decode little-endian PCM bytes in one call
    pub fn decode_pcm(&mut self, bytes: &[u8]) -> Result<DecodedMessage> {
        let waveform = crate::encoder::Waveform::from_le_bytes(bytes)?;
        self.decode(waveform.samples())
    }

    /// Look for the next preamble from `scan_pos`; returns the refined sync offset
    fn scan(&mut self) -> Option<usize> {
        let spec = self.analyzer.spec();
        let slot = spec.slot_samples;
        let hop = slot / SCAN_STEPS_PER_SLOT;
        let preamble = spec.preamble_samples();

        // Keep one slot of look-ahead so the peak search has room
        while self.scan_pos + preamble + slot <= self.buffer.len() {
            let pos = self.scan_pos;
            if let Some(score) = self.gated_score(pos) {
                if score >= PREAMBLE_SCORE_THRESHOLD {
                    let sync_at = self.refine(pos);
                    log::debug!(
                        "preamble at sample {} (coarse score {:.3}, {})",
                        self.origin + sync_at as u64,
                        score,
                        self.variant
                    );
                    return Some(sync_at);
                }
            }
            self.scan_pos += hop;
        }
        None
    }

    /// Mean marker score at `pos`, or None as soon as one marker slot is too weak
    fn gated_score(&self, pos: usize) -> Option<f32> {
        let slot = self.analyzer.spec().slot_samples;
        let first = &self.buffer[pos..pos + slot];
        let rms = (first.iter().map(|&s| s * s).sum::<f32>() / slot as f32).sqrt();
        if rms < SILENCE_RMS {
            return None;
        }

        let mut total = 0.0;
        for index in 0..PREAMBLE_SLOTS {
            let start = pos + index * slot;
            let score = self
                .analyzer
                .marker_score(&self.buffer[start..start + slot], index)
                .ok()?;
            if score < PREAMBLE_SLOT_MIN_SCORE {
                return None;
            }
            total += score;
        }
        Some(total / PREAMBLE_SLOTS as f32)
    }

    fn full_score(&self, pos: usize) -> f32 {
        let slot = self.analyzer.spec().slot_samples;
        (0..PREAMBLE_SLOTS)
            .map(|index| {
                let start = pos + index * slot;
                self.analyzer
                    .marker_score(&self.buffer[start..start + slot], index)
                    .unwrap_or(0.0)
            })
            .sum::<f32>()
            / PREAMBLE_SLOTS as f32
    }

    /// Find the score peak within one slot after a passing candidate, narrow
    /// it down by halving the step, then pin it with `align`
    fn refine(&self, pos: usize) -> usize {
        let spec = self.analyzer.spec();
        let hop = spec.slot_samples / SCAN_STEPS_PER_SLOT;
        let preamble = spec.preamble_samples();
        let fits = |candidate: usize| candidate + preamble <= self.buffer.len();

        let mut best = pos;
        let mut best_score = self.full_score(pos);
        for step in 1..=SCAN_STEPS_PER_SLOT {
            let candidate = pos + step * hop;
            if !fits(candidate) {
                break;
            }
            let score = self.full_score(candidate);
            if score > best_score {
                best = candidate;
                best_score = score;
            }
        }

        let mut step = hop / 2;
        while step >= 1 {
            let center = best;
            let below = center.checked_sub(step);
            for candidate in below.into_iter().chain(std::iter::once(center + step)) {
                if !fits(candidate) {
                    continue;
                }
                let score = self.full_score(candidate);
                if score > best_score {
                    best = candidate;
                    best_score = score;
                }
            }
            step /= 2;
        }

        self.align(best)
    }

    /// Sample-exact sync around `estimate`
    ///
    /// The marker score is flat while the analysis window only clips the
    /// slot tapers, so the estimate can be off by up to a taper length.
    /// Cross-correlation with the clean preamble peaks at the true start.
    /// Every tone is a harmonic of the grid spacing, so the correlation
    /// repeats every `SAMPLE_RATE / spacing_hz` samples; the search stays
    /// inside half of that period.
    fn align(&self, estimate: usize) -> usize {
        let spec = self.analyzer.spec();
        let taper = taper_length(spec.slot_samples);
        let period = (SAMPLE_RATE as f32 / spec.spacing_hz).round() as usize;
        let span = (taper + taper / 2).min(period / 2 - 1);

        let first = estimate.saturating_sub(span);
        let last = (estimate + span).min(self.buffer.len().saturating_sub(self.reference.len()));

        let mut best = estimate;
        let mut best_corr = f32::MIN;
        for candidate in first..=last {
            let window = &self.buffer[candidate..candidate + self.reference.len()];
            let corr: f32 = window
                .iter()
                .zip(self.reference.iter())
                .map(|(&x, &r)| x * r)
                .sum();
            if corr > best_corr {
                best = candidate;
                best_corr = corr;
            }
        }

        log::trace!("sync aligned {} -> {}", estimate, best);
        best
    }

    /// Demap every complete slot available for the current frame
    fn advance_frame(&self, progress: &mut FrameProgress) -> Progress {
        let spec = self.analyzer.spec();
        let slot = spec.slot_samples;
        let data_start = progress.sync_at + spec.preamble_samples();

        loop {
            let next = progress.slots.len();
            if progress.frame_slots == Some(next) {
                return Progress::Resolved(self.finish_frame(progress));
            }

            let start = data_start + next * slot;
            if start + slot > self.buffer.len() {
                return Progress::NeedMore;
            }

            let energies = match self.analyzer.slot_energies(&self.buffer[start..start + slot]) {
                Ok(energies) => energies,
                Err(e) => return Progress::Resolved(Err(e)),
            };
            let symbols = energies.symbols();
            log::trace!("slot {} symbols {:?}", next, symbols);
            slot_to_bits(&symbols, spec, &mut progress.bits);
            progress.slots.push(energies);

            let header_bits = FRAME_HEADER_SIZE * 8;
            if progress.frame_slots.is_none() && progress.bits.len() >= header_bits {
                let header = bits_to_bytes(&progress.bits[..header_bits]);
                match FrameDecoder::decode_header(&header, spec.capacity) {
                    Ok(payload_len) => {
                        progress.frame_slots =
                            Some(spec.slots_for_bits(encoded_len(payload_len) * 8));
                    }
                    Err(e) => return Progress::Resolved(Err(e)),
                }
            }
        }
    }

    fn finish_frame(&self, progress: &FrameProgress) -> FrameAttempt {
        let spec = self.analyzer.spec();
        let frame = parse_frame(&progress.bits, spec.capacity)?;
        let scored = payload_slots(spec, frame.payload.len());
        let text = String::from_utf8(frame.payload).map_err(|_| AudioLinkError::InvalidText)?;

        Ok(DecodedMessage {
            text,
            resonance: resonance(&progress.slots[scored]),
            protocol: self.variant,
            start_sample: self.origin + progress.sync_at as u64,
        })
    }

    /// Bookkeeping after a frame attempt resolves
    fn resolve(&mut self, progress: &FrameProgress, attempt: &FrameAttempt) {
        let spec = self.analyzer.spec();
        let data_start = progress.sync_at + spec.preamble_samples();
        self.stats.record(attempt);

        match attempt {
            Ok(message) => {
                log::debug!(
                    "decoded {} bytes, resonance {:.3}",
                    message.text.len(),
                    message.resonance
                );
                // Resume after the frame
                self.scan_pos = data_start + progress.slots.len() * spec.slot_samples;
            }
            Err(e) => {
                log::debug!(
                    "frame at sample {} rejected: {}",
                    self.origin + progress.sync_at as u64,
                    e
                );
                // Resume right after the failed preamble
                self.scan_pos = data_start;
            }
        }
    }

    /// Drop audio the scanner can no longer reach
    fn compact(&mut self) {
        if self.is_synced() {
            return;
        }
        let hop = self.analyzer.spec().slot_samples / SCAN_STEPS_PER_SLOT;
        let keep_from = self.scan_pos.saturating_sub(hop).min(self.buffer.len());
        if keep_from > 0 {
            self.buffer.drain(..keep_from);
            self.origin += keep_from as u64;
            self.scan_pos -= keep_from;
        }
    }
}

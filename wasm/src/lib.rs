use glyphwave_core::{
    AudioLinkError, Decision, Decoder, Encoder, ProtocolVariant, QuorumPolicy, VoteOutcome,
    VoteSession, Waveform, SAMPLE_RATE,
};
use wasm_bindgen::prelude::*;
use web_sys::AudioContext;

fn to_js(e: AudioLinkError) -> JsValue {
    js_sys::Error::new(&e.to_string()).into()
}

fn parse_protocol(name: &str) -> Result<ProtocolVariant, JsValue> {
    name.parse().map_err(to_js)
}

#[wasm_bindgen]
pub struct WasmEncoder {
    inner: Encoder,
}

#[wasm_bindgen]
impl WasmEncoder {
    #[wasm_bindgen(constructor)]
    pub fn new(protocol: &str) -> Result<WasmEncoder, JsValue> {
        Ok(WasmEncoder {
            inner: Encoder::new(parse_protocol(protocol)?),
        })
    }

    /// Encode text into 16-bit PCM samples (Int16Array)
    #[wasm_bindgen]
    pub fn encode(&self, text: &str) -> Result<Vec<i16>, JsValue> {
        self.inner
            .encode(text)
            .map(Waveform::into_samples)
            .map_err(to_js)
    }

    /// Encode text into float samples in [-1, 1] for Web Audio (Float32Array)
    #[wasm_bindgen(js_name = encodeFloat)]
    pub fn encode_float(&self, text: &str) -> Result<Vec<f32>, JsValue> {
        self.inner
            .encode(text)
            .map(|waveform| waveform.to_f32())
            .map_err(to_js)
    }

    #[wasm_bindgen(getter)]
    pub fn capacity(&self) -> usize {
        self.inner.variant().capacity()
    }
}

/// One glyph recovered from captured audio
#[wasm_bindgen]
pub struct WasmGlyph {
    text: String,
    resonance: f32,
    start_sample: f64,
}

#[wasm_bindgen]
impl WasmGlyph {
    #[wasm_bindgen(getter)]
    pub fn text(&self) -> String {
        self.text.clone()
    }

    #[wasm_bindgen(getter)]
    pub fn resonance(&self) -> f32 {
        self.resonance
    }

    #[wasm_bindgen(getter, js_name = startSample)]
    pub fn start_sample(&self) -> f64 {
        self.start_sample
    }
}

impl From<glyphwave_core::DecodedMessage> for WasmGlyph {
    fn from(message: glyphwave_core::DecodedMessage) -> Self {
        Self {
            text: message.text,
            resonance: message.resonance,
            start_sample: message.start_sample as f64,
        }
    }
}

/// Streaming decoder for microphone windows
#[wasm_bindgen]
pub struct WasmDecoder {
    inner: Decoder,
}

#[wasm_bindgen]
impl WasmDecoder {
    #[wasm_bindgen(constructor)]
    pub fn new(protocol: &str) -> Result<WasmDecoder, JsValue> {
        Ok(WasmDecoder {
            inner: Decoder::new(parse_protocol(protocol)?),
        })
    }

    /// Push a window of 16-bit samples; returns the glyphs it completed
    #[wasm_bindgen]
    pub fn feed(&mut self, samples: &[i16]) -> js_sys::Array {
        let glyphs = js_sys::Array::new();
        for attempt in self.inner.feed(samples) {
            if let Ok(message) = attempt {
                glyphs.push(&JsValue::from(WasmGlyph::from(message)));
            }
        }
        glyphs
    }

    /// Push a window of Web Audio float samples
    #[wasm_bindgen(js_name = feedFloat)]
    pub fn feed_float(&mut self, samples: &[f32]) -> js_sys::Array {
        let pcm = Waveform::from_f32(samples);
        self.feed(pcm.samples())
    }

    /// Decode a complete capture
    #[wasm_bindgen]
    pub fn decode(&mut self, samples: &[i16]) -> Result<WasmGlyph, JsValue> {
        self.inner.decode(samples).map(WasmGlyph::from).map_err(to_js)
    }

    /// Drop sync state, e.g. after the user stops listening
    #[wasm_bindgen]
    pub fn reset(&mut self) {
        self.inner.reset();
    }
}

#[wasm_bindgen]
pub struct WasmVoteSession {
    inner: VoteSession,
}

#[wasm_bindgen]
impl WasmVoteSession {
    #[wasm_bindgen(constructor)]
    pub fn new(
        expected_ballots: usize,
        quorum_threshold: f32,
        majority_fraction: f32,
    ) -> Result<WasmVoteSession, JsValue> {
        let policy =
            QuorumPolicy::new(expected_ballots, quorum_threshold, majority_fraction).map_err(to_js)?;
        Ok(WasmVoteSession {
            inner: VoteSession::open(policy).map_err(to_js)?,
        })
    }

    /// Returns true when this ballot completed the vote
    #[wasm_bindgen(js_name = submitBallot)]
    pub fn submit_ballot(&mut self, text: &str, resonance: f32) -> Result<bool, JsValue> {
        self.inner
            .submit_ballot(text, resonance)
            .map(|outcome| outcome.is_some())
            .map_err(to_js)
    }

    #[wasm_bindgen]
    pub fn close(&mut self) -> WasmOutcome {
        self.inner.close().into()
    }

    #[wasm_bindgen]
    pub fn abandon(&mut self) -> Result<(), JsValue> {
        self.inner.abandon().map_err(to_js)
    }

    #[wasm_bindgen(getter)]
    pub fn ballots(&self) -> usize {
        self.inner.ballots().len()
    }

    #[wasm_bindgen(getter)]
    pub fn outcome(&self) -> Option<WasmOutcome> {
        self.inner.outcome().map(WasmOutcome::from)
    }
}

#[wasm_bindgen]
pub struct WasmOutcome {
    decision: Decision,
    ballots_counted: usize,
    aggregate_resonance: f64,
    agreement_ratio: f64,
    plurality_text: Option<String>,
}

#[wasm_bindgen]
impl WasmOutcome {
    /// "pass", "fail" or "abandoned"
    #[wasm_bindgen(getter)]
    pub fn decision(&self) -> String {
        match self.decision {
            Decision::Pass => "pass",
            Decision::Fail => "fail",
            Decision::Abandoned => "abandoned",
        }
        .to_string()
    }

    #[wasm_bindgen(getter, js_name = ballotsCounted)]
    pub fn ballots_counted(&self) -> usize {
        self.ballots_counted
    }

    #[wasm_bindgen(getter, js_name = aggregateResonance)]
    pub fn aggregate_resonance(&self) -> f64 {
        self.aggregate_resonance
    }

    #[wasm_bindgen(getter, js_name = agreementRatio)]
    pub fn agreement_ratio(&self) -> f64 {
        self.agreement_ratio
    }

    #[wasm_bindgen(getter, js_name = pluralityText)]
    pub fn plurality_text(&self) -> Option<String> {
        self.plurality_text.clone()
    }
}

impl From<VoteOutcome> for WasmOutcome {
    fn from(outcome: VoteOutcome) -> Self {
        Self {
            decision: outcome.decision,
            ballots_counted: outcome.ballots_counted,
            aggregate_resonance: outcome.aggregate_resonance,
            agreement_ratio: outcome.agreement_ratio,
            plurality_text: outcome.plurality_text,
        }
    }
}

/// Play 16-bit samples through the default output; returns the context so
/// the caller can close it when playback ends
#[wasm_bindgen]
pub fn play(samples: &[i16], volume: f32) -> Result<AudioContext, JsValue> {
    let context = AudioContext::new()?;
    let mut floats = Waveform::new(samples.to_vec()).to_f32();

    let buffer = context.create_buffer(1, floats.len().max(1) as u32, SAMPLE_RATE as f32)?;
    buffer.copy_to_channel(&mut floats, 0)?;

    let source = context.create_buffer_source()?;
    source.set_buffer(Some(&buffer));

    let gain = context.create_gain()?;
    gain.gain().set_value(volume.clamp(0.0, 1.0));

    source.connect_with_audio_node(&gain)?;
    gain.connect_with_audio_node(&context.destination())?;
    source.start()?;

    Ok(context)
}

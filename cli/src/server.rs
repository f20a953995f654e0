//! HTTP surface over the codec and the council registry
//!
//! PCM travels as base64 of little-endian 16-bit mono samples at 48 kHz.

use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use glyphwave_core::{
    AudioLinkError, Council, Decision, Decoder, Encoder, ProtocolVariant, SessionHandle,
    SessionState, VoteOutcome, VoteSession,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    council: Arc<Council>,
}

pub fn router(council: Arc<Council>) -> Router {
    Router::new()
        .route("/protocols", get(list_protocols))
        .route("/encode", post(encode))
        .route("/decode", post(decode))
        .route("/sessions", post(open_session))
        .route("/sessions/{id}", get(session_status).delete(remove_session))
        .route("/sessions/{id}/ballots", post(submit_ballot))
        .route("/sessions/{id}/finalize", post(finalize_session))
        .with_state(AppState { council })
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn serve(bind: SocketAddr) -> std::io::Result<()> {
    let app = router(Arc::new(Council::new()));
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("glyphwave listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await
}

#[derive(Debug)]
pub enum ApiError {
    Link(AudioLinkError),
    BadRequest(String),
    Internal(String),
}

impl From<AudioLinkError> for ApiError {
    fn from(e: AudioLinkError) -> Self {
        ApiError::Link(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Link(e) => match e {
                AudioLinkError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                AudioLinkError::UnknownSession => StatusCode::NOT_FOUND,
                AudioLinkError::SessionClosed => StatusCode::CONFLICT,
                e if e.is_no_message() => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::BAD_REQUEST,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Link(e) => e.to_string(),
            ApiError::BadRequest(msg) | ApiError::Internal(msg) => msg.clone(),
        };
        if status.is_server_error() {
            tracing::error!("{}", message);
        } else {
            tracing::debug!("request rejected ({}): {}", status, message);
        }
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
struct ProtocolInfo {
    name: &'static str,
    start_hz: f32,
    max_hz: f32,
    slot_ms: f32,
    alphabet: usize,
    bands: usize,
    capacity: usize,
    ultrasonic: bool,
}

async fn list_protocols() -> Json<Vec<ProtocolInfo>> {
    Json(
        ProtocolVariant::ALL
            .iter()
            .map(|variant| {
                let spec = variant.spec();
                ProtocolInfo {
                    name: variant.name(),
                    start_hz: spec.start_hz,
                    max_hz: spec.max_freq(),
                    slot_ms: spec.slot_duration_ms(),
                    alphabet: spec.alphabet,
                    bands: spec.bands,
                    capacity: spec.capacity,
                    ultrasonic: spec.ultrasonic,
                }
            })
            .collect(),
    )
}

#[derive(Deserialize)]
struct EncodeRequest {
    #[serde(default)]
    protocol: Option<String>,
    text: String,
}

#[derive(Serialize)]
struct EncodeResponse {
    protocol: &'static str,
    pcm_base64: String,
    samples: usize,
    duration_ms: f32,
}

fn parse_protocol(name: Option<&str>) -> ApiResult<ProtocolVariant> {
    match name {
        Some(name) => Ok(name.parse()?),
        None => Ok(ProtocolVariant::default()),
    }
}

async fn encode(Json(request): Json<EncodeRequest>) -> ApiResult<Json<EncodeResponse>> {
    let variant = parse_protocol(request.protocol.as_deref())?;
    let waveform = tokio::task::spawn_blocking(move || Encoder::new(variant).encode(&request.text))
        .await
        .map_err(|e| ApiError::Internal(format!("encoder task failed: {}", e)))??;

    tracing::debug!("encoded {} samples with {}", waveform.len(), variant);
    Ok(Json(EncodeResponse {
        protocol: variant.name(),
        pcm_base64: STANDARD.encode(waveform.to_le_bytes()),
        samples: waveform.len(),
        duration_ms: waveform.duration_ms(),
    }))
}

#[derive(Deserialize)]
struct DecodeRequest {
    #[serde(default)]
    protocol: Option<String>,
    pcm_base64: String,
}

#[derive(Serialize)]
struct DecodeResponse {
    text: String,
    resonance: f32,
    start_sample: u64,
}

async fn decode(Json(request): Json<DecodeRequest>) -> ApiResult<Json<DecodeResponse>> {
    let variant = parse_protocol(request.protocol.as_deref())?;
    let pcm = STANDARD
        .decode(request.pcm_base64.as_bytes())
        .map_err(|e| ApiError::BadRequest(format!("invalid base64: {}", e)))?;

    let message = tokio::task::spawn_blocking(move || Decoder::new(variant).decode_pcm(&pcm))
        .await
        .map_err(|e| ApiError::Internal(format!("decoder task failed: {}", e)))??;

    Ok(Json(DecodeResponse {
        text: message.text,
        resonance: message.resonance,
        start_sample: message.start_sample,
    }))
}

#[derive(Deserialize)]
struct OpenSessionRequest {
    expected_ballots: usize,
    quorum_threshold: f32,
    majority_fraction: f32,
}

#[derive(Serialize)]
struct OpenSessionResponse {
    session_id: String,
}

async fn open_session(
    State(state): State<AppState>,
    Json(request): Json<OpenSessionRequest>,
) -> ApiResult<(StatusCode, Json<OpenSessionResponse>)> {
    let handle = state.council.open_session(
        request.expected_ballots,
        request.quorum_threshold,
        request.majority_fraction,
    )?;
    Ok((
        StatusCode::CREATED,
        Json(OpenSessionResponse {
            session_id: handle.to_string(),
        }),
    ))
}

#[derive(Serialize)]
struct OutcomeBody {
    decision: &'static str,
    ballots_counted: usize,
    aggregate_resonance: f64,
    agreement_ratio: f64,
    plurality_text: Option<String>,
}

impl From<VoteOutcome> for OutcomeBody {
    fn from(outcome: VoteOutcome) -> Self {
        Self {
            decision: match outcome.decision {
                Decision::Pass => "pass",
                Decision::Fail => "fail",
                Decision::Abandoned => "abandoned",
            },
            ballots_counted: outcome.ballots_counted,
            aggregate_resonance: outcome.aggregate_resonance,
            agreement_ratio: outcome.agreement_ratio,
            plurality_text: outcome.plurality_text,
        }
    }
}

#[derive(Serialize)]
struct SessionStatus {
    session_id: String,
    state: &'static str,
    ballots: usize,
    expected_ballots: usize,
    outcome: Option<OutcomeBody>,
}

impl SessionStatus {
    fn new(handle: &SessionHandle, session: &VoteSession) -> Self {
        Self {
            session_id: handle.to_string(),
            state: match session.state() {
                SessionState::Open => "open",
                SessionState::Collecting => "collecting",
                SessionState::Finalized(_) => "finalized",
                SessionState::Abandoned => "abandoned",
            },
            ballots: session.ballots().len(),
            expected_ballots: session.policy().expected_ballots,
            outcome: session.outcome().map(OutcomeBody::from),
        }
    }
}

fn parse_handle(id: &str) -> ApiResult<SessionHandle> {
    Ok(id.parse()?)
}

async fn session_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionStatus>> {
    let handle = parse_handle(&id)?;
    let session = state.council.status(&handle)?;
    Ok(Json(SessionStatus::new(&handle, &session)))
}

#[derive(Deserialize)]
struct BallotRequest {
    text: String,
    resonance: f32,
}

async fn submit_ballot(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<BallotRequest>,
) -> ApiResult<Json<SessionStatus>> {
    let handle = parse_handle(&id)?;
    state
        .council
        .submit_ballot(&handle, &request.text, request.resonance)?;
    let session = state.council.status(&handle)?;
    Ok(Json(SessionStatus::new(&handle, &session)))
}

async fn finalize_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<OutcomeBody>> {
    let handle = parse_handle(&id)?;
    Ok(Json(state.council.finalize(&handle)?.into()))
}

/// Abandons the session if it is still collecting and frees its entry;
/// the final state is returned once and the handle is unknown afterwards.
async fn remove_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionStatus>> {
    let handle = parse_handle(&id)?;
    let session = state.council.remove(&handle)?;
    Ok(Json(SessionStatus::new(&handle, &session)))
}

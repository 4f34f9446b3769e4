use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Deserialize;
use tokio::sync::Semaphore;
use uuid::Uuid;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::audio::connect_waves;
use crate::error::{EngineError, Result};
use crate::frontend::parse_kana;
use crate::manifest::EngineManifest;
use crate::model::{AccentPhrase, AudioQuery, Speaker, SpeakerInfo, SupportedDevices};
use crate::speaker_info::load_speaker_info;
use crate::user_dict::{UserDict, UserDictWord, WordProperty};

use super::extract::{Json, Path, Query};
use super::AppState;

/// Run inference on a blocking thread, holding one of the pending-request
/// permits for its whole duration.
async fn inference<T, F>(permits: &Arc<Semaphore>, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let _permit = Arc::clone(permits)
        .try_acquire_owned()
        .map_err(|_| EngineError::Busy)?;
    blocking(work).await
}

/// Run `work` on a blocking thread without taking a permit.
async fn blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| EngineError::Task(e.to_string()))?
}

fn wav_response(bytes: Vec<u8>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "audio/wav")], bytes)
}

#[derive(Debug, Deserialize)]
pub struct TextQuery {
    text: String,
    speaker: u32,
}

#[derive(Debug, Deserialize)]
pub struct AccentPhrasesQuery {
    text: String,
    speaker: u32,
    #[serde(default)]
    is_kana: bool,
}

#[derive(Debug, Deserialize)]
pub struct SpeakerQuery {
    speaker: u32,
}

#[derive(Debug, Deserialize)]
pub struct InitializeQuery {
    speaker: u32,
    #[serde(default)]
    skip_reinit: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct SynthesisQuery {
    speaker: u32,
    #[serde(default = "default_true")]
    enable_interrogative_upspeak: bool,
}

#[derive(Debug, Deserialize)]
pub struct SpeakerInfoQuery {
    speaker_uuid: String,
}

#[derive(Debug, Deserialize)]
pub struct KanaQuery {
    text: String,
}

#[derive(Debug, Deserialize)]
pub struct ImportQuery {
    #[serde(rename = "override")]
    override_existing: bool,
}

pub async fn version() -> Json<&'static str> {
    Json(env!("CARGO_PKG_VERSION"))
}

pub async fn core_versions(State(state): State<AppState>) -> Result<Json<Vec<String>>> {
    let engine = Arc::clone(&state.engine);
    let version = blocking(move || Ok(engine.core_version())).await?;
    Ok(Json(vec![version]))
}

pub async fn engine_manifest(State(state): State<AppState>) -> Json<EngineManifest> {
    Json(state.manifest.as_ref().clone())
}

pub async fn supported_devices(State(state): State<AppState>) -> Result<Json<SupportedDevices>> {
    let engine = Arc::clone(&state.engine);
    Ok(Json(blocking(move || Ok(engine.supported_devices())).await?))
}

pub async fn speakers(State(state): State<AppState>) -> Result<Json<Vec<Speaker>>> {
    let engine = Arc::clone(&state.engine);
    Ok(Json(blocking(move || Ok(engine.speakers())).await?))
}

pub async fn speaker_info(
    State(state): State<AppState>,
    Query(query): Query<SpeakerInfoQuery>,
) -> Result<Json<SpeakerInfo>> {
    let engine = Arc::clone(&state.engine);
    let resource_dir = Arc::clone(&state.resource_dir);
    let info = blocking(move || {
        let speaker = engine.speaker_by_uuid(&query.speaker_uuid).ok_or_else(|| {
            EngineError::NotFound(format!("Speaker {} not found", query.speaker_uuid))
        })?;
        load_speaker_info(&resource_dir, &speaker)
    })
    .await?;
    Ok(Json(info))
}

pub async fn initialize_speaker(
    State(state): State<AppState>,
    Query(query): Query<InitializeQuery>,
) -> Result<StatusCode> {
    let engine = Arc::clone(&state.engine);
    inference(&state.permits, move || {
        engine.initialize_style(query.speaker, query.skip_reinit)
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn is_initialized_speaker(
    State(state): State<AppState>,
    Query(query): Query<SpeakerQuery>,
) -> Result<Json<bool>> {
    let engine = Arc::clone(&state.engine);
    Ok(Json(
        blocking(move || engine.is_initialized_style(query.speaker)).await?,
    ))
}

pub async fn audio_query(
    State(state): State<AppState>,
    Query(query): Query<TextQuery>,
) -> Result<Json<AudioQuery>> {
    let engine = Arc::clone(&state.engine);
    let audio_query = inference(&state.permits, move || {
        engine.create_audio_query(&query.text, query.speaker)
    })
    .await?;
    Ok(Json(audio_query))
}

pub async fn accent_phrases(
    State(state): State<AppState>,
    Query(query): Query<AccentPhrasesQuery>,
) -> Result<Json<Vec<AccentPhrase>>> {
    let engine = Arc::clone(&state.engine);
    let phrases = inference(&state.permits, move || {
        if query.is_kana {
            engine.create_accent_phrases_from_kana(&query.text, query.speaker)
        } else {
            engine.create_accent_phrases(&query.text, query.speaker)
        }
    })
    .await?;
    Ok(Json(phrases))
}

pub async fn mora_data(
    State(state): State<AppState>,
    Query(query): Query<SpeakerQuery>,
    Json(phrases): Json<Vec<AccentPhrase>>,
) -> Result<Json<Vec<AccentPhrase>>> {
    let engine = Arc::clone(&state.engine);
    let phrases = inference(&state.permits, move || {
        engine.ensure_style(query.speaker)?;
        engine.update_length_and_pitch(phrases, query.speaker)
    })
    .await?;
    Ok(Json(phrases))
}

pub async fn mora_length(
    State(state): State<AppState>,
    Query(query): Query<SpeakerQuery>,
    Json(phrases): Json<Vec<AccentPhrase>>,
) -> Result<Json<Vec<AccentPhrase>>> {
    let engine = Arc::clone(&state.engine);
    let phrases = inference(&state.permits, move || {
        engine.ensure_style(query.speaker)?;
        engine.update_length(phrases, query.speaker)
    })
    .await?;
    Ok(Json(phrases))
}

pub async fn mora_pitch(
    State(state): State<AppState>,
    Query(query): Query<SpeakerQuery>,
    Json(phrases): Json<Vec<AccentPhrase>>,
) -> Result<Json<Vec<AccentPhrase>>> {
    let engine = Arc::clone(&state.engine);
    let phrases = inference(&state.permits, move || {
        engine.ensure_style(query.speaker)?;
        engine.update_pitch(phrases, query.speaker)
    })
    .await?;
    Ok(Json(phrases))
}

pub async fn synthesis(
    State(state): State<AppState>,
    Query(query): Query<SynthesisQuery>,
    Json(audio_query): Json<AudioQuery>,
) -> Result<impl IntoResponse> {
    let engine = Arc::clone(&state.engine);
    let wav = inference(&state.permits, move || {
        engine.synthesize_wav(&audio_query, query.speaker, query.enable_interrogative_upspeak)
    })
    .await?;
    Ok(wav_response(wav))
}

pub async fn multi_synthesis(
    State(state): State<AppState>,
    Query(query): Query<SpeakerQuery>,
    Json(queries): Json<Vec<AudioQuery>>,
) -> Result<impl IntoResponse> {
    let engine = Arc::clone(&state.engine);
    let archive = inference(&state.permits, move || {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (i, audio_query) in queries.iter().enumerate() {
            let wav = engine.synthesize_wav(audio_query, query.speaker, true)?;
            zip.start_file(format!("{:03}.wav", i + 1), SimpleFileOptions::default())?;
            zip.write_all(&wav)?;
        }
        Ok(zip.finish()?.into_inner())
    })
    .await?;
    Ok(([(header::CONTENT_TYPE, "application/zip")], archive))
}

pub async fn connect_waves_handler(Json(waves): Json<Vec<String>>) -> Result<impl IntoResponse> {
    let wav = blocking(move || {
        let decoded = waves
            .iter()
            .map(|wave| {
                STANDARD
                    .decode(wave)
                    .map_err(|e| EngineError::InvalidInput(format!("Invalid base64 wave: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(connect_waves(&decoded)?.to_wav_bytes()?)
    })
    .await?;
    Ok(wav_response(wav))
}

pub async fn validate_kana(Query(query): Query<KanaQuery>) -> Result<Json<bool>> {
    parse_kana(&query.text)?;
    Ok(Json(true))
}

pub async fn get_user_dict(State(state): State<AppState>) -> Result<Json<UserDict>> {
    let user_dict = Arc::clone(&state.user_dict);
    Ok(Json(blocking(move || Ok(user_dict.read_dict()?)).await?))
}

pub async fn add_user_dict_word(
    State(state): State<AppState>,
    Query(property): Query<WordProperty>,
) -> Result<Json<Uuid>> {
    let user_dict = Arc::clone(&state.user_dict);
    Ok(Json(
        blocking(move || Ok(user_dict.apply_word(property)?)).await?,
    ))
}

pub async fn rewrite_user_dict_word(
    State(state): State<AppState>,
    Path(word_uuid): Path<Uuid>,
    Query(property): Query<WordProperty>,
) -> Result<StatusCode> {
    let user_dict = Arc::clone(&state.user_dict);
    blocking(move || Ok(user_dict.rewrite_word(word_uuid, property)?)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_user_dict_word(
    State(state): State<AppState>,
    Path(word_uuid): Path<Uuid>,
) -> Result<StatusCode> {
    let user_dict = Arc::clone(&state.user_dict);
    blocking(move || Ok(user_dict.delete_word(word_uuid)?)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn import_user_dict(
    State(state): State<AppState>,
    Query(query): Query<ImportQuery>,
    Json(words): Json<BTreeMap<String, UserDictWord>>,
) -> Result<StatusCode> {
    let user_dict = Arc::clone(&state.user_dict);
    blocking(move || Ok(user_dict.import_user_dict(words, query.override_existing)?)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Fallback for unknown paths.
pub async fn not_found() -> EngineError {
    EngineError::NotFound("Not Found".to_string())
}

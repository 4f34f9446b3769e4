//! Voice synthesis core backends.
//!
//! A core owns the acoustic models and answers three questions for a given
//! style: how long each phoneme lasts, what pitch each mora carries, and what
//! waveform a frame-level pitch/phoneme sequence decodes to. Everything
//! above this layer (text analysis, prosody editing, audio assembly) is
//! backend-agnostic.
//!
//! # Backends
//!
//! | Backend | Selected when | Loads |
//! |---|---|---|
//! | [`NativeCore`] | `LIBCORE_PATH` is set | precompiled core library via `dlopen` |
//! | `OnnxCore` | model dir holds the exported ONNX graphs | `predict_duration.onnx`, `predict_intonation.onnx`, `decode.onnx`, `metas.json` |
//! | [`MockCore`] | `--enable-mock` | nothing; deterministic output |
//!
//! # Model Directory Layout (ONNX backend)
//!
//! ```text
//! model/
//! ├── predict_duration.onnx
//! ├── predict_intonation.onnx
//! ├── decode.onnx
//! ├── metas.json
//! └── VERSION            # optional, reported by /core_versions
//! ```
//!
//! Cores are not thread-safe. The engine keeps exactly one behind a mutex and
//! runs every call on a blocking thread.

pub mod metas;
pub mod mock;
pub mod native;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod phoneme;

use std::path::PathBuf;

use derive_builder::Builder;

use crate::model::{Speaker, SupportedDevices};

pub use metas::MetaStore;
pub use mock::MockCore;
pub use native::NativeCore;
#[cfg(feature = "onnx")]
pub use onnx::OnnxCore;

/// Output sample rate of every core.
pub const SAMPLE_RATE: u32 = 24000;

/// Samples produced per decoder frame.
pub const FRAME_SIZE: usize = 256;

/// Decoder frames per second (24000 / 256).
pub const FRAME_RATE: f32 = SAMPLE_RATE as f32 / FRAME_SIZE as f32;

/// Shortest phoneme length a duration model may report, in seconds.
pub const PHONEME_LENGTH_MINIMAL: f32 = 0.01;

#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    #[cfg(feature = "onnx")]
    #[error("ONNX runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[cfg(feature = "onnx")]
    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to load library {path}: {source}")]
    Library {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("Core call `{call}` failed: {message}")]
    Native { call: &'static str, message: String },
    #[error("Model `{0}` produced no output")]
    EmptyOutput(&'static str),
    #[error("Unknown phoneme: {0}")]
    UnknownPhoneme(String),
    #[error("Style {0} not found")]
    StyleNotFound(u32),
    #[error("Invalid metas: {0}")]
    Metas(String),
    #[error("No usable core: {0}")]
    NotConfigured(String),
    #[error("Invalid initialize options: {0}")]
    Options(#[from] InitializeOptionsBuilderError),
}

/// Options passed to the core once at startup.
#[derive(Debug, Clone, Builder)]
#[builder(default)]
pub struct InitializeOptions {
    pub use_gpu: bool,
    /// `0` lets the backend choose.
    pub cpu_num_threads: usize,
    pub load_all_models: bool,
}

impl Default for InitializeOptions {
    fn default() -> Self {
        Self {
            use_gpu: false,
            cpu_num_threads: 0,
            load_all_models: false,
        }
    }
}

/// Per-mora features consumed by the intonation model.
///
/// Every list has one entry per mora (pause moras included) plus a leading
/// and trailing `pau`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntonationInput {
    pub vowel_phonemes: Vec<i64>,
    /// `-1` where the mora has no consonant.
    pub consonant_phonemes: Vec<i64>,
    pub start_accent: Vec<i64>,
    pub end_accent: Vec<i64>,
    pub start_accent_phrase: Vec<i64>,
    pub end_accent_phrase: Vec<i64>,
}

impl IntonationInput {
    pub fn len(&self) -> usize {
        self.vowel_phonemes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vowel_phonemes.is_empty()
    }
}

/// The call surface every backend exposes.
pub trait Core: Send {
    fn version(&self) -> String;

    fn metas(&self) -> &MetaStore;

    fn supported_devices(&self) -> SupportedDevices;

    fn load_model(&mut self, style_id: u32) -> Result<(), CoreError>;

    fn is_model_loaded(&self, style_id: u32) -> bool;

    /// One length in seconds per phoneme id.
    fn predict_duration(&mut self, phonemes: &[i64], style_id: u32)
        -> Result<Vec<f32>, CoreError>;

    /// One log-F0 per entry of `input`.
    fn predict_intonation(
        &mut self,
        input: &IntonationInput,
        style_id: u32,
    ) -> Result<Vec<f32>, CoreError>;

    /// Decode frame-level features into samples.
    ///
    /// `phoneme` is a row-major `[frames, PHONEME_SIZE]` one-hot matrix and
    /// `f0` has one entry per frame. Returns `frames * FRAME_SIZE` samples.
    fn decode(&mut self, f0: &[f32], phoneme: &[f32], style_id: u32)
        -> Result<Vec<f32>, CoreError>;

    fn speakers(&self) -> &[Speaker] {
        self.metas().speakers()
    }

    fn ensure_style(&self, style_id: u32) -> Result<(), CoreError> {
        if self.metas().has_style(style_id) {
            Ok(())
        } else {
            Err(CoreError::StyleNotFound(style_id))
        }
    }
}

/// Where to find a core and how to start it.
#[derive(Debug, Clone, Default)]
pub struct CoreSettings {
    pub enable_mock: bool,
    /// Precompiled core library (`LIBCORE_PATH`).
    pub voicelib_path: Option<PathBuf>,
    /// ONNX Runtime shared library (`LIBONNXRUNTIME_PATH`).
    pub runtime_path: Option<PathBuf>,
    /// Model set directory (`CORE_MODEL_DIR_PATH`).
    pub model_dir: Option<PathBuf>,
    pub options: InitializeOptions,
}

/// Pick and initialize a backend.
pub fn load_core(settings: &CoreSettings) -> Result<Box<dyn Core>, CoreError> {
    if settings.enable_mock {
        log::info!("Using mock core");
        return Ok(Box::new(MockCore::new()));
    }

    if let Some(voicelib) = &settings.voicelib_path {
        log::info!("Using native core {}", voicelib.display());
        let core = NativeCore::load(
            voicelib,
            settings.runtime_path.as_deref(),
            &settings.options,
        )?;
        return Ok(Box::new(core));
    }

    #[cfg(feature = "onnx")]
    if let Some(model_dir) = &settings.model_dir {
        if onnx::has_model_set(model_dir) {
            log::info!("Using ONNX core with models from {}", model_dir.display());
            let core = OnnxCore::load(
                model_dir,
                settings.runtime_path.as_deref(),
                &settings.options,
            )?;
            return Ok(Box::new(core));
        }
    }

    Err(CoreError::NotConfigured(
        "set LIBCORE_PATH, point CORE_MODEL_DIR_PATH at an ONNX model set, or pass --enable-mock"
            .to_string(),
    ))
}

/// Clamp predicted lengths to [`PHONEME_LENGTH_MINIMAL`].
pub(crate) fn clamp_lengths(lengths: &mut [f32]) {
    for length in lengths.iter_mut() {
        if *length < PHONEME_LENGTH_MINIMAL {
            *length = PHONEME_LENGTH_MINIMAL;
        }
    }
}

//! # vox-engine
//!
//! A local text-to-speech server for Japanese voice synthesis cores,
//! speaking the VOICEVOX HTTP API.
//!
//! ## Features
//!
//! - **Three core backends**: a precompiled native core library, the
//!   exported ONNX model set run through ONNX Runtime, or a deterministic mock
//! - **Text front end**: dictionary lookup with reading fallbacks for kana,
//!   numbers and Latin letters, plus AquesTalk-style kana notation
//! - **User dictionary**: persistent words applied to the front end on change
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use vox_engine::core::MockCore;
//! use vox_engine::frontend::TextAnalyzer;
//! use vox_engine::tts_engine::TtsEngine;
//!
//! let engine = TtsEngine::new(Box::new(MockCore::new()), Arc::new(TextAnalyzer::default()));
//! let query = engine.create_audio_query("こんにちは", 0)?;
//! let wave = engine.synthesize(&query, 0, true)?;
//! std::fs::write("output.wav", wave.to_wav_bytes()?)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod audio;
pub mod config;
pub mod core;
pub mod error;
pub mod frontend;
pub mod manifest;
pub mod model;
pub mod server;
pub mod speaker_info;
pub mod tts_engine;
pub mod user_dict;

pub use audio::Wave;
pub use error::{EngineError, Result};
pub use tts_engine::TtsEngine;

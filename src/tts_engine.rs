//! Prosody prediction and waveform synthesis on top of a [`Core`].

use std::sync::Arc;

use parking_lot::Mutex;

use crate::audio::{resample, Wave};
use crate::core::phoneme::{is_unvoiced_mora, phoneme_id, PAU, PHONEME_SIZE};
use crate::core::{Core, CoreError, IntonationInput, FRAME_RATE, FRAME_SIZE, SAMPLE_RATE};
use crate::error::{EngineError, Result};
use crate::frontend::mora::vowel_kana;
use crate::frontend::{create_kana, parse_kana, TextAnalyzer};
use crate::model::{AccentPhrase, AudioQuery, Mora, Speaker, SupportedDevices};

const UPSPEAK_LENGTH: f32 = 0.15;
const UPSPEAK_PITCH_ADD: f32 = 0.3;
const UPSPEAK_PITCH_MAX: f32 = 6.5;
/// Longest audio a single query may render.
const MAX_DURATION_SECS: f32 = 600.0;

/// Owns the single loaded core and the text front end.
///
/// Every method blocks while it holds the core; async callers run them on a
/// blocking thread.
pub struct TtsEngine {
    core: Mutex<Box<dyn Core>>,
    analyzer: Arc<TextAnalyzer>,
}

impl TtsEngine {
    pub fn new(core: Box<dyn Core>, analyzer: Arc<TextAnalyzer>) -> Self {
        Self {
            core: Mutex::new(core),
            analyzer,
        }
    }

    pub fn analyzer(&self) -> &Arc<TextAnalyzer> {
        &self.analyzer
    }

    pub fn core_version(&self) -> String {
        self.core.lock().version()
    }

    pub fn speakers(&self) -> Vec<Speaker> {
        self.core.lock().speakers().to_vec()
    }

    pub fn speaker_by_uuid(&self, uuid: &str) -> Option<Speaker> {
        self.core.lock().metas().speaker_by_uuid(uuid).cloned()
    }

    pub fn supported_devices(&self) -> SupportedDevices {
        self.core.lock().supported_devices()
    }

    pub fn ensure_style(&self, style_id: u32) -> Result<()> {
        Ok(self.core.lock().ensure_style(style_id)?)
    }

    /// Load the model behind `style_id`. With `skip_reinit`, an already
    /// loaded style is left alone.
    pub fn initialize_style(&self, style_id: u32, skip_reinit: bool) -> Result<()> {
        let mut core = self.core.lock();
        core.ensure_style(style_id)?;
        if skip_reinit && core.is_model_loaded(style_id) {
            return Ok(());
        }
        core.load_model(style_id)?;
        log::info!("Initialized style {style_id}");
        Ok(())
    }

    pub fn is_initialized_style(&self, style_id: u32) -> Result<bool> {
        let core = self.core.lock();
        core.ensure_style(style_id)?;
        Ok(core.is_model_loaded(style_id))
    }

    pub fn create_accent_phrases(&self, text: &str, style_id: u32) -> Result<Vec<AccentPhrase>> {
        self.ensure_style(style_id)?;
        let phrases = self.analyzer.analyze(text);
        self.update_length_and_pitch(phrases, style_id)
    }

    pub fn create_accent_phrases_from_kana(
        &self,
        kana: &str,
        style_id: u32,
    ) -> Result<Vec<AccentPhrase>> {
        self.ensure_style(style_id)?;
        let phrases = parse_kana(kana)?;
        self.update_length_and_pitch(phrases, style_id)
    }

    pub fn create_audio_query(&self, text: &str, style_id: u32) -> Result<AudioQuery> {
        let phrases = self.create_accent_phrases(text, style_id)?;
        let kana = create_kana(&phrases);
        Ok(AudioQuery::new(phrases, Some(kana)))
    }

    pub fn create_audio_query_from_kana(&self, kana: &str, style_id: u32) -> Result<AudioQuery> {
        let phrases = self.create_accent_phrases_from_kana(kana, style_id)?;
        Ok(AudioQuery::new(phrases, Some(kana.to_string())))
    }

    pub fn update_length_and_pitch(
        &self,
        phrases: Vec<AccentPhrase>,
        style_id: u32,
    ) -> Result<Vec<AccentPhrase>> {
        let mut core = self.core.lock();
        let phrases = predict_lengths(core.as_mut(), phrases, style_id)?;
        predict_pitch(core.as_mut(), phrases, style_id)
    }

    pub fn update_length(&self, phrases: Vec<AccentPhrase>, style_id: u32) -> Result<Vec<AccentPhrase>> {
        predict_lengths(self.core.lock().as_mut(), phrases, style_id)
    }

    pub fn update_pitch(&self, phrases: Vec<AccentPhrase>, style_id: u32) -> Result<Vec<AccentPhrase>> {
        predict_pitch(self.core.lock().as_mut(), phrases, style_id)
    }

    /// Render `query` to audio at its requested rate and channel count.
    pub fn synthesize(
        &self,
        query: &AudioQuery,
        style_id: u32,
        enable_interrogative_upspeak: bool,
    ) -> Result<Wave> {
        validate_query(query)?;
        let mut phrases = query.accent_phrases.clone();
        if enable_interrogative_upspeak {
            apply_interrogative_upspeak(&mut phrases);
        }
        apply_pause_length(&mut phrases, query);

        let frames = FrameFeatures::build(&phrases, query)?;
        let samples = if frames.is_silent() {
            self.core.lock().ensure_style(style_id)?;
            vec![0.0; frames.f0.len() * FRAME_SIZE]
        } else {
            self.core
                .lock()
                .decode(&frames.f0, &frames.phoneme, style_id)?
        };

        let samples: Vec<f32> = samples.iter().map(|s| s * query.volume_scale).collect();
        let samples = resample(&samples, SAMPLE_RATE, query.output_sampling_rate)?;
        let wave = Wave::mono(samples, query.output_sampling_rate);
        log::debug!(
            "Synthesized {:.2}s for style {style_id} ({} frames)",
            wave.duration_secs(),
            frames.f0.len()
        );
        Ok(if query.output_stereo {
            wave.into_stereo()
        } else {
            wave
        })
    }

    /// [`Self::synthesize`] encoded as a 16-bit WAV file.
    pub fn synthesize_wav(
        &self,
        query: &AudioQuery,
        style_id: u32,
        enable_interrogative_upspeak: bool,
    ) -> Result<Vec<u8>> {
        Ok(self
            .synthesize(query, style_id, enable_interrogative_upspeak)?
            .to_wav_bytes()?)
    }
}

fn validate_query(query: &AudioQuery) -> Result<()> {
    if !(query.speed_scale > 0.0) {
        return Err(EngineError::InvalidInput(format!(
            "speedScale must be positive, got {}",
            query.speed_scale
        )));
    }
    if query.output_sampling_rate == 0 {
        return Err(EngineError::InvalidInput(
            "outputSamplingRate must be positive".to_string(),
        ));
    }
    if query.pre_phoneme_length < 0.0 || query.post_phoneme_length < 0.0 {
        return Err(EngineError::InvalidInput(
            "phoneme lengths must not be negative".to_string(),
        ));
    }
    Ok(())
}

fn id_of(phoneme: &str) -> Result<i64> {
    phoneme_id(phoneme).ok_or_else(|| CoreError::UnknownPhoneme(phoneme.to_string()).into())
}

/// Ids of `[pau] + (consonant?, vowel)* + [pau]` over every mora and pause.
fn phoneme_ids(phrases: &[AccentPhrase]) -> Result<Vec<i64>> {
    let mut ids = vec![0];
    for mora in phrases.iter().flat_map(AccentPhrase::moras_with_pause) {
        if let Some(consonant) = &mora.consonant {
            ids.push(id_of(consonant)?);
        }
        ids.push(id_of(&mora.vowel)?);
    }
    ids.push(0);
    Ok(ids)
}

fn predict_lengths(
    core: &mut dyn Core,
    mut phrases: Vec<AccentPhrase>,
    style_id: u32,
) -> Result<Vec<AccentPhrase>> {
    core.ensure_style(style_id)?;
    let ids = phoneme_ids(&phrases)?;
    if ids.len() <= 2 {
        return Ok(phrases);
    }

    let lengths = core.predict_duration(&ids, style_id)?;
    if lengths.len() != ids.len() {
        return Err(CoreError::Native {
            call: "predict_duration",
            message: format!("expected {} lengths, got {}", ids.len(), lengths.len()),
        }
        .into());
    }

    // Skip the leading pau.
    let mut next = lengths.into_iter().skip(1);
    for mora in phrases.iter_mut().flat_map(AccentPhrase::moras_with_pause_mut) {
        if mora.consonant.is_some() {
            mora.consonant_length = next.next();
        }
        mora.vowel_length = next.next().unwrap_or_default();
    }
    Ok(phrases)
}

/// Features for the intonation model, one entry per mora plus padding.
fn intonation_input(phrases: &[AccentPhrase]) -> Result<IntonationInput> {
    let mut input = IntonationInput {
        vowel_phonemes: vec![0],
        consonant_phonemes: vec![-1],
        start_accent: vec![0],
        end_accent: vec![0],
        start_accent_phrase: vec![0],
        end_accent_phrase: vec![0],
    };

    for phrase in phrases {
        let count = phrase.moras.len();
        for (idx, mora) in phrase.moras.iter().enumerate() {
            input.vowel_phonemes.push(id_of(&mora.vowel)?);
            input.consonant_phonemes.push(match &mora.consonant {
                Some(c) => id_of(c)?,
                None => -1,
            });
            let start = if phrase.accent == 1 { 0 } else { 1 };
            input.start_accent.push(i64::from(idx == start));
            input.end_accent.push(i64::from(idx + 1 == phrase.accent));
            input.start_accent_phrase.push(i64::from(idx == 0));
            input.end_accent_phrase.push(i64::from(idx + 1 == count));
        }
        if phrase.pause_mora.is_some() {
            input.vowel_phonemes.push(0);
            input.consonant_phonemes.push(-1);
            input.start_accent.push(0);
            input.end_accent.push(0);
            input.start_accent_phrase.push(0);
            input.end_accent_phrase.push(0);
        }
    }

    input.vowel_phonemes.push(0);
    input.consonant_phonemes.push(-1);
    input.start_accent.push(0);
    input.end_accent.push(0);
    input.start_accent_phrase.push(0);
    input.end_accent_phrase.push(0);
    Ok(input)
}

fn predict_pitch(
    core: &mut dyn Core,
    mut phrases: Vec<AccentPhrase>,
    style_id: u32,
) -> Result<Vec<AccentPhrase>> {
    core.ensure_style(style_id)?;
    let input = intonation_input(&phrases)?;
    if input.len() <= 2 {
        return Ok(phrases);
    }

    let f0 = core.predict_intonation(&input, style_id)?;
    if f0.len() != input.len() {
        return Err(CoreError::Native {
            call: "predict_intonation",
            message: format!("expected {} pitches, got {}", input.len(), f0.len()),
        }
        .into());
    }

    let mut next = f0.into_iter().skip(1);
    for mora in phrases.iter_mut().flat_map(AccentPhrase::moras_with_pause_mut) {
        let pitch = next.next().unwrap_or_default();
        mora.pitch = if is_unvoiced_mora(&mora.vowel) { 0.0 } else { pitch };
    }
    Ok(phrases)
}

/// Raise the end of voiced interrogative phrases with an extra vowel mora.
pub fn apply_interrogative_upspeak(phrases: &mut [AccentPhrase]) {
    for phrase in phrases.iter_mut().filter(|p| p.is_interrogative) {
        let Some(last) = phrase.moras.last() else {
            continue;
        };
        if last.pitch == 0.0 {
            continue;
        }
        let Some(kana) = vowel_kana(&last.vowel) else {
            continue;
        };
        let mut upspeak = Mora::new(kana, None, &last.vowel);
        upspeak.vowel_length = UPSPEAK_LENGTH;
        upspeak.pitch = (last.pitch + UPSPEAK_PITCH_ADD).min(UPSPEAK_PITCH_MAX);
        phrase.moras.push(upspeak);
    }
}

fn apply_pause_length(phrases: &mut [AccentPhrase], query: &AudioQuery) {
    for pause in phrases.iter_mut().filter_map(|p| p.pause_mora.as_mut()) {
        if let Some(length) = query.pause_length {
            pause.vowel_length = length;
        }
        pause.vowel_length *= query.pause_length_scale;
    }
}

/// Frame-level decoder input.
struct FrameFeatures {
    f0: Vec<f32>,
    /// Row-major `[frames, PHONEME_SIZE]` one-hot matrix.
    phoneme: Vec<f32>,
    /// False when only the leading and trailing silence was emitted.
    has_speech: bool,
}

impl FrameFeatures {
    fn build(phrases: &[AccentPhrase], query: &AudioQuery) -> Result<Self> {
        let moras: Vec<&Mora> = phrases.iter().flat_map(AccentPhrase::moras_with_pause).collect();

        // Mora-level pitch after scale and intonation.
        let mut pitches: Vec<f32> = moras
            .iter()
            .map(|m| m.pitch * 2f32.powf(query.pitch_scale))
            .collect();
        let voiced: Vec<f32> = pitches.iter().copied().filter(|&p| p > 0.0).collect();
        if !voiced.is_empty() {
            let mean = voiced.iter().sum::<f32>() / voiced.len() as f32;
            for p in pitches.iter_mut().filter(|p| **p > 0.0) {
                *p = (*p - mean) * query.intonation_scale + mean;
            }
        }

        let frames_of = |seconds: f32| -> Result<usize> {
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(EngineError::InvalidInput(format!(
                    "phoneme lengths must be finite and non-negative, got {seconds}"
                )));
            }
            Ok((seconds / query.speed_scale * FRAME_RATE).round() as usize)
        };
        let pau = id_of(PAU)?;

        let mut segments = vec![(pau, frames_of(query.pre_phoneme_length)?, 0.0)];
        for (mora, &pitch) in moras.iter().zip(&pitches) {
            if let (Some(consonant), Some(length)) = (&mora.consonant, mora.consonant_length) {
                segments.push((id_of(consonant)?, frames_of(length)?, pitch));
            }
            segments.push((id_of(&mora.vowel)?, frames_of(mora.vowel_length)?, pitch));
        }
        segments.push((pau, frames_of(query.post_phoneme_length)?, 0.0));

        let total = segments.iter().fold(0usize, |sum, s| sum.saturating_add(s.1));
        if total as f32 / FRAME_RATE > MAX_DURATION_SECS {
            return Err(EngineError::InvalidInput(format!(
                "audio would be longer than {MAX_DURATION_SECS} seconds"
            )));
        }

        let mut features = Self {
            f0: Vec::with_capacity(total),
            phoneme: Vec::with_capacity(total * PHONEME_SIZE),
            has_speech: !moras.is_empty(),
        };
        for (phoneme_id, frames, f0) in segments {
            features.push(phoneme_id, frames, f0);
        }
        Ok(features)
    }

    fn push(&mut self, phoneme_id: i64, frames: usize, f0: f32) {
        let column = usize::try_from(phoneme_id).unwrap_or(0);
        for _ in 0..frames {
            self.f0.push(f0);
            let mut row = [0.0f32; PHONEME_SIZE];
            row[column] = 1.0;
            self.phoneme.extend_from_slice(&row);
        }
    }

    fn is_silent(&self) -> bool {
        !self.has_speech
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{
        apply_interrogative_upspeak, apply_pause_length, intonation_input, phoneme_ids,
        FrameFeatures, TtsEngine,
    };
    use crate::core::{MockCore, FRAME_SIZE, SAMPLE_RATE};
    use crate::error::EngineError;
    use crate::frontend::{parse_kana, TextAnalyzer};
    use crate::model::AudioQuery;

    fn engine() -> TtsEngine {
        TtsEngine::new(Box::new(MockCore::new()), Arc::new(TextAnalyzer::default()))
    }

    /// Vowel-only moras of 0.1s each (9 frames), pitched 5.0, 6.0, ...
    fn voiced_query(kana: &str) -> AudioQuery {
        let mut phrases = parse_kana(kana).expect("valid kana");
        for (i, mora) in phrases.iter_mut().flat_map(|p| p.moras.iter_mut()).enumerate() {
            mora.vowel_length = 0.1;
            mora.pitch = 5.0 + i as f32;
        }
        AudioQuery::new(phrases, None)
    }

    fn voiced_f0(frames: &FrameFeatures) -> Vec<f32> {
        frames.f0.iter().copied().filter(|&f| f > 0.0).collect()
    }

    #[test]
    fn phoneme_ids_are_padded_and_include_pauses() {
        let phrases = parse_kana("カ'、ア'").expect("valid kana");
        // pau k a pau a pau
        assert_eq!(phoneme_ids(&phrases).expect("ids"), vec![0, 23, 7, 0, 7, 0]);
    }

    #[test]
    fn intonation_input_marks_accent_and_phrase_edges() {
        let phrases = parse_kana("ア'イウ/エオ'").expect("valid kana");
        let input = intonation_input(&phrases).expect("input");
        assert_eq!(input.len(), 7);
        assert_eq!(input.start_accent, vec![0, 1, 0, 0, 0, 1, 0]);
        assert_eq!(input.end_accent, vec![0, 1, 0, 0, 0, 1, 0]);
        assert_eq!(input.start_accent_phrase, vec![0, 1, 0, 0, 1, 0, 0]);
        assert_eq!(input.end_accent_phrase, vec![0, 0, 0, 1, 0, 1, 0]);
        assert_eq!(input.consonant_phonemes, vec![-1; 7]);
    }

    #[test]
    fn lengths_and_pitch_are_written_back() {
        let engine = engine();
        let phrases = engine
            .create_accent_phrases_from_kana("カ'_シ、ア'", 3)
            .expect("mock prediction");
        let ka = &phrases[0].moras[0];
        assert_eq!(ka.consonant_length, Some(0.1));
        assert_eq!(ka.vowel_length, 0.1);
        assert!(ka.pitch > 0.0);
        // Devoiced mora has no pitch.
        assert_eq!(phrases[0].moras[1].pitch, 0.0);
        let pause = phrases[0].pause_mora.as_ref().expect("pause");
        assert_eq!(pause.vowel_length, 0.2);
        assert_eq!(pause.pitch, 0.0);
    }

    #[test]
    fn unknown_style_is_reported() {
        let err = engine().create_audio_query_from_kana("ア'", 42).expect_err("no style 42");
        assert!(matches!(err, EngineError::Core(_)));
    }

    #[test]
    fn upspeak_appends_a_rising_vowel() {
        let mut phrases = parse_kana("ア'？").expect("valid kana");
        phrases[0].moras[0].pitch = 6.4;
        apply_interrogative_upspeak(&mut phrases);
        assert_eq!(phrases[0].moras.len(), 2);
        let up = &phrases[0].moras[1];
        assert_eq!(up.text, "ア");
        assert_eq!(up.vowel_length, 0.15);
        assert_eq!(up.pitch, 6.5);
    }

    #[test]
    fn upspeak_skips_unvoiced_endings() {
        let mut phrases = parse_kana("ア'？").expect("valid kana");
        apply_interrogative_upspeak(&mut phrases);
        assert_eq!(phrases[0].moras.len(), 1);
    }

    #[test]
    fn synthesis_length_follows_frames() {
        let engine = engine();
        let query = engine.create_audio_query_from_kana("ア'", 3).expect("query");
        let wave = engine.synthesize(&query, 3, true).expect("synthesis");
        // pre 0.1 + vowel 0.1 + post 0.1, rounded per phoneme.
        let frames = 3 * (0.1f32 * SAMPLE_RATE as f32 / FRAME_SIZE as f32).round() as usize;
        assert_eq!(wave.samples.len(), frames * FRAME_SIZE);
        assert_eq!(wave.sample_rate, SAMPLE_RATE);
    }

    #[test]
    fn speed_scale_shortens_output() {
        let engine = engine();
        let mut query = engine.create_audio_query_from_kana("ア'イ", 3).expect("query");
        let normal = engine.synthesize(&query, 3, false).expect("normal");
        query.speed_scale = 2.0;
        let fast = engine.synthesize(&query, 3, false).expect("fast");
        assert!(fast.samples.len() < normal.samples.len());
    }

    #[test]
    fn empty_query_renders_silence() {
        let engine = engine();
        let query = AudioQuery::new(vec![], None);
        let wave = engine.synthesize(&query, 3, false).expect("silence");
        assert!(!wave.samples.is_empty());
        assert!(wave.samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn stereo_and_volume_are_applied() {
        let engine = engine();
        let mut query = engine.create_audio_query_from_kana("ア'", 3).expect("query");
        let mono = engine.synthesize(&query, 3, false).expect("mono");
        query.output_stereo = true;
        query.volume_scale = 0.0;
        let stereo = engine.synthesize(&query, 3, false).expect("stereo");
        assert_eq!(stereo.samples.len(), mono.samples.len() * 2);
        assert!(stereo.samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn invalid_speed_is_rejected() {
        let engine = engine();
        let mut query = AudioQuery::new(vec![], None);
        query.speed_scale = 0.0;
        assert!(matches!(
            engine.synthesize(&query, 3, false),
            Err(EngineError::InvalidInput(_))
        ));
    }

    #[test]
    fn pause_length_override_is_scaled() {
        let mut query = voiced_query("ア'、ア'");
        query.accent_phrases[0].pause_mora.as_mut().expect("pause").vowel_length = 0.3;

        let mut phrases = query.accent_phrases.clone();
        query.pause_length_scale = 2.0;
        apply_pause_length(&mut phrases, &query);
        assert_eq!(phrases[0].pause_mora.as_ref().expect("pause").vowel_length, 0.6);

        let mut phrases = query.accent_phrases.clone();
        query.pause_length = Some(0.4);
        query.pause_length_scale = 0.5;
        apply_pause_length(&mut phrases, &query);
        assert_eq!(phrases[0].pause_mora.as_ref().expect("pause").vowel_length, 0.2);
    }

    #[test]
    fn pause_mora_becomes_silent_frames() {
        let mut query = voiced_query("ア'、ア'");
        query.pause_length = Some(0.32);
        let mut phrases = query.accent_phrases.clone();
        apply_pause_length(&mut phrases, &query);
        let frames = FrameFeatures::build(&phrases, &query).expect("frames");
        // pre 9, vowel 9, pause 30, vowel 9, post 9
        assert_eq!(frames.f0.len(), 66);
        assert_eq!(frames.f0[18..48].iter().filter(|&&f| f == 0.0).count(), 30);
        assert_eq!(frames.phoneme.len(), 66 * crate::core::phoneme::PHONEME_SIZE);
    }

    #[test]
    fn pitch_scale_shifts_by_octaves() {
        let mut query = voiced_query("ア'イ");
        query.pitch_scale = 1.0;
        let frames = FrameFeatures::build(&query.accent_phrases, &query).expect("frames");
        let f0 = voiced_f0(&frames);
        assert_eq!(f0.len(), 18);
        assert!((f0[0] - 10.0).abs() < 1e-4);
        assert!((f0[17] - 12.0).abs() < 1e-4);
    }

    #[test]
    fn intonation_scale_keeps_the_voiced_mean() {
        let mut query = voiced_query("ア'イ");
        query.intonation_scale = 2.0;
        let frames = FrameFeatures::build(&query.accent_phrases, &query).expect("frames");
        let f0 = voiced_f0(&frames);
        let mean = f0.iter().sum::<f32>() / f0.len() as f32;
        assert!((mean - 5.5).abs() < 1e-4);
        assert!((f0[0] - 4.5).abs() < 1e-4);
        assert!((f0[17] - 6.5).abs() < 1e-4);
    }

    #[test]
    fn oversized_or_non_finite_lengths_are_rejected() {
        let engine = engine();
        let mut query = voiced_query("ア'");
        query.accent_phrases[0].moras[0].vowel_length = 1.0e9;
        assert!(matches!(
            engine.synthesize(&query, 3, false),
            Err(EngineError::InvalidInput(_))
        ));

        query.accent_phrases[0].moras[0].vowel_length = f32::NAN;
        assert!(matches!(
            FrameFeatures::build(&query.accent_phrases, &query),
            Err(EngineError::InvalidInput(_))
        ));

        let mut query = voiced_query("ア'");
        query.speed_scale = 1.0e-6;
        assert!(matches!(
            engine.synthesize(&query, 3, false),
            Err(EngineError::InvalidInput(_))
        ));
    }
}

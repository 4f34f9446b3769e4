//! Request/response types shared by the front end, the synthesis engine and
//! the HTTP layer.
//!
//! The JSON layout matches the VOICEVOX engine API so existing clients can
//! talk to this server unchanged.

use serde::{Deserialize, Serialize};

/// A single mora: an optional consonant followed by a vowel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mora {
    /// Katakana text of the mora.
    pub text: String,
    #[serde(default)]
    pub consonant: Option<String>,
    /// Consonant length in seconds. Present exactly when `consonant` is.
    #[serde(default)]
    pub consonant_length: Option<f32>,
    /// Vowel phoneme. Upper-case vowels are unvoiced.
    pub vowel: String,
    /// Vowel length in seconds.
    pub vowel_length: f32,
    /// Log-F0. `0.0` marks an unvoiced mora.
    pub pitch: f32,
}

impl Mora {
    /// Build a mora with zeroed lengths and pitch.
    pub fn new(text: impl Into<String>, consonant: Option<&str>, vowel: &str) -> Self {
        Self {
            text: text.into(),
            consonant: consonant.map(str::to_string),
            consonant_length: consonant.map(|_| 0.0),
            vowel: vowel.to_string(),
            vowel_length: 0.0,
            pitch: 0.0,
        }
    }

    /// The silent mora inserted after a phrase that ends in a pause.
    pub fn pause() -> Self {
        Self::new("、", None, "pau")
    }
}

/// A run of moras sharing one accent nucleus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccentPhrase {
    pub moras: Vec<Mora>,
    /// 1-based position of the accent nucleus. A flat phrase has
    /// `accent == moras.len()`.
    pub accent: usize,
    #[serde(default)]
    pub pause_mora: Option<Mora>,
    #[serde(default)]
    pub is_interrogative: bool,
}

impl AccentPhrase {
    /// All moras including the trailing pause mora, in order.
    pub fn moras_with_pause(&self) -> impl Iterator<Item = &Mora> {
        self.moras.iter().chain(self.pause_mora.iter())
    }

    pub fn moras_with_pause_mut(&mut self) -> impl Iterator<Item = &mut Mora> {
        self.moras.iter_mut().chain(self.pause_mora.iter_mut())
    }
}

fn default_scale() -> f32 {
    1.0
}

fn default_phoneme_length() -> f32 {
    0.1
}

fn default_sampling_rate() -> u32 {
    crate::core::SAMPLE_RATE
}

/// Everything needed to render one utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioQuery {
    pub accent_phrases: Vec<AccentPhrase>,
    #[serde(rename = "speedScale", default = "default_scale")]
    pub speed_scale: f32,
    #[serde(rename = "pitchScale", default)]
    pub pitch_scale: f32,
    #[serde(rename = "intonationScale", default = "default_scale")]
    pub intonation_scale: f32,
    #[serde(rename = "volumeScale", default = "default_scale")]
    pub volume_scale: f32,
    #[serde(rename = "prePhonemeLength", default = "default_phoneme_length")]
    pub pre_phoneme_length: f32,
    #[serde(rename = "postPhonemeLength", default = "default_phoneme_length")]
    pub post_phoneme_length: f32,
    /// Overrides every pause mora length when set.
    #[serde(rename = "pauseLength", default)]
    pub pause_length: Option<f32>,
    #[serde(rename = "pauseLengthScale", default = "default_scale")]
    pub pause_length_scale: f32,
    #[serde(rename = "outputSamplingRate", default = "default_sampling_rate")]
    pub output_sampling_rate: u32,
    #[serde(rename = "outputStereo", default)]
    pub output_stereo: bool,
    #[serde(default)]
    pub kana: Option<String>,
}

impl AudioQuery {
    /// A query with default rendering parameters.
    pub fn new(accent_phrases: Vec<AccentPhrase>, kana: Option<String>) -> Self {
        Self {
            accent_phrases,
            speed_scale: 1.0,
            pitch_scale: 0.0,
            intonation_scale: 1.0,
            volume_scale: 1.0,
            pre_phoneme_length: 0.1,
            post_phoneme_length: 0.1,
            pause_length: None,
            pause_length_scale: 1.0,
            output_sampling_rate: default_sampling_rate(),
            output_stereo: false,
            kana,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Style {
    pub name: String,
    pub id: u32,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub style_type: Option<String>,
}

/// A character and the styles its voice model offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Speaker {
    pub name: String,
    pub speaker_uuid: String,
    pub styles: Vec<Style>,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleInfo {
    pub id: u32,
    /// Base64-encoded PNG.
    pub icon: String,
    #[serde(default)]
    pub portrait: Option<String>,
    #[serde(default)]
    pub voice_samples: Vec<String>,
}

/// Character resources returned by `/speaker_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerInfo {
    pub policy: String,
    pub portrait: String,
    pub style_infos: Vec<StyleInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SupportedDevices {
    pub cpu: bool,
    pub cuda: bool,
    pub dml: bool,
}

#[cfg(test)]
mod tests {
    use super::{AccentPhrase, AudioQuery, Mora};

    #[test]
    fn audio_query_uses_camel_case_scales() {
        let query = AudioQuery::new(vec![], None);
        let json = serde_json::to_value(&query).expect("serialize");
        assert_eq!(json["speedScale"], 1.0);
        assert_eq!(json["prePhonemeLength"], serde_json::json!(0.1f32));
        assert_eq!(json["outputSamplingRate"], 24000);
        assert!(json["pauseLength"].is_null());
    }

    #[test]
    fn audio_query_fills_missing_fields_with_defaults() {
        let query: AudioQuery =
            serde_json::from_str(r#"{"accent_phrases": []}"#).expect("deserialize");
        assert_eq!(query, AudioQuery::new(vec![], None));
    }

    #[test]
    fn mora_without_consonant_serializes_nulls() {
        let json = serde_json::to_value(Mora::new("ア", None, "a")).expect("serialize");
        assert!(json["consonant"].is_null());
        assert!(json["consonant_length"].is_null());
    }

    #[test]
    fn moras_with_pause_appends_pause_mora() {
        let phrase = AccentPhrase {
            moras: vec![Mora::new("カ", Some("k"), "a")],
            accent: 1,
            pause_mora: Some(Mora::pause()),
            is_interrogative: false,
        };
        let vowels: Vec<&str> = phrase.moras_with_pause().map(|m| m.vowel.as_str()).collect();
        assert_eq!(vowels, vec!["a", "pau"]);
    }
}

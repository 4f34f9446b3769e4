use std::collections::HashSet;
use std::f32::consts::PI;

use crate::model::{Speaker, Style, SupportedDevices};

use super::metas::MetaStore;
use super::phoneme::{is_unvoiced_mora, PHONEME_LIST};
use super::{Core, CoreError, IntonationInput, FRAME_SIZE, SAMPLE_RATE};

const MOCK_PITCH: f32 = 5.5;
const MOCK_AMPLITUDE: f32 = 0.3;

/// Deterministic core used by `--enable-mock` and the test suite.
///
/// Durations are 0.1 s per phoneme (0.2 s for `pau`), every voiced mora
/// gets the same pitch, and decoding renders a sine wave at `exp(f0)` Hz.
pub struct MockCore {
    metas: MetaStore,
    loaded: HashSet<u32>,
}

impl Default for MockCore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCore {
    pub fn new() -> Self {
        Self {
            metas: MetaStore::new(mock_speakers()),
            loaded: HashSet::new(),
        }
    }
}

fn mock_speakers() -> Vec<Speaker> {
    let style = |name: &str, id: u32| Style {
        name: name.to_string(),
        id,
        style_type: Some("talk".to_string()),
    };
    vec![
        Speaker {
            name: "四国めたん".to_string(),
            speaker_uuid: "7ffcb7ce-00ec-4bdc-82cd-45a8889e43ff".to_string(),
            styles: vec![style("ノーマル", 2), style("あまあま", 0)],
            version: "mock".to_string(),
        },
        Speaker {
            name: "ずんだもん".to_string(),
            speaker_uuid: "388f246b-8c41-4ac1-8e2d-5d79f3ff56d9".to_string(),
            styles: vec![style("ノーマル", 3), style("あまあま", 1)],
            version: "mock".to_string(),
        },
    ]
}

impl Core for MockCore {
    fn version(&self) -> String {
        "mock".to_string()
    }

    fn metas(&self) -> &MetaStore {
        &self.metas
    }

    fn supported_devices(&self) -> SupportedDevices {
        SupportedDevices {
            cpu: true,
            cuda: false,
            dml: false,
        }
    }

    fn load_model(&mut self, style_id: u32) -> Result<(), CoreError> {
        self.ensure_style(style_id)?;
        self.loaded.insert(style_id);
        Ok(())
    }

    fn is_model_loaded(&self, style_id: u32) -> bool {
        self.loaded.contains(&style_id)
    }

    fn predict_duration(
        &mut self,
        phonemes: &[i64],
        style_id: u32,
    ) -> Result<Vec<f32>, CoreError> {
        self.ensure_style(style_id)?;
        Ok(phonemes
            .iter()
            .map(|&id| if id == 0 { 0.2 } else { 0.1 })
            .collect())
    }

    fn predict_intonation(
        &mut self,
        input: &IntonationInput,
        style_id: u32,
    ) -> Result<Vec<f32>, CoreError> {
        self.ensure_style(style_id)?;
        Ok(input
            .vowel_phonemes
            .iter()
            .map(|&id| {
                let unvoiced = usize::try_from(id)
                    .ok()
                    .and_then(|i| PHONEME_LIST.get(i))
                    .map_or(true, |p| is_unvoiced_mora(p));
                if unvoiced {
                    0.0
                } else {
                    MOCK_PITCH
                }
            })
            .collect())
    }

    fn decode(
        &mut self,
        f0: &[f32],
        _phoneme: &[f32],
        style_id: u32,
    ) -> Result<Vec<f32>, CoreError> {
        self.ensure_style(style_id)?;
        let mut wave = Vec::with_capacity(f0.len() * FRAME_SIZE);
        let mut phase = 0.0f32;
        for &frame_f0 in f0 {
            if frame_f0 <= 0.0 {
                wave.resize(wave.len() + FRAME_SIZE, 0.0);
                phase = 0.0;
                continue;
            }
            let step = 2.0 * PI * frame_f0.exp() / SAMPLE_RATE as f32;
            for _ in 0..FRAME_SIZE {
                wave.push(MOCK_AMPLITUDE * phase.sin());
                phase = (phase + step) % (2.0 * PI);
            }
        }
        Ok(wave)
    }
}

#[cfg(test)]
mod tests {
    use super::MockCore;
    use crate::core::phoneme::phoneme_id;
    use crate::core::{Core, IntonationInput, FRAME_SIZE};

    #[test]
    fn unknown_style_is_rejected() {
        let mut core = MockCore::new();
        assert!(core.predict_duration(&[0], 999).is_err());
        assert!(core.load_model(999).is_err());
    }

    #[test]
    fn load_model_marks_style_loaded() {
        let mut core = MockCore::new();
        assert!(!core.is_model_loaded(3));
        core.load_model(3).expect("style 3 exists");
        assert!(core.is_model_loaded(3));
    }

    #[test]
    fn unvoiced_vowels_get_zero_pitch() {
        let mut core = MockCore::new();
        let ids = |ps: &[&str]| -> Vec<i64> {
            ps.iter().map(|p| phoneme_id(p).expect("known phoneme")).collect()
        };
        let input = IntonationInput {
            vowel_phonemes: ids(&["pau", "a", "I", "pau"]),
            ..Default::default()
        };
        let f0 = core.predict_intonation(&input, 3).expect("mock intonation");
        assert_eq!(f0[0], 0.0);
        assert!(f0[1] > 0.0);
        assert_eq!(f0[2], 0.0);
        assert_eq!(f0[3], 0.0);
    }

    #[test]
    fn decode_emits_one_frame_of_samples_per_f0() {
        let mut core = MockCore::new();
        let wave = core.decode(&[0.0, 5.5, 5.5], &[], 3).expect("mock decode");
        assert_eq!(wave.len(), 3 * FRAME_SIZE);
        assert!(wave[..FRAME_SIZE].iter().all(|&s| s == 0.0));
        assert!(wave[FRAME_SIZE..].iter().any(|&s| s != 0.0));
    }
}

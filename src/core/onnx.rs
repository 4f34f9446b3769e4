use std::path::{Path, PathBuf};

use ndarray::{arr0, Array1, Array2};
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

use crate::model::SupportedDevices;

use super::metas::MetaStore;
use super::phoneme::PHONEME_SIZE;
use super::{clamp_lengths, Core, CoreError, InitializeOptions, IntonationInput};

const DURATION_MODEL: &str = "predict_duration.onnx";
const INTONATION_MODEL: &str = "predict_intonation.onnx";
const DECODE_MODEL: &str = "decode.onnx";
const METAS_FILE: &str = "metas.json";

/// True when `model_dir` holds all three exported graphs.
pub fn has_model_set(model_dir: &Path) -> bool {
    [DURATION_MODEL, INTONATION_MODEL, DECODE_MODEL]
        .iter()
        .all(|name| model_dir.join(name).is_file())
}

/// Core that runs the exported acoustic models in-process.
pub struct OnnxCore {
    duration: Session,
    intonation: Session,
    decoder: Session,
    metas: MetaStore,
    version: String,
}

impl OnnxCore {
    /// Load the model set from `model_dir`.
    ///
    /// When `runtime_path` is given, ONNX Runtime is loaded from that file;
    /// otherwise the default library search applies (`ORT_DYLIB_PATH`, then
    /// the system loader).
    pub fn load(
        model_dir: &Path,
        runtime_path: Option<&Path>,
        options: &InitializeOptions,
    ) -> Result<Self, CoreError> {
        if let Some(path) = runtime_path {
            let _ = ort::init_from(path.to_string_lossy().to_string()).map_err(ort::Error::wrap)?
                .with_name("vox-engine")
                .commit();
            log::info!("Loaded ONNX Runtime from {}", path.display());
        }
        if options.use_gpu {
            log::warn!("GPU inference is not available for the ONNX core, running on CPU");
        }

        let metas = MetaStore::load(&model_dir.join(METAS_FILE))?;
        let threads = (options.cpu_num_threads > 0).then_some(options.cpu_num_threads);

        let duration = init_session(&model_dir.join(DURATION_MODEL), threads)?;
        let intonation = init_session(&model_dir.join(INTONATION_MODEL), threads)?;
        let decoder = init_session(&model_dir.join(DECODE_MODEL), threads)?;

        let version = std::fs::read_to_string(model_dir.join("VERSION"))
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Ok(Self {
            duration,
            intonation,
            decoder,
            metas,
            version,
        })
    }
}

impl Core for OnnxCore {
    fn version(&self) -> String {
        self.version.clone()
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

    // Every style shares the same three sessions, which are loaded up front.
    fn load_model(&mut self, style_id: u32) -> Result<(), CoreError> {
        self.ensure_style(style_id)
    }

    fn is_model_loaded(&self, style_id: u32) -> bool {
        self.metas.has_style(style_id)
    }

    fn predict_duration(
        &mut self,
        phonemes: &[i64],
        style_id: u32,
    ) -> Result<Vec<f32>, CoreError> {
        self.ensure_style(style_id)?;
        let phoneme_list = Array1::from_vec(phonemes.to_vec());
        let speaker_id = Array1::from_vec(vec![i64::from(style_id)]);
        let inputs = inputs![
            "phoneme_list" => TensorRef::from_array_view(phoneme_list.view())?,
            "speaker_id" => TensorRef::from_array_view(speaker_id.view())?,
        ];
        let output = self.duration.run(inputs)?;
        let (_, value) = output
            .iter()
            .next()
            .ok_or(CoreError::EmptyOutput("predict_duration"))?;
        let mut lengths: Vec<f32> = value.try_extract_array::<f32>()?.iter().copied().collect();
        clamp_lengths(&mut lengths);
        Ok(lengths)
    }

    fn predict_intonation(
        &mut self,
        input: &IntonationInput,
        style_id: u32,
    ) -> Result<Vec<f32>, CoreError> {
        self.ensure_style(style_id)?;
        let length = arr0(input.len() as i64);
        let list = |values: &[i64]| Array1::from_vec(values.to_vec());
        let vowels = list(&input.vowel_phonemes);
        let consonants = list(&input.consonant_phonemes);
        let start_accent = list(&input.start_accent);
        let end_accent = list(&input.end_accent);
        let start_phrase = list(&input.start_accent_phrase);
        let end_phrase = list(&input.end_accent_phrase);
        let speaker_id = Array1::from_vec(vec![i64::from(style_id)]);

        let inputs = inputs![
            "length" => TensorRef::from_array_view(length.view())?,
            "vowel_phoneme_list" => TensorRef::from_array_view(vowels.view())?,
            "consonant_phoneme_list" => TensorRef::from_array_view(consonants.view())?,
            "start_accent_list" => TensorRef::from_array_view(start_accent.view())?,
            "end_accent_list" => TensorRef::from_array_view(end_accent.view())?,
            "start_accent_phrase_list" => TensorRef::from_array_view(start_phrase.view())?,
            "end_accent_phrase_list" => TensorRef::from_array_view(end_phrase.view())?,
            "speaker_id" => TensorRef::from_array_view(speaker_id.view())?,
        ];
        let output = self.intonation.run(inputs)?;
        let (_, value) = output
            .iter()
            .next()
            .ok_or(CoreError::EmptyOutput("predict_intonation"))?;
        let f0 = value.try_extract_array::<f32>()?;
        Ok(f0.iter().copied().collect())
    }

    fn decode(
        &mut self,
        f0: &[f32],
        phoneme: &[f32],
        style_id: u32,
    ) -> Result<Vec<f32>, CoreError> {
        self.ensure_style(style_id)?;
        let frames = f0.len();
        let f0 = Array2::from_shape_vec((frames, 1), f0.to_vec())?;
        let phoneme = Array2::from_shape_vec((frames, PHONEME_SIZE), phoneme.to_vec())?;
        let speaker_id = Array1::from_vec(vec![i64::from(style_id)]);

        let inputs = inputs![
            "f0" => TensorRef::from_array_view(f0.view())?,
            "phoneme" => TensorRef::from_array_view(phoneme.view())?,
            "speaker_id" => TensorRef::from_array_view(speaker_id.view())?,
        ];
        let output = self.decoder.run(inputs)?;
        let (_, value) = output.iter().next().ok_or(CoreError::EmptyOutput("decode"))?;
        let wave = value.try_extract_array::<f32>()?;
        Ok(wave.iter().copied().collect())
    }
}

fn init_session(onnx_path: &Path, num_threads: Option<usize>) -> Result<Session, CoreError> {
    if !onnx_path.is_file() {
        return Err(CoreError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Model not found at {}", onnx_path.display()),
        )));
    }
    log::info!("Loading {}", onnx_path.display());

    let mut builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(ort::Error::from)?;
    if let Some(threads) = num_threads {
        builder = builder.with_intra_threads(threads).map_err(ort::Error::from)?;
    }
    Ok(builder.commit_from_file(PathBuf::from(onnx_path))?)
}

#[cfg(test)]
mod tests {
    use super::{has_model_set, OnnxCore, DECODE_MODEL, DURATION_MODEL, INTONATION_MODEL};
    use crate::core::InitializeOptions;

    #[test]
    fn model_set_requires_all_three_graphs() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(!has_model_set(dir.path()));

        std::fs::write(dir.path().join(DURATION_MODEL), b"").expect("write");
        std::fs::write(dir.path().join(INTONATION_MODEL), b"").expect("write");
        assert!(!has_model_set(dir.path()));

        std::fs::write(dir.path().join(DECODE_MODEL), b"").expect("write");
        assert!(has_model_set(dir.path()));
    }

    #[test]
    fn missing_metas_fails_before_touching_the_runtime() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = OnnxCore::load(dir.path(), None, &InitializeOptions::default());
        assert!(result.is_err());
    }
}

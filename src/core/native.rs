use std::ffi::{c_char, c_int, CStr};
use std::path::{Path, PathBuf};

use libloading::Library;

use crate::model::SupportedDevices;

use super::metas::MetaStore;
use super::phoneme::PHONEME_SIZE;
use super::{Core, CoreError, InitializeOptions, IntonationInput, FRAME_SIZE};

type InitializeFn = unsafe extern "C" fn(use_gpu: bool, cpu_num_threads: c_int, load_all_models: bool) -> bool;
type FinalizeFn = unsafe extern "C" fn();
type JsonFn = unsafe extern "C" fn() -> *const c_char;
type ModelFn = unsafe extern "C" fn(speaker_id: i64) -> bool;
type YukarinSFn = unsafe extern "C" fn(
    length: i64,
    phoneme_list: *mut i64,
    speaker_id: *mut i64,
    output: *mut f32,
) -> bool;
type YukarinSaFn = unsafe extern "C" fn(
    length: i64,
    vowel_phoneme_list: *mut i64,
    consonant_phoneme_list: *mut i64,
    start_accent_list: *mut i64,
    end_accent_list: *mut i64,
    start_accent_phrase_list: *mut i64,
    end_accent_phrase_list: *mut i64,
    speaker_id: *mut i64,
    output: *mut f32,
) -> bool;
type DecodeFn = unsafe extern "C" fn(
    length: i64,
    phoneme_size: i64,
    f0: *mut f32,
    phoneme: *mut f32,
    speaker_id: *mut i64,
    output: *mut f32,
) -> bool;

/// Resolved entry points of the core library.
struct Api {
    finalize: FinalizeFn,
    metas: JsonFn,
    supported_devices: JsonFn,
    last_error_message: JsonFn,
    load_model: ModelFn,
    is_model_loaded: ModelFn,
    yukarin_s_forward: YukarinSFn,
    yukarin_sa_forward: YukarinSaFn,
    decode_forward: DecodeFn,
}

/// Core backed by a precompiled shared library with the classic C ABI.
///
/// The ONNX Runtime library is opened first with global symbol visibility so
/// the core resolves it from the already-loaded image instead of searching
/// the library path.
pub struct NativeCore {
    api: Api,
    metas: MetaStore,
    devices: SupportedDevices,
    version: String,
    // Field order matters: the core must unload before the runtime it links.
    _core: Library,
    _onnxruntime: Option<Library>,
}

impl NativeCore {
    /// Open `voicelib_path`, optionally preloading `runtime_path`, and run
    /// the core's `initialize`.
    pub fn load(
        voicelib_path: &Path,
        runtime_path: Option<&Path>,
        options: &InitializeOptions,
    ) -> Result<Self, CoreError> {
        let onnxruntime = runtime_path.map(open_global).transpose()?;
        if let Some(path) = runtime_path {
            log::info!("Loaded ONNX Runtime from {}", path.display());
        }

        // SAFETY: loading a library runs its initializers; the core is a
        // trusted artifact shipped alongside the engine.
        let core = unsafe { Library::new(voicelib_path) }.map_err(|source| CoreError::Library {
            path: voicelib_path.to_path_buf(),
            source,
        })?;

        let api = unsafe { resolve_api(&core, voicelib_path)? };
        let initialize: InitializeFn = unsafe { symbol(&core, voicelib_path, b"initialize\0")? };

        let threads = c_int::try_from(options.cpu_num_threads).unwrap_or(0);
        // SAFETY: plain value arguments; the core reports failure through its return value.
        if !unsafe { initialize(options.use_gpu, threads, options.load_all_models) } {
            return Err(CoreError::Native {
                call: "initialize",
                message: unsafe { last_error(&api) },
            });
        }

        let metas = MetaStore::from_json(&unsafe { read_json(api.metas, "metas")? })?;
        let devices_json = unsafe { read_json(api.supported_devices, "supported_devices")? };
        let devices: SupportedDevices = serde_json::from_str(&devices_json)
            .map_err(|e| CoreError::Metas(format!("supported_devices: {e}")))?;

        let version = read_version_file(voicelib_path);
        log::info!(
            "Native core {} initialized (gpu={}, threads={}, styles={})",
            version,
            options.use_gpu,
            options.cpu_num_threads,
            metas.style_ids().len()
        );

        Ok(Self {
            api,
            metas,
            devices,
            version,
            _core: core,
            _onnxruntime: onnxruntime,
        })
    }

    fn check(&self, ok: bool, call: &'static str) -> Result<(), CoreError> {
        if ok {
            Ok(())
        } else {
            Err(CoreError::Native {
                call,
                message: unsafe { last_error(&self.api) },
            })
        }
    }
}

impl Drop for NativeCore {
    fn drop(&mut self) {
        // SAFETY: `initialize` succeeded in `load`, and the library is still mapped.
        unsafe { (self.api.finalize)() };
    }
}

impl Core for NativeCore {
    fn version(&self) -> String {
        self.version.clone()
    }

    fn metas(&self) -> &MetaStore {
        &self.metas
    }

    fn supported_devices(&self) -> SupportedDevices {
        self.devices
    }

    fn load_model(&mut self, style_id: u32) -> Result<(), CoreError> {
        self.ensure_style(style_id)?;
        let ok = unsafe { (self.api.load_model)(i64::from(style_id)) };
        self.check(ok, "load_model")
    }

    fn is_model_loaded(&self, style_id: u32) -> bool {
        unsafe { (self.api.is_model_loaded)(i64::from(style_id)) }
    }

    fn predict_duration(
        &mut self,
        phonemes: &[i64],
        style_id: u32,
    ) -> Result<Vec<f32>, CoreError> {
        self.ensure_style(style_id)?;
        let mut phoneme_list = phonemes.to_vec();
        let mut speaker_id = i64::from(style_id);
        let mut output = vec![0.0f32; phonemes.len()];
        // SAFETY: every buffer holds `length` elements and outlives the call.
        let ok = unsafe {
            (self.api.yukarin_s_forward)(
                phonemes.len() as i64,
                phoneme_list.as_mut_ptr(),
                &mut speaker_id,
                output.as_mut_ptr(),
            )
        };
        self.check(ok, "yukarin_s_forward")?;
        Ok(output)
    }

    fn predict_intonation(
        &mut self,
        input: &IntonationInput,
        style_id: u32,
    ) -> Result<Vec<f32>, CoreError> {
        self.ensure_style(style_id)?;
        let length = input.len();
        let mut vowels = input.vowel_phonemes.clone();
        let mut consonants = input.consonant_phonemes.clone();
        let mut start_accent = input.start_accent.clone();
        let mut end_accent = input.end_accent.clone();
        let mut start_phrase = input.start_accent_phrase.clone();
        let mut end_phrase = input.end_accent_phrase.clone();
        let mut speaker_id = i64::from(style_id);
        let mut output = vec![0.0f32; length];
        // SAFETY: all lists share `length`, checked by the engine when it builds them.
        let ok = unsafe {
            (self.api.yukarin_sa_forward)(
                length as i64,
                vowels.as_mut_ptr(),
                consonants.as_mut_ptr(),
                start_accent.as_mut_ptr(),
                end_accent.as_mut_ptr(),
                start_phrase.as_mut_ptr(),
                end_phrase.as_mut_ptr(),
                &mut speaker_id,
                output.as_mut_ptr(),
            )
        };
        self.check(ok, "yukarin_sa_forward")?;
        Ok(output)
    }

    fn decode(
        &mut self,
        f0: &[f32],
        phoneme: &[f32],
        style_id: u32,
    ) -> Result<Vec<f32>, CoreError> {
        self.ensure_style(style_id)?;
        let frames = f0.len();
        let mut f0 = f0.to_vec();
        let mut phoneme = phoneme.to_vec();
        let mut speaker_id = i64::from(style_id);
        let mut output = vec![0.0f32; frames * FRAME_SIZE];
        // SAFETY: `phoneme` is `frames * PHONEME_SIZE` long, `output` `frames * FRAME_SIZE`.
        let ok = unsafe {
            (self.api.decode_forward)(
                frames as i64,
                PHONEME_SIZE as i64,
                f0.as_mut_ptr(),
                phoneme.as_mut_ptr(),
                &mut speaker_id,
                output.as_mut_ptr(),
            )
        };
        self.check(ok, "decode_forward")?;
        Ok(output)
    }
}

#[cfg(unix)]
fn open_global(path: &Path) -> Result<Library, CoreError> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_GLOBAL, RTLD_NOW};

    // SAFETY: see `NativeCore::load`.
    unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_GLOBAL) }
        .map(Library::from)
        .map_err(|source| CoreError::Library {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(not(unix))]
fn open_global(path: &Path) -> Result<Library, CoreError> {
    unsafe { Library::new(path) }.map_err(|source| CoreError::Library {
        path: path.to_path_buf(),
        source,
    })
}

/// Copy a function pointer out of `lib`.
///
/// # Safety
/// `T` must match the symbol's real signature. The pointer is only valid
/// while `lib` stays loaded.
unsafe fn symbol<T: Copy>(lib: &Library, path: &Path, name: &[u8]) -> Result<T, CoreError> {
    lib.get::<T>(name)
        .map(|sym| *sym)
        .map_err(|source| CoreError::Library {
            path: path.to_path_buf(),
            source,
        })
}

unsafe fn resolve_api(lib: &Library, path: &Path) -> Result<Api, CoreError> {
    Ok(Api {
        finalize: symbol(lib, path, b"finalize\0")?,
        metas: symbol(lib, path, b"metas\0")?,
        supported_devices: symbol(lib, path, b"supported_devices\0")?,
        last_error_message: symbol(lib, path, b"last_error_message\0")?,
        load_model: symbol(lib, path, b"load_model\0")?,
        is_model_loaded: symbol(lib, path, b"is_model_loaded\0")?,
        yukarin_s_forward: symbol(lib, path, b"yukarin_s_forward\0")?,
        yukarin_sa_forward: symbol(lib, path, b"yukarin_sa_forward\0")?,
        decode_forward: symbol(lib, path, b"decode_forward\0")?,
    })
}

/// Read a core-owned, NUL-terminated JSON string. The core keeps ownership.
unsafe fn read_json(f: JsonFn, call: &'static str) -> Result<String, CoreError> {
    let ptr = f();
    if ptr.is_null() {
        return Err(CoreError::Native {
            call,
            message: "returned null".to_string(),
        });
    }
    Ok(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

unsafe fn last_error(api: &Api) -> String {
    let ptr = (api.last_error_message)();
    if ptr.is_null() {
        return "unknown error".to_string();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

/// Core releases ship a `VERSION` file next to the library.
fn read_version_file(voicelib_path: &Path) -> String {
    let version_path: PathBuf = voicelib_path
        .parent()
        .map(|dir| dir.join("VERSION"))
        .unwrap_or_else(|| PathBuf::from("VERSION"));
    std::fs::read_to_string(&version_path)
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::{read_version_file, NativeCore};
    use crate::core::{CoreError, InitializeOptions};

    #[test]
    fn missing_library_is_a_library_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("libcore_missing.so");
        let result = NativeCore::load(&missing, None, &InitializeOptions::default());
        assert!(matches!(result, Err(CoreError::Library { .. })));
    }

    #[test]
    fn version_file_is_read_and_trimmed() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("VERSION"), "0.15.0\n").expect("write VERSION");
        assert_eq!(read_version_file(&dir.path().join("libcore.so")), "0.15.0");
    }

    #[test]
    fn missing_version_file_reports_unknown() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(read_version_file(&dir.path().join("libcore.so")), "unknown");
    }
}

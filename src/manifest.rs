//! Engine manifest served at `/engine_manifest`.
//!
//! `engine_manifest.json` names its icon, terms, update notes and license
//! list by path relative to the manifest. They are read once at startup and
//! inlined so the endpoint never touches the disk.

use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::core::{FRAME_RATE, SAMPLE_RATE};

pub const MANIFEST_FILE: &str = "engine_manifest.json";

#[derive(thiserror::Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid manifest file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateInfo {
    pub version: String,
    pub descriptions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contributors: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LicenseInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub license: Option<String>,
    pub text: String,
}

/// Which editing controls a client may offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportedFeatures {
    pub adjust_mora_pitch: bool,
    pub adjust_phoneme_length: bool,
    pub adjust_speed_scale: bool,
    pub adjust_pitch_scale: bool,
    pub adjust_intonation_scale: bool,
    pub adjust_volume_scale: bool,
    #[serde(default)]
    pub adjust_pause_length: bool,
    pub interrogative_upspeak: bool,
    #[serde(default)]
    pub synthesis_morphing: bool,
    #[serde(default)]
    pub sing: bool,
    #[serde(default)]
    pub manage_library: bool,
}

impl Default for SupportedFeatures {
    fn default() -> Self {
        Self {
            adjust_mora_pitch: true,
            adjust_phoneme_length: true,
            adjust_speed_scale: true,
            adjust_pitch_scale: true,
            adjust_intonation_scale: true,
            adjust_volume_scale: true,
            adjust_pause_length: true,
            interrogative_upspeak: true,
            synthesis_morphing: false,
            sing: false,
            manage_library: false,
        }
    }
}

/// Manifest as written on disk.
#[derive(Debug, Deserialize)]
struct RawManifest {
    manifest_version: String,
    name: String,
    brand_name: String,
    uuid: String,
    url: String,
    icon: PathBuf,
    default_sampling_rate: u32,
    frame_rate: f32,
    terms_of_service: PathBuf,
    update_infos: PathBuf,
    dependency_licenses: PathBuf,
    #[serde(default)]
    supported_features: SupportedFeatures,
}

/// Manifest with every referenced file inlined.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineManifest {
    pub manifest_version: String,
    pub name: String,
    pub brand_name: String,
    pub uuid: String,
    pub url: String,
    /// Base64 PNG.
    pub icon: String,
    pub default_sampling_rate: u32,
    pub frame_rate: f32,
    pub terms_of_service: String,
    pub update_infos: Vec<UpdateInfo>,
    pub dependency_licenses: Vec<LicenseInfo>,
    pub supported_features: SupportedFeatures,
}

impl Default for EngineManifest {
    fn default() -> Self {
        Self {
            manifest_version: "0.13.1".to_string(),
            name: "VOX ENGINE".to_string(),
            brand_name: "VOX".to_string(),
            uuid: "6e1b4c4e-9b0a-4d3c-8f52-7a0f3c2d5e11".to_string(),
            url: "http://127.0.0.1:50021".to_string(),
            icon: String::new(),
            default_sampling_rate: SAMPLE_RATE,
            frame_rate: FRAME_RATE,
            terms_of_service: String::new(),
            update_infos: vec![UpdateInfo {
                version: env!("CARGO_PKG_VERSION").to_string(),
                descriptions: vec!["Initial release".to_string()],
                contributors: None,
            }],
            dependency_licenses: Vec::new(),
            supported_features: SupportedFeatures::default(),
        }
    }
}

impl EngineManifest {
    /// Load `engine_manifest.json` from `resource_dir`, or fall back to the
    /// built-in manifest when the file does not exist.
    pub fn load_or_default(resource_dir: &Path) -> Result<Self, ManifestError> {
        let path = resource_dir.join(MANIFEST_FILE);
        if !path.is_file() {
            log::warn!("{} not found; serving the built-in manifest", path.display());
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let raw: RawManifest = read_json(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));

        let icon = read_bytes(&base.join(&raw.icon))?;
        let terms_of_service = read_text(&base.join(&raw.terms_of_service))?;
        let update_infos = read_json(&base.join(&raw.update_infos))?;
        let dependency_licenses = read_json(&base.join(&raw.dependency_licenses))?;

        Ok(Self {
            manifest_version: raw.manifest_version,
            name: raw.name,
            brand_name: raw.brand_name,
            uuid: raw.uuid,
            url: raw.url,
            icon: STANDARD.encode(icon),
            default_sampling_rate: raw.default_sampling_rate,
            frame_rate: raw.frame_rate,
            terms_of_service,
            update_infos,
            dependency_licenses,
            supported_features: raw.supported_features,
        })
    }
}

fn read_bytes(path: &Path) -> Result<Vec<u8>, ManifestError> {
    fs::read(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_text(path: &Path) -> Result<String, ManifestError> {
    fs::read_to_string(path).map_err(|source| ManifestError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ManifestError> {
    let text = read_text(path)?;
    serde_json::from_str(&text).map_err(|source| ManifestError::Json {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_resources(dir: &Path) {
        fs::write(
            dir.join(MANIFEST_FILE),
            r#"{
                "manifest_version": "0.13.1",
                "name": "TEST ENGINE",
                "brand_name": "TEST",
                "uuid": "00000000-0000-0000-0000-000000000000",
                "url": "https://example.invalid",
                "icon": "icon.png",
                "default_sampling_rate": 24000,
                "frame_rate": 93.75,
                "terms_of_service": "terms.md",
                "update_infos": "updates.json",
                "dependency_licenses": "licenses.json"
            }"#,
        )
        .expect("manifest");
        fs::write(dir.join("icon.png"), [0x89, b'P', b'N', b'G']).expect("icon");
        fs::write(dir.join("terms.md"), "be nice").expect("terms");
        fs::write(
            dir.join("updates.json"),
            r#"[{"version": "0.1.0", "descriptions": ["first"]}]"#,
        )
        .expect("updates");
        fs::write(
            dir.join("licenses.json"),
            r#"[{"name": "hound", "version": "3.5", "license": "Apache-2.0", "text": "..."}]"#,
        )
        .expect("licenses");
    }

    #[test]
    fn inlines_referenced_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_resources(dir.path());

        let manifest = EngineManifest::load_or_default(dir.path()).expect("manifest");
        assert_eq!(manifest.name, "TEST ENGINE");
        assert_eq!(manifest.icon, STANDARD.encode([0x89, b'P', b'N', b'G']));
        assert_eq!(manifest.terms_of_service, "be nice");
        assert_eq!(manifest.update_infos[0].descriptions, vec!["first"]);
        assert_eq!(manifest.dependency_licenses[0].name, "hound");
        assert!(manifest.supported_features.adjust_mora_pitch);
    }

    #[test]
    fn missing_manifest_uses_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let manifest = EngineManifest::load_or_default(dir.path()).expect("manifest");
        assert_eq!(manifest, EngineManifest::default());
        assert_eq!(manifest.default_sampling_rate, 24000);
    }

    #[test]
    fn missing_referenced_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_resources(dir.path());
        fs::remove_file(dir.path().join("terms.md")).expect("remove");
        assert!(matches!(
            EngineManifest::load_or_default(dir.path()),
            Err(ManifestError::Io { .. })
        ));
    }
}

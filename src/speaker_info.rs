//! Character resources for `/speaker_info`.
//!
//! ```text
//! resources/character_info/<speaker_uuid>/
//! ├── policy.md
//! ├── portrait.png
//! ├── icons/<style_id>.png
//! ├── portraits/<style_id>.png      # optional
//! └── voice_samples/<style_id>_001.wav ...
//! ```

use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::{EngineError, Result};
use crate::model::{Speaker, SpeakerInfo, StyleInfo};

pub const CHARACTER_INFO_DIR: &str = "character_info";

/// Read policy, portraits, icons and voice samples for `speaker`.
pub fn load_speaker_info(resource_dir: &Path, speaker: &Speaker) -> Result<SpeakerInfo> {
    let dir = resource_dir
        .join(CHARACTER_INFO_DIR)
        .join(&speaker.speaker_uuid);
    if !dir.is_dir() {
        return Err(EngineError::NotFound(format!(
            "No character info for speaker {}",
            speaker.speaker_uuid
        )));
    }

    let policy = fs::read_to_string(dir.join("policy.md"))?;
    let portrait = encode_file(&dir.join("portrait.png"))?;

    let mut style_infos = Vec::with_capacity(speaker.styles.len());
    for style in &speaker.styles {
        let icon = encode_file(&dir.join("icons").join(format!("{}.png", style.id)))?;
        let portrait_path = dir.join("portraits").join(format!("{}.png", style.id));
        let portrait = if portrait_path.is_file() {
            Some(encode_file(&portrait_path)?)
        } else {
            None
        };
        style_infos.push(StyleInfo {
            id: style.id,
            icon,
            portrait,
            voice_samples: voice_samples(&dir.join("voice_samples"), style.id)?,
        });
    }

    Ok(SpeakerInfo {
        policy,
        portrait,
        style_infos,
    })
}

fn encode_file(path: &Path) -> Result<String> {
    Ok(STANDARD.encode(fs::read(path)?))
}

fn voice_samples(dir: &Path, style_id: u32) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let prefix = format!("{style_id}_");
    let mut paths: Vec<_> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(&prefix) && name.ends_with(".wav"))
        })
        .collect();
    paths.sort();
    paths.iter().map(|path| encode_file(path)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Style;

    fn speaker() -> Speaker {
        Speaker {
            name: "test".to_string(),
            speaker_uuid: "uuid-1".to_string(),
            styles: vec![Style {
                name: "normal".to_string(),
                id: 3,
                style_type: None,
            }],
            version: "1".to_string(),
        }
    }

    #[test]
    fn reads_character_resources() {
        let root = tempfile::tempdir().expect("tempdir");
        let dir = root.path().join(CHARACTER_INFO_DIR).join("uuid-1");
        fs::create_dir_all(dir.join("icons")).expect("icons");
        fs::create_dir_all(dir.join("voice_samples")).expect("samples");
        fs::write(dir.join("policy.md"), "policy").expect("policy");
        fs::write(dir.join("portrait.png"), b"P").expect("portrait");
        fs::write(dir.join("icons/3.png"), b"I").expect("icon");
        fs::write(dir.join("voice_samples/3_002.wav"), b"B").expect("sample");
        fs::write(dir.join("voice_samples/3_001.wav"), b"A").expect("sample");
        fs::write(dir.join("voice_samples/30_001.wav"), b"X").expect("sample");

        let info = load_speaker_info(root.path(), &speaker()).expect("info");
        assert_eq!(info.policy, "policy");
        assert_eq!(info.portrait, STANDARD.encode(b"P"));
        let style = &info.style_infos[0];
        assert_eq!(style.icon, STANDARD.encode(b"I"));
        assert_eq!(style.portrait, None);
        assert_eq!(
            style.voice_samples,
            vec![STANDARD.encode(b"A"), STANDARD.encode(b"B")]
        );
    }

    #[test]
    fn missing_directory_is_not_found() {
        let root = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            load_speaker_info(root.path(), &speaker()),
            Err(EngineError::NotFound(_))
        ));
    }
}

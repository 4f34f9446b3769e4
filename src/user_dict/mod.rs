//! Persistent user dictionary.
//!
//! Words live in `user_dict.json` in save format (lexicon cost instead of
//! priority). After every change the default dictionary and the user words
//! are compiled into one [`Lexicon`] and swapped into the text front end.

pub mod word;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::frontend::{Lexicon, LexiconError, TextAnalyzer};

pub use word::{
    create_word, PartOfSpeechDetail, SaveFormatUserDictWord, UserDictWord, WordProperty, WordType,
};

/// File name of the user dictionary inside the data dir.
pub const USER_DICT_FILE: &str = "user_dict.json";

/// File name of the default dictionary inside the resource dir.
pub const DEFAULT_DICT_FILE: &str = "default.csv";

#[derive(thiserror::Error, Debug)]
pub enum UserDictError {
    #[error("UUIDに該当するワードが見つかりませんでした: {0}")]
    WordNotFound(Uuid),
    #[error("{0}")]
    InvalidWord(String),
    #[error("対応していない品詞です (context_id {0})")]
    UnsupportedPartOfSpeech(i32),
    #[error("Invalid word id {0:?}")]
    InvalidUuid(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid user dictionary file: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Lexicon(#[from] LexiconError),
}

pub type UserDict = BTreeMap<Uuid, UserDictWord>;

/// User words plus the front end they are applied to.
pub struct UserDictionary {
    dict_path: PathBuf,
    default_dict_path: PathBuf,
    analyzer: Arc<TextAnalyzer>,
    lock: Mutex<()>,
}

impl UserDictionary {
    pub fn new(data_dir: &Path, resource_dir: &Path, analyzer: Arc<TextAnalyzer>) -> Self {
        Self {
            dict_path: data_dir.join(USER_DICT_FILE),
            default_dict_path: resource_dir.join(DEFAULT_DICT_FILE),
            analyzer,
            lock: Mutex::new(()),
        }
    }

    pub fn dict_path(&self) -> &Path {
        &self.dict_path
    }

    /// All registered words. A missing file is an empty dictionary.
    pub fn read_dict(&self) -> Result<UserDict, UserDictError> {
        let _guard = self.lock.lock();
        self.read_unlocked()
    }

    pub fn apply_word(&self, property: WordProperty) -> Result<Uuid, UserDictError> {
        let word = create_word(property)?;
        let _guard = self.lock.lock();
        let mut dict = self.read_unlocked()?;
        let id = Uuid::new_v4();
        dict.insert(id, word);
        self.commit_unlocked(&dict)?;
        log::info!("Added user dictionary word {id}");
        Ok(id)
    }

    pub fn rewrite_word(&self, id: Uuid, property: WordProperty) -> Result<(), UserDictError> {
        let word = create_word(property)?;
        let _guard = self.lock.lock();
        let mut dict = self.read_unlocked()?;
        match dict.get_mut(&id) {
            Some(slot) => *slot = word,
            None => return Err(UserDictError::WordNotFound(id)),
        }
        self.commit_unlocked(&dict)
    }

    pub fn delete_word(&self, id: Uuid) -> Result<(), UserDictError> {
        let _guard = self.lock.lock();
        let mut dict = self.read_unlocked()?;
        if dict.remove(&id).is_none() {
            return Err(UserDictError::WordNotFound(id));
        }
        self.commit_unlocked(&dict)
    }

    /// Merge a dictionary keyed by uuid strings into the stored one.
    ///
    /// With `override_existing` imported words replace stored words sharing
    /// an id; otherwise stored words win.
    pub fn import_user_dict(
        &self,
        words: BTreeMap<String, UserDictWord>,
        override_existing: bool,
    ) -> Result<(), UserDictError> {
        let mut imported = UserDict::new();
        for (key, word) in words {
            let id = Uuid::parse_str(&key).map_err(|_| UserDictError::InvalidUuid(key))?;
            let word = word.validated()?;
            word.check_part_of_speech()?;
            imported.insert(id, word);
        }

        let _guard = self.lock.lock();
        let existing = self.read_unlocked()?;
        let count = imported.len();
        let merged = if override_existing {
            let mut merged = existing;
            merged.extend(imported);
            merged
        } else {
            imported.extend(existing);
            imported
        };
        self.commit_unlocked(&merged)?;
        log::info!("Imported {count} user dictionary words");
        Ok(())
    }

    /// Recompile the front end lexicon from the default and user dictionaries.
    pub fn update_dict(&self) -> Result<(), UserDictError> {
        let _guard = self.lock.lock();
        let dict = self.read_unlocked()?;
        if let Some(lexicon) = self.compile_unlocked(&dict)? {
            self.analyzer.apply_lexicon(lexicon);
        }
        Ok(())
    }

    fn read_unlocked(&self) -> Result<UserDict, UserDictError> {
        let content = match fs::read_to_string(&self.dict_path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(UserDict::new()),
            Err(e) => return Err(e.into()),
        };
        let saved: BTreeMap<Uuid, SaveFormatUserDictWord> = serde_json::from_str(&content)?;
        saved
            .into_iter()
            .map(|(id, word)| Ok((id, word.into_word()?)))
            .collect()
    }

    fn write_unlocked(&self, dict: &UserDict) -> Result<(), UserDictError> {
        let saved = dict
            .iter()
            .map(|(id, word)| Ok((*id, word.to_save_format()?)))
            .collect::<Result<BTreeMap<_, _>, UserDictError>>()?;
        if let Some(parent) = self.dict_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.dict_path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(&saved)?)?;
        fs::rename(&tmp, &self.dict_path)?;
        Ok(())
    }

    /// Compile first so a dictionary the lexicon rejects never reaches disk.
    fn commit_unlocked(&self, dict: &UserDict) -> Result<(), UserDictError> {
        let lexicon = self.compile_unlocked(dict)?;
        self.write_unlocked(dict)?;
        if let Some(lexicon) = lexicon {
            self.analyzer.apply_lexicon(lexicon);
        }
        Ok(())
    }

    fn compile_unlocked(&self, dict: &UserDict) -> Result<Option<Lexicon>, UserDictError> {
        if !self.default_dict_path.is_file() {
            log::warn!(
                "Default dictionary {} not found; user words are not applied",
                self.default_dict_path.display()
            );
            return Ok(None);
        }
        let mut lexicon = Lexicon::load(&self.default_dict_path)?;
        let rows = dict
            .values()
            .map(UserDictWord::to_csv_row)
            .collect::<Result<Vec<_>, _>>()?;
        lexicon.extend_from_csv(&rows.join("\n"))?;
        Ok(Some(lexicon))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_CSV: &str = "天気,1345,1345,3000,名詞,一般,*,*,*,*,天気,テンキ,テンキ,1/3,C1\n";

    fn property(surface: &str, pronunciation: &str, accent_type: usize) -> WordProperty {
        WordProperty {
            surface: surface.to_string(),
            pronunciation: pronunciation.to_string(),
            accent_type,
            word_type: None,
            priority: None,
        }
    }

    fn setup(with_default: bool) -> (tempfile::TempDir, Arc<TextAnalyzer>, UserDictionary) {
        let dir = tempfile::tempdir().expect("tempdir");
        let resources = dir.path().join("resources");
        fs::create_dir_all(&resources).expect("resource dir");
        if with_default {
            fs::write(resources.join(DEFAULT_DICT_FILE), DEFAULT_CSV).expect("default dict");
        }
        let analyzer = Arc::new(TextAnalyzer::default());
        let dict = UserDictionary::new(&dir.path().join("data"), &resources, Arc::clone(&analyzer));
        (dir, analyzer, dict)
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let (_dir, _analyzer, dict) = setup(true);
        assert!(dict.read_dict().expect("read").is_empty());
    }

    #[test]
    fn apply_word_persists_and_updates_front_end() {
        let (_dir, analyzer, dict) = setup(true);
        let id = dict.apply_word(property("ヴォックス", "ボックス", 1)).expect("apply");

        let words = dict.read_dict().expect("read");
        assert_eq!(words[&id].pronunciation, "ボックス");
        assert_eq!(words[&id].priority, 5);

        let lexicon = analyzer.lexicon();
        assert!(lexicon.get("ヴォックス").is_some());
        assert!(lexicon.get("天気").is_some());

        let saved = fs::read_to_string(dict.dict_path()).expect("saved file");
        assert!(saved.contains("\"cost\":8609"));
        assert!(!saved.contains("priority"));
    }

    #[test]
    fn registered_latin_word_is_read_from_half_and_full_width_text() {
        let (_dir, analyzer, dict) = setup(true);
        let mut word = property("vox", "ボックス", 1);
        word.priority = Some(10);
        dict.apply_word(word).expect("apply");

        for text in ["vox", "ｖｏｘ"] {
            let phrases = analyzer.analyze(text);
            assert_eq!(phrases.len(), 1, "{text}");
            let reading: String = phrases[0].moras.iter().map(|m| m.text.as_str()).collect();
            assert_eq!(reading, "ボックス", "{text}");
        }
    }

    #[test]
    fn rewrite_and_delete_require_known_ids() {
        let (_dir, _analyzer, dict) = setup(true);
        let unknown = Uuid::new_v4();
        assert!(matches!(
            dict.rewrite_word(unknown, property("a", "エー", 1)),
            Err(UserDictError::WordNotFound(id)) if id == unknown
        ));
        assert!(matches!(dict.delete_word(unknown), Err(UserDictError::WordNotFound(_))));

        let id = dict.apply_word(property("a", "エー", 1)).expect("apply");
        dict.rewrite_word(id, property("b", "ビー", 1)).expect("rewrite");
        assert_eq!(dict.read_dict().expect("read")[&id].surface, "ｂ");
        dict.delete_word(id).expect("delete");
        assert!(dict.read_dict().expect("read").is_empty());
    }

    #[test]
    fn invalid_words_are_rejected_before_writing() {
        let (_dir, _analyzer, dict) = setup(true);
        assert!(matches!(
            dict.apply_word(property("a", "えー", 0)),
            Err(UserDictError::InvalidWord(_))
        ));
        assert!(!dict.dict_path().exists());
    }

    #[test]
    fn import_respects_override_flag() {
        let (_dir, _analyzer, dict) = setup(true);
        let id = dict.apply_word(property("a", "エー", 1)).expect("apply");
        let replacement = create_word(property("a", "アー", 1)).expect("word");
        let fresh = create_word(property("c", "シー", 1)).expect("word");
        let fresh_id = Uuid::new_v4();

        let mut import = BTreeMap::new();
        import.insert(id.to_string(), replacement);
        import.insert(fresh_id.to_string(), fresh);

        dict.import_user_dict(import.clone(), false).expect("import");
        let words = dict.read_dict().expect("read");
        assert_eq!(words[&id].pronunciation, "エー");
        assert!(words.contains_key(&fresh_id));

        dict.import_user_dict(import, true).expect("import");
        assert_eq!(dict.read_dict().expect("read")[&id].pronunciation, "アー");
    }

    #[test]
    fn import_rejects_bad_ids_and_parts_of_speech() {
        let (_dir, _analyzer, dict) = setup(true);
        let word = create_word(property("a", "エー", 1)).expect("word");

        let mut bad_id = BTreeMap::new();
        bad_id.insert("not-a-uuid".to_string(), word.clone());
        assert!(matches!(
            dict.import_user_dict(bad_id, false),
            Err(UserDictError::InvalidUuid(_))
        ));

        let mut mismatched = word;
        mismatched.part_of_speech_detail_1 = "一般".to_string();
        let mut bad_pos = BTreeMap::new();
        bad_pos.insert(Uuid::new_v4().to_string(), mismatched);
        assert!(matches!(
            dict.import_user_dict(bad_pos, false),
            Err(UserDictError::UnsupportedPartOfSpeech(1348))
        ));
    }

    #[test]
    fn words_that_break_the_lexicon_are_never_saved() {
        let (_dir, analyzer, dict) = setup(true);
        let mut word = create_word(property("a", "エー", 1)).expect("word");
        word.yomi = "エー\nx,1,1".to_string();
        let mut import = BTreeMap::new();
        import.insert(Uuid::new_v4().to_string(), word);

        assert!(matches!(
            dict.import_user_dict(import, false),
            Err(UserDictError::InvalidWord(_))
        ));
        assert!(!dict.dict_path().exists());

        dict.apply_word(property("b", "ビー", 1)).expect("apply after rejection");
        assert_eq!(dict.read_dict().expect("read").len(), 1);
        assert!(analyzer.lexicon().get("ｂ").is_some());
    }

    #[test]
    fn missing_default_dictionary_leaves_front_end_alone() {
        let (_dir, analyzer, dict) = setup(false);
        dict.apply_word(property("a", "エー", 1)).expect("apply");
        assert!(analyzer.lexicon().is_empty());
        assert_eq!(dict.read_dict().expect("read").len(), 1);
    }
}

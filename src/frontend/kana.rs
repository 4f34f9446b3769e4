//! AquesTalk-style kana notation.
//!
//! ```text
//! コンニチワ'/ニ'ホンゴ、テ_スト'？
//! ```
//!
//! `/` separates accent phrases, `、` separates them with a pause, `'`
//! follows the accent nucleus, `_` devoices the next mora and a trailing
//! `？` makes the phrase a question.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::model::{AccentPhrase, Mora};

use super::mora::{lookup, MAX_MORA_CHARS};

const PAUSE_DELIMITER: char = '、';
const NOPAUSE_DELIMITER: char = '/';
const UNVOICE_SYMBOL: char = '_';
const ACCENT_SYMBOL: char = '\'';
const INTERROGATION_MARK: char = '？';
const LOOP_LIMIT: usize = 300;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KanaParseError {
    #[error("判別できない読み仮名があります: {0}")]
    UnknownText(String),
    #[error("句頭にアクセントは置けません: {0}")]
    AccentTop(String),
    #[error("1つのアクセント句に二つ以上のアクセントは置けません: {0}")]
    AccentTwice(String),
    #[error("アクセントを指定していないアクセント句があります: {0}")]
    AccentNotFound(String),
    #[error("{0}番目のアクセント句が空白です")]
    EmptyPhrase(usize),
    #[error("アクセント句末以外に「？」は置けません: {0}")]
    InterrogationMarkNotAtEnd(String),
    #[error("処理時に無限ループになってしまいました...バグ報告をお願いします。")]
    InfiniteLoop,
}

impl KanaParseError {
    /// Stable error code reported to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownText(_) => "UNKNOWN_TEXT",
            Self::AccentTop(_) => "ACCENT_TOP",
            Self::AccentTwice(_) => "ACCENT_TWICE",
            Self::AccentNotFound(_) => "ACCENT_NOTFOUND",
            Self::EmptyPhrase(_) => "EMPTY_PHRASE",
            Self::InterrogationMarkNotAtEnd(_) => "INTERROGATION_MARK_NOT_AT_END",
            Self::InfiniteLoop => "INFINITE_LOOP",
        }
    }

    /// Arguments interpolated into the message, keyed by name.
    pub fn args(&self) -> HashMap<&'static str, String> {
        let mut args = HashMap::new();
        match self {
            Self::UnknownText(text)
            | Self::AccentTop(text)
            | Self::AccentTwice(text)
            | Self::AccentNotFound(text)
            | Self::InterrogationMarkNotAtEnd(text) => {
                args.insert("text", text.clone());
            }
            Self::EmptyPhrase(position) => {
                args.insert("position", position.to_string());
            }
            Self::InfiniteLoop => {}
        }
        args
    }
}

/// Kana text (optionally `_`-prefixed) to mora, for notation parsing.
fn kana_table() -> &'static HashMap<String, Mora> {
    static TABLE: OnceLock<HashMap<String, Mora>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut table = HashMap::new();
        for text in super::mora::texts() {
            let Some((consonant, vowel)) = lookup(text) else {
                continue;
            };
            table.insert(text.to_string(), Mora::new(text, consonant, vowel));
            if matches!(vowel, "a" | "i" | "u" | "e" | "o") {
                let unvoiced = vowel.to_uppercase();
                table.insert(
                    format!("{UNVOICE_SYMBOL}{text}"),
                    Mora::new(text, consonant, &unvoiced),
                );
            }
        }
        table
    })
}

/// Parse kana notation into accent phrases with zeroed lengths and pitch.
pub fn parse_kana(text: &str) -> Result<Vec<AccentPhrase>, KanaParseError> {
    if text.is_empty() {
        return Err(KanaParseError::EmptyPhrase(1));
    }

    let chars: Vec<char> = text.chars().collect();
    let mut phrases = Vec::new();
    let mut phrase_start = 0;
    for i in 0..=chars.len() {
        let at_end = i == chars.len();
        if !at_end && chars[i] != PAUSE_DELIMITER && chars[i] != NOPAUSE_DELIMITER {
            continue;
        }

        let mut phrase = &chars[phrase_start..i];
        if phrase.is_empty() {
            return Err(KanaParseError::EmptyPhrase(phrases.len() + 1));
        }
        phrase_start = i + 1;

        let is_interrogative = phrase.contains(&INTERROGATION_MARK);
        if is_interrogative {
            if phrase[..phrase.len() - 1].contains(&INTERROGATION_MARK) {
                return Err(KanaParseError::InterrogationMarkNotAtEnd(
                    phrase.iter().collect(),
                ));
            }
            phrase = &phrase[..phrase.len() - 1];
        }

        let mut accent_phrase = text_to_accent_phrase(phrase)?;
        if !at_end && chars[i] == PAUSE_DELIMITER {
            accent_phrase.pause_mora = Some(Mora::pause());
        }
        accent_phrase.is_interrogative = is_interrogative;
        phrases.push(accent_phrase);
    }
    Ok(phrases)
}

fn text_to_accent_phrase(phrase: &[char]) -> Result<AccentPhrase, KanaParseError> {
    let table = kana_table();
    let phrase_text = || phrase.iter().collect::<String>();

    let mut accent = None;
    let mut moras = Vec::new();
    let mut base = 0;
    let mut loops = 0;
    // `_` plus the longest mora.
    let max_key = MAX_MORA_CHARS + 1;
    while base < phrase.len() {
        loops += 1;
        if loops > LOOP_LIMIT {
            return Err(KanaParseError::InfiniteLoop);
        }

        if phrase[base] == ACCENT_SYMBOL {
            if moras.is_empty() {
                return Err(KanaParseError::AccentTop(phrase_text()));
            }
            if accent.is_some() {
                return Err(KanaParseError::AccentTwice(phrase_text()));
            }
            accent = Some(moras.len());
            base += 1;
            continue;
        }

        let mut stack = String::new();
        let mut matched: Option<(usize, &Mora)> = None;
        for (offset, &c) in phrase[base..].iter().enumerate().take(max_key) {
            if c == ACCENT_SYMBOL {
                break;
            }
            stack.push(c);
            if let Some(mora) = table.get(&stack) {
                matched = Some((offset + 1, mora));
            }
        }
        match matched {
            Some((len, mora)) => {
                moras.push(mora.clone());
                base += len;
            }
            None => return Err(KanaParseError::UnknownText(stack)),
        }
    }

    let accent = accent.ok_or_else(|| KanaParseError::AccentNotFound(phrase_text()))?;
    Ok(AccentPhrase {
        moras,
        accent,
        pause_mora: None,
        is_interrogative: false,
    })
}

/// Render accent phrases back to kana notation.
pub fn create_kana(phrases: &[AccentPhrase]) -> String {
    let mut text = String::new();
    for (i, phrase) in phrases.iter().enumerate() {
        for (j, mora) in phrase.moras.iter().enumerate() {
            if matches!(mora.vowel.as_str(), "A" | "E" | "I" | "O" | "U") {
                text.push(UNVOICE_SYMBOL);
            }
            text.push_str(&mora.text);
            if j + 1 == phrase.accent {
                text.push(ACCENT_SYMBOL);
            }
        }
        if phrase.is_interrogative {
            text.push(INTERROGATION_MARK);
        }
        if i + 1 < phrases.len() {
            text.push(if phrase.pause_mora.is_some() {
                PAUSE_DELIMITER
            } else {
                NOPAUSE_DELIMITER
            });
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::{create_kana, parse_kana, KanaParseError};

    #[test]
    fn parses_phrases_accents_and_pauses() {
        let phrases = parse_kana("コンニチワ'/ニ'ホンゴ、テ_スト'？").expect("valid kana");
        assert_eq!(phrases.len(), 3);

        assert_eq!(phrases[0].moras.len(), 5);
        assert_eq!(phrases[0].accent, 5);
        assert!(phrases[0].pause_mora.is_none());

        assert_eq!(phrases[1].accent, 1);
        assert!(phrases[1].pause_mora.is_some());

        assert!(phrases[2].is_interrogative);
        assert_eq!(phrases[2].moras[1].vowel, "U");
        assert_eq!(phrases[2].moras[1].text, "ス");
    }

    #[test]
    fn create_kana_inverts_parse_kana() {
        for text in ["ア'/イ'、ウ'", "キョ'オ", "テ_スト'？", "クヮ'シ/ヴァ'イオリン"] {
            let phrases = parse_kana(text).expect("valid kana");
            assert_eq!(create_kana(&phrases), text);
        }
    }

    #[test]
    fn reports_error_codes() {
        let cases = [
            ("", "EMPTY_PHRASE"),
            ("ア'//イ'", "EMPTY_PHRASE"),
            ("'ア", "ACCENT_TOP"),
            ("ア'イ'", "ACCENT_TWICE"),
            ("アイ", "ACCENT_NOTFOUND"),
            ("アX'", "UNKNOWN_TEXT"),
            ("ア？イ'", "INTERROGATION_MARK_NOT_AT_END"),
        ];
        for (text, code) in cases {
            let err = parse_kana(text).expect_err(text);
            assert_eq!(err.code(), code, "{text}");
        }
    }

    #[test]
    fn empty_phrase_reports_position() {
        let err = parse_kana("ア'/").expect_err("trailing delimiter");
        assert_eq!(err, KanaParseError::EmptyPhrase(2));
        assert_eq!(err.args().get("position").map(String::as_str), Some("2"));
    }
}

//! Katakana mora table and reading helpers.

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::model::Mora;

/// `(text, consonant, vowel)` for every mora the synthesizer can voice.
/// An empty consonant means the mora is a bare vowel.
const MORA_TABLE: &[(&str, &str, &str)] = &[
    ("ヴォ", "v", "o"), ("ヴェ", "v", "e"), ("ヴィ", "v", "i"), ("ヴァ", "v", "a"), ("ヴ", "v", "u"),
    ("ン", "", "N"), ("ワ", "w", "a"), ("ロ", "r", "o"), ("レ", "r", "e"), ("ル", "r", "u"),
    ("リョ", "ry", "o"), ("リュ", "ry", "u"), ("リャ", "ry", "a"), ("リェ", "ry", "e"), ("リ", "r", "i"),
    ("ラ", "r", "a"), ("ヨ", "y", "o"), ("ユ", "y", "u"), ("ヤ", "y", "a"),
    ("モ", "m", "o"), ("メ", "m", "e"), ("ム", "m", "u"),
    ("ミョ", "my", "o"), ("ミュ", "my", "u"), ("ミャ", "my", "a"), ("ミェ", "my", "e"), ("ミ", "m", "i"),
    ("マ", "m", "a"), ("ポ", "p", "o"), ("ボ", "b", "o"), ("ホ", "h", "o"), ("ペ", "p", "e"),
    ("ベ", "b", "e"), ("ヘ", "h", "e"), ("プ", "p", "u"), ("ブ", "b", "u"),
    ("フォ", "f", "o"), ("フェ", "f", "e"), ("フィ", "f", "i"), ("ファ", "f", "a"), ("フ", "f", "u"),
    ("ピョ", "py", "o"), ("ピュ", "py", "u"), ("ピャ", "py", "a"), ("ピェ", "py", "e"), ("ピ", "p", "i"),
    ("ビョ", "by", "o"), ("ビュ", "by", "u"), ("ビャ", "by", "a"), ("ビェ", "by", "e"), ("ビ", "b", "i"),
    ("ヒョ", "hy", "o"), ("ヒュ", "hy", "u"), ("ヒャ", "hy", "a"), ("ヒェ", "hy", "e"), ("ヒ", "h", "i"),
    ("パ", "p", "a"), ("バ", "b", "a"), ("ハ", "h", "a"),
    ("ノ", "n", "o"), ("ネ", "n", "e"), ("ヌ", "n", "u"),
    ("ニョ", "ny", "o"), ("ニュ", "ny", "u"), ("ニャ", "ny", "a"), ("ニェ", "ny", "e"), ("ニ", "n", "i"),
    ("ナ", "n", "a"), ("ドゥ", "d", "u"), ("ド", "d", "o"), ("トゥ", "t", "u"), ("ト", "t", "o"),
    ("デョ", "dy", "o"), ("デュ", "dy", "u"), ("デャ", "dy", "a"), ("ディ", "d", "i"), ("デ", "d", "e"),
    ("テョ", "ty", "o"), ("テュ", "ty", "u"), ("テャ", "ty", "a"), ("ティ", "t", "i"), ("テ", "t", "e"),
    ("ツォ", "ts", "o"), ("ツェ", "ts", "e"), ("ツィ", "ts", "i"), ("ツァ", "ts", "a"), ("ツ", "ts", "u"),
    ("ッ", "", "cl"),
    ("チョ", "ch", "o"), ("チュ", "ch", "u"), ("チャ", "ch", "a"), ("チェ", "ch", "e"), ("チ", "ch", "i"),
    ("ダ", "d", "a"), ("タ", "t", "a"),
    ("ゾ", "z", "o"), ("ソ", "s", "o"), ("ゼ", "z", "e"), ("セ", "s", "e"),
    ("ズィ", "z", "i"), ("ズ", "z", "u"), ("スィ", "s", "i"), ("ス", "s", "u"),
    ("ジョ", "j", "o"), ("ジュ", "j", "u"), ("ジャ", "j", "a"), ("ジェ", "j", "e"), ("ジ", "j", "i"),
    ("ショ", "sh", "o"), ("シュ", "sh", "u"), ("シャ", "sh", "a"), ("シェ", "sh", "e"), ("シ", "sh", "i"),
    ("ザ", "z", "a"), ("サ", "s", "a"),
    ("ゴ", "g", "o"), ("コ", "k", "o"), ("ゲ", "g", "e"), ("ケ", "k", "e"),
    ("グヮ", "gw", "a"), ("グ", "g", "u"), ("クヮ", "kw", "a"), ("ク", "k", "u"),
    ("ギョ", "gy", "o"), ("ギュ", "gy", "u"), ("ギャ", "gy", "a"), ("ギェ", "gy", "e"), ("ギ", "g", "i"),
    ("キョ", "ky", "o"), ("キュ", "ky", "u"), ("キャ", "ky", "a"), ("キェ", "ky", "e"), ("キ", "k", "i"),
    ("ガ", "g", "a"), ("カ", "k", "a"),
    ("オ", "", "o"), ("エ", "", "e"), ("ウォ", "w", "o"), ("ウェ", "w", "e"), ("ウィ", "w", "i"),
    ("ウ", "", "u"), ("イェ", "y", "e"), ("イ", "", "i"), ("ア", "", "a"),
    // Readable but never produced by `create_kana`.
    ("ヴョ", "by", "o"), ("ヴュ", "by", "u"), ("ヴャ", "by", "a"),
    ("ヲ", "", "o"), ("ヱ", "", "e"), ("ヰ", "", "i"), ("ヮ", "w", "a"),
    ("ョ", "y", "o"), ("ュ", "y", "u"), ("ャ", "y", "a"),
    ("ヅ", "z", "u"), ("ヂ", "j", "i"), ("ヶ", "k", "e"),
    ("ォ", "", "o"), ("ェ", "", "e"), ("ゥ", "", "u"), ("ィ", "", "i"), ("ァ", "", "a"),
];

/// Longest mora text in the table, in chars.
pub const MAX_MORA_CHARS: usize = 2;

fn table() -> &'static HashMap<&'static str, (Option<&'static str>, &'static str)> {
    static TABLE: OnceLock<HashMap<&'static str, (Option<&'static str>, &'static str)>> =
        OnceLock::new();
    TABLE.get_or_init(|| {
        MORA_TABLE
            .iter()
            .map(|&(text, consonant, vowel)| {
                let consonant = (!consonant.is_empty()).then_some(consonant);
                (text, (consonant, vowel))
            })
            .collect()
    })
}

/// Every mora text in the table.
pub fn texts() -> impl Iterator<Item = &'static str> {
    MORA_TABLE.iter().map(|&(text, _, _)| text)
}

/// Look up the phonemes of a single mora.
pub fn lookup(text: &str) -> Option<(Option<&'static str>, &'static str)> {
    table().get(text).copied()
}

/// Build a [`Mora`] for `text` if it is in the table.
pub fn mora(text: &str) -> Option<Mora> {
    lookup(text).map(|(consonant, vowel)| Mora::new(text, consonant, vowel))
}

/// Split a katakana reading into moras.
///
/// `ー` lengthens the previous vowel and characters outside the table are
/// skipped.
pub fn reading_to_moras(reading: &str) -> Vec<Mora> {
    let chars: Vec<char> = reading.chars().collect();
    let mut moras: Vec<Mora> = Vec::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == 'ー' {
            if let Some(prev) = moras.last() {
                let vowel = match prev.vowel.as_str() {
                    "A" | "I" | "U" | "E" | "O" => prev.vowel.to_lowercase(),
                    v => v.to_string(),
                };
                if let Some(kana) = vowel_kana(&vowel) {
                    moras.push(Mora::new(kana, None, &vowel));
                }
            }
            i += 1;
            continue;
        }

        let matched = (1..=MAX_MORA_CHARS.min(chars.len() - i)).rev().find_map(|n| {
            let text: String = chars[i..i + n].iter().collect();
            mora(&text).map(|m| (m, n))
        });
        match matched {
            Some((m, n)) => {
                moras.push(m);
                i += n;
            }
            None => {
                log::debug!("No mora for {:?} in reading {reading:?}", chars[i]);
                i += 1;
            }
        }
    }
    moras
}

/// Kana spelling a bare vowel, used for lengthening and upspeak moras.
pub fn vowel_kana(vowel: &str) -> Option<&'static str> {
    match vowel.to_lowercase().as_str() {
        "a" => Some("ア"),
        "i" => Some("イ"),
        "u" => Some("ウ"),
        "e" => Some("エ"),
        "o" => Some("オ"),
        "n" => Some("ン"),
        "cl" => Some("ッ"),
        _ => None,
    }
}

pub fn hiragana_to_katakana(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{3041}'..='\u{3096}' => char::from_u32(c as u32 + 0x60).unwrap_or(c),
            _ => c,
        })
        .collect()
}

pub fn is_kana(c: char) -> bool {
    matches!(c, '\u{3041}'..='\u{3096}' | '\u{30A1}'..='\u{30FA}' | 'ー')
}

#[cfg(test)]
mod tests {
    use super::{hiragana_to_katakana, lookup, reading_to_moras, vowel_kana};

    fn texts(reading: &str) -> Vec<String> {
        reading_to_moras(reading).into_iter().map(|m| m.text).collect()
    }

    #[test]
    fn prefers_two_char_moras() {
        assert_eq!(texts("キョウ"), vec!["キョ", "ウ"]);
        assert_eq!(lookup("キョ"), Some((Some("ky"), "o")));
    }

    #[test]
    fn long_vowel_repeats_previous_vowel() {
        let moras = reading_to_moras("ラーメン");
        assert_eq!(moras[1].text, "ア");
        assert_eq!(moras[1].vowel, "a");
        assert!(moras[1].consonant.is_none());
        assert_eq!(moras.len(), 4);
    }

    #[test]
    fn sokuon_and_hatsuon() {
        let moras = reading_to_moras("ガッコン");
        assert_eq!(moras[1].vowel, "cl");
        assert_eq!(moras[3].vowel, "N");
    }

    #[test]
    fn skips_unknown_characters() {
        assert_eq!(texts("ア漢イ"), vec!["ア", "イ"]);
    }

    #[test]
    fn converts_hiragana() {
        assert_eq!(hiragana_to_katakana("こんにちは、ゔ"), "コンニチハ、ヴ");
    }

    #[test]
    fn vowel_kana_ignores_case() {
        assert_eq!(vowel_kana("I"), Some("イ"));
        assert_eq!(vowel_kana("pau"), None);
    }
}

//! Japanese text front end.
//!
//! Text goes through three steps:
//!
//! 1. **Normalization**: full-width ASCII folds to half-width.
//! 2. **Tokenization**: at each position the longest lexicon entry wins.
//!    Text the lexicon does not cover falls back to [`g2p`] readings: kana
//!    as written, digits as Japanese numbers, letters by name.
//! 3. **Phrase assembly**: content words open accent phrases, particles and
//!    auxiliaries attach to the previous phrase, and noun compounds follow
//!    the second word's chain rule.
//!
//! The lexicon can be swapped at runtime with [`TextAnalyzer::apply_lexicon`];
//! analyses already in flight keep the lexicon they started with.

pub mod g2p;
pub mod kana;
pub mod lexicon;
pub mod mora;

use std::sync::Arc;

use parking_lot::RwLock;

use crate::model::{AccentPhrase, Mora};

pub use kana::{create_kana, parse_kana, KanaParseError};
pub use lexicon::{ChainRule, Lexicon, LexiconEntry, LexiconError};

/// Consonants that devoice a neighboring `i`/`u`.
const VOICELESS_CONSONANTS: [&str; 13] = [
    "k", "ky", "s", "sh", "t", "ty", "ch", "ts", "h", "hy", "f", "p", "py",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WordKind {
    /// Opens its own accent phrase.
    Content,
    /// Compounds with a preceding noun through its chain rule.
    Noun,
    /// Noun suffix; compounds like a noun, otherwise attaches.
    Suffix,
    /// Particles, auxiliaries and dependent words.
    Attached,
}

#[derive(Debug, Clone)]
struct Word {
    moras: Vec<Mora>,
    accent_type: usize,
    kind: WordKind,
    chain_rule: ChainRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Punct {
    Pause,
    Question,
}

#[derive(Debug, Clone)]
enum Token {
    Word(Word),
    Punct(Punct),
    Space,
}

/// Converts text into accent phrases with zeroed lengths and pitch.
pub struct TextAnalyzer {
    lexicon: RwLock<Arc<Lexicon>>,
}

impl Default for TextAnalyzer {
    fn default() -> Self {
        Self::new(Lexicon::new())
    }
}

impl TextAnalyzer {
    pub fn new(lexicon: Lexicon) -> Self {
        Self {
            lexicon: RwLock::new(Arc::new(lexicon)),
        }
    }

    /// Replace the active lexicon.
    pub fn apply_lexicon(&self, lexicon: Lexicon) {
        let size = lexicon.len();
        *self.lexicon.write() = Arc::new(lexicon);
        log::info!("Applied lexicon with {size} entries");
    }

    pub fn lexicon(&self) -> Arc<Lexicon> {
        Arc::clone(&self.lexicon.read())
    }

    pub fn analyze(&self, text: &str) -> Vec<AccentPhrase> {
        let lexicon = self.lexicon();
        let tokens = tokenize(&g2p::normalize(text), &lexicon);
        let mut phrases = assemble(tokens);
        for phrase in &mut phrases {
            devoice(phrase);
        }
        phrases
    }
}

fn punct(c: char) -> Option<Punct> {
    match c {
        '、' | ',' | '。' | '.' | '!' | '！' | '\n' => Some(Punct::Pause),
        '?' => Some(Punct::Question),
        _ => None,
    }
}

fn word_kind(entry: &LexiconEntry) -> WordKind {
    let [detail1, ..] = &entry.pos_detail;
    match (entry.pos.as_str(), detail1.as_str()) {
        ("名詞", "接尾") => WordKind::Suffix,
        ("名詞", "非自立") => WordKind::Attached,
        ("名詞", _) => WordKind::Noun,
        ("助詞", _) | ("助動詞", _) => WordKind::Attached,
        (_, "非自立") => WordKind::Attached,
        _ => WordKind::Content,
    }
}

fn tokenize(text: &str, lexicon: &Lexicon) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut pending_kana = String::new();
    let mut i = 0;

    let flush_kana = |pending: &mut String, tokens: &mut Vec<Token>| {
        if pending.is_empty() {
            return;
        }
        let reading = mora::hiragana_to_katakana(pending);
        tokens.push(Token::Word(Word {
            moras: mora::reading_to_moras(&reading),
            accent_type: 0,
            kind: WordKind::Noun,
            chain_rule: ChainRule::None,
        }));
        pending.clear();
    };

    while i < chars.len() {
        let c = chars[i];

        // `3.14` and `1,000` stay one number.
        let connector = matches!(c, '.' | ',') && is_digit_connector(&chars, i);
        if let Some(p) = punct(c).filter(|_| !connector) {
            flush_kana(&mut pending_kana, &mut tokens);
            tokens.push(Token::Punct(p));
            i += 1;
            continue;
        }

        if c.is_whitespace() {
            flush_kana(&mut pending_kana, &mut tokens);
            tokens.push(Token::Space);
            i += 1;
            continue;
        }

        if let Some((entry, len)) = lexicon.longest_match(&chars, i) {
            flush_kana(&mut pending_kana, &mut tokens);
            tokens.push(Token::Word(Word {
                moras: mora::reading_to_moras(&mora::hiragana_to_katakana(&entry.pronunciation)),
                accent_type: entry.accent_type,
                kind: word_kind(entry),
                chain_rule: entry.chain_rule,
            }));
            i += len;
            continue;
        }

        if mora::is_kana(c) {
            pending_kana.push(c);
            i += 1;
            continue;
        }
        flush_kana(&mut pending_kana, &mut tokens);

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len()
                && (chars[i].is_ascii_digit()
                    || (chars[i] == '.' && is_digit_connector(&chars, i))
                    || (chars[i] == ',' && is_digit_connector(&chars, i)))
            {
                i += 1;
            }
            let digits: String = chars[start..i].iter().filter(|&&d| d != ',').collect();
            tokens.push(Token::Word(Word {
                moras: mora::reading_to_moras(&g2p::read_number(&digits)),
                accent_type: 0,
                kind: WordKind::Noun,
                chain_rule: ChainRule::None,
            }));
            continue;
        }

        if let Some(reading) = g2p::letter_reading(c) {
            tokens.push(Token::Word(Word {
                moras: mora::reading_to_moras(reading),
                accent_type: 1,
                kind: WordKind::Noun,
                chain_rule: ChainRule::C1,
            }));
            i += 1;
            continue;
        }

        log::debug!("No reading for {c:?}, dropping it");
        i += 1;
    }
    flush_kana(&mut pending_kana, &mut tokens);
    tokens
}

fn is_digit_connector(chars: &[char], idx: usize) -> bool {
    let prev = idx.checked_sub(1).and_then(|p| chars.get(p));
    let next = chars.get(idx + 1);
    matches!(
        (prev, next),
        (Some(left), Some(right)) if left.is_ascii_digit() && right.is_ascii_digit()
    )
}

/// Accent phrase under construction.
struct Pending {
    moras: Vec<Mora>,
    /// `None` while the phrase is flat.
    accent: Option<usize>,
    ends_in_noun: bool,
}

impl Pending {
    fn open(word: Word) -> Self {
        let accent = (word.accent_type > 0).then(|| word.accent_type.min(word.moras.len()));
        Self {
            ends_in_noun: matches!(word.kind, WordKind::Noun | WordKind::Suffix),
            moras: word.moras,
            accent,
        }
    }

    fn compound(&mut self, word: Word) {
        let prev = self.moras.len();
        self.accent = match word.chain_rule {
            ChainRule::C1 if word.accent_type == 0 => Some(prev + 1),
            ChainRule::C1 => Some(prev + word.accent_type),
            ChainRule::C2 => Some(prev + 1),
            ChainRule::C3 => Some(prev),
            ChainRule::C4 => None,
            ChainRule::C5 | ChainRule::None => self.accent,
        };
        self.ends_in_noun = true;
        self.moras.extend(word.moras);
    }

    fn attach(&mut self, word: Word) {
        self.ends_in_noun = word.kind == WordKind::Suffix;
        self.moras.extend(word.moras);
    }

    fn finish(self) -> AccentPhrase {
        let len = self.moras.len();
        let accent = self.accent.map_or(len, |a| a.clamp(1, len.max(1)));
        AccentPhrase {
            moras: self.moras,
            accent,
            pause_mora: None,
            is_interrogative: false,
        }
    }
}

fn assemble(tokens: Vec<Token>) -> Vec<AccentPhrase> {
    let mut phrases: Vec<AccentPhrase> = Vec::new();
    let mut current: Option<Pending> = None;
    let mut boundary = false;

    for token in tokens {
        match token {
            Token::Space => boundary = true,
            Token::Punct(p) => {
                if let Some(pending) = current.take() {
                    phrases.push(pending.finish());
                }
                boundary = false;
                if let Some(last) = phrases.last_mut() {
                    if p == Punct::Question {
                        last.is_interrogative = true;
                    }
                    if last.pause_mora.is_none() {
                        last.pause_mora = Some(Mora::pause());
                    }
                }
            }
            Token::Word(word) => {
                if word.moras.is_empty() {
                    continue;
                }
                current = Some(match current.take() {
                    None => Pending::open(word),
                    Some(pending) if boundary => {
                        phrases.push(pending.finish());
                        Pending::open(word)
                    }
                    Some(mut pending) => {
                        let compounds = pending.ends_in_noun
                            && matches!(word.kind, WordKind::Noun | WordKind::Suffix)
                            && word.chain_rule != ChainRule::None;
                        if compounds {
                            pending.compound(word);
                            pending
                        } else if matches!(word.kind, WordKind::Attached | WordKind::Suffix) {
                            pending.attach(word);
                            pending
                        } else {
                            phrases.push(pending.finish());
                            Pending::open(word)
                        }
                    }
                });
                boundary = false;
            }
        }
    }
    if let Some(pending) = current {
        phrases.push(pending.finish());
    }

    if let Some(last) = phrases.last_mut() {
        last.pause_mora = None;
    }
    phrases
}

/// Devoice `i`/`u` between voiceless consonants, and a phrase-final `su`.
/// The accent nucleus is never devoiced, nor two moras in a row.
fn devoice(phrase: &mut AccentPhrase) {
    let is_voiceless = |m: &Mora| {
        m.consonant
            .as_deref()
            .is_some_and(|c| VOICELESS_CONSONANTS.contains(&c))
    };
    let count = phrase.moras.len();
    let mut prev_devoiced = false;
    for idx in 0..count {
        let mora = &phrase.moras[idx];
        let candidate = matches!(mora.vowel.as_str(), "i" | "u") && is_voiceless(mora);
        let followed = match phrase.moras.get(idx + 1) {
            Some(next) => is_voiceless(next),
            None => mora.consonant.as_deref() == Some("s") && mora.vowel == "u",
        };
        let nucleus = idx + 1 == phrase.accent && phrase.accent < count;
        if candidate && followed && !nucleus && !prev_devoiced {
            let vowel = phrase.moras[idx].vowel.to_uppercase();
            phrase.moras[idx].vowel = vowel;
            prev_devoiced = true;
        } else {
            prev_devoiced = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Lexicon, TextAnalyzer};
    use crate::frontend::create_kana;

    const CSV: &str = "\
今日,1345,1345,3000,名詞,副詞可能,*,*,*,*,今日,キョウ,キョー,1/2,C1
は,261,261,3000,助詞,係助詞,*,*,*,*,は,ハ,ワ,0/1,*
いい,400,400,3000,形容詞,自立,*,*,形容詞・イイ,基本形,いい,イイ,イイ,1/2,*
天気,1345,1345,3000,名詞,一般,*,*,*,*,天気,テンキ,テンキ,1/3,C1
です,460,460,3000,助動詞,*,*,*,特殊・デス,基本形,です,デス,デス,1/2,*
か,261,261,3000,助詞,副助詞／並立助詞／終助詞,*,*,*,*,か,カ,カ,0/1,*
東京,1348,1348,3000,名詞,固有名詞,地域,一般,*,*,東京,トウキョウ,トーキョー,0/4,C1
都,1358,1358,3000,名詞,接尾,地域,*,*,*,都,ト,ト,1/1,C3
大学,1345,1345,3000,名詞,一般,*,*,*,*,大学,ダイガク,ダイガク,0/4,C1
";

    fn analyzer() -> TextAnalyzer {
        TextAnalyzer::new(Lexicon::from_csv(CSV).expect("valid csv"))
    }

    #[test]
    fn particles_attach_to_previous_phrase() {
        let phrases = analyzer().analyze("今日はいい天気です");
        assert_eq!(create_kana(&phrases), "キョ'オワ/イ'イ/テ'ンキデ_ス");
    }

    #[test]
    fn punctuation_adds_pause_and_question_marks_phrase() {
        let phrases = analyzer().analyze("今日は、いい天気ですか？");
        assert_eq!(phrases.len(), 3);
        assert!(phrases[0].pause_mora.is_some());
        assert!(phrases[2].is_interrogative);
        // A trailing pause is dropped.
        assert!(phrases[2].pause_mora.is_none());
    }

    #[test]
    fn nouns_compound_through_chain_rules() {
        let phrases = analyzer().analyze("東京大学");
        assert_eq!(phrases.len(), 1);
        // C1 on a flat second word: previous moras + 1.
        assert_eq!(phrases[0].accent, 5);

        let phrases = analyzer().analyze("東京都");
        assert_eq!(phrases.len(), 1);
        // C3: accent on the last mora of the first word.
        assert_eq!(phrases[0].accent, 4);
    }

    #[test]
    fn flat_words_use_mora_count() {
        let phrases = analyzer().analyze("東京");
        assert_eq!(phrases[0].accent, phrases[0].moras.len());
    }

    #[test]
    fn falls_back_to_kana_digits_and_letters() {
        let empty = TextAnalyzer::default();
        let kana = empty.analyze("こんにちは");
        assert_eq!(create_kana(&kana), "コンニ_チハ'");

        let number = empty.analyze("12");
        let texts: String = number[0].moras.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, "ジュウニ");

        let letters = empty.analyze("AI");
        assert_eq!(letters.len(), 1);
        let texts: String = letters[0].moras.iter().map(|m| m.text.as_str()).collect();
        // The long vowel is spelled with its vowel kana.
        assert_eq!(texts, "エエアイ");
    }

    #[test]
    fn unknown_characters_are_dropped() {
        let phrases = TextAnalyzer::default().analyze("漢");
        assert!(phrases.is_empty());
    }

    #[test]
    fn apply_lexicon_swaps_readings() {
        let analyzer = TextAnalyzer::default();
        assert!(analyzer.analyze("天気").is_empty());
        analyzer.apply_lexicon(Lexicon::from_csv(CSV).expect("valid csv"));
        assert_eq!(analyzer.analyze("天気").len(), 1);
    }
}

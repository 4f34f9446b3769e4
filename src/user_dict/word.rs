use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::UserDictError;

pub const MIN_PRIORITY: u32 = 0;
pub const MAX_PRIORITY: u32 = 10;
pub const DEFAULT_PRIORITY: u32 = 5;

/// Word classes a user may register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WordType {
    ProperNoun,
    CommonNoun,
    Verb,
    Adjective,
    Suffix,
}

impl WordType {
    pub const ALL: [WordType; 5] = [
        WordType::ProperNoun,
        WordType::CommonNoun,
        WordType::Verb,
        WordType::Adjective,
        WordType::Suffix,
    ];

    pub fn part_of_speech(self) -> &'static PartOfSpeechDetail {
        match self {
            WordType::ProperNoun => &PROPER_NOUN,
            WordType::CommonNoun => &COMMON_NOUN,
            WordType::Verb => &VERB,
            WordType::Adjective => &ADJECTIVE,
            WordType::Suffix => &SUFFIX,
        }
    }
}

impl std::str::FromStr for WordType {
    type Err = UserDictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROPER_NOUN" => Ok(WordType::ProperNoun),
            "COMMON_NOUN" => Ok(WordType::CommonNoun),
            "VERB" => Ok(WordType::Verb),
            "ADJECTIVE" => Ok(WordType::Adjective),
            "SUFFIX" => Ok(WordType::Suffix),
            other => Err(UserDictError::InvalidWord(format!("unknown word type {other:?}"))),
        }
    }
}

/// Fixed MeCab columns and cost table of a [`WordType`].
#[derive(Debug)]
pub struct PartOfSpeechDetail {
    pub part_of_speech: &'static str,
    pub part_of_speech_detail_1: &'static str,
    pub part_of_speech_detail_2: &'static str,
    pub part_of_speech_detail_3: &'static str,
    pub context_id: i32,
    /// Costs for priority 10 down to 0.
    pub cost_candidates: [i32; 11],
    pub accent_associative_rules: &'static [&'static str],
}

const NOUN_RULES: &[&str] = &["*", "C1", "C2", "C3", "C4", "C5"];

static PROPER_NOUN: PartOfSpeechDetail = PartOfSpeechDetail {
    part_of_speech: "名詞",
    part_of_speech_detail_1: "固有名詞",
    part_of_speech_detail_2: "一般",
    part_of_speech_detail_3: "*",
    context_id: 1348,
    cost_candidates: [-988, 3488, 4768, 6048, 7328, 8609, 8734, 8859, 8984, 9110, 14176],
    accent_associative_rules: NOUN_RULES,
};

static COMMON_NOUN: PartOfSpeechDetail = PartOfSpeechDetail {
    part_of_speech: "名詞",
    part_of_speech_detail_1: "一般",
    part_of_speech_detail_2: "*",
    part_of_speech_detail_3: "*",
    context_id: 1345,
    cost_candidates: [-4445, 49, 1473, 2897, 4321, 5746, 6554, 7362, 8170, 8979, 15001],
    accent_associative_rules: NOUN_RULES,
};

static VERB: PartOfSpeechDetail = PartOfSpeechDetail {
    part_of_speech: "動詞",
    part_of_speech_detail_1: "自立",
    part_of_speech_detail_2: "*",
    part_of_speech_detail_3: "*",
    context_id: 642,
    cost_candidates: [3100, 6160, 6360, 6561, 6761, 6962, 7414, 7866, 8318, 8771, 13433],
    accent_associative_rules: &["*"],
};

static ADJECTIVE: PartOfSpeechDetail = PartOfSpeechDetail {
    part_of_speech: "形容詞",
    part_of_speech_detail_1: "自立",
    part_of_speech_detail_2: "*",
    part_of_speech_detail_3: "*",
    context_id: 20,
    cost_candidates: [1527, 3266, 3561, 3857, 4153, 4449, 5149, 5849, 6549, 7250, 10001],
    accent_associative_rules: &["*"],
};

static SUFFIX: PartOfSpeechDetail = PartOfSpeechDetail {
    part_of_speech: "名詞",
    part_of_speech_detail_1: "接尾",
    part_of_speech_detail_2: "一般",
    part_of_speech_detail_3: "*",
    context_id: 1358,
    cost_candidates: [4399, 5373, 6041, 6710, 7378, 8047, 9440, 10834, 12228, 13622, 15847],
    accent_associative_rules: NOUN_RULES,
};

fn part_of_speech_by_context(context_id: i32) -> Result<&'static PartOfSpeechDetail, UserDictError> {
    WordType::ALL
        .iter()
        .map(|t| t.part_of_speech())
        .find(|p| p.context_id == context_id)
        .ok_or(UserDictError::UnsupportedPartOfSpeech(context_id))
}

/// Lexicon cost of a priority; higher priority means lower cost.
pub fn priority2cost(context_id: i32, priority: u32) -> Result<i32, UserDictError> {
    if priority > MAX_PRIORITY {
        return Err(UserDictError::InvalidWord(format!(
            "priority must be within {MIN_PRIORITY}..={MAX_PRIORITY}, got {priority}"
        )));
    }
    let candidates = &part_of_speech_by_context(context_id)?.cost_candidates;
    Ok(candidates[(MAX_PRIORITY - priority) as usize])
}

/// Priority whose cost is nearest to `cost`.
pub fn cost2priority(context_id: i32, cost: i32) -> Result<u32, UserDictError> {
    let candidates = &part_of_speech_by_context(context_id)?.cost_candidates;
    let nearest = candidates
        .iter()
        .enumerate()
        .min_by_key(|(_, c)| (i64::from(**c) - i64::from(cost)).abs())
        .map(|(i, _)| i as u32)
        .unwrap_or(0);
    Ok(MAX_PRIORITY - nearest)
}

fn default_context_id() -> i32 {
    PROPER_NOUN.context_id
}

/// A registered word, as served by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDictWord {
    pub surface: String,
    pub priority: u32,
    #[serde(default = "default_context_id")]
    pub context_id: i32,
    pub part_of_speech: String,
    pub part_of_speech_detail_1: String,
    pub part_of_speech_detail_2: String,
    pub part_of_speech_detail_3: String,
    pub inflectional_type: String,
    pub inflectional_form: String,
    pub stem: String,
    pub yomi: String,
    pub pronunciation: String,
    pub accent_type: usize,
    #[serde(default)]
    pub mora_count: Option<usize>,
    pub accent_associative_rule: String,
}

/// On-disk form: `cost` replaces `priority`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveFormatUserDictWord {
    pub surface: String,
    pub cost: i32,
    #[serde(default)]
    pub context_id: Option<i32>,
    pub part_of_speech: String,
    pub part_of_speech_detail_1: String,
    pub part_of_speech_detail_2: String,
    pub part_of_speech_detail_3: String,
    pub inflectional_type: String,
    pub inflectional_form: String,
    pub stem: String,
    pub yomi: String,
    pub pronunciation: String,
    pub accent_type: usize,
    #[serde(default)]
    pub mora_count: Option<usize>,
    pub accent_associative_rule: String,
}

/// The fields a client supplies when adding or rewriting a word.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WordProperty {
    pub surface: String,
    pub pronunciation: String,
    pub accent_type: usize,
    #[serde(default)]
    pub word_type: Option<WordType>,
    #[serde(default)]
    pub priority: Option<u32>,
}

impl UserDictWord {
    /// Normalize the surface, check the pronunciation and fill in the mora
    /// count.
    pub fn validated(mut self) -> Result<Self, UserDictError> {
        if self.priority > MAX_PRIORITY {
            return Err(UserDictError::InvalidWord(format!(
                "priority must be within {MIN_PRIORITY}..={MAX_PRIORITY}, got {}",
                self.priority
            )));
        }
        self.surface = to_zenkaku(&self.surface);
        if self.surface.is_empty() {
            return Err(UserDictError::InvalidWord("surface must not be empty".to_string()));
        }
        self.check_csv_fields()?;
        check_pronunciation(&self.pronunciation)?;
        let mora_count = match self.mora_count {
            Some(count) => count,
            None => count_moras(&self.pronunciation),
        };
        if self.accent_type > mora_count {
            return Err(UserDictError::InvalidWord(format!(
                "誤ったアクセント型です({})。 expect: 0 <= accent_type <= {mora_count}",
                self.accent_type
            )));
        }
        self.mora_count = Some(mora_count);
        Ok(self)
    }

    // Every text field becomes one lexicon column.
    fn check_csv_fields(&self) -> Result<(), UserDictError> {
        let fields = [
            ("surface", &self.surface),
            ("part_of_speech", &self.part_of_speech),
            ("part_of_speech_detail_1", &self.part_of_speech_detail_1),
            ("part_of_speech_detail_2", &self.part_of_speech_detail_2),
            ("part_of_speech_detail_3", &self.part_of_speech_detail_3),
            ("inflectional_type", &self.inflectional_type),
            ("inflectional_form", &self.inflectional_form),
            ("stem", &self.stem),
            ("yomi", &self.yomi),
            ("pronunciation", &self.pronunciation),
            ("accent_associative_rule", &self.accent_associative_rule),
        ];
        for (name, value) in fields {
            if value.contains([',', '"', '\r', '\n']) {
                return Err(UserDictError::InvalidWord(format!(
                    "{name} must not contain commas, quotes or line breaks"
                )));
            }
        }
        Ok(())
    }

    /// Check the part-of-speech columns against the word type they claim.
    pub fn check_part_of_speech(&self) -> Result<(), UserDictError> {
        let pos = part_of_speech_by_context(self.context_id)?;
        let consistent = self.part_of_speech == pos.part_of_speech
            && self.part_of_speech_detail_1 == pos.part_of_speech_detail_1
            && self.part_of_speech_detail_2 == pos.part_of_speech_detail_2
            && self.part_of_speech_detail_3 == pos.part_of_speech_detail_3
            && pos
                .accent_associative_rules
                .contains(&self.accent_associative_rule.as_str());
        if consistent {
            Ok(())
        } else {
            Err(UserDictError::UnsupportedPartOfSpeech(self.context_id))
        }
    }

    /// One MeCab CSV row for the lexicon.
    pub fn to_csv_row(&self) -> Result<String, UserDictError> {
        let cost = priority2cost(self.context_id, self.priority)?;
        let mora_count = self
            .mora_count
            .unwrap_or_else(|| count_moras(&self.pronunciation));
        Ok(format!(
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{}/{},{}",
            self.surface,
            self.context_id,
            self.context_id,
            cost,
            self.part_of_speech,
            self.part_of_speech_detail_1,
            self.part_of_speech_detail_2,
            self.part_of_speech_detail_3,
            self.inflectional_type,
            self.inflectional_form,
            self.stem,
            self.yomi,
            self.pronunciation,
            self.accent_type,
            mora_count,
            self.accent_associative_rule,
        ))
    }

    pub fn to_save_format(&self) -> Result<SaveFormatUserDictWord, UserDictError> {
        Ok(SaveFormatUserDictWord {
            surface: self.surface.clone(),
            cost: priority2cost(self.context_id, self.priority)?,
            context_id: Some(self.context_id),
            part_of_speech: self.part_of_speech.clone(),
            part_of_speech_detail_1: self.part_of_speech_detail_1.clone(),
            part_of_speech_detail_2: self.part_of_speech_detail_2.clone(),
            part_of_speech_detail_3: self.part_of_speech_detail_3.clone(),
            inflectional_type: self.inflectional_type.clone(),
            inflectional_form: self.inflectional_form.clone(),
            stem: self.stem.clone(),
            yomi: self.yomi.clone(),
            pronunciation: self.pronunciation.clone(),
            accent_type: self.accent_type,
            mora_count: self.mora_count,
            accent_associative_rule: self.accent_associative_rule.clone(),
        })
    }
}

impl SaveFormatUserDictWord {
    /// Words saved before context ids existed are proper nouns.
    pub fn into_word(self) -> Result<UserDictWord, UserDictError> {
        let context_id = self.context_id.unwrap_or(PROPER_NOUN.context_id);
        let priority = cost2priority(context_id, self.cost)?;
        UserDictWord {
            surface: self.surface,
            priority,
            context_id,
            part_of_speech: self.part_of_speech,
            part_of_speech_detail_1: self.part_of_speech_detail_1,
            part_of_speech_detail_2: self.part_of_speech_detail_2,
            part_of_speech_detail_3: self.part_of_speech_detail_3,
            inflectional_type: self.inflectional_type,
            inflectional_form: self.inflectional_form,
            stem: self.stem,
            yomi: self.yomi,
            pronunciation: self.pronunciation,
            accent_type: self.accent_type,
            mora_count: self.mora_count,
            accent_associative_rule: self.accent_associative_rule,
        }
        .validated()
    }
}

/// Build a validated word from client input.
pub fn create_word(property: WordProperty) -> Result<UserDictWord, UserDictError> {
    let word_type = property.word_type.unwrap_or(WordType::ProperNoun);
    let priority = property.priority.unwrap_or(DEFAULT_PRIORITY);
    let pos = word_type.part_of_speech();
    UserDictWord {
        surface: property.surface,
        priority,
        context_id: pos.context_id,
        part_of_speech: pos.part_of_speech.to_string(),
        part_of_speech_detail_1: pos.part_of_speech_detail_1.to_string(),
        part_of_speech_detail_2: pos.part_of_speech_detail_2.to_string(),
        part_of_speech_detail_3: pos.part_of_speech_detail_3.to_string(),
        inflectional_type: "*".to_string(),
        inflectional_form: "*".to_string(),
        stem: "*".to_string(),
        yomi: property.pronunciation.clone(),
        pronunciation: property.pronunciation,
        accent_type: property.accent_type,
        mora_count: None,
        accent_associative_rule: "*".to_string(),
    }
    .validated()
}

/// Fold printable ASCII to its full-width form.
pub fn to_zenkaku(surface: &str) -> String {
    surface
        .chars()
        .map(|c| match c {
            '\u{21}'..='\u{7E}' => char::from_u32(c as u32 + 0xFEE0).unwrap_or(c),
            _ => c,
        })
        .collect()
}

const SUTEGANA: [char; 10] = ['ァ', 'ィ', 'ゥ', 'ェ', 'ォ', 'ャ', 'ュ', 'ョ', 'ヮ', 'ッ'];

fn katakana_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[ァ-ヴー]+$").expect("static regex"))
}

fn mora_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let others = "[イ][ェ]|[ヴ][ャュョ]|[トド][ゥ]|[テデ][ィャュョ]|[デ][ェ]|[クグ][ヮ]";
        let line_i = "[キシチニヒミリギジビピ][ェャュョ]";
        let line_u = "[ツフヴ][ァ]|[ウスツフヴズ][ィ]|[ウツフヴ][ェォ]";
        let one = "[ァ-ヴー]";
        Regex::new(&format!("(?:{others}|{line_i}|{line_u}|{one})")).expect("static regex")
    })
}

/// Reject pronunciations that are not plain katakana or that stack small
/// kana in ways no mora can spell.
pub fn check_pronunciation(pronunciation: &str) -> Result<(), UserDictError> {
    if !katakana_regex().is_match(pronunciation) {
        return Err(UserDictError::InvalidWord(
            "発音は有効なカタカナでなくてはいけません。".to_string(),
        ));
    }
    let chars: Vec<char> = pronunciation.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if SUTEGANA.contains(&c) {
            if let Some(&next) = chars.get(i + 1) {
                let small_follows = SUTEGANA[..SUTEGANA.len() - 1].contains(&next);
                let double_sokuon = c == 'ッ' && next == 'ッ';
                if small_follows || double_sokuon {
                    return Err(UserDictError::InvalidWord(
                        "無効な発音です。(捨て仮名の連続)".to_string(),
                    ));
                }
            }
        }
        if c == 'ヮ' && i != 0 && !matches!(chars[i - 1], 'ク' | 'グ') {
            return Err(UserDictError::InvalidWord(
                "無効な発音です。(「くゎ」「ぐゎ」以外の「ゎ」の使用)".to_string(),
            ));
        }
    }
    Ok(())
}

pub fn count_moras(pronunciation: &str) -> usize {
    mora_regex().find_iter(pronunciation).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn property(surface: &str, pronunciation: &str, accent_type: usize) -> WordProperty {
        WordProperty {
            surface: surface.to_string(),
            pronunciation: pronunciation.to_string(),
            accent_type,
            word_type: None,
            priority: None,
        }
    }

    #[test]
    fn create_word_fills_proper_noun_defaults() {
        let word = create_word(property("test", "テスト", 1)).expect("valid word");
        assert_eq!(word.surface, "ｔｅｓｔ");
        assert_eq!(word.context_id, 1348);
        assert_eq!(word.priority, DEFAULT_PRIORITY);
        assert_eq!(word.mora_count, Some(3));
        assert_eq!(word.yomi, "テスト");
    }

    #[test]
    fn rejects_bad_pronunciations() {
        for bad in ["てすと", "テスト1", "キャァ", "アッッ", "アヮ"] {
            assert!(create_word(property("x", bad, 0)).is_err(), "{bad}");
        }
        // A small kana followed by ッ is fine, and so is クヮ.
        assert!(create_word(property("x", "キャッ", 0)).is_ok());
        assert!(create_word(property("x", "クヮシ", 0)).is_ok());
    }

    #[test]
    fn accent_type_is_bounded_by_mora_count() {
        assert!(create_word(property("x", "テスト", 3)).is_ok());
        assert!(create_word(property("x", "テスト", 4)).is_err());
    }

    #[test]
    fn counts_moras_with_compound_kana() {
        assert_eq!(count_moras("ファイル"), 3);
        assert_eq!(count_moras("ティーシャツ"), 4);
        assert_eq!(count_moras("キャット"), 3);
    }

    #[test]
    fn priority_and_cost_round_trip_through_candidates() {
        let ctx = WordType::CommonNoun.part_of_speech().context_id;
        assert_eq!(priority2cost(ctx, 10).expect("cost"), -4445);
        assert_eq!(priority2cost(ctx, 0).expect("cost"), 15001);
        for p in MIN_PRIORITY..=MAX_PRIORITY {
            let cost = priority2cost(ctx, p).expect("cost");
            assert_eq!(cost2priority(ctx, cost).expect("priority"), p);
        }
        // Nearest candidate wins.
        assert_eq!(cost2priority(ctx, 60).expect("priority"), 9);
        assert!(priority2cost(ctx, 11).is_err());
        assert!(priority2cost(999, 5).is_err());
    }

    #[test]
    fn save_format_without_context_id_is_a_proper_noun() {
        let json = r#"{
            "surface": "ｔｅｓｔ", "cost": 8609, "part_of_speech": "名詞",
            "part_of_speech_detail_1": "固有名詞", "part_of_speech_detail_2": "一般",
            "part_of_speech_detail_3": "*", "inflectional_type": "*",
            "inflectional_form": "*", "stem": "*", "yomi": "テスト",
            "pronunciation": "テスト", "accent_type": 1, "accent_associative_rule": "*"
        }"#;
        let saved: SaveFormatUserDictWord = serde_json::from_str(json).expect("save format");
        let word = saved.into_word().expect("valid word");
        assert_eq!(word.context_id, 1348);
        assert_eq!(word.priority, 5);
    }

    #[test]
    fn csv_row_uses_cost_and_mora_count() {
        let word = create_word(property("東京", "トウキョウ", 0)).expect("valid word");
        assert_eq!(
            word.to_csv_row().expect("row"),
            "東京,1348,1348,8609,名詞,固有名詞,一般,*,*,*,*,トウキョウ,トウキョウ,0/4,*"
        );
    }

    #[test]
    fn part_of_speech_must_match_context() {
        let mut word = create_word(property("x", "エックス", 1)).expect("valid word");
        assert!(word.check_part_of_speech().is_ok());
        word.part_of_speech = "動詞".to_string();
        assert!(word.check_part_of_speech().is_err());
        word.context_id = 1;
        assert!(matches!(
            word.check_part_of_speech(),
            Err(UserDictError::UnsupportedPartOfSpeech(1))
        ));
    }

    #[test]
    fn word_type_parses_from_query_strings() {
        assert_eq!("SUFFIX".parse::<WordType>().expect("word type"), WordType::Suffix);
        assert!("NOUN".parse::<WordType>().is_err());
    }
}

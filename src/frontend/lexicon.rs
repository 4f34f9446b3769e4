use std::collections::HashMap;
use std::path::Path;

use super::g2p::normalize;

#[derive(thiserror::Error, Debug)]
pub enum LexiconError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Line {line}: expected at least 15 columns, found {found}")]
    Columns { line: usize, found: usize },
    #[error("Line {line}: invalid cost {value:?}")]
    Cost { line: usize, value: String },
}

/// How a noun joins the accent phrase of a preceding noun.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainRule {
    /// `*`: always starts its own phrase.
    None,
    C1,
    C2,
    C3,
    C4,
    C5,
}

impl ChainRule {
    /// Parse the chain-rule column. Entries such as `C1,F2` or `名詞%F1`
    /// use the first `C` rule they name.
    pub fn parse(field: &str) -> Self {
        field
            .split(|c: char| c == ',' || c == '/')
            .find_map(|rule| match rule.trim() {
                "C1" => Some(Self::C1),
                "C2" => Some(Self::C2),
                "C3" => Some(Self::C3),
                "C4" => Some(Self::C4),
                "C5" => Some(Self::C5),
                _ => None,
            })
            .unwrap_or(Self::None)
    }

}

/// One dictionary row.
#[derive(Debug, Clone, PartialEq)]
pub struct LexiconEntry {
    pub surface: String,
    pub cost: i32,
    pub pos: String,
    pub pos_detail: [String; 3],
    /// Katakana pronunciation.
    pub pronunciation: String,
    /// 0 for a flat word.
    pub accent_type: usize,
    pub chain_rule: ChainRule,
}

/// Surface-keyed word list with longest-match lookup.
#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    entries: HashMap<String, Vec<LexiconEntry>>,
    max_surface_chars: usize,
}

impl Lexicon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, LexiconError> {
        let content = std::fs::read_to_string(path)?;
        let lexicon = Self::from_csv(&content)?;
        log::info!("Loaded {} lexicon entries from {}", lexicon.len(), path.display());
        Ok(lexicon)
    }

    /// Parse MeCab-format CSV rows.
    ///
    /// Rows with neither a pronunciation nor a reading are skipped.
    pub fn from_csv(content: &str) -> Result<Self, LexiconError> {
        let mut lexicon = Self::new();
        lexicon.extend_from_csv(content)?;
        Ok(lexicon)
    }

    pub fn extend_from_csv(&mut self, content: &str) -> Result<(), LexiconError> {
        for (idx, raw) in content.lines().enumerate() {
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            if let Some(entry) = parse_row(line, idx + 1)? {
                self.insert(entry);
            }
        }
        Ok(())
    }

    /// Entries are keyed by their width-folded surface, the form
    /// [`TextAnalyzer`](super::TextAnalyzer) looks text up in.
    pub fn insert(&mut self, entry: LexiconEntry) {
        let key = normalize(&entry.surface);
        self.max_surface_chars = self.max_surface_chars.max(key.chars().count());
        self.entries.entry(key).or_default().push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lowest-cost entry for `surface`, in either width.
    pub fn get(&self, surface: &str) -> Option<&LexiconEntry> {
        self.lookup(&normalize(surface))
    }

    fn lookup(&self, key: &str) -> Option<&LexiconEntry> {
        self.entries
            .get(key)
            .and_then(|candidates| candidates.iter().min_by_key(|e| e.cost))
    }

    /// Longest entry whose surface starts at `chars[start]`, with its length
    /// in chars. `chars` must already be normalized.
    pub fn longest_match(&self, chars: &[char], start: usize) -> Option<(&LexiconEntry, usize)> {
        let available = chars.len().saturating_sub(start);
        let mut surface = String::new();
        let mut best = None;
        for n in 1..=self.max_surface_chars.min(available) {
            surface.push(chars[start + n - 1]);
            if let Some(entry) = self.lookup(&surface) {
                best = Some((entry, n));
            }
        }
        best
    }
}

fn parse_row(line: &str, line_no: usize) -> Result<Option<LexiconEntry>, LexiconError> {
    let fields = split_csv(line);
    if fields.len() < 15 {
        return Err(LexiconError::Columns {
            line: line_no,
            found: fields.len(),
        });
    }

    let cost = fields[3].trim().parse::<i32>().map_err(|_| LexiconError::Cost {
        line: line_no,
        value: fields[3].clone(),
    })?;

    let pronunciation = [&fields[12], &fields[11]]
        .into_iter()
        .find(|f| !f.is_empty() && f.as_str() != "*")
        .cloned();
    let Some(pronunciation) = pronunciation else {
        log::debug!("Skipping lexicon line {line_no}: no pronunciation");
        return Ok(None);
    };

    let accent_type = fields[13]
        .split('/')
        .next()
        .and_then(|a| a.trim().parse::<usize>().ok())
        .unwrap_or(0);

    Ok(Some(LexiconEntry {
        surface: fields[0].clone(),
        cost,
        pos: fields[4].clone(),
        pos_detail: [fields[5].clone(), fields[6].clone(), fields[7].clone()],
        pronunciation,
        accent_type,
        chain_rule: ChainRule::parse(&fields[14..].join(",")),
    }))
}

/// Split one CSV line, honoring double-quoted fields.
fn split_csv(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Phoneme inventory in model order. The index of a phoneme is its id.
pub const PHONEME_LIST: [&str; 45] = [
    "pau", "A", "E", "I", "N", "O", "U", "a", "b", "by", "ch", "cl", "d", "dy", "e", "f", "g",
    "gw", "gy", "h", "hy", "i", "j", "k", "kw", "ky", "m", "my", "n", "ny", "o", "p", "py", "r",
    "ry", "s", "sh", "t", "ts", "ty", "u", "v", "w", "y", "z",
];

/// Number of entries in the one-hot phoneme vector fed to the decoder.
pub const PHONEME_SIZE: usize = PHONEME_LIST.len();

pub const PAU: &str = "pau";

/// Vowels whose mora is rendered without pitch.
pub const UNVOICED_MORA_PHONEMES: [&str; 7] = ["A", "I", "U", "E", "O", "cl", "pau"];

pub fn phoneme_id(phoneme: &str) -> Option<i64> {
    PHONEME_LIST
        .iter()
        .position(|&p| p == phoneme)
        .map(|i| i as i64)
}

pub fn is_unvoiced_mora(vowel: &str) -> bool {
    UNVOICED_MORA_PHONEMES.contains(&vowel)
}

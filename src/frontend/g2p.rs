//! Readings for text the lexicon does not cover.

/// Fold full-width ASCII and the ideographic space to half-width.
pub fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{FF01}'..='\u{FF5E}' => char::from_u32(c as u32 - 0xFEE0).unwrap_or(c),
            '\u{3000}' => ' ',
            _ => c,
        })
        .collect()
}

/// Katakana name of an ASCII letter.
pub fn letter_reading(c: char) -> Option<&'static str> {
    let reading = match c.to_ascii_uppercase() {
        'A' => "エー",
        'B' => "ビー",
        'C' => "シー",
        'D' => "ディー",
        'E' => "イー",
        'F' => "エフ",
        'G' => "ジー",
        'H' => "エイチ",
        'I' => "アイ",
        'J' => "ジェー",
        'K' => "ケー",
        'L' => "エル",
        'M' => "エム",
        'N' => "エヌ",
        'O' => "オー",
        'P' => "ピー",
        'Q' => "キュー",
        'R' => "アール",
        'S' => "エス",
        'T' => "ティー",
        'U' => "ユー",
        'V' => "ブイ",
        'W' => "ダブリュー",
        'X' => "エックス",
        'Y' => "ワイ",
        'Z' => "ゼット",
        _ => return None,
    };
    Some(reading)
}

const DIGITS: [&str; 10] = ["ゼロ", "イチ", "ニ", "サン", "ヨン", "ゴ", "ロク", "ナナ", "ハチ", "キュウ"];

/// `10^4k` unit names up to 京.
const MYRIADS: [&str; 5] = ["", "マン", "オク", "チョウ", "ケイ"];

/// Read an ASCII digit string, with an optional `.` decimal part.
///
/// Integers up to 10^20 - 1 are read positionally. Longer runs and numbers
/// with leading zeros are read digit by digit.
pub fn read_number(digits: &str) -> String {
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits, None),
    };

    let mut out = if int_part.len() > 1 && int_part.starts_with('0') {
        read_digits(int_part)
    } else if int_part.len() > MYRIADS.len() * 4 {
        read_digits(int_part)
    } else {
        read_integer(int_part)
    };

    if let Some(frac) = frac_part.filter(|f| !f.is_empty()) {
        out.push_str("テン");
        out.push_str(&read_digits(frac));
    }
    out
}

fn read_digits(digits: &str) -> String {
    digits
        .bytes()
        .filter(u8::is_ascii_digit)
        .map(|b| DIGITS[usize::from(b - b'0')])
        .collect()
}

fn read_integer(digits: &str) -> String {
    let values: Vec<usize> = digits
        .bytes()
        .filter(u8::is_ascii_digit)
        .map(|b| usize::from(b - b'0'))
        .collect();
    if values.iter().all(|&d| d == 0) {
        return DIGITS[0].to_string();
    }

    let mut out = String::new();
    // Walk 4-digit groups from the most significant one.
    let groups = values.len().div_ceil(4);
    for g in 0..groups {
        let end = values.len() - (groups - 1 - g) * 4;
        let start = end.saturating_sub(4);
        let group = &values[start..end];
        let mut padded = [0usize; 4];
        padded[4 - group.len()..].copy_from_slice(group);
        let myriad = groups - 1 - g;
        if padded.iter().all(|&d| d == 0) {
            continue;
        }
        out.push_str(&read_group(padded, myriad));
        out.push_str(MYRIADS[myriad]);
    }
    out
}

/// Read one group of four digits `[thousands, hundreds, tens, ones]`.
fn read_group(group: [usize; 4], myriad: usize) -> String {
    let [th, hu, te, on] = group;
    let mut out = String::new();
    match th {
        0 => {}
        1 if myriad == 0 => out.push_str("セン"),
        1 => out.push_str("イッセン"),
        3 => out.push_str("サンゼン"),
        8 => out.push_str("ハッセン"),
        d => {
            out.push_str(DIGITS[d]);
            out.push_str("セン");
        }
    }
    match hu {
        0 => {}
        1 => out.push_str("ヒャク"),
        3 => out.push_str("サンビャク"),
        6 => out.push_str("ロッピャク"),
        8 => out.push_str("ハッピャク"),
        d => {
            out.push_str(DIGITS[d]);
            out.push_str("ヒャク");
        }
    }
    match te {
        0 => {}
        1 => out.push_str("ジュウ"),
        d => {
            out.push_str(DIGITS[d]);
            out.push_str("ジュウ");
        }
    }
    // 一兆 and 一京 geminate; a bare 一 before 万/億 is still read イチ.
    match (on, myriad) {
        (0, _) => {}
        (1, 3) if th + hu + te == 0 => out.push_str("イッ"),
        (1, 4) if th + hu + te == 0 => out.push_str("イッ"),
        (d, _) => out.push_str(DIGITS[d]),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{letter_reading, normalize, read_number};

    #[test]
    fn folds_full_width_ascii() {
        assert_eq!(normalize("ＡＢＣ１２３！　？"), "ABC123! ?");
        assert_eq!(normalize("、。"), "、。");
    }

    #[test]
    fn reads_small_numbers() {
        assert_eq!(read_number("0"), "ゼロ");
        assert_eq!(read_number("7"), "ナナ");
        assert_eq!(read_number("10"), "ジュウ");
        assert_eq!(read_number("21"), "ニジュウイチ");
        assert_eq!(read_number("300"), "サンビャク");
        assert_eq!(read_number("1000"), "セン");
        assert_eq!(read_number("8000"), "ハッセン");
    }

    #[test]
    fn reads_myriad_units() {
        assert_eq!(read_number("10000"), "イチマン");
        assert_eq!(read_number("12345"), "イチマンニセンサンビャクヨンジュウゴ");
        assert_eq!(read_number("100000000"), "イチオク");
        assert_eq!(read_number("1000000000000"), "イッチョウ");
        assert_eq!(read_number("10000000"), "イッセンマン");
    }

    #[test]
    fn reads_decimals_and_leading_zeros() {
        assert_eq!(read_number("3.14"), "サンテンイチヨン");
        assert_eq!(read_number("007"), "ゼロゼロナナ");
    }

    #[test]
    fn letters_are_read_by_name() {
        assert_eq!(letter_reading('a'), Some("エー"));
        assert_eq!(letter_reading('W'), Some("ダブリュー"));
        assert_eq!(letter_reading('1'), None);
    }
}

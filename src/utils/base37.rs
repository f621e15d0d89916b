//! Base-37 packing of player names into a `u64`.
//!
//! Letters are case-folded, digits follow the alphabet, and anything else becomes the `_`
//! separator. At most twelve characters are encoded.

const ALPHABET: &[u8; 37] = b"_abcdefghijklmnopqrstuvwxyz0123456789";

/// Twelve characters of base 37 is the largest valid encoding.
const MAX_ENCODED: u64 = 6_582_952_005_840_035_281;

pub const MAX_NAME_LENGTH: usize = 12;

pub fn encode(name: &str) -> u64 {
    name.trim()
        .bytes()
        .take(MAX_NAME_LENGTH)
        .fold(0u64, |acc, c| {
            let digit = match c {
                b'A'..=b'Z' => u64::from(c - b'A') + 1,
                b'a'..=b'z' => u64::from(c - b'a') + 1,
                b'0'..=b'9' => u64::from(c - b'0') + 27,
                _ => 0,
            };
            acc * 37 + digit
        })
}

/// Decode to the raw lowercase form, or `None` for values no name can produce.
pub fn decode(mut value: u64) -> Option<String> {
    if value >= MAX_ENCODED {
        return None;
    }
    let mut chars = Vec::with_capacity(MAX_NAME_LENGTH);
    while value != 0 {
        chars.push(ALPHABET[(value % 37) as usize]);
        value /= 37;
    }
    chars.reverse();
    Some(chars.into_iter().map(char::from).collect())
}

/// Display form: separators become spaces and each word is capitalised.
pub fn to_display_name(raw: &str) -> String {
    raw.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        for name in ["zezima", "a", "mod_ash", "player99", "abcdefghijkl"] {
            assert_eq!(decode(encode(name)).as_deref(), Some(name));
        }
    }

    #[test]
    fn case_and_separator_folding() {
        assert_eq!(encode("Mod Ash"), encode("mod_ash"));
        assert_eq!(encode("  bob  "), encode("bob"));
        assert_eq!(encode("abcdefghijklmnop"), encode("abcdefghijkl"));
    }

    #[test]
    fn rejects_overflowing_values() {
        assert_eq!(decode(u64::MAX), None);
        assert_eq!(decode(0).as_deref(), Some(""));
    }

    #[test]
    fn display_name() {
        assert_eq!(to_display_name("mod_ash"), "Mod Ash");
        assert_eq!(to_display_name("zezima"), "Zezima");
    }
}

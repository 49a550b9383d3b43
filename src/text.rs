use crate::errors::{ZError, ZResult};
use crate::story::Story;
use crate::util::{lookup_char, read_zchars_from_word, Alphabet, Zchar};
use log::trace;

/// A decoded z-string together with its encoded byte length. The length is
/// the number of z-text words consumed times two; the instruction decoder
/// needs it to account for inline text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    pub length: usize,
}

/// Decoder state between z-chars.
#[derive(Debug, Clone, Copy)]
enum DecodeState {
    /// Reading ordinary characters from one of the three alphabets.
    Alphabet(Alphabet),
    /// A z-char 1..3 was seen; the next z-char selects an abbreviation
    /// within the bank starting at this index.
    Abbreviation(u16),
    /// An A2 escape was seen; the next z-char is the high half of a
    /// 10-bit literal.
    Leading,
    /// High half in hand; the next z-char completes the literal.
    Trailing(Zchar),
}

/// Decode the z-string starting at `addr`.
pub fn decode_string(story: &Story, addr: u32) -> ZResult<DecodedText> {
    decode_inner(story, addr, true)
}

/// Decode abbreviation contents; abbreviation codes are rejected here
/// because v3 forbids nesting them.
fn decode_abbreviation(story: &Story, index: u16) -> ZResult<String> {
    let addr = story.abbreviation_address(index)?;
    Ok(decode_inner(story, addr, false)?.text)
}

fn decode_inner(story: &Story, addr: u32, allow_abbrev: bool) -> ZResult<DecodedText> {
    let mut text = String::new();
    let mut state = DecodeState::Alphabet(Alphabet::A0);
    let mut offset = addr;

    loop {
        let word = story.read_word(offset)?;
        offset += 2;
        let unpacked =
            read_zchars_from_word(word).map_err(|_| ZError::AddressOutOfRange(offset - 2))?;
        trace!(
            "z-word {word:04x} at {:#06x} = {:?}, last={}",
            offset - 2,
            unpacked.chars,
            unpacked.last
        );

        for zc in unpacked.chars {
            state = match (state, zc) {
                (DecodeState::Alphabet(_), 0) => {
                    text.push(' ');
                    state
                }
                (DecodeState::Alphabet(_), 1..=3) => {
                    if !allow_abbrev {
                        return Err(ZError::NestedAbbreviation);
                    }
                    DecodeState::Abbreviation(32 * (zc as u16 - 1))
                }
                (DecodeState::Alphabet(_), 4) => DecodeState::Alphabet(Alphabet::A1),
                (DecodeState::Alphabet(_), 5) => DecodeState::Alphabet(Alphabet::A2),
                (DecodeState::Alphabet(Alphabet::A2), 6) => DecodeState::Leading,
                (DecodeState::Alphabet(a), _) => {
                    text.push(lookup_char(zc, a) as char);
                    DecodeState::Alphabet(Alphabet::A0)
                }
                (DecodeState::Abbreviation(base), _) => {
                    let expansion = decode_abbreviation(story, base + zc as u16)?;
                    text.push_str(&expansion);
                    DecodeState::Alphabet(Alphabet::A0)
                }
                (DecodeState::Leading, _) => DecodeState::Trailing(zc),
                (DecodeState::Trailing(high), _) => {
                    let code = (high as u32) * 32 + zc as u32;
                    if let Some(c) = char::from_u32(code) {
                        text.push(c);
                    }
                    DecodeState::Alphabet(Alphabet::A0)
                }
            };
        }

        if unpacked.last {
            return Ok(DecodedText {
                text,
                length: (offset - addr) as usize,
            });
        }
    }
}

/// Encode A0 text (lowercase letters and spaces) into z-text words, padded
/// with shift-5 and end-marked on the last word.
pub fn encode(text: &str) -> Vec<u16> {
    let mut zchars: Vec<Zchar> = text
        .chars()
        .map(|c| match c {
            'a'..='z' => c as u8 - b'a' + 6,
            _ => 0,
        })
        .collect();
    while zchars.len() % 3 != 0 || zchars.is_empty() {
        zchars.push(5);
    }

    let mut words = Vec::with_capacity(zchars.len() / 3);
    for triple in zchars.chunks(3) {
        words.push(
            ((triple[0] as u16) << 10) | ((triple[1] as u16) << 5) | triple[2] as u16,
        );
    }
    if let Some(last) = words.last_mut() {
        *last |= 0x8000;
    }
    words
}

/// Encode a word for dictionary lookup: six z-chars packed into two words,
/// lowercased, truncated, padded with shift-5.
pub fn encode_dictionary_word(word: &str) -> (u16, u16) {
    let mut chars = Vec::new();
    for ch in word.chars().take(6) {
        let ch = ch.to_ascii_lowercase();
        let code = match ch {
            'a'..='z' => ch as u8 - b'a' + 6,
            _ => 5,
        };
        chars.push(code);
    }
    while chars.len() < 6 {
        chars.push(5);
    }

    let word1 = ((chars[0] as u16) << 10) | ((chars[1] as u16) << 5) | chars[2] as u16;
    let word2 = ((chars[3] as u16) << 10) | ((chars[4] as u16) << 5) | chars[5] as u16;
    (word1, word2 | 0x8000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::load_story;
    use crate::test_fixtures::{tiny_story, tiny_story_bytes};

    fn story_with_text(words: &[u16]) -> (crate::story::Story, u32) {
        let mut bytes = tiny_story_bytes();
        let addr = 0x0520u32;
        for (i, w) in words.iter().enumerate() {
            bytes[addr as usize + 2 * i] = (w >> 8) as u8;
            bytes[addr as usize + 2 * i + 1] = (w & 0xFF) as u8;
        }
        (load_story(bytes).unwrap(), addr)
    }

    fn zw(a: u8, b: u8, c: u8) -> u16 {
        ((a as u16) << 10) | ((b as u16) << 5) | c as u16
    }

    #[test]
    fn test_decode_lowercase_and_space() {
        // "go on"
        let (story, addr) = story_with_text(&[zw(12, 20, 0), zw(20, 19, 5) | 0x8000]);
        let decoded = decode_string(&story, addr).unwrap();
        assert_eq!(decoded.text, "go on");
        assert_eq!(decoded.length, 4);
    }

    #[test]
    fn test_decode_shift_to_uppercase() {
        // shift-4 then 'h', then "i"
        let (story, addr) = story_with_text(&[zw(4, 13, 14) | 0x8000]);
        let decoded = decode_string(&story, addr).unwrap();
        assert_eq!(decoded.text, "Hi");
    }

    #[test]
    fn test_shift_applies_to_one_char_only() {
        // shift-4, 'a', 'b' -> "Ab"
        let (story, addr) = story_with_text(&[zw(4, 6, 7) | 0x8000]);
        assert_eq!(decode_string(&story, addr).unwrap().text, "Ab");
    }

    #[test]
    fn test_decode_a2_digits() {
        // shift-5 then '0' (z-char 8), shift-5 then '9' (z-char 17)
        let (story, addr) = story_with_text(&[zw(5, 8, 5), zw(17, 5, 5) | 0x8000]);
        assert_eq!(decode_string(&story, addr).unwrap().text, "09");
    }

    #[test]
    fn test_decode_ten_bit_literal() {
        // shift-5, escape-6, then 2:1 = 65 = 'A'
        let (story, addr) = story_with_text(&[zw(5, 6, 2), zw(1, 5, 5) | 0x8000]);
        assert_eq!(decode_string(&story, addr).unwrap().text, "A");
    }

    #[test]
    fn test_decode_abbreviation() {
        // abbreviation 0 ("the ") then "end": 1,0 selects abbreviation 0
        let (story, addr) = story_with_text(&[zw(1, 0, 10), zw(19, 9, 5) | 0x8000]);
        assert_eq!(decode_string(&story, addr).unwrap().text, "the end");
    }

    #[test]
    fn test_nested_abbreviation_rejected() {
        // point abbreviation 1 at z-text that itself uses an abbreviation code
        let mut bytes = tiny_story_bytes();
        let nested = 0x05D0u32;
        bytes[0x42] = ((nested / 2) >> 8) as u8;
        bytes[0x43] = ((nested / 2) & 0xFF) as u8;
        let w = zw(1, 0, 5) | 0x8000;
        bytes[nested as usize] = (w >> 8) as u8;
        bytes[nested as usize + 1] = (w & 0xFF) as u8;
        // main string: abbreviation 1
        let main = zw(1, 1, 5) | 0x8000;
        bytes[0x520] = (main >> 8) as u8;
        bytes[0x521] = (main & 0xFF) as u8;
        let story = load_story(bytes).unwrap();
        assert_eq!(
            decode_string(&story, 0x520).unwrap_err(),
            ZError::NestedAbbreviation
        );
    }

    #[test]
    fn test_length_counts_words_consumed() {
        let (story, addr) = story_with_text(&[zw(6, 7, 8), zw(9, 10, 11), zw(5, 5, 5) | 0x8000]);
        assert_eq!(decode_string(&story, addr).unwrap().length, 6);
    }

    #[test]
    fn test_encode_decode_round_trip() {
        for s in ["", "a", "hello", "hello world", "the quick brown fox"] {
            let words = encode(s);
            // reported encoded length = 2 * ceil(zchars / 3)
            let zchars = s.len().max(1);
            assert_eq!(words.len() * 2, 2 * zchars.div_ceil(3));

            let (story, addr) = story_with_text(&words);
            let decoded = decode_string(&story, addr).unwrap();
            assert_eq!(decoded.text, s);
            assert_eq!(decoded.length, words.len() * 2);
        }
    }

    #[test]
    fn test_encode_dictionary_word() {
        let (w1, w2) = encode_dictionary_word("look");
        assert_eq!(w1, zw(17, 20, 20));
        assert_eq!(w2, zw(16, 5, 5) | 0x8000);

        // truncated to six z-chars
        let (w1, w2) = encode_dictionary_word("northeast");
        assert_eq!(w1, zw(19, 20, 23));
        assert_eq!(w2, zw(25, 13, 10) | 0x8000);
    }

    #[test]
    fn test_object_name_decodes() {
        let story = tiny_story();
        assert_eq!(decode_string(&story, 0x15A).unwrap().text, "box");
    }
}

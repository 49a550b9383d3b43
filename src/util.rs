use bitreader::{BitReader, BitReaderError};
use std::collections::HashMap;

///There are three possible alphabets: lower case, upper case, and number/symbol
///
///| Alphabet |   Z-char offset            |
///|----------|----------------------------|
///|          | 6789abcdef0123456789abcdef |
///|  A0      | abcdefghijklmnopqrstuvwxyz |
///|  A1      | ABCDEFGHIJKLMNOPQRSTUVWXYZ |
///|  A2      | ^0123456789.,!?_#'"/\-:()  |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Alphabet {
    A0,
    A1,
    A2,
}

lazy_static! {
    pub static ref ALPHABETMAP: HashMap<Alphabet, &'static str> = {
        let mut m = HashMap::new();
        m.insert(Alphabet::A0, "abcdefghijklmnopqrstuvwxyz");
        m.insert(Alphabet::A1, "ABCDEFGHIJKLMNOPQRSTUVWXYZ");
        m.insert(Alphabet::A2, " \n0123456789.,!?_#'\"/\\-:()");
        m
    };
}

pub type Zchar = u8;

/// The three 5-bit z-chars packed into one z-text word, plus the
/// end-of-string bit from the top of the word.
#[derive(Debug, Clone, Copy)]
pub struct UnpackedZchars {
    pub last: bool,
    pub chars: [Zchar; 3],
}

/// Split a z-text word into its end bit and three 5-bit z-chars.
pub fn read_zchars_from_word(word: u16) -> Result<UnpackedZchars, BitReaderError> {
    let bytes = word.to_be_bytes();
    let mut br = BitReader::new(&bytes);

    // top bit designates 'last chars here'
    let mut pc = UnpackedZchars {
        last: br.read_u8(1)? == 1,
        chars: [0, 0, 0],
    };

    for i in 0..3 {
        pc.chars[i] = br.read_u8(5)?;
    }

    Ok(pc)
}

/// Look up a char in the alphabet mapping
pub fn lookup_char(c: Zchar, alphabet: Alphabet) -> u8 {
    // in the published tables, char mappings start at z-char 6
    ALPHABETMAP[&alphabet].as_bytes()[(c as usize) - 6]
}

/// Canonicalise an arbitrary integer to the signed interpretation of a
/// 16-bit word: the result is in [-32768, 32767] and congruent mod 65536.
pub fn signed_word(n: i32) -> i16 {
    n.rem_euclid(65536) as u16 as i16
}

/// Canonicalise an arbitrary integer to an unsigned 16-bit word.
pub fn unsigned_word(n: i32) -> u16 {
    n.rem_euclid(65536) as u16
}

/// Test a single bit of a word. Bit 0 is the least significant.
pub fn fetch_bit(word: u16, bit: u8) -> bool {
    (word >> bit) & 1 == 1
}

/// Extract `len` bits ending at `high` (inclusive, counting from bit 0).
pub fn fetch_bits(word: u16, high: u8, len: u8) -> u16 {
    let mask = !(0xFFFFu16 << len);
    (word >> (high + 1 - len)) & mask
}

/// Dictionary lookup and input tokenisation.
///
/// Layout at the dictionary base: one byte of separator count, the
/// separator bytes, one byte of entry length, a word of entry count, then
/// fixed-length entries sorted by their 4-byte encoded form.
use crate::errors::ZResult;
use crate::story::Story;
use crate::text;
use log::debug;

/// One word of player input, located within the line it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Dictionary entry address, or 0 when the word is unknown.
    pub dictionary_addr: u16,
    /// Byte offset of the word within the input line.
    pub start: usize,
    pub text: String,
}

impl Story {
    pub fn word_separators(&self) -> ZResult<Vec<u8>> {
        let base = self.dictionary_base()?;
        let count = self.read_byte(base)?;
        let mut seps = Vec::with_capacity(count as usize);
        for i in 0..count as u32 {
            seps.push(self.read_byte(base + 1 + i)?);
        }
        Ok(seps)
    }

    fn dictionary_layout(&self) -> ZResult<(u32, u8, u16)> {
        let base = self.dictionary_base()?;
        let sep_count = self.read_byte(base)? as u32;
        let entry_length = self.read_byte(base + 1 + sep_count)?;
        let entry_count = self.read_word(base + 2 + sep_count)?;
        let entries = base + 4 + sep_count;
        Ok((entries, entry_length, entry_count))
    }

    /// Binary search for a word's dictionary entry; 0 when absent.
    pub fn lookup_word(&self, word: &str) -> ZResult<u16> {
        let (entries, entry_length, entry_count) = self.dictionary_layout()?;
        let (search1, search2) = text::encode_dictionary_word(word);

        let mut low = 0i32;
        let mut high = entry_count as i32 - 1;
        while low <= high {
            let mid = (low + high) / 2;
            let addr = entries + mid as u32 * entry_length as u32;
            let entry1 = self.read_word(addr)?;
            let entry2 = self.read_word(addr + 2)?;

            if (search1, search2) < (entry1, entry2) {
                high = mid - 1;
            } else if (search1, search2) > (entry1, entry2) {
                low = mid + 1;
            } else {
                debug!("dictionary hit for '{word}' at {addr:#06x}");
                return Ok(addr as u16);
            }
        }
        debug!("dictionary miss for '{word}'");
        Ok(0)
    }

    /// Split an input line into tokens. Separator characters form tokens of
    /// their own; whitespace only delimits.
    pub fn tokenize(&self, line: &str) -> ZResult<Vec<Token>> {
        let separators = self.word_separators()?;
        let mut raw: Vec<(usize, String)> = Vec::new();
        let mut start: Option<usize> = None;
        for (i, &b) in line.as_bytes().iter().enumerate() {
            let is_sep = separators.contains(&b);
            if b == b' ' || is_sep {
                if let Some(s) = start.take() {
                    raw.push((s, line[s..i].to_string()));
                }
                if is_sep {
                    raw.push((i, (b as char).to_string()));
                }
            } else if start.is_none() {
                start = Some(i);
            }
        }
        if let Some(s) = start.take() {
            raw.push((s, line[s..].to_string()));
        }

        let mut tokens = Vec::with_capacity(raw.len());
        for (pos, word) in raw {
            tokens.push(Token {
                dictionary_addr: self.lookup_word(&word)?,
                start: pos,
                text: word,
            });
        }
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::tiny_story;

    #[test]
    fn test_separators() {
        let story = tiny_story();
        assert_eq!(story.word_separators().unwrap(), vec![b'.', b',']);
    }

    #[test]
    fn test_lookup_known_words() {
        let story = tiny_story();
        let look = story.lookup_word("look").unwrap();
        let take = story.lookup_word("take").unwrap();
        assert_ne!(look, 0);
        assert_ne!(take, 0);
        assert_ne!(look, take);
        // lookup is case-insensitive via encoding
        assert_eq!(story.lookup_word("LOOK").unwrap(), look);
    }

    #[test]
    fn test_lookup_unknown_word() {
        let story = tiny_story();
        assert_eq!(story.lookup_word("xyzzy").unwrap(), 0);
    }

    #[test]
    fn test_tokenize_splits_on_spaces_and_separators() {
        let story = tiny_story();
        let tokens = story.tokenize("look. take  lamp").unwrap();
        let words: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(words, vec!["look", ".", "take", "lamp"]);
        assert_eq!(tokens[0].start, 0);
        assert_eq!(tokens[1].start, 4);
        assert_eq!(tokens[2].start, 6);
        assert_eq!(tokens[3].start, 12);

        assert_ne!(tokens[0].dictionary_addr, 0);
        assert_ne!(tokens[2].dictionary_addr, 0);
        assert_eq!(tokens[3].dictionary_addr, 0);
    }
}

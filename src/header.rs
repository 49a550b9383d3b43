use crate::errors::ZResult;
use crate::story::Story;
use std::fmt::Display;
use std::fmt::Error;
use std::fmt::Formatter;

/// Header byte offsets. Multi-byte fields are big-endian words.
pub const VERSION: u32 = 0x00;
pub const HIGH_MEMORY_BASE: u32 = 0x04;
pub const INITIAL_PC: u32 = 0x06;
pub const DICTIONARY_BASE: u32 = 0x08;
pub const OBJECT_TABLE_BASE: u32 = 0x0A;
pub const GLOBAL_VARIABLES_BASE: u32 = 0x0C;
pub const STATIC_MEMORY_BASE: u32 = 0x0E;
pub const ABBREVIATIONS_BASE: u32 = 0x18;

/// The header is 64 bytes; a story file shorter than this is not a story.
pub const HEADER_SIZE: usize = 64;

/// A point-in-time snapshot of the header fields, for hosts and debuggers.
/// The story itself re-reads fields on demand, so a snapshot taken before a
/// dynamic write can go stale; take a fresh one when it matters.
pub struct Header {
    pub version: u8,
    pub base_high_mem: u16,
    pub initial_pc: u16,
    pub dictionary: u16,
    pub object_table_addr: u16,
    pub global_variables: u16,
    pub base_static_mem: u16,
    pub abbrev_table: u16,
}

impl Header {
    pub fn snapshot(story: &Story) -> ZResult<Header> {
        Ok(Header {
            version: story.version()?,
            base_high_mem: story.read_word(HIGH_MEMORY_BASE)?,
            initial_pc: story.read_word(INITIAL_PC)?,
            dictionary: story.read_word(DICTIONARY_BASE)?,
            object_table_addr: story.read_word(OBJECT_TABLE_BASE)?,
            global_variables: story.read_word(GLOBAL_VARIABLES_BASE)?,
            base_static_mem: story.read_word(STATIC_MEMORY_BASE)?,
            abbrev_table: story.read_word(ABBREVIATIONS_BASE)?,
        })
    }
}

impl Story {
    /// Header snapshot for hosts and debuggers.
    pub fn header(&self) -> ZResult<Header> {
        Header::snapshot(self)
    }
}

impl Display for Header {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(
            f,
            "
Z-code version:           {}
Size of resident memory:  {:#06x}
Start PC:                 {:#06x}
Dictionary address:       {:#06x}
Object table address:     {:#06x}
Global variables address: {:#06x}
Size of dynamic memory:   {:#06x}
Abbreviations address:    {:#06x}
",
            self.version,
            self.base_high_mem,
            self.initial_pc,
            self.dictionary,
            self.object_table_addr,
            self.global_variables,
            self.base_static_mem,
            self.abbrev_table,
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::test_fixtures::tiny_story;

    #[test]
    fn test_snapshot_reads_fixture_fields() {
        let story = tiny_story();
        let header = story.header().unwrap();
        assert_eq!(header.version, 3);
        assert_eq!(header.initial_pc, 0x0500);
        assert_eq!(header.dictionary, 0x0200);
        assert_eq!(header.object_table_addr, 0x0100);
        assert_eq!(header.global_variables, 0x0300);
        assert_eq!(header.base_static_mem, 0x0600);
        assert_eq!(header.abbrev_table, 0x0040);

        let rendered = format!("{header}");
        assert!(rendered.contains("Start PC:                 0x0500"));
    }
}

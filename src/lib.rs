#![crate_name = "twisty"]

//! A step-driven Z-Machine version-3 core.
//!
//! `load_story` validates a story blob and splits it at the static-memory
//! boundary; `Interpreter::make` positions a machine at the initial
//! program counter. Every `step` consumes one instruction and returns a
//! successor machine; the stepped value stays valid, which is what makes
//! reverse-step debugging cheap. Screen rendering, the debugger shell and
//! file I/O live outside the core and consume its public operations.

#[macro_use]
extern crate lazy_static;

pub mod buffer;
pub mod dictionary;
pub mod disassembler;
pub mod errors;
pub mod header;
pub mod instruction;
pub mod interpreter;
pub mod memory;
pub mod opcode_tables;
pub mod routine;
pub mod story;
pub mod text;
pub mod util;
pub mod zobject;
pub mod zrand;

#[cfg(test)]
pub mod test_fixtures;


pub use errors::{ZError, ZResult};
pub use instruction::{decode_instruction, Instruction};
pub use interpreter::{Frame, Interpreter, RunState};
pub use story::{load_story, Story};

/*
An example memory map of a small game
Dynamic 00000   header
        00040   abbreviation strings
        00042   abbreviation table
        00102   property defaults
        00140   objects
        002f0   object descriptions and properties
        006e3   global variables
        008c3   arrays
Static  00b48   grammar table
        010a7   actions table
        01153   preactions table
        01201   adjectives table
        0124d   dictionary
High    01a0a   Z-code
        05d56   static strings
        06ae6   end of file
*/

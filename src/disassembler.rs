//! Human-readable rendering of decoded instructions and routine listings.

use crate::errors::ZResult;
use crate::instruction::{decode_instruction, BranchTarget, Instruction, Operand, VarRef};
use crate::routine;
use crate::story::Story;
use std::fmt::Write;

fn format_var(var: VarRef) -> String {
    match var {
        VarRef::Stack => "sp".to_string(),
        VarRef::Local(n) => format!("local{n}"),
        VarRef::Global(n) => format!("g{:02x}", n as u16 - 16),
    }
}

fn format_operand(operand: &Operand) -> String {
    match operand {
        Operand::Large(w) => format!("{w:04x}"),
        Operand::Small(b) => format!("{b:02x}"),
        Operand::Variable(var) => format_var(*var),
    }
}

/// Render one decoded instruction as a single listing line.
pub fn display_instruction(instruction: &Instruction) -> String {
    let mut line = format!("{:05x}: {}", instruction.address, instruction.name());

    for operand in &instruction.operands {
        line.push(' ');
        line.push_str(&format_operand(operand));
    }

    if let Some(store) = instruction.store {
        write!(line, " -> {}", format_var(store)).unwrap();
    }

    if let Some(branch) = &instruction.branch {
        let target = match branch.target {
            BranchTarget::ReturnFalse => "rfalse".to_string(),
            BranchTarget::ReturnTrue => "rtrue".to_string(),
            BranchTarget::Address(addr) => format!("{addr:05x}"),
        };
        write!(
            line,
            " ?[{}] {}",
            if branch.sense { "TRUE" } else { "FALSE" },
            target
        )
        .unwrap();
    }

    if let Some(text) = &instruction.text {
        write!(line, " \"{text}\"").unwrap();
    }

    line
}

impl Story {
    /// Decode and render the instruction at `addr`.
    pub fn display_instruction_at(&self, addr: u32) -> ZResult<String> {
        Ok(display_instruction(&decode_instruction(self, addr)?))
    }
}

/// List a whole routine: its header, then every reachable instruction in
/// address order.
pub fn disassemble_routine(story: &Story, addr: u32) -> ZResult<String> {
    let count = routine::locals_count(story, addr)?;
    let mut output = String::new();
    writeln!(output, "{addr:05x}: routine, {count} locals").unwrap();
    for i in 0..count as u32 {
        let default = story.read_word(addr + 1 + 2 * i)?;
        writeln!(output, "{:05x}:   local{} = {default:04x}", addr + 1 + 2 * i, i + 1).unwrap();
    }

    let start = routine::first_instruction(story, addr)?;
    for instruction_addr in routine::reachable(story, start)? {
        writeln!(output, "{}", story.display_instruction_at(instruction_addr)?).unwrap();
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{story_with_code, INITIAL_PC};

    #[test]
    fn test_display_store_and_operands() {
        // add local1 #02 -> sp
        let story = story_with_code(&[0x54, 0x01, 0x02, 0x00]);
        let line = story.display_instruction_at(INITIAL_PC).unwrap();
        assert_eq!(line, "00500: add local1 02 -> sp");
    }

    #[test]
    fn test_display_branch() {
        let story = story_with_code(&[0x90, 0x00, 0xC4]);
        let line = story.display_instruction_at(INITIAL_PC).unwrap();
        assert_eq!(line, "00500: jz 00 ?[TRUE] 00505");
    }

    #[test]
    fn test_display_branch_return() {
        let story = story_with_code(&[0x90, 0x00, 0x41]);
        let line = story.display_instruction_at(INITIAL_PC).unwrap();
        assert_eq!(line, "00500: jz 00 ?[FALSE] rtrue");
    }

    #[test]
    fn test_display_inline_text() {
        // print "hi"
        let word = ((13u16) << 10) | ((14u16) << 5) | 5 | 0x8000;
        let story = story_with_code(&[0xB2, (word >> 8) as u8, (word & 0xFF) as u8]);
        let line = story.display_instruction_at(INITIAL_PC).unwrap();
        assert_eq!(line, "00500: print \"hi\"");
    }

    #[test]
    fn test_display_global_variable() {
        // add g00 #02 -> g05
        let story = story_with_code(&[0x54, 0x10, 0x02, 0x15]);
        let line = story.display_instruction_at(INITIAL_PC).unwrap();
        assert_eq!(line, "00500: add g00 02 -> g05");
    }

    #[test]
    fn test_disassemble_routine_listing() {
        // routine: 1 local defaulting to 7; add local1 #1 -> local1; rtrue
        let story = story_with_code(&[
            0x01, 0x00, 0x07, // header
            0x54, 0x01, 0x01, 0x01, // add local1 01 -> local1
            0xB0, // rtrue
        ]);
        let listing = disassemble_routine(&story, INITIAL_PC).unwrap();
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines[0], "00500: routine, 1 locals");
        assert_eq!(lines[1], "00501:   local1 = 0007");
        assert_eq!(lines[2], "00503: add local1 01 -> local1");
        assert_eq!(lines[3], "00507: rtrue");
    }
}

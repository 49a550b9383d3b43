//! Static analysis over decoded instructions: which addresses a routine
//! can reach, and which routines a story can reach through calls.

use crate::errors::{ZError, ZResult};
use crate::instruction::{decode_instruction, BranchTarget, Instruction, Operand};
use crate::interpreter::MAX_LOCALS;
use crate::opcode_tables::{self, Opcode};
use crate::story::Story;
use log::debug;
use std::collections::BTreeSet;

/// Number of locals declared by the routine header at `addr`.
pub fn locals_count(story: &Story, addr: u32) -> ZResult<u8> {
    let count = story.read_byte(addr)?;
    if count > MAX_LOCALS {
        return Err(ZError::TooManyLocals(count));
    }
    Ok(count)
}

/// Address of the first instruction of the routine at `addr`: past the
/// count byte and one default word per local.
pub fn first_instruction(story: &Story, addr: u32) -> ZResult<u32> {
    Ok(addr + 1 + 2 * locals_count(story, addr)? as u32)
}

/// Instruction addresses that can follow `instruction`: the next address
/// when the opcode falls through, plus any branch or jump target.
fn successors(instruction: &Instruction) -> Vec<u32> {
    let mut targets = Vec::new();
    if opcode_tables::continues(instruction.opcode) {
        targets.push(instruction.next_address());
    }
    if let Some(branch) = &instruction.branch {
        if let BranchTarget::Address(addr) = branch.target {
            targets.push(addr);
        }
    }
    if instruction.opcode == Opcode::Jump {
        if let Some(Operand::Large(target)) = instruction.operands.first() {
            targets.push(*target);
        }
    }
    targets
}

/// All instruction addresses reachable from `addr` by following
/// fall-through, branches and jumps. Sorted.
pub fn reachable(story: &Story, addr: u32) -> ZResult<Vec<u32>> {
    let mut seen = BTreeSet::new();
    let mut work = vec![addr];
    while let Some(current) = work.pop() {
        if !seen.insert(current) {
            continue;
        }
        let instruction = decode_instruction(story, current)?;
        for target in successors(&instruction) {
            if !seen.contains(&target) {
                work.push(target);
            }
        }
    }
    Ok(seen.into_iter().collect())
}

/// Routine addresses called from the instruction stream starting at
/// `start`. Only statically-known (large constant) call targets count.
fn call_targets(story: &Story, start: u32) -> ZResult<Vec<u32>> {
    let mut targets = Vec::new();
    for addr in reachable(story, start)? {
        let instruction = decode_instruction(story, addr)?;
        if opcode_tables::is_call(instruction.opcode) {
            if let Some(Operand::Large(routine)) = instruction.operands.first() {
                if *routine != 0 {
                    targets.push(*routine);
                }
            }
        }
    }
    Ok(targets)
}

/// Every routine transitively callable from the story's initial
/// instruction stream: the fixed point of call-target extraction. Sorted
/// routine header addresses.
pub fn all_routines(story: &Story) -> ZResult<Vec<u32>> {
    let mut known: BTreeSet<u32> = BTreeSet::new();
    let mut work = call_targets(story, story.initial_pc()?)?;
    while let Some(routine) = work.pop() {
        if !known.insert(routine) {
            continue;
        }
        let start = first_instruction(story, routine)?;
        for target in call_targets(story, start)? {
            if !known.contains(&target) {
                work.push(target);
            }
        }
    }
    debug!("routine discovery found {} routines", known.len());
    Ok(known.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{story_with_code, INITIAL_PC};

    #[test]
    fn test_straight_line_reachability() {
        // add #1 #2 -> sp; rtrue
        let story = story_with_code(&[0x14, 0x01, 0x02, 0x00, 0xB0]);
        let reached = reachable(&story, INITIAL_PC).unwrap();
        assert_eq!(reached, vec![INITIAL_PC, INITIAL_PC + 4]);
    }

    #[test]
    fn test_branch_both_arms_reached() {
        // jz #0 ?+5; rtrue; rfalse (branch target past the rtrue)
        let story = story_with_code(&[
            0x90, 0x00, 0xC4, // jz #0, branch +4 -> 0x505
            0xB0, // rtrue (fall-through)
            0xB1, // rfalse (branch target)
        ]);
        let reached = reachable(&story, INITIAL_PC).unwrap();
        assert_eq!(
            reached,
            vec![INITIAL_PC, INITIAL_PC + 3, INITIAL_PC + 5]
        );
    }

    #[test]
    fn test_jump_does_not_fall_through() {
        // jump +2 skips the rtrue that follows it
        let story = story_with_code(&[
            0x8C, 0x00, 0x03, // jump -> 0x504
            0xB0, // rtrue, unreachable
            0xB1, // rfalse
        ]);
        let reached = reachable(&story, INITIAL_PC).unwrap();
        assert_eq!(reached, vec![INITIAL_PC, INITIAL_PC + 4]);
    }

    #[test]
    fn test_loop_terminates() {
        // jump back to itself: offset -1 lands on the jump's own address
        let story = story_with_code(&[0x8C, 0xFF, 0xFF]);
        let reached = reachable(&story, INITIAL_PC).unwrap();
        assert_eq!(reached, vec![INITIAL_PC]);
    }

    #[test]
    fn test_routine_header_walk() {
        // routine with 2 locals at the scratch area
        let story = story_with_code(&[0x02, 0x00, 0x07, 0x00, 0x08, 0xB0]);
        assert_eq!(locals_count(&story, INITIAL_PC).unwrap(), 2);
        assert_eq!(first_instruction(&story, INITIAL_PC).unwrap(), INITIAL_PC + 5);
    }

    #[test]
    fn test_too_many_locals_rejected() {
        let story = story_with_code(&[16]);
        assert_eq!(
            locals_count(&story, INITIAL_PC).unwrap_err(),
            ZError::TooManyLocals(16)
        );
    }

    #[test]
    fn test_all_routines_fixed_point() {
        // main calls A; A calls B; B returns
        // routine A at 0x520 (packed 0x290), routine B at 0x530 (packed 0x298)
        let mut code = vec![0u8; 0x40];
        // main: call A -> sp; quit
        code[0] = 0xE0;
        code[1] = 0x3F; // one large operand
        code[2] = 0x02;
        code[3] = 0x90;
        code[4] = 0x00; // store -> sp
        code[5] = 0xBA; // quit
        // A at +0x20: no locals; call B -> sp; rtrue
        code[0x20] = 0x00;
        code[0x21] = 0xE0;
        code[0x22] = 0x3F;
        code[0x23] = 0x02;
        code[0x24] = 0x98;
        code[0x25] = 0x00;
        code[0x26] = 0xB0;
        // B at +0x30: no locals; rfalse
        code[0x30] = 0x00;
        code[0x31] = 0xB1;
        let story = story_with_code(&code);
        let routines = all_routines(&story).unwrap();
        assert_eq!(routines, vec![0x520, 0x530]);
    }
}

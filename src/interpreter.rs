use crate::errors::{ZError, ZResult};
use crate::instruction::{
    decode_instruction, Branch, BranchTarget, Instruction, Operand, VarRef,
};
use crate::opcode_tables::Opcode;
use crate::story::Story;
use crate::text;
use crate::util::{signed_word, unsigned_word};
use crate::zobject::ObjectTree;
use crate::zrand::ZRand;
use indexmap::IndexMap;
use log::debug;

/// Maximum number of local variables per routine
pub const MAX_LOCALS: u8 = 15;

/// What the machine is prepared to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// `step` may execute the next instruction.
    Running,
    /// A read instruction is pending; feed characters via `step_with_input`.
    WaitingForInput,
    /// The story quit; the machine will not advance again.
    Halted,
}

/// One activation record on the call stack.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Evaluation stack, top at the end.
    pub eval_stack: Vec<u16>,
    /// Local variables 1..15, in declaration order.
    pub locals: IndexMap<u8, u16>,
    /// Address of the instruction that created this frame. The root frame
    /// uses 0.
    pub caller: u32,
    /// Where the caller wants this frame's return value.
    pub store: Option<VarRef>,
}

impl Frame {
    fn root() -> Frame {
        Frame {
            eval_stack: Vec::new(),
            locals: IndexMap::new(),
            caller: 0,
            store: None,
        }
    }
}

/// The step-driven Z-Machine.
///
/// A value type: `step` and `step_with_input` build a successor and leave
/// the stepped value untouched, so a host can keep a stack of snapshots
/// and rewind by discarding successors. The story rides along because
/// dynamic-memory writes produce successor stories.
#[derive(Debug, Clone)]
pub struct Interpreter {
    pub story: Story,
    pc: u32,
    frames: Vec<Frame>,
    state: RunState,
    /// Line under construction while waiting for input.
    input: String,
    /// Text- and parse-buffer addresses of the pending read.
    pending_read: Option<(u16, u16)>,
    /// Everything the story has printed, as a growing character stream.
    /// Opaque to the core; the host decides how to render it.
    screen: String,
    rng: ZRand,
}

impl Interpreter {
    /// Build a machine positioned at the story's initial program counter,
    /// with a single empty frame.
    pub fn make(story: Story) -> ZResult<Interpreter> {
        let pc = story.initial_pc()?;
        Ok(Interpreter {
            story,
            pc,
            frames: vec![Frame::root()],
            state: RunState::Running,
            input: String::new(),
            pending_read: None,
            screen: String::new(),
            rng: ZRand::new_uniform(),
        })
    }

    /// As `make`, but with a deterministic random sequence.
    pub fn make_predictable(story: Story, seed: u64) -> ZResult<Interpreter> {
        let mut interpreter = Interpreter::make(story)?;
        interpreter.rng = ZRand::new_predictable(seed);
        Ok(interpreter)
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn program_counter(&self) -> u32 {
        self.pc
    }

    pub fn current_frame(&self) -> &Frame {
        self.frames.last().expect("frame stack is never empty")
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// The character stream produced by print opcodes so far.
    pub fn screen_output(&self) -> &str {
        &self.screen
    }

    /// Execute one instruction, producing the successor machine.
    pub fn step(&self) -> ZResult<Interpreter> {
        if self.state != RunState::Running {
            return Err(ZError::BadState("step requires a running machine"));
        }
        let mut next = self.clone();
        next.execute_one()?;
        Ok(next)
    }

    /// Feed one keystroke to a machine waiting on a read instruction.
    /// A newline completes the line: it is written to the text buffer,
    /// tokenised into the parse buffer, and the machine resumes running.
    pub fn step_with_input(&self, key: char) -> ZResult<Interpreter> {
        if self.state != RunState::WaitingForInput {
            return Err(ZError::BadState(
                "step_with_input requires a machine waiting for input",
            ));
        }
        let mut next = self.clone();
        next.screen.push(key);
        if key == '\n' {
            next.finish_read()?;
        } else {
            next.input.push(key);
        }
        Ok(next)
    }

    // --- frame and variable plumbing ---

    fn frame(&self) -> ZResult<&Frame> {
        self.frames.last().ok_or(ZError::NoFrame)
    }

    fn frame_mut(&mut self) -> ZResult<&mut Frame> {
        self.frames.last_mut().ok_or(ZError::NoFrame)
    }

    fn push(&mut self, value: u16) -> ZResult<()> {
        self.frame_mut()?.eval_stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> ZResult<u16> {
        self.frame_mut()?
            .eval_stack
            .pop()
            .ok_or(ZError::StackUnderflow)
    }

    fn read_variable(&mut self, var: VarRef) -> ZResult<u16> {
        match var {
            VarRef::Stack => self.pop(),
            VarRef::Local(n) => self
                .frame()?
                .locals
                .get(&n)
                .copied()
                .ok_or(ZError::InvalidLocal(n)),
            VarRef::Global(n) => self.story.read_global(n as u16),
        }
    }

    fn write_variable(&mut self, var: VarRef, value: u16) -> ZResult<()> {
        match var {
            VarRef::Stack => self.push(value),
            VarRef::Local(n) => {
                let frame = self.frame_mut()?;
                match frame.locals.get_mut(&n) {
                    Some(slot) => {
                        *slot = value;
                        Ok(())
                    }
                    None => Err(ZError::InvalidLocal(n)),
                }
            }
            VarRef::Global(n) => {
                self.story = self.story.write_global(n as u16, value)?;
                Ok(())
            }
        }
    }

    /// Indirect variable reads leave the stack alone: variable number 0
    /// names the top of the stack in place.
    fn read_variable_in_place(&mut self, var: VarRef) -> ZResult<u16> {
        match var {
            VarRef::Stack => self
                .frame()?
                .eval_stack
                .last()
                .copied()
                .ok_or(ZError::StackUnderflow),
            _ => self.read_variable(var),
        }
    }

    fn write_variable_in_place(&mut self, var: VarRef, value: u16) -> ZResult<()> {
        match var {
            VarRef::Stack => {
                let frame = self.frame_mut()?;
                match frame.eval_stack.last_mut() {
                    Some(top) => {
                        *top = value;
                        Ok(())
                    }
                    None => Err(ZError::StackUnderflow),
                }
            }
            _ => self.write_variable(var, value),
        }
    }

    /// Evaluate one operand. A stack-variable operand pops, which is why
    /// evaluation order is part of the machine's observable behaviour.
    fn eval(&mut self, operand: &Operand) -> ZResult<u16> {
        match operand {
            Operand::Large(w) => Ok(*w as u16),
            Operand::Small(b) => Ok(*b as u16),
            Operand::Variable(var) => self.read_variable(*var),
        }
    }

    /// Evaluate all operands left to right.
    fn eval_all(&mut self, instruction: &Instruction) -> ZResult<Vec<u16>> {
        let mut values = Vec::with_capacity(instruction.operands.len());
        for operand in &instruction.operands {
            values.push(self.eval(operand)?);
        }
        Ok(values)
    }

    fn store_result(&mut self, instruction: &Instruction, value: u16) -> ZResult<()> {
        match instruction.store {
            Some(var) => self.write_variable(var, value),
            None => Ok(()),
        }
    }

    // --- control transfer ---

    /// Pop the current frame and resume the caller just past its call
    /// instruction, delivering the return value to the frame's store
    /// target.
    fn do_return(&mut self, value: u16) -> ZResult<()> {
        if self.frames.len() < 2 {
            return Err(ZError::NoFrame);
        }
        let frame = self.frames.pop().expect("checked above");
        let caller = decode_instruction(&self.story, frame.caller)?;
        self.pc = caller.next_address();
        debug!(
            "return {value:#06x} to {:#06x}",
            self.pc
        );
        if let Some(target) = frame.store {
            self.write_variable(target, value)?;
        }
        Ok(())
    }

    /// Apply a branch specification to a computed condition. The program
    /// counter has already been advanced past the instruction, so a
    /// non-taken branch is a no-op.
    fn do_branch(&mut self, branch: &Option<Branch>, condition: bool) -> ZResult<()> {
        let branch = match branch {
            Some(b) => b,
            None => return Ok(()),
        };
        if condition != branch.sense {
            return Ok(());
        }
        match branch.target {
            BranchTarget::ReturnFalse => self.do_return(0),
            BranchTarget::ReturnTrue => self.do_return(1),
            BranchTarget::Address(a) => {
                self.pc = a;
                Ok(())
            }
        }
    }

    /// Call a routine. `operands[0]` is the routine; the rest are
    /// arguments. The routine header is a locals count followed by one
    /// default word per local; arguments overwrite defaults in order and
    /// surplus arguments are evaluated for their stack effect, then
    /// dropped.
    fn do_call(&mut self, instruction: &Instruction) -> ZResult<()> {
        let (routine_operand, arg_operands) = match instruction.operands.split_first() {
            Some(split) => split,
            None => {
                return Err(ZError::BadOperandShape {
                    addr: instruction.address,
                    reason: "call needs a routine operand",
                })
            }
        };
        // a large operand was unpacked at decode time; a computed routine
        // address is unpacked here
        let routine = match routine_operand {
            Operand::Large(addr) => *addr,
            other => self.eval(other)? as u32 * 2,
        };

        // calling packed address 0 does nothing and yields false
        if routine == 0 {
            for operand in arg_operands {
                self.eval(operand)?;
            }
            return self.store_result(instruction, 0);
        }

        let count = self.story.read_byte(routine)?;
        if count > MAX_LOCALS {
            return Err(ZError::TooManyLocals(count));
        }

        let mut locals = IndexMap::new();
        for i in 0..count {
            let default = self.story.read_word(routine + 1 + 2 * i as u32)?;
            locals.insert(i + 1, default);
        }
        for (i, operand) in arg_operands.iter().enumerate() {
            let value = self.eval(operand)?;
            if (i as u8) < count {
                locals.insert(i as u8 + 1, value);
            }
        }

        self.frames.push(Frame {
            eval_stack: Vec::new(),
            locals,
            caller: instruction.address,
            store: instruction.store,
        });
        self.pc = routine + 1 + 2 * count as u32;
        debug!("call {routine:#06x} with {count} locals, pc now {:#06x}", self.pc);
        Ok(())
    }

    // --- the dispatch loop body ---

    fn execute_one(&mut self) -> ZResult<()> {
        let instruction = decode_instruction(&self.story, self.pc)?;
        debug!(
            "execute {:#06x}: {}",
            instruction.address,
            instruction.name()
        );
        // default advance; calls, jumps, branches and returns override
        self.pc = instruction.next_address();
        self.execute_instruction(&instruction)
    }

    fn execute_instruction(&mut self, instruction: &Instruction) -> ZResult<()> {
        use Opcode::*;
        let instr = instruction;
        match instr.opcode {
            // arithmetic and logic
            Add => self.arithmetic(instr, |a, b| Ok(a as i32 + b as i32)),
            Sub => self.arithmetic(instr, |a, b| Ok(a as i32 - b as i32)),
            Mul => self.arithmetic(instr, |a, b| Ok(a as i32 * b as i32)),
            Div => self.arithmetic(instr, |a, b| {
                if b == 0 {
                    Err(ZError::DivideByZero)
                } else {
                    Ok((a as i32) / (b as i32))
                }
            }),
            Mod => self.arithmetic(instr, |a, b| {
                if b == 0 {
                    Err(ZError::DivideByZero)
                } else {
                    Ok((a as i32) % (b as i32))
                }
            }),
            Or => {
                let values = self.two_values(instr)?;
                self.store_result(instr, values.0 | values.1)
            }
            And => {
                let values = self.two_values(instr)?;
                self.store_result(instr, values.0 & values.1)
            }
            Not => {
                let value = self.one_value(instr)?;
                self.store_result(instr, !value)
            }

            // comparisons and tests
            Je => {
                let values = self.eval_all(instr)?;
                if values.len() < 2 {
                    return Err(ZError::BadOperandShape {
                        addr: instr.address,
                        reason: "je needs at least two operands",
                    });
                }
                let condition = values[1..].contains(&values[0]);
                self.do_branch(&instr.branch, condition)
            }
            Jl => {
                let (a, b) = self.two_values(instr)?;
                self.do_branch(&instr.branch, signed_word(a as i32) < signed_word(b as i32))
            }
            Jg => {
                let (a, b) = self.two_values(instr)?;
                self.do_branch(&instr.branch, signed_word(a as i32) > signed_word(b as i32))
            }
            Jz => {
                let value = self.one_value(instr)?;
                self.do_branch(&instr.branch, value == 0)
            }
            Jin => {
                let (child, parent) = self.two_values(instr)?;
                let condition = self.story.parent(child)? == parent;
                self.do_branch(&instr.branch, condition)
            }
            Test => {
                let (bitmap, flags) = self.two_values(instr)?;
                self.do_branch(&instr.branch, bitmap & flags == flags)
            }
            TestAttr => {
                let (obj, attr) = self.two_values(instr)?;
                let condition = self.story.test_attribute(obj, attr)?;
                self.do_branch(&instr.branch, condition)
            }

            // memory and variables
            Store => {
                let (var, value) = self.two_values(instr)?;
                self.write_variable_in_place(VarRef::from_byte(var as u8), value)
            }
            Load => {
                let var_number = self.one_value(instr)?;
                let value = self.read_variable_in_place(VarRef::from_byte(var_number as u8))?;
                self.store_result(instr, value)
            }
            Storew => {
                let (base, index, value) = self.three_values(instr)?;
                let addr = base as u32 + 2 * index as u32;
                self.story = self.story.write_word(addr, value)?;
                Ok(())
            }
            Storeb => {
                let (base, index, value) = self.three_values(instr)?;
                let addr = base as u32 + index as u32;
                self.story = self.story.write_byte(addr, value as u8)?;
                Ok(())
            }
            Loadw => {
                let (base, index) = self.two_values(instr)?;
                let value = self.story.read_word(base as u32 + 2 * index as u32)?;
                self.store_result(instr, value)
            }
            Loadb => {
                let (base, index) = self.two_values(instr)?;
                let value = self.story.read_byte(base as u32 + index as u32)?;
                self.store_result(instr, value as u16)
            }
            Push => {
                let value = self.one_value(instr)?;
                self.push(value)
            }
            Pull => {
                let var_number = self.one_value(instr)?;
                let value = self.pop()?;
                self.write_variable_in_place(VarRef::from_byte(var_number as u8), value)
            }
            Inc => {
                let var_number = self.one_value(instr)?;
                self.bump_variable(var_number, 1).map(|_| ())
            }
            Dec => {
                let var_number = self.one_value(instr)?;
                self.bump_variable(var_number, -1).map(|_| ())
            }
            IncChk => {
                let (var_number, limit) = self.two_values(instr)?;
                let new = self.bump_variable(var_number, 1)?;
                self.do_branch(&instr.branch, new > signed_word(limit as i32))
            }
            DecChk => {
                let (var_number, limit) = self.two_values(instr)?;
                let new = self.bump_variable(var_number, -1)?;
                self.do_branch(&instr.branch, new < signed_word(limit as i32))
            }

            // objects
            GetParent => {
                let obj = self.one_value(instr)?;
                let parent = self.story.parent(obj)?;
                self.store_result(instr, parent)
            }
            GetChild => {
                let obj = self.one_value(instr)?;
                let child = self.story.child(obj)?;
                self.store_result(instr, child)?;
                self.do_branch(&instr.branch, child != 0)
            }
            GetSibling => {
                let obj = self.one_value(instr)?;
                let sibling = self.story.sibling(obj)?;
                self.store_result(instr, sibling)?;
                self.do_branch(&instr.branch, sibling != 0)
            }
            GetProp => {
                let (obj, prop) = self.two_values(instr)?;
                let value = self.story.property(obj, prop)?;
                self.store_result(instr, value)
            }
            GetPropAddr => {
                let (obj, prop) = self.two_values(instr)?;
                let addr = self.story.property_address(obj, prop)?;
                self.store_result(instr, addr)
            }
            GetNextProp => {
                let (obj, prop) = self.two_values(instr)?;
                let next = self.story.next_property(obj, prop)?;
                self.store_result(instr, next)
            }
            GetPropLen => {
                let prop_addr = self.one_value(instr)?;
                let length = self.story.property_length(prop_addr)?;
                self.store_result(instr, length)
            }
            PutProp => {
                let (obj, prop, value) = self.three_values(instr)?;
                self.story = self.story.set_property(obj, prop, value)?;
                Ok(())
            }
            SetAttr => {
                let (obj, attr) = self.two_values(instr)?;
                self.story = self.story.set_attribute(obj, attr)?;
                Ok(())
            }
            ClearAttr => {
                let (obj, attr) = self.two_values(instr)?;
                self.story = self.story.clear_attribute(obj, attr)?;
                Ok(())
            }
            InsertObj => {
                let (obj, destination) = self.two_values(instr)?;
                self.story = self.story.insert_object(obj, destination)?;
                Ok(())
            }
            RemoveObj => {
                let obj = self.one_value(instr)?;
                self.story = self.story.remove_object(obj)?;
                Ok(())
            }
            PrintObj => {
                let obj = self.one_value(instr)?;
                let name = self.story.object_name(obj)?;
                self.screen.push_str(&name);
                Ok(())
            }

            // strings and output
            Print => {
                if let Some(ref inline) = instr.text {
                    self.screen.push_str(inline);
                }
                Ok(())
            }
            PrintRet => {
                if let Some(ref inline) = instr.text {
                    self.screen.push_str(inline);
                }
                self.screen.push('\n');
                self.do_return(1)
            }
            PrintAddr => {
                let addr = self.one_value(instr)?;
                let decoded = text::decode_string(&self.story, addr as u32)?;
                self.screen.push_str(&decoded.text);
                Ok(())
            }
            PrintPaddr => {
                let packed = self.one_value(instr)?;
                let addr = self.story.unpack_address(packed);
                let decoded = text::decode_string(&self.story, addr)?;
                self.screen.push_str(&decoded.text);
                Ok(())
            }
            PrintChar => {
                let code = self.one_value(instr)?;
                self.screen.push(zscii_char(code));
                Ok(())
            }
            PrintNum => {
                let value = self.one_value(instr)?;
                let number = signed_word(value as i32);
                self.screen.push_str(&number.to_string());
                Ok(())
            }
            NewLine => {
                self.screen.push('\n');
                Ok(())
            }
            Sread => {
                let (text_buffer, parse_buffer) = self.two_values(instr)?;
                debug!("sread: waiting for input, buffers {text_buffer:#06x}/{parse_buffer:#06x}");
                self.pending_read = Some((text_buffer, parse_buffer));
                self.input.clear();
                self.state = RunState::WaitingForInput;
                Ok(())
            }

            // control
            Call => self.do_call(instr),
            Jump => match instr.operands.as_slice() {
                // the decoder already turned the offset into an absolute
                // address
                [Operand::Large(target)] => {
                    self.pc = *target;
                    Ok(())
                }
                _ => Err(ZError::BadOperandShape {
                    addr: instr.address,
                    reason: "jump needs a single large-constant operand",
                }),
            },
            Ret => {
                let value = self.one_value(instr)?;
                self.do_return(value)
            }
            Rtrue => self.do_return(1),
            Rfalse => self.do_return(0),
            RetPopped => {
                let value = self.pop()?;
                self.do_return(value)
            }
            Pop => self.pop().map(|_| ()),
            Quit => {
                self.state = RunState::Halted;
                Ok(())
            }
            Nop => Ok(()),
            Verify => {
                // checksum verification needs the pristine file image,
                // which the host owns; report success
                self.do_branch(&instr.branch, true)
            }
            Random => {
                let value = self.one_value(instr)?;
                let range = signed_word(value as i32);
                let result = match range.cmp(&0) {
                    std::cmp::Ordering::Greater => self.rng.next_in_range(range as u16),
                    std::cmp::Ordering::Less => {
                        self.rng = ZRand::new_predictable(-(range as i64) as u64);
                        0
                    }
                    std::cmp::Ordering::Equal => {
                        self.rng = ZRand::new_uniform();
                        0
                    }
                };
                self.store_result(instr, result)
            }

            // screen control is an external collaborator's concern
            ShowStatus | SplitWindow | SetWindow | OutputStream | InputStream | SoundEffect => {
                self.eval_all(instr)?;
                debug!("{} ignored by the core", instr.name());
                Ok(())
            }

            // unimplemented in the version-3 executor
            Illegal | Save | Restore | Restart | Call1s | Call2s | Call2n | SetColour | Throw => {
                Err(ZError::IllegalInstruction(instr.address))
            }
        }
    }

    /// Shared body for add/sub/mul/div/mod: evaluate two operands as
    /// signed words, combine, wrap to 16 bits.
    fn arithmetic<F>(&mut self, instruction: &Instruction, op: F) -> ZResult<()>
    where
        F: FnOnce(i16, i16) -> ZResult<i32>,
    {
        let (a, b) = self.two_values(instruction)?;
        let result = op(signed_word(a as i32), signed_word(b as i32))?;
        self.store_result(instruction, unsigned_word(result))
    }

    fn one_value(&mut self, instruction: &Instruction) -> ZResult<u16> {
        let values = self.eval_all(instruction)?;
        match values.as_slice() {
            [a] => Ok(*a),
            _ => Err(ZError::BadOperandShape {
                addr: instruction.address,
                reason: "expected exactly one operand",
            }),
        }
    }

    fn two_values(&mut self, instruction: &Instruction) -> ZResult<(u16, u16)> {
        let values = self.eval_all(instruction)?;
        match values.as_slice() {
            [a, b] => Ok((*a, *b)),
            _ => Err(ZError::BadOperandShape {
                addr: instruction.address,
                reason: "expected exactly two operands",
            }),
        }
    }

    fn three_values(&mut self, instruction: &Instruction) -> ZResult<(u16, u16, u16)> {
        let values = self.eval_all(instruction)?;
        match values.as_slice() {
            [a, b, c] => Ok((*a, *b, *c)),
            _ => Err(ZError::BadOperandShape {
                addr: instruction.address,
                reason: "expected exactly three operands",
            }),
        }
    }

    /// Shared body for inc/dec/inc_chk/dec_chk: adjust the named variable
    /// in place and return its new signed value.
    fn bump_variable(&mut self, var_number: u16, delta: i32) -> ZResult<i16> {
        let var = VarRef::from_byte(var_number as u8);
        let old = self.read_variable_in_place(var)?;
        let new = signed_word(signed_word(old as i32) as i32 + delta);
        self.write_variable_in_place(var, new as u16)?;
        Ok(new)
    }

    /// Complete a pending read: write the typed line to the text buffer,
    /// tokenise it against the dictionary, fill the parse buffer, resume.
    fn finish_read(&mut self) -> ZResult<()> {
        let (text_buffer, parse_buffer) = self
            .pending_read
            .take()
            .ok_or(ZError::BadState("no read is pending"))?;
        let line = std::mem::take(&mut self.input).to_lowercase();

        // text buffer: byte 0 is the capacity, text from byte 1, zero
        // terminated
        let text_buffer = text_buffer as u32;
        let capacity = self.story.read_byte(text_buffer)? as usize;
        let line: String = line.chars().take(capacity).collect();
        let mut story = self.story.clone();
        for (i, b) in line.bytes().enumerate() {
            story = story.write_byte(text_buffer + 1 + i as u32, b)?;
        }
        story = story.write_byte(text_buffer + 1 + line.len() as u32, 0)?;

        // parse buffer: byte 0 is the word capacity, byte 1 the word
        // count, then address/length/position records
        let parse_buffer = parse_buffer as u32;
        let tokens = story.tokenize(&line)?;
        let word_capacity = story.read_byte(parse_buffer)? as usize;
        let kept = tokens.len().min(word_capacity);
        story = story.write_byte(parse_buffer + 1, kept as u8)?;
        for (i, token) in tokens.iter().take(kept).enumerate() {
            let entry = parse_buffer + 2 + 4 * i as u32;
            story = story.write_word(entry, token.dictionary_addr)?;
            story = story.write_byte(entry + 2, token.text.len() as u8)?;
            story = story.write_byte(entry + 3, token.start as u8 + 1)?;
        }
        debug!("read complete: {:?} -> {kept} words", line);

        self.story = story;
        self.state = RunState::Running;
        Ok(())
    }
}

/// Map a ZSCII output code to text. Code 13 is newline; the printable
/// ASCII range maps through unchanged.
fn zscii_char(code: u16) -> char {
    match code {
        13 => '\n',
        32..=126 => (code as u8) as char,
        _ => '?',
    }
}

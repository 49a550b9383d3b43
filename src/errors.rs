use thiserror::Error;

pub type ZResult<T> = Result<T, ZError>;

/// Everything that can go wrong inside the core.
///
/// All of these are fatal to the current step: the machine value that was
/// stepped is left untouched and remains valid, so a host can surface the
/// error and keep (or rewind to) the prior state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZError {
    #[error("not a valid story file: {0}")]
    InvalidStoryFile(String),
    #[error("write to static memory at {0:#06x}")]
    WriteToStaticMemory(u32),
    #[error("address {0:#06x} out of range")]
    AddressOutOfRange(u32),
    #[error("invalid abbreviation index {0}")]
    InvalidAbbreviationIndex(u16),
    #[error("abbreviation expansion may not contain abbreviation codes")]
    NestedAbbreviation,
    #[error("invalid default property number {0}")]
    InvalidDefaultProperty(u16),
    #[error("invalid property {prop} on object {obj}")]
    InvalidProperty { obj: u16, prop: u16 },
    #[error("invalid object number {0}")]
    InvalidObject(u16),
    #[error("invalid local variable {0}")]
    InvalidLocal(u8),
    #[error("invalid global variable {0}")]
    InvalidGlobal(u16),
    #[error("routine header claims {0} locals (max 15)")]
    TooManyLocals(u8),
    #[error("illegal instruction at {0:#06x}")]
    IllegalInstruction(u32),
    #[error("bad operand shape at {addr:#06x}: {reason}")]
    BadOperandShape { addr: u32, reason: &'static str },
    #[error("division by zero")]
    DivideByZero,
    #[error("evaluation stack underflow")]
    StackUnderflow,
    #[error("call stack has no frame")]
    NoFrame,
    #[error("machine is not in the required state: {0}")]
    BadState(&'static str),
}

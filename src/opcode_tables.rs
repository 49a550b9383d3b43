//! Opcode identity and per-opcode metadata.
//!
//! The decoder resolves an opcode through one of four fixed tables keyed by
//! the low bits of the opcode byte; everything the interpreter needs to know
//! about an opcode (store byte, branch bytes, inline text, call shape,
//! fall-through) lives here as constant tables rather than scattered
//! conditionals.

/// Every operation the version-3 decoder can name.
///
/// `Illegal` fills the unassigned table slots; reaching one is an error at
/// execution time. Later-version opcodes that occupy v3 table slots
/// (`call_2s` and friends) decode by name but are not executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // 2OP
    Je,
    Jl,
    Jg,
    DecChk,
    IncChk,
    Jin,
    Test,
    Or,
    And,
    TestAttr,
    SetAttr,
    ClearAttr,
    Store,
    InsertObj,
    Loadw,
    Loadb,
    GetProp,
    GetPropAddr,
    GetNextProp,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Call2s,
    Call2n,
    SetColour,
    Throw,
    // 1OP
    Jz,
    GetSibling,
    GetChild,
    GetParent,
    GetPropLen,
    Inc,
    Dec,
    PrintAddr,
    Call1s,
    RemoveObj,
    PrintObj,
    Ret,
    Jump,
    PrintPaddr,
    Load,
    Not,
    // 0OP
    Rtrue,
    Rfalse,
    Print,
    PrintRet,
    Nop,
    Save,
    Restore,
    Restart,
    RetPopped,
    Pop,
    Quit,
    NewLine,
    ShowStatus,
    Verify,
    // VAR
    Call,
    Storew,
    Storeb,
    PutProp,
    Sread,
    PrintChar,
    PrintNum,
    Random,
    Push,
    Pull,
    SplitWindow,
    SetWindow,
    OutputStream,
    InputStream,
    SoundEffect,
    /// Unassigned decode slot.
    Illegal,
}

use Opcode::*;

/// 2OP table, indexed by the low five bits. Slots 0, 29, 30 and 31 are
/// unassigned in every version.
pub const OP2_OPCODES: [Opcode; 32] = [
    Illegal, Je, Jl, Jg, DecChk, IncChk, Jin, Test, Or, And, TestAttr, SetAttr, ClearAttr, Store,
    InsertObj, Loadw, Loadb, GetProp, GetPropAddr, GetNextProp, Add, Sub, Mul, Div, Mod, Call2s,
    Call2n, SetColour, Throw, Illegal, Illegal, Illegal,
];

/// 1OP table, indexed by the low four bits.
pub const OP1_OPCODES: [Opcode; 16] = [
    Jz, GetSibling, GetChild, GetParent, GetPropLen, Inc, Dec, PrintAddr, Call1s, RemoveObj,
    PrintObj, Ret, Jump, PrintPaddr, Load, Not,
];

/// 0OP table, indexed by the low four bits. Slots 14 and 15 belong to
/// later versions.
pub const OP0_OPCODES: [Opcode; 16] = [
    Rtrue, Rfalse, Print, PrintRet, Nop, Save, Restore, Restart, RetPopped, Pop, Quit, NewLine,
    ShowStatus, Verify, Illegal, Illegal,
];

/// VAR table, indexed by the low five bits. Slots past `sound_effect`
/// belong to later versions.
pub const VAR_OPCODES: [Opcode; 32] = [
    Call,
    Storew,
    Storeb,
    PutProp,
    Sread,
    PrintChar,
    PrintNum,
    Random,
    Push,
    Pull,
    SplitWindow,
    SetWindow,
    Illegal,
    Illegal,
    Illegal,
    Illegal,
    Illegal,
    Illegal,
    Illegal,
    OutputStream,
    InputStream,
    SoundEffect,
    Illegal,
    Illegal,
    Illegal,
    Illegal,
    Illegal,
    Illegal,
    Illegal,
    Illegal,
    Illegal,
    Illegal,
];

/// Does the instruction end with a store-target byte?
pub fn has_store(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Or | And
            | Loadw
            | Loadb
            | GetProp
            | GetPropAddr
            | GetNextProp
            | Add
            | Sub
            | Mul
            | Div
            | Mod
            | Call2s
            | GetSibling
            | GetChild
            | GetParent
            | GetPropLen
            | Call1s
            | Load
            | Not
            | Call
            | Random
    )
}

/// Does the instruction end with branch bytes?
pub fn has_branch(opcode: Opcode) -> bool {
    matches!(
        opcode,
        Je | Jl
            | Jg
            | DecChk
            | IncChk
            | Jin
            | Test
            | TestAttr
            | Jz
            | GetSibling
            | GetChild
            | GetParent
            | Save
            | Restore
            | Verify
    )
}

/// Does the instruction carry inline z-text?
pub fn has_text(opcode: Opcode) -> bool {
    matches!(opcode, Print | PrintRet)
}

/// Is the first operand a packed routine address?
pub fn is_call(opcode: Opcode) -> bool {
    matches!(opcode, Call | Call1s | Call2s | Call2n)
}

/// Can execution fall through to the next instruction? Used by the
/// reachability analysis.
pub fn continues(opcode: Opcode) -> bool {
    !matches!(
        opcode,
        Ret | Rtrue | Rfalse | RetPopped | PrintRet | Jump | Quit | Restart | Throw
    )
}

/// The conventional lower-case name, for listings.
pub fn name(opcode: Opcode) -> &'static str {
    match opcode {
        Je => "je",
        Jl => "jl",
        Jg => "jg",
        DecChk => "dec_chk",
        IncChk => "inc_chk",
        Jin => "jin",
        Test => "test",
        Or => "or",
        And => "and",
        TestAttr => "test_attr",
        SetAttr => "set_attr",
        ClearAttr => "clear_attr",
        Store => "store",
        InsertObj => "insert_obj",
        Loadw => "loadw",
        Loadb => "loadb",
        GetProp => "get_prop",
        GetPropAddr => "get_prop_addr",
        GetNextProp => "get_next_prop",
        Add => "add",
        Sub => "sub",
        Mul => "mul",
        Div => "div",
        Mod => "mod",
        Call2s => "call_2s",
        Call2n => "call_2n",
        SetColour => "set_colour",
        Throw => "throw",
        Jz => "jz",
        GetSibling => "get_sibling",
        GetChild => "get_child",
        GetParent => "get_parent",
        GetPropLen => "get_prop_len",
        Inc => "inc",
        Dec => "dec",
        PrintAddr => "print_addr",
        Call1s => "call_1s",
        RemoveObj => "remove_obj",
        PrintObj => "print_obj",
        Ret => "ret",
        Jump => "jump",
        PrintPaddr => "print_paddr",
        Load => "load",
        Not => "not",
        Rtrue => "rtrue",
        Rfalse => "rfalse",
        Print => "print",
        PrintRet => "print_ret",
        Nop => "nop",
        Save => "save",
        Restore => "restore",
        Restart => "restart",
        RetPopped => "ret_popped",
        Pop => "pop",
        Quit => "quit",
        NewLine => "new_line",
        ShowStatus => "show_status",
        Verify => "verify",
        Call => "call",
        Storew => "storew",
        Storeb => "storeb",
        PutProp => "put_prop",
        Sread => "sread",
        PrintChar => "print_char",
        PrintNum => "print_num",
        Random => "random",
        Push => "push",
        Pull => "pull",
        SplitWindow => "split_window",
        SetWindow => "set_window",
        OutputStream => "output_stream",
        InputStream => "input_stream",
        SoundEffect => "sound_effect",
        Illegal => "illegal",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op2_unassigned_slots() {
        assert_eq!(OP2_OPCODES[0], Illegal);
        assert_eq!(OP2_OPCODES[29], Illegal);
        assert_eq!(OP2_OPCODES[30], Illegal);
        assert_eq!(OP2_OPCODES[31], Illegal);
        assert_eq!(OP2_OPCODES[1], Je);
        assert_eq!(OP2_OPCODES[20], Add);
    }

    #[test]
    fn test_metadata_consistency() {
        // a branch opcode never carries inline text
        for table in [&OP2_OPCODES[..], &OP1_OPCODES[..], &OP0_OPCODES[..], &VAR_OPCODES[..]] {
            for &op in table {
                assert!(!(has_branch(op) && has_text(op)), "{op:?}");
            }
        }
        assert!(has_store(Call));
        assert!(has_branch(Je));
        assert!(has_text(Print));
        assert!(is_call(Call));
        assert!(!continues(Jump));
        assert!(continues(Add));
    }
}

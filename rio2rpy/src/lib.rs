// rio2rpy - RIO/WillPlus bytecode to Ren'Py transpiler
//
// This library decodes compiled WillPlus (RIO) scenario scripts and rewrites
// them as Ren'Py script, one `label` per scenario file.
//
// # Architecture
//
// The transpiler works in several phases:
//
// 1. **Opcode Table** (`opcode.rs`): Versioned opcode byte → operand layout map
// 2. **Disassembly** (`disasm.rs`): Decode the byte stream to structured instructions
// 3. **CFG Construction** (`cfg.rs`): Split the script into basic blocks
// 4. **Translation** (`translate.rs`): Walk instructions + CFG, track display state,
//    emit Ren'Py statements through the scope-aware emitter (`emitter.rs`)
//
// # Flags
//
// The engine addresses game state as numbered flags. `flags.rs` maps them
// onto Python containers ("banks") using the flag table in `settings.rs`;
// flags can be excluded or hinted so engine bookkeeping stays out of the
// generated script.
//
// # Errors
//
// Decoding and CFG construction never fail: unknown bytes become `INVALID`
// instructions and the translator comments on them. A translation error
// aborts the current script only; the partial output is still returned.

pub mod cfg;
pub mod disasm;
pub mod displayable;
pub mod emitter;
pub mod export;
pub mod flags;
pub mod opcode;
pub mod settings;
pub mod text;
pub mod translate;

pub use cfg::{BasicBlock, BlockKind, ControlFlowGraph};
pub use disasm::{Instruction, MenuOption, Operand};
pub use emitter::Emitter;
pub use opcode::{Mnemonic, OpcodeTable, Version};
pub use settings::Settings;
pub use translate::{TranslateError, Translation};

/// Transpile one script to Ren'Py
///
/// `name` becomes the script's label, usually the file stem.
pub fn transpile(name: &str, script: &[u8], settings: &Settings) -> Translation {
    let table = OpcodeTable::new(settings.opcode_version);
    let instructions = disasm::decode(script, &table, true);
    let cfg = cfg::build(&instructions);
    translate::translate(name, &instructions, &cfg, settings)
}

/// Disassembly listing, one instruction per line
pub fn disassemble(script: &[u8], settings: &Settings) -> String {
    let table = OpcodeTable::new(settings.opcode_version);
    let encoding = settings.encoding();
    disasm::decode(script, &table, true)
        .iter()
        .map(|inst| format!("{}\n", inst.listing(encoding)))
        .collect()
}

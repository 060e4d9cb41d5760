// cfg.rs - Control Flow Graph builder
//
// Partitions a decoded script into basic blocks and resolves branch targets.

use crate::disasm::{Instruction, Operand};
use crate::opcode::Mnemonic;
use std::collections::BTreeMap;
use std::mem;

/// How control leaves a basic block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Falls through to the next block
    Linear,
    /// Relative conditional branch
    Conditional,
    /// Unconditional jump within the script
    Jump,
    /// Jump to another script (`goto`, `option`)
    ProcJump,
    /// Leaves the script
    Return,
}

/// A basic block of instructions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    /// Start address (inclusive)
    pub entry: u32,
    /// End address (exclusive), unresolved while the block is still open
    pub exit: Option<u32>,
    pub kind: BlockKind,
    /// Fallthrough, taken branch or jump destination
    pub true_target: Option<u32>,
    /// Branch destination when the condition is false
    pub false_target: Option<u32>,
    /// Scripts a procedure jump may continue in
    pub exit_procs: Vec<String>,
    /// Entries of the blocks branching here
    pub predecessors: Vec<u32>,
}

impl BasicBlock {
    fn new(entry: u32) -> Self {
        Self {
            entry,
            exit: None,
            kind: BlockKind::Linear,
            true_target: None,
            false_target: None,
            exit_procs: Vec::new(),
            predecessors: Vec::new(),
        }
    }

    /// Does the half-open range `[entry, exit)` contain `addr`?
    pub fn contains(&self, addr: u32) -> bool {
        matches!(self.exit, Some(exit) if self.entry <= addr && addr < exit)
    }

    pub fn len(&self) -> u32 {
        self.exit.map_or(0, |exit| exit.saturating_sub(self.entry))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Control flow graph of one script
#[derive(Debug, Default)]
pub struct ControlFlowGraph {
    /// Blocks sorted by entry address
    blocks: Vec<BasicBlock>,
    /// Entry address → index into `blocks`
    by_entry: BTreeMap<u32, usize>,
}

impl ControlFlowGraph {
    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Block starting exactly at `entry`
    pub fn block_at(&self, entry: u32) -> Option<&BasicBlock> {
        self.by_entry.get(&entry).map(|&idx| &self.blocks[idx])
    }

    /// Block whose range contains `addr`
    pub fn block_containing(&self, addr: u32) -> Option<&BasicBlock> {
        let (_, &idx) = self.by_entry.range(..=addr).next_back()?;
        let block = &self.blocks[idx];
        block.contains(addr).then_some(block)
    }

    /// Instructions inside `block`, optionally without its first one
    pub fn block_instructions<'a>(
        &self,
        block: &BasicBlock,
        instructions: &'a [Instruction],
        skip_first: bool,
    ) -> &'a [Instruction] {
        let insts = self.instructions_from(block, instructions, block.entry);
        if skip_first && !insts.is_empty() {
            &insts[1..]
        } else {
            insts
        }
    }

    /// Instructions of `block` from `addr` (inclusive) to the end of the block
    pub fn instructions_from<'a>(
        &self,
        block: &BasicBlock,
        instructions: &'a [Instruction],
        addr: u32,
    ) -> &'a [Instruction] {
        let Some(exit) = block.exit else {
            return &[];
        };
        let start = instructions.partition_point(|i| i.addr < addr.max(block.entry));
        let end = instructions.partition_point(|i| i.addr < exit);
        &instructions[start..end.max(start)]
    }
}

struct Builder {
    blocks: Vec<BasicBlock>,
    by_entry: BTreeMap<u32, usize>,
}

impl Builder {
    fn new() -> Self {
        Self {
            blocks: Vec::new(),
            by_entry: BTreeMap::new(),
        }
    }

    /// Find, split or create the block starting at `addr`
    fn define_block_at(&mut self, addr: u32, pred: Option<u32>) -> usize {
        let (idx, pred) = if let Some(&idx) = self.by_entry.get(&addr) {
            (idx, pred)
        } else if let Some(head) = self.blocks.iter().position(|b| b.contains(addr)) {
            let head_entry = self.blocks[head].entry;
            // The branching instruction now lives in the tail
            let pred = pred.map(|p| if p == head_entry { addr } else { p });
            (self.split(head, addr), pred)
        } else {
            self.blocks.push(BasicBlock::new(addr));
            let idx = self.blocks.len() - 1;
            self.by_entry.insert(addr, idx);
            (idx, pred)
        };

        if let Some(pred) = pred {
            self.blocks[idx].predecessors.push(pred);
        }
        idx
    }

    /// Split the block at `head` so that a new block starts at `addr`
    fn split(&mut self, head: usize, addr: u32) -> usize {
        let block = &mut self.blocks[head];
        let head_entry = block.entry;
        let tail = BasicBlock {
            entry: addr,
            exit: block.exit,
            kind: block.kind,
            true_target: block.true_target,
            false_target: block.false_target,
            exit_procs: mem::take(&mut block.exit_procs),
            predecessors: vec![head_entry],
        };
        block.exit = Some(addr);
        block.kind = BlockKind::Linear;
        block.true_target = Some(addr);
        block.false_target = None;

        // Outgoing edges now leave from the tail
        for target in [tail.true_target, tail.false_target].into_iter().flatten() {
            if let Some(&t) = self.by_entry.get(&target) {
                for p in self.blocks[t].predecessors.iter_mut() {
                    if *p == head_entry {
                        *p = addr;
                    }
                }
            }
        }

        log::trace!("split block 0x{:x} at 0x{:x}", head_entry, addr);
        self.blocks.push(tail);
        let idx = self.blocks.len() - 1;
        self.by_entry.insert(addr, idx);
        idx
    }

    fn finish(self) -> ControlFlowGraph {
        let mut blocks: Vec<BasicBlock> = self
            .blocks
            .into_iter()
            .filter(|b| {
                if b.exit.is_none() {
                    log::warn!("dropping unterminated block at 0x{:x}", b.entry);
                }
                !b.is_empty()
            })
            .collect();
        blocks.sort_by_key(|b| b.entry);
        let by_entry = blocks
            .iter()
            .enumerate()
            .map(|(idx, b)| (b.entry, idx))
            .collect();
        ControlFlowGraph { blocks, by_entry }
    }
}

fn proc_name(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Build the control flow graph of one decoded script
///
/// Never fails; instructions with malformed branch operands are treated
/// as straight-line code.
///
/// Zero-length blocks are pruned. A target at the very end of the script
/// is still recorded on its source block, but `block_at` returns `None`
/// for it: control simply falls off the script there.
pub fn build(instructions: &[Instruction]) -> ControlFlowGraph {
    let mut builder = Builder::new();
    let start = instructions.first().map_or(0, |i| i.addr);
    let mut current = builder.define_block_at(start, None);

    for inst in instructions {
        // Reaching another block's entry closes the current one
        if let Some(&idx) = builder.by_entry.get(&inst.addr) {
            if idx != current {
                let block = &mut builder.blocks[current];
                if block.exit.is_none() {
                    block.exit = Some(inst.addr);
                    block.true_target = Some(inst.addr);
                }
                current = idx;
            }
        }

        let entry = builder.blocks[current].entry;
        let next = inst.next_addr();
        let mnemonic = inst.mnemonic;

        if mnemonic.is_conditional_branch() {
            let Some(false_target) = inst
                .int(2)
                .and_then(|rel| u32::try_from(next as i64 + rel).ok())
            else {
                log::warn!("malformed branch at 0x{:x}", inst.addr);
                continue;
            };
            let block = &mut builder.blocks[current];
            block.kind = BlockKind::Conditional;
            block.exit = Some(next);
            block.true_target = Some(next);
            block.false_target = Some(false_target);
            builder.define_block_at(next, Some(entry));
            builder.define_block_at(false_target, Some(entry));
        } else if mnemonic.is_unconditional_jump() {
            let Some(target) = inst.int(0).and_then(|t| u32::try_from(t).ok()) else {
                log::warn!("malformed jump at 0x{:x}", inst.addr);
                continue;
            };
            let block = &mut builder.blocks[current];
            block.kind = BlockKind::Jump;
            block.exit = Some(next);
            block.true_target = Some(target);
            builder.define_block_at(target, Some(entry));
            builder.define_block_at(next, None);
        } else if mnemonic.is_procedure_jump() {
            let block = &mut builder.blocks[current];
            block.kind = BlockKind::ProcJump;
            block.exit = Some(next);
            for operand in &inst.operands {
                match operand {
                    Operand::Bytes(target) => block.exit_procs.push(proc_name(target)),
                    Operand::Options(opts) => block
                        .exit_procs
                        .extend(opts.iter().map(|o| proc_name(&o.target))),
                    _ => {}
                }
            }
            builder.define_block_at(next, None);
        } else if mnemonic.is_return() {
            let block = &mut builder.blocks[current];
            block.kind = BlockKind::Return;
            block.exit = Some(next);
            builder.define_block_at(next, None);
        } else if mnemonic == Mnemonic::EndOfStream {
            let block = &mut builder.blocks[current];
            if block.exit.is_none() {
                block.exit = Some(inst.addr);
            }
        }
    }

    let cfg = builder.finish();
    log::debug!("built {} basic blocks", cfg.len());
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disasm::decode;
    use crate::opcode::OpcodeTable;

    fn build_from(data: &[u8]) -> (Vec<Instruction>, ControlFlowGraph) {
        let insts = decode(data, &OpcodeTable::default(), true);
        let cfg = build(&insts);
        (insts, cfg)
    }

    fn assert_tiles(cfg: &ControlFlowGraph, len: u32) {
        let mut expected = 0;
        for block in cfg.blocks() {
            assert_eq!(block.entry, expected, "gap or overlap at 0x{:x}", expected);
            expected = block.exit.unwrap();
            assert!(block.entry < expected);
        }
        assert_eq!(expected, len);
    }

    #[test]
    fn test_empty_cfg() {
        let (_, cfg) = build_from(&[]);
        assert!(cfg.is_empty());
    }

    #[test]
    fn test_conditional_makes_three_blocks() {
        let data = [
            0x01, 0x03, 0xe6, 0x03, 0x00, 0x00, 0x0a, 0x00, 0x00, 0x00, 0x00, // 0x00 jeq 998, 0, +10
            0x41, 0x01, 0x00, 0x00, b'a', 0x00, // 0x0b text_n
            0x82, 0x01, 0x00, 0x00, // 0x11 sleep
            0x0a, 0x00, // 0x15 return
        ];
        let (_, cfg) = build_from(&data);
        assert_eq!(cfg.len(), 3);

        let cond = cfg.block_at(0).unwrap();
        assert_eq!(cond.kind, BlockKind::Conditional);
        assert_eq!(cond.exit, Some(11));
        assert_eq!(cond.true_target, Some(11));
        assert_eq!(cond.false_target, Some(21));

        let body = cfg.block_at(11).unwrap();
        assert_eq!(body.kind, BlockKind::Linear);
        assert_eq!(body.true_target, Some(21));
        assert_eq!(body.predecessors, vec![0]);

        let ret = cfg.block_at(21).unwrap();
        assert_eq!(ret.kind, BlockKind::Return);
        assert_eq!(ret.predecessors, vec![0]);
        assert_tiles(&cfg, data.len() as u32);
    }

    #[test]
    fn test_target_at_end_of_script_is_pruned() {
        let data = [
            0x06, 0x06, 0x00, 0x00, 0x00, 0x00, // 0x00 jmp_offset 6
        ];
        let (_, cfg) = build_from(&data);
        assert_eq!(cfg.len(), 1);
        let jump = cfg.block_at(0).unwrap();
        assert_eq!(jump.kind, BlockKind::Jump);
        assert_eq!(jump.true_target, Some(6));
        assert!(cfg.block_at(6).is_none());
        assert!(cfg.block_containing(6).is_none());
        assert_tiles(&cfg, data.len() as u32);
    }

    #[test]
    fn test_backward_jump_splits_block() {
        let data = [
            0x82, 0x01, 0x00, 0x00, // 0x00 sleep
            0x82, 0x02, 0x00, 0x00, // 0x04 sleep
            0x82, 0x03, 0x00, 0x00, // 0x08 sleep
            0x06, 0x04, 0x00, 0x00, 0x00, 0x00, // 0x0c jmp_offset 4
            0x0a, 0x00, // 0x12 return
        ];
        let (_, cfg) = build_from(&data);
        assert_tiles(&cfg, data.len() as u32);

        let head = cfg.block_at(0).unwrap();
        assert_eq!(head.kind, BlockKind::Linear);
        assert_eq!(head.exit, Some(4));
        assert_eq!(head.true_target, Some(4));
        assert_eq!(head.false_target, None);

        let tail = cfg.block_at(4).unwrap();
        assert_eq!(tail.kind, BlockKind::Jump);
        assert_eq!(tail.exit, Some(18));
        assert_eq!(tail.true_target, Some(4));
        // Fallthrough from the head and the loop edge from the tail itself
        assert_eq!(tail.predecessors, vec![0, 4]);

        assert_eq!(cfg.block_at(18).unwrap().kind, BlockKind::Return);
    }

    #[test]
    fn test_split_moves_outgoing_edges_to_tail() {
        let data = [
            0x82, 0x01, 0x00, 0x00, // 0x00 sleep
            0x01, 0x03, 0xe6, 0x03, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, // 0x04 jeq +4
            0x82, 0x02, 0x00, 0x00, // 0x0f sleep
            0x0a, 0x00, // 0x13 return
            0x06, 0x04, 0x00, 0x00, 0x00, 0x00, // 0x15 jmp_offset 4
        ];
        let (_, cfg) = build_from(&data);
        assert_tiles(&cfg, data.len() as u32);

        let cond = cfg.block_at(4).unwrap();
        assert_eq!(cond.kind, BlockKind::Conditional);
        assert_eq!(cond.false_target, Some(0x13));
        assert_eq!(cfg.block_at(0).unwrap().kind, BlockKind::Linear);
        assert_eq!(cfg.block_at(0x0f).unwrap().predecessors, vec![4]);
        assert_eq!(cfg.block_at(0x13).unwrap().predecessors, vec![4]);
        assert!(cfg.block_at(4).unwrap().predecessors.contains(&0x15));
    }

    #[test]
    fn test_conditional_targets_are_block_entries() {
        let data = [
            0x01, 0x01, 0x01, 0x00, 0x05, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, // 0x00 jbe 1, 5, +4
            0x82, 0x01, 0x00, 0x00, // 0x0b sleep
            0x07, b's', b'1', 0x00, // 0x0f goto s1
            0x04, // 0x13 exit
        ];
        let (_, cfg) = build_from(&data);
        assert_tiles(&cfg, data.len() as u32);
        for block in cfg.blocks() {
            if block.kind == BlockKind::Conditional {
                assert!(cfg.block_at(block.true_target.unwrap()).is_some());
                assert!(cfg.block_at(block.false_target.unwrap()).is_some());
            } else {
                assert_eq!(block.false_target, None);
            }
        }
        let goto = cfg.block_at(0x0f).unwrap();
        assert_eq!(goto.kind, BlockKind::ProcJump);
        assert_eq!(goto.exit_procs, vec!["s1".to_string()]);
    }

    #[test]
    fn test_queries() {
        let data = [
            0x41, 0x01, 0x00, 0x00, b'a', 0x00, // 0x00 text_n
            0x82, 0x01, 0x00, 0x00, // 0x06 sleep
            0x0a, 0x00, // 0x0a return
            0x82, 0x02, 0x00, 0x00, // 0x0c sleep
        ];
        let (insts, cfg) = build_from(&data);
        let first = cfg.block_containing(7).unwrap();
        assert_eq!(first.entry, 0);
        assert!(cfg.block_containing(100).is_none());

        let body = cfg.block_instructions(first, &insts, false);
        assert_eq!(body.len(), 3);
        let rest = cfg.block_instructions(first, &insts, true);
        assert_eq!(rest[0].mnemonic, Mnemonic::Sleep);
        let from = cfg.instructions_from(first, &insts, 6);
        assert_eq!(from.len(), 2);

        let last = cfg.block_at(0x0c).unwrap();
        assert_eq!(cfg.block_instructions(last, &insts, false).len(), 1);
    }
}

// disasm.rs - RIO bytecode disassembler
//
// Decodes a script's byte stream into structured instructions using the
// active opcode table.

use crate::opcode::{
    Field, Layout, Mnemonic, OpcodeDescriptor, OpcodeTable, SubDecoder, ASSIGN_SUBCOMMANDS,
    BRANCH_SUBCOMMANDS, TRANSITION_NAMES,
};
use encoding_rs::{Encoding, UTF_8};
use std::fmt;

/// A decoded RIO instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Offset of the opcode byte within the script
    pub addr: u32,
    /// Bytes consumed, including any terminator byte
    pub len: u32,
    /// Opcode byte (absent for synthetic markers)
    pub opcode: Option<u8>,
    pub mnemonic: Mnemonic,
    pub operands: Vec<Operand>,
}

/// A decoded operand
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Int(i64),
    /// Raw string bytes in the script's text encoding
    Bytes(Vec<u8>),
    /// Resolved symbolic name (transition codes)
    Name(&'static str),
    Options(Vec<MenuOption>),
}

/// One entry of an `option` (menu) instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuOption {
    pub text_id: i16,
    pub text: Vec<u8>,
    pub unknown1: u8,
    /// Flag controlling the option's visibility
    pub flag: u16,
    pub unknown2: u8,
    /// Script jumped to when the option is picked
    pub target: Vec<u8>,
}

impl Instruction {
    fn marker(addr: u32, mnemonic: Mnemonic) -> Self {
        Self {
            addr,
            len: 0,
            opcode: None,
            mnemonic,
            operands: Vec::new(),
        }
    }

    /// Address of the following instruction
    pub fn next_addr(&self) -> u32 {
        self.addr + self.len
    }

    pub fn int(&self, idx: usize) -> Option<i64> {
        match self.operands.get(idx)? {
            Operand::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn bytes(&self, idx: usize) -> Option<&[u8]> {
        match self.operands.get(idx)? {
            Operand::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn options(&self) -> Option<&[MenuOption]> {
        match self.operands.first()? {
            Operand::Options(opts) => Some(opts),
            _ => None,
        }
    }

    /// One-line listing, `0x<addr>:<mnemonic>(<operands>)`
    pub fn listing(&self, encoding: &'static Encoding) -> String {
        let text = |b: &[u8]| format!("{:?}", encoding.decode_without_bom_handling(b).0);
        let operands: Vec<String> = self
            .operands
            .iter()
            .map(|op| match op {
                Operand::Int(v) => v.to_string(),
                Operand::Bytes(b) => text(b),
                Operand::Name(n) => format!("{:?}", n),
                Operand::Options(opts) => opts
                    .iter()
                    .map(|o| {
                        format!(
                            "({}, {}, {}, {}, {}, {})",
                            o.text_id,
                            text(&o.text),
                            o.unknown1,
                            o.flag,
                            o.unknown2,
                            text(&o.target)
                        )
                    })
                    .collect::<Vec<_>>()
                    .join(", "),
            })
            .collect();
        format!("0x{:x}:{}({})", self.addr, self.mnemonic, operands.join(", "))
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.listing(UTF_8))
    }
}

/// Little-endian cursor over the script
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.data.get(self.pos..self.pos + N)?;
        self.pos += N;
        bytes.try_into().ok()
    }

    fn u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|b| b[0])
    }

    fn u16(&mut self) -> Option<u16> {
        self.take().map(u16::from_le_bytes)
    }

    fn i16(&mut self) -> Option<i16> {
        self.take().map(i16::from_le_bytes)
    }

    fn cstr(&mut self) -> Option<Vec<u8>> {
        let rest = self.data.get(self.pos..)?;
        match rest.iter().position(|&b| b == 0) {
            Some(nul) => {
                self.pos += nul + 1;
                Some(rest[..nul].to_vec())
            }
            None if rest.is_empty() => None,
            None => {
                // Unterminated string at end of script
                self.pos = self.data.len();
                Some(rest.to_vec())
            }
        }
    }

    fn field(&mut self, field: Field) -> Option<Option<Operand>> {
        let operand = match field {
            Field::U8 => Operand::Int(self.u8()? as i64),
            Field::I8 => Operand::Int(self.u8()? as i8 as i64),
            Field::U16 => Operand::Int(self.u16()? as i64),
            Field::I16 => Operand::Int(self.i16()? as i64),
            Field::I32 => Operand::Int(i32::from_le_bytes(self.take()?) as i64),
            Field::Pad => {
                self.u8()?;
                return Some(None);
            }
            Field::CStr => Operand::Bytes(self.cstr()?),
        };
        Some(Some(operand))
    }

    fn fields(&mut self, fields: &[Field]) -> Option<Vec<Operand>> {
        let mut operands = Vec::with_capacity(fields.len());
        for &field in fields {
            if let Some(op) = self.field(field)? {
                operands.push(op);
            }
        }
        Some(operands)
    }
}

/// Decode a whole script
///
/// Never fails: unknown opcodes are skipped up to the next zero byte and
/// recorded as `INVALID`, missing terminators are recorded as
/// `NOT_TERMINATED`. The result always ends with a synthetic `EOF`.
///
/// With `resolve_names` unset, sub-decoded opcodes keep their base
/// mnemonic and selector operand, and transition codes stay numeric.
pub fn decode(data: &[u8], table: &OpcodeTable, resolve_names: bool) -> Vec<Instruction> {
    log::debug!("decoding {} bytes with the {} opcode table", data.len(), table.version());
    let mut instructions = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        let op = data[offset];

        let Some(desc) = table.get(op) else {
            // Resync at the next zero byte
            let rest = &data[offset + 1..];
            let skipped = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
            log::warn!(
                "unknown opcode 0x{:02x} at 0x{:x}, skipping {} bytes",
                op,
                offset,
                skipped
            );
            let consumed = (1 + skipped + 1).min(data.len() - offset);
            instructions.push(Instruction {
                addr: offset as u32,
                len: consumed as u32,
                opcode: Some(op),
                mnemonic: Mnemonic::Invalid,
                operands: rest[..skipped].iter().map(|&b| Operand::Int(b as i64)).collect(),
            });
            offset += consumed;
            continue;
        };

        let mut reader = Reader::new(data, offset + 1);
        let Some((mnemonic, operands)) = decode_operands(&mut reader, desc, resolve_names) else {
            // Operands run past the end of the script
            log::warn!("truncated {} at 0x{:x}", desc.mnemonic, offset);
            instructions.push(Instruction {
                addr: offset as u32,
                len: (data.len() - offset) as u32,
                opcode: Some(op),
                mnemonic: Mnemonic::Invalid,
                operands: data[offset + 1..]
                    .iter()
                    .map(|&b| Operand::Int(b as i64))
                    .collect(),
            });
            offset = data.len();
            break;
        };

        let mut end = reader.pos;
        let mut not_terminated = false;
        if desc.expects_terminator() {
            match data.get(end) {
                Some(0) => end += 1,
                Some(_) => not_terminated = true,
                // Nothing left to terminate
                None => {}
            }
        }

        instructions.push(Instruction {
            addr: offset as u32,
            len: (end - offset) as u32,
            opcode: Some(op),
            mnemonic,
            operands,
        });
        if not_terminated {
            log::warn!("{} at 0x{:x} is not terminated", mnemonic, offset);
            instructions.push(Instruction::marker(end as u32, Mnemonic::NotTerminated));
        }
        offset = end;
    }

    instructions.push(Instruction::marker(offset as u32, Mnemonic::EndOfStream));
    instructions
}

fn decode_operands(
    reader: &mut Reader<'_>,
    desc: &OpcodeDescriptor,
    resolve_names: bool,
) -> Option<(Mnemonic, Vec<Operand>)> {
    let fields = match desc.layout {
        Layout::Bare => return Some((desc.mnemonic, Vec::new())),
        Layout::Fields(fields) => fields,
    };

    let Some(sub) = desc.sub else {
        return Some((desc.mnemonic, reader.fields(fields)?));
    };

    match sub {
        SubDecoder::Options => Some((desc.mnemonic, vec![Operand::Options(read_options(reader)?)])),
        SubDecoder::Branch | SubDecoder::Assign => {
            let mut operands = reader.fields(fields)?;
            if !resolve_names {
                return Some((desc.mnemonic, operands));
            }
            let family = if sub == SubDecoder::Branch {
                &BRANCH_SUBCOMMANDS
            } else {
                &ASSIGN_SUBCOMMANDS
            };
            let selected = match operands.first() {
                Some(Operand::Int(sel)) => usize::try_from(*sel).ok().and_then(|s| family.get(s)),
                _ => None,
            };
            match selected {
                Some(&mnemonic) => {
                    operands.remove(0);
                    Some((mnemonic, operands))
                }
                None => Some((desc.mnemonic, operands)),
            }
        }
        SubDecoder::Transition => {
            let mut operands = reader.fields(fields)?;
            if resolve_names {
                if let Some(&Operand::Int(code)) = operands.first() {
                    if let Some(&name) = usize::try_from(code).ok().and_then(|c| TRANSITION_NAMES.get(c)) {
                        operands[0] = Operand::Name(name);
                    }
                }
            }
            Some((desc.mnemonic, operands))
        }
    }
}

fn read_options(reader: &mut Reader<'_>) -> Option<Vec<MenuOption>> {
    let count = reader.u16()?;
    let mut options = Vec::with_capacity(count as usize);
    for _ in 0..count {
        options.push(MenuOption {
            text_id: reader.i16()?,
            text: reader.cstr()?,
            unknown1: reader.u8()?,
            flag: reader.u16()?,
            unknown2: reader.u8()?,
            target: reader.cstr()?,
        });
    }
    Some(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Version;

    fn decode_default(data: &[u8]) -> Vec<Instruction> {
        decode(data, &OpcodeTable::default(), true)
    }

    #[test]
    fn test_jmp_offset() {
        let insts = decode_default(&[0x06, 0x05, 0x00, 0x00, 0x00]);
        assert_eq!(insts.len(), 2);
        assert_eq!(insts[0].mnemonic, Mnemonic::JmpOffset);
        assert_eq!(insts[0].operands, vec![Operand::Int(5)]);
        assert_eq!(insts[1].addr, 5);
        assert_eq!(insts[1].mnemonic, Mnemonic::EndOfStream);
    }

    #[test]
    fn test_terminator_byte_is_consumed() {
        // sleep 500; return
        let insts = decode_default(&[0x82, 0xf4, 0x01, 0x00, 0x0a, 0x00]);
        assert_eq!(insts[0].mnemonic, Mnemonic::Sleep);
        assert_eq!(insts[0].int(0), Some(500));
        assert_eq!(insts[0].len, 4);
        assert_eq!(insts[1].addr, 4);
        assert_eq!(insts[1].mnemonic, Mnemonic::Return);
        assert_eq!(insts[2].addr, 6);
    }

    #[test]
    fn test_next_address_follows_consumed_bytes() {
        let data = [
            0x41, 0x01, 0x00, 0x00, b'h', b'i', 0x00, // text_n 1 "hi"
            0x4c, 0x01, 0x00, // play_animation 1
            0x04, // exit
            0x07, b'a', 0x00, // goto "a"
        ];
        let insts = decode_default(&data);
        for pair in insts.windows(2) {
            assert_eq!(pair[0].next_addr(), pair[1].addr);
        }
        assert_eq!(insts.last().unwrap().addr as usize, data.len());
    }

    #[test]
    fn test_invalid_opcode_resync() {
        let data = [0x20, 0xaa, 0xbb, 0xcc, 0x00, 0x0a, 0x00];
        let insts = decode_default(&data);
        assert_eq!(insts[0].mnemonic, Mnemonic::Invalid);
        assert_eq!(insts[0].opcode, Some(0x20));
        assert_eq!(
            insts[0].operands,
            vec![Operand::Int(0xaa), Operand::Int(0xbb), Operand::Int(0xcc)]
        );
        assert_eq!(insts[1].addr, 5);
        assert_eq!(insts[1].mnemonic, Mnemonic::Return);
    }

    #[test]
    fn test_not_terminated_marker() {
        // sleep 1 followed by a non-zero byte, then return
        let data = [0x82, 0x01, 0x00, 0x0a, 0x00];
        let insts = decode_default(&data);
        assert_eq!(insts[0].mnemonic, Mnemonic::Sleep);
        assert_eq!(insts[0].len, 3);
        assert_eq!(insts[1].mnemonic, Mnemonic::NotTerminated);
        assert_eq!(insts[1].addr, 3);
        assert_eq!(insts[1].len, 0);
        assert_eq!(insts[2].mnemonic, Mnemonic::Return);
        assert_eq!(insts[2].addr, 3);
    }

    #[test]
    fn test_conditional_branch_subcommand() {
        // jeq flag 998, 0, +10
        let data = [0x01, 0x03, 0xe6, 0x03, 0x00, 0x00, 0x0a, 0x00, 0x00, 0x00, 0x00];
        let insts = decode_default(&data);
        assert_eq!(insts[0].mnemonic, Mnemonic::Jeq);
        assert_eq!(
            insts[0].operands,
            vec![Operand::Int(998), Operand::Int(0), Operand::Int(10)]
        );
        assert_eq!(insts[0].len, 11);

        let raw = decode(&data, &OpcodeTable::default(), false);
        assert_eq!(raw[0].mnemonic, Mnemonic::Jmp);
        assert_eq!(raw[0].int(0), Some(3));
    }

    #[test]
    fn test_assignment_subcommand() {
        // mov flag 993, imm, 4
        let data = [0x03, 0x01, 0xe1, 0x03, 0x00, 0x04, 0x00, 0x00];
        let insts = decode_default(&data);
        assert_eq!(insts[0].mnemonic, Mnemonic::Mov);
        assert_eq!(
            insts[0].operands,
            vec![Operand::Int(993), Operand::Int(0), Operand::Int(4)]
        );
    }

    #[test]
    fn test_transition_name_lookup() {
        let insts = decode_default(&[0x4a, 0x19, 0xe8, 0x03, 0x00]);
        assert_eq!(insts[0].mnemonic, Mnemonic::Transition);
        assert_eq!(insts[0].operands[0], Operand::Name("fade_in"));
        assert_eq!(insts[0].int(1), Some(1000));

        // Unknown codes stay numeric
        let insts = decode_default(&[0x4a, 0x63, 0x00, 0x00, 0x00]);
        assert_eq!(insts[0].operands[0], Operand::Int(99));
    }

    #[test]
    fn test_options() {
        let mut data = vec![0x02, 0x02, 0x00];
        for (id, text, target) in [(1i16, &b"Yes"[..], &b"s01"[..]), (2, b"No", b"s02")] {
            data.extend_from_slice(&id.to_le_bytes());
            data.extend_from_slice(text);
            data.push(0);
            data.push(1);
            data.extend_from_slice(&852u16.to_le_bytes());
            data.push(0);
            data.extend_from_slice(target);
            data.push(0);
        }
        data.push(0x0a);
        data.push(0x00);

        let insts = decode_default(&data);
        let opts = insts[0].options().unwrap();
        assert_eq!(opts.len(), 2);
        assert_eq!(opts[0].text, b"Yes");
        assert_eq!(opts[1].flag, 852);
        assert_eq!(opts[1].target, b"s02");
        // No terminator expected after an option list
        assert_eq!(insts[1].mnemonic, Mnemonic::Return);
        assert_eq!(insts[1].addr as usize, data.len() - 2);
    }

    #[test]
    fn test_pad_fields_produce_no_operands() {
        // text_c id=7, pad pad, "A", "hello"
        let data = [0x42, 0x07, 0x00, 0x00, 0x00, b'A', 0x00, b'h', b'e', 0x00];
        let insts = decode_default(&data);
        assert_eq!(insts[0].mnemonic, Mnemonic::TextC);
        assert_eq!(insts[0].operands.len(), 3);
        assert_eq!(insts[0].bytes(1), Some(&b"A"[..]));
        assert_eq!(insts[0].bytes(2), Some(&b"he"[..]));
    }

    #[test]
    fn test_version_changes_layout() {
        // ymk play_animation_noskip takes no operand
        let data = [0x4c, 0x00, 0x0a, 0x00];
        let insts = decode(&data, &OpcodeTable::new(Version::Ymk), true);
        assert_eq!(insts[0].mnemonic, Mnemonic::PlayAnimationNoskip);
        assert_eq!(insts[0].len, 2);
        assert_eq!(insts[1].mnemonic, Mnemonic::Return);
    }

    #[test]
    fn test_truncated_operands() {
        let insts = decode_default(&[0x46, 0x01]);
        assert_eq!(insts[0].mnemonic, Mnemonic::Invalid);
        assert_eq!(insts[1].mnemonic, Mnemonic::EndOfStream);
        assert_eq!(insts[1].addr, 2);
    }

    #[test]
    fn test_listing() {
        let insts = decode_default(&[0x07, b'a', b'b', 0x00]);
        assert_eq!(insts[0].to_string(), "0x0:goto(\"ab\")");
    }
}

// translate.rs - RIO to Ren'Py translation
//
// Walks a decoded script together with its CFG and emits Ren'Py statements.
// Display state is tracked per script so images are only redrawn when they
// actually change, and keyframe runs collapse into a single ATL timeline.

use crate::cfg::{BlockKind, ControlFlowGraph};
use crate::disasm::{Instruction, Operand};
use crate::displayable::{Displayable, FrameKind, Origin, Slot, Sprite, SpriteError, Stub};
use crate::emitter::Emitter;
use crate::flags::{self, FlagRef};
use crate::opcode::Mnemonic;
use crate::settings::{HookAction, Settings};
use crate::text::{self, format_float, seconds, Emoji};
use encoding_rs::Encoding;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Engine frame rate, the unit of the typewriter duration
const WILLPLUS_FPS: f64 = 20.0;
/// Flag holding the per-character reveal duration
const TYPEWRITER_FLAG: i64 = 993;
/// Flag table name of the engine's "skipping" flag
const SKIP_FLAG_NAME: &str = "skipping";

/// Fatal translation error; aborts the current script only
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("0x{addr:x}: {source}")]
    Sprite {
        addr: u32,
        #[source]
        source: SpriteError,
    },
    #[error("0x{addr:x}: malformed operands for `{mnemonic}`")]
    Operands { addr: u32, mnemonic: Mnemonic },
    #[error("0x{addr:x}: transition `{transition}` needs a mask but none was set")]
    MissingTransMask { addr: u32, transition: String },
    #[error("0x{addr:x}: say held for a menu is `{mnemonic}`, not dialogue")]
    MenuSay { addr: u32, mnemonic: Mnemonic },
}

/// Output of one script's translation
///
/// On error `text` holds everything emitted before the failure plus a
/// closing diagnostic.
#[derive(Debug)]
pub struct Translation {
    pub text: String,
    pub error: Option<TranslateError>,
}

impl Translation {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

type Result<T> = std::result::Result<T, TranslateError>;

/// Instruction handler
type Handler<'a> = fn(&mut Translator<'a>, &Instruction) -> Result<()>;

fn malformed(inst: &Instruction) -> TranslateError {
    TranslateError::Operands {
        addr: inst.addr,
        mnemonic: inst.mnemonic,
    }
}

fn int(inst: &Instruction, idx: usize) -> Result<i64> {
    inst.int(idx).ok_or_else(|| malformed(inst))
}

fn bytes(inst: &Instruction, idx: usize) -> Result<&[u8]> {
    inst.bytes(idx).ok_or_else(|| malformed(inst))
}

/// Trailing string operand (file names of audio instructions)
fn last_bytes(inst: &Instruction) -> Result<&[u8]> {
    match inst.operands.last() {
        Some(Operand::Bytes(b)) => Ok(b),
        _ => Err(malformed(inst)),
    }
}

/// Emit `head` followed by an indented ATL block, if any
fn emit_with_atl(out: &mut Emitter, head: String, atl: Vec<String>) {
    if atl.is_empty() {
        out.statement(head);
    } else {
        out.statement(format!("{}:", head));
        out.begin_scope();
        for line in atl {
            out.statement(line);
        }
        out.end_scope();
    }
}

/// Grow the foreground list so that `index` is addressable
fn slot_at(fg: &mut Vec<Option<Slot>>, index: usize) -> &mut Option<Slot> {
    if fg.len() <= index {
        fg.resize_with(index + 1, || None);
    }
    &mut fg[index]
}

/// `up`/`down`/`left`/`right` between a prefix and a suffix
fn direction<'t>(kind: &'t str, prefix: &str, suffix: &str) -> Option<&'t str> {
    let dir = kind.strip_prefix(prefix)?.strip_suffix(suffix)?;
    matches!(dir, "up" | "down" | "left" | "right").then_some(dir)
}

/// What is on screen
#[derive(Debug, Default)]
struct Gfx {
    bg: Option<Displayable>,
    bg_redraw: bool,
    fg: Vec<Option<Slot>>,
    fg_redraw: bool,
    obj: Option<Slot>,
    obj_redraw: bool,
    /// Palette index applied to newly shown foregrounds
    tint: i64,
    trans_mask: Option<String>,
    in_animation_segment: bool,
}

/// Adult scene boundary in the current script
#[derive(Debug, Clone)]
enum SkipMark {
    Begin {
        index: usize,
        insert_transition: bool,
        end_script: String,
    },
    End {
        index: usize,
    },
}

/// Per-script translation state
struct Translator<'a> {
    settings: &'a Settings,
    instructions: &'a [Instruction],
    cfg: &'a ControlFlowGraph,
    encoding: &'static Encoding,
    name: String,
    out: Emitter,
    gfx: Gfx,
    /// Index and address of the instruction being translated
    index: usize,
    addr: u32,
    /// Dialogue held back to open the next menu
    say_for_menu: Option<usize>,
    /// Close addresses of the open conditional scopes
    scope_ends: Vec<u32>,
    /// Jump destinations still needing a label
    pending_labels: BTreeSet<u32>,
    typewriter_duration: i64,
    /// Pauses already inlined into a say
    consumed_sleeps: BTreeSet<u32>,
    text_size: i64,
    /// Speaker picked from the last voice file name
    next_speaker: Option<String>,
    skip_marks: HashMap<u32, SkipMark>,
}

impl<'a> Translator<'a> {
    fn new(
        name: &str,
        instructions: &'a [Instruction],
        cfg: &'a ControlFlowGraph,
        settings: &'a Settings,
    ) -> Self {
        let name = name.to_uppercase();

        let pending_labels = cfg
            .blocks()
            .iter()
            .filter(|b| b.kind == BlockKind::Jump)
            .filter_map(|b| b.true_target)
            .collect();

        let mut skip_marks = HashMap::new();
        if settings.adult_skip.enabled {
            for (index, range) in settings.adult_skip.ranges.iter().enumerate() {
                if range.begin.script.eq_ignore_ascii_case(&name) {
                    skip_marks.insert(
                        range.begin.addr,
                        SkipMark::Begin {
                            index,
                            insert_transition: range.begin.insert_transition,
                            end_script: range.end.script.to_uppercase(),
                        },
                    );
                }
                if range.end.script.eq_ignore_ascii_case(&name) {
                    skip_marks.insert(range.end.addr, SkipMark::End { index });
                }
            }
        }

        Self {
            settings,
            instructions,
            cfg,
            encoding: settings.encoding(),
            name,
            out: Emitter::new(),
            gfx: Gfx::default(),
            index: 0,
            addr: 0,
            say_for_menu: None,
            scope_ends: Vec::new(),
            pending_labels,
            typewriter_duration: 0,
            consumed_sleeps: BTreeSet::new(),
            text_size: 0,
            next_speaker: None,
            skip_marks,
        }
    }

    fn run(&mut self) -> Result<()> {
        self.out.comment("Generated by rio2rpy, edit with caution.");
        self.out.statement(format!("label RIO_{}:", self.name));
        self.out.begin_scope();

        let instructions = self.instructions;
        for (index, inst) in instructions.iter().enumerate() {
            self.index = index;
            self.addr = inst.addr;

            if inst.mnemonic == Mnemonic::EndOfStream {
                // Jumps may land on the end of the script
                self.close_scopes_at(inst.addr);
                self.check_label(inst.addr);
                continue;
            }

            self.check_adult_skip();
            self.close_scopes_at(inst.addr);
            self.check_label(inst.addr);
            if self.settings.move_previous_say_into_menu {
                self.queue_say_for_menu(index);
            }

            match handler(inst.mnemonic) {
                Some(handle) => {
                    log::trace!("{}", inst.listing(self.encoding));
                    if self.settings.force_include_disasm {
                        self.out
                            .comment(format!("[cmd] {}", inst.listing(self.encoding)));
                    }
                    handle(self, inst)?;
                }
                None => self
                    .out
                    .comment(format!("[cmd:unhandled] {}", inst.listing(self.encoding))),
            }
        }

        self.out.end_all_scopes();
        Ok(())
    }

    fn text(&self, raw: &[u8]) -> String {
        text::decode(raw, self.encoding)
    }

    /// Escape dialogue for a quoted string
    fn escaped(&self, raw: &[u8]) -> String {
        let emoji = self.settings.resolve_emoji.then(|| Emoji {
            table: &self.settings.emoji_table,
            font: self.settings.emoji_font.as_deref(),
        });
        text::escape(&self.text(raw), emoji)
    }

    /// Script label name
    fn label(&self, raw: &[u8]) -> String {
        self.text(raw).to_uppercase()
    }

    // =====================================================================
    // Structure
    // =====================================================================

    fn close_scopes_at(&mut self, addr: u32) {
        while self.scope_ends.last() == Some(&addr) {
            self.scope_ends.pop();
            self.out.end_scope();
        }
    }

    fn check_label(&mut self, addr: u32) {
        if self.pending_labels.remove(&addr) {
            self.out.end_scope();
            self.out
                .statement(format!("label RIO_{}_{}:", self.name, addr));
            self.out.begin_scope();
        }
    }

    fn check_adult_skip(&mut self) {
        let Some(mark) = self.skip_marks.get(&self.addr).cloned() else {
            return;
        };
        match mark {
            SkipMark::Begin {
                index,
                insert_transition,
                end_script,
            } => {
                self.out.comment(format!("[adult] Begin #{}", index));
                self.out.statement(format!(
                    "if not persistent.{}:",
                    self.settings.adult_skip.variable
                ));
                self.out.begin_scope();
                if insert_transition {
                    self.out.statement("scene bg BLACK with dissolve");
                    self.out.statement("pause 1.0");
                }
                self.out
                    .statement(format!("jump RIO_{}_skip_{}_end", end_script, index));
                self.out.end_scope();
            }
            SkipMark::End { index } => {
                self.out.end_scope();
                self.out.comment(format!("[adult] End #{}", index));
                self.out
                    .statement(format!("label RIO_{}_skip_{}_end:", self.name, index));
                self.out.begin_scope();
            }
        }
    }

    /// Hold a say back when the next dialogue-free stretch ends in a menu
    fn queue_say_for_menu(&mut self, index: usize) {
        let is_say = |m: Mnemonic| matches!(m, Mnemonic::TextN | Mnemonic::TextC | Mnemonic::TextNIo);
        if !is_say(self.instructions[index].mnemonic) {
            return;
        }
        for next in &self.instructions[index + 1..] {
            if is_say(next.mnemonic) {
                break;
            }
            if next.mnemonic == Mnemonic::Option {
                self.say_for_menu = Some(index);
                break;
            }
        }
    }

    // =====================================================================
    // Flags
    // =====================================================================

    /// Accessible reference or `None`, commenting on hinted and unmapped flags
    fn access(&mut self, resolved: FlagRef, addr: i64, hint: impl FnOnce(&str) -> String) -> Option<String> {
        match resolved {
            FlagRef::Ref(r) => Some(r),
            FlagRef::Excluded => None,
            FlagRef::Hinted(r) => {
                self.out.comment(hint(&r));
                None
            }
            FlagRef::Unmapped => {
                self.out
                    .comment(format!("[warning:flag] Access to unmapped flag address {}", addr));
                None
            }
        }
    }

    fn flag_ref(&mut self, addr: i64, hint: impl FnOnce(&str) -> String) -> Option<String> {
        let resolved = u32::try_from(addr)
            .map(|a| flags::resolve(self.settings, a))
            .unwrap_or(FlagRef::Unmapped);
        self.access(resolved, addr, hint)
    }

    fn is_skip_flag(&self, addr: i64) -> bool {
        u32::try_from(addr)
            .ok()
            .and_then(|a| self.settings.flag_name(a))
            == Some(SKIP_FLAG_NAME)
    }

    // =====================================================================
    // Control flow
    // =====================================================================

    fn op_branch(&mut self, inst: &Instruction) -> Result<()> {
        let op = inst.mnemonic.comparison().ok_or_else(|| malformed(inst))?;
        let (flag, value, rel) = (int(inst, 0)?, int(inst, 1)?, int(inst, 2)?);
        let close = u32::try_from(inst.next_addr() as i64 + rel).map_err(|_| malformed(inst))?;

        match self.flag_ref(flag, |r| format!("[jmp] if {} {} {}: ...", r, op, value)) {
            Some(r) => self.out.statement(format!("if {} {} {}:", r, op, value)),
            None => {
                self.out.comment(format!(
                    "[warning:jmp] Attempt to access inaccessible flag {} in conditional. Evaluating to false.",
                    flag
                ));
                self.out.statement("if False:");
            }
        }
        self.out.begin_scope();
        self.scope_ends.push(close);
        Ok(())
    }

    fn op_jmp_offset(&mut self, inst: &Instruction) -> Result<()> {
        let target = u32::try_from(int(inst, 0)?).map_err(|_| malformed(inst))?;
        self.out
            .statement(format!("jump RIO_{}_{}", self.name, target));
        self.pending_labels.insert(target);
        Ok(())
    }

    fn op_goto(&mut self, inst: &Instruction) -> Result<()> {
        let target = self.label(bytes(inst, 0)?);
        self.out.statement(format!("jump RIO_{}", target));
        Ok(())
    }

    fn op_call(&mut self, inst: &Instruction) -> Result<()> {
        let target = self.label(bytes(inst, 0)?);
        self.out.statement(format!("call RIO_{}", target));
        for action in self.settings.hooks(&target) {
            match action {
                HookAction::Statement { text } => self.out.statement(text.as_str()),
                HookAction::StubForeground { slot, reference } => {
                    *slot_at(&mut self.gfx.fg, *slot) = Some(Slot::new(Sprite::Stub(Stub {
                        reference: reference.clone(),
                    })));
                }
            }
        }
        Ok(())
    }

    fn op_return(&mut self, _inst: &Instruction) -> Result<()> {
        self.out.statement("return");
        Ok(())
    }

    fn op_nop(&mut self, _inst: &Instruction) -> Result<()> {
        Ok(())
    }

    fn op_option(&mut self, inst: &Instruction) -> Result<()> {
        let options = inst.options().ok_or_else(|| malformed(inst))?;

        self.out.statement("menu:");
        self.out.begin_scope();
        if self.settings.move_previous_say_into_menu {
            if let Some(held) = self.say_for_menu.take() {
                let instructions = self.instructions;
                self.say(&instructions[held])?;
            }
        }
        for opt in options {
            let text = self.escaped(&opt.text);
            let flag = opt.flag as i64;
            match self.flag_ref(flag, |r| format!("[option] visible if {} != 0", r)) {
                Some(r) => self.out.statement(format!("\"{}\" if {}:", text, r)),
                None => {
                    self.out.comment(format!(
                        "[warning:option] Flag {} is inaccessible. Option will always be shown.",
                        flag
                    ));
                    self.out.statement(format!("\"{}\":", text));
                }
            }
            self.out.begin_scope();
            self.out
                .statement(format!("jump RIO_{}", self.label(&opt.target)));
            self.out.end_scope();
        }
        self.out.end_scope();
        Ok(())
    }

    // =====================================================================
    // Flag arithmetic
    // =====================================================================

    /// Assign `rside` to the flag at operand 0 with `op`
    ///
    /// `level` 0 is an immediate, 1 a flag, 2 a flag holding a flag address.
    fn assign(&mut self, inst: &Instruction, op: &str, level: u8, boolify: bool) -> Result<()> {
        let lvar = int(inst, 0)?;
        let value = int(inst, 2)?;

        let rside = match level {
            0 if boolify && (0..=1).contains(&value) => {
                Some(if value == 0 { "False" } else { "True" }.to_string())
            }
            0 => Some(value.to_string()),
            1 => self.flag_ref(value, |_| format!("[set:reflevel=1] rside = {}", value)),
            _ => {
                let resolved = u32::try_from(value)
                    .map(|a| flags::resolve_indirect(self.settings, a))
                    .unwrap_or(FlagRef::Unmapped);
                self.access(resolved, value, |_| format!("[set:reflevel=2] rside = {}", value))
            }
        };

        let shown = rside.clone().unwrap_or_else(|| "<NO_RESULT>".to_string());
        let Some(lref) = self.flag_ref(lvar, |r| format!("$ {} {} {}", r, op, shown)) else {
            return Ok(());
        };
        match rside {
            Some(rside) => self.out.statement(format!("$ {} {} {}", lref, op, rside)),
            None => self.out.comment(format!(
                "[warning:set] Right side of `{} {}` is inaccessible. Assignment dropped.",
                lref, op
            )),
        }
        Ok(())
    }

    fn reference_level(inst: &Instruction) -> Result<u8> {
        Ok(u8::from(int(inst, 1)? != 0))
    }

    fn op_mov(&mut self, inst: &Instruction) -> Result<()> {
        if int(inst, 0)? == TYPEWRITER_FLAG {
            let value = int(inst, 2)?;
            if Self::reference_level(inst)? == 0 {
                self.typewriter_duration = value;
                self.out
                    .comment(format!("[say] Typewriter effect duration = {}", value));
            } else {
                self.out.comment(format!(
                    "[warning:mov] Typewriter effect duration taken from flag {}. Ignored.",
                    value
                ));
            }
            return Ok(());
        }
        let level = Self::reference_level(inst)?;
        self.assign(inst, "=", level, true)
    }

    fn op_add(&mut self, inst: &Instruction) -> Result<()> {
        let level = Self::reference_level(inst)?;
        self.assign(inst, "+=", level, false)
    }

    fn op_sub(&mut self, inst: &Instruction) -> Result<()> {
        let level = Self::reference_level(inst)?;
        self.assign(inst, "-=", level, false)
    }

    fn op_movf(&mut self, inst: &Instruction) -> Result<()> {
        let level = Self::reference_level(inst)? + 1;
        self.assign(inst, "=", level, false)
    }

    fn op_mod(&mut self, inst: &Instruction) -> Result<()> {
        let level = Self::reference_level(inst)?;
        self.assign(inst, "%=", level, false)
    }

    fn op_rnd(&mut self, inst: &Instruction) -> Result<()> {
        let (lvar, max) = (int(inst, 0)?, int(inst, 2)?);
        let expr = format!("renpy.random.randint(0, {})", max);
        if let Some(r) = self.flag_ref(lvar, |r| format!("$ {} = {}", r, expr)) {
            self.out.statement(format!("$ {} = {}", r, expr));
        }
        Ok(())
    }

    fn op_clr(&mut self, _inst: &Instruction) -> Result<()> {
        // Persistent banks survive
        for bank in self.settings.flag_banks.iter().filter(|b| !b.is_persistent()) {
            self.out.statement(format!("$ {}.clear()", bank.name));
        }
        Ok(())
    }

    // =====================================================================
    // Dialogue
    // =====================================================================

    fn op_text_size_modifier(&mut self, inst: &Instruction) -> Result<()> {
        self.text_size = int(inst, 0)?;
        Ok(())
    }

    fn op_text(&mut self, inst: &Instruction) -> Result<()> {
        if self.say_for_menu == Some(self.index) {
            self.out.comment("[say] Added under the next menu.");
            Ok(())
        } else {
            self.say(inst)
        }
    }

    fn say(&mut self, inst: &Instruction) -> Result<()> {
        match inst.mnemonic {
            Mnemonic::TextN => self.add_say(inst.addr, None, bytes(inst, 1)?),
            Mnemonic::TextNIo => self.add_say(inst.addr, None, bytes(inst, 2)?),
            Mnemonic::TextC => self.add_say(inst.addr, Some(bytes(inst, 1)?), bytes(inst, 2)?),
            mnemonic => {
                return Err(TranslateError::MenuSay {
                    addr: inst.addr,
                    mnemonic,
                })
            }
        }
        Ok(())
    }

    fn add_say(&mut self, addr: u32, name: Option<&[u8]>, raw: &[u8]) {
        let mut text = self.escaped(raw);
        match self.text_size {
            0 => {}
            1 => text = format!("{{size=+32}}{}{{/size}}", text),
            2 => text = format!("{{size=-8}}{}{{/size}}", text),
            size => self
                .out
                .comment(format!("[warning:say] Unknown text size modifier {}", size)),
        }

        if self.typewriter_duration != 0 {
            let pause = self.inline_pause(addr).unwrap_or_default();
            let frames = self.typewriter_duration as f64 / 100.0 / WILLPLUS_FPS;
            let cps = text.chars().count() as f64 / frames;
            text = format!(
                "{{cps={}}}{}{{/cps}}{}{{nw}}",
                format_float(cps),
                text,
                pause
            );
        }

        let Some(name) = name else {
            self.out.statement(format!("\"{}\"", text));
            self.next_speaker = None;
            return;
        };

        let name = self.text(name);
        let speaker = self.next_speaker.take();
        let (symbol, alias) = match self.settings.character_symbol(&name) {
            Some(symbol) => (Some(symbol.to_string()), false),
            // Fall back to the speaker of the preceding voice line
            None => match speaker {
                Some(symbol) => {
                    let alias = self
                        .settings
                        .character(&symbol)
                        .map_or(true, |c| c.name != name);
                    (Some(symbol), alias)
                }
                None => (None, false),
            },
        };
        let extra = if alias {
            format!(" (name='{}')", name)
        } else {
            String::new()
        };

        match symbol.filter(|_| self.settings.character_table_lookup) {
            Some(symbol) => self.out.statement(format!(
                "{} \"{}\"{}",
                self.settings.qualified_symbol(&symbol),
                text,
                extra
            )),
            None => self
                .out
                .statement(format!("\"{}\" \"{}\"{}", name, text, extra)),
        }
    }

    /// Find a pause right after the say at `addr` and consume it
    fn inline_pause(&mut self, addr: u32) -> Option<String> {
        let cfg = self.cfg;
        let instructions = self.instructions;
        let block = cfg.block_containing(addr)?;
        let rest = cfg.instructions_from(block, instructions, addr);

        for inst in rest.iter().skip(1) {
            if inst.mnemonic.is_dialogue() {
                return None;
            }
            if inst.mnemonic == Mnemonic::Sleep {
                return self.consume_sleep(inst);
            }
        }

        // `if skipping == 0:` guarding the pause
        if block.kind != BlockKind::Conditional {
            return None;
        }
        let cond = rest.last()?;
        let guarded = cond.mnemonic == Mnemonic::Jeq
            && cond.int(0).map_or(false, |f| self.is_skip_flag(f))
            && cond.int(1) == Some(0);
        if !guarded {
            return None;
        }
        let next = cfg.block_at(block.true_target?)?;
        for inst in cfg.block_instructions(next, instructions, false) {
            if inst.mnemonic.is_dialogue() {
                return None;
            }
            if inst.mnemonic == Mnemonic::Sleep {
                return self.consume_sleep(inst);
            }
        }
        None
    }

    fn consume_sleep(&mut self, inst: &Instruction) -> Option<String> {
        let ms = inst.int(0)?;
        self.consumed_sleeps.insert(inst.addr);
        Some(format!("{{w={}}}", seconds(ms)))
    }

    fn op_text_extend(&mut self, inst: &Instruction) -> Result<()> {
        let text = self.escaped(bytes(inst, 1)?);
        self.out.statement(format!("extend \"{}\"", text));
        Ok(())
    }

    fn op_sleep(&mut self, inst: &Instruction) -> Result<()> {
        if self.consumed_sleeps.remove(&inst.addr) {
            self.out.comment("[sleep] Inlined into previous CPS say.");
        } else {
            self.out
                .statement(format!("pause {}", seconds(int(inst, 0)?)));
        }
        Ok(())
    }

    fn op_event_name(&mut self, inst: &Instruction) -> Result<()> {
        let name = self.text(bytes(inst, 0)?);
        self.out
            .statement(format!("$ save_name = _('{}')", name.replace('\'', "\\'")));
        Ok(())
    }

    // =====================================================================
    // Audio
    // =====================================================================

    fn audio_ref(&self, raw: &[u8], dir: &str, ext: &str) -> String {
        let file = self.text(raw);
        if self.settings.audio_symbol_only {
            file
        } else {
            format!("{}/{}{}", dir, file, ext)
        }
    }

    fn register_channel_hint(&mut self, channel: &str) {
        self.out.comment(format!(
            "[patch:sound_channel.rpy] renpy.music.register_channel('{}', 'sfx', False)",
            channel
        ));
    }

    fn sound_channel(&mut self, channel: i64) -> String {
        if channel == 0 {
            "sound".to_string()
        } else {
            let name = format!("sound{}", channel + 1);
            self.register_channel_hint(&name);
            name
        }
    }

    fn op_bgm(&mut self, inst: &Instruction) -> Result<()> {
        let fadein = int(inst, 1)?;
        let mut cmd = format!("play music '{}'", self.audio_ref(last_bytes(inst)?, "Bgm", ".OGG"));
        if fadein != 0 {
            cmd.push_str(&format!(" fadein {}", seconds(fadein)));
        }
        // Music loops whatever the repeat count says
        cmd.push_str(" loop");
        self.out.statement(cmd);
        Ok(())
    }

    fn op_bgm_stop(&mut self, inst: &Instruction) -> Result<()> {
        let fadeout = int(inst, 1)?;
        let mut cmd = "stop music".to_string();
        if fadeout != 0 {
            cmd.push_str(&format!(" fadeout {}", seconds(fadeout)));
        }
        self.out.statement(cmd);
        Ok(())
    }

    fn op_se(&mut self, inst: &Instruction) -> Result<()> {
        let (channel, repeat, fadein) = (int(inst, 0)?, int(inst, 1)?, int(inst, 4)?);
        if channel < 0 {
            self.out.comment("[warning:se] Sound channel is < 0");
            return Ok(());
        }
        let reference = self.audio_ref(last_bytes(inst)?, "Se", "");
        let channel = self.sound_channel(channel);
        let mut cmd = format!("play {} '{}'", channel, reference);
        if fadein != 0 {
            cmd.push_str(&format!(" fadein {}", seconds(fadein)));
        }
        match repeat {
            0 => {}
            // Forever
            255 => cmd.push_str(" loop"),
            n => cmd.push_str(&format!(" loop # {} loops", n)),
        }
        self.out.statement(cmd);
        Ok(())
    }

    fn stop_sound(&mut self, channel: i64, fadeout: Option<i64>) {
        if channel < 0 {
            let param = fadeout
                .map(|ms| format!("fadeout={}", seconds(ms)))
                .unwrap_or_default();
            self.out.statement(format!("call stop_all_sounds({})", param));
            return;
        }
        let mut cmd = format!("stop {}", self.sound_channel(channel));
        if let Some(ms) = fadeout {
            cmd.push_str(&format!(" fadeout {}", seconds(ms)));
        }
        self.out.statement(cmd);
    }

    fn op_se_stop(&mut self, inst: &Instruction) -> Result<()> {
        self.stop_sound(int(inst, 0)?, None);
        Ok(())
    }

    fn op_se_fadeout(&mut self, inst: &Instruction) -> Result<()> {
        self.stop_sound(int(inst, 0)?, Some(int(inst, 1)?));
        Ok(())
    }

    fn op_voice(&mut self, inst: &Instruction) -> Result<()> {
        let raw = last_bytes(inst)?;
        let reference = self.audio_ref(raw, "Voice", ".OGG");
        self.out.statement(format!("voice '{}'", reference));
        if !self.settings.voice_matches.is_empty() {
            let file = self.text(raw);
            self.next_speaker = self.settings.voice_speaker(&file).map(str::to_string);
        }
        Ok(())
    }

    // =====================================================================
    // Graphics
    // =====================================================================

    fn op_bg(&mut self, inst: &Instruction) -> Result<()> {
        let (x, y) = (int(inst, 0)?, int(inst, 1)?);
        let name = self.text(bytes(inst, 5)?);
        match &mut self.gfx.bg {
            Some(bg) if bg.name() == name => {
                if bg.replace(&name, x, y) {
                    self.gfx.bg_redraw = true;
                }
            }
            _ => {
                self.gfx.bg = Some(Displayable::new(name, x, y, Origin::Image));
                self.gfx.bg_redraw = true;
            }
        }
        Ok(())
    }

    fn op_bg_vp(&mut self, inst: &Instruction) -> Result<()> {
        let (zoom, xpan, ypan) = (int(inst, 0)?, int(inst, 1)?, int(inst, 2)?);
        match &mut self.gfx.bg {
            Some(bg) => {
                bg.set_viewport(zoom, xpan, ypan);
                if bg.is_dirty() {
                    self.gfx.bg_redraw = true;
                }
            }
            None => self
                .out
                .comment("[warning:bg_vp] No background to apply the viewport to."),
        }
        Ok(())
    }

    fn show_fg(&mut self, index: i64, x: i64, y: i64, inhibit_tint: bool, name: String) -> Result<()> {
        let index = usize::try_from(index).map_err(|_| malformed(&self.instructions[self.index]))?;
        let addr = self.addr;
        let slot = slot_at(&mut self.gfx.fg, index);
        if slot.is_none() {
            *slot = Some(Slot::new(Sprite::Image(Displayable::new(name, x, y, Origin::Screen))));
            self.gfx.fg_redraw = true;
        } else if self.gfx.in_animation_segment {
            self.out
                .comment("[animation] Image replacement inhibited by in-progress animation segment.");
        } else if let Some(existing) = slot {
            let changed = existing
                .replace(&name, x, y)
                .map_err(|source| TranslateError::Sprite { addr, source })?;
            if changed {
                self.gfx.fg_redraw = true;
            }
        }

        let tint = self.gfx.tint;
        if let Some(Some(slot)) = self.gfx.fg.get_mut(index) {
            if inhibit_tint {
                slot.sprite.set_tint(0);
            } else if tint != 0 {
                slot.sprite.set_tint(tint);
            }
        }
        Ok(())
    }

    fn op_fg(&mut self, inst: &Instruction) -> Result<()> {
        let name = self.text(bytes(inst, 7)?);
        self.show_fg(
            int(inst, 0)?,
            int(inst, 1)?,
            int(inst, 2)?,
            int(inst, 6)? != 0,
            name,
        )
    }

    fn op_fg_noarg7(&mut self, inst: &Instruction) -> Result<()> {
        let name = self.text(bytes(inst, 6)?);
        self.show_fg(int(inst, 0)?, int(inst, 1)?, int(inst, 2)?, false, name)
    }

    fn op_tint(&mut self, inst: &Instruction) -> Result<()> {
        self.gfx.tint = int(inst, 0)?;
        Ok(())
    }

    fn op_obj(&mut self, inst: &Instruction) -> Result<()> {
        let (x, y) = (int(inst, 0)?, int(inst, 1)?);
        let name = self.text(bytes(inst, 5)?);
        let addr = self.addr;
        match &mut self.gfx.obj {
            Some(slot) if slot.sprite.image().map(Displayable::name) == Some(name.as_str()) => {
                if slot
                    .replace(&name, x, y)
                    .map_err(|source| TranslateError::Sprite { addr, source })?
                {
                    self.gfx.obj_redraw = true;
                }
            }
            _ => {
                self.gfx.obj = Some(Slot::new(Sprite::Image(Displayable::new(name, x, y, Origin::Screen))));
                self.gfx.obj_redraw = true;
            }
        }
        Ok(())
    }

    fn op_layer1_cl(&mut self, inst: &Instruction) -> Result<()> {
        let index = int(inst, 0)?;
        self.out.comment(format!("[layer1] cl {}", index));
        let slot = match usize::try_from(index) {
            Ok(i) => self.gfx.fg.get_mut(i).and_then(Option::as_mut),
            Err(_) => None,
        };
        if let Some(slot) = slot {
            slot.pending_removal = true;
            self.gfx.fg_redraw = true;
        }
        Ok(())
    }

    fn op_obj_cl(&mut self, _inst: &Instruction) -> Result<()> {
        self.out.comment("[obj] cl");
        if let Some(slot) = &mut self.gfx.obj {
            slot.pending_removal = true;
            self.gfx.obj_redraw = true;
        }
        Ok(())
    }

    fn op_side_image(&mut self, inst: &Instruction) -> Result<()> {
        let name = self.text(bytes(inst, 0)?).to_uppercase();
        self.out.statement(format!("will_side show side {}", name));
        Ok(())
    }

    fn op_hide_side_image(&mut self, _inst: &Instruction) -> Result<()> {
        self.out.statement("will_side hide");
        Ok(())
    }

    fn op_set_trans_mask(&mut self, inst: &Instruction) -> Result<()> {
        let mask = self.text(bytes(inst, 0)?);
        self.out.comment(format!("[gfx] trans_mask = {}", mask));
        self.gfx.trans_mask = Some(mask);
        Ok(())
    }

    fn op_weather(&mut self, inst: &Instruction) -> Result<()> {
        let (kind, sprite_limit) = (int(inst, 0)?, int(inst, 1)?);
        let onlayer = self
            .settings
            .weather_layer
            .as_ref()
            .map(|l| format!(" onlayer {}", l))
            .unwrap_or_default();
        match kind {
            0 => self.out.statement(format!("hide weather{}", onlayer)),
            2 => {
                let limit = if sprite_limit == 0 {
                    String::new()
                } else {
                    format!(" {}", sprite_limit)
                };
                self.out
                    .statement(format!("show weather rain{} as weather{}", limit, onlayer));
            }
            _ => self.out.comment(format!("[weather] Unhandled type {}", kind)),
        }
        Ok(())
    }

    fn op_screen_effect(&mut self, inst: &Instruction) -> Result<()> {
        let (kind, duration, magnitude) = (int(inst, 0)?, int(inst, 1)?, int(inst, 2)?);
        match kind {
            0 => self.out.statement("show layer master"),
            1 if duration == 0xff => {
                self.out.statement("show layer master:");
                self.out.begin_scope();
                self.out
                    .statement(format!("function WillShakeDriverIndefinite({})", magnitude));
                self.out.end_scope();
            }
            1 => self
                .out
                .statement(format!("with WillScreenShake({}, {})", duration, magnitude)),
            _ => self
                .out
                .comment(format!("[screen_effect] Ignoring unknown type {}", kind)),
        }
        Ok(())
    }

    fn op_clear_screen_effect(&mut self, _inst: &Instruction) -> Result<()> {
        self.out.statement("show layer master");
        Ok(())
    }

    fn op_video(&mut self, inst: &Instruction) -> Result<()> {
        let file = self.text(bytes(inst, 1)?);
        self.out
            .statement(format!("$ renpy.movie_cutscene('Videos/{}')", file));
        Ok(())
    }

    // =====================================================================
    // Transitions
    // =====================================================================

    fn mask(&self, transition: &str) -> Result<String> {
        self.gfx
            .trans_mask
            .as_ref()
            .map(|m| format!("'mask {}'", m.to_uppercase()))
            .ok_or_else(|| TranslateError::MissingTransMask {
                addr: self.addr,
                transition: transition.to_string(),
            })
    }

    fn dissolve_fallback(&mut self, d: &str, warning: String) -> String {
        self.out.comment(warning);
        format!("Dissolve({})", d)
    }

    fn op_transition(&mut self, inst: &Instruction) -> Result<()> {
        let kind = match inst.operands.first() {
            Some(Operand::Name(name)) => name.to_string(),
            Some(Operand::Int(code)) => code.to_string(),
            _ => return Err(malformed(inst)),
        };
        let duration = int(inst, 1)?;

        let changed = self.flush_gfx();
        if !changed && self.settings.remove_orphan_with {
            return Ok(());
        }

        // Even a zero-length transition shows the new state for a frame
        let d = format_float((duration as f64 / 1000.0).max(0.016));
        let gfx_next = self.settings.use_gfx_next;
        let k = kind.as_str();

        let expr = match k {
            "none" => "Pause(0.016)".to_string(),
            "fade_out" => format!("WillFadeOut({})", d),
            "fade_in" => format!("Dissolve({})", d),
            "mask_wipe" => format!("WillImageDissolveSR({}, {})", self.mask(k)?, d),
            "mask_wipe_r" => format!("WillImageDissolveSR({}, {}, reverse=True)", self.mask(k)?, d),
            "mask_dissolve" => format!("WillImageDissolve({}, {})", self.mask(k)?, d),
            "mask_dissolve_r" => format!("WillImageDissolve({}, {}, reverse=True)", self.mask(k)?, d),
            "mask_dissolve_white_out" => {
                format!("WillImageDissolveToWhiteOut({}, {})", self.mask(k)?, d)
            }
            "mask_dissolve_r_white_out" => format!(
                "WillImageDissolveToWhiteOut({}, {}, reverse=True)",
                self.mask(k)?,
                d
            ),
            "new_dissolve_to_zoom_out_while_image_dissolve_r_to_new" => {
                format!("WillND2ZOWIDR2N({}, {})", self.mask(k)?, d)
            }
            "old_dissolve_to_zoom_in_while_image_dissolve_to_new" => {
                format!("WillOD2ZIWID2N({}, {})", self.mask(k)?, d)
            }
            "pixellate" => format!("Pixellate({}, 8)", d),
            "diagonal" => format!("WillDiagonalStrip({})", d),
            "boxes" => format!("WillBoxes({})", d),
            "dissolve_to_zoom_out" => format!("WillDissolveToZoomOut({})", d),
            "zoom_out" => format!("WillZoomOut({})", d),
            "shutter_open" => format!("WillShutterOpen({})", d),
            "vwipe_checkerboard" => format!("WillWipeCheckboard({})", d),
            "xrotate_new_ccw" => format!("WillXRotate({})", d),
            "xrotate_new_cw" => format!("WillXRotate({}, new_dir_cw=True)", d),
            "vwave" | "hwave" | "xrotate_new_ccw_with_vwave" | "xrotate_new_cw_with_vwave"
                if gfx_next =>
            {
                if k == "hwave" {
                    format!("WillWave({}, mode='horizontal')", d)
                } else {
                    format!("WillWave({})", d)
                }
            }
            "stretch" if gfx_next => format!("WillStretch({})", d),
            "vwave" | "hwave" | "xrotate_new_ccw_with_vwave" | "xrotate_new_cw_with_vwave"
            | "stretch" => self.dissolve_fallback(
                &d,
                format!(
                    "[warning:transition] {} requires use_gfx_next, which is disabled. Substitute with dissolve.",
                    k
                ),
            ),
            _ => {
                if let Some(dir) = direction(k, "wipe_", "") {
                    format!("CropMove({}, mode='wipe{}')", d, dir)
                } else if let Some(dir) = direction(k, "dissolve_to_push_", "") {
                    format!("WillDissolveToPush({}, 'push{}')", d, dir)
                } else if let Some(dir) = direction(k, "wipe_", "_all_strip") {
                    format!("WillWipeAllStrip({}, 'wipe{}')", d, dir)
                } else if let Some(dir) = direction(k, "wipe_", "_strip") {
                    format!("WillWipeStrip({}, 'wipe{}')", d, dir)
                } else {
                    self.dissolve_fallback(
                        &d,
                        format!(
                            "[warning:transition] unknown method {}, time: {}. Substitute with dissolve.",
                            k, d
                        ),
                    )
                }
            }
        };
        self.out.statement(format!("with {}", expr));
        Ok(())
    }

    // =====================================================================
    // Animation
    // =====================================================================

    /// Should keyframes in the current block be drawn at all?
    ///
    /// Animations are usually wrapped in `if skipping == 0:`; only that
    /// shape (or unconditional code at the start of the script) is animated.
    fn animation_allowed(&mut self) -> bool {
        let cfg = self.cfg;
        let Some(block) = cfg.block_containing(self.addr) else {
            self.out
                .comment("[warning:animation] Instruction is outside of every basic block.");
            return false;
        };
        let at_start = block.entry == 0;
        match block.predecessors.as_slice() {
            [] if at_start => true,
            [] => {
                self.out.comment(
                    "[warning:animation] Potential broken block: no predecessors and not the start block.",
                );
                false
            }
            _ if at_start => {
                self.out
                    .comment("[warning:animation] Potential broken block: the start block has predecessors.");
                false
            }
            [pred] => {
                let Some(pred) = cfg.block_at(*pred).filter(|p| p.kind == BlockKind::Conditional) else {
                    self.out
                        .comment("[unimplemented:animation] Block's predecessor is not a conditional block.");
                    return false;
                };
                let cond = cfg.block_instructions(pred, self.instructions, false).last();
                match cond {
                    Some(cond) if cond.mnemonic.is_conditional_branch() => {
                        if !cond.int(0).map_or(false, |f| self.is_skip_flag(f)) {
                            self.out.comment("[animation] Ignoring unknown conditioned animation");
                            false
                        } else if cond.int(1) != Some(0) {
                            self.out.comment("[animation] Ignoring skip-only animation");
                            false
                        } else {
                            true
                        }
                    }
                    _ => {
                        self.out.comment(
                            "[warning:animation] Potential broken block: conditional block does not end with a conditional branch.",
                        );
                        false
                    }
                }
            }
            _ => {
                self.out
                    .comment("[unimplemented:animation] Multiple predecessors found for this block.");
                false
            }
        }
    }

    fn op_add_animation_key_frame(&mut self, inst: &Instruction) -> Result<()> {
        if self.settings.detect_animation_skip && !self.animation_allowed() {
            return Ok(());
        }
        let index = int(inst, 0)?;
        let (dx, dy, ms, alpha) = (int(inst, 1)?, int(inst, 2)?, int(inst, 3)?, int(inst, 5)?);

        if index == 0 || index == 100 {
            let kind = if index == 0 {
                FrameKind::Linear
            } else {
                FrameKind::Shake
            };
            match &mut self.gfx.bg {
                Some(bg) => {
                    bg.add_key_frame(kind, dx, dy, ms, alpha);
                    self.gfx.bg_redraw = true;
                }
                None => self
                    .out
                    .comment("[warning:animation] Attempting to animate a missing background. Ignored."),
            }
            return Ok(());
        }

        let (kind, index) = if index > 100 {
            (FrameKind::Shake, index - 100)
        } else {
            (FrameKind::Linear, index)
        };
        let slot = match usize::try_from(index - 1) {
            Ok(i) => self.gfx.fg.get_mut(i).and_then(Option::as_mut),
            Err(_) => None,
        };
        match slot {
            Some(slot) => {
                let addr = self.addr;
                slot.sprite
                    .add_key_frame(kind, dx, dy, ms, alpha)
                    .map_err(|source| TranslateError::Sprite { addr, source })?;
                self.gfx.fg_redraw = true;
            }
            None => self.out.comment(format!(
                "[warning:animation] Attempting to manipulate cleared displayable fg#{}. Ignored.",
                index - 1
            )),
        }
        Ok(())
    }

    /// Does the segment end at the current play instruction?
    fn is_end_of_animation_segment(&self) -> bool {
        self.instructions[self.index + 1..]
            .iter()
            .find(|i| !i.mnemonic.is_dialogue() && i.mnemonic != Mnemonic::NotTerminated)
            .map_or(true, |i| {
                !(i.mnemonic.is_key_frame() || i.mnemonic.is_play_animation())
            })
    }

    fn op_play_animation(&mut self, _inst: &Instruction) -> Result<()> {
        if self.is_end_of_animation_segment() {
            self.gfx.in_animation_segment = false;
            self.flush_gfx();
        } else {
            self.out.comment(
                "[animation] Play inside a detected animation segment. Delaying gfx commit to the last play instruction.",
            );
            self.gfx.in_animation_segment = true;
        }
        Ok(())
    }

    // =====================================================================
    // Commit
    // =====================================================================

    /// Emit show/hide/scene statements for everything that changed
    ///
    /// Returns whether anything was emitted.
    fn flush_gfx(&mut self) -> bool {
        let matrixcolor = self.settings.use_atl_matrixcolor;
        let accurate_zorder = self.settings.accurate_zorder;
        let out = &mut self.out;
        let gfx = &mut self.gfx;
        let mut changed = false;
        // A new scene clears every overlay, so tracked slots are shown again
        let mut bg_redrew = false;

        if gfx.bg_redraw {
            if let Some(bg) = gfx.bg.as_mut().filter(|bg| bg.is_dirty()) {
                let head = format!("scene bg {} at reset", bg.name().to_uppercase());
                emit_with_atl(out, head, bg.to_atl(matrixcolor));
                bg.flatten();
                bg.mark_drawn();
                bg_redrew = true;
                changed = true;
            }
            gfx.bg_redraw = false;
        }

        if bg_redrew || gfx.fg_redraw {
            for (i, entry) in gfx.fg.iter_mut().enumerate() {
                let Some(slot) = entry else {
                    continue;
                };
                if slot.pending_removal {
                    let reference = match &slot.sprite {
                        Sprite::Stub(stub) => stub.reference.clone(),
                        Sprite::Image(_) => format!("fg_i{}", i),
                    };
                    if !bg_redrew {
                        out.statement(format!("hide {}", reference));
                    }
                    *entry = None;
                    changed = true;
                    continue;
                }
                let Sprite::Image(fg) = &mut slot.sprite else {
                    continue;
                };
                if !(bg_redrew || fg.is_dirty()) {
                    continue;
                }
                let mut object = format!("fg {}", fg.name().to_uppercase());
                if fg.tint() != 0 && !matrixcolor {
                    object = format!("expression WillImTint('{}', {})", object, fg.tint());
                }
                let zorder = if accurate_zorder {
                    format!(" zorder {}", i)
                } else {
                    String::new()
                };
                let head = format!("show {} at reset{} as fg_i{}", object, zorder, i);
                emit_with_atl(out, head, fg.to_atl(matrixcolor));
                fg.flatten();
                fg.mark_drawn();
                changed = true;
            }
            gfx.fg_redraw = false;
        }

        if bg_redrew || gfx.obj_redraw {
            if let Some(slot) = &mut gfx.obj {
                if slot.pending_removal {
                    if !bg_redrew {
                        out.statement("hide obj_i0");
                    }
                    gfx.obj = None;
                    changed = true;
                } else if let Sprite::Image(obj) = &mut slot.sprite {
                    if bg_redrew || obj.is_dirty() {
                        let zorder = if accurate_zorder { " zorder 256" } else { "" };
                        let head = format!(
                            "show obj {} at reset{} as obj_i0",
                            obj.name().to_uppercase(),
                            zorder
                        );
                        emit_with_atl(out, head, obj.to_atl(matrixcolor));
                        obj.flatten();
                        obj.mark_drawn();
                        changed = true;
                    }
                }
            }
            gfx.obj_redraw = false;
        }
        changed
    }
}

/// Handler for a mnemonic; `None` falls back to a disassembly comment
fn handler<'a>(mnemonic: Mnemonic) -> Option<Handler<'a>> {
    use Mnemonic::*;
    let handle: Handler<'a> = match mnemonic {
        Jbe | Jle | Jeq | Jne | Jbt | Jlt => Translator::op_branch,
        JmpOffset => Translator::op_jmp_offset,
        Goto => Translator::op_goto,
        Call => Translator::op_call,
        Return => Translator::op_return,
        Mnemonic::Option => Translator::op_option,
        Eof | EofIo => Translator::op_nop,

        Mov => Translator::op_mov,
        Add => Translator::op_add,
        Sub => Translator::op_sub,
        Movf => Translator::op_movf,
        Mod => Translator::op_mod,
        Rnd => Translator::op_rnd,
        Clr => Translator::op_clr,

        TextSizeModifier => Translator::op_text_size_modifier,
        TextN | TextC | TextNIo => Translator::op_text,
        TextExtend => Translator::op_text_extend,
        Sleep => Translator::op_sleep,
        EventName => Translator::op_event_name,

        Bgm | BgmNoarg3 | BgmIo => Translator::op_bgm,
        BgmStop => Translator::op_bgm_stop,
        Se | SeNoarg8 | SeIo => Translator::op_se,
        SeStop => Translator::op_se_stop,
        SeFadeout => Translator::op_se_fadeout,
        Voice => Translator::op_voice,

        Bg => Translator::op_bg,
        BgVp => Translator::op_bg_vp,
        Fg => Translator::op_fg,
        FgNoarg7 => Translator::op_fg_noarg7,
        Tint | TintIo => Translator::op_tint,
        Obj => Translator::op_obj,
        Layer1Cl => Translator::op_layer1_cl,
        ObjCl => Translator::op_obj_cl,
        SideImage => Translator::op_side_image,
        HideSideImage => Translator::op_hide_side_image,
        SetTransMask => Translator::op_set_trans_mask,
        Weather => Translator::op_weather,
        ScreenEffect => Translator::op_screen_effect,
        ClearScreenEffect => Translator::op_clear_screen_effect,
        Video => Translator::op_video,
        Transition | TransitionIo => Translator::op_transition,
        AddAnimationKeyFrame => Translator::op_add_animation_key_frame,
        PlayAnimation | PlayAnimationNoskip => Translator::op_play_animation,

        _ => return None,
    };
    Some(handle)
}

/// Translate one decoded script
///
/// `name` is the script's own label name (usually its file stem). A fatal
/// handler error stops the translation; the partial text is still returned.
pub fn translate(
    name: &str,
    instructions: &[Instruction],
    cfg: &ControlFlowGraph,
    settings: &Settings,
) -> Translation {
    let mut translator = Translator::new(name, instructions, cfg, settings);
    let error = translator.run().err();

    if let Some(err) = &error {
        log::error!(
            "translation of {} interrupted at instruction #{}: {}",
            translator.name,
            translator.index,
            err
        );
        translator
            .out
            .comment("[panic] Translation interrupted. See log.");
        translator
            .out
            .statement("$ renpy.error('Incomplete script translation')");
    }

    Translation {
        text: translator.out.render(),
        error,
    }
}

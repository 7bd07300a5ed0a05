//! The execution engine: one machine-state aggregate and the
//! fetch-decode-execute cycle over it.
//!
//! Fetch reads the big-endian word at `pc` and advances `pc` by 2 *before*
//! the instruction runs, so jumps and calls overwrite the default advance.
//! Dispatch is a lookup keyed on the class nibble plus, for the packed
//! classes, a discriminant from the low bits; a word with no entry is a
//! fatal `UnknownInstruction` carrying the raw word and the address it was
//! fetched from. The engine never guesses or silently skips.
//!
//! Handlers validate memory spans before mutating anything, so a fault
//! cannot leave the machine half-updated, and write the flag register after
//! any data register so vf-as-operand stays deterministic.

use log::{debug, trace};
use rand::rngs::ThreadRng;
use rand::Rng;
use std::io;

use crate::display::{self, Framebuffer};
use crate::error::{Error, Result};
use crate::keypad::KeypadState;
use crate::memory::AddressSpace;
use crate::opcode::Opcode;
use crate::registers::{RegisterFile, FLAG};
use crate::timers::TimerUnit;

/// The whole machine. All mutable engine state lives here and is only ever
/// mutated through `step` and `tick_timers`; collaborators read the
/// framebuffer and timers and write the keypad between steps.
pub struct Interpreter {
    pub memory: AddressSpace,
    pub regs: RegisterFile,
    pub timers: TimerUnit,
    pub framebuffer: Framebuffer,
    pub keypad: KeypadState,
    rng: ThreadRng,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_memory(AddressSpace::new())
    }

    /// a machine with a caller-supplied font image
    pub fn with_font(font: &[u8; crate::memory::FONT_LEN]) -> Self {
        Self::with_memory(AddressSpace::with_font(font))
    }

    fn with_memory(memory: AddressSpace) -> Self {
        Interpreter {
            memory,
            regs: RegisterFile::new(),
            timers: TimerUnit::new(),
            framebuffer: Framebuffer::new(),
            keypad: KeypadState::new(),
            rng: rand::thread_rng(),
        }
    }

    /// load a program image at 0x200
    pub fn load_program(&mut self, reader: &mut impl io::Read) -> Result<usize> {
        let len = self.memory.load_program(reader)?;
        debug!("loaded {} byte program", len);
        Ok(len)
    }

    /// one fetch-decode-execute cycle
    pub fn step(&mut self) -> Result<()> {
        let at = self.regs.pc;
        let word = self.memory.read_word(at)?;
        self.regs.pc = at.wrapping_add(2);
        let op = Opcode::from(word);
        trace!("{:#05x}: {:#06x}", at, word);
        match lookup(&op) {
            Some(handler) => handler(self, op),
            None => Err(Error::UnknownInstruction { word, addr: at }),
        }
    }

    /// one 60Hz timer tick
    pub fn tick_timers(&mut self) {
        self.timers.tick();
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// one instruction's semantics; `pc` has already advanced past the word
type Handler = fn(&mut Interpreter, Opcode) -> Result<()>;

/// The dispatch table. Primary key is the class nibble; classes 0x0, 0x5,
/// 0x8, 0x9, 0xe and 0xf carry several sub-operations and disambiguate on
/// `nn` or `n`. One entry per instruction: adding an opcode means adding an
/// arm here and a handler below, never a new path through shared state.
fn lookup(op: &Opcode) -> Option<Handler> {
    match (op.class, op.nn, op.n) {
        (0x0, 0xe0, _) => Some(op_clear),
        (0x0, 0xee, _) => Some(op_return),
        (0x1, _, _) => Some(op_jump),
        (0x2, _, _) => Some(op_call),
        (0x3, _, _) => Some(op_skip_eq_imm),
        (0x4, _, _) => Some(op_skip_ne_imm),
        (0x5, _, 0x0) => Some(op_skip_eq_reg),
        (0x6, _, _) => Some(op_set_imm),
        (0x7, _, _) => Some(op_add_imm),
        (0x8, _, 0x0) => Some(op_move),
        (0x8, _, 0x1) => Some(op_or),
        (0x8, _, 0x2) => Some(op_and),
        (0x8, _, 0x3) => Some(op_xor),
        (0x8, _, 0x4) => Some(op_add_reg),
        (0x8, _, 0x5) => Some(op_sub_reg),
        (0x8, _, 0x6) => Some(op_shift_right),
        (0x8, _, 0x7) => Some(op_sub_rev),
        (0x8, _, 0xe) => Some(op_shift_left),
        (0x9, _, 0x0) => Some(op_skip_ne_reg),
        (0xa, _, _) => Some(op_set_index),
        (0xb, _, _) => Some(op_jump_offset),
        (0xc, _, _) => Some(op_random),
        (0xd, _, _) => Some(op_draw),
        (0xe, 0x9e, _) => Some(op_skip_key_down),
        (0xe, 0xa1, _) => Some(op_skip_key_up),
        (0xf, 0x07, _) => Some(op_read_delay),
        (0xf, 0x0a, _) => Some(op_wait_key),
        (0xf, 0x15, _) => Some(op_set_delay),
        (0xf, 0x18, _) => Some(op_set_sound),
        (0xf, 0x1e, _) => Some(op_add_index),
        (0xf, 0x29, _) => Some(op_font_glyph),
        (0xf, 0x33, _) => Some(op_bcd),
        (0xf, 0x55, _) => Some(op_store_regs),
        (0xf, 0x65, _) => Some(op_load_regs),
        _ => None,
    }
}

// 00e0
fn op_clear(m: &mut Interpreter, _op: Opcode) -> Result<()> {
    m.framebuffer.clear();
    Ok(())
}

// 00ee
fn op_return(m: &mut Interpreter, _op: Opcode) -> Result<()> {
    m.regs.pc = m.regs.pop()?;
    Ok(())
}

// 1nnn -- unconditional, no stack involvement
fn op_jump(m: &mut Interpreter, op: Opcode) -> Result<()> {
    m.regs.pc = op.nnn;
    Ok(())
}

// 2nnn
fn op_call(m: &mut Interpreter, op: Opcode) -> Result<()> {
    m.regs.push(m.regs.pc)?;
    m.regs.pc = op.nnn;
    Ok(())
}

fn skip(m: &mut Interpreter) {
    m.regs.pc = m.regs.pc.wrapping_add(2);
}

// 3xnn
fn op_skip_eq_imm(m: &mut Interpreter, op: Opcode) -> Result<()> {
    if m.regs.variables[op.x] == op.nn {
        skip(m);
    }
    Ok(())
}

// 4xnn
fn op_skip_ne_imm(m: &mut Interpreter, op: Opcode) -> Result<()> {
    if m.regs.variables[op.x] != op.nn {
        skip(m);
    }
    Ok(())
}

// 5xy0
fn op_skip_eq_reg(m: &mut Interpreter, op: Opcode) -> Result<()> {
    if m.regs.variables[op.x] == m.regs.variables[op.y] {
        skip(m);
    }
    Ok(())
}

// 9xy0
fn op_skip_ne_reg(m: &mut Interpreter, op: Opcode) -> Result<()> {
    if m.regs.variables[op.x] != m.regs.variables[op.y] {
        skip(m);
    }
    Ok(())
}

// 6xnn
fn op_set_imm(m: &mut Interpreter, op: Opcode) -> Result<()> {
    m.regs.variables[op.x] = op.nn;
    Ok(())
}

// 7xnn -- wraps modulo 256 and, unlike 8xy4, never touches the flag
fn op_add_imm(m: &mut Interpreter, op: Opcode) -> Result<()> {
    m.regs.variables[op.x] = m.regs.variables[op.x].wrapping_add(op.nn);
    Ok(())
}

// 8xy0
fn op_move(m: &mut Interpreter, op: Opcode) -> Result<()> {
    m.regs.variables[op.x] = m.regs.variables[op.y];
    Ok(())
}

// 8xy1
fn op_or(m: &mut Interpreter, op: Opcode) -> Result<()> {
    m.regs.variables[op.x] |= m.regs.variables[op.y];
    Ok(())
}

// 8xy2
fn op_and(m: &mut Interpreter, op: Opcode) -> Result<()> {
    m.regs.variables[op.x] &= m.regs.variables[op.y];
    Ok(())
}

// 8xy3
fn op_xor(m: &mut Interpreter, op: Opcode) -> Result<()> {
    m.regs.variables[op.x] ^= m.regs.variables[op.y];
    Ok(())
}

// 8xy4 -- carry into the flag, flag written last
fn op_add_reg(m: &mut Interpreter, op: Opcode) -> Result<()> {
    let (sum, carry) = m.regs.variables[op.x].overflowing_add(m.regs.variables[op.y]);
    m.regs.variables[op.x] = sum;
    m.regs.variables[FLAG] = carry as u8;
    Ok(())
}

// 8xy5 -- flag is 1 when no borrow
fn op_sub_reg(m: &mut Interpreter, op: Opcode) -> Result<()> {
    let (diff, borrow) = m.regs.variables[op.x].overflowing_sub(m.regs.variables[op.y]);
    m.regs.variables[op.x] = diff;
    m.regs.variables[FLAG] = (!borrow) as u8;
    Ok(())
}

// 8xy7 -- vy minus vx, flag is 1 when no borrow
fn op_sub_rev(m: &mut Interpreter, op: Opcode) -> Result<()> {
    let (diff, borrow) = m.regs.variables[op.y].overflowing_sub(m.regs.variables[op.x]);
    m.regs.variables[op.x] = diff;
    m.regs.variables[FLAG] = (!borrow) as u8;
    Ok(())
}

// 8xy6 -- vx in place, shifted-out bit into the flag
fn op_shift_right(m: &mut Interpreter, op: Opcode) -> Result<()> {
    let out = m.regs.variables[op.x] & 1;
    m.regs.variables[op.x] >>= 1;
    m.regs.variables[FLAG] = out;
    Ok(())
}

// 8xye
fn op_shift_left(m: &mut Interpreter, op: Opcode) -> Result<()> {
    let out = m.regs.variables[op.x] >> 7;
    m.regs.variables[op.x] <<= 1;
    m.regs.variables[FLAG] = out;
    Ok(())
}

// annn
fn op_set_index(m: &mut Interpreter, op: Opcode) -> Result<()> {
    m.regs.index = op.nnn;
    Ok(())
}

// bnnn
fn op_jump_offset(m: &mut Interpreter, op: Opcode) -> Result<()> {
    m.regs.pc = op.nnn.wrapping_add(u16::from(m.regs.variables[0]));
    Ok(())
}

// cxnn
fn op_random(m: &mut Interpreter, op: Opcode) -> Result<()> {
    let byte: u8 = m.rng.gen();
    m.regs.variables[op.x] = byte & op.nn;
    Ok(())
}

// dxyn -- XOR the sprite into the framebuffer. The origin wraps modulo the
// display size; individual rows and columns clip at the edges, never wrap
// mid-sprite. Collision sets the flag.
fn op_draw(m: &mut Interpreter, op: Opcode) -> Result<()> {
    let cx = m.regs.variables[op.x] as usize % display::WIDTH;
    let cy = m.regs.variables[op.y] as usize % display::HEIGHT;
    let rows = (op.n as usize).min(display::HEIGHT - cy);
    if rows == 0 {
        m.regs.variables[FLAG] = 0;
        return Ok(());
    }
    // the visible rows are validated as one span up front, so a draw that
    // faults leaves registers and framebuffer untouched
    let sprite = m.memory.read_bytes(m.regs.index, rows)?;
    m.regs.variables[FLAG] = 0;
    for (row, byte) in sprite.iter().enumerate() {
        for col in 0..8 {
            if cx + col >= display::WIDTH {
                break;
            }
            if byte & (0x80 >> col) != 0 && m.framebuffer.flip(cx + col, cy + row) {
                m.regs.variables[FLAG] = 1;
            }
        }
    }
    Ok(())
}

// ex9e
fn op_skip_key_down(m: &mut Interpreter, op: Opcode) -> Result<()> {
    if m.keypad.is_pressed(m.regs.variables[op.x]) {
        skip(m);
    }
    Ok(())
}

// exa1
fn op_skip_key_up(m: &mut Interpreter, op: Opcode) -> Result<()> {
    if !m.keypad.is_pressed(m.regs.variables[op.x]) {
        skip(m);
    }
    Ok(())
}

// fx07
fn op_read_delay(m: &mut Interpreter, op: Opcode) -> Result<()> {
    m.regs.variables[op.x] = m.timers.delay;
    Ok(())
}

// fx0a -- rewind so the fetch repeats until a key is down
fn op_wait_key(m: &mut Interpreter, op: Opcode) -> Result<()> {
    match m.keypad.first_pressed() {
        Some(key) => m.regs.variables[op.x] = key,
        None => m.regs.pc = m.regs.pc.wrapping_sub(2),
    }
    Ok(())
}

// fx15
fn op_set_delay(m: &mut Interpreter, op: Opcode) -> Result<()> {
    m.timers.delay = m.regs.variables[op.x];
    Ok(())
}

// fx18
fn op_set_sound(m: &mut Interpreter, op: Opcode) -> Result<()> {
    m.timers.sound = m.regs.variables[op.x];
    Ok(())
}

// fx1e -- no flag on overflow
fn op_add_index(m: &mut Interpreter, op: Opcode) -> Result<()> {
    m.regs.index = m.regs.index.wrapping_add(u16::from(m.regs.variables[op.x]));
    Ok(())
}

// fx29
fn op_font_glyph(m: &mut Interpreter, op: Opcode) -> Result<()> {
    m.regs.index = AddressSpace::glyph_addr(m.regs.variables[op.x]);
    Ok(())
}

// fx33 -- binary-coded decimal, hundreds first
fn op_bcd(m: &mut Interpreter, op: Opcode) -> Result<()> {
    let v = m.regs.variables[op.x];
    m.memory
        .write_bytes(m.regs.index, &[v / 100, v / 10 % 10, v % 10])
}

// fx55 -- v0..=vx into memory; index itself is unchanged
fn op_store_regs(m: &mut Interpreter, op: Opcode) -> Result<()> {
    m.memory
        .write_bytes(m.regs.index, &m.regs.variables[..=op.x])
}

// fx65
fn op_load_regs(m: &mut Interpreter, op: Opcode) -> Result<()> {
    let src = m.memory.read_bytes(m.regs.index, op.x + 1)?;
    m.regs.variables[..=op.x].copy_from_slice(src);
    Ok(())
}

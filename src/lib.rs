//! # vip8
//!
//! A CHIP-8 virtual machine: 4K of RAM, sixteen 8-bit variable registers, a
//! bounded call stack, two 60Hz countdown timers, a 64x32 monochrome
//! display and a 4x4 hex keypad, driven by a fetch-decode-execute engine.
//!
//! ## Design
//!
//! * all mutable machine state lives in one [`Interpreter`] aggregate; no
//!   process-wide singletons
//! * decode is a total, pure bit-slice of the instruction word; recognition
//!   happens in a dispatch table keyed by `(class, discriminant)`, and a
//!   word with no entry is a fatal fault carrying the word and its address
//! * the display, keyboard and speaker sit behind traits so the engine can
//!   run against a terminal, a test dummy, or whatever else
//! * instruction execution, timer decrement and display refresh are three
//!   independently-rated periodic activities on one thread; the instruction
//!   rate is configuration, the other two are 60Hz
//! * faults (out-of-bounds access, stack depth violations, unknown words)
//!   end the machine; the caller decides what to tell the user

pub mod display;
pub mod error;
pub mod input;
pub mod interpreter;
pub mod keypad;
pub mod memory;
pub mod opcode;
pub mod registers;
pub mod sched;
pub mod sound;
pub mod timers;

pub use error::{Error, Result};
pub use interpreter::Interpreter;
pub use sched::{Pacing, Runner};

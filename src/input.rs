use crossterm::event::{self, Event, KeyCode};
use crossterm::terminal;
use log::warn;
use std::collections::HashMap;
use std::io;
use std::time::{Duration, Instant};

use crate::keypad::{KeypadState, KEY_COUNT};

/// map from the left-hand side of a qwerty keyboard to the 4x4 hex pad
const CONVENTIONAL_KEYMAP: [(char, u8); KEY_COUNT] = [
    ('x', 0x00),
    ('1', 0x01),
    ('2', 0x02),
    ('3', 0x03),
    ('q', 0x04),
    ('w', 0x05),
    ('e', 0x06),
    ('a', 0x07),
    ('s', 0x08),
    ('d', 0x09),
    ('z', 0x0a),
    ('c', 0x0b),
    ('4', 0x0c),
    ('r', 0x0d),
    ('f', 0x0e),
    ('v', 0x0f),
];

/// Reads keypresses and writes them into the machine's keypad table. Called
/// at least once per instruction tick; the engine itself never touches the
/// host keyboard.
pub trait Input {
    /// refresh the key-press table from the host
    fn poll(&mut self, keys: &mut KeypadState) -> Result<(), io::Error>;

    /// whether the user asked to leave the emulator
    fn quit(&self) -> bool {
        false
    }
}

/// terminals deliver key repeats rather than release events, so a key
/// counts as held for this long after its last event
const KEY_HOLD: Duration = Duration::from_millis(200);

/// keyboard input over crossterm events
pub struct CrosstermInput {
    keymap: HashMap<char, u8>,
    last_seen: [Option<Instant>; KEY_COUNT],
    quit: bool,
}

impl CrosstermInput {
    pub fn new() -> Result<Self, io::Error> {
        terminal::enable_raw_mode()?;
        Ok(CrosstermInput {
            keymap: HashMap::from(CONVENTIONAL_KEYMAP),
            last_seen: [None; KEY_COUNT],
            quit: false,
        })
    }

    fn drain_events(&mut self, now: Instant) -> Result<(), io::Error> {
        while event::poll(Duration::from_millis(0))? {
            match event::read()? {
                Event::Key(evt) => match evt.code {
                    KeyCode::Char(key) => match self.keymap.get(&key) {
                        Some(&mapped) => self.last_seen[mapped as usize] = Some(now),
                        None => warn!("can't map {:?} to a pad key", key),
                    },
                    KeyCode::Esc => self.quit = true,
                    _ => warn!("unknown key event received"),
                },
                _ => {}
            }
        }
        Ok(())
    }
}

impl Drop for CrosstermInput {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

impl Input for CrosstermInput {
    fn poll(&mut self, keys: &mut KeypadState) -> Result<(), io::Error> {
        let now = Instant::now();
        self.drain_events(now)?;
        for (key, seen) in self.last_seen.iter().enumerate() {
            let held = matches!(seen, Some(at) if now.duration_since(*at) < KEY_HOLD);
            keys.set(key as u8, held);
        }
        Ok(())
    }

    fn quit(&self) -> bool {
        self.quit
    }
}

/// dummy Input implementation for testing: the given keys are always down
pub struct DummyInput {
    down: Vec<u8>,
}

impl DummyInput {
    pub fn new(down: &[u8]) -> Self {
        DummyInput {
            down: Vec::from(down),
        }
    }
}

impl Input for DummyInput {
    fn poll(&mut self, keys: &mut KeypadState) -> Result<(), io::Error> {
        keys.release_all();
        for &key in &self.down {
            keys.set(key, true);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keymap_covers_the_pad() {
        let seen: std::collections::HashSet<u8> =
            CONVENTIONAL_KEYMAP.iter().map(|&(_, k)| k).collect();
        assert_eq!(seen.len(), KEY_COUNT);
    }

    #[test]
    fn test_dummy_input_sets_keys() {
        let mut input = DummyInput::new(&[0x1, 0xf]);
        let mut keys = KeypadState::new();
        input.poll(&mut keys).unwrap();
        assert!(keys.is_pressed(0x1));
        assert!(keys.is_pressed(0xf));
        assert!(!keys.is_pressed(0x2));
        assert!(!input.quit());
    }

    #[test]
    fn test_dummy_input_overwrites_stale_state() {
        let mut keys = KeypadState::new();
        keys.set(0x7, true);
        DummyInput::new(&[]).poll(&mut keys).unwrap();
        assert!(!keys.is_pressed(0x7));
    }
}

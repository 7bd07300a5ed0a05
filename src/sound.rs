use beep::beep;
use std::error::Error;

/// Emits the sound timer's tone. The runner calls `beep` while the counter
/// is above zero and `stop` once it reaches it.
pub trait Sound {
    fn beep(&mut self) -> Result<(), Box<dyn Error>>;
    fn stop(&mut self) -> Result<(), Box<dyn Error>>;
}

const BEEP_PITCH: u16 = 2093; // C

/// a single fixed-pitch tone through the pc speaker
pub struct SimpleBeep {
    is_beeping: bool,
}

impl SimpleBeep {
    pub fn new() -> Self {
        SimpleBeep { is_beeping: false }
    }
}

impl Sound for SimpleBeep {
    fn beep(&mut self) -> Result<(), Box<dyn Error>> {
        // called once per refresh; only touch the speaker on the edge
        if !self.is_beeping {
            beep(BEEP_PITCH)?;
            self.is_beeping = true;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Box<dyn Error>> {
        if self.is_beeping {
            beep(0)?;
            self.is_beeping = false;
        }
        Ok(())
    }
}

impl Default for SimpleBeep {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Mute;

impl Mute {
    pub fn new() -> Self {
        Mute
    }
}

impl Sound for Mute {
    fn beep(&mut self) -> Result<(), Box<dyn Error>> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Box<dyn Error>> {
        Ok(())
    }
}

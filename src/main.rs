use std::error::Error;
use std::fs::File;
use std::path::PathBuf;

use clap::Parser;
use log::info;

use vip8::display::MonoTermDisplay;
use vip8::input::CrosstermInput;
use vip8::sound::{Mute, SimpleBeep, Sound};
use vip8::{Interpreter, Pacing, Runner};

/// CHIP-8 virtual machine for the terminal
#[derive(Parser)]
#[command(version, about)]
struct Args {
    /// program image, loaded at 0x200
    rom: PathBuf,

    /// instruction rate in Hz
    #[arg(long, default_value_t = 700)]
    cpu_hz: u32,

    /// keep the speaker quiet
    #[arg(long)]
    mute: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut machine = Interpreter::new();
    let mut f = File::open(&args.rom)?;
    let len = machine.load_program(&mut f)?;
    info!("{}: {} byte image", args.rom.display(), len);

    let mut display = MonoTermDisplay::new()?;
    let mut input = CrosstermInput::new()?;
    let mut beeper = SimpleBeep::new();
    let mut muted = Mute::new();
    let sound: &mut dyn Sound = if args.mute { &mut muted } else { &mut beeper };

    let pacing = Pacing {
        cpu_hz: args.cpu_hz,
        ..Pacing::default()
    };
    Runner::new(machine, &mut display, &mut input, sound, pacing).run()?;

    // shove some junk on stdout to stop the cli messing up the last frame
    for _ in 0..12 {
        println!();
    }
    Ok(())
}

use std::error::Error;
use std::time::{Duration, Instant};

use crate::display::Display;
use crate::input::Input;
use crate::interpreter::Interpreter;
use crate::sound::Sound;

/// Rates for the three periodic activities, in Hz.
///
/// The timer and refresh rates are fixed by the architecture at 60Hz. The
/// instruction rate is a tunable: contemporary machines ran anywhere from a
/// handful to several hundred instructions per second, so it is
/// configuration, not a constant.
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    pub cpu_hz: u32,
    pub timer_hz: u32,
    pub refresh_hz: u32,
}

impl Default for Pacing {
    fn default() -> Self {
        Pacing {
            cpu_hz: 700,
            timer_hz: 60,
            refresh_hz: 60,
        }
    }
}

/// after a stall, at most this many missed periods are replayed per activity
const MAX_CATCHUP: u32 = 30;

/// one activity's due-time bookkeeping
struct Periodic {
    period: Duration,
    next: Instant,
}

impl Periodic {
    fn new(hz: u32, now: Instant) -> Self {
        assert!(hz > 0, "rate must be nonzero");
        let period = Duration::from_secs(1) / hz;
        Periodic {
            period,
            next: now + period,
        }
    }

    /// whole periods elapsed at `now`, bounded by the catch-up cap
    fn due(&mut self, now: Instant) -> u32 {
        let mut count = 0;
        while self.next <= now && count < MAX_CATCHUP {
            self.next += self.period;
            count += 1;
        }
        if self.next <= now {
            // still behind after the cap: drop the backlog rather than burst
            self.next = now + self.period;
        }
        count
    }
}

/// what a poll found due
pub struct Due {
    pub cpu_steps: u32,
    pub timer_ticks: u32,
    pub refresh: bool,
}

/// Tracks when each of the three activities next runs. Pure over `Instant`
/// arguments: the caller supplies the clock, which is the real one in the
/// run loop and a synthetic one in tests.
pub struct Scheduler {
    cpu: Periodic,
    timer: Periodic,
    refresh: Periodic,
}

impl Scheduler {
    pub fn new(pacing: Pacing, now: Instant) -> Self {
        Scheduler {
            cpu: Periodic::new(pacing.cpu_hz, now),
            timer: Periodic::new(pacing.timer_hz, now),
            refresh: Periodic::new(pacing.refresh_hz, now),
        }
    }

    pub fn poll(&mut self, now: Instant) -> Due {
        Due {
            cpu_steps: self.cpu.due(now),
            timer_ticks: self.timer.due(now),
            refresh: self.refresh.due(now) > 0,
        }
    }

    /// when the earliest activity next falls due
    pub fn next_deadline(&self) -> Instant {
        self.cpu.next.min(self.timer.next).min(self.refresh.next)
    }
}

/// The environment: wires the machine to its display, input and sound
/// collaborators and drives all three periodic activities from one thread,
/// so state mutation is serialized by construction. Every instruction
/// completes before the next activity runs.
pub struct Runner<'a> {
    machine: Interpreter,
    display: &'a mut dyn Display,
    input: &'a mut dyn Input,
    sound: &'a mut dyn Sound,
    pacing: Pacing,
}

impl<'a> Runner<'a> {
    pub fn new(
        machine: Interpreter,
        display: &'a mut dyn Display,
        input: &'a mut dyn Input,
        sound: &'a mut dyn Sound,
        pacing: Pacing,
    ) -> Self {
        Runner {
            machine,
            display,
            input,
            sound,
            pacing,
        }
    }

    /// run until the user quits or the machine faults
    pub fn run(&mut self) -> Result<(), Box<dyn Error>> {
        let mut sched = Scheduler::new(self.pacing, Instant::now());
        loop {
            let due = sched.poll(Instant::now());

            for _ in 0..due.cpu_steps {
                // the key table is refreshed at least once per instruction
                self.input.poll(&mut self.machine.keypad)?;
                self.machine.step()?;
            }
            for _ in 0..due.timer_ticks {
                self.machine.tick_timers();
            }
            if due.refresh {
                self.input.poll(&mut self.machine.keypad)?;
                self.display.draw(self.machine.framebuffer.as_bytes())?;
                if self.machine.timers.sounding() {
                    self.sound.beep()?;
                } else {
                    self.sound.stop()?;
                }
            }

            if self.input.quit() {
                self.sound.stop()?;
                return Ok(());
            }

            let now = Instant::now();
            spin_sleep::sleep(sched.next_deadline().saturating_duration_since(now));
        }
    }

    /// the machine, for inspection after the loop ends
    pub fn machine(&self) -> &Interpreter {
        &self.machine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pacing() -> Pacing {
        // deliberately coarse rates so test arithmetic stays readable
        Pacing {
            cpu_hz: 10,
            timer_hz: 5,
            refresh_hz: 2,
        }
    }

    #[test]
    fn test_nothing_due_at_construction_instant() {
        let t0 = Instant::now();
        let mut s = Scheduler::new(pacing(), t0);
        let due = s.poll(t0);
        assert_eq!(due.cpu_steps, 0);
        assert_eq!(due.timer_ticks, 0);
        assert!(!due.refresh);
    }

    #[test]
    fn test_each_activity_fires_at_its_own_rate() {
        let t0 = Instant::now();
        let mut s = Scheduler::new(pacing(), t0);
        let due = s.poll(t0 + Duration::from_secs(1));
        assert_eq!(due.cpu_steps, 10);
        assert_eq!(due.timer_ticks, 5);
        assert!(due.refresh);
    }

    #[test]
    fn test_consecutive_polls_do_not_double_count() {
        let t0 = Instant::now();
        let mut s = Scheduler::new(pacing(), t0);
        let at = t0 + Duration::from_secs(1);
        s.poll(at);
        let due = s.poll(at);
        assert_eq!(due.cpu_steps, 0);
        assert_eq!(due.timer_ticks, 0);
        assert!(!due.refresh);
    }

    #[test]
    fn test_catchup_after_a_stall_is_bounded() {
        let t0 = Instant::now();
        let mut s = Scheduler::new(pacing(), t0);
        let due = s.poll(t0 + Duration::from_secs(100));
        assert_eq!(due.cpu_steps, MAX_CATCHUP);
        // the backlog was dropped, not deferred
        let due = s.poll(t0 + Duration::from_secs(100));
        assert_eq!(due.cpu_steps, 0);
    }

    #[test]
    fn test_next_deadline_is_the_earliest_activity() {
        let t0 = Instant::now();
        let s = Scheduler::new(pacing(), t0);
        // cpu at 10Hz is due first
        assert_eq!(s.next_deadline(), t0 + Duration::from_secs(1) / 10);
    }

    #[test]
    fn test_timer_rate_independent_of_cpu_rate() {
        let t0 = Instant::now();
        // cpu crawling at 1Hz must not slow the timers
        let mut s = Scheduler::new(
            Pacing {
                cpu_hz: 1,
                timer_hz: 5,
                refresh_hz: 2,
            },
            t0,
        );
        let due = s.poll(t0 + Duration::from_millis(900));
        assert_eq!(due.cpu_steps, 0);
        assert_eq!(due.timer_ticks, 4);
    }
}

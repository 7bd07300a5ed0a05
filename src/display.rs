use std::io;
use tui::backend::CrosstermBackend;
use tui::layout::Rect;
use tui::style::{Color, Style};
use tui::symbols::Marker;
use tui::widgets::canvas::{Canvas, Points};
use tui::widgets::{Block, Borders};
use tui::Terminal;

/// display width in pixels
pub const WIDTH: usize = 64;

/// display height in pixels
pub const HEIGHT: usize = 32;

/// the framebuffer packed one bit per pixel
pub const FRAME_BYTES: usize = WIDTH * HEIGHT / 8;

/// The monochrome display surface owned by the engine.
///
/// Pixels are packed row-major, most-significant bit leftmost, so renderers
/// consume the same byte layout sprites are stored in. Only two mutations
/// exist: `clear` and the XOR `flip` used by sprite drawing.
#[derive(Clone)]
pub struct Framebuffer {
    bits: [u8; FRAME_BYTES],
}

impl Framebuffer {
    pub fn new() -> Self {
        Framebuffer {
            bits: [0; FRAME_BYTES],
        }
    }

    /// set every cell to off
    pub fn clear(&mut self) {
        self.bits = [0; FRAME_BYTES];
    }

    pub fn is_set(&self, col: usize, row: usize) -> bool {
        let (byte, mask) = Self::locate(col, row);
        self.bits[byte] & mask != 0
    }

    /// XOR one pixel, returning whether it was lit beforehand -- the sprite
    /// collision signal. Callers guarantee col/row are in range.
    pub fn flip(&mut self, col: usize, row: usize) -> bool {
        let (byte, mask) = Self::locate(col, row);
        let was_set = self.bits[byte] & mask != 0;
        self.bits[byte] ^= mask;
        was_set
    }

    /// packed pixels for renderers
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    fn locate(col: usize, row: usize) -> (usize, u8) {
        debug_assert!(col < WIDTH && row < HEIGHT);
        let i = row * WIDTH + col;
        (i / 8, 0x80 >> (i % 8))
    }
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Display is used by the runner to put the framebuffer on a screen. It
/// abstracts the implementation details, so a variety of kinds of screen
/// would work.
pub trait Display {
    /// render one packed frame
    fn draw(&mut self, data: &[u8]) -> Result<(), io::Error>;
}

/// pixels set to the given bitplane value, as canvas coordinates
fn plane_points(data: &[u8], plane: u8) -> impl Iterator<Item = (f64, f64)> + '_ {
    let mut count = WIDTH * HEIGHT;
    std::iter::from_fn(move || {
        while count > 0 {
            count -= 1;
            let bit = 1 & (data[count / 8] >> (7 - count % 8));
            if bit == plane {
                return Some(((count % WIDTH) as f64, -1.0 * (count / WIDTH) as f64));
            }
        }
        None
    })
}

/// monochrome display in a terminal, rendered with TUI over crossterm
pub struct MonoTermDisplay {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl MonoTermDisplay {
    pub fn new() -> Result<MonoTermDisplay, io::Error> {
        let backend = CrosstermBackend::new(io::stdout());
        let terminal = Terminal::new(backend)?;
        Ok(MonoTermDisplay { terminal })
    }
}

impl Display for MonoTermDisplay {
    fn draw(&mut self, data: &[u8]) -> Result<(), io::Error> {
        assert_eq!(
            data.len(),
            FRAME_BYTES,
            "MonoTermDisplay must have correct-sized data to draw"
        );

        // 1:1 ratio between terminal cells, chip-8 pixels and the TUI canvas
        self.terminal.draw(|f| {
            let size = Rect::new(0, 0, 2 + WIDTH as u16, 2 + HEIGHT as u16);

            let canvas = Canvas::default()
                .block(
                    Block::default()
                        .title("vip8")
                        .borders(Borders::ALL)
                        .style(Style::default().bg(Color::Black)),
                )
                .x_bounds([0.0, (WIDTH - 1) as f64])
                .y_bounds([-1.0 * (HEIGHT - 1) as f64, 0.0])
                .marker(Marker::Block)
                .paint(|ctx| {
                    ctx.draw(&Points {
                        coords: &plane_points(data, 0).collect::<Vec<_>>(),
                        color: Color::Black,
                    });
                    ctx.draw(&Points {
                        coords: &plane_points(data, 1).collect::<Vec<_>>(),
                        color: Color::White,
                    });
                });
            f.render_widget(canvas, size);
        })?;
        Ok(())
    }
}

/// useful for testing non-display routines
pub struct DummyDisplay {
    pub frames: usize,
}

impl DummyDisplay {
    pub fn new() -> Self {
        DummyDisplay { frames: 0 }
    }
}

impl Display for DummyDisplay {
    fn draw(&mut self, _data: &[u8]) -> Result<(), io::Error> {
        self.frames += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_framebuffer_is_dark() {
        let fb = Framebuffer::new();
        for row in 0..HEIGHT {
            for col in 0..WIDTH {
                assert!(!fb.is_set(col, row));
            }
        }
    }

    #[test]
    fn test_flip_sets_then_clears() {
        let mut fb = Framebuffer::new();
        assert!(!fb.flip(3, 5)); // was dark
        assert!(fb.is_set(3, 5));
        assert!(fb.flip(3, 5)); // was lit: collision
        assert!(!fb.is_set(3, 5));
    }

    #[test]
    fn test_packing_msb_leftmost() {
        let mut fb = Framebuffer::new();
        fb.flip(0, 0);
        assert_eq!(fb.as_bytes()[0], 0x80);
        fb.flip(7, 0);
        assert_eq!(fb.as_bytes()[0], 0x81);
        fb.flip(0, 1);
        assert_eq!(fb.as_bytes()[WIDTH / 8], 0x80);
    }

    #[test]
    fn test_clear() {
        let mut fb = Framebuffer::new();
        fb.flip(63, 31);
        fb.clear();
        assert_eq!(fb.as_bytes(), &[0u8; FRAME_BYTES]);
    }

    #[test]
    fn test_plane_points_split() {
        let mut fb = Framebuffer::new();
        fb.flip(1, 0);
        let lit: Vec<_> = plane_points(fb.as_bytes(), 1).collect();
        assert_eq!(lit, vec![(1.0, 0.0)]);
        let dark = plane_points(fb.as_bytes(), 0).count();
        assert_eq!(dark, WIDTH * HEIGHT - 1);
    }

    #[test]
    fn test_dummy_display_counts_frames() {
        let mut d = DummyDisplay::new();
        d.draw(&[0; FRAME_BYTES]).unwrap();
        d.draw(&[0; FRAME_BYTES]).unwrap();
        assert_eq!(d.frames, 2);
    }
}

//! Status display adapter.
//!
//! Implements [`DisplayPort`] by composing the three text lines the
//! 128×64 OLED shows and writing them to the log.  A panel driver can
//! take the same [`Screen`] and draw it.

use core::fmt::Write as _;

use log::info;

use crate::app::ports::DisplayPort;

/// The three lines on screen, top to bottom.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Screen {
    pub title: heapless::String<16>,
    pub subtitle: heapless::String<32>,
    pub value: heapless::String<16>,
}

/// Log-rendered display.  Keeps the last screen for inspection.
#[derive(Debug, Default)]
pub struct LogDisplay {
    last: Screen,
}

impl LogDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn screen(&self) -> &Screen {
        &self.last
    }

    fn draw(&mut self, screen: Screen) {
        info!(
            "OLED | {} | {} | {}",
            screen.title, screen.subtitle, screen.value
        );
        self.last = screen;
    }
}

impl DisplayPort for LogDisplay {
    fn show_splash(&mut self) {
        let mut s = Screen::default();
        let _ = s.title.push_str("Water");
        let _ = s.subtitle.push_str("Pressure");
        let _ = s.value.push_str("Sensor");
        self.draw(s);
    }

    fn show_reading(&mut self, psi: f32, address: &str) {
        let mut s = Screen::default();
        let _ = s.title.push_str("Pressure");
        for c in address.chars() {
            if s.subtitle.push(c).is_err() {
                break;
            }
        }
        let _ = write!(s.value, "{psi:.2}");
        self.draw(s);
    }
}

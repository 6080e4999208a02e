use std::collections::HashMap;
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use spacegame::Keys;

/// Terminals without release events only repeat held keys; a key counts as held
/// until this long after its last press or repeat.
pub const DEFAULT_HOLD_WINDOW: Duration = Duration::from_millis(150);

pub fn key_binding(code: KeyCode, modifiers: KeyModifiers) -> Option<Keys> {
    let keys = match code {
        KeyCode::Char('w') => Keys::FORWARD,
        KeyCode::Char('W') => Keys::FORWARD | Keys::BOOST,
        KeyCode::Char('a') | KeyCode::Char('A') => Keys::ROLL_LEFT,
        KeyCode::Char('d') | KeyCode::Char('D') => Keys::ROLL_RIGHT,
        KeyCode::Up => Keys::PITCH_UP,
        KeyCode::Down => Keys::PITCH_DOWN,
        KeyCode::Left => Keys::YAW_LEFT,
        KeyCode::Right => Keys::YAW_RIGHT,
        KeyCode::Char(' ') => Keys::FIRE,
        _ => return None,
    };

    if modifiers.contains(KeyModifiers::SHIFT) && keys.contains(Keys::FORWARD) {
        Some(keys | Keys::BOOST)
    } else {
        Some(keys)
    }
}

/// Turns a stream of key events into per-frame key masks.
#[derive(Debug)]
pub struct InputSampler {
    hold_window: Duration,
    held: HashMap<Keys, Instant>,
    fire_pressed: bool,
}

impl Default for InputSampler {
    fn default() -> Self {
        Self::new(DEFAULT_HOLD_WINDOW)
    }
}

impl InputSampler {
    pub fn new(hold_window: Duration) -> Self {
        Self {
            hold_window,
            held: HashMap::new(),
            fire_pressed: false,
        }
    }

    /// Returns false if the key is not bound.
    pub fn handle(&mut self, event: &KeyEvent, now: Instant) -> bool {
        let Some(keys) = key_binding(event.code, event.modifiers) else {
            return false;
        };

        if keys == Keys::FIRE {
            if event.kind == KeyEventKind::Press {
                self.fire_pressed = true;
            }
            return true;
        }

        match event.kind {
            KeyEventKind::Press | KeyEventKind::Repeat => {
                // boost and plain forward share one slot
                if keys.contains(Keys::FORWARD) {
                    self.held.remove(&(Keys::FORWARD | (Keys::BOOST - keys)));
                }
                self.held.insert(keys, now);
            }
            KeyEventKind::Release => {
                self.held.retain(|held, _| !held.intersects(keys));
            }
        }
        true
    }

    /// Current mask. Fire is reported on exactly one sample per press.
    pub fn sample(&mut self, now: Instant) -> Keys {
        let window = self.hold_window;
        self.held
            .retain(|_, seen| now.saturating_duration_since(*seen) <= window);

        let mut keys = self
            .held
            .keys()
            .fold(Keys::empty(), |acc, held| acc | *held);
        if std::mem::take(&mut self.fire_pressed) {
            keys |= Keys::FIRE;
        }
        keys
    }

    pub fn clear(&mut self) {
        self.held.clear();
        self.fire_pressed = false;
    }
}

//! Input capture: held symbols, pointer clicks and scripted sources

use std::collections::BTreeSet;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Input symbols the simulation understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InputSymbol {
    Forward,
    Back,
    StrafeLeft,
    StrafeRight,
    Jump,
    TurnLeft,
    TurnRight,
}

impl InputSymbol {
    /// Map a keyboard key name to a symbol
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "w" | "W" => Some(Self::Forward),
            "s" | "S" => Some(Self::Back),
            "a" | "A" => Some(Self::StrafeLeft),
            "d" | "D" => Some(Self::StrafeRight),
            " " => Some(Self::Jump),
            "ArrowLeft" => Some(Self::TurnLeft),
            "ArrowRight" => Some(Self::TurnRight),
            _ => None,
        }
    }
}

/// Screen-space click or touch, in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerClick {
    pub x: f32,
    pub y: f32,
}

/// Everything the simulation reads from input in one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputSnapshot {
    pub held: BTreeSet<InputSymbol>,
    /// Click or tap requested this tick
    pub click: Option<PointerClick>,
    /// Accumulated pointer-look yaw in degrees
    pub look_delta: f32,
    /// Pointer captured for look; aiming by click is unavailable
    pub pointer_locked: bool,
}

impl InputSnapshot {
    #[cfg(test)]
    pub fn holding(symbols: impl IntoIterator<Item = InputSymbol>) -> Self {
        Self {
            held: symbols.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn is_held(&self, symbol: InputSymbol) -> bool {
        self.held.contains(&symbol)
    }
}

/// Producer of one input snapshot per tick
pub trait InputSource {
    fn sample(&mut self) -> InputSnapshot;
}

/// Key-down/key-up tracker. Pending clicks and look deltas are handed out
/// once; held keys persist until released.
#[derive(Debug, Clone, Default)]
pub struct KeyState {
    held: BTreeSet<InputSymbol>,
    click: Option<PointerClick>,
    look_delta: f32,
    pointer_locked: bool,
}

impl KeyState {
    pub fn key_down(&mut self, key: &str) {
        if let Some(symbol) = InputSymbol::from_key(key) {
            self.held.insert(symbol);
        }
    }

    pub fn key_up(&mut self, key: &str) {
        if let Some(symbol) = InputSymbol::from_key(key) {
            self.held.remove(&symbol);
        }
    }

    pub fn click(&mut self, x: f32, y: f32) {
        self.click = Some(PointerClick { x, y });
    }

    pub fn look(&mut self, yaw_degrees: f32) {
        self.look_delta += yaw_degrees;
    }

    pub fn set_pointer_locked(&mut self, locked: bool) {
        self.pointer_locked = locked;
    }
}

impl InputSource for KeyState {
    fn sample(&mut self) -> InputSnapshot {
        InputSnapshot {
            held: self.held.clone(),
            click: self.click.take(),
            look_delta: std::mem::take(&mut self.look_delta),
            pointer_locked: self.pointer_locked,
        }
    }
}

/// Seeded wandering bot for headless clients. It clicks to shoot while the
/// pointer is free and looks around while it holds the pointer lock.
#[derive(Debug, Clone)]
pub struct ScriptedInput {
    rng: ChaCha8Rng,
    keys: KeyState,
    viewport: (u32, u32),
    ticks_until_change: u32,
    pointer_locked: bool,
}

impl ScriptedInput {
    pub fn new(seed: u64, viewport: (u32, u32)) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            keys: KeyState::default(),
            viewport,
            ticks_until_change: 0,
            pointer_locked: false,
        }
    }

    fn replan(&mut self) {
        self.keys = KeyState::default();
        if self.rng.gen_bool(0.25) {
            self.pointer_locked = !self.pointer_locked;
        }
        self.keys.set_pointer_locked(self.pointer_locked);
        self.keys.key_down("w");
        match self.rng.gen_range(0..4) {
            0 => self.keys.key_down("ArrowLeft"),
            1 => self.keys.key_down("ArrowRight"),
            2 => self.keys.key_down(if self.rng.gen_bool(0.5) { "a" } else { "d" }),
            _ => {}
        }
        self.ticks_until_change = self.rng.gen_range(30..180);
    }
}

impl InputSource for ScriptedInput {
    fn sample(&mut self) -> InputSnapshot {
        if self.ticks_until_change == 0 {
            self.replan();
        }
        self.ticks_until_change -= 1;

        if self.rng.gen_bool(0.02) {
            self.keys.key_down(" ");
        } else {
            self.keys.key_up(" ");
        }
        if self.pointer_locked {
            if self.rng.gen_bool(0.1) {
                self.keys.look(self.rng.gen_range(-6.0..6.0));
            }
        } else if self.rng.gen_bool(0.01) {
            let (w, h) = self.viewport;
            let x = self.rng.gen_range(0.0..w.max(1) as f32);
            let y = self.rng.gen_range(0.0..h.max(1) as f32);
            self.keys.click(x, y);
        }
        self.keys.sample()
    }
}

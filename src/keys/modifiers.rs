//! Modifier sets and the CSI modifier-parameter policy

use serde::{Deserialize, Serialize};
use std::fmt;

/// A subset of {Shift, Ctrl, Alt}
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModifierSet {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
}

impl ModifierSet {
    pub const NONE: Self = Self::new(false, false, false);
    pub const SHIFT: Self = Self::new(true, false, false);
    pub const CTRL: Self = Self::new(false, true, false);
    pub const ALT: Self = Self::new(false, false, true);
    pub const SHIFT_CTRL: Self = Self::new(true, true, false);
    pub const SHIFT_ALT: Self = Self::new(true, false, true);
    pub const CTRL_ALT: Self = Self::new(false, true, true);
    pub const SHIFT_CTRL_ALT: Self = Self::new(true, true, true);

    /// The eight fixed combinations, empty set first
    pub const ALL: [ModifierSet; 8] = [
        Self::NONE,
        Self::SHIFT,
        Self::CTRL,
        Self::ALT,
        Self::SHIFT_CTRL,
        Self::SHIFT_ALT,
        Self::CTRL_ALT,
        Self::SHIFT_CTRL_ALT,
    ];

    pub const fn new(shift: bool, ctrl: bool, alt: bool) -> Self {
        Self { shift, ctrl, alt }
    }

    pub fn is_empty(&self) -> bool {
        !(self.shift || self.ctrl || self.alt)
    }

    fn parts(&self) -> Vec<&'static str> {
        let mut parts = Vec::with_capacity(3);
        if self.shift {
            parts.push("Shift");
        }
        if self.ctrl {
            parts.push("Ctrl");
        }
        if self.alt {
            parts.push("Alt");
        }
        parts
    }

    /// Human-readable prefix such as `Shift+Ctrl+`, empty for no modifiers
    pub fn to_prefix(&self) -> String {
        let parts = self.parts();
        if parts.is_empty() {
            String::new()
        } else {
            format!("{}+", parts.join("+"))
        }
    }

    /// Snake-case name used in category labels, e.g. `shift_ctrl`
    pub fn label(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        Some(
            self.parts()
                .iter()
                .map(|p| p.to_ascii_lowercase())
                .collect::<Vec<_>>()
                .join("_"),
        )
    }
}

impl fmt::Display for ModifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("None")
        } else {
            f.write_str(self.to_prefix().trim_end_matches('+'))
        }
    }
}

/// Arithmetic for the `;<mod>` parameter of modified CSI sequences.
///
/// The default is the xterm convention `1 + shift + 2*alt + 4*ctrl`. Devices
/// that disagree with it can be described in config instead of patching the
/// encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifierPolicy {
    pub base: u8,
    pub shift: u8,
    pub alt: u8,
    pub ctrl: u8,
}

impl Default for ModifierPolicy {
    fn default() -> Self {
        Self {
            base: 1,
            shift: 1,
            alt: 2,
            ctrl: 4,
        }
    }
}

impl ModifierPolicy {
    /// Modifier parameter for a set
    pub fn parameter(&self, mods: ModifierSet) -> u16 {
        let mut value = self.base as u16;
        if mods.shift {
            value += self.shift as u16;
        }
        if mods.alt {
            value += self.alt as u16;
        }
        if mods.ctrl {
            value += self.ctrl as u16;
        }
        value
    }
}

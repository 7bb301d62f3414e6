//! Keystroke encoder
//!
//! Maps a catalog key plus a modifier set to the exact byte sequence a
//! terminal would put on the wire. Printable keys follow the classic
//! Shift/Ctrl/Alt byte rules; escape-sequence keys are rewritten into the
//! parameterized CSI form whenever any modifier is held.

use super::catalog::{shifted, BaseEncoding, Key, KeyFamily, MalformedSequence, ESC};
use super::modifiers::{ModifierPolicy, ModifierSet};
use super::sampler::WeightedFamily;
use serde::{Serialize, Serializer};
use std::fmt;

/// Statistics bucket an input is attributed to.
///
/// Category strings are generated from the variant, never hand-written, so
/// coverage checks must enumerate [`Category::cross_product`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// One cell of the key-family x modifier cross-product
    Cell {
        modifiers: ModifierSet,
        family: KeyFamily,
    },
    /// A family of the weighted sampling mix
    Weighted(WeightedFamily),
    /// The malformed-sequence pool
    Malformed,
}

impl Category {
    pub fn cell(modifiers: ModifierSet, family: KeyFamily) -> Self {
        Self::Cell { modifiers, family }
    }

    /// Every cell of the cross-product (8 modifier sets x 6 families)
    pub fn cross_product() -> Vec<Category> {
        ModifierSet::ALL
            .iter()
            .flat_map(|&m| KeyFamily::all().iter().map(move |&f| Category::cell(m, f)))
            .collect()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cell { modifiers, family } => match modifiers.label() {
                Some(mods) => write!(f, "{}_{}", mods, family.label()),
                None => f.write_str(family.label()),
            },
            Self::Weighted(family) => f.write_str(family.label()),
            Self::Malformed => f.write_str("malformed"),
        }
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// What a response must look like for the exchange to count as a success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// A line with the success marker and no error marker
    Scancode,
    /// Any response at all; an error report from the device is acceptable
    AnyResponse,
}

/// Bytes to send plus attribution metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedInput {
    pub bytes: Vec<u8>,
    pub category: Category,
    pub description: String,
    pub expectation: Expectation,
}

impl EncodedInput {
    pub fn hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Same bytes, re-attributed to another category
    pub fn with_category(mut self, category: Category) -> Self {
        self.category = category;
        self
    }
}

/// Pure keystroke encoder
#[derive(Debug, Clone, Copy, Default)]
pub struct KeystrokeEncoder {
    policy: ModifierPolicy,
}

impl KeystrokeEncoder {
    pub fn new(policy: ModifierPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ModifierPolicy {
        &self.policy
    }

    /// Encode one key under a modifier set
    pub fn encode(&self, key: &Key, mods: ModifierSet) -> EncodedInput {
        EncodedInput {
            bytes: self.encode_bytes(key, mods),
            category: Category::cell(mods, key.family),
            description: format!("{}{}", mods.to_prefix(), key.name),
            expectation: Expectation::Scancode,
        }
    }

    /// Wrap a malformed pool entry
    pub fn malformed(&self, seq: &MalformedSequence) -> EncodedInput {
        EncodedInput {
            bytes: seq.bytes.clone(),
            category: Category::Malformed,
            description: format!("Malformed: {}", seq.name),
            expectation: Expectation::AnyResponse,
        }
    }

    pub fn encode_bytes(&self, key: &Key, mods: ModifierSet) -> Vec<u8> {
        match key.base {
            BaseEncoding::Char(c) => encode_printable(key.family, c, mods),
            BaseEncoding::Control(b) => {
                // Enter/Tab/Backspace have no modified form
                if key.is_escape() && mods.alt {
                    vec![ESC, ESC]
                } else {
                    vec![b]
                }
            }
            _ if mods.is_empty() => key.base.to_bytes(),
            BaseEncoding::Ss3(fin) | BaseEncoding::CsiLetter(fin) => {
                self.csi(&format!("1;{}{}", self.policy.parameter(mods), fin as char))
            }
            BaseEncoding::CsiTilde(n) => {
                self.csi(&format!("{};{}~", n, self.policy.parameter(mods)))
            }
        }
    }

    fn csi(&self, body: &str) -> Vec<u8> {
        let mut out = Vec::with_capacity(body.len() + 2);
        out.push(ESC);
        out.push(b'[');
        out.extend_from_slice(body.as_bytes());
        out
    }
}

fn encode_printable(family: KeyFamily, c: u8, mods: ModifierSet) -> Vec<u8> {
    let body = if mods.ctrl && family == KeyFamily::Letter {
        c - b'a' + 1
    } else if mods.shift {
        match family {
            KeyFamily::Letter => c.to_ascii_uppercase(),
            _ => shifted(c).unwrap_or(c),
        }
    } else {
        c
    };

    if mods.alt {
        vec![ESC, body]
    } else {
        vec![body]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::catalog::{find_key, keys_in, malformed_pool, CATALOG};

    fn enc(name: &str, mods: ModifierSet) -> Vec<u8> {
        let key = find_key(name).unwrap();
        KeystrokeEncoder::default().encode_bytes(key, mods)
    }

    /// Parse `ESC [ <a> ; <m> <final>` into (a, m, final)
    fn parse_modified_csi(bytes: &[u8]) -> (u16, u16, u8) {
        assert_eq!(&bytes[..2], &[ESC, b'[']);
        let body = std::str::from_utf8(&bytes[2..bytes.len() - 1]).unwrap();
        let (a, m) = body.split_once(';').expect("missing ';'");
        (a.parse().unwrap(), m.parse().unwrap(), *bytes.last().unwrap())
    }

    #[test]
    fn encode_is_deterministic_for_every_key_and_modifier() {
        let encoder = KeystrokeEncoder::default();
        for key in CATALOG {
            for mods in ModifierSet::ALL {
                assert_eq!(encoder.encode(key, mods), encoder.encode(key, mods));
            }
        }
    }

    #[test]
    fn unmodified_printables_are_raw_bytes() {
        assert_eq!(enc("a", ModifierSet::NONE), b"a");
        assert_eq!(enc("7", ModifierSet::NONE), b"7");
        assert_eq!(enc(";", ModifierSet::NONE), b";");
        assert_eq!(enc("Space", ModifierSet::NONE), b" ");
    }

    #[test]
    fn ctrl_letters_map_to_control_codes() {
        for key in keys_in(KeyFamily::Letter) {
            let out = enc(key.name, ModifierSet::CTRL);
            assert_eq!(out.len(), 1);
            let letter = key.name.as_bytes()[0];
            assert_eq!(out[0], letter - b'a' + 1);
            assert!((0x01..=0x1A).contains(&out[0]));
        }
        assert_eq!(enc("a", ModifierSet::CTRL), vec![0x01]);
        assert_eq!(enc("z", ModifierSet::CTRL), vec![0x1A]);
    }

    #[test]
    fn shift_letters_are_uppercase() {
        assert_eq!(enc("a", ModifierSet::SHIFT), b"A");
        assert_eq!(enc("q", ModifierSet::SHIFT), b"Q");
    }

    #[test]
    fn shift_digits_and_punctuation_use_table() {
        assert_eq!(enc("1", ModifierSet::SHIFT), b"!");
        assert_eq!(enc("-", ModifierSet::SHIFT), b"_");
        assert_eq!(enc("'", ModifierSet::SHIFT), b"\"");
        // No shifted form
        assert_eq!(enc("Space", ModifierSet::SHIFT), b" ");
    }

    #[test]
    fn ctrl_on_non_letters_passes_through() {
        assert_eq!(enc("5", ModifierSet::CTRL), b"5");
        assert_eq!(enc("/", ModifierSet::CTRL), b"/");
    }

    #[test]
    fn alt_prefixes_escape() {
        assert_eq!(enc("a", ModifierSet::ALT), b"\x1ba");
        assert_eq!(enc("1", ModifierSet::ALT), b"\x1b1");
        assert_eq!(enc("a", ModifierSet::SHIFT_ALT), b"\x1bA");
        assert_eq!(enc("1", ModifierSet::SHIFT_ALT), b"\x1b!");
    }

    #[test]
    fn ctrl_alt_combinations() {
        assert_eq!(enc("a", ModifierSet::CTRL_ALT), vec![ESC, 0x01]);
        assert_eq!(enc("z", ModifierSet::CTRL_ALT), vec![ESC, 0x1A]);
        assert_eq!(enc("=", ModifierSet::CTRL_ALT), b"\x1b=");
    }

    #[test]
    fn shift_ctrl_letter_is_plain_control_code() {
        assert_eq!(enc("c", ModifierSet::SHIFT_CTRL), vec![0x03]);
    }

    #[test]
    fn unmodified_escape_families_are_verbatim() {
        assert_eq!(enc("F1", ModifierSet::NONE), b"\x1bOP");
        assert_eq!(enc("F10", ModifierSet::NONE), b"\x1b[21~");
        assert_eq!(enc("Left", ModifierSet::NONE), b"\x1b[D");
        assert_eq!(enc("Insert", ModifierSet::NONE), b"\x1b[2~");
    }

    #[test]
    fn modified_escape_families_use_parameterized_csi() {
        assert_eq!(enc("F1", ModifierSet::CTRL), b"\x1b[1;5P");
        assert_eq!(enc("F4", ModifierSet::SHIFT), b"\x1b[1;2S");
        assert_eq!(enc("F5", ModifierSet::ALT), b"\x1b[15;3~");
        assert_eq!(enc("F12", ModifierSet::CTRL), b"\x1b[24;5~");
        assert_eq!(enc("Up", ModifierSet::SHIFT_CTRL_ALT), b"\x1b[1;8A");
        assert_eq!(enc("End", ModifierSet::CTRL_ALT), b"\x1b[1;7F");
        assert_eq!(enc("Delete", ModifierSet::SHIFT_ALT), b"\x1b[3;4~");
    }

    #[test]
    fn modifier_parameter_matches_bitmask_for_all_escape_keys() {
        let encoder = KeystrokeEncoder::default();
        let escape_keys = CATALOG
            .iter()
            .filter(|k| matches!(k.family, KeyFamily::Function | KeyFamily::Navigation));
        for key in escape_keys {
            for mods in ModifierSet::ALL.iter().filter(|m| !m.is_empty()) {
                let bytes = encoder.encode_bytes(key, *mods);
                let (_, param, _) = parse_modified_csi(&bytes);
                let expected = 1 + mods.shift as u16 + 2 * mods.alt as u16 + 4 * mods.ctrl as u16;
                assert_eq!(param, expected, "{} {:?}", key.name, mods);
                assert!((1..=8).contains(&param));
            }
        }
    }

    #[test]
    fn special_controls_ignore_modifiers() {
        for name in ["Enter", "Tab", "Backspace"] {
            let base = enc(name, ModifierSet::NONE);
            for mods in ModifierSet::ALL {
                assert_eq!(enc(name, mods), base, "{} {:?}", name, mods);
            }
        }
    }

    #[test]
    fn escape_with_alt_is_double_escape() {
        assert_eq!(enc("Escape", ModifierSet::ALT), vec![ESC, ESC]);
        assert_eq!(enc("Escape", ModifierSet::NONE), vec![ESC]);
        assert_eq!(enc("Escape", ModifierSet::CTRL), vec![ESC]);
    }

    #[test]
    fn custom_policy_changes_parameter() {
        let encoder = KeystrokeEncoder::new(ModifierPolicy {
            base: 1,
            shift: 1,
            alt: 8,
            ctrl: 4,
        });
        let key = find_key("F6").unwrap();
        assert_eq!(encoder.encode_bytes(key, ModifierSet::ALT), b"\x1b[17;9~");
    }

    #[test]
    fn category_and_description() {
        let encoder = KeystrokeEncoder::default();
        let input = encoder.encode(find_key("F5").unwrap(), ModifierSet::SHIFT_CTRL);
        assert_eq!(input.category.to_string(), "shift_ctrl_function");
        assert_eq!(input.description, "Shift+Ctrl+F5");

        let input = encoder.encode(find_key("b").unwrap(), ModifierSet::NONE);
        assert_eq!(input.category.to_string(), "letters");
        assert_eq!(input.description, "b");
        assert_eq!(input.expectation, Expectation::Scancode);
    }

    #[test]
    fn cross_product_categories_are_unique_and_complete() {
        let cells = Category::cross_product();
        assert_eq!(cells.len(), 48);
        let names: std::collections::HashSet<String> = cells.iter().map(|c| c.to_string()).collect();
        assert_eq!(names.len(), 48);
        assert!(names.contains("shift_ctrl_alt_special"));
        assert!(names.contains("digits"));

        // Every cell is reachable by encoding some key
        let encoder = KeystrokeEncoder::default();
        let reached: std::collections::HashSet<Category> = CATALOG
            .iter()
            .flat_map(|k| ModifierSet::ALL.iter().map(move |m| encoder.encode(k, *m).category))
            .collect();
        for cell in cells {
            assert!(reached.contains(&cell), "{} unreachable", cell);
        }
    }

    #[test]
    fn malformed_inputs_tolerate_any_response() {
        let encoder = KeystrokeEncoder::default();
        for seq in malformed_pool() {
            let input = encoder.malformed(&seq);
            assert_eq!(input.category, Category::Malformed);
            assert_eq!(input.expectation, Expectation::AnyResponse);
            assert_eq!(input.bytes, seq.bytes);
        }
    }

    #[test]
    fn category_serializes_as_label() {
        let json = serde_json::to_string(&Category::cell(ModifierSet::CTRL, KeyFamily::Digit)).unwrap();
        assert_eq!(json, "\"ctrl_digits\"");
    }
}

//! Static key catalog and the malformed-sequence pool
//!
//! Every key the generator can emit is listed here once, together with its
//! family and the byte (or escape template) a terminal sends for it when no
//! modifier is held.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The escape character that prefixes every CSI/SS3 sequence and Alt combo
pub const ESC: u8 = 0x1B;

/// Key family, used for encoding rules and category attribution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyFamily {
    Letter,
    Digit,
    Punctuation,
    Function,
    Navigation,
    SpecialControl,
}

impl KeyFamily {
    /// Name used when building category labels
    pub fn label(&self) -> &'static str {
        match self {
            Self::Letter => "letters",
            Self::Digit => "digits",
            Self::Punctuation => "punctuation",
            Self::Function => "function",
            Self::Navigation => "navigation",
            Self::SpecialControl => "special",
        }
    }

    pub fn all() -> &'static [KeyFamily] {
        &[
            Self::Letter,
            Self::Digit,
            Self::Punctuation,
            Self::Function,
            Self::Navigation,
            Self::SpecialControl,
        ]
    }

    /// Whether keys of this family are sent as a single printable byte
    pub fn is_printable(&self) -> bool {
        matches!(self, Self::Letter | Self::Digit | Self::Punctuation)
    }
}

impl fmt::Display for KeyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Unmodified wire form of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseEncoding {
    /// A single printable ASCII byte
    Char(u8),
    /// A single control byte (Enter, Tab, Backspace, Escape)
    Control(u8),
    /// `ESC O <final>`
    Ss3(u8),
    /// `ESC [ <final>`
    CsiLetter(u8),
    /// `ESC [ <number> ~`
    CsiTilde(u16),
}

impl BaseEncoding {
    /// Bytes emitted for this key with no modifiers held
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            Self::Char(b) | Self::Control(b) => vec![b],
            Self::Ss3(fin) => vec![ESC, b'O', fin],
            Self::CsiLetter(fin) => vec![ESC, b'[', fin],
            Self::CsiTilde(n) => {
                let mut out = vec![ESC, b'['];
                out.extend_from_slice(n.to_string().as_bytes());
                out.push(b'~');
                out
            }
        }
    }

    pub fn is_escape_sequence(&self) -> bool {
        matches!(self, Self::Ss3(_) | Self::CsiLetter(_) | Self::CsiTilde(_))
    }
}

/// A catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key {
    pub name: &'static str,
    pub family: KeyFamily,
    pub base: BaseEncoding,
}

impl Key {
    const fn new(name: &'static str, family: KeyFamily, base: BaseEncoding) -> Self {
        Self { name, family, base }
    }

    const fn letter(name: &'static str, c: u8) -> Self {
        Self::new(name, KeyFamily::Letter, BaseEncoding::Char(c))
    }

    const fn digit(name: &'static str, c: u8) -> Self {
        Self::new(name, KeyFamily::Digit, BaseEncoding::Char(c))
    }

    const fn punct(name: &'static str, c: u8) -> Self {
        Self::new(name, KeyFamily::Punctuation, BaseEncoding::Char(c))
    }

    const fn ss3(name: &'static str, fin: u8) -> Self {
        Self::new(name, KeyFamily::Function, BaseEncoding::Ss3(fin))
    }

    const fn fkey(name: &'static str, n: u16) -> Self {
        Self::new(name, KeyFamily::Function, BaseEncoding::CsiTilde(n))
    }

    const fn nav(name: &'static str, fin: u8) -> Self {
        Self::new(name, KeyFamily::Navigation, BaseEncoding::CsiLetter(fin))
    }

    const fn nav_tilde(name: &'static str, n: u16) -> Self {
        Self::new(name, KeyFamily::Navigation, BaseEncoding::CsiTilde(n))
    }

    const fn control(name: &'static str, b: u8) -> Self {
        Self::new(name, KeyFamily::SpecialControl, BaseEncoding::Control(b))
    }

    /// The Escape key gets its own Alt rule
    pub fn is_escape(&self) -> bool {
        self.base == BaseEncoding::Control(ESC)
    }
}

/// Every key the encoder knows about
pub static CATALOG: &[Key] = &[
    // Letters
    Key::letter("a", b'a'),
    Key::letter("b", b'b'),
    Key::letter("c", b'c'),
    Key::letter("d", b'd'),
    Key::letter("e", b'e'),
    Key::letter("f", b'f'),
    Key::letter("g", b'g'),
    Key::letter("h", b'h'),
    Key::letter("i", b'i'),
    Key::letter("j", b'j'),
    Key::letter("k", b'k'),
    Key::letter("l", b'l'),
    Key::letter("m", b'm'),
    Key::letter("n", b'n'),
    Key::letter("o", b'o'),
    Key::letter("p", b'p'),
    Key::letter("q", b'q'),
    Key::letter("r", b'r'),
    Key::letter("s", b's'),
    Key::letter("t", b't'),
    Key::letter("u", b'u'),
    Key::letter("v", b'v'),
    Key::letter("w", b'w'),
    Key::letter("x", b'x'),
    Key::letter("y", b'y'),
    Key::letter("z", b'z'),
    // Digits
    Key::digit("0", b'0'),
    Key::digit("1", b'1'),
    Key::digit("2", b'2'),
    Key::digit("3", b'3'),
    Key::digit("4", b'4'),
    Key::digit("5", b'5'),
    Key::digit("6", b'6'),
    Key::digit("7", b'7'),
    Key::digit("8", b'8'),
    Key::digit("9", b'9'),
    // Punctuation
    Key::punct("`", b'`'),
    Key::punct("-", b'-'),
    Key::punct("=", b'='),
    Key::punct("[", b'['),
    Key::punct("]", b']'),
    Key::punct("\\", b'\\'),
    Key::punct(";", b';'),
    Key::punct("'", b'\''),
    Key::punct(",", b','),
    Key::punct(".", b'.'),
    Key::punct("/", b'/'),
    Key::punct("Space", b' '),
    // Function keys: F1-F4 are SS3, the rest CSI-tilde
    Key::ss3("F1", b'P'),
    Key::ss3("F2", b'Q'),
    Key::ss3("F3", b'R'),
    Key::ss3("F4", b'S'),
    Key::fkey("F5", 15),
    Key::fkey("F6", 17),
    Key::fkey("F7", 18),
    Key::fkey("F8", 19),
    Key::fkey("F9", 20),
    Key::fkey("F10", 21),
    Key::fkey("F11", 23),
    Key::fkey("F12", 24),
    // Navigation
    Key::nav("Up", b'A'),
    Key::nav("Down", b'B'),
    Key::nav("Right", b'C'),
    Key::nav("Left", b'D'),
    Key::nav("Home", b'H'),
    Key::nav("End", b'F'),
    Key::nav_tilde("Insert", 2),
    Key::nav_tilde("Delete", 3),
    Key::nav_tilde("PageUp", 5),
    Key::nav_tilde("PageDown", 6),
    // Special controls
    Key::control("Enter", 0x0D),
    Key::control("Tab", 0x09),
    Key::control("Backspace", 0x08),
    Key::control("Escape", ESC),
];

/// Shifted form of a digit or punctuation character on a US layout
pub fn shifted(c: u8) -> Option<u8> {
    let s = match c {
        b'1' => b'!',
        b'2' => b'@',
        b'3' => b'#',
        b'4' => b'$',
        b'5' => b'%',
        b'6' => b'^',
        b'7' => b'&',
        b'8' => b'*',
        b'9' => b'(',
        b'0' => b')',
        b'`' => b'~',
        b'-' => b'_',
        b'=' => b'+',
        b'[' => b'{',
        b']' => b'}',
        b'\\' => b'|',
        b';' => b':',
        b'\'' => b'"',
        b',' => b'<',
        b'.' => b'>',
        b'/' => b'?',
        _ => return None,
    };
    Some(s)
}

/// All catalog keys of one family
pub fn keys_in(family: KeyFamily) -> impl Iterator<Item = &'static Key> {
    CATALOG.iter().filter(move |k| k.family == family)
}

/// Look up a key by its catalog name (case-insensitive for named keys)
pub fn find_key(name: &str) -> Option<&'static Key> {
    CATALOG
        .iter()
        .find(|k| k.name == name)
        .or_else(|| CATALOG.iter().find(|k| k.name.len() > 1 && k.name.eq_ignore_ascii_case(name)))
}

/// A deliberately broken sequence used to probe parser robustness
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedSequence {
    pub name: &'static str,
    pub bytes: Vec<u8>,
}

/// The malformed-sequence pool
pub fn malformed_pool() -> Vec<MalformedSequence> {
    let entry = |name: &'static str, bytes: Vec<u8>| MalformedSequence { name, bytes };
    vec![
        entry("standalone ESC", vec![ESC]),
        entry("incomplete CSI", vec![ESC, b'[']),
        entry("unknown CSI code 999", b"\x1b[999~".to_vec()),
        entry("repeated Up x50", b"\x1b[A".repeat(50)),
        entry("ESC run x10", vec![ESC; 10]),
        entry("invalid ESC X", vec![ESC, b'X']),
        entry("empty CSI parameter", b"\x1b[;".to_vec()),
    ]
}

//! Scripted pass/fail assertion suite
//!
//! A fixed table of inputs with the diagnostic lines the device must print
//! for each. A case passes when every expected substring occurs somewhere in
//! the lines collected after the input; order and extra lines don't matter.

use crate::campaign::CancelFlag;
use crate::error::HarnessError;
use crate::keys::ESC;
use crate::transport::{Transport, TransportError};
use log::{debug, info, warn};
use std::thread;
use std::time::Duration;

/// How a case's input reaches the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuiteInput {
    /// One write of the exact bytes
    Raw(Vec<u8>),
    /// One write per character, separated by the typing gap
    Typed(String),
}

#[derive(Debug, Clone)]
pub struct AssertionCase {
    pub section: &'static str,
    pub name: String,
    pub input: SuiteInput,
    pub expected: Vec<String>,
    /// Pause after the input before collecting output
    pub settle: Duration,
}

const CHAR_SETTLE: Duration = Duration::from_millis(100);
const SEQ_SETTLE: Duration = Duration::from_millis(200);

fn case(section: &'static str, name: &str, input: SuiteInput, expected: &[&str], settle: Duration) -> AssertionCase {
    AssertionCase {
        section,
        name: name.to_string(),
        input,
        expected: expected.iter().map(|s| s.to_string()).collect(),
        settle,
    }
}

fn typed(section: &'static str, name: &str, text: &str, expected: &[&str]) -> AssertionCase {
    case(section, name, SuiteInput::Typed(text.to_string()), expected, CHAR_SETTLE)
}

fn raw(section: &'static str, name: &str, bytes: &[u8], expected: &[&str]) -> AssertionCase {
    case(section, name, SuiteInput::Raw(bytes.to_vec()), expected, CHAR_SETTLE)
}

fn esc(section: &'static str, name: &str, tail: &[u8], expected: &[&str]) -> AssertionCase {
    let mut bytes = vec![ESC];
    bytes.extend_from_slice(tail);
    case(section, name, SuiteInput::Raw(bytes), expected, SEQ_SETTLE)
}

/// The device's known-good behavior for the standard keys
pub fn builtin_cases() -> Vec<AssertionCase> {
    let mut cases = Vec::with_capacity(100);

    let s = "Basic Character Tests";
    cases.push(typed(s, "Lowercase letter 'a'", "a", &["INPUT: 0x61", "KEY: a"]));
    cases.push(typed(s, "Lowercase letter 'z'", "z", &["INPUT: 0x7A", "KEY: z"]));
    cases.push(typed(s, "Uppercase letter 'A'", "A", &["INPUT: 0x41", "KEY: A (shifted)"]));
    cases.push(typed(s, "Digit '0'", "0", &["INPUT: 0x30", "KEY: 0"]));
    cases.push(typed(s, "Digit '9'", "9", &["INPUT: 0x39", "KEY: 9"]));
    cases.push(typed(s, "Space character", " ", &["INPUT: 0x20"]));

    let s = "Punctuation Tests";
    for (c, code) in [('-', "2D"), ('=', "3D"), ('[', "5B"), (';', "3B"), (',', "2C"), ('.', "2E"), ('/', "2F")] {
        let input = format!("INPUT: 0x{}", code);
        let key = format!("KEY: {}", c);
        cases.push(typed(s, &format!("Punctuation '{}'", c), &c.to_string(), &[input.as_str(), key.as_str()]));
    }

    let s = "Shifted Character Tests";
    for c in ['!', '@', '#', '$', '%', '^', '&', '*', '(', ')', '_', '+'] {
        let input = format!("INPUT: 0x{:X}", c as u32);
        let key = format!("KEY: {} (shifted)", c);
        cases.push(typed(s, &format!("Shifted '{}'", c), &c.to_string(), &[input.as_str(), key.as_str()]));
    }

    let s = "Control Character Tests";
    for c in ['a', 'c', 'd', 'z'] {
        let code = c as u8 - b'a' + 1;
        let input = format!("INPUT: 0x{:X}", code);
        let key = format!("KEY: Ctrl+{}", c);
        cases.push(raw(s, &format!("Ctrl+{}", c.to_ascii_uppercase()), &[code], &[input.as_str(), key.as_str()]));
    }
    cases.push(typed(s, "Tab character", "\t", &["INPUT: 0x9"]));
    cases.push(typed(s, "Newline", "\n", &["INPUT: 0xA"]));
    cases.push(typed(s, "Carriage return", "\r", &["INPUT: 0xD"]));
    cases.push(typed(s, "Backspace", "\x08", &["INPUT: 0x8"]));

    let s = "Arrow Key Tests";
    for (name, fin, scancode) in [("Up", b'A', "48"), ("Down", b'B', "50"), ("Right", b'C', "4D"), ("Left", b'D', "4B")] {
        let key = format!("KEY: Escape sequence -> 0x{}", scancode);
        cases.push(esc(s, &format!("{} arrow", name), &[b'[', fin], &["ESC received", "CSI sequence", key.as_str()]));
    }

    let s = "Function Key Tests (SS3)";
    for (n, fin, scancode) in [(1, b'P', "3B"), (2, b'Q', "3C"), (3, b'R', "3D"), (4, b'S', "3E")] {
        let key = format!("KEY: Escape sequence -> 0x{}", scancode);
        cases.push(esc(s, &format!("F{} key", n), &[b'O', fin], &["ESC received", "SS3 sequence", key.as_str()]));
    }

    let s = "Extended Key Tests (CSI ~)";
    let extended = [
        ("Home key", "1", "47"),
        ("Insert key", "2", "52"),
        ("Delete key", "3", "53"),
        ("End key", "4", "4F"),
        ("Page Up key", "5", "49"),
        ("Page Down key", "6", "51"),
        ("F5 key", "15", "3F"),
        ("F6 key", "17", "40"),
        ("F7 key", "18", "41"),
        ("F8 key", "19", "42"),
        ("F9 key", "20", "43"),
        ("F10 key", "21", "44"),
        ("F11 key", "23", "57"),
        ("F12 key", "24", "58"),
    ];
    for (name, number, scancode) in extended {
        let tail = format!("[{}~", number);
        let key = format!("KEY: Escape sequence -> 0x{}", scancode);
        cases.push(esc(s, name, tail.as_bytes(), &["ESC received", "CSI sequence", key.as_str()]));
    }

    let tilde_fkeys = [(5, "15"), (6, "17"), (7, "18"), (8, "19"), (9, "20"), (10, "21"), (11, "23"), (12, "24")];
    let ss3_fkeys = [(1, b'P'), (2, b'Q'), (3, b'R'), (4, b'S')];

    let s = "Alt+Function Key Tests";
    for (n, fin) in ss3_fkeys {
        cases.push(esc(s, &format!("Alt+F{}", n), &[ESC, b'O', fin], &["ESC received"]));
    }
    for (n, number) in tilde_fkeys {
        let tail = format!("[{};3~", number);
        cases.push(esc(s, &format!("Alt+F{}", n), tail.as_bytes(), &["ESC received"]));
    }

    let s = "Ctrl+Function Key Tests";
    for (n, fin) in ss3_fkeys {
        cases.push(esc(s, &format!("Ctrl+F{}", n), &[b'[', b'1', b';', b'5', fin], &["ESC received"]));
    }
    for (n, number) in tilde_fkeys {
        let tail = format!("[{};5~", number);
        cases.push(esc(s, &format!("Ctrl+F{}", n), tail.as_bytes(), &["ESC received"]));
    }

    let s = "Ctrl+Alt Combination Tests";
    for c in ['a', 'c', 'd', 'z'] {
        let code = c as u8 - b'a' + 1;
        cases.push(esc(s, &format!("Ctrl+Alt+{}", c.to_ascii_uppercase()), &[code], &["ESC received"]));
    }

    let s = "Shift+Ctrl Combination Tests";
    for c in ['a', 'c', 'z'] {
        let code = c as u8 - b'a' + 1;
        let input = format!("INPUT: 0x{:X}", code);
        let key = format!("KEY: Ctrl+{}", c);
        let mut shift_ctrl = raw(s, &format!("Shift+Ctrl+{}", c.to_ascii_uppercase()), &[code], &[input.as_str(), key.as_str()]);
        shift_ctrl.settle = SEQ_SETTLE;
        cases.push(shift_ctrl);
    }

    let s = "Shift+Alt Combination Tests";
    cases.push(esc(s, "Shift+Alt+A", b"A", &["ESC received", "KEY: Alt+A"]));
    cases.push(esc(s, "Shift+Alt+Z", b"Z", &["ESC received", "KEY: Alt+Z"]));
    cases.push(esc(s, "Shift+Alt+1 (!)", b"!", &["ESC received", "KEY: Alt+!"]));

    let s = "Alt Key Tests";
    cases.push(esc(s, "Alt+a", b"a", &["ESC received", "KEY: Alt+a"]));
    cases.push(esc(s, "Alt+1", b"1", &["ESC received", "KEY: Alt+1"]));
    cases.push(esc(s, "Alt+A (uppercase)", b"A", &["ESC received", "KEY: Alt+A"]));

    let s = "Standalone ESC Key Test";
    let mut standalone = esc(s, "Standalone ESC key", &[], &["ESC received", "KEY: ESC (standalone)"]);
    standalone.settle = Duration::from_millis(150);
    cases.push(standalone);

    let s = "String Tests";
    cases.push(typed(
        s,
        "Word 'hello'",
        "hello",
        &["INPUT: 0x68", "INPUT: 0x65", "INPUT: 0x6C", "INPUT: 0x6F"],
    ));
    cases.push(typed(s, "Sentence 'Hi'", "Hi", &["INPUT: 0x48", "INPUT: 0x69"]));

    let s = "Error and Edge Case Tests";
    cases.push(esc(
        s,
        "Unknown sequence ESC[999~",
        b"[999~",
        &["ESC received", "CSI sequence", "ERROR: Unknown escape sequence"],
    ));
    cases.push(esc(
        s,
        "Ctrl+Alt+A via ESC+Ctrl code",
        &[0x01],
        &["ESC received", "KEY: Ctrl+Alt+a"],
    ));

    cases
}

/// Timing of the suite runner
#[derive(Debug, Clone)]
pub struct SuiteSettings {
    /// Startup text proving the right firmware is attached
    pub banner: String,
    /// A response is complete after this long without a new line
    pub idle_timeout: Duration,
    pub char_gap: Duration,
}

impl Default for SuiteSettings {
    fn default() -> Self {
        Self {
            banner: "arduXT".to_string(),
            idle_timeout: Duration::from_millis(300),
            char_gap: Duration::from_millis(10),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaseResult {
    pub section: &'static str,
    pub name: String,
    pub passed: bool,
    pub expected: Vec<String>,
    pub actual: Vec<String>,
    pub fault: Option<String>,
}

impl CaseResult {
    /// Expected substrings absent from the output
    pub fn missing(&self) -> Vec<&str> {
        let joined = self.actual.join("\n");
        self.expected
            .iter()
            .filter(|e| !joined.contains(e.as_str()))
            .map(|e| e.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SuiteSummary {
    pub results: Vec<CaseResult>,
    /// Stopped before every case ran
    pub interrupted: bool,
}

impl SuiteSummary {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.passed()
    }

    pub fn success_rate(&self) -> f64 {
        if self.results.is_empty() {
            return 0.0;
        }
        self.passed() as f64 / self.total() as f64 * 100.0
    }

    /// Every case ran and passed
    pub fn all_passed(&self) -> bool {
        !self.interrupted && self.failed() == 0
    }
}

/// Runs a case table against one device
pub struct AssertionSuite {
    settings: SuiteSettings,
    cases: Vec<AssertionCase>,
}

impl AssertionSuite {
    pub fn new(settings: SuiteSettings, cases: Vec<AssertionCase>) -> Self {
        Self { settings, cases }
    }

    /// The standard case table
    pub fn builtin(settings: SuiteSettings) -> Self {
        Self::new(settings, builtin_cases())
    }

    pub fn cases(&self) -> &[AssertionCase] {
        &self.cases
    }

    /// Check the startup lines for the firmware banner
    pub fn handshake(&self, startup: &[String]) -> Result<(), HarnessError> {
        if startup.iter().any(|l| l.contains(&self.settings.banner)) {
            info!("Device connected and ready");
            Ok(())
        } else {
            Err(HarnessError::Handshake(format!(
                "device did not print the expected startup banner '{}'",
                self.settings.banner
            )))
        }
    }

    pub fn run<T: Transport + ?Sized>(&self, transport: &mut T, cancel: &CancelFlag) -> SuiteSummary {
        let mut summary = SuiteSummary::default();
        for case in &self.cases {
            if cancel.is_cancelled() {
                warn!("Suite interrupted after {} cases", summary.total());
                summary.interrupted = true;
                break;
            }
            summary.results.push(self.run_case(transport, case));
        }
        info!(
            "Suite finished: {}/{} passed",
            summary.passed(),
            summary.total()
        );
        summary
    }

    pub fn run_case<T: Transport + ?Sized>(&self, transport: &mut T, case: &AssertionCase) -> CaseResult {
        let mut actual = Vec::new();
        let fault = self.exchange(transport, case, &mut actual).err().map(|e| e.to_string());

        let joined = actual.join("\n");
        let passed = fault.is_none() && case.expected.iter().all(|e| joined.contains(e.as_str()));

        if passed {
            debug!("PASS {}", case.name);
        } else {
            warn!("FAIL {}: got {:?}", case.name, actual);
        }

        CaseResult {
            section: case.section,
            name: case.name.clone(),
            passed,
            expected: case.expected.clone(),
            actual,
            fault,
        }
    }

    fn exchange<T: Transport + ?Sized>(
        &self,
        transport: &mut T,
        case: &AssertionCase,
        actual: &mut Vec<String>,
    ) -> Result<(), TransportError> {
        transport.reset_input()?;

        match &case.input {
            SuiteInput::Raw(bytes) => transport.write(bytes)?,
            SuiteInput::Typed(text) => {
                let mut buf = [0u8; 4];
                for c in text.chars() {
                    transport.write(c.encode_utf8(&mut buf).as_bytes())?;
                    if !self.settings.char_gap.is_zero() {
                        thread::sleep(self.settings.char_gap);
                    }
                }
            }
        }

        if !case.settle.is_zero() {
            thread::sleep(case.settle);
        }

        while let Some(line) = transport.read_line(self.settings.idle_timeout)? {
            actual.push(line);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Reply, ScriptedTransport};
    use std::collections::HashSet;

    fn fast() -> SuiteSettings {
        SuiteSettings {
            banner: "arduXT".into(),
            idle_timeout: Duration::from_millis(5),
            char_gap: Duration::ZERO,
        }
    }

    /// Prints an INPUT line per byte and flags escape sequences
    fn input_echo() -> ScriptedTransport {
        ScriptedTransport::new(|bytes| {
            let mut lines: Vec<String> = Vec::new();
            if bytes.first() == Some(&ESC) {
                lines.push("ESC received".into());
            }
            for b in bytes {
                lines.push(format!("INPUT: 0x{:X}", b));
            }
            Reply::Lines {
                lines,
                after: Duration::ZERO,
            }
        })
    }

    fn quick(cases: Vec<AssertionCase>) -> Vec<AssertionCase> {
        cases
            .into_iter()
            .map(|mut c| {
                c.settle = Duration::ZERO;
                c
            })
            .collect()
    }

    #[test]
    fn builtin_table_is_complete() {
        let cases = builtin_cases();
        assert_eq!(cases.len(), 97);
        let names: HashSet<_> = cases.iter().map(|c| c.name.as_str()).collect();
        assert!(names.len() >= 95);
        assert!(cases.iter().all(|c| !c.expected.is_empty()));
    }

    #[test]
    fn builtin_table_encodes_known_sequences() {
        let cases = builtin_cases();
        let find = |name: &str| cases.iter().find(|c| c.name == name).unwrap().input.clone();
        assert_eq!(find("Alt+F5"), SuiteInput::Raw(b"\x1b[15;3~".to_vec()));
        assert_eq!(find("Ctrl+F1"), SuiteInput::Raw(b"\x1b[1;5P".to_vec()));
        assert_eq!(find("Alt+F1"), SuiteInput::Raw(b"\x1b\x1bOP".to_vec()));
        assert_eq!(find("Ctrl+Z"), SuiteInput::Raw(vec![0x1A]));
        assert_eq!(find("Standalone ESC key"), SuiteInput::Raw(vec![ESC]));
        assert_eq!(find("Word 'hello'"), SuiteInput::Typed("hello".into()));
    }

    #[test]
    fn handshake_requires_banner() {
        let suite = AssertionSuite::new(fast(), Vec::new());
        assert!(suite.handshake(&["arduXT v1.0 ready".to_string()]).is_ok());
        assert!(matches!(
            suite.handshake(&["hello".to_string()]),
            Err(HarnessError::Handshake(_))
        ));
        assert!(suite.handshake(&[]).is_err());
    }

    #[test]
    fn typed_input_is_written_per_character() {
        let suite = AssertionSuite::new(fast(), Vec::new());
        let mut t = input_echo();
        let case = typed("s", "hi", "hi", &["INPUT: 0x68", "INPUT: 0x69"]);
        let result = suite.run_case(&mut t, &quick(vec![case])[0]);
        assert!(result.passed);
        assert_eq!(t.written(), &[b"h".to_vec(), b"i".to_vec()]);
    }

    #[test]
    fn missing_substring_fails_case() {
        let suite = AssertionSuite::new(fast(), Vec::new());
        let mut t = input_echo();
        let case = typed("s", "a", "a", &["INPUT: 0x61", "KEY: a"]);
        let result = suite.run_case(&mut t, &quick(vec![case])[0]);
        assert!(!result.passed);
        assert_eq!(result.missing(), vec!["KEY: a"]);
    }

    #[test]
    fn silent_device_fails_every_case() {
        let suite = AssertionSuite::new(fast(), quick(builtin_cases().into_iter().take(5).collect()));
        let mut t = ScriptedTransport::silent();
        let summary = suite.run(&mut t, &CancelFlag::new());
        assert_eq!(summary.total(), 5);
        assert_eq!(summary.failed(), 5);
        assert!(!summary.all_passed());
        assert_eq!(summary.success_rate(), 0.0);
    }

    #[test]
    fn builtin_escape_cases_pass_against_echo() {
        let cases: Vec<_> = builtin_cases()
            .into_iter()
            .filter(|c| c.section == "Ctrl+Function Key Tests")
            .collect();
        assert_eq!(cases.len(), 12);
        let suite = AssertionSuite::new(fast(), quick(cases));
        let mut t = input_echo();
        let summary = suite.run(&mut t, &CancelFlag::new());
        assert_eq!(summary.passed(), 12);
        assert!(summary.all_passed());
    }

    #[test]
    fn write_fault_fails_case_with_fault() {
        let suite = AssertionSuite::new(fast(), Vec::new());
        let mut t = ScriptedTransport::new(|_| Reply::Fault("unplugged".into()));
        let case = raw("s", "x", b"x", &["INPUT: 0x78"]);
        let result = suite.run_case(&mut t, &case);
        assert!(!result.passed);
        assert_eq!(result.fault.as_deref(), Some("unplugged"));
    }

    #[test]
    fn cancelled_suite_is_interrupted() {
        let suite = AssertionSuite::new(fast(), quick(builtin_cases()));
        let cancel = CancelFlag::new();
        cancel.cancel();
        let mut t = input_echo();
        let summary = suite.run(&mut t, &cancel);
        assert!(summary.interrupted);
        assert_eq!(summary.total(), 0);
        assert!(!summary.all_passed());
    }
}

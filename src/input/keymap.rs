//! Character Mapping Tables
//!
//! Maps a logical character to the physical key a US keyboard would use to
//! produce it, whether Shift is needed, and the legacy virtual key code some
//! protocol dialects still require next to the physical key identifier.

/// Legacy virtual key codes
pub mod vk {
    pub const VK_RETURN: u16 = 0x0D;
    pub const VK_SHIFT: u16 = 0x10;
    pub const VK_MENU: u16 = 0x12;
    pub const VK_SPACE: u16 = 0x20;
    pub const VK_OEM_1: u16 = 0xBA; // ;:
    pub const VK_OEM_PLUS: u16 = 0xBB; // =+
    pub const VK_OEM_COMMA: u16 = 0xBC; // ,<
    pub const VK_OEM_MINUS: u16 = 0xBD; // -_
    pub const VK_OEM_PERIOD: u16 = 0xBE; // .>
    pub const VK_OEM_2: u16 = 0xBF; // /?
    pub const VK_OEM_3: u16 = 0xC0; // `~
    pub const VK_OEM_4: u16 = 0xDB; // [{
    pub const VK_OEM_5: u16 = 0xDC; // \|
    pub const VK_OEM_6: u16 = 0xDD; // ]}
    pub const VK_OEM_7: u16 = 0xDE; // '"
}

use vk::{
    VK_OEM_1, VK_OEM_2, VK_OEM_3, VK_OEM_4, VK_OEM_5, VK_OEM_6, VK_OEM_7, VK_OEM_COMMA,
    VK_OEM_MINUS, VK_OEM_PERIOD, VK_OEM_PLUS, VK_RETURN, VK_SPACE,
};

/// Key identity of the submit key
pub const ENTER: &str = "Enter";

/// Everything needed to synthesize one character
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyMeta {
    /// Physical key identifier, empty when unknown
    pub code: String,
    /// Unmodified key identity
    pub base_key: String,
    /// Literal text inserted by the key, empty for non-printable keys
    pub text: String,
    /// Whether Shift must be held
    pub requires_shift: bool,
    /// Whether the key inserts text
    pub printable: bool,
    /// Legacy virtual key code, when the dialect carries them
    pub legacy_key_code: Option<u16>,
}

/// Whether the target expects legacy numeric key codes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    /// Physical key identifiers plus legacy virtual key codes
    #[default]
    Legacy,
    /// Physical key identifiers only
    Standard,
}

struct Punct {
    ch: char,
    code: &'static str,
    base: char,
    shift: bool,
    vk: u16,
}

const fn punct(ch: char, code: &'static str, base: char, shift: bool, vk: u16) -> Punct {
    Punct {
        ch,
        code,
        base,
        shift,
        vk,
    }
}

/// Punctuation and symbols reachable on a US layout
const PUNCTUATION: &[Punct] = &[
    punct('\'', "Quote", '\'', false, VK_OEM_7),
    punct('"', "Quote", '\'', true, VK_OEM_7),
    punct('[', "BracketLeft", '[', false, VK_OEM_4),
    punct('{', "BracketLeft", '[', true, VK_OEM_4),
    punct(']', "BracketRight", ']', false, VK_OEM_6),
    punct('}', "BracketRight", ']', true, VK_OEM_6),
    punct('\\', "Backslash", '\\', false, VK_OEM_5),
    punct('|', "Backslash", '\\', true, VK_OEM_5),
    punct(';', "Semicolon", ';', false, VK_OEM_1),
    punct(':', "Semicolon", ';', true, VK_OEM_1),
    punct(',', "Comma", ',', false, VK_OEM_COMMA),
    punct('<', "Comma", ',', true, VK_OEM_COMMA),
    punct('.', "Period", '.', false, VK_OEM_PERIOD),
    punct('>', "Period", '.', true, VK_OEM_PERIOD),
    punct('/', "Slash", '/', false, VK_OEM_2),
    punct('?', "Slash", '/', true, VK_OEM_2),
    punct('`', "Backquote", '`', false, VK_OEM_3),
    punct('~', "Backquote", '`', true, VK_OEM_3),
    punct('-', "Minus", '-', false, VK_OEM_MINUS),
    punct('_', "Minus", '-', true, VK_OEM_MINUS),
    punct('=', "Equal", '=', false, VK_OEM_PLUS),
    punct('+', "Equal", '=', true, VK_OEM_PLUS),
    punct(' ', "Space", ' ', false, VK_SPACE),
    punct('!', "Digit1", '1', true, b'1' as u16),
    punct('@', "Digit2", '2', true, b'2' as u16),
    punct('#', "Digit3", '3', true, b'3' as u16),
    punct('$', "Digit4", '4', true, b'4' as u16),
    punct('%', "Digit5", '5', true, b'5' as u16),
    punct('^', "Digit6", '6', true, b'6' as u16),
    punct('&', "Digit7", '7', true, b'7' as u16),
    punct('*', "Digit8", '8', true, b'8' as u16),
    punct('(', "Digit9", '9', true, b'9' as u16),
    punct(')', "Digit0", '0', true, b'0' as u16),
];

/// Character to key metadata mapper
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyMapper {
    dialect: Dialect,
}

impl KeyMapper {
    /// Create a mapper for the given dialect
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Dialect in use
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Map a character to its key metadata. Total over all characters.
    pub fn map_char(&self, ch: char) -> KeyMeta {
        let mut meta = describe(ch);
        if self.dialect == Dialect::Standard {
            meta.legacy_key_code = None;
        }
        meta
    }
}

/// Map a character using the default dialect
pub fn map_char(ch: char) -> KeyMeta {
    KeyMapper::default().map_char(ch)
}

fn describe(ch: char) -> KeyMeta {
    if ch == '\n' || ch == '\r' {
        return KeyMeta {
            code: ENTER.to_string(),
            base_key: ENTER.to_string(),
            text: String::new(),
            requires_shift: false,
            printable: false,
            legacy_key_code: Some(VK_RETURN),
        };
    }

    if ch.is_ascii_alphabetic() {
        let upper = ch.to_ascii_uppercase();
        return KeyMeta {
            code: format!("Key{}", upper),
            base_key: ch.to_ascii_lowercase().to_string(),
            text: ch.to_string(),
            requires_shift: ch.is_ascii_uppercase(),
            printable: true,
            legacy_key_code: Some(upper as u16),
        };
    }

    if ch.is_ascii_digit() {
        return KeyMeta {
            code: format!("Digit{}", ch),
            base_key: ch.to_string(),
            text: ch.to_string(),
            requires_shift: false,
            printable: true,
            legacy_key_code: Some(ch as u16),
        };
    }

    if let Some(entry) = PUNCTUATION.iter().find(|entry| entry.ch == ch) {
        return KeyMeta {
            code: entry.code.to_string(),
            base_key: entry.base.to_string(),
            text: ch.to_string(),
            requires_shift: entry.shift,
            printable: true,
            legacy_key_code: Some(entry.vk),
        };
    }

    // No physical key; rely on the text payload alone
    KeyMeta {
        code: String::new(),
        base_key: ch.to_string(),
        text: ch.to_string(),
        requires_shift: false,
        printable: true,
        legacy_key_code: None,
    }
}

/// Number of entries in the punctuation table
pub fn punctuation_count() -> usize {
    PUNCTUATION.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_enter() {
        for ch in ['\n', '\r'] {
            let meta = map_char(ch);
            assert_eq!(meta.code, "Enter");
            assert_eq!(meta.base_key, "Enter");
            assert!(!meta.printable);
            assert!(!meta.requires_shift);
            assert!(meta.text.is_empty());
            assert_eq!(meta.legacy_key_code, Some(13));
        }
    }

    #[test]
    fn test_letters() {
        let meta = map_char('A');
        assert_eq!(meta.code, "KeyA");
        assert_eq!(meta.base_key, "a");
        assert_eq!(meta.text, "A");
        assert!(meta.requires_shift);
        assert_eq!(meta.legacy_key_code, Some(65));

        let meta = map_char('z');
        assert_eq!(meta.code, "KeyZ");
        assert_eq!(meta.base_key, "z");
        assert!(!meta.requires_shift);
        assert_eq!(meta.legacy_key_code, Some(90));
    }

    #[test]
    fn test_digits() {
        let meta = map_char('7');
        assert_eq!(meta.code, "Digit7");
        assert_eq!(meta.text, "7");
        assert!(!meta.requires_shift);
        assert_eq!(meta.legacy_key_code, Some(55));
    }

    #[test]
    fn test_shifted_digit_symbols() {
        let meta = map_char('!');
        assert_eq!(meta.code, "Digit1");
        assert_eq!(meta.base_key, "1");
        assert_eq!(meta.text, "!");
        assert!(meta.requires_shift);
        assert_eq!(meta.legacy_key_code, Some(49));

        assert_eq!(map_char('(').code, "Digit9");
        assert_eq!(map_char(')').code, "Digit0");
    }

    #[test]
    fn test_shared_bracket_key() {
        let open = map_char('[');
        let brace = map_char('{');
        assert_eq!(open.code, brace.code);
        assert_eq!(brace.base_key, "[");
        assert!(!open.requires_shift);
        assert!(brace.requires_shift);
        assert_eq!(brace.legacy_key_code, Some(219));
    }

    #[test]
    fn test_space() {
        let meta = map_char(' ');
        assert_eq!(meta.code, "Space");
        assert_eq!(meta.text, " ");
        assert_eq!(meta.legacy_key_code, Some(32));
    }

    #[test]
    fn test_unknown_character() {
        let meta = map_char('é');
        assert!(meta.code.is_empty());
        assert_eq!(meta.base_key, "é");
        assert_eq!(meta.text, "é");
        assert!(meta.printable);
        assert!(!meta.requires_shift);
        assert_eq!(meta.legacy_key_code, None);

        // Tab is not in the table either
        assert!(map_char('\t').code.is_empty());
    }

    #[test]
    fn test_standard_dialect_drops_legacy_codes() {
        let mapper = KeyMapper::new(Dialect::Standard);
        assert_eq!(mapper.map_char('a').legacy_key_code, None);
        assert_eq!(mapper.map_char('\n').legacy_key_code, None);
        assert_eq!(mapper.map_char('a').code, "KeyA");
    }

    #[test]
    fn test_table_size() {
        assert_eq!(punctuation_count(), 33);
    }

    proptest! {
        #[test]
        fn prop_total_and_text_round_trips(ch in any::<char>()) {
            let meta = map_char(ch);
            if meta.printable {
                prop_assert_eq!(meta.text, ch.to_string());
            } else {
                prop_assert!(!meta.requires_shift);
                prop_assert!(meta.text.is_empty());
            }
        }

        #[test]
        fn prop_shifted_keys_share_code_with_base(ch in "[!-~]") {
            let ch = ch.chars().next().unwrap();
            let meta = map_char(ch);
            if meta.requires_shift {
                let base = map_char(meta.base_key.chars().next().unwrap());
                prop_assert_eq!(&base.code, &meta.code);
                prop_assert!(!base.requires_shift);
                prop_assert_eq!(base.legacy_key_code, meta.legacy_key_code);
            }
        }
    }
}

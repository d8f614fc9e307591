//! Key Event Payloads
//!
//! One [`KeyEvent`] is one `Input.dispatchKeyEvent` command. The struct
//! serializes directly into the command's parameter object.

use enumflags2::{bitflags, BitFlags};
use serde::{Deserialize, Serialize, Serializer};

/// Modifier bits as understood by the DevTools input domain
#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    /// Alt / Option
    Alt = 0b0001,
    /// Control
    Ctrl = 0b0010,
    /// Meta / Command / Super
    Meta = 0b0100,
    /// Shift
    Shift = 0b1000,
}

/// Kind of dispatched key event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyEventType {
    /// Key pressed
    KeyDown,
    /// Key released
    KeyUp,
    /// Literal text insertion
    Char,
}

/// Key location for keys that exist on both sides of the keyboard
pub const LOCATION_LEFT: u8 = 1;

/// A single input event ready to send to the target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyEvent {
    /// Event kind
    #[serde(rename = "type")]
    pub kind: KeyEventType,

    /// Active modifiers
    #[serde(
        serialize_with = "serialize_modifiers",
        skip_serializing_if = "no_modifiers"
    )]
    pub modifiers: BitFlags<Modifier>,

    /// Key identity (`"a"`, `"Enter"`, `"Shift"`)
    pub key: String,

    /// Physical key identifier (`"KeyA"`, `"ShiftLeft"`)
    #[serde(skip_serializing_if = "String::is_empty")]
    pub code: String,

    /// Inserted text, only on [`KeyEventType::Char`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Legacy virtual key code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub windows_virtual_key_code: Option<u16>,

    /// Legacy native key code, mirrors the virtual key code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native_virtual_key_code: Option<u16>,

    /// Left/right location for modifier keys
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<u8>,
}

fn no_modifiers(modifiers: &BitFlags<Modifier>) -> bool {
    modifiers.is_empty()
}

fn serialize_modifiers<S: Serializer>(
    modifiers: &BitFlags<Modifier>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_u8(modifiers.bits())
}

impl KeyEvent {
    /// Create a key event with no text payload
    pub fn new(
        kind: KeyEventType,
        key: impl Into<String>,
        code: impl Into<String>,
        modifiers: BitFlags<Modifier>,
    ) -> Self {
        Self {
            kind,
            modifiers,
            key: key.into(),
            code: code.into(),
            text: None,
            windows_virtual_key_code: None,
            native_virtual_key_code: None,
            location: None,
        }
    }

    /// Attach a legacy key code
    pub fn with_legacy_code(mut self, code: Option<u16>) -> Self {
        self.windows_virtual_key_code = code;
        self.native_virtual_key_code = code;
        self
    }

    /// Mark the key as the left-hand variant
    pub fn on_left(mut self) -> Self {
        self.location = Some(LOCATION_LEFT);
        self
    }

    /// Attach inserted text
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Whether the shift bit is set
    pub fn has_shift(&self) -> bool {
        self.modifiers.contains(Modifier::Shift)
    }

    /// DevTools method this payload belongs to
    pub const METHOD: &'static str = "Input.dispatchKeyEvent";
}

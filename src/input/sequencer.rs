//! Event Sequencing
//!
//! Turns [`KeyMeta`] into the ordered events a physical keyboard would
//! generate, and pushes them through a [`Transport`] session.
//!
//! For one character:
//!
//! ```text
//! [Shift down]           only when requires_shift
//! key down  (base key)   Shift bit set when requires_shift
//! char      (text)       only when printable; this is what inserts content
//! key up    (base key)   mirrors key down
//! [Shift up]             modifiers cleared
//! ```
//!
//! Key identity and text payload travel in separate events because input
//! fields differ in which of the two they consume.
//!
//! The layout toggle is the Alt+Shift hotkey: Alt down, Shift down (both
//! bits), Shift up (Alt still held), Alt up.

use enumflags2::BitFlags;

use crate::error::Result;
use crate::input::event::{KeyEvent, KeyEventType, Modifier};
use crate::input::keymap::vk::{VK_MENU, VK_SHIFT};
use crate::input::keymap::{Dialect, KeyMeta};
use crate::transport::{Session, Transport};

fn shift_key(kind: KeyEventType, modifiers: BitFlags<Modifier>, dialect: Dialect) -> KeyEvent {
    KeyEvent::new(kind, "Shift", "ShiftLeft", modifiers)
        .with_legacy_code(legacy(dialect, VK_SHIFT))
        .on_left()
}

fn alt_key(kind: KeyEventType, modifiers: BitFlags<Modifier>, dialect: Dialect) -> KeyEvent {
    KeyEvent::new(kind, "Alt", "AltLeft", modifiers)
        .with_legacy_code(legacy(dialect, VK_MENU))
        .on_left()
}

fn legacy(dialect: Dialect, code: u16) -> Option<u16> {
    match dialect {
        Dialect::Legacy => Some(code),
        Dialect::Standard => None,
    }
}

/// Events for one character, in dispatch order
///
/// The legacy key code of the character comes from `meta`; `dialect` only
/// governs the codes attached to the Shift key itself.
pub fn key_events(meta: &KeyMeta, dialect: Dialect) -> Vec<KeyEvent> {
    let mut events = Vec::with_capacity(5);
    let modifiers = if meta.requires_shift {
        BitFlags::from(Modifier::Shift)
    } else {
        BitFlags::empty()
    };

    if meta.requires_shift {
        events.push(shift_key(KeyEventType::KeyDown, modifiers, dialect));
    }

    events.push(
        KeyEvent::new(KeyEventType::KeyDown, &meta.base_key, &meta.code, modifiers)
            .with_legacy_code(meta.legacy_key_code),
    );

    if meta.printable && !meta.text.is_empty() {
        events.push(
            KeyEvent::new(KeyEventType::Char, &meta.text, &meta.code, modifiers)
                .with_text(&meta.text),
        );
    }

    events.push(
        KeyEvent::new(KeyEventType::KeyUp, &meta.base_key, &meta.code, modifiers)
            .with_legacy_code(meta.legacy_key_code),
    );

    if meta.requires_shift {
        events.push(shift_key(KeyEventType::KeyUp, BitFlags::empty(), dialect));
    }

    events
}

/// The four-event Alt+Shift layout switch
pub fn layout_toggle_events(dialect: Dialect) -> [KeyEvent; 4] {
    let alt = BitFlags::from(Modifier::Alt);
    [
        alt_key(KeyEventType::KeyDown, alt, dialect),
        shift_key(KeyEventType::KeyDown, Modifier::Alt | Modifier::Shift, dialect),
        shift_key(KeyEventType::KeyUp, alt, dialect),
        alt_key(KeyEventType::KeyUp, BitFlags::empty(), dialect),
    ]
}

/// Emit the events for one character
///
/// # Errors
///
/// Stops at the first transport failure and returns it; events already
/// dispatched are not retracted.
pub async fn emit(
    transport: &dyn Transport,
    session: &Session,
    meta: &KeyMeta,
    dialect: Dialect,
) -> Result<()> {
    for event in key_events(meta, dialect) {
        transport.send(session, &event).await?;
    }
    Ok(())
}

/// Emit the layout-switch hotkey
pub async fn emit_layout_toggle(
    transport: &dyn Transport,
    session: &Session,
    dialect: Dialect,
) -> Result<()> {
    for event in layout_toggle_events(dialect) {
        transport.send(session, &event).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::keymap::map_char;
    use crate::transport::{MemoryTransport, TargetId};

    fn kinds(events: &[KeyEvent]) -> Vec<KeyEventType> {
        events.iter().map(|e| e.kind).collect()
    }

    #[test]
    fn test_plain_letter() {
        let events = key_events(&map_char('b'), Dialect::Legacy);

        assert_eq!(
            kinds(&events),
            vec![KeyEventType::KeyDown, KeyEventType::Char, KeyEventType::KeyUp]
        );
        assert!(events.iter().all(|e| e.modifiers.is_empty()));
        assert_eq!(events[0].key, "b");
        assert_eq!(events[0].code, "KeyB");
        assert_eq!(events[1].text.as_deref(), Some("b"));
        assert_eq!(events[2].windows_virtual_key_code, Some(66));
    }

    #[test]
    fn test_shift_bracketing() {
        let events = key_events(&map_char('!'), Dialect::Legacy);

        assert_eq!(events.len(), 5);
        assert_eq!(events[0].key, "Shift");
        assert_eq!(events[0].code, "ShiftLeft");
        assert_eq!(events[0].kind, KeyEventType::KeyDown);
        assert!(events[0].has_shift());

        assert_eq!(events[1].key, "1");
        assert_eq!(events[1].code, "Digit1");
        assert!(events[1].has_shift());

        assert_eq!(events[2].kind, KeyEventType::Char);
        assert_eq!(events[2].text.as_deref(), Some("!"));

        assert_eq!(events[3].kind, KeyEventType::KeyUp);
        assert!(events[3].has_shift());

        assert_eq!(events[4].key, "Shift");
        assert_eq!(events[4].kind, KeyEventType::KeyUp);
        assert!(events[4].modifiers.is_empty());
    }

    #[test]
    fn test_enter_has_no_char_event() {
        let events = key_events(&map_char('\n'), Dialect::Legacy);

        assert_eq!(kinds(&events), vec![KeyEventType::KeyDown, KeyEventType::KeyUp]);
        assert_eq!(events[0].key, "Enter");
        assert_eq!(events[0].windows_virtual_key_code, Some(13));
        assert!(events.iter().all(|e| e.text.is_none()));
    }

    #[test]
    fn test_unknown_character_still_inserts_text() {
        let events = key_events(&map_char('ß'), Dialect::Legacy);

        assert_eq!(events.len(), 3);
        assert!(events[0].code.is_empty());
        assert_eq!(events[1].text.as_deref(), Some("ß"));
    }

    #[test]
    fn test_layout_toggle_modifiers() {
        let events = layout_toggle_events(Dialect::Legacy);
        let bits: Vec<u8> = events.iter().map(|e| e.modifiers.bits()).collect();
        assert_eq!(bits, vec![1, 9, 1, 0]);

        assert_eq!(events[0].code, "AltLeft");
        assert_eq!(events[1].code, "ShiftLeft");
        assert_eq!(events[2].kind, KeyEventType::KeyUp);
        assert_eq!(events[3].code, "AltLeft");
        assert_eq!(events[0].windows_virtual_key_code, Some(18));
    }

    #[test]
    fn test_standard_dialect_shift_has_no_legacy_code() {
        let events = layout_toggle_events(Dialect::Standard);
        assert!(events.iter().all(|e| e.windows_virtual_key_code.is_none()));
    }

    #[tokio::test]
    async fn test_emit_through_transport() {
        let transport = MemoryTransport::new();
        let session = transport.attach(&TargetId::new("tab")).await.unwrap();

        emit(&transport, &session, &map_char('A'), Dialect::Legacy)
            .await
            .unwrap();
        emit_layout_toggle(&transport, &session, Dialect::Legacy)
            .await
            .unwrap();

        assert_eq!(transport.events().len(), 5 + 4);
        assert_eq!(transport.typed_text(), "A");
    }

    #[tokio::test]
    async fn test_emit_stops_at_first_failure() {
        let transport = MemoryTransport::new();
        transport.fail_send_at(Some(2));
        let session = transport.attach(&TargetId::new("tab")).await.unwrap();

        let result = emit(&transport, &session, &map_char('a'), Dialect::Legacy).await;
        assert!(result.is_err());
        assert_eq!(transport.events().len(), 1);
    }
}

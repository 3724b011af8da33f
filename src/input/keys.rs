#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Enter,
    Char(char),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyPress {
    pub key: Key,
    pub shift: bool,
}

impl KeyPress {
    pub fn new(key: Key, shift: bool) -> Self {
        Self { key, shift }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyAction {
    Submit,
    InsertNewline,
    Passthrough,
}

/// Enter submits, shift+enter inserts a newline, anything else is left
/// to the editor.
pub fn key_action(press: KeyPress) -> KeyAction {
    match press {
        KeyPress {
            key: Key::Enter,
            shift: false,
        } => KeyAction::Submit,
        KeyPress {
            key: Key::Enter,
            shift: true,
        } => KeyAction::InsertNewline,
        _ => KeyAction::Passthrough,
    }
}

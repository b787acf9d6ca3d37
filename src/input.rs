// Copyright 2025 Dustin McAfee
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Input event translation: platform keys to X11 keysyms, pointer buttons
//! to the RFB button mask.

/// A platform-independent key identity, as produced by the host's GUI
/// toolkit. Named variants cover the non-printable keys the fixed keysym
/// table knows about; everything else travels as the first Unicode code
/// point of the text the key produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Backspace,
    Tab,
    Return,
    Insert,
    Delete,
    Home,
    End,
    PageUp,
    PageDown,
    Left,
    Up,
    Right,
    Down,
    F1,
    F2,
    F3,
    F4,
    F5,
    F6,
    F7,
    F8,
    F9,
    F10,
    F11,
    F12,
    Shift,
    Control,
    Meta,
    Alt,
    /// A printable key, identified by the character it produced.
    Char(char),
}

/// The fixed key mapping table.
const KEYSYM_TABLE: &[(Key, u32)] = &[
    (Key::Backspace, 0xFF08),
    (Key::Tab, 0xFF09),
    (Key::Return, 0xFF0D),
    (Key::Insert, 0xFF63),
    (Key::Delete, 0xFFFF),
    (Key::Home, 0xFF50),
    (Key::End, 0xFF57),
    (Key::PageUp, 0xFF55),
    (Key::PageDown, 0xFF56),
    (Key::Left, 0xFF51),
    (Key::Up, 0xFF52),
    (Key::Right, 0xFF53),
    (Key::Down, 0xFF54),
    (Key::F1, 0xFFBE),
    (Key::F2, 0xFFBF),
    (Key::F3, 0xFFC0),
    (Key::F4, 0xFFC1),
    (Key::F5, 0xFFC2),
    (Key::F6, 0xFFC3),
    (Key::F7, 0xFFC4),
    (Key::F8, 0xFFC5),
    (Key::F9, 0xFFC6),
    (Key::F10, 0xFFC7),
    (Key::F11, 0xFFC8),
    (Key::F12, 0xFFC9),
    (Key::Shift, 0xFFE1),
    (Key::Control, 0xFFE3),
    (Key::Meta, 0xFFE7),
    (Key::Alt, 0xFFE9),
];

/// Maps a key to the X11 keysym the RFB `KeyEvent` message carries.
pub fn keysym(key: Key) -> u32 {
    if let Key::Char(c) = key {
        return c as u32;
    }
    KEYSYM_TABLE
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, sym)| *sym)
        .unwrap_or(0)
}

/// A pointer button, by its bit in the RFB button mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Left,
    Middle,
    Right,
}

impl PointerButton {
    fn bit(self) -> u8 {
        match self {
            Self::Left => 0x01,
            Self::Middle => 0x02,
            Self::Right => 0x04,
        }
    }
}

/// Tracks which pointer buttons are currently held.
///
/// The RFB `PointerEvent` carries the full mask of held buttons on every
/// move, press and release; this keeps that mask so hosts only report edges.
#[derive(Debug, Clone, Copy, Default)]
pub struct PointerState {
    buttons: u8,
}

impl PointerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a press and returns the updated mask.
    pub fn press(&mut self, button: PointerButton) -> u8 {
        self.buttons |= button.bit();
        self.buttons
    }

    /// Records a release and returns the updated mask.
    pub fn release(&mut self, button: PointerButton) -> u8 {
        self.buttons &= !button.bit();
        self.buttons
    }

    /// The mask of currently held buttons.
    pub fn mask(&self) -> u8 {
        self.buttons
    }
}

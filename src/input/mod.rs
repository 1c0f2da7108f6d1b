//! Input encoding: key, mouse, focus, and paste events translated into
//! the byte sequences the application expects under the live mode set.
//! Pure functions over [`Modes`]; nothing here touches the grid.

use bitflags::bitflags;

use crate::terminal::modes::Modes;

bitflags! {
    /// Keyboard modifiers, numbered as xterm encodes them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Modifiers: u8 {
        const SHIFT   = 1;
        const ALT     = 2;
        const CONTROL = 4;
        const META    = 8;
    }
}

impl Modifiers {
    /// The xterm modifier parameter: bits + 1, so Shift alone is 2.
    fn param(self) -> u16 {
        self.bits() as u16 + 1
    }
}

/// Non-character keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Up,
    Down,
    Right,
    Left,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    Backspace,
    Tab,
    Enter,
    Escape,
    F(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    WheelUp,
    WheelDown,
    /// Motion with no button held.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseEventKind {
    Press,
    Release,
    Motion,
}

/// A mouse event in 1-based cell coordinates, as they appear on the wire.
#[derive(Debug, Clone, Copy)]
pub struct MouseEvent {
    pub kind: MouseEventKind,
    pub button: MouseButton,
    pub mods: Modifiers,
    pub column: u16,
    pub line: u16,
}

/// Stateless encoder for host input events.
pub struct InputEncoder;

impl InputEncoder {
    /// Encode a non-character key press.
    pub fn encode_key(key: Key, mods: Modifiers, modes: &Modes) -> Vec<u8> {
        let app_cursor = modes.cursor_keys_application;
        match key {
            Key::Up => cursor_key(b'A', mods, app_cursor),
            Key::Down => cursor_key(b'B', mods, app_cursor),
            Key::Right => cursor_key(b'C', mods, app_cursor),
            Key::Left => cursor_key(b'D', mods, app_cursor),
            Key::Home => cursor_key(b'H', mods, app_cursor),
            Key::End => cursor_key(b'F', mods, app_cursor),
            Key::Insert => tilde_key(2, mods),
            Key::Delete => tilde_key(3, mods),
            Key::PageUp => tilde_key(5, mods),
            Key::PageDown => tilde_key(6, mods),
            Key::Backspace => {
                if mods.contains(Modifiers::ALT) {
                    vec![0x1b, 0x7f]
                } else {
                    vec![0x7f]
                }
            }
            Key::Tab => {
                if mods.contains(Modifiers::SHIFT) {
                    b"\x1b[Z".to_vec()
                } else {
                    vec![b'\t']
                }
            }
            Key::Enter => vec![b'\r'],
            Key::Escape => vec![0x1b],
            Key::F(n @ 1..=4) => {
                let final_byte = b'P' + (n - 1);
                if mods.is_empty() {
                    vec![0x1b, b'O', final_byte]
                } else {
                    format!("\x1b[1;{}{}", mods.param(), final_byte as char).into_bytes()
                }
            }
            Key::F(n) => {
                let code = match n {
                    5 => 15,
                    6 => 17,
                    7 => 18,
                    8 => 19,
                    9 => 20,
                    10 => 21,
                    11 => 23,
                    12 => 24,
                    _ => return Vec::new(),
                };
                tilde_key(code, mods)
            }
        }
    }

    /// Encode a character keypress with modifiers.
    pub fn encode_char(c: char, mods: Modifiers, modes: &Modes) -> Vec<u8> {
        // modifyOtherKeys level 2 reports every modified key unambiguously.
        if modes.modify_other_keys >= 2 && !mods.is_empty() {
            return format!("\x1b[27;{};{}~", mods.param(), c as u32).into_bytes();
        }

        let mut out = Vec::new();
        if mods.contains(Modifiers::ALT) {
            out.push(0x1b);
        }
        if mods.contains(Modifiers::CONTROL) {
            match control_byte(c) {
                Some(byte) => out.push(byte),
                None if modes.modify_other_keys >= 1 => {
                    // Level 1 covers combinations with no C0 mapping.
                    return format!("\x1b[27;{};{}~", mods.param(), c as u32).into_bytes();
                }
                None => {
                    let mut buf = [0u8; 4];
                    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
        } else {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
        out
    }

    /// Encode a mouse event, or nothing when the active protocol does not
    /// report it.
    pub fn encode_mouse(event: &MouseEvent, modes: &Modes) -> Vec<u8> {
        if !modes.mouse_reporting() {
            // Wheel on the alternate screen can fall back to arrow keys.
            if modes.alt_screen && modes.alternate_scroll {
                let key = match event.button {
                    MouseButton::WheelUp => Some(Key::Up),
                    MouseButton::WheelDown => Some(Key::Down),
                    _ => None,
                };
                if let (Some(key), MouseEventKind::Press) = (key, event.kind) {
                    let mut out = Vec::new();
                    for _ in 0..3 {
                        out.extend(Self::encode_key(key, Modifiers::empty(), modes));
                    }
                    return out;
                }
            }
            return Vec::new();
        }

        // Protocol gating: which transitions are reported.
        match event.kind {
            MouseEventKind::Press => {}
            MouseEventKind::Release => {
                if modes.x10_mouse && !modes.mouse_click && !modes.mouse_motion && !modes.mouse_all_motion {
                    return Vec::new();
                }
            }
            MouseEventKind::Motion => {
                let held = !matches!(
                    event.button,
                    MouseButton::None | MouseButton::WheelUp | MouseButton::WheelDown
                );
                let wanted = modes.mouse_all_motion || (modes.mouse_motion && held);
                if !wanted {
                    return Vec::new();
                }
            }
        }

        let mut code = match event.button {
            MouseButton::Left => 0,
            MouseButton::Middle => 1,
            MouseButton::Right => 2,
            MouseButton::None => 3,
            MouseButton::WheelUp => 64,
            MouseButton::WheelDown => 65,
        };
        if event.kind == MouseEventKind::Motion {
            code += 32;
        }
        // X10 protocol reports no modifiers.
        if !modes.x10_mouse || modes.mouse_click || modes.mouse_motion || modes.mouse_all_motion {
            if event.mods.contains(Modifiers::SHIFT) {
                code += 4;
            }
            if event.mods.contains(Modifiers::ALT) {
                code += 8;
            }
            if event.mods.contains(Modifiers::CONTROL) {
                code += 16;
            }
        }

        if modes.sgr_mouse {
            let suffix = if event.kind == MouseEventKind::Release {
                'm'
            } else {
                'M'
            };
            return format!(
                "\x1b[<{};{};{}{}",
                code, event.column, event.line, suffix
            )
            .into_bytes();
        }

        if modes.urxvt_mouse {
            let code = if event.kind == MouseEventKind::Release {
                3 + 32
            } else {
                code + 32
            };
            return format!("\x1b[{};{};{}M", code, event.column, event.line).into_bytes();
        }

        // Legacy encodings replace the button with 3 on release.
        let code = if event.kind == MouseEventKind::Release {
            code & !0b11 | 3
        } else {
            code
        };

        let mut out = b"\x1b[M".to_vec();
        out.push(32 + code as u8);
        if modes.utf8_mouse {
            push_utf8_coord(&mut out, event.column);
            push_utf8_coord(&mut out, event.line);
        } else {
            out.push(32u8.saturating_add(event.column.min(223) as u8));
            out.push(32u8.saturating_add(event.line.min(223) as u8));
        }
        out
    }

    /// Encode a focus transition (mode 1004).
    pub fn encode_focus(gained: bool, modes: &Modes) -> Vec<u8> {
        if !modes.focus_events {
            return Vec::new();
        }
        if gained {
            b"\x1b[I".to_vec()
        } else {
            b"\x1b[O".to_vec()
        }
    }

    /// Encode pasted text, bracketing it when mode 2004 is set.
    pub fn encode_paste(text: &str, modes: &Modes) -> Vec<u8> {
        if modes.bracketed_paste {
            // The paste body must not be able to fake the closing guard.
            let sanitized = text.replace("\x1b[201~", "");
            let mut out = b"\x1b[200~".to_vec();
            out.extend_from_slice(sanitized.as_bytes());
            out.extend_from_slice(b"\x1b[201~");
            out
        } else {
            text.replace('\n', "\r").into_bytes()
        }
    }
}

fn cursor_key(final_byte: u8, mods: Modifiers, app_cursor: bool) -> Vec<u8> {
    if mods.is_empty() {
        if app_cursor {
            vec![0x1b, b'O', final_byte]
        } else {
            vec![0x1b, b'[', final_byte]
        }
    } else {
        format!("\x1b[1;{}{}", mods.param(), final_byte as char).into_bytes()
    }
}

fn tilde_key(code: u16, mods: Modifiers) -> Vec<u8> {
    if mods.is_empty() {
        format!("\x1b[{}~", code).into_bytes()
    } else {
        format!("\x1b[{};{}~", code, mods.param()).into_bytes()
    }
}

/// The C0 byte for a Ctrl-modified character, when one exists.
fn control_byte(c: char) -> Option<u8> {
    match c {
        'a'..='z' => Some(c as u8 - b'a' + 1),
        'A'..='Z' => Some(c as u8 - b'A' + 1),
        ' ' | '@' => Some(0),
        '[' => Some(0x1b),
        '\\' => Some(0x1c),
        ']' => Some(0x1d),
        '^' => Some(0x1e),
        '_' | '/' => Some(0x1f),
        '?' => Some(0x7f),
        _ => None,
    }
}

/// Mouse 1005 coordinate: 32 + value as a UTF-8 encoded codepoint.
fn push_utf8_coord(out: &mut Vec<u8>, coord: u16) {
    let value = 32 + coord.min(2015) as u32;
    match char::from_u32(value) {
        Some(c) => {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        }
        None => out.push(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modes() -> Modes {
        Modes::default()
    }

    #[test]
    fn sgr_mouse_press_and_release_are_exact() {
        let mut modes = modes();
        modes.sgr_mouse = true;
        modes.mouse_all_motion = true;

        let press = MouseEvent {
            kind: MouseEventKind::Press,
            button: MouseButton::Left,
            mods: Modifiers::empty(),
            column: 12,
            line: 4,
        };
        assert_eq!(
            InputEncoder::encode_mouse(&press, &modes),
            b"\x1b[<0;12;4M".to_vec()
        );

        let release = MouseEvent {
            kind: MouseEventKind::Release,
            ..press
        };
        assert_eq!(
            InputEncoder::encode_mouse(&release, &modes),
            b"\x1b[<0;12;4m".to_vec()
        );
    }

    #[test]
    fn motion_requires_matching_protocol() {
        let mut modes = modes();
        modes.mouse_click = true;
        let hover = MouseEvent {
            kind: MouseEventKind::Motion,
            button: MouseButton::None,
            mods: Modifiers::empty(),
            column: 1,
            line: 1,
        };
        assert!(InputEncoder::encode_mouse(&hover, &modes).is_empty());

        let drag = MouseEvent {
            button: MouseButton::Left,
            ..hover
        };
        assert!(InputEncoder::encode_mouse(&drag, &modes).is_empty());
        modes.mouse_motion = true;
        assert!(!InputEncoder::encode_mouse(&drag, &modes).is_empty());
        // Hover still needs any-motion.
        assert!(InputEncoder::encode_mouse(&hover, &modes).is_empty());
        modes.mouse_all_motion = true;
        assert!(!InputEncoder::encode_mouse(&hover, &modes).is_empty());
    }

    #[test]
    fn legacy_encoding_offsets_by_32() {
        let mut modes = modes();
        modes.mouse_click = true;
        let press = MouseEvent {
            kind: MouseEventKind::Press,
            button: MouseButton::Left,
            mods: Modifiers::empty(),
            column: 1,
            line: 1,
        };
        assert_eq!(
            InputEncoder::encode_mouse(&press, &modes),
            vec![0x1b, b'[', b'M', 32, 33, 33]
        );
    }

    #[test]
    fn x10_reports_press_only_without_modifiers() {
        let mut modes = modes();
        modes.x10_mouse = true;
        let press = MouseEvent {
            kind: MouseEventKind::Press,
            button: MouseButton::Left,
            mods: Modifiers::CONTROL,
            column: 2,
            line: 3,
        };
        assert_eq!(
            InputEncoder::encode_mouse(&press, &modes),
            vec![0x1b, b'[', b'M', 32, 34, 35]
        );
        let release = MouseEvent {
            kind: MouseEventKind::Release,
            ..press
        };
        assert!(InputEncoder::encode_mouse(&release, &modes).is_empty());
    }

    #[test]
    fn urxvt_encoding() {
        let mut modes = modes();
        modes.mouse_click = true;
        modes.urxvt_mouse = true;
        let press = MouseEvent {
            kind: MouseEventKind::Press,
            button: MouseButton::Right,
            mods: Modifiers::empty(),
            column: 100,
            line: 50,
        };
        assert_eq!(
            InputEncoder::encode_mouse(&press, &modes),
            b"\x1b[34;100;50M".to_vec()
        );
    }

    #[test]
    fn arrows_respect_application_cursor_mode() {
        let mut modes = modes();
        assert_eq!(
            InputEncoder::encode_key(Key::Up, Modifiers::empty(), &modes),
            b"\x1b[A".to_vec()
        );
        modes.cursor_keys_application = true;
        assert_eq!(
            InputEncoder::encode_key(Key::Up, Modifiers::empty(), &modes),
            b"\x1bOA".to_vec()
        );
        // Modified arrows always use the CSI form.
        assert_eq!(
            InputEncoder::encode_key(Key::Up, Modifiers::CONTROL, &modes),
            b"\x1b[1;5A".to_vec()
        );
    }

    #[test]
    fn function_and_editing_keys() {
        let modes = modes();
        assert_eq!(
            InputEncoder::encode_key(Key::F(1), Modifiers::empty(), &modes),
            b"\x1bOP".to_vec()
        );
        assert_eq!(
            InputEncoder::encode_key(Key::F(5), Modifiers::empty(), &modes),
            b"\x1b[15~".to_vec()
        );
        assert_eq!(
            InputEncoder::encode_key(Key::Delete, Modifiers::SHIFT, &modes),
            b"\x1b[3;2~".to_vec()
        );
        assert_eq!(
            InputEncoder::encode_key(Key::Tab, Modifiers::SHIFT, &modes),
            b"\x1b[Z".to_vec()
        );
    }

    #[test]
    fn control_characters() {
        let modes = modes();
        assert_eq!(
            InputEncoder::encode_char('c', Modifiers::CONTROL, &modes),
            vec![0x03]
        );
        assert_eq!(
            InputEncoder::encode_char('a', Modifiers::ALT, &modes),
            vec![0x1b, b'a']
        );
    }

    #[test]
    fn modify_other_keys_level_two() {
        let mut modes = modes();
        modes.modify_other_keys = 2;
        assert_eq!(
            InputEncoder::encode_char('c', Modifiers::CONTROL, &modes),
            b"\x1b[27;5;99~".to_vec()
        );
        // Unmodified characters stay plain.
        assert_eq!(
            InputEncoder::encode_char('c', Modifiers::empty(), &modes),
            b"c".to_vec()
        );
    }

    #[test]
    fn bracketed_paste_wraps_and_sanitizes() {
        let mut modes = modes();
        assert_eq!(
            InputEncoder::encode_paste("line1\nline2", &modes),
            b"line1\rline2".to_vec()
        );
        modes.bracketed_paste = true;
        assert_eq!(
            InputEncoder::encode_paste("hi\x1b[201~there", &modes),
            b"\x1b[200~hithere\x1b[201~".to_vec()
        );
    }

    #[test]
    fn focus_reports_when_enabled() {
        let mut modes = modes();
        assert!(InputEncoder::encode_focus(true, &modes).is_empty());
        modes.focus_events = true;
        assert_eq!(InputEncoder::encode_focus(true, &modes), b"\x1b[I".to_vec());
        assert_eq!(InputEncoder::encode_focus(false, &modes), b"\x1b[O".to_vec());
    }

    #[test]
    fn alternate_scroll_sends_arrows_on_alt_screen() {
        let mut modes = modes();
        modes.alt_screen = true;
        modes.alternate_scroll = true;
        let wheel = MouseEvent {
            kind: MouseEventKind::Press,
            button: MouseButton::WheelUp,
            mods: Modifiers::empty(),
            column: 1,
            line: 1,
        };
        assert_eq!(
            InputEncoder::encode_mouse(&wheel, &modes),
            b"\x1b[A\x1b[A\x1b[A".to_vec()
        );
    }
}

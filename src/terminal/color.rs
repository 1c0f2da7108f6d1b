use serde::Serialize;

/// Terminal color representation supporting 16-color, 256-color, and truecolor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Color {
    #[default]
    Default,
    Indexed(u8),
    Rgb(u8, u8, u8),
}

/// Serializable color for transport to a renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum SerializableColor {
    Default,
    Indexed { index: u8 },
    Rgb { r: u8, g: u8, b: u8 },
}

impl From<Color> for SerializableColor {
    fn from(c: Color) -> Self {
        match c {
            Color::Default => SerializableColor::Default,
            Color::Indexed(i) => SerializableColor::Indexed { index: i },
            Color::Rgb(r, g, b) => SerializableColor::Rgb { r, g, b },
        }
    }
}

/// Convert a 256-color index to its default RGB value (xterm palette).
/// The first 16 are the standard ANSI colors, 16-231 a 6x6x6 color cube,
/// 232-255 a grayscale ramp. OSC 4 overrides are resolved by the screen
/// before falling back here.
pub fn indexed_to_rgb(index: u8) -> (u8, u8, u8) {
    match index {
        0 => (0x00, 0x00, 0x00),  // black
        1 => (0xcd, 0x00, 0x00),  // red
        2 => (0x00, 0xcd, 0x00),  // green
        3 => (0xcd, 0xcd, 0x00),  // yellow
        4 => (0x00, 0x00, 0xee),  // blue
        5 => (0xcd, 0x00, 0xcd),  // magenta
        6 => (0x00, 0xcd, 0xcd),  // cyan
        7 => (0xe5, 0xe5, 0xe5),  // white
        8 => (0x7f, 0x7f, 0x7f),  // bright black
        9 => (0xff, 0x00, 0x00),  // bright red
        10 => (0x00, 0xff, 0x00), // bright green
        11 => (0xff, 0xff, 0x00), // bright yellow
        12 => (0x5c, 0x5c, 0xff), // bright blue
        13 => (0xff, 0x00, 0xff), // bright magenta
        14 => (0x00, 0xff, 0xff), // bright cyan
        15 => (0xff, 0xff, 0xff), // bright white
        // 6x6x6 color cube
        16..=231 => {
            let idx = index - 16;
            let r = idx / 36;
            let g = (idx % 36) / 6;
            let b = idx % 6;
            let to_val = |v: u8| if v == 0 { 0 } else { 55 + 40 * v };
            (to_val(r), to_val(g), to_val(b))
        }
        // Grayscale ramp
        232..=255 => {
            let v = 8 + 10 * (index - 232);
            (v, v, v)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_corners() {
        assert_eq!(indexed_to_rgb(16), (0, 0, 0));
        assert_eq!(indexed_to_rgb(231), (255, 255, 255));
    }

    #[test]
    fn grayscale_ramp_is_monotonic() {
        let mut last = 0;
        for i in 232..=255u8 {
            let (r, g, b) = indexed_to_rgb(i);
            assert_eq!(r, g);
            assert_eq!(g, b);
            assert!(r >= last);
            last = r;
        }
    }
}

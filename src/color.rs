//! Color parsing for accessor-provided color strings.
//!
//! Accepts `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa`, `rgb(..)`, `rgba(..)`,
//! decimal integers (`"16777215"`) and a table of common CSS names.

/// Linear RGB color with channels in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color { r: 0.0, g: 0.0, b: 0.0 };
    pub const WHITE: Color = Color { r: 1.0, g: 1.0, b: 1.0 };

    pub fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xff) as f32 / 255.0,
            g: ((hex >> 8) & 0xff) as f32 / 255.0,
            b: (hex & 0xff) as f32 / 255.0,
        }
    }

    pub fn to_hex(self) -> u32 {
        let c = |v: f32| ((v.clamp(0.0, 1.0) * 255.0).round() as u32) & 0xff;
        (c(self.r) << 16) | (c(self.g) << 8) | c(self.b)
    }

    pub fn to_array(self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}

const NAMED: &[(&str, u32)] = &[
    ("black", 0x000000),
    ("white", 0xffffff),
    ("red", 0xff0000),
    ("green", 0x008000),
    ("lime", 0x00ff00),
    ("blue", 0x0000ff),
    ("yellow", 0xffff00),
    ("orange", 0xffa500),
    ("purple", 0x800080),
    ("magenta", 0xff00ff),
    ("fuchsia", 0xff00ff),
    ("cyan", 0x00ffff),
    ("aqua", 0x00ffff),
    ("pink", 0xffc0cb),
    ("brown", 0xa52a2a),
    ("navy", 0x000080),
    ("teal", 0x008080),
    ("olive", 0x808000),
    ("maroon", 0x800000),
    ("silver", 0xc0c0c0),
    ("gray", 0x808080),
    ("grey", 0x808080),
    ("lightgray", 0xd3d3d3),
    ("lightgrey", 0xd3d3d3),
    ("darkgray", 0xa9a9a9),
    ("darkgrey", 0xa9a9a9),
    ("gold", 0xffd700),
    ("coral", 0xff7f50),
    ("salmon", 0xfa8072),
    ("skyblue", 0x87ceeb),
    ("lightskyblue", 0x87cefa),
    ("steelblue", 0x4682b4),
    ("dodgerblue", 0x1e90ff),
    ("royalblue", 0x4169e1),
    ("indigo", 0x4b0082),
    ("violet", 0xee82ee),
    ("crimson", 0xdc143c),
    ("khaki", 0xf0e68c),
    ("beige", 0xf5f5dc),
    ("ivory", 0xfffff0),
];

/// Parse a color string into a color and an alpha in [0, 1].
pub fn parse_color(input: &str) -> Option<(Color, f32)> {
    let s = input.trim().to_ascii_lowercase();
    if s.is_empty() {
        return None;
    }

    if let Some(hex) = s.strip_prefix('#') {
        return parse_hex(hex);
    }
    if let Some(args) = s.strip_prefix("rgba(").or_else(|| s.strip_prefix("rgb(")) {
        return parse_rgb_args(args.strip_suffix(')')?);
    }
    if s == "transparent" {
        return Some((Color::BLACK, 0.0));
    }
    if let Ok(n) = s.parse::<u32>() {
        return Some((Color::from_hex(n), 1.0));
    }

    NAMED
        .iter()
        .find(|(name, _)| *name == s)
        .map(|&(_, hex)| (Color::from_hex(hex), 1.0))
}

/// Like [`parse_color`], falling back to opaque black for unparseable input.
pub fn color_and_alpha(input: &str) -> (Color, f32) {
    parse_color(input).unwrap_or_else(|| {
        log::debug!("unrecognized color {:?}, using black", input);
        (Color::BLACK, 1.0)
    })
}

fn parse_hex(hex: &str) -> Option<(Color, f32)> {
    let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|v| v * 17);
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();

    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let (r, g, b, a) = match hex.len() {
        3 => (nibble(0)?, nibble(1)?, nibble(2)?, 255),
        4 => (nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?),
        6 => (byte(0)?, byte(2)?, byte(4)?, 255),
        8 => (byte(0)?, byte(2)?, byte(4)?, byte(6)?),
        _ => return None,
    };

    let rgb = ((r as u32) << 16) | ((g as u32) << 8) | b as u32;
    Some((Color::from_hex(rgb), a as f32 / 255.0))
}

fn parse_rgb_args(args: &str) -> Option<(Color, f32)> {
    let parts: Vec<&str> = args.split(',').map(str::trim).collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }

    let channel = |p: &str| -> Option<f32> {
        match p.strip_suffix('%') {
            Some(pct) => pct.parse::<f32>().ok().map(|v| v / 100.0),
            None => p.parse::<f32>().ok().map(|v| v / 255.0),
        }
        .map(|v| v.clamp(0.0, 1.0))
    };

    let color = Color {
        r: channel(parts[0])?,
        g: channel(parts[1])?,
        b: channel(parts[2])?,
    };
    let alpha = match parts.get(3) {
        Some(a) => a.parse::<f32>().ok()?.clamp(0.0, 1.0),
        None => 1.0,
    };
    Some((color, alpha))
}

use iced::Color;
use serde::{Deserialize, Serialize};

// ─── THEME VARIANTS ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThemeVariant {
    #[default]
    Default,
    Night,
    NightGreenBlack,
    Light,
    LightBlackWhite,
    LightGreenWhite,
}

impl ThemeVariant {
    pub const ALL: &[ThemeVariant] = &[
        ThemeVariant::Default,
        ThemeVariant::Night,
        ThemeVariant::NightGreenBlack,
        ThemeVariant::Light,
        ThemeVariant::LightBlackWhite,
        ThemeVariant::LightGreenWhite,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ThemeVariant::Default => "Default",
            ThemeVariant::Night => "Night Mode",
            ThemeVariant::NightGreenBlack => "Night Mode Green & Black",
            ThemeVariant::Light => "Light Mode",
            ThemeVariant::LightBlackWhite => "Light Mode Black & White",
            ThemeVariant::LightGreenWhite => "Light Mode Green & White",
        }
    }

    pub fn is_light(&self) -> bool {
        matches!(
            self,
            ThemeVariant::Light | ThemeVariant::LightBlackWhite | ThemeVariant::LightGreenWhite
        )
    }

    /// Built-in iced theme used for the stock widgets under this variant.
    pub fn iced_theme(&self) -> iced::Theme {
        if self.is_light() {
            iced::Theme::Light
        } else {
            iced::Theme::Dark
        }
    }
}

impl std::fmt::Display for ThemeVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ─── PALETTE ────────────────────────────────────────────────────

/// All semantic colors the app uses, derived from the theme variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Palette {
    pub bg: Color,
    pub panel_bg: Color,
    pub sidebar_bg: Color,
    pub border: Color,
    pub grid: Color,
    pub label: Color,
    pub text: Color,
    /// Power trace and selected buttons.
    pub accent: Color,
    /// Daily usage bars.
    pub bar: Color,
    /// Today's usage bar.
    pub today: Color,
    /// Status and error lines.
    pub warn: Color,
}

pub fn build_palette(theme: ThemeVariant) -> Palette {
    match theme {
        // ── Default (the dashboard's dark blue) ──
        ThemeVariant::Default => Palette {
            bg:         hex(0x1c, 0x22, 0x2b),
            panel_bg:   hex(0x23, 0x2b, 0x36),
            sidebar_bg: hex(0x16, 0x1b, 0x22),
            border:     hex(0x34, 0x3f, 0x4d),
            grid:       Color::from_rgba(1.0, 1.0, 1.0, 0.06),
            label:      hex(0x9a, 0xa7, 0xb8),
            text:       hex(0xe6, 0xec, 0xf2),
            accent:     hex(0x0b, 0x99, 0xd8),
            bar:        hex(0x0b, 0x99, 0xd8),
            today:      hex(0x06, 0x6d, 0x9b),
            warn:       hex(0xf0, 0xa0, 0x30),
        },
        // ── Night Mode ──
        ThemeVariant::Night => Palette {
            bg:         hex(0x00, 0x00, 0x00),
            panel_bg:   hex(0x12, 0x12, 0x12),
            sidebar_bg: hex(0x0a, 0x0a, 0x0a),
            border:     hex(0x2a, 0x2a, 0x2a),
            grid:       Color::from_rgba(1.0, 1.0, 1.0, 0.07),
            label:      hex(0xa0, 0xa0, 0xa0),
            text:       hex(0xff, 0xff, 0xff),
            accent:     hex(0xff, 0xff, 0xff),
            bar:        hex(0xd0, 0xd0, 0xd0),
            today:      hex(0x80, 0x80, 0x80),
            warn:       hex(0xff, 0xb0, 0x40),
        },
        // ── Night Mode Green & Black ──
        ThemeVariant::NightGreenBlack => Palette {
            bg:         hex(0x00, 0x00, 0x00),
            panel_bg:   hex(0x0d, 0x14, 0x0d),
            sidebar_bg: hex(0x05, 0x0a, 0x05),
            border:     hex(0x1e, 0x3a, 0x1e),
            grid:       Color::from_rgba(0.2, 1.0, 0.2, 0.07),
            label:      hex(0x6f, 0xbf, 0x6f),
            text:       hex(0x9c, 0xff, 0x9c),
            accent:     hex(0x2e, 0xe8, 0x2e),
            bar:        hex(0x2e, 0xc8, 0x2e),
            today:      hex(0x1a, 0x80, 0x1a),
            warn:       hex(0xe8, 0xd8, 0x2e),
        },
        // ── Light Mode ──
        ThemeVariant::Light => Palette {
            bg:         hex(0xf4, 0xf6, 0xf8),
            panel_bg:   hex(0xff, 0xff, 0xff),
            sidebar_bg: hex(0xe8, 0xec, 0xf0),
            border:     hex(0xcf, 0xd6, 0xde),
            grid:       Color::from_rgba(0.0, 0.0, 0.0, 0.06),
            label:      hex(0x5d, 0x68, 0x75),
            text:       hex(0x1f, 0x29, 0x33),
            accent:     hex(0x0b, 0x7f, 0xc0),
            bar:        hex(0x0b, 0x99, 0xd8),
            today:      hex(0x06, 0x5f, 0x8a),
            warn:       hex(0xc0, 0x5a, 0x00),
        },
        // ── Light Mode Black & White ──
        ThemeVariant::LightBlackWhite => Palette {
            bg:         hex(0xff, 0xff, 0xff),
            panel_bg:   hex(0xff, 0xff, 0xff),
            sidebar_bg: hex(0xf0, 0xf0, 0xf0),
            border:     hex(0xc8, 0xc8, 0xc8),
            grid:       Color::from_rgba(0.0, 0.0, 0.0, 0.07),
            label:      hex(0x55, 0x55, 0x55),
            text:       hex(0x00, 0x00, 0x00),
            accent:     hex(0x00, 0x00, 0x00),
            bar:        hex(0x40, 0x40, 0x40),
            today:      hex(0x90, 0x90, 0x90),
            warn:       hex(0xa0, 0x40, 0x00),
        },
        // ── Light Mode Green & White ──
        ThemeVariant::LightGreenWhite => Palette {
            bg:         hex(0xff, 0xff, 0xff),
            panel_bg:   hex(0xf5, 0xfb, 0xf5),
            sidebar_bg: hex(0xe6, 0xf4, 0xe6),
            border:     hex(0xbf, 0xdf, 0xbf),
            grid:       Color::from_rgba(0.0, 0.4, 0.0, 0.07),
            label:      hex(0x3f, 0x6f, 0x3f),
            text:       hex(0x10, 0x3a, 0x10),
            accent:     hex(0x1b, 0x8a, 0x2e),
            bar:        hex(0x2e, 0xa0, 0x40),
            today:      hex(0x15, 0x5e, 0x22),
            warn:       hex(0xb0, 0x60, 0x00),
        },
    }
}

const fn hex(r: u8, g: u8, b: u8) -> Color {
    Color::from_rgb(r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_variants_use_light_base() {
        for variant in ThemeVariant::ALL {
            let expected = if variant.is_light() { iced::Theme::Light } else { iced::Theme::Dark };
            assert_eq!(variant.iced_theme(), expected);
        }
    }

    #[test]
    fn test_palettes_are_distinct() {
        for (i, a) in ThemeVariant::ALL.iter().enumerate() {
            for b in &ThemeVariant::ALL[i + 1..] {
                assert_ne!(build_palette(*a), build_palette(*b), "{a} and {b}");
            }
        }
    }
}

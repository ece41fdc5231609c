use thiserror::Error;

pub const LIGHT_TEXT: &str = "#ffffff";
pub const DARK_TEXT: &str = "#000000";

/// Backgrounds at or below this luminance get light text.
const LUMINANCE_THRESHOLD: u32 = 130;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColorError {
    #[error("expected 6 hex digits, got {0:?}")]
    InvalidLength(String),
    #[error("invalid hex digit in {0:?}")]
    InvalidDigit(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// Parse `RRGGBB`, with or without a leading `#`.
    pub fn parse(hex: &str) -> Result<Self, ColorError> {
        let digits = hex.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.is_ascii() {
            return Err(ColorError::InvalidLength(hex.to_string()));
        }
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&digits[range], 16)
                .map_err(|_| ColorError::InvalidDigit(hex.to_string()))
        };
        Ok(Self {
            r: channel(0..2)?,
            g: channel(2..4)?,
            b: channel(4..6)?,
        })
    }
}

/// Perceptual luminance `(299 R + 587 G + 114 B) / 1000`, integer division.
pub fn luminance(rgb: Rgb) -> u32 {
    (299 * u32::from(rgb.r) + 587 * u32::from(rgb.g) + 114 * u32::from(rgb.b)) / 1000
}

/// Text color that stays readable on the given background.
pub fn contrast_text_color(background: &str) -> Result<&'static str, ColorError> {
    let y = luminance(Rgb::parse(background)?);
    Ok(if y <= LUMINANCE_THRESHOLD {
        LIGHT_TEXT
    } else {
        DARK_TEXT
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn black_gets_white_text_and_white_gets_black() {
        assert_eq!(contrast_text_color("#000000"), Ok(LIGHT_TEXT));
        assert_eq!(contrast_text_color("#ffffff"), Ok(DARK_TEXT));
    }

    #[test]
    fn mid_grey_sits_under_threshold() {
        let grey = Rgb::parse("#808080").expect("parse");
        assert_eq!(luminance(grey), 128);
        assert_eq!(contrast_text_color("#808080"), Ok(LIGHT_TEXT));
    }

    #[test]
    fn threshold_is_inclusive() {
        // 130 * 1000 / 1000 with equal channels
        assert_eq!(luminance(Rgb { r: 130, g: 130, b: 130 }), 130);
        assert_eq!(contrast_text_color("828282"), Ok(LIGHT_TEXT));
        assert_eq!(contrast_text_color("838383"), Ok(DARK_TEXT));
    }

    #[test]
    fn channel_weights_match_formula() {
        assert_eq!(luminance(Rgb { r: 255, g: 0, b: 0 }), 76);
        assert_eq!(luminance(Rgb { r: 0, g: 255, b: 0 }), 149);
        assert_eq!(luminance(Rgb { r: 0, g: 0, b: 255 }), 29);
        assert_eq!(contrast_text_color("#00ff00"), Ok(DARK_TEXT));
        assert_eq!(contrast_text_color("#FF0000"), Ok(LIGHT_TEXT));
    }

    #[test]
    fn malformed_colors_are_rejected() {
        assert!(matches!(
            Rgb::parse("#fff"),
            Err(ColorError::InvalidLength(_))
        ));
        assert!(matches!(
            Rgb::parse("#gg0000"),
            Err(ColorError::InvalidDigit(_))
        ));
        assert!(matches!(
            Rgb::parse("#ffé000"),
            Err(ColorError::InvalidLength(_))
        ));
    }
}

use serde::{Deserialize, Serialize};

/// Background colours offered on the start screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChatColor {
    #[default]
    Black,
    Purple,
    Blue,
    Green,
}

impl ChatColor {
    pub const ALL: [ChatColor; 4] = [
        ChatColor::Black,
        ChatColor::Purple,
        ChatColor::Blue,
        ChatColor::Green,
    ];

    pub fn hex(&self) -> &'static str {
        match self {
            ChatColor::Black => "#090C08",
            ChatColor::Purple => "#474056",
            ChatColor::Blue => "#8A95A5",
            ChatColor::Green => "#B9C6AE",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ChatColor::Black => "Black",
            ChatColor::Purple => "Purple",
            ChatColor::Blue => "Blue",
            ChatColor::Green => "Green",
        }
    }

    pub fn rgb(&self) -> (u8, u8, u8) {
        match self {
            ChatColor::Black => (0x09, 0x0C, 0x08),
            ChatColor::Purple => (0x47, 0x40, 0x56),
            ChatColor::Blue => (0x8A, 0x95, 0xA5),
            ChatColor::Green => (0xB9, 0xC6, 0xAE),
        }
    }

    /// Light backgrounds need dark foreground text
    pub fn is_light(&self) -> bool {
        let (r, g, b) = self.rgb();
        // ITU-R BT.601 luma
        let luma = 299 * r as u32 + 587 * g as u32 + 114 * b as u32;
        luma / 1000 > 128
    }

    pub fn next(&self) -> Self {
        match self {
            ChatColor::Black => ChatColor::Purple,
            ChatColor::Purple => ChatColor::Blue,
            ChatColor::Blue => ChatColor::Green,
            ChatColor::Green => ChatColor::Black,
        }
    }

    pub fn prev(&self) -> Self {
        match self {
            ChatColor::Black => ChatColor::Green,
            ChatColor::Purple => ChatColor::Black,
            ChatColor::Blue => ChatColor::Purple,
            ChatColor::Green => ChatColor::Blue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_matches_rgb() {
        for color in ChatColor::ALL {
            let (r, g, b) = color.rgb();
            assert_eq!(color.hex(), format!("#{:02X}{:02X}{:02X}", r, g, b));
        }
    }

    #[test]
    fn test_next_prev_wrap() {
        assert_eq!(ChatColor::Green.next(), ChatColor::Black);
        assert_eq!(ChatColor::Black.prev(), ChatColor::Green);
        for color in ChatColor::ALL {
            assert_eq!(color.next().prev(), color);
        }
    }

    #[test]
    fn test_light_backgrounds() {
        assert!(!ChatColor::Black.is_light());
        assert!(!ChatColor::Purple.is_light());
        assert!(ChatColor::Blue.is_light());
        assert!(ChatColor::Green.is_light());
    }
}

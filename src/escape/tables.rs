//! Fixed lookup tables used by the humanizer.

/// Descriptive tag for a Select Graphic Rendition code.
///
/// Covers reset, the common text styles, and the standard/bright
/// foreground and background palette. Codes outside the table (256-color
/// and RGB introducers among them) get a raw fallback tag at the call
/// site.
pub(super) fn sgr_tag(code: u16) -> Option<&'static str> {
    let tag = match code {
        0 => "<reset>",
        1 => "<bold>",
        3 => "<italic>",
        4 => "<underline>",
        7 => "<inverse>",

        30 => "<fg:black>",
        31 => "<fg:red>",
        32 => "<fg:green>",
        33 => "<fg:yellow>",
        34 => "<fg:blue>",
        35 => "<fg:magenta>",
        36 => "<fg:cyan>",
        37 => "<fg:white>",

        40 => "<bg:black>",
        41 => "<bg:red>",
        42 => "<bg:green>",
        43 => "<bg:yellow>",
        44 => "<bg:blue>",
        45 => "<bg:magenta>",
        46 => "<bg:cyan>",
        47 => "<bg:white>",

        90 => "<fg:bright-black>",
        91 => "<fg:bright-red>",
        92 => "<fg:bright-green>",
        93 => "<fg:bright-yellow>",
        94 => "<fg:bright-blue>",
        95 => "<fg:bright-magenta>",
        96 => "<fg:bright-cyan>",
        97 => "<fg:bright-white>",

        100 => "<bg:bright-black>",
        101 => "<bg:bright-red>",
        102 => "<bg:bright-green>",
        103 => "<bg:bright-yellow>",
        104 => "<bg:bright-blue>",
        105 => "<bg:bright-magenta>",
        106 => "<bg:bright-cyan>",
        107 => "<bg:bright-white>",

        _ => return None,
    };
    Some(tag)
}

/// Descriptive tag for cursor-movement and erase finals.
pub(super) fn csi_command_tag(final_byte: u8) -> Option<&'static str> {
    let tag = match final_byte {
        b'A' => "<up>",
        b'B' => "<down>",
        b'C' => "<right>",
        b'D' => "<left>",
        b'H' => "<home>",
        b'J' => "<erase-display>",
        b'K' => "<erase-line>",
        _ => return None,
    };
    Some(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bright_colors_map_to_bright_names() {
        assert_eq!(sgr_tag(91), Some("<fg:bright-red>"));
        assert_eq!(sgr_tag(107), Some("<bg:bright-white>"));
    }

    #[test]
    fn extended_color_introducers_are_not_mapped() {
        assert_eq!(sgr_tag(38), None);
        assert_eq!(sgr_tag(48), None);
        assert_eq!(sgr_tag(2), None);
    }

    #[test]
    fn only_the_seven_command_finals_are_named() {
        assert!(csi_command_tag(b'H').is_some());
        assert!(csi_command_tag(b'f').is_none());
        assert!(csi_command_tag(b'm').is_none());
    }
}

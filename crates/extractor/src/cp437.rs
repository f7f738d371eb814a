//! IBM code page 437, the legacy encoding of ZIP entry names.

/// Characters for bytes 0x80..=0xFF; the lower half is ASCII.
const HIGH_HALF: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å',
    'É', 'æ', 'Æ', 'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ',
    'á', 'í', 'ó', 'ú', 'ñ', 'Ñ', 'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»',
    '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕', '╣', '║', '╗', '╝', '╜', '╛', '┐',
    '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦', '╠', '═', '╬', '╧',
    '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐', '▀',
    'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩',
    '≡', '±', '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{A0}',
];

/// Decode CP437 bytes. Every byte maps to exactly one character, so distinct
/// names stay distinct.
pub fn decode_cp437(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| if b < 0x80 { b as char } else { HIGH_HALF[(b - 0x80) as usize] })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_passes_through() {
        assert_eq!(decode_cp437(b"docs/readme.txt"), "docs/readme.txt");
    }

    #[test]
    fn test_high_half() {
        assert_eq!(decode_cp437(&[0x80, 0x82, 0xE1, 0xFF]), "Çéß\u{A0}");
    }

    #[test]
    fn test_distinct_bytes_give_distinct_names() {
        // Lossy UTF-8 would turn both into "\u{FFFD}.txt"
        assert_ne!(decode_cp437(&[0x81, b'.', b't', b'x', b't']), decode_cp437(&[0x94, b'.', b't', b'x', b't']));
        assert_eq!(decode_cp437(&[0x81]), "ü");
        assert_eq!(decode_cp437(&[0x94]), "ö");
    }
}

//! Where Fontra keeps things on disk.
//!
//! Glyph files are named so that case-insensitive filesystems keep
//! `A.json` and `a.json` apart: every run of five characters contributes one
//! base-32 digit recording which of them were uppercase.

const SEPARATOR: char = '^';

const RESERVED_CHARS: &str = "^>|[?+\\\":/<%]*";

const RESERVED_NAMES: [&str; 12] = [
    "CON", "PRN", "AUX", "CLOCK$", "NUL", "COM1", "COM2", "COM3", "COM4", "LPT1", "LPT2", "LPT3",
];

const BASE_32: &[u8; 32] = b"0123456789ABCDEFGHIJKLMNOPQRSTUV";

fn needs_escape(c: char) -> bool {
    c.is_ascii_control() || RESERVED_CHARS.contains(c)
}

fn is_reserved_name(name: &str) -> bool {
    RESERVED_NAMES
        .iter()
        .any(|reserved| reserved.eq_ignore_ascii_case(name))
}

/// One digit per five bytes, bit n set if byte n of the chunk is uppercase.
///
/// Trailing zero digits are dropped.
fn case_digits(name: &str) -> Vec<usize> {
    let mut digits: Vec<usize> = name
        .as_bytes()
        .chunks(5)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .filter(|(_, b)| b.is_ascii_uppercase())
                .fold(0, |digit, (i, _)| digit | (1 << i))
        })
        .collect();
    while digits.last() == Some(&0) {
        digits.pop();
    }
    digits
}

/// The file name Fontra uses for `name`, e.g. `A^1.json` for glyph "A".
pub fn string_to_filename(name: &str, suffix: &str) -> String {
    let mut filename = String::with_capacity(name.len() + suffix.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if (i == 0 && c == '.') || needs_escape(c) {
            filename.push_str(&format!("%{:02X}", c as u32));
        } else {
            filename.push(c);
        }
    }

    let mut digits = case_digits(name);
    if digits.is_empty() && is_reserved_name(name) {
        digits.push(0);
    }
    if !digits.is_empty() {
        filename.push(SEPARATOR);
        filename.extend(digits.into_iter().map(|d| BASE_32[d & 0x1F] as char));
    }

    filename.push_str(suffix);
    filename
}

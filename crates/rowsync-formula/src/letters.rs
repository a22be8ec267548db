//! Letter labels: `A..Z`, then `AA, AB, ..`, bijective base 26.

/// Label for the zero-based `index`.
#[must_use]
pub fn letter(index: usize) -> String {
    let mut digits = Vec::new();
    let mut rest = index;
    loop {
        digits.push(char::from(b'A' + to_digit(rest % 26)));
        if rest < 26 {
            break;
        }
        rest = rest / 26 - 1;
    }
    digits.iter().rev().collect()
}

/// Zero-based index of a label; `None` unless it is a non-empty run of `A..Z`.
#[must_use]
pub fn letter_index(label: &str) -> Option<usize> {
    if label.is_empty() {
        return None;
    }
    let mut value: usize = 0;
    for byte in label.bytes() {
        if !byte.is_ascii_uppercase() {
            return None;
        }
        value = value
            .checked_mul(26)?
            .checked_add(usize::from(byte - b'A') + 1)?;
    }
    Some(value - 1)
}

fn to_digit(value: usize) -> u8 {
    u8::try_from(value).unwrap_or(0)
}

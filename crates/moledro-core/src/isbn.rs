//! ISBN normalization and checksum validation
//!
//! Barcode scans of books produce EAN-13 codes (ISBN-13); older books and
//! manual entry may use ISBN-10.

/// Strip spaces and hyphens and upper-case a trailing `x`
pub fn normalize_isbn(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Check whether a code is a valid ISBN-10 or ISBN-13
///
/// The code is normalized first, so `978-0-441-01359-3` is accepted.
pub fn is_valid_isbn(code: &str) -> bool {
    let code = normalize_isbn(code);
    match code.len() {
        10 => is_valid_isbn10(&code),
        13 => is_valid_isbn13(&code),
        _ => false,
    }
}

fn is_valid_isbn10(code: &str) -> bool {
    let mut sum = 0;
    for (i, c) in code.chars().enumerate() {
        let value = match c {
            '0'..='9' => c as u32 - '0' as u32,
            // Check digit only
            'X' if i == 9 => 10,
            _ => return false,
        };
        sum += value * (10 - i as u32);
    }
    sum % 11 == 0
}

fn is_valid_isbn13(code: &str) -> bool {
    let mut sum = 0;
    for (i, c) in code.chars().enumerate() {
        let Some(digit) = c.to_digit(10) else {
            return false;
        };
        sum += if i % 2 == 0 { digit } else { digit * 3 };
    }
    sum % 10 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_isbn("978-0-441-01359-3"), "9780441013593");
        assert_eq!(normalize_isbn(" 0 8044 2957 x "), "080442957X");
    }

    #[test]
    fn test_valid_isbn13() {
        assert!(is_valid_isbn("9780441013593"));
        assert!(is_valid_isbn("978-0-306-40615-7"));
        assert!(!is_valid_isbn("9780441013594"));
    }

    #[test]
    fn test_valid_isbn10() {
        assert!(is_valid_isbn("0306406152"));
        assert!(is_valid_isbn("080442957X"));
        assert!(is_valid_isbn("080442957x"));
        assert!(!is_valid_isbn("0306406153"));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(!is_valid_isbn(""));
        assert!(!is_valid_isbn("12345"));
        assert!(!is_valid_isbn("97804410135AB"));
        assert!(!is_valid_isbn("X306406152"));
    }
}

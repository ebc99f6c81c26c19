// 🔢 PAN Validator - structural check on a card number
//
// Spaces and dashes are tolerated as separators. Luhn is intentionally not
// checked so fixtures can use made-up numbers.

/// Shortest and longest accepted PAN, in digits
pub const MIN_PAN_LENGTH: usize = 13;
pub const MAX_PAN_LENGTH: usize = 19;

/// Validate a Primary Account Number
///
/// Rules, applied to the input with spaces and dashes removed:
/// - 13..=19 characters
/// - ASCII digits only
/// - not every digit the same (0000..., 1111...)
pub fn is_valid_pan<'a>(input: impl Into<Option<&'a str>>) -> bool {
    let Some(input) = input.into() else {
        return false;
    };

    let pan = normalize(input);

    if pan.len() < MIN_PAN_LENGTH || pan.len() > MAX_PAN_LENGTH {
        return false;
    }

    if !pan.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    !all_same_digit(&pan)
}

fn normalize(input: &str) -> String {
    input.chars().filter(|c| *c != ' ' && *c != '-').collect()
}

fn all_same_digit(pan: &str) -> bool {
    let mut bytes = pan.bytes();
    match bytes.next() {
        Some(first) => bytes.all(|b| b == first),
        None => true,
    }
}

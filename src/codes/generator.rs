use rand::{Rng, rngs::OsRng};
use regex::Regex;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Draws a code of `length` characters from `[A-Z0-9]` using the OS RNG.
#[must_use]
pub fn generate_code(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| char::from(ALPHABET[rng.gen_range(0..ALPHABET.len())]))
        .collect()
}

/// Trims and uppercases `input`; `None` unless the result is `^[A-Z0-9]{6,12}$`.
#[must_use]
pub fn normalize_code(input: &str) -> Option<String> {
    let code = input.trim().to_ascii_uppercase();
    Regex::new(r"^[A-Z0-9]{6,12}$")
        .is_ok_and(|regex| regex.is_match(&code))
        .then_some(code)
}

//! Random passcode and identifier generation.

use rand::RngCore;
use rand::rngs::OsRng;

use super::OtpError;

/// Digits used for passcodes.
pub const NUM_CHARS: &str = "0123456789";

/// Letters and digits used for generated ids.
pub const ALPHA_NUM_CHARS: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Length of ids generated when the caller supplies none.
pub const ID_LENGTH: usize = 32;

/// Draws `length` symbols uniformly from `alphabet` using the OS CSPRNG.
///
/// Bytes outside the largest multiple of the alphabet size are rejected and
/// redrawn, so every symbol is equally likely. A failing random source is
/// reported as [`OtpError::RandomSourceFailure`] and never retried.
///
/// # Example
///
/// ```rust
/// use otp_gateway::generator::{generate, NUM_CHARS};
///
/// let code = generate(6, NUM_CHARS).unwrap();
/// assert_eq!(code.len(), 6);
/// assert!(code.chars().all(|c| c.is_ascii_digit()));
/// ```
pub fn generate(length: usize, alphabet: &str) -> Result<String, OtpError> {
    let symbols = alphabet.as_bytes();
    if symbols.is_empty() || symbols.len() > 256 || !alphabet.is_ascii() {
        return Err(OtpError::Validation(
            "alphabet must contain between 1 and 256 ASCII characters".to_string(),
        ));
    }

    let n = symbols.len();
    // Bytes at or above `limit` would bias the low symbols.
    let limit = 256 - (256 % n);
    let mut out = String::with_capacity(length);
    let mut buf = vec![0u8; length.max(16)];

    while out.len() < length {
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|e| OtpError::RandomSourceFailure(e.to_string()))?;
        for &b in &buf {
            if out.len() == length {
                break;
            }
            if (b as usize) < limit {
                out.push(symbols[b as usize % n] as char);
            }
        }
    }

    Ok(out)
}

/// Generates a numeric passcode of the given length.
pub fn generate_passcode(length: usize) -> Result<String, OtpError> {
    generate(length, NUM_CHARS)
}

/// Generates an alphanumeric record id of [`ID_LENGTH`] characters.
pub fn generate_id() -> Result<String, OtpError> {
    generate(ID_LENGTH, ALPHA_NUM_CHARS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_length_and_alphabet() {
        let code = generate(8, NUM_CHARS).unwrap();
        assert_eq!(code.len(), 8);
        assert!(code.chars().all(|c| NUM_CHARS.contains(c)));

        let id = generate_id().unwrap();
        assert_eq!(id.len(), ID_LENGTH);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generate_zero_length() {
        assert_eq!(generate(0, NUM_CHARS).unwrap(), "");
    }

    #[test]
    fn test_generate_rejects_empty_alphabet() {
        assert!(matches!(generate(6, ""), Err(OtpError::Validation(_))));
    }

    #[test]
    fn test_single_symbol_alphabet() {
        assert_eq!(generate(5, "x").unwrap(), "xxxxx");
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let ids: HashSet<String> = (0..100).map(|_| generate_id().unwrap()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_every_digit_appears() {
        // 10k draws over 10 symbols; a missing digit would mean a broken mapping.
        let code = generate_passcode(10_000).unwrap();
        for digit in NUM_CHARS.chars() {
            assert!(code.contains(digit), "digit {digit} never generated");
        }
    }
}

//! Join codes: generation, normalization and validation.

use rand::seq::IndexedRandom;

/// Length of generated codes, and the longest explicit code accepted.
pub const CODE_LENGTH: usize = 6;
const MIN_CODE_LENGTH: usize = 4;
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Source of candidate join codes.
///
/// Candidates are checked for collisions by the caller, which retries a bounded number of
/// times.
pub trait CodeGenerator: Send + Sync {
    /// Produce one candidate code, already normalized.
    fn generate(&self) -> String;
}

/// Uniformly random uppercase alphanumeric codes of [`CODE_LENGTH`] characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodes;

impl CodeGenerator for RandomCodes {
    fn generate(&self) -> String {
        let mut rng = rand::rng();
        (0..CODE_LENGTH)
            .map(|_| {
                CODE_CHARSET
                    .choose(&mut rng)
                    .copied()
                    .map_or('A', char::from)
            })
            .collect()
    }
}

/// Join codes are matched case-insensitively.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Explicit codes hold 4 to 6 ASCII letters or digits.
pub fn is_valid_code(code: &str) -> bool {
    (MIN_CODE_LENGTH..=CODE_LENGTH).contains(&code.len())
        && code.bytes().all(|byte| byte.is_ascii_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_codes_are_six_uppercase_alphanumerics() {
        for _ in 0..50 {
            let code = RandomCodes.generate();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(is_valid_code(&code));
            assert_eq!(code, code.to_ascii_uppercase());
        }
    }

    #[test]
    fn explicit_codes_are_checked_and_normalized() {
        assert_eq!(normalize_code(" abc12 "), "ABC12");
        assert!(is_valid_code("ABCD"));
        assert!(!is_valid_code("ABC"));
        assert!(!is_valid_code("ABCDEFG"));
        assert!(!is_valid_code("AB-12"));
    }
}

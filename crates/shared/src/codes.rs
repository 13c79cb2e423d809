//! Random identifier generation for documents and group join codes.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length of store-assigned document ids.
pub const DOCUMENT_ID_LENGTH: usize = 20;

/// Length of the join code shown to mobile users.
pub const GROUP_CODE_LENGTH: usize = 6;

const GROUP_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Generates a 20 character alphanumeric document id.
pub fn generate_document_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(DOCUMENT_ID_LENGTH)
        .map(char::from)
        .collect()
}

/// Generates an uppercase alphanumeric group join code.
pub fn generate_group_code() -> String {
    let mut rng = rand::thread_rng();
    (0..GROUP_CODE_LENGTH)
        .map(|_| GROUP_CODE_ALPHABET[rng.gen_range(0..GROUP_CODE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_shape() {
        let id = generate_document_id();
        assert_eq!(id.len(), DOCUMENT_ID_LENGTH);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_document_ids_differ() {
        assert_ne!(generate_document_id(), generate_document_id());
    }

    #[test]
    fn test_group_code_shape() {
        let code = generate_group_code();
        assert_eq!(code.len(), GROUP_CODE_LENGTH);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}

//! SHA-256 helpers and operation opcodes.
//!
//! Every operation payload starts with an 8-byte opcode the program
//! dispatches on:
//!
//! ```text
//! opcode = SHA-256("global:" || name)[..8]
//! ```

use sha2::{Digest, Sha256};

use stem_core::constants::{OPCODE_NAMESPACE, OPCODE_SIZE};
use stem_core::types::{Opcode, OperationKind};

/// Computes SHA-256 of `input`.
pub fn sha256(input: &[u8]) -> [u8; 32] {
    Sha256::digest(input).into()
}

/// Computes SHA-256 over the concatenation of `parts`.
///
/// No separators or length prefixes are inserted.
pub fn sha256_concat(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Derives the opcode for an operation name.
pub fn operation_opcode(name: &str) -> Opcode {
    let digest = sha256_concat(&[OPCODE_NAMESPACE.as_bytes(), b":", name.as_bytes()]);
    let mut opcode = [0u8; OPCODE_SIZE];
    opcode.copy_from_slice(&digest[..OPCODE_SIZE]);
    opcode
}

/// Opcode of a known operation.
pub fn opcode_for(kind: OperationKind) -> Opcode {
    operation_opcode(kind.name())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("register", "d37c430fd3c2b2f0" ; "register")]
    #[test_case("invite", "f218ebe185d3bdfa" ; "invite")]
    #[test_case("accept", "419646d885066b04" ; "accept")]
    #[test_case("reject", "87073f5583726fe0" ; "reject")]
    #[test_case("sendmessage", "a8b258373930e7e5" ; "sendmessage")]
    fn test_opcode_vectors(name: &str, expected: &str) {
        assert_eq!(hex::encode(operation_opcode(name)), expected);
    }

    #[test]
    fn test_opcode_is_digest_prefix() {
        let digest = sha256(b"global:register");
        assert_eq!(operation_opcode("register"), digest[..8]);
    }

    #[test]
    fn test_opcode_for_matches_names() {
        for kind in OperationKind::ALL {
            assert_eq!(opcode_for(kind), operation_opcode(kind.name()));
        }
    }

    #[test]
    fn test_opcodes_unique() {
        let opcodes: Vec<_> = OperationKind::ALL.iter().map(|k| opcode_for(*k)).collect();
        for (i, a) in opcodes.iter().enumerate() {
            for b in &opcodes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_sha256_known_vector() {
        let expected =
            hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855").unwrap();
        assert_eq!(sha256(b"").as_slice(), expected.as_slice());
    }

    #[test]
    fn test_concat_matches_single() {
        assert_eq!(sha256_concat(&[b"ab", b"cd"]), sha256(b"abcd"));
    }
}

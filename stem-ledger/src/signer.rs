//! Development signer.

use stem_core::error::{Result, StemError};
use stem_core::traits::RequestSigner;
use stem_core::types::{Identity, OperationRequest, TxSignature};
use stem_crypto::sha256_concat;

/// Signer for identities without keys, accepted by [`MemoryLedger`](crate::MemoryLedger).
///
/// The signature is a digest of the identity and the request bytes. It is
/// deterministic but offers no authentication; the in-memory ledger only
/// checks that the signer is listed on the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DevSigner {
    identity: Identity,
}

impl DevSigner {
    /// Signs as `identity`.
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }
}

impl RequestSigner for DevSigner {
    fn public_identity(&self) -> Identity {
        self.identity
    }

    fn sign(&self, request: &OperationRequest) -> Result<TxSignature> {
        if !request.signers().contains(&self.identity) {
            return Err(StemError::SigningFailed(format!(
                "{} is not a signer of this {} request",
                self.identity, request.kind
            )));
        }
        let message = request.message_bytes();
        let identity = self.identity.to_bytes();
        let mut signature = [0u8; 64];
        signature[..32].copy_from_slice(&sha256_concat(&[identity.as_slice(), message.as_slice()]));
        signature[32..].copy_from_slice(&sha256_concat(&[message.as_slice(), identity.as_slice()]));
        Ok(TxSignature(signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_program::instruction::{AccountMeta, Instruction};
    use solana_program::pubkey::Pubkey;
    use stem_core::types::OperationKind;

    fn request(signer: Pubkey) -> OperationRequest {
        let ix = Instruction::new_with_bytes(
            Pubkey::new_unique(),
            &[1, 2, 3],
            vec![AccountMeta::new_readonly(signer, true)],
        );
        OperationRequest::new(OperationKind::Register, ix)
    }

    #[test]
    fn test_signature_deterministic() {
        let owner = Pubkey::new_unique();
        let signer = DevSigner::new(owner);
        let req = request(owner);
        assert_eq!(signer.sign(&req).unwrap(), signer.sign(&req).unwrap());
        assert_eq!(signer.public_identity(), owner);
    }

    #[test]
    fn test_refuses_foreign_request() {
        let signer = DevSigner::new(Pubkey::new_unique());
        let err = signer.sign(&request(Pubkey::new_unique())).unwrap_err();
        assert!(matches!(err, StemError::SigningFailed(_)));
    }
}

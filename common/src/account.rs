// common/src/account.rs

use ed25519_dalek::{Signer, SigningKey, SECRET_KEY_LENGTH};
use thiserror::Error;

use crate::types::{AccountAddress, RawTransaction, SignedTransaction, TransactionAuthenticator};

/// Errors raised while turning secrets and addresses into usable values.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("private key must be 32 bytes, got {0}")]
    KeyLength(usize),
    #[error("address must be 1..=64 hex digits, got {0}")]
    AddressLength(usize),
    #[error("expected `<address>::<module>`, got `{0}`")]
    ModuleId(String),
    #[error("invalid type tag `{0}`")]
    TypeTag(String),
}

/// Strip an optional `0x` and hex-decode. Odd length or non-hex input is an error.
pub fn parse_private_key(pk: &str) -> Result<Vec<u8>, KeyError> {
    let pk = pk.strip_prefix("0x").unwrap_or(pk);
    Ok(hex::decode(pk)?)
}

/// An Ed25519 account that signs its own transactions.
pub struct LocalAccount {
    signing_key: SigningKey,
    address: AccountAddress,
}

impl LocalAccount {
    pub fn from_private_key(pk: &str) -> Result<Self, KeyError> {
        let bytes = parse_private_key(pk)?;
        let seed: [u8; SECRET_KEY_LENGTH] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::KeyLength(bytes.len()))?;
        Ok(Self::from_signing_key(SigningKey::from_bytes(&seed)))
    }

    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let address =
            AccountAddress::from_ed25519_public_key(signing_key.verifying_key().as_bytes());
        Self {
            signing_key,
            address,
        }
    }

    pub fn address(&self) -> AccountAddress {
        self.address
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn sign_transaction(&self, raw_txn: RawTransaction) -> Result<SignedTransaction, bcs::Error> {
        let message = raw_txn.signing_message()?;
        let signature = self.signing_key.sign(&message);
        Ok(SignedTransaction {
            raw_txn,
            authenticator: TransactionAuthenticator::Ed25519 {
                public_key: self.public_key_bytes().to_vec(),
                signature: signature.to_bytes().to_vec(),
            },
        })
    }
}

impl std::fmt::Debug for LocalAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalAccount")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

// common/src/types.rs
//
// Transaction types for the Move chain, laid out field-for-field the way the
// node expects them in BCS so that `bcs::to_bytes` yields the signed bytes.

use serde::{Serialize, Serializer};
use sha3::{Digest, Sha3_256};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::account::KeyError;

const RAW_TRANSACTION_SALT: &[u8] = b"APTOS::RawTransaction";

// ─────────────────── Addresses ───────────────────

pub const ADDRESS_LENGTH: usize = 32;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct AccountAddress([u8; ADDRESS_LENGTH]);

impl AccountAddress {
    /// Single-key Ed25519 scheme: sha3-256(public_key || 0x00).
    pub fn from_ed25519_public_key(public_key: &[u8]) -> Self {
        let mut hasher = Sha3_256::new();
        hasher.update(public_key);
        hasher.update([0u8]);
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }
}

/// Accepts `0x`-prefixed or bare hex; short forms such as `0x1` are left-padded.
impl FromStr for AccountAddress {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.is_empty() || digits.len() > ADDRESS_LENGTH * 2 {
            return Err(KeyError::AddressLength(digits.len()));
        }
        let padded = format!("{:0>width$}", digits, width = ADDRESS_LENGTH * 2);
        let mut bytes = [0u8; ADDRESS_LENGTH];
        hex::decode_to_slice(padded, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for AccountAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

// ─────────────────── Move identifiers & type tags ───────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModuleId {
    pub address: AccountAddress,
    pub name: Identifier,
}

impl ModuleId {
    /// Parses `<address>::<module>`.
    pub fn parse(s: &str) -> Result<Self, KeyError> {
        let (address, name) = s
            .split_once("::")
            .ok_or_else(|| KeyError::ModuleId(s.to_string()))?;
        Ok(Self {
            address: address.parse()?,
            name: Identifier::new(name),
        })
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.address, self.name.as_str())
    }
}

// Variant order is part of the wire format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum TypeTag {
    Bool,
    U8,
    U64,
    U128,
    Address,
    Signer,
    Vector(Box<TypeTag>),
    Struct(Box<StructTag>),
    U16,
    U32,
    U256,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StructTag {
    pub address: AccountAddress,
    pub module: Identifier,
    pub name: Identifier,
    pub type_args: Vec<TypeTag>,
}

impl FromStr for TypeTag {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match s {
            "bool" => TypeTag::Bool,
            "u8" => TypeTag::U8,
            "u16" => TypeTag::U16,
            "u32" => TypeTag::U32,
            "u64" => TypeTag::U64,
            "u128" => TypeTag::U128,
            "u256" => TypeTag::U256,
            "address" => TypeTag::Address,
            "signer" => TypeTag::Signer,
            _ => match s.strip_prefix("vector<").and_then(|rest| rest.strip_suffix('>')) {
                Some(inner) => TypeTag::Vector(Box::new(inner.parse()?)),
                None => TypeTag::Struct(Box::new(s.parse()?)),
            },
        })
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Bool => f.write_str("bool"),
            TypeTag::U8 => f.write_str("u8"),
            TypeTag::U16 => f.write_str("u16"),
            TypeTag::U32 => f.write_str("u32"),
            TypeTag::U64 => f.write_str("u64"),
            TypeTag::U128 => f.write_str("u128"),
            TypeTag::U256 => f.write_str("u256"),
            TypeTag::Address => f.write_str("address"),
            TypeTag::Signer => f.write_str("signer"),
            TypeTag::Vector(inner) => write!(f, "vector<{inner}>"),
            TypeTag::Struct(tag) => write!(f, "{tag}"),
        }
    }
}

/// Splits `A, B<C, D>` on top-level commas only.
fn split_type_args(s: &str) -> Vec<&str> {
    let mut depth = 0i32;
    let mut start = 0;
    let mut parts = Vec::new();
    for (i, c) in s.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Parses `<address>::<module>::<name>` with optional `<type, ...>` arguments.
impl FromStr for StructTag {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || KeyError::TypeTag(s.to_string());
        let (base, type_args) = match s.find('<') {
            Some(open) => {
                let inner = s[open + 1..].strip_suffix('>').ok_or_else(invalid)?;
                let args = split_type_args(inner)
                    .into_iter()
                    .map(str::parse)
                    .collect::<Result<Vec<TypeTag>, _>>()?;
                (&s[..open], args)
            }
            None => (s, Vec::new()),
        };

        let mut parts = base.split("::");
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(address), Some(module), Some(name), None) if !module.is_empty() && !name.is_empty() => {
                Ok(StructTag {
                    address: address.parse()?,
                    module: Identifier::new(module),
                    name: Identifier::new(name),
                    type_args,
                })
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for StructTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.address, self.module.as_str(), self.name.as_str())?;
        if let Some((first, rest)) = self.type_args.split_first() {
            write!(f, "<{first}")?;
            for arg in rest {
                write!(f, ", {arg}")?;
            }
            f.write_str(">")?;
        }
        Ok(())
    }
}

/// A coin type such as `0x1::aptos_coin::AptosCoin`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoinType(StructTag);

impl CoinType {
    pub fn parse(tag: &str) -> Result<Self, KeyError> {
        Ok(Self(tag.parse()?))
    }

    pub fn struct_tag(&self) -> &StructTag {
        &self.0
    }

    /// Struct name, e.g. `AptosCoin`.
    pub fn name(&self) -> &str {
        self.0.name.as_str()
    }
}

impl fmt::Display for CoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

// ─────────────────── Payloads ───────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EntryFunction {
    pub module: ModuleId,
    pub function: Identifier,
    pub ty_args: Vec<TypeTag>,
    pub args: Vec<Vec<u8>>,
}

impl EntryFunction {
    pub fn new(module: ModuleId, function: &str, ty_args: Vec<TypeTag>, args: Vec<Vec<u8>>) -> Self {
        Self {
            module,
            function: Identifier::new(function),
            ty_args,
            args,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionPayload {
    EntryFunction(EntryFunction),
}

impl Serialize for TransactionPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            // index 0 = Script, 1 = ModuleBundle (both unused here)
            TransactionPayload::EntryFunction(f) => {
                serializer.serialize_newtype_variant("TransactionPayload", 2, "EntryFunction", f)
            }
        }
    }
}

// ─────────────────── Transactions ───────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ChainId(pub u8);

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RawTransaction {
    pub sender: AccountAddress,
    pub sequence_number: u64,
    pub payload: Arc<TransactionPayload>,
    pub max_gas_amount: u64,
    pub gas_unit_price: u64,
    pub expiration_timestamp_secs: u64,
    pub chain_id: ChainId,
}

impl RawTransaction {
    /// Bytes covered by the sender's signature: sha3-256(salt) || bcs(self).
    pub fn signing_message(&self) -> Result<Vec<u8>, bcs::Error> {
        let mut message = Sha3_256::digest(RAW_TRANSACTION_SALT).to_vec();
        message.extend(bcs::to_bytes(self)?);
        Ok(message)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum TransactionAuthenticator {
    Ed25519 {
        public_key: Vec<u8>,
        signature: Vec<u8>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SignedTransaction {
    pub raw_txn: RawTransaction,
    pub authenticator: TransactionAuthenticator,
}

impl SignedTransaction {
    pub fn to_bcs(&self) -> Result<Vec<u8>, bcs::Error> {
        bcs::to_bytes(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raw(payload: Arc<TransactionPayload>) -> RawTransaction {
        RawTransaction {
            sender: "0x1".parse().unwrap(),
            sequence_number: 7,
            payload,
            max_gas_amount: 2000,
            gas_unit_price: 500,
            expiration_timestamp_secs: 1_700_000_010,
            chain_id: ChainId(2),
        }
    }

    fn sample_payload() -> Arc<TransactionPayload> {
        let module = ModuleId::parse("0x1::flashloan_swap").unwrap();
        Arc::new(TransactionPayload::EntryFunction(EntryFunction::new(
            module,
            "swap",
            vec![],
            vec![bcs::to_bytes(&100u64).unwrap()],
        )))
    }

    #[test]
    fn short_address_is_left_padded() {
        let addr: AccountAddress = "0x1".parse().unwrap();
        let mut expected = [0u8; 32];
        expected[31] = 1;
        assert_eq!(addr.as_bytes(), &expected);
        assert_eq!(addr.to_string(), format!("0x{}1", "0".repeat(63)));
    }

    #[test]
    fn address_without_prefix_parses() {
        let addr: AccountAddress = "09f85897f830d193f15d7232fa1c714daae3bf0215d7ad19d0c8afb7f35afb9e"
            .parse()
            .unwrap();
        assert_eq!(addr.as_bytes()[0], 0x09);
        assert_eq!(addr.as_bytes()[31], 0x9e);
    }

    #[test]
    fn address_rejects_bad_input() {
        assert!("0x".parse::<AccountAddress>().is_err());
        assert!("0xzz".parse::<AccountAddress>().is_err());
        assert!(format!("0x{}", "1".repeat(65)).parse::<AccountAddress>().is_err());
    }

    #[test]
    fn module_id_requires_separator() {
        assert!(ModuleId::parse("0x1").is_err());
        let id = ModuleId::parse("0x1::coin").unwrap();
        assert_eq!(id.name.as_str(), "coin");
    }

    #[test]
    fn coin_type_parses_into_struct_tag() {
        let coin = CoinType::parse("0x1::aptos_coin::AptosCoin").unwrap();
        assert_eq!(coin.name(), "AptosCoin");
        assert_eq!(coin.struct_tag().module.as_str(), "aptos_coin");
        assert_eq!(coin.struct_tag().address, "0x1".parse().unwrap());
        assert!(coin.struct_tag().type_args.is_empty());

        assert!(CoinType::parse("USDT").is_err());
        assert!(CoinType::parse("0x1::coins::").is_err());
        assert!(CoinType::parse("0x1::a::b::c").is_err());
    }

    #[test]
    fn pool_type_arguments_parse() {
        let curve: StructTag =
            "0x43417434fd869edee76cca2a4d2301e528a1551b1d719b75c350c3c97d15b8b9::curves::Uncorrelated"
                .parse()
                .unwrap();
        assert_eq!(curve.name.as_str(), "Uncorrelated");

        let pool: StructTag =
            "0x1::liquidity_pool::LiquidityPool<0x1::coins::BTC, 0x1::coins::USDT, 0x1::curves::Uncorrelated>"
                .parse()
                .unwrap();
        assert_eq!(pool.type_args.len(), 3);
        let TypeTag::Struct(btc) = &pool.type_args[0] else {
            panic!("expected struct type argument");
        };
        assert_eq!(btc.name.as_str(), "BTC");
    }

    #[test]
    fn nested_and_primitive_type_arguments() {
        let store: StructTag = "0x1::coin::CoinStore<vector<u8>, 0x1::table::Table<address, u64>>"
            .parse()
            .unwrap();
        assert_eq!(store.type_args[0], TypeTag::Vector(Box::new(TypeTag::U8)));
        let TypeTag::Struct(table) = &store.type_args[1] else {
            panic!("expected struct type argument");
        };
        assert_eq!(table.type_args, vec![TypeTag::Address, TypeTag::U64]);

        assert!("0x1::coin::CoinStore<".parse::<StructTag>().is_err());
        assert!("0x1::coin::CoinStore<>".parse::<StructTag>().is_err());
    }

    #[test]
    fn struct_tag_display_uses_full_addresses() {
        let coin = CoinType::parse("0x1::coin::CoinStore<0x1::aptos_coin::AptosCoin>").unwrap();
        let one = format!("0x{}1", "0".repeat(63));
        assert_eq!(
            coin.to_string(),
            format!("{one}::coin::CoinStore<{one}::aptos_coin::AptosCoin>")
        );
    }

    #[test]
    fn u64_argument_is_little_endian() {
        assert_eq!(bcs::to_bytes(&1000u64).unwrap(), 1000u64.to_le_bytes().to_vec());
    }

    #[test]
    fn raw_transaction_layout() {
        let bytes = bcs::to_bytes(&sample_raw(sample_payload())).unwrap();

        // sender + sequence number
        assert_eq!(&bytes[..32], "0x1".parse::<AccountAddress>().unwrap().as_bytes());
        assert_eq!(&bytes[32..40], &7u64.to_le_bytes());
        // entry function variant tag
        assert_eq!(bytes[40], 2);
        // trailing gas, expiry, chain id
        let tail = &bytes[bytes.len() - 25..];
        assert_eq!(&tail[..8], &2000u64.to_le_bytes());
        assert_eq!(&tail[8..16], &500u64.to_le_bytes());
        assert_eq!(&tail[16..24], &1_700_000_010u64.to_le_bytes());
        assert_eq!(tail[24], 2);
    }

    #[test]
    fn signing_message_is_salted() {
        let raw = sample_raw(sample_payload());
        let message = raw.signing_message().unwrap();
        let salt = Sha3_256::digest(RAW_TRANSACTION_SALT);
        assert_eq!(&message[..32], salt.as_slice());
        assert_eq!(&message[32..], bcs::to_bytes(&raw).unwrap().as_slice());
    }

    #[test]
    fn signed_transaction_appends_authenticator() {
        let raw = sample_raw(sample_payload());
        let signed = SignedTransaction {
            raw_txn: raw.clone(),
            authenticator: TransactionAuthenticator::Ed25519 {
                public_key: vec![0xaa; 32],
                signature: vec![0xbb; 64],
            },
        };
        let raw_len = bcs::to_bytes(&raw).unwrap().len();
        let bytes = signed.to_bcs().unwrap();
        // variant 0, len 32, key, len 64, signature
        assert_eq!(bytes.len(), raw_len + 1 + 1 + 32 + 1 + 64);
        assert_eq!(bytes[raw_len], 0);
        assert_eq!(bytes[raw_len + 1], 32);
        assert_eq!(bytes[raw_len + 34], 64);
    }
}

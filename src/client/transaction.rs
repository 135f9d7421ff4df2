//! Legacy transaction encoding.
//!
//! # Wire Layout
//!
//! ```text
//! transaction = compact(n) signature[64]*n  message
//! message     = header[3]  compact(k) key[32]*k  blockhash[32]
//!               compact(m) instruction*m
//! instruction = program_index u8  compact(a) account_index u8*a  compact(d) data
//! ```
//!
//! Account keys are ordered writable signers, readonly signers, writable
//! non-signers, readonly non-signers, with the fee payer first.

// ============================================================================
// Imports
// ============================================================================

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as Base64Standard;

use crate::error::{Error, Result};
use crate::identifiers::{Address, Signature};

use super::wallet::Signer;

// ============================================================================
// Constants
// ============================================================================

/// Maximum serialized transaction size accepted by the network.
pub const PACKET_DATA_SIZE: usize = 1232;

// ============================================================================
// Instruction
// ============================================================================

/// An account referenced by an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountMeta {
    /// Account address.
    pub pubkey: Address,
    /// Must sign the transaction.
    pub is_signer: bool,
    /// May be modified.
    pub is_writable: bool,
}

impl AccountMeta {
    /// Writable account.
    #[inline]
    #[must_use]
    pub const fn new(pubkey: Address, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: true,
        }
    }

    /// Read-only account.
    #[inline]
    #[must_use]
    pub const fn new_readonly(pubkey: Address, is_signer: bool) -> Self {
        Self {
            pubkey,
            is_signer,
            is_writable: false,
        }
    }
}

/// A program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Program to invoke.
    pub program_id: Address,
    /// Accounts in the order the program expects.
    pub accounts: Vec<AccountMeta>,
    /// Program-specific payload.
    pub data: Vec<u8>,
}

impl Instruction {
    /// Creates an instruction.
    #[inline]
    #[must_use]
    pub fn new(program_id: Address, accounts: Vec<AccountMeta>, data: Vec<u8>) -> Self {
        Self {
            program_id,
            accounts,
            data,
        }
    }
}

// ============================================================================
// Message
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MessageHeader {
    num_required_signatures: u8,
    num_readonly_signed: u8,
    num_readonly_unsigned: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CompiledInstruction {
    program_id_index: u8,
    accounts: Vec<u8>,
    data: Vec<u8>,
}

/// A compiled, unsigned legacy message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    header: MessageHeader,
    account_keys: Vec<Address>,
    recent_blockhash: [u8; 32],
    instructions: Vec<CompiledInstruction>,
}

impl Message {
    /// Compiles `instructions` with `payer` as fee payer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if more than 256 accounts are referenced
    /// or a header count does not fit in a byte.
    pub fn new(instructions: &[Instruction], payer: &Address, recent_blockhash: [u8; 32]) -> Result<Self> {
        // First-seen order, payer first; flags are merged across uses
        let mut metas: Vec<AccountMeta> = vec![AccountMeta::new(*payer, true)];
        let mut merge = |meta: AccountMeta| {
            match metas.iter_mut().find(|m| m.pubkey == meta.pubkey) {
                Some(existing) => {
                    existing.is_signer |= meta.is_signer;
                    existing.is_writable |= meta.is_writable;
                }
                None => metas.push(meta),
            }
        };
        for instruction in instructions {
            for meta in &instruction.accounts {
                merge(*meta);
            }
            merge(AccountMeta::new_readonly(instruction.program_id, false));
        }

        // Stable partition keeps the payer at index 0
        let group = |m: &AccountMeta| match (m.is_signer, m.is_writable) {
            (true, true) => 0,
            (true, false) => 1,
            (false, true) => 2,
            (false, false) => 3,
        };
        metas.sort_by_key(group);

        if metas.len() > usize::from(u8::MAX) + 1 {
            return Err(Error::invalid_argument(format!(
                "transaction references {} accounts",
                metas.len()
            )));
        }

        let count = |g: u8| metas.iter().filter(|m| group(m) == g).count();
        let header_field = |n: usize, what: &str| {
            u8::try_from(n).map_err(|_| {
                Error::invalid_argument(format!(
                    "transaction needs {n} {what}; a message header holds at most {}",
                    u8::MAX
                ))
            })
        };
        let header = MessageHeader {
            num_required_signatures: header_field(count(0) + count(1), "signatures")?,
            num_readonly_signed: header_field(count(1), "read-only signers")?,
            num_readonly_unsigned: header_field(count(3), "read-only accounts")?,
        };

        let account_keys: Vec<Address> = metas.iter().map(|m| m.pubkey).collect();
        let index_of = |key: &Address| -> u8 {
            account_keys
                .iter()
                .position(|k| k == key)
                .map_or(0, |i| i as u8)
        };

        let instructions = instructions
            .iter()
            .map(|instruction| CompiledInstruction {
                program_id_index: index_of(&instruction.program_id),
                accounts: instruction
                    .accounts
                    .iter()
                    .map(|meta| index_of(&meta.pubkey))
                    .collect(),
                data: instruction.data.clone(),
            })
            .collect();

        Ok(Self {
            header,
            account_keys,
            recent_blockhash,
            instructions,
        })
    }

    /// Ordered account keys.
    #[inline]
    #[must_use]
    pub fn account_keys(&self) -> &[Address] {
        &self.account_keys
    }

    /// Keys that must sign, in signature order.
    #[must_use]
    pub fn signer_keys(&self) -> &[Address] {
        &self.account_keys[..usize::from(self.header.num_required_signatures)]
    }

    /// Serializes the message; these are the bytes that get signed.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(256);
        out.push(self.header.num_required_signatures);
        out.push(self.header.num_readonly_signed);
        out.push(self.header.num_readonly_unsigned);

        encode_length(self.account_keys.len(), &mut out);
        for key in &self.account_keys {
            out.extend_from_slice(key.as_bytes());
        }
        out.extend_from_slice(&self.recent_blockhash);

        encode_length(self.instructions.len(), &mut out);
        for instruction in &self.instructions {
            out.push(instruction.program_id_index);
            encode_length(instruction.accounts.len(), &mut out);
            out.extend_from_slice(&instruction.accounts);
            encode_length(instruction.data.len(), &mut out);
            out.extend_from_slice(&instruction.data);
        }
        out
    }
}

// ============================================================================
// Transaction
// ============================================================================

/// A signed legacy transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    signatures: Vec<Signature>,
    message: Message,
}

impl Transaction {
    /// Compiles and signs. `signers` must cover every required signer,
    /// the payer included.
    ///
    /// # Errors
    ///
    /// - [`Error::Signing`] if a required signer is missing or refuses
    /// - [`Error::InvalidArgument`] if the result exceeds the packet size
    pub fn new_signed(
        instructions: &[Instruction],
        payer: &Address,
        signers: &[&dyn Signer],
        recent_blockhash: [u8; 32],
    ) -> Result<Self> {
        let message = Message::new(instructions, payer, recent_blockhash)?;
        let bytes = message.serialize();

        let signatures = message
            .signer_keys()
            .iter()
            .map(|key| {
                let signer = signers
                    .iter()
                    .find(|s| s.pubkey() == *key)
                    .ok_or_else(|| Error::signing(format!("missing signer for {key}")))?;
                signer.sign_message(&bytes)
            })
            .collect::<Result<Vec<_>>>()?;

        let transaction = Self {
            signatures,
            message,
        };

        let size = transaction.serialize().len();
        if size > PACKET_DATA_SIZE {
            return Err(Error::invalid_argument(format!(
                "transaction is {size} bytes, limit is {PACKET_DATA_SIZE}"
            )));
        }

        Ok(transaction)
    }

    /// The first signature identifies the transaction.
    #[must_use]
    pub fn signature(&self) -> Option<Signature> {
        self.signatures.first().copied()
    }

    /// Compiled message.
    #[inline]
    #[must_use]
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Wire bytes.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let message = self.message.serialize();
        let mut out = Vec::with_capacity(1 + self.signatures.len() * 64 + message.len());
        encode_length(self.signatures.len(), &mut out);
        for signature in &self.signatures {
            out.extend_from_slice(signature.as_bytes());
        }
        out.extend_from_slice(&message);
        out
    }

    /// Base64 wire form for `sendTransaction`.
    #[must_use]
    pub fn to_base64(&self) -> String {
        Base64Standard.encode(self.serialize())
    }
}

// ============================================================================
// Compact-u16
// ============================================================================

/// Appends `len` as a compact-u16 (7 bits per byte, high bit continues).
pub(crate) fn encode_length(len: usize, out: &mut Vec<u8>) {
    let mut rest = len as u16;
    loop {
        let mut byte = (rest & 0x7f) as u8;
        rest >>= 7;
        if rest == 0 {
            out.push(byte);
            return;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

// ============================================================================
// Tests
// ============================================================================

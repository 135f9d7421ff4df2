//! Built-in program instructions.
//!
//! | Builder | Program | Tag |
//! |---------|---------|-----|
//! | [`create_account`] | System | `0u32` |
//! | [`transfer`] | System | `2u32` |
//! | [`initialize_mint2`] | Token | `20u8` |
//! | [`initialize_account3`] | Token | `18u8` |
//! | [`mint_to`] | Token | `7u8` |

// ============================================================================
// Imports
// ============================================================================

use crate::identifiers::Address;

use super::transaction::{AccountMeta, Instruction};

// ============================================================================
// Constants
// ============================================================================

/// System program (`11111111111111111111111111111111`).
pub const SYSTEM_PROGRAM_ID: Address = Address::new([0; 32]);

/// SPL Token program (`TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA`).
pub const TOKEN_PROGRAM_ID: Address = Address::new([
    6, 221, 246, 225, 215, 101, 161, 147, 217, 203, 225, 70, 206, 235, 121, 172, 28, 180, 133,
    237, 95, 91, 55, 145, 58, 140, 245, 133, 126, 255, 0, 169,
]);

/// Data length of a token mint account.
pub const MINT_SIZE: u64 = 82;

/// Data length of a token holding account.
pub const TOKEN_ACCOUNT_SIZE: u64 = 165;

// ============================================================================
// System Program
// ============================================================================

/// Allocates `space` bytes owned by `owner` and funds it with `lamports`.
///
/// Both `from` and `new_account` must sign.
#[must_use]
pub fn create_account(
    from: &Address,
    new_account: &Address,
    lamports: u64,
    space: u64,
    owner: &Address,
) -> Instruction {
    let mut data = Vec::with_capacity(52);
    data.extend_from_slice(&0u32.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    data.extend_from_slice(&space.to_le_bytes());
    data.extend_from_slice(owner.as_bytes());

    Instruction::new(
        SYSTEM_PROGRAM_ID,
        vec![AccountMeta::new(*from, true), AccountMeta::new(*new_account, true)],
        data,
    )
}

/// Moves `lamports` from `from` to `to`.
#[must_use]
pub fn transfer(from: &Address, to: &Address, lamports: u64) -> Instruction {
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&2u32.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());

    Instruction::new(
        SYSTEM_PROGRAM_ID,
        vec![AccountMeta::new(*from, true), AccountMeta::new(*to, false)],
        data,
    )
}

// ============================================================================
// Token Program
// ============================================================================

/// Initializes a mint without requiring the rent sysvar.
#[must_use]
pub fn initialize_mint2(
    mint: &Address,
    mint_authority: &Address,
    freeze_authority: Option<&Address>,
    decimals: u8,
) -> Instruction {
    let mut data = Vec::with_capacity(67);
    data.push(20);
    data.push(decimals);
    data.extend_from_slice(mint_authority.as_bytes());
    match freeze_authority {
        Some(authority) => {
            data.push(1);
            data.extend_from_slice(authority.as_bytes());
        }
        None => data.push(0),
    }

    Instruction::new(TOKEN_PROGRAM_ID, vec![AccountMeta::new(*mint, false)], data)
}

/// Initializes a token account for `mint` held by `owner`.
#[must_use]
pub fn initialize_account3(account: &Address, mint: &Address, owner: &Address) -> Instruction {
    let mut data = Vec::with_capacity(33);
    data.push(18);
    data.extend_from_slice(owner.as_bytes());

    Instruction::new(
        TOKEN_PROGRAM_ID,
        vec![
            AccountMeta::new(*account, false),
            AccountMeta::new_readonly(*mint, false),
        ],
        data,
    )
}

/// Mints `amount` base units of `mint` into `destination`.
#[must_use]
pub fn mint_to(mint: &Address, destination: &Address, authority: &Address, amount: u64) -> Instruction {
    let mut data = Vec::with_capacity(9);
    data.push(7);
    data.extend_from_slice(&amount.to_le_bytes());

    Instruction::new(
        TOKEN_PROGRAM_ID,
        vec![
            AccountMeta::new(*mint, false),
            AccountMeta::new(*destination, false),
            AccountMeta::new_readonly(*authority, true),
        ],
        data,
    )
}

// ============================================================================
// Tests
// ============================================================================

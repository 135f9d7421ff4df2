//! Program account and token methods.

use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::{Signature, ToAddress};

use super::Client;
use super::instruction::{self, MINT_SIZE, TOKEN_ACCOUNT_SIZE, TOKEN_PROGRAM_ID};
use super::wallet::{Keypair, Signer};

// ============================================================================
// Client - Program Accounts
// ============================================================================

impl Client {
    /// Creates a rent-exempt account of `space` bytes owned by `program_id`.
    ///
    /// Returns the new account's keypair with the submission signature.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAddress`] before any network call if `program_id` is malformed
    /// - the rent query, blockhash or submission call's error
    pub async fn create_program_account<P: ToAddress + ?Sized>(
        &self,
        payer: &dyn Signer,
        program_id: &P,
        space: u64,
    ) -> Result<(Keypair, Signature)> {
        let program_id = program_id.to_address()?;
        let account = Keypair::generate();
        debug!(%program_id, account = %account.pubkey(), space, "Creating program account");

        let lamports = self.get_minimum_balance_for_rent_exemption(space).await?;
        let create = instruction::create_account(
            &payer.pubkey(),
            &account.pubkey(),
            lamports,
            space,
            &program_id,
        );

        let signature = self.submit(&[create], payer, &[payer, &account]).await?;
        Ok((account, signature))
    }
}

// ============================================================================
// Client - Tokens
// ============================================================================

impl Client {
    /// Creates a token mint with `payer` as mint authority and no freeze authority.
    ///
    /// # Errors
    ///
    /// Returns the rent query, blockhash or submission call's error.
    pub async fn create_token_mint(
        &self,
        payer: &dyn Signer,
        decimals: u8,
    ) -> Result<(Keypair, Signature)> {
        let mint = Keypair::generate();
        let authority = payer.pubkey();
        debug!(mint = %mint.pubkey(), %authority, decimals, "Creating token mint");

        let lamports = self.get_minimum_balance_for_rent_exemption(MINT_SIZE).await?;
        let instructions = [
            instruction::create_account(
                &authority,
                &mint.pubkey(),
                lamports,
                MINT_SIZE,
                &TOKEN_PROGRAM_ID,
            ),
            instruction::initialize_mint2(&mint.pubkey(), &authority, None, decimals),
        ];

        let signature = self.submit(&instructions, payer, &[payer, &mint]).await?;
        Ok((mint, signature))
    }

    /// Creates a token account for `mint` held by `owner`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAddress`] before any network call for a malformed `mint` or `owner`
    /// - the rent query, blockhash or submission call's error
    pub async fn create_token_account<M, O>(
        &self,
        payer: &dyn Signer,
        mint: &M,
        owner: &O,
    ) -> Result<(Keypair, Signature)>
    where
        M: ToAddress + ?Sized,
        O: ToAddress + ?Sized,
    {
        let mint = mint.to_address()?;
        let owner = owner.to_address()?;
        let account = Keypair::generate();
        debug!(%mint, %owner, account = %account.pubkey(), "Creating token account");

        let lamports = self
            .get_minimum_balance_for_rent_exemption(TOKEN_ACCOUNT_SIZE)
            .await?;
        let instructions = [
            instruction::create_account(
                &payer.pubkey(),
                &account.pubkey(),
                lamports,
                TOKEN_ACCOUNT_SIZE,
                &TOKEN_PROGRAM_ID,
            ),
            instruction::initialize_account3(&account.pubkey(), &mint, &owner),
        ];

        let signature = self.submit(&instructions, payer, &[payer, &account]).await?;
        Ok((account, signature))
    }

    /// Mints `amount` base units into `destination`; `authority` pays and signs.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAmount`] or [`Error::InvalidAddress`] before any network call
    /// - the blockhash or submission call's error
    pub async fn mint_tokens<M, D>(
        &self,
        authority: &dyn Signer,
        mint: &M,
        destination: &D,
        amount: u64,
    ) -> Result<Signature>
    where
        M: ToAddress + ?Sized,
        D: ToAddress + ?Sized,
    {
        if amount == 0 {
            return Err(Error::invalid_amount(amount, "mint amount must be positive"));
        }
        let mint = mint.to_address()?;
        let destination = destination.to_address()?;
        debug!(%mint, %destination, amount, "Minting tokens");

        let mint_to = instruction::mint_to(&mint, &destination, &authority.pubkey(), amount);
        self.submit(&[mint_to], authority, &[authority]).await
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Wallet, balance, account and airdrop methods.

use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::{Signature, ToAddress};
use crate::protocol::types::{decode_account_info, decode_balance, decode_signature, decode_u64};
use crate::protocol::{AccountInfo, RpcMethod};

use super::Client;
use super::wallet::{Keypair, Signer};

// ============================================================================
// Client - Accounts
// ============================================================================

impl Client {
    /// Generates a fresh keypair. Purely local.
    #[must_use]
    pub fn create_wallet(&self) -> Keypair {
        let keypair = Keypair::generate();
        debug!(pubkey = %keypair.pubkey(), "Created wallet");
        keypair
    }

    /// Lamport balance of `address`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAddress`] before any network call if `address` is malformed
    /// - the call's error otherwise
    pub async fn get_balance<A: ToAddress + ?Sized>(&self, address: &A) -> Result<u64> {
        let address = address.to_address()?;
        debug!(%address, "Getting balance");

        let result = self
            .call(RpcMethod::GetBalance {
                address,
                commitment: self.commitment(),
            })
            .await?;
        decode_balance(result)
    }

    /// Account snapshot, or `None` if the account does not exist.
    ///
    /// # Errors
    ///
    /// See [`get_balance`](Self::get_balance).
    pub async fn get_account_info<A: ToAddress + ?Sized>(
        &self,
        address: &A,
    ) -> Result<Option<AccountInfo>> {
        let address = address.to_address()?;
        debug!(%address, "Getting account info");

        let result = self
            .call(RpcMethod::GetAccountInfo {
                address,
                commitment: self.commitment(),
            })
            .await?;
        decode_account_info(result)
    }

    /// Minimum balance for an account holding `space` bytes to be rent exempt.
    ///
    /// # Errors
    ///
    /// Returns the call's error.
    pub async fn get_minimum_balance_for_rent_exemption(&self, space: u64) -> Result<u64> {
        let result = self
            .call(RpcMethod::GetMinimumBalanceForRentExemption { space })
            .await?;
        decode_u64(result, "getMinimumBalanceForRentExemption")
    }

    /// Requests `lamports` from the faucet. Test clusters only.
    ///
    /// The signature is tracked; use
    /// [`confirm_transaction`](Self::confirm_transaction) to wait for it.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAddress`] or [`Error::InvalidAmount`] before any network call
    /// - the call's error otherwise; airdrops are never retried
    pub async fn request_airdrop<A: ToAddress + ?Sized>(
        &self,
        address: &A,
        lamports: u64,
    ) -> Result<Signature> {
        let address = address.to_address()?;
        if lamports == 0 {
            return Err(Error::invalid_amount(lamports, "airdrop amount must be positive"));
        }
        debug!(%address, lamports, "Requesting airdrop");

        let result = self
            .call(RpcMethod::RequestAirdrop {
                address,
                lamports,
                commitment: self.commitment(),
            })
            .await?;
        let signature = decode_signature(result, "requestAirdrop")?;

        self.inner.tracker.track(signature);
        debug!(%signature, "Airdrop submitted");
        Ok(signature)
    }
}

// ============================================================================
// Tests
// ============================================================================

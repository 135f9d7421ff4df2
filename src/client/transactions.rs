//! Transfer, program instruction and confirmation methods.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::identifiers::{Signature, ToAddress, ToSignature};
use crate::protocol::types::{decode_latest_blockhash, decode_signature};
use crate::protocol::{Commitment, LatestBlockhash, RpcMethod};
use crate::tracker::TransactionRecord;

use super::Client;
use super::instruction;
use super::transaction::{AccountMeta, Instruction, Transaction};
use super::wallet::Signer;

// ============================================================================
// Client - Transactions
// ============================================================================

impl Client {
    /// Transfers `lamports` from `sender` to `recipient`.
    ///
    /// Returns once the node accepts the transaction; the signature is
    /// tracked. Execution failure shows up later as a `Failed` record.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAmount`] or [`Error::InvalidAddress`] before any network call
    /// - [`Error::Rpc`] if the node rejects the submission
    pub async fn send_transaction<A: ToAddress + ?Sized>(
        &self,
        sender: &dyn Signer,
        recipient: &A,
        lamports: u64,
    ) -> Result<Signature> {
        if lamports == 0 {
            return Err(Error::invalid_amount(lamports, "transfer amount must be positive"));
        }
        let recipient = recipient.to_address()?;
        let from = sender.pubkey();
        debug!(%from, to = %recipient, lamports, "Sending transfer");

        let transfer = instruction::transfer(&from, &recipient, lamports);
        self.submit(&[transfer], sender, &[sender]).await
    }

    /// Invokes `program_id` with caller-built accounts and data, paid by `payer`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAddress`] before any network call if `program_id` is malformed
    /// - [`Error::Signing`] if an account requires a signature other than `payer`'s
    pub async fn send_program_instruction<P: ToAddress + ?Sized>(
        &self,
        payer: &dyn Signer,
        program_id: &P,
        accounts: Vec<AccountMeta>,
        data: Vec<u8>,
    ) -> Result<Signature> {
        let program_id = program_id.to_address()?;
        debug!(%program_id, accounts = accounts.len(), data_len = data.len(), "Sending program instruction");

        let instruction = Instruction::new(program_id, accounts, data);
        self.submit(&[instruction], payer, &[payer]).await
    }

    /// Signs and submits `instructions` and tracks the signature.
    ///
    /// `signers` must include `payer`.
    ///
    /// # Errors
    ///
    /// - [`Error::Signing`] or [`Error::InvalidArgument`] before submission
    /// - the blockhash or submission call's error
    pub async fn send_instructions(
        &self,
        instructions: &[Instruction],
        payer: &dyn Signer,
        signers: &[&dyn Signer],
    ) -> Result<Signature> {
        self.submit(instructions, payer, signers).await
    }

    /// Latest blockhash at the default commitment.
    ///
    /// # Errors
    ///
    /// Returns the call's error.
    pub async fn get_latest_blockhash(&self) -> Result<LatestBlockhash> {
        let result = self
            .call(RpcMethod::GetLatestBlockhash {
                commitment: self.commitment(),
            })
            .await?;
        decode_latest_blockhash(result)
    }

    pub(crate) async fn submit(
        &self,
        instructions: &[Instruction],
        payer: &dyn Signer,
        signers: &[&dyn Signer],
    ) -> Result<Signature> {
        let blockhash = self.get_latest_blockhash().await?;
        let transaction =
            Transaction::new_signed(instructions, &payer.pubkey(), signers, blockhash.blockhash)?;

        let result = self
            .call(RpcMethod::SendTransaction {
                transaction: transaction.to_base64(),
                skip_preflight: false,
                preflight_commitment: self.commitment(),
            })
            .await?;
        let signature = decode_signature(result, "sendTransaction")?;

        if transaction.signature() != Some(signature) {
            debug!(%signature, "Node returned a signature other than the first signer's");
        }

        self.inner.tracker.track(signature);
        debug!(%signature, instructions = instructions.len(), "Transaction submitted");
        Ok(signature)
    }
}

// ============================================================================
// Client - Confirmation
// ============================================================================

impl Client {
    /// Waits until `signature` reaches `commitment`, using the configured timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidSignature`] for malformed text
    /// - [`Error::Confirm`] wrapping a timeout or an execution failure
    pub async fn confirm_transaction<S: ToSignature + ?Sized>(
        &self,
        signature: &S,
        commitment: Commitment,
    ) -> Result<TransactionRecord> {
        let timeout = self.inner.config.confirm_timeout;
        self.confirm_transaction_with(signature, commitment, timeout, &CancellationToken::new())
            .await
    }

    /// Like [`confirm_transaction`](Self::confirm_transaction) with an explicit
    /// deadline and cancellation.
    ///
    /// # Errors
    ///
    /// See [`confirm_transaction`](Self::confirm_transaction).
    pub async fn confirm_transaction_with<S: ToSignature + ?Sized>(
        &self,
        signature: &S,
        commitment: Commitment,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<TransactionRecord> {
        let signature = signature.to_signature()?;
        debug!(%signature, %commitment, timeout_ms = timeout.as_millis() as u64, "Confirming transaction");

        let record = self
            .inner
            .tracker
            .await_confirmation_with_cancel(&signature, commitment, timeout, cancel)
            .await?;
        Ok(record)
    }

    /// Polls the node once and returns the updated record.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidSignature`] for malformed text
    /// - the poll call's error
    pub async fn get_transaction_status<S: ToSignature + ?Sized>(
        &self,
        signature: &S,
    ) -> Result<TransactionRecord> {
        let signature = signature.to_signature()?;
        self.inner.tracker.refresh(&signature).await
    }

    /// Stops tracking `signature` and returns its last record.
    ///
    /// Pending confirmations of it end with a timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSignature`] for malformed text.
    pub fn forget_transaction<S: ToSignature + ?Sized>(
        &self,
        signature: &S,
    ) -> Result<Option<TransactionRecord>> {
        let signature = signature.to_signature()?;
        Ok(self.inner.tracker.forget(&signature))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as Base64Standard;
    use serde_json::{Value, json};

    use crate::client::core::test_support::{blockhash, client, context};
    use crate::client::wallet::Keypair;
    use crate::error::ConfirmError;
    use crate::identifiers::Address;
    use crate::tracker::TransactionState;
    use crate::transport::mock::{MockHttp, MockRequest};

    use super::*;

    /// Answers blockhash and submission; echoes the transaction's first signature.
    fn node(request: &MockRequest) -> Result<Value> {
        match request.method.as_str() {
            "getLatestBlockhash" => Ok(blockhash()),
            "sendTransaction" => {
                let wire = Base64Standard
                    .decode(request.params[0].as_str().unwrap())
                    .unwrap();
                let first: [u8; 64] = wire[1..65].try_into().unwrap();
                Ok(json!(Signature::from(first).to_string()))
            }
            other => panic!("unexpected {other}"),
        }
    }

    #[tokio::test]
    async fn test_zero_transfer_makes_no_calls() {
        let http = Arc::new(MockHttp::new(node));
        let client = client(&http, "ws://127.0.0.1:1");
        let sender = Keypair::from_seed(&[1; 32]);

        let err = client
            .send_transaction(&sender, &Address::new([2; 32]), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAmount { amount: 0, .. }));
        assert_eq!(http.calls(), 0);
    }

    #[tokio::test]
    async fn test_transfer_submits_and_tracks() {
        let http = Arc::new(MockHttp::new(node));
        let client = client(&http, "ws://127.0.0.1:1");
        let sender = Keypair::from_seed(&[1; 32]);

        let signature = client
            .send_transaction(&sender, &Address::new([2; 32]), 5_000)
            .await
            .unwrap();

        assert_eq!(http.calls(), 2);
        let record = client.tracker().status(&signature).unwrap();
        assert_eq!(record.state, TransactionState::Submitted);
    }

    #[tokio::test]
    async fn test_forget_transaction_stops_tracking() {
        let http = Arc::new(MockHttp::new(node));
        let client = client(&http, "ws://127.0.0.1:1");
        let sender = Keypair::from_seed(&[1; 32]);

        let signature = client
            .send_transaction(&sender, &Address::new([2; 32]), 5_000)
            .await
            .unwrap();

        let record = client.forget_transaction(&signature).unwrap().unwrap();
        assert_eq!(record.state, TransactionState::Submitted);
        assert!(client.tracker().status(&signature).is_none());
        assert!(client.forget_transaction(&signature).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejected_submission_not_retried() {
        let sends = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&sends);
        let http = Arc::new(MockHttp::new(move |request| match request.method.as_str() {
            "getLatestBlockhash" => Ok(blockhash()),
            _ => {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(Error::rpc(-32002, "insufficient funds for fee"))
            }
        }));
        let client = client(&http, "ws://127.0.0.1:1");
        let sender = Keypair::from_seed(&[1; 32]);

        let err = client
            .send_transaction(&sender, &Address::new([2; 32]), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Rpc { code: -32002, .. }));
        assert_eq!(sends.load(Ordering::SeqCst), 1);
        assert!(client.tracker().is_empty());
    }

    #[tokio::test]
    async fn test_program_instruction_with_foreign_signer_fails_locally() {
        let http = Arc::new(MockHttp::new(node));
        let client = client(&http, "ws://127.0.0.1:1");
        let payer = Keypair::from_seed(&[1; 32]);

        let err = client
            .send_program_instruction(
                &payer,
                &Address::new([7; 32]),
                vec![AccountMeta::new(Address::new([8; 32]), true)],
                vec![1],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Signing { .. }));
        // Only the blockhash was fetched
        assert_eq!(http.calls(), 1);
    }

    #[tokio::test]
    async fn test_confirm_reaches_commitment_by_polling() {
        let http = Arc::new(MockHttp::new(|request| {
            assert_eq!(request.method, "getSignatureStatuses");
            Ok(context(json!([{
                "slot": 10,
                "confirmations": null,
                "err": null,
                "confirmationStatus": "finalized"
            }])))
        }));
        // Push path needs the socket; leave it unreachable so polling wins
        let client = client(&http, "ws://127.0.0.1:1");
        let signature = Signature::from([4u8; 64]);

        let record = client
            .confirm_transaction_with(
                &signature.to_string(),
                Commitment::Confirmed,
                Duration::from_secs(2),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(record.state, TransactionState::Finalized);
    }

    #[tokio::test]
    async fn test_confirm_timeout_is_confirm_error() {
        let http = Arc::new(MockHttp::new(|_| Ok(context(json!([null])))));
        let client = client(&http, "ws://127.0.0.1:1");
        let signature = Signature::from([5u8; 64]);

        let err = client
            .confirm_transaction_with(
                &signature,
                Commitment::Finalized,
                Duration::from_millis(100),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Confirm(ConfirmError::Timeout { .. })));
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_status_reports_execution_failure() {
        let http = Arc::new(MockHttp::new(|_| {
            Ok(context(json!([{
                "slot": 3,
                "confirmations": 1,
                "err": {"InstructionError": [0, "Custom"]},
                "confirmationStatus": "confirmed"
            }])))
        }));
        let client = client(&http, "ws://127.0.0.1:1");

        let record = client
            .get_transaction_status(&Signature::from([6u8; 64]))
            .await
            .unwrap();
        assert!(matches!(record.state, TransactionState::Failed(_)));
    }
}

//! Push-notification methods.

use tracing::debug;

use crate::error::Result;
use crate::identifiers::{ToAddress, ToSignature};
use crate::protocol::{ProgramFilter, SubscriptionTarget};
use crate::subscription::{Subscription, UnsubscribeOutcome};

use super::Client;

// ============================================================================
// Client - Subscriptions
// ============================================================================

impl Client {
    /// Streams changes to one account.
    ///
    /// Opens the WebSocket on first use.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAddress`](crate::Error::InvalidAddress) before any network call
    /// - [`Error::SubscriptionFailed`](crate::Error::SubscriptionFailed) if the node refuses
    pub async fn subscribe_to_account_changes<A: ToAddress + ?Sized>(
        &self,
        address: &A,
    ) -> Result<Subscription> {
        let address = address.to_address()?;
        debug!(%address, "Subscribing to account");
        self.inner
            .subscriptions
            .subscribe(SubscriptionTarget::Account(address), self.commitment())
            .await
    }

    /// Streams changes to accounts owned by `program`, narrowed by `filters`.
    ///
    /// # Errors
    ///
    /// See [`subscribe_to_account_changes`](Self::subscribe_to_account_changes).
    pub async fn subscribe_to_program<P: ToAddress + ?Sized>(
        &self,
        program: &P,
        filters: Vec<ProgramFilter>,
    ) -> Result<Subscription> {
        let program = program.to_address()?;
        debug!(%program, filters = filters.len(), "Subscribing to program");
        self.inner
            .subscriptions
            .subscribe(SubscriptionTarget::Program { program, filters }, self.commitment())
            .await
    }

    /// Streams the one result of a transaction. The subscription ends after it.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidSignature`](crate::Error::InvalidSignature) before any network call
    /// - [`Error::SubscriptionFailed`](crate::Error::SubscriptionFailed) if the node refuses
    pub async fn subscribe_to_signature<S: ToSignature + ?Sized>(
        &self,
        signature: &S,
    ) -> Result<Subscription> {
        let signature = signature.to_signature()?;
        self.inner
            .subscriptions
            .subscribe(SubscriptionTarget::Signature(signature), self.commitment())
            .await
    }

    /// Ends a subscription. A second call reports
    /// [`UnsubscribeOutcome::NotSubscribed`].
    ///
    /// The listener is torn down even if the node rejects the call.
    ///
    /// # Errors
    ///
    /// Returns the unsubscribe call's error.
    pub async fn unsubscribe(&self, subscription: &Subscription) -> Result<UnsubscribeOutcome> {
        self.inner.subscriptions.unsubscribe(subscription).await
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Per-resource services.
//!
//! A service borrows the `ApiClient` it was created from and turns typed
//! arguments into `ApiCall`s from the `catalog`. Obtain one with
//! `client.transactions()`, `client.refunds()` and so on.

use std::path::PathBuf;

use crate::catalog;
use crate::client::ApiClient;
use crate::error::{Error, Result};
use crate::models::{
    Account, EntityQuery, EntityQueryFilter, Refund, RefundCreate, Subscription,
    SubscriptionCreate, Transaction, TransactionCreate, TransactionPending, WebhookUrl,
    WebhookUrlCreate,
};

pub struct AccountService<'a> {
    client: &'a ApiClient,
}

impl<'a> AccountService<'a> {
    pub fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub fn read(&self, id: i64) -> Result<Account> {
        let call = catalog::ACCOUNT_READ.call().query("id", id);
        self.client.call_api(call)?.into_value()
    }
}

pub struct TransactionService<'a> {
    client: &'a ApiClient,
}

impl<'a> TransactionService<'a> {
    pub fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub fn create(&self, space_id: i64, transaction: &TransactionCreate) -> Result<Transaction> {
        let call = catalog::TRANSACTION_CREATE
            .call()
            .query("spaceId", space_id)
            .model_body(transaction);
        self.client.call_api(call)?.into_value()
    }

    pub fn read(&self, space_id: i64, id: i64) -> Result<Transaction> {
        let call = catalog::TRANSACTION_READ
            .call()
            .query("spaceId", space_id)
            .query("id", id);
        self.client.call_api(call)?.into_value()
    }

    /// Update a pending transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Versioning`] when `transaction.version` is stale, and
    /// [`Error::Serialization`] when `transaction.id` is missing.
    pub fn update(&self, space_id: i64, transaction: &TransactionPending) -> Result<Transaction> {
        let id = transaction
            .id
            .ok_or_else(|| Error::serialization("TransactionPending.id is required for an update"))?;
        let call = catalog::TRANSACTION_UPDATE
            .call()
            .path_param("id", &id)
            .query("spaceId", space_id)
            .model_body(transaction);
        self.client.call_api(call)?.into_value()
    }

    /// Number of transactions matching `filter`, or all of them.
    pub fn count(&self, space_id: i64, filter: Option<&EntityQueryFilter>) -> Result<i64> {
        let mut call = catalog::TRANSACTION_COUNT.call().query("spaceId", space_id);
        if let Some(filter) = filter {
            call = call.model_body(filter);
        }
        self.client.call_api(call)?.into_value()
    }

    pub fn search(&self, space_id: i64, query: &EntityQuery) -> Result<Vec<Transaction>> {
        let call = catalog::TRANSACTION_SEARCH
            .call()
            .query("spaceId", space_id)
            .model_body(query);
        self.client.call_api(call)?.into_value()
    }

    /// Download the invoice PDF into a temp file owned by the caller.
    pub fn invoice_document(&self, space_id: i64, id: i64) -> Result<PathBuf> {
        let call = catalog::TRANSACTION_INVOICE_DOCUMENT
            .call()
            .query("spaceId", space_id)
            .query("id", id);
        self.client.call_api(call)?.into_file()
    }
}

pub struct RefundService<'a> {
    client: &'a ApiClient,
}

impl<'a> RefundService<'a> {
    pub fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub fn refund(&self, space_id: i64, refund: &RefundCreate) -> Result<Refund> {
        let call = catalog::REFUND_REFUND
            .call()
            .query("spaceId", space_id)
            .model_body(refund);
        self.client.call_api(call)?.into_value()
    }

    pub fn read(&self, space_id: i64, id: i64) -> Result<Refund> {
        let call = catalog::REFUND_READ
            .call()
            .query("spaceId", space_id)
            .query("id", id);
        self.client.call_api(call)?.into_value()
    }
}

pub struct SubscriptionService<'a> {
    client: &'a ApiClient,
}

impl<'a> SubscriptionService<'a> {
    pub fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub fn create(&self, space_id: i64, subscription: &SubscriptionCreate) -> Result<Subscription> {
        let call = catalog::SUBSCRIPTION_CREATE
            .call()
            .query("spaceId", space_id)
            .model_body(subscription);
        self.client.call_api(call)?.into_value()
    }

    pub fn read(&self, space_id: i64, id: i64) -> Result<Subscription> {
        let call = catalog::SUBSCRIPTION_READ
            .call()
            .query("spaceId", space_id)
            .query("id", id);
        self.client.call_api(call)?.into_value()
    }

    /// Terminate a subscription, either now or at the end of the current
    /// termination period.
    pub fn terminate(&self, space_id: i64, id: i64, respect_termination_period: bool) -> Result<()> {
        let call = catalog::SUBSCRIPTION_TERMINATE
            .call()
            .query("spaceId", space_id)
            .query("subscriptionId", id)
            .query("respectTerminationPeriod", respect_termination_period);
        self.client.call_api(call)?;
        Ok(())
    }
}

pub struct WebhookUrlService<'a> {
    client: &'a ApiClient,
}

impl<'a> WebhookUrlService<'a> {
    pub fn new(client: &'a ApiClient) -> Self {
        Self { client }
    }

    pub fn create(&self, space_id: i64, webhook_url: &WebhookUrlCreate) -> Result<WebhookUrl> {
        let call = catalog::WEBHOOK_URL_CREATE
            .call()
            .query("spaceId", space_id)
            .model_body(webhook_url);
        self.client.call_api(call)?.into_value()
    }

    pub fn read(&self, space_id: i64, id: i64) -> Result<WebhookUrl> {
        let call = catalog::WEBHOOK_URL_READ
            .call()
            .query("spaceId", space_id)
            .query("id", id);
        self.client.call_api(call)?.into_value()
    }

    /// Delete a webhook URL. Returns the server's plain-text acknowledgement.
    pub fn delete(&self, space_id: i64, id: i64) -> Result<String> {
        let call = catalog::WEBHOOK_URL_DELETE
            .call()
            .path_param("id", &id)
            .query("spaceId", space_id);
        self.client.call_api(call)?.into_text()
    }
}

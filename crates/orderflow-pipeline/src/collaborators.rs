//! External collaborator seams: mail sending and warehouse reservation.
//!
//! The pipeline only owns the trigger contract; the real side effects live
//! behind these traits. Collaborator failures split into transient
//! (retryable with backoff) and permanent (acked and logged, never
//! retried).

use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by an external collaborator.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// Temporary condition (timeout, throttling); the caller may retry.
    #[error("Transient collaborator failure: {0}")]
    Transient(String),

    /// Validation-class rejection (invalid address, unknown SKU); retrying
    /// cannot succeed.
    #[error("Permanent collaborator failure: {0}")]
    Permanent(String),
}

/// Outbound confirmation mail.
#[async_trait]
pub trait MailSender: Send + Sync {
    /// Send one message. Transient errors are retryable, permanent errors
    /// are not.
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), CollaboratorError>;
}

/// Warehouse stock reservation.
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Reserve `quantity` units of `sku` against an order. Reservations
    /// are keyed by `(order_id, sku)` on the warehouse side, so repeating
    /// the call is safe.
    async fn reserve(
        &self,
        sku: &str,
        quantity: u32,
        order_id: &str,
    ) -> Result<(), CollaboratorError>;
}

/// Default mail sender: emits the trigger as a structured log event and
/// succeeds. Stands in until a real mail backend is wired up.
#[derive(Debug)]
pub struct LoggingMailSender {
    from_address: String,
}

impl LoggingMailSender {
    pub fn new(from_address: impl Into<String>) -> Self {
        Self {
            from_address: from_address.into(),
        }
    }
}

impl Default for LoggingMailSender {
    fn default() -> Self {
        Self::new("orders@localhost")
    }
}

#[async_trait]
impl MailSender for LoggingMailSender {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        _html_body: &str,
    ) -> Result<(), CollaboratorError> {
        tracing::info!(
            target: "email_worker",
            from = %self.from_address,
            to = %to,
            subject = %subject,
            body_len = text_body.len(),
            "Mail send triggered"
        );
        Ok(())
    }
}

/// Default warehouse: emits the reservation as a structured log event and
/// succeeds.
#[derive(Debug, Default)]
pub struct LoggingWarehouse;

#[async_trait]
impl Warehouse for LoggingWarehouse {
    async fn reserve(
        &self,
        sku: &str,
        quantity: u32,
        order_id: &str,
    ) -> Result<(), CollaboratorError> {
        tracing::info!(
            target: "inventory_worker",
            sku = %sku,
            quantity,
            order_id = %order_id,
            "Stock reservation triggered"
        );
        Ok(())
    }
}

//! Email topic consumer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::info;

use orderflow_events::EmailMessage;
use orderflow_queue::QueueMessage;

use crate::collaborators::{CollaboratorError, MailSender};

use super::{format_amount, guard_cutoff, HandleError, MessageHandler, DEFAULT_GUARD_WINDOW};

/// Sends confirmation mail for order and payment events.
///
/// Keeps a sent-guard keyed by message kind and order id so a redelivered
/// message does not mail the customer twice. Duplicates only arrive
/// within the queue's retry horizon, so guard entries expire after a
/// bounded window instead of accumulating for the life of the process.
/// A message without a customer email is acknowledged and skipped, there
/// is nobody to notify.
pub struct EmailDispatcher {
    mail: Arc<dyn MailSender>,
    guard_window: Duration,
    sent: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl EmailDispatcher {
    pub fn new(mail: Arc<dyn MailSender>) -> Self {
        Self {
            mail,
            guard_window: DEFAULT_GUARD_WINDOW,
            sent: Mutex::new(HashMap::new()),
        }
    }

    /// Override how long a sent-guard entry is retained. Must cover the
    /// queue's full retry horizon.
    #[must_use]
    pub fn with_guard_window(mut self, window: Duration) -> Self {
        self.guard_window = window;
        self
    }
}

fn map_collaborator_error(err: CollaboratorError) -> HandleError {
    match err {
        CollaboratorError::Transient(reason) => HandleError::Retryable(reason),
        CollaboratorError::Permanent(reason) => HandleError::Fatal(reason),
    }
}

#[async_trait]
impl MessageHandler for EmailDispatcher {
    fn name(&self) -> &'static str {
        "email_worker"
    }

    async fn handle(&self, message: &QueueMessage) -> Result<(), HandleError> {
        let parsed: EmailMessage = serde_json::from_value(message.body.clone())
            .map_err(|err| HandleError::Fatal(format!("malformed email message: {err}")))?;

        let (guard_key, recipient, subject, text_body) = match parsed {
            EmailMessage::OrderCreated {
                order_id,
                customer_email,
                amount_total,
                currency,
            } => {
                let Some(recipient) = customer_email else {
                    info!(
                        target: "email_worker",
                        order_id = %order_id,
                        "No customer email on order, skipping confirmation"
                    );
                    return Ok(());
                };
                let amount = format_amount(amount_total, &currency);
                (
                    format!("order_created:{order_id}"),
                    recipient,
                    format!("Order confirmation {order_id}"),
                    format!(
                        "Thank you for your order!\n\n\
                         Order {order_id} for {amount} has been received and is being processed."
                    ),
                )
            }
            EmailMessage::PaymentConfirmed {
                payment_intent_id,
                customer_email,
                amount,
                currency,
            } => {
                let Some(recipient) = customer_email else {
                    info!(
                        target: "email_worker",
                        order_id = %payment_intent_id,
                        "No customer email on payment, skipping receipt"
                    );
                    return Ok(());
                };
                let amount = format_amount(amount, &currency);
                (
                    format!("payment_confirmed:{payment_intent_id}"),
                    recipient,
                    "Payment received".to_string(),
                    format!("We have received your payment of {amount}. Thank you!"),
                )
            }
        };

        {
            let mut sent = self.sent.lock().await;
            let cutoff = guard_cutoff(self.guard_window);
            sent.retain(|_, sent_at| *sent_at >= cutoff);
            if sent.contains_key(&guard_key) {
                info!(
                    target: "email_worker",
                    guard = %guard_key,
                    "Mail already sent for this message, skipping"
                );
                return Ok(());
            }
        }

        let html_body = format!("<p>{}</p>", text_body.replace('\n', "<br>"));
        self.mail
            .send(&recipient, &subject, &text_body, &html_body)
            .await
            .map_err(map_collaborator_error)?;

        self.sent.lock().await.insert(guard_key, Utc::now());
        Ok(())
    }
}

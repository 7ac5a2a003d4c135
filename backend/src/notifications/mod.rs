use std::sync::Arc;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// A notification job. Jobs are enqueued from request handlers and drained
/// by a single worker task, so sending email never sits on request latency.
#[derive(Debug, Clone, PartialEq)]
pub enum EmailJob {
    BookingConfirmation {
        customer_email: String,
        booking_id: Uuid,
    },
    PaymentConfirmation {
        user_email: String,
        booking_reference: String,
        amount: BigDecimal,
    },
}

impl EmailJob {
    pub fn recipient(&self) -> &str {
        match self {
            EmailJob::BookingConfirmation { customer_email, .. } => customer_email,
            EmailJob::PaymentConfirmation { user_email, .. } => user_email,
        }
    }

    /// Renders (subject, body) for the job.
    pub fn render(&self) -> (String, String) {
        match self {
            EmailJob::BookingConfirmation { booking_id, .. } => (
                format!("Booking Confirmation #{booking_id}"),
                format!("Hello, your booking #{booking_id} has been confirmed. Thank you!"),
            ),
            EmailJob::PaymentConfirmation {
                booking_reference,
                amount,
                ..
            } => (
                "Payment Confirmation".to_string(),
                format!(
                    "Your payment for booking {booking_reference} of amount {amount} has been successfully completed."
                ),
            ),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MailerError {
    #[error("failed to build message: {0}")]
    Message(String),
    #[error("smtp transport error: {0}")]
    Transport(String),
}

/// Email delivery seam. The worker depends on this trait, so tests can
/// substitute a recording implementation for the SMTP transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailerError>;
}

/// SMTP-backed mailer.
pub struct SmtpMailer {
    server: String,
    port: u16,
    credentials: Credentials,
    from_email: String,
}

impl SmtpMailer {
    pub fn new(
        server: String,
        port: u16,
        username: String,
        password: String,
        from_email: String,
    ) -> Self {
        Self {
            server,
            port,
            credentials: Credentials::new(username, password),
            from_email,
        }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailerError> {
        let from: Mailbox = self
            .from_email
            .parse()
            .map_err(|e| MailerError::Message(format!("invalid from address: {e}")))?;
        let to: Mailbox = to
            .parse()
            .map_err(|e| MailerError::Message(format!("invalid recipient address: {e}")))?;
        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| MailerError::Message(e.to_string()))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.server)
            .map_err(|e| MailerError::Transport(e.to_string()))?
            .port(self.port)
            .credentials(self.credentials.clone())
            .build();
        transport
            .send(message)
            .await
            .map_err(|e| MailerError::Transport(e.to_string()))?;
        Ok(())
    }
}

/// Cloneable handle for enqueuing jobs. Enqueue is fire-and-forget: if the
/// worker is gone the job is dropped with a warning, never an error on the
/// request path.
#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::UnboundedSender<EmailJob>,
}

impl Notifier {
    pub fn enqueue(&self, job: EmailJob) {
        if self.tx.send(job).is_err() {
            warn!("notification worker is gone; email job dropped");
        }
    }
}

/// Spawns the worker task and returns the enqueue handle.
pub fn spawn_worker(mailer: Arc<dyn Mailer>) -> Notifier {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(run_worker(rx, mailer));
    Notifier { tx }
}

/// Drains the queue until every sender is dropped. Delivery failures are
/// logged and swallowed; nothing is reported back to the request path.
async fn run_worker(mut rx: mpsc::UnboundedReceiver<EmailJob>, mailer: Arc<dyn Mailer>) {
    while let Some(job) = rx.recv().await {
        let (subject, body) = job.render();
        let to = job.recipient().to_string();
        match mailer.send(&to, &subject, &body).await {
            Ok(()) => info!("notification email sent to {}", to),
            Err(e) => error!("notification email to {} failed: {}", to, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingMailer {
        sent: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), MailerError> {
            self.sent
                .lock()
                .unwrap()
                .push((to.to_string(), subject.to_string(), body.to_string()));
            Ok(())
        }
    }

    struct FailingMailer;

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send(&self, _: &str, _: &str, _: &str) -> Result<(), MailerError> {
            Err(MailerError::Transport("connection refused".to_string()))
        }
    }

    #[test]
    fn booking_confirmation_renders_expected_wording() {
        let booking_id = Uuid::new_v4();
        let job = EmailJob::BookingConfirmation {
            customer_email: "guest@example.com".to_string(),
            booking_id,
        };
        let (subject, body) = job.render();
        assert_eq!(subject, format!("Booking Confirmation #{booking_id}"));
        assert_eq!(
            body,
            format!("Hello, your booking #{booking_id} has been confirmed. Thank you!")
        );
    }

    #[test]
    fn payment_confirmation_renders_expected_wording() {
        let job = EmailJob::PaymentConfirmation {
            user_email: "guest@example.com".to_string(),
            booking_reference: "booking-42".to_string(),
            amount: BigDecimal::from(240),
        };
        let (subject, body) = job.render();
        assert_eq!(subject, "Payment Confirmation");
        assert_eq!(
            body,
            "Your payment for booking booking-42 of amount 240 has been successfully completed."
        );
    }

    #[tokio::test]
    async fn worker_sends_one_email_per_job() {
        let mailer = Arc::new(RecordingMailer::default());
        let (tx, rx) = mpsc::unbounded_channel();

        let booking_id = Uuid::new_v4();
        tx.send(EmailJob::BookingConfirmation {
            customer_email: "a@example.com".to_string(),
            booking_id,
        })
        .unwrap();
        tx.send(EmailJob::PaymentConfirmation {
            user_email: "b@example.com".to_string(),
            booking_reference: "booking-7".to_string(),
            amount: BigDecimal::from(99),
        })
        .unwrap();
        drop(tx);

        run_worker(rx, mailer.clone()).await;

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, "a@example.com");
        assert_eq!(sent[1].0, "b@example.com");
    }

    #[tokio::test]
    async fn worker_swallows_delivery_failures() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(EmailJob::BookingConfirmation {
            customer_email: "a@example.com".to_string(),
            booking_id: Uuid::new_v4(),
        })
        .unwrap();
        drop(tx);

        // Completes without panicking even though every send fails.
        run_worker(rx, Arc::new(FailingMailer)).await;
    }

    #[tokio::test]
    async fn enqueue_after_worker_shutdown_does_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let notifier = Notifier { tx };
        notifier.enqueue(EmailJob::BookingConfirmation {
            customer_email: "a@example.com".to_string(),
            booking_id: Uuid::new_v4(),
        });
    }
}

use aws_sdk_sns::Client as SnsClient;
use thiserror::Error;

use crate::model::api::{otp::Code, sms::Sms};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Failed to send SMS: {0}")]
    Sms(String),
}

/// Outgoing messages to users. Every method makes a single delivery attempt.
#[rocket::async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a raw text message.
    async fn send_sms(&self, recipient: &Sms, message: &str) -> Result<(), NotifyError>;

    /// Confirm a ballot to the voter who cast it.
    async fn notify_vote_cast(
        &self,
        recipient: &Sms,
        candidate_name: &str,
        position_title: &str,
    ) -> Result<(), NotifyError> {
        let message =
            format!("Your vote for {candidate_name} as {position_title} has been recorded.");
        self.send_sms(recipient, &message).await
    }

    /// Send a two-factor sign-in code.
    async fn send_code(&self, recipient: &Sms, code: &Code) -> Result<(), NotifyError> {
        self.send_sms(recipient, &format!("Your election sign-in code is {code}"))
            .await
    }

    /// Send a password reset token.
    async fn send_password_reset(&self, recipient: &Sms, token: &str) -> Result<(), NotifyError> {
        self.send_sms(recipient, &format!("Your password reset token is {token}"))
            .await
    }
}

/// Sends messages through Amazon SNS.
pub struct SnsNotifier {
    client: SnsClient,
}

impl SnsNotifier {
    pub fn new(client: SnsClient) -> Self {
        Self { client }
    }
}

#[rocket::async_trait]
impl Notifier for SnsNotifier {
    async fn send_sms(&self, recipient: &Sms, message: &str) -> Result<(), NotifyError> {
        self.client
            .publish()
            .phone_number(recipient.to_string())
            .message(message)
            .send()
            .await
            .map_err(|e| NotifyError::Sms(e.to_string()))?;
        Ok(())
    }
}

/// Writes messages to the log instead of sending them.
pub struct LogNotifier;

#[rocket::async_trait]
impl Notifier for LogNotifier {
    async fn send_sms(&self, recipient: &Sms, message: &str) -> Result<(), NotifyError> {
        info!("SMS to {}: {message}", recipient);
        Ok(())
    }
}

#[cfg(test)]
pub use testing::{FailingNotifier, RecordingNotifier};

#[cfg(test)]
mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Keeps every message so tests can inspect them.
    #[derive(Default)]
    pub struct RecordingNotifier {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl RecordingNotifier {
        /// All `(recipient, message)` pairs sent so far.
        pub fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[rocket::async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_sms(&self, recipient: &Sms, message: &str) -> Result<(), NotifyError> {
            self.sent
                .lock()
                .unwrap()
                .push((recipient.to_string(), message.to_string()));
            Ok(())
        }
    }

    /// Fails every delivery.
    pub struct FailingNotifier;

    #[rocket::async_trait]
    impl Notifier for FailingNotifier {
        async fn send_sms(&self, _recipient: &Sms, _message: &str) -> Result<(), NotifyError> {
            Err(NotifyError::Sms("provider unavailable".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rocket::async_test]
    async fn default_messages_name_their_subject() {
        let notifier = RecordingNotifier::default();
        let code: Code = "042917".parse().unwrap();
        notifier.send_code(&Sms::example(), &code).await.unwrap();
        notifier
            .notify_vote_cast(&Sms::example(), "Sonam Yangzom", "Chief Councillor")
            .await
            .unwrap();

        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, Sms::example().to_string());
        assert!(sent[0].1.ends_with("042917"));
        assert_eq!(
            sent[1].1,
            "Your vote for Sonam Yangzom as Chief Councillor has been recorded."
        );
    }

    #[rocket::async_test]
    async fn log_notifier_never_fails() {
        // Delivery goes through the logger, so enable logging.
        log4rs_test_utils::test_logging::init_logging_once_for(
            ["council_votes_backend"],
            None,
            None,
        );
        let sms = Sms::example();
        assert!(LogNotifier.send_password_reset(&sms, "token").await.is_ok());
        assert!(FailingNotifier.send_sms(&sms, "hello").await.is_err());
    }
}

//! Outbound notification delivery channels.
use crate::domain::{Target, User};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;

/// One configured delivery channel. Delivery is fire-and-forget from the
/// sweeper's perspective; each channel logs its own failures.
pub trait NotificationSender: Send + Sync {
    fn deliver(&self, user: &User, target: &Target);
}

/// Sends notification emails through an HTTP mail relay.
pub struct EmailNotificationSender {
    http: Client,
    relay_url: String,
    from_address: String,
}

impl EmailNotificationSender {
    pub fn new(relay_url: String, from_address: String) -> reqwest::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("landsat-notify/0.1")
            .build()?;

        Ok(Self {
            http,
            relay_url,
            from_address,
        })
    }
}

impl NotificationSender for EmailNotificationSender {
    fn deliver(&self, user: &User, target: &Target) {
        let payload = json!({
            "from": self.from_address,
            "to": user.email,
            "subject": format!(
                "Notification for target \"{}\" (path, row: {}, {})",
                target.id, target.path, target.row
            ),
            "body": format!(
                "A new Landsat acquisition over path {}, row {} is predicted soon.",
                target.path, target.row
            ),
        });

        let http = self.http.clone();
        let relay_url = self.relay_url.clone();
        let email = user.email.clone();
        let target_id = target.id;

        tokio::spawn(async move {
            match http.post(&relay_url).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::info!(%email, %target_id, "notification email sent");
                }
                Ok(response) => {
                    tracing::error!(
                        %email,
                        %target_id,
                        status = %response.status(),
                        "mail relay rejected notification"
                    );
                }
                Err(err) => {
                    tracing::error!(%email, %target_id, error = %err, "failed to reach mail relay");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_construction_succeeds() {
        let sender = EmailNotificationSender::new(
            "http://localhost:2525/send".to_string(),
            "noreply@example.com".to_string(),
        );
        assert!(sender.is_ok());
    }
}

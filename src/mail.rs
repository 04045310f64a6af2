//! Send emails to user for one-time codes.

use serde::Serialize;

use crate::config::Mail;
use crate::error::{Result, ServerError};
use crate::otp::Purpose;

const BREVO_ENDPOINT: &str = "https://api.brevo.com/v3/smtp/email";
const API_KEY_HEADER: &str = "api-key";

#[derive(Debug, Serialize)]
struct Party<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    email: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransacEmail<'a> {
    sender: Party<'a>,
    to: Vec<Party<'a>>,
    subject: String,
    text_content: String,
}

/// Transactional email manager.
///
/// Unconfigured instances drop messages with a debug log, which keeps local
/// development working without a Brevo account.
#[derive(Debug, Clone, Default)]
pub struct MailManager {
    http: reqwest::Client,
    api_key: Option<String>,
    sender: String,
    sender_name: String,
}

impl MailManager {
    /// Create a new [`MailManager`].
    pub fn new(config: &Mail, instance_name: &str, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            sender: config.sender.clone(),
            sender_name: config
                .sender_name
                .clone()
                .unwrap_or_else(|| instance_name.to_owned()),
        }
    }

    /// Send the templated one-time-code email for a flow.
    ///
    /// The code itself never appears in any HTTP response; this email is the
    /// only channel it travels on.
    pub async fn send_code(&self, purpose: Purpose, email: &str, code: &str) -> Result<()> {
        let Some(api_key) = &self.api_key else {
            tracing::debug!(%purpose, "mail manager unconfigured, code not sent");
            return Ok(());
        };

        let (subject, body) = template(purpose, code);
        let payload = TransacEmail {
            sender: Party {
                name: Some(&self.sender_name),
                email: &self.sender,
            },
            to: vec![Party { name: None, email }],
            subject,
            text_content: body,
        };

        let response = self
            .http
            .post(BREVO_ENDPOINT)
            .header(API_KEY_HEADER, api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| ServerError::upstream("brevo", err))?;

        if let Err(err) = response.error_for_status() {
            return Err(ServerError::upstream("brevo", err));
        }

        tracing::trace!(%purpose, "one-time code email sent");
        Ok(())
    }
}

fn template(purpose: Purpose, code: &str) -> (String, String) {
    match purpose {
        Purpose::Register => (
            "SakSin Registration OTP".into(),
            format!("Your OTP for SakSin registration is: {code}. It is valid for 10 minutes."),
        ),
        Purpose::Login => (
            "SakSin Login OTP".into(),
            format!("Your OTP for SakSin login is: {code}. It is valid for 10 minutes."),
        ),
        Purpose::Forget => (
            "SakSin Password Reset OTP".into(),
            format!("Your OTP for SakSin password reset is: {code}. It is valid for 10 minutes."),
        ),
        Purpose::Update => (
            "SakSin Password Update OTP".into(),
            format!("Your OTP for SakSin password update is: {code}. It is valid for 10 minutes."),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_carry_code_and_validity() {
        for purpose in [
            Purpose::Register,
            Purpose::Login,
            Purpose::Forget,
            Purpose::Update,
        ] {
            let (subject, body) = template(purpose, "123456");
            assert!(subject.starts_with("SakSin"));
            assert!(body.contains("123456"));
            assert!(body.contains("10 minutes"));
        }
    }

    #[tokio::test]
    async fn test_unconfigured_manager_is_a_no_op() {
        let manager = MailManager::default();
        assert!(
            manager
                .send_code(Purpose::Login, "a@x.com", "123456")
                .await
                .is_ok()
        );
    }
}

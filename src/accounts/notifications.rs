use std::sync::Arc;

use tera::Tera;
use thiserror::Error;
use tracing::{error, info};

use crate::{
    email::clients::{EmailClient, Message},
    repos::TokenPersistenceError,
};

pub type DynEmailClient = Arc<dyn EmailClient>;

/// Settings shared by every outgoing account email.
///
/// Built once at startup and handed to [`Notifier::new`]. Nothing reads these
/// values from the environment after that point.
#[derive(Clone, Debug)]
pub struct NotificationConfig {
    base_url: String,
    from_address: String,
}

impl NotificationConfig {
    /// # Arguments
    ///
    /// * `base_url` - The public URL of the application. Confirmation links
    ///   are built relative to it. A trailing slash is ignored.
    /// * `from_address` - The address emails are sent from.
    pub fn new(base_url: &str, from_address: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            from_address: from_address.to_owned(),
        }
    }

    pub fn from_address(&self) -> &str {
        &self.from_address
    }

    pub fn activation_url(&self, uid: &str, token: &str) -> String {
        format!(
            "{}/api/v1/account/activate/?uid={}&token={}",
            self.base_url, uid, token
        )
    }

    pub fn password_reset_url(&self, token: &str) -> String {
        format!(
            "{}/api/v1/account/reset_password/?token={}",
            self.base_url, token
        )
    }
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("failed to persist token")]
    Persistence(#[from] TokenPersistenceError),

    #[error("email template {template:?} does not exist")]
    TemplateNotFound {
        template: String,
        #[source]
        source: tera::Error,
    },

    #[error("failed to render email template {template:?}")]
    Render {
        template: String,
        #[source]
        source: tera::Error,
    },

    #[error("mail transport failed to deliver the message")]
    MailTransport(#[source] anyhow::Error),
}

/// Renders email templates and hands the result to the mail transport.
#[derive(Clone)]
pub struct Notifier {
    config: NotificationConfig,
    email_client: DynEmailClient,
    templates: Arc<Tera>,
}

impl Notifier {
    pub fn new(config: NotificationConfig, email_client: DynEmailClient, templates: Tera) -> Self {
        Self {
            config,
            email_client,
            templates: Arc::new(templates),
        }
    }

    pub fn config(&self) -> &NotificationConfig {
        &self.config
    }

    /// Render a template and send it as an HTML email.
    ///
    /// The transport is called at most once, and only after the template
    /// rendered successfully.
    ///
    /// # Arguments
    ///
    /// * `template` - The name of a template known to the template engine.
    /// * `context` - The variables available to the template.
    /// * `subject` - The subject line.
    /// * `to` - The recipient's address. Validating it is left to the
    ///   transport.
    pub async fn send_email(
        &self,
        template: &str,
        context: &tera::Context,
        subject: &str,
        to: &str,
    ) -> Result<(), NotificationError> {
        let result = self.render_and_send(template, context, subject, to).await;

        match &result {
            Ok(()) => info!(recipient = %to, "Sent email."),
            Err(error) => error!(recipient = %to, ?error, "Failed to send email."),
        }

        result
    }

    async fn render_and_send(
        &self,
        template: &str,
        context: &tera::Context,
        subject: &str,
        to: &str,
    ) -> Result<(), NotificationError> {
        let html = self
            .templates
            .render(template, context)
            .map_err(|source| match source.kind {
                tera::ErrorKind::TemplateNotFound(_) => NotificationError::TemplateNotFound {
                    template: template.to_owned(),
                    source,
                },
                _ => NotificationError::Render {
                    template: template.to_owned(),
                    source,
                },
            })?;

        let message = Message {
            from: self.config.from_address().to_owned(),
            to: to.to_owned(),
            subject: subject.to_owned(),
            html,
        };

        self.email_client
            .send(&message)
            .await
            .map_err(NotificationError::MailTransport)
    }
}

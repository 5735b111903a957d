//! Outbound email for OTP delivery.
//!
//! SMTP transport configured for Gmail, built from config. Entries are
//! registered before any mail is dispatched, so a slow or failing send never
//! leaves a student untracked.
//!
//! # Environment Variables Required
//! - `GMAIL_USERNAME`: Gmail address to send emails from
//! - `GMAIL_APP_PASSWORD`: Gmail app password for authentication
//! - `EMAIL_FROM_NAME`: Display name for the sender

use async_trait::async_trait;
use lettre::{
    message::{header, Message, SinglePart},
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
        AsyncSmtpTransport,
    },
    AsyncTransport, Tokio1Executor,
};

use common::Config;

/// Email-sending capability invoked with `(to_email, subject, html_body)`.
/// No result is awaited by session registration.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to_email: &str, subject: &str, html_body: &str) -> Result<(), String>;
}

/// Gmail SMTP implementation.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    /// Builds the Gmail relay from global config.
    pub fn from_config() -> Self {
        let cfg = Config::get();

        let tls_parameters = TlsParameters::new("smtp.gmail.com".to_string())
            .expect("Failed to create TLS parameters");

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay("smtp.gmail.com")
            .expect("Failed to create SMTP transport")
            .port(587)
            .tls(Tls::Required(tls_parameters))
            .credentials(Credentials::new(
                cfg.gmail_username.clone(),
                cfg.gmail_app_password.clone(),
            ))
            .build();

        Self {
            transport,
            from: format!("{} <{}>", cfg.email_from_name, cfg.gmail_username),
        }
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to_email: &str, subject: &str, html_body: &str) -> Result<(), String> {
        let email = Message::builder()
            .from(self.from.parse().map_err(|e| format!("bad sender: {e}"))?)
            .to(to_email.parse().map_err(|e| format!("bad recipient: {e}"))?)
            .subject(subject)
            .singlepart(
                SinglePart::builder()
                    .header(header::ContentType::TEXT_HTML)
                    .body(html_body.to_string()),
            )
            .map_err(|e| e.to_string())?;

        self.transport
            .send(email)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

/// Subject and HTML body for one student's attendance code.
pub fn otp_email(course_code: &str, code: &str, validity_minutes: u32) -> (String, String) {
    let subject = format!("Your attendance code for {course_code}");
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <style>
        body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 20px; text-align: center; }}
        .code {{
            display: inline-block;
            padding: 10px 20px;
            background-color: #f4f4f4;
            border-radius: 5px;
            margin: 20px 0;
            font-size: 28px;
            font-weight: bold;
            letter-spacing: 4px;
        }}
    </style>
</head>
<body>
    <div class="container">
        <h2>Attendance check-in</h2>
        <p>Hello,</p>
        <p>Attendance is being taken for <strong>{course_code}</strong>. Enter this code to check in:</p>
        <div class="code">{code}</div>
        <p>The code rotates every {validity_minutes} minutes. If you are not in this lecture, please ignore this email.</p>
    </div>
</body>
</html>"#
    );
    (subject, html)
}

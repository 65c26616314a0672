use std::fmt::Write as _;

use chrono::Local;
use framework::exception;
use framework::exception::CoreRsResult;
use framework::log;
use framework::log::WarningBuffer;
use lettre::AsyncSmtpTransport;
use lettre::AsyncTransport as _;
use lettre::Message;
use lettre::Tokio1Executor;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use tracing::info;

use crate::config::EmailConfig;
use crate::verify::ErrorHistogram;

/// What a finished run hands to the notifier.
pub struct RunReport {
    // subject prefix, e.g. "RTI Data Scrubber"
    pub name: String,
    // None when there is nothing worth reporting
    pub report: Option<String>,
    pub errors: ErrorHistogram,
}

impl RunReport {
    pub fn warnings_only(name: String) -> Self {
        RunReport {
            name,
            report: None,
            errors: ErrorHistogram::default(),
        }
    }
}

/// Plain SMTP submission to the internal relay, no auth, no TLS.
pub struct Notifier<'a> {
    config: &'a EmailConfig,
}

impl<'a> Notifier<'a> {
    pub fn new(config: &'a EmailConfig) -> Self {
        Notifier { config }
    }

    /// Sends the report to the admin address and the warnings email to the warnings address.
    /// Submission failures are logged, never returned. Returns the number of emails sent.
    pub async fn write_emails(&self, run: &RunReport, warnings: &WarningBuffer) -> usize {
        let today = Local::now().format("%Y-%m-%d");
        let mut sent = 0;

        if let Some(ref report) = run.report {
            let subject = format!("{} Report: {today}", run.name);
            if self.send(&self.config.admin, &subject, report.clone()).await {
                sent += 1;
            }
        }

        // drain after the report, a failed report submission is itself a warning
        let lines = warnings.drain();
        if let Some(body) = warnings_body(&run.errors, &lines) {
            let subject = format!("{} Warnings: {today}", run.name);
            if self.send(&self.config.warnings, &subject, body).await {
                sent += 1;
            }
        }
        sent
    }

    async fn send(&self, to: &str, subject: &str, body: String) -> bool {
        match self.submit(to, subject, body).await {
            Ok(()) => {
                info!(to, subject, "email sent");
                true
            }
            Err(e) => {
                log::log_exception(&e);
                false
            }
        }
    }

    async fn submit(&self, to: &str, subject: &str, body: String) -> CoreRsResult<()> {
        let message = message(&self.config.from, to, subject, body)?;
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.config.relay)
            .port(self.config.port)
            .build();
        mailer.send(message).await.map_err(|err| {
            exception!(
                message = format!("failed to send email, relay={}, to={to}", self.config.relay),
                source = err
            )
        })?;
        Ok(())
    }
}

fn message(from: &str, to: &str, subject: &str, body: String) -> CoreRsResult<Message> {
    let from: Mailbox = from
        .parse::<Mailbox>()
        .map_err(|err| exception!(message = format!("invalid from address, from={from}"), source = err))?;
    let to: Mailbox = to
        .parse::<Mailbox>()
        .map_err(|err| exception!(message = format!("invalid to address, to={to}"), source = err))?;
    let message = Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .header(ContentType::TEXT_PLAIN)
        .body(body)?;
    Ok(message)
}

fn warnings_body(errors: &ErrorHistogram, lines: &[String]) -> Option<String> {
    if errors.is_empty() && lines.is_empty() {
        return None;
    }
    let mut body = String::new();
    if !errors.is_empty() {
        let _ = writeln!(body, "Records excluded by validation:\n{errors}");
    }
    for line in lines {
        let _ = writeln!(body, "{line}");
    }
    Some(body)
}

//! Alerting sinks.
//!
//! Alerts are fire-and-forget: the controller spawns the `notify` call and
//! only logs failures.

use std::process::ExitStatus;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use crate::config::AlertsConfig;

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("alert command is empty")]
    EmptyCommand,

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Exited {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[cfg(feature = "alert_webhook")]
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0} alerts are not supported by this build")]
    Unsupported(&'static str),
}

#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), AlertError>;
}

/// Build the sink described by `[alerts]`. Without a command or webhook,
/// alerts are only logged.
pub fn from_config(config: &AlertsConfig) -> Result<Arc<dyn AlertSink>, AlertError> {
    if let Some(command) = &config.command {
        return Ok(Arc::new(CommandAlertSink::new(command.clone())?));
    }

    if let Some(url) = &config.webhook {
        #[cfg(feature = "alert_webhook")]
        return Ok(Arc::new(WebhookAlertSink::new(url.clone())));

        #[cfg(not(feature = "alert_webhook"))]
        {
            let _ = url;
            return Err(AlertError::Unsupported("webhook"));
        }
    }

    Ok(Arc::new(LogAlertSink))
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn notify(&self, message: &str) -> Result<(), AlertError> {
        info!("Alert: {}", message);
        Ok(())
    }
}

/// Runs an external program with the message as its last argument, e.g. a
/// script that sends a text message.
#[derive(Debug, Clone)]
pub struct CommandAlertSink {
    program: String,
    args: Vec<String>,
}

impl CommandAlertSink {
    pub fn new(command: Vec<String>) -> Result<Self, AlertError> {
        let mut parts = command.into_iter();
        let program = parts.next().ok_or(AlertError::EmptyCommand)?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

#[async_trait]
impl AlertSink for CommandAlertSink {
    async fn notify(&self, message: &str) -> Result<(), AlertError> {
        info!("Notifying via {}: {}", self.program, message);

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(message)
            .output()
            .await
            .map_err(|source| AlertError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(AlertError::Exited {
                program: self.program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}

/// POSTs `{"message": ...}` to a URL.
#[cfg(feature = "alert_webhook")]
#[derive(Debug, Clone)]
pub struct WebhookAlertSink {
    client: reqwest::Client,
    url: String,
}

#[cfg(feature = "alert_webhook")]
impl WebhookAlertSink {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }
}

#[cfg(feature = "alert_webhook")]
#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn notify(&self, message: &str) -> Result<(), AlertError> {
        info!("Notifying via webhook: {}", message);
        self.client
            .post(&self.url)
            .json(&serde_json::json!({ "message": message }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Sink that forwards messages to a channel for assertions.
#[cfg(test)]
#[derive(Debug)]
pub struct RecordingAlertSink {
    pub tx: tokio::sync::mpsc::UnboundedSender<String>,
    pub fail: bool,
}

#[cfg(test)]
impl RecordingAlertSink {
    pub fn new(fail: bool) -> (Self, tokio::sync::mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx, fail }, rx)
    }
}

#[cfg(test)]
#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn notify(&self, message: &str) -> Result<(), AlertError> {
        let _ = self.tx.send(message.to_string());
        if self.fail {
            return Err(AlertError::EmptyCommand);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_command_rejected() {
        assert!(matches!(
            CommandAlertSink::new(vec![]),
            Err(AlertError::EmptyCommand)
        ));
    }

    #[tokio::test]
    async fn test_command_success() {
        let sink = CommandAlertSink::new(vec!["true".to_string()]).unwrap();
        sink.notify("battery level is 10%").await.unwrap();
    }

    #[tokio::test]
    async fn test_command_failure_reports_status() {
        let sink = CommandAlertSink::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo oops >&2; exit 3".to_string(),
            "send-text".to_string(),
        ])
        .unwrap();

        match sink.notify("hello").await {
            Err(AlertError::Exited { stderr, status, .. }) => {
                assert_eq!(stderr, "oops");
                assert_eq!(status.code(), Some(3));
            }
            other => panic!("expected Exited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program() {
        let sink = CommandAlertSink::new(vec!["/nonexistent/send-text".to_string()]).unwrap();
        assert!(matches!(
            sink.notify("hello").await,
            Err(AlertError::Spawn { .. })
        ));
    }

    #[test]
    fn test_from_config_defaults_to_log() {
        let sink = from_config(&AlertsConfig::default());
        assert!(sink.is_ok());
    }
}

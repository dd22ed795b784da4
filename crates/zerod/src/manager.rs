//! Management queries against the coordinator.

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;
use zero_core::OperatorState;

use crate::command::CommandClient;

/// Errors from a management query.
#[derive(Debug, Clone, Error)]
pub enum ManagerError {
    #[error("command failed ({state}): {message}")]
    Command {
        state: OperatorState,
        message: String,
    },

    #[error("coordinator returned no data")]
    EmptyReply,
}

/// Queries the coordinator answers on its management endpoint.
#[async_trait]
pub trait CenterManager: Send + Sync {
    /// Fetches every station document as a JSON array.
    async fn load_all_configs(&self) -> Result<String, ManagerError>;

    /// Fetches one station document.
    async fn load_config(&self, station: &str) -> Result<String, ManagerError>;
}

/// [`CenterManager`] backed by the command protocol (`host <name>`).
#[derive(Debug, Clone)]
pub struct SystemManager {
    client: CommandClient,
}

impl SystemManager {
    pub fn new(client: CommandClient) -> Self {
        Self { client }
    }

    async fn host(&self, target: &str) -> Result<String, ManagerError> {
        let result = self.client.call_command(&["host", target]).await;
        if !result.is_ok() {
            return Err(ManagerError::Command {
                state: result.state,
                message: result.error_message().unwrap_or_default().to_string(),
            });
        }
        match result.result {
            Some(reply) if !reply.trim().is_empty() => Ok(reply),
            _ => Err(ManagerError::EmptyReply),
        }
    }
}

#[async_trait]
impl CenterManager for SystemManager {
    async fn load_all_configs(&self) -> Result<String, ManagerError> {
        debug!("Loading all station configs");
        self.host("*").await
    }

    async fn load_config(&self, station: &str) -> Result<String, ManagerError> {
        debug!(%station, "Loading station config");
        self.host(station).await
    }
}

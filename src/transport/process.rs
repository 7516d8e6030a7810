//! Child process transport
//!
//! Spawns a server executable and exchanges frames over its stdin and stdout.
//! The child's stderr is inherited so its logs stay visible. Closing the
//! transport closes the child's stdin, waits briefly for it to exit, and kills
//! it otherwise; the child is always reaped.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{ Child, ChildStdin, ChildStdout, Command };
use tokio::sync::Mutex;
use tracing::{ debug, info, warn };

use crate::errors::Error;
use crate::messages::Message;

use super::{ FramedTransport, Transport };

/// How to launch a server process
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    /// Executable to run
    pub command: String,
    /// Command-line arguments
    pub args: Vec<String>,
    /// Extra environment variables
    pub env: HashMap<String, String>,
    /// How long to wait for a clean exit before killing the child
    pub shutdown_grace: Duration,
}

/// Transport connected to a spawned child process
pub struct ProcessTransport {
    inner: FramedTransport<ChildStdout, ChildStdin>,
    child: Mutex<Option<Child>>,
    shutdown_grace: Duration,
}

impl ProcessTransport {
    /// Start the process and wire up its standard streams
    pub fn spawn(config: &ProcessConfig) -> Result<Self, Error> {
        info!("Spawning server process: {} {:?}", config.command, config.args);

        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| Error::Transport(format!("Failed to spawn process '{}': {}", config.command, e)))?;

        // Get stdio handles
        let stdin = child.stdin
            .take()
            .ok_or_else(|| Error::Transport("Failed to get stdin handle".to_string()))?;
        let stdout = child.stdout
            .take()
            .ok_or_else(|| Error::Transport("Failed to get stdout handle".to_string()))?;

        Ok(Self {
            inner: FramedTransport::new(stdout, stdin),
            child: Mutex::new(Some(child)),
            shutdown_grace: config.shutdown_grace,
        })
    }
}

#[async_trait]
impl Transport for ProcessTransport {
    async fn send(&self, message: &Message) -> Result<(), Error> {
        self.inner.send(message).await
    }

    async fn receive(&self) -> Result<Option<Message>, Error> {
        self.inner.receive().await
    }

    async fn close(&self) -> Result<(), Error> {
        // Closing stdin is the polite request to exit
        self.inner.close().await?;

        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };

        match tokio::time::timeout(self.shutdown_grace, child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Server process exited with {}", status);
            }
            Ok(Err(e)) => {
                warn!("Failed to wait for server process: {}", e);
            }
            Err(_) => {
                warn!("Server process did not exit within {:?}, killing it", self.shutdown_grace);
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill server process: {}", e);
                }
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }
}

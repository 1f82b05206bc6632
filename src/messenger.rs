//! Messaging Seam
//!
//! The visible answer channel. A chat-platform client implements [`Messenger`]
//! for the conversation a question came from.

use crate::error::{RelayError, Result};
use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Posts into the conversation a question came from
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Show that the question was received (a "working" placeholder)
    async fn acknowledge(&self, notice: &str) -> Result<()>;

    /// Post one message
    async fn send(&self, text: &str) -> Result<()>;
}

/// Writes answers to any async writer, one block per message
pub struct ConsoleMessenger<W> {
    out: Mutex<W>,
}

impl ConsoleMessenger<tokio::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> ConsoleMessenger<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    async fn write_block(&self, text: &str) -> Result<()> {
        let mut out = self.out.lock().await;
        let written = async {
            out.write_all(text.as_bytes()).await?;
            out.write_all(b"\n").await?;
            out.flush().await
        }
        .await;

        written.map_err(|e| RelayError::Sink(format!("console write failed: {}", e)))
    }
}

#[async_trait]
impl<W> Messenger for ConsoleMessenger<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn acknowledge(&self, notice: &str) -> Result<()> {
        self.write_block(&format!("[{}]", notice)).await
    }

    async fn send(&self, text: &str) -> Result<()> {
        self.write_block(text).await
    }
}

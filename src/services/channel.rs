use anyhow::Context;
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin};
use tokio::sync::Mutex;

use crate::models::Session;
use crate::services::conversation::BookingOrchestrator;

/// Where the caller's words come from and where the agent's go.
#[async_trait]
pub trait ConversationChannel: Send + Sync {
    /// Speaks `prompt` and waits for the answer. `None` once the caller is gone.
    async fn ask(&self, prompt: &str) -> anyhow::Result<Option<String>>;

    async fn say(&self, message: &str) -> anyhow::Result<()>;
}

/// Runs one conversation to its end, or until the channel closes.
pub async fn run_conversation(
    channel: &dyn ConversationChannel,
    orchestrator: &BookingOrchestrator,
) -> anyhow::Result<Session> {
    let mut session = orchestrator.new_session();
    let mut reply = orchestrator.greet(&mut session);

    loop {
        if reply.finished {
            channel.say(&reply.message).await?;
            break;
        }
        match channel.ask(&reply.message).await? {
            Some(utterance) => {
                reply = orchestrator
                    .handle_user_utterance(&mut session, &utterance)
                    .await;
            }
            None => {
                tracing::info!(
                    session_id = %session.id,
                    stage = session.stage.as_str(),
                    "caller left"
                );
                break;
            }
        }
    }

    Ok(session)
}

/// Terminal stand-in for the voice line.
pub struct StdioChannel {
    input: Mutex<BufReader<Stdin>>,
}

impl StdioChannel {
    pub fn new() -> Self {
        Self {
            input: Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }
}

impl Default for StdioChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationChannel for StdioChannel {
    async fn ask(&self, prompt: &str) -> anyhow::Result<Option<String>> {
        self.say(prompt).await?;

        let mut out = tokio::io::stdout();
        out.write_all(b"> ").await?;
        out.flush().await?;

        let mut line = String::new();
        let read = self
            .input
            .lock()
            .await
            .read_line(&mut line)
            .await
            .context("failed to read from stdin")?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    async fn say(&self, message: &str) -> anyhow::Result<()> {
        let mut out = tokio::io::stdout();
        out.write_all(format!("agent: {message}\n").as_bytes())
            .await
            .context("failed to write to stdout")?;
        out.flush().await?;
        Ok(())
    }
}

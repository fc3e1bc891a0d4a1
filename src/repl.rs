//! The interactive conversation loop.
//!
//! One line in, one answer out, one turn in flight at a time. Whatever ends
//! the loop, the remote session is closed exactly once on the way out.

use mesa_agent::{AgentConfig, Runner};
use mesa_tools::RemoteSession;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info_span, warn, Instrument};

pub const EXIT_COMMANDS: [&str; 3] = ["/bye", "/quit", "/exit"];
pub const DISCONNECT_MESSAGE: &str = "Mesa-OS: [*] Session Disconnected...";
pub const PROMPT: &str = ">>> ";
pub const RETRY_HINT: &str = "     Please try again or type '/bye' to exit.";

const BANNER: &str = "\
============================================================
🔴 MESA-OS - Martian Environmental Systems Authority 🔴
============================================================

MESA-OS: Greetings, I am MESA-OS, your Martian Environmental Systems Authority bot.
     I can provide weather data from planet Mars using Black Mesa's Research Teams' collection data
     and search for all known facts about planet Mars.
     Type '/bye' to exit.

NOTE: MESA-OS is currently in alpha testing - please report all known issues to your supervisor.
";

/// Why the loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopExit {
    ExitCommand,
    EndOfInput,
    Interrupted,
}

pub fn is_exit_command(input: &str) -> bool {
    let input = input.trim();
    EXIT_COMMANDS.iter().any(|c| c.eq_ignore_ascii_case(input))
}

pub struct ConversationLoop {
    runner: Arc<dyn Runner>,
    agent: AgentConfig,
    session: Option<Arc<dyn RemoteSession>>,
    notice: Option<String>,
}

impl ConversationLoop {
    pub fn new(runner: Arc<dyn Runner>, agent: AgentConfig) -> Self {
        Self { runner, agent, session: None, notice: None }
    }

    /// Session to close when the loop ends.
    pub fn with_session(mut self, session: Arc<dyn RemoteSession>) -> Self {
        self.session = Some(session);
        self
    }

    /// Extra line shown under the banner.
    pub fn with_notice(mut self, notice: impl Into<String>) -> Self {
        self.notice = Some(notice.into());
        self
    }

    pub fn agent(&self) -> &AgentConfig {
        &self.agent
    }

    /// Run until an exit command, end of input, or `interrupt` resolves. An
    /// interrupt abandons any turn in flight. Only output failures are
    /// returned as errors; the session is closed either way.
    pub async fn run<R, W, I>(self, input: R, output: &mut W, interrupt: I) -> io::Result<LoopExit>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        I: Future<Output = ()>,
    {
        let result = self.converse(input, output, interrupt).await;
        self.close_session().await;
        result
    }

    async fn converse<R, W, I>(&self, mut input: R, output: &mut W, interrupt: I) -> io::Result<LoopExit>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        I: Future<Output = ()>,
    {
        tokio::pin!(interrupt);

        output.write_all(BANNER.as_bytes()).await?;
        if let Some(notice) = &self.notice {
            output.write_all(format!("{}\n", notice).as_bytes()).await?;
        }
        output.write_all(b"\n").await?;

        loop {
            output.write_all(PROMPT.as_bytes()).await?;
            output.flush().await?;

            let mut line = String::new();
            let read = tokio::select! {
                read = input.read_line(&mut line) => read,
                _ = &mut interrupt => {
                    output.write_all(format!("\n\n{}\n", DISCONNECT_MESSAGE).as_bytes()).await?;
                    return Ok(LoopExit::Interrupted);
                }
            };

            match read {
                Ok(0) => {
                    output.write_all(format!("\n\n{}\n", DISCONNECT_MESSAGE).as_bytes()).await?;
                    return Ok(LoopExit::EndOfInput);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("input read failed: {}", e);
                    output.write_all(format!("\n\n{}\n", DISCONNECT_MESSAGE).as_bytes()).await?;
                    return Ok(LoopExit::EndOfInput);
                }
            }

            let text = line.trim();
            if text.is_empty() {
                continue;
            }
            if is_exit_command(text) {
                output.write_all(format!("\n{}\n", DISCONNECT_MESSAGE).as_bytes()).await?;
                return Ok(LoopExit::ExitCommand);
            }

            let span = info_span!("turn", agent = %self.agent.name());
            let turn = async {
                debug!(chars = text.len(), "turn started");
                self.runner.run(&self.agent, text).await
            }
            .instrument(span);
            let result = tokio::select! {
                result = turn => result,
                _ = &mut interrupt => {
                    warn!("interrupted during turn");
                    output.write_all(format!("\n\n{}\n", DISCONNECT_MESSAGE).as_bytes()).await?;
                    return Ok(LoopExit::Interrupted);
                }
            };
            let reply = match result {
                Ok(answer) => format!("\nBot: {}\n\n", answer),
                Err(e) => {
                    warn!("turn failed: {}", e);
                    format!("\nBot: Sorry, I encountered an error: {}\n\n{}\n\n", e, RETRY_HINT)
                }
            };
            output.write_all(reply.as_bytes()).await?;
        }
    }

    async fn close_session(&self) {
        let Some(session) = &self.session else { return };
        if let Err(e) = session.close().await {
            warn!("{}: close failed: {}", session.name(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_commands_are_case_insensitive() {
        assert!(is_exit_command("/bye"));
        assert!(is_exit_command("/QUIT"));
        assert!(is_exit_command("  /Exit \n"));
        assert!(!is_exit_command("bye"));
        assert!(!is_exit_command("/bye now"));
        assert!(!is_exit_command(""));
    }
}

//! Typing indicator kept alive while a reply is generated.
//!
//! A heartbeat moves `Idle -> Running -> Stopped`. While running, a background task asserts
//! "typing" every interval. Stopping cancels the task and waits for its single final
//! "not typing" assertion. Dropping a running heartbeat cancels it too; the task still makes
//! its final assertion, it is just not awaited.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::{base::types::Void, service::chat::ChatClient};

enum HeartbeatState {
    Idle,
    Running { token: CancellationToken, handle: JoinHandle<()> },
    Stopped,
}

/// A typing heartbeat for one room and one generation.
pub struct TypingHeartbeat {
    chat: ChatClient,
    room_id: String,
    interval: Duration,
    typing_timeout: Duration,
    state: HeartbeatState,
}

impl TypingHeartbeat {
    pub fn new(chat: ChatClient, room_id: impl Into<String>, interval: Duration, typing_timeout: Duration) -> Self {
        Self {
            chat,
            room_id: room_id.into(),
            interval,
            typing_timeout,
            state: HeartbeatState::Idle,
        }
    }

    /// Launch the background typing loop.
    ///
    /// Fails if the heartbeat has already been started.
    pub fn start(&mut self) -> Void {
        if !matches!(self.state, HeartbeatState::Idle) {
            return Err(anyhow::anyhow!("Typing heartbeat for {} was already started.", self.room_id));
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(typing_loop(self.chat.clone(), self.room_id.clone(), self.interval, self.typing_timeout, token.clone()));

        self.state = HeartbeatState::Running { token, handle };

        Ok(())
    }

    /// Cancel the loop and wait for its final "not typing" assertion.
    ///
    /// Does nothing unless the heartbeat is running.
    #[instrument(name = "TypingHeartbeat::stop", skip_all)]
    pub async fn stop(&mut self) {
        let HeartbeatState::Running { token, handle } = std::mem::replace(&mut self.state, HeartbeatState::Stopped) else {
            return;
        };

        token.cancel();

        if let Err(err) = handle.await {
            warn!("Typing heartbeat task failed: {err}");
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, HeartbeatState::Running { .. })
    }
}

impl Drop for TypingHeartbeat {
    fn drop(&mut self) {
        if let HeartbeatState::Running { token, .. } = &self.state {
            token.cancel();
        }
    }
}

async fn typing_loop(chat: ChatClient, room_id: String, interval: Duration, typing_timeout: Duration, token: CancellationToken) {
    debug!("Started typing indicator.");

    while !token.is_cancelled() {
        tokio::select! {
            _ = token.cancelled() => break,
            result = chat.set_typing(&room_id, true, typing_timeout) => {
                if let Err(err) = result {
                    warn!("Failed to send typing indicator: {err}");
                }
            }
        }

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    // Bounded by the server-side expiry of the assertion.
    match tokio::time::timeout(typing_timeout, chat.set_typing(&room_id, false, typing_timeout)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!("Failed to clear typing indicator: {err}"),
        Err(_) => warn!("Timed out clearing typing indicator after {}ms.", typing_timeout.as_millis()),
    }

    debug!("Stopped typing indicator.");
}

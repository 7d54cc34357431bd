pub mod matrix;

use std::{ops::Deref, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::base::types::{Event, Res, Void};

// Traits.

/// Generic "chat" trait that clients must implement.
///
/// This trait defines the protocol operations the relay needs from a chat platform.
/// Implementing this trait allows different chat services to be used with the relay.
#[async_trait]
pub trait GenericChatClient: Send + Sync + 'static {
    /// Get the bot user ID.
    ///
    /// Returns the fully qualified identity of the bot, which is used to detect when
    /// the bot is mentioned and which events it authored.
    fn bot_user_id(&self) -> &str;

    /// Join a room by ID or alias.
    ///
    /// Returns the canonical room ID.
    async fn join(&self, room: &str) -> Res<String>;

    /// Start the chat client listener.
    ///
    /// Delivers incoming message events to `events` in server order until the receiver is
    /// dropped or the connection fails permanently.
    async fn listen(&self, events: mpsc::Sender<Event>) -> Void;

    /// Assert or clear the bot's typing state in a room.
    ///
    /// The homeserver clears a `typing` assertion on its own after `timeout`.
    async fn set_typing(&self, room_id: &str, typing: bool, timeout: Duration) -> Void;

    /// Send a plain text message to a room.
    async fn send_message(&self, room_id: &str, text: &str) -> Void;

    /// Send an emote (`/me`-style message) to a room.
    async fn send_emote(&self, room_id: &str, text: &str) -> Void;

    /// Move the read markers of a room to an event.
    async fn mark_read(&self, room_id: &str, event_id: &str) -> Void;
}

// Structs.

/// Chat client for the application.
///
/// It is designed to be trivially cloneable, allowing it to be passed around
/// without the need for `Arc` or `Mutex`.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<dyn GenericChatClient>,
}

impl Deref for ChatClient {
    type Target = dyn GenericChatClient;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl ChatClient {
    pub fn new(inner: Arc<dyn GenericChatClient>) -> Self {
        Self { inner }
    }
}

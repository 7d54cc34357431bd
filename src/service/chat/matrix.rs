//! Matrix integration for the relay.
//!
//! This module talks to a homeserver over the Matrix client-server API (`/_matrix/client/v3`):
//! - Password login and room join
//! - Long-poll `/sync` delivering room message events
//! - Typing notifications, message sending, and read markers
//!
//! Only unencrypted rooms are supported.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Response, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::base::{
    config::Config,
    error::MatrixApiError,
    types::{Err, Event, Res, Void},
};

use super::{ChatClient, GenericChatClient};

// Extra methods on `ChatClient` applied by the matrix implementation.

impl ChatClient {
    /// Creates a new Matrix chat client, logging in with the configured credentials.
    pub async fn matrix(config: &Config) -> Res<Self> {
        let client = MatrixChatClient::new(config).await?;
        Ok(Self { inner: Arc::new(client) })
    }
}

/// Default timeout for every request except the `/sync` long-poll, which sets its own.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// Wire types.

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    user_id: String,
    #[serde(default)]
    device_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JoinResponse {
    room_id: String,
}

#[derive(Debug, Deserialize)]
struct SyncResponse {
    next_batch: String,
    #[serde(default)]
    rooms: SyncRooms,
}

#[derive(Debug, Default, Deserialize)]
struct SyncRooms {
    #[serde(default)]
    join: HashMap<String, JoinedRoom>,
}

#[derive(Debug, Default, Deserialize)]
struct JoinedRoom {
    #[serde(default)]
    timeline: Timeline,
}

#[derive(Debug, Default, Deserialize)]
struct Timeline {
    #[serde(default)]
    events: Vec<Value>,
}

// Structs.

/// Matrix client implementation.
struct MatrixChatClient {
    http: reqwest::Client,
    homeserver: Url,
    access_token: String,
    bot_user_id: String,
    sync_timeout: Duration,
    txn_prefix: i64,
    txn_counter: AtomicU64,
}

impl MatrixChatClient {
    /// Log in and create a new Matrix chat client.
    #[instrument(name = "MatrixChatClient::new", skip_all)]
    pub async fn new(config: &Config) -> Res<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let homeserver = Url::parse(&config.homeserver)?;

        let body = json!({
            "type": "m.login.password",
            "identifier": { "type": "m.id.user", "user": config.username },
            "password": config.password,
            "device_id": config.device_id,
            "initial_device_display_name": config.device_id,
        });

        let response = http.post(client_api_url(&homeserver, &["login"])?).json(&body).send().await?;
        let login = check(response).await?.json::<LoginResponse>().await?;

        info!("Logged in as {} (device {}).", login.user_id, login.device_id.as_deref().unwrap_or("unknown"));

        Ok(Self {
            http,
            homeserver,
            access_token: login.access_token,
            bot_user_id: login.user_id,
            sync_timeout: Duration::from_millis(config.sync_timeout_ms),
            txn_prefix: Utc::now().timestamp_millis(),
            txn_counter: AtomicU64::new(0),
        })
    }

    fn url(&self, segments: &[&str]) -> Res<Url> {
        client_api_url(&self.homeserver, segments)
    }

    fn next_txn_id(&self) -> String {
        format!("{}.{}", self.txn_prefix, self.txn_counter.fetch_add(1, Ordering::Relaxed))
    }

    /// Run one `/sync` long-poll.
    async fn sync(&self, since: Option<&str>) -> Res<SyncResponse> {
        let filter = json!({
            "room": { "timeline": { "types": ["m.room.message"] } },
            "presence": { "not_types": ["*"] },
            "account_data": { "not_types": ["*"] },
        });

        let mut query = vec![("timeout", self.sync_timeout.as_millis().to_string()), ("filter", filter.to_string())];
        if let Some(since) = since {
            query.push(("since", since.to_string()));
        }

        let response = self
            .http
            .get(self.url(&["sync"])?)
            .bearer_auth(&self.access_token)
            .query(&query)
            .timeout(self.sync_timeout + Duration::from_secs(30))
            .send()
            .await?;

        Ok(check(response).await?.json::<SyncResponse>().await?)
    }

    async fn send_content(&self, room_id: &str, content: Value) -> Void {
        let txn_id = self.next_txn_id();
        let url = self.url(&["rooms", room_id, "send", "m.room.message", &txn_id])?;

        let response = self.http.put(url).bearer_auth(&self.access_token).json(&content).send().await?;
        check(response).await?;

        Ok(())
    }
}

#[async_trait]
impl GenericChatClient for MatrixChatClient {
    fn bot_user_id(&self) -> &str {
        &self.bot_user_id
    }

    #[instrument(skip(self))]
    async fn join(&self, room: &str) -> Res<String> {
        let response = self.http.post(self.url(&["join", room])?).bearer_auth(&self.access_token).json(&json!({})).send().await?;
        let joined = check(response).await?.json::<JoinResponse>().await?;

        info!("Joined room {} ({}).", room, joined.room_id);

        Ok(joined.room_id)
    }

    async fn listen(&self, events: mpsc::Sender<Event>) -> Void {
        const RETRY_DELAY_MS: u64 = 1000;
        const MAX_RETRY_DELAY_MS: u64 = 60000;

        let mut since: Option<String> = None;
        let mut failures = 0u32;

        loop {
            let response = match self.sync(since.as_deref()).await {
                Ok(response) => {
                    failures = 0;
                    response
                }
                Err(err) if is_permanent(&err) => {
                    warn!("Sync failed permanently, stopping listener: {err}");
                    return Err(err);
                }
                Err(err) => {
                    failures += 1;

                    let delay = (RETRY_DELAY_MS * 2_u64.pow(failures.min(10) - 1)).min(MAX_RETRY_DELAY_MS);
                    warn!("Sync failed ({failures} in a row), retrying in {delay}ms: {err}");

                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    continue;
                }
            };

            for (room_id, room) in response.rooms.join {
                for raw in room.timeline.events {
                    let Some(event) = parse_timeline_event(&room_id, raw) else {
                        continue;
                    };

                    if events.send(event).await.is_err() {
                        info!("Event receiver dropped, stopping listener.");
                        return Ok(());
                    }
                }
            }

            since = Some(response.next_batch);
        }
    }

    #[instrument(skip(self))]
    async fn set_typing(&self, room_id: &str, typing: bool, timeout: Duration) -> Void {
        let body = if typing {
            json!({ "typing": true, "timeout": timeout.as_millis() as u64 })
        } else {
            json!({ "typing": false })
        };

        let url = self.url(&["rooms", room_id, "typing", &self.bot_user_id])?;
        let response = self.http.put(url).bearer_auth(&self.access_token).json(&body).send().await?;
        check(response).await?;

        Ok(())
    }

    #[instrument(skip(self, text))]
    async fn send_message(&self, room_id: &str, text: &str) -> Void {
        self.send_content(room_id, json!({ "msgtype": "m.text", "body": text })).await
    }

    #[instrument(skip(self, text))]
    async fn send_emote(&self, room_id: &str, text: &str) -> Void {
        self.send_content(room_id, json!({ "msgtype": "m.emote", "body": text })).await
    }

    #[instrument(skip(self))]
    async fn mark_read(&self, room_id: &str, event_id: &str) -> Void {
        let body = json!({ "m.fully_read": event_id, "m.read": event_id });

        let response = self.http.post(self.url(&["rooms", room_id, "read_markers"])?).bearer_auth(&self.access_token).json(&body).send().await?;
        check(response).await?;

        Ok(())
    }
}

// Helpers.

/// Build a client-server API URL, percent-encoding each path segment.
fn client_api_url(homeserver: &Url, segments: &[&str]) -> Res<Url> {
    let mut url = homeserver.clone();

    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("Homeserver URL `{homeserver}` cannot be a base URL."))?
        .pop_if_empty()
        .extend(["_matrix", "client", "v3"])
        .extend(segments);

    Ok(url)
}

/// Turn a non-success response into an error carrying the Matrix `errcode` body.
async fn check(response: Response) -> Res<Response> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(MatrixApiError { status: status.as_u16(), body }.into())
}

/// Whether a failed request should not be retried.
///
/// Transport errors (connection refused, timeouts) are always worth retrying.
fn is_permanent(err: &Err) -> bool {
    err.downcast_ref::<MatrixApiError>().is_some_and(MatrixApiError::is_permanent)
}

/// Convert a raw timeline event into a text message [`Event`].
///
/// Anything that is not an `m.text` room message with a body (state events, redactions,
/// images, notices) is skipped.
fn parse_timeline_event(room_id: &str, raw: Value) -> Option<Event> {
    if raw.get("type").and_then(Value::as_str) != Some("m.room.message") {
        return None;
    }

    let content = raw.get("content")?;
    if content.get("msgtype").and_then(Value::as_str) != Some("m.text") {
        return None;
    }

    let event_id = raw.get("event_id")?.as_str()?;
    let sender = raw.get("sender")?.as_str()?;
    let body = content.get("body")?.as_str()?;
    let timestamp = DateTime::from_timestamp_millis(raw.get("origin_server_ts")?.as_i64()?)?;

    debug!("Parsed message event {} from {}.", event_id, sender);

    Some(Event::new(event_id, sender, body, timestamp, room_id, content.clone()))
}

// Tests.

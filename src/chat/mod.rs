pub mod connectivity;
pub mod dedupe;
pub mod grouping;
pub mod retry;

use crate::db::models::{DayKey, Message, MessageKind, Role};
use crate::nutrition::{self, AnalysisView};
use crate::settings::ChatSettings;
use crate::transport::{Profile, Transport, TransportError};
use chrono::{DateTime, Utc};
use connectivity::{ConnectivityMonitor, ConnectivityState};
use grouping::{group, resolve_selection, ConversationGroup};
use retry::{RetryController, RetryState};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Transient, non-blocking messages for the UI (toasts).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    WentOffline,
    BackOnline,
    ImageAnalysisFailed,
    HistoryUnavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("No conversation on {0}")]
    UnknownDay(DayKey),
}

impl Serialize for ChatError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

/// A message of the selected conversation, with the parsed analysis when it
/// is the assistant's answer to a photo.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Entry<'a> {
    pub message: &'a Message,
    pub analysis: Option<AnalysisView>,
}

/// Chat state for one user: the append-only log plus everything derived
/// from it. Views are recomputed from the log after every append.
///
/// Actions take `&mut self`, so a session has at most one send in flight.
/// The user's message is appended before the transport is called and the
/// response after it settles.
pub struct ChatSession<T: Transport> {
    transport: T,
    clock: Box<dyn Clock>,
    log: Vec<Message>,
    last_stamp: Option<DateTime<Utc>>,
    groups: Vec<ConversationGroup>,
    selected: DayKey,
    retry: RetryController,
    connectivity: ConnectivityMonitor,
    connectivity_rx: watch::Receiver<ConnectivityState>,
    seen_connectivity: ConnectivityState,
    profile: Option<Profile>,
    notices: Vec<Notice>,
    failure_reply: String,
}

impl<T: Transport> ChatSession<T> {
    pub fn new(transport: T, settings: &ChatSettings) -> Self {
        let clock: Box<dyn Clock> = Box::new(SystemClock);
        let connectivity = ConnectivityMonitor::default();
        let connectivity_rx = connectivity.subscribe();
        Self {
            transport,
            selected: DayKey::of(&clock.now()),
            clock,
            log: Vec::new(),
            last_stamp: None,
            groups: Vec::new(),
            retry: RetryController::default(),
            seen_connectivity: connectivity.state(),
            connectivity,
            connectivity_rx,
            profile: None,
            notices: Vec::new(),
            failure_reply: settings.failure_reply.clone(),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self.selected = DayKey::of(&self.clock.now());
        self.refresh();
        self
    }

    /// Shares `monitor` with the platform code that observes the network.
    pub fn with_connectivity(mut self, monitor: ConnectivityMonitor) -> Self {
        self.connectivity_rx = monitor.subscribe();
        self.seen_connectivity = monitor.state();
        self.connectivity = monitor;
        self
    }

    /// Populates the log from history and fetches the profile, concurrently.
    /// Neither failure is fatal; without history the locally cached log is
    /// shown instead.
    pub async fn load(&mut self) {
        let (history, profile) = futures::join!(
            self.transport.fetch_history(),
            self.transport.fetch_profile()
        );

        match history {
            Ok(messages) => {
                info!(len = messages.len(), "history loaded");
                for message in messages {
                    self.persist(&message);
                    self.track_stamp(message.created_at);
                    self.log.push(message);
                }
            }
            Err(e) => {
                warn!(error = %e, "history unavailable");
                self.notices.push(Notice::HistoryUnavailable);
                match self.transport.cached_history() {
                    Ok(messages) => {
                        info!(len = messages.len(), "using cached history");
                        for message in messages {
                            self.track_stamp(message.created_at);
                            self.log.push(message);
                        }
                    }
                    Err(e) => debug!(error = %e, "no cached history"),
                }
            }
        }

        match profile {
            Ok(profile) => self.profile = Some(profile),
            Err(e) => warn!(error = %e, "profile unavailable"),
        }

        self.refresh();
    }

    // ── Actions ──

    /// Sends user text. A failure appends the configured apology as the
    /// assistant's reply and keeps `text` for [`Self::retry_last_failed`].
    pub async fn send_text(&mut self, text: &str) {
        if !self.push_user_text(text) {
            return;
        }
        self.deliver(text).await;
    }

    /// Sends a meal photo for analysis. `image_ref` is how the UI will show
    /// the photo in the log. Failures only raise a notice.
    pub async fn send_image(&mut self, image_ref: impl Into<String>, image: &[u8]) {
        let message = Message::image(Role::User, image_ref, "", self.next_stamp());
        self.selected = message.day_key();
        self.append(message);

        match self.transport.analyze_image(image).await {
            Ok(analysis) => self.append_reply(analysis),
            Err(e) => {
                warn!(error = %e, "image analysis failed");
                self.notices.push(Notice::ImageAnalysisFailed);
            }
        }
    }

    /// Resends the last failed text without appending it again. Returns
    /// `false` when nothing is pending.
    pub async fn retry_last_failed(&mut self) -> bool {
        let Some(text) = self.retry.retry().map(str::to_owned) else {
            return false;
        };
        info!("retrying last failed send");
        self.deliver(&text).await;
        true
    }

    pub fn dismiss_retry(&mut self) {
        self.retry.record_success();
    }

    pub fn select_day(&mut self, key: DayKey) -> Result<(), ChatError> {
        if !self.groups.iter().any(|g| g.key == key) {
            return Err(ChatError::UnknownDay(key));
        }
        self.selected = key;
        Ok(())
    }

    pub fn set_connectivity(&mut self, state: ConnectivityState) {
        self.connectivity.report(state);
        self.sync_connectivity();
    }

    // ── Views ──

    pub fn groups(&self) -> &[ConversationGroup] {
        &self.groups
    }

    pub fn selected_key(&self) -> DayKey {
        self.selected
    }

    pub fn selected_messages(&self) -> &[Message] {
        self.groups
            .iter()
            .find(|g| g.key == self.selected)
            .map(|g| g.messages.as_slice())
            .unwrap_or(&[])
    }

    /// Replies are paired with photos by position in the whole log, so an
    /// answer that lands after midnight is still parsed.
    pub fn selected_entries(&self) -> Vec<Entry<'_>> {
        let photo_replies: HashSet<&str> = self
            .log
            .windows(2)
            .filter(|pair| {
                pair[0].role == Role::User
                    && pair[0].kind == MessageKind::Image
                    && pair[1].role == Role::Assistant
            })
            .map(|pair| pair[1].id.as_str())
            .collect();

        self.selected_messages()
            .iter()
            .map(|message| Entry {
                message,
                analysis: photo_replies
                    .contains(message.id.as_str())
                    .then(|| nutrition::render(&message.text)),
            })
            .collect()
    }

    pub fn connectivity(&self) -> ConnectivityState {
        self.connectivity.state()
    }

    pub fn connectivity_monitor(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    pub fn retry_state(&self) -> &RetryState {
        self.retry.state()
    }

    pub fn profile(&self) -> Option<&Profile> {
        self.profile.as_ref()
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        self.sync_connectivity();
        std::mem::take(&mut self.notices)
    }

    // ── Internals ──

    /// Appends the user's text to today's conversation. Blank text is
    /// dropped and returns `false`.
    fn push_user_text(&mut self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        let message = Message::text(Role::User, text, self.next_stamp());
        self.selected = message.day_key();
        self.append(message);
        true
    }

    async fn deliver(&mut self, text: &str) {
        match self.transport.send_message(text).await {
            Ok(reply) => {
                self.retry.record_success();
                self.append_reply(reply);
            }
            Err(e) => {
                warn!(error = %e, offline = self.connectivity() == ConnectivityState::Offline, "send failed");
                self.retry.record_failure(text);
                self.append_reply(self.failure_reply.clone());
            }
        }
    }

    fn append_reply(&mut self, text: String) {
        let message = Message::text(Role::Assistant, text, self.next_stamp());
        self.append(message);
    }

    fn append(&mut self, message: Message) {
        self.persist(&message);
        self.track_stamp(message.created_at);
        self.log.push(message);
        self.refresh();
    }

    fn persist(&self, message: &Message) {
        if let Err(e) = self.transport.persist(message) {
            debug!(error = %e, id = %message.id, "persist failed, ignoring");
        }
    }

    fn next_stamp(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        match self.last_stamp {
            Some(last) if last > now => last,
            _ => now,
        }
    }

    fn track_stamp(&mut self, stamp: DateTime<Utc>) {
        if self.last_stamp.map_or(true, |last| stamp > last) {
            self.last_stamp = Some(stamp);
        }
    }

    fn refresh(&mut self) {
        self.groups = group(&self.log);
        let resolved = resolve_selection(self.selected, &self.groups);
        if resolved != self.selected {
            debug!(from = %self.selected, to = %resolved, "selection re-pointed");
            self.selected = resolved;
        }
    }

    fn sync_connectivity(&mut self) {
        if !self.connectivity_rx.has_changed().unwrap_or(false) {
            return;
        }
        let state = *self.connectivity_rx.borrow_and_update();
        if state == self.seen_connectivity {
            return;
        }
        self.seen_connectivity = state;
        self.notices.push(match state {
            ConnectivityState::Offline => Notice::WentOffline,
            ConnectivityState::Online => Notice::BackOnline,
        });
    }
}

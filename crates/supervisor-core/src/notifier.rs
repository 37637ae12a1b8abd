//! Batched, debounced outbound webhook notifier.
//!
//! Non-error notifications are queued and flushed together after a short
//! debounce window; an error-level notification forces an immediate flush
//! of the whole queue, tagging along any lower-priority messages already
//! waiting. Delivery is best-effort: failures are logged and the queue is
//! still considered drained — there is no retry buffer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::task::JoinHandle;

use crate::error::NotifierError;
use crate::protocol_constants::{
    NOTIFIER_COLOR_ERROR, NOTIFIER_COLOR_INFO, NOTIFIER_COLOR_WARN, NOTIFIER_DEBOUNCE_MS,
};

/// Severity of a queued notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn color(self) -> u32 {
        match self {
            Level::Info => NOTIFIER_COLOR_INFO,
            Level::Warn => NOTIFIER_COLOR_WARN,
            Level::Error => NOTIFIER_COLOR_ERROR,
        }
    }
}

/// A queued (not yet dispatched) notification.
#[derive(Debug, Clone)]
struct QueuedMessage {
    content: String,
    level: Level,
}

/// Per-event-kind toggle and template configuration.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Webhook URL to POST embeds to. `None` disables dispatch entirely.
    pub webhook_url: Option<String>,
    /// Optional bot display name.
    pub bot_name: Option<String>,
    /// Optional bot avatar URL.
    pub avatar_url: Option<String>,
    /// Role-mention string (e.g. `<@&123>`) prepended only on error flushes.
    pub role_mention: Option<String>,
    /// Per-event-kind templates, keyed by event kind name (e.g. `"skip"`).
    /// Unknown placeholders in a template are left literal.
    pub templates: HashMap<String, String>,
    /// Per-event-kind enable toggles. An absent key defaults to enabled.
    pub enabled: HashMap<String, bool>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        let mut templates = HashMap::new();
        templates.insert("error".into(), "Playback error {errorCode} on video {videoId}".into());
        templates.insert("skip".into(), "Skipped video {videoId}: {reason}".into());
        templates.insert(
            "recovery".into(),
            "Recovery started: stall detected at video {videoId}".into(),
        );
        templates.insert("resume".into(), "Recovered: now playing {videoId}".into());
        templates.insert(
            "critical".into(),
            "Recovery exhausted, manual intervention needed".into(),
        );
        templates.insert("hostDisconnect".into(), "Lost connection to host".into());
        templates.insert("hostReconnect".into(), "Reconnected to host".into());
        templates.insert(
            "streamDrop".into(),
            "Stream dropped, restart attempt {attempt} of {max}".into(),
        );
        templates.insert(
            "streamRestart".into(),
            "Stream restarted after {attempts} attempt(s)".into(),
        );
        Self {
            webhook_url: None,
            bot_name: None,
            avatar_url: None,
            role_mention: None,
            templates,
            enabled: HashMap::new(),
        }
    }
}

impl NotifierConfig {
    fn is_enabled(&self, kind: &str) -> bool {
        *self.enabled.get(kind).unwrap_or(&true)
    }

    fn render(&self, kind: &str, fields: &HashMap<String, String>) -> String {
        let template = self
            .templates
            .get(kind)
            .cloned()
            .unwrap_or_else(|| format!("{{{kind}}}"));
        render_template(&template, fields)
    }
}

fn render_template(template: &str, fields: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(end) = template[i + 1..].find('}') {
                let key = &template[i + 1..i + 1 + end];
                if let Some(value) = fields.get(key) {
                    out.push_str(value);
                } else {
                    out.push_str(&template[i..=i + 1 + end]);
                }
                i += end + 2;
                continue;
            }
        }
        let ch = template[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

#[derive(Serialize)]
struct EmbedField {
    name: String,
    value: String,
}

#[derive(Serialize)]
struct EmbedFooter {
    text: String,
}

#[derive(Serialize)]
struct Embed {
    title: String,
    description: String,
    color: u32,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<EmbedFooter>,
}

#[derive(Serialize)]
struct WebhookPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar_url: Option<String>,
    embeds: Vec<Embed>,
}

/// Batched, debounced outbound notifier.
pub struct Notifier {
    config: NotifierConfig,
    http: reqwest::Client,
    queue: Mutex<Vec<QueuedMessage>>,
    debounce_timer: Mutex<Option<JoinHandle<()>>>,
}

impl Notifier {
    /// Creates a new notifier bound to `config`.
    pub fn new(config: NotifierConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            http: reqwest::Client::new(),
            queue: Mutex::new(Vec::new()),
            debounce_timer: Mutex::new(None),
        })
    }

    /// Enqueues a rendered notification for `kind`, respecting per-event
    /// toggles. `error`-level enqueues force an immediate flush; others
    /// extend the debounce window.
    pub fn send(self: &Arc<Self>, kind: &str, level: Level, fields: HashMap<String, String>) {
        if !self.config.is_enabled(kind) {
            return;
        }
        let content = self.config.render(kind, &fields);
        {
            let mut queue = self.queue.lock();
            queue.push(QueuedMessage { content, level });
        }
        match level {
            Level::Error => self.flush_now(),
            _ => self.extend_debounce(),
        }
    }

    fn extend_debounce(self: &Arc<Self>) {
        let mut timer = self.debounce_timer.lock();
        if let Some(handle) = timer.take() {
            handle.abort();
        }
        let this = Arc::clone(self);
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(NOTIFIER_DEBOUNCE_MS)).await;
            this.flush_now();
        }));
    }

    fn flush_now(self: &Arc<Self>) {
        if let Some(handle) = self.debounce_timer.lock().take() {
            handle.abort();
        }
        let messages: Vec<QueuedMessage> = std::mem::take(&mut *self.queue.lock());
        if messages.is_empty() {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = this.dispatch(messages).await {
                log::warn!("[Notifier] dispatch failed: {}", e);
            }
        });
    }

    async fn dispatch(&self, messages: Vec<QueuedMessage>) -> Result<(), NotifierError> {
        let Some(ref url) = self.config.webhook_url else {
            return Err(NotifierError::NotConfigured);
        };

        let highest = messages.iter().map(|m| m.level).max().unwrap_or(Level::Info);
        let description = messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let content = if highest == Level::Error {
            self.config.role_mention.clone()
        } else {
            None
        };

        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();

        let embed = Embed {
            title: "Playback Supervisor".to_string(),
            description,
            color: highest.color(),
            timestamp,
            footer: (messages.len() > 1).then(|| EmbedFooter {
                text: format!("{} events", messages.len()),
            }),
        };

        let payload = WebhookPayload {
            content,
            username: self.config.bot_name.clone(),
            avatar_url: self.config.avatar_url.clone(),
            embeds: vec![embed],
        };

        let response = self
            .http
            .post(url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotifierError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifierError::BadStatus(response.status().as_u16()));
        }
        Ok(())
    }

    /// Convenience wrapper for a single `{key: value}` field.
    fn one(key: &str, value: impl ToString) -> HashMap<String, String> {
        let mut map = HashMap::new();
        map.insert(key.to_string(), value.to_string());
        map
    }

    pub fn notify_error(self: &Arc<Self>, error_code: i32, video_id: &str) {
        let mut fields = Self::one("errorCode", error_code);
        fields.insert("videoId".into(), video_id.to_string());
        self.send("error", Level::Warn, fields);
    }

    pub fn notify_skip(self: &Arc<Self>, video_id: &str, reason: &str) {
        let mut fields = Self::one("videoId", video_id);
        fields.insert("reason".into(), reason.to_string());
        self.send("skip", Level::Info, fields);
    }

    pub fn notify_recovery(self: &Arc<Self>, video_id: &str) {
        self.send("recovery", Level::Warn, Self::one("videoId", video_id));
    }

    pub fn notify_resume(self: &Arc<Self>, video_id: &str) {
        self.send("resume", Level::Info, Self::one("videoId", video_id));
    }

    pub fn notify_critical(self: &Arc<Self>) {
        self.send("critical", Level::Error, HashMap::new());
    }

    pub fn notify_host_disconnect(self: &Arc<Self>) {
        self.send("hostDisconnect", Level::Warn, HashMap::new());
    }

    pub fn notify_host_reconnect(self: &Arc<Self>) {
        self.send("hostReconnect", Level::Info, HashMap::new());
    }

    pub fn notify_stream_drop(self: &Arc<Self>, attempt: usize, max: usize) {
        let mut fields = Self::one("attempt", attempt);
        fields.insert("max".into(), max.to_string());
        self.send("streamDrop", Level::Warn, fields);
    }

    pub fn notify_stream_restart(self: &Arc<Self>, attempts: usize) {
        self.send(
            "streamRestart",
            Level::Info,
            Self::one("attempts", attempts),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_template_substitutes_known_placeholders() {
        let mut fields = HashMap::new();
        fields.insert("videoId".to_string(), "abc".to_string());
        let out = render_template("now playing {videoId}", &fields);
        assert_eq!(out, "now playing abc");
    }

    #[test]
    fn render_template_leaves_unknown_placeholders_literal() {
        let fields = HashMap::new();
        let out = render_template("value: {missing}", &fields);
        assert_eq!(out, "value: {missing}");
    }

    #[test]
    fn disabled_event_kind_is_not_enqueued() {
        let mut config = NotifierConfig::default();
        config.enabled.insert("skip".into(), false);
        let notifier = Notifier::new(config);
        notifier.notify_skip("abc", "test");
        assert!(notifier.queue.lock().is_empty());
    }

    #[test]
    fn error_level_message_is_queued_with_highest_color() {
        let notifier = Notifier::new(NotifierConfig::default());
        notifier.notify_host_disconnect();
        let queue = notifier.queue.lock();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].level, Level::Warn);
    }
}

// SPDX-FileCopyrightText: 2026 Relaydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the ingestion pipeline.
//!
//! Two families live here: the transient, provider-neutral canonical model
//! produced by provider adapters ([`CanonicalMessage`], [`StatusCallback`],
//! [`Inbound`], [`SendResult`]) and the persisted tenant records consumed by
//! the storage layer ([`Customer`], [`Conversation`], [`ChatLidMapping`],
//! [`Message`], [`MediaRecord`]).

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a [`PluginAdapter`](crate::PluginAdapter).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    /// An external chat provider (Z-API, Evolution API).
    Provider,
    Storage,
    Observability,
}

// --- Enumerations persisted as lowercase text ---

/// Lifecycle status of a conversation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Open,
    Waiting,
    Closed,
}

impl ConversationStatus {
    /// Open and waiting conversations both count as "currently open".
    pub fn is_open(self) -> bool {
        !matches!(self, ConversationStatus::Closed)
    }
}

/// Who authored a persisted message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SenderType {
    Agent,
    Customer,
    System,
}

/// Kind of binary attachment carried by a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Image,
    Video,
    Document,
}

impl MediaKind {
    /// Classify a MIME type. Anything that is not audio, image or video is a document.
    pub fn from_mime(mime: &str) -> MediaKind {
        match mime.split('/').next().unwrap_or_default() {
            "audio" => MediaKind::Audio,
            "image" => MediaKind::Image,
            "video" => MediaKind::Video,
            _ => MediaKind::Document,
        }
    }
}

/// File extension for a MIME type, ignoring parameters such as `; codecs=opus`.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next().unwrap_or(mime).trim();
    let ext = match essence {
        "audio/ogg" | "audio/opus" => "ogg",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
        "audio/aac" => "aac",
        "audio/amr" => "amr",
        "audio/wav" | "audio/x-wav" => "wav",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        "video/3gpp" => "3gp",
        "video/quicktime" => "mov",
        "application/pdf" => "pdf",
        "application/zip" => "zip",
        "text/plain" => "txt",
        "application/msword" => "doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "application/vnd.ms-excel" => "xls",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => "xlsx",
        _ => return None,
    };
    Some(ext)
}

/// Best-effort MIME type for a file name or URL path, from its extension.
pub fn mime_for_path(path: &str) -> Option<&'static str> {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let ext = path.rsplit_once('.')?.1.to_ascii_lowercase();
    let mime = match ext.as_str() {
        "ogg" | "oga" | "opus" => "audio/ogg",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "aac" => "audio/aac",
        "amr" => "audio/amr",
        "wav" => "audio/wav",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "3gp" => "video/3gpp",
        "mov" => "video/quicktime",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "txt" => "text/plain",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => return None,
    };
    Some(mime)
}

/// Content type of a persisted message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Audio,
    Image,
    Video,
    Document,
}

impl From<MediaKind> for MessageType {
    fn from(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Audio => MessageType::Audio,
            MediaKind::Image => MessageType::Image,
            MediaKind::Video => MessageType::Video,
            MediaKind::Document => MessageType::Document,
        }
    }
}

/// Sender id recorded for messages typed on the business phone itself.
pub const PHONE_SENDER_ID: &str = "phone";

/// Delivery status of a persisted message.
///
/// Outbound messages move forward through `pending < sent < delivered < read`.
/// Inbound messages are stored as `received` and are never touched by
/// delivery callbacks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
    Received,
}

impl DeliveryStatus {
    /// Position on the forward-only delivery ladder, if the status is on it.
    pub fn rank(self) -> Option<u8> {
        match self {
            DeliveryStatus::Pending => Some(0),
            DeliveryStatus::Sent => Some(1),
            DeliveryStatus::Delivered => Some(2),
            DeliveryStatus::Read => Some(3),
            DeliveryStatus::Failed | DeliveryStatus::Received => None,
        }
    }

    /// Decide the status a message should hold after a callback.
    ///
    /// Returns `Some(new)` when `incoming` moves the message forward and
    /// `None` when the callback must leave it unchanged. A late `delivered`
    /// after `read` is a no-op; `read` before `delivered` jumps straight to
    /// `read`. `failed` only overrides `pending`/`sent`.
    pub fn advance(current: DeliveryStatus, incoming: DeliveryStatus) -> Option<DeliveryStatus> {
        match (current, incoming) {
            (DeliveryStatus::Received, _) | (DeliveryStatus::Failed, _) => None,
            (_, DeliveryStatus::Received) => None,
            (DeliveryStatus::Pending | DeliveryStatus::Sent, DeliveryStatus::Failed) => {
                Some(DeliveryStatus::Failed)
            }
            (_, DeliveryStatus::Failed) => None,
            (cur, inc) => match (cur.rank(), inc.rank()) {
                (Some(c), Some(i)) if i > c => Some(inc),
                _ => None,
            },
        }
    }
}

/// Processing status of a stored media record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MediaStatus {
    Received,
    Downloading,
    Processing,
    Completed,
    Failed,
}

impl MediaStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [MediaStatus; 5] = [
        MediaStatus::Received,
        MediaStatus::Downloading,
        MediaStatus::Processing,
        MediaStatus::Completed,
        MediaStatus::Failed,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, MediaStatus::Completed | MediaStatus::Failed)
    }

    /// Whether the processing pipeline may move a record from `self` to `next`.
    ///
    /// Operator replay (`failed -> received`) is not a pipeline transition and
    /// is handled separately by the storage layer.
    pub fn can_transition_to(self, next: MediaStatus) -> bool {
        matches!(
            (self, next),
            (MediaStatus::Received, MediaStatus::Downloading)
                | (MediaStatus::Downloading, MediaStatus::Processing)
                | (MediaStatus::Processing, MediaStatus::Completed)
                | (MediaStatus::Received, MediaStatus::Failed)
                | (MediaStatus::Downloading, MediaStatus::Failed)
                | (MediaStatus::Processing, MediaStatus::Failed)
        )
    }
}

/// Direction of a media transfer relative to this system.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

// --- Canonical (provider-neutral) model ---

/// Reference to a binary attachment hosted by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRef {
    pub kind: MediaKind,
    /// Provider URL; often signed and short-lived.
    pub url: String,
    pub mime_type: Option<String>,
    pub duration_secs: Option<u32>,
    /// Push-to-talk voice note.
    pub ptt: bool,
    pub caption: Option<String>,
    pub file_name: Option<String>,
}

/// Provider-neutral representation of an inbound or echoed message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    /// Provider's own message id; the deduplication key.
    pub provider_message_id: String,
    /// Address of the author (digits only).
    pub sender: String,
    /// Address of the receiving side (digits only).
    pub recipient: String,
    pub body: Option<String>,
    pub media: Option<MediaRef>,
    /// Sent from the connected business number (agent phone or API echo).
    pub from_me: bool,
    pub sender_name: Option<String>,
    /// Name of the provider adapter that produced this message.
    pub provider: String,
    /// Provider-native thread identifier, when the provider exposes one.
    pub chat_lid: Option<String>,
    /// Provider instance that received the event; identifies the tenant.
    pub instance_id: Option<String>,
    /// Provider event time as unix seconds.
    pub timestamp: Option<i64>,
    /// Original webhook payload, kept for audit/debug.
    pub raw: serde_json::Value,
}

impl CanonicalMessage {
    /// The customer's phone: the counterpart of the business number.
    pub fn customer_phone(&self) -> &str {
        if self.from_me {
            &self.recipient
        } else {
            &self.sender
        }
    }

    /// The business number that sent or received this message.
    pub fn business_phone(&self) -> &str {
        if self.from_me {
            &self.sender
        } else {
            &self.recipient
        }
    }

    /// Text to persist as message content.
    ///
    /// Falls back to the media caption, then to a `[kind]` placeholder.
    pub fn display_content(&self) -> String {
        if let Some(body) = self.body.as_deref().filter(|b| !b.is_empty()) {
            return body.to_string();
        }
        match &self.media {
            Some(media) => media
                .caption
                .clone()
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| format!("[{}]", media.kind)),
            None => String::new(),
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.media
            .as_ref()
            .map(|m| MessageType::from(m.kind))
            .unwrap_or(MessageType::Text)
    }
}

/// A delivery/read callback for one or more previously sent messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCallback {
    pub provider_message_ids: Vec<String>,
    pub status: DeliveryStatus,
    pub provider: String,
}

/// Why an inbound event was intentionally not processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    Group,
    Newsletter,
    Broadcast,
    /// Event type the pipeline does not consume (presence, connection, ...).
    UnsupportedEvent(String),
    /// Reactions, protocol messages, stickers and similar.
    UnsupportedContent,
    MissingMessageId,
    /// A status callback with a provider status that maps to nothing tracked.
    UntrackedStatus(String),
    /// The customer is blocked by the tenant.
    BlockedCustomer,
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IgnoreReason::Group => write!(f, "group message"),
            IgnoreReason::Newsletter => write!(f, "newsletter message"),
            IgnoreReason::Broadcast => write!(f, "broadcast message"),
            IgnoreReason::UnsupportedEvent(event) => write!(f, "unsupported event: {event}"),
            IgnoreReason::UnsupportedContent => write!(f, "unsupported content"),
            IgnoreReason::MissingMessageId => write!(f, "missing message id"),
            IgnoreReason::UntrackedStatus(status) => write!(f, "untracked status: {status}"),
            IgnoreReason::BlockedCustomer => write!(f, "blocked customer"),
        }
    }
}

/// Result of parsing a raw webhook payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A content message to run through the resolver.
    Message(Box<CanonicalMessage>),
    /// A delivery/read callback for the status tracker.
    Status(StatusCallback),
    /// A payload the pipeline acknowledges without processing.
    Ignored(IgnoreReason),
}

/// Outcome of an outbound send.
///
/// Never an `Err`: transport and API failures are reported with
/// `success = false` and a `retryable` hint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    pub success: bool,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
    /// Network error, timeout, 429 or 5xx.
    #[serde(default)]
    pub retryable: bool,
}

impl SendResult {
    pub fn sent(provider_message_id: Option<String>) -> Self {
        Self {
            success: true,
            provider_message_id,
            error: None,
            retryable: false,
        }
    }

    pub fn failed(error: impl Into<String>, retryable: bool) -> Self {
        Self {
            success: false,
            provider_message_id: None,
            error: Some(error.into()),
            retryable,
        }
    }
}

/// Strip a WhatsApp JID suffix (`@s.whatsapp.net`, `@c.us`, `@lid`) and any
/// non-digit characters from an address.
pub fn normalize_phone(address: &str) -> String {
    let local = address.split('@').next().unwrap_or(address);
    let local = local.split(':').next().unwrap_or(local);
    local.chars().filter(|c| c.is_ascii_digit()).collect()
}

// --- Persisted records ---

/// A tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub name: String,
    pub created_at: String,
}

/// A provider instance (connected WhatsApp number) registered to a company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInstance {
    pub provider: String,
    pub instance_id: String,
    pub company_id: String,
    /// The connected business number, digits only.
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub company_id: String,
    pub phone: String,
    /// Channel-native id (chat-lid) once known.
    pub channel_id: Option<String>,
    pub name: Option<String>,
    pub blocked: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub company_id: String,
    pub customer_id: String,
    pub status: ConversationStatus,
    /// Provider the conversation runs over.
    pub channel: String,
    /// Set when an outbound campaign opened the conversation.
    pub campaign_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLidMapping {
    pub chat_lid: String,
    pub conversation_id: String,
    pub company_id: String,
    pub from_campaign: bool,
    pub campaign_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A persisted conversation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub company_id: String,
    pub content: String,
    pub sender_type: SenderType,
    pub sender_id: String,
    pub message_type: MessageType,
    /// Provider message id; unique across the system once present.
    pub external_message_id: Option<String>,
    pub status: DeliveryStatus,
    /// JSON metadata attached by AI-generated replies.
    pub ai_metadata: Option<String>,
    pub media_id: Option<String>,
    /// Local path of the downloaded attachment, set when media completes.
    pub media_path: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A stored media attachment and its processing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: String,
    pub provider_message_id: String,
    pub message_id: Option<String>,
    pub company_id: String,
    pub direction: Direction,
    pub kind: MediaKind,
    pub source_url: String,
    pub file_path: Option<String>,
    pub mime_type: Option<String>,
    pub duration_secs: Option<u32>,
    pub size_bytes: Option<i64>,
    pub status: MediaStatus,
    pub error_message: Option<String>,
    pub replay_count: u32,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

/// Whether an insert keyed by a unique provider id wrote a new row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// A row with the same provider id already existed.
    Duplicate,
}

/// Result of applying one delivery callback to a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusApplication {
    /// The message moved forward.
    Applied {
        from: DeliveryStatus,
        to: DeliveryStatus,
    },
    /// The callback would not move the message forward.
    Unchanged(DeliveryStatus),
    /// No message carries this external id (yet).
    Unknown,
}

/// Fields filled in when a media job completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCompletion {
    pub file_path: String,
    pub mime_type: String,
    pub size_bytes: i64,
    pub duration_secs: Option<u32>,
}

/// Counts of media records by processing status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaStats {
    pub received: i64,
    pub downloading: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

impl MediaStats {
    pub fn total(&self) -> i64 {
        self.received + self.downloading + self.processing + self.completed + self.failed
    }

    pub fn add(&mut self, status: MediaStatus, count: i64) {
        match status {
            MediaStatus::Received => self.received += count,
            MediaStatus::Downloading => self.downloading += count,
            MediaStatus::Processing => self.processing += count,
            MediaStatus::Completed => self.completed += count,
            MediaStatus::Failed => self.failed += count,
        }
    }
}

/// Message counts for one conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationStats {
    pub conversation_id: String,
    pub total: i64,
    pub from_customer: i64,
    pub from_agent: i64,
    pub from_system: i64,
}

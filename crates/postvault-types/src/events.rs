use serde::{Deserialize, Deserializer, Serialize};

/// One update as delivered by the Telegram Bot API, either through
/// `getUpdates` or a webhook POST.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,

    /// Direct message to the bot (used for operator commands).
    #[serde(default)]
    pub message: Option<IncomingMessage>,

    /// A new post in a channel the bot administers.
    #[serde(default)]
    pub channel_post: Option<ChannelPost>,

    /// An edit of an existing channel post. Not ingested.
    #[serde(default)]
    pub edited_channel_post: Option<ChannelPost>,
}

/// Raw channel-post event. Field names follow the Bot API `Message` object.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelPost {
    #[serde(deserialize_with = "string_or_number")]
    pub message_id: String,

    pub chat: Chat,

    /// Publication time, unix seconds.
    #[serde(default)]
    pub date: Option<i64>,

    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub caption: Option<String>,

    /// Available sizes of a photo, smallest first.
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,

    #[serde(default)]
    pub video: Option<FileRef>,

    #[serde(default)]
    pub document: Option<FileRef>,

    /// Kept raw: the source does not always send a number here.
    #[serde(default)]
    pub views: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chat {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,

    #[serde(default)]
    pub width: Option<u32>,

    #[serde(default)]
    pub height: Option<u32>,
}

/// Video or document descriptor; only the opaque file id is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRef {
    pub file_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub message_id: i64,
    pub chat: Chat,

    #[serde(default)]
    pub text: Option<String>,
}

/// Telegram ids are JSON integers; accept strings too so ids survive any
/// relay that stringifies them.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Str(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Int(n) => n.to_string(),
        Raw::Str(s) => s,
    })
}

use serde::{Deserialize, Serialize};

/// Lifecycle state of a queued playback item.
///
/// Transitions only move forward: `queued -> playing -> completed | failed`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Waiting in the FIFO.
    Queued,
    /// Being streamed to the output device.
    Playing,
    /// All chunks were written to the device.
    Completed,
    /// Processing or streaming failed, or playback was force-stopped.
    Failed,
}

impl ItemStatus {
    /// `true` for `completed` and `failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemStatus::Completed | ItemStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            ItemStatus::Queued => 0,
            ItemStatus::Playing => 1,
            ItemStatus::Completed | ItemStatus::Failed => 2,
        }
    }

    /// Whether moving from `self` to `next` is a legal forward transition.
    pub fn can_transition_to(self, next: ItemStatus) -> bool {
        !self.is_terminal() && next.rank() == self.rank() + 1
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Queued => "queued",
            ItemStatus::Playing => "playing",
            ItemStatus::Completed => "completed",
            ItemStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-item entry in a [`QueueStatus`] snapshot.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct QueueItemInfo {
    /// Item id returned by enqueue.
    pub id: String,
    /// Current lifecycle state.
    pub status: ItemStatus,
    /// Enqueue time in seconds since the Unix epoch.
    pub queued_at: f64,
    /// Source audio duration in milliseconds.
    pub duration_ms: u64,
    /// Failure reason for `failed` items.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Point-in-time view of the playback queue.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct QueueStatus {
    /// Id of the item being streamed, if any.
    pub currently_playing: Option<String>,
    /// Number of items waiting in the FIFO (excludes the playing item).
    pub queue_size: usize,
    /// `true` while an item is being streamed.
    pub is_playing: bool,
    /// Every known item, oldest first.
    pub items: Vec<QueueItemInfo>,
    /// Output device name once the stream is open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

/// Body for `POST /text`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TextRequest {
    pub text: String,
}

fn default_play_sample_rate() -> u32 {
    22_050
}

fn default_play_channels() -> u16 {
    1
}

/// Body for `POST /play`: raw float samples queued without synthesis.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PlayRequest {
    /// Samples in `[-1.0, 1.0]`, interleaved when `channels == 2`.
    pub audio_data: Vec<f32>,
    /// Source sample rate in Hz.
    #[serde(default = "default_play_sample_rate")]
    pub sample_rate: u32,
    /// Channel count of `audio_data` (1 or 2).
    #[serde(default = "default_play_channels")]
    pub channels: u16,
}

/// Response for enqueue-style endpoints.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct EnqueueResponse {
    pub task_id: String,
}

/// Response for `POST /stop`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct StopResponse {
    pub status: String,
}

/// Output device entry for `GET /devices`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct OutputDevice {
    pub name: String,
    pub min_rate: u32,
    pub max_rate: u32,
    pub max_channels: u16,
    pub is_default: bool,
}

/// Response for `GET /devices`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DevicesResponse {
    pub devices: Vec<OutputDevice>,
    /// Configured name preference used for device selection.
    pub preferred: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_only_move_forward() {
        assert!(ItemStatus::Queued.can_transition_to(ItemStatus::Playing));
        assert!(ItemStatus::Playing.can_transition_to(ItemStatus::Completed));
        assert!(ItemStatus::Playing.can_transition_to(ItemStatus::Failed));
        assert!(!ItemStatus::Queued.can_transition_to(ItemStatus::Completed));
        assert!(!ItemStatus::Playing.can_transition_to(ItemStatus::Queued));
        assert!(!ItemStatus::Completed.can_transition_to(ItemStatus::Failed));
        assert!(!ItemStatus::Failed.can_transition_to(ItemStatus::Completed));
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&ItemStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }

    #[test]
    fn play_request_defaults_rate_and_channels() {
        let req: PlayRequest = serde_json::from_str(r#"{"audio_data":[0.0,0.5]}"#).unwrap();
        assert_eq!(req.sample_rate, 22_050);
        assert_eq!(req.channels, 1);
        assert_eq!(req.audio_data.len(), 2);
    }

    #[test]
    fn queue_status_omits_missing_device() {
        let json = serde_json::to_value(QueueStatus::default()).unwrap();
        assert!(json.get("device").is_none());
        assert_eq!(json["currently_playing"], serde_json::Value::Null);
        assert_eq!(json["queue_size"], 0);
    }
}

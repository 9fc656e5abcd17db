use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::playback::speak_text,
        api::playback::play_audio,
        api::playback::stop_playback,
        api::playback::status,
        api::health::health,
        api::devices::devices_list,
    ),
    components(
        schemas(
            speech_queue_types::ItemStatus,
            speech_queue_types::QueueItemInfo,
            speech_queue_types::QueueStatus,
            speech_queue_types::TextRequest,
            speech_queue_types::PlayRequest,
            speech_queue_types::EnqueueResponse,
            speech_queue_types::StopResponse,
            speech_queue_types::OutputDevice,
            speech_queue_types::DevicesResponse,
            api::error::ErrorResponse,
            api::health::HealthResponse,
        )
    ),
    tags(
        (name = "speech-server", description = "Speech playback queue API")
    )
)]
pub struct ApiDoc;

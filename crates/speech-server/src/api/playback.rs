//! Queue and playback control handlers.

use actix_web::{HttpResponse, Responder, get, post, web};
use speech_queue_types::{EnqueueResponse, PlayRequest, QueueStatus, StopResponse, TextRequest};

use crate::api::error::{ApiError, ErrorResponse};
use crate::state::AppState;

fn enqueued(result: Result<String, speech_player::EnqueueError>) -> HttpResponse {
    match result {
        Ok(task_id) => HttpResponse::Ok().json(EnqueueResponse { task_id }),
        Err(err) => {
            tracing::warn!("enqueue rejected: {err}");
            ApiError::from(err).into_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/text",
    request_body = TextRequest,
    responses(
        (status = 200, description = "Speech synthesized and queued", body = EnqueueResponse),
        (status = 400, description = "Empty text", body = ErrorResponse),
        (status = 500, description = "Synthesis failed", body = ErrorResponse),
        (status = 502, description = "Synthesizer process failed", body = ErrorResponse),
        (status = 503, description = "No synthesizer configured", body = ErrorResponse)
    )
)]
#[post("/text")]
/// Synthesize text and queue the audio for playback.
pub async fn speak_text(state: web::Data<AppState>, body: web::Json<TextRequest>) -> impl Responder {
    let text = body.into_inner().text;
    if text.trim().is_empty() {
        return ApiError::BadRequest("text is empty".to_string()).into_response();
    }
    let Some(synth) = state.synth.clone() else {
        return ApiError::Unavailable("no synthesizer configured".to_string()).into_response();
    };

    let audio = match web::block(move || synth.synthesize(&text)).await {
        Ok(Ok(audio)) => audio,
        Ok(Err(err)) => {
            tracing::error!("text-to-speech failed: {err}");
            return ApiError::from(err).into_response();
        }
        Err(err) => {
            tracing::error!("text-to-speech task failed: {err}");
            return ApiError::Internal(err.to_string()).into_response();
        }
    };

    enqueued(
        state
            .player
            .enqueue_interleaved(audio.samples, audio.sample_rate, audio.channels),
    )
}

#[utoipa::path(
    post,
    path = "/play",
    request_body = PlayRequest,
    responses(
        (status = 200, description = "Audio queued", body = EnqueueResponse),
        (status = 400, description = "Malformed audio", body = ErrorResponse),
        (status = 503, description = "Shutting down", body = ErrorResponse)
    )
)]
#[post("/play")]
/// Queue raw float samples for playback.
pub async fn play_audio(state: web::Data<AppState>, body: web::Json<PlayRequest>) -> impl Responder {
    let req = body.into_inner();
    enqueued(
        state
            .player
            .enqueue_interleaved(req.audio_data, req.sample_rate, req.channels),
    )
}

#[utoipa::path(
    post,
    path = "/stop",
    responses(
        (status = 200, description = "Playback stopped and queue cleared", body = StopResponse)
    )
)]
#[post("/stop")]
/// Stop playback and clear the queue.
pub async fn stop_playback(state: web::Data<AppState>) -> impl Responder {
    state.player.stop();
    HttpResponse::Ok().json(StopResponse {
        status: "stopped".to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/status",
    responses(
        (status = 200, description = "Queue snapshot", body = QueueStatus)
    )
)]
#[get("/status")]
/// Current queue snapshot.
pub async fn status(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.player.status())
}

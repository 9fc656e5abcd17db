//! HTTP API handlers.
//!
//! Defines the Actix routes for speech synthesis, raw playback, and queue control.

pub mod devices;
pub mod error;
pub mod health;
pub mod playback;

pub use devices::devices_list;
pub use playback::{play_audio, speak_text, status, stop_playback};

use actix_web::{HttpRequest, error::InternalError, error::JsonPayloadError, web};

use crate::api::error::ApiError;

/// Largest accepted JSON body. Raw `/play` payloads run to minutes of float audio.
pub const MAX_JSON_BYTES: usize = 64 * 1024 * 1024;

/// JSON extractor settings: raised size limit, errors as `{"error": ...}` bodies.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(MAX_JSON_BYTES)
        .error_handler(|err: JsonPayloadError, _req: &HttpRequest| {
            tracing::warn!("rejected request body: {err}");
            let response = ApiError::BadRequest(err.to_string()).into_response();
            InternalError::from_response(err, response).into()
        })
}

/// Register every route on an app or scope.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .service(speak_text)
        .service(play_audio)
        .service(stop_playback)
        .service(status)
        .service(health::health)
        .service(devices_list);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use actix_web::http::StatusCode;
    use actix_web::{App, test, web};
    use speech_player::{OutputConfig, OutputSink, SpeechQueue};
    use speech_queue_types::{
        EnqueueResponse, ItemStatus, PlayRequest, QueueStatus, StopResponse, TextRequest,
    };

    use crate::state::AppState;
    use crate::synth::{SynthError, Synthesized, Synthesizer};

    /// Sink that accepts everything after a short delay, like a slow device.
    struct NullSink {
        active: bool,
    }

    impl OutputSink for NullSink {
        fn is_active(&self) -> bool {
            self.active
        }

        fn start(&mut self) -> anyhow::Result<()> {
            self.active = true;
            Ok(())
        }

        fn write(&mut self, _chunk: &[f32]) -> anyhow::Result<()> {
            std::thread::sleep(Duration::from_millis(2));
            Ok(())
        }

        fn drain(&mut self, cancel: &dyn Fn() -> bool) -> anyhow::Result<bool> {
            Ok(!cancel())
        }

        fn stop(&mut self) -> anyhow::Result<()> {
            self.active = false;
            Ok(())
        }

        fn close(&mut self) {
            self.active = false;
        }
    }

    struct ToneSynth;

    impl Synthesizer for ToneSynth {
        fn synthesize(&self, text: &str) -> Result<Synthesized, SynthError> {
            Ok(Synthesized {
                samples: vec![0.25; text.len() * 100],
                sample_rate: 22_050,
                channels: 1,
            })
        }
    }

    struct BrokenSynth;

    impl Synthesizer for BrokenSynth {
        fn synthesize(&self, _text: &str) -> Result<Synthesized, SynthError> {
            Err(SynthError::NoAudio)
        }
    }

    fn make_state(synth: Option<Arc<dyn Synthesizer>>) -> web::Data<AppState> {
        let cfg = OutputConfig {
            sample_rate: 8_000,
            channels: 2,
            chunk_frames: 64,
            device: None,
            idle_poll: Duration::from_millis(10),
            ..OutputConfig::default()
        };
        let player = SpeechQueue::start_with(
            cfg,
            Box::new(|_cfg: &OutputConfig| -> anyhow::Result<Box<dyn OutputSink>> {
                Ok(Box::new(NullSink { active: false }))
            }),
        )
        .expect("start player");
        web::Data::new(AppState::new(Arc::new(player), synth))
    }

    #[actix_web::test]
    async fn play_then_status_reports_item() {
        let state = make_state(None);
        let app = test::init_service(App::new().app_data(state.clone()).configure(super::configure))
            .await;

        let payload = PlayRequest {
            audio_data: vec![0.1; 8_000],
            sample_rate: 8_000,
            channels: 1,
        };
        let req = test::TestRequest::post().uri("/play").set_json(&payload).to_request();
        let resp: EnqueueResponse = test::call_and_read_body_json(&app, req).await;
        assert!(resp.task_id.starts_with("audio_"));

        let req = test::TestRequest::get().uri("/status").to_request();
        let status: QueueStatus = test::call_and_read_body_json(&app, req).await;
        let item = status.items.iter().find(|i| i.id == resp.task_id).unwrap();
        assert!(matches!(item.status, ItemStatus::Queued | ItemStatus::Playing));
    }

    #[actix_web::test]
    async fn play_rejects_empty_audio() {
        let state = make_state(None);
        let app = test::init_service(App::new().app_data(state.clone()).configure(super::configure))
            .await;

        let req = test::TestRequest::post()
            .uri("/play")
            .set_json(serde_json::json!({ "audio_data": [] }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "audio buffer is empty");
    }

    #[actix_web::test]
    async fn play_rejects_zero_rate() {
        let state = make_state(None);
        let app = test::init_service(App::new().app_data(state.clone()).configure(super::configure))
            .await;

        let req = test::TestRequest::post()
            .uri("/play")
            .set_json(serde_json::json!({ "audio_data": [0.1, 0.2], "sample_rate": 0 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(state.player.status().items.is_empty());
    }

    #[actix_web::test]
    async fn play_accepts_bodies_over_two_mib() {
        let state = make_state(None);
        let app = test::init_service(App::new().app_data(state.clone()).configure(super::configure))
            .await;

        // 10 s at 22.05 kHz serializes to well over 2 MiB.
        let payload = PlayRequest {
            audio_data: vec![0.123_456_7; 220_500],
            sample_rate: 22_050,
            channels: 1,
        };
        let body = serde_json::to_vec(&payload).unwrap();
        assert!(body.len() > 2 * 1024 * 1024);

        let req = test::TestRequest::post()
            .uri("/play")
            .insert_header(("content-type", "application/json"))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: EnqueueResponse = test::read_body_json(resp).await;
        assert!(body.task_id.starts_with("audio_"));
    }

    #[actix_web::test]
    async fn malformed_json_gets_error_body() {
        let state = make_state(None);
        let app = test::init_service(App::new().app_data(state.clone()).configure(super::configure))
            .await;

        let req = test::TestRequest::post()
            .uri("/play")
            .insert_header(("content-type", "application/json"))
            .set_payload("{\"audio_data\": [0.1,")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
        assert!(state.player.status().items.is_empty());
    }

    #[actix_web::test]
    async fn stop_clears_queue() {
        let state = make_state(None);
        let app = test::init_service(App::new().app_data(state.clone()).configure(super::configure))
            .await;

        for _ in 0..3 {
            state.player.enqueue(vec![0.2; 8_000], 8_000).unwrap();
        }
        let req = test::TestRequest::post().uri("/stop").to_request();
        let resp: StopResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(resp.status, "stopped");

        let status = state.player.status();
        assert_eq!(status.queue_size, 0);
        assert_eq!(status.currently_playing, None);
        assert!(!status.is_playing);
    }

    #[actix_web::test]
    async fn text_without_synth_is_unavailable() {
        let state = make_state(None);
        let app = test::init_service(App::new().app_data(state.clone()).configure(super::configure))
            .await;

        let req = test::TestRequest::post()
            .uri("/text")
            .set_json(TextRequest {
                text: "hej".to_string(),
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn text_is_synthesized_and_queued() {
        let state = make_state(Some(Arc::new(ToneSynth)));
        let app = test::init_service(App::new().app_data(state.clone()).configure(super::configure))
            .await;

        let req = test::TestRequest::post()
            .uri("/text")
            .set_json(TextRequest {
                text: "hello there".to_string(),
            })
            .to_request();
        let resp: EnqueueResponse = test::call_and_read_body_json(&app, req).await;
        let item = state
            .player
            .status()
            .items
            .into_iter()
            .find(|i| i.id == resp.task_id)
            .unwrap();
        assert_eq!(item.duration_ms, 1100 * 1000 / 22_050);
    }

    #[actix_web::test]
    async fn blank_text_is_bad_request() {
        let state = make_state(Some(Arc::new(ToneSynth)));
        let app = test::init_service(App::new().app_data(state.clone()).configure(super::configure))
            .await;

        let req = test::TestRequest::post()
            .uri("/text")
            .set_json(TextRequest {
                text: "  ".to_string(),
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn synthesis_failure_never_enqueues() {
        let state = make_state(Some(Arc::new(BrokenSynth)));
        let app = test::init_service(App::new().app_data(state.clone()).configure(super::configure))
            .await;

        let req = test::TestRequest::post()
            .uri("/text")
            .set_json(TextRequest {
                text: "hej".to_string(),
            })
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(state.player.status().items.is_empty());
    }

    #[actix_web::test]
    async fn shutting_down_player_returns_503() {
        let state = make_state(None);
        state.player.shutdown();
        let app = test::init_service(App::new().app_data(state.clone()).configure(super::configure))
            .await;

        let req = test::TestRequest::post()
            .uri("/play")
            .set_json(serde_json::json!({ "audio_data": [0.1] }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_web::test]
    async fn health_reports_ok() {
        let app = test::init_service(App::new().service(super::health::health)).await;
        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());
    }
}

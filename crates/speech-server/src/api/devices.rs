use actix_web::{HttpResponse, Responder, get, web};
use speech_queue_types::DevicesResponse;

use crate::api::error::{ApiError, ErrorResponse};
use crate::state::AppState;

#[utoipa::path(
    get,
    path = "/devices",
    responses(
        (status = 200, description = "Output devices on this host", body = DevicesResponse),
        (status = 500, description = "Device enumeration failed", body = ErrorResponse)
    )
)]
#[get("/devices")]
/// List output devices and the configured name preference.
pub async fn devices_list(state: web::Data<AppState>) -> impl Responder {
    let preferred = state.player.config().device.clone();
    let listed = web::block(|| {
        let host = cpal::default_host();
        speech_player::device::list_device_infos(&host)
    })
    .await;
    match listed {
        Ok(Ok(devices)) => HttpResponse::Ok().json(DevicesResponse { devices, preferred }),
        Ok(Err(err)) => {
            tracing::error!("device listing failed: {err:#}");
            ApiError::Internal(format!("{err:#}")).into_response()
        }
        Err(err) => ApiError::Internal(err.to_string()).into_response(),
    }
}

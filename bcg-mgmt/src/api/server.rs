//! warp routes of the management API

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::debug;
use warp::http::StatusCode;
use warp::reply::{Json, WithStatus};
use warp::{Filter, Rejection, Reply};

use super::messages::{
    CreateZoneRequest, CreateZoneResponse, Envelope, MuteState, SetDisplayNameRequest,
    SpeakerIdsRequest, ZoneNameRequest,
};
use crate::error::Result;
use crate::service::ZoneService;

/// Largest request body accepted
const MAX_BODY: u64 = 64 * 1024;

/// All management API routes, with errors rendered as envelopes
pub fn routes(
    service: Arc<ZoneService>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let with_service = warp::any().map(move || service.clone());

    let list_speakers = warp::path!("speakers")
        .and(warp::get())
        .and(with_service.clone())
        .and_then(list_speakers);

    let set_speaker_name = warp::path!("speakers" / String / "name")
        .and(warp::put())
        .and(json_body::<SetDisplayNameRequest>())
        .and(with_service.clone())
        .and_then(set_speaker_name);

    let speaker_track = warp::path!("speakers" / String / "track")
        .and(warp::get())
        .and(with_service.clone())
        .and_then(speaker_track);

    let get_mute = warp::path!("speakers" / String / "mute")
        .and(warp::get())
        .and(with_service.clone())
        .and_then(get_mute);

    let set_mute = warp::path!("speakers" / String / "mute")
        .and(warp::put())
        .and(json_body::<MuteState>())
        .and(with_service.clone())
        .and_then(set_mute);

    let list_zones = warp::path!("zones")
        .and(warp::get())
        .and(with_service.clone())
        .and_then(list_zones);

    let create_zone = warp::path!("zones")
        .and(warp::post())
        .and(json_body::<CreateZoneRequest>())
        .and(with_service.clone())
        .and_then(create_zone);

    let add_speakers = warp::path!("zones" / String / "speakers")
        .and(warp::post())
        .and(json_body::<SpeakerIdsRequest>())
        .and(with_service.clone())
        .and_then(add_speakers);

    let remove_speakers = warp::path!("zones" / String / "speakers" / "remove")
        .and(warp::post())
        .and(json_body::<SpeakerIdsRequest>())
        .and(with_service.clone())
        .and_then(remove_speakers);

    let rename_zone = warp::path!("zones" / String / "name")
        .and(warp::put())
        .and(json_body::<ZoneNameRequest>())
        .and(with_service.clone())
        .and_then(rename_zone);

    let delete_zone = warp::path!("zones" / String)
        .and(warp::delete())
        .and(with_service.clone())
        .and_then(delete_zone);

    let zone_track = warp::path!("zones" / String / "track")
        .and(warp::get())
        .and(with_service)
        .and_then(zone_track);

    list_speakers
        .or(set_speaker_name)
        .or(speaker_track)
        .or(get_mute)
        .or(set_mute)
        .or(list_zones)
        .or(create_zone)
        .or(add_speakers)
        .or(remove_speakers)
        .or(rename_zone)
        .or(delete_zone)
        .or(zone_track)
        .with(warp::log("bcg_mgmt::api"))
        .recover(handle_rejection)
}

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY).and(warp::body::json())
}

/// Render a service result as an enveloped JSON reply
fn respond<T: Serialize>(result: Result<T>) -> WithStatus<Json> {
    match result {
        Ok(data) => warp::reply::with_status(warp::reply::json(&Envelope::ok(data)), StatusCode::OK),
        Err(e) => {
            debug!("request failed: {}", e);
            let status =
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            warp::reply::with_status(warp::reply::json(&Envelope::<()>::error(&e)), status)
        }
    }
}

async fn list_speakers(service: Arc<ZoneService>) -> std::result::Result<WithStatus<Json>, Infallible> {
    Ok(respond(Ok(service.get_speakers())))
}

async fn set_speaker_name(
    id: String,
    req: SetDisplayNameRequest,
    service: Arc<ZoneService>,
) -> std::result::Result<WithStatus<Json>, Infallible> {
    Ok(respond(
        service
            .set_display_name(&id, &req.display_name, req.update_remote)
            .await,
    ))
}

async fn speaker_track(
    id: String,
    service: Arc<ZoneService>,
) -> std::result::Result<WithStatus<Json>, Infallible> {
    Ok(respond(service.get_track_for_speaker(&id).await))
}

async fn get_mute(id: String, service: Arc<ZoneService>) -> std::result::Result<WithStatus<Json>, Infallible> {
    let result = service
        .get_is_muted_for_speaker(&id)
        .await
        .map(|is_muted| MuteState { is_muted });
    Ok(respond(result))
}

async fn set_mute(
    id: String,
    req: MuteState,
    service: Arc<ZoneService>,
) -> std::result::Result<WithStatus<Json>, Infallible> {
    Ok(respond(service.set_mute_for_speaker(&id, req.is_muted).await))
}

async fn list_zones(service: Arc<ZoneService>) -> std::result::Result<WithStatus<Json>, Infallible> {
    Ok(respond(Ok(service.get_zones())))
}

async fn create_zone(
    req: CreateZoneRequest,
    service: Arc<ZoneService>,
) -> std::result::Result<WithStatus<Json>, Infallible> {
    let result = service
        .create_zone(&req.display_name, &req.speaker_ids)
        .await
        .map(|id| CreateZoneResponse { id });
    Ok(respond(result))
}

async fn add_speakers(
    zone_id: String,
    req: SpeakerIdsRequest,
    service: Arc<ZoneService>,
) -> std::result::Result<WithStatus<Json>, Infallible> {
    Ok(respond(
        service.add_speakers_to_zone(&zone_id, &req.speaker_ids).await,
    ))
}

async fn remove_speakers(
    zone_id: String,
    req: SpeakerIdsRequest,
    service: Arc<ZoneService>,
) -> std::result::Result<WithStatus<Json>, Infallible> {
    Ok(respond(
        service
            .remove_speakers_from_zone(&zone_id, &req.speaker_ids)
            .await,
    ))
}

async fn rename_zone(
    zone_id: String,
    req: ZoneNameRequest,
    service: Arc<ZoneService>,
) -> std::result::Result<WithStatus<Json>, Infallible> {
    Ok(respond(
        service.change_zone_name(&zone_id, &req.display_name).await,
    ))
}

async fn delete_zone(
    zone_id: String,
    service: Arc<ZoneService>,
) -> std::result::Result<WithStatus<Json>, Infallible> {
    Ok(respond(service.delete_zone(&zone_id).await))
}

async fn zone_track(
    zone_id: String,
    service: Arc<ZoneService>,
) -> std::result::Result<WithStatus<Json>, Infallible> {
    Ok(respond(service.get_track_for_zone(&zone_id).await))
}

/// Turn warp rejections into enveloped replies
async fn handle_rejection(err: Rejection) -> std::result::Result<WithStatus<Json>, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "route not found".to_string())
    } else if let Some(e) = err.find::<warp::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("invalid request body: {}", e))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "request body too large".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed".to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
    };

    let envelope = Envelope::<()> {
        code: status.as_u16(),
        message,
        data: None,
    };
    Ok(warp::reply::with_status(warp::reply::json(&envelope), status))
}

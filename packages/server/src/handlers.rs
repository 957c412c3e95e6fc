//! HTTP handler functions for the risk map API.

use actix_web::{HttpResponse, web};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use risk_map_event_models::Event;
use risk_map_risk::service::MODEL_NAME;
use risk_map_server_models::{
    ApiHealth, ApiMeta, DEFAULT_EVENTS_LIMIT, EventsQueryParams, PredictQueryParams,
};

use crate::AppState;

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/meta`
///
/// Describes the model and its decay constants.
pub async fn meta(state: web::Data<AppState>) -> HttpResponse {
    let config = state.risk.config();

    HttpResponse::Ok().json(ApiMeta {
        model: MODEL_NAME.to_string(),
        default_horizon: config.default_horizon_days,
        timescale_days: config.timescale_days,
        lengthscale_km: config.lengthscale_km,
    })
}

/// `GET /api/predict`
///
/// Computes (or recalls) the risk surface and returns it as a `GeoJSON`
/// `FeatureCollection`.
pub async fn predict(
    state: web::Data<AppState>,
    params: web::Query<PredictQueryParams>,
) -> HttpResponse {
    let request = params.resolve(&state.risk.config().default_request());
    let risk = state.risk.clone();

    match web::block(move || risk.predict_risk(&request)).await {
        Ok(Ok(surface)) => HttpResponse::Ok().json(surface.to_feature_collection()),
        Ok(Err(e)) => {
            log::warn!("Rejected predict request: {e}");
            HttpResponse::BadRequest().json(serde_json::json!({
                "error": e.to_string()
            }))
        }
        Err(e) => {
            log::error!("Risk computation failed: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to compute risk"
            }))
        }
    }
}

/// `GET /api/events`
///
/// Returns the newest located events as `GeoJSON` points.
pub async fn events(
    state: web::Data<AppState>,
    params: web::Query<EventsQueryParams>,
) -> HttpResponse {
    let limit = params.limit.unwrap_or(DEFAULT_EVENTS_LIMIT);
    let store = state.events.clone();

    match web::block(move || store.list_events(limit)).await {
        Ok(Ok(events)) => HttpResponse::Ok().json(events_to_feature_collection(&events)),
        Ok(Err(e)) => {
            log::error!("Failed to query events: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to query events"
            }))
        }
        Err(e) => {
            log::error!("Event query task failed: {e}");
            HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to query events"
            }))
        }
    }
}

/// Converts events to point features with `id`, `date` and `nkill`
/// properties.
fn events_to_feature_collection(events: &[Event]) -> FeatureCollection {
    let features = events
        .iter()
        .map(|event| {
            let mut properties = JsonObject::new();
            properties.insert("id".to_string(), event.id.clone().into());
            properties.insert(
                "date".to_string(),
                event
                    .occurred_at
                    .map(|d| d.format("%Y-%m-%d").to_string())
                    .into(),
            );
            properties.insert("nkill".to_string(), event.fatalities.into());

            Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Point(vec![
                    event.longitude,
                    event.latitude,
                ]))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

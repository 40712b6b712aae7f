use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;
use tripgate_core::domain::hotel::{ApprovedHotel, HotelFilter, NewApprovedHotel};
use tripgate_core::pagination::{Page, PageQuery};
use tripgate_db::repositories::{HotelRepository, SqlHotelRepository};

use super::context::Member;
use super::error::OrApiError;
use super::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct CreateHotelBody {
    pub name: String,
    pub country: String,
    pub state: String,
    pub city: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct HotelListQuery {
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub page: Option<i64>,
    pub size: Option<i64>,
}

pub async fn create(
    State(state): State<AppState>,
    member: Member,
    Json(body): Json<CreateHotelBody>,
) -> Result<(StatusCode, Json<ApprovedHotel>), ApiError> {
    let hotel = NewApprovedHotel {
        organization_id: member.organization_id,
        name: body.name,
        country: body.country,
        state: body.state,
        city: body.city,
    };
    let hotel = SqlHotelRepository::new(state.db_pool)
        .create(hotel, member.user_id)
        .await
        .or_api(&member.correlation_id)?;

    info!(
        event_name = "hotel.approved",
        correlation_id = %member.correlation_id,
        organization_id = member.organization_id.0,
        hotel_id = hotel.id.0,
        "hotel added to the approved catalogue"
    );
    Ok((StatusCode::CREATED, Json(hotel)))
}

pub async fn list(
    State(state): State<AppState>,
    member: Member,
    Query(query): Query<HotelListQuery>,
) -> Result<Json<Page<ApprovedHotel>>, ApiError> {
    let page = state.page(PageQuery { page: query.page, size: query.size });
    let filter = HotelFilter { country: query.country, state: query.state, city: query.city };

    let (hotels, total) = SqlHotelRepository::new(state.db_pool)
        .list(member.organization_id, filter, page)
        .await
        .or_api(&member.correlation_id)?;

    Ok(Json(Page::new(page, total, hotels, "/v1/hotels")))
}

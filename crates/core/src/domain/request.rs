use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::approval::ApprovalStatus;
use crate::domain::organization::{OrganizationId, UserId};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub i64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TravelRequest {
    pub id: RequestId,
    pub organization_id: OrganizationId,
    pub requester_id: UserId,
    pub country: Option<String>,
    pub state: String,
    pub city: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub purpose: Option<String>,
    pub hotel: Option<String>,
    pub room: Option<String>,
    pub rate: Option<Decimal>,
    pub meal: Option<String>,
    pub transport: Option<String>,
    pub other_requests: Option<String>,
    pub rejection_reason: Option<String>,
    pub status: ApprovalStatus,
    pub date_created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub is_deleted: bool,
}

impl TravelRequest {
    /// Nights between check-in and check-out; zero for same-day trips.
    pub fn nights(&self) -> i64 {
        (self.end - self.start).num_days().max(0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTravelRequest {
    pub organization_id: OrganizationId,
    pub requester_id: UserId,
    pub country: Option<String>,
    pub state: String,
    pub city: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub purpose: Option<String>,
    pub hotel: Option<String>,
    pub room: Option<String>,
    pub rate: Option<Decimal>,
    pub meal: Option<String>,
    pub transport: Option<String>,
    pub other_requests: Option<String>,
}

impl NewTravelRequest {
    pub fn validate(&self) -> Result<(), DomainError> {
        validate_date_range(self.start, self.end)?;
        if self.state.trim().is_empty() || self.city.trim().is_empty() {
            return Err(DomainError::InvariantViolation("state and city are required".to_string()));
        }
        if matches!(self.rate, Some(rate) if rate.is_sign_negative()) {
            return Err(DomainError::InvariantViolation("rate cannot be negative".to_string()));
        }
        Ok(())
    }
}

/// Trip detail changes. Status is not part of the patch: it only moves through the
/// approval workflow.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TravelRequestPatch {
    pub state: Option<String>,
    pub city: Option<String>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub purpose: Option<String>,
    pub hotel: Option<String>,
    pub room: Option<String>,
    pub rate: Option<Decimal>,
    pub meal: Option<String>,
    pub transport: Option<String>,
    pub other_requests: Option<String>,
}

impl TravelRequestPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    pub fn apply(&self, request: &mut TravelRequest, now: DateTime<Utc>) -> Result<(), DomainError> {
        let start = self.start.unwrap_or(request.start);
        let end = self.end.unwrap_or(request.end);
        validate_date_range(start, end)?;
        if matches!(self.rate, Some(rate) if rate.is_sign_negative()) {
            return Err(DomainError::InvariantViolation("rate cannot be negative".to_string()));
        }

        request.start = start;
        request.end = end;
        if let Some(state) = non_blank(&self.state) {
            request.state = state;
        }
        if let Some(city) = non_blank(&self.city) {
            request.city = city;
        }
        if let Some(rate) = self.rate {
            request.rate = Some(rate);
        }
        overwrite(&mut request.purpose, &self.purpose);
        overwrite(&mut request.hotel, &self.hotel);
        overwrite(&mut request.room, &self.room);
        overwrite(&mut request.meal, &self.meal);
        overwrite(&mut request.transport, &self.transport);
        overwrite(&mut request.other_requests, &self.other_requests);
        request.last_updated = now;
        Ok(())
    }
}

pub fn validate_date_range(start: NaiveDate, end: NaiveDate) -> Result<(), DomainError> {
    if start > end {
        return Err(DomainError::InvalidDateRange { start, end });
    }
    Ok(())
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|value| !value.trim().is_empty()).cloned()
}

fn overwrite(target: &mut Option<String>, value: &Option<String>) {
    if let Some(value) = non_blank(value) {
        *target = Some(value);
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use super::{NewTravelRequest, RequestId, TravelRequest, TravelRequestPatch};
    use crate::domain::approval::ApprovalStatus;
    use crate::domain::organization::{OrganizationId, UserId};
    use crate::errors::DomainError;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn new_request(start: NaiveDate, end: NaiveDate) -> NewTravelRequest {
        NewTravelRequest {
            organization_id: OrganizationId(1),
            requester_id: UserId(2),
            country: Some("Nigeria".to_string()),
            state: "Lagos".to_string(),
            city: "VI".to_string(),
            start,
            end,
            purpose: Some("client visit".to_string()),
            hotel: Some("Lagos Orient".to_string()),
            room: Some("standard".to_string()),
            rate: Some(Decimal::new(15000, 0)),
            meal: None,
            transport: None,
            other_requests: None,
        }
    }

    fn stored(start: NaiveDate, end: NaiveDate) -> TravelRequest {
        let now = Utc::now();
        TravelRequest {
            id: RequestId(1),
            organization_id: OrganizationId(1),
            requester_id: UserId(2),
            country: None,
            state: "Lagos".to_string(),
            city: "VI".to_string(),
            start,
            end,
            purpose: None,
            hotel: Some("Lagos Orient".to_string()),
            room: None,
            rate: Some(Decimal::new(15000, 0)),
            meal: None,
            transport: None,
            other_requests: None,
            rejection_reason: None,
            status: ApprovalStatus::Pending,
            date_created: now,
            last_updated: now,
            is_deleted: false,
        }
    }

    #[test]
    fn start_after_end_is_rejected() {
        let error = new_request(date(2024, 9, 5), date(2024, 8, 8))
            .validate()
            .expect_err("start after end must fail");
        assert!(matches!(error, DomainError::InvalidDateRange { .. }));
        assert_eq!(error.to_string(), "start date cannot be farther than end date");
    }

    #[test]
    fn same_day_trip_is_valid_and_has_zero_nights() {
        assert!(new_request(date(2024, 8, 8), date(2024, 8, 8)).validate().is_ok());
        assert_eq!(stored(date(2024, 8, 8), date(2024, 8, 8)).nights(), 0);
        assert_eq!(stored(date(2024, 8, 8), date(2024, 8, 11)).nights(), 3);
    }

    #[test]
    fn patch_keeps_fields_that_are_not_supplied() {
        let mut request = stored(date(2024, 10, 1), date(2024, 10, 3));
        let patch = TravelRequestPatch {
            city: Some("Ikeja".to_string()),
            hotel: Some("   ".to_string()),
            end: Some(date(2024, 10, 10)),
            ..TravelRequestPatch::default()
        };

        patch.apply(&mut request, Utc::now()).expect("patch applies");

        assert_eq!(request.city, "Ikeja");
        assert_eq!(request.hotel.as_deref(), Some("Lagos Orient"));
        assert_eq!(request.end, date(2024, 10, 10));
        assert_eq!(request.status, ApprovalStatus::Pending);
    }

    #[test]
    fn patch_cannot_invert_the_date_range() {
        let mut request = stored(date(2024, 10, 1), date(2024, 10, 3));
        let patch =
            TravelRequestPatch { start: Some(date(2024, 10, 5)), ..TravelRequestPatch::default() };

        assert!(patch.apply(&mut request, Utc::now()).is_err());
        assert_eq!(request.start, date(2024, 10, 1));
    }
}

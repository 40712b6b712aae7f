use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::organization::{OrganizationId, UserId};
use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HotelId(pub i64);

/// A hotel an organization has cleared for bookings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovedHotel {
    pub id: HotelId,
    pub organization_id: OrganizationId,
    pub name: String,
    pub country: String,
    pub state: String,
    pub city: String,
    pub created_by: Option<UserId>,
    pub date_created: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApprovedHotel {
    pub organization_id: OrganizationId,
    pub name: String,
    pub country: String,
    pub state: String,
    pub city: String,
}

impl NewApprovedHotel {
    /// Trims every field; all four are required.
    pub fn normalized(self) -> Result<Self, DomainError> {
        let hotel = Self {
            organization_id: self.organization_id,
            name: self.name.trim().to_string(),
            country: self.country.trim().to_string(),
            state: self.state.trim().to_string(),
            city: self.city.trim().to_string(),
        };
        let blank = [
            ("name", &hotel.name),
            ("country", &hotel.country),
            ("state", &hotel.state),
            ("city", &hotel.city),
        ]
        .into_iter()
        .find(|(_, value)| value.is_empty());
        if let Some((field, _)) = blank {
            return Err(DomainError::InvariantViolation(format!("hotel {field} is required")));
        }
        Ok(hotel)
    }
}

/// Location filters for the catalogue, matched case-insensitively. Blank values are ignored.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotelFilter {
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
}

impl HotelFilter {
    pub fn normalized(self) -> Self {
        let keep = |value: Option<String>| {
            value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
        };
        Self { country: keep(self.country), state: keep(self.state), city: keep(self.city) }
    }
}

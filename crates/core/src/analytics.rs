//! Spend and volume figures for an organization.
//!
//! Spend is nights × nightly rate, nights being whole days between `start` and `end`.
//! Requests without a rate contribute nothing. All filters apply to the request's creation
//! date, inclusive on both ends.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::approval::ApprovalStatus;
use crate::domain::group::GroupId;
use crate::domain::organization::{OrganizationId, UserId};
use crate::domain::request::{validate_date_range, TravelRequest};
use crate::errors::DomainError;

/// Length of every ranked list.
pub const RANKING_LIMIT: usize = 5;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self, DomainError> {
        if let (Some(start), Some(end)) = (start, end) {
            validate_date_range(start, end)?;
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let day = at.date_naive();
        self.start.map_or(true, |start| day >= start) && self.end.map_or(true, |end| day <= end)
    }
}

pub fn trip_cost(request: &TravelRequest) -> Decimal {
    request.rate.map_or(Decimal::ZERO, |rate| rate * Decimal::from(request.nights()))
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBreakdown {
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
}

impl StatusBreakdown {
    pub fn record(&mut self, status: ApprovalStatus) {
        match status {
            ApprovalStatus::Pending => self.pending += 1,
            ApprovalStatus::Approved => self.approved += 1,
            ApprovalStatus::Rejected => self.rejected += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.pending + self.approved + self.rejected
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotelStat {
    pub hotel: String,
    pub travel_count: u64,
    pub total_spend: Decimal,
}

/// Aggregates over a set of live requests.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTotals {
    pub requests: StatusBreakdown,
    pub hotels_booked: u64,
    pub total_spend: Decimal,
    pub top_hotels: Vec<HotelStat>,
}

impl RequestTotals {
    /// Soft-deleted requests and requests outside `window` are ignored.
    pub fn collect(requests: &[TravelRequest], window: &DateWindow) -> Self {
        let mut totals = Self::default();
        let mut hotels = BTreeSet::new();
        let mut approved_by_hotel: BTreeMap<&str, HotelStat> = BTreeMap::new();

        for request in requests
            .iter()
            .filter(|request| !request.is_deleted && window.contains(request.date_created))
        {
            let cost = trip_cost(request);
            totals.requests.record(request.status);
            totals.total_spend += cost;

            let Some(hotel) = request.hotel.as_deref().filter(|hotel| !hotel.trim().is_empty())
            else {
                continue;
            };
            hotels.insert(hotel);

            if request.status == ApprovalStatus::Approved {
                let stat = approved_by_hotel.entry(hotel).or_insert_with(|| HotelStat {
                    hotel: hotel.to_string(),
                    travel_count: 0,
                    total_spend: Decimal::ZERO,
                });
                stat.travel_count += 1;
                stat.total_spend += cost;
            }
        }

        totals.hotels_booked = hotels.len() as u64;
        let mut top: Vec<HotelStat> = approved_by_hotel.into_values().collect();
        top.sort_by(|left, right| {
            right.travel_count.cmp(&left.travel_count).then_with(|| left.hotel.cmp(&right.hotel))
        });
        top.truncate(RANKING_LIMIT);
        totals.top_hotels = top;
        totals
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationSummary {
    pub organization_id: OrganizationId,
    pub window: DateWindow,
    pub department_count: u64,
    pub member_count: u64,
    pub hotels_booked: u64,
    pub total_spend: Decimal,
    pub requests: StatusBreakdown,
    pub top_hotels: Vec<HotelStat>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentSpend {
    pub group_id: GroupId,
    pub name: String,
    pub request_count: u64,
    pub total_spend: Decimal,
}

/// A member as ranked lists show them. `department` is their first live group, if any.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traveller {
    pub user_id: UserId,
    pub name: String,
    pub department: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TravellerStat {
    #[serde(flatten)]
    pub traveller: Traveller,
    pub travel_count: u64,
    pub total_spend: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequesterStat {
    #[serde(flatten)]
    pub traveller: Traveller,
    pub total_requests: u64,
}

/// A hotel (`"Hotel, State"`) or destination (`"City, State"`) with its approved trips.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceStat {
    pub name: String,
    pub travel_count: u64,
    pub total_spend: Decimal,
}

fn in_window<'a>(
    requests: &'a [TravelRequest],
    window: &'a DateWindow,
) -> impl Iterator<Item = &'a TravelRequest> + 'a {
    requests.iter().filter(move |request| !request.is_deleted && window.contains(request.date_created))
}

fn approved_in_window<'a>(
    requests: &'a [TravelRequest],
    window: &'a DateWindow,
) -> impl Iterator<Item = &'a TravelRequest> + 'a {
    in_window(requests, window).filter(|request| request.status == ApprovalStatus::Approved)
}

fn travel_by_person(
    requests: &[TravelRequest],
    window: &DateWindow,
) -> BTreeMap<UserId, (u64, Decimal)> {
    let mut travel: BTreeMap<UserId, (u64, Decimal)> = BTreeMap::new();
    for request in approved_in_window(requests, window) {
        let entry = travel.entry(request.requester_id).or_insert((0, Decimal::ZERO));
        entry.0 += 1;
        entry.1 += trip_cost(request);
    }
    travel
}

fn sort_by_travel(ranked: &mut Vec<TravellerStat>) {
    ranked.sort_by(|left, right| {
        right
            .travel_count
            .cmp(&left.travel_count)
            .then_with(|| right.total_spend.cmp(&left.total_spend))
            .then_with(|| left.traveller.name.cmp(&right.traveller.name))
    });
    ranked.truncate(RANKING_LIMIT);
}

/// Members with the most approved trips in the window. Requesters missing from `people` are
/// not ranked.
pub fn rank_travellers(
    requests: &[TravelRequest],
    window: &DateWindow,
    people: &[Traveller],
) -> Vec<TravellerStat> {
    let travel = travel_by_person(requests, window);
    let mut ranked: Vec<TravellerStat> = people
        .iter()
        .filter_map(|person| {
            travel.get(&person.user_id).map(|(travel_count, total_spend)| TravellerStat {
                traveller: person.clone(),
                travel_count: *travel_count,
                total_spend: *total_spend,
            })
        })
        .collect();
    sort_by_travel(&mut ranked);
    ranked
}

/// Like [`rank_travellers`], but every coworker is listed, including those with no approved
/// trips.
pub fn rank_coworkers(
    requests: &[TravelRequest],
    window: &DateWindow,
    coworkers: &[Traveller],
) -> Vec<TravellerStat> {
    let travel = travel_by_person(requests, window);
    let mut ranked: Vec<TravellerStat> = coworkers
        .iter()
        .map(|person| {
            let (travel_count, total_spend) =
                travel.get(&person.user_id).copied().unwrap_or((0, Decimal::ZERO));
            TravellerStat { traveller: person.clone(), travel_count, total_spend }
        })
        .collect();
    sort_by_travel(&mut ranked);
    ranked
}

/// Members who raised the most requests in the window, whatever their status.
pub fn rank_requesters(
    requests: &[TravelRequest],
    window: &DateWindow,
    people: &[Traveller],
) -> Vec<RequesterStat> {
    let mut counts: BTreeMap<UserId, u64> = BTreeMap::new();
    for request in in_window(requests, window) {
        *counts.entry(request.requester_id).or_default() += 1;
    }

    let mut ranked: Vec<RequesterStat> = people
        .iter()
        .filter_map(|person| {
            counts.get(&person.user_id).map(|total_requests| RequesterStat {
                traveller: person.clone(),
                total_requests: *total_requests,
            })
        })
        .collect();
    ranked.sort_by(|left, right| {
        right
            .total_requests
            .cmp(&left.total_requests)
            .then_with(|| left.traveller.name.cmp(&right.traveller.name))
    });
    ranked.truncate(RANKING_LIMIT);
    ranked
}

fn rank_places<F>(requests: &[TravelRequest], window: &DateWindow, place: F) -> Vec<PlaceStat>
where
    F: Fn(&TravelRequest) -> Option<String>,
{
    let mut places: BTreeMap<String, PlaceStat> = BTreeMap::new();
    for request in approved_in_window(requests, window) {
        let Some(name) = place(request) else {
            continue;
        };
        let stat = places.entry(name.clone()).or_insert_with(|| PlaceStat {
            name,
            travel_count: 0,
            total_spend: Decimal::ZERO,
        });
        stat.travel_count += 1;
        stat.total_spend += trip_cost(request);
    }

    let mut ranked: Vec<PlaceStat> = places.into_values().collect();
    ranked.sort_by(|left, right| {
        right
            .travel_count
            .cmp(&left.travel_count)
            .then_with(|| right.total_spend.cmp(&left.total_spend))
            .then_with(|| left.name.cmp(&right.name))
    });
    ranked.truncate(RANKING_LIMIT);
    ranked
}

/// Approved trips per hotel and state. Requests without a hotel are skipped.
pub fn rank_hotels(requests: &[TravelRequest], window: &DateWindow) -> Vec<PlaceStat> {
    rank_places(requests, window, |request| {
        let hotel = request.hotel.as_deref().map(str::trim).filter(|hotel| !hotel.is_empty())?;
        Some(format!("{hotel}, {}", request.state))
    })
}

/// Approved trips per city and state.
pub fn rank_destinations(requests: &[TravelRequest], window: &DateWindow) -> Vec<PlaceStat> {
    rank_places(requests, window, |request| Some(format!("{}, {}", request.city, request.state)))
}

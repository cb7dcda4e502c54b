// Wire types for the transfer booking API
// Field names follow the JSON payloads the API sends and expects

use crate::api_client::ApiError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// Trip mode accepted by the search endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripMode {
    OneWay,
    RoundTrip,
}

impl Default for TripMode {
    fn default() -> Self {
        TripMode::OneWay
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub start_address: String,
    pub end_address: String,
    #[serde(default)]
    pub mode: TripMode,
    #[serde(with = "pickup_format")]
    pub pickup_datetime: NaiveDateTime,
    pub num_passengers: u32,
    pub currency: String,
    pub campaign: String,
}

// The API takes pickup times as "YYYY-MM-DD HH:MM" in the pickup location's local time
mod pickup_format {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%Y-%m-%d %H:%M";

    pub fn serialize<S>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT).map_err(serde::de::Error::custom)
    }
}

// Opaque token returned by the search endpoint, used as the poll key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchId(pub String);

impl fmt::Display for SearchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchCreated {
    pub search_id: SearchId,
}

// One poll-search response. `more_coming` defaults to true so an API that
// omits it is polled until results show up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPage {
    #[serde(default)]
    pub results: Vec<SearchResult>,
    #[serde(default = "more_coming_default")]
    pub more_coming: bool,
}

fn more_coming_default() -> bool {
    true
}

// A priced offer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub result_id: String,
    #[serde(default)]
    pub vehicle: Vehicle,
    pub total_price: TotalPrice,
}

impl SearchResult {
    pub fn price(&self) -> f64 {
        self.total_price.total_price.value
    }

    pub fn vehicle_type(&self) -> &str {
        &self.vehicle.vehicle_type.name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    #[serde(default)]
    pub vehicle_type: VehicleType,
    #[serde(default)]
    pub max_passengers: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleType {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalPrice {
    pub total_price: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Money {
    #[serde(deserialize_with = "amount")]
    pub value: f64,
    #[serde(default)]
    pub display: Option<String>,
}

// Amounts arrive as decimal strings ("45.10") but plain numbers are accepted too
fn amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Amount {
        Number(f64),
        Text(String),
    }

    match Amount::deserialize(deserializer)? {
        Amount::Number(value) => Ok(value),
        Amount::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passenger {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub country_code_name: String,
    pub phone_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub airline_iata_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flight_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub result_id: String,
    pub search_id: SearchId,
    #[serde(flatten)]
    pub passenger: Passenger,
}

impl BookingRequest {
    pub fn new(result_id: impl Into<String>, search_id: SearchId, passenger: Passenger) -> Self {
        Self {
            result_id: result_id.into(),
            search_id,
            passenger,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(pub String);

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a reservation as reported by the API.
///
/// `Pending` is the only non-terminal state. Every status string other than
/// "pending" and "completed" is treated as a failure and kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ReservationStatus {
    Pending,
    Completed,
    Failed(String),
}

impl ReservationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationStatus::Pending)
    }

    pub fn can_transition_to(&self, next: &ReservationStatus) -> bool {
        match self {
            ReservationStatus::Pending => true,
            terminal => terminal == next,
        }
    }
}

impl From<String> for ReservationStatus {
    fn from(raw: String) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "pending" => ReservationStatus::Pending,
            "completed" => ReservationStatus::Completed,
            _ => ReservationStatus::Failed(raw),
        }
    }
}

impl From<ReservationStatus> for String {
    fn from(status: ReservationStatus) -> Self {
        status.to_string()
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservationStatus::Pending => f.write_str("pending"),
            ReservationStatus::Completed => f.write_str("completed"),
            ReservationStatus::Failed(raw) => f.write_str(raw),
        }
    }
}

// Body of both the booking and the reservation poll responses. The API keys the
// reservation by its search and only lists records once they exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationEnvelope {
    pub status: ReservationStatus,
    #[serde(default)]
    pub reservations: Vec<ReservationRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationRecord {
    pub id: ReservationId,
    #[serde(default)]
    pub confirmation_number: Option<String>,
}

impl ReservationEnvelope {
    // Status comes from the top level, id and confirmation from the first record
    pub fn into_reservation(self, search_id: &SearchId) -> Result<Reservation, ApiError> {
        let record = self.reservations.into_iter().next();
        if self.status == ReservationStatus::Completed && record.is_none() {
            return Err(ApiError::Decode(format!(
                "completed reservation for search {} lists no reservations",
                search_id
            )));
        }

        let (id, confirmation_number) = match record {
            Some(record) => (Some(record.id), record.confirmation_number),
            None => (None, None),
        };
        Ok(Reservation {
            search_id: search_id.clone(),
            id,
            confirmation_number,
            status: self.status,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub search_id: SearchId,
    pub id: Option<ReservationId>,
    pub confirmation_number: Option<String>,
    pub status: ReservationStatus,
}

impl Reservation {
    // Apply a polled snapshot. Terminal states are final.
    pub fn observe(&mut self, snapshot: Reservation) -> Result<(), ApiError> {
        if !self.status.can_transition_to(&snapshot.status) {
            return Err(ApiError::IllegalTransition {
                from: self.status.to_string(),
                to: snapshot.status.to_string(),
            });
        }

        self.status = snapshot.status;
        if snapshot.id.is_some() {
            self.id = snapshot.id;
        }
        if snapshot.confirmation_number.is_some() {
            self.confirmation_number = snapshot.confirmation_number;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub reservation_id: ReservationId,
    pub cancelled: bool,
}

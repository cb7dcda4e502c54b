// Transfer booking API client
// One typed method per remote operation. The client never retries; polling
// belongs to the driver in `polling`.

use crate::config::ClientConfig;
use crate::models::{
    BookingRequest, Confirmation, Reservation, ReservationEnvelope, ReservationId,
    SearchCreated, SearchId, SearchPage, SearchRequest,
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub const API_KEY_HEADER: &str = "API-KEY";

// Error taxonomy for API calls and polling
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Authentication rejected ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Validation failed ({status}): {}", describe_fields(.fields))]
    Validation {
        status: u16,
        fields: BTreeMap<String, Vec<String>>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service error{}: {message}", status_suffix(.status))]
    Service {
        status: Option<u16>,
        message: String,
    },

    #[error("Could not decode response: {0}")]
    Decode(String),

    #[error("Polling gave up after {attempts} attempts")]
    PollTimeout { attempts: u32 },

    #[error("Reservation cannot move from {from} to {to}")]
    IllegalTransition { from: String, to: String },
}

impl ApiError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Auth { status, .. } | ApiError::Validation { status, .. } => Some(*status),
            ApiError::NotFound(_) => Some(404),
            ApiError::Conflict(_) => Some(409),
            ApiError::Service { status, .. } => *status,
            _ => None,
        }
    }
}

fn describe_fields(fields: &BTreeMap<String, Vec<String>>) -> String {
    fields
        .iter()
        .map(|(field, messages)| format!("{}: {}", field, messages.join("; ")))
        .collect::<Vec<_>>()
        .join(", ")
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|code| format!(" ({})", code)).unwrap_or_default()
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Initialization error: {0}")]
    InitError(String),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClientStats {
    pub requests_sent: usize,
    pub requests_succeeded: usize,
    pub requests_failed: usize,
}

#[async_trait]
pub trait TransferApi: Send + Sync {
    // Starts a search and returns the token used to poll it
    async fn search(&self, request: &SearchRequest) -> Result<SearchId, ApiError>;

    // Current result snapshot. An empty page is a valid answer, not an error.
    async fn poll_search(&self, search_id: &SearchId) -> Result<SearchPage, ApiError>;

    async fn book(&self, request: &BookingRequest) -> Result<Reservation, ApiError>;

    // Reservations are polled by the search they were booked from
    async fn poll_reservation(&self, search_id: &SearchId) -> Result<Reservation, ApiError>;

    async fn cancel(&self, reservation_id: &ReservationId) -> Result<Confirmation, ApiError>;

    fn stats(&self) -> ClientStats;
}

pub struct HttpTransferClient {
    http: Client,
    base_url: String,
    api_key: String,
    stats: Arc<Mutex<ClientStats>>,
}

impl HttpTransferClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;

        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ClientError::InitError(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            stats: Arc::new(Mutex::new(ClientStats::default())),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // Exactly one outbound request per call
    async fn dispatch(&self, request: RequestBuilder) -> Result<Bytes, ApiError> {
        self.stats.lock().requests_sent += 1;

        let outcome = self.exchange(request).await;

        let mut stats = self.stats.lock();
        match &outcome {
            Ok(_) => stats.requests_succeeded += 1,
            Err(_) => stats.requests_failed += 1,
        }
        outcome
    }

    async fn exchange(&self, request: RequestBuilder) -> Result<Bytes, ApiError> {
        let response = request
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;
        debug!(status = status.as_u16(), bytes = body.len(), "response received");

        if status.is_success() {
            Ok(body)
        } else {
            let error = error_for_status(status, &body);
            warn!(status = status.as_u16(), error = %error, "request rejected");
            Err(error)
        }
    }
}

#[async_trait]
impl TransferApi for HttpTransferClient {
    async fn search(&self, request: &SearchRequest) -> Result<SearchId, ApiError> {
        debug!(from = %request.start_address, to = %request.end_address, "creating search");
        let body = self
            .dispatch(self.http.post(self.url("search/")).json(request))
            .await?;
        let created: SearchCreated = decode(&body)?;
        Ok(created.search_id)
    }

    async fn poll_search(&self, search_id: &SearchId) -> Result<SearchPage, ApiError> {
        let url = self.url(&format!("search/{}/poll/", search_id));
        let body = self.dispatch(self.http.get(url)).await?;
        decode(&body)
    }

    async fn book(&self, request: &BookingRequest) -> Result<Reservation, ApiError> {
        debug!(result_id = %request.result_id, search_id = %request.search_id, "booking offer");
        let body = self
            .dispatch(self.http.post(self.url("reservations/")).json(request))
            .await?;
        let envelope: ReservationEnvelope = decode(&body)?;
        envelope.into_reservation(&request.search_id)
    }

    async fn poll_reservation(&self, search_id: &SearchId) -> Result<Reservation, ApiError> {
        let url = self.url(&format!("reservations/{}/poll/", search_id));
        let body = self.dispatch(self.http.get(url)).await?;
        let envelope: ReservationEnvelope = decode(&body)?;
        envelope.into_reservation(search_id)
    }

    async fn cancel(&self, reservation_id: &ReservationId) -> Result<Confirmation, ApiError> {
        let url = self.url(&format!("reservations/{}", reservation_id));
        self.dispatch(self.http.delete(url)).await?;
        Ok(Confirmation {
            reservation_id: reservation_id.clone(),
            cancelled: true,
        })
    }

    fn stats(&self) -> ClientStats {
        self.stats.lock().clone()
    }
}

fn decode<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::Decode(e.to_string()))
}

fn transport_error(error: reqwest::Error) -> ApiError {
    let message = if error.is_timeout() {
        format!("request timed out: {}", error)
    } else {
        error.to_string()
    };
    ApiError::Service {
        status: error.status().map(|s| s.as_u16()),
        message,
    }
}

// Maps a non-2xx response onto the error taxonomy
pub fn error_for_status(status: StatusCode, body: &[u8]) -> ApiError {
    let code = status.as_u16();
    match code {
        401 | 403 => ApiError::Auth {
            status: code,
            message: error_message(body),
        },
        404 => ApiError::NotFound(error_message(body)),
        409 => ApiError::Conflict(error_message(body)),
        400..=499 => ApiError::Validation {
            status: code,
            fields: field_errors(body),
        },
        _ => ApiError::Service {
            status: Some(code),
            message: error_message(body),
        },
    }
}

fn error_message(body: &[u8]) -> String {
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_slice(body) {
        for key in ["detail", "error", "message"] {
            if let Some(serde_json::Value::String(message)) = map.get(key) {
                return message.clone();
            }
        }
    }

    let text = String::from_utf8_lossy(body).trim().to_string();
    if text.is_empty() {
        "<empty body>".to_string()
    } else {
        text
    }
}

// Accepts `{"field": ["msg", ..]}`, `{"field": "msg"}` and falls back to the raw body
fn field_errors(body: &[u8]) -> BTreeMap<String, Vec<String>> {
    let mut fields = BTreeMap::new();

    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => {
            for (field, detail) in map {
                let messages = match detail {
                    serde_json::Value::Array(items) => items
                        .into_iter()
                        .map(|item| match item {
                            serde_json::Value::String(s) => s,
                            other => other.to_string(),
                        })
                        .collect(),
                    serde_json::Value::String(s) => vec![s],
                    other => vec![other.to_string()],
                };
                fields.insert(field, messages);
            }
        }
        Ok(serde_json::Value::Array(items)) => {
            let messages = items.into_iter().map(|item| item.to_string()).collect();
            fields.insert("non_field_errors".to_string(), messages);
        }
        _ => {
            fields.insert("non_field_errors".to_string(), vec![error_message(body)]);
        }
    }

    fields
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Passenger, ReservationStatus, TripMode};
    use chrono::NaiveDateTime;
    use serde_json::json;
    use test_case::test_case;
    use tokio_test::{assert_err, assert_ok};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HttpTransferClient {
        let mut config = ClientConfig::new(&server.uri(), "test-key");
        config.timeout_ms = 2000;
        HttpTransferClient::new(&config).unwrap()
    }

    fn search_request() -> SearchRequest {
        SearchRequest {
            start_address: "44 Tehama Street, San Francisco, CA, USA".to_string(),
            end_address: "SFO".to_string(),
            mode: TripMode::OneWay,
            pickup_datetime: NaiveDateTime::parse_from_str("2023-12-01 15:30", "%Y-%m-%d %H:%M")
                .unwrap(),
            num_passengers: 2,
            currency: "USD".to_string(),
            campaign: "integration".to_string(),
        }
    }

    fn booking_request() -> BookingRequest {
        BookingRequest::new(
            "offer-1",
            SearchId("s-1".to_string()),
            Passenger {
                first_name: "Grace".to_string(),
                last_name: "Hopper".to_string(),
                email: "grace@example.com".to_string(),
                country_code_name: "US".to_string(),
                phone_number: "(855) 980 5669".to_string(),
                airline_iata_code: Some("UA".to_string()),
                flight_number: Some("1201".to_string()),
            },
        )
    }

    #[tokio::test]
    async fn search_sends_api_key_and_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search/"))
            .and(header(API_KEY_HEADER, "test-key"))
            .and(body_partial_json(json!({
                "end_address": "SFO",
                "pickup_datetime": "2023-12-01 15:30",
                "mode": "one_way"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"search_id": "abc123"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let search_id = assert_ok!(client.search(&search_request()).await);

        assert_eq!(search_id, SearchId("abc123".to_string()));
        assert_eq!(
            client.stats(),
            ClientStats {
                requests_sent: 1,
                requests_succeeded: 1,
                requests_failed: 0
            }
        );
    }

    #[tokio::test]
    async fn empty_poll_search_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/abc123/poll/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"results": [], "more_coming": true})),
            )
            .mount(&server)
            .await;

        let page = assert_ok!(
            client_for(&server)
                .poll_search(&SearchId("abc123".to_string()))
                .await
        );
        assert!(page.results.is_empty());
        assert!(page.more_coming);
    }

    #[tokio::test]
    async fn book_and_poll_reservation_read_the_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/reservations/"))
            .and(body_partial_json(json!({"result_id": "offer-1", "search_id": "s-1", "first_name": "Grace"})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "status": "pending",
                "reservations": []
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/reservations/s-1/poll/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "completed",
                "reservations": [{"id": "res-7", "confirmation_number": "MOZ-1"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let booked = assert_ok!(client.book(&booking_request()).await);
        assert_eq!(booked.status, ReservationStatus::Pending);
        assert_eq!(booked.id, None);
        assert_eq!(booked.confirmation_number, None);

        let polled = assert_ok!(client.poll_reservation(&booked.search_id).await);
        assert_eq!(polled.status, ReservationStatus::Completed);
        assert_eq!(polled.id, Some(ReservationId("res-7".to_string())));
        assert_eq!(polled.confirmation_number.as_deref(), Some("MOZ-1"));
    }

    #[tokio::test]
    async fn completed_poll_without_records_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/reservations/s-1/poll/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"status": "Completed", "reservations": []})),
            )
            .mount(&server)
            .await;

        let error = assert_err!(
            client_for(&server)
                .poll_reservation(&SearchId("s-1".to_string()))
                .await
        );
        assert!(matches!(error, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn cancel_uses_delete_without_trailing_slash() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/reservations/res-7"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let confirmation = assert_ok!(
            client_for(&server)
                .cancel(&ReservationId("res-7".to_string()))
                .await
        );
        assert!(confirmation.cancelled);
        assert_eq!(confirmation.reservation_id, ReservationId("res-7".to_string()));
    }

    #[tokio::test]
    async fn cancelling_twice_is_a_conflict() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/reservations/res-7"))
            .respond_with(
                ResponseTemplate::new(409)
                    .set_body_json(json!({"detail": "Reservation already cancelled."})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let error = assert_err!(client.cancel(&ReservationId("res-7".to_string())).await);

        match error {
            ApiError::Conflict(message) => assert_eq!(message, "Reservation already cancelled."),
            other => panic!("expected conflict, got {:?}", other),
        }
        assert_eq!(client.stats().requests_failed, 1);
    }

    #[tokio::test]
    async fn validation_errors_keep_field_detail() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/reservations/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "result_id": ["This result has expired."],
                "email": "Enter a valid email address."
            })))
            .mount(&server)
            .await;

        let error = assert_err!(client_for(&server).book(&booking_request()).await);
        match error {
            ApiError::Validation { status, fields } => {
                assert_eq!(status, 400);
                assert_eq!(fields["result_id"], vec!["This result has expired."]);
                assert_eq!(fields["email"], vec!["Enter a valid email address."]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn undecodable_success_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>ok</html>"))
            .mount(&server)
            .await;

        let error = assert_err!(client_for(&server).search(&search_request()).await);
        assert!(matches!(error, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_service_error() {
        let config = ClientConfig::new("http://127.0.0.1:9", "test-key");
        let client = HttpTransferClient::new(&config).unwrap();

        let error = assert_err!(client.poll_search(&SearchId("x".to_string())).await);
        assert!(matches!(error, ApiError::Service { status: None, .. }));
    }

    #[test_case(401, "auth"; "unauthorized")]
    #[test_case(403, "auth"; "forbidden")]
    #[test_case(404, "not_found"; "not found")]
    #[test_case(409, "conflict"; "conflict")]
    #[test_case(422, "validation"; "unprocessable")]
    #[test_case(500, "service"; "internal error")]
    #[test_case(503, "service"; "unavailable")]
    fn status_codes_map_to_taxonomy(code: u16, expected: &str) {
        let status = StatusCode::from_u16(code).unwrap();
        let error = error_for_status(status, br#"{"detail": "nope"}"#);

        let kind = match &error {
            ApiError::Auth { .. } => "auth",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_) => "conflict",
            ApiError::Validation { .. } => "validation",
            ApiError::Service { .. } => "service",
            _ => "other",
        };
        assert_eq!(kind, expected);
        assert_eq!(error.status_code(), Some(code));
    }

    #[test]
    fn non_json_error_body_is_kept_verbatim() {
        let error = error_for_status(StatusCode::BAD_GATEWAY, b"upstream down\n");
        assert_eq!(error.to_string(), "Service error (502): upstream down");

        let error = error_for_status(StatusCode::BAD_REQUEST, b"");
        match error {
            ApiError::Validation { fields, .. } => {
                assert_eq!(fields["non_field_errors"], vec!["<empty body>"])
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}

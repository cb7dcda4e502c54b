// Client for driving a transfer booking API end to end:
// search, poll for offers, book the cheapest, poll the reservation, cancel

pub mod api_client;
pub mod config;
pub mod demo;
pub mod flow;
pub mod models;
pub mod polling;

// Re-export key types for convenience
pub use api_client::{ApiError, ClientError, ClientStats, HttpTransferClient, TransferApi};
pub use crate::config::{ClientConfig, PollConfig};
pub use flow::{cheapest_offer, BookingFlow, FlowError, FlowReport};
pub use models::{
    BookingRequest, Confirmation, Passenger, Reservation, ReservationId, ReservationStatus,
    SearchId, SearchPage, SearchRequest, SearchResult,
};
pub use polling::{
    poll_until, PollOutcome, PollPolicy, Polled, SearchPollMode, Sleeper, TokioSleeper,
};

// Search -> book -> cancel orchestration on top of the client and polling driver

use crate::api_client::{ApiError, TransferApi};
use crate::config::PollConfig;
use crate::models::{
    BookingRequest, Confirmation, Passenger, Reservation, ReservationStatus, SearchId,
    SearchRequest, SearchResult,
};
use crate::polling::{
    poll_until, PollPolicy, Polled, ReservationTracker, SearchPollMode, SearchTracker, Sleeper,
    TokioSleeper,
};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Search {search_id} finished without offers after {attempts} polls")]
    NoOffers { search_id: SearchId, attempts: u32 },

    #[error("Completed reservation for search {search_id} carries no reservation id")]
    MissingReservationId { search_id: SearchId },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlowReport {
    pub search_id: SearchId,
    pub offers_found: usize,
    pub offer: SearchResult,
    pub reservation: Reservation,
    pub cancellation: Option<Confirmation>,
    pub search_attempts: u32,
    pub reservation_attempts: u32,
}

// Cheapest offer; on equal prices the first one seen wins
pub fn cheapest_offer(offers: &[SearchResult]) -> Option<&SearchResult> {
    offers
        .iter()
        .min_by(|a, b| a.price().total_cmp(&b.price()))
}

pub struct BookingFlow<A, S = TokioSleeper> {
    api: A,
    sleeper: S,
    policy: PollPolicy,
    search_mode: SearchPollMode,
}

impl<A: TransferApi> BookingFlow<A, TokioSleeper> {
    pub fn new(api: A, poll: &PollConfig) -> Self {
        Self::with_sleeper(api, TokioSleeper, poll)
    }
}

impl<A: TransferApi, S: Sleeper> BookingFlow<A, S> {
    pub fn with_sleeper(api: A, sleeper: S, poll: &PollConfig) -> Self {
        Self {
            api,
            sleeper,
            policy: PollPolicy::from(poll),
            search_mode: poll.search_mode,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub async fn search_and_gather(
        &self,
        request: &SearchRequest,
    ) -> Result<(SearchId, Polled<Vec<SearchResult>>), FlowError> {
        let search_id = self.api.search(request).await?;
        info!(%search_id, "search created");

        let tracker = Mutex::new(SearchTracker::new(self.search_mode));
        let (api, id, tracker_ref) = (&self.api, &search_id, &tracker);
        let gathered = poll_until(&self.policy, &self.sleeper, move |_| async move {
            let page = api.poll_search(id).await?;
            let outcome = tracker_ref.lock().absorb(page);
            Ok::<_, ApiError>(outcome)
        })
        .await?;

        info!(
            %search_id,
            results = gathered.value.len(),
            attempts = gathered.attempts,
            "search results gathered"
        );
        Ok((search_id, gathered))
    }

    pub async fn book_and_wait(
        &self,
        request: &BookingRequest,
    ) -> Result<Polled<Reservation>, FlowError> {
        let booked = self.api.book(request).await?;
        info!(search_id = %request.search_id, status = %booked.status, "reservation created");

        let tracker = Mutex::new(ReservationTracker::new(booked));
        let (api, id, tracker_ref) = (&self.api, &request.search_id, &tracker);
        let resolved = poll_until(&self.policy, &self.sleeper, move |_| async move {
            let snapshot = api.poll_reservation(id).await?;
            tracker_ref.lock().absorb(snapshot)
        })
        .await?;

        info!(
            search_id = %request.search_id,
            reservation_id = ?resolved.value.id,
            status = %resolved.value.status,
            attempts = resolved.attempts,
            "reservation resolved"
        );
        Ok(resolved)
    }

    // Only a completed reservation is cancelled
    pub async fn cancel_if_completed(
        &self,
        reservation: &Reservation,
    ) -> Result<Option<Confirmation>, FlowError> {
        match reservation.status {
            ReservationStatus::Completed => {
                let reservation_id = reservation.id.as_ref().ok_or_else(|| {
                    FlowError::MissingReservationId {
                        search_id: reservation.search_id.clone(),
                    }
                })?;
                let confirmation = self.api.cancel(reservation_id).await?;
                info!(%reservation_id, "reservation cancelled");
                Ok(Some(confirmation))
            }
            _ => {
                info!(
                    search_id = %reservation.search_id,
                    status = %reservation.status,
                    "skipping cancellation"
                );
                Ok(None)
            }
        }
    }

    pub async fn run(
        &self,
        request: &SearchRequest,
        passenger: &Passenger,
    ) -> Result<FlowReport, FlowError> {
        let (search_id, gathered) = self.search_and_gather(request).await?;

        let offer = match cheapest_offer(&gathered.value) {
            Some(offer) => offer.clone(),
            None => {
                return Err(FlowError::NoOffers {
                    search_id,
                    attempts: gathered.attempts,
                })
            }
        };
        info!(result_id = %offer.result_id, price = offer.price(), "cheapest offer selected");

        let booking =
            BookingRequest::new(offer.result_id.clone(), search_id.clone(), passenger.clone());
        let resolved = self.book_and_wait(&booking).await?;
        let cancellation = self.cancel_if_completed(&resolved.value).await?;

        Ok(FlowReport {
            search_id,
            offers_found: gathered.value.len(),
            offer,
            reservation: resolved.value,
            cancellation,
            search_attempts: gathered.attempts,
            reservation_attempts: resolved.attempts,
        })
    }
}

// Inputs for the end-to-end demo run: a fixed airport search and a made-up passenger

use crate::models::{Passenger, SearchRequest, TripMode};
use chrono::{Days, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

const FIRST_NAMES: &[&str] = &[
    "Avery", "Jordan", "Morgan", "Riley", "Casey", "Quinn", "Harper", "Rowan",
];
const LAST_NAMES: &[&str] = &[
    "Nguyen", "Okafor", "Schmidt", "Garcia", "Kowalski", "Tanaka", "Haddad", "Murphy",
];

pub const DEMO_CAMPAIGN: &str = "transfer-booking-flow demo";

// San Francisco downtown to SFO, two passengers, two weeks out at 15:30
pub fn demo_search_request() -> SearchRequest {
    let today = Utc::now().date_naive();
    let pickup_datetime = today
        .checked_add_days(Days::new(14))
        .unwrap_or(today)
        .and_hms_opt(15, 30, 0)
        .unwrap_or_else(|| Utc::now().naive_utc());

    SearchRequest {
        start_address: "44 Tehama Street, San Francisco, CA, USA".to_string(),
        end_address: "SFO".to_string(),
        mode: TripMode::OneWay,
        pickup_datetime,
        num_passengers: 2,
        currency: "USD".to_string(),
        campaign: DEMO_CAMPAIGN.to_string(),
    }
}

pub fn random_passenger<R: Rng + ?Sized>(rng: &mut R) -> Passenger {
    let first = FIRST_NAMES.choose(rng).copied().unwrap_or("Avery");
    let last = LAST_NAMES.choose(rng).copied().unwrap_or("Nguyen");
    let suffix: u16 = rng.gen_range(10..1000);

    Passenger {
        first_name: first.to_string(),
        last_name: last.to_string(),
        email: format!(
            "{}.{}{}@example.com",
            first.to_lowercase(),
            last.to_lowercase(),
            suffix
        ),
        country_code_name: "US".to_string(),
        phone_number: "(855) 980 5669".to_string(),
        airline_iata_code: Some("UA".to_string()),
        flight_number: Some("1201".to_string()),
    }
}

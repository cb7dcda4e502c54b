use anyhow::{Context, Result};
use transfer_booking_flow::demo::{demo_search_request, random_passenger};
use transfer_booking_flow::{
    BookingFlow, ClientConfig, HttpTransferClient, ReservationStatus, TransferApi,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ClientConfig::from_env().context("loading configuration")?;
    info!(base_url = %config.base_url, "starting booking flow");

    let client = HttpTransferClient::new(&config).context("building http client")?;
    let flow = BookingFlow::new(client, &config.poll);

    let request = demo_search_request();
    let passenger = random_passenger(&mut rand::thread_rng());

    println!("Searching {} -> {} ...", request.start_address, request.end_address);
    let report = flow
        .run(&request, &passenger)
        .await
        .context("running the booking flow")?;

    println!(
        "  {} offers after {} search poll requests",
        report.offers_found, report.search_attempts
    );
    let vehicle = match report.offer.vehicle_type() {
        "" => "vehicle",
        name => name,
    };
    println!(
        "Booked the cheapest offer: {} at {:.2} {}",
        vehicle,
        report.offer.price(),
        request.currency
    );

    let reservation = &report.reservation;
    match &reservation.status {
        ReservationStatus::Completed => {
            println!("  Done ({} reservation poll requests)", report.reservation_attempts);
            println!(
                "\t- Confirmation Number: {}\n\t- Reservation ID: {}",
                reservation.confirmation_number.as_deref().unwrap_or("-"),
                reservation
                    .id
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "-".to_string())
            );
        }
        status => println!("  Failed (Status: {})", status),
    }

    match &report.cancellation {
        Some(confirmation) => println!("Cancelled reservation {}", confirmation.reservation_id),
        None => println!("Skipping the cancellation."),
    }

    let stats = flow.api().stats();
    info!(
        sent = stats.requests_sent,
        succeeded = stats.requests_succeeded,
        failed = stats.requests_failed,
        "booking flow finished"
    );
    Ok(())
}

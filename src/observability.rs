use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total queries executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "lodge_queries_total";

/// Histogram: query latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "lodge_query_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "lodge_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "lodge_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "lodge_connections_rejected_total";

/// Gauge: number of active tenants (loaded engines).
pub const TENANTS_ACTIVE: &str = "lodge_tenants_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "lodge_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "lodge_wal_flush_batch_size";

// ── Business counters ───────────────────────────────────────────

/// Counter: bookings confirmed, directly or from a reservation.
pub const BOOKINGS_CREATED_TOTAL: &str = "lodge_bookings_created_total";

/// Counter: bookings moved to cancelled.
pub const BOOKINGS_CANCELLED_TOTAL: &str = "lodge_bookings_cancelled_total";

/// Counter: expired reservations released by the reaper.
pub const RESERVATIONS_REAPED_TOTAL: &str = "lodge_reservations_reaped_total";

/// Install the Prometheus exporter on `port`. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::InsertHotel { .. } => "insert_hotel",
        Command::UpdateHotel { .. } => "update_hotel",
        Command::DeleteHotel { .. } => "delete_hotel",
        Command::SelectHotels { .. } => "select_hotels",
        Command::InsertRoom { .. } => "insert_room",
        Command::UpdateRoom { .. } => "update_room",
        Command::DeleteRoom { .. } => "delete_room",
        Command::SelectRooms { .. } => "select_rooms",
        Command::InsertUser { .. } => "insert_user",
        Command::UpdateUser { .. } => "update_user",
        Command::DeleteUser { .. } => "delete_user",
        Command::SelectUsers { .. } => "select_users",
        Command::InsertClosure { .. } => "insert_closure",
        Command::DeleteClosure { .. } => "delete_closure",
        Command::SelectClosures { .. } => "select_closures",
        Command::InsertReservation { .. } => "insert_reservation",
        Command::DeleteReservation { .. } => "delete_reservation",
        Command::SelectReservations { .. } => "select_reservations",
        Command::InsertBooking(_) => "insert_booking",
        Command::BatchInsertBookings(_) => "batch_insert_bookings",
        Command::ConfirmReservation { .. } => "confirm_reservation",
        Command::UpdateBookingStatus { .. } => "update_booking_status",
        Command::DeleteBooking { .. } => "delete_booking",
        Command::SelectBookings(_) => "select_bookings",
        Command::InsertNotification { .. } => "insert_notification",
        Command::UpdateNotification { .. } => "update_notification",
        Command::DeleteNotification { .. } => "delete_notification",
        Command::SelectNotifications { .. } => "select_notifications",
        Command::SelectAvailability { .. } => "select_availability",
        Command::SelectAvailableRooms { .. } => "select_available_rooms",
        Command::SelectDashboard { .. } => "select_dashboard",
    }
}

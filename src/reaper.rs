use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::{Engine, now_ms};

/// How often the compactor checks the WAL growth.
const COMPACT_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Release reservations whose hold has run out, every `period`.
pub async fn run_reaper(engine: Arc<Engine>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        reap_expired(&engine).await;
    }
}

/// One reaper pass. Returns how many reservations were released.
pub async fn reap_expired(engine: &Engine) -> usize {
    let mut released = 0;
    for (reservation_id, room_id) in engine.collect_expired_reservations(now_ms()) {
        match engine.release_reservation(reservation_id).await {
            Ok(_) => {
                released += 1;
                metrics::counter!(crate::observability::RESERVATIONS_REAPED_TOTAL).increment(1);
                info!("reaped expired reservation {reservation_id} on room {room_id}");
            }
            // Confirmed or cancelled between the scan and the release.
            Err(e) => debug!("reaper skip {reservation_id}: {e}"),
        }
    }
    released
}

/// Rewrite the WAL once `threshold` events were appended since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACT_CHECK_INTERVAL);
    loop {
        interval.tick().await;
        let appended = engine.wal_appends_since_compact().await;
        if appended < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appended} appends"),
            Err(e) => warn!("WAL compaction failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("lodge_test_reaper");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    async fn setup(name: &str) -> (Engine, Ulid, Ulid) {
        let engine = Engine::new(test_wal_path(name)).unwrap();
        let hotel = Ulid::new();
        engine
            .create_hotel(hotel, "Harbor".into(), "Lisbon".into(), None, None)
            .await
            .unwrap();
        let room = Ulid::new();
        engine
            .create_room(room, hotel, "single".into(), 9_000, 1, 1)
            .await
            .unwrap();
        let user = Ulid::new();
        engine
            .create_user(user, "rui@example.com".into(), "Rui".into(), None, Role::Guest)
            .await
            .unwrap();
        (engine, room, user)
    }

    fn stay(room_id: Ulid, user_id: Ulid) -> StayRequest {
        let start = parse_day("2030-06-01").unwrap();
        StayRequest {
            id: Ulid::new(),
            room_id,
            user_id,
            span: Span::new(start, start + 2 * DAY_MS),
            guests: 1,
        }
    }

    #[tokio::test]
    async fn reaper_releases_expired_reservations() {
        let (engine, room, user) = setup("reaper_release.wal").await;
        let request = stay(room, user);
        engine
            .place_reservation(request, now_ms() + 30)
            .await
            .unwrap();
        assert_eq!(reap_expired(&engine).await, 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(engine.collect_expired_reservations(now_ms()).len(), 1);
        assert_eq!(reap_expired(&engine).await, 1);
        assert!(engine.collect_expired_reservations(now_ms()).is_empty());

        // The room is bookable again.
        engine
            .create_booking(StayRequest {
                id: Ulid::new(),
                ..request
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn reaper_leaves_live_reservations() {
        let (engine, room, user) = setup("reaper_live.wal").await;
        engine
            .place_reservation(stay(room, user), now_ms() + 60_000)
            .await
            .unwrap();
        assert_eq!(reap_expired(&engine).await, 0);
        assert_eq!(engine.list_reservations(Some(room), None).await.len(), 1);
    }
}

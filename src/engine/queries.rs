use ulid::Ulid;

use crate::model::*;

use super::availability::room_availability;
use super::conflict::now_ms;
use super::validate::{validate_stay, validate_window};
use super::{Engine, EngineError, SharedRoom};

impl Engine {
    /// Hotel closures clamped to `query`, sorted by start.
    async fn inherited_closures(&self, hotel_id: &Ulid, query: &Span) -> Vec<Span> {
        match self.get_hotel_state(hotel_id) {
            Some(hs) => hs.read().await.timeline.closures_within(query),
            None => Vec::new(),
        }
    }

    async fn free_spans(&self, rs: &SharedRoom, query: &Span, now: Ms) -> (Room, Vec<Span>) {
        let guard = rs.read().await;
        let inherited = self.inherited_closures(&guard.room.hotel_id, query).await;
        let free = room_availability(&guard, query, &inherited, now);
        (guard.room.clone(), free)
    }

    pub async fn room_availability(
        &self,
        room_id: Ulid,
        query: Span,
        min_nights: Option<i64>,
    ) -> Result<Vec<Span>, EngineError> {
        validate_window(&query)?;
        let rs = self
            .get_room_state(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let (_, mut free) = self.free_spans(&rs, &query, now_ms()).await;

        if let Some(n) = min_nights {
            free.retain(|span| span.duration_ms() >= n.saturating_mul(DAY_MS));
        }
        Ok(free)
    }

    /// Rooms of a hotel that are free for the whole stay and fit `guests`.
    pub async fn available_rooms(
        &self,
        hotel_id: Ulid,
        stay: Span,
        guests: Option<u32>,
    ) -> Result<Vec<Room>, EngineError> {
        validate_stay(&stay)?;
        if !self.hotels.contains_key(&hotel_id) {
            return Err(EngineError::NotFound(hotel_id));
        }
        let now = now_ms();
        let mut result = Vec::new();
        for rs in self.hotel_rooms(hotel_id) {
            let (room, free) = self.free_spans(&rs, &stay, now).await;
            if guests.is_some_and(|g| g > room.max_guests) {
                continue;
            }
            if free.iter().any(|s| s.contains_span(&stay)) {
                result.push(room);
            }
        }
        result.sort_by_key(|r| r.id);
        Ok(result)
    }

    fn hotel_rooms(&self, hotel_id: Ulid) -> Vec<SharedRoom> {
        let ids = self
            .rooms_by_hotel
            .get(&hotel_id)
            .map(|kids| kids.clone())
            .unwrap_or_default();
        ids.iter().filter_map(|id| self.get_room_state(id)).collect()
    }

    // ── Listings ─────────────────────────────────────────────

    pub async fn list_hotels(&self) -> Vec<Hotel> {
        let shared: Vec<_> = self.hotels.iter().map(|e| e.value().clone()).collect();
        let mut hotels = Vec::with_capacity(shared.len());
        for hs in shared {
            hotels.push(hs.read().await.hotel.clone());
        }
        hotels.sort_by_key(|h| h.id);
        hotels
    }

    pub async fn get_hotel(&self, id: Ulid) -> Option<Hotel> {
        let hs = self.get_hotel_state(&id)?;
        Some(hs.read().await.hotel.clone())
    }

    pub async fn list_rooms(&self, hotel_id: Option<Ulid>) -> Vec<Room> {
        let shared: Vec<_> = match hotel_id {
            Some(h) => self.hotel_rooms(h),
            None => self.rooms.iter().map(|e| e.value().clone()).collect(),
        };
        let mut rooms = Vec::with_capacity(shared.len());
        for rs in shared {
            rooms.push(rs.read().await.room.clone());
        }
        rooms.sort_by_key(|r| r.id);
        rooms
    }

    pub async fn get_room(&self, id: Ulid) -> Option<Room> {
        let rs = self.get_room_state(&id)?;
        Some(rs.read().await.room.clone())
    }

    pub fn list_users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.iter().map(|e| e.value().clone()).collect();
        users.sort_by_key(|u| u.id);
        users
    }

    pub fn get_user(&self, id: Ulid) -> Option<User> {
        self.users.get(&id).map(|u| u.value().clone())
    }

    pub async fn list_closures(&self, target_id: Ulid) -> Result<Vec<ClosureInfo>, EngineError> {
        let intervals = if let Some(rs) = self.get_room_state(&target_id) {
            rs.read().await.timeline.intervals.clone()
        } else if let Some(hs) = self.get_hotel_state(&target_id) {
            hs.read().await.timeline.intervals.clone()
        } else {
            return Err(EngineError::NotFound(target_id));
        };
        Ok(intervals
            .into_iter()
            .filter(|i| matches!(i.kind, IntervalKind::Closure))
            .map(|i| ClosureInfo {
                id: i.id,
                target_id,
                start: i.span.start,
                end: i.span.end,
            })
            .collect())
    }

    /// Unexpired reservations, optionally for one room or one user.
    pub async fn list_reservations(&self, room_id: Option<Ulid>, user_id: Option<Ulid>) -> Vec<ReservationInfo> {
        let shared: Vec<_> = match room_id {
            Some(id) => self.get_room_state(&id).into_iter().collect(),
            None => self.rooms.iter().map(|e| e.value().clone()).collect(),
        };
        let now = now_ms();
        let mut result = Vec::new();
        for rs in shared {
            let guard = rs.read().await;
            for interval in &guard.timeline.intervals {
                let IntervalKind::Reservation {
                    user_id: holder,
                    guests,
                    expires_at,
                } = interval.kind
                else {
                    continue;
                };
                if expires_at <= now || user_id.is_some_and(|u| u != holder) {
                    continue;
                }
                result.push(ReservationInfo {
                    id: interval.id,
                    room_id: guard.room.id,
                    user_id: holder,
                    check_in: interval.span.start,
                    check_out: interval.span.end,
                    guests,
                    expires_at,
                });
            }
        }
        result.sort_by_key(|r| r.id);
        result
    }

    pub fn list_bookings(&self, filter: BookingFilter) -> Vec<Booking> {
        let mut bookings: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|b| filter.matches(b.value()))
            .map(|b| b.value().clone())
            .collect();
        bookings.sort_by_key(|b| b.id);
        bookings
    }

    pub fn get_booking(&self, id: Ulid) -> Option<Booking> {
        self.bookings.get(&id).map(|b| b.value().clone())
    }

    pub fn list_notifications(&self, user_id: Option<Ulid>) -> Vec<Notification> {
        let mut result: Vec<Notification> = self
            .notifications
            .iter()
            .filter(|n| user_id.is_none_or(|u| n.user_id == u))
            .map(|n| n.value().clone())
            .collect();
        result.sort_by_key(|n| n.id);
        result
    }

    // ── Dashboard ────────────────────────────────────────────

    /// Counts and revenue, tenant-wide or for one hotel.
    pub async fn dashboard(&self, hotel_id: Option<Ulid>) -> Result<DashboardStats, EngineError> {
        let mut stats = DashboardStats::default();
        let rooms = match hotel_id {
            Some(id) => {
                if !self.hotels.contains_key(&id) {
                    return Err(EngineError::NotFound(id));
                }
                stats.hotels = 1;
                self.hotel_rooms(id)
            }
            None => {
                stats.hotels = self.hotels.len() as u64;
                stats.users = self.users.len() as u64;
                self.rooms.iter().map(|e| e.value().clone()).collect()
            }
        };
        stats.rooms = rooms.len() as u64;

        let filter = hotel_id.map_or(BookingFilter::All, BookingFilter::Hotel);
        for entry in self.bookings.iter() {
            let b = entry.value();
            if !filter.matches(b) {
                continue;
            }
            stats.bookings += 1;
            match b.status {
                BookingStatus::Confirmed | BookingStatus::CheckedIn => stats.active_bookings += 1,
                BookingStatus::Completed => stats.completed_bookings += 1,
                BookingStatus::Cancelled => stats.cancelled_bookings += 1,
            }
            if b.status != BookingStatus::Cancelled {
                stats.revenue = stats
                    .revenue
                    .checked_add(b.total_price)
                    .ok_or(EngineError::LimitExceeded("revenue out of range"))?;
            }
        }

        let now = now_ms();
        for rs in rooms {
            let guard = rs.read().await;
            stats.reservations += guard
                .timeline
                .intervals
                .iter()
                .filter(|i| matches!(i.kind, IntervalKind::Reservation { .. }) && i.occupies(now))
                .count() as u64;
        }
        Ok(stats)
    }
}

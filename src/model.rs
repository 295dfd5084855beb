use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, the only time type.
pub type Ms = i64;

/// One night.
pub const DAY_MS: Ms = 86_400_000;

/// Half-open interval `[start, end)`. For stays, `start` is check-in and `end` is check-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Whole nights covered, rounding a partial night up.
    pub fn nights(&self) -> i64 {
        (self.duration_ms() + DAY_MS - 1) / DAY_MS
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Confirmed,
    CheckedIn,
    Completed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::CheckedIn => "checked_in",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    /// Still holds the room.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::CheckedIn)
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Confirmed, CheckedIn)
                | (Confirmed, Completed)
                | (Confirmed, Cancelled)
                | (CheckedIn, Completed)
                | (CheckedIn, Cancelled)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "confirmed" => Ok(BookingStatus::Confirmed),
            "checked_in" => Ok(BookingStatus::CheckedIn),
            "completed" => Ok(BookingStatus::Completed),
            "cancelled" | "canceled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Guest,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "guest" | "user" => Ok(Role::Guest),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

// ── Records ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hotel {
    pub id: Ulid,
    pub name: String,
    pub location: String,
    pub description: Option<String>,
    pub stars: Option<u8>,
    pub created_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub hotel_id: Ulid,
    pub room_type: String,
    /// Integer cents.
    pub price_per_night: i64,
    pub max_guests: u32,
    /// Interchangeable units of this room type.
    pub units: u32,
    pub available: bool,
    pub created_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Ulid,
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub role: Role,
    pub created_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub room_id: Ulid,
    pub hotel_id: Ulid,
    pub user_id: Ulid,
    pub span: Span,
    pub guests: u32,
    pub total_price: i64,
    pub status: BookingStatus,
    pub created_at: Ms,
    pub updated_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Ulid,
    pub user_id: Ulid,
    pub title: String,
    pub message: String,
    pub read: bool,
    pub created_at: Ms,
}

/// Partial update; `None` keeps the current value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HotelPatch {
    pub name: Option<String>,
    pub location: Option<String>,
    pub description: Option<Option<String>>,
    pub stars: Option<Option<u8>>,
}

impl HotelPatch {
    pub fn apply(self, hotel: &mut Hotel) {
        if let Some(v) = self.name {
            hotel.name = v;
        }
        if let Some(v) = self.location {
            hotel.location = v;
        }
        if let Some(v) = self.description {
            hotel.description = v;
        }
        if let Some(v) = self.stars {
            hotel.stars = v;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomPatch {
    pub room_type: Option<String>,
    pub price_per_night: Option<i64>,
    pub max_guests: Option<u32>,
    pub units: Option<u32>,
    pub available: Option<bool>,
}

impl RoomPatch {
    pub fn apply(self, room: &mut Room) {
        if let Some(v) = self.room_type {
            room.room_type = v;
        }
        if let Some(v) = self.price_per_night {
            room.price_per_night = v;
        }
        if let Some(v) = self.max_guests {
            room.max_guests = v;
        }
        if let Some(v) = self.units {
            room.units = v;
        }
        if let Some(v) = self.available {
            room.available = v;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub phone: Option<Option<String>>,
    pub role: Option<Role>,
}

impl UserPatch {
    pub fn apply(self, user: &mut User) {
        if let Some(v) = self.email {
            user.email = v;
        }
        if let Some(v) = self.full_name {
            user.full_name = v;
        }
        if let Some(v) = self.phone {
            user.phone = v;
        }
        if let Some(v) = self.role {
            user.role = v;
        }
    }
}

/// A requested stay, as carried by reservations and bookings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StayRequest {
    pub id: Ulid,
    pub room_id: Ulid,
    pub user_id: Ulid,
    pub span: Span,
    pub guests: u32,
}

/// Midnight UTC of a `YYYY-MM-DD` date.
pub fn parse_day(s: &str) -> Option<Ms> {
    let date = chrono::NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()?;
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis())
}

/// `YYYY-MM-DD` of a timestamp, falling back to the raw number when out of range.
pub fn format_day(ms: Ms) -> String {
    match chrono::DateTime::from_timestamp_millis(ms) {
        Some(dt) => dt.format("%Y-%m-%d").to_string(),
        None => ms.to_string(),
    }
}

// ── Timelines ────────────────────────────────────────────────────

/// What an interval on a timeline represents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntervalKind {
    /// Closes the hotel or room for this range.
    Closure,
    /// Temporary hold pending payment.
    Reservation {
        user_id: Ulid,
        guests: u32,
        expires_at: Ms,
    },
    /// Active booking. The interval id is the booking id.
    Booking,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub id: Ulid,
    pub span: Span,
    pub kind: IntervalKind,
}

impl Interval {
    /// Occupies a unit of the room at `now`. Expired reservations do not.
    pub fn occupies(&self, now: Ms) -> bool {
        match &self.kind {
            IntervalKind::Reservation { expires_at, .. } => *expires_at > now,
            IntervalKind::Booking => true,
            IntervalKind::Closure => false,
        }
    }
}

/// Intervals sorted by `span.start`.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    pub intervals: Vec<Interval>,
}

impl Timeline {
    /// Insert interval maintaining sort order by span.start.
    pub fn insert(&mut self, interval: Interval) {
        let pos = self
            .intervals
            .binary_search_by_key(&interval.span.start, |i| i.span.start)
            .unwrap_or_else(|e| e);
        self.intervals.insert(pos, interval);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<Interval> {
        let pos = self.intervals.iter().position(|i| i.id == id)?;
        Some(self.intervals.remove(pos))
    }

    pub fn get(&self, id: Ulid) -> Option<&Interval> {
        self.intervals.iter().find(|i| i.id == id)
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Return only intervals whose span overlaps the query window.
    /// Uses binary search to skip intervals starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Interval> {
        let right_bound = self
            .intervals
            .partition_point(|i| i.span.start < query.end);
        self.intervals[..right_bound]
            .iter()
            .filter(move |i| i.span.end > query.start)
    }

    /// Closure spans clamped to `query`.
    pub fn closures_within(&self, query: &Span) -> Vec<Span> {
        self.overlapping(query)
            .filter(|i| matches!(i.kind, IntervalKind::Closure))
            .map(|i| Span::new(i.span.start.max(query.start), i.span.end.min(query.end)))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct HotelState {
    pub hotel: Hotel,
    /// Only closures live on a hotel timeline.
    pub timeline: Timeline,
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub room: Room,
    pub timeline: Timeline,
}

impl RoomState {
    pub fn new(room: Room) -> Self {
        Self {
            room,
            timeline: Timeline::default(),
        }
    }

    pub fn has_allocations(&self, now: Ms) -> bool {
        self.timeline.intervals.iter().any(|i| i.occupies(now))
    }
}

/// The event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    HotelCreated(Hotel),
    HotelUpdated(Hotel),
    HotelDeleted {
        id: Ulid,
    },
    RoomCreated(Room),
    RoomUpdated(Room),
    RoomDeleted {
        id: Ulid,
        hotel_id: Ulid,
    },
    UserCreated(User),
    UserUpdated(User),
    UserDeleted {
        id: Ulid,
    },
    ClosureAdded {
        id: Ulid,
        target_id: Ulid,
        span: Span,
    },
    ClosureRemoved {
        id: Ulid,
        target_id: Ulid,
    },
    ReservationPlaced {
        id: Ulid,
        room_id: Ulid,
        user_id: Ulid,
        span: Span,
        guests: u32,
        expires_at: Ms,
    },
    ReservationReleased {
        id: Ulid,
        room_id: Ulid,
    },
    /// `reservation_id` is set when the booking replaces a reservation.
    BookingConfirmed {
        booking: Booking,
        reservation_id: Option<Ulid>,
    },
    BookingStatusChanged {
        id: Ulid,
        room_id: Ulid,
        status: BookingStatus,
        at: Ms,
    },
    NotificationCreated(Notification),
    NotificationRead {
        id: Ulid,
        read: bool,
    },
    NotificationDeleted {
        id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureInfo {
    pub id: Ulid,
    pub target_id: Ulid,
    pub start: Ms,
    pub end: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationInfo {
    pub id: Ulid,
    pub room_id: Ulid,
    pub user_id: Ulid,
    pub check_in: Ms,
    pub check_out: Ms,
    pub guests: u32,
    pub expires_at: Ms,
}

/// Which booking records a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingFilter {
    All,
    Id(Ulid),
    Room(Ulid),
    Hotel(Ulid),
    User(Ulid),
    Status(BookingStatus),
}

impl BookingFilter {
    pub fn matches(&self, b: &Booking) -> bool {
        match *self {
            BookingFilter::All => true,
            BookingFilter::Id(id) => b.id == id,
            BookingFilter::Room(id) => b.room_id == id,
            BookingFilter::Hotel(id) => b.hotel_id == id,
            BookingFilter::User(id) => b.user_id == id,
            BookingFilter::Status(status) => b.status == status,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DashboardStats {
    pub hotels: u64,
    pub rooms: u64,
    pub users: u64,
    pub bookings: u64,
    pub active_bookings: u64,
    pub completed_bookings: u64,
    pub cancelled_bookings: u64,
    pub reservations: u64,
    pub revenue: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closure(start: Ms, end: Ms) -> Interval {
        Interval {
            id: Ulid::new(),
            span: Span::new(start, end),
            kind: IntervalKind::Closure,
        }
    }

    fn booking(start: Ms, end: Ms) -> Interval {
        Interval {
            id: Ulid::new(),
            span: Span::new(start, end),
            kind: IntervalKind::Booking,
        }
    }

    #[test]
    fn nights_round_up() {
        assert_eq!(Span::new(0, DAY_MS).nights(), 1);
        assert_eq!(Span::new(0, 3 * DAY_MS).nights(), 3);
        assert_eq!(Span::new(0, DAY_MS + 1).nights(), 2);
    }

    #[test]
    fn back_to_back_stays_do_not_overlap() {
        let first = Span::new(0, 2 * DAY_MS);
        let second = Span::new(2 * DAY_MS, 4 * DAY_MS);
        assert!(!first.overlaps(&second));
        assert!(first.overlaps(&Span::new(DAY_MS, 3 * DAY_MS)));
    }

    #[test]
    fn timeline_keeps_start_order() {
        let mut t = Timeline::default();
        t.insert(booking(300, 400));
        t.insert(closure(100, 200));
        t.insert(booking(200, 300));
        let starts: Vec<Ms> = t.intervals.iter().map(|i| i.span.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn timeline_remove_missing_is_none() {
        let mut t = Timeline::default();
        t.insert(booking(100, 200));
        assert!(t.remove(Ulid::new()).is_none());
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut t = Timeline::default();
        t.insert(booking(100, 200));
        t.insert(closure(450, 600));
        t.insert(booking(1000, 1100));
        let hits: Vec<_> = t.overlapping(&Span::new(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(450, 600));
    }

    #[test]
    fn closures_are_clamped() {
        let mut t = Timeline::default();
        t.insert(closure(0, 1000));
        t.insert(booking(100, 200));
        assert_eq!(t.closures_within(&Span::new(500, 600)), vec![Span::new(500, 600)]);
    }

    #[test]
    fn expired_reservation_does_not_occupy() {
        let r = Interval {
            id: Ulid::new(),
            span: Span::new(0, DAY_MS),
            kind: IntervalKind::Reservation {
                user_id: Ulid::new(),
                guests: 2,
                expires_at: 500,
            },
        };
        assert!(r.occupies(499));
        assert!(!r.occupies(500));
        assert!(!closure(0, 10).occupies(0));
    }

    #[test]
    fn status_transitions() {
        use BookingStatus::*;
        assert!(Confirmed.can_transition_to(CheckedIn));
        assert!(Confirmed.can_transition_to(Completed));
        assert!(CheckedIn.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!CheckedIn.can_transition_to(Confirmed));
    }

    #[test]
    fn status_parses_both_spellings() {
        assert_eq!("CANCELED".parse::<BookingStatus>(), Ok(BookingStatus::Cancelled));
        assert_eq!("checked_in".parse::<BookingStatus>(), Ok(BookingStatus::CheckedIn));
        assert!("lost".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn days_parse_to_midnight_utc() {
        assert_eq!(parse_day("1970-01-02"), Some(DAY_MS));
        assert_eq!(parse_day("2026-10-17").map(format_day).as_deref(), Some("2026-10-17"));
        assert_eq!(parse_day("17/10/2026"), None);
    }

    #[test]
    fn patch_keeps_unset_fields() {
        let mut room = Room {
            id: Ulid::new(),
            hotel_id: Ulid::new(),
            room_type: "twin".into(),
            price_per_night: 9_000,
            max_guests: 2,
            units: 4,
            available: true,
            created_at: 0,
        };
        RoomPatch {
            price_per_night: Some(12_000),
            available: Some(false),
            ..RoomPatch::default()
        }
        .apply(&mut room);
        assert_eq!(room.price_per_night, 12_000);
        assert!(!room.available);
        assert_eq!(room.room_type, "twin");
        assert_eq!(room.units, 4);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::ReservationPlaced {
            id: Ulid::new(),
            room_id: Ulid::new(),
            user_id: Ulid::new(),
            span: Span::new(0, DAY_MS),
            guests: 2,
            expires_at: 1000,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}

use std::collections::HashMap;

use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_bookable, now_ms};
use super::validate::*;
use super::{Claim, Engine, EngineError, WalCommand};

impl Engine {
    // ── Hotels ───────────────────────────────────────────────

    pub async fn create_hotel(
        &self,
        id: Ulid,
        name: String,
        location: String,
        description: Option<String>,
        stars: Option<u8>,
    ) -> Result<Hotel, EngineError> {
        let _gate = self.commit_gate.read().await;
        if self.hotels.len() + self.rooms.len() >= MAX_RESOURCES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many hotels and rooms"));
        }
        let _claim = self.claim_id(id)?;
        if self.hotels.contains_key(&id) || self.rooms.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let hotel = Hotel {
            id,
            name,
            location,
            description,
            stars,
            created_at: now_ms(),
        };
        validate_hotel(&hotel)?;

        self.wal_append(&Event::HotelCreated(hotel.clone())).await?;
        self.insert_hotel(hotel.clone());
        info!("hotel {id} created: {}", hotel.name);
        Ok(hotel)
    }

    pub async fn update_hotel(&self, id: Ulid, patch: HotelPatch) -> Result<Hotel, EngineError> {
        let _gate = self.commit_gate.read().await;
        let mut guard = self.lock_hotel(id).await?;
        let mut hotel = guard.hotel.clone();
        patch.apply(&mut hotel);
        validate_hotel(&hotel)?;

        self.persist_hotel(&mut guard, &Event::HotelUpdated(hotel.clone())).await?;
        Ok(hotel)
    }

    pub async fn delete_hotel(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        let guard = self.lock_hotel(id).await?;
        if let Some(kids) = self.rooms_by_hotel.get(&id)
            && !kids.is_empty()
        {
            return Err(EngineError::HasChildren(id));
        }

        self.wal_append(&Event::HotelDeleted { id }).await?;
        self.remove_hotel(&guard);
        info!("hotel {id} deleted");
        Ok(())
    }

    // ── Rooms ────────────────────────────────────────────────

    pub async fn create_room(
        &self,
        id: Ulid,
        hotel_id: Ulid,
        room_type: String,
        price_per_night: i64,
        max_guests: u32,
        units: u32,
    ) -> Result<Room, EngineError> {
        let _gate = self.commit_gate.read().await;
        if self.hotels.len() + self.rooms.len() >= MAX_RESOURCES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many hotels and rooms"));
        }
        let _claim = self.claim_id(id)?;
        if self.rooms.contains_key(&id) || self.hotels.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let room = Room {
            id,
            hotel_id,
            room_type,
            price_per_night,
            max_guests,
            units,
            available: true,
            created_at: now_ms(),
        };
        validate_room(&room)?;

        // Shared hotel lock keeps the hotel from being deleted underneath us.
        let hotel = self
            .get_hotel_state(&hotel_id)
            .ok_or(EngineError::NotFound(hotel_id))?;
        let _hotel_guard = hotel.read().await;
        if !self.hotels.contains_key(&hotel_id) {
            return Err(EngineError::NotFound(hotel_id));
        }

        self.wal_append(&Event::RoomCreated(room.clone())).await?;
        self.insert_room(room.clone());
        debug!("room {id} created in hotel {hotel_id}");
        Ok(room)
    }

    pub async fn update_room(&self, id: Ulid, patch: RoomPatch) -> Result<Room, EngineError> {
        let _gate = self.commit_gate.read().await;
        let mut guard = self.lock_room(id).await?;
        let mut room = guard.room.clone();
        patch.apply(&mut room);
        validate_room(&room)?;

        self.persist_room(&mut guard, &Event::RoomUpdated(room.clone())).await?;
        Ok(room)
    }

    pub async fn delete_room(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        let guard = self.lock_room(id).await?;
        if guard.has_allocations(now_ms()) {
            return Err(EngineError::HasAllocations(id));
        }

        let event = Event::RoomDeleted {
            id,
            hotel_id: guard.room.hotel_id,
        };
        self.wal_append(&event).await?;
        self.remove_room(&guard);
        debug!("room {id} deleted");
        Ok(())
    }

    // ── Users ────────────────────────────────────────────────

    pub async fn create_user(
        &self,
        id: Ulid,
        email: String,
        full_name: String,
        phone: Option<String>,
        role: Role,
    ) -> Result<User, EngineError> {
        let _gate = self.commit_gate.read().await;
        if self.users.len() >= MAX_USERS_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many users"));
        }
        let _claim = self.claim_id(id)?;
        if self.users.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        let user = User {
            id,
            email: email.trim().to_string(),
            full_name,
            phone,
            role,
            created_at: now_ms(),
        };
        validate_user(&user)?;
        let _email = self.claim_email(&user.email, id)?;

        self.persist_records(&Event::UserCreated(user.clone())).await?;
        Ok(user)
    }

    pub async fn update_user(&self, id: Ulid, patch: UserPatch) -> Result<User, EngineError> {
        let _gate = self.commit_gate.read().await;
        let mut user = self
            .users
            .get(&id)
            .map(|u| u.value().clone())
            .ok_or(EngineError::NotFound(id))?;
        let current_email = user.email.to_lowercase();
        patch.apply(&mut user);
        user.email = user.email.trim().to_string();
        validate_user(&user)?;
        let _email = if user.email.to_lowercase() != current_email {
            Some(self.claim_email(&user.email, id)?)
        } else {
            None
        };

        self.persist_records(&Event::UserUpdated(user.clone())).await?;
        Ok(user)
    }

    pub async fn delete_user(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        if !self.users.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        let has_booking = self
            .bookings
            .iter()
            .any(|b| b.user_id == id && b.status.is_active());
        if has_booking || self.has_live_reservation(id).await {
            return Err(EngineError::HasAllocations(id));
        }

        self.persist_records(&Event::UserDeleted { id }).await?;
        info!("user {id} deleted");
        Ok(())
    }

    async fn has_live_reservation(&self, user_id: Ulid) -> bool {
        let now = now_ms();
        let rooms: Vec<_> = self.rooms.iter().map(|e| e.value().clone()).collect();
        for rs in rooms {
            let guard = rs.read().await;
            let found = guard.timeline.intervals.iter().any(|i| {
                matches!(i.kind, IntervalKind::Reservation { user_id: u, .. } if u == user_id)
                    && i.occupies(now)
            });
            if found {
                return true;
            }
        }
        false
    }

    fn require_user(&self, id: Ulid) -> Result<(), EngineError> {
        if self.users.contains_key(&id) {
            Ok(())
        } else {
            Err(EngineError::NotFound(id))
        }
    }

    /// Hold `id` until the create finishes, so a concurrent create of the same id fails.
    fn claim_id(&self, id: Ulid) -> Result<Claim<'_, Ulid>, EngineError> {
        Claim::take(&self.id_claims, id).ok_or(EngineError::AlreadyExists(id))
    }

    /// Hold `email` for `owner`. Fails if another user has it or is taking it.
    fn claim_email(&self, email: &str, owner: Ulid) -> Result<Claim<'_, String>, EngineError> {
        let key = email.to_lowercase();
        let claim = Claim::take(&self.email_claims, key.clone())
            .ok_or_else(|| EngineError::EmailTaken(email.to_string()))?;
        match self.emails.get(&key).map(|e| *e.value()) {
            Some(existing) if existing != owner => Err(EngineError::EmailTaken(email.to_string())),
            _ => Ok(claim),
        }
    }

    fn claim_new_entity(&self, id: Ulid) -> Result<Claim<'_, Ulid>, EngineError> {
        let claim = self.claim_id(id)?;
        if self.entity_to_resource.contains_key(&id) || self.bookings.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        Ok(claim)
    }

    // ── Closures ─────────────────────────────────────────────

    /// Close a hotel or a single room for `span`. Existing bookings stay.
    pub async fn add_closure(&self, id: Ulid, target_id: Ulid, span: Span) -> Result<(), EngineError> {
        validate_span(&span)?;
        let _gate = self.commit_gate.read().await;
        let _claim = self.claim_new_entity(id)?;
        let event = Event::ClosureAdded { id, target_id, span };

        if self.rooms.contains_key(&target_id) {
            let mut guard = self.lock_room(target_id).await?;
            if guard.timeline.len() >= MAX_INTERVALS_PER_RESOURCE {
                return Err(EngineError::LimitExceeded("too many intervals on room"));
            }
            self.persist_room(&mut guard, &event).await
        } else {
            let mut guard = self.lock_hotel(target_id).await?;
            if guard.timeline.len() >= MAX_INTERVALS_PER_RESOURCE {
                return Err(EngineError::LimitExceeded("too many intervals on hotel"));
            }
            self.persist_hotel(&mut guard, &event).await
        }
    }

    pub async fn remove_closure(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let _gate = self.commit_gate.read().await;
        let target_id = self
            .get_resource_for_entity(&id)
            .ok_or(EngineError::NotFound(id))?;
        let event = Event::ClosureRemoved { id, target_id };

        if self.rooms.contains_key(&target_id) {
            let mut guard = self.lock_room(target_id).await?;
            match guard.timeline.get(id) {
                Some(Interval { kind: IntervalKind::Closure, .. }) => {}
                _ => return Err(EngineError::NotFound(id)),
            }
            self.persist_room(&mut guard, &event).await?;
        } else {
            let mut guard = self.lock_hotel(target_id).await?;
            if guard.timeline.get(id).is_none() {
                return Err(EngineError::NotFound(id));
            }
            self.persist_hotel(&mut guard, &event).await?;
        }
        Ok(target_id)
    }

    // ── Reservations ─────────────────────────────────────────

    pub async fn place_reservation(&self, stay: StayRequest, expires_at: Ms) -> Result<(), EngineError> {
        validate_stay(&stay.span)?;
        let now = now_ms();
        if expires_at <= now {
            return Err(EngineError::Invalid("reservation would already be expired"));
        }
        let _gate = self.commit_gate.read().await;
        let _claim = self.claim_new_entity(stay.id)?;
        self.require_user(stay.user_id)?;

        let mut guard = self.lock_room(stay.room_id).await?;
        if guard.timeline.len() >= MAX_INTERVALS_PER_RESOURCE {
            return Err(EngineError::LimitExceeded("too many intervals on room"));
        }
        let inherited = self.hotel_closures(&guard.room.hotel_id, &stay.span).await;
        check_bookable(&guard, &inherited, &stay.span, stay.guests, &[], now)?;

        let event = Event::ReservationPlaced {
            id: stay.id,
            room_id: stay.room_id,
            user_id: stay.user_id,
            span: stay.span,
            guests: stay.guests,
            expires_at,
        };
        self.persist_room(&mut guard, &event).await
    }

    pub async fn release_reservation(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let _gate = self.commit_gate.read().await;
        let room_id = self
            .get_resource_for_entity(&id)
            .ok_or(EngineError::NotFound(id))?;
        let mut guard = self.lock_room(room_id).await?;
        match guard.timeline.get(id) {
            Some(Interval { kind: IntervalKind::Reservation { .. }, .. }) => {}
            _ => return Err(EngineError::NotFound(id)),
        }
        self.persist_room(&mut guard, &Event::ReservationReleased { id, room_id })
            .await?;
        Ok(room_id)
    }

    /// Turn an unexpired reservation into a booking in one logged event.
    pub async fn confirm_reservation(&self, reservation_id: Ulid, booking_id: Ulid) -> Result<Booking, EngineError> {
        let booking = {
            let _gate = self.commit_gate.read().await;
            let _claim = self.claim_new_entity(booking_id)?;
            let room_id = self
                .get_resource_for_entity(&reservation_id)
                .ok_or(EngineError::NotFound(reservation_id))?;
            let mut guard = self.lock_room(room_id).await?;
            let interval = guard
                .timeline
                .get(reservation_id)
                .cloned()
                .ok_or(EngineError::NotFound(reservation_id))?;
            let IntervalKind::Reservation {
                user_id,
                guests,
                expires_at,
            } = interval.kind
            else {
                return Err(EngineError::NotFound(reservation_id));
            };
            let now = now_ms();
            if expires_at <= now {
                return Err(EngineError::Expired(reservation_id));
            }

            let booking = Booking {
                id: booking_id,
                room_id,
                hotel_id: guard.room.hotel_id,
                user_id,
                span: interval.span,
                guests,
                total_price: stay_price(&guard.room, &interval.span)?,
                status: BookingStatus::Confirmed,
                created_at: now,
                updated_at: now,
            };
            let event = Event::BookingConfirmed {
                booking: booking.clone(),
                reservation_id: Some(reservation_id),
            };
            self.persist_room(&mut guard, &event).await?;
            booking
        };

        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        self.notify_booking_confirmed(&booking).await;
        Ok(booking)
    }

    pub fn collect_expired_reservations(&self, now: Ms) -> Vec<(Ulid, Ulid)> {
        let mut expired = Vec::new();
        for entry in self.rooms.iter() {
            if let Ok(guard) = entry.value().try_read() {
                for interval in &guard.timeline.intervals {
                    if let IntervalKind::Reservation { expires_at, .. } = interval.kind
                        && expires_at <= now
                    {
                        expired.push((interval.id, guard.room.id));
                    }
                }
            }
        }
        expired
    }

    // ── Bookings ─────────────────────────────────────────────

    pub async fn create_booking(&self, stay: StayRequest) -> Result<Booking, EngineError> {
        validate_stay(&stay.span)?;
        let booking = {
            let _gate = self.commit_gate.read().await;
            let _claim = self.claim_new_entity(stay.id)?;
            self.require_user(stay.user_id)?;

            let mut guard = self.lock_room(stay.room_id).await?;
            if guard.timeline.len() >= MAX_INTERVALS_PER_RESOURCE {
                return Err(EngineError::LimitExceeded("too many intervals on room"));
            }
            let now = now_ms();
            let inherited = self.hotel_closures(&guard.room.hotel_id, &stay.span).await;
            check_bookable(&guard, &inherited, &stay.span, stay.guests, &[], now)?;

            let booking = new_booking(&guard.room, &stay, now)?;
            let event = Event::BookingConfirmed {
                booking: booking.clone(),
                reservation_id: None,
            };
            self.persist_room(&mut guard, &event).await?;
            booking
        };

        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        self.notify_booking_confirmed(&booking).await;
        Ok(booking)
    }

    /// Atomically book several stays. All-or-nothing: if any stay fails its
    /// checks, none are committed. Stays may span different rooms.
    pub async fn batch_create_bookings(&self, stays: Vec<StayRequest>) -> Result<Vec<Booking>, EngineError> {
        if stays.is_empty() {
            return Ok(Vec::new());
        }
        if stays.len() > MAX_BATCH_SIZE {
            return Err(EngineError::LimitExceeded("batch too large"));
        }
        for stay in &stays {
            validate_stay(&stay.span)?;
        }

        let bookings = {
            let _gate = self.commit_gate.read().await;
            let mut claims = Vec::with_capacity(stays.len());
            for stay in &stays {
                claims.push(self.claim_new_entity(stay.id)?);
                self.require_user(stay.user_id)?;
            }

            // Acquire write locks in sorted order to prevent deadlocks.
            let mut room_ids: Vec<Ulid> = stays.iter().map(|s| s.room_id).collect();
            room_ids.sort();
            room_ids.dedup();

            let mut guards = Vec::with_capacity(room_ids.len());
            let mut slot = HashMap::new();
            for rid in &room_ids {
                let guard = self.lock_room(*rid).await?;
                if guard.timeline.len() + stays.len() > MAX_INTERVALS_PER_RESOURCE {
                    return Err(EngineError::LimitExceeded("too many intervals on room"));
                }
                slot.insert(*rid, guards.len());
                guards.push(guard);
            }

            // Phase 1: validate every stay against current state and the batch so far.
            let now = now_ms();
            let mut pending: HashMap<Ulid, Vec<(Ulid, Span)>> = HashMap::new();
            let mut bookings = Vec::with_capacity(stays.len());
            for stay in &stays {
                let guard = &guards[slot[&stay.room_id]];
                let inherited = self.hotel_closures(&guard.room.hotel_id, &stay.span).await;
                let accepted = pending.entry(stay.room_id).or_default();
                check_bookable(guard, &inherited, &stay.span, stay.guests, accepted, now)?;
                accepted.push((stay.id, stay.span));
                bookings.push(new_booking(&guard.room, stay, now)?);
            }

            // Phase 2: all validated, commit.
            for booking in &bookings {
                let event = Event::BookingConfirmed {
                    booking: booking.clone(),
                    reservation_id: None,
                };
                let guard = &mut guards[slot[&booking.room_id]];
                self.persist_room(guard, &event).await?;
            }
            bookings
        };

        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(bookings.len() as u64);
        for booking in &bookings {
            self.notify_booking_confirmed(booking).await;
        }
        Ok(bookings)
    }

    /// Move a booking along its lifecycle. Re-setting the current status is a no-op.
    pub async fn set_booking_status(&self, id: Ulid, status: BookingStatus) -> Result<Booking, EngineError> {
        let updated = {
            let _gate = self.commit_gate.read().await;
            let room_id = self
                .bookings
                .get(&id)
                .map(|b| b.room_id)
                .ok_or(EngineError::NotFound(id))?;
            let mut guard = self.lock_room(room_id).await;
            // Booking history outlives its room; terminal records need no lock.
            let current = self
                .bookings
                .get(&id)
                .map(|b| b.value().clone())
                .ok_or(EngineError::NotFound(id))?;
            if current.status == status {
                return Ok(current);
            }
            if !current.status.can_transition_to(status) {
                return Err(EngineError::InvalidTransition {
                    id,
                    from: current.status,
                    to: status,
                });
            }

            let event = Event::BookingStatusChanged {
                id,
                room_id,
                status,
                at: now_ms(),
            };
            match guard.as_mut() {
                Ok(guard) => self.persist_room(guard, &event).await?,
                Err(_) => self.persist_records(&event).await?,
            }
            self.bookings
                .get(&id)
                .map(|b| b.value().clone())
                .ok_or(EngineError::NotFound(id))?
        };

        if status == BookingStatus::Cancelled {
            metrics::counter!(crate::observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
        }
        info!("booking {id} is now {status}");
        let (title, message) = match status {
            BookingStatus::CheckedIn => (
                "Checked in",
                format!("Welcome! You are checked in until {}.", format_day(updated.span.end)),
            ),
            BookingStatus::Completed => (
                "Stay completed",
                "Thanks for staying with us. We hope to see you again.".to_string(),
            ),
            BookingStatus::Cancelled => (
                "Booking cancelled",
                format!(
                    "Your booking from {} to {} has been cancelled.",
                    format_day(updated.span.start),
                    format_day(updated.span.end)
                ),
            ),
            BookingStatus::Confirmed => ("Booking confirmed", format!("Booking {id} is confirmed.")),
        };
        self.send_system_notification(updated.user_id, title, message).await;
        Ok(updated)
    }

    pub async fn cancel_booking(&self, id: Ulid) -> Result<Booking, EngineError> {
        self.set_booking_status(id, BookingStatus::Cancelled).await
    }

    // ── Notifications ────────────────────────────────────────

    pub async fn create_notification(
        &self,
        id: Ulid,
        user_id: Ulid,
        title: String,
        message: String,
    ) -> Result<Notification, EngineError> {
        let _gate = self.commit_gate.read().await;
        self.insert_notification(id, user_id, title, message).await
    }

    async fn insert_notification(
        &self,
        id: Ulid,
        user_id: Ulid,
        title: String,
        message: String,
    ) -> Result<Notification, EngineError> {
        require_text(&title, "notification title must not be empty")?;
        if message.len() > MAX_TEXT_LEN {
            return Err(EngineError::LimitExceeded("text field too long"));
        }
        let _claim = self.claim_id(id)?;
        if self.notifications.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }
        self.require_user(user_id)?;
        let notification = Notification {
            id,
            user_id,
            title,
            message,
            read: false,
            created_at: now_ms(),
        };
        self.persist_records(&Event::NotificationCreated(notification.clone()))
            .await?;
        Ok(notification)
    }

    pub async fn mark_notification_read(&self, id: Ulid, read: bool) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        if !self.notifications.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        self.persist_records(&Event::NotificationRead { id, read }).await
    }

    pub async fn delete_notification(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        if !self.notifications.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        self.persist_records(&Event::NotificationDeleted { id }).await
    }

    /// The triggering change is already committed, so failures are only logged.
    async fn send_system_notification(&self, user_id: Ulid, title: &str, message: String) {
        let _gate = self.commit_gate.read().await;
        if let Err(e) = self
            .insert_notification(Ulid::new(), user_id, title.to_string(), message)
            .await
        {
            warn!("could not notify user {user_id}: {e}");
        }
    }

    async fn notify_booking_confirmed(&self, booking: &Booking) {
        let nights = booking.span.nights();
        let message = format!(
            "{nights} night{} from {} to {}, total {}.{:02}.",
            if nights == 1 { "" } else { "s" },
            format_day(booking.span.start),
            format_day(booking.span.end),
            booking.total_price / 100,
            booking.total_price % 100,
        );
        self.send_system_notification(booking.user_id, "Booking confirmed", message)
            .await;
    }

    // ── WAL maintenance ──────────────────────────────────────

    /// Compact the WAL by rewriting it with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.commit_gate.write().await;
        let mut events = Vec::new();

        for user in self.users.iter() {
            events.push(Event::UserCreated(user.value().clone()));
        }

        let hotels: Vec<_> = self.hotels.iter().map(|e| e.value().clone()).collect();
        for hs in hotels {
            let guard = hs.read().await;
            events.push(Event::HotelCreated(guard.hotel.clone()));
            for interval in &guard.timeline.intervals {
                events.push(Event::ClosureAdded {
                    id: interval.id,
                    target_id: guard.hotel.id,
                    span: interval.span,
                });
            }
        }

        let rooms: Vec<_> = self.rooms.iter().map(|e| e.value().clone()).collect();
        for rs in rooms {
            let guard = rs.read().await;
            events.push(Event::RoomCreated(guard.room.clone()));
            for interval in &guard.timeline.intervals {
                match &interval.kind {
                    IntervalKind::Closure => events.push(Event::ClosureAdded {
                        id: interval.id,
                        target_id: guard.room.id,
                        span: interval.span,
                    }),
                    IntervalKind::Reservation {
                        user_id,
                        guests,
                        expires_at,
                    } => events.push(Event::ReservationPlaced {
                        id: interval.id,
                        room_id: guard.room.id,
                        user_id: *user_id,
                        span: interval.span,
                        guests: *guests,
                        expires_at: *expires_at,
                    }),
                    // Re-created from the booking records below.
                    IntervalKind::Booking => {}
                }
            }
        }

        for booking in self.bookings.iter() {
            events.push(Event::BookingConfirmed {
                booking: booking.value().clone(),
                reservation_id: None,
            });
        }
        for n in self.notifications.iter() {
            events.push(Event::NotificationCreated(n.value().clone()));
        }

        let count = events.len();
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        debug!("WAL compacted to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = tokio::sync::oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Nights times the nightly rate, as fixed at booking time.
fn stay_price(room: &Room, span: &Span) -> Result<i64, EngineError> {
    span.nights()
        .checked_mul(room.price_per_night)
        .ok_or(EngineError::LimitExceeded("total price out of range"))
}

fn new_booking(room: &Room, stay: &StayRequest, now: Ms) -> Result<Booking, EngineError> {
    Ok(Booking {
        id: stay.id,
        room_id: stay.room_id,
        hotel_id: room.hotel_id,
        user_id: stay.user_id,
        span: stay.span,
        guests: stay.guests,
        total_price: stay_price(room, &stay.span)?,
        status: BookingStatus::Confirmed,
        created_at: now,
        updated_at: now,
    })
}

mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod validate;

pub use availability::{compute_saturated_spans, merge_overlapping, room_availability, subtract_intervals};
pub use error::EngineError;
pub(crate) use conflict::now_ms;

use std::hash::Hash;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

pub type SharedHotel = Arc<RwLock<HotelState>>;
pub type SharedRoom = Arc<RwLock<RoomState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut deferred = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            deferred = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = deferred {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush failed for {} events: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush so partially buffered bytes don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// In-memory state for one tenant.
///
/// Hotels and rooms each sit behind their own lock. Lock order is
/// commit gate, then rooms in id order, then hotels.
pub struct Engine {
    pub(super) hotels: DashMap<Ulid, SharedHotel>,
    pub(super) rooms: DashMap<Ulid, SharedRoom>,
    /// Hotel → rooms.
    pub(super) rooms_by_hotel: DashMap<Ulid, Vec<Ulid>>,
    pub(super) users: DashMap<Ulid, User>,
    /// Lowercased email → user id.
    pub(super) emails: DashMap<String, Ulid>,
    /// Every booking ever made, including cancelled and completed ones.
    pub(super) bookings: DashMap<Ulid, Booking>,
    pub(super) notifications: DashMap<Ulid, Notification>,
    /// Closure / reservation id → hotel or room id.
    pub(super) entity_to_resource: DashMap<Ulid, Ulid>,
    /// Ids of creates that are between their existence check and their WAL append.
    pub(super) id_claims: DashMap<Ulid, ()>,
    /// Lowercased emails being taken by a create or update in flight.
    pub(super) email_claims: DashMap<String, ()>,
    /// Mutations hold it shared for their whole run; compaction takes it exclusively
    /// so the snapshot it writes cannot miss a concurrent append.
    pub(super) commit_gate: RwLock<()>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::recover(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            hotels: DashMap::new(),
            rooms: DashMap::new(),
            rooms_by_hotel: DashMap::new(),
            users: DashMap::new(),
            emails: DashMap::new(),
            bookings: DashMap::new(),
            notifications: DashMap::new(),
            entity_to_resource: DashMap::new(),
            id_claims: DashMap::new(),
            email_claims: DashMap::new(),
            commit_gate: RwLock::new(()),
            wal_tx,
        };

        for event in &events {
            engine.replay_event(event);
        }
        tracing::debug!("replayed {} events from {}", events.len(), wal_path.display());

        Ok(engine)
    }

    /// Replay runs before the engine is shared, so try_write always succeeds.
    /// Never use blocking_write here: this may run inside an async context.
    fn replay_event(&self, event: &Event) {
        match event {
            Event::HotelCreated(hotel) => self.insert_hotel(hotel.clone()),
            Event::HotelDeleted { id } => {
                if let Some(hs) = self.get_hotel_state(id) {
                    let guard = hs.try_read().expect("replay: uncontended read");
                    self.remove_hotel(&guard);
                }
            }
            Event::RoomCreated(room) => self.insert_room(room.clone()),
            Event::RoomDeleted { id, .. } => {
                if let Some(rs) = self.get_room_state(id) {
                    let guard = rs.try_read().expect("replay: uncontended read");
                    self.remove_room(&guard);
                }
            }
            Event::HotelUpdated(Hotel { id, .. }) => {
                if let Some(hs) = self.get_hotel_state(id) {
                    let mut guard = hs.try_write().expect("replay: uncontended write");
                    self.apply_to_hotel(&mut guard, event);
                }
            }
            Event::ClosureAdded { target_id, .. } | Event::ClosureRemoved { target_id, .. } => {
                if let Some(rs) = self.get_room_state(target_id) {
                    let mut guard = rs.try_write().expect("replay: uncontended write");
                    self.apply_to_room(&mut guard, event);
                } else if let Some(hs) = self.get_hotel_state(target_id) {
                    let mut guard = hs.try_write().expect("replay: uncontended write");
                    self.apply_to_hotel(&mut guard, event);
                }
            }
            other => match event_room_id(other) {
                Some(room_id) => match self.get_room_state(&room_id) {
                    Some(rs) => {
                        let mut guard = rs.try_write().expect("replay: uncontended write");
                        self.apply_to_room(&mut guard, other);
                    }
                    // Room is gone; only the booking history survives.
                    None => self.apply_records(other),
                },
                None => self.apply_records(other),
            },
        }
    }

    pub(super) fn insert_hotel(&self, hotel: Hotel) {
        let id = hotel.id;
        let hs = HotelState {
            hotel,
            timeline: Timeline::default(),
        };
        self.hotels.insert(id, Arc::new(RwLock::new(hs)));
        self.rooms_by_hotel.entry(id).or_default();
    }

    pub(super) fn remove_hotel(&self, hs: &HotelState) {
        for interval in &hs.timeline.intervals {
            self.entity_to_resource.remove(&interval.id);
        }
        self.hotels.remove(&hs.hotel.id);
        self.rooms_by_hotel.remove(&hs.hotel.id);
    }

    pub(super) fn insert_room(&self, room: Room) {
        let (id, hotel_id) = (room.id, room.hotel_id);
        self.rooms.insert(id, Arc::new(RwLock::new(RoomState::new(room))));
        self.rooms_by_hotel.entry(hotel_id).or_default().push(id);
    }

    pub(super) fn remove_room(&self, rs: &RoomState) {
        for interval in &rs.timeline.intervals {
            self.entity_to_resource.remove(&interval.id);
        }
        if let Some(mut kids) = self.rooms_by_hotel.get_mut(&rs.room.hotel_id) {
            kids.retain(|c| *c != rs.room.id);
        }
        self.rooms.remove(&rs.room.id);
    }

    /// Record-level effects of an event: plain tables and indexes.
    pub(super) fn apply_records(&self, event: &Event) {
        match event {
            Event::UserCreated(user) | Event::UserUpdated(user) => {
                if let Some(old) = self.users.get(&user.id).map(|u| u.email.to_lowercase()) {
                    self.emails.remove(&old);
                }
                self.emails.insert(user.email.to_lowercase(), user.id);
                self.users.insert(user.id, user.clone());
            }
            Event::UserDeleted { id } => {
                if let Some((_, user)) = self.users.remove(id) {
                    self.emails.remove(&user.email.to_lowercase());
                }
                self.notifications.retain(|_, n| n.user_id != *id);
            }
            Event::NotificationCreated(n) => {
                self.notifications.insert(n.id, n.clone());
            }
            Event::NotificationRead { id, read } => {
                if let Some(mut n) = self.notifications.get_mut(id) {
                    n.read = *read;
                }
            }
            Event::NotificationDeleted { id } => {
                self.notifications.remove(id);
            }
            Event::ClosureAdded { id, target_id, .. } => {
                self.entity_to_resource.insert(*id, *target_id);
            }
            Event::ReservationPlaced { id, room_id, .. } => {
                self.entity_to_resource.insert(*id, *room_id);
            }
            Event::ClosureRemoved { id, .. } | Event::ReservationReleased { id, .. } => {
                self.entity_to_resource.remove(id);
            }
            Event::BookingConfirmed {
                booking,
                reservation_id,
            } => {
                if let Some(rid) = reservation_id {
                    self.entity_to_resource.remove(rid);
                }
                self.bookings.insert(booking.id, booking.clone());
            }
            Event::BookingStatusChanged { id, status, at, .. } => {
                if let Some(mut b) = self.bookings.get_mut(id) {
                    b.status = *status;
                    b.updated_at = *at;
                }
            }
            Event::HotelCreated(_)
            | Event::HotelUpdated(_)
            | Event::HotelDeleted { .. }
            | Event::RoomCreated(_)
            | Event::RoomUpdated(_)
            | Event::RoomDeleted { .. } => {}
        }
    }

    /// Apply an event to a room (caller holds the write lock).
    pub(super) fn apply_to_room(&self, rs: &mut RoomState, event: &Event) {
        self.apply_records(event);
        match event {
            Event::RoomUpdated(room) => rs.room = room.clone(),
            Event::ClosureAdded { id, span, .. } => rs.timeline.insert(Interval {
                id: *id,
                span: *span,
                kind: IntervalKind::Closure,
            }),
            Event::ReservationPlaced {
                id,
                user_id,
                span,
                guests,
                expires_at,
                ..
            } => rs.timeline.insert(Interval {
                id: *id,
                span: *span,
                kind: IntervalKind::Reservation {
                    user_id: *user_id,
                    guests: *guests,
                    expires_at: *expires_at,
                },
            }),
            Event::ClosureRemoved { id, .. } | Event::ReservationReleased { id, .. } => {
                rs.timeline.remove(*id);
            }
            Event::BookingConfirmed {
                booking,
                reservation_id,
            } => {
                if let Some(rid) = reservation_id {
                    rs.timeline.remove(*rid);
                }
                if booking.status.is_active() {
                    rs.timeline.insert(Interval {
                        id: booking.id,
                        span: booking.span,
                        kind: IntervalKind::Booking,
                    });
                }
            }
            Event::BookingStatusChanged { id, status, .. } => {
                if !status.is_active() {
                    rs.timeline.remove(*id);
                }
            }
            _ => {}
        }
    }

    /// Apply an event to a hotel (caller holds the write lock).
    pub(super) fn apply_to_hotel(&self, hs: &mut HotelState, event: &Event) {
        self.apply_records(event);
        match event {
            Event::HotelUpdated(hotel) => hs.hotel = hotel.clone(),
            Event::ClosureAdded { id, span, .. } => hs.timeline.insert(Interval {
                id: *id,
                span: *span,
                kind: IntervalKind::Closure,
            }),
            Event::ClosureRemoved { id, .. } => {
                hs.timeline.remove(*id);
            }
            _ => {}
        }
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub(super) async fn persist_room(&self, rs: &mut RoomState, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.apply_to_room(rs, event);
        Ok(())
    }

    pub(super) async fn persist_hotel(&self, hs: &mut HotelState, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.apply_to_hotel(hs, event);
        Ok(())
    }

    pub(super) async fn persist_records(&self, event: &Event) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.apply_records(event);
        Ok(())
    }

    pub fn get_hotel_state(&self, id: &Ulid) -> Option<SharedHotel> {
        self.hotels.get(id).map(|e| e.value().clone())
    }

    pub fn get_room_state(&self, id: &Ulid) -> Option<SharedRoom> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn get_resource_for_entity(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.entity_to_resource.get(entity_id).map(|e| *e.value())
    }

    /// Acquire a room's write lock, failing if the room was deleted while we waited.
    pub(super) async fn lock_room(&self, id: Ulid) -> Result<OwnedRwLockWriteGuard<RoomState>, EngineError> {
        let rs = self.get_room_state(&id).ok_or(EngineError::NotFound(id))?;
        let guard = rs.write_owned().await;
        if !self.rooms.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        Ok(guard)
    }

    pub(super) async fn lock_hotel(&self, id: Ulid) -> Result<OwnedRwLockWriteGuard<HotelState>, EngineError> {
        let hs = self.get_hotel_state(&id).ok_or(EngineError::NotFound(id))?;
        let guard = hs.write_owned().await;
        if !self.hotels.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        Ok(guard)
    }

    /// Hotel closures overlapping `span`. Takes the hotel's read lock.
    pub(super) async fn hotel_closures(&self, hotel_id: &Ulid, span: &Span) -> Vec<Interval> {
        match self.get_hotel_state(hotel_id) {
            Some(hs) => hs
                .read()
                .await
                .timeline
                .overlapping(span)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Exclusive hold on a key of a claim map, released on drop.
pub(super) struct Claim<'a, K: Eq + Hash> {
    map: &'a DashMap<K, ()>,
    key: K,
}

impl<'a, K: Eq + Hash + Clone> Claim<'a, K> {
    /// `None` when another task already holds `key`.
    pub(super) fn take(map: &'a DashMap<K, ()>, key: K) -> Option<Self> {
        match map.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(Self { map, key })
            }
        }
    }
}

impl<K: Eq + Hash> Drop for Claim<'_, K> {
    fn drop(&mut self) {
        self.map.remove(&self.key);
    }
}

/// Room touched by a timeline event (closures are resolved separately).
fn event_room_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::RoomUpdated(room) => Some(room.id),
        Event::ReservationPlaced { room_id, .. }
        | Event::ReservationReleased { room_id, .. }
        | Event::BookingStatusChanged { room_id, .. } => Some(*room_id),
        Event::BookingConfirmed { booking, .. } => Some(booking.room_id),
        _ => None,
    }
}

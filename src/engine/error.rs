use ulid::Ulid;

use crate::model::BookingStatus;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Overlaps the given reservation or booking on a single-unit room.
    Conflict(Ulid),
    CapacityExceeded(u32),
    /// Room is marked unavailable, or the stay hits the given closure.
    Closed(Ulid),
    TooManyGuests { max: u32 },
    HasChildren(Ulid),
    HasAllocations(Ulid),
    Expired(Ulid),
    InvalidTransition {
        id: Ulid,
        from: BookingStatus,
        to: BookingStatus,
    },
    EmailTaken(String),
    Invalid(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Conflict(id) => write!(f, "conflict with allocation: {id}"),
            EngineError::CapacityExceeded(units) => {
                write!(f, "all {units} units booked for the requested stay")
            }
            EngineError::Closed(id) => write!(f, "room closed for the requested stay: {id}"),
            EngineError::TooManyGuests { max } => {
                write!(f, "too many guests: room sleeps at most {max}")
            }
            EngineError::HasChildren(id) => {
                write!(f, "cannot delete hotel {id}: has rooms")
            }
            EngineError::HasAllocations(id) => {
                write!(f, "cannot delete {id}: has active bookings or reservations")
            }
            EngineError::Expired(id) => write!(f, "reservation expired: {id}"),
            EngineError::InvalidTransition { id, from, to } => {
                write!(f, "booking {id} cannot move from {from} to {to}")
            }
            EngineError::EmailTaken(email) => write!(f, "email already registered: {email}"),
            EngineError::Invalid(msg) => write!(f, "invalid input: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

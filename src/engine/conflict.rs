use crate::model::*;

use super::availability::compute_saturated_spans;
use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

/// Everything a new reservation or booking must pass, short of the user lookup.
///
/// `inherited` holds the hotel's closures overlapping `span`; `pending` holds
/// stays already accepted earlier in the same batch for this room.
pub(crate) fn check_bookable(
    rs: &RoomState,
    inherited: &[Interval],
    span: &Span,
    guests: u32,
    pending: &[(ulid::Ulid, Span)],
    now: Ms,
) -> Result<(), EngineError> {
    if !rs.room.available {
        return Err(EngineError::Closed(rs.room.id));
    }
    if guests == 0 {
        return Err(EngineError::Invalid("guests must be at least 1"));
    }
    if guests > rs.room.max_guests {
        return Err(EngineError::TooManyGuests {
            max: rs.room.max_guests,
        });
    }
    let closure = rs
        .timeline
        .overlapping(span)
        .chain(inherited.iter().filter(|i| i.span.overlaps(span)))
        .find(|i| matches!(i.kind, IntervalKind::Closure));
    if let Some(closure) = closure {
        return Err(EngineError::Closed(closure.id));
    }
    check_no_conflict(rs, span, pending, now)
}

pub(crate) fn check_no_conflict(
    rs: &RoomState,
    span: &Span,
    pending: &[(ulid::Ulid, Span)],
    now: Ms,
) -> Result<(), EngineError> {
    if rs.room.units <= 1 {
        // Fast path: any overlapping active allocation is a conflict
        if let Some(interval) = rs
            .timeline
            .overlapping(span)
            .find(|i| i.occupies(now))
        {
            return Err(EngineError::Conflict(interval.id));
        }
        if let Some((id, _)) = pending.iter().find(|(_, s)| s.overlaps(span)) {
            return Err(EngineError::Conflict(*id));
        }
    } else {
        let mut allocs: Vec<Span> = rs
            .timeline
            .overlapping(span)
            .filter(|i| i.occupies(now))
            .map(|i| i.span)
            .collect();
        allocs.extend(pending.iter().map(|(_, s)| *s).filter(|s| s.overlaps(span)));
        allocs.sort_by_key(|s| s.start);
        let saturated = compute_saturated_spans(&allocs, rs.room.units);
        if saturated.iter().any(|sat| sat.overlaps(span)) {
            return Err(EngineError::CapacityExceeded(rs.room.units));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    const D: Ms = DAY_MS;

    fn room(units: u32) -> RoomState {
        RoomState::new(Room {
            id: Ulid::new(),
            hotel_id: Ulid::new(),
            room_type: "suite".into(),
            price_per_night: 25_000,
            max_guests: 3,
            units,
            available: true,
            created_at: 0,
        })
    }

    fn booked(rs: &mut RoomState, start: Ms, end: Ms) -> Ulid {
        let id = Ulid::new();
        rs.timeline.insert(Interval {
            id,
            span: Span::new(start, end),
            kind: IntervalKind::Booking,
        });
        id
    }

    #[test]
    fn single_unit_reports_blocking_booking() {
        let mut rs = room(1);
        let existing = booked(&mut rs, D, 3 * D);
        let err = check_bookable(&rs, &[], &Span::new(2 * D, 4 * D), 2, &[], 0).unwrap_err();
        assert!(matches!(err, EngineError::Conflict(id) if id == existing));
    }

    #[test]
    fn checkout_day_is_bookable() {
        let mut rs = room(1);
        booked(&mut rs, D, 3 * D);
        assert!(check_bookable(&rs, &[], &Span::new(3 * D, 4 * D), 2, &[], 0).is_ok());
    }

    #[test]
    fn guests_are_bounded() {
        let rs = room(1);
        let span = Span::new(0, D);
        assert!(matches!(
            check_bookable(&rs, &[], &span, 0, &[], 0),
            Err(EngineError::Invalid(_))
        ));
        assert!(matches!(
            check_bookable(&rs, &[], &span, 4, &[], 0),
            Err(EngineError::TooManyGuests { max: 3 })
        ));
    }

    #[test]
    fn hotel_closure_closes_room() {
        let rs = room(1);
        let closure = Interval {
            id: Ulid::new(),
            span: Span::new(0, 10 * D),
            kind: IntervalKind::Closure,
        };
        let err = check_bookable(&rs, &[closure.clone()], &Span::new(D, 2 * D), 1, &[], 0).unwrap_err();
        assert!(matches!(err, EngineError::Closed(id) if id == closure.id));
    }

    #[test]
    fn pending_batch_entries_conflict() {
        let rs = room(1);
        let first = Ulid::new();
        let pending = vec![(first, Span::new(0, 2 * D))];
        let err = check_no_conflict(&rs, &Span::new(D, 3 * D), &pending, 0).unwrap_err();
        assert!(matches!(err, EngineError::Conflict(id) if id == first));
    }

    #[test]
    fn multi_unit_fills_up() {
        let mut rs = room(2);
        booked(&mut rs, 0, 2 * D);
        let span = Span::new(D, 3 * D);
        assert!(check_no_conflict(&rs, &span, &[], 0).is_ok());
        booked(&mut rs, D, 2 * D);
        assert!(matches!(
            check_no_conflict(&rs, &span, &[], 0),
            Err(EngineError::CapacityExceeded(2))
        ));
    }
}

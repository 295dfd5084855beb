use crate::model::*;

// ── Availability Algorithm ────────────────────────────────────────

/// Free spans of a room inside `query`.
///
/// Rooms are open by default. Closures on the room and closures inherited
/// from its hotel are subtracted, then every range where unexpired
/// reservations and active bookings fill all `units` of the room.
pub fn room_availability(
    room: &RoomState,
    query: &Span,
    inherited_closures: &[Span],
    now: Ms,
) -> Vec<Span> {
    if !room.room.available {
        return Vec::new();
    }

    let mut closed = room.timeline.closures_within(query);
    closed.extend_from_slice(inherited_closures);
    closed.sort_by_key(|s| s.start);
    let closed = merge_overlapping(&closed);

    let mut free = subtract_intervals(&[*query], &closed);

    let allocs = occupied_spans(room, query, now);
    if !allocs.is_empty() {
        let saturated = compute_saturated_spans(&allocs, room.room.units);
        if !saturated.is_empty() {
            free = subtract_intervals(&free, &saturated);
        }
    }

    free
}

/// Spans of unexpired reservations and active bookings overlapping `query`, sorted by start.
pub fn occupied_spans(room: &RoomState, query: &Span, now: Ms) -> Vec<Span> {
    let mut allocs: Vec<Span> = room
        .timeline
        .overlapping(query)
        .filter(|i| i.occupies(now))
        .map(|i| i.span)
        .collect();
    allocs.sort_by_key(|s| s.start);
    allocs
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// Remove sorted, disjoint `to_remove` from sorted, disjoint `base`.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}

/// Sweep-line: time ranges where the allocation count reaches `units`.
/// A check-out and a check-in on the same instant do not stack.
pub fn compute_saturated_spans(allocs: &[Span], units: u32) -> Vec<Span> {
    if allocs.is_empty() || units == 0 {
        return Vec::new();
    }
    if units == 1 {
        let mut sorted = allocs.to_vec();
        sorted.sort_by_key(|s| s.start);
        return merge_overlapping(&sorted);
    }

    let mut events: Vec<(Ms, i32)> = Vec::with_capacity(allocs.len() * 2);
    for a in allocs {
        events.push((a.start, 1));
        events.push((a.end, -1));
    }
    // Ends sort before starts at the same instant.
    events.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut result: Vec<Span> = Vec::new();
    let mut count: i64 = 0;
    let mut saturated_start: Option<Ms> = None;

    for (time, delta) in &events {
        count += i64::from(*delta);

        if count >= i64::from(units) && saturated_start.is_none() {
            saturated_start = Some(*time);
        } else if count < i64::from(units)
            && let Some(start) = saturated_start.take()
            && *time > start
        {
            result.push(Span::new(start, *time));
        }
    }

    merge_overlapping(&result)
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
            room_type: "double".into(),
            price_per_night: 10_000,
            max_guests: 2,
            units,
            available: true,
            created_at: 0,
        })
    }

    fn with(mut rs: RoomState, intervals: Vec<Interval>) -> RoomState {
        for i in intervals {
            rs.timeline.insert(i);
        }
        rs
    }

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

    fn reservation(start: Ms, end: Ms, expires_at: Ms) -> Interval {
        Interval {
            id: Ulid::new(),
            span: Span::new(start, end),
            kind: IntervalKind::Reservation {
                user_id: Ulid::new(),
                guests: 1,
                expires_at,
            },
        }
    }

    #[test]
    fn subtract_middle_punch() {
        let result = subtract_intervals(&[Span::new(100, 300)], &[Span::new(150, 200)]);
        assert_eq!(result, vec![Span::new(100, 150), Span::new(200, 300)]);
    }

    #[test]
    fn subtract_full_overlap() {
        assert!(subtract_intervals(&[Span::new(100, 200)], &[Span::new(50, 250)]).is_empty());
    }

    #[test]
    fn subtract_across_several_bases() {
        let base = vec![Span::new(0, 100), Span::new(200, 300)];
        let remove = vec![Span::new(50, 250)];
        assert_eq!(
            subtract_intervals(&base, &remove),
            vec![Span::new(0, 50), Span::new(250, 300)]
        );
    }

    #[test]
    fn merge_adjacent_spans() {
        let merged = merge_overlapping(&[Span::new(100, 200), Span::new(200, 300), Span::new(400, 500)]);
        assert_eq!(merged, vec![Span::new(100, 300), Span::new(400, 500)]);
    }

    #[test]
    fn empty_room_is_fully_free() {
        let rs = room(1);
        let free = room_availability(&rs, &Span::new(0, 10 * D), &[], 0);
        assert_eq!(free, vec![Span::new(0, 10 * D)]);
    }

    #[test]
    fn booking_punches_a_hole() {
        let rs = with(room(1), vec![booking(2 * D, 4 * D)]);
        let free = room_availability(&rs, &Span::new(0, 10 * D), &[], 0);
        assert_eq!(free, vec![Span::new(0, 2 * D), Span::new(4 * D, 10 * D)]);
    }

    #[test]
    fn unavailable_room_has_nothing() {
        let mut rs = room(1);
        rs.room.available = false;
        assert!(room_availability(&rs, &Span::new(0, D), &[], 0).is_empty());
    }

    #[test]
    fn own_and_inherited_closures_both_subtract() {
        let rs = with(room(3), vec![closure(D, 2 * D)]);
        let inherited = vec![Span::new(5 * D, 6 * D)];
        let free = room_availability(&rs, &Span::new(0, 7 * D), &inherited, 0);
        assert_eq!(
            free,
            vec![Span::new(0, D), Span::new(2 * D, 5 * D), Span::new(6 * D, 7 * D)]
        );
    }

    #[test]
    fn expired_reservation_not_counted() {
        let rs = with(room(1), vec![reservation(0, D, 10)]);
        let free = room_availability(&rs, &Span::new(0, D), &[], 1000);
        assert_eq!(free, vec![Span::new(0, D)]);

        let free = room_availability(&rs, &Span::new(0, D), &[], 5);
        assert!(free.is_empty());
    }

    #[test]
    fn multi_unit_room_only_closes_when_full() {
        let rs = with(room(2), vec![booking(0, 3 * D), booking(2 * D, 5 * D)]);
        let free = room_availability(&rs, &Span::new(0, 6 * D), &[], 0);
        assert_eq!(free, vec![Span::new(0, 2 * D), Span::new(3 * D, 6 * D)]);
    }

    #[test]
    fn saturated_spans_capacity_one_sorts_input() {
        let sat = compute_saturated_spans(&[Span::new(200, 300), Span::new(0, 100)], 1);
        assert_eq!(sat, vec![Span::new(0, 100), Span::new(200, 300)]);
    }

    #[test]
    fn saturated_spans_back_to_back_do_not_stack() {
        let allocs = vec![Span::new(0, D), Span::new(D, 2 * D)];
        assert!(compute_saturated_spans(&allocs, 2).is_empty());
    }

    #[test]
    fn saturated_spans_three_of_three() {
        let allocs = vec![Span::new(0, 100), Span::new(25, 75), Span::new(50, 150)];
        assert_eq!(compute_saturated_spans(&allocs, 3), vec![Span::new(50, 75)]);
    }

    #[test]
    fn saturated_spans_empty() {
        assert!(compute_saturated_spans(&[], 5).is_empty());
    }
}

use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.start >= span.end {
        return Err(EngineError::Invalid("start must be before end"));
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(())
}

/// A stay covers at least one whole night and no partial nights.
pub(crate) fn validate_stay(span: &Span) -> Result<(), EngineError> {
    validate_span(span)?;
    if span.duration_ms() % DAY_MS != 0 {
        return Err(EngineError::Invalid("stay must cover whole nights"));
    }
    if span.duration_ms() > MAX_STAY_MS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(())
}

pub(crate) fn validate_window(span: &Span) -> Result<(), EngineError> {
    validate_span(span)?;
    if span.duration_ms() > MAX_QUERY_WINDOW_MS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(())
}

pub(crate) fn require_text(value: &str, what: &'static str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(EngineError::Invalid(what));
    }
    if value.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("text field too long"));
    }
    Ok(())
}

pub(crate) fn optional_text(value: &Option<String>) -> Result<(), EngineError> {
    match value {
        Some(v) if v.len() > MAX_TEXT_LEN => Err(EngineError::LimitExceeded("text field too long")),
        _ => Ok(()),
    }
}

pub(crate) fn validate_hotel(hotel: &Hotel) -> Result<(), EngineError> {
    require_text(&hotel.name, "hotel name must not be empty")?;
    require_text(&hotel.location, "hotel location must not be empty")?;
    optional_text(&hotel.description)?;
    if let Some(stars) = hotel.stars
        && !(1..=5).contains(&stars)
    {
        return Err(EngineError::Invalid("stars must be between 1 and 5"));
    }
    Ok(())
}

pub(crate) fn validate_room(room: &Room) -> Result<(), EngineError> {
    require_text(&room.room_type, "room type must not be empty")?;
    if room.price_per_night <= 0 {
        return Err(EngineError::Invalid("price per night must be positive"));
    }
    if room.max_guests == 0 {
        return Err(EngineError::Invalid("max guests must be at least 1"));
    }
    if room.units == 0 {
        return Err(EngineError::Invalid("units must be at least 1"));
    }
    Ok(())
}

pub(crate) fn validate_user(user: &User) -> Result<(), EngineError> {
    require_text(&user.full_name, "full name must not be empty")?;
    require_text(&user.email, "email must not be empty")?;
    match user.email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
        _ => return Err(EngineError::Invalid("email must look like name@domain")),
    }
    optional_text(&user.phone)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    fn user(email: &str, name: &str) -> User {
        User {
            id: Ulid::new(),
            email: email.into(),
            full_name: name.into(),
            phone: None,
            role: Role::Guest,
            created_at: 0,
        }
    }

    #[test]
    fn stays_must_be_whole_nights() {
        assert!(validate_stay(&Span { start: 0, end: DAY_MS }).is_ok());
        assert!(matches!(
            validate_stay(&Span { start: 0, end: DAY_MS + 1 }),
            Err(EngineError::Invalid(_))
        ));
        assert!(matches!(
            validate_stay(&Span { start: DAY_MS, end: DAY_MS }),
            Err(EngineError::Invalid(_))
        ));
    }

    #[test]
    fn stay_length_is_capped() {
        let span = Span { start: 0, end: MAX_STAY_MS + DAY_MS };
        assert!(matches!(validate_stay(&span), Err(EngineError::LimitExceeded(_))));
    }

    #[test]
    fn window_is_capped() {
        let span = Span { start: 0, end: MAX_QUERY_WINDOW_MS + 1 };
        assert!(matches!(validate_window(&span), Err(EngineError::LimitExceeded(_))));
    }

    #[test]
    fn blank_names_rejected() {
        assert!(require_text("   ", "empty").is_err());
        assert!(require_text("Grand", "empty").is_ok());
    }

    #[test]
    fn email_shape() {
        assert!(validate_user(&user("ana@example.com", "Ana")).is_ok());
        assert!(validate_user(&user("ana.example.com", "Ana")).is_err());
        assert!(validate_user(&user("@example.com", "Ana")).is_err());
        assert!(validate_user(&user("ana@example.com", "")).is_err());
    }

    #[test]
    fn star_rating_range() {
        let mut hotel = Hotel {
            id: Ulid::new(),
            name: "Harbor".into(),
            location: "Lisbon".into(),
            description: None,
            stars: Some(5),
            created_at: 0,
        };
        assert!(validate_hotel(&hotel).is_ok());
        hotel.stars = Some(6);
        assert!(validate_hotel(&hotel).is_err());
        hotel.stars = Some(0);
        assert!(validate_hotel(&hotel).is_err());
    }
}

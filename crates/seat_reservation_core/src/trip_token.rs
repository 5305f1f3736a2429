//! crates/seat_reservation_core/src/trip_token.rs
//!
//! Trip identifier codec. A trip token is the URL-safe base64 form of
//! `"<schedule uuid>|<YYYY-MM-DD>"`. It is an identifier, not a capability:
//! anyone can mint one.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::NaiveDate;
use uuid::Uuid;

use crate::domain::Trip;
use crate::error::{EngineError, EngineResult};

const DELIMITER: char = '|';
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Encodes a trip into its opaque token.
pub fn encode(trip: &Trip) -> String {
    let raw = format!(
        "{}{}{}",
        trip.schedule_id,
        DELIMITER,
        trip.travel_date.format(DATE_FORMAT)
    );
    URL_SAFE_NO_PAD.encode(raw.as_bytes())
}

/// Decodes a token back into its trip.
///
/// Padded input is tolerated. Anything that does not reverse into exactly two
/// non-empty parts, a schedule UUID and a calendar date, is `InvalidTripToken`.
pub fn decode(token: &str) -> EngineResult<Trip> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token.trim_end_matches('='))
        .map_err(|_| EngineError::InvalidTripToken)?;
    let raw = String::from_utf8(bytes).map_err(|_| EngineError::InvalidTripToken)?;

    let mut parts = raw.split(DELIMITER);
    let (schedule_part, date_part) = match (parts.next(), parts.next(), parts.next()) {
        (Some(s), Some(d), None) if !s.is_empty() && !d.is_empty() => (s, d),
        _ => return Err(EngineError::InvalidTripToken),
    };

    let schedule_id = Uuid::parse_str(schedule_part).map_err(|_| EngineError::InvalidTripToken)?;
    let travel_date =
        NaiveDate::parse_from_str(date_part, DATE_FORMAT).map_err(|_| EngineError::InvalidTripToken)?;

    Ok(Trip::new(schedule_id, travel_date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample() -> Trip {
        Trip::new(
            Uuid::parse_str("6f1c1f0e-4c1e-4d8a-9a55-0b1f3f4a2b7c").unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
        )
    }

    #[test]
    fn token_is_url_safe() {
        let token = encode(&sample());
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn padded_token_still_decodes() {
        let token = encode(&sample());
        let padded = format!("{}{}", token, "=".repeat((4 - token.len() % 4) % 4));
        assert_eq!(decode(&padded), Ok(sample()));
    }

    #[test]
    fn garbage_is_rejected() {
        assert_eq!(decode("not base64 at all!"), Err(EngineError::InvalidTripToken));
        assert_eq!(decode(""), Err(EngineError::InvalidTripToken));
    }

    #[test]
    fn wrong_shape_is_rejected() {
        let cases = [
            "only-one-part".to_string(),
            format!("{}|", Uuid::nil()),
            "|2025-06-01".to_string(),
            format!("{}|2025-06-01|extra", Uuid::nil()),
            format!("{}|2025-13-40", Uuid::nil()),
            "schedule-7|2025-06-01".to_string(),
        ];
        for raw in cases {
            let token = URL_SAFE_NO_PAD.encode(raw.as_bytes());
            assert_eq!(decode(&token), Err(EngineError::InvalidTripToken), "{raw}");
        }
    }

    #[test]
    fn non_utf8_payload_is_rejected() {
        let token = URL_SAFE_NO_PAD.encode([0xff, 0xfe, 0x7c, 0x00]);
        assert_eq!(decode(&token), Err(EngineError::InvalidTripToken));
    }

    proptest! {
        #[test]
        fn decode_inverts_encode(bits in any::<u128>(), days in 0i64..200_000) {
            let date = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap() + chrono::Duration::days(days);
            let trip = Trip::new(Uuid::from_u128(bits), date);
            prop_assert_eq!(decode(&encode(&trip)), Ok(trip));
        }
    }
}

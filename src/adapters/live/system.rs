//! System clock and random workspace ids.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::ports::{Clock, IdGenerator};

/// Length of generated ids. Twelve hex digits keep workspace names short
/// while collisions stay out of reach for the handful of concurrent runs.
const ID_LEN: usize = 12;

/// Wall-clock time in UTC.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Random hex ids cut from a v4 UUID.
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn generate_id(&self) -> String {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(ID_LEN);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_tracks_wall_time() {
        let before = Utc::now();
        let now = SystemClock.now();
        assert!(now >= before && now <= Utc::now());
    }

    #[test]
    fn ids_are_short_hex_and_distinct() {
        let a = RandomIds.generate_id();
        let b = RandomIds.generate_id();

        assert_ne!(a, b);
        assert_eq!(a.len(), ID_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }
}

use chrono::{TimeZone, Utc};
use sonyflake::{Error, Sonyflake};

lazy_static::lazy_static! {
    static ref SF: Sonyflake = Sonyflake::builder()
        .start_time(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        .finalize()
        .unwrap();
}

/// Next row id. Ids are stored as `BIGINT UNSIGNED` and exposed as strings.
pub fn next_id() -> Result<u64, Error> {
    SF.clone().next_id()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_id_test() {
        let a = next_id().unwrap();
        let b = next_id().unwrap();
        assert_ne!(a, b);
    }
}

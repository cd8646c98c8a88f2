use chrono::{DateTime, SubsecRound, Utc};

/// Current time truncated to the precision Postgres stores
/// `TIMESTAMPTZ` values with, so values read back compare equal.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

#[cfg(test)]
mod tests {
    use chrono::Timelike;

    #[test]
    fn test_now_has_micros_precision() {
        let now = super::now();
        assert_eq!(now.nanosecond() % 1_000, 0);
    }
}

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Staleness-bounded view of a slow-changing list kept in the row store.
/// A value is served for at most `ttl` after it was fetched; writers call
/// `invalidate` so their own change is visible immediately.
#[derive(Debug)]
pub struct TtlCache<T> {
    ttl: chrono::Duration,
    slot: Option<(T, DateTime<Utc>)>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero()),
            slot: None,
        }
    }

    pub fn get_or_refresh<E>(
        &mut self,
        now: DateTime<Utc>,
        refresh: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E> {
        if let Some((value, fetched_at)) = &self.slot
            && now - *fetched_at <= self.ttl
        {
            return Ok(value.clone());
        }

        let value = refresh()?;
        self.slot = Some((value.clone(), now));
        Ok(value)
    }

    pub fn invalidate(&mut self) {
        self.slot = None;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::TtlCache;

    fn at(secs: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn serves_cached_value_within_ttl() {
        let mut cache = TtlCache::new(Duration::from_secs(300));
        let mut fetches = 0;
        let mut fetch = |value: i32| {
            fetches += 1;
            Ok::<_, ()>(value)
        };

        assert_eq!(cache.get_or_refresh(at(0), || fetch(1)), Ok(1));
        assert_eq!(cache.get_or_refresh(at(299), || fetch(2)), Ok(1));
        assert_eq!(fetches, 1);
    }

    #[test]
    fn refreshes_after_ttl() {
        let mut cache = TtlCache::new(Duration::from_secs(300));
        assert_eq!(cache.get_or_refresh(at(0), || Ok::<_, ()>(1)), Ok(1));
        assert_eq!(cache.get_or_refresh(at(301), || Ok::<_, ()>(2)), Ok(2));
    }

    #[test]
    fn invalidate_forces_next_fetch() {
        let mut cache = TtlCache::new(Duration::from_secs(300));
        assert_eq!(cache.get_or_refresh(at(0), || Ok::<_, ()>(1)), Ok(1));
        cache.invalidate();
        assert_eq!(cache.get_or_refresh(at(1), || Ok::<_, ()>(2)), Ok(2));
    }

    #[test]
    fn refresh_error_is_propagated_and_not_cached() {
        let mut cache = TtlCache::<i32>::new(Duration::from_secs(300));
        assert_eq!(cache.get_or_refresh(at(0), || Err("down")), Err("down"));
        assert_eq!(cache.get_or_refresh(at(1), || Ok::<_, &str>(3)), Ok(3));
    }
}

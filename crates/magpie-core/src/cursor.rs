//! Backward-moving time cursor driving archive pagination.
//!
//! The cursor starts at `start_epoch` and walks toward the older `end_epoch`,
//! one search page at a time. After each resolved batch it advances to the
//! oldest `created_utc` observed; a page with zero candidates (a dead zone)
//! bumps the cursor forward by `skip_time` instead, trading a small chance of
//! missing sparse activity for guaranteed forward progress. That skip is the
//! only way the cursor ever moves toward more recent time.
//!
//! Cursor state is never persisted: a rerun starts from the configured epochs
//! and relies on the store's merge semantics for idempotence.

use crate::error::AppError;

/// Cursor state for one ingestion run over `[end_epoch, start_epoch]`.
#[derive(Debug, Clone)]
pub struct SearchCursor {
    start_epoch: i64,
    end_epoch: i64,
    skip_time: i64,
    oldest_epoch_seen: i64,
    /// Oldest position ever skipped from. Advances back to or above this
    /// point are rejected: everything there was already ingested, and
    /// honoring them would oscillate the cursor between a sparse record
    /// and the dead zone below it.
    skip_floor: Option<i64>,
}

impl SearchCursor {
    /// Creates a cursor for the given range.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::InvalidTimeRange`] unless `start_epoch > end_epoch`
    /// and `skip_time > 0`.
    pub fn new(start_epoch: i64, end_epoch: i64, skip_time: i64) -> Result<Self, AppError> {
        if start_epoch <= end_epoch || skip_time <= 0 {
            return Err(AppError::InvalidTimeRange {
                start: start_epoch,
                end: end_epoch,
            });
        }
        Ok(Self {
            start_epoch,
            end_epoch,
            skip_time,
            oldest_epoch_seen: start_epoch,
            skip_floor: None,
        })
    }

    /// Exclusive upper bound for the next search page.
    pub fn before(&self) -> i64 {
        self.oldest_epoch_seen
    }

    pub fn start_epoch(&self) -> i64 {
        self.start_epoch
    }

    pub fn end_epoch(&self) -> i64 {
        self.end_epoch
    }

    /// Advances the cursor to the oldest resolved timestamp.
    ///
    /// Clamped so the cursor never moves toward more recent time: a batch
    /// whose minimum sits above the current position leaves it unchanged.
    /// Timestamps at or above a previous skip point are also rejected; a
    /// page refetched after a dead-zone skip can only re-surface records
    /// the cursor already walked past.
    pub fn advance_to(&mut self, oldest_resolved: i64) {
        if oldest_resolved >= self.oldest_epoch_seen {
            return;
        }
        if let Some(floor) = self.skip_floor {
            if oldest_resolved >= floor {
                return;
            }
        }
        self.oldest_epoch_seen = oldest_resolved;
    }

    /// Dead-zone escape: bumps the cursor forward by `skip_time`.
    ///
    /// Called when a search page comes back empty, so the next request
    /// probes `before + skip_time` instead of retrying the same point.
    /// The pre-skip position becomes a floor for [`advance_to`](Self::advance_to).
    pub fn skip_ahead(&mut self) {
        self.skip_floor = Some(match self.skip_floor {
            Some(floor) => floor.min(self.oldest_epoch_seen),
            None => self.oldest_epoch_seen,
        });
        self.oldest_epoch_seen += self.skip_time;
    }

    /// True once the cursor has reached or passed the end of the range.
    pub fn finished(&self) -> bool {
        self.oldest_epoch_seen <= self.end_epoch
    }

    /// True if dead-zone skips have pushed the cursor past the start epoch.
    ///
    /// At that point nothing older than the current position exists upstream,
    /// so the run can only spin; callers should terminate instead.
    pub fn exhausted(&self) -> bool {
        self.oldest_epoch_seen > self.start_epoch
    }

    /// Fraction of the configured range ingested so far, in `[0, 1]`.
    pub fn fraction_complete(&self) -> f64 {
        let total = (self.start_epoch - self.end_epoch) as f64;
        let done = (self.start_epoch - self.oldest_epoch_seen) as f64;
        (done / total).clamp(0.0, 1.0)
    }

    /// Seconds of range already covered.
    pub fn ingested_range(&self) -> i64 {
        (self.start_epoch - self.oldest_epoch_seen).max(0)
    }

    /// Seconds of range still ahead of the cursor.
    pub fn remaining_range(&self) -> i64 {
        (self.oldest_epoch_seen - self.end_epoch).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_range() {
        assert!(SearchCursor::new(1000, 0, 3600).is_ok());
        assert!(matches!(
            SearchCursor::new(0, 1000, 3600),
            Err(AppError::InvalidTimeRange { .. })
        ));
        assert!(matches!(
            SearchCursor::new(1000, 1000, 3600),
            Err(AppError::InvalidTimeRange { .. })
        ));
        assert!(SearchCursor::new(1000, 0, 0).is_err());
    }

    #[test]
    fn test_starts_at_start_epoch() {
        let cursor = SearchCursor::new(5000, 1000, 600).unwrap();
        assert_eq!(cursor.before(), 5000);
        assert!(!cursor.finished());
    }

    #[test]
    fn test_advance_moves_older_only() {
        let mut cursor = SearchCursor::new(5000, 1000, 600).unwrap();
        cursor.advance_to(4000);
        assert_eq!(cursor.before(), 4000);

        // A batch minimum above the cursor must not move it forward
        cursor.advance_to(4500);
        assert_eq!(cursor.before(), 4000);
    }

    #[test]
    fn test_skip_ahead_on_empty_page() {
        let mut cursor = SearchCursor::new(5000, 1000, 600).unwrap();
        cursor.advance_to(3000);

        // Empty page at before=3000: next request probes 3000 + skip_time
        cursor.skip_ahead();
        assert_eq!(cursor.before(), 3600);
    }

    #[test]
    fn test_advance_rejected_at_or_above_skip_point() {
        let mut cursor = SearchCursor::new(10_000, 0, 600).unwrap();
        cursor.advance_to(5000);

        // Empty page at 5000, skip to 5600. The page at before=5600 will
        // re-surface the record at 5000; moving back down would oscillate.
        cursor.skip_ahead();
        assert_eq!(cursor.before(), 5600);
        cursor.advance_to(5000);
        assert_eq!(cursor.before(), 5600);

        // A genuinely older record still advances the cursor
        cursor.advance_to(4200);
        assert_eq!(cursor.before(), 4200);
    }

    #[test]
    fn test_finished_at_boundary() {
        let mut cursor = SearchCursor::new(5000, 1000, 600).unwrap();
        cursor.advance_to(1000);
        assert!(cursor.finished());

        let mut below = SearchCursor::new(5000, 1000, 600).unwrap();
        below.advance_to(900);
        assert!(below.finished());
    }

    #[test]
    fn test_exhausted_after_skipping_past_start() {
        let mut cursor = SearchCursor::new(5000, 1000, 3600).unwrap();
        assert!(!cursor.exhausted());
        cursor.skip_ahead();
        assert!(cursor.exhausted());
    }

    #[test]
    fn test_fraction_complete() {
        let mut cursor = SearchCursor::new(1000, 0, 100).unwrap();
        assert_eq!(cursor.fraction_complete(), 0.0);

        cursor.advance_to(750);
        assert_eq!(cursor.fraction_complete(), 0.25);

        cursor.advance_to(0);
        assert_eq!(cursor.fraction_complete(), 1.0);
    }

    #[test]
    fn test_range_accounting() {
        let mut cursor = SearchCursor::new(1000, 200, 100).unwrap();
        cursor.advance_to(600);
        assert_eq!(cursor.ingested_range(), 400);
        assert_eq!(cursor.remaining_range(), 400);
    }
}

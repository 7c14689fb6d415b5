use super::candle::Candle;
use super::granularity::Granularity;
use crate::domain::errors::SyncError;
use std::collections::VecDeque;

/// Fixed-capacity sliding window of candles for one granularity.
///
/// The last element is the live (still forming) bar, everything before it is
/// settled history. Consecutive timestamps are exactly one interval apart; once
/// the window is full every advance evicts the oldest bar so the length stays
/// at `capacity`.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleWindow {
    capacity: usize,
    interval_ms: i64,
    candles: VecDeque<Candle>,
}

impl CandleWindow {
    pub fn new(capacity: usize, interval_ms: i64) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            interval_ms,
            candles: VecDeque::with_capacity(capacity),
        }
    }

    pub fn for_granularity(capacity: usize, granularity: Granularity) -> Self {
        Self::new(capacity, granularity.interval_ms())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn interval_ms(&self) -> i64 {
        self.interval_ms
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn live(&self) -> Option<&Candle> {
        self.candles.back()
    }

    /// The most recent settled bar (second-to-last element)
    pub fn settled(&self) -> Option<&Candle> {
        self.candles.len().checked_sub(2).and_then(|idx| self.candles.get(idx))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candle> {
        self.candles.iter()
    }

    pub fn to_vec(&self) -> Vec<Candle> {
        self.candles.iter().copied().collect()
    }

    /// Settled bars, oldest first (the live bar excluded)
    pub fn history(&self) -> Vec<Candle> {
        let settled = self.candles.len().saturating_sub(1);
        self.candles.iter().take(settled).copied().collect()
    }

    /// Replaces the whole window with `history` (oldest first) followed by `live`.
    ///
    /// Only the most recent `capacity` bars are kept. Without a live bar the last
    /// historical bar acts as live. A live bar sharing the last historical
    /// timestamp supersedes it. The kept bars must be contiguous, a missing
    /// bucket is [`SyncError::InconsistentBoundary`]. On error the window is
    /// left untouched.
    pub fn initialize(&mut self, history: Vec<Candle>, live: Option<Candle>) -> Result<(), SyncError> {
        let mut candles: VecDeque<Candle> = history.into();
        ensure_ordered(candles.iter())?;

        if let Some(live) = live {
            if let Some(last) = candles.back() {
                if last.timestamp == live.timestamp {
                    candles.pop_back();
                } else if last.timestamp > live.timestamp {
                    return Err(SyncError::OutOfOrder {
                        previous: last.timestamp,
                        next: live.timestamp,
                    });
                }
            }
            candles.push_back(live);
        }

        if candles.is_empty() {
            return Err(SyncError::EmptyFetch { what: "history" });
        }
        while candles.len() > self.capacity {
            candles.pop_front();
        }
        ensure_contiguous(candles.iter(), self.interval_ms)?;
        self.candles = candles;
        Ok(())
    }

    /// Overwrites the live bar while its bucket is still open; the length never changes
    pub fn replace_live(&mut self, new_live: Candle) -> Result<(), SyncError> {
        let live = self.candles.back_mut().ok_or(SyncError::Uninitialized)?;
        if live.timestamp != new_live.timestamp {
            return Err(SyncError::InconsistentBoundary {
                expected: live.timestamp,
                actual: new_live.timestamp,
            });
        }
        *live = new_live;
        Ok(())
    }

    /// Settles the live bar with `closed_live`, appends `new_live` and evicts the oldest bar.
    ///
    /// Advances by exactly one bucket: `closed_live` must carry the current live
    /// timestamp and `new_live` the next bucket. Anything else is reported as
    /// [`SyncError::InconsistentBoundary`] and the window is left untouched.
    pub fn close_and_advance(&mut self, closed_live: Candle, new_live: Candle) -> Result<(), SyncError> {
        let live_ts = self.live().ok_or(SyncError::Uninitialized)?.timestamp;
        if closed_live.timestamp != live_ts {
            return Err(SyncError::InconsistentBoundary {
                expected: live_ts,
                actual: closed_live.timestamp,
            });
        }
        let next_ts = live_ts + self.interval_ms;
        if new_live.timestamp != next_ts {
            return Err(SyncError::InconsistentBoundary {
                expected: next_ts,
                actual: new_live.timestamp,
            });
        }

        if let Some(live) = self.candles.back_mut() {
            *live = closed_live;
        }
        self.candles.push_back(new_live);
        if self.candles.len() > self.capacity {
            self.candles.pop_front();
        }
        Ok(())
    }
}

fn ensure_ordered<'a>(candles: impl Iterator<Item = &'a Candle>) -> Result<(), SyncError> {
    let mut previous: Option<i64> = None;
    for candle in candles {
        if let Some(prev) = previous
            && candle.timestamp <= prev
        {
            return Err(SyncError::OutOfOrder {
                previous: prev,
                next: candle.timestamp,
            });
        }
        previous = Some(candle.timestamp);
    }
    Ok(())
}

fn ensure_contiguous<'a>(
    candles: impl Iterator<Item = &'a Candle>,
    interval_ms: i64,
) -> Result<(), SyncError> {
    let mut previous: Option<i64> = None;
    for candle in candles {
        if let Some(prev) = previous
            && candle.timestamp != prev + interval_ms
        {
            return Err(SyncError::InconsistentBoundary {
                expected: prev + interval_ms,
                actual: candle.timestamp,
            });
        }
        previous = Some(candle.timestamp);
    }
    Ok(())
}

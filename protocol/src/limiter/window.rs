//! # Sliding-Window Bins
//!
//! An [`AccountWindow`] is a fixed-length circular array of [`Bin`]s. A
//! withdrawal only ever lands in the bin for the current instant, so memory
//! is O(bin count) no matter how often the account withdraws. Bins older
//! than the window are zeroed lazily on the next check; there is no sweep.
//!
//! ```text
//!   bin_length = window / bins            (floor)
//!   bin_index  = ((now - base) / bin_length) mod bins
//!   expired    = bin.timestamp < now - window
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::types::Amount;

/// One time slice of an account's window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bin {
    /// Unix seconds of the most recent withdrawal recorded here.
    pub timestamp: u64,
    /// Sum recorded since the bin was last zeroed.
    #[serde(with = "crate::types::amount_string")]
    pub amount: Amount,
}

/// Outcome of a rejected [`AccountWindow::try_record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exceeded {
    /// Active total at the time of the check.
    pub active: Amount,
}

/// Per-account limiter state.
///
/// The bin array is allocated once, at the first limited withdrawal, and
/// its length never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountWindow {
    base_timestamp: u64,
    bins: Vec<Bin>,
}

impl AccountWindow {
    /// Allocates `bin_count` empty bins anchored at `now`.
    pub fn new(now: u64, bin_count: u32) -> Self {
        Self {
            base_timestamp: now,
            bins: vec![Bin::default(); bin_count.max(1) as usize],
        }
    }

    /// Time of the first recorded withdrawal.
    pub fn base_timestamp(&self) -> u64 {
        self.base_timestamp
    }

    /// The bins, oldest slot first.
    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    /// Length of the (pinned) bin array.
    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    /// Seconds covered by one bin under `window_seconds`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Validation`] if the window is shorter than the
    /// number of bins.
    pub fn bin_length(&self, window_seconds: u64) -> LedgerResult<u64> {
        let length = window_seconds / self.bins.len() as u64;
        if length == 0 {
            return Err(LedgerError::validation(format!(
                "window of {window_seconds}s is shorter than {} bins",
                self.bins.len()
            )));
        }
        Ok(length)
    }

    /// Slot that a withdrawal at `now` lands in.
    pub fn bin_index(&self, now: u64, window_seconds: u64) -> LedgerResult<usize> {
        let length = self.bin_length(window_seconds)?;
        let elapsed = now.saturating_sub(self.base_timestamp);
        Ok(((elapsed / length) % self.bins.len() as u64) as usize)
    }

    /// Zeroes every bin last touched before `now - window_seconds`.
    pub fn expire(&mut self, now: u64, window_seconds: u64) {
        let cutoff = now.saturating_sub(window_seconds);
        for bin in &mut self.bins {
            if bin.timestamp < cutoff {
                *bin = Bin::default();
            }
        }
    }

    /// Sum over bins that are still inside the window at `now`.
    pub fn active_total(&self, now: u64, window_seconds: u64) -> Amount {
        let cutoff = now.saturating_sub(window_seconds);
        self.bins
            .iter()
            .filter(|bin| bin.timestamp >= cutoff)
            .fold(0, |acc: Amount, bin| acc.saturating_add(bin.amount))
    }

    /// Earliest instant at which the oldest active bin leaves the window.
    pub fn window_end(&self, now: u64, window_seconds: u64) -> Option<u64> {
        let cutoff = now.saturating_sub(window_seconds);
        self.bins
            .iter()
            .filter(|bin| bin.amount > 0 && bin.timestamp >= cutoff)
            .map(|bin| bin.timestamp.saturating_add(window_seconds))
            .min()
    }

    /// Expires stale bins, then records `amount` in the current bin if the
    /// window stays within `limit`. The boundary is inclusive.
    ///
    /// On rejection nothing but already-expired bins has changed, and those
    /// were not counted anyway.
    pub fn try_record(
        &mut self,
        now: u64,
        window_seconds: u64,
        limit: Amount,
        amount: Amount,
    ) -> LedgerResult<Result<(usize, Amount), Exceeded>> {
        let index = self.bin_index(now, window_seconds)?;
        self.expire(now, window_seconds);
        let active = self.active_total(now, window_seconds);

        let total = match active.checked_add(amount) {
            Some(total) if total <= limit => total,
            _ => return Ok(Err(Exceeded { active })),
        };

        let bin = &mut self.bins[index];
        // total <= limit bounds every bin, so this add cannot overflow.
        bin.amount += amount;
        bin.timestamp = now;
        Ok(Ok((index, total)))
    }
}

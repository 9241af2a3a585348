//! Window bookkeeping for sampled subscriptions.
//!
//! The sampler only decides; the owning subscription schedules the window
//! timers and performs deliveries.

use crate::types::{SampleConfig, SampleMode};
use std::time::Duration;

/// What to do with a freshly offered value.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Offer<T> {
    /// Deliver now; a window was opened and needs a timer.
    Deliver(T),
    /// Held for the end of a window that was just opened and needs a timer.
    OpenWindow,
    /// Held for the end of the window already running.
    Held,
}

/// What to do when a window timer fires.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Lapse<T> {
    /// Deliver the held value; a follow-up window was opened.
    Flush(T),
    /// Nothing was held; the window is closed.
    Closed,
    /// The timer belongs to a window that no longer exists.
    Stale,
}

pub(crate) struct Sampler<T> {
    config: SampleConfig,
    window_open: bool,
    pending: Option<T>,
    /// Identifies the current window; bumped whenever one opens or is reset.
    epoch: u64,
}

impl<T> Sampler<T> {
    pub(crate) fn new(config: SampleConfig) -> Self {
        Self {
            config,
            window_open: false,
            pending: None,
            epoch: 0,
        }
    }

    pub(crate) fn interval(&self) -> Duration {
        self.config.interval
    }

    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Applies to windows opened from now on.
    pub(crate) fn reconfigure(&mut self, config: SampleConfig) {
        self.config = config;
    }

    pub(crate) fn offer(&mut self, value: T) -> Offer<T> {
        if self.window_open {
            self.pending = Some(value);
            return Offer::Held;
        }

        self.window_open = true;
        self.epoch += 1;
        match self.config.mode {
            SampleMode::LeadingAndTrailing => Offer::Deliver(value),
            SampleMode::TrailingOnly => {
                self.pending = Some(value);
                Offer::OpenWindow
            }
        }
    }

    pub(crate) fn lapse(&mut self, epoch: u64) -> Lapse<T> {
        if !self.window_open || epoch != self.epoch {
            return Lapse::Stale;
        }

        match self.pending.take() {
            Some(value) => {
                self.epoch += 1;
                Lapse::Flush(value)
            }
            None => {
                self.window_open = false;
                Lapse::Closed
            }
        }
    }

    /// Close the current window and drop anything held.
    pub(crate) fn reset(&mut self) {
        self.window_open = false;
        self.pending = None;
        self.epoch += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sampler(mode: SampleMode) -> Sampler<i32> {
        Sampler::new(SampleConfig {
            interval: Duration::from_millis(100),
            mode,
        })
    }

    #[test]
    fn test_leading_value_delivers_immediately() {
        let mut s = sampler(SampleMode::LeadingAndTrailing);
        assert_eq!(s.offer(1), Offer::Deliver(1));
        assert_eq!(s.offer(2), Offer::Held);
        assert_eq!(s.offer(3), Offer::Held);

        let epoch = s.epoch();
        assert_eq!(s.lapse(epoch), Lapse::Flush(3));

        // Flush opened a follow-up window that closes quietly.
        let epoch = s.epoch();
        assert_eq!(s.lapse(epoch), Lapse::Closed);

        // Fresh window: next value goes straight through.
        assert_eq!(s.offer(4), Offer::Deliver(4));
    }

    #[test]
    fn test_quiet_window_closes_without_flush() {
        let mut s = sampler(SampleMode::LeadingAndTrailing);
        assert_eq!(s.offer(1), Offer::Deliver(1));
        let epoch = s.epoch();
        assert_eq!(s.lapse(epoch), Lapse::Closed);
        assert_eq!(s.offer(2), Offer::Deliver(2));
    }

    #[test]
    fn test_trailing_only_holds_first_value() {
        let mut s = sampler(SampleMode::TrailingOnly);
        assert_eq!(s.offer(1), Offer::OpenWindow);
        assert_eq!(s.offer(2), Offer::Held);

        let epoch = s.epoch();
        assert_eq!(s.lapse(epoch), Lapse::Flush(2));
    }

    #[test]
    fn test_stale_timers_are_ignored() {
        let mut s = sampler(SampleMode::LeadingAndTrailing);
        s.offer(1);
        let old = s.epoch();
        s.offer(2);
        s.reset();

        assert_eq!(s.lapse(old), Lapse::Stale);
        assert_eq!(s.offer(3), Offer::Deliver(3));
        assert_eq!(s.lapse(old), Lapse::Stale);
    }
}

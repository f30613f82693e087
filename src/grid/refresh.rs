use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Stopped,
    Running { interval: Duration },
}

/// Interval re-fetch trigger driven by the host loop.
///
/// The armed deadline is the only timer; `start`, `set_interval` and `stop`
/// replace or drop it in one step, so there is never more than one pending.
#[derive(Debug, Clone)]
pub struct RefreshScheduler {
    state: RefreshState,
    next_due: Option<Instant>,
    ticks: u64,
}

impl Default for RefreshScheduler {
    fn default() -> Self {
        Self {
            state: RefreshState::Stopped,
            next_due: None,
            ticks: 0,
        }
    }
}

impl RefreshScheduler {
    pub fn state(&self) -> RefreshState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, RefreshState::Running { .. })
    }

    pub fn interval(&self) -> Option<Duration> {
        match self.state {
            RefreshState::Running { interval } => Some(interval),
            RefreshState::Stopped => None,
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn armed_timers(&self) -> usize {
        usize::from(self.next_due.is_some())
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    /// Starting while running behaves like [`RefreshScheduler::set_interval`].
    pub fn start(&mut self, interval: Duration, now: Instant) -> Result<()> {
        self.arm(interval, now)
    }

    /// Re-arms from `now` when running; ignored while stopped.
    pub fn set_interval(&mut self, interval: Duration, now: Instant) -> Result<()> {
        if !self.is_running() {
            return validate_interval(interval);
        }
        self.arm(interval, now)
    }

    pub fn stop(&mut self) {
        if self.is_running() {
            tracing::debug!(ticks = self.ticks, "refresh scheduler stopped");
        }
        self.state = RefreshState::Stopped;
        self.next_due = None;
    }

    /// Returns true when the armed deadline has passed. Fires at most once
    /// per call; a late poll re-bases the next deadline on `now`.
    pub fn poll(&mut self, now: Instant) -> bool {
        let (RefreshState::Running { interval }, Some(due)) = (self.state, self.next_due) else {
            return false;
        };
        if now < due {
            return false;
        }
        let next = due
            .checked_add(interval)
            .filter(|next| *next > now)
            .or_else(|| now.checked_add(interval));
        if next.is_none() {
            tracing::warn!(interval_secs = interval.as_secs(), "refresh deadline out of range; stopping");
            self.state = RefreshState::Stopped;
        }
        self.next_due = next;
        self.ticks = self.ticks.wrapping_add(1);
        tracing::debug!(ticks = self.ticks, interval_ms = interval.as_millis() as u64, "refresh tick");
        true
    }

    pub fn time_until_due(&self, now: Instant) -> Option<Duration> {
        self.next_due.map(|due| due.saturating_duration_since(now))
    }

    fn arm(&mut self, interval: Duration, now: Instant) -> Result<()> {
        validate_interval(interval)?;
        let due = now
            .checked_add(interval)
            .ok_or_else(|| anyhow!("自動更新の間隔が大きすぎます: {}秒", interval.as_secs()))?;
        self.state = RefreshState::Running { interval };
        self.next_due = Some(due);
        Ok(())
    }
}

fn validate_interval(interval: Duration) -> Result<()> {
    if interval.is_zero() {
        return Err(anyhow!("自動更新の間隔は 0 より大きい必要があります"));
    }
    Ok(())
}

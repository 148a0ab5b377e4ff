//! Contract with the OS notification facility.
//!
//! The facility exposes one logical alert slot (scheduling replaces the
//! previous alert) and one persistent "ongoing" indicator (showing it
//! again updates it in place). Every call is best effort: the timer's
//! phase logic never depends on whether an alert was delivered.

use std::cell::{Cell, RefCell};

use serde::{Deserialize, Serialize};

use crate::effects::OngoingNotification;
use crate::error::NotifyError;
use crate::timer::Phase;

pub trait NotificationScheduler {
    /// Schedule the completion alert, replacing any pending one.
    fn schedule_completion(&self, ends_at_epoch_ms: i64, phase: Phase) -> Result<(), NotifyError>;

    /// Cancel the pending alert. No-op when nothing is scheduled.
    fn cancel_scheduled(&self) -> Result<(), NotifyError>;

    /// Create or update the ongoing indicator.
    fn show_ongoing(&self, ongoing: &OngoingNotification) -> Result<(), NotifyError>;

    fn dismiss_ongoing(&self) -> Result<(), NotifyError>;
}

impl<N: NotificationScheduler + ?Sized> NotificationScheduler for &N {
    fn schedule_completion(&self, ends_at_epoch_ms: i64, phase: Phase) -> Result<(), NotifyError> {
        (**self).schedule_completion(ends_at_epoch_ms, phase)
    }

    fn cancel_scheduled(&self) -> Result<(), NotifyError> {
        (**self).cancel_scheduled()
    }

    fn show_ongoing(&self, ongoing: &OngoingNotification) -> Result<(), NotifyError> {
        (**self).show_ongoing(ongoing)
    }

    fn dismiss_ongoing(&self) -> Result<(), NotifyError> {
        (**self).dismiss_ongoing()
    }
}

impl<N: NotificationScheduler + ?Sized> NotificationScheduler for Box<N> {
    fn schedule_completion(&self, ends_at_epoch_ms: i64, phase: Phase) -> Result<(), NotifyError> {
        (**self).schedule_completion(ends_at_epoch_ms, phase)
    }

    fn cancel_scheduled(&self) -> Result<(), NotifyError> {
        (**self).cancel_scheduled()
    }

    fn show_ongoing(&self, ongoing: &OngoingNotification) -> Result<(), NotifyError> {
        (**self).show_ongoing(ongoing)
    }

    fn dismiss_ongoing(&self) -> Result<(), NotifyError> {
        (**self).dismiss_ongoing()
    }
}

/// Used when notifications are turned off in the config.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopScheduler;

impl NotificationScheduler for NoopScheduler {
    fn schedule_completion(&self, _: i64, _: Phase) -> Result<(), NotifyError> {
        Ok(())
    }

    fn cancel_scheduled(&self) -> Result<(), NotifyError> {
        Ok(())
    }

    fn show_ongoing(&self, _: &OngoingNotification) -> Result<(), NotifyError> {
        Ok(())
    }

    fn dismiss_ongoing(&self) -> Result<(), NotifyError> {
        Ok(())
    }
}

/// Headless backend: reports every request through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogScheduler;

impl NotificationScheduler for LogScheduler {
    fn schedule_completion(&self, ends_at_epoch_ms: i64, phase: Phase) -> Result<(), NotifyError> {
        let at = chrono::DateTime::from_timestamp_millis(ends_at_epoch_ms)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_default();
        tracing::info!(?phase, ends_at = %at, "completion alert scheduled");
        Ok(())
    }

    fn cancel_scheduled(&self) -> Result<(), NotifyError> {
        tracing::info!("completion alert cancelled");
        Ok(())
    }

    fn show_ongoing(&self, ongoing: &OngoingNotification) -> Result<(), NotifyError> {
        tracing::info!(
            phase = ?ongoing.phase,
            mode = ongoing.mode.as_str(),
            running = ongoing.running,
            cycle = %format!("{}/{}", ongoing.cycle.completed, ongoing.cycle.target),
            "ongoing: {}",
            ongoing.display_text
        );
        Ok(())
    }

    fn dismiss_ongoing(&self) -> Result<(), NotifyError> {
        tracing::info!("ongoing notification dismissed");
        Ok(())
    }
}

/// A single call received by a [`RecordingScheduler`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum NotifyCall {
    Schedule { ends_at_epoch_ms: i64, phase: Phase },
    Cancel,
    Show(OngoingNotification),
    Dismiss,
}

/// In-memory backend that remembers what it was asked to do and tracks
/// the resulting alert slot. Can be told to refuse every call, which is
/// how a revoked notification permission looks to the engine.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    calls: RefCell<Vec<NotifyCall>>,
    pending: Cell<Option<(i64, Phase)>>,
    ongoing: RefCell<Option<OngoingNotification>>,
    denied: Cell<bool>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny_permission(&self, denied: bool) {
        self.denied.set(denied);
    }

    pub fn calls(&self) -> Vec<NotifyCall> {
        self.calls.borrow().clone()
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }

    /// The alert that would fire, if any.
    pub fn pending(&self) -> Option<(i64, Phase)> {
        self.pending.get()
    }

    pub fn ongoing(&self) -> Option<OngoingNotification> {
        self.ongoing.borrow().clone()
    }

    fn check(&self) -> Result<(), NotifyError> {
        if self.denied.get() {
            Err(NotifyError::PermissionDenied)
        } else {
            Ok(())
        }
    }
}

impl NotificationScheduler for RecordingScheduler {
    fn schedule_completion(&self, ends_at_epoch_ms: i64, phase: Phase) -> Result<(), NotifyError> {
        self.check()?;
        self.pending.set(Some((ends_at_epoch_ms, phase)));
        self.calls.borrow_mut().push(NotifyCall::Schedule {
            ends_at_epoch_ms,
            phase,
        });
        Ok(())
    }

    fn cancel_scheduled(&self) -> Result<(), NotifyError> {
        self.check()?;
        self.pending.set(None);
        self.calls.borrow_mut().push(NotifyCall::Cancel);
        Ok(())
    }

    fn show_ongoing(&self, ongoing: &OngoingNotification) -> Result<(), NotifyError> {
        self.check()?;
        *self.ongoing.borrow_mut() = Some(ongoing.clone());
        self.calls.borrow_mut().push(NotifyCall::Show(ongoing.clone()));
        Ok(())
    }

    fn dismiss_ongoing(&self) -> Result<(), NotifyError> {
        self.check()?;
        *self.ongoing.borrow_mut() = None;
        self.calls.borrow_mut().push(NotifyCall::Dismiss);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::{CycleInfo, Mode};

    fn ongoing() -> OngoingNotification {
        OngoingNotification {
            phase: Phase::Focus,
            mode: Mode::Countdown,
            running: true,
            display_text: "10:00".into(),
            cycle: CycleInfo {
                completed: 0,
                target: 1,
            },
        }
    }

    #[test]
    fn rescheduling_replaces_the_single_slot() {
        let n = RecordingScheduler::new();
        n.schedule_completion(1_000, Phase::Focus).unwrap();
        n.schedule_completion(2_000, Phase::Break).unwrap();
        assert_eq!(n.pending(), Some((2_000, Phase::Break)));
        n.cancel_scheduled().unwrap();
        n.cancel_scheduled().unwrap();
        assert_eq!(n.pending(), None);
    }

    #[test]
    fn ongoing_is_upserted() {
        let n = RecordingScheduler::new();
        n.show_ongoing(&ongoing()).unwrap();
        let mut updated = ongoing();
        updated.display_text = "09:59".into();
        n.show_ongoing(&updated).unwrap();
        assert_eq!(n.ongoing().unwrap().display_text, "09:59");
        n.dismiss_ongoing().unwrap();
        assert!(n.ongoing().is_none());
    }

    #[test]
    fn denied_permission_rejects_calls() {
        let n = RecordingScheduler::new();
        n.deny_permission(true);
        assert!(matches!(
            n.schedule_completion(1, Phase::Focus),
            Err(NotifyError::PermissionDenied)
        ));
        assert!(n.calls().is_empty());
    }

    #[test]
    fn log_and_noop_backends_always_succeed() {
        assert!(LogScheduler.schedule_completion(0, Phase::Focus).is_ok());
        assert!(LogScheduler.show_ongoing(&ongoing()).is_ok());
        assert!(NoopScheduler.dismiss_ongoing().is_ok());
    }
}

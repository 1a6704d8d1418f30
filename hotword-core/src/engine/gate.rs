//! Enable/disable gate.
//!
//! Several parties can pause hotword detection at once (a dialogue session,
//! audio playback, TTS). Each pause is recorded as a reason and detection
//! resumes only when every reason has been withdrawn. Enabling with
//! [`ToggleReason::Unknown`] withdraws all of them.
//!
//! The reason set is owned by the control plane. The derived boolean is
//! published through an `Arc<AtomicBool>` so UDP listeners and the detection
//! loop can read it without a lock.

use std::collections::HashSet;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::ipc::ToggleReason;

#[derive(Debug)]
pub struct WakeGate {
    reasons: HashSet<ToggleReason>,
    enabled: Arc<AtomicBool>,
}

impl WakeGate {
    /// A gate created disabled has no reasons; the first enable opens it.
    pub fn new(enabled: bool) -> Self {
        Self {
            reasons: HashSet::new(),
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    /// Record `reason` and close the gate. Returns `true` if it was open.
    pub fn disable(&mut self, reason: ToggleReason) -> bool {
        self.reasons.insert(reason);
        self.enabled.swap(false, Ordering::AcqRel)
    }

    /// Withdraw `reason` (or every reason for `Unknown`). Returns `true` if
    /// the gate is open afterwards.
    pub fn enable(&mut self, reason: &ToggleReason) -> bool {
        if *reason == ToggleReason::Unknown {
            self.reasons.clear();
        } else {
            self.reasons.remove(reason);
        }

        if self.reasons.is_empty() {
            self.enabled.store(true, Ordering::Release);
            true
        } else {
            false
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn reasons(&self) -> impl Iterator<Item = &ToggleReason> {
        self.reasons.iter()
    }

    /// Shared view of the enabled state for other threads.
    pub fn enabled_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_reason_clears_every_disable() {
        let mut gate = WakeGate::new(true);
        assert!(gate.disable(ToggleReason::DialogueSession));
        assert!(!gate.disable(ToggleReason::PlayAudio));
        assert!(!gate.disable(ToggleReason::Other("alarm".into())));
        assert!(!gate.is_enabled());

        assert!(gate.enable(&ToggleReason::Unknown));
        assert!(gate.is_enabled());
        assert_eq!(gate.reasons().count(), 0);
    }

    #[test]
    fn specific_reason_removes_only_itself() {
        let mut gate = WakeGate::new(true);
        gate.disable(ToggleReason::DialogueSession);
        gate.disable(ToggleReason::TtsSay);

        assert!(!gate.enable(&ToggleReason::TtsSay));
        assert!(!gate.is_enabled());
        assert_eq!(
            gate.reasons().collect::<Vec<_>>(),
            vec![&ToggleReason::DialogueSession]
        );

        assert!(gate.enable(&ToggleReason::DialogueSession));
        assert!(gate.is_enabled());
    }

    #[test]
    fn enabling_an_unrelated_reason_keeps_gate_closed() {
        let mut gate = WakeGate::new(true);
        gate.disable(ToggleReason::PlayAudio);
        assert!(!gate.enable(&ToggleReason::DialogueSession));
        assert!(!gate.is_enabled());
    }

    #[test]
    fn flag_is_shared_with_readers() {
        let mut gate = WakeGate::new(true);
        let flag = gate.enabled_flag();
        gate.disable(ToggleReason::TtsSay);
        assert!(!flag.load(Ordering::Acquire));
        gate.enable(&ToggleReason::TtsSay);
        assert!(flag.load(Ordering::Acquire));
    }

    #[test]
    fn initially_disabled_gate_opens_on_first_enable() {
        let mut gate = WakeGate::new(false);
        assert!(!gate.is_enabled());
        assert!(gate.enable(&ToggleReason::PlayAudio));
    }
}

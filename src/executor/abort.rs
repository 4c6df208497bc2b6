use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::{error, warn};

use super::states::{AbortReason, ExecutionState};
use crate::error::{ExecutionError, LinkError};
use crate::link::{VehicleCommand, VehicleLink};

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingAbort {
    pub reason: AbortReason,
    /// Someone other than the boundary sends the emergency command.
    pub emergency_sent: bool,
}

struct Slot {
    state: ExecutionState,
    pending: Option<PendingAbort>,
    last_outcome: Option<ExecutionState>,
}

/// Execution state plus the single-slot abort signal.
///
/// Both live behind one lock so that delivering an abort and the executor's
/// check-and-transition to `Aborting` can never interleave.
pub(crate) struct Control {
    slot: Mutex<Slot>,
    transitions: broadcast::Sender<ExecutionState>,
    abort_tx: watch::Sender<bool>,
    /// Emergency commands sent outside the executor that have not finished.
    emergencies: watch::Sender<usize>,
}

const TRANSITION_CAPACITY: usize = 64;

impl Control {
    pub fn new() -> Self {
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);
        let (abort_tx, _) = watch::channel(false);
        let (emergencies, _) = watch::channel(0);
        Self {
            slot: Mutex::new(Slot {
                state: ExecutionState::Idle,
                pending: None,
                last_outcome: None,
            }),
            transitions,
            abort_tx,
            emergencies,
        }
    }

    fn publish(&self, slot: &mut Slot, state: ExecutionState) {
        slot.state = state.clone();
        // every transition is queued, terminal states included
        let _ = self.transitions.send(state);
    }

    pub fn state(&self) -> ExecutionState {
        self.slot.lock().state.clone()
    }

    pub fn last_outcome(&self) -> Option<ExecutionState> {
        self.slot.lock().last_outcome.clone()
    }

    /// Current state and a receiver for every later transition, taken
    /// together so nothing is missed or seen twice.
    pub fn subscribe(&self) -> (ExecutionState, broadcast::Receiver<ExecutionState>) {
        let slot = self.slot.lock();
        (slot.state.clone(), self.transitions.subscribe())
    }

    pub fn begin(&self, mission: &str) -> Result<(), ExecutionError> {
        let mut slot = self.slot.lock();
        if !slot.state.is_idle() {
            return Err(ExecutionError::AlreadyRunning);
        }
        slot.pending = None;
        self.abort_tx.send_replace(false);
        self.publish(
            &mut slot,
            ExecutionState::Running {
                mission: mission.to_string(),
                waypoint: 0,
            },
        );
        Ok(())
    }

    /// Move the waypoint cursor. A forced `Aborting` state is left alone.
    pub fn advance(&self, waypoint: usize) {
        let mut guard = self.slot.lock();
        let slot = &mut *guard;
        let mission = match &slot.state {
            ExecutionState::Running { mission, .. } => mission.clone(),
            _ => return,
        };
        self.publish(slot, ExecutionState::Running { mission, waypoint });
    }

    pub fn is_abort_pending(&self) -> bool {
        self.slot.lock().pending.is_some()
    }

    /// Boundary check: consume a pending abort and enter `Aborting`.
    pub fn take_abort(&self) -> Option<PendingAbort> {
        let mut slot = self.slot.lock();
        let pending = slot.pending.take()?;
        self.publish(
            &mut slot,
            ExecutionState::Aborting {
                reason: pending.reason.clone(),
            },
        );
        Some(pending)
    }

    /// Deliver an abort to a running mission. Only the first delivery per
    /// execution is accepted.
    pub fn request_abort(&self, reason: AbortReason) -> bool {
        let mut slot = self.slot.lock();
        if !slot.state.is_running() || slot.pending.is_some() {
            return false;
        }
        slot.pending = Some(PendingAbort {
            reason,
            emergency_sent: false,
        });
        self.abort_tx.send_replace(true);
        true
    }

    /// Deliver an abort and enter `Aborting` at once; the caller sends the
    /// emergency command and reports it through [`Control::emergency_done`].
    /// Same acceptance rule as [`Control::request_abort`].
    pub fn preempt(&self, reason: AbortReason) -> bool {
        let mut guard = self.slot.lock();
        let slot = &mut *guard;
        if !slot.state.is_running() || slot.pending.is_some() {
            return false;
        }
        slot.pending = Some(PendingAbort {
            reason: reason.clone(),
            emergency_sent: true,
        });
        self.emergencies.send_modify(|n| *n += 1);
        self.publish(slot, ExecutionState::Aborting { reason });
        self.abort_tx.send_replace(true);
        true
    }

    /// Force `Aborting` right away; the caller sends the emergency command.
    ///
    /// Returns false when no mission is executing.
    pub fn force_abort(&self, reason: AbortReason) -> bool {
        let mut guard = self.slot.lock();
        let slot = &mut *guard;
        match slot.state {
            ExecutionState::Running { .. } => {
                let reason = slot.pending.take().map(|p| p.reason).unwrap_or(reason);
                slot.pending = Some(PendingAbort {
                    reason: reason.clone(),
                    emergency_sent: true,
                });
                self.emergencies.send_modify(|n| *n += 1);
                self.publish(slot, ExecutionState::Aborting { reason });
                self.abort_tx.send_replace(true);
                true
            }
            ExecutionState::Aborting { .. } => {
                if let Some(pending) = slot.pending.as_mut() {
                    pending.emergency_sent = true;
                }
                self.emergencies.send_modify(|n| *n += 1);
                true
            }
            _ => false,
        }
    }

    pub fn emergency_done(&self) {
        self.emergencies.send_modify(|n| *n = n.saturating_sub(1));
    }

    /// Wait until every emergency command announced by `preempt` or
    /// `force_abort` has been answered or has failed.
    pub async fn emergencies_settled(&self) {
        let mut emergencies = self.emergencies.subscribe();
        while *emergencies.borrow_and_update() > 0 {
            if emergencies.changed().await.is_err() {
                return;
            }
        }
    }

    /// Record the terminal state, then return to `Idle`.
    pub fn finish(&self, terminal: ExecutionState) {
        let mut slot = self.slot.lock();
        slot.last_outcome = Some(terminal.clone());
        self.publish(&mut slot, terminal);
        slot.pending = None;
        self.abort_tx.send_replace(false);
        self.publish(&mut slot, ExecutionState::Idle);
    }

    /// Sleep for `duration`, returning early once an abort is pending.
    pub async fn wait_or_abort(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        let mut abort = self.abort_tx.subscribe();
        if *abort.borrow_and_update() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = abort_raised(&mut abort) => {}
        }
    }
}

async fn abort_raised(abort: &mut watch::Receiver<bool>) {
    while !*abort.borrow_and_update() {
        if abort.changed().await.is_err() {
            return;
        }
    }
}

/// Marks an announced emergency command as finished, also when the sending
/// future is dropped.
struct Announced<'a>(&'a Control);

impl Drop for Announced<'_> {
    fn drop(&mut self) {
        self.0.emergency_done();
    }
}

/// Cloneable handle through which other tasks interrupt the executor.
#[derive(Clone)]
pub struct AbortHandle {
    pub(crate) control: Arc<Control>,
    pub(crate) link: Arc<VehicleLink>,
    pub(crate) command_timeout: Duration,
}

impl AbortHandle {
    /// Ask the running mission to stop at its next waypoint boundary.
    ///
    /// Returns true when this call delivered the abort, false when no
    /// mission is running or an abort is already pending.
    pub fn request_abort(&self, reason: AbortReason) -> bool {
        let delivered = self.control.request_abort(reason.clone());
        if delivered {
            warn!(%reason, "abort requested");
        }
        delivered
    }

    pub fn is_abort_pending(&self) -> bool {
        self.control.is_abort_pending()
    }

    /// Deliver an abort and stop the vehicle without waiting for the
    /// boundary. `Ok(false)` when the abort was not delivered.
    pub async fn abort_immediately(&self, reason: AbortReason) -> Result<bool, LinkError> {
        if !self.control.preempt(reason.clone()) {
            return Ok(false);
        }
        warn!(%reason, "aborting immediately");
        let _announced = Announced(self.control.as_ref());
        self.send_emergency().await.map(|_| true)
    }

    /// Mark the mission as aborting and send the emergency command. The
    /// local state changes even when the vehicle does not acknowledge.
    pub async fn emergency_stop(&self) -> Result<(), LinkError> {
        let interrupted = self.control.force_abort(AbortReason::EmergencyStop);
        warn!(interrupted, "emergency stop");
        let _announced = interrupted.then(|| Announced(self.control.as_ref()));
        self.send_emergency().await
    }

    async fn send_emergency(&self) -> Result<(), LinkError> {
        let result = self
            .link
            .send_command(VehicleCommand::Emergency, self.command_timeout)
            .await
            .map(|_| ());
        if let Err(err) = &result {
            error!(error = %err, "vehicle did not acknowledge emergency stop");
        }
        result
    }
}

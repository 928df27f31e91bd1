use super::{SubscribedView, ViewState};
use crate::actuators::ActuatorController;
use crate::error::ControlError;
use crate::models::{ActuatorVector, ScheduleState, ACTUATOR_COUNT};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{info, warn};

/// Control surface: pump mirror with optimistic toggles, plus the schedule
///
/// The mirror is the actuator view's own data. A toggle flips one index
/// locally before writing; the next pushed vector replaces the whole mirror,
/// so the store always has the last word. A failed toggle made before any
/// push leaves the view without data again.
pub struct ControlHolder {
    controller: ActuatorController,
    actuators: SubscribedView<ActuatorVector>,
    schedule: SubscribedView<ScheduleState>,
    last_command_error: Mutex<Option<String>>,
}

impl ControlHolder {
    pub fn new(controller: ActuatorController) -> Self {
        let pumps = controller.clone();
        let actuators = SubscribedView::new("control.actuators", move || pumps.subscribe_actuator_vector());
        let planner = controller.clone();
        let schedule = SubscribedView::new("control.schedule", move || planner.subscribe_schedule());
        Self {
            controller,
            actuators,
            schedule,
            last_command_error: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ViewState<ActuatorVector> {
        self.actuators.state()
    }

    pub fn watch(&self) -> watch::Receiver<ViewState<ActuatorVector>> {
        self.actuators.watch()
    }

    /// Current mirror, all off before the first push
    pub fn mirror(&self) -> ActuatorVector {
        self.actuators.state().data.unwrap_or_default()
    }

    pub fn schedule_state(&self) -> ViewState<ScheduleState> {
        self.schedule.state()
    }

    pub fn watch_schedule(&self) -> watch::Receiver<ViewState<ScheduleState>> {
        self.schedule.watch()
    }

    pub fn refresh(&self) {
        self.actuators.refresh();
        self.schedule.refresh();
    }

    /// Message of the last failed command, cleared by the next successful one
    pub fn last_command_error(&self) -> Option<String> {
        self.last_command_error.lock().clone()
    }

    /// Flips pump `index` in the mirror, then writes it. Returns the requested state.
    pub async fn toggle(&self, index: usize) -> Result<bool, ControlError> {
        if index >= ACTUATOR_COUNT {
            return Err(ControlError::InvalidIndex(index));
        }

        let mut target = false;
        let mut flipped = None;
        self.actuators.modify(|state| {
            let had_data = state.data.is_some();
            let mut vector = state.data.unwrap_or_default();
            target = !vector.get(index).unwrap_or(false);
            vector.set(index, target);
            state.data = Some(vector);
            // remember the vector we made up when nothing had arrived yet
            flipped = (!had_data).then_some(vector);
            true
        });

        match self.controller.set_actuator(index, target).await {
            Ok(()) => {
                self.record(None);
                Ok(target)
            }
            Err(e) => {
                // only undo our own flip; a push that landed meanwhile stays
                self.actuators.modify(|state| {
                    if flipped.is_some() && state.data == flipped {
                        state.data = None;
                        return true;
                    }
                    match state.data.as_mut() {
                        Some(vector) if vector.get(index) == Some(target) => vector.set(index, !target),
                        _ => false,
                    }
                });
                self.record(Some(&e));
                Err(e)
            }
        }
    }

    pub async fn set_all(&self, on: bool) -> Result<(), ControlError> {
        let result = self.controller.set_all_actuators(on).await;
        self.record(result.as_ref().err());
        result
    }

    pub async fn send_schedule_command(&self, command: &str) -> Result<ScheduleState, ControlError> {
        let result = self.controller.send_schedule_command(command).await;
        self.record(result.as_ref().err());
        result
    }

    fn record(&self, error: Option<&ControlError>) {
        let mut last = self.last_command_error.lock();
        match error {
            Some(e) => {
                warn!("[control] {e}");
                *last = Some(e.to_string());
            }
            None => {
                if last.take().is_some() {
                    info!("[control] command error cleared");
                }
            }
        }
    }
}

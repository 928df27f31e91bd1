use super::{SubscribedView, ViewState};
use crate::aggregator::Aggregator;
use crate::health::TemperatureGrading;
use crate::models::DerivedStatus;
use tokio::sync::watch;

/// Monitoring surface: statuses with the banded temperature grading
pub struct MonitoringHolder {
    view: SubscribedView<Vec<DerivedStatus>>,
}

impl MonitoringHolder {
    pub fn new(aggregator: Aggregator) -> Self {
        let view = SubscribedView::new("monitoring", move || aggregator.subscribe_statuses(TemperatureGrading::Banded));
        Self { view }
    }

    pub fn state(&self) -> ViewState<Vec<DerivedStatus>> {
        self.view.state()
    }

    pub fn watch(&self) -> watch::Receiver<ViewState<Vec<DerivedStatus>>> {
        self.view.watch()
    }

    pub fn refresh(&self) {
        self.view.refresh();
    }
}

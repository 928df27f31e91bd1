use super::{SubscribedView, ViewState};
use crate::aggregator::Aggregator;
use crate::models::DerivedReading;
use tokio::sync::watch;

/// Overview surface: current readings in TDS, pH, Turbidity, Temperature order
pub struct OverviewHolder {
    aggregator: Aggregator,
    view: SubscribedView<Vec<DerivedReading>>,
}

impl OverviewHolder {
    pub fn new(aggregator: Aggregator) -> Self {
        let source = aggregator.clone();
        let view = SubscribedView::new("overview", move || source.subscribe_readings());
        Self { aggregator, view }
    }

    pub fn state(&self) -> ViewState<Vec<DerivedReading>> {
        self.view.state()
    }

    pub fn watch(&self) -> watch::Receiver<ViewState<Vec<DerivedReading>>> {
        self.view.watch()
    }

    pub fn refresh(&self) {
        self.view.refresh();
    }

    /// Live readings when available, otherwise the aggregator's cached or placeholder set
    pub fn readings_or_cached(&self) -> Vec<DerivedReading> {
        self.view.state().data.unwrap_or_else(|| self.aggregator.readings())
    }
}

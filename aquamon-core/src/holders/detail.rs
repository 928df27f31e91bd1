use super::{SubscribedView, ViewState};
use crate::aggregator::Aggregator;
use crate::models::TimedReading;
use tokio::sync::watch;

/// Detail surface: live history of one channel
pub struct DetailHolder {
    channel: String,
    aggregator: Aggregator,
    view: SubscribedView<Vec<TimedReading>>,
}

impl DetailHolder {
    /// `channel` is matched case-insensitively; an unknown name yields an empty history
    pub fn new(aggregator: Aggregator, channel: &str) -> Self {
        let source = aggregator.clone();
        let name = channel.to_string();
        let view = SubscribedView::new("detail", move || source.subscribe_history(&name));
        Self {
            channel: channel.to_string(),
            aggregator,
            view,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn state(&self) -> ViewState<Vec<TimedReading>> {
        self.view.state()
    }

    pub fn watch(&self) -> watch::Receiver<ViewState<Vec<TimedReading>>> {
        self.view.watch()
    }

    pub fn refresh(&self) {
        self.view.refresh();
    }

    /// Last 5 points from the aggregator cache, no subscription involved
    pub fn fallback(&self) -> Vec<TimedReading> {
        self.aggregator.cached_history(&self.channel)
    }
}

//! Aggregate type to topic routing.

use std::collections::HashMap;

use tally_shared::config::RelayConfig;

/// Picks the broker topic for an outbox row.
#[derive(Debug, Clone)]
pub struct TopicRouter {
    default_topic: String,
    routes: HashMap<String, String>,
}

impl TopicRouter {
    /// Creates a router that sends everything to `default_topic`.
    #[must_use]
    pub fn new(default_topic: impl Into<String>) -> Self {
        Self {
            default_topic: default_topic.into(),
            routes: HashMap::new(),
        }
    }

    /// Routes `aggregate_type` to `topic`. Matching ignores ASCII case.
    #[must_use]
    pub fn route(mut self, aggregate_type: &str, topic: impl Into<String>) -> Self {
        self.routes
            .insert(aggregate_type.to_ascii_lowercase(), topic.into());
        self
    }

    /// Builds a router from the relay configuration.
    #[must_use]
    pub fn from_config(config: &RelayConfig) -> Self {
        config
            .topics
            .iter()
            .fold(Self::new(config.default_topic.clone()), |router, (aggregate, topic)| {
                router.route(aggregate, topic.clone())
            })
    }

    /// Topic for `aggregate_type`.
    #[must_use]
    pub fn topic_for(&self, aggregate_type: &str) -> &str {
        self.routes
            .get(&aggregate_type.to_ascii_lowercase())
            .map_or(self.default_topic.as_str(), String::as_str)
    }
}

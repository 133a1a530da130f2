//! Exchanges route published topics into bound queues

use crate::error::BusError;
use crate::topic::{validate_topic, TopicPattern};
use serde::{Deserialize, Serialize};

/// How an exchange matches bindings against a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeStrategy {
    /// Wildcard patterns (`*`, `#`)
    Topic,
    /// Exact routing key
    Direct,
    /// Every bound queue, pattern ignored
    Fanout,
}

#[derive(Debug, Clone)]
enum BindingKey {
    Pattern(TopicPattern),
    Exact(String),
    Any,
}

#[derive(Debug, Clone)]
struct Binding {
    queue: String,
    key: BindingKey,
}

impl Binding {
    fn matches(&self, topic: &str) -> bool {
        match &self.key {
            BindingKey::Pattern(pattern) => pattern.matches(topic),
            BindingKey::Exact(key) => key == topic,
            BindingKey::Any => true,
        }
    }
}

#[derive(Debug)]
pub(crate) struct Exchange {
    name: String,
    strategy: ExchangeStrategy,
    bindings: Vec<Binding>,
}

impl Exchange {
    pub fn new(name: impl Into<String>, strategy: ExchangeStrategy) -> Self {
        Self {
            name: name.into(),
            strategy,
            bindings: Vec::new(),
        }
    }

    pub fn strategy(&self) -> ExchangeStrategy {
        self.strategy
    }

    pub fn bind(&mut self, queue: &str, pattern: &str) -> Result<(), BusError> {
        let key = match self.strategy {
            ExchangeStrategy::Topic => BindingKey::Pattern(TopicPattern::parse(pattern)?),
            ExchangeStrategy::Direct => {
                validate_topic(pattern).map_err(|_| BusError::InvalidPattern {
                    pattern: pattern.to_string(),
                    reason: format!("direct exchange '{}' needs a literal routing key", self.name),
                })?;
                BindingKey::Exact(pattern.to_string())
            }
            ExchangeStrategy::Fanout => BindingKey::Any,
        };
        self.bindings.push(Binding {
            queue: queue.to_string(),
            key,
        });
        Ok(())
    }

    /// Queues whose binding matches `topic`, possibly with repeats
    pub fn route<'a>(&'a self, topic: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.bindings
            .iter()
            .filter(move |binding| binding.matches(topic))
            .map(|binding| binding.queue.as_str())
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }
}

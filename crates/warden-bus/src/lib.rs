//! Warden Bus: In-process topic-routed message bus
//!
//! # Overview
//!
//! - **Messages** are immutable, carry a unique id and content hash, a priority
//!   (0 = most urgent) and a time-to-live
//! - **Exchanges** (topic, direct, fanout) route each publish into bound queues
//! - **Queues** hold messages in priority+FIFO order with an explicit overflow policy
//! - **Subscriptions** receive matching messages in registration order, each behind
//!   its own circuit breaker
//! - **Request/reply** correlates a reply with its request and enforces a deadline
//! - **Dead letters** keep everything that could not be delivered
//!
//! # Example
//!
//! ```no_run
//! use warden_bus::{BusConfig, Message, MessageBus, PublishOptions};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), warden_bus::BusError> {
//! let bus = MessageBus::new(BusConfig::default());
//!
//! bus.subscribe("security.*", |msg: Message| async move {
//!     println!("{} -> {}", msg.topic(), msg.payload());
//!     Ok::<(), warden_bus::HandlerError>(())
//! })?;
//!
//! let receipt = bus
//!     .publish("security.alert", json!({"door": "north"}), PublishOptions::default())
//!     .await?;
//! assert!(receipt.routed);
//! # Ok(())
//! # }
//! ```

pub mod bus;
pub mod config;
pub mod error;
pub mod exchange;
pub mod handler;
pub mod message;
pub mod queue;
pub mod topic;

pub use bus::{reply_topic, BusStats, MessageBus, PublishOptions, PublishReceipt};
pub use config::{BusConfig, DEFAULT_EXCHANGE};
pub use error::{BusError, HandlerError};
pub use exchange::ExchangeStrategy;
pub use handler::{MessageHandler, SubscriptionId};
pub use message::{Message, MessageBuilder, MessageKind};
pub use queue::{QueueHandle, QueueOptions, QueueStats};
pub use topic::{validate_topic, TopicPattern};

pub use warden_core_resilience::{DeadLetterEntry, FailureReason, OverflowPolicy};

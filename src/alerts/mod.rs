//! Alert model, log, dispatch pipeline and channel dispatchers

pub mod log;
pub mod model;
pub mod notifier;
pub mod pipeline;

pub use log::{AlertLog, SeverityCounts};
pub use model::{Alert, AlertBuilder, Channel, ParseError, Severity};
pub use notifier::{
    ChannelDispatcher, ChannelStatsSnapshot, Delivery, DeliveryStats, DispatchError, Dispatchers,
    EmailNotifier, WebhookNotifier, WebhookPayload,
};
pub use pipeline::{AlertPipeline, ChannelOutcome, DispatchReport};

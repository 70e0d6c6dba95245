//! Caching-strategy engine for cachewarden.
//!
//! This crate provides the request pipeline (strategy selection, the five
//! fetch strategies and the fallback chain), the version lifecycle, the
//! background sync queue, metrics and the admin command channel. Cache
//! storage lives in `cachewarden-core`.

pub mod admin;
pub mod engine;
pub mod fallback;
pub mod fetch;
pub mod metrics;
pub mod notify;
pub mod request;
pub mod strategy;
pub mod sync;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use admin::{AdminCommand, AdminHandle, ClearCacheReply, spawn_admin};
pub use engine::{Engine, Interception, LifecycleState};
pub use fallback::FallbackResolver;
pub use fetch::{FetchClient, FetchConfig, Network};
pub use metrics::{MetricKind, Metrics, MetricsSnapshot};
pub use notify::{ClickAction, LogNotifier, Notification, NotificationAction, Notifier};
pub use request::{Destination, RequestDescriptor};
pub use strategy::{ResponseSource, Served, Strategy, StrategySelector};
pub use sync::{BackgroundSyncQueue, PendingSyncTask, SyncOutcome, SyncReport};

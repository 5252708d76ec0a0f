//! Shared foundation for the clipwatch workspace.
//!
//! | module     | contents                                                   |
//! |------------|-------------------------------------------------------------|
//! | `types`    | wire/domain types shared across the monitor and detector    |
//! | `error`    | `ClipwatchError`, the common transient/permanent/fatal taxonomy |
//! | `config`   | `ClipwatchConfig`, figment-layered over `clipwatch.toml`     |
//! | `metrics`  | Prometheus counters and the shared `/metrics`+`/health` server |

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

pub use config::ClipwatchConfig;
pub use error::{ClipwatchError, Result};
pub use metrics::ClipwatchMetrics;
pub use types::{
    AnomalyEvent, ChatLine, ChatLineMetadata, ClipRecord, Credential, LifecycleEvent,
    LifecycleEventType, LiveRanking, PerChannelDetectorState, RankedChannel,
};

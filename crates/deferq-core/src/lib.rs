//! deferq-core
//!
//! Deferred-task batching queue: record "call this method on this owner with
//! these arguments" now, run everything at a later flush point.
//!
//! # モジュール構成
//! - **domain**: QueueId, Target / Method / Owner, DiagnosticContext
//! - **queue**: TaskQueue（pending storage, owner index, flush, cancel）
//! - **config**: GlobalOptions / QueueOptions / Settings (TOML)
//! - **driver**: QueueDriver（`!Send` なキューを専用スレッドで所有）
//! - **observability**: QueueStats / FlushStats
//! - **error**: TaskError / QueueError / ConfigError

pub mod config;
pub mod domain;
pub mod driver;
pub mod error;
pub mod observability;
pub mod queue;

pub use config::{GlobalOptions, QueueOptions, Settings};
pub use domain::{DiagnosticContext, Method, Owner, OwnerKey, QueueId, Target};
pub use driver::{QueueDriver, QueueSet};
pub use error::{ConfigError, QueueError, TaskError};
pub use observability::{FlushStats, QueueStats};
pub use queue::{CancelOutcome, ErrorHandler, TaskHandle, TaskQueue};

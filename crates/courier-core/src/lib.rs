//! courier-core
//!
//! Bounded work queue with a producer, a pool of retrying workers and a
//! metrics reporter, all stopped through one cancellation signal.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, item, outcome, decision, events）
//! - **queue**: 有界キュー（WorkQueue）、overflow policy、retry policy
//! - **ports**: 抽象化レイヤー（Sender, EventSink, ItemSource, Clock, IdGenerator）
//! - **app**: パイプライン本体（builder, producer, worker_loop, reporter）
//! - **impls**: 実装（TracingEventSink, MemoryEventSink, SimulatedSender など）
//! - **shutdown**: ShutdownCoordinator / CancelSignal
//! - **observability**: カウンタとスナップショット
//! - **config / error / logging**: 設定、エラー型、tracing の初期化

pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod logging;
pub mod observability;
pub mod ports;
pub mod queue;
pub mod shutdown;

pub use app::{BuildError, Pipeline, PipelineBuilder, PipelineHandle, PipelineReport};
pub use config::{ConfigError, PipelineConfig, PipelineConfigBuilder, ProducerConfig};
pub use domain::{SendOutcome, WorkItem, WorkItemId};
pub use error::CourierError;
pub use observability::{MetricsSnapshot, PipelineCounters};
pub use queue::{OverflowPolicy, RetryPolicy, WorkQueue};
pub use shutdown::{CancelSignal, ShutdownCoordinator};

//! App - アプリケーション層
//!
//! ports と queue を組み合わせてパイプラインを動かします。
//!
//! # 主要コンポーネント
//! - **PipelineBuilder / Pipeline**: ワイヤリングと起動・停止
//! - **Producer**: WorkItem の生成と投入、停止時の queue close
//! - **Worker / WorkerPool**: dequeue→send→decide→(retry | complete | give up)
//! - **MetricsReporter**: 定期スナップショットと final スナップショット

pub mod builder;
pub mod pipeline;
pub mod producer;
pub mod reporter;
pub mod worker_loop;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, PipelineBuilder};
pub use self::pipeline::{Pipeline, PipelineHandle, PipelineReport};
pub use self::producer::{Producer, ProducerReport, ProducerStop};
pub use self::reporter::MetricsReporter;
pub use self::worker_loop::{Worker, WorkerContext, WorkerExit, WorkerPool, WorkerReport};

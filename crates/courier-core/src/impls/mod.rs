//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **TracingEventSink**: イベントを tracing に流す（デフォルト）
//! - **MemoryEventSink / NoopEventSink**: テスト・組み込み用
//! - **SimulatedSender**: 開発用の送信先（遅延・失敗率つき）
//! - **SyntheticSource**: デモ用の payload 生成器

pub mod memory_sink;
pub mod simulated_sender;
pub mod synthetic_source;
pub mod tracing_sink;

pub use self::memory_sink::{MemoryEventSink, NoopEventSink};
pub use self::simulated_sender::SimulatedSender;
pub use self::synthetic_source::SyntheticSource;
pub use self::tracing_sink::TracingEventSink;

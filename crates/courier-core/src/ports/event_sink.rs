//! EventSink port - イベント出力の抽象化
//!
//! 実装は `impls` にあります（tracing, memory, noop）。

use crate::domain::PipelineEvent;

/// EventSink はパイプラインイベントを受け取る
///
/// 呼び出しは worker / producer / reporter のホットパス上で同期的に行われるので、
/// 実装はブロックしないこと。
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &PipelineEvent);
}

//! PipelineBuilder - パイプラインの構築とワイヤリング
//!
//! # ポイント
//! - 必須の協力者（Sender, ItemSource）は build() 時にチェック（Fail-fast）
//! - 任意のもの（EventSink, Clock, IdGenerator, Decider）はデフォルトを補う
//! - config は検証済みの `PipelineConfig` しか受け取らない

use std::sync::Arc;

use crate::app::pipeline::Pipeline;
use crate::config::PipelineConfig;
use crate::domain::{Decider, DefaultDecider};
use crate::impls::TracingEventSink;
use crate::ports::{Clock, EventSink, IdGenerator, ItemSource, Sender, SystemClock, UlidGenerator};

/// PipelineBuilder はパイプラインを構築
///
/// # 使用例
/// ```ignore
/// let pipeline = PipelineBuilder::new(config)
///     .sender(SimulatedSender::new(0.1))
///     .source(SyntheticSource::unbounded())
///     .build()?;
/// let handle = pipeline.start();
/// ```
pub struct PipelineBuilder {
    config: PipelineConfig,
    sender: Option<Arc<dyn Sender>>,
    source: Option<Box<dyn ItemSource>>,
    sink: Option<Arc<dyn EventSink>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    decider: Option<Arc<dyn Decider>>,
}

/// BuildError はパイプライン構築時のエラー
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("no sender configured; call PipelineBuilder::sender before build")]
    MissingSender,

    #[error("no item source configured; call PipelineBuilder::source before build")]
    MissingSource,
}

impl PipelineBuilder {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            sender: None,
            source: None,
            sink: None,
            clock: None,
            ids: None,
            decider: None,
        }
    }

    pub fn sender(self, sender: impl Sender + 'static) -> Self {
        self.shared_sender(Arc::new(sender))
    }

    /// Use a sender that the caller keeps a handle to.
    pub fn shared_sender(mut self, sender: Arc<dyn Sender>) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn source(mut self, source: impl ItemSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Defaults to [`TracingEventSink`].
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Defaults to a [`UlidGenerator`] over the pipeline clock.
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Defaults to [`DefaultDecider`] over the configured retry policy.
    pub fn decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn build(self) -> Result<Pipeline, BuildError> {
        let sender = self.sender.ok_or(BuildError::MissingSender)?;
        let source = self.source.ok_or(BuildError::MissingSource)?;

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let ids = self.ids.unwrap_or_else(|| {
            Arc::new(UlidGenerator::new(Arc::clone(&clock))) as Arc<dyn IdGenerator>
        });
        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(TracingEventSink) as Arc<dyn EventSink>);
        let decider: Arc<dyn Decider> = match self.decider {
            Some(decider) => decider,
            None => Arc::new(DefaultDecider::new(self.config.retry_policy().clone())),
        };

        Ok(Pipeline {
            config: self.config,
            sender,
            source,
            sink,
            clock,
            ids,
            decider,
        })
    }
}

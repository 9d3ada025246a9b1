//! Ports - 抽象化レイヤー
//!
//! パイプラインの外側にある協力者（送信先、イベント出力先、時刻、ID、payload 供給元）
//! への境界を trait として定義します。

pub mod clock;
pub mod event_sink;
pub mod id_generator;
pub mod sender;
pub mod source;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::EventSink;
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::sender::Sender;
pub use self::source::{ItemSource, NewItem};

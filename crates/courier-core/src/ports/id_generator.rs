//! IdGenerator port - ID 生成の抽象化
//!
//! テスト容易性のために trait として抽象化しています。

use ulid::Ulid;

use crate::domain::{BatchId, WorkItemId};
use crate::ports::Clock;

/// IdGenerator は producer が使う ID を生成
///
/// `Send + Sync` を要求（producer task から使う）
pub trait IdGenerator: Send + Sync {
    fn generate_item_id(&self) -> WorkItemId;

    fn generate_batch_id(&self) -> BatchId;
}

/// UlidGenerator は Clock の時刻を timestamp 部分に使う ULID 生成器
///
/// FixedClock と組み合わせると timestamp 部分が決定的になります。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = u64::try_from(self.clock.now().timestamp_millis()).unwrap_or(0);
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_item_id(&self) -> WorkItemId {
        WorkItemId::from(self.next_ulid())
    }

    fn generate_batch_id(&self) -> BatchId {
        BatchId::from(self.next_ulid())
    }
}

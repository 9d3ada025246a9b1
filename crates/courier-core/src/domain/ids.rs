//! Domain identifiers (strongly-typed IDs).
//!
//! # ULID ベースの ID + Phantom type
//! ID は ULID を内部に持ち、`Id<T>` の `T` はマーカー型として
//! コンパイル時にだけ使われます（PhantomData）。
//!
//! - **時刻でソート可能**: 生成順に並ぶので、ログ上で投入順を追いやすい
//! - **調整不要**: producer が単独で採番できる
//! - **型安全**: `WorkItemId` と `BatchId` は混同できない

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"item-", "batch-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    /// 新しいランダム ID（現在時刻ベース）
    pub fn generate() -> Self {
        Self::from_ulid(Ulid::new())
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// WorkItem のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Item {}

impl IdMarker for Item {
    fn prefix() -> &'static str {
        "item-"
    }
}

/// Producer batch のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Batch {}

impl IdMarker for Batch {
    fn prefix() -> &'static str {
        "batch-"
    }
}

/// Identifier of a single unit of work.
pub type WorkItemId = Id<Item>;

/// Identifier of one producer batch (informational, carried on items and events).
pub type BatchId = Id<Batch>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_render_with_their_prefix() {
        let item = WorkItemId::from_ulid(Ulid::new());
        let batch = BatchId::from_ulid(Ulid::new());

        assert!(item.to_string().starts_with("item-"));
        assert!(batch.to_string().starts_with("batch-"));

        // let _: WorkItemId = batch; // <- does not compile
    }

    #[test]
    fn ulid_ids_are_sortable() {
        let id1 = WorkItemId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = WorkItemId::generate();

        assert!(id1 < id2);
    }

    #[test]
    fn ulid_ids_can_be_serialized() {
        let id = WorkItemId::generate();

        let serialized = serde_json::to_string(&id).unwrap();
        let deserialized: WorkItemId = serde_json::from_str(&serialized).unwrap();

        assert_eq!(id, deserialized);
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<WorkItemId>(), size_of::<Ulid>());
        assert_eq!(size_of::<BatchId>(), 16);
    }
}

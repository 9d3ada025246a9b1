//! ItemSource port - producer が生成する payload の供給元

/// Payload and informational priority for one new item.
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub payload: serde_json::Value,
    pub priority: i32,
}

impl NewItem {
    pub fn new(payload: serde_json::Value) -> Self {
        Self { payload, priority: 0 }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// ItemSource は producer に payload を渡す
///
/// `None` を返すと供給終了。producer はそこで生成をやめて queue を close する。
pub trait ItemSource: Send {
    fn next_item(&mut self, sequence: u64) -> Option<NewItem>;
}

/// Any `FnMut(u64) -> Option<NewItem>` closure is a source.
impl<F> ItemSource for F
where
    F: FnMut(u64) -> Option<NewItem> + Send,
{
    fn next_item(&mut self, sequence: u64) -> Option<NewItem> {
        self(sequence)
    }
}

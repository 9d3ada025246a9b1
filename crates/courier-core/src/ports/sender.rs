//! Sender port - 外部への送信（メール送信、HTTP 呼び出しなど）
//!
//! core が要求するのは「複数 worker から同時に呼べること」と
//! 「有限時間で返ること」だけです。

use async_trait::async_trait;

use crate::domain::{SendOutcome, WorkItem};
use crate::error::CourierError;

/// Sender は WorkItem の payload を外部に届ける
///
/// - `Ok(SendOutcome::Delivered)`: 成功
/// - `Ok(SendOutcome::TransientFailure { .. })`: リトライ対象
/// - `Err(_)`: 想定外のエラー。呼び出した worker だけが停止する
#[async_trait]
pub trait Sender: Send + Sync {
    async fn send(&self, item: &WorkItem) -> Result<SendOutcome, CourierError>;
}

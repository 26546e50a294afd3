//! 未完成调用的一次性句柄

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::{AbortHandle, JoinHandle};

use super::error::NodeError;
use super::types::NumericVector;

/// 一次远程调用的结果句柄
///
/// 只能被等待一次（`await` 会消费句柄），解析为数值向量或 `NodeError`。
/// 丢弃句柄不会取消调用，需要取消时使用 [`PendingResult::abort_handle`]
#[derive(Debug)]
#[must_use = "a pending result does nothing unless awaited"]
pub struct PendingResult {
    handle: JoinHandle<Result<NumericVector, NodeError>>,
}

impl PendingResult {
    pub(crate) fn new(handle: JoinHandle<Result<NumericVector, NodeError>>) -> Self {
        Self { handle }
    }

    /// 调用是否已结束（不消费句柄）
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// 获取用于取消调用的句柄
    pub fn abort_handle(&self) -> AbortHandle {
        self.handle.abort_handle()
    }
}

impl Future for PendingResult {
    type Output = Result<NumericVector, NodeError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|joined| match joined {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(NodeError::Aborted {
                message: "invocation was cancelled".to_string(),
            }),
            Err(e) => Err(NodeError::Aborted {
                message: format!("invocation task panicked: {}", e),
            }),
        })
    }
}

//! 远程计算节点
//!
//! 每个节点对应一个worker的网络端点。每次调用打开一个独立的TCP连接，
//! 在独立的tokio任务中完成请求，调用方立即拿到 [`PendingResult`]

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::error::NodeError;
use super::pending::PendingResult;
use super::protocol::{self, DEFAULT_SERVICE_PORT};
use super::types::{NumericVector, Operation};

/// 远程计算节点：身份 + RPC客户端
///
/// 构造后不可变。默认构造的节点永久无效，不能向其分发任务
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeNode {
    host: String,
    port: u16,
    valid: bool,
}

impl ComputeNode {
    /// 绑定到 `host` 固定服务端口的有效节点
    pub fn new(host: impl Into<String>) -> Self {
        Self::with_port(host, DEFAULT_SERVICE_PORT)
    }

    /// 绑定到 `host:port` 的有效节点
    pub fn with_port(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            valid: true,
        }
    }

    /// 无效节点
    pub fn invalid() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_SERVICE_PORT,
            valid: false,
        }
    }

    /// 节点标识（主机名）
    pub fn name(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// 发起一次远程调用
    ///
    /// 无效节点立即返回 `InvalidNode`；否则在新的tokio任务中执行请求，
    /// 不阻塞调用方。必须在tokio运行时内调用
    pub fn invoke(&self, operation: Operation, values: NumericVector) -> Result<PendingResult, NodeError> {
        self.invoke_with_timeout(operation, values, None)
    }

    /// 同 [`ComputeNode::invoke`]，可选地为本次调用设置期限
    pub fn invoke_with_timeout(
        &self,
        operation: Operation,
        values: NumericVector,
        deadline: Option<Duration>,
    ) -> Result<PendingResult, NodeError> {
        if !self.valid {
            return Err(NodeError::InvalidNode {
                node: self.host.clone(),
            });
        }

        let host = self.host.clone();
        let port = self.port;
        let handle = tokio::spawn(async move {
            let request = send_request(&host, port, operation.path(), &values);
            match deadline {
                Some(limit) => tokio::time::timeout(limit, request)
                    .await
                    .unwrap_or_else(|_| {
                        Err(NodeError::Timeout {
                            millis: limit.as_millis() as u64,
                        })
                    }),
                None => request.await,
            }
        });

        tracing::debug!(node = %self.host, port = self.port, %operation, "Invocation dispatched");
        Ok(PendingResult::new(handle))
    }

    /// 远程求和
    pub fn sum(&self, values: NumericVector) -> Result<PendingResult, NodeError> {
        self.invoke(Operation::Sum, values)
    }

    /// 远程成对相乘，`values` 为交错排列的两个向量
    pub fn multiply_pairs(&self, values: NumericVector) -> Result<PendingResult, NodeError> {
        self.invoke(Operation::Multiply, values)
    }
}

impl Default for ComputeNode {
    fn default() -> Self {
        Self::invalid()
    }
}

impl fmt::Display for ComputeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.valid {
            write!(f, "{}:{}", self.host, self.port)
        } else {
            f.write_str("<invalid>")
        }
    }
}

/// 执行一次完整的请求/响应交换
async fn send_request(host: &str, port: u16, path: &str, values: &[f64]) -> Result<NumericVector, NodeError> {
    let body = protocol::encode_body(values)?;
    let request = protocol::build_request(host, path, &body);

    let connection_error = |e: std::io::Error| NodeError::Connection {
        host: host.to_string(),
        port,
        message: e.to_string(),
    };

    let mut stream = TcpStream::connect((host, port)).await.map_err(connection_error)?;
    stream.write_all(request.as_bytes()).await.map_err(connection_error)?;
    stream.flush().await.map_err(connection_error)?;

    // Connection: close，读到EOF即为完整响应
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.map_err(connection_error)?;

    tracing::trace!(host, port, path, bytes = response.len(), "Response received");
    protocol::parse_response(&response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_construction() {
        let node = ComputeNode::new("10.0.0.1");
        assert!(node.is_valid());
        assert_eq!(node.name(), "10.0.0.1");
        assert_eq!(node.port(), 8080);
        assert_eq!(node.to_string(), "10.0.0.1:8080");

        let invalid = ComputeNode::default();
        assert!(!invalid.is_valid());
        assert_eq!(invalid.name(), "");
        assert_eq!(invalid, ComputeNode::invalid());
    }

    #[tokio::test]
    async fn test_invoke_on_invalid_node_fails_fast() {
        let node = ComputeNode::invalid();
        let result = node.sum(vec![1.0, 2.0]);
        assert!(matches!(result, Err(NodeError::InvalidNode { .. })));
    }

    #[tokio::test]
    async fn test_connection_refused_resolves_as_connection_error() {
        // 先绑定再释放，得到一个当前没有监听者的端口
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let node = ComputeNode::with_port("127.0.0.1", port);
        let result = node.sum(vec![1.0]).unwrap().await;
        assert!(matches!(result, Err(NodeError::Connection { port: p, .. }) if p == port));
    }

    #[tokio::test]
    async fn test_non_finite_payload_is_protocol_error() {
        let node = ComputeNode::with_port("127.0.0.1", 1);
        let result = node.sum(vec![f64::NAN]).unwrap().await;
        assert!(matches!(result, Err(NodeError::Protocol { .. })));
    }
}

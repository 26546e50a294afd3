//! 集成测试公共工具
//!
//! 每个假worker拥有独立的tokio运行时，测试线程本身不进入运行时，
//! 因此可以直接调用阻塞的 `exec()`

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::oneshot;

use matrix_dispatch_core::api::{serve, AppState};
use matrix_dispatch_core::ComputeNode;

/// 根据请求路径与报文体生成完整的原始响应
pub type Responder = Arc<dyn Fn(&str, &[f64]) -> String + Send + Sync>;

/// 一个收到的请求
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub path: String,
    pub raw: String,
    pub values: Vec<f64>,
}

pub fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

/// 200响应，报文体为JSON数组
pub fn ok_response(values: &[f64]) -> String {
    let body = serde_json::to_string(values).unwrap();
    raw_response("HTTP/1.0 200 OK", &body)
}

pub fn status_response(code: u16, body: &str) -> String {
    raw_response(&format!("HTTP/1.0 {} Error", code), body)
}

pub fn raw_response(status_line: &str, body: &str) -> String {
    format!(
        "{}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        status_line,
        body.len(),
        body
    )
}

/// 正确实现 `/sum` 与 `/multiply` 的响应器
pub fn computing() -> Responder {
    Arc::new(|path: &str, values: &[f64]| match path {
        "/sum" => ok_response(&[values.iter().sum::<f64>()]),
        "/multiply" => {
            let products: Vec<f64> = values.chunks_exact(2).map(|p| p[0] * p[1]).collect();
            ok_response(&products)
        }
        other => status_response(404, &format!("no route {}", other)),
    })
}

/// 对任何请求返回同一原始响应
pub fn canned(response: impl Into<String>) -> Responder {
    let response = response.into();
    Arc::new(move |_: &str, _: &[f64]| response.clone())
}

/// 基于原始TCP的假worker
pub struct FakeWorker {
    pub node: ComputeNode,
    requests: Arc<Mutex<Vec<ReceivedRequest>>>,
    connections: Arc<AtomicUsize>,
    runtime: Runtime,
}

impl FakeWorker {
    pub fn start(responder: Responder) -> Self {
        Self::start_with_delay(responder, Duration::ZERO)
    }

    /// 每个响应写出前先等待 `delay`
    pub fn start_with_delay(responder: Responder, delay: Duration) -> Self {
        let runtime = runtime();
        let listener = runtime.block_on(TcpListener::bind("127.0.0.1:0")).unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let accepted = Arc::clone(&requests);
        let counter = Arc::clone(&connections);
        runtime.spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let responder = Arc::clone(&responder);
                let requests = Arc::clone(&accepted);
                tokio::spawn(async move {
                    let _ = handle(stream, responder, requests, delay).await;
                });
            }
        });

        Self {
            node: ComputeNode::with_port("127.0.0.1", port),
            requests,
            connections,
            runtime,
        }
    }

    pub fn requests(&self) -> Vec<ReceivedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn block_on<F: std::future::Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

async fn handle(
    mut stream: TcpStream,
    responder: Responder,
    requests: Arc<Mutex<Vec<ReceivedRequest>>>,
    delay: Duration,
) -> std::io::Result<()> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let (head_end, body_len) = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(end) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buffer[..end]).to_string();
            break (end + 4, content_length(&head));
        }
    };
    while buffer.len() < head_end + body_len {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }

    let raw = String::from_utf8_lossy(&buffer).to_string();
    let path = raw.split_whitespace().nth(1).unwrap_or_default().to_string();
    let body = String::from_utf8_lossy(&buffer[head_end..]).to_string();
    let values: Vec<f64> = serde_json::from_str(&body).unwrap_or_default();
    requests.lock().unwrap().push(ReceivedRequest {
        path: path.clone(),
        raw,
        values: values.clone(),
    });

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    let response = responder(&path, &values);
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

/// 运行在独立运行时上的axum参考worker
pub struct ReferenceWorker {
    pub node: ComputeNode,
    pub state: AppState,
    stop: Option<oneshot::Sender<()>>,
    runtime: Runtime,
}

impl ReferenceWorker {
    pub fn start() -> Self {
        let runtime = runtime();
        let listener = runtime.block_on(TcpListener::bind("127.0.0.1:0")).unwrap();
        let port = listener.local_addr().unwrap().port();
        let state = AppState::default();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        runtime.spawn(serve(listener, state.clone(), async move {
            let _ = stop_rx.await;
        }));

        Self {
            node: ComputeNode::with_port("127.0.0.1", port),
            state,
            stop: Some(stop_tx),
            runtime,
        }
    }
}

impl Drop for ReferenceWorker {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

/// 未被监听的本地端口
pub fn closed_port_node() -> ComputeNode {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    ComputeNode::with_port("127.0.0.1", port)
}

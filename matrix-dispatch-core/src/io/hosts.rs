//! 主机列表
//!
//! JSON字符串数组，例如 `["10.0.0.1", "10.0.0.2:9000", ""]`。
//! 省略端口时使用默认服务端口，空字符串表示无效节点。
//! IPv6地址带端口时写作 `[addr]:port`

use std::fs;
use std::path::Path;

use crate::core::error::{DispatchError, Result};
use crate::core::node::ComputeNode;

/// 从文件加载节点列表
pub fn load_hosts<P: AsRef<Path>>(path: P, default_port: u16) -> Result<Vec<ComputeNode>> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| DispatchError::Io {
        message: e.to_string(),
        path: Some(path.display().to_string()),
    })?;
    let nodes = parse_hosts(&text, default_port)?;
    tracing::info!(
        path = %path.display(),
        total = nodes.len(),
        valid = nodes.iter().filter(|n| n.is_valid()).count(),
        "Host list loaded"
    );
    Ok(nodes)
}

/// 解析主机列表JSON
pub fn parse_hosts(json: &str, default_port: u16) -> Result<Vec<ComputeNode>> {
    let entries: Vec<String> = serde_json::from_str(json)?;
    entries.iter().map(|entry| parse_entry(entry, default_port)).collect()
}

fn parse_entry(entry: &str, default_port: u16) -> Result<ComputeNode> {
    let entry = entry.trim();
    if entry.is_empty() {
        return Ok(ComputeNode::invalid());
    }

    // IPv6: `[addr]` 或 `[addr]:port`
    if let Some(rest) = entry.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(|| DispatchError::Config {
            message: format!("host entry '{}' has an unclosed '['", entry),
        })?;
        if host.is_empty() {
            return Err(DispatchError::Config {
                message: format!("host entry '{}' has no host name", entry),
            });
        }
        return match tail {
            "" => Ok(ComputeNode::with_port(host, default_port)),
            _ => match tail.strip_prefix(':') {
                Some(port) => Ok(ComputeNode::with_port(host, parse_port(entry, port)?)),
                None => Err(DispatchError::Config {
                    message: format!("unexpected '{}' after ']' in host entry '{}'", tail, entry),
                }),
            },
        };
    }

    match entry.split_once(':') {
        // 不带方括号的IPv6地址，使用默认端口
        Some((_, rest)) if rest.contains(':') => Ok(ComputeNode::with_port(entry, default_port)),
        Some(("", _)) => Err(DispatchError::Config {
            message: format!("host entry '{}' has no host name", entry),
        }),
        Some((host, port)) => Ok(ComputeNode::with_port(host, parse_port(entry, port)?)),
        None => Ok(ComputeNode::with_port(entry, default_port)),
    }
}

fn parse_port(entry: &str, port: &str) -> Result<u16> {
    port.parse::<u16>().map_err(|e| DispatchError::Config {
        message: format!("invalid port in host entry '{}': {}", entry, e),
    })
}

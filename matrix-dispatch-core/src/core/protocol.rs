//! 节点RPC线上协议
//!
//! HTTP/1.0 POST + JSON数组请求体；响应读到对端关闭连接为止
//! （依赖 `Connection: close` 分帧，而不是 `Content-Length`）

use super::error::NodeError;
use super::types::NumericVector;

/// 节点服务的固定端口
pub const DEFAULT_SERVICE_PORT: u16 = 8080;

/// 报头与报文体之间的空行分隔符
const HEADER_SEPARATOR: &[u8] = b"\r\n\r\n";

/// 将数值向量编码为JSON数组，如 `[1, 2.5, -3]`
///
/// 数字使用与区域设置无关的最短十进制表示。NaN与无穷大无法用JSON表示
pub fn encode_body(values: &[f64]) -> Result<String, NodeError> {
    let mut rendered = Vec::with_capacity(values.len());
    for (index, value) in values.iter().enumerate() {
        if !value.is_finite() {
            return Err(NodeError::protocol(format!(
                "value {} at position {} cannot be encoded as JSON",
                value, index
            )));
        }
        rendered.push(value.to_string());
    }
    Ok(format!("[{}]", rendered.join(", ")))
}

/// 构造完整的请求报文
pub fn build_request(host: &str, path: &str, body: &str) -> String {
    // IPv6字面量在Host头中需要方括号
    let host = if host.contains(':') {
        format!("[{}]", host)
    } else {
        host.to_string()
    };
    format!(
        "POST {path} HTTP/1.0\r\n\
         Host: {host}\r\n\
         Accept: application/json\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {len}\r\n\
         Connection: close\r\n\r\n\
         {body}",
        path = path,
        host = host,
        len = body.len(),
        body = body,
    )
}

/// 解析完整的响应报文
///
/// 在第一个空行处拆分报头与报文体；状态行必须以 `HTTP/` 开头；
/// 非200状态码返回 `Remote`，报文体作为诊断信息；
/// 报文体必须是元素全部为数字的JSON数组
pub fn parse_response(raw: &[u8]) -> Result<NumericVector, NodeError> {
    let split = raw
        .windows(HEADER_SEPARATOR.len())
        .position(|window| window == HEADER_SEPARATOR)
        .ok_or_else(|| NodeError::protocol("response has no header/body separator"))?;
    let (head, body) = (&raw[..split], &raw[split + HEADER_SEPARATOR.len()..]);

    let head = std::str::from_utf8(head)
        .map_err(|_| NodeError::protocol("response headers are not valid UTF-8"))?;
    let status_line = head.lines().next().unwrap_or_default();
    let status_code = parse_status_line(status_line)?;

    if status_code != 200 {
        return Err(NodeError::Remote {
            status_code,
            body: String::from_utf8_lossy(body).trim().to_string(),
        });
    }

    let body = std::str::from_utf8(body)
        .map_err(|_| NodeError::protocol("response body is not valid UTF-8"))?;
    parse_body(body)
}

fn parse_status_line(line: &str) -> Result<u16, NodeError> {
    let mut parts = line.split_whitespace();
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(NodeError::protocol(format!("invalid status line '{}'", line)));
    }
    parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or_else(|| NodeError::protocol(format!("invalid status code in '{}'", line)))
}

/// 解析JSON数组报文体，任一元素非数字即失败
pub fn parse_body(body: &str) -> Result<NumericVector, NodeError> {
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| NodeError::protocol(format!("response body is not JSON: {}", e)))?;

    let items = value
        .as_array()
        .ok_or_else(|| NodeError::protocol("response body is not a JSON array"))?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            item.as_f64().ok_or_else(|| {
                NodeError::protocol(format!("element {} is not numeric: {}", index, item))
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_body() {
        assert_eq!(encode_body(&[1.0, 2.0, 3.0]).unwrap(), "[1, 2, 3]");
        assert_eq!(encode_body(&[0.5, -2.0]).unwrap(), "[0.5, -2]");
        assert_eq!(encode_body(&[]).unwrap(), "[]");
        assert!(matches!(encode_body(&[f64::NAN]), Err(NodeError::Protocol { .. })));
        assert!(encode_body(&[1.0, f64::INFINITY]).is_err());
    }

    #[test]
    fn test_build_request_framing() {
        let request = build_request("10.0.0.7", "/sum", "[1, 2, 3]");
        assert_eq!(
            request,
            "POST /sum HTTP/1.0\r\n\
             Host: 10.0.0.7\r\n\
             Accept: application/json\r\n\
             Content-Type: application/json\r\n\
             Content-Length: 9\r\n\
             Connection: close\r\n\r\n\
             [1, 2, 3]"
        );
    }

    #[test]
    fn test_build_request_brackets_ipv6_host() {
        let request = build_request("::1", "/multiply", "[]");
        assert!(request.contains("\r\nHost: [::1]\r\n"));
    }

    #[test]
    fn test_parse_ok_response() {
        let raw = b"HTTP/1.0 200 OK\r\nContent-Type: application/json\r\n\r\n[6]";
        assert_eq!(parse_response(raw).unwrap(), vec![6.0]);

        let raw = b"HTTP/1.1 200 OK\r\n\r\n[1.5, -2, 3e2]\n";
        assert_eq!(parse_response(raw).unwrap(), vec![1.5, -2.0, 300.0]);
    }

    #[test]
    fn test_parse_remote_error_keeps_body() {
        let raw = b"HTTP/1.0 500 Internal Server Error\r\n\r\nworker exploded";
        assert_eq!(
            parse_response(raw),
            Err(NodeError::Remote {
                status_code: 500,
                body: "worker exploded".to_string()
            })
        );
    }

    #[test]
    fn test_parse_malformed_responses() {
        let cases: [&[u8]; 7] = [
            b"HTTP/1.0 200 OK\r\nno separator",
            b"SMTP/1.0 200 OK\r\n\r\n[1]",
            b"HTTP/1.0 abc OK\r\n\r\n[1]",
            b"HTTP/1.0 200 OK\r\n\r\n{\"sum\": 1}",
            b"HTTP/1.0 200 OK\r\n\r\n[1, \"two\", 3]",
            b"HTTP/1.0 200 OK\r\n\r\n[1, 2",
            b"",
        ];
        for raw in cases {
            assert!(
                matches!(parse_response(raw), Err(NodeError::Protocol { .. })),
                "expected protocol error for {:?}",
                String::from_utf8_lossy(raw)
            );
        }
    }

    #[test]
    fn test_parse_empty_array() {
        let raw = b"HTTP/1.0 200 OK\r\n\r\n[]";
        assert_eq!(parse_response(raw).unwrap(), Vec::<f64>::new());
    }
}

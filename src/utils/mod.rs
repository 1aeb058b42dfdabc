use std::net::SocketAddr;

use axum::{body::Body, extract::ConnectInfo, http::Request};

/// 客户端地址。
///
/// `trusted_hops` 为 0 时只用连接地址，请求头全部忽略；
/// 为 N 时取 `X-Forwarded-For` 从右数第 N 项，即最外层可信代理看到的地址。
/// 左侧的条目由客户端自己填写，不能用作限流键。
pub fn client_ip(req: &Request<Body>, trusted_hops: usize) -> String {
    let remote_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());

    let forwarded = if trusted_hops == 0 {
        None
    } else {
        forwarded_client(req, trusted_hops)
    };

    let ip = forwarded
        .or(remote_ip)
        .unwrap_or_else(|| "unknown".to_string());
    tracing::trace!(ip = %ip, "resolved client ip");
    ip
}

fn forwarded_client(req: &Request<Body>, trusted_hops: usize) -> Option<String> {
    // 多个 X-Forwarded-For 头按顺序拼接
    let entries: Vec<&str> = req
        .headers()
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|s| s.split(','))
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .collect();

    // 条目比可信跳数少，说明请求没有经过全部代理
    if entries.len() < trusted_hops {
        return None;
    }
    Some(entries[entries.len() - trusted_hops].to_string())
}

/// 文件名只保留字母、数字、点、横线和下划线
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(100)
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

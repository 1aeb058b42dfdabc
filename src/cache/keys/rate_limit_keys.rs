pub const RATE_LIMIT_PREFIX: &str = "rate_limit";

// 限流键：rate_limit:{策略名}:{客户端}
pub fn rate_limit_key(policy: &str, client: &str) -> String {
    format!("{}:{}:{}", RATE_LIMIT_PREFIX, policy, client)
}

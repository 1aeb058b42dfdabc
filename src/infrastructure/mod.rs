// 外部服务接入：身份提供方和对象存储
pub mod auth;
pub mod identity;
pub mod jwt;
pub mod storage;

pub use auth::SupabaseAuthVerifier;
pub use identity::{TokenVerifier, VerifiedUser, VerifyError};
pub use jwt::JwtVerifier;
pub use storage::SupabaseStorage;

use serde::{Deserialize, Serialize};

use crate::infrastructure::VerifiedUser;

#[derive(Debug, Serialize, Deserialize)]
pub struct MeResponse {
    pub user: VerifiedUser,
}

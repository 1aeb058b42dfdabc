mod handler;
mod model;

pub use handler::{bucket_info, create_upload_url};
pub use model::{UploadUrlRequest, UploadUrlResponse};

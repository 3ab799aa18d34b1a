pub const DEFAULT_TARGET_FPS: u32 = 30;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;

/// Matches the browser canvas `toDataURL("image/jpeg")` default of 0.92.
pub const DEFAULT_JPEG_QUALITY: u8 = 92;

pub const DEFAULT_SERVICE_URL: &str = "http://localhost:8000";
pub const SEARCH_ENDPOINT: &str = "/api/v1/web/users/search";
pub const UPLOAD_FIELD_NAME: &str = "image_path";
pub const UPLOAD_FILE_NAME: &str = "frame.jpg";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

pub const UNKNOWN_LABEL: &str = "Unknown";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

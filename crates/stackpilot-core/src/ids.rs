//! Stack identifiers.
//!
//! A stack id is `{YYYYmmddHHMMSS}-{8 hex}`: sortable by creation time and
//! unique thanks to the random suffix. The id doubles as the stack's
//! on-disk namespace, so anything that reaches the filesystem must pass
//! [`is_valid_stack_id`].

use chrono::Utc;
use uuid::Uuid;

pub fn new_stack_id() -> String {
    let ts = Utc::now().format("%Y%m%d%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{ts}-{}", &suffix[..8])
}

/// Whether `id` is safe to use as a directory name under the work root.
pub fn is_valid_stack_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

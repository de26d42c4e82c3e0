use uuid::Uuid;

/// `{prefix}_{8 hex}` from a random UUIDv4, e.g. `discovery_1a2b3c4d`.
pub fn short_id(prefix: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &hex[..8])
}

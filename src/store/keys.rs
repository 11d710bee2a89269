//! Storage key layout shared by the record store and its backends.

/// Key of the single index blob (uid -> status/createdAt).
pub const INDEX_KEY: &str = "registros:index";

/// Prefix of per-record body keys.
pub const ITEM_KEY_PREFIX: &str = "registros:item:";

/// Returns the body key for a uid.
#[must_use]
pub fn item_key(uid: &str) -> String {
    format!("{ITEM_KEY_PREFIX}{uid}")
}

/// Extracts the uid from a body key, or `None` for any other key.
#[must_use]
pub fn uid_from_item_key(key: &str) -> Option<&str> {
    key.strip_prefix(ITEM_KEY_PREFIX)
}

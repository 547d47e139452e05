//! Deterministic display colors for users.

#[cfg(test)]
#[path = "color_test.rs"]
mod color_test;

/// Palette cycled through by user id.
pub const USER_PALETTE: [&str; 7] = ["#6366F1", "#10B981", "#F59E0B", "#EF4444", "#3B82F6", "#8B5CF6", "#EC4899"];

/// Color for `user_id`. The same id always maps to the same color.
#[must_use]
pub fn color_for_user(user_id: u64) -> &'static str {
    let len = USER_PALETTE.len() as u64;
    // Lossless: the remainder is below the palette length.
    #[allow(clippy::cast_possible_truncation)]
    let index = (user_id % len) as usize;
    USER_PALETTE[index]
}

/// Color for a user profile object with a numeric `id`, if it has one.
#[must_use]
pub fn color_for_profile(user: &serde_json::Value) -> Option<&'static str> {
    user.get("id").and_then(serde_json::Value::as_u64).map(color_for_user)
}

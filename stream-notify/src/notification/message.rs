//! Announcement text.

/// Compose the go-live announcement.
///
/// The channel name is appended only when it could be resolved.
pub fn compose_go_live(role_id: &str, display_name: &str, channel_name: Option<&str>) -> String {
    let mut msg = format!("<@&{}> {} is going live", role_id, display_name);
    if let Some(name) = channel_name {
        msg.push_str(" in channel ");
        msg.push_str(name);
    }
    msg
}

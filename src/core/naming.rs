use super::{Status, TicketNumber, UserId};

/// Longest discussion channel name the transport accepts
pub const MAX_CHANNEL_NAME_LEN: usize = 128;

const ELLIPSIS: &str = "...";
const FORBIDDEN: [char; 5] = ['<', '>', '&', '"', '\''];

/// Strip markup-sensitive characters and cap the length
///
/// Names longer than [`MAX_CHANNEL_NAME_LEN`] characters keep their first
/// `MAX_CHANNEL_NAME_LEN - 3` characters followed by `...`.
#[must_use]
pub fn sanitize_channel_name(name: &str) -> String {
    let cleaned: String = name.chars().filter(|c| !FORBIDDEN.contains(c)).collect();
    if cleaned.chars().count() <= MAX_CHANNEL_NAME_LEN {
        return cleaned;
    }
    let mut truncated: String = cleaned
        .chars()
        .take(MAX_CHANNEL_NAME_LEN - ELLIPSIS.len())
        .collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

/// `@username`, falling back to `@<user_id>`
#[must_use]
pub fn attribution(username: Option<&str>, user_id: UserId) -> String {
    match username {
        Some(name) if !name.is_empty() => format!("@{name}"),
        _ => format!("@{user_id}"),
    }
}

/// Sanitized channel title for a ticket in the given state
#[must_use]
pub fn channel_label(
    ticket_number: TicketNumber,
    username: Option<&str>,
    user_id: UserId,
    status: Status,
) -> String {
    let prefix = match status {
        Status::Open => "Ticket",
        Status::Closed => "CLOSED",
        Status::Resolved => "RESOLVED",
    };
    let who = match username {
        Some(name) if !name.is_empty() => format!("@{name}"),
        _ => user_id.to_string(),
    };
    sanitize_channel_name(&format!("{prefix} #{ticket_number} - {who}"))
}

use crate::config::StoreSettings;
use crate::core::{ChannelBinding, Ticket, TicketNumber};
use crate::error::{RelayError, Result};
use crate::storage::open_store;
use std::path::Path;

/// Print one ticket as text or JSON
pub async fn handle_show(config: Option<&Path>, ticket_number: TicketNumber, json: bool) -> Result<()> {
    let settings = StoreSettings::load(config)?;
    let store = open_store(&settings).await?;
    let ticket = store
        .get_by_number(ticket_number)
        .await?
        .ok_or(RelayError::TicketNotFound { ticket_number })?;

    if json {
        let rendered = serde_json::to_string_pretty(&ticket)
            .map_err(|e| RelayError::CorruptRow(e.to_string()))?;
        println!("{rendered}");
    } else {
        println!("{}", format_ticket(&ticket));
    }
    Ok(())
}

/// Multi-line operator view of a ticket
#[must_use]
pub fn format_ticket(ticket: &Ticket) -> String {
    let channel = match ticket.channel {
        ChannelBinding::Pending => "pending".to_string(),
        ChannelBinding::Dedicated(id) => format!("topic {id}"),
        ChannelBinding::Shared(id) => format!("admin group {id} (shared)"),
    };
    let mut lines = vec![
        format!("{} Ticket #{}", ticket.status.emoji(), ticket.ticket_number),
        format!("User:    {} ({})", ticket.display_label(), ticket.user_id),
        format!("Status:  {}", ticket.status.title()),
        format!("Channel: {channel}"),
        format!("Created: {}", ticket.created_at.to_rfc3339()),
    ];
    if let Some(closed_at) = ticket.closed_at {
        lines.push(format!("Closed:  {}", closed_at.to_rfc3339()));
    }
    lines.join("\n")
}

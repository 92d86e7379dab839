//! Chat-facing texts and keyboards
//!
//! Texts marked Markdown use the legacy Telegram dialect (`*bold*`).

use crate::core::{Status, Ticket, TicketNumber};
use crate::transport::{CallbackAction, InlineButton, Keyboard};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

pub const GREETING: &str = "Hi! 👋\n\nHow can we help you today?";
pub const NO_TICKET_PROMPT: &str = "👋 It seems like you don't have any ongoing tickets.\n\n\
                                    Would you like to create a new ticket?";
pub const DESCRIBE_ISSUE: &str = "Please describe your issue or question, and I'll create a \
                                  ticket for you.\n\nYou can type your message now.";
pub const AWAITING_DESCRIPTION: &str = "Great! I'll create a ticket for you.\n\n\
                                        Please describe your issue or question, and I'll create \
                                        the ticket right away.";
pub const NO_TICKETS_YET: &str = "You don't have any tickets yet.\n\n\
                                  Use /newticket to create one, or use the button below.";
pub const NOTHING_TO_CLOSE: &str = "You don't have an open ticket to close.\n\n\
                                    Use /newticket to create one.";
pub const FORWARD_FAILED: &str = "Sorry, I couldn't forward your message. Please try again.";
pub const CREATE_FAILED: &str = "Sorry, I couldn't create a ticket. Please try again later.";
pub const NOT_A_TICKET_CHANNEL: &str = "This is not a ticket channel.";
pub const INVALID_TICKET_NUMBER: &str = "Invalid ticket number.";
pub const CANCELLED: &str = "Operation cancelled.";
pub const GENERIC_FAILURE: &str = "🚨 Something went wrong. Please try again in a moment.";
pub const CLOSE_FAILED: &str = "Failed to close ticket. It may not exist or is already closed.";
pub const REOPEN_FAILED: &str = "Failed to reopen ticket. It may already be open or doesn't exist.";
pub const RESOLVE_FAILED: &str =
    "Failed to resolve ticket. It may not exist or is already resolved.";

pub fn create_ticket_keyboard() -> Keyboard {
    vec![vec![InlineButton::new(
        "📝 Create New Ticket",
        CallbackAction::CreateTicket.encode(),
    )]]
}

/// Resolve / Close / Cancel, shown after the user's `/close`
pub fn close_confirmation_keyboard(ticket_number: TicketNumber) -> Keyboard {
    vec![
        vec![
            InlineButton::new("✅ Resolve", CallbackAction::Resolve(ticket_number).encode()),
            InlineButton::new("❌ Close", CallbackAction::UserClose(ticket_number).encode()),
        ],
        vec![InlineButton::new("Cancel", CallbackAction::Cancel.encode())],
    ]
}

/// Reopen / Resolved, sent to the user after an admin closes the ticket
pub fn closed_by_admin_keyboard(ticket_number: TicketNumber) -> Keyboard {
    vec![vec![
        InlineButton::new("🔄 Reopen", CallbackAction::Reopen(ticket_number).encode()),
        InlineButton::new("✅ Resolved", CallbackAction::Resolve(ticket_number).encode()),
    ]]
}

pub fn open_ticket_greeting(ticket_number: TicketNumber) -> String {
    format!(
        "Hi! 👋\n\nYou currently have an open ticket:\n🎫 *Ticket #{ticket_number}*\n\n\
         Type your message to continue the conversation, or use /status to check your ticket status."
    )
}

pub fn already_open(ticket_number: TicketNumber) -> String {
    format!(
        "You already have an open ticket:\n🎫 *Ticket #{ticket_number}*\n\n\
         Please close your current ticket first using /close, or continue the conversation."
    )
}

pub fn close_confirmation(ticket_number: TicketNumber) -> String {
    format!(
        "Are you sure you want to close *🎫 Ticket #{ticket_number}*?\n\n\
         • *✅ Resolve*: Mark as resolved (issue fixed)\n\
         • *❌ Close*: Close the ticket\n\n\
         Or click 'Cancel' to keep it open."
    )
}

pub fn ticket_created(ticket_number: TicketNumber) -> String {
    format!(
        "🎫 *Ticket #{ticket_number} created*\n\n\
         Thank you! Someone will assist you shortly. You can continue the conversation here.\n\n\
         Please tell us your problem in as much detail as possible, including any steps you've \
         taken so far or relevant background. The more information you provide, the quicker we \
         can help you!\n\n\
         Use /status to check your ticket status anytime."
    )
}

/// `/status` card for the user's latest ticket
pub fn status_card(ticket: &Ticket) -> String {
    let mut card = format!(
        "{} *🎫 Ticket #{}*\n\n*Status:* {}\n*Created:* {}",
        ticket.status.emoji(),
        ticket.ticket_number,
        ticket.status.title(),
        ticket.created_at.format(TIMESTAMP_FORMAT),
    );
    if let Some(closed_at) = ticket.closed_at {
        card.push_str(&format!("\n*Closed:* {}", closed_at.format(TIMESTAMP_FORMAT)));
    }
    card
}

/// What the user sees after their ticket changes state
pub fn user_transition_notice(ticket_number: TicketNumber, status: Status) -> String {
    match status {
        Status::Open => format!(
            "🔄 *Ticket #{ticket_number} has been reopened*\n\nYou can continue the conversation now."
        ),
        Status::Closed => format!(
            "✅ *Ticket #{ticket_number} has been closed*\n\n\
             Use /newticket to create a new ticket if needed."
        ),
        Status::Resolved => format!(
            "✅ *Ticket #{ticket_number} has been resolved*\n\n\
             Thank you for using our support service! 🎉"
        ),
    }
}

pub fn closed_by_admin(ticket_number: TicketNumber) -> String {
    format!(
        "🔴 *Ticket #{ticket_number} has been closed*\n\n\
         If your issue isn't resolved, you can reopen it or mark it as resolved."
    )
}

/// Confirmation posted into the ticket channel after an admin command
pub fn admin_confirmation(ticket_number: TicketNumber, status: Status) -> String {
    let verb = match status {
        Status::Open => "reopened",
        Status::Closed => "closed",
        Status::Resolved => "resolved",
    };
    format!("{} *Ticket #{ticket_number}* has been {verb}.", status.emoji())
}

/// Notice posted into the ticket channel when the user changes state
pub fn user_action_notice(ticket_number: TicketNumber, status: Status) -> String {
    match status {
        Status::Open => format!("🔄 User reopened ticket #{ticket_number}."),
        Status::Closed => format!("🔴 User closed ticket #{ticket_number}."),
        Status::Resolved => format!("✅ User marked ticket #{ticket_number} as resolved."),
    }
}

pub fn already_finished(ticket: &Ticket) -> String {
    format!(
        "*🎫 Ticket #{}* is already {}.",
        ticket.ticket_number, ticket.status
    )
}

pub fn cannot_reopen(ticket: &Ticket) -> String {
    format!(
        "*🎫 Ticket #{}* is {} and cannot be reopened.",
        ticket.ticket_number, ticket.status
    )
}

pub fn admin_reopen_blocked(ticket_number: TicketNumber, open: TicketNumber) -> String {
    format!("Cannot reopen ticket #{ticket_number}: the user already has open ticket #{open}.")
}

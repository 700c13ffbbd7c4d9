//! Chat Gateway port, its Matrix HTTP adapter, and Matrix-shaped event
//! parsing.
//!
//! Outbound delivery goes through `MatrixChatGateway`. Inbound delivery is
//! push-based (`http::webhook`), not sync-polled from here; this module only
//! supplies the pure parsing functions the webhook handler calls to turn raw
//! gateway events into typed intake/reaction/reply records.

pub mod events;
pub mod gateway;
pub mod matrix;
pub mod templates;

pub use events::{
    parse_matrix_reaction_event, parse_room1_pdf_intake_event, parse_room3_reply_event,
    ParsedRoom1PdfIntakeEvent, ReactionEvent, Room3ReplyEvent,
};
pub use gateway::{ChatGateway, ChatGatewayError};
pub use matrix::MatrixChatGateway;

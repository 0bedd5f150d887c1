mod history;
mod provider;
pub mod providers;
mod server;
mod streaming;

pub use history::{ChatMessage, MAX_TURNS, Role, normalize_messages, stitch};
pub use provider::ProviderSelection;
pub use server::{AppState, GatewayServer, create_router};
pub use streaming::{EventKind, OutboundEvent, SseDecoder, encode_event};

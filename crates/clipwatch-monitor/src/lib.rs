//! Fleet monitor: polls Twitch's top-live endpoint, converges chat-room
//! membership with hysteresis, and pumps chat lines onto the event bus
//! (spec.md §4.C).

mod irc_transport;
mod monitor;
mod transport;

pub use irc_transport::IrcChatTransport;
pub use monitor::{ChatConnector, FleetMonitor};
pub use transport::{ChatTransport, RawChatLine};

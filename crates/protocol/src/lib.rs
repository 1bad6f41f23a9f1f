pub mod messages;

pub use messages::{DownstreamMessage, WelcomeMessage, WireNode};

pub mod channel;
pub mod discord;
pub mod dispatcher;
pub mod error;
pub mod limiter;
pub mod render;
pub mod state;
pub mod telegram;

pub use channel::{ChannelAdapter, NotificationPayload};
pub use discord::DiscordChannel;
pub use dispatcher::{Dispatcher, DispatcherConfig, FlushSummary};
pub use error::NotifyError;
pub use limiter::RateLimiter;
pub use render::render_message;
pub use state::{NotificationStateEngine, StateEntry, StateKey};
pub use telegram::TelegramChannel;

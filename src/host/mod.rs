/// Host side event feed the plugin subscribes to
pub mod eventbus;

pub use eventbus::{EventBus, EventSubscription, SubscriberId};

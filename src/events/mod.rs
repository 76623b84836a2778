pub mod interaction;
pub mod member;
pub mod message;
pub mod waiter;

pub use interaction::handle_component;
pub use member::handle_member_add;
pub use message::handle_message;
pub use waiter::{create_shared_event_waiter, EventWaiter, GatewayEvent, SharedEventWaiter};

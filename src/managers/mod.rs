pub mod invites;
pub mod role_manager;
pub mod scanner;
pub mod session;

pub use role_manager::{create_shared_role_manager, RoleManager, SharedRoleManager};
pub use scanner::InvalidMemberScanner;
pub use session::{create_shared_session_coordinator, SessionCoordinator, SharedSessionCoordinator};

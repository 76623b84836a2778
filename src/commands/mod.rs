pub mod general;
pub mod setup;

pub use general::ping;
pub use setup::{colour_picker, pronoun_picker, role_picker, verification_button};

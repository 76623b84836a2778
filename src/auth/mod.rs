pub mod client;
pub mod student;

pub use client::{AuthClient, Authenticator};
pub use student::{AuthResult, StudentType};

//! Domain models for identity-store.

pub mod identity;
pub mod namespace;
pub mod user;

pub use identity::{CreateIdentity, Identity, IdentityType};
pub use namespace::{Membership, Namespace};
pub use user::{CreateUser, CreateUserWithIdentity, User};

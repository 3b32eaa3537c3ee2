pub mod channel;
pub mod events;
pub mod guild;
pub mod member;
pub mod permissions;
pub mod tracker;

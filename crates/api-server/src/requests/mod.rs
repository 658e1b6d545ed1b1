mod chat;

pub use chat::{ChatProcessRequest, GUEST_USER_ID};

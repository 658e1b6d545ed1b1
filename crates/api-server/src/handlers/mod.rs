mod chat_process;
mod health;

pub use chat_process::chat_process_router;
pub use health::health_router;

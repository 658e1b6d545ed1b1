pub mod channel;
pub mod data;
pub mod error;
pub mod messages;
pub mod proxy;
pub mod random;
pub mod settings;
pub mod stream;

mod log;

pub use log::logging_stdout;
pub use random::KeyPool;
pub use reqwest::RequestBuilder;

pub mod sse;

pub use sse::{FrameParser, ParserState, StreamEvent, Terminal};

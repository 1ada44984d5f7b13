pub mod message;

pub use message::{ContentType, Message, MessageTarget, NewMessage, UnknownContentType};

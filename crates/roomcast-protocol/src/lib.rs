pub mod message;

pub use message::{
    decode_batch, encode_batch, ChatMessage, InfoMessage, Message, Payload, MSG_TYPE_CHAT,
    MSG_TYPE_INFO,
};

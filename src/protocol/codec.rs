use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::Error;
use super::message::Message;

/// Datagram codec for protocol frames.
///
/// Each call to `decode` treats the whole buffer as one frame and consumes it,
/// whether or not it parses, so a malformed datagram never lingers in a
/// framed stream's read buffer.
#[derive(Clone, Copy, Debug, Default)]
pub struct MessageCodec;

impl MessageCodec {
    /// Creates a new message codec
    pub fn new() -> Self {
        MessageCodec
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let frame = src.split_to(src.len());
        Message::decode(&frame).map(Some).map_err(Error::from)
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = Error;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.encoded_len() > super::MAX_MESSAGE_SIZE {
            return Err(Error::encode(format!("{} frame too large", item.kind())));
        }
        dst.reserve(item.encoded_len());
        dst.put_slice(&item.to_bytes());
        Ok(())
    }
}

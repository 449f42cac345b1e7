//! Canvas wire protocol
//!
//! - [`codec`]: coordinate frame encoding between clients and the hub
//! - [`route`]: request path to topic mapping

pub mod codec;
pub mod route;

pub use codec::{
    decode_inbound, decode_outbound, encode_outbound, encode_transport, TransportValue,
    INBOUND_FRAME_LEN, OUTBOUND_FRAME_LEN,
};
pub use route::{decode_path, room_from_path, topic_from_path, TopicMode};

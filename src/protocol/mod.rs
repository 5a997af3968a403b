//! Client side of the MySQL client/server protocol
//!
//! Just enough of the wire format to authenticate and run a text-protocol
//! query: packet framing, handshake, auth scrambles and result set decoding.

pub mod codec;
pub mod handshake;
pub mod packet;
pub mod resultset;
pub mod wire;

pub use codec::PacketCodec;
pub use handshake::{
    compute_auth_response, compute_sha2_auth_response, encrypt_password_rsa, is_eof_packet,
    is_err_packet, AuthPlugin, AuthSwitchRequest, ErrPacket, HandshakeResponse, InitialHandshake,
    PublicKeyError,
};
pub use packet::{capabilities, Command, Packet};

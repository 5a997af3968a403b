use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

use crate::protocol::capabilities::{CLIENT_PROTOCOL_41, DEFAULT_CAPABILITIES};
use crate::protocol::handshake::{AUTH_MORE_DATA_HEADER, EOF_HEADER, ERR_HEADER, OK_HEADER};
use crate::protocol::packet::MAX_PACKET_SIZE;
use crate::protocol::resultset::{parse_column_count, parse_column_name, parse_text_row};
use crate::protocol::{
    encrypt_password_rsa, is_eof_packet, is_err_packet, AuthPlugin, AuthSwitchRequest, Command,
    ErrPacket, HandshakeResponse, InitialHandshake, Packet, PacketCodec,
};

use super::{QueryError, ResultSet};

/// utf8_general_ci
const CHARACTER_SET: u8 = 0x21;
/// Auth switch + more-data exchanges tolerated before giving up
const MAX_AUTH_ROUNDS: usize = 6;

/// caching_sha2_password AuthMoreData status bytes
const FAST_AUTH_SUCCESS: u8 = 0x03;
const PERFORM_FULL_AUTH: u8 = 0x04;
/// Client request for the server's RSA public key
const REQUEST_PUBLIC_KEY: u8 = 0x02;

/// A single authenticated connection to a replica
pub struct ReplicaConnection {
    framed: Framed<TcpStream, PacketCodec>,
    server_version: String,
}

impl ReplicaConnection {
    /// Connect and authenticate
    pub async fn connect(addr: &str, user: &str, password: &str) -> Result<Self, QueryError> {
        debug!(addr = %addr, "Connecting to replica");

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| QueryError::Connect(format!("{}: {}", addr, e)))?;
        stream.set_nodelay(true).ok();
        let mut framed = Framed::new(stream, PacketCodec);

        let handshake_packet = recv(&mut framed).await?;
        // Servers refusing the connection (too many connections, blocked host)
        // answer with ERR instead of a handshake
        if is_err_packet(&handshake_packet.payload) {
            return Err(QueryError::from_err_payload(&handshake_packet.payload));
        }

        let handshake = InitialHandshake::parse(&handshake_packet.payload)
            .ok_or_else(|| QueryError::Protocol("Invalid server handshake".into()))?;
        if handshake.capability_flags & CLIENT_PROTOCOL_41 == 0 {
            return Err(QueryError::Protocol(format!(
                "Server {} does not support protocol 4.1",
                handshake.server_version
            )));
        }

        debug!(
            server_version = %handshake.server_version,
            connection_id = handshake.connection_id,
            auth_plugin = %handshake.auth_plugin_name,
            "Received server handshake"
        );

        // Unknown initial plugins are answered with native password; the
        // server follows up with an auth switch if it insists
        let plugin = match AuthPlugin::from_name(&handshake.auth_plugin_name) {
            AuthPlugin::Unsupported(_) => AuthPlugin::NativePassword,
            plugin => plugin,
        };
        let auth_response = plugin
            .scramble(password, &handshake.auth_plugin_data)
            .unwrap_or_default();

        let response = HandshakeResponse {
            capability_flags: DEFAULT_CAPABILITIES & handshake.capability_flags,
            max_packet_size: MAX_PACKET_SIZE as u32,
            character_set: CHARACTER_SET,
            username: user.to_string(),
            auth_response,
            auth_plugin_name: plugin.name().to_string(),
        };
        send(
            &mut framed,
            response.encode(handshake_packet.sequence_id.wrapping_add(1)),
        )
        .await?;

        authenticate(&mut framed, plugin, handshake.auth_plugin_data, password).await?;
        debug!(addr = %addr, "Replica authentication successful");

        Ok(Self {
            framed,
            server_version: handshake.server_version,
        })
    }

    /// Server version from the handshake
    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// Run a text-protocol query and collect the full result set
    pub async fn query(&mut self, sql: &str) -> Result<ResultSet, QueryError> {
        send(&mut self.framed, Packet::command(Command::Query, sql.as_bytes())).await?;

        let first = recv(&mut self.framed).await?;
        match first.header() {
            Some(ERR_HEADER) => return Err(QueryError::from_err_payload(&first.payload)),
            // Statement without a result set
            Some(OK_HEADER) => return Ok(ResultSet::default()),
            _ => {}
        }

        let column_count = parse_column_count(&first.payload)
            .ok_or_else(|| QueryError::Protocol("Invalid column count".into()))?;

        let mut columns = Vec::with_capacity(column_count);
        for _ in 0..column_count {
            let definition = recv(&mut self.framed).await?;
            let name = parse_column_name(&definition.payload)
                .ok_or_else(|| QueryError::Protocol("Invalid column definition".into()))?;
            columns.push(name);
        }

        let eof = recv(&mut self.framed).await?;
        if !is_eof_packet(&eof.payload) {
            return Err(QueryError::Protocol(
                "Expected EOF after column definitions".into(),
            ));
        }

        let mut rows = Vec::new();
        loop {
            let packet = recv(&mut self.framed).await?;
            if is_eof_packet(&packet.payload) {
                break;
            }
            if is_err_packet(&packet.payload) {
                return Err(QueryError::from_err_payload(&packet.payload));
            }
            let row = parse_text_row(&packet.payload, column_count)
                .ok_or_else(|| QueryError::Protocol("Truncated row".into()))?;
            rows.push(row);
        }

        debug!(columns = columns.len(), rows = rows.len(), "Query complete");
        Ok(ResultSet { columns, rows })
    }

    /// Send COM_QUIT and drop the connection
    pub async fn quit(mut self) {
        if let Err(e) = send(&mut self.framed, Packet::command(Command::Quit, &[])).await {
            debug!(error = %e, "COM_QUIT failed");
        }
    }
}

/// Drive the authentication exchange until OK or ERR
///
/// caching_sha2_password falls back to full authentication when the
/// server's credential cache is cold: the client fetches the server's RSA
/// public key and sends the password encrypted with it.
async fn authenticate(
    framed: &mut Framed<TcpStream, PacketCodec>,
    mut plugin: AuthPlugin,
    mut nonce: Vec<u8>,
    password: &str,
) -> Result<(), QueryError> {
    let mut awaiting_public_key = false;

    for _ in 0..MAX_AUTH_ROUNDS {
        let packet = recv(framed).await?;
        let next_seq = packet.sequence_id.wrapping_add(1);
        match packet.header() {
            Some(OK_HEADER) => return Ok(()),
            Some(ERR_HEADER) => {
                let message = ErrPacket::parse(&packet.payload)
                    .map(|err| err.error_message)
                    .unwrap_or_else(|| "Access denied".to_string());
                return Err(QueryError::Auth(message));
            }
            Some(EOF_HEADER) => {
                let switch = AuthSwitchRequest::parse(&packet.payload)
                    .ok_or_else(|| QueryError::Protocol("Invalid auth switch request".into()))?;
                debug!(plugin = %switch.plugin_name, "Server requested auth switch");

                plugin = AuthPlugin::from_name(&switch.plugin_name);
                let scramble = plugin.scramble(password, &switch.auth_data).ok_or_else(|| {
                    QueryError::Auth(format!(
                        "Unsupported authentication plugin: {}",
                        switch.plugin_name
                    ))
                })?;
                nonce = switch.auth_data;
                awaiting_public_key = false;
                send(framed, Packet::new(next_seq, scramble)).await?;
            }
            Some(AUTH_MORE_DATA_HEADER) if plugin == AuthPlugin::CachingSha2Password => {
                let data = &packet.payload[1..];
                if awaiting_public_key {
                    let encrypted = encrypt_password_rsa(password, &nonce, data)
                        .map_err(|e| QueryError::Auth(e.to_string()))?;
                    awaiting_public_key = false;
                    send(framed, Packet::new(next_seq, encrypted)).await?;
                    continue;
                }
                match data {
                    [FAST_AUTH_SUCCESS] => continue,
                    [PERFORM_FULL_AUTH] => {
                        debug!("Full authentication requested, fetching server public key");
                        awaiting_public_key = true;
                        send(framed, Packet::new(next_seq, vec![REQUEST_PUBLIC_KEY])).await?;
                    }
                    _ => {
                        return Err(QueryError::Protocol(
                            "Unexpected caching_sha2_password response".into(),
                        ))
                    }
                }
            }
            _ => {
                return Err(QueryError::Protocol(
                    "Unexpected packet during authentication".into(),
                ))
            }
        }
    }
    Err(QueryError::Protocol("Authentication did not complete".into()))
}

async fn send(
    framed: &mut Framed<TcpStream, PacketCodec>,
    packet: Packet,
) -> Result<(), QueryError> {
    framed
        .send(packet)
        .await
        .map_err(|e| QueryError::Io(e.to_string()))
}

async fn recv(framed: &mut Framed<TcpStream, PacketCodec>) -> Result<Packet, QueryError> {
    match framed.next().await {
        Some(Ok(packet)) => Ok(packet),
        Some(Err(e)) => Err(QueryError::Io(e.to_string())),
        None => Err(QueryError::Disconnected),
    }
}

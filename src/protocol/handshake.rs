use bytes::{BufMut, Bytes, BytesMut};
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Oaep, RsaPublicKey};
use sha1::{Digest, Sha1};
use sha2::Sha256;

use super::packet::{capabilities::*, Packet};
use super::wire::WireReader;

pub const OK_HEADER: u8 = 0x00;
pub const AUTH_MORE_DATA_HEADER: u8 = 0x01;
pub const EOF_HEADER: u8 = 0xFE;
pub const ERR_HEADER: u8 = 0xFF;

/// MySQL initial handshake packet (server -> client), protocol v10
#[derive(Debug, Clone)]
pub struct InitialHandshake {
    pub server_version: String,
    pub connection_id: u32,
    pub capability_flags: u32,
    /// Full scramble (part 1 + part 2, without the trailing NUL)
    pub auth_plugin_data: Vec<u8>,
    pub auth_plugin_name: String,
}

impl InitialHandshake {
    /// Parse from packet payload
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let mut r = WireReader::new(payload);

        if r.u8()? != 10 {
            return None;
        }
        let server_version = String::from_utf8_lossy(r.null_terminated()).into_owned();
        let connection_id = r.u32_le()?;

        let mut auth_plugin_data = r.take(8)?.to_vec();
        r.skip(1)?; // filler

        let capability_lower = r.u16_le()? as u32;
        // Pre-4.1 servers stop here
        let (capability_upper, auth_data_len) = if r.is_empty() {
            (0, 0)
        } else {
            r.skip(3)?; // character set, status flags
            let upper = r.u16_le()? as u32;
            let len = r.u8()?;
            r.skip(10)?; // reserved
            (upper, len)
        };
        let capability_flags = capability_lower | (capability_upper << 16);

        if capability_flags & CLIENT_SECURE_CONNECTION != 0 {
            let len = std::cmp::max(13, (auth_data_len as usize).saturating_sub(8));
            let part2 = r.take(len.min(r.remaining()))?;
            let end = part2.iter().position(|&b| b == 0).unwrap_or(part2.len());
            auth_plugin_data.extend_from_slice(&part2[..end]);
        }

        let auth_plugin_name = if capability_flags & CLIENT_PLUGIN_AUTH != 0 && !r.is_empty() {
            String::from_utf8_lossy(r.null_terminated()).into_owned()
        } else {
            AuthPlugin::NativePassword.name().to_string()
        };

        Some(Self {
            server_version,
            connection_id,
            capability_flags,
            auth_plugin_data,
            auth_plugin_name,
        })
    }
}

/// MySQL handshake response packet (client -> server)
#[derive(Debug, Clone)]
pub struct HandshakeResponse {
    pub capability_flags: u32,
    pub max_packet_size: u32,
    pub character_set: u8,
    pub username: String,
    pub auth_response: Vec<u8>,
    pub auth_plugin_name: String,
}

impl HandshakeResponse {
    /// Encode to packet
    pub fn encode(&self, sequence_id: u8) -> Packet {
        let mut buf = BytesMut::new();

        buf.put_u32_le(self.capability_flags);
        buf.put_u32_le(self.max_packet_size);
        buf.put_u8(self.character_set);
        buf.extend_from_slice(&[0u8; 23]);

        buf.extend_from_slice(self.username.as_bytes());
        buf.put_u8(0);

        if self.capability_flags & CLIENT_SECURE_CONNECTION != 0 {
            buf.put_u8(self.auth_response.len() as u8);
            buf.extend_from_slice(&self.auth_response);
        } else {
            buf.extend_from_slice(&self.auth_response);
            buf.put_u8(0);
        }

        if self.capability_flags & CLIENT_PLUGIN_AUTH != 0 {
            buf.extend_from_slice(self.auth_plugin_name.as_bytes());
            buf.put_u8(0);
        }

        Packet::new(sequence_id, buf.freeze())
    }
}

/// Authentication plugins the status client can answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthPlugin {
    NativePassword,
    CachingSha2Password,
    Unsupported(String),
}

impl AuthPlugin {
    pub fn from_name(name: &str) -> Self {
        match name {
            "mysql_native_password" | "" => Self::NativePassword,
            "caching_sha2_password" => Self::CachingSha2Password,
            other => Self::Unsupported(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::NativePassword => "mysql_native_password",
            Self::CachingSha2Password => "caching_sha2_password",
            Self::Unsupported(name) => name,
        }
    }

    /// Compute the scrambled password for this plugin, `None` if unsupported
    pub fn scramble(&self, password: &str, nonce: &[u8]) -> Option<Vec<u8>> {
        match self {
            Self::NativePassword => Some(compute_auth_response(password, nonce)),
            Self::CachingSha2Password => Some(compute_sha2_auth_response(password, nonce)),
            Self::Unsupported(_) => None,
        }
    }
}

/// Compute mysql_native_password auth response
///
/// `SHA1(password) XOR SHA1(nonce + SHA1(SHA1(password)))`
pub fn compute_auth_response(password: &str, auth_data: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    let hash1 = Sha1::digest(password.as_bytes());
    let hash2 = Sha1::digest(hash1);

    let mut hasher = Sha1::new();
    hasher.update(auth_data);
    hasher.update(hash2);
    let hash3 = hasher.finalize();

    hash1.iter().zip(hash3.iter()).map(|(a, b)| a ^ b).collect()
}

/// Compute caching_sha2_password fast-auth response
///
/// `SHA256(password) XOR SHA256(SHA256(SHA256(password)) + nonce)`
pub fn compute_sha2_auth_response(password: &str, auth_data: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    let hash1 = Sha256::digest(password.as_bytes());
    let hash2 = Sha256::digest(hash1);

    let mut hasher = Sha256::new();
    hasher.update(hash2);
    hasher.update(auth_data);
    let hash3 = hasher.finalize();

    hash1.iter().zip(hash3.iter()).map(|(a, b)| a ^ b).collect()
}

/// Failure building the caching_sha2_password full-auth payload
#[derive(Debug, thiserror::Error)]
pub enum PublicKeyError {
    #[error("invalid server public key: {0}")]
    InvalidKey(String),
    #[error("RSA encryption failed: {0}")]
    Encrypt(#[from] rsa::Error),
}

/// Encrypt the password for caching_sha2_password full authentication
///
/// The NUL-terminated password is XORed with the nonce (repeated as needed)
/// and encrypted with RSA-OAEP (SHA-1) under the server's PEM public key.
pub fn encrypt_password_rsa(
    password: &str,
    nonce: &[u8],
    public_key_pem: &[u8],
) -> Result<Vec<u8>, PublicKeyError> {
    let pem = std::str::from_utf8(public_key_pem)
        .map_err(|e| PublicKeyError::InvalidKey(e.to_string()))?
        .trim_matches(|c: char| c == '\0' || c.is_whitespace());
    // MySQL sends SubjectPublicKeyInfo; older builds use the PKCS#1 form
    let key = RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| PublicKeyError::InvalidKey(e.to_string()))?;

    let mut plain = password.as_bytes().to_vec();
    plain.push(0);
    if !nonce.is_empty() {
        for (i, b) in plain.iter_mut().enumerate() {
            *b ^= nonce[i % nonce.len()];
        }
    }

    Ok(key.encrypt(&mut rand::thread_rng(), Oaep::new::<Sha1>(), &plain)?)
}

/// Auth switch request (server -> client, header 0xFE during authentication)
#[derive(Debug, Clone)]
pub struct AuthSwitchRequest {
    pub plugin_name: String,
    pub auth_data: Vec<u8>,
}

impl AuthSwitchRequest {
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let mut r = WireReader::new(payload);
        if r.u8()? != EOF_HEADER {
            return None;
        }
        let plugin_name = String::from_utf8_lossy(r.null_terminated()).into_owned();
        let data = r.rest();
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        Some(Self {
            plugin_name,
            auth_data: data[..end].to_vec(),
        })
    }
}

/// ERR packet
#[derive(Debug, Clone)]
pub struct ErrPacket {
    pub error_code: u16,
    pub sql_state: String,
    pub error_message: String,
}

impl ErrPacket {
    /// Parse from packet payload
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let mut r = WireReader::new(payload);
        if r.u8()? != ERR_HEADER {
            return None;
        }
        let error_code = r.u16_le()?;

        let sql_state = if r.peek() == Some(b'#') && r.remaining() >= 6 {
            r.skip(1)?;
            String::from_utf8_lossy(r.take(5)?).into_owned()
        } else {
            "HY000".to_string()
        };
        let error_message = String::from_utf8_lossy(r.rest()).into_owned();

        Some(Self {
            error_code,
            sql_state,
            error_message,
        })
    }
}

/// Check if packet is ERR packet
pub fn is_err_packet(payload: &Bytes) -> bool {
    payload.first() == Some(&ERR_HEADER)
}

/// Check if packet is EOF packet
///
/// A row whose first column uses the 8-byte length prefix also starts with
/// 0xFE, so the short payload length is what identifies EOF.
pub fn is_eof_packet(payload: &Bytes) -> bool {
    payload.first() == Some(&EOF_HEADER) && payload.len() < 9
}

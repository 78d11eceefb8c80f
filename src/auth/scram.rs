//! SCRAM-SHA-256 client (RFC 5802 / RFC 7677) without channel binding
//!
//! Postgres takes the user name from the startup packet, so the client-first
//! message carries an empty `n=` attribute.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hmac::{Hmac, Mac};
use pbkdf2::pbkdf2;
use rand::Rng;
use sha2::{Digest, Sha256};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Mechanism name as advertised by the server
pub const MECHANISM: &str = "SCRAM-SHA-256";

/// GS2 header for "client does not support channel binding"
const GS2_HEADER: &str = "n,,";

/// SCRAM exchange failure
#[derive(Debug, Clone, Error)]
pub enum ScramError {
    /// Server signature did not verify
    #[error("invalid server proof: {0}")]
    InvalidServerProof(String),
    /// Server message was malformed
    #[error("invalid server message: {0}")]
    InvalidServerMessage(String),
    /// Base64 decoding failed
    #[error("base64 error: {0}")]
    Base64(String),
}

/// Values carried from the client-final step to server verification
#[derive(Clone, Debug)]
pub struct ScramState {
    auth_message: Vec<u8>,
    server_key: Vec<u8>,
}

/// SCRAM-SHA-256 client
pub struct ScramClient {
    password: String,
    nonce: String,
}

impl ScramClient {
    /// Create a client with a fresh random nonce
    pub fn new(password: impl Into<String>) -> Self {
        let nonce_bytes: [u8; 18] = rand::thread_rng().gen();
        Self {
            password: password.into(),
            nonce: BASE64.encode(nonce_bytes),
        }
    }

    fn client_first_bare(&self) -> String {
        format!("n=,r={}", self.nonce)
    }

    /// Client first message
    pub fn client_first(&self) -> String {
        format!("{}{}", GS2_HEADER, self.client_first_bare())
    }

    /// Process the server first message and produce the client final message
    pub fn client_final(&self, server_first: &str) -> Result<(String, ScramState), ScramError> {
        let first = ServerFirst::parse(server_first)?;

        if !first.nonce.starts_with(&self.nonce) {
            return Err(ScramError::InvalidServerMessage(
                "server nonce doesn't contain client nonce".to_string(),
            ));
        }

        let salt = BASE64
            .decode(first.salt)
            .map_err(|_| ScramError::Base64("invalid salt encoding".to_string()))?;

        let salted_password = salted_password(&self.password, &salt, first.iterations)?;
        let server_key = hmac(&salted_password, b"Server Key");

        let without_proof = format!("c={},r={}", BASE64.encode(GS2_HEADER), first.nonce);
        let auth_message = format!(
            "{},{},{}",
            self.client_first_bare(),
            server_first,
            without_proof
        );

        let proof = client_proof(&salted_password, auth_message.as_bytes());
        let client_final = format!("{},p={}", without_proof, BASE64.encode(proof));
        let state = ScramState {
            auth_message: auth_message.into_bytes(),
            server_key,
        };

        Ok((client_final, state))
    }

    /// Verify the server final message (`v=<signature>`)
    pub fn verify_server_final(
        &self,
        server_final: &str,
        state: &ScramState,
    ) -> Result<(), ScramError> {
        if let Some(err) = server_final.strip_prefix("e=") {
            return Err(ScramError::InvalidServerProof(format!("server reported {}", err)));
        }

        let encoded = server_final
            .strip_prefix("v=")
            .ok_or_else(|| ScramError::InvalidServerMessage("missing 'v=' prefix".to_string()))?;
        let signature = BASE64
            .decode(encoded)
            .map_err(|_| ScramError::Base64("invalid server signature encoding".to_string()))?;

        let expected = hmac(&state.server_key, &state.auth_message);
        if constant_time_eq(&signature, &expected) {
            Ok(())
        } else {
            Err(ScramError::InvalidServerProof(
                "server signature verification failed".to_string(),
            ))
        }
    }
}

/// Parsed `r=<nonce>,s=<salt>,i=<iterations>`
#[derive(Debug, PartialEq, Eq)]
struct ServerFirst<'a> {
    nonce: &'a str,
    salt: &'a str,
    iterations: u32,
}

impl<'a> ServerFirst<'a> {
    fn parse(msg: &'a str) -> Result<Self, ScramError> {
        let mut nonce = None;
        let mut salt = None;
        let mut iterations = None;

        for part in msg.split(',') {
            match part.split_once('=') {
                Some(("r", v)) if !v.is_empty() => nonce = Some(v),
                Some(("s", v)) if !v.is_empty() => salt = Some(v),
                Some(("i", v)) if !v.is_empty() => iterations = Some(v),
                _ => {}
            }
        }

        let (Some(nonce), Some(salt), Some(iterations)) = (nonce, salt, iterations) else {
            return Err(ScramError::InvalidServerMessage(
                "missing required fields in server first message".to_string(),
            ));
        };

        let iterations = match iterations.parse::<u32>() {
            Ok(n) if n > 0 => n,
            _ => {
                return Err(ScramError::InvalidServerMessage(format!(
                    "invalid iteration count {:?}",
                    iterations
                )))
            }
        };

        Ok(Self {
            nonce,
            salt,
            iterations,
        })
    }
}

fn salted_password(password: &str, salt: &[u8], iterations: u32) -> Result<[u8; 32], ScramError> {
    let mut out = [0u8; 32];
    pbkdf2::<HmacSha256>(password.as_bytes(), salt, iterations, &mut out)
        .map_err(|_| ScramError::InvalidServerMessage("key derivation failed".to_string()))?;
    Ok(out)
}

/// ClientKey XOR HMAC(H(ClientKey), AuthMessage)
fn client_proof(salted_password: &[u8], auth_message: &[u8]) -> Vec<u8> {
    let client_key = hmac(salted_password, b"Client Key");
    let stored_key = Sha256::digest(&client_key);
    let client_signature = hmac(&stored_key, auth_message);
    client_key
        .iter()
        .zip(client_signature.iter())
        .map(|(k, s)| k ^ s)
        .collect()
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC takes keys of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

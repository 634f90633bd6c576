use chrono::Utc;
use rand::Rng;
use rand::distr::Alphanumeric;
use sha2::{Digest, Sha256};

const NONCE_LENGTH: usize = 32;

/// Fresh session token: SHA-256 over a random alphanumeric nonce and the
/// current time in milliseconds, hex encoded.
///
/// This is a collision-resistant nonce, not a signed credential. A scan is
/// accepted only while the token equals the one currently stored on the session.
pub fn generate_token() -> String {
    let nonce: String = rand::rng().sample_iter(&Alphanumeric).take(NONCE_LENGTH).map(char::from).collect();
    let material = format!("{}{}", nonce, Utc::now().timestamp_millis());
    hex::encode(Sha256::digest(material.as_bytes()))
}

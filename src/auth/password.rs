// scrypt (N=16384, r=16, p=1, dkLen=64) with a random 16-byte salt.
// Stored as "hex(salt):hex(key)".

use rand::RngCore;
use scrypt::{scrypt, Params};

use super::AuthError;

/// Well-formed hash no password matches; checked for unknown emails so a failed
/// login costs the same whether or not the account exists
pub const DUMMY_HASH: &str = "00000000000000000000000000000000:\
00000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000";

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let mut salt_bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt_hex = hex::encode(salt_bytes);

    let key = derive_key(password, &salt_hex)?;
    Ok(format!("{}:{}", salt_hex, hex::encode(key)))
}

/// Verify a password against a hash produced by `hash_password`
pub fn verify_password(hash: &str, password: &str) -> Result<bool, AuthError> {
    let (salt, key_hex) = hash
        .split_once(':')
        .ok_or_else(|| AuthError::PasswordHash("invalid password hash format".into()))?;

    let expected = hex::decode(key_hex).map_err(|e| AuthError::PasswordHash(format!("invalid hex: {e}")))?;
    let derived = derive_key(password, salt)?;

    Ok(constant_time_eq(&derived, &expected))
}

/// `hash_password` on the blocking pool
pub async fn hash_password_blocking(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AuthError::PasswordHash(format!("hashing task failed: {e}")))?
}

/// `verify_password` on the blocking pool
pub async fn verify_password_blocking(hash: String, password: String) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || verify_password(&hash, &password))
        .await
        .map_err(|e| AuthError::PasswordHash(format!("verification task failed: {e}")))?
}

fn derive_key(password: &str, salt: &str) -> Result<Vec<u8>, AuthError> {
    let params = Params::new(14, 16, 1, 64).map_err(|e| AuthError::PasswordHash(e.to_string()))?;

    let mut output = vec![0u8; 64];
    scrypt(password.as_bytes(), salt.as_bytes(), &params, &mut output)
        .map_err(|e| AuthError::PasswordHash(e.to_string()))?;

    Ok(output)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

//! Authentication plugin implementations.
//!
//! Challenge-response digests for the plugins the server may request:
//!
//! - `mysql_native_password` (SHA1-based, the pre-8.0 default):
//!   `SHA1(password) XOR SHA1(seed + SHA1(SHA1(password)))`
//! - `caching_sha2_password` (SHA256-based, the 8.0+ default) fast path:
//!   `SHA256(password) XOR SHA256(SHA256(SHA256(password)) + seed)`
//! - full authentication for the SHA256 plugins: cleartext over TLS, or the
//!   password XOR-folded with the seed and RSA-encrypted with the server's
//!   public key on insecure channels.

use mysqlc_core::{Error, Result};
use rand::rngs::OsRng;
use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Well-known authentication plugin names.
pub mod plugins {
    /// SHA1 challenge-response (pre-8.0 default)
    pub const MYSQL_NATIVE_PASSWORD: &str = "mysql_native_password";
    /// SHA256 challenge-response with server-side cache (8.0+ default)
    pub const CACHING_SHA2_PASSWORD: &str = "caching_sha2_password";
    /// RSA-protected SHA256 authentication
    pub const SHA256_PASSWORD: &str = "sha256_password";
    /// Cleartext password (only sane over TLS)
    pub const MYSQL_CLEAR_PASSWORD: &str = "mysql_clear_password";
}

/// Status bytes inside the `caching_sha2_password` sub-protocol.
pub mod caching_sha2 {
    /// Client request for the server's RSA public key
    pub const REQUEST_PUBLIC_KEY: u8 = 0x02;
    /// Server: cached entry matched, an OK packet follows
    pub const FAST_AUTH_SUCCESS: u8 = 0x03;
    /// Server: full authentication required
    pub const PERFORM_FULL_AUTH: u8 = 0x04;
}

/// Clamp a server scramble to the 20 significant bytes, dropping the
/// trailing NUL some servers append.
fn scramble_seed(auth_data: &[u8]) -> &[u8] {
    if auth_data.len() > 20 {
        &auth_data[..20]
    } else {
        auth_data
    }
}

/// Compute the `mysql_native_password` response.
///
/// An empty password sends an empty response (no digest at all).
pub fn mysql_native_password(password: &str, auth_data: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let seed = scramble_seed(auth_data);

    let stage1: [u8; 20] = Sha1::digest(password.as_bytes()).into();
    let stage2: [u8; 20] = Sha1::digest(stage1).into();

    let mut hasher = Sha1::new();
    hasher.update(seed);
    hasher.update(stage2);
    let mask: [u8; 20] = hasher.finalize().into();

    stage1.iter().zip(mask.iter()).map(|(a, b)| a ^ b).collect()
}

/// Compute the `caching_sha2_password` fast-auth response.
pub fn caching_sha2_password(password: &str, auth_data: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }
    let seed = scramble_seed(auth_data);

    let digest: [u8; 32] = Sha256::digest(password.as_bytes()).into();
    let digest2: [u8; 32] = Sha256::digest(digest).into();

    let mut hasher = Sha256::new();
    hasher.update(digest2);
    hasher.update(seed);
    let mask: [u8; 32] = hasher.finalize().into();

    digest.iter().zip(mask.iter()).map(|(a, b)| a ^ b).collect()
}

/// XOR the NUL-terminated password with the (repeating) seed.
///
/// This is the obfuscation applied before RSA encryption in full
/// authentication, and the form sent in clear over TLS channels.
pub fn xor_password_with_seed(password: &str, seed: &[u8]) -> Vec<u8> {
    let mut out = password.as_bytes().to_vec();
    out.push(0);
    if seed.is_empty() {
        return out;
    }
    for (i, b) in out.iter_mut().enumerate() {
        *b ^= seed[i % seed.len()];
    }
    out
}

/// Encrypt the password with the server's RSA public key for full
/// authentication on an insecure channel.
///
/// `use_oaep` selects OAEP padding (`caching_sha2_password`, MySQL 8.0.5+)
/// over PKCS#1 v1.5 (`sha256_password` and older servers). The key arrives
/// as PEM in either PKCS#8 or PKCS#1 encoding.
pub fn rsa_encrypted_password(
    password: &str,
    seed: &[u8],
    public_key_pem: &[u8],
    use_oaep: bool,
) -> Result<Vec<u8>> {
    if seed.is_empty() {
        return Err(Error::interface("empty auth seed for RSA password exchange"));
    }
    let obfuscated = xor_password_with_seed(password, scramble_seed(seed));

    let pem = std::str::from_utf8(public_key_pem)
        .map_err(|e| Error::interface(format!("server public key is not valid PEM: {e}")))?;
    let key = RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| Error::interface(format!("cannot parse server RSA public key: {e}")))?;

    let encrypted = if use_oaep {
        key.encrypt(&mut OsRng, rsa::Oaep::new::<Sha1>(), &obfuscated)
    } else {
        key.encrypt(&mut OsRng, rsa::Pkcs1v15Encrypt, &obfuscated)
    };
    encrypted.map_err(|e| Error::interface(format!("RSA password encryption failed: {e}")))
}

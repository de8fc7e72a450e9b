//! Password hashing (spec.md §6).
//!
//! Primary scheme: bcrypt, with the password truncated to 72 bytes before
//! hashing and before verification (REDESIGN FLAG: "documented behavior to
//! preserve", not a bug — bcrypt silently ignores bytes past 72 and a
//! rewrite that "fixes" this would break every hash stored under the old
//! behavior). Fallback, used when bcrypt itself errors out: PBKDF2-HMAC-
//! SHA256, 100,000 iterations, 16-byte hex salt, stored as
//! `pbkdf2_$<salt_hex>$<digest_hex>` and detected on verify by the
//! `pbkdf2_$` prefix — grounded on
//! `original_source/backend/core/infrastructure/auth/security.py`.

use hmac::Hmac;
use sha2::Sha256;

const PBKDF2_PREFIX: &str = "pbkdf2_";
const PBKDF2_ITERATIONS: u32 = 100_000;

fn truncate_72(password: &str) -> &str {
    if password.len() <= 72 {
        return password;
    }
    let mut end = 72;
    while !password.is_char_boundary(end) {
        end -= 1;
    }
    &password[..end]
}

/// Hashes a password, preferring bcrypt and falling back to PBKDF2 if
/// bcrypt returns an error (e.g. a cost-parameter misconfiguration).
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let truncated = truncate_72(password);
    match bcrypt::hash(truncated, bcrypt::DEFAULT_COST) {
        Ok(hash) => Ok(hash),
        Err(e) => {
            tracing::warn!("bcrypt hashing failed ({}), falling back to pbkdf2", e);
            Ok(hash_password_pbkdf2(truncated))
        }
    }
}

fn hash_password_pbkdf2(password: &str) -> String {
    use rand::RngCore;
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt_hex = hex::encode(salt);

    let mut digest = [0u8; 32];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(
        password.as_bytes(),
        salt_hex.as_bytes(),
        PBKDF2_ITERATIONS,
        &mut digest,
    )
    .expect("hmac can be initialized with any key length");

    format!("{}${}${}", PBKDF2_PREFIX, salt_hex, hex::encode(digest))
}

/// Verifies a plaintext password against a stored hash produced by
/// either `hash_password` path.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let truncated = truncate_72(password);

    if let Some(rest) = stored_hash.strip_prefix(PBKDF2_PREFIX).and_then(|r| r.strip_prefix('$')) {
        let Some((salt_hex, digest_hex)) = rest.split_once('$') else {
            return false;
        };
        let Ok(expected_digest) = hex::decode(digest_hex) else {
            return false;
        };

        let mut digest = vec![0u8; expected_digest.len()];
        if pbkdf2::pbkdf2::<Hmac<Sha256>>(
            truncated.as_bytes(),
            salt_hex.as_bytes(),
            PBKDF2_ITERATIONS,
            &mut digest,
        )
        .is_err()
        {
            return false;
        }

        use subtle::ConstantTimeEq;
        return digest.ct_eq(&expected_digest).into();
    }

    bcrypt::verify(truncated, stored_hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bcrypt_round_trip() {
        let hash = hash_password("hunter22").unwrap();
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn pbkdf2_round_trip() {
        let hash = hash_password_pbkdf2("hunter22");
        assert!(hash.starts_with(PBKDF2_PREFIX));
        assert!(verify_password("hunter22", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn truncates_beyond_72_bytes_consistently() {
        let long = "a".repeat(100);
        let hash = hash_password(&long).unwrap();
        // Anything sharing the first 72 bytes verifies identically.
        let also_long = format!("{}{}", "a".repeat(72), "different-tail");
        assert!(verify_password(&also_long, &hash));
    }
}

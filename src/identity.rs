use crate::errors::{AppError, AppResult};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

const NONCE_LEN: usize = 12;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
}

/// Lets exactly one verified account through.
#[derive(Debug, Clone)]
pub struct IdentityGate {
    allowed_email: Option<String>,
}

impl IdentityGate {
    pub fn new(allowed_email: Option<&str>) -> Self {
        Self {
            allowed_email: allowed_email
                .map(normalize_email)
                .filter(|value| !value.is_empty()),
        }
    }

    pub fn authorize(&self, identity: Option<&str>) -> AppResult<Identity> {
        let Some(allowed) = self.allowed_email.as_deref() else {
            return Err(AppError::Unauthorized(
                "No allow-listed account configured".to_string(),
            ));
        };
        let Some(candidate) = identity.map(normalize_email).filter(|value| !value.is_empty()) else {
            return Err(AppError::Unauthorized("Sign-in required".to_string()));
        };
        if candidate != allowed {
            tracing::warn!(email = %candidate, "rejected identity outside allow-list");
            return Err(AppError::Unauthorized(format!(
                "{} is not allowed",
                candidate
            )));
        }
        Ok(Identity { email: candidate })
    }
}

fn normalize_email(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionClaims {
    email: String,
    expires_at: DateTime<Utc>,
}

/// Seals the signed-in identity into an opaque, expiring cookie value.
#[derive(Clone)]
pub struct SessionSealer {
    key: [u8; 32],
    ttl: Duration,
}

impl SessionSealer {
    pub fn new(key: [u8; 32], ttl: Duration) -> Self {
        Self { key, ttl }
    }

    /// Uses the configured base64 key, or a fresh random one so sessions
    /// simply end on restart.
    pub fn from_config(encoded_key: Option<&str>, ttl: Duration) -> AppResult<Self> {
        let Some(encoded) = encoded_key else {
            tracing::info!("no session key configured; generating an ephemeral one");
            return Ok(Self::new(rand::random(), ttl));
        };
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|error| AppError::Config(format!("session_key is not base64: {}", error)))?;
        if decoded.len() != 32 {
            return Err(AppError::Config(format!(
                "session_key must decode to 32 bytes, got {}",
                decoded.len()
            )));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&decoded);
        Ok(Self::new(key, ttl))
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn seal(&self, identity: &Identity, now: DateTime<Utc>) -> AppResult<String> {
        let claims = SessionClaims {
            email: identity.email.clone(),
            expires_at: now + self.ttl,
        };
        let plaintext = serde_json::to_vec(&claims)?;

        let cipher = self.cipher()?;
        let nonce_bytes: [u8; NONCE_LEN] = rand::random();
        let encrypted = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
            .map_err(|error| AppError::Internal(error.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + encrypted.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&encrypted);
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(sealed))
    }

    pub fn open(&self, token: &str, now: DateTime<Utc>) -> AppResult<Identity> {
        let sealed = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|_| AppError::Unauthorized("Malformed session".to_string()))?;
        if sealed.len() <= NONCE_LEN {
            return Err(AppError::Unauthorized("Malformed session".to_string()));
        }
        let (nonce_bytes, encrypted) = sealed.split_at(NONCE_LEN);

        let plaintext = self
            .cipher()?
            .decrypt(Nonce::from_slice(nonce_bytes), encrypted)
            .map_err(|_| AppError::Unauthorized("Session failed verification".to_string()))?;
        let claims: SessionClaims = serde_json::from_slice(&plaintext)
            .map_err(|_| AppError::Unauthorized("Malformed session".to_string()))?;

        if claims.expires_at <= now {
            return Err(AppError::Unauthorized("Session expired".to_string()));
        }
        Ok(Identity { email: claims.email })
    }

    fn cipher(&self) -> AppResult<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.key).map_err(|error| AppError::Internal(error.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sealer() -> SessionSealer {
        SessionSealer::new([7u8; 32], Duration::minutes(60))
    }

    fn me() -> Identity {
        Identity {
            email: "me@example.com".to_string(),
        }
    }

    #[test]
    fn gate_admits_only_the_allow_listed_email() {
        let gate = IdentityGate::new(Some(" Me@Example.com "));
        assert_eq!(gate.authorize(Some("me@example.COM")).expect("allowed"), me());
        assert!(matches!(gate.authorize(Some("you@example.com")), Err(AppError::Unauthorized(_))));
        assert!(matches!(gate.authorize(None), Err(AppError::Unauthorized(_))));
        assert!(matches!(gate.authorize(Some("  ")), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn gate_without_allow_list_rejects_everyone() {
        let gate = IdentityGate::new(None);
        assert!(gate.authorize(Some("me@example.com")).is_err());
    }

    #[test]
    fn session_opens_until_expiry() {
        let sealer = sealer();
        let now = Utc::now();
        let token = sealer.seal(&me(), now).expect("seal");
        assert_eq!(sealer.open(&token, now + Duration::minutes(59)).expect("open"), me());

        let error = sealer
            .open(&token, now + Duration::minutes(60))
            .expect_err("expired");
        assert!(error.to_string().contains("expired"));
    }

    #[test]
    fn tampered_or_foreign_sessions_are_rejected() {
        let now = Utc::now();
        let token = sealer().seal(&me(), now).expect("seal");

        let other = SessionSealer::new([9u8; 32], Duration::minutes(60));
        assert!(other.open(&token, now).is_err());

        let mut bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(&token)
            .expect("decode");
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes);
        assert!(sealer().open(&tampered, now).is_err());

        assert!(sealer().open("not a token!", now).is_err());
        assert!(sealer().open("", now).is_err());
    }

    #[test]
    fn configured_key_must_be_32_bytes() {
        let short = base64::engine::general_purpose::STANDARD.encode([1u8; 16]);
        assert!(matches!(
            SessionSealer::from_config(Some(&short), Duration::minutes(5)),
            Err(AppError::Config(_))
        ));

        let good = base64::engine::general_purpose::STANDARD.encode([1u8; 32]);
        let sealer = SessionSealer::from_config(Some(&good), Duration::minutes(5)).expect("sealer");
        assert_eq!(sealer.ttl(), Duration::minutes(5));
        assert!(SessionSealer::from_config(None, Duration::minutes(5)).is_ok());
    }
}

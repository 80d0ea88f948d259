use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuthError;

/// Claims carried by driver access tokens. Tokens are issued elsewhere in the
/// platform; this subsystem only validates them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Validate signature and expiry (HS256), then resolve the subject to a
/// driver id. Signature, expiry, and malformed-subject failures all collapse
/// to `InvalidToken`; the caller never learns which check tripped.
pub fn verify_driver_token(secret: &[u8], token: &str) -> Result<Uuid, AuthError> {
    let validation = Validation::new(Algorithm::HS256);
    let data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|_| AuthError::InvalidToken)?;

    Uuid::parse_str(&data.claims.sub).map_err(|_| AuthError::InvalidToken)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use uuid::Uuid;

    use super::{verify_driver_token, Claims};
    use crate::error::AuthError;

    const SECRET: &[u8] = b"test-secret";

    fn token_for(sub: String, offset_secs: i64) -> String {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub,
            iat: now,
            exp: now + offset_secs,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_resolves_driver_id() {
        let driver_id = Uuid::new_v4();
        let token = token_for(driver_id.to_string(), 600);

        assert_eq!(verify_driver_token(SECRET, &token), Ok(driver_id));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = token_for(Uuid::new_v4().to_string(), -600);

        assert_eq!(
            verify_driver_token(SECRET, &token),
            Err(AuthError::InvalidToken)
        );
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = token_for(Uuid::new_v4().to_string(), 600);

        assert_eq!(
            verify_driver_token(b"other-secret", &token),
            Err(AuthError::InvalidToken)
        );
    }

    #[test]
    fn non_uuid_subject_is_rejected() {
        let token = token_for("not-a-driver-id".to_string(), 600);

        assert_eq!(
            verify_driver_token(SECRET, &token),
            Err(AuthError::InvalidToken)
        );
    }
}

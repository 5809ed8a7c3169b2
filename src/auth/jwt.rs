use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::config::JwtConfig;

use super::{AuthError, Claims};

pub struct JwtValidator {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(config: &JwtConfig) -> Self {
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        let mut validation = Validation::default();

        if let Some(ref issuer) = config.issuer {
            validation.set_issuer(&[issuer]);
        }

        if let Some(ref audience) = config.audience {
            validation.set_audience(&[audience]);
        }

        Self {
            decoding_key,
            validation,
        }
    }

    pub fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        let token_data =
            decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
                match e.kind() {
                    ErrorKind::ExpiredSignature => AuthError::CredentialExpired,
                    _ => AuthError::CredentialInvalid(e.to_string()),
                }
            })?;

        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::DEFAULT_TENANT_ID;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn create_test_config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret-key-for-testing".to_string(),
            issuer: None,
            audience: None,
        }
    }

    fn create_test_token(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::default(),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn create_test_claims(exp_offset: i64) -> Claims {
        Claims {
            sub: "user-123".to_string(),
            exp: chrono::Utc::now().timestamp() + exp_offset,
            iat: chrono::Utc::now().timestamp(),
            tenant_id: Some("farm-7".to_string()),
            extra: Default::default(),
        }
    }

    #[test]
    fn test_valid_token() {
        let config = create_test_config();
        let validator = JwtValidator::new(&config);

        let token = create_test_token(&create_test_claims(3600), &config.secret);
        let result = validator.validate(&token);

        assert!(result.is_ok());
        let validated_claims = result.unwrap();
        assert_eq!(validated_claims.sub, "user-123");
        assert_eq!(validated_claims.tenant_id(), "farm-7");
    }

    #[test]
    fn test_expired_token() {
        let config = create_test_config();
        let validator = JwtValidator::new(&config);

        let token = create_test_token(&create_test_claims(-3600), &config.secret);
        let result = validator.validate(&token);

        assert!(matches!(result, Err(AuthError::CredentialExpired)));
    }

    #[test]
    fn test_garbage_token() {
        let config = create_test_config();
        let validator = JwtValidator::new(&config);

        let result = validator.validate("not-a-token");
        assert!(matches!(result, Err(AuthError::CredentialInvalid(_))));
    }

    #[test]
    fn test_wrong_secret() {
        let config = create_test_config();
        let validator = JwtValidator::new(&config);

        let token = create_test_token(&create_test_claims(3600), "some-other-secret");
        let result = validator.validate(&token);

        assert!(matches!(result, Err(AuthError::CredentialInvalid(_))));
    }

    #[test]
    fn missing_tenant_falls_back_to_default() {
        let config = create_test_config();
        let validator = JwtValidator::new(&config);

        let mut claims = create_test_claims(3600);
        claims.tenant_id = None;

        let token = create_test_token(&claims, &config.secret);
        let validated = validator.validate(&token).unwrap();
        assert_eq!(validated.tenant_id(), DEFAULT_TENANT_ID);
    }
}

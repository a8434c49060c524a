use anyhow::{anyhow, bail, Context};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tasklive_common::types::UserId;

pub const ACCESS_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Claims shared with the REST layer. Tokens minted there carry the user id
/// as `userId`, tokens minted here as `sub`; both are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct AccessTokenClaims {
    #[serde(alias = "userId")]
    sub: UserId,
    #[serde(default)]
    iat: i64,
    exp: i64,
}

#[derive(Clone)]
pub struct JwtAccessTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtAccessTokenService {
    pub fn new(secret: &str) -> anyhow::Result<Self> {
        if secret.len() < 32 {
            bail!("jwt secret must be at least 32 characters long");
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    pub fn issue_access_token(&self, user_id: &UserId) -> anyhow::Result<String> {
        self.issue_access_token_at(user_id, current_unix_timestamp()?)
    }

    fn issue_access_token_at(&self, user_id: &UserId, issued_at: i64) -> anyhow::Result<String> {
        let claims = AccessTokenClaims {
            sub: user_id.clone(),
            iat: issued_at,
            exp: issued_at + ACCESS_TOKEN_TTL_SECONDS,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("failed to encode access token")
    }

    /// Returns the logical user id the token was issued for.
    pub fn validate_access_token(&self, token: &str) -> anyhow::Result<UserId> {
        let claims = decode::<AccessTokenClaims>(token, &self.decoding_key, &self.validation)
            .context("failed to decode access token")?
            .claims;

        Ok(claims.sub)
    }
}

fn current_unix_timestamp() -> anyhow::Result<i64> {
    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|error| anyhow!("system clock is before unix epoch: {error}"))?;

    i64::try_from(duration.as_secs()).context("unix timestamp overflow")
}

//! Claris ID login for FileMaker Cloud.
//!
//! Cloud servers do not accept basic auth. The client first obtains an
//! identity token from Amazon Cognito, then exchanges it for a regular
//! Data API session token using an `FMID` authorization header. The
//! Cognito exchange itself is delegated to an [`IdentityProvider`].

use std::fmt;
use std::sync::Arc;

use crate::error::{BoxError, Error, Result};

/// User pool shared by all FileMaker Cloud instances.
pub const DEFAULT_USER_POOL_ID: &str = "us-west-2_NqkuZcXQY";
/// App client id shared by all FileMaker Cloud instances.
pub const DEFAULT_CLIENT_ID: &str = "4l9rvl4mv5es1eep1qe97cautn";

/// Exchanges Claris ID credentials for an identity token.
pub trait IdentityProvider: Send + Sync {
    fn identity_token(
        &self,
        user_pool_id: &str,
        client_id: &str,
        username: &str,
        password: &str,
    ) -> std::result::Result<String, BoxError>;
}

impl<F> IdentityProvider for F
where
    F: Fn(&str, &str, &str, &str) -> std::result::Result<String, BoxError> + Send + Sync,
{
    fn identity_token(
        &self,
        user_pool_id: &str,
        client_id: &str,
        username: &str,
        password: &str,
    ) -> std::result::Result<String, BoxError> {
        self(user_pool_id, client_id, username, password)
    }
}

#[derive(Clone)]
pub struct CloudAuth {
    pub user_pool_id: String,
    pub client_id: String,
    provider: Arc<dyn IdentityProvider>,
}

impl CloudAuth {
    pub fn new(provider: impl IdentityProvider + 'static) -> Self {
        Self {
            user_pool_id: DEFAULT_USER_POOL_ID.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            provider: Arc::new(provider),
        }
    }

    pub fn with_user_pool_id(mut self, user_pool_id: impl Into<String>) -> Self {
        self.user_pool_id = user_pool_id.into();
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub(crate) fn identity_token(&self, username: &str, password: &str) -> Result<String> {
        self.provider
            .identity_token(&self.user_pool_id, &self.client_id, username, password)
            .map_err(Error::Authentication)
    }
}

impl fmt::Debug for CloudAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudAuth")
            .field("user_pool_id", &self.user_pool_id)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_token_expected_default_ids_passed_to_provider() {
        let auth = CloudAuth::new(|pool: &str, client: &str, user: &str, _password: &str| {
            Ok::<_, BoxError>(format!("{pool}|{client}|{user}"))
        });
        let token = auth.identity_token("jane@example.com", "pw").expect("token");
        assert_eq!(
            token,
            format!("{DEFAULT_USER_POOL_ID}|{DEFAULT_CLIENT_ID}|jane@example.com")
        );
    }

    #[test]
    fn identity_token_provider_failure_expected_authentication_error() {
        let auth = CloudAuth::new(|_: &str, _: &str, _: &str, _: &str| {
            Err::<String, BoxError>("NotAuthorizedException: Incorrect username or password.".into())
        })
        .with_user_pool_id("eu-central-1_custom");

        let error = auth.identity_token("jane", "wrong").expect_err("provider fails");
        assert!(matches!(error, Error::Authentication(_)));
        assert!(error.to_string().contains("Incorrect username or password"));
    }
}

use super::{
    auth::VaultHasher, AuthToken, AuthTokenValue, UserAuthCredentials, UserStore,
    UsernamePasswordCredentials,
};
use anyhow::{bail, Context, Result};
use std::{sync::Arc, time::SystemTime};
use tracing::{debug, info};

pub struct UserManager {
    user_store: Arc<dyn UserStore>,
}

impl UserManager {
    pub fn new(user_store: Arc<dyn UserStore>) -> Self {
        Self { user_store }
    }

    pub fn add_user<T: AsRef<str>>(&self, user_handle: T) -> Result<usize> {
        let user_handle = user_handle.as_ref();
        if user_handle.is_empty() {
            bail!("The user handle cannot be empty.")
        }
        if self.user_store.get_user_id(user_handle)?.is_some() {
            bail!("User handle already exists.");
        }
        let user_id = self.user_store.create_user(user_handle)?;
        info!("Created user {} with id {}", user_handle, user_id);
        Ok(user_id)
    }

    pub fn get_user_id(&self, user_handle: &str) -> Result<Option<usize>> {
        self.user_store.get_user_id(user_handle)
    }

    pub fn get_user_handle(&self, user_id: usize) -> Result<Option<String>> {
        self.user_store.get_user_handle(user_id)
    }

    pub fn get_all_user_handles(&self) -> Result<Vec<String>> {
        self.user_store.get_all_user_handles()
    }

    pub fn get_auth_token(&self, value: &AuthTokenValue) -> Result<Option<AuthToken>> {
        self.user_store.get_user_auth_token(value)
    }

    pub fn update_auth_token_last_used(&self, value: &AuthTokenValue) -> Result<()> {
        self.user_store
            .update_user_auth_token_last_used_timestamp(value)
    }

    /// Checks the password of `user_handle` and hands out a new session token.
    /// Returns Ok(None) when the user doesn't exist, has no password or the
    /// password is wrong.
    pub fn login(&self, user_handle: &str, password: &str) -> Result<Option<AuthToken>> {
        let credentials = match self.user_store.get_user_auth_credentials(user_handle)? {
            Some(credentials) => credentials,
            None => {
                debug!("Login attempt for unknown user {}", user_handle);
                return Ok(None);
            }
        };
        let password_credentials = match &credentials.username_password {
            Some(password_credentials) => password_credentials,
            None => {
                debug!("User {} has no password credentials", user_handle);
                return Ok(None);
            }
        };
        if !password_credentials
            .hasher
            .verify(password, password_credentials.hash.as_str())?
        {
            debug!("Wrong password for user {}", user_handle);
            return Ok(None);
        }
        Ok(Some(self.generate_auth_token(&credentials)?))
    }

    pub fn generate_auth_token(&self, credentials: &UserAuthCredentials) -> Result<AuthToken> {
        let token = AuthToken {
            user_id: credentials.user_id,
            value: AuthTokenValue::generate(),
            created: SystemTime::now(),
            last_used: None,
        };
        self.user_store.add_user_auth_token(token.clone())?;
        Ok(token)
    }

    fn create_hashed_password(
        user_id: usize,
        password: &str,
    ) -> Result<UsernamePasswordCredentials> {
        let hasher = VaultHasher::Argon2;
        let salt = hasher.generate_b64_salt();
        let hash = hasher.hash(password.as_bytes(), &salt)?;
        Ok(UsernamePasswordCredentials {
            user_id,
            salt,
            hash,
            hasher,
            created: SystemTime::now(),
            last_tried: None,
            last_used: None,
        })
    }

    pub fn create_password_credentials(&self, user_handle: &str, password: &str) -> Result<()> {
        let mut credentials = self
            .user_store
            .get_user_auth_credentials(user_handle)?
            .with_context(|| format!("User with handle {} not found.", user_handle))?;
        if credentials.username_password.is_some() {
            bail!(
                "User with handle {} already has password credentials method. Maybe you want to modify it?",
                user_handle
            );
        }
        credentials.username_password =
            Some(Self::create_hashed_password(credentials.user_id, password)?);
        self.user_store.update_user_auth_credentials(credentials)
    }

    pub fn update_password_credentials(&self, user_handle: &str, password: &str) -> Result<()> {
        let mut credentials = self
            .user_store
            .get_user_auth_credentials(user_handle)?
            .with_context(|| format!("User with handle {} not found.", user_handle))?;
        if credentials.username_password.is_none() {
            bail!(
                "Cannot update password of user with handle {} since it never had one.",
                user_handle
            );
        }
        credentials.username_password =
            Some(Self::create_hashed_password(credentials.user_id, password)?);
        self.user_store.update_user_auth_credentials(credentials)
    }

    pub fn delete_password_credentials(&self, user_handle: &str) -> Result<()> {
        let mut credentials = self
            .user_store
            .get_user_auth_credentials(user_handle)?
            .with_context(|| format!("User with handle {} not found.", user_handle))?;
        credentials.username_password = None;
        self.user_store.update_user_auth_credentials(credentials)
    }

    pub fn get_user_credentials(&self, user_handle: &str) -> Result<Option<UserAuthCredentials>> {
        self.user_store.get_user_auth_credentials(user_handle)
    }

    /// Deletes the token, as long as it belongs to `user_id`.
    pub fn delete_auth_token(&self, user_id: usize, token_value: &AuthTokenValue) -> Result<()> {
        let token = self
            .user_store
            .get_user_auth_token(token_value)?
            .with_context(|| format!("Did not find auth token {}", token_value.0))?;
        if token.user_id != user_id {
            bail!(
                "Tried to delete auth token {}, but the authenticated user {} was not the owner {} of the token.",
                token_value.0,
                user_id,
                token.user_id
            );
        }
        self.user_store.delete_user_auth_token(token_value)?;
        Ok(())
    }

    pub fn get_user_tokens(&self, user_handle: &str) -> Result<Vec<AuthToken>> {
        self.user_store.get_all_user_auth_tokens(user_handle)
    }
}

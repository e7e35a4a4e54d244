//! User service for registration and credential verification.

use anyhow::{Context, Result, bail};
use tracing::{info, instrument};

use super::models::{CreateUserRequest, User};
use super::repository::UserRepository;

/// Service for user management operations.
#[derive(Debug, Clone)]
pub struct UserService {
    repo: UserRepository,
}

impl UserService {
    pub fn new(repo: UserRepository) -> Self {
        Self { repo }
    }

    /// Register a new user with validation.
    #[instrument(skip(self, password), fields(username = %username))]
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<User> {
        if !is_valid_username(username) {
            bail!(
                "Invalid username format. Must be 3-50 alphanumeric characters, underscores, or hyphens."
            );
        }
        if !is_valid_email(email) {
            bail!("Invalid email format.");
        }
        if password.len() < 6 {
            bail!("Password must be at least 6 characters.");
        }

        if self.repo.get_by_username(username).await?.is_some() {
            bail!("Username '{}' is already taken.", username);
        }
        if self.repo.get_by_email(email).await?.is_some() {
            bail!("Email '{}' is already registered.", email);
        }

        let password_hash = hash_password(password)?;
        let user = self
            .repo
            .create(CreateUserRequest {
                username: username.to_string(),
                email: email.to_string(),
                password_hash,
            })
            .await?;

        info!(user_id = %user.id, username = %user.username, "Registered new user");
        Ok(user)
    }

    /// Verify credentials by email. Returns None on any mismatch so callers
    /// cannot distinguish a missing account from a wrong password.
    #[instrument(skip(self, password))]
    pub async fn verify_credentials(&self, email: &str, password: &str) -> Result<Option<User>> {
        let user = self.repo.get_by_email(email).await?;

        match user {
            Some(user) if verify_password(password, &user.password_hash)? => {
                self.repo.update_last_login(&user.id).await?;
                Ok(Some(user))
            }
            _ => Ok(None),
        }
    }

    /// Get a user by ID.
    #[instrument(skip(self))]
    pub async fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.repo.get(id).await
    }
}

fn is_valid_username(username: &str) -> bool {
    let len = username.len();
    (3..=50).contains(&len)
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST).context("hashing password")
}

fn verify_password(password: &str, hash: &str) -> Result<bool> {
    bcrypt::verify(password, hash).context("verifying password")
}

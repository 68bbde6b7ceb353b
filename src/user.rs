use crate::models::User;
use crate::storage::{Storage, StorageKey};

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("all fields are required")]
    MissingFields,

    #[error("username and password are required")]
    MissingCredentials,

    #[error("passwords do not match")]
    PasswordMismatch,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Local, single-account sign-in. Credentials are kept as entered.
#[derive(Debug, Clone)]
pub struct Accounts {
    storage: Storage,
    user: Option<User>,
}

impl Accounts {
    pub fn load(storage: Storage) -> anyhow::Result<Self> {
        let user = storage.load(StorageKey::ActiveUser)?;
        Ok(Self { storage, user })
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn register(
        &mut self,
        username: &str,
        email: &str,
        password: &str,
        confirm: &str,
    ) -> Result<&User, AccountError> {
        if [username, email, password, confirm].iter().any(|f| f.is_empty()) {
            return Err(AccountError::MissingFields);
        }
        if password != confirm {
            return Err(AccountError::PasswordMismatch);
        }

        let user = User {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
        };
        self.storage.save(StorageKey::RegisteredUser, &user)?;
        self.storage.save(StorageKey::ActiveUser, &user)?;
        Ok(self.user.insert(user))
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<&User, AccountError> {
        if username.is_empty() || password.is_empty() {
            return Err(AccountError::MissingCredentials);
        }

        let registered: Option<User> = self.storage.load(StorageKey::RegisteredUser)?;
        match registered {
            Some(u) if u.username == username && u.password == password => {
                self.storage.save(StorageKey::ActiveUser, &u)?;
                Ok(self.user.insert(u))
            }
            _ => {
                self.logout()?;
                Err(AccountError::InvalidCredentials)
            }
        }
    }

    pub fn logout(&mut self) -> anyhow::Result<()> {
        self.user = None;
        self.storage.remove(StorageKey::ActiveUser)
    }
}

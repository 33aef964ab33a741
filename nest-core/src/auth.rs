//! Emulated accounts, sign-in state and the two-member login gate.
//!
//! ```text
//! login(code, secret)
//!   │  code ∈ {812, 917}?  secret == 511511?
//!   ▼
//! userToken := code ──► AuthService::sign_in ──► Accounts::sign_in(email, pw)
//!   │                         │
//!   │ on failure              ▼
//!   └─ remove userToken   notify auth listeners (current user)
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use nest_store::{KeyValueStore, StoreError};

use crate::couple::{email_for_code, Member};
use crate::error::NestError;

/// Secret shared by both members.
pub const SHARED_SECRET: &str = "511511";

/// Storage key cleared on sign-out.
pub const SESSION_TOKEN_KEY: &str = "cloudbase_token";

/// Storage key holding the code of the member who logged in.
pub const USER_TOKEN_KEY: &str = "userToken";

/// A signed-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
}

#[derive(Debug, Clone)]
struct Account {
    uid: String,
    email: String,
    password: String,
}

/// Registry of emulated accounts, keyed by email.
pub struct Accounts {
    accounts: RwLock<HashMap<String, Account>>,
    storage: Arc<dyn KeyValueStore>,
}

impl Accounts {
    /// Registry pre-seeded with both members' accounts.
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        let accounts = Member::ALL
            .iter()
            .map(|m| {
                let email = m.email();
                let account = Account {
                    uid: format!("user{}", m.code()),
                    email: email.clone(),
                    password: SHARED_SECRET.to_string(),
                };
                (email, account)
            })
            .collect();
        Self {
            accounts: RwLock::new(accounts),
            storage,
        }
    }

    pub fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, NestError> {
        let accounts = self.accounts.read().map_err(|_| StoreError::LockPoisoned)?;
        match accounts.get(email) {
            Some(account) if account.password == password => Ok(AuthUser {
                uid: account.uid.clone(),
                email: account.email.clone(),
            }),
            _ => {
                log::warn!("Rejected sign-in for {email}");
                Err(NestError::InvalidCredentials)
            }
        }
    }

    /// Create or replace an account. The uid is the part of the email
    /// before `@`.
    pub fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, NestError> {
        let uid = email.split('@').next().unwrap_or(email).to_string();
        let account = Account {
            uid: uid.clone(),
            email: email.to_string(),
            password: password.to_string(),
        };
        self.accounts
            .write()
            .map_err(|_| StoreError::LockPoisoned)?
            .insert(email.to_string(), account);
        log::debug!("Account {email} registered");
        Ok(AuthUser {
            uid,
            email: email.to_string(),
        })
    }

    pub fn sign_out(&self) -> Result<(), NestError> {
        self.storage.remove_item(SESSION_TOKEN_KEY)?;
        Ok(())
    }

    pub fn contains(&self, email: &str) -> bool {
        self.accounts
            .read()
            .map(|accounts| accounts.contains_key(email))
            .unwrap_or(false)
    }
}

/// The signed-in member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: AuthUser,
    pub member: Member,
}

type AuthCallback = Arc<dyn Fn(Option<&AuthUser>) + Send + Sync>;
type AuthListeners = RwLock<Vec<(u64, AuthCallback)>>;

/// Tracks who is signed in and tells listeners when that changes.
pub struct AuthService {
    accounts: Arc<Accounts>,
    storage: Arc<dyn KeyValueStore>,
    current: RwLock<Option<AuthUser>>,
    listeners: Arc<AuthListeners>,
    next_id: AtomicU64,
}

impl AuthService {
    pub fn new(accounts: Arc<Accounts>, storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            accounts,
            storage,
            current: RwLock::new(None),
            listeners: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Sign in with a member code (any code, not only the two members).
    pub fn sign_in(&self, code: &str, secret: &str) -> Result<AuthUser, NestError> {
        let user = self.accounts.sign_in(&email_for_code(code), secret)?;
        self.set_current(Some(user.clone()))?;
        log::info!("Signed in as {}", user.email);
        Ok(user)
    }

    pub fn sign_out(&self) -> Result<(), NestError> {
        self.accounts.sign_out()?;
        self.set_current(None)?;
        log::info!("Signed out");
        Ok(())
    }

    pub fn current_user(&self) -> Option<AuthUser> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current session, when the signed-in account belongs to a member.
    pub fn session(&self) -> Option<Session> {
        let user = self.current_user()?;
        let member = Member::from_email(&user.email)?;
        Some(Session { user, member })
    }

    /// Gatekeeper for the app: only the two members with the shared secret
    /// get in. The `userToken` key is written first and rolled back when the
    /// sign-in fails.
    pub fn login(&self, code: &str, secret: &str) -> Result<Session, NestError> {
        let member = Member::from_code(code)?;
        if secret != SHARED_SECRET {
            return Err(NestError::WrongSecret);
        }

        self.storage.set_item(USER_TOKEN_KEY, member.code())?;
        match self.sign_in(member.code(), secret) {
            Ok(user) => Ok(Session { user, member }),
            Err(e) => {
                log::error!("Login failed for {member}: {e}");
                self.storage.remove_item(USER_TOKEN_KEY)?;
                Err(e)
            }
        }
    }

    pub fn logout(&self) -> Result<(), NestError> {
        self.sign_out()?;
        self.storage.remove_item(USER_TOKEN_KEY)?;
        Ok(())
    }

    /// Subscribe to sign-in state. The callback runs immediately with the
    /// current user, then on every sign-in and sign-out.
    pub fn on_auth_state_changed<F>(&self, callback: F) -> AuthSubscription
    where
        F: Fn(Option<&AuthUser>) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let callback: AuthCallback = Arc::new(callback);
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, callback.clone()));

        let current = self.current_user();
        invoke(&callback, current.as_ref());

        AuthSubscription {
            listeners: Arc::downgrade(&self.listeners),
            id,
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn set_current(&self, user: Option<AuthUser>) -> Result<(), NestError> {
        *self.current.write().map_err(|_| StoreError::LockPoisoned)? = user.clone();

        let callbacks: Vec<AuthCallback> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        for callback in &callbacks {
            invoke(callback, user.as_ref());
        }
        Ok(())
    }
}

fn invoke(callback: &AuthCallback, user: Option<&AuthUser>) {
    if catch_unwind(AssertUnwindSafe(|| callback(user))).is_err() {
        log::error!("Auth listener panicked");
    }
}

/// Handle for an auth-state listener; dropping it unsubscribes.
#[must_use = "dropping an AuthSubscription unsubscribes immediately"]
pub struct AuthSubscription {
    listeners: Weak<AuthListeners>,
    id: u64,
}

impl AuthSubscription {
    pub fn unsubscribe(self) {}
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|(id, _)| *id != self.id);
        }
    }
}

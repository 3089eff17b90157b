//! Email and password identities with a single active session.

use crate::core::store::DocumentStore;
use crate::core::{Error, Result, StoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

const SESSION_PATH: &str = "session/current";
const MIN_PASSWORD_LEN: usize = 6;
const PASSWORD_HASH_ROUNDS: u32 = 50_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub email: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn create_account(&self, email: &str, password: &str) -> Result<Identity>;
    async fn authenticate(&self, email: &str, password: &str) -> Result<Identity>;
    async fn end_session(&self) -> Result<()>;
    async fn current(&self) -> Result<Option<Identity>>;
    /// Observes the active identity; `None` while signed out.
    fn on_session_change(&self) -> watch::Receiver<Option<Identity>>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Credential {
    uid: String,
    email: String,
    password_hash: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionDoc {
    identity: Option<Identity>,
}

/// Identity provider keeping credentials and the session in the document store.
pub struct LocalIdentityProvider {
    store: Arc<dyn DocumentStore>,
    session: watch::Sender<Option<Identity>>,
}

impl LocalIdentityProvider {
    /// Opens the provider and restores any persisted session.
    pub async fn open(store: Arc<dyn DocumentStore>) -> Result<Self> {
        let restored = match store.get(SESSION_PATH).await? {
            Some(snapshot) => snapshot.decode::<SessionDoc>()?.identity,
            None => None,
        };
        debug!(signed_in = restored.is_some(), "Restored session");
        let (session, _) = watch::channel(restored);
        Ok(Self { store, session })
    }

    async fn start_session(&self, identity: Identity) -> Result<Identity> {
        let doc = SessionDoc {
            identity: Some(identity.clone()),
        };
        self.store
            .set(SESSION_PATH, serde_json::to_value(&doc).map_err(StoreError::from)?)
            .await?;
        self.session.send_replace(Some(identity.clone()));
        info!(uid = %identity.uid, "Session started");
        Ok(identity)
    }
}

/// Stable uid derived from the normalized email.
pub fn uid_for(email: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_email(email).as_bytes());
    let mut uid = hex::encode(hasher.finalize());
    uid.truncate(28);
    uid
}

/// Iterated SHA-256 salted with the uid.
///
/// This is a local stand-in for a hosted identity service and only guards the
/// simulated accounts in the data directory. It is not a memory-hard KDF and
/// must not protect real credentials.
fn hash_password(uid: &str, password: &str) -> String {
    let mut digest = Sha256::new()
        .chain_update(uid.as_bytes())
        .chain_update(b":")
        .chain_update(password.as_bytes())
        .finalize();
    for _ in 1..PASSWORD_HASH_ROUNDS {
        digest = Sha256::new()
            .chain_update(digest)
            .chain_update(password.as_bytes())
            .finalize();
    }
    hex::encode(digest)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<()> {
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'));
    if valid && !email.contains(char::is_whitespace) {
        Ok(())
    } else {
        Err(Error::AuthFailure(
            "The email address is badly formatted.".to_string(),
        ))
    }
}

fn credential_path(uid: &str) -> String {
    format!("credentials/{uid}")
}

#[async_trait]
impl IdentityProvider for LocalIdentityProvider {
    async fn create_account(&self, email: &str, password: &str) -> Result<Identity> {
        let email = normalize_email(email);
        validate_email(&email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(Error::AuthFailure(format!(
                "Password should be at least {MIN_PASSWORD_LEN} characters."
            )));
        }

        let uid = uid_for(&email);
        let credential = Credential {
            uid: uid.clone(),
            email: email.clone(),
            password_hash: hash_password(&uid, password),
        };
        let created = self
            .store
            .create(
                &credential_path(&uid),
                serde_json::to_value(&credential).map_err(StoreError::from)?,
            )
            .await?;
        if created.is_none() {
            return Err(Error::AuthFailure(
                "The email address is already in use by another account.".to_string(),
            ));
        }

        info!(%uid, "Created identity");
        self.start_session(Identity { uid, email }).await
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<Identity> {
        let email = normalize_email(email);
        let uid = uid_for(&email);
        let invalid = || Error::AuthFailure("Invalid email or password.".to_string());

        let credential: Credential = self
            .store
            .get(&credential_path(&uid))
            .await?
            .ok_or_else(invalid)?
            .decode()?;
        if credential.password_hash != hash_password(&uid, password) {
            debug!(%uid, "Password mismatch");
            return Err(invalid());
        }

        self.start_session(Identity {
            uid,
            email: credential.email,
        })
        .await
    }

    async fn end_session(&self) -> Result<()> {
        self.store
            .set(
                SESSION_PATH,
                serde_json::to_value(SessionDoc::default()).map_err(StoreError::from)?,
            )
            .await?;
        self.session.send_replace(None);
        info!("Session ended");
        Ok(())
    }

    async fn current(&self) -> Result<Option<Identity>> {
        Ok(self.session.borrow().clone())
    }

    fn on_session_change(&self) -> watch::Receiver<Option<Identity>> {
        self.session.subscribe()
    }
}

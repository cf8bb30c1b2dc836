// ─── Account State ───
// Multi-account bookkeeping: the non-secret part persists to
// `accounts.json`, refresh tokens go to the OS keyring, and Minecraft
// access tokens only ever live in memory.

pub mod microsoft;
pub mod secrets;

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::error::{AuthenticationError, LauncherError, LauncherResult};

use microsoft::AuthenticatedAccount;
use secrets::SecretStore;

/// Refresh when the Minecraft token expires within this window.
const REFRESH_WINDOW_SECONDS: u64 = 5 * 60;

/// Session-only tokens. Never serialized.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub minecraft_access_token: String,
    /// Unix seconds.
    pub minecraft_access_token_expiry: u64,
    pub xbox_uhs: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub uuid: String,
    pub name: String,
    pub skin_url: String,
    #[serde(skip)]
    pub session: Option<SessionTokens>,
}

impl Account {
    fn from_authenticated(auth: &AuthenticatedAccount) -> Self {
        Self {
            uuid: auth.uuid.clone(),
            name: auth.name.clone(),
            skin_url: auth.skin_url.clone(),
            session: Some(SessionTokens {
                minecraft_access_token: auth.minecraft_access_token.clone(),
                minecraft_access_token_expiry: auth.minecraft_access_token_expiry,
                xbox_uhs: auth.xbox_uhs.clone(),
            }),
        }
    }
}

/// Shape of `accounts.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct AccountsFile {
    active_account_uuid: Option<String>,
    accounts: HashMap<String, Account>,
}

/// Exactly one account may be active; activation is the only write to
/// `active_account_uuid`.
pub struct AccountManager {
    accounts_file: PathBuf,
    secrets: SecretStore,
    active: Option<String>,
    accounts: HashMap<String, Account>,
}

impl AccountManager {
    /// Load `accounts.json`, tolerating a missing or unreadable file.
    pub fn load(accounts_file: PathBuf) -> Self {
        let stored = std::fs::read_to_string(&accounts_file)
            .ok()
            .and_then(|json| match serde_json::from_str::<AccountsFile>(&json) {
                Ok(file) => Some(file),
                Err(parse_error) => {
                    warn!("Unreadable accounts.json: {}", parse_error);
                    None
                }
            })
            .unwrap_or_default();

        Self {
            accounts_file,
            secrets: SecretStore::new(),
            active: stored.active_account_uuid,
            accounts: stored.accounts,
        }
    }

    fn persist(&self) -> LauncherResult<()> {
        let file = AccountsFile {
            active_account_uuid: self.active.clone(),
            accounts: self.accounts.clone(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        std::fs::write(&self.accounts_file, json)
            .map_err(LauncherError::io(self.accounts_file.clone()))?;
        Ok(())
    }

    pub fn active_uuid(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_account(&self) -> Option<&Account> {
        self.accounts.get(self.active.as_deref()?)
    }

    pub fn accounts(&self) -> &HashMap<String, Account> {
        &self.accounts
    }

    /// Store a freshly authenticated account and make it active.
    pub async fn add_and_activate(&mut self, auth: AuthenticatedAccount) -> LauncherResult<()> {
        self.secrets
            .store_refresh_token(&auth.uuid, &auth.microsoft_refresh_token)
            .await?;

        let account = Account::from_authenticated(&auth);
        info!("Signed in as {} ({})", account.name, account.uuid);
        self.active = Some(account.uuid.clone());
        self.accounts.insert(account.uuid.clone(), account);
        self.persist()
    }

    pub fn activate(&mut self, uuid: &str) -> LauncherResult<()> {
        if !self.accounts.contains_key(uuid) {
            return Err(LauncherError::NotFound(format!("account {}", uuid)));
        }
        self.active = Some(uuid.to_string());
        self.persist()
    }

    /// Return session tokens for `uuid`, refreshing through the stored
    /// refresh token when the Minecraft token is expired or about to be.
    ///
    /// The caller gets a snapshot: already-running children keep whatever
    /// tokens they were launched with.
    pub async fn ensure_fresh(
        &mut self,
        client: &reqwest::Client,
        uuid: &str,
    ) -> LauncherResult<(Account, SessionTokens)> {
        let account = self
            .accounts
            .get(uuid)
            .ok_or_else(|| LauncherError::NotFound(format!("account {}", uuid)))?;

        if let Some(session) = &account.session {
            let now = Utc::now().timestamp() as u64;
            if session.minecraft_access_token_expiry > now + REFRESH_WINDOW_SECONDS {
                return Ok((account.clone(), session.clone()));
            }
        }

        let refresh_token = match self.secrets.load_refresh_token(uuid).await {
            Ok(token) => token,
            Err(LauncherError::NotFound(_)) => {
                return Err(AuthenticationError::RefreshRejected.into());
            }
            Err(other) => return Err(other),
        };

        let auth = microsoft::refresh_account(client, &refresh_token).await?;
        // Microsoft rotates refresh tokens on every use.
        self.secrets
            .store_refresh_token(&auth.uuid, &auth.microsoft_refresh_token)
            .await?;

        let refreshed = Account::from_authenticated(&auth);
        let session = refreshed.session.clone().expect("session just populated");
        self.accounts.insert(refreshed.uuid.clone(), refreshed.clone());
        self.persist()?;
        Ok((refreshed, session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticated(uuid: &str) -> AuthenticatedAccount {
        AuthenticatedAccount {
            uuid: uuid.into(),
            name: "Steve".into(),
            skin_url: "http://skins/steve".into(),
            xbox_uhs: "uhs".into(),
            microsoft_refresh_token: "refresh".into(),
            minecraft_access_token: "token".into(),
            minecraft_access_token_expiry: Utc::now().timestamp() as u64 + 3600,
        }
    }

    #[test]
    fn session_tokens_never_serialize() {
        let account = Account::from_authenticated(&authenticated("abc"));
        let json = serde_json::to_string(&account).unwrap();
        assert!(!json.contains("token"));
        assert!(!json.contains("uhs"));

        let restored: Account = serde_json::from_str(&json).unwrap();
        assert!(restored.session.is_none());
        assert_eq!(restored.name, "Steve");
    }

    #[test]
    fn accounts_file_round_trip_keeps_active_uuid() {
        let mut accounts = HashMap::new();
        accounts.insert(
            "abc".to_string(),
            Account::from_authenticated(&authenticated("abc")),
        );
        let file = AccountsFile {
            active_account_uuid: Some("abc".into()),
            accounts,
        };
        let json = serde_json::to_string(&file).unwrap();
        let restored: AccountsFile = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.active_account_uuid.as_deref(), Some("abc"));
        assert!(restored.accounts.contains_key("abc"));
    }

    #[test]
    fn activate_unknown_account_is_not_found() {
        let tmp = tempdir::TempDir::new("accounts").unwrap();
        let mut manager = AccountManager::load(tmp.path().join("accounts.json"));
        assert!(matches!(
            manager.activate("nope"),
            Err(LauncherError::NotFound(_))
        ));
    }

    #[test]
    fn load_tolerates_missing_file() {
        let tmp = tempdir::TempDir::new("accounts").unwrap();
        let manager = AccountManager::load(tmp.path().join("accounts.json"));
        assert!(manager.active_uuid().is_none());
        assert!(manager.accounts().is_empty());
    }
}

// ─── Secret Store Adapter ───
// Wraps the OS keyring. The Microsoft refresh token is the only persisted
// secret; everything else lives in memory for the session.

use keyring::Entry;

use crate::core::error::{LauncherError, LauncherResult};

const SERVICE: &str = "com.meridian.launcher";

/// Refresh tokens are stored under `account:<uuid>`.
fn key_for(account_uuid: &str) -> String {
    format!("account:{}", account_uuid)
}

#[derive(Debug, Clone, Default)]
pub struct SecretStore;

impl SecretStore {
    pub fn new() -> Self {
        Self
    }

    pub async fn store_refresh_token(
        &self,
        account_uuid: &str,
        refresh_token: &str,
    ) -> LauncherResult<()> {
        let key = key_for(account_uuid);
        let token = refresh_token.to_string();
        run_blocking(move || {
            Entry::new(SERVICE, &key)?.set_password(&token)?;
            Ok(())
        })
        .await
    }

    pub async fn load_refresh_token(&self, account_uuid: &str) -> LauncherResult<String> {
        let key = key_for(account_uuid);
        run_blocking(move || {
            let entry = Entry::new(SERVICE, &key)?;
            match entry.get_password() {
                Ok(token) => Ok(token),
                Err(keyring::Error::NoEntry) => {
                    Err(LauncherError::NotFound(format!("secret {}", key)))
                }
                Err(source) => Err(source.into()),
            }
        })
        .await
    }

    pub async fn delete_refresh_token(&self, account_uuid: &str) -> LauncherResult<()> {
        let key = key_for(account_uuid);
        run_blocking(move || {
            let entry = Entry::new(SERVICE, &key)?;
            match entry.delete_password() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(source) => Err(source.into()),
            }
        })
        .await
    }
}

/// Keyring calls hit DBus / the OS credential manager; keep them off the
/// async workers.
async fn run_blocking<T: Send + 'static>(
    operation: impl FnOnce() -> LauncherResult<T> + Send + 'static,
) -> LauncherResult<T> {
    tokio::task::spawn_blocking(operation)
        .await
        .map_err(|join| LauncherError::Child(format!("keyring task panicked: {}", join)))?
}

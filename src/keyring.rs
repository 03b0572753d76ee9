//! Keychain storage for doclens credentials
//!
//! Everything lives in one keychain entry as JSON, so the OS prompts at most
//! once per session.

use crate::util::env_flag;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

const KEYRING_SERVICE: &str = "doclens-credentials";
const KEYRING_USERNAME: &str = "default";

pub const DISABLE_KEYRING_ENV: &str = "DOCLENS_DISABLE_KEYRING";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct StoredCredentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    openrouter_api_key: Option<String>,
}

type KeyringResult<T> = Result<T, String>;

static CREDENTIALS_CACHE: OnceLock<Mutex<Option<StoredCredentials>>> = OnceLock::new();
static KEYRING_ERROR_WARNED: AtomicBool = AtomicBool::new(false);

fn credentials_cache() -> &'static Mutex<Option<StoredCredentials>> {
    CREDENTIALS_CACHE.get_or_init(|| Mutex::new(None))
}

/// Keychain access is off in tests and when `DOCLENS_DISABLE_KEYRING` is set.
pub fn keyring_disabled() -> bool {
    cfg!(test) || env_flag(DISABLE_KEYRING_ENV)
}

fn keyring_entry() -> Result<Entry, keyring::Error> {
    Entry::new(KEYRING_SERVICE, KEYRING_USERNAME)
}

/// Log keychain errors only once per session
pub fn warn_keychain_error_once(context: &str, err: &str) {
    if KEYRING_ERROR_WARNED.swap(true, Ordering::Relaxed) {
        return;
    }
    tracing::warn!(context, error = err, "Couldn't access system keychain");
    eprintln!("  Tip: Set OPENROUTER_API_KEY or {}=1 to bypass the keychain.", DISABLE_KEYRING_ENV);
}

fn read_credentials_uncached() -> KeyringResult<StoredCredentials> {
    if keyring_disabled() {
        return Ok(StoredCredentials::default());
    }
    let entry = keyring_entry().map_err(|e| e.to_string())?;
    match entry.get_password() {
        Ok(json) => decode_credentials(&json),
        Err(keyring::Error::NoEntry) => Ok(StoredCredentials::default()),
        Err(err) => Err(err.to_string()),
    }
}

fn decode_credentials(json: &str) -> KeyringResult<StoredCredentials> {
    serde_json::from_str(json).map_err(|e| format!("Failed to parse credentials: {}", e))
}

fn write_credentials(creds: &StoredCredentials) -> KeyringResult<()> {
    if keyring_disabled() {
        return Err(format!("keychain access is disabled ({})", DISABLE_KEYRING_ENV));
    }
    let json = serde_json::to_string(creds)
        .map_err(|e| format!("Failed to serialize credentials: {}", e))?;
    let entry = keyring_entry().map_err(|e| e.to_string())?;
    entry.set_password(&json).map_err(|e| e.to_string())
}

fn read_credentials_cached() -> KeyringResult<StoredCredentials> {
    let mut guard = match credentials_cache().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(creds) = guard.as_ref() {
        return Ok(creds.clone());
    }
    let creds = read_credentials_uncached()?;
    *guard = Some(creds.clone());
    Ok(creds)
}

fn update_cache(creds: StoredCredentials) {
    let mut guard = match credentials_cache().lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    *guard = Some(creds);
}

/// Get the OpenRouter API key from the keychain
pub fn get_api_key() -> KeyringResult<Option<String>> {
    Ok(read_credentials_cached()?.openrouter_api_key)
}

/// Store the OpenRouter API key in the keychain
pub fn set_api_key(key: &str) -> KeyringResult<()> {
    let mut creds = read_credentials_cached().unwrap_or_default();
    creds.openrouter_api_key = Some(key.to_string());
    write_credentials(&creds)?;
    update_cache(creds);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyring_is_disabled_under_test() {
        assert!(keyring_disabled());
        assert_eq!(get_api_key(), Ok(None));
        assert!(set_api_key("sk-or-test").is_err());
    }

    #[test]
    fn test_credentials_json() {
        let creds = StoredCredentials {
            openrouter_api_key: Some("sk-or-test".to_string()),
        };
        let json = serde_json::to_string(&creds).unwrap();
        assert_eq!(decode_credentials(&json), Ok(creds));
        assert_eq!(
            decode_credentials("{}"),
            Ok(StoredCredentials::default())
        );
        assert_eq!(serde_json::to_string(&StoredCredentials::default()).unwrap(), "{}");
        assert!(decode_credentials("not json").is_err());
    }
}

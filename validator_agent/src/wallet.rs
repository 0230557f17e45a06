//! Wallet-backed account management.
//!
//! Accounts are held by local wallets and must be unlocked with a known
//! passphrase before the agent will use them for duties. Refreshing walks
//! every configured wallet, filters accounts against the configured
//! `wallet/account` paths and atomically replaces the account map.

use crate::metrics;
use futures::future::join_all;
use parking_lot::RwLock;
use regex::Regex;
use slog::{debug, warn, Logger};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use types::PublicKeyBytes;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// The supplied passphrase did not unlock the account.
    IncorrectPassphrase,
    /// The account cannot be unlocked at all (e.g. it is watch-only).
    NotUnlockable,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IncorrectPassphrase => write!(f, "incorrect passphrase"),
            Error::NotUnlockable => write!(f, "account cannot be unlocked"),
        }
    }
}

/// A single validator account held by a wallet.
pub trait ValidatorAccount: Send + Sync {
    fn name(&self) -> &str;

    fn public_key(&self) -> PublicKeyBytes;

    /// The composite public key for distributed accounts; `None` for simple
    /// accounts.
    fn composite_public_key(&self) -> Option<PublicKeyBytes> {
        None
    }

    fn unlock(&self, passphrase: &[u8]) -> Result<(), Error>;
}

/// A wallet holding zero or more accounts, iterated in a stable order.
pub trait Wallet: Send + Sync {
    fn name(&self) -> &str;

    fn accounts(&self) -> Vec<Arc<dyn ValidatorAccount>>;
}

/// Resolves the account validating under a public key, if managed locally.
pub trait AccountProvider: Send + Sync {
    fn account_by_public_key(&self, pubkey: &PublicKeyBytes) -> Option<Arc<dyn ValidatorAccount>>;
}

/// Manages the accounts of a set of local wallets.
pub struct WalletAccountManager {
    log: Logger,
    wallets: Vec<Arc<dyn Wallet>>,
    account_paths: Vec<String>,
    passphrases: Vec<Vec<u8>>,
    process_concurrency: usize,
    accounts: RwLock<HashMap<PublicKeyBytes, Arc<dyn ValidatorAccount>>>,
}

impl WalletAccountManager {
    pub fn new(
        log: Logger,
        wallets: Vec<Arc<dyn Wallet>>,
        account_paths: Vec<String>,
        passphrases: Vec<Vec<u8>>,
        process_concurrency: usize,
    ) -> Self {
        Self {
            log,
            wallets,
            account_paths,
            passphrases,
            process_concurrency: process_concurrency.max(1),
            accounts: RwLock::new(HashMap::new()),
        }
    }

    /// Refreshes the accounts from the wallets.
    ///
    /// This is a relatively expensive operation involving key-derivation work
    /// for each unlock, so should not be run in the validating path.
    pub async fn refresh(&self) {
        let verification_regexes =
            account_paths_to_verification_regexes(&self.account_paths, &self.log);

        let mut accounts = HashMap::new();
        let mut locked = 0_usize;
        for wallet in &self.wallets {
            locked += self
                .fetch_accounts_for_wallet(wallet.as_ref(), &mut accounts, &verification_regexes)
                .await;
        }
        debug!(self.log, "Obtained accounts"; "count" => accounts.len());

        metrics::wallet_accounts("unlocked", accounts.len());
        metrics::wallet_accounts("locked", locked);

        *self.accounts.write() = accounts;
    }

    /// Returns the number of locked accounts encountered.
    async fn fetch_accounts_for_wallet(
        &self,
        wallet: &dyn Wallet,
        accounts: &mut HashMap<PublicKeyBytes, Arc<dyn ValidatorAccount>>,
        verification_regexes: &[Regex],
    ) -> usize {
        // Unlocking runs a KDF per attempt; bound the concurrency.
        let semaphore = Arc::new(Semaphore::new(self.process_concurrency));

        let futures = wallet.accounts().into_iter().map(|account| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("semaphore is never closed");

                let name = format!("{}/{}", wallet.name(), account.name());
                if !verification_regexes
                    .iter()
                    .any(|regex| regex.is_match(&name))
                {
                    debug!(self.log, "Account does not match any path; ignoring"; "account" => name);
                    return None;
                }

                let unlocked = self
                    .passphrases
                    .iter()
                    .any(|passphrase| account.unlock(passphrase).is_ok());
                if !unlocked {
                    warn!(self.log, "Failed to unlock account with any passphrase"; "account" => name);
                    return Some(Err(()));
                }

                let pubkey = account
                    .composite_public_key()
                    .unwrap_or_else(|| account.public_key());
                Some(Ok((pubkey, account)))
            }
        });

        let mut locked = 0;
        for result in join_all(futures).await.into_iter().flatten() {
            match result {
                Ok((pubkey, account)) => {
                    accounts.insert(pubkey, account);
                }
                Err(()) => locked += 1,
            }
        }
        locked
    }

    pub fn accounts(&self) -> Vec<Arc<dyn ValidatorAccount>> {
        self.accounts.read().values().cloned().collect()
    }
}

impl AccountProvider for WalletAccountManager {
    fn account_by_public_key(&self, pubkey: &PublicKeyBytes) -> Option<Arc<dyn ValidatorAccount>> {
        self.accounts.read().get(pubkey).cloned()
    }
}

/// Turns account paths into regexes to allow verification.
///
/// A bare wallet name matches every account in the wallet; an explicit
/// account part is anchored unless it already carries a `$`.
fn account_paths_to_verification_regexes(paths: &[String], log: &Logger) -> Vec<Regex> {
    let mut regexes = Vec::with_capacity(paths.len());
    for path in paths {
        let parts: Vec<&str> = path.split('/').collect();
        if parts[0].is_empty() {
            debug!(log, "Invalid account path"; "path" => path);
            continue;
        }
        let account = if parts.len() == 1 { ".*" } else { parts[1] };
        let account = account.trim_start_matches('^');
        let specifier = if account.ends_with('$') {
            format!("^{}/{}", parts[0], account)
        } else {
            format!("^{}/{}$", parts[0], account)
        };
        match Regex::new(&specifier) {
            Ok(regex) => regexes.push(regex),
            Err(e) => {
                warn!(log, "Invalid account path regex"; "specifier" => specifier, "error" => %e)
            }
        }
    }
    regexes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TestAccount, TestWallet, WatchOnlyAccount};

    fn null_log() -> Logger {
        Logger::root(slog::Discard, slog::o!())
    }

    fn wallet_with(names: &[&str]) -> Arc<dyn Wallet> {
        Arc::new(TestWallet::new(
            "primary",
            names
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    Arc::new(TestAccount::new(name, i as u8, b"good-passphrase"))
                        as Arc<dyn ValidatorAccount>
                })
                .collect(),
        ))
    }

    #[tokio::test]
    async fn refresh_unlocks_matching_accounts() {
        let manager = WalletAccountManager::new(
            null_log(),
            vec![wallet_with(&["validator-1", "validator-2", "other"])],
            vec!["primary/validator-.*".to_string()],
            vec![b"good-passphrase".to_vec()],
            4,
        );

        manager.refresh().await;

        assert_eq!(manager.accounts().len(), 2);
        assert!(manager
            .account_by_public_key(&TestAccount::pubkey_for(0))
            .is_some());
        assert!(manager
            .account_by_public_key(&TestAccount::pubkey_for(2))
            .is_none());
    }

    #[tokio::test]
    async fn refresh_skips_accounts_that_do_not_unlock() {
        let manager = WalletAccountManager::new(
            null_log(),
            vec![wallet_with(&["validator-1", "validator-2"])],
            vec!["primary".to_string()],
            vec![b"wrong-passphrase".to_vec()],
            4,
        );

        manager.refresh().await;

        assert!(manager.accounts().is_empty());
    }

    #[tokio::test]
    async fn refresh_skips_watch_only_accounts() {
        let watcher = WatchOnlyAccount::new("watcher", 1);
        assert_eq!(watcher.unlock(b"any"), Err(Error::NotUnlockable));

        let wallet: Arc<dyn Wallet> = Arc::new(TestWallet::new(
            "primary",
            vec![
                Arc::new(TestAccount::new("validator-1", 0, b"good-passphrase"))
                    as Arc<dyn ValidatorAccount>,
                Arc::new(watcher),
            ],
        ));
        let manager = WalletAccountManager::new(
            null_log(),
            vec![wallet],
            vec!["primary".to_string()],
            vec![b"good-passphrase".to_vec()],
            4,
        );

        manager.refresh().await;

        assert_eq!(manager.accounts().len(), 1);
        assert!(manager
            .account_by_public_key(&TestAccount::pubkey_for(0))
            .is_some());
        assert!(manager
            .account_by_public_key(&TestAccount::pubkey_for(1))
            .is_none());
    }

    #[tokio::test]
    async fn refresh_replaces_previous_accounts() {
        let manager = WalletAccountManager::new(
            null_log(),
            vec![wallet_with(&["validator-1"])],
            vec!["primary".to_string()],
            vec![b"good-passphrase".to_vec()],
            1,
        );

        manager.refresh().await;
        assert_eq!(manager.accounts().len(), 1);

        manager.refresh().await;
        assert_eq!(manager.accounts().len(), 1);
    }

    #[test]
    fn path_regexes() {
        let log = null_log();
        let regexes = account_paths_to_verification_regexes(
            &[
                "primary".to_string(),
                "backup/val-[0-9]+".to_string(),
                "/nameless".to_string(),
            ],
            &log,
        );
        assert_eq!(regexes.len(), 2);
        assert!(regexes[0].is_match("primary/anything"));
        assert!(!regexes[0].is_match("other/anything"));
        assert!(regexes[1].is_match("backup/val-12"));
        assert!(!regexes[1].is_match("backup/val-12-extra"));
    }
}

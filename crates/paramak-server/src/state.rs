//! Shared application state, built once at startup.

use anyhow::Context;
use paramak_core::clock::parse_utc_offset;
use paramak_core::{
    Address, EvmLedgerConfig, EvmRpcLedger, FirebaseStore, FirebaseStoreConfig,
    ProvisioningService, ProvisioningSettings, SealedKeyVault, WalletSecret, WalletStore,
};
use paramak_shared::SealingKey;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::session::SessionKeys;
use crate::thaid::{ThaidClient, ThaidConfig};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ProvisioningService>,
    pub sessions: Arc<SessionKeys>,
    /// Present when THAID login is enabled
    pub thaid: Option<Arc<ThaidClient>>,
    pub enable_test_endpoints: bool,
    pub public_dir: PathBuf,
    pub views_dir: PathBuf,
}

impl AppState {
    /// Construct every client from validated configuration
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let call_timeout = config.remote_call_timeout();

        let store: Arc<dyn WalletStore> = Arc::new(
            FirebaseStore::new(FirebaseStoreConfig {
                database_url: config.database_url.clone(),
                auth_token: config.database_auth.clone(),
                request_timeout: call_timeout,
            })
            .context("failed to create wallet store client")?,
        );
        let vault_store: Arc<dyn WalletStore> = match &config.vault_database_url {
            Some(url) if url != &config.database_url => Arc::new(
                FirebaseStore::new(FirebaseStoreConfig {
                    database_url: url.clone(),
                    auth_token: config.database_auth.clone(),
                    request_timeout: call_timeout,
                })
                .context("failed to create vault store client")?,
            ),
            _ => store.clone(),
        };
        let sealing_key = SealingKey::from_hex(&config.wallet_vault_key)
            .context("WALLET_VAULT_KEY is not a usable sealing key")?;
        let vault = Arc::new(SealedKeyVault::new(vault_store, sealing_key));

        let admin = WalletSecret::from_hex(&config.admin_private_key)
            .context("ADMIN_PRIVATE_KEY is not a valid secp256k1 key")?;
        let contract: Address = config
            .contract_id
            .parse()
            .context("CONTRACT_ID is not an address")?;
        let ledger = Arc::new(
            EvmRpcLedger::new(EvmLedgerConfig {
                rpc_url: config.rpc_provider_url.clone(),
                contract,
                admin,
                request_timeout: call_timeout,
                confirmation_timeout: config.mint_confirmation_timeout(),
                poll_interval: config.receipt_poll_interval(),
            })
            .context("failed to create ledger client")?,
        );
        tracing::info!(
            contract = %contract,
            admin = %ledger.admin_address(),
            "ledger client ready"
        );

        let utc_offset = parse_utc_offset(&config.record_utc_offset).map_err(anyhow::Error::msg)?;
        // Submission calls plus the confirmation wait
        let mint_timeout = config.mint_confirmation_timeout() + call_timeout;
        let settings = ProvisioningSettings {
            call_timeout,
            mint_timeout,
            utc_offset,
            pending_marker_ttl: mint_timeout + call_timeout * 2,
        };
        let service = Arc::new(ProvisioningService::new(store, ledger, vault, settings));

        let thaid = if config.enable_thaid {
            let client = ThaidClient::new(ThaidConfig {
                client_id: config.thaid_client_id.clone().unwrap_or_default(),
                client_secret: config.thaid_client_secret.clone().unwrap_or_default(),
                callback_url: config.thaid_callback_url.clone().unwrap_or_default(),
                authorize_url: config.thaid_authorize_url.clone(),
                token_url: config.thaid_token_url.clone(),
                frontend_redirect_url: config.frontend_redirect_url.clone().unwrap_or_default(),
                request_timeout: call_timeout,
            })
            .context("failed to create THAID client")?;
            Some(Arc::new(client))
        } else {
            None
        };

        Ok(Self {
            service,
            sessions: Arc::new(SessionKeys::new(
                config.session_secret.as_bytes(),
                std::time::Duration::from_secs(config.session_ttl_secs),
            )),
            thaid,
            enable_test_endpoints: config.enable_test_endpoints,
            public_dir: config.public_dir.clone(),
            views_dir: config.views_dir.clone(),
        })
    }
}

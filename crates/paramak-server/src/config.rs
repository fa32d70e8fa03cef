//! Command line and environment configuration.
//!
//! Every option can be given as a flag or through its environment
//! variable. Missing required values stop the process at startup.

use clap::Parser;
use paramak_core::clock::{parse_utc_offset, DEFAULT_RECORD_OFFSET};
use paramak_core::Address;
use paramak_shared::{
    validate_hex_secret, validate_http_url, ValidationErrorCode, ValidationResult,
};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_THAID_AUTHORIZE_URL: &str = "https://imauth.bora.dopa.go.th/api/v2/oauth2/auth/";
pub const DEFAULT_THAID_TOKEN_URL: &str = "https://imauth.bora.dopa.go.th/api/v2/oauth2/token/";

/// Shortest accepted session signing secret
const MIN_SESSION_SECRET_LEN: usize = 32;

#[derive(Parser, Debug, Clone)]
#[command(name = "paramak-server")]
#[command(version)]
#[command(about = "Patient wallet provisioning and on-chain medical records", long_about = None)]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: u16,

    /// Ethereum JSON-RPC endpoint
    #[arg(long, env = "RPC_PROVIDER_URL")]
    pub rpc_provider_url: String,

    /// Hex private key that signs mint transactions
    #[arg(long, env = "ADMIN_PRIVATE_KEY", hide_env_values = true)]
    pub admin_private_key: String,

    /// Record contract address
    #[arg(long, env = "CONTRACT_ID")]
    pub contract_id: String,

    /// Realtime Database URL holding wallet records
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: String,

    /// Realtime Database auth token
    #[arg(long, env = "DATABASE_AUTH", hide_env_values = true)]
    pub database_auth: Option<String>,

    /// Database for sealed wallet keys (defaults to DATABASE_URL)
    #[arg(long, env = "VAULT_DATABASE_URL")]
    pub vault_database_url: Option<String>,

    /// 64 hex chars; master key sealing custodial wallet keys
    #[arg(long, env = "WALLET_VAULT_KEY", hide_env_values = true)]
    pub wallet_vault_key: String,

    /// HMAC secret for session tokens
    #[arg(long, env = "SESSION_SECRET", hide_env_values = true)]
    pub session_secret: String,

    #[arg(long, env = "SESSION_TTL_SECS", default_value_t = 3600)]
    pub session_ttl_secs: u64,

    /// Civil offset for record dates, e.g. +07:00
    #[arg(long, env = "RECORD_UTC_OFFSET", default_value = DEFAULT_RECORD_OFFSET)]
    pub record_utc_offset: String,

    #[arg(long, env = "REMOTE_CALL_TIMEOUT_SECS", default_value_t = 15)]
    pub remote_call_timeout_secs: u64,

    #[arg(long, env = "MINT_CONFIRMATION_TIMEOUT_SECS", default_value_t = 120)]
    pub mint_confirmation_timeout_secs: u64,

    #[arg(long, env = "RECEIPT_POLL_INTERVAL_MS", default_value_t = 1500)]
    pub receipt_poll_interval_ms: u64,

    /// Directory served under /static
    #[arg(long, env = "PUBLIC_DIR", default_value = "public")]
    pub public_dir: PathBuf,

    /// Directory holding term-of-use.html
    #[arg(long, env = "VIEWS_DIR", default_value = "views")]
    pub views_dir: PathBuf,

    /// Enable THAID login (/thaid-auth, /thaid-redirect)
    #[arg(long, env = "ENABLE_THAID")]
    pub enable_thaid: bool,

    /// Enable /patient_token, which issues sessions without login
    #[arg(long, env = "ENABLE_TEST_ENDPOINTS")]
    pub enable_test_endpoints: bool,

    #[arg(long, env = "THAID_CLIENT_ID")]
    pub thaid_client_id: Option<String>,

    #[arg(long, env = "THAID_CLIENT_SECRET", hide_env_values = true)]
    pub thaid_client_secret: Option<String>,

    #[arg(long, env = "THAID_CALLBACK_URL")]
    pub thaid_callback_url: Option<String>,

    /// Where the browser lands after login, with ?token=
    #[arg(long, env = "FRONTEND_REDIRECT_URL")]
    pub frontend_redirect_url: Option<String>,

    #[arg(long, env = "THAID_AUTHORIZE_URL", default_value = DEFAULT_THAID_AUTHORIZE_URL)]
    pub thaid_authorize_url: String,

    #[arg(long, env = "THAID_TOKEN_URL", default_value = DEFAULT_THAID_TOKEN_URL)]
    pub thaid_token_url: String,
}

impl Config {
    /// Check every value, collecting all problems at once
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        result.merge(validate_http_url(&self.rpc_provider_url, "RPC_PROVIDER_URL"));
        result.merge(validate_http_url(&self.database_url, "DATABASE_URL"));
        if let Some(url) = &self.vault_database_url {
            result.merge(validate_http_url(url, "VAULT_DATABASE_URL"));
        }
        result.merge(validate_hex_secret(&self.admin_private_key, "ADMIN_PRIVATE_KEY", 32));
        result.merge(validate_hex_secret(&self.wallet_vault_key, "WALLET_VAULT_KEY", 32));

        if self.contract_id.parse::<Address>().is_err() {
            result.add_error(
                "CONTRACT_ID",
                "must be a 20-byte hex address",
                ValidationErrorCode::InvalidFormat,
            );
        }
        if self.session_secret.len() < MIN_SESSION_SECRET_LEN {
            result.add_error(
                "SESSION_SECRET",
                &format!("must be at least {} characters", MIN_SESSION_SECRET_LEN),
                ValidationErrorCode::OutOfRange,
            );
        }
        if parse_utc_offset(&self.record_utc_offset).is_err() {
            result.add_error(
                "RECORD_UTC_OFFSET",
                "must look like +07:00",
                ValidationErrorCode::InvalidFormat,
            );
        }
        for (field, value) in [
            ("SESSION_TTL_SECS", self.session_ttl_secs),
            ("REMOTE_CALL_TIMEOUT_SECS", self.remote_call_timeout_secs),
            ("MINT_CONFIRMATION_TIMEOUT_SECS", self.mint_confirmation_timeout_secs),
            ("RECEIPT_POLL_INTERVAL_MS", self.receipt_poll_interval_ms),
        ] {
            if value == 0 {
                result.add_error(field, "must be greater than zero", ValidationErrorCode::OutOfRange);
            }
        }

        if self.enable_thaid {
            for (field, value) in [
                ("THAID_CLIENT_ID", &self.thaid_client_id),
                ("THAID_CLIENT_SECRET", &self.thaid_client_secret),
                ("THAID_CALLBACK_URL", &self.thaid_callback_url),
                ("FRONTEND_REDIRECT_URL", &self.frontend_redirect_url),
            ] {
                if value.as_deref().map_or(true, str::is_empty) {
                    result.add_error(
                        field,
                        "is required when THAID is enabled",
                        ValidationErrorCode::Required,
                    );
                }
            }
            result.merge(validate_http_url(&self.thaid_authorize_url, "THAID_AUTHORIZE_URL"));
            result.merge(validate_http_url(&self.thaid_token_url, "THAID_TOKEN_URL"));
        }

        result
    }

    pub fn remote_call_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_call_timeout_secs)
    }

    pub fn mint_confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.mint_confirmation_timeout_secs)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQUIRED: [&str; 15] = [
        "paramak-server",
        "--port",
        "3000",
        "--rpc-provider-url",
        "https://rpc.example.org",
        "--admin-private-key",
        "0x4646464646464646464646464646464646464646464646464646464646464646",
        "--contract-id",
        "0x1111111111111111111111111111111111111111",
        "--database-url",
        "https://paramak-db.firebaseio.com",
        "--wallet-vault-key",
        "0707070707070707070707070707070707070707070707070707070707070707",
        "--session-secret",
        "an-adequately-long-session-secret-value",
    ];

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::try_parse_from(REQUIRED).unwrap();
        assert!(config.validate().is_valid());
        assert_eq!(config.record_utc_offset, "+07:00");
        assert_eq!(config.remote_call_timeout(), Duration::from_secs(15));
        assert_eq!(config.receipt_poll_interval(), Duration::from_millis(1500));
        assert!(!config.enable_thaid);
    }

    #[test]
    fn test_missing_required_value_fails_parse() {
        assert!(Config::try_parse_from(REQUIRED[..3].iter().copied()).is_err());
    }

    #[test]
    fn test_validation_collects_every_problem() {
        let mut config = Config::try_parse_from(REQUIRED).unwrap();
        config.wallet_vault_key = "abcd".to_string();
        config.contract_id = "not-an-address".to_string();
        config.record_utc_offset = "Asia/Bangkok".to_string();
        config.session_secret = "short".to_string();

        let errors = config.validate().into_result().unwrap_err().errors;
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"WALLET_VAULT_KEY"));
        assert!(fields.contains(&"CONTRACT_ID"));
        assert!(fields.contains(&"RECORD_UTC_OFFSET"));
        assert!(fields.contains(&"SESSION_SECRET"));
    }

    #[test]
    fn test_thaid_requires_its_settings() {
        let mut args = REQUIRED.to_vec();
        args.push("--enable-thaid");
        let config = Config::try_parse_from(args).unwrap();
        let errors = config.validate().into_result().unwrap_err().errors;
        assert_eq!(errors.len(), 4);
    }
}

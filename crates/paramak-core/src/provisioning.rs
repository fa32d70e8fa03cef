//! The get-or-create wallet, then mint workflow.
//!
//! [`ProvisioningService`] ties the wallet store, key vault and record
//! ledger together. Two invariants hold regardless of concurrency:
//! a patient id maps to at most one wallet (the wallet record is written
//! with `create_if_absent`, and a race loser adopts the winner's wallet),
//! and minted records are append-only.
//!
//! Every remote call is bounded by a timeout and surfaces as
//! [`ProvisioningError::Transient`] when it expires.

use chrono::{FixedOffset, Offset, Utc};
use paramak_shared::{
    log_access, validate_idempotency_key, validate_patient_id, AccessLogEntry, AuditAction,
};
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::clock::{format_record_date, Clock, SystemClock};
use crate::error::{LedgerError, PermanentKind, ProvisioningError, StoreError};
use crate::ledger::RecordLedger;
use crate::store::{mint_marker_path, patient_path, CreateOutcome, WalletStore};
use crate::types::{
    Address, IdempotencyMarker, MarkerState, MintReceipt, MintRequest, MintResult,
    PatientWallet, RecordEntry, ResolvedWallet, WalletRecord,
};
use crate::vault::KeyVault;
use crate::wallet::GeneratedWallet;

/// Upper bound on the entries reserved up front from a reported balance
const MAX_PREALLOCATED_ENTRIES: u64 = 1024;

/// Prefix of token content stored as a JSON data URI
const JSON_DATA_URI_PREFIX: &str = "data:application/json,";

#[derive(Debug, Clone)]
pub struct ProvisioningSettings {
    /// Bound on each storage, vault and ledger read call
    pub call_timeout: Duration,
    /// Bound on a whole mint, submission through confirmation
    pub mint_timeout: Duration,
    /// Civil offset used to stamp record dates
    pub utc_offset: FixedOffset,
    /// Age after which a pending idempotency marker with no broadcast
    /// transaction may be reclaimed
    pub pending_marker_ttl: Duration,
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(15),
            mint_timeout: Duration::from_secs(135),
            utc_offset: FixedOffset::east_opt(7 * 3600).unwrap_or_else(|| Utc.fix()),
            pending_marker_ttl: Duration::from_secs(165),
        }
    }
}

/// Run `call`, failing with `Transient(Timeout)` after `limit`
async fn bounded<T, E, F>(
    operation: &'static str,
    limit: Duration,
    call: F,
) -> Result<T, ProvisioningError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<ProvisioningError>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => {
            warn!(operation, timeout_ms = limit.as_millis() as u64, "remote call timed out");
            Err(ProvisioningError::timeout(operation, limit))
        }
    }
}

fn malformed(path: &str, err: serde_json::Error) -> ProvisioningError {
    StoreError::Malformed {
        path: path.to_string(),
        message: err.to_string(),
    }
    .into()
}

fn duplicate_in_flight() -> ProvisioningError {
    ProvisioningError::Permanent {
        kind: PermanentKind::DuplicateInFlight,
        message: "A mint with this idempotency key is already in progress.".to_string(),
    }
}

/// A failed mint attempt
struct MintFailure {
    error: ProvisioningError,
    /// The transaction may have reached the chain
    maybe_submitted: bool,
}

impl MintFailure {
    fn before_submit(error: ProvisioningError) -> Self {
        Self {
            error,
            maybe_submitted: false,
        }
    }

    fn in_doubt(error: ProvisioningError) -> Self {
        Self {
            error,
            maybe_submitted: true,
        }
    }
}

pub struct ProvisioningService {
    store: Arc<dyn WalletStore>,
    ledger: Arc<dyn RecordLedger>,
    vault: Arc<dyn KeyVault>,
    clock: Arc<dyn Clock>,
    settings: ProvisioningSettings,
}

impl ProvisioningService {
    pub fn new(
        store: Arc<dyn WalletStore>,
        ledger: Arc<dyn RecordLedger>,
        vault: Arc<dyn KeyVault>,
        settings: ProvisioningSettings,
    ) -> Self {
        Self {
            store,
            ledger,
            vault,
            clock: Arc::new(SystemClock),
            settings,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &ProvisioningSettings {
        &self.settings
    }

    /// Look up a patient's wallet without creating one
    pub async fn find_wallet(
        &self,
        patient_id: &str,
    ) -> Result<Option<PatientWallet>, ProvisioningError> {
        validate_patient_id(patient_id).into_result()?;
        let path = patient_path(patient_id);
        let value = bounded("storage", self.settings.call_timeout, self.store.get(&path)).await?;

        value
            .map(|v| {
                serde_json::from_value::<WalletRecord>(v)
                    .map(|record| PatientWallet::from_record(patient_id, record))
                    .map_err(|e| malformed(&path, e))
            })
            .transpose()
    }

    /// Return the patient's wallet, creating it on first use.
    ///
    /// Concurrent first calls for one id all return the same wallet; only
    /// the caller whose write landed sees `created == true`.
    pub async fn resolve_or_create_wallet(
        &self,
        patient_id: &str,
    ) -> Result<ResolvedWallet, ProvisioningError> {
        if let Some(wallet) = self.find_wallet(patient_id).await? {
            return Ok(ResolvedWallet {
                wallet,
                created: false,
            });
        }

        let generated = GeneratedWallet::generate();
        let address = generated.address;
        bounded(
            "vault",
            self.settings.call_timeout,
            self.vault.store(&address, &generated.secret),
        )
        .await?;

        let wallet = PatientWallet {
            patient_id: patient_id.to_string(),
            wallet_address: address,
            created_at: Some(self.clock.now()),
        };
        let path = patient_path(patient_id);
        let value = serde_json::to_value(wallet.to_record()).map_err(|e| malformed(&path, e))?;

        let outcome = bounded(
            "storage",
            self.settings.call_timeout,
            self.store.create_if_absent(&path, value),
        )
        .await?;

        match outcome {
            CreateOutcome::Created => {
                info!(patient_id, wallet = %address, "created patient wallet");
                log_access(
                    &AccessLogEntry::new(patient_id, AuditAction::WalletCreated)
                        .with_wallet(address.to_checksum()),
                );
                Ok(ResolvedWallet {
                    wallet,
                    created: true,
                })
            }
            CreateOutcome::Existing(existing) => {
                let record: WalletRecord =
                    serde_json::from_value(existing).map_err(|e| malformed(&path, e))?;
                info!(
                    patient_id,
                    wallet = %record.wallet_address,
                    discarded = %address,
                    "lost wallet creation race, adopting existing wallet"
                );
                if let Err(err) = bounded(
                    "vault",
                    self.settings.call_timeout,
                    self.vault.discard(&address),
                )
                .await
                {
                    warn!(wallet = %address, error = %err, "failed to discard orphaned vault key");
                }
                Ok(ResolvedWallet {
                    wallet: PatientWallet::from_record(patient_id, record),
                    created: false,
                })
            }
        }
    }

    /// Stamp the caller payload with the server date, `date` first.
    ///
    /// Caller fields are merged after the stamp, so a caller `date` wins.
    pub fn stamp_payload(&self, payload: Option<&Value>) -> Result<Value, ProvisioningError> {
        let fields = match payload {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(fields)) => fields.clone(),
            Some(_) => {
                return Err(ProvisioningError::invalid_input(
                    "data: must be a JSON object",
                ))
            }
        };

        let mut record = Map::with_capacity(fields.len() + 1);
        record.insert(
            "date".to_string(),
            Value::String(format_record_date(self.clock.now(), self.settings.utc_offset)),
        );
        record.extend(fields);
        Ok(Value::Object(record))
    }

    /// Resolve the patient's wallet and mint one record to it.
    ///
    /// A wallet created along the way is kept even if the mint fails, so a
    /// retry reuses it. With an idempotency key, a replay of a completed
    /// mint returns the earlier receipt instead of minting again, and a
    /// mint whose transaction may already be on chain keeps its key until
    /// that transaction is settled.
    pub async fn mint_record(&self, request: MintRequest) -> Result<MintResult, ProvisioningError> {
        let mut validation = validate_patient_id(&request.patient_id);
        if let Some(key) = &request.idempotency_key {
            validation.merge(validate_idempotency_key(key));
        }
        validation.into_result()?;
        let record = self.stamp_payload(request.payload.as_ref())?;

        let Some(key) = request.idempotency_key.as_deref() else {
            return self
                .mint_to_wallet(&request.patient_id, record, None)
                .await
                .map_err(|failure| failure.error);
        };

        let marker_path = mint_marker_path(&request.patient_id, key);
        let pending = self.pending_marker(record);
        let claim = bounded(
            "storage",
            self.settings.call_timeout,
            self.store.create_if_absent(
                &marker_path,
                serde_json::to_value(&pending).map_err(|e| malformed(&marker_path, e))?,
            ),
        )
        .await?;

        match claim {
            CreateOutcome::Created => {
                self.mint_claimed(&request.patient_id, &marker_path, pending)
                    .await
            }
            CreateOutcome::Existing(existing) => {
                self.resume(&request.patient_id, key, &marker_path, existing, pending)
                    .await
            }
        }
    }

    fn pending_marker(&self, record: Value) -> IdempotencyMarker {
        IdempotencyMarker {
            state: MarkerState::Pending,
            created_at: self.clock.now(),
            transaction_hash: None,
            receipt: None,
            record: Some(record),
        }
    }

    fn is_stale(&self, marker: &IdempotencyMarker) -> bool {
        (self.clock.now() - marker.created_at)
            .to_std()
            .map_or(false, |age| age >= self.settings.pending_marker_ttl)
    }

    async fn write_marker(
        &self,
        path: &str,
        marker: &IdempotencyMarker,
    ) -> Result<(), ProvisioningError> {
        let value = serde_json::to_value(marker).map_err(|e| malformed(path, e))?;
        bounded("storage", self.settings.call_timeout, self.store.set(path, value)).await
    }

    /// Mint under a marker this request holds
    async fn mint_claimed(
        &self,
        patient_id: &str,
        marker_path: &str,
        pending: IdempotencyMarker,
    ) -> Result<MintResult, ProvisioningError> {
        let record = pending.record.clone().unwrap_or_default();
        match self
            .mint_to_wallet(patient_id, record, Some((marker_path, &pending)))
            .await
        {
            Ok(result) => {
                let completed = IdempotencyMarker {
                    state: MarkerState::Completed,
                    created_at: pending.created_at,
                    transaction_hash: Some(result.receipt.transaction_hash.clone()),
                    receipt: Some(result.receipt.clone()),
                    record: Some(result.record.clone()),
                };
                if let Err(err) = self.write_marker(marker_path, &completed).await {
                    error!(
                        patient_id,
                        tx_hash = %result.receipt.transaction_hash,
                        error = %err,
                        "mint succeeded but idempotency marker could not be completed"
                    );
                }
                Ok(result)
            }
            Err(MintFailure {
                error,
                maybe_submitted: true,
            }) => {
                warn!(
                    patient_id,
                    marker = marker_path,
                    error = %error,
                    "mint outcome unknown, keeping idempotency marker"
                );
                Err(error)
            }
            Err(MintFailure { error, .. }) => {
                if let Err(release) = bounded(
                    "storage",
                    self.settings.call_timeout,
                    self.store.delete(marker_path),
                )
                .await
                {
                    warn!(
                        patient_id,
                        error = %release,
                        "failed to release idempotency marker"
                    );
                }
                Err(error)
            }
        }
    }

    /// Settle a request whose key is already claimed.
    ///
    /// A pending marker with a broadcast transaction is resolved from that
    /// transaction's receipt. A pending marker without one is reclaimed once
    /// it is older than `pending_marker_ttl`.
    async fn resume(
        &self,
        patient_id: &str,
        key: &str,
        marker_path: &str,
        existing: Value,
        pending: IdempotencyMarker,
    ) -> Result<MintResult, ProvisioningError> {
        let marker: IdempotencyMarker =
            serde_json::from_value(existing.clone()).map_err(|e| malformed(marker_path, e))?;

        if marker.state == MarkerState::Completed {
            let receipt = marker.receipt.ok_or_else(|| {
                ProvisioningError::from(StoreError::Malformed {
                    path: marker_path.to_string(),
                    message: "completed marker has no receipt".to_string(),
                })
            })?;
            return self.replay(patient_id, key, receipt, marker.record).await;
        }

        if let Some(tx_hash) = marker.transaction_hash.clone() {
            let lookup = tokio::time::timeout(
                self.settings.call_timeout,
                self.ledger.mint_receipt(&tx_hash),
            )
            .await
            .map_err(|_| ProvisioningError::timeout("ledger", self.settings.call_timeout))?;

            match lookup {
                Ok(Some(receipt)) => {
                    info!(patient_id, key, %tx_hash, "earlier mint confirmed, completing marker");
                    let completed = IdempotencyMarker {
                        state: MarkerState::Completed,
                        receipt: Some(receipt.clone()),
                        ..marker
                    };
                    if let Err(err) = self.write_marker(marker_path, &completed).await {
                        error!(patient_id, %tx_hash, error = %err, "could not complete idempotency marker");
                    }
                    return self
                        .replay(patient_id, key, receipt, completed.record)
                        .await;
                }
                Ok(None) => {
                    debug!(patient_id, key, %tx_hash, "earlier mint not yet mined");
                    return Err(duplicate_in_flight());
                }
                Err(LedgerError::Reverted { .. }) => {
                    info!(patient_id, key, %tx_hash, "earlier mint reverted, reclaiming key");
                }
                Err(err) => return Err(err.into()),
            }
        } else if self.is_stale(&marker) {
            warn!(
                patient_id,
                key,
                created_at = %marker.created_at,
                "reclaiming stale idempotency marker"
            );
        } else {
            debug!(patient_id, key, "idempotency key already in flight");
            return Err(duplicate_in_flight());
        }

        let claimed = bounded(
            "storage",
            self.settings.call_timeout,
            self.store.replace_if_equal(
                marker_path,
                &existing,
                serde_json::to_value(&pending).map_err(|e| malformed(marker_path, e))?,
            ),
        )
        .await?;
        if !claimed {
            return Err(duplicate_in_flight());
        }
        self.mint_claimed(patient_id, marker_path, pending).await
    }

    async fn replay(
        &self,
        patient_id: &str,
        key: &str,
        receipt: MintReceipt,
        record: Option<Value>,
    ) -> Result<MintResult, ProvisioningError> {
        let resolved = self.resolve_or_create_wallet(patient_id).await?;
        info!(patient_id, key, tx_hash = %receipt.transaction_hash, "replaying completed mint");
        Ok(MintResult {
            wallet: resolved.wallet,
            wallet_created: false,
            receipt,
            record: record.unwrap_or_default(),
            duplicate: true,
        })
    }

    fn mint_timed_out(&self) -> ProvisioningError {
        let limit = self.settings.mint_timeout;
        warn!(
            operation = "ledger",
            timeout_ms = limit.as_millis() as u64,
            "remote call timed out"
        );
        ProvisioningError::timeout("ledger", limit)
    }

    /// Submit and confirm one mint. With a marker, the transaction hash is
    /// written to it as soon as the node accepts the transaction.
    async fn mint_to_wallet(
        &self,
        patient_id: &str,
        record: Value,
        marker: Option<(&str, &IdempotencyMarker)>,
    ) -> Result<MintResult, MintFailure> {
        let resolved = self
            .resolve_or_create_wallet(patient_id)
            .await
            .map_err(MintFailure::before_submit)?;
        let owner = resolved.wallet.wallet_address;
        let content = record.to_string();
        let started = Instant::now();

        debug!(patient_id, wallet = %owner, bytes = content.len(), "submitting mint");
        let tx_hash = match tokio::time::timeout(
            self.settings.mint_timeout,
            self.ledger.submit_mint(&owner, &content),
        )
        .await
        {
            Ok(Ok(tx_hash)) => tx_hash,
            Ok(Err(err)) => {
                // A transport failure can hide a broadcast the node accepted
                let maybe_submitted = matches!(err, LedgerError::Transport(_));
                return Err(MintFailure {
                    error: err.into(),
                    maybe_submitted,
                });
            }
            Err(_) => return Err(MintFailure::in_doubt(self.mint_timed_out())),
        };
        debug!(patient_id, %tx_hash, "mint submitted");

        if let Some((path, pending)) = marker {
            let submitted = IdempotencyMarker {
                transaction_hash: Some(tx_hash.clone()),
                ..pending.clone()
            };
            if let Err(err) = self.write_marker(path, &submitted).await {
                error!(
                    patient_id,
                    %tx_hash,
                    error = %err,
                    "could not record submitted transaction on idempotency marker"
                );
            }
        }

        let remaining = self.settings.mint_timeout.saturating_sub(started.elapsed());
        let receipt: MintReceipt =
            match tokio::time::timeout(remaining, self.ledger.confirm_mint(&tx_hash)).await {
                Ok(Ok(receipt)) => receipt,
                Ok(Err(err)) => {
                    let maybe_submitted = !matches!(err, LedgerError::Reverted { .. });
                    return Err(MintFailure {
                        error: err.into(),
                        maybe_submitted,
                    });
                }
                Err(_) => return Err(MintFailure::in_doubt(self.mint_timed_out())),
            };

        info!(
            patient_id,
            wallet = %owner,
            tx_hash = %receipt.transaction_hash,
            "record minted"
        );
        let detail = match receipt.token_id {
            Some(token_id) => format!("{} token {}", receipt.transaction_hash, token_id),
            None => receipt.transaction_hash.clone(),
        };
        log_access(
            &AccessLogEntry::new(patient_id, AuditAction::RecordMinted)
                .with_wallet(owner.to_checksum())
                .with_detail(detail),
        );

        Ok(MintResult {
            wallet: resolved.wallet,
            wallet_created: resolved.created,
            receipt,
            record,
            duplicate: false,
        })
    }

    /// Open a cursor over an existing patient's records; never creates a wallet
    pub async fn record_cursor(&self, patient_id: &str) -> Result<RecordCursor, ProvisioningError> {
        let wallet = self
            .find_wallet(patient_id)
            .await?
            .ok_or_else(|| ProvisioningError::NotFound {
                patient_id: patient_id.to_string(),
            })?;
        let owner = wallet.wallet_address;
        let count = bounded(
            "ledger",
            self.settings.call_timeout,
            self.ledger.balance_of(&owner),
        )
        .await?;

        Ok(RecordCursor {
            ledger: self.ledger.clone(),
            call_timeout: self.settings.call_timeout,
            owner,
            count,
            position: 0,
        })
    }

    /// All of a patient's records in mint order
    pub async fn list_records(&self, patient_id: &str) -> Result<Vec<RecordEntry>, ProvisioningError> {
        let mut cursor = self.record_cursor(patient_id).await?;
        let entries = cursor.collect_all().await?;

        log_access(
            &AccessLogEntry::new(patient_id, AuditAction::RecordsRead)
                .with_wallet(cursor.owner().to_checksum())
                .with_detail(format!("{} records", entries.len())),
        );
        Ok(entries)
    }
}

/// Restartable walk over one owner's tokens in index order.
///
/// The count is fixed when the cursor is opened; records minted later are
/// picked up by opening a new cursor.
pub struct RecordCursor {
    ledger: Arc<dyn RecordLedger>,
    call_timeout: Duration,
    owner: Address,
    count: u64,
    position: u64,
}

impl RecordCursor {
    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn len(&self) -> u64 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Start again from the first record
    pub fn rewind(&mut self) {
        self.position = 0;
    }

    pub async fn next_entry(&mut self) -> Result<Option<RecordEntry>, ProvisioningError> {
        if self.position >= self.count {
            return Ok(None);
        }
        let index = self.position;
        let token_id = bounded(
            "ledger",
            self.call_timeout,
            self.ledger.token_of_owner_by_index(&self.owner, index),
        )
        .await?;
        let content = bounded("ledger", self.call_timeout, self.ledger.token_uri(token_id)).await?;

        self.position += 1;
        Ok(Some(RecordEntry {
            index,
            token_id,
            owner: self.owner,
            payload: decode_token_content(&content),
        }))
    }

    /// Rewind and read every record
    pub async fn collect_all(&mut self) -> Result<Vec<RecordEntry>, ProvisioningError> {
        self.rewind();
        let mut entries = Vec::with_capacity(self.count.min(MAX_PREALLOCATED_ENTRIES) as usize);
        while let Some(entry) = self.next_entry().await? {
            entries.push(entry);
        }
        Ok(entries)
    }
}

/// Decode token content as JSON, accepting a `data:application/json,` URI.
///
/// Content that is not JSON comes back as a JSON string.
pub fn decode_token_content(content: &str) -> Value {
    let trimmed = content.trim();
    let decoded = match trimmed.strip_prefix(JSON_DATA_URI_PREFIX) {
        Some(encoded) => match urlencoding::decode(encoded) {
            Ok(text) => text.into_owned(),
            Err(_) => encoded.to_string(),
        },
        None => trimmed.to_string(),
    };

    match serde_json::from_str(&decoded) {
        Ok(value) => value,
        Err(err) => {
            warn!(error = %err, "token content is not JSON, returning it as text");
            Value::String(content.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::ledger::MemoryLedger;
    use crate::store::MemoryStore;
    use crate::vault::SealedKeyVault;
    use chrono::TimeZone;
    use paramak_shared::SealingKey;
    use serde_json::json;

    fn service() -> ProvisioningService {
        let store = Arc::new(MemoryStore::new());
        let vault = Arc::new(SealedKeyVault::new(store.clone(), SealingKey::new([3; 32])));
        ProvisioningService::new(
            store,
            Arc::new(MemoryLedger::new()),
            vault,
            ProvisioningSettings::default(),
        )
        .with_clock(Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2024, 1, 5, 8, 4, 5).unwrap(),
        )))
    }

    #[test]
    fn test_stamp_puts_date_first() {
        let record = service()
            .stamp_payload(Some(&json!({"note": "checkup", "bp": "120/80"})))
            .unwrap();
        assert_eq!(
            record.to_string(),
            r#"{"date":"1/5/2024 3:04:05 PM","note":"checkup","bp":"120/80"}"#
        );
    }

    #[test]
    fn test_stamp_caller_date_wins_in_first_position() {
        let record = service()
            .stamp_payload(Some(&json!({"note": "x", "date": "yesterday"})))
            .unwrap();
        assert_eq!(record.to_string(), r#"{"date":"yesterday","note":"x"}"#);
    }

    #[test]
    fn test_stamp_rejects_non_objects() {
        let svc = service();
        assert_eq!(
            svc.stamp_payload(None).unwrap(),
            json!({"date": "1/5/2024 3:04:05 PM"})
        );
        assert_eq!(
            svc.stamp_payload(Some(&Value::Null)).unwrap(),
            json!({"date": "1/5/2024 3:04:05 PM"})
        );
        assert!(matches!(
            svc.stamp_payload(Some(&json!([1, 2]))),
            Err(ProvisioningError::Permanent {
                kind: PermanentKind::InvalidInput,
                ..
            })
        ));
    }

    #[test]
    fn test_decode_token_content() {
        assert_eq!(decode_token_content(r#"{"a":1}"#), json!({"a": 1}));
        assert_eq!(
            decode_token_content("data:application/json,%7B%22a%22%3A1%7D"),
            json!({"a": 1})
        );
        assert_eq!(decode_token_content("ipfs://Qm123"), json!("ipfs://Qm123"));
    }

    #[tokio::test]
    async fn test_invalid_patient_id_rejected_before_any_write() {
        let svc = service();
        for bad in ["", "a/b", "a.b", "x#"] {
            assert!(matches!(
                svc.resolve_or_create_wallet(bad).await,
                Err(ProvisioningError::Permanent {
                    kind: PermanentKind::InvalidInput,
                    ..
                })
            ));
        }
    }

    #[tokio::test]
    async fn test_record_cursor_is_restartable() {
        let svc = service();
        for n in 0..3 {
            svc.mint_record(MintRequest {
                patient_id: "P1".to_string(),
                payload: Some(json!({ "n": n })),
                idempotency_key: None,
            })
            .await
            .unwrap();
        }

        let mut cursor = svc.record_cursor("P1").await.unwrap();
        assert_eq!(cursor.len(), 3);
        let first = cursor.next_entry().await.unwrap().unwrap();
        assert_eq!(first.payload["n"], 0);

        let all = cursor.collect_all().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0], first);
        assert!(cursor.next_entry().await.unwrap().is_none());
    }
}

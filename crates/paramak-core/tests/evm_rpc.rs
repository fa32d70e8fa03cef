//! `EvmRpcLedger` against an in-process JSON-RPC node.

use axum::{extract::State, routing::post, Json, Router};
use paramak_core::ledger::abi::{self, AbiValue};
use paramak_core::wallet::keccak256;
use paramak_core::{
    Address, EvmLedgerConfig, EvmRpcLedger, LedgerError, RecordLedger, TokenId, WalletSecret,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const CONTRACT: &str = "0x1111111111111111111111111111111111111111";
const RECORD: &str = r#"{"date":"1/5/2024 3:04:05 PM","note":"checkup"}"#;

#[derive(Default)]
struct FakeNode {
    nonce: AtomicU64,
    receipt_polls: AtomicU64,
    revert: AtomicBool,
    methods: Mutex<Vec<String>>,
    raw_transactions: Mutex<Vec<String>>,
}

fn word(value: u128) -> String {
    format!("0x{:064x}", value)
}

async fn handle(State(node): State<Arc<FakeNode>>, Json(request): Json<Value>) -> Json<Value> {
    let method = request["method"].as_str().unwrap_or_default().to_string();
    node.methods.lock().unwrap().push(method.clone());
    let params = &request["params"];

    let result = match method.as_str() {
        "eth_chainId" => json!("0x539"),
        "eth_getTransactionCount" => json!(format!("0x{:x}", node.nonce.load(Ordering::SeqCst))),
        "eth_gasPrice" => json!("0x3b9aca00"),
        "eth_estimateGas" => json!("0x186a0"),
        "eth_sendRawTransaction" => {
            let raw = params[0].as_str().unwrap().to_string();
            let bytes = hex::decode(raw.trim_start_matches("0x")).unwrap();
            node.raw_transactions.lock().unwrap().push(raw);
            node.nonce.fetch_add(1, Ordering::SeqCst);
            json!(format!("0x{}", hex::encode(keccak256(&bytes))))
        }
        "eth_getTransactionReceipt" => {
            // Pending on the first poll
            if node.receipt_polls.fetch_add(1, Ordering::SeqCst) == 0 {
                Value::Null
            } else {
                let transfer = format!("0x{}", hex::encode(keccak256(abi::TRANSFER_EVENT.as_bytes())));
                let status = if node.revert.load(Ordering::SeqCst) { "0x0" } else { "0x1" };
                json!({
                    "status": status,
                    "logs": [{
                        "address": CONTRACT,
                        "topics": [transfer, word(0), word(0), word(7)],
                    }],
                })
            }
        }
        "eth_call" => {
            let data = params[0]["data"].as_str().unwrap();
            let selector = hex::decode(&data[2..10]).unwrap();
            if selector == abi::selector(abi::BALANCE_OF) {
                json!(word(1))
            } else if selector == abi::selector(abi::TOKEN_OF_OWNER_BY_INDEX) {
                json!(word(7))
            } else if selector == abi::selector(abi::TOKEN_URI) {
                let encoded = abi::encode_call(abi::TOKEN_URI, &[AbiValue::String(RECORD.to_string())]);
                json!(format!("0x{}", hex::encode(&encoded[4..])))
            } else {
                return Json(json!({
                    "jsonrpc": "2.0",
                    "id": request["id"],
                    "error": { "code": 3, "message": "execution reverted" },
                }));
            }
        }
        _ => {
            return Json(json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "error": { "code": -32601, "message": "method not found" },
            }))
        }
    };

    Json(json!({ "jsonrpc": "2.0", "id": request["id"], "result": result }))
}

async fn start_node() -> (Arc<FakeNode>, EvmRpcLedger) {
    let node = Arc::new(FakeNode::default());
    let app = Router::new().route("/", post(handle)).with_state(node.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await });

    let ledger = EvmRpcLedger::new(EvmLedgerConfig {
        rpc_url: format!("http://{}/", addr),
        contract: CONTRACT.parse().unwrap(),
        admin: WalletSecret::from_bytes(&[0x46; 32]).unwrap(),
        request_timeout: Duration::from_secs(5),
        confirmation_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(10),
    })
    .unwrap();
    (node, ledger)
}

fn patient() -> Address {
    Address::new([0x22; 20])
}

#[tokio::test]
async fn test_reads_decode_contract_returns() {
    let (_node, ledger) = start_node().await;
    assert_eq!(ledger.balance_of(&patient()).await.unwrap(), 1);
    let token = ledger.token_of_owner_by_index(&patient(), 0).await.unwrap();
    assert_eq!(token, TokenId(7));
    assert_eq!(ledger.token_uri(token).await.unwrap(), RECORD);
}

#[tokio::test]
async fn test_safe_mint_signs_submits_and_confirms() {
    let (node, ledger) = start_node().await;
    let receipt = ledger.safe_mint(&patient(), RECORD).await.unwrap();
    assert_eq!(receipt.token_id, Some(TokenId(7)));

    let raw = node.raw_transactions.lock().unwrap()[0].clone();
    let bytes = hex::decode(raw.trim_start_matches("0x")).unwrap();
    assert_eq!(receipt.transaction_hash, format!("0x{}", hex::encode(keccak256(&bytes))));
    // Calldata travels inside the signed transaction
    let calldata = abi::encode_call(
        abi::SAFE_MINT,
        &[AbiValue::Address(patient()), AbiValue::String(RECORD.to_string())],
    );
    assert!(bytes.windows(calldata.len()).any(|w| w == calldata.as_slice()));

    let methods = node.methods.lock().unwrap().clone();
    let submit = methods
        .iter()
        .position(|m| m == "eth_sendRawTransaction")
        .unwrap();
    assert!(methods[..submit].contains(&"eth_getTransactionCount".to_string()));
    assert!(methods[..submit].contains(&"eth_estimateGas".to_string()));
    assert!(methods[submit..]
        .iter()
        .filter(|m| *m == "eth_getTransactionReceipt")
        .count()
        >= 2);
}

#[tokio::test]
async fn test_sequential_mints_use_consecutive_nonces() {
    let (node, ledger) = start_node().await;
    ledger.safe_mint(&patient(), "{}").await.unwrap();
    ledger.safe_mint(&patient(), "{}").await.unwrap();
    assert_eq!(node.nonce.load(Ordering::SeqCst), 2);
    let raws = node.raw_transactions.lock().unwrap().clone();
    assert_ne!(raws[0], raws[1]);
}

#[tokio::test]
async fn test_submitted_mint_receipt_lookup() {
    let (node, ledger) = start_node().await;
    let tx_hash = ledger.submit_mint(&patient(), RECORD).await.unwrap();

    // Unmined on the first lookup, then mined with the Transfer log
    assert_eq!(ledger.mint_receipt(&tx_hash).await.unwrap(), None);
    let receipt = ledger.mint_receipt(&tx_hash).await.unwrap().unwrap();
    assert_eq!(receipt.transaction_hash, tx_hash);
    assert_eq!(receipt.token_id, Some(TokenId(7)));
    assert_eq!(node.receipt_polls.load(Ordering::SeqCst), 2);

    node.revert.store(true, Ordering::SeqCst);
    assert!(matches!(
        ledger.mint_receipt(&tx_hash).await,
        Err(LedgerError::Reverted { .. })
    ));
}

#[tokio::test]
async fn test_reverted_mint_is_reported() {
    let (node, ledger) = start_node().await;
    node.revert.store(true, Ordering::SeqCst);
    assert!(matches!(
        ledger.safe_mint(&patient(), RECORD).await,
        Err(LedgerError::Reverted { .. })
    ));
}

#[tokio::test]
async fn test_unreachable_node_is_transport_error() {
    let ledger = EvmRpcLedger::new(EvmLedgerConfig {
        rpc_url: "http://127.0.0.1:1/".to_string(),
        contract: CONTRACT.parse().unwrap(),
        admin: WalletSecret::from_bytes(&[0x46; 32]).unwrap(),
        request_timeout: Duration::from_millis(500),
        confirmation_timeout: Duration::from_secs(1),
        poll_interval: Duration::from_millis(10),
    })
    .unwrap();
    assert!(matches!(
        ledger.balance_of(&patient()).await,
        Err(LedgerError::Transport(_))
    ));
}

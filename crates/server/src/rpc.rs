//! RPC façade.
//!
//! Each route maps to exactly one mining-master operation with no extra
//! logic: read queries pass through, `POST /transfer` is the client intake,
//! and `POST /blocks` / `POST /transactions` are the peer intake (empty
//! acknowledgement).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use permchain_core::Transaction;
use permchain_miner::MinerMaster;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

type Master = Arc<dyn MinerMaster>;

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub value: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HeightResponse {
    pub height: u64,
    pub leaf_hash: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub result: u8,
    pub block_hash: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferResponse {
    pub success: bool,
}

/// A serialized block riding inside a JSON envelope, as peers send it.
#[derive(Debug, Serialize, Deserialize)]
pub struct BlockPayload {
    pub json: String,
}

pub fn router(master: Master) -> Router {
    Router::new()
        .route("/accounts/:id", get(get_account))
        .route("/height", get(get_height))
        .route("/verify", post(verify))
        .route("/transfer", post(transfer))
        .route("/blocks/:hash", get(get_block))
        .route("/blocks", post(push_block))
        .route("/transactions", post(push_transaction))
        .with_state(master)
}

async fn get_account(State(master): State<Master>, Path(id): Path<String>) -> Json<BalanceResponse> {
    let info = master.get_user_info(&id);
    Json(BalanceResponse { value: info.balance })
}

async fn get_height(State(master): State<Master>) -> Json<HeightResponse> {
    let tip = master.get_latest_block();
    Json(HeightResponse {
        height: tip.height,
        leaf_hash: tip.hash,
    })
}

async fn verify(
    State(master): State<Master>,
    Json(tx): Json<Transaction>,
) -> Json<VerifyResponse> {
    let (status, block_hash) = master.verify_client_transaction(&tx);
    Json(VerifyResponse {
        result: status.code(),
        block_hash,
    })
}

async fn transfer(
    State(master): State<Master>,
    Json(tx): Json<Transaction>,
) -> Json<TransferResponse> {
    let success = master.on_client_transaction(tx);
    Json(TransferResponse { success })
}

async fn get_block(State(master): State<Master>, Path(hash): Path<String>) -> Json<BlockPayload> {
    let json = master
        .get_block(&hash)
        .map(|info| info.wire)
        .unwrap_or_default();
    Json(BlockPayload { json })
}

async fn push_block(State(master): State<Master>, Json(payload): Json<BlockPayload>) -> StatusCode {
    master.on_peer_block(&payload.json);
    StatusCode::OK
}

async fn push_transaction(
    State(master): State<Master>,
    Json(tx): Json<Transaction>,
) -> StatusCode {
    master.on_peer_transaction(tx);
    StatusCode::OK
}

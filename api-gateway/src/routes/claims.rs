//! Claimable totals, claim preparation, and claim confirmation.
//!
//! The gateway never signs or submits transactions. `POST /claim/prepare`
//! hands the client wallet the payout parameters; the wallet broadcasts
//! on its own and reports the transaction hash back through
//! `POST /claim/confirm`.

use axum::{Json, extract::Query, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use staking::{CanonicalAddress, ClaimError, PreparedClaim, StakeId};

use crate::state::SharedState;

/// Query string for `GET /rewards/claimable`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimableQuery {
    pub stake_id: u64,
}

/// Response body for `GET /rewards/claimable`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimableResponse {
    /// Sum of unclaimed reward amounts, in whole tokens.
    pub claimable_amount: f64,
}

/// `GET /rewards/claimable?stakeId=…`
pub async fn claimable(
    State(state): State<SharedState>,
    Query(query): Query<ClaimableQuery>,
) -> Result<Json<ClaimableResponse>, (StatusCode, String)> {
    let claimable_amount = state
        .claims
        .claimable_amount(StakeId(query.stake_id))
        .map_err(as_http_error)?;

    Ok(Json(ClaimableResponse { claimable_amount }))
}

/// Request body for `POST /claim/prepare`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareClaimRequest {
    pub stake_id: u64,
    pub wallet_address: String,
}

/// Response body for `POST /claim/prepare`.
///
/// `status` is `"ready"` with the transaction fields populated, or
/// `"no_rewards_available"` with them absent. An empty ledger is a
/// defined state, not an error.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrepareClaimResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
    /// 18-decimal fixed-point amount, as a string: it does not fit the
    /// 53-bit mantissa JSON numbers are safe for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_wei: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

/// `POST /claim/prepare`
pub async fn prepare_claim(
    State(state): State<SharedState>,
    Json(body): Json<PrepareClaimRequest>,
) -> Result<Json<PrepareClaimResponse>, (StatusCode, String)> {
    let wallet = CanonicalAddress::normalize(&body.wallet_address)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let prepared = state
        .claims
        .prepare_claim(StakeId(body.stake_id), &wallet)
        .map_err(as_http_error)?;

    let response = match prepared {
        PreparedClaim::Ready(tx) => PrepareClaimResponse {
            status: "ready",
            contract_address: Some(tx.contract_address.as_str().to_string()),
            amount_wei: Some(tx.amount_wei.to_string()),
            recipient: Some(tx.recipient.as_str().to_string()),
        },
        PreparedClaim::NoRewardsAvailable => PrepareClaimResponse {
            status: "no_rewards_available",
            contract_address: None,
            amount_wei: None,
            recipient: None,
        },
    };
    Ok(Json(response))
}

/// Request body for `POST /claim/confirm`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmClaimRequest {
    pub stake_id: u64,
    pub tx_hash: String,
}

/// Response body for `POST /claim/confirm`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmClaimResponse {
    pub success: bool,
}

/// `POST /claim/confirm`
///
/// Reconciles the ledger after the client reports a broadcast payout:
/// every currently-unclaimed record of the stake flips to claimed with
/// the transaction hash stamped on it.
pub async fn confirm_claim(
    State(state): State<SharedState>,
    Json(body): Json<ConfirmClaimRequest>,
) -> Result<Json<ConfirmClaimResponse>, (StatusCode, String)> {
    state
        .claims
        .confirm_claim(StakeId(body.stake_id), &body.tx_hash)
        .map_err(as_http_error)?;

    Ok(Json(ConfirmClaimResponse { success: true }))
}

/// Maps claim errors to HTTP status codes. A wallet mismatch is a bad
/// request, same as a malformed address.
fn as_http_error(e: ClaimError) -> (StatusCode, String) {
    let status = match &e {
        ClaimError::StakeNotFound(_) => StatusCode::NOT_FOUND,
        ClaimError::Unauthorized(_) => StatusCode::BAD_REQUEST,
        ClaimError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_mismatch_maps_to_bad_request() {
        let (status, _) = as_http_error(ClaimError::Unauthorized(StakeId(1)));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = as_http_error(ClaimError::StakeNotFound(StakeId(1)));
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn claimable_response_uses_the_documented_field_name() {
        let value = serde_json::to_value(ClaimableResponse {
            claimable_amount: 66.67,
        })
        .expect("serialize");
        assert_eq!(value["claimableAmount"], 66.67);
    }

    #[test]
    fn confirm_response_is_a_success_flag() {
        let value =
            serde_json::to_value(ConfirmClaimResponse { success: true }).expect("serialize");
        assert_eq!(value, serde_json::json!({ "success": true }));
    }

    #[test]
    fn prepared_claim_serializes_wei_as_a_string() {
        let value = serde_json::to_value(PrepareClaimResponse {
            status: "ready",
            contract_address: Some("0xc0ffee".to_string()),
            amount_wei: Some(66_670_000_000_000_000_000u128.to_string()),
            recipient: Some("0xbeef".to_string()),
        })
        .expect("serialize");
        assert_eq!(value["amountWei"], "66670000000000000000");

        let empty = serde_json::to_value(PrepareClaimResponse {
            status: "no_rewards_available",
            contract_address: None,
            amount_wei: None,
            recipient: None,
        })
        .expect("serialize");
        assert_eq!(empty, serde_json::json!({ "status": "no_rewards_available" }));
    }
}

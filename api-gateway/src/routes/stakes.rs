//! Stake creation, listing, and unstaking.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use staking::{
    CanonicalAddress, EndReason, RarityTier, Stake, StakeError, StakeId, TokenId, unix_now,
};

use crate::state::SharedState;

/// Wire representation of a stake row.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeDto {
    pub id: u64,
    pub wallet_address: String,
    pub token_id: u64,
    pub contract_address: String,
    pub rarity_tier: RarityTier,
    pub daily_reward_rate: f64,
    pub active: bool,
    pub start_time: u64,
    pub last_verification_time: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<EndReason>,
}

impl From<Stake> for StakeDto {
    fn from(stake: Stake) -> Self {
        StakeDto {
            id: stake.id.0,
            wallet_address: stake.wallet_address.as_str().to_string(),
            token_id: stake.token_id.0,
            contract_address: stake.contract_address.as_str().to_string(),
            rarity_tier: stake.rarity_tier,
            daily_reward_rate: stake.daily_reward_rate,
            active: stake.active,
            start_time: stake.start_time,
            last_verification_time: stake.last_verification_time,
            end_time: stake.end_time,
            end_reason: stake.end_reason,
        }
    }
}

/// Query string for `GET /stakes`.
#[derive(Debug, Deserialize)]
pub struct StakesQuery {
    pub wallet: String,
}

/// `GET /stakes?wallet=0x…`
///
/// Lists the wallet's active stakes. The wallet string is normalized
/// here, so any case or ellipsis variant of the same address sees the
/// same stakes.
pub async fn list_stakes(
    State(state): State<SharedState>,
    Query(query): Query<StakesQuery>,
) -> Result<Json<Vec<StakeDto>>, (StatusCode, String)> {
    let wallet = CanonicalAddress::normalize(&query.wallet)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let stakes = state
        .store
        .active_stakes_by_wallet(&wallet)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(stakes.into_iter().map(StakeDto::from).collect()))
}

/// Request body for `POST /stakes`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStakeRequest {
    pub wallet_address: String,
    pub contract_address: String,
    pub token_id: u64,
}

/// `POST /stakes`
///
/// Verifies on-chain that the wallet owns the token, resolves its rarity,
/// and enrols it. The ownership check does blocking network I/O, so the
/// whole operation runs on the blocking pool.
pub async fn create_stake(
    State(state): State<SharedState>,
    Json(body): Json<CreateStakeRequest>,
) -> Result<(StatusCode, Json<StakeDto>), (StatusCode, String)> {
    let lifecycle = state.lifecycle.clone();
    let stake = tokio::task::spawn_blocking(move || {
        lifecycle.create_stake(
            &body.wallet_address,
            &body.contract_address,
            TokenId(body.token_id),
            unix_now(),
        )
    })
    .await
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
    .map_err(as_http_error)?;

    Ok((StatusCode::CREATED, Json(StakeDto::from(stake))))
}

/// Request body for `POST /stakes/{id}/unstake`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnstakeRequest {
    pub wallet_address: String,
}

/// `POST /stakes/{id}/unstake`
///
/// Ends a stake at the owner's request. Unclaimed rewards stay claimable
/// afterwards; only accrual stops.
pub async fn unstake(
    State(state): State<SharedState>,
    Path(id): Path<u64>,
    Json(body): Json<UnstakeRequest>,
) -> Result<Json<StakeDto>, (StatusCode, String)> {
    let ended = state
        .lifecycle
        .unstake(StakeId(id), &body.wallet_address, unix_now())
        .map_err(as_http_error)?;

    Ok(Json(StakeDto::from(ended)))
}

/// Maps lifecycle errors to HTTP status codes. Ownership and wallet
/// mismatches are bad requests, same as malformed addresses; only
/// provider exhaustion is retryable.
pub fn as_http_error(e: StakeError) -> (StatusCode, String) {
    let status = match &e {
        StakeError::InvalidAddress(_)
        | StakeError::NotOwner { .. }
        | StakeError::Unauthorized(_) => StatusCode::BAD_REQUEST,
        StakeError::AlreadyStaked { .. } | StakeError::NotActive(_) => StatusCode::CONFLICT,
        StakeError::NotFound(_) => StatusCode::NOT_FOUND,
        StakeError::ChainUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        StakeError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use staking::ReaderError;

    #[test]
    fn error_mapping_follows_the_documented_statuses() {
        let invalid = CanonicalAddress::normalize("0x1").unwrap_err();
        let (status, _) = as_http_error(StakeError::InvalidAddress(invalid));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = as_http_error(StakeError::Unauthorized(StakeId(1)));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = as_http_error(StakeError::AlreadyStaked {
            existing: StakeId(1),
        });
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = as_http_error(StakeError::NotFound(StakeId(1)));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = as_http_error(StakeError::ChainUnavailable(
            ReaderError::AllProvidersExhausted {
                operation: "owner_of",
            },
        ));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}

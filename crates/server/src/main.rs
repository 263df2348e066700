use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use network_client::{FireFlyClient, NetworkClient};
use serde::Deserialize;
use server_api::{
    broadcast_blob, broadcast_message, burn_tokens, create_datatype, create_token_pool,
    get_datatype, get_token_pool, list_datatypes, list_organizations, list_token_pools,
    list_verifiers, mint_tokens, private_blob, private_message, self_organization,
    token_balances, token_operation_blob, transfer_tokens, ApiContext, TokenOperation,
};
use shared::{
    domain::{Balance, Datatype, Organization, TokenPool, Verifier},
    error::ApiError,
    protocol::{
        AsyncResponse, BalanceQuery, BroadcastValue, DatatypeInput, PrivateValue, TokenMintBurn,
        TokenPoolInput, TokenTransferInput,
    },
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;
mod multipart;
mod relay;

use app_state::AppState;
use config::{load_settings, prepare_firefly_endpoint};
use multipart::read_blob_form;

type HttpError = (StatusCode, Json<ApiError>);
type Accepted = (StatusCode, Json<AsyncResponse>);

#[derive(Debug, Deserialize)]
struct OrganizationsQuery {
    #[serde(default)]
    exclude_self: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let endpoint = prepare_firefly_endpoint(&settings.firefly_endpoint)?;
    let client = FireFlyClient::new(&endpoint, settings.firefly_namespace.clone()).map_err(|error| {
        error!(%endpoint, %error, "failed to configure network client");
        error
    })?;
    let network: Arc<dyn NetworkClient> = Arc::new(client);
    info!(%endpoint, namespace = %settings.firefly_namespace, "using network node");

    let state = AppState::new(
        ApiContext {
            network: network.clone(),
        },
        settings.event_buffer,
    );
    let _pump = relay::spawn_event_pump(network, state.events.clone(), relay::RECONNECT_DELAY);
    let app = build_router(Arc::new(state), settings.max_upload_bytes);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/common/organizations", get(http_list_organizations))
        .route("/api/common/organizations/self", get(http_self_organization))
        .route("/api/common/verifiers", get(http_list_verifiers))
        .route(
            "/api/datatypes",
            get(http_list_datatypes).post(http_create_datatype),
        )
        .route("/api/datatypes/:name/:version", get(http_get_datatype))
        .route(
            "/api/tokens/pools",
            get(http_list_token_pools).post(http_create_token_pool),
        )
        .route("/api/tokens/pools/:pool", get(http_get_token_pool))
        .route("/api/tokens/mint", post(http_mint_tokens))
        .route("/api/tokens/burn", post(http_burn_tokens))
        .route("/api/tokens/transfer", post(http_transfer_tokens))
        .route("/api/tokens/mintblob", post(http_mint_blob))
        .route("/api/tokens/burnblob", post(http_burn_blob))
        .route("/api/tokens/transferblob", post(http_transfer_blob))
        .route("/api/tokens/balances", get(http_token_balances))
        .route("/api/messages/broadcast", post(http_broadcast))
        .route("/api/messages/private", post(http_private))
        .route("/api/messages/broadcastblob", post(http_broadcast_blob))
        .route("/api/messages/privateblob", post(http_private_blob))
        .route("/api/ws", get(relay::ws_handler))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .with_state(state)
}

fn reject(err: ApiError) -> HttpError {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::BAD_GATEWAY);
    (status, Json(err))
}

fn accepted(response: AsyncResponse) -> Accepted {
    (StatusCode::ACCEPTED, Json(response))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn http_list_organizations(
    State(state): State<Arc<AppState>>,
    Query(q): Query<OrganizationsQuery>,
) -> Result<Json<Vec<Organization>>, HttpError> {
    let orgs = list_organizations(&state.api, q.exclude_self)
        .await
        .map_err(reject)?;
    Ok(Json(orgs))
}

async fn http_self_organization(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Organization>, HttpError> {
    let org = self_organization(&state.api).await.map_err(reject)?;
    Ok(Json(org))
}

async fn http_list_verifiers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Verifier>>, HttpError> {
    let verifiers = list_verifiers(&state.api).await.map_err(reject)?;
    Ok(Json(verifiers))
}

async fn http_create_datatype(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DatatypeInput>,
) -> Result<Accepted, HttpError> {
    let response = create_datatype(&state.api, req).await.map_err(reject)?;
    Ok(accepted(response))
}

async fn http_list_datatypes(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Datatype>>, HttpError> {
    let datatypes = list_datatypes(&state.api).await.map_err(reject)?;
    Ok(Json(datatypes))
}

async fn http_get_datatype(
    State(state): State<Arc<AppState>>,
    Path((name, version)): Path<(String, String)>,
) -> Result<Json<Datatype>, HttpError> {
    let datatype = get_datatype(&state.api, &name, &version)
        .await
        .map_err(reject)?;
    Ok(Json(datatype))
}

async fn http_list_token_pools(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TokenPool>>, HttpError> {
    let pools = list_token_pools(&state.api).await.map_err(reject)?;
    Ok(Json(pools))
}

async fn http_get_token_pool(
    State(state): State<Arc<AppState>>,
    Path(pool): Path<String>,
) -> Result<Json<TokenPool>, HttpError> {
    let pool = get_token_pool(&state.api, &pool).await.map_err(reject)?;
    Ok(Json(pool))
}

async fn http_create_token_pool(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TokenPoolInput>,
) -> Result<Accepted, HttpError> {
    let response = create_token_pool(&state.api, req).await.map_err(reject)?;
    Ok(accepted(response))
}

async fn http_mint_tokens(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TokenMintBurn>,
) -> Result<Accepted, HttpError> {
    let response = mint_tokens(&state.api, req).await.map_err(reject)?;
    Ok(accepted(response))
}

async fn http_burn_tokens(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TokenMintBurn>,
) -> Result<Accepted, HttpError> {
    let response = burn_tokens(&state.api, req).await.map_err(reject)?;
    Ok(accepted(response))
}

async fn http_transfer_tokens(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TokenTransferInput>,
) -> Result<Accepted, HttpError> {
    let response = transfer_tokens(&state.api, req).await.map_err(reject)?;
    Ok(accepted(response))
}

async fn http_token_balances(
    State(state): State<Arc<AppState>>,
    Query(q): Query<BalanceQuery>,
) -> Result<Json<Vec<Balance>>, HttpError> {
    let balances = token_balances(&state.api, q).await.map_err(reject)?;
    Ok(Json(balances))
}

async fn http_broadcast(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BroadcastValue>,
) -> Result<Accepted, HttpError> {
    let response = broadcast_message(&state.api, req).await.map_err(reject)?;
    Ok(accepted(response))
}

async fn http_private(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PrivateValue>,
) -> Result<Accepted, HttpError> {
    let response = private_message(&state.api, req).await.map_err(reject)?;
    Ok(accepted(response))
}

async fn http_broadcast_blob(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Accepted, HttpError> {
    let input = read_blob_form(multipart)
        .await
        .and_then(|form| form.into_message())
        .map_err(reject)?;
    let response = broadcast_blob(&state.api, input).await.map_err(reject)?;
    Ok(accepted(response))
}

async fn http_private_blob(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Accepted, HttpError> {
    let input = read_blob_form(multipart)
        .await
        .and_then(|form| form.into_message())
        .map_err(reject)?;
    let response = private_blob(&state.api, input).await.map_err(reject)?;
    Ok(accepted(response))
}

async fn http_mint_blob(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Accepted, HttpError> {
    token_blob(&state, TokenOperation::Mint, multipart).await
}

async fn http_burn_blob(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Accepted, HttpError> {
    token_blob(&state, TokenOperation::Burn, multipart).await
}

async fn http_transfer_blob(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Accepted, HttpError> {
    token_blob(&state, TokenOperation::Transfer, multipart).await
}

async fn token_blob(
    state: &AppState,
    operation: TokenOperation,
    multipart: Multipart,
) -> Result<Accepted, HttpError> {
    let input = read_blob_form(multipart)
        .await
        .and_then(|form| form.into_token_operation())
        .map_err(reject)?;
    let response = token_operation_blob(&state.api, operation, input)
        .await
        .map_err(reject)?;
    Ok(accepted(response))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;

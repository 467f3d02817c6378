// Tollgate — Unix Domain Socket Server
//
// Listens on a Unix domain socket for newline-delimited JSON-RPC 2.0
// requests from the host. Each connection runs in its own tokio task;
// every engine call runs on the blocking pool because the engine does
// synchronous storage and HTTP work.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use crate::error::TollgateError;
use crate::lifecycle::{CredentialIdentity, Engine, IssueRequest, RenewRequest};
use crate::store::{parse_duration, CallerMode, ConfigWrite, RoleWrite};

use super::protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, INTERNAL_ERROR, INVALID_REQUEST,
    METHOD_NOT_FOUND,
};

/// Unix Domain Socket server for Tollgate.
pub struct UdsServer {
    engine: Arc<Engine>,
    socket_path: PathBuf,
    default_lease: Duration,
}

impl UdsServer {
    pub fn new(engine: Arc<Engine>, socket_path: PathBuf, default_lease: Duration) -> Self {
        Self {
            engine,
            socket_path,
            default_lease,
        }
    }

    /// Start the UDS server. This runs until the process is terminated.
    pub async fn run(&self) -> Result<(), TollgateError> {
        if let Some(parent) = self.socket_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Remove stale socket file if it exists
        if self.socket_path.exists() {
            tokio::fs::remove_file(&self.socket_path).await?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        tracing::info!(
            socket = %self.socket_path.display(),
            "Tollgate UDS server listening"
        );

        // Owner-only: the socket hands out live tokens.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.socket_path, perms)?;
        }

        loop {
            let (stream, _addr) = listener.accept().await?;
            let engine = Arc::clone(&self.engine);
            let default_lease = self.default_lease;

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, engine, default_lease).await {
                    tracing::error!("Connection handler error: {}", e);
                }
            });
        }
    }
}

/// Handle a single client connection.
async fn handle_connection(
    stream: UnixStream,
    engine: Arc<Engine>,
    default_lease: Duration,
) -> Result<(), TollgateError> {
    if let Ok(cred) = stream.peer_cred() {
        tracing::debug!(uid = cred.uid(), pid = ?cred.pid(), "Client connected");
    }

    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let engine = Arc::clone(&engine);
        let response = tokio::task::spawn_blocking(move || {
            process_request(&line, &engine, default_lease)
        })
        .await
        .unwrap_or_else(|e| {
            JsonRpcResponse::error(Value::Null, INTERNAL_ERROR, format!("Handler failed: {}", e))
        });

        let mut json = serde_json::to_string(&response)
            .map_err(|e| TollgateError::Other(format!("Response encoding failed: {}", e)))?;
        json.push('\n');
        writer.write_all(json.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Parse and dispatch a single JSON-RPC request.
fn process_request(raw: &str, engine: &Engine, default_lease: Duration) -> JsonRpcResponse {
    let request: JsonRpcRequest = match serde_json::from_str(raw) {
        Ok(req) => req,
        Err(e) => return JsonRpcResponse::parse_error(format!("Parse error: {}", e)),
    };

    if let Err(e) = request.validate() {
        return JsonRpcResponse::error(request.id, INVALID_REQUEST, e);
    }

    let params = &request.params;
    let result = match request.method.as_str() {
        "config.write" => handle_config_write(engine, params),
        "config.read" => handle_config_read(engine, params),
        "config.delete" => handle_config_delete(engine, params),
        "config.list" => handle_config_list(engine),
        "role.write" => handle_role_write(engine, params),
        "role.read" => handle_role_read(engine, params),
        "role.delete" => handle_role_delete(engine, params),
        "role.list" => handle_role_list(engine, params),
        "token.issue" => handle_token_issue(engine, params),
        "token.read" => handle_token_read(engine, params),
        "token.renew" => handle_token_renew(engine, params, default_lease),
        "token.revoke" => handle_token_revoke(engine, params),
        "token.list" => handle_token_list(engine, params),
        _ => Err(JsonRpcError::new(
            METHOD_NOT_FOUND,
            format!("Unknown method: {}", request.method),
        )),
    };

    if let Err(ref e) = result {
        tracing::debug!(method = %request.method, code = e.code, "Request failed");
    }
    JsonRpcResponse::from_result(request.id, result)
}

// ─── Parameters ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ConfigWriteParams {
    org_id: String,
    url: Option<String>,
    auth_token: Option<String>,
    logical_name: Option<String>,
    caller_mode: Option<String>,
    renewal_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ConfigLookupParams {
    org_id: Option<String>,
    logical_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrgParams {
    org_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct OrgFilterParams {
    org_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoleWriteParams {
    org_id: String,
    role_name: String,
    role_id: Option<String>,
    ttl: Option<String>,
    max_ttl: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoleParams {
    org_id: String,
    role_name: String,
}

#[derive(Debug, Deserialize)]
struct TokenParams {
    org_id: String,
    role_name: String,
    logical_name: Option<String>,
    client_id: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

impl TokenParams {
    fn identity(&self) -> CredentialIdentity {
        CredentialIdentity {
            org_id: self.org_id.clone(),
            role_name: self.role_name.clone(),
            logical_name: self.logical_name.clone(),
            client_id: self.client_id.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RenewParams {
    org_id: String,
    role_name: String,
    /// Current lease TTL in seconds.
    #[serde(default)]
    ttl: u64,
}

/// Decode `params`; a missing params member reads as `{}`.
fn decode<T: DeserializeOwned>(params: &Value) -> Result<T, JsonRpcError> {
    let value = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params.clone()
    };
    serde_json::from_value(value)
        .map_err(|e| JsonRpcError::invalid_params(format!("Invalid params: {}", e)))
}

fn duration_param(field: &str, raw: Option<String>) -> Result<Option<Duration>, JsonRpcError> {
    match raw {
        Some(raw) => parse_duration(&raw).map(Some).ok_or_else(|| {
            JsonRpcError::invalid_params(format!("'{}' is not a valid duration: {}", field, raw))
        }),
        None => Ok(None),
    }
}

// ─── Config Handlers ─────────────────────────────────────────────────────────

fn handle_config_write(engine: &Engine, params: &Value) -> Result<Value, JsonRpcError> {
    let p: ConfigWriteParams = decode(params)?;
    let caller_mode = match p.caller_mode {
        Some(raw) => Some(CallerMode::parse(&raw).ok_or_else(|| {
            JsonRpcError::invalid_params(format!(
                "caller_mode must be 'standard' or 'sidecar', got '{}'",
                raw
            ))
        })?),
        None => None,
    };

    let config = engine.write_config(ConfigWrite {
        org_id: p.org_id,
        url: p.url,
        auth_token: p.auth_token,
        logical_name: p.logical_name,
        caller_mode,
        renewal_time: duration_param("renewal_time", p.renewal_time)?,
    })?;
    Ok(config.to_response())
}

fn handle_config_read(engine: &Engine, params: &Value) -> Result<Value, JsonRpcError> {
    let p: ConfigLookupParams = decode(params)?;
    let config = engine.read_config(p.org_id.as_deref(), p.logical_name.as_deref())?;
    Ok(config.to_response())
}

fn handle_config_delete(engine: &Engine, params: &Value) -> Result<Value, JsonRpcError> {
    let p: OrgParams = decode(params)?;
    let deleted = engine.delete_config(&p.org_id)?;
    Ok(json!({ "deleted": deleted, "org_id": p.org_id }))
}

fn handle_config_list(engine: &Engine) -> Result<Value, JsonRpcError> {
    let configs = engine.list_configs()?;
    Ok(Value::Array(configs.iter().map(|c| c.to_response()).collect()))
}

// ─── Role Handlers ───────────────────────────────────────────────────────────

fn handle_role_write(engine: &Engine, params: &Value) -> Result<Value, JsonRpcError> {
    let p: RoleWriteParams = decode(params)?;
    let outcome = engine.write_role(RoleWrite {
        org_id: p.org_id,
        role_name: p.role_name,
        role_id: p.role_id,
        ttl: duration_param("ttl", p.ttl)?,
        max_ttl: duration_param("max_ttl", p.max_ttl)?,
    })?;
    Ok(json!({
        "role": outcome.policy.to_response(),
        "warnings": outcome.warnings,
    }))
}

fn handle_role_read(engine: &Engine, params: &Value) -> Result<Value, JsonRpcError> {
    let p: RoleParams = decode(params)?;
    Ok(engine.read_role(&p.org_id, &p.role_name)?.to_response())
}

fn handle_role_delete(engine: &Engine, params: &Value) -> Result<Value, JsonRpcError> {
    let p: RoleParams = decode(params)?;
    let deleted = engine.delete_role(&p.org_id, &p.role_name)?;
    Ok(json!({ "deleted": deleted }))
}

fn handle_role_list(engine: &Engine, params: &Value) -> Result<Value, JsonRpcError> {
    let p: OrgFilterParams = decode(params)?;
    let roles = engine.list_roles(p.org_id.as_deref())?;
    Ok(Value::Array(roles.iter().map(|r| r.to_response()).collect()))
}

// ─── Token Handlers ──────────────────────────────────────────────────────────

fn handle_token_issue(engine: &Engine, params: &Value) -> Result<Value, JsonRpcError> {
    let p: TokenParams = decode(params)?;
    let request = IssueRequest {
        org_id: p.org_id,
        role_name: p.role_name,
        logical_name: p.logical_name,
        client_id: p.client_id,
        metadata: p.metadata,
    };

    // A role without a remote role id issues nothing and answers null.
    let Some(issued) = engine.issue(&request)? else {
        return Ok(Value::Null);
    };

    let mut result = issued.record.to_response();
    result["lease"] = issued.lease.to_response();
    result["reused"] = Value::Bool(issued.reused);
    Ok(result)
}

fn handle_token_read(engine: &Engine, params: &Value) -> Result<Value, JsonRpcError> {
    let p: TokenParams = decode(params)?;
    Ok(engine.read(&p.identity())?.to_response())
}

fn handle_token_renew(
    engine: &Engine,
    params: &Value,
    default_lease: Duration,
) -> Result<Value, JsonRpcError> {
    let p: RenewParams = decode(params)?;
    let request = RenewRequest {
        org_id: p.org_id,
        role_name: p.role_name,
        current_ttl: Duration::from_secs(p.ttl),
    };

    let (lease, degraded) = engine.renew_or_default(&request, default_lease)?;
    let mut result = lease.to_response();
    result["degraded"] = Value::Bool(degraded);
    Ok(result)
}

fn handle_token_revoke(engine: &Engine, params: &Value) -> Result<Value, JsonRpcError> {
    let p: TokenParams = decode(params)?;
    let record = engine.revoke(&p.identity())?;
    Ok(json!({ "revoked": true, "clientId": record.client_id }))
}

fn handle_token_list(engine: &Engine, params: &Value) -> Result<Value, JsonRpcError> {
    let p: OrgFilterParams = decode(params)?;
    let summaries = engine.list_credentials(p.org_id.as_deref())?;
    serde_json::to_value(&summaries)
        .map_err(|e| JsonRpcError::new(INTERNAL_ERROR, format!("Encoding failed: {}", e)))
}

// ─── Tests ───────────────────────────────────────────────────────────────────

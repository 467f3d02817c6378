// Tollgate — CLI Command Handlers
//
// Every command except `serve` opens the engine on the SQLite store and
// runs on tokio's blocking pool: the engine uses a blocking HTTP client,
// which must not be driven from inside the async runtime.

use std::sync::Arc;

use crate::error::TollgateError;
use crate::gateway::UdsServer;
use crate::lifecycle::{CredentialIdentity, Engine, IssueRequest, RenewRequest};
use crate::settings::Settings;
use crate::store::{
    format_duration, ConfigWrite, CredentialRecord, OrgConfig, RolePolicy, RoleWrite,
};

use super::{Cli, Commands, ConfigCommand, RoleCommand, TokenCommand, TokenTarget};

/// Execute the parsed CLI command.
pub async fn execute(cli: Cli) -> Result<(), TollgateError> {
    let mut settings = Settings::from_env()?;
    if let Some(dir) = cli.data_dir {
        settings.data_dir = dir;
    }

    match cli.command {
        Commands::Serve { socket } => cmd_serve(settings, socket).await,
        command => tokio::task::spawn_blocking(move || run(&settings, command))
            .await
            .map_err(|e| TollgateError::Other(format!("Command task failed: {}", e)))?,
    }
}

fn run(settings: &Settings, command: Commands) -> Result<(), TollgateError> {
    let engine = settings.open_engine()?;
    match command {
        Commands::Config(cmd) => cmd_config(&engine, cmd),
        Commands::Role(cmd) => cmd_role(&engine, cmd),
        Commands::Token(cmd) => cmd_token(&engine, settings, cmd),
        Commands::Serve { .. } => Err(TollgateError::Other(
            "serve must run on the async runtime".to_string(),
        )),
    }
}

// ─── Config ──────────────────────────────────────────────────────────────────

fn cmd_config(engine: &Engine, cmd: ConfigCommand) -> Result<(), TollgateError> {
    match cmd {
        ConfigCommand::Write {
            org_id,
            url,
            auth_token,
            logical_name,
            caller_mode,
            renewal_time,
        } => {
            let config = engine.write_config(ConfigWrite {
                org_id,
                url,
                auth_token,
                logical_name,
                caller_mode,
                renewal_time,
            })?;
            println!("✓ Config saved for org {}", config.org_id);
            print_config(&config);
        }
        ConfigCommand::Read {
            org_id,
            logical_name,
        } => {
            let config = engine.read_config(org_id.as_deref(), logical_name.as_deref())?;
            print_config(&config);
        }
        ConfigCommand::Delete { org_id } => {
            if engine.delete_config(&org_id)? {
                println!("✓ Config for org {} deleted", org_id);
            } else {
                println!("No config found for org {}", org_id);
            }
        }
        ConfigCommand::List => {
            let configs = engine.list_configs()?;
            if configs.is_empty() {
                println!("No organizations configured yet.");
                println!("Add one with: tollgate config write --org-id <id> --url <url> --logical-name <name>");
                return Ok(());
            }
            println!("Organizations ({}):\n", configs.len());
            for config in &configs {
                println!(
                    "  {:36} │ {:8} │ {:16} │ {}",
                    config.org_id, config.caller_mode, config.logical_name, config.url
                );
            }
        }
    }
    Ok(())
}

fn print_config(config: &OrgConfig) {
    println!("  Org ID:        {}", config.org_id);
    println!("  URL:           {}", config.url);
    println!("  Logical name:  {}", config.logical_name);
    println!("  Caller mode:   {}", config.caller_mode);
    println!("  Renewal time:  {}", format_duration(config.renewal_time));
    println!("  Auth token:    [REDACTED]");
}

// ─── Role ────────────────────────────────────────────────────────────────────

fn cmd_role(engine: &Engine, cmd: RoleCommand) -> Result<(), TollgateError> {
    match cmd {
        RoleCommand::Write {
            org_id,
            role_name,
            role_id,
            ttl,
            max_ttl,
        } => {
            let outcome = engine.write_role(RoleWrite {
                org_id,
                role_name,
                role_id,
                ttl,
                max_ttl,
            })?;
            for warning in &outcome.warnings {
                println!("! {}", warning);
            }
            println!("✓ Role saved");
            print_role(&outcome.policy);
        }
        RoleCommand::Read { org_id, role_name } => {
            print_role(&engine.read_role(&org_id, &role_name)?);
        }
        RoleCommand::Delete { org_id, role_name } => {
            if engine.delete_role(&org_id, &role_name)? {
                println!("✓ Role {} deleted from org {}", role_name, org_id);
            } else {
                println!("Role not found: {}", role_name);
            }
        }
        RoleCommand::List { org_id } => {
            let roles = engine.list_roles(org_id.as_deref())?;
            if roles.is_empty() {
                println!("No roles defined yet.");
                return Ok(());
            }
            println!("Roles ({}):\n", roles.len());
            for role in &roles {
                println!(
                    "  {:36} │ {:16} │ ttl {:>8} │ max {:>8}",
                    role.org_id,
                    role.role_name,
                    format_duration(role.ttl),
                    format_duration(role.max_ttl),
                );
            }
        }
    }
    Ok(())
}

fn print_role(policy: &RolePolicy) {
    println!("  Org ID:    {}", policy.org_id);
    println!("  Role:      {}", policy.role_name);
    println!("  Role ID:   {}", policy.role_id);
    println!("  TTL:       {}", format_duration(policy.ttl));
    println!("  Max TTL:   {}", format_duration(policy.max_ttl));
}

// ─── Token ───────────────────────────────────────────────────────────────────

fn cmd_token(engine: &Engine, settings: &Settings, cmd: TokenCommand) -> Result<(), TollgateError> {
    match cmd {
        TokenCommand::Issue { target, metadata } => {
            let request = IssueRequest {
                org_id: target.org_id,
                role_name: target.role_name,
                logical_name: target.logical_name,
                client_id: target.client_id,
                metadata: metadata.into_iter().collect(),
            };
            match engine.issue(&request)? {
                Some(issued) => {
                    if issued.reused {
                        println!("✓ Existing token reused");
                    } else {
                        println!("✓ Token issued");
                    }
                    print_record(&issued.record);
                    println!(
                        "  Lease:        ttl {}s, max {}s, renewable",
                        issued.lease.ttl.as_secs(),
                        issued.lease.max_ttl.as_secs()
                    );
                }
                None => {
                    println!(
                        "Role {} has no remote role id yet; nothing issued.",
                        request.role_name
                    );
                }
            }
        }
        TokenCommand::Read { target } => {
            print_record(&engine.read(&identity(target))?);
        }
        TokenCommand::Renew {
            org_id,
            role_name,
            ttl,
        } => {
            let request = RenewRequest {
                org_id,
                role_name,
                current_ttl: ttl,
            };
            let (lease, degraded) = engine.renew_or_default(&request, settings.default_lease)?;
            println!(
                "✓ Lease: ttl {}s, max {}s{}",
                lease.ttl.as_secs(),
                lease.max_ttl.as_secs(),
                if degraded { " (default lease, role not found)" } else { "" }
            );
        }
        TokenCommand::Revoke { target } => {
            let record = engine.revoke(&identity(target))?;
            println!("✓ Token {} revoked", record.client_id);
        }
        TokenCommand::List { org_id } => {
            let summaries = engine.list_credentials(org_id.as_deref())?;
            if summaries.is_empty() {
                println!("No tokens stored.");
                return Ok(());
            }
            println!("Stored tokens ({}):\n", summaries.len());
            for summary in &summaries {
                println!(
                    "  {:36} │ {:12} │ {:16} │ {}",
                    summary.client_id,
                    summary.role_name,
                    summary.logical_name,
                    summary.issued_at.format("%Y-%m-%d %H:%M:%S UTC"),
                );
            }
        }
    }
    Ok(())
}

fn identity(target: TokenTarget) -> CredentialIdentity {
    CredentialIdentity {
        org_id: target.org_id,
        role_name: target.role_name,
        logical_name: target.logical_name,
        client_id: target.client_id,
    }
}

fn print_record(record: &CredentialRecord) {
    println!("  Client ID:    {}", record.client_id);
    println!("  Org ID:       {}", record.org_id);
    println!("  Role:         {}", record.role_name);
    println!("  Logical name: {}", record.logical_name);
    println!("  Issued:       {}", record.issued_at.format("%Y-%m-%d %H:%M:%S UTC"));
    for (key, value) in &record.metadata {
        println!("  Meta {}: {}", key, value);
    }
    println!("  Token:        {}", record.token());
    println!("  Secret:       [REDACTED]");
}

// ─── Serve ───────────────────────────────────────────────────────────────────

async fn cmd_serve(
    settings: Settings,
    socket: Option<std::path::PathBuf>,
) -> Result<(), TollgateError> {
    let socket_path = socket.unwrap_or_else(|| settings.socket_path.clone());
    let engine = {
        let settings = settings.clone();
        tokio::task::spawn_blocking(move || settings.open_engine())
            .await
            .map_err(|e| TollgateError::Other(format!("Startup task failed: {}", e)))??
    };

    println!("Starting Tollgate gateway at {}...", socket_path.display());
    UdsServer::new(Arc::new(engine), socket_path, settings.default_lease)
        .run()
        .await
}

// ─── Tests ───────────────────────────────────────────────────────────────────

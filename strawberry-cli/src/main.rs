// Strawberry command line client
//
// The command tree is not compiled in: it is built from the server's
// `/describe` answer, so new commands and parameters show up without a
// client release.

mod schema;

use anyhow::{bail, Context};
use clap::Parser;
use serde::Deserialize;
use serde_json::{json, Value};
use strawberry_core::CommandDescription;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "strawberry")]
#[command(about = "Manage strawberry operations through the control plane", long_about = None)]
#[command(version)]
struct Cli {
    /// Control plane address
    #[arg(long, env = "STRAWBERRY_SERVER", default_value = "http://localhost:8080")]
    server: String,

    /// Bearer token sent with every command
    #[arg(long, env = "STRAWBERRY_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Cluster the command is sent to
    #[arg(long, visible_alias = "cluster", env = "STRAWBERRY_PROXY")]
    proxy: Option<String>,

    /// Log requests to stderr
    #[arg(long, short)]
    verbose: bool,

    /// Command and its parameters, see `strawberry help`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Description {
    #[serde(default)]
    clusters: Vec<String>,
    #[serde(default)]
    commands: Vec<CommandDescription>,
}

async fn fetch_description(http: &reqwest::Client, server: &str) -> anyhow::Result<Description> {
    let url = format!("{}/describe", server.trim_end_matches('/'));
    debug!("GET {}", url);
    let response = http
        .get(&url)
        .send()
        .await
        .with_context(|| format!("cannot reach {}", url))?
        .error_for_status()?;
    Ok(response.json().await?)
}

async fn run_command(
    http: &reqwest::Client,
    cli: &Cli,
    proxy: &str,
    command: &str,
    params: Value,
) -> anyhow::Result<Value> {
    let url = format!("{}/{}/{}", cli.server.trim_end_matches('/'), proxy, command);
    let body = json!({ "params": params, "unparsed": true });
    debug!("POST {} {}", url, body);

    let mut request = http.post(&url).json(&body);
    if let Some(token) = &cli.token {
        request = request.bearer_auth(token);
    }
    let response = request.send().await.with_context(|| format!("cannot reach {}", url))?;
    let status = response.status();
    let envelope: Value = response
        .json()
        .await
        .with_context(|| format!("server answered {} without an envelope", status))?;

    match envelope["status"].as_str() {
        Some("ok") => Ok(envelope.get("result").cloned().unwrap_or(Value::Null)),
        Some("error") => bail!(
            "{} ({})",
            envelope["message"].as_str().unwrap_or("unknown error"),
            status
        ),
        _ => bail!("unexpected response ({}): {}", status, envelope),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let http = reqwest::Client::new();
    let description = fetch_description(&http, &cli.server).await?;

    let app = schema::build_command(&description.commands);
    let argv = std::iter::once("strawberry".to_string()).chain(cli.command.iter().cloned());
    let matches = app.try_get_matches_from(argv).unwrap_or_else(|e| e.exit());
    let Some((name, sub_matches)) = matches.subcommand() else {
        bail!("no command given");
    };
    let Some(command) = description.commands.iter().find(|c| c.name == name) else {
        bail!("unknown command {:?}", name);
    };

    let Some(proxy) = cli.proxy.as_deref() else {
        bail!(
            "no cluster given; pass --proxy or set STRAWBERRY_PROXY (available: {})",
            description.clusters.join(", ")
        );
    };

    let params = schema::collect_params(command, sub_matches);
    let result = run_command(&http, &cli, proxy, name, params).await?;
    if !result.is_null() {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    Ok(())
}

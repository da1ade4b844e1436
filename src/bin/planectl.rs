use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Map, Value};

#[derive(Parser)]
#[command(name = "planectl")]
#[command(about = "Operator CLI for the resilience control plane", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "PLANE_API_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check control plane status
    Status,
    /// List every circuit breaker
    Breakers,
    /// Show one circuit breaker
    Breaker { name: String },
    /// Force a circuit breaker back to CLOSED
    ResetBreaker { name: String },
    /// List deployments
    Deployments,
    /// Show one deployment
    Deployment { id: String },
    /// Create a multi-region deployment
    CreateDeployment {
        id: String,
        #[arg(long)]
        name: String,
        /// Comma-separated region names
        #[arg(long, value_delimiter = ',', required = true)]
        regions: Vec<String>,
        #[arg(long)]
        primary: String,
        /// active-passive, active-active or nearest-region
        #[arg(long)]
        strategy: Option<String>,
    },
    /// Show the serving region of a deployment
    Active { id: String },
    /// Probe every region of a deployment now
    Health { id: String },
    /// Fail over a deployment, optionally to a named region
    Failover {
        id: String,
        #[arg(long)]
        to: Option<String>,
    },
    /// Update a region's endpoints or status
    UpdateRegion {
        id: String,
        region: String,
        #[arg(long)]
        endpoint_url: Option<String>,
        #[arg(long)]
        health_check_url: Option<String>,
        /// inactive, deploying, active, degraded or failing
        #[arg(long)]
        status: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let base = cli.url.trim_end_matches('/');
    let request = match cli.command {
        Commands::Status => client.get(format!("{}/admin/status", base)),
        Commands::Breakers => client.get(format!("{}/admin/breakers", base)),
        Commands::Breaker { name } => client.get(format!("{}/admin/breakers/{}", base, name)),
        Commands::ResetBreaker { name } => {
            client.post(format!("{}/admin/breakers/{}/reset", base, name))
        }
        Commands::Deployments => client.get(format!("{}/admin/deployments", base)),
        Commands::Deployment { id } => client.get(format!("{}/admin/deployments/{}", base, id)),
        Commands::CreateDeployment {
            id,
            name,
            regions,
            primary,
            strategy,
        } => client.post(format!("{}/admin/deployments", base)).json(&json!({
            "deployment_id": id,
            "name": name,
            "regions": regions,
            "primary_region": primary,
            "failover_strategy": strategy,
        })),
        Commands::Active { id } => {
            client.get(format!("{}/admin/deployments/{}/active", base, id))
        }
        Commands::Health { id } => {
            client.post(format!("{}/admin/deployments/{}/health", base, id))
        }
        Commands::Failover { id, to } => client
            .post(format!("{}/admin/deployments/{}/failover", base, id))
            .json(&json!({ "to_region": to })),
        Commands::UpdateRegion {
            id,
            region,
            endpoint_url,
            health_check_url,
            status,
        } => {
            let mut body = Map::new();
            for (field, value) in [
                ("endpoint_url", endpoint_url),
                ("health_check_url", health_check_url),
                ("status", status),
            ] {
                if let Some(value) = value {
                    body.insert(field.to_string(), Value::String(value));
                }
            }
            client
                .post(format!("{}/admin/deployments/{}/regions/{}", base, id, region))
                .json(&body)
        }
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

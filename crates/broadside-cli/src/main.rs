use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use broadside_core::domain::{
    Campaign, CampaignId, CampaignStatus, ListId, OwnerId, Recipient, ServerCredential, ServerId,
    SubscriberId, Template, TemplateId, TransportSecurity,
};
use broadside_core::impls::{DryRunGateway, InMemoryCampaignStore, SmtpGateway};
use broadside_core::observability::init_tracing;
use broadside_core::ports::{Clock, DeliveryGateway, SystemClock};
use broadside_core::{
    CampaignRegistry, EngineConfig, RegistryBuilder, ScheduleFailure, ScheduleLoop,
};

#[derive(Parser)]
#[command(name = "broadside")]
#[command(about = "Run an email campaign through the dispatch engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a campaign fixture, deliver it, print the delivery log as JSON
    Run {
        /// Engine config (TOML)
        #[arg(long)]
        config: PathBuf,

        /// Campaign fixture (JSON)
        #[arg(long)]
        campaign: PathBuf,

        /// Log messages instead of talking to SMTP servers
        #[arg(long)]
        dry_run: bool,

        /// With --dry-run: every send to this address fails
        #[arg(long = "fail", value_name = "EMAIL")]
        fail: Vec<String>,

        /// With --dry-run: the first send to this address fails
        #[arg(long = "flaky", value_name = "EMAIL")]
        flaky: Vec<String>,

        /// Status poll interval while waiting for completion
        #[arg(long, default_value = "200")]
        poll_ms: u64,
    },

    /// Validate a config file and print the effective values
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

/// Campaign fixture. Ids are generated on load.
#[derive(Debug, Deserialize)]
struct CampaignFixture {
    name: String,
    subject: String,
    template: TemplateFixture,
    servers: Vec<ServerFixture>,
    lists: Vec<ListFixture>,

    /// Schedule instead of starting right away.
    #[serde(default)]
    start_in_secs: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TemplateFixture {
    name: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ServerFixture {
    name: String,
    host: String,
    port: u16,
    username: String,
    secret: String,
    security: TransportSecurity,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ListFixture {
    recipients: Vec<RecipientFixture>,
}

#[derive(Debug, Deserialize)]
struct RecipientFixture {
    email: String,
    #[serde(default)]
    name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            campaign,
            dry_run,
            fail,
            flaky,
            poll_ms,
        } => {
            let config = EngineConfig::load(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            init_tracing(&config.logging)?;

            let gateway: Arc<dyn DeliveryGateway> = if dry_run {
                let mut gateway = DryRunGateway::new();
                for email in fail {
                    gateway = gateway.fail_always(email);
                }
                for email in flaky {
                    gateway = gateway.fail_first(email, 1);
                }
                Arc::new(gateway)
            } else {
                if !fail.is_empty() || !flaky.is_empty() {
                    warn!("--fail/--flaky only apply with --dry-run");
                }
                Arc::new(SmtpGateway::new(config.smtp.timeout()))
            };

            run(config, &campaign, gateway, Duration::from_millis(poll_ms)).await
        }
        Commands::CheckConfig { config } => {
            let config = EngineConfig::load(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn run(
    config: EngineConfig,
    fixture_path: &Path,
    gateway: Arc<dyn DeliveryGateway>,
    poll: Duration,
) -> Result<()> {
    let raw = std::fs::read_to_string(fixture_path)
        .with_context(|| format!("reading {}", fixture_path.display()))?;
    let fixture: CampaignFixture = serde_json::from_str(&raw)
        .with_context(|| format!("parsing {}", fixture_path.display()))?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(InMemoryCampaignStore::new(Arc::clone(&clock)));
    let (campaign_id, start_in_secs) = seed(&store, fixture, clock.as_ref()).await;

    let registry = RegistryBuilder::new()
        .config(config.clone())
        .store(store)
        .gateway(gateway)
        .clock(Arc::clone(&clock))
        .build()?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (failures_tx, mut failures_rx) = mpsc::unbounded_channel();
    let schedule_loop = ScheduleLoop::new(
        registry.clone(),
        Arc::clone(&clock),
        config.schedule.poll_interval(),
    )
    .report_failures_to(failures_tx);
    let schedule_task = tokio::spawn(schedule_loop.run(shutdown_rx));

    match start_in_secs {
        Some(secs) => {
            let at = clock.now() + chrono::Duration::seconds(secs);
            registry.schedule_campaign(campaign_id, at).await?;
        }
        None => {
            let report = registry.start_campaign(campaign_id).await?;
            info!(queued = report.queued, "started");
        }
    }

    let outcome = tokio::select! {
        result = wait_for_completion(&registry, campaign_id, poll) => result,
        error = scheduled_start_failure(&mut failures_rx, campaign_id) => Err(error),
        _ = tokio::signal::ctrl_c() => {
            warn!(campaign_id = %campaign_id, "interrupted, terminating campaign");
            registry.terminate_campaign(campaign_id).await?;
            Ok(CampaignStatus::Terminated)
        }
    };

    let _ = shutdown_tx.send(true);
    let _ = schedule_task.await;
    registry.shutdown().await;

    let status = outcome?;
    let log = registry.delivery_log(campaign_id).await?;
    println!("{}", serde_json::to_string_pretty(&log)?);
    info!(campaign_id = %campaign_id, status = ?status, rows = log.len(), "done");
    Ok(())
}

async fn wait_for_completion(
    registry: &CampaignRegistry,
    campaign_id: CampaignId,
    poll: Duration,
) -> Result<CampaignStatus> {
    let mut ticker = tokio::time::interval(poll);
    loop {
        ticker.tick().await;
        let snapshot = registry.status(campaign_id).await?;
        match snapshot.status {
            CampaignStatus::Completed | CampaignStatus::Terminated => return Ok(snapshot.status),
            _ => {
                if let Some(counts) = snapshot.queue {
                    debug!(?counts, "waiting for queue to drain");
                }
            }
        }
    }
}

/// Resolves with the first failed scheduled Start of `campaign_id`.
/// Otherwise the campaign would stay Scheduled and we would wait forever.
async fn scheduled_start_failure(
    failures: &mut mpsc::UnboundedReceiver<ScheduleFailure>,
    campaign_id: CampaignId,
) -> anyhow::Error {
    while let Some(failure) = failures.recv().await {
        if failure.campaign_id == campaign_id {
            return anyhow::Error::new(failure.error)
                .context(format!("scheduled start of {campaign_id} failed"));
        }
    }
    // loop が止まった: 他の分岐に任せる
    std::future::pending().await
}

/// Insert the fixture into the store and return the new campaign id.
async fn seed(
    store: &InMemoryCampaignStore,
    fixture: CampaignFixture,
    clock: &dyn Clock,
) -> (CampaignId, Option<i64>) {
    let now = clock.now();
    let owner = OwnerId::generate();

    let template = Template {
        id: TemplateId::generate(),
        name: fixture.template.name,
        content: fixture.template.content,
    };
    let template_id = template.id;
    store.insert_template(template).await;

    let mut server_ids = Vec::with_capacity(fixture.servers.len());
    for server in fixture.servers {
        let credential = ServerCredential {
            id: ServerId::generate(),
            name: server.name,
            host: server.host,
            port: server.port,
            username: server.username,
            secret: server.secret,
            security: server.security,
            owner,
            active: server.active,
        };
        server_ids.push(credential.id);
        store.insert_server(credential).await;
    }

    let mut list_ids = Vec::with_capacity(fixture.lists.len());
    for list in fixture.lists {
        let list_id = ListId::generate();
        list_ids.push(list_id);
        store
            .insert_recipients(list.recipients.into_iter().map(|r| {
                let recipient = Recipient::new(SubscriberId::generate(), r.email, list_id);
                match r.name {
                    Some(name) => recipient.with_name(name),
                    None => recipient,
                }
            }))
            .await;
    }

    let campaign = Campaign::new(
        CampaignId::generate(),
        fixture.name,
        fixture.subject,
        server_ids,
        template_id,
        list_ids,
        owner,
        now,
    );
    let campaign_id = campaign.id;
    store.insert_campaign(campaign).await;

    (campaign_id, fixture.start_in_secs)
}

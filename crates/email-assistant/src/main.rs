use anyhow::{Context, Result};
use email_assistant::agent::{DecisionLoop, GeminiOracle};
use email_assistant::auth::{GoogleSession, CALENDAR_SCOPES, GMAIL_SCOPES};
use email_assistant::config::{AssistantMode, Config};
use email_assistant::gateways::{GmailGateway, GoogleCalendarGateway};
use email_assistant::poller::Poller;
use email_assistant::tools::CapabilityRegistry;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "email_assistant=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    let tz = config.tz()?;
    let timeout = config.request_timeout();

    let gmail_session =
        GoogleSession::establish("gmail", &config.gmail.account(), GMAIL_SCOPES)
            .await
            .context("Failed to authenticate with Gmail")?;
    let gmail = Arc::new(
        GmailGateway::new(Arc::new(gmail_session), timeout)
            .context("Failed to set up the Gmail client")?,
    );

    let capabilities = match config.mode {
        AssistantMode::Scheduling => {
            let calendar_session =
                GoogleSession::establish("calendar", &config.calendar.account(), CALENDAR_SCOPES)
                    .await
                    .context("Failed to authenticate with Google Calendar")?;
            let calendar = Arc::new(
                GoogleCalendarGateway::new(
                    Arc::new(calendar_session),
                    config.calendar.calendar_id.clone(),
                    timeout,
                )
                .context("Failed to set up the Google Calendar client")?,
            );
            CapabilityRegistry::scheduling(calendar, gmail.clone(), tz)
        }
        AssistantMode::DraftOnly => CapabilityRegistry::draft_only(gmail.clone()),
    };

    let oracle = GeminiOracle::new(&config.agent, config.model_timeout())
        .context("Failed to configure the language model")?;

    tracing::info!(
        mode = ?config.mode,
        model = %config.agent.model,
        timezone = %config.timezone,
        capabilities = ?capabilities.names(),
        "assistant_configured"
    );

    let agent = DecisionLoop::new(
        Arc::new(oracle),
        capabilities,
        config.mode,
        tz,
        config.agent.max_steps,
    );
    let mut poller = Poller::new(
        gmail,
        agent,
        config.poll_interval(),
        config.lookback_slack(),
        config.ledger_capacity,
    );

    tokio::select! {
        _ = poller.run() => {}
        result = signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            tracing::info!("shutdown_requested");
        }
    }

    tracing::info!("assistant_stopped");
    Ok(())
}

// SPDX-FileCopyrightText: 2025 Chase Colman
// SPDX-License-Identifier: MPL-2.0

use std::io::Write;
use std::process;

use appsync_events_realtime::{
    AuthType, Channel, CredentialProvider, Endpoint, KeepAliveStatus, Publisher, SessionBuilder,
    SessionEvent, channel::DEFAULT_PUBLISH_CHANNEL, channel::DEFAULT_SUBSCRIBE_CHANNEL,
};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Subscribe and publish to AWS AppSync Events", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log the auth protocol token and every signed header bundle
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct Target {
    /// API id, resolved to the default AppSync domains
    #[arg(long, conflicts_with = "domain", required_unless_present = "domain")]
    api_id: Option<String>,

    /// HTTP domain of the API (custom domains included)
    #[arg(long)]
    domain: Option<String>,

    /// Signing region; derived from the domain when omitted
    #[arg(long, env = "AWS_REGION")]
    region: Option<String>,

    /// Authorize with an API key instead of IAM credentials
    #[arg(long, env = "APPSYNC_API_KEY")]
    api_key: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe to a channel and print incoming events
    Subscribe {
        #[command(flatten)]
        target: Target,

        /// Channel path
        #[arg(long, default_value = DEFAULT_SUBSCRIBE_CHANNEL)]
        channel: String,
    },

    /// Publish events to a channel over HTTP
    Publish {
        #[command(flatten)]
        target: Target,

        /// Channel path
        #[arg(long, default_value = DEFAULT_PUBLISH_CHANNEL)]
        channel: String,

        /// Event to publish as JSON; plain text is sent as a JSON string
        #[arg(short, long = "message", required = true, num_args = 1..=5)]
        messages: Vec<String>,
    },
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose {
            "appsync_events_realtime=debug,appsync_events=debug"
        } else {
            "warn"
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let result = match cli.command {
        Command::Subscribe { target, channel } => subscribe(target, &channel).await,
        Command::Publish {
            target,
            channel,
            messages,
        } => publish(target, &channel, &messages).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

async fn resolve(target: &Target) -> Result<(Endpoint, AuthType), BoxError> {
    let endpoint = Endpoint::from_options(
        target.api_id.as_deref(),
        target.domain.as_deref(),
        target.region.as_deref(),
    )?;

    let auth_type = match &target.api_key {
        Some(key) => AuthType::new_api_key(&endpoint, key.clone()),
        None => AuthType::new_iam(&endpoint, CredentialProvider::from_env().await?)?,
    };

    debug!(
        http = endpoint.http_domain(),
        realtime = %endpoint.realtime_url(),
        "resolved endpoint"
    );
    Ok((endpoint, auth_type))
}

async fn subscribe(target: Target, channel: &str) -> Result<(), BoxError> {
    let (endpoint, auth_type) = resolve(&target).await?;

    let (session, mut events) = SessionBuilder::new(endpoint)
        .with_auth(auth_type)
        .connect()
        .await?;

    let id = session.subscribe(channel).await?;
    println!("<< subscribe {} ({})", channel, id);

    let mut keep_alive = session.keep_alive();
    let mut ka_printed = false;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if ka_printed {
                    println!();
                    ka_printed = false;
                }
                match event {
                    SessionEvent::Data { event, .. } => {
                        println!("{} >> {}", timestamp(), event);
                    }
                    SessionEvent::Protocol { payload, .. } => {
                        println!("{} >> {}", timestamp(), payload);
                    }
                    SessionEvent::Malformed { raw, reason } => {
                        eprintln!("{} !! malformed frame ({}): {}", timestamp(), reason, raw);
                    }
                    SessionEvent::SubscriptionTimedOut { subscription_id } => {
                        eprintln!("{} !! subscription {} timed out", timestamp(), subscription_id);
                    }
                    SessionEvent::SubscriptionFailed(error) => {
                        session.close().await?;
                        return Err(error.into());
                    }
                    SessionEvent::Failed(error) => return Err(error.into()),
                }
            }
            Ok(()) = keep_alive.changed() => {
                let status = *keep_alive.borrow_and_update();
                if status.streak > 0 {
                    print_keep_alive(status);
                    ka_printed = true;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, closing session");
                session.close().await?;
            }
        }
    }

    println!("Connection closed");
    Ok(())
}

/// Rewrite the keep-alive line in place
fn print_keep_alive(status: KeepAliveStatus) {
    if status.streak > 1 {
        print!("\r>> KA (x{})", status.streak);
    } else {
        print!("\r>> KA");
    }
    let _ = std::io::stdout().flush();
}

async fn publish(target: Target, channel: &str, messages: &[String]) -> Result<(), BoxError> {
    let channel = Channel::new(channel)?;
    let (endpoint, auth_type) = resolve(&target).await?;

    let events: Vec<Value> = messages
        .iter()
        .map(|m| serde_json::from_str(m).unwrap_or_else(|_| Value::String(m.clone())))
        .collect();

    let response = Publisher::new(endpoint, auth_type)
        .publish(&channel, &events)
        .await?;

    for event in &response.successful {
        println!("{} published #{} as {}", timestamp(), event.index, event.identifier);
    }
    for event in &response.failed {
        eprintln!(
            "{} failed #{}: {} {}",
            timestamp(),
            event.index,
            event.code.as_deref().unwrap_or("unknown"),
            event.message.as_deref().unwrap_or_default()
        );
    }

    if response.failed.is_empty() {
        Ok(())
    } else {
        Err(format!("{} event(s) rejected", response.failed.len()).into())
    }
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S%.3f").to_string()
}

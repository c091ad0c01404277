use std::{io, sync::Arc};

use anyhow::Result;
use clap::Parser;
use client_core::{LoginFormController, SubmitOutcome, TrackerClient};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod popup;

use popup::{collect_form, PopupForm, TerminalNotifier};

/// Terminal rendition of the job tracker's credentials popup.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    password: Option<String>,
    #[arg(long)]
    sheet_id: Option<String>,
    /// Forward accepted credentials to a tracker server.
    #[arg(long)]
    server_url: Option<String>,
    /// Start a mail sync once the server has the credentials.
    #[arg(long, requires = "server_url")]
    sync: bool,
    /// Print the user's tracked jobs after submitting.
    #[arg(long, requires = "server_url")]
    list_jobs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(io::stderr)
        .init();
    let args = Args::parse();

    let preset = PopupForm::new(args.email, args.password, args.sheet_id);
    let form = collect_form(preset, &mut io::stdin().lock(), &mut io::stdout())?;

    let notifier = Arc::new(TerminalNotifier::new(
        io::BufReader::new(io::stdin()),
        io::stdout(),
    ));
    let controller = LoginFormController::new(notifier);
    let SubmitOutcome::Accepted(credentials) = controller.submit(&form) else {
        return Ok(());
    };

    let Some(server_url) = args.server_url else {
        return Ok(());
    };
    let mut client = TrackerClient::new(server_url);
    let registered = client.submit_credentials(&credentials).await?;
    println!(
        "Registered user {} with sheet {}",
        registered.user_id, registered.sheet_id
    );
    if !registered.google_linked {
        println!(
            "Link your Google account: {}",
            client.google_login_url(registered.user_id)?
        );
    }

    if args.sync {
        let started = client.trigger_sync(registered.user_id).await?;
        if started.started {
            println!("Sync started.");
        } else {
            println!("A sync is already running.");
        }
    }

    if args.list_jobs {
        let jobs = client.list_jobs(registered.user_id).await?;
        info!(count = jobs.len(), "fetched tracked jobs");
        for job in jobs {
            println!(
                "{:>4}  {:<30} {:<24} {}",
                job.row_number, job.job_title, job.company, job.status
            );
        }
    }

    Ok(())
}

//! `edit`: hold an editor session until Ctrl-C or lease loss

use anyhow::Result;
use catalog_core::config::Config;
use catalog_core::session::{prepare_stores, CatalogSession, LoginOutcome, LoginRequest};
use catalog_core::store::EditorScope;
use catalog_core::writer_lock::LeaseState;
use tracing::{error, info, warn};

pub async fn run(
    config: &Config,
    user: String,
    scope: EditorScope,
    fallback_reader: bool,
) -> Result<()> {
    let report = prepare_stores(config);
    for outcome in report.failed() {
        if let Err(e) = &outcome.result {
            warn!(area = %outcome.area, error = %e, "store could not be prepared");
        }
    }

    let session = match CatalogSession::login(config, LoginRequest::editor(user.clone(), scope))
        .await?
    {
        LoginOutcome::Opened(session) => session,
        LoginOutcome::Contended {
            area, holder, ..
        } => {
            let age = holder
                .age_secs
                .map(|s| format!("{}s ago", s))
                .unwrap_or_else(|| "at an unknown time".to_string());
            println!(
                "{} is being edited by {} (last heartbeat {}, {})",
                area.label(),
                holder.holder,
                holder.heartbeat_at,
                age
            );
            if !fallback_reader {
                return Ok(());
            }
            println!("Opening read-only.");
            let reader = CatalogSession::open_reader(config, user).await?;
            tokio::signal::ctrl_c().await?;
            reader.close().await;
            return Ok(());
        }
    };

    println!(
        "Editing {} as {}. Press Ctrl-C to release the lock.",
        scope.label(),
        session.user()
    );

    let mut events = session.lease_events();
    let lease_lost = async {
        match events.as_mut() {
            Some(rx) => rx.wait_for(LeaseState::is_lost).await.map(|s| s.clone()).ok(),
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!(error = %e, "cannot listen for Ctrl-C");
            }
            info!("interrupted, releasing lock");
        }
        lost = lease_lost => {
            if let Some(LeaseState::Lost { reason, .. }) = lost {
                println!("Lock lost ({}). Session is now read-only; restart to edit again.", reason);
            }
        }
    }

    session.close().await;
    Ok(())
}

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use dblab_engine::api::{CloneApi, CreateCloneRequest, DbCredentials, SnapshotRef, UpdateCloneRequest};
use dblab_engine::config::EngineConfig;
use dblab_engine::observe::{observe, ObserveOptions, SessionStore};

use super::{print_json, report_error};
use crate::cli::{Cli, CloneCmd};

pub(crate) fn run_clone(cli: &Cli, cmd: &CloneCmd) -> ExitCode {
    // Checked before any request is made
    if let Some(None) = cmd.clone_id() {
        let use_err = dblab_engine::color_enabled_stderr();
        dblab_engine::log_error_stderr(use_err, "CLONE_ID argument is required");
        return ExitCode::from(1);
    }
    match dispatch(cli, cmd) {
        Ok(code) => code,
        Err(e) => report_error(&e),
    }
}

fn api(cli: &Cli) -> Result<CloneApi> {
    Ok(CloneApi::new(&cli.url, cli.token.clone())?)
}

fn dispatch(cli: &Cli, cmd: &CloneCmd) -> Result<ExitCode> {
    let id = cmd.clone_id().flatten().unwrap_or_default();
    match cmd {
        CloneCmd::List => {
            let clones = api(cli)?.list_clones().context("cannot list clones")?;
            print_json(&clones)?;
        }
        CloneCmd::Status { .. } => {
            let clone = api(cli)?
                .get_clone(id)
                .with_context(|| format!("cannot get clone {id}"))?;
            print_json(&clone)?;
        }
        CloneCmd::Create {
            username,
            password,
            id: clone_id,
            snapshot_id,
            project,
            protected,
            async_mode,
        } => {
            let req = CreateCloneRequest {
                id: clone_id.clone().unwrap_or_default(),
                project: project.clone().unwrap_or_default(),
                protected: *protected,
                snapshot: snapshot_id.clone().map(|id| SnapshotRef {
                    id,
                    ..Default::default()
                }),
                db: DbCredentials {
                    username: username.clone(),
                    password: password.clone(),
                },
            };
            let clone = api(cli)?
                .create_clone(&req, *async_mode)
                .context("cannot create clone")?;
            print_json(&clone)?;
        }
        CloneCmd::Update { protected, .. } => {
            let clone = api(cli)?
                .update_clone(id, &UpdateCloneRequest {
                    protected: *protected,
                })
                .with_context(|| format!("cannot update clone {id}"))?;
            print_json(&clone)?;
        }
        CloneCmd::Reset { async_mode, .. } => {
            let reset = api(cli)?
                .reset_clone(id, *async_mode)
                .with_context(|| format!("cannot reset clone {id}"))?;
            match reset {
                Some(clone) => print_json(&clone)?,
                None => println!("The clone is being reset: {id}"),
            }
        }
        CloneCmd::Destroy { async_mode, .. } => {
            api(cli)?
                .destroy_clone(id, *async_mode)
                .with_context(|| format!("cannot destroy clone {id}"))?;
            if *async_mode {
                println!("The clone is being destroyed: {id}");
            } else {
                println!("The clone has been successfully destroyed: {id}");
            }
        }
        CloneCmd::Observe {
            sslmode,
            follow,
            interval_seconds,
            max_lock_duration_seconds,
            max_duration_seconds,
            ..
        } => {
            // The password only authenticates database-level sampling; it is never stored
            let opts = ObserveOptions {
                follow: *follow,
                interval: Duration::from_secs((*interval_seconds).max(1)),
                max_duration: max_duration_seconds.map(Duration::from_secs),
                max_lock_duration: max_lock_duration_seconds.map(Duration::from_secs),
                sslmode: sslmode.clone(),
            };
            let session = observe(&api(cli)?, id, &opts, |s| {
                println!("[{}] {} {}", s.at, s.code, s.message);
            })
            .with_context(|| format!("cannot observe clone {id}"))?;
            let cfg = EngineConfig::load(cli.config.as_deref())?;
            let path = SessionStore::new(&cfg.state_dir())
                .save(&session)
                .context("cannot store observation session")?;
            if cli.verbose {
                eprintln!("dblab: observation stored at {}", path.display());
            }
        }
        CloneCmd::ObserveSummary => {
            let cfg = EngineConfig::load(cli.config.as_deref())?;
            let sessions = SessionStore::new(&cfg.state_dir())
                .load_all()
                .context("cannot read observation sessions")?;
            if sessions.is_empty() {
                println!("No observation sessions found.");
                return Ok(ExitCode::SUCCESS);
            }
            let use_out = dblab_engine::color_enabled_stdout();
            let mut failed = false;
            for s in sessions.iter().map(|s| s.summary()) {
                let check = match s.within_max_duration {
                    Some(true) => dblab_engine::paint(use_out, "\x1b[32m", "ok"),
                    Some(false) => {
                        failed = true;
                        dblab_engine::paint(use_out, "\x1b[31;1m", "exceeded")
                    }
                    None => "n/a".to_string(),
                };
                let max_lock = s
                    .max_lock_duration_ms
                    .map(|ms| humantime::format_duration(Duration::from_millis(ms)).to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}: samples={} status_changes={} duration={} final={} max_duration={} max_lock_duration={}",
                    s.clone_id,
                    s.samples,
                    s.status_changes,
                    humantime::format_duration(Duration::from_millis(s.duration_ms)),
                    s.final_status.as_deref().unwrap_or("-"),
                    check,
                    max_lock
                );
            }
            if failed {
                return Ok(ExitCode::from(1));
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

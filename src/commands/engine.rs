use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use dblab_engine::config::EngineConfig;
use dblab_engine::docker::{
    CancelToken, CloneContainerManager, DockerEngine, DockerMountInspector, ImageProvisioner,
};
use dblab_engine::host::SystemHostInfo;
use dblab_engine::lock::{should_acquire_lock, CloneLock};
use dblab_engine::runner::LocalRunner;
use dblab_engine::ui::warn::warn_confirm;

use super::report_error;
use crate::cli::{Cli, EngineCmd};

type Manager = CloneContainerManager<LocalRunner, SystemHostInfo, DockerMountInspector<LocalRunner>>;

pub(crate) fn run_engine(cli: &Cli, cmd: &EngineCmd) -> ExitCode {
    match dispatch(cli, cmd) {
        Ok(code) => code,
        Err(e) => report_error(&e),
    }
}

struct Engine {
    cfg: EngineConfig,
    manager: Manager,
    images: ImageProvisioner<DockerEngine>,
}

impl Engine {
    fn new(cli: &Cli) -> Result<Self> {
        let cfg = EngineConfig::load(cli.config.as_deref())?;
        // A missing docker binary surfaces as a spawn error (exit 127) on first use
        let docker = cfg.docker_path().unwrap_or_else(|_| PathBuf::from("docker"));
        let runner = LocalRunner::new(docker);
        let manager = CloneContainerManager::new(
            runner.clone(),
            SystemHostInfo::default(),
            DockerMountInspector::new(runner),
        );
        let mut engine = DockerEngine::new(&cfg.docker_socket);
        if let Some(v) = &cfg.api_version {
            engine = engine.with_api_version(v);
        }
        Ok(Self {
            cfg,
            manager,
            images: ImageProvisioner::new(engine),
        })
    }

    fn lock(&self, name: &str) -> Result<Option<CloneLock>> {
        if !should_acquire_lock() {
            return Ok(None);
        }
        let lock = CloneLock::acquire(&self.cfg.lock_dir(), name)
            .with_context(|| format!("cannot lock clone {name}"))?;
        Ok(Some(lock))
    }
}

fn dispatch(cli: &Cli, cmd: &EngineCmd) -> Result<ExitCode> {
    let engine = Engine::new(cli)?;
    let use_err = dblab_engine::color_enabled_stderr();

    match cmd {
        EngineCmd::Run {
            name,
            port,
            image,
            network,
            flags,
            no_pull,
            dry_run,
        } => {
            let mut config = engine.cfg.clone_config(name, *port);
            if let Some(img) = image {
                config = config.with_image(img);
            }
            if let Some(net) = network {
                config = config.with_network(net);
            }
            for (k, v) in flags {
                config = config.with_flag(k, v);
            }

            if *dry_run {
                let preview = engine.manager.run_command(&config)?.preview();
                eprintln!("dblab: docker: {preview}");
                eprintln!("dblab: dry-run requested; not executing Docker.");
                return Ok(ExitCode::SUCCESS);
            }

            let _lock = engine.lock(name)?;
            if *no_pull {
                if !engine.images.image_exists(&config.docker_image)? {
                    anyhow::bail!("image {} is not present locally", config.docker_image);
                }
            } else {
                if cli.verbose {
                    dblab_engine::log_info_stderr(
                        use_err,
                        &format!("dblab: preparing image {}", config.docker_image),
                    );
                }
                engine
                    .images
                    .prepare_image(&config.docker_image, &CancelToken::new())?;
            }
            let out = engine.manager.run_container(&config)?;
            println!("{}", out.trim());
        }
        EngineCmd::Stop { name } => {
            let _lock = engine.lock(name)?;
            let config = engine.cfg.clone_config(name, 0);
            print!("{}", engine.manager.stop_container(&config)?);
        }
        EngineCmd::Rm { name, yes } => {
            let msg = format!("about to remove clone container {name} and its volumes");
            if !yes && !warn_confirm(&[msg.as_str()], true) {
                dblab_engine::log_warn_stderr(use_err, "dblab: aborted");
                return Ok(ExitCode::from(1));
            }
            let _lock = engine.lock(name)?;
            print!("{}", engine.manager.remove_container(name)?);
        }
        EngineCmd::Ls { pool } => {
            let pool = pool.as_deref().unwrap_or(&engine.cfg.pool.name);
            for name in engine.manager.list_containers(pool)? {
                println!("{name}");
            }
        }
        EngineCmd::Logs {
            name,
            since_minutes,
        } => {
            let config = engine.cfg.clone_config(name, 0);
            print!("{}", engine.manager.get_logs(&config, *since_minutes)?);
        }
        EngineCmd::Exec { name, command } => {
            let config = engine.cfg.clone_config(name, 0);
            print!("{}", engine.manager.exec(&config, &command.join(" "))?);
        }
        EngineCmd::Status { name } => {
            let running = engine.images.is_container_running(name)?;
            println!("{}", if running { "running" } else { "not running" });
            if !running {
                return Ok(ExitCode::from(3));
            }
        }
        EngineCmd::Volumes { name, port } => {
            let config = engine.cfg.clone_config(name, *port);
            let (socket_dir, volumes) = engine.manager.volumes(&config)?;
            println!("socket dir: {}", socket_dir.display());
            for v in volumes {
                println!("volume: {v}");
            }
        }
        EngineCmd::PrepareImage { image } => {
            let image = image.as_deref().unwrap_or(&engine.cfg.image);
            engine.images.prepare_image(image, &CancelToken::new())?;
            if cli.verbose {
                dblab_engine::log_info_stderr(use_err, &format!("dblab: image {image} is ready"));
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

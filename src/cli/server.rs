use actix_web::{web, HttpServer};
use error_stack::{Result, ResultExt};
use futures::future::join_all;
use std::net::IpAddr;
use std::num::NonZeroUsize;
use thiserror::Error;
use tracing::info;
use tracing_actix_web::TracingLogger;

use clap::Parser;
use whisperline::config::Server as Config;
use whisperline::outbox::OutboxWorker;
use whisperline::sweeper::Sweeper;
use whisperline::util::signal::{shutdown_signal, Shutdown};
use whisperline::App;

/// Expose the whisperline HTTP API
#[derive(Debug, Parser)]
pub struct ServerCommand {
    #[clap(long)]
    pub address: Option<IpAddr>,
    #[clap(long)]
    pub port: Option<u16>,
    #[clap(long)]
    pub workers: Option<NonZeroUsize>,
}

#[derive(Debug, Error)]
#[error("Failed to start the server")]
pub struct StartServerError;

pub fn run(args: &ServerCommand) -> Result<(), StartServerError> {
    let (mut config, runtime) = super::setup(None).change_context(StartServerError)?;
    args.override_config(&mut config);
    runtime.block_on(serve(config))
}

async fn serve(config: Config) -> Result<(), StartServerError> {
    let address = (config.ip, config.port);
    let workers = config.workers;

    let app = App::new(config).await.change_context(StartServerError)?;
    let (trigger, shutdown) = Shutdown::channel();

    let mut tasks = Vec::new();
    if app.config.relay.outbox_enabled {
        let worker = OutboxWorker::new(app.store.clone(), app.relay.clone(), &app.config.relay);
        tasks.push(tokio::spawn(worker.run(shutdown.clone())));
    }
    let sweeper = Sweeper::new(app.store.clone(), &app.config.notifications);
    tasks.push(tokio::spawn(sweeper.run(shutdown)));

    let relay_enabled = app.config.relay.webhook_secret.is_some();
    let data = web::Data::new(app);
    let server = HttpServer::new(move || {
        actix_web::App::new()
            .app_data(data.clone())
            .wrap(TracingLogger::default())
            .configure(move |cfg| whisperline::http::configure(cfg, relay_enabled))
    })
    .workers(workers)
    .disable_signals()
    .bind(address)
    .change_context(StartServerError)
    .attach_printable_lazy(|| format!("could not bind to {}:{}", address.0, address.1))?
    .run();

    info!("listening on {}:{}", address.0, address.1);

    let handle = server.handle();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received, stopping the server");
        handle.stop(true).await;
    });

    server.await.change_context(StartServerError)?;

    trigger.trigger();
    join_all(tasks).await;
    info!("server stopped");
    Ok(())
}

impl ServerCommand {
    fn override_config(&self, config: &mut Config) {
        // override server configurations if set by the cli
        if let Some(address) = self.address {
            config.ip = address;
        }

        if let Some(port) = self.port {
            config.port = port;
        }

        if let Some(workers) = self.workers {
            config.workers = workers.get();
        }
    }
}

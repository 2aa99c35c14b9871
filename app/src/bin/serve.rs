use std::net::SocketAddr;
use std::path::PathBuf;

use actix_web::{middleware::Logger, App, HttpServer};
use anyhow::{Context, Result};
use log::*;
use structopt::StructOpt;

use drinks::catalog::Catalog;
use drinks::{Backend, Config};
use infra::persistence::Store;

#[derive(Debug, StructOpt)]
#[structopt(name = "serve", about = "Serve the drinks catalog.")]
struct Opt {
    /// Configuration file; defaults plus `DRINKS_*` variables when omitted
    #[structopt(parse(from_os_str))]
    config: Option<PathBuf>,
}

#[actix_web::main]
async fn main() -> Result<()> {
    let opt = Opt::from_args();
    let config = Config::load(opt.config.as_deref())?;
    config.logging.builder().init();
    debug!("Options: {:?}; config: {:?}", opt, config);

    let addr = config.listener.addr;
    match config.store.open()? {
        Backend::Postgres(catalog) => run(catalog, addr).await,
        Backend::Memory(catalog) => run(catalog, addr).await,
    }
}

async fn run<M, D>(catalog: Catalog<M>, addr: SocketAddr) -> Result<()>
where
    M: r2d2::ManageConnection<Connection = D>,
    D: Store + Send + 'static,
{
    catalog.setup().context("setup store")?;

    let srv = HttpServer::new(move || {
        let catalog = catalog.clone();
        App::new()
            .wrap(Logger::default())
            .configure(move |cfg| catalog.configure(cfg))
    })
    .bind(addr)
    .context("bind")?;
    info!("Listening on: {:?}", srv.addrs());
    srv.run().await?;
    Ok(())
}

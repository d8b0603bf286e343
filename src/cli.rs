use std::error::Error;
use std::fs;
use std::io::{self, Read};
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use trellosite::markdown::render_markdown;
use trellosite::store::StoreSource;
use trellosite::web::{self, WebConfig};

#[derive(Parser, Debug)]
#[command(name = "trellosite", about = "Serve Trello boards as websites", version)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server.
    Serve(ServeArgs),
    /// Render card markdown to HTML the way the site does.
    Render {
        /// Markdown file to render; reads stdin when omitted.
        file: Option<PathBuf>,
    },
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "SITE_ADDR", default_value = "0.0.0.0:5000")]
    addr: SocketAddr,
    /// Domain whose subdomains are board sites.
    #[arg(long, env = "DOMAIN", default_value = "localhost")]
    base_domain: String,
    /// Postgres connection string for the board mirror.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
    /// Upper bound on pooled database connections.
    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 7)]
    max_connections: u32,
    /// Serve from a JSON fixture instead of Postgres.
    #[arg(long, env = "SITE_FIXTURES")]
    fixtures: Option<PathBuf>,
    /// Append page view snapshots to this file.
    #[arg(long, env = "PAGEVIEWS_PATH")]
    pageviews_path: Option<PathBuf>,
}

impl ServeArgs {
    fn source(&self) -> Result<StoreSource, Box<dyn Error>> {
        if let Some(path) = &self.fixtures {
            return Ok(StoreSource::Fixtures(path.clone()));
        }
        self.database_source()
            .ok_or_else(|| "no content source: pass --database-url or --fixtures".into())
    }

    #[cfg(feature = "postgres")]
    fn database_source(&self) -> Option<StoreSource> {
        self.database_url.as_ref().map(|url| StoreSource::Postgres {
            url: url.clone(),
            max_connections: self.max_connections,
        })
    }

    #[cfg(not(feature = "postgres"))]
    fn database_source(&self) -> Option<StoreSource> {
        None
    }

    fn into_config(self) -> Result<WebConfig, Box<dyn Error>> {
        let source = self.source()?;
        Ok(WebConfig {
            addr: self.addr,
            base_domain: self.base_domain,
            source,
            pageviews_path: self.pageviews_path,
        })
    }
}

pub fn run() -> Result<(), Box<dyn Error>> {
    // A missing .env file is the normal case in production.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => handle_serve(args),
        Command::Render { file } => handle_render(file),
    }
}

fn handle_serve(args: ServeArgs) -> Result<(), Box<dyn Error>> {
    init_tracing();
    let config = args.into_config()?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    info!(addr = %config.addr, "starting site server");
    runtime.block_on(web::serve(config))?;
    Ok(())
}

fn handle_render(file: Option<PathBuf>) -> Result<(), Box<dyn Error>> {
    let input = match file {
        Some(path) => fs::read_to_string(path)?,
        None => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            buffer
        }
    };
    println!("{}", render_markdown(&input));
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

//! This module contains the main structure and logic for the command
//! line front-end.

use std::time::Duration;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use log::{debug, error, info, trace, LevelFilter};

use crate::errors::CacheError;
use crate::kb::NamespaceAllocator;
use crate::models::{QueryKind, QueryOutput, Writers};
use crate::nvticache::NvtCache;
use crate::readers::resp::RedisKb;
use crate::readers::KbStore;
use crate::settings::{ScannerSettings, DEFAULT_SCANNER};
use crate::writers::json::JsonWriter;
use crate::writers::textstdout::TextStdoutWriter;
use crate::writers::Writer;

/// Represents the application
pub struct Application {
    /// The arguments given on the command line.
    argv: Args,
}

impl Application {
    /// Creates a new application from the command line arguments.
    /// Exits with a usage message if they are inconsistent.
    pub fn new() -> Self {
        trace!("In Application::new()");
        let argv = Args::parse();
        if argv.query.needs_oid() && argv.oid.is_none() {
            Args::command()
                .error(
                    ErrorKind::MissingRequiredArgument,
                    "this query needs an OID, use --oid",
                )
                .exit();
        }
        Self::from_args(argv)
    }

    /// Creates a new application from already parsed arguments.
    pub fn from_args(argv: Args) -> Self {
        Application { argv }
    }

    /// The arguments of the application.
    pub fn argv(&self) -> &Args {
        &self.argv
    }

    /// Finds where the knowledge base listens: the --address argument,
    /// or the scanner settings.
    fn db_address(&self) -> Result<String, CacheError> {
        if let Some(address) = &self.argv.address {
            debug!("Using the address given on the command line");
            return Ok(address.clone());
        }
        let settings = ScannerSettings::from_scanner(&self.argv.scanner)?;
        debug!(
            "Scanner settings: drop_privileges = {}, use_mac_addr = {}",
            settings.drop_privileges, settings.use_mac_addr
        );
        Ok(settings.db_address)
    }

    /// Claims a namespace, answers the query and releases the namespace.
    pub fn query<S: KbStore>(&self, store: S) -> Result<QueryOutput, CacheError> {
        trace!("In Application::query()");
        let mut kb = NamespaceAllocator::new(store).claim()?;
        let oid = self.argv.oid.as_deref().unwrap_or_default();
        let mut cache = NvtCache::new(&mut kb);

        let output = match self.argv.query {
            QueryKind::Metadata => cache.fetch_metadata(oid).map(QueryOutput::Map),
            QueryKind::Params => cache.fetch_params(oid).map(QueryOutput::Params),
            QueryKind::Refs => cache.fetch_references(oid).map(QueryOutput::Refs),
            QueryKind::Prefs => cache.fetch_preferences(oid).map(QueryOutput::List),
            QueryKind::Timeout => cache
                .fetch_timeout(oid)
                .map(|t| QueryOutput::Scalar(Some(t))),
            QueryKind::Tag => cache.fetch_tag(oid).map(|t| QueryOutput::Scalar(Some(t))),
            QueryKind::Oids => cache.list_oids().map(QueryOutput::List),
            QueryKind::Version => cache.fetch_feed_version().map(QueryOutput::Scalar),
        };

        kb.release()?;
        output
    }

    /// Runs the global application
    pub fn run(&self) -> Result<(), CacheError> {
        trace!("Running Application::run()");
        let address = self.db_address()?;
        let timeout = Duration::from_secs(self.argv.timeout);
        info!("Connecting to the knowledge base at {}", address);
        let store = RedisKb::connect(&address, timeout)?;

        let output = self.query(store).map_err(|e| {
            error!("The query failed: {}", e);
            e
        })?;

        let writer: Box<dyn Writer> = match self.argv.writer {
            Writers::TextStdout => Box::new(TextStdoutWriter::new(&self.argv)),
            Writers::Json => Box::new(JsonWriter::new(&self.argv)),
        };
        writer.write(&output);
        Ok(())
    }
}

/// Represents the CLI arguments accepted by nvticache
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// The OID of the NVT
    #[arg(short, long, value_name = "OID")]
    pub oid: Option<String>,
    /// What to read from the cache
    #[arg(short, long, value_name = "QUERY", default_value = "metadata")]
    pub query: QueryKind,
    /// The redis socket path or host:port, read from the scanner settings if absent
    #[arg(short, long, value_name = "ADDRESS")]
    pub address: Option<String>,
    /// The scanner binary printing its settings with -s
    #[arg(short, long, value_name = "SCANNER", default_value = DEFAULT_SCANNER)]
    pub scanner: String,
    /// Timeout of the connection and of each request, in seconds
    #[arg(short, long, value_name = "SECONDS", default_value_t = 5)]
    pub timeout: u64,
    /// The writer to use
    #[arg(short, long, value_name = "WRITER", default_value = "text")]
    pub writer: Writers,
    /// The log level
    #[arg(short, long, value_name = "LEVEL", default_value = "warn")]
    pub log_level: LevelFilter,
}

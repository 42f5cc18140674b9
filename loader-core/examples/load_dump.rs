//! Minimal demo wiring a `LocalBackend`, the `mysql`-backed session
//! factory and `LineDelimitedImporter` into a `Loader` run. Not a CLI:
//! no flag parsing, no config file, just enough to point the loader at
//! a dump directory and a server and watch it load.
//!
//! Run with `--features mysql-backend`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Error};

use loader_core::coordinator::default_connection_options;
use loader_core::importer::LineDelimitedImporter;
use loader_core::Loader;
use loader_storage::LocalBackend;
use loader_types::LoaderOptions;

#[cfg(feature = "mysql-backend")]
use loader_core::session::mysql_backend::MysqlSessionFactory;

fn run() -> Result<(), Error> {
    let dump_dir: PathBuf = match std::env::args().nth(1) {
        Some(path) => path.into(),
        None => bail!("no dump directory given\n\nusage: load_dump <dump-dir> <host> <user> [<password>]"),
    };
    let host = std::env::args().nth(2).unwrap_or_else(|| "127.0.0.1".to_string());
    let user = std::env::args().nth(3).unwrap_or_else(|| "root".to_string());
    let password = std::env::args().nth(4);

    env_logger::init();

    let backend = Arc::new(LocalBackend::new(dump_dir));
    let importer = Arc::new(LineDelimitedImporter);
    let connection_options = default_connection_options(host, 3306, user, password);

    #[cfg(feature = "mysql-backend")]
    let sessions = Arc::new(MysqlSessionFactory::new(&connection_options)?);
    #[cfg(not(feature = "mysql-backend"))]
    {
        let _ = &connection_options;
        bail!("built without the mysql-backend feature; nothing to connect with");
    }

    #[cfg(feature = "mysql-backend")]
    {
        let mut loader = Loader::new(LoaderOptions::default(), backend, sessions, importer);
        let summary = loader.run()?;
        println!(
            "loaded {} chunks, {} bytes raw, {} tables analyzed, {} errors",
            summary.chunks_loaded, summary.raw_bytes_loaded, summary.tables_analyzed, summary.errors
        );
        for warning in &summary.warnings {
            eprintln!("warning: {warning}");
        }
    }

    Ok(())
}

fn main() {
    std::process::exit(match run() {
        Ok(_) => 0,
        Err(err) => {
            eprintln!("error: {}", err);
            1
        }
    });
}

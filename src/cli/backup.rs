use std::path::PathBuf;

use chrono::Local;
use rusqlite::backup::Backup;
use rusqlite::Connection;

use crate::db::get_connection;
use crate::error::{RemitError, Result};
use crate::settings::{db_path, get_data_dir};

pub fn run(output: Option<&str>) -> Result<()> {
    let src_path = db_path();
    if !src_path.exists() {
        return Err(RemitError::Other(
            "database not found; run `remit init` first".to_string(),
        ));
    }

    let dest_path = match output {
        Some(path) => PathBuf::from(path),
        None => {
            let dir = get_data_dir().join("backups");
            std::fs::create_dir_all(&dir)?;
            dir.join(format!(
                "remit-{}.db",
                Local::now().format("%Y%m%d-%H%M%S")
            ))
        }
    };

    let src = get_connection(&src_path)?;
    let mut dest = Connection::open(&dest_path)?;
    let backup = Backup::new(&src, &mut dest)?;
    backup.run_to_completion(64, std::time::Duration::from_millis(50), None)?;

    println!("Backed up to {}", dest_path.display());
    Ok(())
}

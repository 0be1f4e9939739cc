use crate::db::get_connection;
use crate::error::Result;
use crate::settings::load_settings;

fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

pub fn run() -> Result<()> {
    let settings = load_settings();
    let data_dir = std::path::PathBuf::from(&settings.data_dir);
    let db_path = data_dir.join("remit.db");

    println!("Data dir:   {}", data_dir.display());
    println!("Database:   {}", db_path.display());
    println!(
        "Default agency: {}",
        if settings.default_agency.is_empty() { "(not set)" } else { &settings.default_agency }
    );

    if db_path.exists() {
        let size = std::fs::metadata(&db_path)?.len();
        println!("DB size:    {}", format_bytes(size));

        let conn = get_connection(&db_path)?;
        let agencies: i64 = conn.query_row("SELECT count(*) FROM agencies", [], |r| r.get(0))?;
        let agents: i64 = conn.query_row("SELECT count(*) FROM agents", [], |r| r.get(0))?;
        let base: i64 = conn.query_row(
            "SELECT count(*) FROM transactions WHERE source_transaction_id IS NULL",
            [],
            |r| r.get(0),
        )?;
        let entries: i64 = conn.query_row(
            "SELECT count(*) FROM transactions WHERE source_transaction_id IS NOT NULL",
            [],
            |r| r.get(0),
        )?;
        let batches: i64 = conn.query_row("SELECT count(*) FROM import_batches", [], |r| r.get(0))?;

        println!();
        println!("Agencies:        {agencies}");
        println!("Agents:          {agents}");
        println!("Transactions:    {base}");
        println!("Ledger entries:  {entries}");
        println!("Import batches:  {batches}");
    } else {
        println!();
        println!("Database not found. Run `remit init` to set up.");
    }

    Ok(())
}

use comfy_table::{Cell, Table};

use crate::db::get_connection;
use crate::error::Result;
use crate::settings::{db_path, load_settings, save_settings};
use crate::store;

pub fn add(name: &str, owner: Option<&str>) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let agency = store::insert_agency(&conn, name, owner)?;
    println!("Added agency: {} ({})", agency.name, agency.id);

    // First agency becomes the default automatically.
    let mut settings = load_settings();
    if settings.default_agency.is_empty() {
        settings.default_agency = agency.name;
        save_settings(&settings)?;
        println!("Set as default agency.");
    }
    Ok(())
}

pub fn list() -> Result<()> {
    let conn = get_connection(&db_path())?;
    let agencies = store::list_agencies(&conn)?;
    let default = load_settings().default_agency;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Owner", "Default"]);
    for agency in agencies {
        let is_default = if agency.name == default { "*" } else { "" };
        table.add_row(vec![
            Cell::new(agency.id),
            Cell::new(agency.name),
            Cell::new(agency.owner.unwrap_or_default()),
            Cell::new(is_default),
        ]);
    }
    println!("Agencies\n{table}");
    Ok(())
}

pub fn use_agency(name: &str) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let agency = store::agency_by_name(&conn, name)?;
    let mut settings = load_settings();
    settings.default_agency = agency.name.clone();
    save_settings(&settings)?;
    println!("Default agency is now {}", agency.name);
    Ok(())
}

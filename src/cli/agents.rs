use comfy_table::{Cell, Table};

use crate::db::get_connection;
use crate::error::Result;
use crate::settings::{db_path, resolve_agency};
use crate::store;

pub fn add(name: &str, agency: Option<&str>, inactive: bool) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let agency = store::agency_by_name(&conn, &resolve_agency(agency)?)?;
    let agent = store::insert_agent(&conn, &agency.id, name, !inactive)?;
    println!("Added agent {} ({}) to {}", agent.name, agent.id, agency.name);
    Ok(())
}

pub fn list(agency: Option<&str>) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let agency = store::agency_by_name(&conn, &resolve_agency(agency)?)?;
    let agents = store::load_agents(&conn, &agency.id)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Active"]);
    for agent in agents {
        table.add_row(vec![
            Cell::new(agent.id),
            Cell::new(agent.name),
            Cell::new(if agent.is_active { "yes" } else { "no" }),
        ]);
    }
    println!("Agents for {}\n{table}", agency.name);
    Ok(())
}

pub fn deactivate(name: &str, agency: Option<&str>) -> Result<()> {
    let conn = get_connection(&db_path())?;
    let agency = store::agency_by_name(&conn, &resolve_agency(agency)?)?;
    store::set_agent_active(&conn, &agency.id, name, false)?;
    println!("Deactivated {name}. Existing attribution is unchanged.");
    Ok(())
}

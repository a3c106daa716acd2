//! Owner deletion.

use std::io::Write;

use anyhow::{Result, bail};

use tm_core::{Clock, OwnerId, Store, TrackerService};

/// Deletes the owner's tracker and every time entry they own.
///
/// Refuses to run unless `confirmed` is set.
pub fn run<W, S, C>(
    writer: &mut W,
    service: &TrackerService<S, C>,
    owner: &OwnerId,
    confirmed: bool,
) -> Result<()>
where
    W: Write,
    S: Store,
    C: Clock,
{
    if !confirmed {
        bail!("refusing to delete all data for {owner} without --yes");
    }
    let entries = service.list_entries(owner)?.len();
    service.delete_owner(owner)?;
    writeln!(writer, "Deleted tracker and {entries} time entries for {owner}")?;
    Ok(())
}

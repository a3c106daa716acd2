//! Manual time entry commands.

use std::io::Write;

use anyhow::{Context, Result};

use tm_core::{Clock, EntryDraft, EntryId, OwnerId, Store, TimeEntry, TrackerService};

use super::util::{format_optional_time, format_time, parse_datetime, parse_duration, parse_metadata};
use crate::cli::{AddArgs, EditArgs};

/// Adds a manual time entry.
pub fn add<W, S, C>(
    writer: &mut W,
    service: &TrackerService<S, C>,
    owner: &OwnerId,
    args: &AddArgs,
) -> Result<()>
where
    W: Write,
    S: Store,
    C: Clock,
{
    let now = service.clock().now();
    let draft = EntryDraft {
        description: args.description.clone(),
        duration_seconds: parse_duration(&args.duration)?,
        start_time: args
            .start
            .as_deref()
            .map(|s| parse_datetime(s, now))
            .transpose()?,
        end_time: args
            .end
            .as_deref()
            .map_or(Ok(now), |s| parse_datetime(s, now))?,
        metadata: parse_metadata(&args.meta)?,
    };

    let entry = service.create_entry(owner, draft)?;
    writeln!(
        writer,
        "Added {} as \"{}\" ({})",
        entry.duration_display(),
        entry.description,
        entry.id
    )?;
    Ok(())
}

/// Lists the owner's entries, most recent first.
pub fn list<W, S, C>(
    writer: &mut W,
    service: &TrackerService<S, C>,
    owner: &OwnerId,
    json: bool,
) -> Result<()>
where
    W: Write,
    S: Store,
    C: Clock,
{
    let entries = service.list_entries(owner)?;
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&entries)?)?;
        return Ok(());
    }

    if entries.is_empty() {
        writeln!(writer, "No time entries for {owner}")?;
        return Ok(());
    }

    for entry in &entries {
        write_entry(writer, entry)?;
    }
    let total: u64 = entries.iter().map(|e| e.duration_seconds).sum();
    writeln!(
        writer,
        "{} entries, {} total",
        entries.len(),
        tm_core::format_hms(total)
    )?;
    Ok(())
}

/// Edits an entry, keeping the fields that were not given.
pub fn edit<W, S, C>(
    writer: &mut W,
    service: &TrackerService<S, C>,
    owner: &OwnerId,
    args: &EditArgs,
) -> Result<()>
where
    W: Write,
    S: Store,
    C: Clock,
{
    let id = parse_entry_id(&args.id)?;
    let existing = service.get_entry(owner, &id)?;
    let now = service.clock().now();

    let mut draft = existing.to_draft()?;
    if let Some(description) = &args.description {
        draft.description.clone_from(description);
    }
    if let Some(duration) = &args.duration {
        draft.duration_seconds = parse_duration(duration)?;
    }
    if args.clear_start {
        draft.start_time = None;
    } else if let Some(start) = &args.start {
        draft.start_time = Some(parse_datetime(start, now)?);
    }
    if let Some(end) = &args.end {
        draft.end_time = parse_datetime(end, now)?;
    }
    draft.metadata.extend(parse_metadata(&args.meta)?);

    let updated = service.update_entry(owner, &id, draft)?;
    writeln!(writer, "Updated {}", updated.id)?;
    write_entry(writer, &updated)?;
    Ok(())
}

/// Deletes an entry.
pub fn delete<W, S, C>(
    writer: &mut W,
    service: &TrackerService<S, C>,
    owner: &OwnerId,
    id: &str,
) -> Result<()>
where
    W: Write,
    S: Store,
    C: Clock,
{
    let id = parse_entry_id(id)?;
    service.delete_entry(owner, &id)?;
    writeln!(writer, "Deleted {id}")?;
    Ok(())
}

fn parse_entry_id(id: &str) -> Result<EntryId> {
    EntryId::new(id).context("invalid entry ID")
}

fn write_entry<W: Write>(writer: &mut W, entry: &TimeEntry) -> Result<()> {
    let source = if entry.booked_from_tracker {
        "tracker"
    } else {
        "manual"
    };
    writeln!(
        writer,
        "{}  {}  {} -> {}  [{source}]  {}",
        entry.id,
        entry.duration_display(),
        format_optional_time(entry.start_time),
        format_time(entry.end_time),
        entry.description
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{DateTime, TimeZone, Utc};
    use insta::assert_snapshot;
    use tm_core::{Action, ManualClock, MemoryStore, TrackerError};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 17, 0, 0).unwrap()
    }

    fn setup() -> (TrackerService<MemoryStore, ManualClock>, ManualClock, OwnerId) {
        let clock = ManualClock::new(t0());
        let service = TrackerService::with_clock(MemoryStore::new(), clock.clone());
        (service, clock, OwnerId::new("alice").unwrap())
    }

    fn add_args(description: &str, duration: &str) -> AddArgs {
        AddArgs {
            description: description.to_string(),
            duration: duration.to_string(),
            start: None,
            end: None,
            meta: Vec::new(),
        }
    }

    fn edit_args(id: &EntryId) -> EditArgs {
        EditArgs {
            id: id.to_string(),
            description: None,
            duration: None,
            start: None,
            clear_start: false,
            end: None,
            meta: Vec::new(),
        }
    }

    fn output_of(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    /// Replaces entry IDs with stable placeholders in listing order.
    fn redact(output: &str, entries: &[TimeEntry]) -> String {
        entries
            .iter()
            .enumerate()
            .fold(output.to_string(), |out, (i, entry)| {
                out.replace(entry.id.as_str(), &format!("[ID{i}]"))
            })
    }

    #[test]
    fn add_uses_now_as_default_end() {
        let (service, _clock, alice) = setup();
        let mut args = add_args("Planning session", "45:00");
        args.meta = vec!["project=apollo".to_string()];

        add(&mut Vec::new(), &service, &alice, &args).unwrap();

        let entries = service.list_entries(&alice).unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.duration_seconds, 2700);
        assert_eq!(entry.end_time, t0());
        assert_eq!(entry.start_time, None);
        assert!(!entry.booked_from_tracker);
        assert_eq!(entry.metadata["project"], "apollo");
    }

    #[test]
    fn add_rejects_invalid_entries() {
        let (service, _clock, alice) = setup();

        let err = add(&mut Vec::new(), &service, &alice, &add_args("ok", "60")).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrackerError>(),
            Some(TrackerError::Validation(_))
        ));

        let err = add(&mut Vec::new(), &service, &alice, &add_args("Valid", "0")).unwrap_err();
        assert!(err.to_string().contains("greater than 0"));

        let mut args = add_args("Future work", "60");
        args.end = Some("2025-03-10T18:00:00Z".to_string());
        assert!(add(&mut Vec::new(), &service, &alice, &args).is_err());

        assert!(service.list_entries(&alice).unwrap().is_empty());
    }

    #[test]
    fn list_shows_tracker_and_manual_entries() {
        let (service, clock, alice) = setup();

        let mut args = add_args("Morning standup", "900");
        args.start = Some("2025-03-10T09:00:00Z".to_string());
        args.end = Some("2025-03-10T09:15:00Z".to_string());
        add(&mut Vec::new(), &service, &alice, &args).unwrap();

        service.apply_action(&alice, Action::Start).unwrap();
        clock.advance_secs(3600);
        service.book(&alice, "Deep work", tm_core::Metadata::new()).unwrap();

        let mut buf = Vec::new();
        list(&mut buf, &service, &alice, false).unwrap();
        let entries = service.list_entries(&alice).unwrap();
        let output = redact(&output_of(buf), &entries);
        assert_snapshot!(output, @r"
        [ID0]  01:00:00  2025-03-10T17:00:00Z -> 2025-03-10T18:00:00Z  [tracker]  Deep work
        [ID1]  00:15:00  2025-03-10T09:00:00Z -> 2025-03-10T09:15:00Z  [manual]  Morning standup
        2 entries, 01:15:00 total
        ");
    }

    #[test]
    fn list_empty_and_json() {
        let (service, _clock, alice) = setup();

        let mut buf = Vec::new();
        list(&mut buf, &service, &alice, false).unwrap();
        assert_snapshot!(output_of(buf), @"No time entries for alice");

        add(&mut Vec::new(), &service, &alice, &add_args("Code review", "120")).unwrap();
        let mut buf = Vec::new();
        list(&mut buf, &service, &alice, true).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value[0]["description"], "Code review");
        assert_eq!(value[0]["duration_seconds"], 120);
        assert_eq!(value[0]["booked_from_tracker"], false);
    }

    #[test]
    fn edit_keeps_unspecified_fields() {
        let (service, _clock, alice) = setup();
        let mut args = add_args("Design review", "1800");
        args.start = Some("2 hours ago".to_string());
        args.end = Some("90 minutes ago".to_string());
        args.meta = vec!["project=apollo".to_string()];
        add(&mut Vec::new(), &service, &alice, &args).unwrap();
        let id = service.list_entries(&alice).unwrap()[0].id.clone();

        let mut changes = edit_args(&id);
        changes.description = Some("Design review (API)".to_string());
        changes.meta = vec!["billable=true".to_string()];
        edit(&mut Vec::new(), &service, &alice, &changes).unwrap();

        let entry = service.get_entry(&alice, &id).unwrap();
        assert_eq!(entry.description, "Design review (API)");
        assert_eq!(entry.duration_seconds, 1800);
        assert_eq!(
            entry.start_time,
            Some(Utc.with_ymd_and_hms(2025, 3, 10, 15, 0, 0).unwrap())
        );
        assert_eq!(entry.metadata["project"], "apollo");
        assert_eq!(entry.metadata["billable"], true);

        let mut changes = edit_args(&id);
        changes.clear_start = true;
        changes.duration = Some("0:10:00".to_string());
        edit(&mut Vec::new(), &service, &alice, &changes).unwrap();
        let entry = service.get_entry(&alice, &id).unwrap();
        assert_eq!(entry.start_time, None);
        assert_eq!(entry.duration_seconds, 600);
    }

    #[test]
    fn edit_and_delete_unknown_entry() {
        let (service, _clock, alice) = setup();
        let missing = EntryId::new("no-such-entry").unwrap();

        let err = edit(&mut Vec::new(), &service, &alice, &edit_args(&missing)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrackerError>(),
            Some(TrackerError::EntryNotFound { .. })
        ));

        let err = delete(&mut Vec::new(), &service, &alice, "no-such-entry").unwrap_err();
        assert!(err.to_string().contains("time entry not found"));
    }

    #[test]
    fn delete_removes_entry_for_owner_only() {
        let (service, _clock, alice) = setup();
        let bob = OwnerId::new("bob").unwrap();
        add(&mut Vec::new(), &service, &alice, &add_args("Pairing", "600")).unwrap();
        let id = service.list_entries(&alice).unwrap()[0].id.clone();

        assert!(delete(&mut Vec::new(), &service, &bob, id.as_str()).is_err());

        let mut buf = Vec::new();
        delete(&mut buf, &service, &alice, id.as_str()).unwrap();
        assert_eq!(output_of(buf), format!("Deleted {id}\n"));
        assert!(service.list_entries(&alice).unwrap().is_empty());
    }
}

//! Tracker commands: status, start/pause/resume/reset, and booking.

use std::io::Write;

use anyhow::Result;

use tm_core::{Action, Clock, OwnerId, Store, TrackerService, TrackerStatus};

use super::util::{format_optional_time, format_time, parse_metadata};

/// Prints the tracker status.
pub fn status<W, S, C>(
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
    let status = service.status(owner)?;
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&status)?)?;
        return Ok(());
    }
    write_status(writer, owner, &status)
}

/// Applies a tracker action and prints the outcome.
pub fn action<W, S, C>(
    writer: &mut W,
    service: &TrackerService<S, C>,
    owner: &OwnerId,
    action: Action,
) -> Result<()>
where
    W: Write,
    S: Store,
    C: Clock,
{
    let outcome = service.apply_action(owner, action)?;
    writeln!(writer, "{}", outcome.message)?;
    write_status(writer, owner, &outcome.tracker)
}

/// Applies a tracker action given by name.
pub fn named_action<W, S, C>(
    writer: &mut W,
    service: &TrackerService<S, C>,
    owner: &OwnerId,
    name: &str,
) -> Result<()>
where
    W: Write,
    S: Store,
    C: Clock,
{
    action(writer, service, owner, name.parse()?)
}

/// Books tracked time and prints the created entry.
pub fn book<W, S, C>(
    writer: &mut W,
    service: &TrackerService<S, C>,
    owner: &OwnerId,
    description: &str,
    meta: &[String],
    json: bool,
) -> Result<()>
where
    W: Write,
    S: Store,
    C: Clock,
{
    let metadata = parse_metadata(meta)?;
    let entry = service.book(owner, description, metadata)?;
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&entry)?)?;
        return Ok(());
    }
    writeln!(
        writer,
        "Booked {} as \"{}\"",
        entry.duration_display(),
        entry.description
    )?;
    writeln!(writer, "Entry:   {}", entry.id)?;
    writeln!(
        writer,
        "Span:    {} -> {}",
        format_optional_time(entry.start_time),
        format_time(entry.end_time)
    )?;
    writeln!(writer, "Tracker reset")?;
    Ok(())
}

fn write_status<W: Write>(writer: &mut W, owner: &OwnerId, status: &TrackerStatus) -> Result<()> {
    writeln!(writer, "Tracker for {owner}: {}", status.state)?;
    writeln!(writer, "Elapsed: {}", status.elapsed_display)?;
    writeln!(writer, "Started: {}", format_optional_time(status.started_at))?;
    writeln!(writer, "Paused:  {}", format_optional_time(status.paused_at))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{DateTime, TimeZone, Utc};
    use insta::assert_snapshot;
    use tm_core::{ManualClock, MemoryStore, TrackerError};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
    }

    fn setup() -> (TrackerService<MemoryStore, ManualClock>, ManualClock, OwnerId) {
        let clock = ManualClock::new(t0());
        let service = TrackerService::with_clock(MemoryStore::new(), clock.clone());
        (service, clock, OwnerId::new("alice").unwrap())
    }

    fn run<F>(f: F) -> String
    where
        F: FnOnce(&mut Vec<u8>) -> Result<()>,
    {
        let mut output = Vec::new();
        f(&mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn status_of_fresh_tracker() {
        let (service, _clock, alice) = setup();
        let output = run(|w| status(w, &service, &alice, false));
        assert_snapshot!(output, @r"
        Tracker for alice: idle
        Elapsed: 00:00:00
        Started: -
        Paused:  -
        ");
    }

    #[test]
    fn pause_and_resume_output() {
        let (service, clock, alice) = setup();
        run(|w| action(w, &service, &alice, Action::Start));
        clock.advance_secs(1500);

        let paused = run(|w| action(w, &service, &alice, Action::Pause));
        assert_snapshot!(paused, @r"
        Tracker paused
        Tracker for alice: paused
        Elapsed: 00:25:00
        Started: 2025-03-10T09:00:00Z
        Paused:  2025-03-10T09:25:00Z
        ");

        let again = run(|w| action(w, &service, &alice, Action::Pause));
        assert!(again.starts_with("Tracker already paused\n"));

        clock.advance_secs(500);
        run(|w| named_action(w, &service, &alice, "resume"));
        clock.advance_secs(300);

        let output = run(|w| status(w, &service, &alice, false));
        assert_snapshot!(output, @r"
        Tracker for alice: running
        Elapsed: 00:30:00
        Started: 2025-03-10T09:33:20Z
        Paused:  -
        ");
    }

    #[test]
    fn status_json_output() {
        let (service, clock, alice) = setup();
        run(|w| action(w, &service, &alice, Action::Start));
        clock.advance_secs(61);

        let output = run(|w| status(w, &service, &alice, true));
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["is_running"], true);
        assert_eq!(value["current_elapsed_seconds"], 61);
        assert_eq!(value["started_at"], "2025-03-10T09:00:00Z");
        assert_eq!(value["paused_at"], serde_json::Value::Null);
    }

    #[test]
    fn unknown_action_name_is_rejected() {
        let (service, _clock, alice) = setup();
        let mut output = Vec::new();
        let err = named_action(&mut output, &service, &alice, "stop").unwrap_err();
        assert!(err.to_string().contains("invalid tracker action: stop"));
        assert!(output.is_empty());
    }

    #[test]
    fn book_output() {
        let (service, clock, alice) = setup();
        run(|w| action(w, &service, &alice, Action::Start));
        clock.advance_secs(2700);

        let output = run(|w| {
            book(
                w,
                &service,
                &alice,
                "Incident follow-up",
                &["ticket=OPS-12".to_string()],
                false,
            )
        });
        let entry = &service.list_entries(&alice).unwrap()[0];
        assert_eq!(entry.metadata["ticket"], "OPS-12");
        let output = output.replace(entry.id.as_str(), "[ID]");
        assert_snapshot!(output, @r#"
        Booked 00:45:00 as "Incident follow-up"
        Entry:   [ID]
        Span:    2025-03-10T09:00:00Z -> 2025-03-10T09:45:00Z
        Tracker reset
        "#);

        let err = book(&mut Vec::new(), &service, &alice, "Again", &[], false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrackerError>(),
            Some(TrackerError::NothingToBook)
        ));
    }
}

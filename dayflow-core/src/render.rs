//! Markdown rendering for event notes, daily summaries and the pointer file.

use chrono::{NaiveDate, Timelike};
use chrono_tz::Tz;

use crate::event::CalendarEvent;
use crate::placement::NotePath;

/// Placeholder written to the pointer file when nothing is active.
pub const NO_ACTIVE_MEETING: &str = "No meeting currently active";

/// Render a new event note: frontmatter followed by a fixed set of sections.
pub fn event_note(event: &CalendarEvent, tz: &Tz) -> String {
    let start = event.local_start(tz);
    let end = event.end().with_timezone(tz);
    let title = display_title(event);

    let mut out = String::new();
    out.push_str("---\n");
    push_field(&mut out, "title", &title);
    push_field(&mut out, "date", &start.format("%Y-%m-%d").to_string());
    if !event.is_all_day() {
        push_field(&mut out, "start_time", &start.format("%H:%M").to_string());
        push_field(&mut out, "end_time", &end.format("%H:%M").to_string());
    }
    push_field(&mut out, "type", "meeting");
    push_field(&mut out, "is_all_day", if event.is_all_day() { "true" } else { "false" });
    if let Some(location) = event.location() {
        push_field(&mut out, "location", location);
    }
    push_field(&mut out, "event_id", event.id());
    out.push_str("tags: [calendar-sync]\n");
    out.push_str("---\n\n");

    out.push_str(&format!("# {title}\n\n"));

    out.push_str("## Event Details\n\n");
    out.push_str(&format!("- **Date**: {}\n", start.format("%A, %B %-d, %Y")));
    out.push_str(&format!("- **Time**: {}\n", time_span(event, tz)));
    if let Some(location) = event.location() {
        out.push_str(&format!("- **Location**: {location}\n"));
    }
    out.push('\n');

    if !event.attendees().is_empty() {
        out.push_str("## Attendees\n\n");
        for attendee in event.attendees() {
            out.push_str(&format!("- [[{attendee}]]\n"));
        }
        out.push('\n');
    }

    let body = event.body().trim();
    if !body.is_empty() {
        out.push_str("## Description\n\n");
        out.push_str(body);
        out.push_str("\n\n");
    }

    out.push_str("## Notes\n\n_Add your notes here_\n\n");
    out.push_str("## Action Items\n\n- [ ] \n");
    out
}

/// Render the pointer file for the active event, or the placeholder.
pub fn pointer_note(active: Option<(&CalendarEvent, &NotePath)>, tz: &Tz) -> String {
    let Some((event, path)) = active else {
        return format!("# Current Meeting\n\n_{NO_ACTIVE_MEETING}_\n");
    };

    let mut out = String::from("# Current Meeting\n\n");
    out.push_str(&format!("[[{}|{}]]\n\n", path.link_name(), display_title(event)));
    out.push_str(&format!("- **Start**: {}\n", event.local_start(tz).format("%Y-%m-%d %H:%M")));
    out.push_str(&format!(
        "- **End**: {}\n",
        event.end().with_timezone(tz).format("%Y-%m-%d %H:%M")
    ));
    if event.is_all_day() {
        out.push_str("- **All day**: yes\n");
    }
    if let Some(location) = event.location() {
        out.push_str(&format!("- **Location**: {location}\n"));
    }
    if !event.attendees().is_empty() {
        let names: Vec<String> = event.attendees().iter().map(|a| format!("[[{a}]]")).collect();
        out.push_str(&format!("- **Attendees**: {}\n", names.join(", ")));
    }
    out
}

/// Attendees listed per meeting in a daily summary before "+N more".
const SUMMARY_ATTENDEES: usize = 5;

/// One meeting line in a daily summary.
pub struct SummaryEntry<'a> {
    pub event: &'a CalendarEvent,
    /// Wiki-link target of the event note
    pub link: String,
    pub is_current: bool,
}

/// Render the summary note for `date`. `entries` are expected in start order.
pub fn daily_summary(date: NaiveDate, entries: &[SummaryEntry<'_>], tz: &Tz) -> String {
    let day = date.format("%Y-%m-%d");
    let count = entries.len();

    let mut out = String::new();
    out.push_str("---\n");
    push_field(&mut out, "date", &day.to_string());
    push_field(&mut out, "type", "daily-summary");
    push_field(&mut out, "meetings_count", &count.to_string());
    out.push_str("tags: [daily, calendar-sync]\n");
    out.push_str("---\n\n");

    out.push_str(&format!("# {day} - Daily Summary\n\n"));
    out.push_str(&format!(
        "> {count} meeting{} today\n\n",
        if count == 1 { "" } else { "s" }
    ));

    out.push_str("## Meetings\n\n");
    let (all_day, timed): (Vec<_>, Vec<_>) = entries.iter().partition(|e| e.event.is_all_day());

    if !all_day.is_empty() {
        out.push_str("### All Day\n\n");
        for entry in &all_day {
            out.push_str(&format!("- [[{}]]\n", entry.link));
        }
        out.push('\n');
    }

    if !timed.is_empty() {
        out.push_str("### Schedule\n\n");
        for entry in &timed {
            let event = entry.event;
            let mut line = format!(
                "**{}-{}** | [[{}]]",
                event.local_start(tz).format("%H:%M"),
                event.end().with_timezone(tz).format("%H:%M"),
                entry.link
            );
            if entry.is_current {
                line = format!("**NOW** | {line}");
            }
            if let Some(location) = event.location() {
                line.push_str(&format!(" | Location: {location}"));
            }
            out.push_str(&line);
            out.push('\n');

            let attendees = event.attendees();
            if !attendees.is_empty() {
                let mut names: Vec<String> = attendees
                    .iter()
                    .take(SUMMARY_ATTENDEES)
                    .map(|a| format!("[[{a}]]"))
                    .collect();
                if attendees.len() > SUMMARY_ATTENDEES {
                    names.push(format!("+{} more", attendees.len() - SUMMARY_ATTENDEES));
                }
                out.push_str(&format!("   Attendees: {}\n", names.join(", ")));
            }
            out.push('\n');
        }

        out.push_str("## Quick Links\n\n");
        for (label, hours) in [("Morning", 0..12), ("Afternoon", 12..17), ("Evening", 17..24)] {
            let part: Vec<_> = timed
                .iter()
                .filter(|e| hours.contains(&e.event.local_start(tz).hour()))
                .collect();
            if part.is_empty() {
                continue;
            }
            out.push_str(&format!("**{label}** ({})\n", part.len()));
            for entry in part {
                out.push_str(&format!(
                    "- {} - [[{}]]\n",
                    entry.event.local_start(tz).format("%H:%M"),
                    entry.link
                ));
            }
            out.push('\n');
        }
    }

    out.push_str("## Action Items Summary\n\n");
    for entry in entries {
        out.push_str(&format!("### [[{}]]\n- [ ] \n\n", entry.link));
    }

    out.push_str("## Daily Reflection\n\n");
    out.push_str("### Key Accomplishments\n- \n\n");
    out.push_str("### Challenges\n- \n\n");
    out.push_str("### Tomorrow's Priorities\n- [ ] \n");
    out
}

fn display_title(event: &CalendarEvent) -> String {
    event.to_string()
}

fn time_span(event: &CalendarEvent, tz: &Tz) -> String {
    if event.is_all_day() {
        return "All day".to_string();
    }
    let start = event.local_start(tz);
    let end = event.end().with_timezone(tz);
    format!("{} - {} {}", start.format("%H:%M"), end.format("%H:%M"), start.format("%Z"))
}

fn push_field(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push_str(": ");
    out.push_str(&yaml_value(value));
    out.push('\n');
}

/// Quote a frontmatter value when YAML would otherwise misread it.
fn yaml_value(value: &str) -> String {
    const SPECIAL: &[char] = &[':', '"', '\'', '\n', '#', '[', ']', '{', '}', '|', '>'];
    const INDICATORS: &[char] = &['-', '&', '*', '!', '%', '@', '`', '?', ','];

    let needs_quotes = value.is_empty()
        || value.contains(SPECIAL)
        || value.starts_with(INDICATORS)
        || value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace);

    if !needs_quotes || value == "true" || value == "false" {
        return value.to_string();
    }

    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n");
    format!("\"{escaped}\"")
}

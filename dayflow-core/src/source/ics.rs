//! Local `.ics` file source.
//!
//! Recurring series are expanded with the `rrule` crate inside the requested
//! range. Instances overridden by a `RECURRENCE-ID` component replace the
//! generated occurrence.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use icalendar::parser::{Component, Property, read_calendar, unfold};
use icalendar::{CalendarDateTime, DatePerhapsTime};
use rrule::RRuleSet;

use crate::date_range::DateRange;
use crate::error::{DayflowError, DayflowResult, SourceError};
use crate::event::{CalendarEvent, local_midnight, resolve_local};
use crate::source::EventSource;

/// Upper bound on occurrences generated per series.
const MAX_OCCURRENCES: u16 = 365;

#[derive(Debug, Clone)]
pub struct IcsFileSource {
    path: PathBuf,
    tz: Tz,
}

impl IcsFileSource {
    /// `tz` is used for floating times and all-day dates.
    pub fn new(path: impl Into<PathBuf>, tz: Tz) -> Self {
        IcsFileSource { path: path.into(), tz }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSource for IcsFileSource {
    fn describe(&self) -> String {
        format!("calendar file {}", self.path.display())
    }

    async fn fetch(&self, range: &DateRange) -> Result<Vec<CalendarEvent>, SourceError> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            SourceError::Unavailable(format!("Failed to read {}: {e}", self.path.display()))
        })?;

        parse_events(&content, range, &self.tz).map_err(|e| SourceError::Unavailable(e.to_string()))
    }
}

/// A DTSTART/DTEND/EXDATE value before it is pinned to an instant.
#[derive(Debug, Clone, Copy, PartialEq)]
enum IcsTime {
    Date(NaiveDate),
    Utc(DateTime<Utc>),
    /// Wall-clock time in a known zone (floating times use the user's zone)
    Local(NaiveDateTime, Tz),
}

impl IcsTime {
    fn from_date_perhaps_time(value: DatePerhapsTime, tz: &Tz) -> Self {
        match value {
            DatePerhapsTime::Date(d) => IcsTime::Date(d),
            DatePerhapsTime::DateTime(CalendarDateTime::Utc(dt)) => IcsTime::Utc(dt),
            DatePerhapsTime::DateTime(CalendarDateTime::Floating(naive)) => IcsTime::Local(naive, *tz),
            DatePerhapsTime::DateTime(CalendarDateTime::WithTimezone { date_time, tzid }) => {
                IcsTime::Local(date_time, zone_or(&tzid, tz))
            }
        }
    }

    fn instant(&self, tz: &Tz) -> DateTime<Utc> {
        match self {
            IcsTime::Date(d) => local_midnight(*d, tz),
            IcsTime::Utc(dt) => *dt,
            IcsTime::Local(naive, zone) => resolve_local(*naive, zone),
        }
    }

    /// Format as an iCalendar property line for the rrule parser.
    fn to_rrule_line(self, name: &str, tz: &Tz) -> String {
        match self {
            IcsTime::Date(d) => format!("{name};TZID={}:{}T000000", tz.name(), d.format("%Y%m%d")),
            IcsTime::Utc(dt) => format!("{name}:{}", dt.format("%Y%m%dT%H%M%SZ")),
            IcsTime::Local(naive, zone) => {
                format!("{name};TZID={}:{}", zone.name(), naive.format("%Y%m%dT%H%M%S"))
            }
        }
    }
}

/// Parse an IANA zone name, falling back to `tz` for names chrono-tz doesn't know.
fn zone_or(tzid: &str, tz: &Tz) -> Tz {
    tzid.trim_matches('"').parse().unwrap_or_else(|_| {
        tracing::debug!(tzid, fallback = %tz.name(), "Unknown TZID, using configured timezone");
        *tz
    })
}

/// One VEVENT, before recurrence expansion.
#[derive(Debug, Clone)]
struct ParsedEvent {
    uid: String,
    title: String,
    start: IcsTime,
    end: IcsTime,
    location: Option<String>,
    attendees: Vec<String>,
    body: String,
    cancelled: bool,
    rrule: Option<String>,
    exdates: Vec<IcsTime>,
    recurrence_id: Option<IcsTime>,
}

impl ParsedEvent {
    fn is_all_day(&self) -> bool {
        matches!(self.start, IcsTime::Date(_))
    }

    fn to_event(&self, id: String, start: IcsTime, end: IcsTime, tz: &Tz) -> DayflowResult<CalendarEvent> {
        let event = match (start, end) {
            (IcsTime::Date(first), IcsTime::Date(last)) => {
                CalendarEvent::all_day(id, &self.title, first, last, tz)?
            }
            (start, end) => CalendarEvent::new(id, &self.title, start.instant(tz), end.instant(tz))?,
        };

        let event = event
            .with_attendees(self.attendees.clone())
            .with_body(self.body.clone());
        let event = match &self.location {
            Some(location) => event.with_location(location.clone()),
            None => event,
        };
        Ok(if self.cancelled { event.mark_cancelled() } else { event })
    }

    /// Shift `end` by however far `start` moved to `new_start`.
    fn end_for(&self, new_start: IcsTime, tz: &Tz) -> IcsTime {
        match (self.start, self.end, new_start) {
            (IcsTime::Date(s), IcsTime::Date(e), IcsTime::Date(ns)) => IcsTime::Date(ns + (e - s)),
            _ => {
                let duration = self.end.instant(tz) - self.start.instant(tz);
                IcsTime::Utc(new_start.instant(tz) + duration)
            }
        }
    }
}

/// Parse every VEVENT in `content` and return those overlapping `range`.
///
/// Malformed components are logged and skipped; only an unreadable
/// calendar fails the whole parse.
pub fn parse_events(content: &str, range: &DateRange, tz: &Tz) -> DayflowResult<Vec<CalendarEvent>> {
    let unfolded = unfold(content);
    let calendar = read_calendar(&unfolded).map_err(|e| DayflowError::IcsParse(e.to_string()))?;

    let mut vevents = Vec::new();
    collect_vevents(&calendar.components, &mut vevents);

    let mut parsed = Vec::with_capacity(vevents.len());
    for vevent in vevents {
        match parse_vevent(vevent, tz) {
            Some(event) => parsed.push(event),
            None => tracing::warn!("Skipping VEVENT without UID or DTSTART"),
        }
    }

    let from = range.start_instant(tz);
    let to = range.end_instant(tz);

    // Instances moved or edited via RECURRENCE-ID, keyed by their original slot
    let overridden: HashSet<(String, DateTime<Utc>)> = parsed
        .iter()
        .filter_map(|p| Some((p.uid.clone(), p.recurrence_id?.instant(tz))))
        .collect();

    let mut events = Vec::new();
    for p in &parsed {
        let result = match (&p.rrule, p.recurrence_id) {
            (Some(rrule), None) => expand_series(p, rrule, from, to, &overridden, tz),
            (_, Some(recurrence_id)) => {
                let id = instance_id(&p.uid, recurrence_id.instant(tz));
                p.to_event(id, p.start, p.end, tz).map(|e| vec![e])
            }
            (None, None) => p.to_event(p.uid.clone(), p.start, p.end, tz).map(|e| vec![e]),
        };

        match result {
            Ok(instances) => events.extend(instances.into_iter().filter(|e| e.overlaps(from, to))),
            Err(e) => tracing::warn!(uid = %p.uid, error = %e, "Skipping calendar entry"),
        }
    }

    events.sort_by_key(|e| e.start());
    Ok(events)
}

fn collect_vevents<'b, 'a>(components: &'b [Component<'a>], out: &mut Vec<&'b Component<'a>>) {
    for component in components {
        if component.name == "VEVENT" {
            out.push(component);
        } else {
            collect_vevents(&component.components, out);
        }
    }
}

fn parse_vevent(vevent: &Component<'_>, tz: &Tz) -> Option<ParsedEvent> {
    let uid = vevent.find_prop("UID")?.val.to_string();
    let start = IcsTime::from_date_perhaps_time(DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?, tz);

    let end = vevent
        .find_prop("DTEND")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(|dpt| IcsTime::from_date_perhaps_time(dpt, tz))
        .unwrap_or_else(|| match start {
            // A date-only DTSTART without DTEND lasts one day
            IcsTime::Date(d) => IcsTime::Date(d + Duration::days(1)),
            other => other,
        });

    let text = |name: &str| vevent.find_prop(name).map(|p| unescape_text(p.val.as_ref()));

    let attendees = vevent
        .properties
        .iter()
        .filter(|p| p.name == "ATTENDEE")
        .map(attendee_name)
        .collect();

    let exdates = vevent
        .properties
        .iter()
        .filter(|p| p.name == "EXDATE")
        .flat_map(|p| parse_exdate_property(p, tz))
        .collect();

    Some(ParsedEvent {
        uid,
        title: text("SUMMARY").unwrap_or_default(),
        start,
        end,
        location: text("LOCATION"),
        attendees,
        body: text("DESCRIPTION").unwrap_or_default(),
        cancelled: vevent.find_prop("STATUS").is_some_and(|p| p.val == "CANCELLED"),
        rrule: vevent.find_prop("RRULE").map(|p| p.val.to_string()),
        exdates,
        recurrence_id: vevent
            .find_prop("RECURRENCE-ID")
            .and_then(|p| DatePerhapsTime::try_from(p).ok())
            .map(|dpt| IcsTime::from_date_perhaps_time(dpt, tz)),
    })
}

fn expand_series(
    master: &ParsedEvent,
    rrule: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    overridden: &HashSet<(String, DateTime<Utc>)>,
    tz: &Tz,
) -> DayflowResult<Vec<CalendarEvent>> {
    let mut lines = vec![master.start.to_rrule_line("DTSTART", tz), format!("RRULE:{rrule}")];
    lines.extend(master.exdates.iter().map(|ex| ex.to_rrule_line("EXDATE", tz)));

    let rrule_set: RRuleSet = lines.join("\n").parse().map_err(|e| {
        DayflowError::IcsParse(format!("Failed to parse RRULE for event '{}': {}", master.uid, e))
    })?;

    // Occurrences that started before the range can still overlap it
    let duration = master.end.instant(tz) - master.start.instant(tz);
    let utc: rrule::Tz = Utc.into();
    let after = (from - duration - Duration::seconds(1)).with_timezone(&utc);
    let before = to.with_timezone(&utc);

    let result = rrule_set.after(after).before(before).all(MAX_OCCURRENCES);

    let mut instances = Vec::new();
    for occurrence in &result.dates {
        let instant = occurrence.with_timezone(&Utc);
        if overridden.contains(&(master.uid.clone(), instant)) {
            continue;
        }

        let start = if master.is_all_day() {
            IcsTime::Date(occurrence.naive_local().date())
        } else {
            IcsTime::Utc(instant)
        };
        let end = master.end_for(start, tz);
        instances.push(master.to_event(instance_id(&master.uid, instant), start, end, tz)?);
    }

    Ok(instances)
}

/// Stable id for one instance of a recurring series.
fn instance_id(uid: &str, slot: DateTime<Utc>) -> String {
    format!("{uid}_{}", slot.format("%Y%m%dT%H%M%SZ"))
}

/// Parse an EXDATE property, which may hold several comma-separated values.
fn parse_exdate_property(prop: &Property<'_>, tz: &Tz) -> Vec<IcsTime> {
    let tzid = prop
        .params
        .iter()
        .find(|p| p.key == "TZID")
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()));

    let is_date = prop
        .params
        .iter()
        .any(|p| p.key == "VALUE" && p.val.as_ref().map(|v| v.as_ref()) == Some("DATE"));

    prop.val
        .as_ref()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            if is_date {
                return NaiveDate::parse_from_str(s, "%Y%m%d").ok().map(IcsTime::Date);
            }
            if let Some(utc) = s.strip_suffix('Z') {
                return NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|dt| IcsTime::Utc(dt.and_utc()));
            }
            let zone = tzid.as_deref().map_or(*tz, |id| zone_or(id, tz));
            NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                .ok()
                .map(|dt| IcsTime::Local(dt, zone))
        })
        .collect()
}

/// Display name from the CN parameter, else the address without `mailto:`.
fn attendee_name(prop: &Property<'_>) -> String {
    prop.params
        .iter()
        .find(|p| p.key == "CN")
        .and_then(|p| p.val.as_ref().map(|v| v.as_ref().trim_matches('"').to_string()))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| {
            let val = prop.val.as_ref();
            val.strip_prefix("mailto:")
                .or_else(|| val.strip_prefix("MAILTO:"))
                .unwrap_or(val)
                .to_string()
        })
}

fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

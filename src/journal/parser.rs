//! Line/file parsing and journal filename conventions.

use super::event::{decode_event, Event};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref JOURNAL_NAME: Regex =
        Regex::new(r"^Journal\.(\d{4}-\d{2}-\d{2}T\d{6})\.(\d{2})\.log$").unwrap();
}

/// One journal's name, decomposed for sorting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalName {
    pub date: String,
    pub part: u32,
}

/// Parse a single journal line. Never panics; unparseable lines are `None`,
/// never an `Err` — the caller just drops them.
pub fn parse_line(text: &str) -> Option<Event> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    decode_event(trimmed)
}

/// Split `text` on line terminators and parse each line, dropping anything
/// that fails to parse while preserving source order.
pub fn parse_file(text: &str) -> Vec<Event> {
    text.lines().filter_map(parse_line).collect()
}

/// Recognize `Journal.<YYYY-MM-DDTHHMMSS>.<NN>.log`.
pub fn is_journal_name(name: &str) -> bool {
    JOURNAL_NAME.is_match(name)
}

pub fn parse_name(name: &str) -> Option<JournalName> {
    let caps = JOURNAL_NAME.captures(name)?;
    let date = caps.get(1)?.as_str().to_string();
    let part = caps.get(2)?.as_str().parse::<u32>().ok()?;
    Some(JournalName { date, part })
}

/// Sort journal file names newest first; ties broken by part descending.
pub fn sort_by_date(names: &mut Vec<String>) {
    names.sort_by(|a, b| {
        let a = parse_name(a);
        let b = parse_name(b);
        match (a, b) {
            (Some(a), Some(b)) => (b.date.clone(), b.part).cmp(&(a.date.clone(), a.part)),
            // names that don't match the pattern sort last, stably relative to each other
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_journal_names() {
        assert!(is_journal_name("Journal.2024-01-02T030405.01.log"));
        assert!(!is_journal_name("Status.json"));
        assert!(!is_journal_name("Journal.2024-01-02.log"));
    }

    #[test]
    fn parses_name_parts() {
        let n = parse_name("Journal.2024-01-02T030405.03.log").unwrap();
        assert_eq!(n.date, "2024-01-02T030405");
        assert_eq!(n.part, 3);
    }

    #[test]
    fn sorts_newest_first_with_part_tiebreak() {
        let mut names = vec![
            "Journal.2024-01-01T000000.01.log".to_string(),
            "Journal.2024-01-02T000000.02.log".to_string(),
            "Journal.2024-01-02T000000.01.log".to_string(),
        ];
        sort_by_date(&mut names);
        assert_eq!(
            names,
            vec![
                "Journal.2024-01-02T000000.02.log".to_string(),
                "Journal.2024-01-02T000000.01.log".to_string(),
                "Journal.2024-01-01T000000.01.log".to_string(),
            ]
        );
    }

    #[test]
    fn parse_file_preserves_order_and_drops_bad_lines() {
        let text = "{\"timestamp\":\"2024-01-01T00:00:00Z\",\"event\":\"A\"}\nnot json\n{\"timestamp\":\"2024-01-01T00:00:01Z\",\"event\":\"B\"}\n";
        let events = parse_file(text);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, "A");
        assert_eq!(events[1].kind, "B");
    }

    #[test]
    fn concatenated_lines_parse_the_same_as_individually() {
        let lines = vec![
            "{\"timestamp\":\"2024-01-01T00:00:00Z\",\"event\":\"A\"}".to_string(),
            "{\"timestamp\":\"2024-01-01T00:00:01Z\",\"event\":\"B\"}".to_string(),
        ];
        let concatenated = lines.join("\n");
        let from_file = parse_file(&concatenated);
        let from_individual: Vec<Event> = lines.iter().filter_map(|l| parse_line(l)).collect();
        assert_eq!(from_file, from_individual);
    }
}

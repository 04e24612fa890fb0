use anyhow::{Context, Result};

use crate::normalize::Clarification;
use crate::survey::SurveyReport;
use crate::tally::Tally;

pub const ROW_MISMATCH_WARNING: &str =
    "<!-- warning: total for following line does not equal sum of parts -->";

/// CSV with a `Type,Total,<topics>` header and one row per known type.
///
/// A row whose per-topic counts do not add up to its total is preceded by
/// [`ROW_MISMATCH_WARNING`] and otherwise printed as is. Fields are joined
/// with commas and never quoted.
pub fn render_csv(topics: &[String], tally: &Tally) -> String {
    let mut lines = Vec::new();

    let mut header = vec!["Type".to_string(), "Total".to_string()];
    header.extend(topics.iter().cloned());
    lines.push(header.join(","));

    for (type_name, counts) in tally.rows() {
        let per_topic = topics
            .iter()
            .map(|topic| counts.for_topic(topic))
            .collect::<Vec<_>>();
        if per_topic.iter().sum::<u64>() != counts.total {
            lines.push(ROW_MISMATCH_WARNING.to_string());
        }

        let mut row = vec![type_name.to_string(), counts.total.to_string()];
        row.extend(per_topic.iter().map(ToString::to_string));
        lines.push(row.join(","));
    }

    let mut output = lines.join("\n");
    output.push('\n');
    output
}

pub fn render_summary(clarifications: &[Clarification]) -> String {
    let mut lines = vec!["all proposals processed".to_string()];
    for clarification in clarifications {
        if clarification.is_discard() {
            lines.push(format!("skipped \"{}\"", clarification.raw));
        } else {
            lines.push(format!(
                "clarified \"{}\" -> \"{}\"",
                clarification.raw, clarification.reply
            ));
        }
    }
    let mut output = lines.join("\n");
    output.push('\n');
    output
}

pub fn render_json(report: &SurveyReport) -> Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize survey report")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{KnownTypes, Resolution};

    fn topics(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    fn known(type_name: &str) -> Resolution {
        Resolution::Known(type_name.to_string())
    }

    #[test]
    fn header_lists_topics_in_discovery_order() {
        let tally = Tally::new(KnownTypes::new(["item"]));
        let csv = render_csv(&topics(&["Zeta", "Alpha"]), &tally);
        assert_eq!(csv.lines().next(), Some("Type,Total,Zeta,Alpha"));
    }

    #[test]
    fn rows_fill_missing_topics_with_zero() {
        let mut tally = Tally::new(KnownTypes::new(["item", "string"]));
        tally.record("Foo", &known("item"));
        tally.record("Bar", &known("string"));
        tally.record("Bar", &known("string"));

        let csv = render_csv(&topics(&["Foo", "Bar"]), &tally);
        assert_eq!(csv, "Type,Total,Foo,Bar\nitem,1,1,0\nstring,2,0,2\n");
    }

    #[test]
    fn mismatched_row_is_preceded_by_warning_and_left_unchanged() {
        let mut tally = Tally::new(KnownTypes::new(["item", "url"]));
        let item = tally.counts_mut("item").expect("item counts");
        item.total = 5;
        item.by_topic.insert("Foo".to_string(), 3);
        item.by_topic.insert("Bar".to_string(), 1);

        let csv = render_csv(&topics(&["Foo", "Bar"]), &tally);
        let lines = csv.lines().collect::<Vec<_>>();
        assert_eq!(
            lines,
            vec![
                "Type,Total,Foo,Bar",
                ROW_MISMATCH_WARNING,
                "item,5,3,1",
                "url,0,0,0",
            ]
        );
    }

    #[test]
    fn counts_for_undiscovered_topics_trigger_warning() {
        let mut tally = Tally::new(KnownTypes::new(["time"]));
        tally.record("Hidden", &known("time"));
        let csv = render_csv(&topics(&["Foo"]), &tally);
        assert_eq!(csv, format!("Type,Total,Foo\n{ROW_MISMATCH_WARNING}\ntime,1,0\n"));
    }

    #[test]
    fn summary_lists_skips_and_clarifications() {
        let summary = render_summary(&[
            Clarification {
                raw: "widget".to_string(),
                reply: "string".to_string(),
            },
            Clarification {
                raw: "???".to_string(),
                reply: "Skip".to_string(),
            },
        ]);
        assert_eq!(
            summary,
            "all proposals processed\nclarified \"widget\" -> \"string\"\nskipped \"???\"\n"
        );
    }
}

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::StatsConfig;
use crate::extract::extract_type_declarations;
use crate::fetch::PageSource;
use crate::normalize::{Clarification, Clarifier, Resolution, TypeNormalizer};
use crate::tally::Tally;
use crate::topics::discover_topics;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TopicStats {
    pub topic: String,
    pub declarations: usize,
    pub counted: usize,
    pub discarded: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SurveyReport {
    pub topics: Vec<String>,
    pub tally: Tally,
    pub clarifications: Vec<Clarification>,
    pub topic_stats: Vec<TopicStats>,
    pub request_count: usize,
}

/// Discovers topics, then fetches and tabulates every proposal page.
pub fn run_survey<S, C>(source: &mut S, clarifier: &mut C, config: &StatsConfig) -> Result<SurveyReport>
where
    S: PageSource,
    C: Clarifier + ?Sized,
{
    let topics = discover_topics(source, config)?;
    info!(count = topics.len(), "discovered proposal topics");
    let normalizer = TypeNormalizer::from_config(config);
    survey_topics(source, clarifier, normalizer, topics, config)
}

pub fn survey_topics<S, C>(
    source: &mut S,
    clarifier: &mut C,
    mut normalizer: TypeNormalizer,
    topics: Vec<String>,
    config: &StatsConfig,
) -> Result<SurveyReport>
where
    S: PageSource,
    C: Clarifier + ?Sized,
{
    let mut tally = Tally::new(normalizer.known_types().clone());
    let mut topic_stats = Vec::with_capacity(topics.len());

    for topic in &topics {
        info!(topic = topic.as_str(), "processing topic");
        let title = config.proposal_page_title(topic);
        let page = source
            .fetch_page(&title)
            .with_context(|| format!("failed to load proposals for topic {topic}"))?;

        let declarations = extract_type_declarations(&page);
        debug!(topic = topic.as_str(), found = declarations.len(), "extracted type declarations");

        let mut stats = TopicStats {
            topic: topic.clone(),
            declarations: declarations.len(),
            ..TopicStats::default()
        };
        for raw in &declarations {
            let resolution = normalizer
                .resolve(raw, clarifier)
                .with_context(|| format!("failed to resolve type \"{}\" in {topic}", raw.trim()))?;
            if tally.record(topic, &resolution) {
                stats.counted += 1;
            } else if resolution == Resolution::Discard {
                stats.discarded += 1;
            }
        }
        topic_stats.push(stats);
    }

    Ok(SurveyReport {
        topics,
        tally,
        clarifications: normalizer.into_history(),
        topic_stats,
        request_count: source.request_count(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::SkipAllClarifier;
    use crate::report::{ROW_MISMATCH_WARNING, render_csv};
    use crate::testing::{MockSource, ScriptedClarifier};

    const INDEX_TITLE: &str = "Wikidata:Property_proposal";

    fn index_page(names: &[&str]) -> String {
        let links = names
            .iter()
            .map(|name| format!("{{{{Wikidata:Property proposal/{name}|{name}}}}}"))
            .collect::<Vec<_>>()
            .join("\n");
        format!("<api><query><pages><page><revisions><rev>{links}</rev></revisions></page></pages></query></api>")
    }

    fn proposal_page(types: &[&str]) -> String {
        types
            .iter()
            .enumerate()
            .map(|(index, type_name)| {
                format!("{{{{Property proposal\n|name = P{index}\n|datatype = {type_name}\n}}}}\n")
            })
            .collect()
    }

    fn source_with(topics: &[(&str, &[&str])]) -> MockSource {
        let mut names = topics.iter().map(|(name, _)| *name).collect::<Vec<_>>();
        names.extend(["all", "Archive", "Pending"]);
        let mut source = MockSource::default().with_page(INDEX_TITLE, &index_page(&names));
        for (name, types) in topics {
            source = source.with_page(
                &format!("Wikidata:Property_proposal/{name}"),
                &proposal_page(types),
            );
        }
        source
    }

    #[test]
    fn counts_known_and_clarified_types_per_topic() {
        let mut source = source_with(&[("Foo", &["Item", " STRING ", "widget"])]);
        let mut clarifier = ScriptedClarifier::new(&["string"]);

        let report = run_survey(&mut source, &mut clarifier, &StatsConfig::default())
            .expect("survey");

        assert_eq!(report.topics, vec!["Foo"]);
        assert_eq!(clarifier.asked(), ["widget"]);
        let item = report.tally.counts("item").expect("item");
        let string = report.tally.counts("string").expect("string");
        assert_eq!(item.for_topic("Foo"), 1);
        assert_eq!(string.for_topic("Foo"), 2);
        for (type_name, counts) in report.tally.rows() {
            if type_name != "item" && type_name != "string" {
                assert_eq!(counts.for_topic("Foo"), 0, "{type_name}");
            }
        }
        assert_eq!(
            report.topic_stats,
            vec![TopicStats {
                topic: "Foo".to_string(),
                declarations: 3,
                counted: 3,
                discarded: 0,
            }]
        );
        assert_eq!(report.request_count, 2);
    }

    #[test]
    fn csv_header_matches_discovered_topics() {
        let mut source = source_with(&[("Sports", &["time"]), ("Art", &["media", "url"])]);
        let report = run_survey(&mut source, &mut SkipAllClarifier, &StatsConfig::default())
            .expect("survey");

        let csv = render_csv(&report.topics, &report.tally);
        assert!(csv.starts_with("Type,Total,Sports,Art\n"));
        assert!(csv.contains("\nmedia,1,0,1\n"));
        assert!(!csv.contains(ROW_MISMATCH_WARNING));
        assert_eq!(
            source.requested(),
            [
                INDEX_TITLE,
                "Wikidata:Property_proposal/Sports",
                "Wikidata:Property_proposal/Art"
            ]
        );
    }

    #[test]
    fn discarded_types_are_never_counted() {
        let mut source = source_with(&[("Foo", &["gizmo", "gizmo", "number"])]);
        let mut clarifier = ScriptedClarifier::new(&["skip"]);

        let report = run_survey(&mut source, &mut clarifier, &StatsConfig::default())
            .expect("survey");

        assert_eq!(report.tally.grand_total(), 1);
        assert_eq!(report.topic_stats[0].discarded, 2);
        assert_eq!(clarifier.asked(), ["gizmo"]);
        assert_eq!(report.clarifications.len(), 1);
        assert!(report.clarifications[0].is_discard());
    }

    #[test]
    fn pages_without_declarations_contribute_nothing() {
        let mut source = source_with(&[("Empty", &[]), ("Foo", &["url"])]);
        let report = run_survey(&mut source, &mut SkipAllClarifier, &StatsConfig::default())
            .expect("survey");
        assert_eq!(report.topics, vec!["Empty", "Foo"]);
        assert_eq!(report.topic_stats[0].declarations, 0);
        assert_eq!(report.tally.grand_total(), 1);
    }

    #[test]
    fn fetch_failure_aborts_the_run() {
        let mut source = MockSource::default().with_page(
            INDEX_TITLE,
            &index_page(&["Missing", "all", "Archive", "Pending"]),
        );
        let error = run_survey(&mut source, &mut SkipAllClarifier, &StatsConfig::default())
            .expect_err("must fail");
        assert!(error.to_string().contains("topic Missing"));
    }

    #[test]
    fn closed_operator_input_aborts_the_run() {
        let mut source = source_with(&[("Foo", &["widget"])]);
        let mut clarifier = ScriptedClarifier::new(&[]);
        let error = run_survey(&mut source, &mut clarifier, &StatsConfig::default())
            .expect_err("must fail");
        assert!(format!("{error:#}").contains("no scripted reply"));
    }
}

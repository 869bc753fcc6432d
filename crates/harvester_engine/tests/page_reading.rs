use chrono::{TimeZone, Utc};
use harvester_core::{Field, StructureType};
use harvester_engine::{
    AdaptiveExtractor, ClassifierSelectors, ExtractError, ExtractionSelectors, PageClassifier,
    Provenance, SelectorStrategy,
};
use pretty_assertions::assert_eq;
use scraper::Html;

fn classifier() -> PageClassifier {
    PageClassifier::new(&ClassifierSelectors::default()).unwrap()
}

fn extractor() -> AdaptiveExtractor {
    AdaptiveExtractor::from_selectors(&ExtractionSelectors::default()).unwrap()
}

fn classify(html: &str) -> StructureType {
    classifier().classify(&Html::parse_document(html))
}

fn provenance(target_id: &String) -> Provenance<'_> {
    Provenance {
        target_id,
        source_url: "https://shop.test/product/1",
        fetched_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    }
}

const STATIC_LIST: &str = r#"<div class="review-item"><span class="reviewer-name">Ana</span>
    <p class="review-text">Smells lovely and lasts all day.</p></div>"#;

#[test]
fn classifies_each_structure() {
    assert_eq!(
        classify(&format!("{STATIC_LIST}<a rel=\"next\" href=\"?page=2\">2</a>")),
        StructureType::Paginated
    );
    assert_eq!(
        classify(&format!("{STATIC_LIST}<button class=\"load-more\">More</button>")),
        StructureType::Paginated
    );
    assert_eq!(
        classify(&format!("{STATIC_LIST}<div data-infinite-scroll=\"true\"></div>")),
        StructureType::InfiniteScroll
    );
    assert_eq!(classify(STATIC_LIST), StructureType::Static);
    assert_eq!(classify("<html><body><p>Sold out</p></body></html>"), StructureType::Unknown);
}

#[test]
fn paging_controls_win_over_scroll_sentinels() {
    let html = format!(
        "{STATIC_LIST}<div class=\"infinite-scroll\"></div><a class=\"next-page\" href=\"/p/1/2\">next</a>"
    );
    assert_eq!(classify(&html), StructureType::Paginated);
}

#[test]
fn next_link_resolves_against_page_url() {
    let classifier = classifier();
    let doc = Html::parse_document(
        r#"<nav><a rel="next">disabled</a><div class="pagination"><a class="next" href="?page=3">3</a></div></nav>"#,
    );

    assert_eq!(
        classifier.next_page_link(&doc, "https://shop.test/product/1?page=2"),
        Some("https://shop.test/product/1?page=3".to_string())
    );
    assert!(!classifier.has_load_more(&doc));

    let last = Html::parse_document(STATIC_LIST);
    assert_eq!(classifier.next_page_link(&last, "https://shop.test/product/1"), None);
}

#[test]
fn primary_selectors_score_full_confidence() {
    let html = r#"<div class="review-item">
        <span class="reviewer-name"> Ana </span>
        <p class="review-text">Smells lovely and lasts all day.</p>
        <span class="rating">4.5 out of 5</span>
        <span class="review-date">2024-03-15</span>
        <span class="helpful-count">12</span>
    </div>"#;
    let target_id = "t1".to_string();
    let batch = extractor().extract(&Html::parse_document(html), provenance(&target_id));

    assert_eq!(batch.container, Some(0));
    assert_eq!(batch.records.len(), 1);
    let record = &batch.records[0];
    assert_eq!(record.field(Field::Reviewer), Some("Ana"));
    assert_eq!(record.field(Field::Rating), Some("4.5 out of 5"));
    assert_eq!(record.field(Field::HelpfulVotes), Some("12"));
    assert_eq!(record.confidence, 1.0);
    assert_eq!(record.source_target_id, "t1");
    assert_eq!(record.source_url, "https://shop.test/product/1");
}

#[test]
fn falls_back_to_alternate_container_and_fields() {
    let html = r#"<ul>
        <li class="comment-item">
            <b class="username">Bo</b>
            <div class="comment-text">Too sticky for my taste, returned it.</div>
            <div data-rating="2"></div>
            <time datetime="2024-02-01T10:00:00Z">last month</time>
        </li>
        <li class="comment-item">
            <b class="username">Cy</b>
        </li>
    </ul>"#;
    let target_id = "t1".to_string();
    let batch = extractor().extract(&Html::parse_document(html), provenance(&target_id));

    assert_eq!(batch.container, Some(1));
    assert_eq!(batch.records.len(), 2);
    assert_eq!(batch.complete_count(), 1);

    let first = &batch.records[0];
    assert_eq!(first.field(Field::Rating), Some("2"));
    assert_eq!(first.field(Field::Date), Some("2024-02-01T10:00:00Z"));
    assert_eq!(first.strategies.get(&Field::Reviewer), Some(&1));
    assert_eq!(first.strategies.get(&Field::Date), Some(&4));
    assert!((first.confidence - 0.75).abs() < 1e-6);

    assert_eq!(batch.records[1].field(Field::Text), None);
    // Only the reviewer was found, through its second strategy.
    assert!((batch.records[1].confidence - 0.75).abs() < 1e-6);
}

#[test]
fn confidence_is_the_weakest_mandatory_field() {
    let html = r#"<div itemprop="review">
        <span class="reviewer-name">Di</span>
        <span itemprop="reviewBody">Gorgeous colour, stays put.</span>
    </div>"#;
    let target_id = "t1".to_string();
    let batch = extractor().extract(&Html::parse_document(html), provenance(&target_id));

    assert_eq!(batch.container, Some(4));
    assert!((batch.records[0].confidence - 0.316_406_25).abs() < 1e-6);
}

#[test]
fn page_without_items_yields_empty_batch() {
    let target_id = "t1".to_string();
    let batch = extractor().extract(
        &Html::parse_document("<p>No reviews yet</p>"),
        provenance(&target_id),
    );
    assert!(batch.records.is_empty());
    assert_eq!(batch.container, None);
    assert_eq!(batch.complete_count(), 0);
}

#[test]
fn custom_strategies_extend_the_fallback_chain() {
    let extractor = AdaptiveExtractor::from_selectors(&ExtractionSelectors::default())
        .unwrap()
        .with_strategy(
            Field::Reviewer,
            Box::new(SelectorStrategy::attribute("[data-author]", "data-author").unwrap()),
        );
    let html = r#"<div class="review-item" >
        <div data-author="Eve"></div>
        <p class="review-text">Works well under makeup.</p>
    </div>"#;
    let target_id = "t1".to_string();
    let batch = extractor.extract(&Html::parse_document(html), provenance(&target_id));

    assert_eq!(batch.records[0].field(Field::Reviewer), Some("Eve"));
    assert_eq!(batch.records[0].strategies.get(&Field::Reviewer), Some(&5));
}

#[test]
fn invalid_configuration_is_rejected() {
    let broken = ExtractionSelectors {
        containers: vec!["div[".to_string()],
        ..ExtractionSelectors::default()
    };
    assert!(matches!(
        AdaptiveExtractor::from_selectors(&broken),
        Err(ExtractError::InvalidSelector { .. })
    ));

    let empty = ClassifierSelectors {
        review_items: Vec::new(),
        ..ClassifierSelectors::default()
    };
    assert_eq!(
        PageClassifier::new(&empty).unwrap_err(),
        ExtractError::Empty("review_items")
    );
}

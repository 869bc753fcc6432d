use std::collections::BTreeMap;

use chrono::Utc;
use harvester_core::{DedupPipeline, Field, RawRecord, Rejection};
use pretty_assertions::assert_eq;

fn raw(fields: &[(Field, &str)]) -> RawRecord {
    RawRecord {
        source_target_id: "a1b2c3d4e5f60718".to_string(),
        source_url: "https://shop.example.com/product/1".to_string(),
        fields: fields
            .iter()
            .map(|(f, v)| (*f, v.to_string()))
            .collect::<BTreeMap<_, _>>(),
        strategies: BTreeMap::new(),
        confidence: 1.0,
        fetched_at: Utc::now(),
    }
}

fn review(reviewer: &str, text: &str, rating: &str, date: &str) -> RawRecord {
    raw(&[
        (Field::Reviewer, reviewer),
        (Field::Text, text),
        (Field::Rating, rating),
        (Field::Date, date),
    ])
}

#[test]
fn well_formed_review_is_normalized() {
    let mut pipeline = DedupPipeline::new();
    let mut input = review(
        "  Dana  K. ",
        "Battery lasts \"forever\",\n\n  would buy again.",
        "4.0 out of 5 stars",
        "Reviewed on March 5, 2024",
    );
    input
        .fields
        .insert(Field::HelpfulVotes, "1,204 people found this helpful".to_string());

    let record = pipeline.process(&input).unwrap();
    assert_eq!(record.reviewer, "Dana K.");
    assert_eq!(record.text, "Battery lasts \"\"forever\"\", would buy again.");
    assert_eq!(record.rating, 4);
    assert_eq!(record.date, "2024-03-05");
    assert_eq!(record.helpful_votes, 1204);
    assert_eq!(record.target_id, "a1b2c3d4e5f60718");
    assert_eq!(record.content_hash.len(), 64);
    assert!(pipeline.contains(&record.content_hash));
}

#[test]
fn each_failure_maps_to_its_rejection() {
    let mut pipeline = DedupPipeline::new();
    let cases = [
        (review("Sam", "ok", "5", "2024-01-02"), Rejection::TextTooShort),
        (
            review("Sam", "Works as described, no complaints.", "7", "2024-01-02"),
            Rejection::RatingOutOfRange,
        ),
        (
            review("Sam", "Works as described, no complaints.", "4", "last Tuesday"),
            Rejection::DateUnparseable,
        ),
        (
            review("Sam", &"long review ".repeat(500), "4", "2024-01-02"),
            Rejection::TextTooLong,
        ),
        (
            raw(&[(Field::Reviewer, "Sam"), (Field::Rating, "4")]),
            Rejection::ExtractionIncomplete,
        ),
        (
            review("Sam", "  \n ", "4", "2024-01-02"),
            Rejection::ExtractionIncomplete,
        ),
    ];

    for (input, expected) in cases {
        assert_eq!(pipeline.process(&input), Err(expected));
    }
    assert!(pipeline.is_empty());
}

#[test]
fn whitespace_variants_are_duplicates() {
    let mut pipeline = DedupPipeline::new();
    let first = review("Lee", "Great fit and   colour.", "5", "2024-06-01");
    let second = review(" Lee", "Great fit\nand colour. ", "★★★★★", "06/01/2024");

    assert!(pipeline.process(&first).is_ok());
    assert_eq!(pipeline.process(&second), Err(Rejection::DuplicateRecord));
    assert_eq!(pipeline.len(), 1);
}

#[test]
fn rehydrated_hashes_reject_earlier_records() {
    let input = review("Lee", "Great fit and colour.", "5", "2024-06-01");
    let hash = DedupPipeline::new().process(&input).unwrap().content_hash;

    let mut pipeline = DedupPipeline::new();
    pipeline.rehydrate(vec![hash.clone()]);
    assert_eq!(pipeline.process(&input), Err(Rejection::DuplicateRecord));

    pipeline.forget(&hash);
    assert!(pipeline.process(&input).is_ok());
}

#[test]
fn review_without_a_name_is_kept_as_anonymous() {
    let mut pipeline = DedupPipeline::new();
    let unnamed = raw(&[
        (Field::Text, "Works as described, no complaints."),
        (Field::Rating, "4"),
        (Field::Date, "2024-01-02"),
    ]);
    let blank = review("  ", "Works as described, no complaints.", "4", "2024-01-02");

    let record = pipeline.process(&unnamed).unwrap();
    assert_eq!(record.reviewer, "Anonymous");
    assert_eq!(
        record.content_hash,
        DedupPipeline::new()
            .process(&review("Anonymous", "Works as described, no complaints.", "4", "2024-01-02"))
            .unwrap()
            .content_hash
    );
    assert_eq!(pipeline.process(&blank), Err(Rejection::DuplicateRecord));
}

//! Delimiter-based record grammar shared by entity and relation extraction
//! (spec §4.4/§9), grounded on `original_source/.../entity/vanilla.py`'s
//! regex-based record splitting (`split_string_by_multi_markers`, a
//! non-greedy `re.search(r"\((.*?)\)")` for entity records and a greedy
//! `re.search(r"\((.*)\)")` for relationship records — the two kinds are
//! parsed with deliberately different patterns, matching the original's two
//! separate `re.search` calls record-for-record).

use regex::Regex;

pub const TUPLE_DELIMITER: &str = "<|>";
pub const RECORD_DELIMITER: &str = "##";
pub const COMPLETION_DELIMITER: &str = "<|COMPLETE|>";

/// Default entity-type vocabulary handed to the extraction prompt.
pub const DEFAULT_ENTITY_TYPES: &[&str] = &["organization", "person", "geo", "event"];

/// A record parsed out of one LLM response. Malformed records never reach
/// this type — they're silently skipped during parsing (spec §7).
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Entity { name: String, entity_type: String, description: String },
    Relation { src: String, tgt: String, description: String, weight: f32 },
}

/// Splits raw LLM output on the record/completion delimiters, then parses
/// each `(...)`-wrapped segment into a tagged record.
pub fn parse_records(raw: &str) -> Vec<Record> {
    raw.split(RECORD_DELIMITER)
        .flat_map(|segment| segment.split(COMPLETION_DELIMITER))
        .filter_map(parse_one_record)
        .collect()
}

fn split_fields(inner: &str) -> Vec<String> {
    inner
        .split(TUPLE_DELIMITER)
        .map(|f| f.trim().trim_matches('"').to_string())
        .collect()
}

/// Entity records use the non-greedy pattern; the tag itself sits right
/// after the opening paren so peeking with it is enough to tell which
/// record kind we're looking at regardless of which pattern governs the
/// full parse.
fn parse_one_record(segment: &str) -> Option<Record> {
    let non_greedy = Regex::new(r"\((.*?)\)").unwrap();
    let peeked = non_greedy.captures(segment)?.get(1)?.as_str();
    let tag = peeked.split(TUPLE_DELIMITER).next()?.trim().trim_matches('"').to_string();

    match tag.as_str() {
        "entity" => {
            let fields = split_fields(peeked);
            (fields.len() >= 4).then(|| Record::Entity {
                name: fields[1].to_uppercase(),
                entity_type: fields[2].clone(),
                description: fields[3].clone(),
            })
        }
        "relationship" => {
            let greedy = Regex::new(r"\((.*)\)").unwrap();
            let inner = greedy.captures(segment)?.get(1)?.as_str();
            let fields = split_fields(inner);
            (fields.len() >= 5).then(|| {
                let weight = fields[4].trim().parse::<f32>().unwrap_or(1.0);
                Record::Relation {
                    src: fields[1].to_uppercase(),
                    tgt: fields[2].to_uppercase(),
                    description: fields[3].clone(),
                    weight,
                }
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_entity_and_relationship_records() {
        let raw = format!(
            "(\"entity\"{d}\"Acme\"{d}\"organization\"{d}\"Makes widgets\"){r}(\"relationship\"{d}\"Acme\"{d}\"Globex\"{d}\"supplies to\"{d}\"0.8\"){c}",
            d = TUPLE_DELIMITER,
            r = RECORD_DELIMITER,
            c = COMPLETION_DELIMITER,
        );
        let records = parse_records(&raw);
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            Record::Entity {
                name: "ACME".to_string(),
                entity_type: "organization".to_string(),
                description: "Makes widgets".to_string(),
            }
        );
        assert_eq!(
            records[1],
            Record::Relation {
                src: "ACME".to_string(),
                tgt: "GLOBEX".to_string(),
                description: "supplies to".to_string(),
                weight: 0.8,
            }
        );
    }

    #[test]
    fn malformed_record_is_skipped() {
        let raw = format!("not a record at all{}", RECORD_DELIMITER);
        assert!(parse_records(&raw).is_empty());
    }

    #[test]
    fn entity_record_missing_fields_is_skipped() {
        let raw = format!("(\"entity\"{d}\"Acme\")", d = TUPLE_DELIMITER);
        assert!(parse_records(&raw).is_empty());
    }

    #[test]
    fn entity_non_greedy_match_stops_at_first_closing_paren() {
        // Matches the non-greedy pattern's behavior: it stops at the first
        // `)`, so a literal paren inside the description truncates there
        // rather than consuming through to the record's own close.
        let raw = format!(
            "(\"entity\"{d}\"Acme\"{d}\"organization\"{d}\"Makes widgets (est. 1990)\")",
            d = TUPLE_DELIMITER,
        );
        let records = parse_records(&raw);
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0],
            Record::Entity {
                name: "ACME".to_string(),
                entity_type: "organization".to_string(),
                description: "Makes widgets (est. 1990".to_string(),
            }
        );
    }

    #[test]
    fn relationship_description_with_literal_parens_parses_with_greedy_match() {
        let raw = format!(
            "(\"relationship\"{d}\"Acme\"{d}\"Globex\"{d}\"supplies (by rail)\"{d}\"0.5\")",
            d = TUPLE_DELIMITER,
        );
        let records = parse_records(&raw);
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0],
            Record::Relation {
                src: "ACME".to_string(),
                tgt: "GLOBEX".to_string(),
                description: "supplies (by rail)".to_string(),
                weight: 0.5,
            }
        );
    }
}

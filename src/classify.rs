//! READ/WRITE tagging of generated statements.
//!
//! The default rule is a textual prefix check: a statement is a read iff its
//! trimmed, lower-cased text starts with `select`. CTEs (`WITH ... SELECT`),
//! multi-statement text and procedure calls are tagged WRITE by that rule.
//! `ParserClassifier` understands those, and is opt-in.

use serde::{Deserialize, Serialize};
use sqlparser::ast as sp;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser as SqlParser;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    Read,
    Write,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionType::Read => write!(f, "READ"),
            ActionType::Write => write!(f, "WRITE"),
        }
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "READ" => Ok(ActionType::Read),
            "WRITE" => Ok(ActionType::Write),
            other => Err(format!("unknown action type {other:?}")),
        }
    }
}

/// Generated SQL together with the branch it will run on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedStatement {
    pub sql: String,
    pub action: ActionType,
}

pub trait StatementClassifier: Send + Sync {
    fn classify(&self, sql: &str) -> ActionType;
}

/// `READ` iff the normalized text begins with `select`.
pub fn classify(sql: &str) -> ActionType {
    if sql.trim().to_lowercase().starts_with("select") {
        ActionType::Read
    } else {
        ActionType::Write
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PrefixClassifier;

impl StatementClassifier for PrefixClassifier {
    fn classify(&self, sql: &str) -> ActionType {
        classify(sql)
    }
}

/// Tags a single query statement (plain SELECT, `WITH`, `VALUES`, set
/// operations) as READ and everything else as WRITE. Text that does not parse
/// falls back to the prefix rule.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParserClassifier;

impl StatementClassifier for ParserClassifier {
    fn classify(&self, sql: &str) -> ActionType {
        let dialect = PostgreSqlDialect {};
        match SqlParser::parse_sql(&dialect, sql) {
            Ok(statements) => match statements.as_slice() {
                [sp::Statement::Query(query)] if !writes_via_cte(query) => ActionType::Read,
                [] => classify(sql),
                _ => ActionType::Write,
            },
            Err(e) => {
                tracing::debug!(error = %e, "statement did not parse, using prefix rule");
                classify(sql)
            }
        }
    }
}

/// `WITH d AS (DELETE ... RETURNING *) SELECT ...` is a query that writes.
fn writes_via_cte(query: &sp::Query) -> bool {
    query.with.as_ref().is_some_and(|with| {
        with.cte_tables.iter().any(|cte| {
            !matches!(
                *cte.query.body,
                sp::SetExpr::Select(_)
                    | sp::SetExpr::Query(_)
                    | sp::SetExpr::SetOperation { .. }
                    | sp::SetExpr::Values(_)
                    | sp::SetExpr::Table(_)
            )
        })
    })
}

/// Which classifier the pipeline uses, as named in the config file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierKind {
    #[default]
    Prefix,
    Parser,
}

impl ClassifierKind {
    pub fn build(self) -> Box<dyn StatementClassifier> {
        match self {
            ClassifierKind::Prefix => Box::new(PrefixClassifier),
            ClassifierKind::Parser => Box::new(ParserClassifier),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_prefix_rule() {
        assert_eq!(classify("SELECT * FROM customers;"), ActionType::Read);
        assert_eq!(classify("  \n\tselect 1"), ActionType::Read);
        assert_eq!(classify("DELETE FROM users WHERE id=5;"), ActionType::Write);
        assert_eq!(classify("insert into t values (1)"), ActionType::Write);
        assert_eq!(classify(""), ActionType::Write);
    }

    #[test]
    fn test_prefix_rule_blind_spots() {
        // Known misclassifications of the textual rule.
        assert_eq!(classify("WITH x AS (SELECT 1) SELECT * FROM x"), ActionType::Write);
        assert_eq!(classify("(SELECT 1)"), ActionType::Write);
        // Any text starting with "select" counts, even a batch that writes.
        assert_eq!(classify("SELECT 1; DROP TABLE users"), ActionType::Read);
        assert_eq!(classify("selected_items"), ActionType::Read);
    }

    #[test]
    fn test_parser_classifier() {
        let c = ParserClassifier;
        assert_eq!(c.classify("WITH x AS (SELECT 1) SELECT * FROM x"), ActionType::Read);
        assert_eq!(c.classify("SELECT 1 UNION SELECT 2"), ActionType::Read);
        assert_eq!(c.classify("SELECT 1; DROP TABLE users"), ActionType::Write);
        assert_eq!(c.classify("UPDATE t SET a = 1"), ActionType::Write);
        assert_eq!(
            c.classify("WITH d AS (DELETE FROM t RETURNING *) SELECT * FROM d"),
            ActionType::Write
        );
    }

    #[test]
    fn test_parser_classifier_falls_back_on_garbage() {
        let c = ParserClassifier;
        assert_eq!(c.classify("select frm whatever ((("), ActionType::Read);
        assert_eq!(c.classify("please drop it"), ActionType::Write);
    }

    #[test]
    fn test_action_type_text_round_trip() {
        assert_eq!(ActionType::Read.to_string(), "READ");
        assert_eq!("write".parse::<ActionType>(), Ok(ActionType::Write));
        assert!("MAYBE".parse::<ActionType>().is_err());
    }

    #[test]
    fn test_classifier_kind_from_config() {
        #[derive(Deserialize)]
        struct Wrapper {
            classifier: ClassifierKind,
        }
        let w: Wrapper = toml::from_str("classifier = \"parser\"").unwrap();
        assert_eq!(w.classifier, ClassifierKind::Parser);
        assert_eq!(
            w.classifier.build().classify("WITH a AS (SELECT 1) SELECT * FROM a"),
            ActionType::Read
        );
        assert_eq!(ClassifierKind::default(), ClassifierKind::Prefix);
    }

    fn random_case(s: &str, mask: &[bool]) -> String {
        s.chars()
            .zip(mask.iter().cycle())
            .map(|(c, upper)| if *upper { c.to_ascii_uppercase() } else { c })
            .collect()
    }

    proptest! {
        #[test]
        fn prop_select_in_any_case_with_any_padding_is_read(
            lead in "[ \t\r\n]{0,6}",
            trail in "[ \t\r\n]{0,6}",
            mask in proptest::collection::vec(any::<bool>(), 6),
            rest in "[ a-zA-Z0-9_*,();=']{0,40}",
        ) {
            let sql = format!("{lead}{}{rest}{trail}", random_case("select", &mask));
            prop_assert_eq!(classify(&sql), ActionType::Read);
        }

        #[test]
        fn prop_classify_matches_normalized_prefix(sql in "[ \t\nA-Za-z0-9_*;]{0,30}") {
            let expected = if sql.trim().to_lowercase().starts_with("select") {
                ActionType::Read
            } else {
                ActionType::Write
            };
            prop_assert_eq!(classify(&sql), expected);
        }

        #[test]
        fn prop_other_leading_keywords_are_write(
            keyword in prop::sample::select(vec!["insert", "update", "delete", "create", "drop", "with", "call"]),
            mask in proptest::collection::vec(any::<bool>(), 6),
            lead in "[ \t\n]{0,4}",
        ) {
            let sql = format!("{lead}{} something", random_case(keyword, &mask));
            prop_assert_eq!(classify(&sql), ActionType::Write);
        }
    }
}

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// SQL dialect spoken by the catalog database.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, Hash, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Dialect {
    /// PostgreSQL.
    #[default]
    Postgres,
    /// MySQL or MariaDB.
    #[strum(serialize = "mysql")]
    #[serde(rename = "mysql")]
    MySql,
    /// Oracle Database.
    Oracle,
    /// CockroachDB, which speaks the PostgreSQL wire protocol.
    #[strum(serialize = "cockroachdb")]
    #[serde(rename = "cockroachdb")]
    CockroachDb,
}

/// Errors encountered while parsing a [`Dialect`] from text.
pub type DialectParseError = strum::ParseError;

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::postgres("postgres", Dialect::Postgres)]
    #[case::mysql("MySQL", Dialect::MySql)]
    #[case::oracle("oracle", Dialect::Oracle)]
    #[case::cockroach("cockroachdb", Dialect::CockroachDb)]
    fn parses_known_dialects(#[case] input: &str, #[case] expected: Dialect) {
        assert_eq!(input.parse::<Dialect>().expect("parse dialect"), expected);
    }

    #[test]
    fn display_round_trips_through_parse() {
        let text = Dialect::CockroachDb.to_string();
        assert_eq!(text, "cockroachdb");
        assert_eq!(text.parse::<Dialect>().ok(), Some(Dialect::CockroachDb));
    }

    #[test]
    fn rejects_sqlite() {
        assert!("sqlite".parse::<Dialect>().is_err());
    }
}

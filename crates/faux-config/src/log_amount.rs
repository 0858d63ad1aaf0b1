use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use serde::{Deserialize, Serialize};

/// How much debugging output a mod writes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogAmount {
    #[default]
    Less = 0,
    More = 2,
}

impl LogAmount {
    /// Filter directive used when neither `FAUX_LOG` nor `RUST_LOG` is set.
    pub fn default_filter(self) -> &'static str {
        match self {
            LogAmount::Less => "info",
            LogAmount::More => "debug",
        }
    }
}

impl fmt::Display for LogAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogAmount::Less => f.write_str("Less"),
            LogAmount::More => f.write_str("More"),
        }
    }
}

impl FromStr for LogAmount {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim() {
            v if v.eq_ignore_ascii_case("less") || v == "0" => Ok(LogAmount::Less),
            v if v.eq_ignore_ascii_case("more") || v == "2" => Ok(LogAmount::More),
            other => bail!("unknown log amount: {other:?}"),
        }
    }
}

/// A config that carries a [`LogAmount`] option.
pub trait ConfigWithLogAmount {
    fn log_amount(&self) -> LogAmount;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_values() {
        assert_eq!("more".parse::<LogAmount>().unwrap(), LogAmount::More);
        assert_eq!(" Less ".parse::<LogAmount>().unwrap(), LogAmount::Less);
        assert_eq!("2".parse::<LogAmount>().unwrap(), LogAmount::More);
        assert!("1".parse::<LogAmount>().is_err());
    }

    #[test]
    fn display_matches_serialized_name() {
        assert_eq!(LogAmount::More.to_string(), "More");
        assert_eq!(serde_json::to_string(&LogAmount::More).unwrap(), "\"More\"");
        assert_eq!(LogAmount::More as i32, 2);
    }

    #[test]
    fn default_filter_widens_with_more() {
        assert_eq!(LogAmount::default().default_filter(), "info");
        assert_eq!(LogAmount::More.default_filter(), "debug");
    }
}

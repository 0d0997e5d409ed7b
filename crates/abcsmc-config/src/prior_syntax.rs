//! Parses the `name ~ family(p1, p2)` prior syntax (spec §4.2/§6) into
//! `abcsmc_math::PriorDist` values bound to a parameter name.

use abcsmc_common::{Error, Result};
use abcsmc_math::PriorDist;
use regex::Regex;
use std::sync::OnceLock;

fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?x)
            ^\s*
            (?P<name>[A-Za-z_][A-Za-z0-9_]*)
            \s*~\s*
            (?P<family>uniform|normal|lognormal|gamma)
            \s*\(\s*
            (?P<p1>[-+0-9.eE]+)
            \s*,\s*
            (?P<p2>[-+0-9.eE]+)
            \s*\)\s*$
            ",
        )
        .expect("static prior-syntax pattern is valid")
    })
}

/// One parsed prior clause, before it is bound to `gdata`/`ldata`.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedPrior {
    pub name: String,
    pub dist: PriorDist,
}

/// Parses a single `name ~ family(p1, p2)` clause.
pub fn parse_clause(clause: &str) -> Result<NamedPrior> {
    let captures = pattern()
        .captures(clause)
        .ok_or_else(|| Error::PriorParse(format!("malformed prior clause: {clause:?}")))?;

    let name = captures["name"].to_string();
    let family = &captures["family"];
    let p1: f64 = captures["p1"]
        .parse()
        .map_err(|_| Error::PriorParse(format!("non-numeric first parameter in {clause:?}")))?;
    let p2: f64 = captures["p2"]
        .parse()
        .map_err(|_| Error::PriorParse(format!("non-numeric second parameter in {clause:?}")))?;

    let dist = match family {
        "uniform" => PriorDist::Uniform { a: p1, b: p2 },
        "normal" => PriorDist::Normal { mean: p1, sd: p2 },
        "lognormal" => PriorDist::LogNormal { mu: p1, sigma: p2 },
        "gamma" => PriorDist::Gamma { shape: p1, rate: p2 },
        other => return Err(Error::PriorParse(format!("unknown prior family {other:?}"))),
    };
    dist.validate()
        .map_err(|reason| Error::PriorParse(format!("{clause:?}: {reason}")))?;

    Ok(NamedPrior { name, dist })
}

/// Parses a sequence of prior clauses, one per line (blank lines and lines
/// starting with `#` are skipped), matching spec §4.2's "multiple priors
/// combined by a sequence constructor".
pub fn parse_sequence(source: &str) -> Result<Vec<NamedPrior>> {
    source
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(parse_clause)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_family() {
        assert_eq!(
            parse_clause("beta ~ uniform(0, 1)").unwrap(),
            NamedPrior { name: "beta".into(), dist: PriorDist::Uniform { a: 0.0, b: 1.0 } }
        );
        assert_eq!(
            parse_clause("gamma_rate ~ gamma(2, 3)").unwrap(),
            NamedPrior { name: "gamma_rate".into(), dist: PriorDist::Gamma { shape: 2.0, rate: 3.0 } }
        );
    }

    #[test]
    fn parses_negative_and_scientific_notation() {
        let parsed = parse_clause("mu ~ normal(-1.5e2, 2.0)").unwrap();
        assert_eq!(parsed.dist, PriorDist::Normal { mean: -150.0, sd: 2.0 });
    }

    #[test]
    fn rejects_malformed_clause() {
        assert!(parse_clause("beta uniform(0,1)").is_err());
        assert!(parse_clause("beta ~ triangular(0,1)").is_err());
    }

    #[test]
    fn rejects_invalid_family_parameters() {
        assert!(parse_clause("beta ~ uniform(1, 0)").is_err());
        assert!(parse_clause("sd ~ normal(0, -1)").is_err());
    }

    #[test]
    fn sequence_skips_blank_and_comment_lines() {
        let source = "beta ~ uniform(0, 1)\n\n# a comment\nmu ~ normal(0, 1)\n";
        let parsed = parse_sequence(source).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].name, "beta");
        assert_eq!(parsed[1].name, "mu");
    }
}

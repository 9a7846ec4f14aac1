use std::fmt;
use std::str::FromStr;

use super::marker::Marker;
use super::version::Version;
use super::ManifestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equal,
    NotEqual,
    LessEqual,
    GreaterEqual,
    Less,
    Greater,
    Compatible,
    ArbitraryEqual,
}

impl Operator {
    fn symbol(&self) -> &'static str {
        match self {
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::LessEqual => "<=",
            Operator::GreaterEqual => ">=",
            Operator::Less => "<",
            Operator::Greater => ">",
            Operator::Compatible => "~=",
            Operator::ArbitraryEqual => "===",
        }
    }
}

/// One version clause such as `==3.20.3`, `>=1.0` or `==1.2.*`.
#[derive(Debug, Clone)]
pub struct Specifier {
    pub op: Operator,
    pub version: Version,
    pub wildcard: bool,
}

impl Specifier {
    /// An exact pin: `==` without a trailing `.*`.
    pub fn is_pin(&self) -> bool {
        self.op == Operator::Equal && !self.wildcard
    }

    pub fn contains(&self, candidate: &Version) -> bool {
        match self.op {
            Operator::Equal if self.wildcard => candidate.has_prefix(self.version.release()),
            Operator::NotEqual if self.wildcard => !candidate.has_prefix(self.version.release()),
            Operator::Equal => candidate == &self.version,
            Operator::NotEqual => candidate != &self.version,
            Operator::LessEqual => candidate <= &self.version,
            Operator::GreaterEqual => candidate >= &self.version,
            Operator::Less => candidate < &self.version,
            Operator::Greater => candidate > &self.version,
            Operator::Compatible => {
                let release = self.version.release();
                let prefix = &release[..release.len().saturating_sub(1).max(1)];
                candidate >= &self.version && candidate.has_prefix(prefix)
            }
            Operator::ArbitraryEqual => candidate.as_str() == self.version.as_str(),
        }
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.symbol(), self.version)?;
        if self.wildcard {
            f.write_str(".*")?;
        }
        Ok(())
    }
}

impl FromStr for Specifier {
    type Err = ManifestError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let clause = input.trim();
        let op = [
            ("===", Operator::ArbitraryEqual),
            ("~=", Operator::Compatible),
            ("==", Operator::Equal),
            ("!=", Operator::NotEqual),
            ("<=", Operator::LessEqual),
            (">=", Operator::GreaterEqual),
            ("<", Operator::Less),
            (">", Operator::Greater),
        ]
        .into_iter()
        .find(|(symbol, _)| clause.starts_with(symbol));

        let (symbol, op) = op.ok_or_else(|| ManifestError::InvalidSpecifier(clause.to_string()))?;
        let mut version = clause[symbol.len()..].trim();

        let wildcard = version.ends_with(".*");
        if wildcard {
            if !matches!(op, Operator::Equal | Operator::NotEqual) {
                return Err(ManifestError::InvalidSpecifier(clause.to_string()));
            }
            version = &version[..version.len() - 2];
        }
        if op == Operator::Compatible && !version.contains('.') {
            return Err(ManifestError::InvalidSpecifier(clause.to_string()));
        }

        Ok(Self {
            op,
            version: version.parse()?,
            wildcard,
        })
    }
}

/// A parsed manifest line: `name[extras] specifiers ; marker`.
#[derive(Debug, Clone)]
pub struct Requirement {
    pub name: String,
    pub extras: Vec<String>,
    pub specifiers: Vec<Specifier>,
    pub marker: Option<Marker>,
}

/// Lower-cases and collapses runs of `-`, `_` and `.` so `Streamlit_Extras`
/// and `streamlit-extras` name the same package.
pub fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                normalized.push('-');
            }
            in_separator = true;
        } else {
            normalized.push(c.to_ascii_lowercase());
            in_separator = false;
        }
    }
    normalized
}

impl Requirement {
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }

    pub fn pin(&self) -> Option<&Version> {
        self.specifiers.iter().find(|s| s.is_pin()).map(|s| &s.version)
    }

    pub fn is_conditional(&self) -> bool {
        self.marker.is_some()
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.extras.is_empty() {
            write!(f, "[{}]", self.extras.join(","))?;
        }
        let specs: Vec<String> = self.specifiers.iter().map(|s| s.to_string()).collect();
        f.write_str(&specs.join(","))?;
        if let Some(marker) = &self.marker {
            write!(f, "; {}", marker)?;
        }
        Ok(())
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

impl FromStr for Requirement {
    type Err = ManifestError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (body, marker) = match input.split_once(';') {
            Some((body, marker)) => (body.trim(), Some(marker.parse::<Marker>()?)),
            None => (input.trim(), None),
        };

        if body.contains('@') {
            return Err(ManifestError::DirectReference(body.to_string()));
        }

        let name_end = body.find(|c: char| !is_name_char(c)).unwrap_or(body.len());
        let name = &body[..name_end];
        if name.is_empty() {
            return Err(ManifestError::InvalidName(body.to_string()));
        }
        if !name.starts_with(|c: char| c.is_ascii_alphanumeric()) || !name.ends_with(|c: char| c.is_ascii_alphanumeric()) {
            return Err(ManifestError::InvalidName(name.to_string()));
        }

        let mut rest = body[name_end..].trim_start();

        let mut extras = Vec::new();
        if let Some(tail) = rest.strip_prefix('[') {
            let close = tail
                .find(']')
                .ok_or_else(|| ManifestError::InvalidName(format!("unclosed extras in `{}`", body)))?;
            for extra in tail[..close].split(',').map(str::trim).filter(|e| !e.is_empty()) {
                if !extra.chars().all(is_name_char) {
                    return Err(ManifestError::InvalidName(extra.to_string()));
                }
                extras.push(extra.to_string());
            }
            rest = tail[close + 1..].trim_start();
        }

        if let Some(tail) = rest.strip_prefix('(') {
            rest = tail
                .strip_suffix(')')
                .ok_or_else(|| ManifestError::InvalidSpecifier(rest.to_string()))?;
        }

        let specifiers = if rest.trim().is_empty() {
            Vec::new()
        } else {
            rest.split(',')
                .map(|clause| clause.parse::<Specifier>())
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(Self {
            name: name.to_string(),
            extras,
            specifiers,
            marker,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pinned_with_marker() {
        let req: Requirement = "protobuf==3.20.2; sys_platform == 'darwin' and platform_machine != 'arm64'"
            .parse()
            .unwrap();
        assert_eq!(req.name, "protobuf");
        assert_eq!(req.pin().map(|v| v.to_string()), Some("3.20.2".to_string()));
        assert!(req.is_conditional());
    }

    #[test]
    fn test_parse_extras_and_ranges() {
        let req: Requirement = "unstructured[pdf, local-inference] >=0.10, <0.11".parse().unwrap();
        assert_eq!(req.extras, vec!["pdf", "local-inference"]);
        assert_eq!(req.specifiers.len(), 2);
        assert!(req.pin().is_none());
        assert!(!req.is_conditional());
    }

    #[test]
    fn test_bare_name() {
        let req: Requirement = "InstructorEmbedding".parse().unwrap();
        assert!(req.specifiers.is_empty());
        assert_eq!(req.normalized_name(), "instructorembedding");
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("Streamlit_Extras"), "streamlit-extras");
        assert_eq!(normalize_name("pdfminer.six"), "pdfminer-six");
        assert_eq!(normalize_name("a--_.b"), "a-b");
    }

    #[test]
    fn test_rejects_invalid_lines() {
        assert!("==1.0".parse::<Requirement>().is_err());
        assert!("torch @ https://example.invalid/torch.whl".parse::<Requirement>().is_err());
        assert!("langchain=0.0.267".parse::<Requirement>().is_err());
        assert!("langchain==".parse::<Requirement>().is_err());
        assert!("-e .".parse::<Requirement>().is_err());
        assert!("foo; bar == 'x'".parse::<Requirement>().is_err());
        assert!("foo~=1".parse::<Requirement>().is_err());
    }

    #[test]
    fn test_specifier_contains() {
        let v = |s: &str| s.parse::<Version>().unwrap();
        let spec = |s: &str| s.parse::<Specifier>().unwrap();

        assert!(spec("==1.26.*").contains(&v("1.26.6")));
        assert!(!spec("==1.26.*").contains(&v("1.27")));
        assert!(spec("~=2.2").contains(&v("2.9")));
        assert!(!spec("~=2.2").contains(&v("3.0")));
        assert!(spec("~=1.4.5").contains(&v("1.4.9")));
        assert!(!spec("~=1.4.5").contains(&v("1.5.0")));
        assert!(spec("<2").contains(&v("1.26.6")));
        assert!(spec("!=3.20.1").contains(&v("3.20.2")));
    }
}

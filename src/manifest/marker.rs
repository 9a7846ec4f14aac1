use std::fmt;
use std::str::FromStr;

use super::platform::TargetPlatform;
use super::version::Version;
use super::ManifestError;

const VARIABLES: &[&str] = &[
    "os_name",
    "sys_platform",
    "platform_machine",
    "platform_system",
    "platform_release",
    "platform_version",
    "platform_python_implementation",
    "implementation_name",
    "implementation_version",
    "python_version",
    "python_full_version",
    "extra",
];

const VERSION_VARIABLES: &[&str] = &["python_version", "python_full_version", "implementation_version"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerOp {
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Compatible,
    ArbitraryEqual,
    In,
    NotIn,
}

impl fmt::Display for MarkerOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            MarkerOp::Equal => "==",
            MarkerOp::NotEqual => "!=",
            MarkerOp::Less => "<",
            MarkerOp::LessEqual => "<=",
            MarkerOp::Greater => ">",
            MarkerOp::GreaterEqual => ">=",
            MarkerOp::Compatible => "~=",
            MarkerOp::ArbitraryEqual => "===",
            MarkerOp::In => "in",
            MarkerOp::NotIn => "not in",
        };
        f.write_str(op)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerValue {
    Variable(String),
    Literal(String),
}

impl MarkerValue {
    fn resolve<'a>(&'a self, platform: &'a TargetPlatform) -> &'a str {
        match self {
            MarkerValue::Variable(name) => platform.variable(name),
            MarkerValue::Literal(value) => value,
        }
    }

    fn is_version_variable(&self) -> bool {
        matches!(self, MarkerValue::Variable(name) if VERSION_VARIABLES.contains(&name.as_str()))
    }
}

impl fmt::Display for MarkerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerValue::Variable(name) => f.write_str(name),
            MarkerValue::Literal(value) => write!(f, "'{}'", value),
        }
    }
}

/// Environment marker expression, the part of a requirement after `;`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    Compare {
        lhs: MarkerValue,
        op: MarkerOp,
        rhs: MarkerValue,
    },
    And(Box<Marker>, Box<Marker>),
    Or(Box<Marker>, Box<Marker>),
}

impl Marker {
    pub fn evaluate(&self, platform: &TargetPlatform) -> bool {
        match self {
            Marker::And(a, b) => a.evaluate(platform) && b.evaluate(platform),
            Marker::Or(a, b) => a.evaluate(platform) || b.evaluate(platform),
            Marker::Compare { lhs, op, rhs } => {
                let left = lhs.resolve(platform);
                let right = rhs.resolve(platform);
                if lhs.is_version_variable() || rhs.is_version_variable() {
                    if let Some(result) = compare_versions(left, *op, right) {
                        return result;
                    }
                }
                compare_strings(left, *op, right)
            }
        }
    }
}

fn compare_versions(left: &str, op: MarkerOp, right: &str) -> Option<bool> {
    if matches!(op, MarkerOp::In | MarkerOp::NotIn | MarkerOp::ArbitraryEqual) {
        return None;
    }
    let l: Version = left.parse().ok()?;
    let r: Version = right.parse().ok()?;
    Some(match op {
        MarkerOp::Equal => l == r,
        MarkerOp::NotEqual => l != r,
        MarkerOp::Less => l < r,
        MarkerOp::LessEqual => l <= r,
        MarkerOp::Greater => l > r,
        MarkerOp::GreaterEqual => l >= r,
        MarkerOp::Compatible => {
            let prefix = &r.release()[..r.release().len().saturating_sub(1).max(1)];
            l >= r && l.has_prefix(prefix)
        }
        MarkerOp::In | MarkerOp::NotIn | MarkerOp::ArbitraryEqual => return None,
    })
}

fn compare_strings(left: &str, op: MarkerOp, right: &str) -> bool {
    match op {
        MarkerOp::Equal | MarkerOp::ArbitraryEqual => left == right,
        MarkerOp::NotEqual => left != right,
        MarkerOp::Less => left < right,
        MarkerOp::LessEqual => left <= right,
        MarkerOp::Greater => left > right,
        MarkerOp::GreaterEqual => left >= right,
        MarkerOp::In => right.contains(left),
        MarkerOp::NotIn => !right.contains(left),
        MarkerOp::Compatible => false,
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Marker::Compare { lhs, op, rhs } => write!(f, "{} {} {}", lhs, op, rhs),
            Marker::And(a, b) => {
                let wrap = |m: &Marker| match m {
                    Marker::Or(..) => format!("({})", m),
                    _ => m.to_string(),
                };
                write!(f, "{} and {}", wrap(a), wrap(b))
            }
            Marker::Or(a, b) => write!(f, "{} or {}", a, b),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    Op(MarkerOp),
    And,
    Or,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ManifestError> {
    let err = |reason: String| ManifestError::InvalidMarker(format!("{} in `{}`", reason, input));
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '\'' | '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or_else(|| err("unterminated string".to_string()))?;
                tokens.push(Token::Str(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            '=' | '!' | '<' | '>' | '~' => {
                let rest: String = chars[i..chars.len().min(i + 3)].iter().collect();
                let (op, len) = if rest.starts_with("===") {
                    (MarkerOp::ArbitraryEqual, 3)
                } else if rest.starts_with("==") {
                    (MarkerOp::Equal, 2)
                } else if rest.starts_with("!=") {
                    (MarkerOp::NotEqual, 2)
                } else if rest.starts_with("<=") {
                    (MarkerOp::LessEqual, 2)
                } else if rest.starts_with(">=") {
                    (MarkerOp::GreaterEqual, 2)
                } else if rest.starts_with("~=") {
                    (MarkerOp::Compatible, 2)
                } else if rest.starts_with('<') {
                    (MarkerOp::Less, 1)
                } else if rest.starts_with('>') {
                    (MarkerOp::Greater, 1)
                } else {
                    return Err(err(format!("unexpected `{}`", c)));
                };
                tokens.push(Token::Op(op));
                i += len;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                match word.as_str() {
                    "and" => tokens.push(Token::And),
                    "or" => tokens.push(Token::Or),
                    "in" => tokens.push(Token::Op(MarkerOp::In)),
                    "not" => {
                        // `not` is only valid as the first half of `not in`.
                        let mut j = i;
                        while j < chars.len() && chars[j].is_whitespace() {
                            j += 1;
                        }
                        let word_ends = chars
                            .get(j + 2)
                            .map_or(true, |ch| !(ch.is_ascii_alphanumeric() || *ch == '_'));
                        if chars.get(j) == Some(&'i') && chars.get(j + 1) == Some(&'n') && word_ends {
                            i = j + 2;
                            tokens.push(Token::Op(MarkerOp::NotIn));
                        } else {
                            return Err(err("`not` must be followed by `in`".to_string()));
                        }
                    }
                    _ => tokens.push(Token::Ident(word)),
                }
            }
            other => return Err(err(format!("unexpected `{}`", other))),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    source: String,
}

impl Parser {
    fn error(&self, reason: &str) -> ManifestError {
        ManifestError::InvalidMarker(format!("{} in `{}`", reason, self.source))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn parse_or(&mut self) -> Result<Marker, ManifestError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let right = self.parse_and()?;
            left = Marker::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Marker, ManifestError> {
        let mut left = self.parse_atom()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let right = self.parse_atom()?;
            left = Marker::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_atom(&mut self) -> Result<Marker, ManifestError> {
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            let inner = self.parse_or()?;
            if self.next() != Some(Token::RParen) {
                return Err(self.error("missing `)`"));
            }
            return Ok(inner);
        }

        let lhs = self.parse_value()?;
        let op = match self.next() {
            Some(Token::Op(op)) => op,
            _ => return Err(self.error("expected a comparison operator")),
        };
        let rhs = self.parse_value()?;

        if matches!(lhs, MarkerValue::Literal(_)) && matches!(rhs, MarkerValue::Literal(_)) {
            return Err(self.error("comparison needs a marker variable"));
        }

        Ok(Marker::Compare { lhs, op, rhs })
    }

    fn parse_value(&mut self) -> Result<MarkerValue, ManifestError> {
        match self.next() {
            Some(Token::Str(value)) => Ok(MarkerValue::Literal(value)),
            Some(Token::Ident(name)) => {
                if VARIABLES.contains(&name.as_str()) {
                    Ok(MarkerValue::Variable(name))
                } else {
                    Err(self.error(&format!("unknown marker variable `{}`", name)))
                }
            }
            _ => Err(self.error("expected a marker variable or quoted string")),
        }
    }
}

impl FromStr for Marker {
    type Err = ManifestError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(ManifestError::InvalidMarker("empty marker".to_string()));
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            source: input.trim().to_string(),
        };
        let marker = parser.parse_or()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("unexpected trailing tokens"));
        }
        Ok(marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn platform(os: &str, machine: &str) -> TargetPlatform {
        TargetPlatform::new(os, machine).unwrap()
    }

    #[test]
    fn test_platform_partition_markers() {
        let not_mac: Marker = "sys_platform != 'darwin'".parse().unwrap();
        let mac_intel: Marker = "sys_platform == 'darwin' and platform_machine != 'arm64'".parse().unwrap();
        let mac_arm: Marker = "sys_platform == 'darwin' and platform_machine == 'arm64'".parse().unwrap();

        let linux = platform("linux", "x86_64");
        let intel = platform("darwin", "x86_64");
        let arm = platform("darwin", "arm64");

        assert!(not_mac.evaluate(&linux));
        assert!(!mac_intel.evaluate(&linux));
        assert!(mac_intel.evaluate(&intel));
        assert!(!mac_arm.evaluate(&intel));
        assert!(mac_arm.evaluate(&arm));
        assert!(!not_mac.evaluate(&arm));
    }

    #[test]
    fn test_or_binds_looser_than_and() {
        let marker: Marker = "sys_platform == 'win32' or sys_platform == 'darwin' and platform_machine == 'arm64'"
            .parse()
            .unwrap();
        assert!(marker.evaluate(&platform("win32", "AMD64")));
        assert!(!marker.evaluate(&platform("darwin", "x86_64")));
        assert!(marker.evaluate(&platform("darwin", "arm64")));
    }

    #[test]
    fn test_parentheses_and_in() {
        let marker: Marker = "(sys_platform == \"linux\" or sys_platform == \"win32\") and 'arm' not in platform_machine"
            .parse()
            .unwrap();
        assert!(marker.evaluate(&platform("linux", "x86_64")));
        assert!(!marker.evaluate(&platform("darwin", "x86_64")));
    }

    #[test]
    fn test_python_version_compares_as_version() {
        let marker: Marker = "python_version >= '3.9'".parse().unwrap();
        let mut p = platform("linux", "x86_64");
        p.python_version = "3.10".to_string();
        assert!(marker.evaluate(&p));
        p.python_version = "3.8".to_string();
        assert!(!marker.evaluate(&p));
    }

    #[test]
    fn test_rejects_bad_markers() {
        assert!("".parse::<Marker>().is_err());
        assert!("sys_platform".parse::<Marker>().is_err());
        assert!("os == 'nt'".parse::<Marker>().is_err());
        assert!("sys_platform == 'linux".parse::<Marker>().is_err());
        assert!("(sys_platform == 'linux'".parse::<Marker>().is_err());
        assert!("'a' == 'b'".parse::<Marker>().is_err());
    }

    #[test]
    fn test_display_round_trips_meaning() {
        let marker: Marker = "sys_platform == 'darwin' and (platform_machine == 'arm64' or platform_machine == 'aarch64')"
            .parse()
            .unwrap();
        let reparsed: Marker = marker.to_string().parse().unwrap();
        assert_eq!(marker, reparsed);
    }
}

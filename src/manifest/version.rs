use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::ManifestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PreRelease {
    Alpha,
    Beta,
    Candidate,
}

/// A release version as written in a requirement (`1.26.6`, `2.0rc1`, `20221105`).
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    release: Vec<u64>,
    pre: Option<(PreRelease, u64)>,
    post: Option<u64>,
    dev: Option<u64>,
}

impl Version {
    pub fn release(&self) -> &[u64] {
        &self.release
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// `true` when `self` starts with every release segment of `prefix`.
    pub fn has_prefix(&self, prefix: &[u64]) -> bool {
        prefix.iter().enumerate().all(|(i, part)| self.release.get(i).copied().unwrap_or(0) == *part)
    }

    fn phase(&self) -> (i8, u8, u64) {
        match (&self.pre, self.post, self.dev) {
            (None, None, Some(_)) => (-1, 0, 0),
            (Some((kind, n)), _, _) => (0, *kind as u8, *n),
            _ => (1, 0, 0),
        }
    }
}

fn take_number(s: &str) -> (Option<u64>, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return (None, s);
    }
    (s[..end].parse().ok(), &s[end..])
}

fn strip_separator(s: &str) -> &str {
    s.strip_prefix(['.', '-', '_']).unwrap_or(s)
}

impl FromStr for Version {
    type Err = ManifestError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || ManifestError::InvalidVersion(input.to_string());
        let raw = input.trim();
        let lowered = raw.to_ascii_lowercase();
        let mut rest = lowered.strip_prefix('v').unwrap_or(&lowered);

        // Epochs are accepted and ignored; local labels do not take part in ordering.
        if let Some(idx) = rest.find('!') {
            rest = &rest[idx + 1..];
        }
        if let Some(idx) = rest.find('+') {
            rest = &rest[..idx];
        }

        let mut release = Vec::new();
        loop {
            let (number, tail) = take_number(rest);
            let number = number.ok_or_else(invalid)?;
            release.push(number);
            rest = tail;
            match rest.strip_prefix('.') {
                Some(tail) if tail.starts_with(|c: char| c.is_ascii_digit()) => rest = tail,
                _ => break,
            }
        }

        let mut pre = None;
        let mut post = None;
        let mut dev = None;

        let candidate = strip_separator(rest);
        for (label, kind) in [
            ("alpha", PreRelease::Alpha),
            ("beta", PreRelease::Beta),
            ("rc", PreRelease::Candidate),
            ("a", PreRelease::Alpha),
            ("b", PreRelease::Beta),
            ("c", PreRelease::Candidate),
        ] {
            if let Some(tail) = candidate.strip_prefix(label) {
                let (number, tail) = take_number(strip_separator(tail));
                pre = Some((kind, number.unwrap_or(0)));
                rest = tail;
                break;
            }
        }

        let candidate = strip_separator(rest);
        if let Some(tail) = candidate.strip_prefix("post") {
            let (number, tail) = take_number(strip_separator(tail));
            post = Some(number.unwrap_or(0));
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix('-') {
            let (number, tail) = take_number(tail);
            if number.is_some() {
                post = number;
                rest = tail;
            }
        }

        let candidate = strip_separator(rest);
        if let Some(tail) = candidate.strip_prefix("dev") {
            let (number, tail) = take_number(tail);
            dev = Some(number.unwrap_or(0));
            rest = tail;
        }

        if !rest.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            raw: raw.to_string(),
            release,
            pre,
            post,
            dev,
        })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.release.len().max(other.release.len());
        for i in 0..len {
            let a = self.release.get(i).copied().unwrap_or(0);
            let b = other.release.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }

        self.phase()
            .cmp(&other.phase())
            .then_with(|| self.post.cmp(&other.post))
            .then_with(|| {
                let key = |v: &Version| (v.dev.is_none(), v.dev.unwrap_or(0));
                key(self).cmp(&key(other))
            })
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

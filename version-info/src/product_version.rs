use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::DescriptorIssue;

/// A product version string such as `0.7` or `1.0beta4`.
///
/// Numeric components compare numerically with missing trailing components
/// treated as zero, so `1.0` and `1.0.0` are equal. A pre-release tag sorts
/// before the plain release with the same numbers.
#[derive(Debug, Clone, Serialize)]
pub struct ProductVersion {
    numbers: Vec<u32>,
    pre: Option<PreRelease>,
}

/// `beta4` in `1.0beta4`. A bare tag such as `beta` has no number and sorts
/// before any numbered one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct PreRelease {
    pub tag: String,
    pub number: Option<u32>,
}

impl ProductVersion {
    pub fn parse(text: &str) -> Result<Self, DescriptorIssue> {
        let bad = || DescriptorIssue::BadVersion(text.to_string());

        let split = text
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(text.len());
        let (numeric, suffix) = text.split_at(split);

        if numeric.is_empty() {
            return Err(bad());
        }
        let numbers = numeric
            .split('.')
            .map(|part| part.parse::<u32>().map_err(|_| bad()))
            .collect::<Result<Vec<_>, _>>()?;

        let pre = if suffix.is_empty() {
            None
        } else {
            let digits = suffix
                .find(|c: char| c.is_ascii_digit())
                .unwrap_or(suffix.len());
            let (tag, number) = suffix.split_at(digits);
            if !tag.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(bad());
            }
            let number = if number.is_empty() {
                None
            } else {
                Some(number.parse::<u32>().map_err(|_| bad())?)
            };
            Some(PreRelease {
                tag: tag.to_ascii_lowercase(),
                number,
            })
        };

        Ok(Self { numbers, pre })
    }

    pub fn numbers(&self) -> &[u32] {
        &self.numbers
    }

    pub fn pre_release(&self) -> Option<&PreRelease> {
        self.pre.as_ref()
    }

    fn component(&self, index: usize) -> u32 {
        self.numbers.get(index).copied().unwrap_or(0)
    }
}

impl FromStr for ProductVersion {
    type Err = DescriptorIssue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ProductVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let numbers: Vec<String> = self.numbers.iter().map(u32::to_string).collect();
        write!(f, "{}", numbers.join("."))?;
        if let Some(pre) = &self.pre {
            write!(f, "{}", pre.tag)?;
            if let Some(number) = pre.number {
                write!(f, "{}", number)?;
            }
        }
        Ok(())
    }
}

impl Ord for ProductVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.numbers.len().max(other.numbers.len());
        for i in 0..len {
            match self.component(i).cmp(&other.component(i)) {
                Ordering::Equal => {}
                unequal => return unequal,
            }
        }
        match (&self.pre, &other.pre) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for ProductVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ProductVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ProductVersion {}

use std::fmt::{self, Display};
use std::str::FromStr;
use std::time::Duration;

use crate::error::CatalogError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Unit {
    Millis,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl Unit {
    fn millis(self) -> u64 {
        match self {
            Unit::Millis => 1,
            Unit::Seconds => 1_000,
            Unit::Minutes => 60_000,
            Unit::Hours => 3_600_000,
            Unit::Days => 86_400_000,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Unit::Millis => "ms",
            Unit::Seconds => "s",
            Unit::Minutes => "T",
            Unit::Hours => "H",
            Unit::Days => "D",
        }
    }
}

/// A sampling or partitioning interval written the way time series
/// libraries do: `1s`, `2S`, `1T` (minute), `1H`, `8H`, `1D`, `500ms`.
///
/// The count may be omitted (`H` is one hour) but must not be zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frequency {
    count: u64,
    unit: Unit,
}

impl Frequency {
    pub fn new(count: u64, unit: Unit) -> Self {
        Self { count, unit }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn as_millis(&self) -> u64 {
        self.count.saturating_mul(self.unit.millis())
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.as_millis())
    }
}

impl FromStr for Frequency {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CatalogError::Frequency(s.to_string());

        let split = s.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
        let (digits, suffix) = s.split_at(split);

        let count = match digits {
            "" => 1,
            digits => digits.parse::<u64>().map_err(|_| invalid())?,
        };

        let unit = match suffix {
            "ms" | "L" => Unit::Millis,
            "s" | "S" => Unit::Seconds,
            "T" | "min" => Unit::Minutes,
            "h" | "H" => Unit::Hours,
            "d" | "D" => Unit::Days,
            _ => return Err(invalid()),
        };

        if count == 0 || count.checked_mul(unit.millis()).is_none() {
            return Err(invalid());
        }

        Ok(Self { count, unit })
    }
}

impl Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.suffix())
    }
}

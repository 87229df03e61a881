//! Log-sequence-number type, encoded in the canonical Postgres `X/Y` form.
//!
//! Ported from the teacher's `logical_replication::message::Lsn`, trimmed to
//! the string <-> integer conversions the replay engine and sentinel need;
//! the raw replication-protocol wire parsing that type also carried is out of
//! scope here (the logical-decoding producer is an external collaborator).

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, PartialOrd, Ord, Hash)]
pub struct Lsn(pub u64);

impl Lsn {
    pub const INVALID: Lsn = Lsn(0);

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

impl FromStr for Lsn {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('/');
        let hi = parts
            .next()
            .ok_or_else(|| anyhow::anyhow!("malformed LSN: {s}"))?;
        let lo = parts
            .next()
            .ok_or_else(|| anyhow::anyhow!("malformed LSN: {s}"))?;
        if parts.next().is_some() {
            anyhow::bail!("malformed LSN: {s}");
        }
        let hi = u64::from_str_radix(hi, 16)?;
        let lo = u64::from_str_radix(lo, 16)?;
        Ok(Lsn((hi << 32) | lo))
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.0 >> 32, self.0 & 0xFFFF_FFFF)
    }
}

impl From<u64> for Lsn {
    fn from(val: u64) -> Self {
        Lsn(val)
    }
}

impl From<Lsn> for u64 {
    fn from(lsn: Lsn) -> Self {
        lsn.0
    }
}

impl serde::Serialize for Lsn {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Lsn {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

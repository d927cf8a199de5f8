//! Notification channels partitioning the queue.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Independent digest stream. Every queue operation is scoped to exactly one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    /// Payment due from consignor to expeditor.
    ConsignorToExpeditor,
    /// Payment due from general contractor to carrier.
    GpToCarrier,
    /// Payment due from expeditor to carrier.
    ExpeditorToCarrier,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown channel: {0}")]
pub struct ParseChannelError(pub String);

impl Channel {
    pub const ALL: [Channel; 3] = [
        Channel::ConsignorToExpeditor,
        Channel::GpToCarrier,
        Channel::ExpeditorToCarrier,
    ];

    /// Persisted discriminator stored in the `channel` column.
    pub fn code(self) -> &'static str {
        match self {
            Self::ConsignorToExpeditor => "consignor-expeditor",
            Self::GpToCarrier => "gp-carrier",
            Self::ExpeditorToCarrier => "expeditor-carrier",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Channel {
    type Err = ParseChannelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.code() == s)
            .ok_or_else(|| ParseChannelError(s.to_owned()))
    }
}

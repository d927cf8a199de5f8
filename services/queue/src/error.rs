use paynotify_domain::id::{ClientId, JobId, OrderId};

/// Queue service domain error variants.
#[derive(Debug, thiserror::Error)]
pub enum QueueServiceError {
    #[error("order {order_id} is already queued for client {client_id}")]
    AlreadyQueued {
        order_id: OrderId,
        client_id: ClientId,
    },
    #[error("invalid lock threshold {0}: must be at least 1")]
    InvalidLockThreshold(i32),
    #[error("job {0} not found")]
    JobNotFound(JobId),
    #[error("queue row {id} is corrupt: {reason}")]
    CorruptRow { id: i64, reason: String },
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl QueueServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AlreadyQueued { .. } => "ALREADY_QUEUED",
            Self::InvalidLockThreshold(_) => "INVALID_LOCK_THRESHOLD",
            Self::JobNotFound(_) => "JOB_NOT_FOUND",
            Self::CorruptRow { .. } => "CORRUPT_ROW",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

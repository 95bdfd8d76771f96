/// Job identifiers are opaque strings assigned by the backend at creation.
pub type JobId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

use std::collections::BTreeMap;

/// One log entry in the shape the CLS producer ships: a nanosecond
/// timestamp and flat string contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClsLog {
    pub time_ns: i64,
    pub contents: BTreeMap<String, String>,
}

impl ClsLog {
    pub fn new(time_ns: i64, contents: BTreeMap<String, String>) -> Self {
        ClsLog { time_ns, contents }
    }
}

/// A single send attempt reported back by the producer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attempt {
    pub success: bool,
    pub request_id: String,
    pub error_code: String,
    pub error_message: String,
    pub timestamp_ms: i64,
}

/// Final outcome of a batch delivery, handed to the send callback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendResult {
    pub successful: bool,
    pub attempts: Vec<Attempt>,
}

impl SendResult {
    pub fn success() -> Self {
        SendResult {
            successful: true,
            attempts: Vec::new(),
        }
    }

    pub fn failure(error_code: impl Into<String>, error_message: impl Into<String>) -> Self {
        SendResult {
            successful: false,
            attempts: vec![Attempt {
                success: false,
                error_code: error_code.into(),
                error_message: error_message.into(),
                ..Attempt::default()
            }],
        }
    }
}

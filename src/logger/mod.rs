//! Session logging: JSONL + plain text on a dedicated thread, with retention.

pub mod dual;
pub mod jsonl;
pub mod retention;

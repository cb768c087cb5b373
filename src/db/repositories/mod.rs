pub mod kv;
pub mod lots;

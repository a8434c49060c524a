// tasklive-common: wire protocol and domain types shared by the relay and its clients

pub mod protocol;
pub mod types;

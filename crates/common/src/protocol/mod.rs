// Wire protocol shared by the relay and its clients.

pub mod events;
pub mod ws;

pub mod hook;
pub mod jwt;
pub mod middleware;

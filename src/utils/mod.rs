pub mod connection;
pub mod naming;
pub mod process;

pub mod current;
pub mod locator;
pub mod parse;
pub mod poller;
pub mod runner;

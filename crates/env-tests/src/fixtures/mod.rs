//! Test fixtures for interacting with cluster services.

pub mod greeting_client;
pub mod users;

pub use greeting_client::{Greeting, GreetingClient, GreetingClientError};

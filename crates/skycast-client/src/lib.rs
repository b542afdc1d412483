pub mod agents;
pub mod http;
pub mod mock;

pub use agents::{cheapest, find_agent};
pub use http::HttpBackend;
pub use mock::{MockDirectory, MockResponder, MockResponse};

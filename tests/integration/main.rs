//! Integration tests: full refresh runs and the HTTP surface, wired to a
//! mock football provider and the in-memory store.

mod mock_football;
mod pipeline;
mod server;

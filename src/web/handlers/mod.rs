//! HTTP request handlers for the AgentDbg viewer API.

pub mod runs;

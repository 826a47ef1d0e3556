//! Browserless acquisition: the HTTP half of a session.

pub mod http_client;

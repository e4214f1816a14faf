//! OAuth 2.0 authorization-code and refresh flows against the Microsoft
//! identity platform.
//!
//! [`MicrosoftClient`] speaks the token protocol, [`TerminalAuthorizer`] is the
//! copy-and-paste human step, and [`TokenAcquisitionEngine`] decides which of
//! them a run actually needs.

pub mod client;
pub mod engine;
pub mod interactive;
pub mod pkce;
pub mod xoauth2;

pub use client::{Endpoints, MicrosoftClient};
pub use engine::TokenAcquisitionEngine;
pub use interactive::{
    LineSource, ReaderLines, StdinLines, TerminalAuthorizer, parse_redirect_response,
};
pub use xoauth2::auth_string;

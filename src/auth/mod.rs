//! Azure AD authentication module.
//!
//! Provides OAuth2 grants against Azure AD, browser-based interactive
//! sign-in, a token cache and the token acquirer built on top of them.

pub mod callback_server;
pub mod interactive;
pub mod oauth;
pub mod token_cache;
pub mod token_manager;

pub use interactive::{BrowserPrompt, InteractivePrompt};
pub use oauth::{OAuth2Client, TokenEndpoint, TokenResponse};
pub use token_cache::TokenCache;
pub use token_manager::{PromptBehavior, Token, TokenAcquirer};

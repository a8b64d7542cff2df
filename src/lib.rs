pub mod chat;
pub mod completion;
pub mod config;
pub mod constants;
pub mod prompt;
pub mod session;
pub mod session_store;
pub mod web_server;
pub mod zodiac;

pub use completion::{CompletionClient, DeepSeekClient};
pub use config::{Credential, CredentialResolver};
pub use prompt::{build_system_prompt, UserProfile};
pub use session::{Message, ProfileForm, Role, SessionError, SessionPhase, SessionState};
pub use zodiac::{classify, Constellation, Element};

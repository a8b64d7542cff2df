//! Per-visitor conversation state.
//!
//! A session moves `Empty -> ProfileConfirmed -> Conversing` and back to
//! `Empty` on reset. All mutation goes through [`SessionState::confirm_profile`],
//! [`SessionState::submit_turn`] and [`SessionState::reset`]; a rejected
//! transition leaves the state untouched.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::completion::CompletionClient;
use crate::prompt::{build_system_prompt, UserProfile};
use crate::zodiac::{Constellation, UnknownConstellation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat message, serialised in the OpenAI wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Append-only message log. Only this module can push to it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    fn clear(&mut self) {
        self.messages.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Empty,
    ProfileConfirmed,
    Conversing,
}

/// Raw profile input as submitted by a form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileForm {
    pub name: String,
    pub constellation: String,
    pub birth_date: String,
    pub birth_time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("请至少选择你的星座！")]
    MissingConstellation,
    #[error(transparent)]
    UnknownConstellation(#[from] UnknownConstellation),
    #[error("星盘信息已确认，请先重新设置")]
    AlreadyConfirmed,
    #[error("请先在左侧填写星盘信息")]
    ProfileRequired,
    #[error("消息不能为空")]
    EmptyMessage,
}

impl ProfileForm {
    fn into_profile(self) -> Result<UserProfile, SessionError> {
        let constellation = self.constellation.trim();
        if constellation.is_empty() {
            return Err(SessionError::MissingConstellation);
        }
        let constellation: Constellation = constellation.parse()?;

        let optional = |v: String| {
            let v = v.trim().to_string();
            (!v.is_empty()).then_some(v)
        };
        let profile = UserProfile {
            name: self.name.trim().to_string(),
            constellation: Some(constellation),
            birth_date: optional(self.birth_date),
            birth_time: optional(self.birth_time),
        };
        Ok(UserProfile {
            name: profile.display_name().to_string(),
            ..profile
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    profile: UserProfile,
    transcript: Transcript,
    system_prompt: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn phase(&self) -> SessionPhase {
        if !self.profile.is_complete() {
            SessionPhase::Empty
        } else if self.transcript.len() > 1 {
            SessionPhase::Conversing
        } else {
            SessionPhase::ProfileConfirmed
        }
    }

    /// Profile confirmed and nothing said yet.
    pub fn is_fresh(&self) -> bool {
        self.phase() == SessionPhase::ProfileConfirmed
    }

    /// Transcript entries shown to the user; the system prompt stays hidden.
    pub fn visible_messages(&self) -> impl Iterator<Item = &Message> {
        self.transcript
            .messages()
            .iter()
            .filter(|m| m.role != Role::System)
    }

    pub fn confirm_profile(&mut self, form: ProfileForm) -> Result<(), SessionError> {
        if self.profile.is_complete() {
            return Err(SessionError::AlreadyConfirmed);
        }
        let profile = form.into_profile()?;
        let system_prompt = build_system_prompt(&profile);

        info!(
            name = %profile.display_name(),
            constellation = ?profile.constellation,
            "Profile confirmed"
        );
        self.transcript.clear();
        self.transcript.push(Message::system(system_prompt.clone()));
        self.system_prompt = Some(system_prompt);
        self.profile = profile;
        Ok(())
    }

    /// Runs one conversational turn: user message, completion, assistant message.
    pub async fn submit_turn(
        &mut self,
        text: &str,
        client: &dyn CompletionClient,
    ) -> Result<&Message, SessionError> {
        if !self.profile.is_complete() {
            return Err(SessionError::ProfileRequired);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        self.transcript.push(Message::user(text));
        debug!(messages = self.transcript.len(), "Requesting reply");
        let reply = client.get_reply(self.transcript.messages()).await;
        self.transcript.push(Message::assistant(reply));

        Ok(&self.transcript.messages()[self.transcript.len() - 1])
    }

    pub fn reset(&mut self) {
        info!("Session reset");
        self.profile = UserProfile::default();
        self.transcript.clear();
        self.system_prompt = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Echoes the transcript length and remembers every transcript it saw.
    #[derive(Default)]
    struct RecordingClient {
        seen: Mutex<Vec<Vec<Message>>>,
    }

    #[async_trait]
    impl CompletionClient for RecordingClient {
        async fn get_reply(&self, transcript: &[Message]) -> String {
            self.seen.lock().unwrap().push(transcript.to_vec());
            format!("reply #{}", transcript.len())
        }
    }

    fn form(name: &str, constellation: &str) -> ProfileForm {
        ProfileForm {
            name: name.to_string(),
            constellation: constellation.to_string(),
            ..ProfileForm::default()
        }
    }

    #[test]
    fn test_new_session_is_empty() {
        let state = SessionState::new();
        assert_eq!(state.phase(), SessionPhase::Empty);
        assert!(state.transcript().is_empty());
        assert!(state.system_prompt().is_none());
    }

    #[test]
    fn test_confirm_without_constellation_is_rejected() {
        let mut state = SessionState::new();
        let err = state.confirm_profile(form("Alex", "")).unwrap_err();
        assert_eq!(err, SessionError::MissingConstellation);
        assert_eq!(err.to_string(), "请至少选择你的星座！");
        assert_eq!(state, SessionState::new());
    }

    #[test]
    fn test_confirm_with_unknown_constellation_is_rejected() {
        let mut state = SessionState::new();
        let err = state.confirm_profile(form("Alex", "Leo")).unwrap_err();
        assert!(matches!(err, SessionError::UnknownConstellation(_)));
        assert_eq!(state, SessionState::new());
    }

    #[test]
    fn test_confirm_creates_system_message() {
        let mut state = SessionState::new();
        state.confirm_profile(form("Alex", "狮子")).unwrap();

        assert_eq!(state.phase(), SessionPhase::ProfileConfirmed);
        assert!(state.is_fresh());
        assert_eq!(state.transcript().len(), 1);
        let first = &state.transcript().messages()[0];
        assert_eq!(first.role, Role::System);
        assert_eq!(Some(first.content.as_str()), state.system_prompt());
        assert!(first.content.contains("亲爱的Alex"));
        assert_eq!(state.visible_messages().count(), 0);
    }

    #[test]
    fn test_confirm_twice_is_rejected() {
        let mut state = SessionState::new();
        state.confirm_profile(form("Alex", "狮子")).unwrap();
        let before = state.clone();

        let err = state.confirm_profile(form("Sam", "双鱼")).unwrap_err();
        assert_eq!(err, SessionError::AlreadyConfirmed);
        assert_eq!(state, before);
    }

    #[test]
    fn test_blank_name_and_optional_fields_are_normalised() {
        let mut state = SessionState::new();
        state
            .confirm_profile(ProfileForm {
                name: "  ".to_string(),
                constellation: "摩羯".to_string(),
                birth_date: " 1992-01-05 ".to_string(),
                birth_time: "".to_string(),
            })
            .unwrap();

        let profile = state.profile();
        assert_eq!(profile.name, "朋友");
        assert_eq!(profile.birth_date.as_deref(), Some("1992-01-05"));
        assert_eq!(profile.birth_time, None);
    }

    #[tokio::test]
    async fn test_turns_append_user_then_assistant() {
        let client = RecordingClient::default();
        let mut state = SessionState::new();
        state.confirm_profile(form("Alex", "狮子")).unwrap();

        let reply = state.submit_turn("我很焦虑", &client).await.unwrap();
        assert_eq!(reply, &Message::assistant("reply #2"));
        assert_eq!(state.transcript().len(), 3);
        assert_eq!(state.phase(), SessionPhase::Conversing);

        state.submit_turn("还是睡不着", &client).await.unwrap();
        let messages = state.transcript().messages();
        assert_eq!(messages.len(), 5);
        assert_eq!(
            messages.iter().map(|m| m.role).collect::<Vec<_>>(),
            vec![Role::System, Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(messages[3].content, "还是睡不着");

        // The client always sees the full transcript ending in the latest user turn.
        let seen = client.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].len(), 4);
        assert_eq!(seen[1][0].role, Role::System);
        assert_eq!(seen[1][3], Message::user("还是睡不着"));
    }

    #[tokio::test]
    async fn test_turn_requires_profile() {
        let client = RecordingClient::default();
        let mut state = SessionState::new();
        let err = state.submit_turn("hello", &client).await.unwrap_err();
        assert_eq!(err, SessionError::ProfileRequired);
        assert!(state.transcript().is_empty());
        assert!(client.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blank_turn_is_rejected() {
        let client = RecordingClient::default();
        let mut state = SessionState::new();
        state.confirm_profile(form("Alex", "狮子")).unwrap();
        let err = state.submit_turn("   ", &client).await.unwrap_err();
        assert_eq!(err, SessionError::EmptyMessage);
        assert_eq!(state.transcript().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_from_every_phase() {
        let client = RecordingClient::default();

        let mut empty = SessionState::new();
        empty.reset();
        assert_eq!(empty, SessionState::new());

        let mut confirmed = SessionState::new();
        confirmed.confirm_profile(form("Alex", "狮子")).unwrap();
        confirmed.reset();
        assert_eq!(confirmed, SessionState::new());

        let mut conversing = SessionState::new();
        conversing.confirm_profile(form("Alex", "狮子")).unwrap();
        conversing.submit_turn("你好", &client).await.unwrap();
        conversing.reset();
        assert_eq!(conversing.phase(), SessionPhase::Empty);
        assert!(conversing.transcript().is_empty());
        assert!(conversing.system_prompt().is_none());
        assert_eq!(conversing.profile(), &UserProfile::default());

        // A reset session can be confirmed again.
        conversing.confirm_profile(form("Sam", "双鱼")).unwrap();
        assert_eq!(conversing.transcript().len(), 1);
    }

    #[test]
    fn test_message_wire_shape() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));
    }
}

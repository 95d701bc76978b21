use super::{DataMessage, PortId, Timestamp};
use std::collections::HashMap;
use std::fmt;

/// Whether data is available on an input for the current iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    Pending,
    Ready,
}

/// What the input rule decided to do with a ready token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenAction {
    /// Discard the data, `run` never sees it.
    Drop,
    /// Hand the data to `run` this iteration.
    Consume,
    /// Hold the data and offer it again next iteration.
    Keep,
}

impl fmt::Display for TokenAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Drop => "Drop",
            Self::Consume => "Consume",
            Self::Keep => "Keep",
        };
        f.write_str(name)
    }
}

/// Per-input, per-iteration admission wrapper around a pending message.
#[derive(Debug, Clone, PartialEq)]
pub struct InputToken {
    status: TokenStatus,
    action: Option<TokenAction>,
    data: Option<DataMessage>,
}

impl InputToken {
    pub fn pending() -> Self {
        Self {
            status: TokenStatus::Pending,
            action: None,
            data: None,
        }
    }

    pub fn ready(data: DataMessage) -> Self {
        Self {
            status: TokenStatus::Ready,
            action: None,
            data: Some(data),
        }
    }

    pub fn status(&self) -> TokenStatus {
        self.status
    }

    pub fn is_ready(&self) -> bool {
        self.status == TokenStatus::Ready
    }

    /// `None` until the input rule picks an action (always `None` when pending).
    pub fn action(&self) -> Option<TokenAction> {
        self.action
    }

    pub fn data(&self) -> Option<&DataMessage> {
        self.data.as_ref()
    }

    pub fn timestamp(&self) -> Option<&Timestamp> {
        self.data.as_ref().map(|d| d.timestamp())
    }

    pub fn set_action_drop(&mut self) {
        self.set_action(TokenAction::Drop);
    }

    pub fn set_action_consume(&mut self) {
        self.set_action(TokenAction::Consume);
    }

    pub fn set_action_keep(&mut self) {
        self.set_action(TokenAction::Keep);
    }

    fn set_action(&mut self, action: TokenAction) {
        if self.status == TokenStatus::Ready {
            self.action = Some(action);
        }
    }

    /// Split into the resolved action and the data it applies to.
    /// A ready token left without an action is consumed.
    pub(crate) fn resolve(self) -> Option<(TokenAction, DataMessage)> {
        let data = self.data?;
        Some((self.action.unwrap_or(TokenAction::Consume), data))
    }
}

/// Tokens of every input of a node for one iteration.
#[derive(Debug, Clone, Default)]
pub struct Tokens {
    tokens: HashMap<PortId, InputToken>,
}

impl Tokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, port: PortId, token: InputToken) {
        self.tokens.insert(port, token);
    }

    pub fn get(&self, port: &str) -> Option<&InputToken> {
        self.tokens.get(port)
    }

    pub fn get_mut(&mut self, port: &str) -> Option<&mut InputToken> {
        self.tokens.get_mut(port)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PortId, &InputToken)> {
        self.tokens.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&PortId, &mut InputToken)> {
        self.tokens.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn all_ready(&self) -> bool {
        self.tokens.values().all(InputToken::is_ready)
    }

    pub fn any_ready(&self) -> bool {
        self.tokens.values().any(InputToken::is_ready)
    }
}

impl IntoIterator for Tokens {
    type Item = (PortId, InputToken);
    type IntoIter = std::collections::hash_map::IntoIter<PortId, InputToken>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.into_iter()
    }
}

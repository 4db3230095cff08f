use thiserror::Error;
use crate::telemetry::Topics;
use crate::types::LockState;

/// A command received on one of the inbound broker topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ApplyUpdate(String),
    SetLock(LockState),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("no command is bound to topic {0}")]
    UnknownTopic(String),
    #[error("empty payload on {0}")]
    EmptyArgument(String),
    #[error("lock payload must be `lock` or `unlock`, got {0:?}")]
    InvalidLockPayload(String),
}

impl Command {
    /// Parse an inbound message. Payloads are trimmed of surrounding
    /// whitespace; lock keywords are case-sensitive.
    pub fn parse(topics: &Topics, topic: &str, payload: &[u8]) -> Result<Command, CommandError> {
        let text = String::from_utf8_lossy(payload);
        let arg = text.trim();

        if topic == topics.update_cmd || topic == topics.update_broadcast {
            if arg.is_empty() {
                return Err(CommandError::EmptyArgument(topic.to_string()));
            }
            return Ok(Command::ApplyUpdate(arg.to_string()));
        }

        if topic == topics.lock_cmd {
            return match arg {
                "lock" => Ok(Command::SetLock(LockState::Locked)),
                "unlock" => Ok(Command::SetLock(LockState::Unlocked)),
                "" => Err(CommandError::EmptyArgument(topic.to_string())),
                other => Err(CommandError::InvalidLockPayload(other.to_string())),
            };
        }

        Err(CommandError::UnknownTopic(topic.to_string()))
    }
}

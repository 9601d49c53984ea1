//! Verification helpers for testing Dynamips devices
//!
//! Provides assertion helpers over the command log of a [`FakeChannel`]

use thiserror::Error;

use crate::fixtures::FakeChannel;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Expected {expected} commands, {actual} were sent: {sent:?}")]
    CountMismatch {
        expected: usize,
        actual: usize,
        sent: Vec<String>,
    },

    #[error("Command #{index} mismatch: expected '{expected}', got '{actual}'")]
    CommandMismatch {
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("No command starting with '{prefix}' was sent (after position {after})")]
    Missing { prefix: String, after: usize },

    #[error("Command '{command}' was sent but should not have been")]
    Unexpected { command: String },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

/// Command log verification helper
pub struct CommandLogVerifier<'a> {
    channel: &'a FakeChannel,
}

impl<'a> CommandLogVerifier<'a> {
    /// Create a new verifier over a fake channel
    pub fn new(channel: &'a FakeChannel) -> Self {
        Self { channel }
    }

    /// Verify the exact sequence of commands sent
    pub fn assert_exact(&self, expected: &[&str]) -> VerifyResult<()> {
        let sent = self.channel.commands();
        if sent.len() != expected.len() {
            return Err(VerificationError::CountMismatch {
                expected: expected.len(),
                actual: sent.len(),
                sent,
            });
        }
        for (index, (actual, expected)) in sent.iter().zip(expected).enumerate() {
            if actual != expected {
                return Err(VerificationError::CommandMismatch {
                    index,
                    expected: expected.to_string(),
                    actual: actual.clone(),
                });
            }
        }
        Ok(())
    }

    /// Verify that no command was sent at all
    pub fn assert_nothing_sent(&self) -> VerifyResult<()> {
        match self.channel.commands().into_iter().next() {
            Some(command) => Err(VerificationError::Unexpected { command }),
            None => Ok(()),
        }
    }

    /// Verify that commands starting with each prefix were sent in this
    /// relative order (other commands may be interleaved)
    pub fn assert_in_order(&self, prefixes: &[&str]) -> VerifyResult<()> {
        let sent = self.channel.commands();
        let mut position = 0;
        for prefix in prefixes {
            match sent[position..].iter().position(|c| c.starts_with(prefix)) {
                Some(offset) => position += offset + 1,
                None => {
                    return Err(VerificationError::Missing {
                        prefix: prefix.to_string(),
                        after: position,
                    })
                }
            }
        }
        Ok(())
    }

    /// Verify that no command starting with `prefix` was sent
    pub fn assert_not_sent(&self, prefix: &str) -> VerifyResult<()> {
        match self
            .channel
            .commands()
            .into_iter()
            .find(|c| c.starts_with(prefix))
        {
            Some(command) => Err(VerificationError::Unexpected { command }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynamips_common::HypervisorChannel;

    async fn channel_with(commands: &[&str]) -> std::sync::Arc<FakeChannel> {
        let channel = FakeChannel::new();
        for cmd in commands {
            channel.send(cmd).await.unwrap();
        }
        channel
    }

    #[tokio::test]
    async fn test_assert_exact() {
        let channel = channel_with(&["a 1", "b 2"]).await;
        let verifier = CommandLogVerifier::new(&channel);

        assert!(verifier.assert_exact(&["a 1", "b 2"]).is_ok());
        assert!(matches!(
            verifier.assert_exact(&["a 1"]),
            Err(VerificationError::CountMismatch { .. })
        ));
        assert!(matches!(
            verifier.assert_exact(&["a 1", "c 3"]),
            Err(VerificationError::CommandMismatch { index: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_assert_in_order() {
        let channel = channel_with(&["create x", "other", "map y"]).await;
        let verifier = CommandLogVerifier::new(&channel);

        assert!(verifier.assert_in_order(&["create", "map"]).is_ok());
        assert!(verifier.assert_in_order(&["map", "create"]).is_err());
    }

    #[tokio::test]
    async fn test_assert_nothing_sent() {
        let channel = channel_with(&[]).await;
        assert!(CommandLogVerifier::new(&channel).assert_nothing_sent().is_ok());

        let channel = channel_with(&["x"]).await;
        let verifier = CommandLogVerifier::new(&channel);
        assert!(verifier.assert_nothing_sent().is_err());
        assert!(verifier.assert_not_sent("y").is_ok());
        assert!(verifier.assert_not_sent("x").is_err());
    }
}

//! Request and reply messages passed through the dispatch pipeline.

use std::fmt;

/// Which way a message travels across the service boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to service.
    Request,
    /// Service to client.
    Reply,
}

/// A single transient request or reply.
///
/// The `Display` form is the raw text of the message as it appears on the
/// wire, without the line terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    direction: Direction,
    action: &'static str,
    body: Option<String>,
}

impl Message {
    /// Build an inbound request for `action`. `body` is `None` when the
    /// client supplied no argument.
    pub fn request(action: &'static str, body: Option<String>) -> Self {
        Self {
            direction: Direction::Request,
            action,
            body,
        }
    }

    /// Build the outbound reply to `action`.
    pub fn reply(action: &'static str, body: String) -> Self {
        Self {
            direction: Direction::Reply,
            action,
            body: Some(body),
        }
    }

    pub fn action(&self) -> &'static str {
        self.action
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            Direction::Request => {
                f.write_str(&self.action.to_ascii_uppercase())?;
                if let Some(body) = &self.body {
                    write!(f, " {body}")?;
                }
                Ok(())
            }
            Direction::Reply => write!(f, "REPLY {}", self.body.as_deref().unwrap_or_default()),
        }
    }
}

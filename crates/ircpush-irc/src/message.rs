//! IRC protocol messages.
//!
//! Wire format: `[@tags ][:<prefix> ]<command>[ <params>][ :<trailing>]`.
//! Tags are accepted on input and discarded; they are never produced.

use std::fmt;

/// Numeric reply: registration complete.
pub const RPL_WELCOME: &str = "001";

/// Numeric reply: nickname already in use.
pub const ERR_NICKNAMEINUSE: &str = "433";

/// Numeric reply: server password rejected.
pub const ERR_PASSWDMISMATCH: &str = "464";

/// A parsed or outgoing IRC message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    /// Source of the message (`nick!user@host` or a server name).
    pub prefix: Option<String>,
    /// Upper-cased command or three-digit numeric.
    pub command: String,
    /// Parameters, with the trailing parameter last.
    pub params: Vec<String>,
}

impl IrcMessage {
    /// Create a message without a prefix.
    #[must_use]
    pub fn new<I, S>(command: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefix: None,
            command: command.into(),
            params: params.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a single line. Trailing CR/LF is ignored.
    ///
    /// Returns `None` for blank lines and lines without a command.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut rest = line.trim_end_matches(['\r', '\n']);

        if let Some(tagged) = rest.strip_prefix('@') {
            rest = tagged.split_once(' ').map_or("", |(_, r)| r);
        }
        rest = rest.trim_start_matches(' ');

        let prefix = match rest.strip_prefix(':') {
            Some(stripped) => {
                let (prefix, after) = stripped.split_once(' ')?;
                rest = after;
                Some(prefix.to_string())
            }
            None => None,
        };

        let (middle, trailing) = match rest.find(" :") {
            Some(pos) => (&rest[..pos], Some(&rest[pos + 2..])),
            None => (rest, None),
        };

        let mut parts = middle.split(' ').filter(|p| !p.is_empty());
        let command = parts.next()?.to_ascii_uppercase();
        let mut params: Vec<String> = parts.map(str::to_string).collect();
        if let Some(trailing) = trailing {
            params.push(trailing.to_string());
        }

        Some(Self {
            prefix,
            command,
            params,
        })
    }

    /// Nickname part of the prefix (`nick!user@host` -> `nick`).
    #[must_use]
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        let nick = prefix.split(['!', '@']).next().unwrap_or(prefix);
        (!nick.is_empty()).then_some(nick)
    }

    /// The last parameter, usually the human-readable text.
    #[must_use]
    pub fn trailing(&self) -> Option<&str> {
        self.params.last().map(String::as_str)
    }

    /// Whether any parameter carries a byte that would break line framing.
    #[must_use]
    pub fn has_forbidden_chars(&self) -> bool {
        self.params
            .iter()
            .chain(std::iter::once(&self.command))
            .any(|p| p.contains(['\r', '\n', '\0']))
    }

    /// `PASS <password>`
    #[must_use]
    pub fn pass(password: &str) -> Self {
        Self::new("PASS", [password])
    }

    /// `NICK <nick>`
    #[must_use]
    pub fn nick_cmd(nick: &str) -> Self {
        Self::new("NICK", [nick])
    }

    /// `USER <ident> 0 * :<realname>`
    #[must_use]
    pub fn user(ident: &str, realname: &str) -> Self {
        Self::new("USER", [ident, "0", "*", realname])
    }

    /// `JOIN <channel> [<key>]`
    #[must_use]
    pub fn join(channel: &str, key: Option<&str>) -> Self {
        match key {
            Some(key) => Self::new("JOIN", [channel, key]),
            None => Self::new("JOIN", [channel]),
        }
    }

    /// `PRIVMSG <target> :<text>`
    #[must_use]
    pub fn privmsg(target: &str, text: &str) -> Self {
        Self::new("PRIVMSG", [target, text])
    }

    /// `PONG` echoing the parameters of a `PING`.
    #[must_use]
    pub fn pong(ping: &IrcMessage) -> Self {
        Self::new("PONG", ping.params.iter().cloned())
    }

    /// `QUIT :<reason>`
    #[must_use]
    pub fn quit(reason: &str) -> Self {
        Self::new("QUIT", [reason])
    }
}

impl fmt::Display for IrcMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(prefix) = &self.prefix {
            write!(f, ":{prefix} ")?;
        }
        f.write_str(&self.command)?;

        let Some((last, middle)) = self.params.split_last() else {
            return Ok(());
        };
        for param in middle {
            write!(f, " {param}")?;
        }
        if last.is_empty() || last.contains(' ') || last.starts_with(':') {
            write!(f, " :{last}")
        } else {
            write!(f, " {last}")
        }
    }
}

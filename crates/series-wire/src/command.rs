//! RESP command framing and reply parsing.

use bytes::{Bytes, BytesMut};

/// A single argument of a command, already owned as bytes.
#[derive(Debug, Clone)]
pub enum Arg {
    Str(String),
    Raw(Vec<u8>),
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Str(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Str(s)
    }
}

impl From<&[u8]> for Arg {
    fn from(b: &[u8]) -> Self {
        Arg::Raw(b.to_vec())
    }
}

impl From<Vec<u8>> for Arg {
    fn from(b: Vec<u8>) -> Self {
        Arg::Raw(b)
    }
}

impl Arg {
    fn as_bytes(&self) -> &[u8] {
        match self {
            Arg::Str(s) => s.as_bytes(),
            Arg::Raw(b) => b,
        }
    }
}

/// An immutable, framed RESP command together with the key used to route
/// it. `key` is `None` for keyless commands (`COMMAND`, `CLUSTER SLOTS`),
/// which are dispatched to the control connection rather than routed by
/// slot.
#[derive(Debug, Clone)]
pub struct Command {
    pub key: Option<Vec<u8>>,
    framed: Bytes,
}

impl Command {
    /// Build a command from its argument list. `key_index`, if given, names
    /// the argument (0-based) that determines routing.
    pub fn new(args: &[Arg], key_index: Option<usize>) -> Self {
        let key = key_index.and_then(|i| args.get(i)).map(|a| a.as_bytes().to_vec());

        let mut buf = BytesMut::new();
        buf.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
        for arg in args {
            let bytes = arg.as_bytes();
            buf.extend_from_slice(format!("${}\r\n", bytes.len()).as_bytes());
            buf.extend_from_slice(bytes);
            buf.extend_from_slice(b"\r\n");
        }

        Self {
            key,
            framed: buf.freeze(),
        }
    }

    pub fn keyless(args: &[Arg]) -> Self {
        Self::new(args, None)
    }

    pub fn bytes(&self) -> &Bytes {
        &self.framed
    }
}

/// A parsed RESP reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Vec<u8>),
    Nil,
    Array(Vec<Reply>),
}

impl Reply {
    pub fn into_error(self) -> Option<String> {
        match self {
            Reply::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bulk_string(&self) -> Option<&str> {
        match self {
            Reply::Bulk(b) => std::str::from_utf8(b).ok(),
            Reply::Simple(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Reply]> {
        match self {
            Reply::Array(items) => Some(items),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn framing_for_multi_bulk() {
        let cmd = Command::new(&[Arg::from("HSET"), Arg::from("k"), Arg::from("v")], Some(1));
        assert_eq!(
            cmd.bytes().as_ref(),
            b"*3\r\n$4\r\nHSET\r\n$1\r\nk\r\n$1\r\nv\r\n".as_ref()
        );
        assert_eq!(cmd.key.as_deref(), Some(b"k".as_ref()));
    }

    #[test]
    fn keyless_has_no_key() {
        let cmd = Command::keyless(&[Arg::from("CLUSTER"), Arg::from("SLOTS")]);
        assert!(cmd.key.is_none());
    }
}

//! Signatures record who authored, committed or tagged an object and when.
//! The wire form is a single header line:
//! `<keyword> <name> <<email>> <unix-timestamp> <timezone>`.
//! The timezone is carried verbatim so re-encoding is byte-exact.

use std::fmt::Display;

use bstr::ByteSlice;
use serde::{Deserialize, Serialize};

use crate::errors::GitError;

/// Which header keyword the signature serializes under.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum SignatureType {
    Author,
    Committer,
    Tagger,
}

impl SignatureType {
    pub fn to_bytes(self) -> &'static [u8] {
        match self {
            SignatureType::Author => b"author",
            SignatureType::Committer => b"committer",
            SignatureType::Tagger => b"tagger",
        }
    }

    pub fn from_data(data: &[u8]) -> Result<SignatureType, GitError> {
        match data {
            b"author" => Ok(SignatureType::Author),
            b"committer" => Ok(SignatureType::Committer),
            b"tagger" => Ok(SignatureType::Tagger),
            _ => Err(GitError::InvalidSignatureType(
                String::from_utf8_lossy(data).to_string(),
            )),
        }
    }
}

impl Display for SignatureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignatureType::Author => write!(f, "author"),
            SignatureType::Committer => write!(f, "committer"),
            SignatureType::Tagger => write!(f, "tagger"),
        }
    }
}

/// One identity line of a commit or tag: name, email, seconds since the
/// epoch and the original timezone text.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Signature {
    pub signature_type: SignatureType,
    pub name: String,
    pub email: String,
    pub timestamp: i64,
    pub timezone: String,
}

impl Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} <{}> {} {}",
            self.name, self.email, self.timestamp, self.timezone
        )
    }
}

impl Signature {
    /// Create a signature stamped with the current wall-clock time in UTC.
    pub fn new(signature_type: SignatureType, name: String, email: String) -> Signature {
        Signature {
            signature_type,
            name,
            email,
            timestamp: chrono::Utc::now().timestamp(),
            timezone: "+0000".to_string(),
        }
    }

    /// Create a signature with an explicit timestamp and timezone.
    pub fn from_parts(
        signature_type: SignatureType,
        name: String,
        email: String,
        timestamp: i64,
        timezone: String,
    ) -> Signature {
        Signature {
            signature_type,
            name,
            email,
            timestamp,
            timezone,
        }
    }

    /// Parse one `<keyword> Name <email> ts tz` header line.
    pub fn from_data(data: Vec<u8>) -> Result<Signature, GitError> {
        let invalid = |msg: &str| GitError::InvalidSignatureType(msg.to_string());

        let keyword_end = data
            .find_byte(b' ')
            .ok_or_else(|| invalid("missing keyword"))?;
        let signature_type = SignatureType::from_data(&data[..keyword_end])?;
        let rest = &data[keyword_end + 1..];

        // The name may contain spaces; the email is delimited by <>.
        let email_open = rest
            .find_byte(b'<')
            .ok_or_else(|| invalid("missing email open bracket"))?;
        let email_close = rest
            .find_byte(b'>')
            .ok_or_else(|| invalid("missing email close bracket"))?;
        if email_close < email_open {
            return Err(invalid("malformed email brackets"));
        }

        let name = rest[..email_open]
            .trim_with(|c| c == ' ')
            .to_str()
            .map_err(|e| GitError::ConversionError(e.to_string()))?
            .to_string();
        let email = rest[email_open + 1..email_close]
            .to_str()
            .map_err(|e| GitError::ConversionError(e.to_string()))?
            .to_string();

        let tail = rest[email_close + 1..].trim_with(|c| c == ' ');
        let mut parts = tail.splitn_str(2, b" ");
        let timestamp = parts
            .next()
            .and_then(|t| t.to_str().ok())
            .and_then(|t| t.parse::<i64>().ok())
            .ok_or_else(|| invalid("missing or malformed timestamp"))?;
        let timezone = parts
            .next()
            .and_then(|t| t.to_str().ok())
            .ok_or_else(|| invalid("missing timezone"))?
            .to_string();

        Ok(Signature {
            signature_type,
            name,
            email,
            timestamp,
            timezone,
        })
    }

    /// Serialize back to the header-line form.
    pub fn to_data(&self) -> Result<Vec<u8>, GitError> {
        let mut data = Vec::new();
        data.extend(self.signature_type.to_bytes());
        data.push(b' ');
        data.extend(self.name.as_bytes());
        data.extend(b" <");
        data.extend(self.email.as_bytes());
        data.extend(b"> ");
        data.extend(self.timestamp.to_string().as_bytes());
        data.push(b' ');
        data.extend(self.timezone.as_bytes());
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_author_line() {
        let line = b"author Ada Lovelace <ada@x> 1700000000 +0000".to_vec();
        let sig = Signature::from_data(line.clone()).unwrap();
        assert_eq!(sig.signature_type, SignatureType::Author);
        assert_eq!(sig.name, "Ada Lovelace");
        assert_eq!(sig.email, "ada@x");
        assert_eq!(sig.timestamp, 1700000000);
        assert_eq!(sig.timezone, "+0000");
        assert_eq!(sig.to_data().unwrap(), line);
    }

    #[test]
    fn test_timezone_preserved_byte_exact() {
        let line = b"committer mega <admin@mega.org> 1757467768 +0800".to_vec();
        let sig = Signature::from_data(line.clone()).unwrap();
        assert_eq!(sig.timezone, "+0800");
        assert_eq!(sig.to_data().unwrap(), line);
    }

    #[test]
    fn test_rejects_unknown_keyword() {
        let line = b"reviewer mega <admin@mega.org> 1 +0000".to_vec();
        assert!(Signature::from_data(line).is_err());
    }

    #[test]
    fn test_rejects_missing_timestamp() {
        let line = b"author mega <admin@mega.org>".to_vec();
        assert!(Signature::from_data(line).is_err());
    }
}

//! Requests one peer can make of another, and what comes back.

use veilsync_shared::BlockHash;

/// A peer-facing action, sent as `?action=<name>[&data=<data>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerAction {
    /// Current block-index digest.
    GetDbHash,
    /// Newline-separated list of every known block hash.
    GetBlockHashes,
    /// Content of one block.
    GetData(BlockHash),
    /// Newline-separated known addresses.
    Pex,
    /// Newline-separated known public keys. Carries an optional
    /// proof-of-work token.
    Kex(Option<String>),
}

impl PeerAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetDbHash => "getDBHash",
            Self::GetBlockHashes => "getBlockHashes",
            Self::GetData(_) => "getData",
            Self::Pex => "pex",
            Self::Kex(_) => "kex",
        }
    }

    pub fn data(&self) -> Option<&str> {
        match self {
            Self::GetData(hash) => Some(hash.as_str()),
            Self::Kex(token) => token.as_deref(),
            _ => None,
        }
    }

    /// Rebuild an action from its query parameters. Unknown actions and a
    /// `getData` without a well-formed hash yield `None`.
    pub fn parse(action: &str, data: Option<&str>) -> Option<Self> {
        match action {
            "getDBHash" => Some(Self::GetDbHash),
            "getBlockHashes" => Some(Self::GetBlockHashes),
            "getData" => BlockHash::parse(data?).ok().map(Self::GetData),
            "pex" => Some(Self::Pex),
            "kex" => Some(Self::Kex(
                data.filter(|d| !d.is_empty()).map(str::to_string),
            )),
            _ => None,
        }
    }
}

/// Outcome of a best-effort peer request.
///
/// Connection failures, timeouts and error statuses all collapse into
/// [`Fetched::Unavailable`]; callers skip the address and move on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Data(Vec<u8>),
    Unavailable,
}

impl Fetched {
    pub fn into_data(self) -> Option<Vec<u8>> {
        match self {
            Self::Data(data) => Some(data),
            Self::Unavailable => None,
        }
    }

    /// The body as trimmed text, `None` if unavailable or empty.
    pub fn into_text(self) -> Option<String> {
        let data = self.into_data()?;
        let text = String::from_utf8_lossy(&data).trim().to_string();
        (!text.is_empty()).then_some(text)
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Data(_))
    }
}

/// Split a newline-separated body into trimmed, non-empty lines.
pub fn split_lines(body: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(body)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_and_data() {
        let hash = BlockHash::of(b"x");
        assert_eq!(PeerAction::GetDbHash.name(), "getDBHash");
        assert_eq!(PeerAction::GetData(hash.clone()).data(), Some(hash.as_str()));
        assert_eq!(PeerAction::Pex.data(), None);
        assert_eq!(PeerAction::Kex(None).data(), None);
        assert_eq!(PeerAction::Kex(Some("tok".into())).data(), Some("tok"));
    }

    #[test]
    fn test_parse() {
        let hash = BlockHash::of(b"y");
        for action in [
            PeerAction::GetDbHash,
            PeerAction::GetBlockHashes,
            PeerAction::GetData(hash),
            PeerAction::Pex,
            PeerAction::Kex(Some("abc".into())),
        ] {
            assert_eq!(PeerAction::parse(action.name(), action.data()), Some(action));
        }
        assert_eq!(PeerAction::parse("getData", Some("zz")), None);
        assert_eq!(PeerAction::parse("getData", None), None);
        assert_eq!(PeerAction::parse("shutdown", None), None);
        assert_eq!(PeerAction::parse("kex", Some("")), Some(PeerAction::Kex(None)));
    }

    #[test]
    fn test_fetched_text() {
        assert_eq!(Fetched::Data(b" abc \n".to_vec()).into_text().as_deref(), Some("abc"));
        assert_eq!(Fetched::Data(b"\n".to_vec()).into_text(), None);
        assert_eq!(Fetched::Unavailable.into_text(), None);
    }

    #[test]
    fn test_split_lines() {
        assert_eq!(split_lines(b"a\r\n\n b \nc"), vec!["a", "b", "c"]);
        assert!(split_lines(b"").is_empty());
    }
}

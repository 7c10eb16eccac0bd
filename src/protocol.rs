//! Request signing and response parsing for the Audioscrobbler 2.0 API.
//!
//! Every API call carries an `api_sig` parameter: the MD5 digest of all
//! other parameters concatenated as `namevalue` pairs in alphabetical
//! order, followed by the shared secret in lowercase hex. The digest is
//! rendered as exactly 32 lowercase hex characters. This must match the
//! service bit-for-bit or every call is rejected with error code 13.
//!
//! Responses are the service's XML-ish bodies. They are interpreted by
//! marker search, not by an XML parser: a body is successful iff it
//! contains `<lfm status="ok"`, and error codes are picked out of the
//! `<error code="N">` marker.

use md5::{Digest, Md5};
use url::form_urlencoded;

use crate::util;

/// Web service endpoint. All API methods go through this single URL.
pub const API_URL: &str = "https://ws.audioscrobbler.com/2.0/";

/// Out-of-band page where the user grants access to the obtained token.
pub const AUTH_URL: &str = "https://www.last.fm/api/auth/";

/// Sentinel error code for a response that carries neither the success
/// marker nor an error code. Not used by the service itself.
pub const ERROR_MALFORMED: u16 = 1;

/// Error code the service returns for an incomplete parameter set.
///
/// The session validation probe relies on receiving exactly this code.
pub const ERROR_INVALID_PARAMETERS: u16 = 6;

/// A single request parameter value.
///
/// Empty text and zero numbers count as absent: they are dropped from
/// both the signature input and the rendered request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Number(u64),
}

impl Value {
    fn is_empty(&self) -> bool {
        match self {
            Value::Text(text) => text.is_empty(),
            Value::Number(number) => *number == 0,
        }
    }

    fn render(&self) -> String {
        match self {
            Value::Text(text) => text.clone(),
            Value::Number(number) => number.to_string(),
        }
    }
}

/// Ordered parameter list for one API call.
///
/// Callers may add pairs in any order; signing and rendering always use
/// the canonical alphabetical order, so the resulting signature does not
/// depend on insertion order.
#[derive(Clone, Debug, Default)]
pub struct Params(Vec<(&'static str, Value)>);

impl Params {
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn text(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.0.push((name, Value::Text(value.into())));
        self
    }

    #[must_use]
    pub fn number(mut self, name: &'static str, value: u64) -> Self {
        self.0.push((name, Value::Number(value)));
        self
    }

    /// Retained pairs in ascending alphabetical order of name.
    fn canonical(&self) -> Vec<&(&'static str, Value)> {
        let mut pairs: Vec<_> = self.0.iter().filter(|(_, value)| !value.is_empty()).collect();
        pairs.sort_by_key(|(name, _)| *name);
        pairs
    }

    /// Computes the `api_sig` method signature.
    ///
    /// Names and values are concatenated raw, without separators or
    /// percent-encoding, then the secret's hex dump is appended and the
    /// whole string is MD5-hashed.
    #[must_use]
    pub fn sign(&self, secret: &[u8; 16]) -> String {
        let mut hasher = Md5::new();
        for (name, value) in self.canonical() {
            hasher.update(name.as_bytes());
            hasher.update(value.render().as_bytes());
        }
        hasher.update(util::hex_encode(secret).as_bytes());
        util::hex_encode(&hasher.finalize())
    }

    /// Renders the signed parameter set as a query string or POST body.
    ///
    /// The output is `application/x-www-form-urlencoded`: text values are
    /// percent-encoded, `api_sig` comes last.
    #[must_use]
    pub fn into_form(self, secret: &[u8; 16]) -> String {
        let signature = self.sign(secret);
        let mut form = form_urlencoded::Serializer::new(String::new());
        for (name, value) in self.canonical() {
            form.append_pair(name, &value.render());
        }
        form.append_pair("api_sig", &signature);
        form.finish()
    }
}

/// A parsed service response body.
#[derive(Clone, Debug)]
pub struct Response {
    body: String,
}

impl Response {
    #[must_use]
    pub fn new(body: String) -> Self {
        Self { body }
    }

    /// Whether the body carries the success marker.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.body.contains("<lfm status=\"ok\"")
    }

    /// Service status: `Ok` on success, otherwise the embedded error code.
    ///
    /// A failure body without a recognizable error code yields the
    /// [`ERROR_MALFORMED`] sentinel, which signals that we are probably
    /// not talking to the scrobbler service at all.
    pub fn status(&self) -> Result<(), u16> {
        if self.is_ok() {
            return Ok(());
        }
        Err(self.error_code().unwrap_or(ERROR_MALFORMED))
    }

    fn error_code(&self) -> Option<u16> {
        let start = self.body.find("<error code=\"")? + "<error code=\"".len();
        let digits: String = self.body[start..]
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        digits.parse().ok()
    }

    /// Extracts the text content of the first `<tag>...</tag>` element.
    #[must_use]
    pub fn tag(&self, name: &str) -> Option<&str> {
        let open = format!("<{name}>");
        let start = self.body.find(&open)? + open.len();
        let end = self.body[start..].find('<')?;
        Some(&self.body[start..start + end])
    }
}
